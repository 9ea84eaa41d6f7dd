//! Error types for rendezvous operations.
//!
//! Backend causes are boxed so the membership layer stays independent of the
//! driver in use.

use std::time::Duration;

/// Boxed backend error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Which of the two rendezvous connections an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    /// Connection used to issue notifications.
    Publish,
    /// Connection dedicated to receiving notifications.
    Subscribe,
}

/// The endpoint could not be parsed into connection parameters.
#[derive(Debug, thiserror::Error)]
#[error("invalid rendezvous endpoint")]
pub struct EndpointError(#[source] pub BoxError);

/// Opening the rendezvous connections failed.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// The backend refused or dropped the connection.
    #[error("failed to open {role} connection")]
    Connect {
        /// Connection that failed.
        role: Role,
        /// Backend cause.
        #[source]
        source: BoxError,
    },

    /// The connection did not complete in time.
    #[error("{role} connection timed out after {timeout:?}")]
    Timeout {
        /// Connection that timed out.
        role: Role,
        /// Configured bound.
        timeout: Duration,
    },

    /// Subscribing to a channel failed.
    #[error("failed to subscribe to channel {channel:?}")]
    Subscribe {
        /// Channel that could not be subscribed.
        channel: String,
        /// Backend cause.
        #[source]
        source: BoxError,
    },
}

/// Publishing a notification failed.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Payload exceeds what the backend accepts.
    #[error("payload of {len} bytes on channel {channel:?} exceeds limit of {max} bytes")]
    PayloadTooLarge {
        /// Target channel.
        channel: String,
        /// Payload length in bytes.
        len: usize,
        /// Largest accepted payload length.
        max: usize,
    },

    /// The publish connection is gone.
    #[error("publish connection closed")]
    Closed,

    /// The backend did not accept the command in time.
    #[error("publish on channel {channel:?} timed out after {timeout:?}")]
    TimedOut {
        /// Target channel.
        channel: String,
        /// Bound that expired.
        timeout: Duration,
    },

    /// The backend rejected the command.
    #[error("failed to publish on channel {channel:?}")]
    Backend {
        /// Target channel.
        channel: String,
        /// Backend cause.
        #[source]
        source: BoxError,
    },
}
