//! Error types for the membership service.

use muster_rendezvous::ConnectError;

/// Invalid membership configuration. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No rendezvous endpoint configured.
    #[error("rendezvous endpoint is required")]
    MissingEndpoint,

    /// A channel name is empty.
    #[error("{which} channel name is empty")]
    EmptyChannel {
        /// Which channel (`primary` or `secondary`).
        which: &'static str,
    },

    /// A timeout is configured as zero.
    #[error("{which} timeout must be greater than zero")]
    ZeroTimeout {
        /// Which timeout.
        which: &'static str,
    },

    /// Both schemes are configured on the same channel.
    #[error("primary and secondary channel are both {0:?}")]
    SameChannel(String),
}

/// Reason a membership run ended.
#[derive(Debug, thiserror::Error)]
pub enum MembershipError {
    /// The rendezvous connections could not be opened.
    #[error("rendezvous connect failed")]
    Connect(#[from] ConnectError),

    /// The subscribe connection was lost while listening.
    #[error("rendezvous subscription closed")]
    SubscriptionClosed,
}
