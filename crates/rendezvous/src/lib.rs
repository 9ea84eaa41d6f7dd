//! Rendezvous channel client.
//!
//! A rendezvous channel is a named pub/sub topic on a shared backend, used as
//! a broadcast medium. Anything published reaches every subscriber connected
//! at that moment; there is no persistence, no delivery to late subscribers
//! and no ordering across channels.
//!
//! - [`Rendezvous`] - opens the publish and subscribe connections
//! - [`Publisher`] - issues notifications on the publish connection
//! - [`pg`] - PostgreSQL `LISTEN`/`NOTIFY` backend
//!
//! The `test-utils` feature adds an in-process scripted backend.

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod error;
mod notification;
pub mod pg;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{BoxError, ConnectError, EndpointError, PublishError, Role};
pub use notification::Notification;
pub use pg::{PgPublisher, PgRendezvous, PgSubscription};

use async_trait::async_trait;
use futures::Stream;

/// Backend capable of hosting rendezvous channels.
#[async_trait]
pub trait Rendezvous: Send + Sync + 'static {
    /// Handle used to publish notifications.
    type Publisher: Publisher;

    /// Stream of notifications received on the subscribed channels.
    ///
    /// Ends only when the receiving connection is lost.
    type Subscription: Stream<Item = Notification> + Send + Unpin + 'static;

    /// Open a publish connection and a dedicated subscribe connection, then
    /// subscribe the latter to every channel in `channels`.
    ///
    /// Fails as a whole if any connection or subscription fails; nothing
    /// opened so far is kept.
    async fn connect(
        &self,
        channels: &[String],
    ) -> Result<(Self::Publisher, Self::Subscription), ConnectError>;
}

/// Publish side of a rendezvous connection.
#[async_trait]
pub trait Publisher: Send + Sync + 'static {
    /// Publish `payload` on `channel`.
    ///
    /// Success only means the backend accepted the command.
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), PublishError>;
}
