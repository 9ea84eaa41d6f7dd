use async_trait::async_trait;
use tokio_postgres::Client;
use tracing::trace;

use crate::{PublishError, Publisher};

/// Largest payload PostgreSQL accepts for `NOTIFY` in its default
/// configuration.
pub const MAX_PAYLOAD_LEN: usize = 7999;

/// Publish connection.
pub struct PgPublisher {
    client: Client,
}

impl PgPublisher {
    pub(crate) fn new(client: Client) -> Self {
        Self { client }
    }
}

impl core::fmt::Debug for PgPublisher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PgPublisher")
            .field("closed", &self.client.is_closed())
            .finish()
    }
}

#[async_trait]
impl Publisher for PgPublisher {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), PublishError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(PublishError::PayloadTooLarge {
                channel: channel.to_owned(),
                len: payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }
        if self.client.is_closed() {
            return Err(PublishError::Closed);
        }

        self.client
            .execute("SELECT pg_notify($1, $2)", &[&channel, &payload])
            .await
            .map_err(|e| PublishError::Backend {
                channel: channel.to_owned(),
                source: Box::new(e),
            })?;

        trace!(%channel, len = payload.len(), "notification published");
        Ok(())
    }
}
