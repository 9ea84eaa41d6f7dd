use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures::{Stream, StreamExt, stream};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_postgres::{AsyncMessage, Client, Connection, Socket, tls::NoTlsStream};
use tracing::{debug, error, warn};

use super::quote_identifier;
use crate::{ConnectError, Notification};

/// Subscribe connection and the stream of notifications it receives.
///
/// Dropping the subscription closes the connection.
pub struct PgSubscription {
    client: Client,
    notifications: mpsc::UnboundedReceiver<Notification>,
    driver: JoinHandle<()>,
}

impl PgSubscription {
    /// Start driving `connection` and forwarding its notifications.
    pub(crate) fn spawn(client: Client, connection: Connection<Socket, NoTlsStream>) -> Self {
        let (tx, notifications) = mpsc::unbounded_channel();
        let driver = tokio::spawn(drive(connection, tx));
        Self {
            client,
            notifications,
            driver,
        }
    }

    /// Subscribe to `channel`.
    pub(crate) async fn listen(&self, channel: &str) -> Result<(), ConnectError> {
        self.client
            .batch_execute(&format!("LISTEN {}", quote_identifier(channel)))
            .await
            .map_err(|e| ConnectError::Subscribe {
                channel: channel.to_owned(),
                source: Box::new(e),
            })?;
        debug!(%channel, "subscribed");
        Ok(())
    }
}

impl core::fmt::Debug for PgSubscription {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PgSubscription")
            .field("closed", &self.client.is_closed())
            .finish()
    }
}

impl Stream for PgSubscription {
    type Item = Notification;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.notifications.poll_recv(cx)
    }
}

impl Drop for PgSubscription {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Poll the connection, forwarding notifications until it closes or the
/// receiving side is dropped.
async fn drive(
    mut connection: Connection<Socket, NoTlsStream>,
    tx: mpsc::UnboundedSender<Notification>,
) {
    let mut messages = stream::poll_fn(move |cx| connection.poll_message(cx));

    while let Some(message) = messages.next().await {
        match message {
            Ok(AsyncMessage::Notification(n)) => {
                let notification = Notification::new(n.channel(), n.payload());
                if tx.send(notification).is_err() {
                    break;
                }
            }
            Ok(AsyncMessage::Notice(notice)) => {
                debug!(%notice, "server notice on subscribe connection");
            }
            Ok(_) => {
                warn!("unexpected message on subscribe connection");
            }
            Err(error) => {
                error!(%error, "subscribe connection failed");
                break;
            }
        }
    }

    debug!("subscribe connection closed");
}
