//! In-process scripted backend for tests.
//!
//! Behaves like a pub/sub server: every publish is recorded and delivered to
//! the current subscribers of its channel, including the publisher's own
//! subscription. Tests can additionally inject arbitrary notifications,
//! make `connect` or `publish` fail or stall, and drop every subscription.

use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use async_trait::async_trait;
use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::{ConnectError, Notification, PublishError, Publisher, Rendezvous, Role};

#[derive(Debug, Default)]
struct Inner {
    fail_connect: bool,
    fail_publish: bool,
    stall_publish: bool,
    stalled: usize,
    connects: usize,
    published: Vec<Notification>,
    subscribers: Vec<Subscriber>,
}

#[derive(Debug)]
struct Subscriber {
    channels: Vec<String>,
    tx: mpsc::UnboundedSender<Notification>,
}

/// Scripted rendezvous backend shared between the code under test and the
/// test itself.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRendezvous {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedRendezvous {
    /// Create a backend that accepts connections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend whose `connect` always fails.
    pub fn failing() -> Self {
        let backend = Self::default();
        backend.inner.lock().fail_connect = true;
        backend
    }

    /// Make subsequent publishes fail.
    pub fn set_fail_publish(&self, fail: bool) {
        self.inner.lock().fail_publish = fail;
    }

    /// Make subsequent publishes never complete.
    pub fn set_stall_publish(&self, stall: bool) {
        self.inner.lock().stall_publish = stall;
    }

    /// Number of publishes that stalled so far.
    pub fn stalled_publishes(&self) -> usize {
        self.inner.lock().stalled
    }

    /// Number of `connect` calls so far.
    pub fn connects(&self) -> usize {
        self.inner.lock().connects
    }

    /// Every successful publish so far, in order.
    pub fn published(&self) -> Vec<Notification> {
        self.inner.lock().published.clone()
    }

    /// Payloads published on `channel`, in order.
    pub fn published_on(&self, channel: &str) -> Vec<String> {
        self.inner
            .lock()
            .published
            .iter()
            .filter(|n| n.channel == channel)
            .map(|n| n.payload.clone())
            .collect()
    }

    /// Deliver `notification` to every live subscription, regardless of the
    /// channels it subscribed to. Returns the number of receivers.
    pub fn inject(&self, notification: Notification) -> usize {
        let mut inner = self.inner.lock();
        inner.subscribers.retain(|s| !s.tx.is_closed());
        inner
            .subscribers
            .iter()
            .filter(|s| s.tx.send(notification.clone()).is_ok())
            .count()
    }

    /// Drop every subscription, ending their streams.
    pub fn disconnect_all(&self) {
        self.inner.lock().subscribers.clear();
    }

    /// Number of subscriptions still held by their owners.
    pub fn live_subscriptions(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.subscribers.retain(|s| !s.tx.is_closed());
        inner.subscribers.len()
    }
}

#[async_trait]
impl Rendezvous for ScriptedRendezvous {
    type Publisher = ScriptedPublisher;
    type Subscription = ScriptedSubscription;

    async fn connect(
        &self,
        channels: &[String],
    ) -> Result<(ScriptedPublisher, ScriptedSubscription), ConnectError> {
        let mut inner = self.inner.lock();
        inner.connects += 1;
        if inner.fail_connect {
            return Err(ConnectError::Connect {
                role: Role::Publish,
                source: "scripted connect failure".into(),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        inner.subscribers.push(Subscriber {
            channels: channels.to_vec(),
            tx,
        });

        Ok((
            ScriptedPublisher {
                inner: self.inner.clone(),
            },
            ScriptedSubscription { rx },
        ))
    }
}

/// Publisher half of [`ScriptedRendezvous`].
#[derive(Debug)]
pub struct ScriptedPublisher {
    inner: Arc<Mutex<Inner>>,
}

#[async_trait]
impl Publisher for ScriptedPublisher {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), PublishError> {
        let stall = {
            let mut inner = self.inner.lock();
            if inner.stall_publish {
                inner.stalled += 1;
            }
            inner.stall_publish
        };
        if stall {
            return std::future::pending().await;
        }

        let mut inner = self.inner.lock();
        if inner.fail_publish {
            return Err(PublishError::Backend {
                channel: channel.to_owned(),
                source: "scripted publish failure".into(),
            });
        }

        let notification = Notification::new(channel, payload);
        inner.subscribers.retain(|s| !s.tx.is_closed());
        for subscriber in &inner.subscribers {
            if subscriber.channels.iter().any(|c| c == channel) {
                let _ = subscriber.tx.send(notification.clone());
            }
        }
        inner.published.push(notification);
        Ok(())
    }
}

/// Subscription half of [`ScriptedRendezvous`].
#[derive(Debug)]
pub struct ScriptedSubscription {
    rx: mpsc::UnboundedReceiver<Notification>,
}

impl Stream for ScriptedSubscription {
    type Item = Notification;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    #[tokio::test]
    async fn test_publish_echoes_to_subscribed_channels() {
        let backend = ScriptedRendezvous::new();
        let (publisher, mut subscription) = backend
            .connect(&["cluster".to_owned()])
            .await
            .unwrap();

        publisher.publish("other", "ignored").await.unwrap();
        publisher.publish("cluster", "alpha").await.unwrap();

        assert_eq!(
            subscription.next().await,
            Some(Notification::new("cluster", "alpha"))
        );
        assert_eq!(backend.published().len(), 2);
        assert_eq!(backend.published_on("cluster"), vec!["alpha".to_owned()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_publish_never_completes() {
        let backend = ScriptedRendezvous::new();
        let (publisher, _subscription) = backend.connect(&[]).await.unwrap();
        backend.set_stall_publish(true);

        let publish = publisher.publish("cluster", "alpha");
        assert!(
            tokio::time::timeout(Duration::from_secs(60), publish)
                .await
                .is_err()
        );
        assert_eq!(backend.stalled_publishes(), 1);
        assert!(backend.published().is_empty());
    }

    #[tokio::test]
    async fn test_failing_connect() {
        let backend = ScriptedRendezvous::failing();
        assert!(backend.connect(&[]).await.is_err());
        assert_eq!(backend.connects(), 1);
        assert_eq!(backend.live_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_ends_stream() {
        let backend = ScriptedRendezvous::new();
        let (_publisher, mut subscription) = backend.connect(&[]).await.unwrap();
        assert_eq!(backend.inject(Notification::new("x", "y")), 1);
        backend.disconnect_all();

        assert_eq!(subscription.next().await, Some(Notification::new("x", "y")));
        assert_eq!(subscription.next().await, None);
    }
}
