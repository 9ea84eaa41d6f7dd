//! Membership state machine.
//!
//! A single task owns the rendezvous connections and the heartbeat timer and
//! processes one event at a time: heartbeat ticks, inbound notifications,
//! finished background tasks and the shutdown signal.
//!
//! Nothing on the loop waits on the backend once listening. Connect attempts
//! and announcements run as tasks, and every announcement publish is bounded
//! by the configured publish timeout.

use std::{future::Future, sync::Arc, time::Duration};

use futures::StreamExt;
use muster_codec::PeerDescriptor;
use muster_rendezvous::{ConnectError, Notification, PublishError, Publisher, Rendezvous};
use tokio::{
    sync::{mpsc, watch},
    task::{JoinError, JoinSet},
};
use tracing::{debug, error, info, trace, warn};

use crate::{
    LocalIdentity, MembershipConfig, MembershipError,
    heartbeat::{HeartbeatScheduler, HeartbeatTick, TimerHandle},
    metrics::{ChannelKind, MembershipMetrics},
    policy::{ConnectPolicy, Discovered, PeerConnector},
};

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum MembershipState {
    /// No rendezvous connections. Initial state and end state of a run.
    Disconnected,
    /// Opening the rendezvous connections.
    Connecting,
    /// Subscribed and announcing.
    Listening,
}

/// Connection handles, present only while listening.
enum State<P, S> {
    Disconnected,
    Connecting,
    Listening { publisher: Arc<P>, subscription: S },
}

impl<P, S> State<P, S> {
    fn kind(&self) -> MembershipState {
        match self {
            Self::Disconnected => MembershipState::Disconnected,
            Self::Connecting => MembershipState::Connecting,
            Self::Listening { .. } => MembershipState::Listening,
        }
    }
}

enum Event {
    Shutdown,
    Heartbeat(HeartbeatTick),
    Notification(Option<Notification>),
    AttemptFinished(Result<(), JoinError>),
    AnnouncementFinished(Result<(), JoinError>),
}

/// Membership discovery service for one node.
pub struct Membership<R: Rendezvous, I, C> {
    config: MembershipConfig,
    rendezvous: R,
    identity: I,
    policy: Arc<ConnectPolicy<C>>,
    scheduler: HeartbeatScheduler,
    ticks: mpsc::UnboundedReceiver<HeartbeatTick>,
    timer: Option<TimerHandle>,
    state: State<R::Publisher, R::Subscription>,
    state_tx: watch::Sender<MembershipState>,
    attempts: JoinSet<()>,
    announcements: JoinSet<()>,
    metrics: MembershipMetrics,
}

impl<R, I, C> Membership<R, I, C>
where
    R: Rendezvous,
    I: LocalIdentity,
    C: PeerConnector,
{
    /// Create a disconnected instance.
    pub fn new(config: MembershipConfig, rendezvous: R, identity: I, connector: C) -> Self {
        let (scheduler, ticks) = HeartbeatScheduler::new();
        let (state_tx, _) = watch::channel(MembershipState::Disconnected);
        Self {
            config,
            rendezvous,
            identity,
            policy: Arc::new(ConnectPolicy::new(connector)),
            scheduler,
            ticks,
            timer: None,
            state: State::Disconnected,
            state_tx,
            attempts: JoinSet::new(),
            announcements: JoinSet::new(),
            metrics: MembershipMetrics::default(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> MembershipState {
        self.state.kind()
    }

    /// Watch lifecycle state changes, including after [`run`](Self::run)
    /// takes ownership of the instance.
    pub fn subscribe_state(&self) -> watch::Receiver<MembershipState> {
        self.state_tx.subscribe()
    }

    /// Get the configuration.
    pub fn config(&self) -> &MembershipConfig {
        &self.config
    }

    /// Get the connect policy.
    pub fn policy(&self) -> &ConnectPolicy<C> {
        &self.policy
    }

    /// Connect, then process events until `shutdown` resolves.
    ///
    /// Returns an error if the connect fails or the subscription is lost; in
    /// both cases the instance ends disconnected and restarting is up to the
    /// caller.
    pub async fn run<F>(mut self, shutdown: F) -> Result<(), MembershipError>
    where
        F: Future<Output = ()>,
    {
        self.connect().await?;
        tokio::pin!(shutdown);

        loop {
            let event = {
                let State::Listening { subscription, .. } = &mut self.state else {
                    return Ok(());
                };
                tokio::select! {
                    _ = &mut shutdown => Event::Shutdown,
                    Some(tick) = self.ticks.recv() => Event::Heartbeat(tick),
                    notification = subscription.next() => Event::Notification(notification),
                    Some(result) = self.attempts.join_next(), if !self.attempts.is_empty() => {
                        Event::AttemptFinished(result)
                    }
                    Some(result) = self.announcements.join_next(),
                        if !self.announcements.is_empty() =>
                    {
                        Event::AnnouncementFinished(result)
                    }
                }
            };

            match event {
                Event::Shutdown => {
                    info!("membership shutting down");
                    self.stop();
                    return Ok(());
                }
                Event::Heartbeat(tick) => self.on_heartbeat(tick),
                Event::Notification(Some(notification)) => self.on_notification(notification),
                Event::Notification(None) => {
                    error!("rendezvous subscription closed");
                    self.stop();
                    return Err(MembershipError::SubscriptionClosed);
                }
                Event::AttemptFinished(Err(error)) if error.is_panic() => {
                    error!(%error, "connect attempt panicked");
                }
                Event::AnnouncementFinished(Err(error)) if error.is_panic() => {
                    error!(%error, "announcement panicked");
                }
                Event::AttemptFinished(_) | Event::AnnouncementFinished(_) => {}
            }
        }
    }

    /// Open the rendezvous connections and schedule an immediate heartbeat.
    ///
    /// On failure the instance stays disconnected with no timer armed.
    pub async fn connect(&mut self) -> Result<(), ConnectError> {
        self.set_state(State::Connecting);
        debug!(
            primary = %self.config.primary_channel(),
            secondary = %self.config.secondary_channel(),
            "connecting to rendezvous"
        );

        match self.rendezvous.connect(&self.config.channels()).await {
            Ok((publisher, subscription)) => {
                self.set_state(State::Listening {
                    publisher: Arc::new(publisher),
                    subscription,
                });
                info!(
                    primary = %self.config.primary_channel(),
                    secondary = %self.config.secondary_channel(),
                    interval = ?self.config.heartbeat_interval(),
                    "listening for cluster announcements"
                );
                self.schedule_heartbeat(Duration::ZERO);
                Ok(())
            }
            Err(e) => {
                error!(error = ?e, "failed to connect to rendezvous");
                self.set_state(State::Disconnected);
                Err(e)
            }
        }
    }

    /// Handle a heartbeat tick: start an announcement on both channels and
    /// rearm.
    ///
    /// Ticks that do not belong to the current timer are ignored. While the
    /// previous announcement is still publishing, no new one is started.
    pub fn on_heartbeat(&mut self, tick: HeartbeatTick) {
        if self.timer.as_ref().map(TimerHandle::id) != Some(tick.id()) {
            debug!(tick = tick.id(), "ignoring stray heartbeat");
            return;
        }
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        if !matches!(self.state, State::Listening { .. }) {
            return;
        }

        while let Some(result) = self.announcements.try_join_next() {
            if let Err(error) = result
                && error.is_panic()
            {
                error!(%error, "announcement panicked");
            }
        }
        if self.announcements.is_empty() {
            self.spawn_announcement();
            self.metrics.inc_heartbeats();
        } else {
            debug!("previous announcement still in flight");
        }
        self.schedule_heartbeat(self.config.heartbeat_interval());
    }

    /// Dispatch an inbound notification by channel.
    pub fn on_notification(&mut self, notification: Notification) {
        let Notification { channel, payload } = notification;

        if channel == self.config.primary_channel() {
            self.metrics.record_notification(ChannelKind::Primary);
            self.on_name_announced(&channel, payload);
        } else if channel == self.config.secondary_channel() {
            self.metrics.record_notification(ChannelKind::Secondary);
            self.on_descriptor_announced(&channel, &payload);
        } else {
            self.metrics.record_notification(ChannelKind::Unknown);
            warn!(%channel, "notification on unexpected channel");
        }
    }

    fn on_name_announced(&mut self, channel: &str, name: String) {
        if name.is_empty() {
            warn!(%channel, "dropping empty node name");
            return;
        }
        if name == self.identity.node_name() {
            trace!(%channel, "own announcement");
            return;
        }

        debug!(%channel, peer = %name, "peer announced");
        self.spawn_attempt(Discovered::Name(name));
    }

    fn on_descriptor_announced(&mut self, channel: &str, payload: &str) {
        let descriptor = match muster_codec::decode(payload) {
            Ok(descriptor) => descriptor,
            Err(error) => {
                warn!(%channel, error = ?error, "dropping malformed peer descriptor");
                self.metrics.inc_decode_failures();
                return;
            }
        };

        if self.is_local(&descriptor) {
            trace!(%channel, "own announcement");
            return;
        }
        if self.policy.is_known(&descriptor) {
            trace!(%channel, peer = %descriptor, "peer already joined");
            return;
        }

        debug!(%channel, peer = %descriptor, "peer announced");
        self.spawn_attempt(Discovered::Descriptor(descriptor));
    }

    fn is_local(&self, descriptor: &PeerDescriptor) -> bool {
        *descriptor == self.identity.descriptor()
    }

    fn spawn_attempt(&mut self, peer: Discovered) {
        let policy = self.policy.clone();
        self.attempts.spawn(async move {
            policy.attempt(peer).await;
        });
    }

    fn spawn_announcement(&mut self) {
        let State::Listening { publisher, .. } = &self.state else {
            return;
        };
        let publisher = publisher.clone();

        let mut messages = vec![(
            self.config.primary_channel().to_owned(),
            self.identity.node_name(),
        )];
        match muster_codec::encode(&self.identity.descriptor()) {
            Ok(payload) => messages.push((self.config.secondary_channel().to_owned(), payload)),
            Err(error) => {
                error!(error = ?error, "failed to encode local peer descriptor");
                self.metrics.inc_publish_failures();
            }
        }

        self.announcements.spawn(announce(
            publisher,
            messages,
            self.config.publish_timeout(),
            self.metrics.clone(),
        ));
    }

    /// Arm the heartbeat timer, cancelling any armed one first.
    fn schedule_heartbeat(&mut self, after: Duration) {
        if let Some(previous) = self.timer.take() {
            previous.cancel();
        }
        self.timer = Some(self.scheduler.schedule(after));
    }

    /// Cancel the timer and release both connections. Connect attempts in
    /// flight are left to finish on their own; announcements are aborted.
    fn stop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        self.attempts.detach_all();
        self.announcements.abort_all();
        self.set_state(State::Disconnected);
    }

    fn set_state(&mut self, state: State<R::Publisher, R::Subscription>) {
        let kind = state.kind();
        self.state = state;
        self.state_tx.send_replace(kind);
    }
}

/// Publish each `(channel, payload)` in order, giving up on a publish once
/// `timeout` has passed.
async fn announce<P: Publisher>(
    publisher: Arc<P>,
    messages: Vec<(String, String)>,
    timeout: Duration,
    metrics: MembershipMetrics,
) {
    for (channel, payload) in messages {
        let result = tokio::time::timeout(timeout, publisher.publish(&channel, &payload))
            .await
            .unwrap_or_else(|_| {
                Err(PublishError::TimedOut {
                    channel: channel.clone(),
                    timeout,
                })
            });
        match result {
            Ok(()) => trace!(%channel, "announced"),
            Err(error) => {
                warn!(%channel, error = ?error, "heartbeat publish failed");
                metrics.inc_publish_failures();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MembershipOptions, StaticIdentity, policy::PeerConnectError};
    use async_trait::async_trait;
    use muster_rendezvous::test_utils::ScriptedRendezvous;
    use parking_lot::Mutex;
    use std::collections::HashSet;

    #[derive(Debug, Clone, Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<Discovered>>>,
        known: Arc<Mutex<HashSet<PeerDescriptor>>>,
    }

    impl Recorder {
        fn calls(&self) -> Vec<Discovered> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl PeerConnector for Recorder {
        async fn connect_by_name(&self, name: &str) -> Result<(), PeerConnectError> {
            self.calls.lock().push(Discovered::Name(name.to_owned()));
            Ok(())
        }

        async fn join_by_descriptor(
            &self,
            descriptor: &PeerDescriptor,
        ) -> Result<(), PeerConnectError> {
            self.calls
                .lock()
                .push(Discovered::Descriptor(descriptor.clone()));
            Err(PeerConnectError::new("unreachable"))
        }

        fn is_known(&self, descriptor: &PeerDescriptor) -> bool {
            self.known.lock().contains(descriptor)
        }
    }

    fn local() -> PeerDescriptor {
        PeerDescriptor::new("alpha@127.0.0.1:7946", vec!["127.0.0.1:7946".parse().unwrap()])
    }

    fn remote() -> PeerDescriptor {
        PeerDescriptor::new("beta@127.0.0.2:7946", vec!["127.0.0.2:7946".parse().unwrap()])
    }

    fn membership(
        backend: &ScriptedRendezvous,
        recorder: &Recorder,
    ) -> Membership<ScriptedRendezvous, StaticIdentity, Recorder> {
        let config = MembershipOptions {
            heartbeat_interval_ms: Some(100),
            ..MembershipOptions::with_endpoint("scripted")
        }
        .build()
        .unwrap();
        Membership::new(
            config,
            backend.clone(),
            StaticIdentity::new(local()),
            recorder.clone(),
        )
    }

    async fn settle<R: Rendezvous, I: LocalIdentity, C: PeerConnector>(
        membership: &mut Membership<R, I, C>,
    ) {
        while membership.attempts.join_next().await.is_some() {}
        while membership.announcements.join_next().await.is_some() {}
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_stays_disconnected() {
        let backend = ScriptedRendezvous::failing();
        let recorder = Recorder::default();
        let mut membership = membership(&backend, &recorder);

        assert!(membership.connect().await.is_err());
        assert_eq!(membership.state(), MembershipState::Disconnected);
        assert!(membership.timer.is_none());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(membership.ticks.try_recv().is_err());
        assert!(backend.published().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_arms_immediate_heartbeat() {
        let backend = ScriptedRendezvous::new();
        let recorder = Recorder::default();
        let mut membership = membership(&backend, &recorder);

        membership.connect().await.unwrap();
        assert_eq!(membership.state(), MembershipState::Listening);
        assert_eq!(*membership.subscribe_state().borrow(), MembershipState::Listening);

        let tick = membership.ticks.recv().await.unwrap();
        assert_eq!(Some(tick.id()), membership.timer.as_ref().map(TimerHandle::id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_publishes_once_per_channel() {
        let backend = ScriptedRendezvous::new();
        let recorder = Recorder::default();
        let mut membership = membership(&backend, &recorder);
        membership.connect().await.unwrap();

        let tick = membership.ticks.recv().await.unwrap();
        membership.on_heartbeat(tick);
        settle(&mut membership).await;

        let names = backend.published_on("cluster");
        let descriptors = backend.published_on("cluster_partisan");
        assert_eq!(names, vec!["alpha@127.0.0.1:7946".to_owned()]);
        assert_eq!(descriptors.len(), 1);
        assert_eq!(muster_codec::decode(&descriptors[0]).unwrap(), local());
        assert_eq!(backend.published().len(), 2);

        // Next heartbeat is armed after the configured interval.
        let next = membership.timer.as_ref().unwrap();
        assert_ne!(next.id(), tick.id());
        assert!(next.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stray_heartbeat_is_ignored() {
        let backend = ScriptedRendezvous::new();
        let recorder = Recorder::default();
        let mut membership = membership(&backend, &recorder);
        membership.connect().await.unwrap();

        let tick = membership.ticks.recv().await.unwrap();
        membership.on_heartbeat(tick);
        settle(&mut membership).await;
        // Same tick delivered again.
        membership.on_heartbeat(tick);
        settle(&mut membership).await;

        assert_eq!(backend.published().len(), 2);
        assert!(membership.timer.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rescheduling_leaves_one_timer() {
        let backend = ScriptedRendezvous::new();
        let recorder = Recorder::default();
        let mut membership = membership(&backend, &recorder);

        membership.schedule_heartbeat(Duration::from_millis(50));
        membership.schedule_heartbeat(Duration::from_millis(50));
        membership.schedule_heartbeat(Duration::from_millis(50));

        let tick = membership.ticks.recv().await.unwrap();
        assert_eq!(Some(tick.id()), membership.timer.as_ref().map(TimerHandle::id));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(membership.ticks.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_failure_keeps_listening() {
        let backend = ScriptedRendezvous::new();
        let recorder = Recorder::default();
        let mut membership = membership(&backend, &recorder);
        membership.connect().await.unwrap();
        backend.set_fail_publish(true);

        let tick = membership.ticks.recv().await.unwrap();
        membership.on_heartbeat(tick);
        settle(&mut membership).await;

        assert_eq!(membership.state(), MembershipState::Listening);
        assert!(membership.timer.is_some());
        assert!(backend.published().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_announcement_is_bounded_and_not_doubled() {
        let backend = ScriptedRendezvous::new();
        let recorder = Recorder::default();
        let mut membership = membership(&backend, &recorder);
        membership.connect().await.unwrap();
        backend.set_stall_publish(true);

        let tick = membership.ticks.recv().await.unwrap();
        membership.on_heartbeat(tick);
        assert!(membership.timer.is_some());
        assert_eq!(membership.announcements.len(), 1);

        // Next tick arrives while the first announcement is still stalled.
        let tick = membership.ticks.recv().await.unwrap();
        membership.on_heartbeat(tick);
        assert_eq!(membership.announcements.len(), 1);
        assert!(membership.timer.is_some());

        // Each of the two publishes gives up after the publish timeout.
        let started = tokio::time::Instant::now();
        settle(&mut membership).await;
        assert!(started.elapsed() < membership.config.publish_timeout() * 2);
        assert_eq!(backend.stalled_publishes(), 2);
        assert_eq!(membership.state(), MembershipState::Listening);
    }

    #[tokio::test]
    async fn test_own_announcements_are_skipped() {
        let backend = ScriptedRendezvous::new();
        let recorder = Recorder::default();
        let mut membership = membership(&backend, &recorder);

        membership.on_notification(Notification::new("cluster", "alpha@127.0.0.1:7946"));
        let own = muster_codec::encode(&local()).unwrap();
        membership.on_notification(Notification::new("cluster_partisan", own));
        settle(&mut membership).await;

        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_name_announcement_connects() {
        let backend = ScriptedRendezvous::new();
        let recorder = Recorder::default();
        let mut membership = membership(&backend, &recorder);

        membership.on_notification(Notification::new("cluster", "nodeB"));
        settle(&mut membership).await;

        assert_eq!(recorder.calls(), vec![Discovered::Name("nodeB".to_owned())]);
    }

    #[tokio::test]
    async fn test_descriptor_announcement_joins() {
        let backend = ScriptedRendezvous::new();
        let recorder = Recorder::default();
        let mut membership = membership(&backend, &recorder);

        let payload = muster_codec::encode(&remote()).unwrap();
        membership.on_notification(Notification::new("cluster_partisan", payload));
        settle(&mut membership).await;

        // A failed join is an expected outcome, not an error of the service.
        assert_eq!(recorder.calls(), vec![Discovered::Descriptor(remote())]);
    }

    #[tokio::test]
    async fn test_known_descriptor_is_skipped() {
        let backend = ScriptedRendezvous::new();
        let recorder = Recorder::default();
        recorder.known.lock().insert(remote());
        let mut membership = membership(&backend, &recorder);

        let payload = muster_codec::encode(&remote()).unwrap();
        membership.on_notification(Notification::new("cluster_partisan", payload));
        settle(&mut membership).await;

        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_and_unexpected_are_dropped() {
        let backend = ScriptedRendezvous::new();
        let recorder = Recorder::default();
        let mut membership = membership(&backend, &recorder);

        membership.on_notification(Notification::new("cluster_partisan", "%%%"));
        membership.on_notification(Notification::new("cluster_partisan", "AAAA"));
        membership.on_notification(Notification::new("cluster", ""));
        membership.on_notification(Notification::new("elsewhere", "nodeB"));
        settle(&mut membership).await;

        assert!(recorder.calls().is_empty());
        assert_eq!(membership.state(), MembershipState::Disconnected);
    }
}
