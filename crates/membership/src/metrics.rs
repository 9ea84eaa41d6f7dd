//! Membership metrics.

use metrics::Counter;

use crate::policy::Scheme;

/// Which channel a notification arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum ChannelKind {
    Primary,
    Secondary,
    Unknown,
}

/// Membership counters.
#[derive(Clone, Debug)]
pub(crate) struct MembershipMetrics {
    /// Heartbeat cycles completed
    heartbeats_total: Counter,
    /// Publishes that failed
    publish_failures_total: Counter,
    /// Secondary-channel payloads that failed to decode
    decode_failures_total: Counter,
}

impl Default for MembershipMetrics {
    fn default() -> Self {
        Self {
            heartbeats_total: metrics::counter!("membership.heartbeats_total"),
            publish_failures_total: metrics::counter!("membership.publish_failures_total"),
            decode_failures_total: metrics::counter!("membership.decode_failures_total"),
        }
    }
}

impl MembershipMetrics {
    pub(crate) fn inc_heartbeats(&self) {
        self.heartbeats_total.increment(1);
    }

    pub(crate) fn inc_publish_failures(&self) {
        self.publish_failures_total.increment(1);
    }

    pub(crate) fn inc_decode_failures(&self) {
        self.decode_failures_total.increment(1);
    }

    pub(crate) fn record_notification(&self, kind: ChannelKind) {
        let kind: &'static str = kind.into();
        metrics::counter!("membership.notifications_total", "channel" => kind).increment(1);
    }

    pub(crate) fn record_attempt(&self, scheme: Scheme, success: bool) {
        let scheme: &'static str = scheme.into();
        let outcome = if success { "success" } else { "failure" };
        metrics::counter!(
            "membership.connect_attempts_total",
            "scheme" => scheme,
            "outcome" => outcome
        )
        .increment(1);
    }
}
