//! Membership configuration.
//!
//! [`MembershipOptions`] is what callers supply (every field optional, as
//! loaded from a config file or CLI). [`MembershipOptions::build`] validates
//! it and fills defaults, producing the immutable [`MembershipConfig`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Default interval between self-announcements.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 5_000;

/// Default bound on a single announcement publish.
pub const DEFAULT_PUBLISH_TIMEOUT_MS: u64 = 5_000;

/// Default channel for the name-based scheme.
pub const DEFAULT_PRIMARY_CHANNEL: &str = "cluster";

/// Default channel for the descriptor-based scheme.
pub const DEFAULT_SECONDARY_CHANNEL: &str = "cluster_partisan";

/// Caller-supplied membership options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MembershipOptions {
    /// Rendezvous backend endpoint. Required.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Interval between heartbeats in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval_ms: Option<u64>,

    /// Bound on each announcement publish in milliseconds. Must be non-zero.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_timeout_ms: Option<u64>,

    /// Channel for the name-based scheme.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_channel: Option<String>,

    /// Channel for the descriptor-based scheme.
    ///
    /// Absent in configurations written before the descriptor scheme existed;
    /// see [`MembershipOptions::migrate`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_channel: Option<String>,
}

impl MembershipOptions {
    /// Create options for `endpoint` with everything else defaulted.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            ..Self::default()
        }
    }

    /// Backfill a missing secondary channel from `source`.
    ///
    /// Runs once at startup, before [`build`](Self::build). `source` is only
    /// consulted when the secondary channel is absent; if it yields nothing
    /// the default applies at build time.
    pub fn migrate<F>(mut self, source: F) -> Self
    where
        F: FnOnce() -> Option<String>,
    {
        if self.secondary_channel.is_none() {
            self.secondary_channel = source().filter(|channel| !channel.is_empty());
        }
        self
    }

    /// Validate and apply defaults.
    pub fn build(self) -> Result<MembershipConfig, ConfigError> {
        let endpoint = self
            .endpoint
            .filter(|e| !e.trim().is_empty())
            .ok_or(ConfigError::MissingEndpoint)?;

        let primary_channel = self
            .primary_channel
            .unwrap_or_else(|| DEFAULT_PRIMARY_CHANNEL.to_owned());
        let secondary_channel = self
            .secondary_channel
            .unwrap_or_else(|| DEFAULT_SECONDARY_CHANNEL.to_owned());

        let publish_timeout = Duration::from_millis(
            self.publish_timeout_ms
                .unwrap_or(DEFAULT_PUBLISH_TIMEOUT_MS),
        );
        if publish_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout { which: "publish" });
        }

        if primary_channel.is_empty() {
            return Err(ConfigError::EmptyChannel { which: "primary" });
        }
        if secondary_channel.is_empty() {
            return Err(ConfigError::EmptyChannel { which: "secondary" });
        }
        if primary_channel == secondary_channel {
            return Err(ConfigError::SameChannel(primary_channel));
        }

        Ok(MembershipConfig {
            endpoint,
            heartbeat_interval: Duration::from_millis(
                self.heartbeat_interval_ms
                    .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_MS),
            ),
            publish_timeout,
            primary_channel,
            secondary_channel,
        })
    }
}

/// Validated membership configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipConfig {
    endpoint: String,
    heartbeat_interval: Duration,
    publish_timeout: Duration,
    primary_channel: String,
    secondary_channel: String,
}

impl MembershipConfig {
    /// Rendezvous backend endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Interval between heartbeats.
    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Bound on each announcement publish.
    pub fn publish_timeout(&self) -> Duration {
        self.publish_timeout
    }

    /// Channel for the name-based scheme.
    pub fn primary_channel(&self) -> &str {
        &self.primary_channel
    }

    /// Channel for the descriptor-based scheme.
    pub fn secondary_channel(&self) -> &str {
        &self.secondary_channel
    }

    /// Both channels, primary first.
    pub fn channels(&self) -> [String; 2] {
        [self.primary_channel.clone(), self.secondary_channel.clone()]
    }
}
