//! Connect-on-discovery policy.

use core::fmt;

use async_trait::async_trait;
use muster_codec::PeerDescriptor;
use tracing::{debug, info};

use crate::metrics::MembershipMetrics;

/// Addressing scheme a peer was discovered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Scheme {
    /// Plain node name on the primary channel.
    Name,
    /// Encoded peer descriptor on the secondary channel.
    Descriptor,
}

/// A peer discovered on a rendezvous channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovered {
    /// Announced by node name.
    Name(String),
    /// Announced by peer descriptor.
    Descriptor(PeerDescriptor),
}

impl Discovered {
    /// Scheme this peer was discovered under.
    pub fn scheme(&self) -> Scheme {
        match self {
            Self::Name(_) => Scheme::Name,
            Self::Descriptor(_) => Scheme::Descriptor,
        }
    }
}

impl fmt::Display for Discovered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Descriptor(descriptor) => fmt::Display::fmt(descriptor, f),
        }
    }
}

/// A connection attempt to a peer failed.
///
/// Expected during normal operation: the peer may be starting, stopping or
/// unreachable from here.
#[derive(Debug, thiserror::Error)]
#[error("{reason}")]
pub struct PeerConnectError {
    reason: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl PeerConnectError {
    /// Create an error with a reason and no underlying cause.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            source: None,
        }
    }

    /// Create an error with a reason and an underlying cause.
    pub fn with_source(
        reason: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Connect capability supplied by the host's process group layer.
#[async_trait]
pub trait PeerConnector: Send + Sync + 'static {
    /// Establish a link to the node called `name`.
    async fn connect_by_name(&self, name: &str) -> Result<(), PeerConnectError>;

    /// Join the peer described by `descriptor`.
    async fn join_by_descriptor(&self, descriptor: &PeerDescriptor)
    -> Result<(), PeerConnectError>;

    /// Whether `descriptor` is already a member of the local peer group.
    fn is_known(&self, _descriptor: &PeerDescriptor) -> bool {
        false
    }
}

/// Decides how to reach a discovered peer and reports the outcome.
#[derive(Debug)]
pub struct ConnectPolicy<C> {
    connector: C,
    metrics: MembershipMetrics,
}

impl<C: PeerConnector> ConnectPolicy<C> {
    /// Create a policy over `connector`.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            metrics: MembershipMetrics::default(),
        }
    }

    /// Get the connector.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Whether a descriptor-scheme peer needs no attempt.
    pub fn is_known(&self, descriptor: &PeerDescriptor) -> bool {
        self.connector.is_known(descriptor)
    }

    /// Attempt to connect to `peer`. Returns whether the attempt succeeded.
    ///
    /// Failures are logged, never returned.
    pub async fn attempt(&self, peer: Discovered) -> bool {
        let scheme = peer.scheme();
        let result = match &peer {
            Discovered::Name(name) => self.connector.connect_by_name(name).await,
            Discovered::Descriptor(descriptor) => {
                self.connector.join_by_descriptor(descriptor).await
            }
        };

        match result {
            Ok(()) => {
                info!(%peer, %scheme, "connected to discovered peer");
                self.metrics.record_attempt(scheme, true);
                true
            }
            Err(error) => {
                debug!(%peer, %scheme, %error, "connect to discovered peer failed");
                self.metrics.record_attempt(scheme, false);
                false
            }
        }
    }
}
