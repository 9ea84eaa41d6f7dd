//! Cluster membership discovery over rendezvous channels.
//!
//! Every node periodically announces itself on two pub/sub channels and
//! connects to whoever else announces there:
//!
//! - the primary channel carries the plain node name (name-based scheme)
//! - the secondary channel carries the encoded [`PeerDescriptor`]
//!   (descriptor-based scheme)
//!
//! # Components
//!
//! - [`Membership`]: the state machine (`Disconnected` → `Connecting` →
//!   `Listening`) driving heartbeats and notification dispatch
//! - [`HeartbeatScheduler`]: one-shot heartbeat timers
//! - [`ConnectPolicy`]: skips self, invokes the host's [`PeerConnector`]
//! - [`MembershipOptions`]: caller options, including the one-time
//!   migration of configurations that predate the secondary channel
//!
//! [`PeerDescriptor`]: muster_codec::PeerDescriptor

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod config;
pub mod heartbeat;
pub mod identity;
pub mod policy;

mod error;
mod metrics;
mod service;

pub use config::{MembershipConfig, MembershipOptions};
pub use error::{ConfigError, MembershipError};
pub use heartbeat::{HeartbeatScheduler, HeartbeatTick, TimerHandle};
pub use identity::{LocalIdentity, StaticIdentity};
pub use policy::{ConnectPolicy, Discovered, PeerConnectError, PeerConnector, Scheme};
pub use service::{Membership, MembershipState};
