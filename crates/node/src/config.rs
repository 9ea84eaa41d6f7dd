//! Figment-based configuration loading.
//!
//! Configuration priority (highest wins):
//! 1. CLI arguments (applied after Figment load)
//! 2. Config file (TOML)
//! 3. Environment variables (`MUSTER_` prefix, `__` between section and key)
//! 4. Defaults

use std::{net::SocketAddr, path::Path, time::Duration};

use eyre::{Result, WrapErr, bail};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use muster_codec::PeerDescriptor;
use muster_membership::MembershipOptions;
use muster_rendezvous::pg::DEFAULT_CONNECT_TIMEOUT;
use serde::{Deserialize, Serialize};

use crate::cli::RunArgs;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "MUSTER_";

/// Listen address used when none is configured.
pub const DEFAULT_LISTEN_ADDR: SocketAddr =
    SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST), 7946);

/// Label of generated node names.
pub const DEFAULT_NAME_LABEL: &str = "muster";

/// Complete node configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Local node identity.
    pub node: NodeSection,

    /// Membership protocol options.
    pub membership: MembershipOptions,

    /// Rendezvous backend tuning.
    pub rendezvous: RendezvousSection,

    /// Legacy transport settings, read only to migrate older configurations.
    pub transport: TransportSection,

    /// Metrics exporter.
    pub metrics: MetricsSection,
}

/// `[node]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Announced name, `label@host:port`. Generated from the first listen
    /// address when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Addresses accepting peer links.
    pub listen_addrs: Vec<SocketAddr>,
}

/// `[rendezvous]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendezvousSection {
    /// Timeout for opening each backend connection, in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for RendezvousSection {
    fn default() -> Self {
        Self {
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
        }
    }
}

impl RendezvousSection {
    /// Connect timeout as a duration. Zero is rejected.
    pub fn connect_timeout(&self) -> Result<Duration> {
        if self.connect_timeout_ms == 0 {
            bail!("rendezvous.connect_timeout_ms must be greater than zero");
        }
        Ok(Duration::from_millis(self.connect_timeout_ms))
    }
}

/// `[transport]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSection {
    /// Channel the peer transport used before it moved to the membership
    /// secondary channel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

/// `[metrics]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSection {
    /// Prometheus listen address. Metrics are not exported when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addr: Option<SocketAddr>,
}

impl NodeConfig {
    /// Load configuration from defaults, environment, and config file.
    /// CLI overrides should be applied separately after loading.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(NodeConfig::default()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        if let Some(path) = config_path {
            if !path.exists() {
                bail!("config file not found: {}", path.display());
            }
            figment = figment.merge(Toml::file(path));
        }

        figment.extract().wrap_err("failed to load configuration")
    }

    /// Apply CLI overrides. Only arguments actually given replace loaded
    /// values.
    pub fn apply_args(mut self, args: &RunArgs) -> Self {
        if let Some(name) = &args.node.name {
            self.node.name = Some(name.clone());
        }
        if !args.node.listen_addrs.is_empty() {
            self.node.listen_addrs = args.node.listen_addrs.clone();
        }

        let membership = &args.membership;
        if let Some(endpoint) = &membership.endpoint {
            self.membership.endpoint = Some(endpoint.clone());
        }
        if let Some(interval) = membership.heartbeat_interval_ms {
            self.membership.heartbeat_interval_ms = Some(interval);
        }
        if let Some(timeout) = membership.publish_timeout_ms {
            self.membership.publish_timeout_ms = Some(timeout);
        }
        if let Some(channel) = &membership.primary_channel {
            self.membership.primary_channel = Some(channel.clone());
        }
        if let Some(channel) = &membership.secondary_channel {
            self.membership.secondary_channel = Some(channel.clone());
        }

        if let Some(timeout) = args.rendezvous.connect_timeout_ms {
            self.rendezvous.connect_timeout_ms = timeout;
        }
        if let Some(addr) = args.metrics.addr {
            self.metrics.addr = Some(addr);
        }
        self
    }

    /// Membership options with the secondary channel migrated from the
    /// legacy transport setting.
    pub fn membership_options(&self) -> MembershipOptions {
        self.membership
            .clone()
            .migrate(|| self.transport.channel.clone())
    }

    /// Listen addresses, falling back to [`DEFAULT_LISTEN_ADDR`].
    pub fn listen_addrs(&self) -> Vec<SocketAddr> {
        if self.node.listen_addrs.is_empty() {
            vec![DEFAULT_LISTEN_ADDR]
        } else {
            self.node.listen_addrs.clone()
        }
    }

    /// The local peer descriptor.
    pub fn descriptor(&self) -> Result<PeerDescriptor> {
        let listen_addrs = self.listen_addrs();
        let name = match &self.node.name {
            Some(name) if name.trim().is_empty() => bail!("node name must not be empty"),
            Some(name) => name.clone(),
            None => match listen_addrs.first() {
                Some(addr) => format!("{DEFAULT_NAME_LABEL}@{addr}"),
                None => bail!("no listen address to derive a node name from"),
            },
        };
        Ok(PeerDescriptor::new(name, listen_addrs))
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).wrap_err("failed to render configuration")
    }
}
