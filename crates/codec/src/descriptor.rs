//! Peer descriptor.

use core::fmt;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Identity of a node under the descriptor-based scheme.
///
/// Opaque to the membership protocol beyond equality: it is announced,
/// compared against the local descriptor and handed to the connector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerDescriptor {
    /// Node name, the same value announced under the name-based scheme.
    pub name: String,
    /// Addresses the node accepts peer links on, in preference order.
    pub listen_addrs: Vec<SocketAddr>,
}

impl PeerDescriptor {
    /// Create a descriptor for `name` listening on `listen_addrs`.
    pub fn new(name: impl Into<String>, listen_addrs: Vec<SocketAddr>) -> Self {
        Self {
            name: name.into(),
            listen_addrs,
        }
    }

    /// Get the node name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the listen addresses.
    pub fn listen_addrs(&self) -> &[SocketAddr] {
        &self.listen_addrs
    }
}

impl fmt::Display for PeerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        let mut addrs = self.listen_addrs.iter();
        if let Some(first) = addrs.next() {
            write!(f, " [{first}")?;
            for addr in addrs {
                write!(f, ", {addr}")?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_addresses() {
        let descriptor = PeerDescriptor::new(
            "alpha@10.0.0.1:7946",
            vec![
                "10.0.0.1:7946".parse().unwrap(),
                "[::1]:7946".parse().unwrap(),
            ],
        );
        assert_eq!(
            descriptor.to_string(),
            "alpha@10.0.0.1:7946 [10.0.0.1:7946, [::1]:7946]"
        );
    }

    #[test]
    fn test_display_without_addresses() {
        let descriptor = PeerDescriptor::new("alpha", vec![]);
        assert_eq!(descriptor.to_string(), "alpha");
    }
}
