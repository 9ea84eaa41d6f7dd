//! Local node identity.

use muster_codec::PeerDescriptor;

/// Read accessor for the local node's identity.
///
/// Queried every time the identity is needed, never cached by the service,
/// so the host can change what it reports at runtime.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait LocalIdentity: Send + Sync {
    /// Name announced under the name-based scheme.
    fn node_name(&self) -> String;

    /// Descriptor announced under the descriptor-based scheme.
    fn descriptor(&self) -> PeerDescriptor;
}

/// Identity fixed at construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticIdentity {
    descriptor: PeerDescriptor,
}

impl StaticIdentity {
    /// Create an identity from its descriptor; the node name is the
    /// descriptor's name.
    pub fn new(descriptor: PeerDescriptor) -> Self {
        Self { descriptor }
    }
}

impl LocalIdentity for StaticIdentity {
    fn node_name(&self) -> String {
        self.descriptor.name.clone()
    }

    fn descriptor(&self) -> PeerDescriptor {
        self.descriptor.clone()
    }
}
