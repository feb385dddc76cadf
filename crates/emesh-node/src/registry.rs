//! Transport lookup by node identity.

use crate::transport::Transport;
use emesh_core::NodeId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps node identities to the transport used to reach them.
///
/// Identities without a dedicated route share the default transport, which
/// for a UDP node is its own socket.
pub struct PeerRegistry {
    default: Arc<dyn Transport>,
    routes: RwLock<HashMap<NodeId, Arc<dyn Transport>>>,
}

impl PeerRegistry {
    pub fn new(default: Arc<dyn Transport>) -> Self {
        Self {
            default,
            routes: RwLock::new(HashMap::new()),
        }
    }

    /// Route traffic for `id` through `transport`.
    pub fn register(&self, id: NodeId, transport: Arc<dyn Transport>) {
        self.routes.write().insert(id, transport);
    }

    pub fn unregister(&self, id: &NodeId) -> bool {
        self.routes.write().remove(id).is_some()
    }

    /// Dedicated transport for `id`, if one was registered.
    pub fn lookup(&self, id: &NodeId) -> Option<Arc<dyn Transport>> {
        self.routes.read().get(id).cloned()
    }

    /// Transport for a peer whose identity may not be known yet, falling
    /// back to the default.
    pub fn route_for(&self, id: Option<&NodeId>) -> Arc<dyn Transport> {
        id.and_then(|id| self.lookup(id))
            .unwrap_or_else(|| Arc::clone(&self.default))
    }

    pub fn default_transport(&self) -> &Arc<dyn Transport> {
        &self.default
    }
}

impl std::fmt::Debug for PeerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerRegistry")
            .field("default", &self.default.local_addr())
            .field("routes", &self.routes.read().len())
            .finish()
    }
}
