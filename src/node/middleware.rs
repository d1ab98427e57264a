//! Lifecycle hooks other subsystems attach to a local node.
//!
//! Each hook returns whether the following hooks of the same kind should run.
//! Returning `false` vetoes the rest of that dispatch only; other kinds and
//! later dispatches are unaffected.

use crate::network::Connection;
use crate::node::LocalNode;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, trace};

/// Called right before the local node starts listening. Can be used to add
/// data to the local node record, set up port mapping, etc.
pub type LocalNodeWillStart = Arc<dyn Fn(&LocalNode) -> bool + Send + Sync>;

/// Called right after the local node starts listening and handling messages.
pub type LocalNodeStarted = Arc<dyn Fn(&LocalNode) -> bool + Send + Sync>;

/// Called when a transport connection is established. The remote record is
/// not known yet, so this is only a good place to decide whether to keep the
/// connection.
pub type RemoteNodeConnected = Arc<dyn Fn(&Connection) -> bool + Send + Sync>;

/// Called once the remote node has described itself and is ready to use.
pub type RemoteNodeReady = Arc<dyn Fn(&Connection) -> bool + Send + Sync>;

/// Called after a connection has been torn down, whichever side closed it.
/// The cause is available through [`Connection::disconnect_reason`].
pub type RemoteNodeDisconnected = Arc<dyn Fn(&Connection) -> bool + Send + Sync>;

/// A hook together with the event it is bound to
#[derive(Clone)]
pub enum Middleware {
    LocalNodeWillStart(LocalNodeWillStart),
    LocalNodeStarted(LocalNodeStarted),
    RemoteNodeConnected(RemoteNodeConnected),
    RemoteNodeReady(RemoteNodeReady),
    RemoteNodeDisconnected(RemoteNodeDisconnected),
}

impl Middleware {
    pub fn local_node_will_start<F>(f: F) -> Self
    where
        F: Fn(&LocalNode) -> bool + Send + Sync + 'static,
    {
        Middleware::LocalNodeWillStart(Arc::new(f))
    }

    pub fn local_node_started<F>(f: F) -> Self
    where
        F: Fn(&LocalNode) -> bool + Send + Sync + 'static,
    {
        Middleware::LocalNodeStarted(Arc::new(f))
    }

    pub fn remote_node_connected<F>(f: F) -> Self
    where
        F: Fn(&Connection) -> bool + Send + Sync + 'static,
    {
        Middleware::RemoteNodeConnected(Arc::new(f))
    }

    pub fn remote_node_ready<F>(f: F) -> Self
    where
        F: Fn(&Connection) -> bool + Send + Sync + 'static,
    {
        Middleware::RemoteNodeReady(Arc::new(f))
    }

    pub fn remote_node_disconnected<F>(f: F) -> Self
    where
        F: Fn(&Connection) -> bool + Send + Sync + 'static,
    {
        Middleware::RemoteNodeDisconnected(Arc::new(f))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Middleware::LocalNodeWillStart(_) => "LocalNodeWillStart",
            Middleware::LocalNodeStarted(_) => "LocalNodeStarted",
            Middleware::RemoteNodeConnected(_) => "RemoteNodeConnected",
            Middleware::RemoteNodeReady(_) => "RemoteNodeReady",
            Middleware::RemoteNodeDisconnected(_) => "RemoteNodeDisconnected",
        }
    }
}

impl std::fmt::Debug for Middleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Middleware").field(&self.kind()).finish()
    }
}

#[derive(Default)]
struct Hooks {
    local_node_will_start: Vec<LocalNodeWillStart>,
    local_node_started: Vec<LocalNodeStarted>,
    remote_node_connected: Vec<RemoteNodeConnected>,
    remote_node_ready: Vec<RemoteNodeReady>,
    remote_node_disconnected: Vec<RemoteNodeDisconnected>,
}

/// Ordered hook lists, one per lifecycle event
#[derive(Default)]
pub struct MiddlewareStore {
    hooks: RwLock<Hooks>,
}

impl MiddlewareStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Hooks> {
        self.hooks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Hooks> {
        self.hooks.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a hook to the list of its event
    pub fn apply(&self, middleware: Middleware) {
        debug!(kind = middleware.kind(), "Applying middleware");
        let mut hooks = self.write();
        match middleware {
            Middleware::LocalNodeWillStart(f) => hooks.local_node_will_start.push(f),
            Middleware::LocalNodeStarted(f) => hooks.local_node_started.push(f),
            Middleware::RemoteNodeConnected(f) => hooks.remote_node_connected.push(f),
            Middleware::RemoteNodeReady(f) => hooks.remote_node_ready.push(f),
            Middleware::RemoteNodeDisconnected(f) => hooks.remote_node_disconnected.push(f),
        }
    }

    // Each run_* snapshots the list under the read lock and invokes the hooks
    // after releasing it, so a hook may itself apply middleware or stop a
    // connection. Returns false if a hook vetoed.

    pub fn run_local_node_will_start(&self, node: &LocalNode) -> bool {
        let hooks = self.read().local_node_will_start.clone();
        run_in_order("LocalNodeWillStart", &hooks, node)
    }

    pub fn run_local_node_started(&self, node: &LocalNode) -> bool {
        let hooks = self.read().local_node_started.clone();
        run_in_order("LocalNodeStarted", &hooks, node)
    }

    pub fn run_remote_node_connected(&self, connection: &Connection) -> bool {
        let hooks = self.read().remote_node_connected.clone();
        run_in_order("RemoteNodeConnected", &hooks, connection)
    }

    pub fn run_remote_node_ready(&self, connection: &Connection) -> bool {
        let hooks = self.read().remote_node_ready.clone();
        run_in_order("RemoteNodeReady", &hooks, connection)
    }

    pub fn run_remote_node_disconnected(&self, connection: &Connection) -> bool {
        let hooks = self.read().remote_node_disconnected.clone();
        run_in_order("RemoteNodeDisconnected", &hooks, connection)
    }
}

fn run_in_order<T: ?Sized>(
    kind: &'static str,
    hooks: &[Arc<dyn Fn(&T) -> bool + Send + Sync>],
    subject: &T,
) -> bool {
    for (index, hook) in hooks.iter().enumerate() {
        if !hook(subject) {
            trace!(kind, index, remaining = hooks.len() - index - 1, "Middleware vetoed");
            return false;
        }
    }
    true
}
