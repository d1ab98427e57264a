use crate::crypto::NodeId;
use crate::messages::{GetNodeReply, MessageId, MessageType, RoutingType};
use crate::network::{
    Client, Connection, DisconnectReason, PeerStream, RemoteMessage, ReplyRegistry, ReplySlot,
    Server,
};
use crate::node::{
    join_host_port, split_host_port, Middleware, MiddlewareStore, NodeConfig, NodeError,
    NodeRecord,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// The node running in this process.
///
/// Owns the lifecycle hooks, the delivery queue of every subscribed routing
/// type, the reply slots of outstanding requests and the table of live
/// connections.
pub struct LocalNode {
    id: NodeId,
    config: NodeConfig,
    record: RwLock<NodeRecord>,
    middleware: MiddlewareStore,
    replies: Arc<ReplyRegistry>,
    rx_msg_chans: RwLock<HashMap<RoutingType, mpsc::Sender<RemoteMessage>>>,
    // Application subscriber for Data messages on the direct routing type
    direct_subscriber: RwLock<Option<mpsc::Sender<RemoteMessage>>>,
    direct_receiver: Mutex<Option<mpsc::Receiver<RemoteMessage>>>,
    connections: Mutex<HashMap<Uuid, Arc<Connection>>>,
    local_addr: RwLock<Option<SocketAddr>>,
    started: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl LocalNode {
    pub fn new(id: NodeId, config: NodeConfig) -> Result<Arc<Self>, NodeError> {
        config.validate().map_err(NodeError::InvalidConfig)?;

        let (direct_sender, direct_receiver) = mpsc::channel(config.local_msg_chan_len);
        let mut rx_msg_chans = HashMap::new();
        rx_msg_chans.insert(RoutingType::Direct, direct_sender);

        let (shutdown, _) = watch::channel(false);
        let record = NodeRecord::new(id.clone(), String::new());

        Ok(Arc::new(Self {
            id,
            config,
            record: RwLock::new(record),
            middleware: MiddlewareStore::new(),
            replies: ReplyRegistry::new(),
            rx_msg_chans: RwLock::new(rx_msg_chans),
            direct_subscriber: RwLock::new(None),
            direct_receiver: Mutex::new(Some(direct_receiver)),
            connections: Mutex::new(HashMap::new()),
            local_addr: RwLock::new(None),
            started: AtomicBool::new(false),
            shutdown,
        }))
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn middleware(&self) -> &MiddlewareStore {
        &self.middleware
    }

    /// Register a lifecycle hook
    pub fn apply_middleware(&self, middleware: Middleware) {
        self.middleware.apply(middleware);
    }

    /// The record this node hands to peers asking for it
    pub fn record(&self) -> NodeRecord {
        self.record.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Attach application metadata to the local record
    pub fn set_record_data(&self, data: Vec<u8>) {
        self.record.write().unwrap_or_else(PoisonError::into_inner).data = data;
    }

    /// Address the listener is bound to, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn connections_table(&self) -> MutexGuard<'_, HashMap<Uuid, Arc<Connection>>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Receive every message of `routing_type` that is not a reply.
    ///
    /// For the direct routing type only Data messages are delivered; Ping and
    /// GetNode are answered by the node itself.
    pub fn subscribe(
        &self,
        routing_type: RoutingType,
    ) -> Result<mpsc::Receiver<RemoteMessage>, NodeError> {
        let (sender, receiver) = mpsc::channel(self.config.local_msg_chan_len);

        if routing_type == RoutingType::Direct {
            let mut subscriber = self
                .direct_subscriber
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if subscriber.is_some() {
                return Err(NodeError::AlreadySubscribed(routing_type));
            }
            *subscriber = Some(sender);
        } else {
            let mut chans = self.rx_msg_chans.write().unwrap_or_else(PoisonError::into_inner);
            if chans.contains_key(&routing_type) {
                return Err(NodeError::AlreadySubscribed(routing_type));
            }
            chans.insert(routing_type, sender);
        }

        debug!(routing_type = %routing_type, "Routing type subscribed");
        Ok(receiver)
    }

    /// Delivery queue for inbound messages of `routing_type`
    pub fn rx_msg_sender(
        &self,
        routing_type: RoutingType,
    ) -> Result<mpsc::Sender<RemoteMessage>, NodeError> {
        self.rx_msg_chans
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&routing_type)
            .cloned()
            .ok_or(NodeError::UnknownRoutingType(routing_type))
    }

    /// Register a one-shot slot for the reply to `message_id`
    pub fn alloc_reply_slot(&self, message_id: MessageId) -> Result<ReplySlot, NodeError> {
        self.replies.alloc(message_id)
    }

    /// Hand a reply to the request waiting for it; false if none is
    pub fn deliver_reply(&self, reply_to: MessageId, message: RemoteMessage) -> bool {
        self.replies.deliver(reply_to, message)
    }

    /// Number of requests still waiting for a reply
    pub fn pending_replies(&self) -> usize {
        self.replies.pending()
    }

    /// Run the start hooks, bind the listener and begin handling messages.
    ///
    /// A failed bind leaves the node unstarted so `start` may be retried.
    #[instrument(skip(self), fields(node = %self.id.short()))]
    pub async fn start(self: &Arc<Self>) -> Result<SocketAddr, NodeError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(NodeError::AlreadyStarted);
        }

        self.middleware.run_local_node_will_start(self);

        let (listener, local_addr) = match self.bind().await {
            Ok(bound) => bound,
            Err(e) => {
                warn!(addr = %self.config.bind_addr, error = %e, "Failed to bind listener");
                self.started.store(false, Ordering::Release);
                return Err(e);
            }
        };

        *self.local_addr.write().unwrap_or_else(PoisonError::into_inner) = Some(local_addr);
        self.record.write().unwrap_or_else(PoisonError::into_inner).addr =
            join_host_port(&self.config.advertise_host, &local_addr.port().to_string());

        let server = Server::new(listener, Arc::clone(self));
        tokio::spawn(server.run(self.shutdown.subscribe()));

        let direct_receiver = self
            .direct_receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(receiver) = direct_receiver {
            tokio::spawn(Arc::clone(self).handle_direct(receiver));
        }

        info!(record = %self.record(), "Local node started");
        self.middleware.run_local_node_started(self);

        Ok(local_addr)
    }

    async fn bind(&self) -> Result<(TcpListener, SocketAddr), NodeError> {
        let bind_error = |source| NodeError::Bind {
            addr: self.config.bind_addr.clone(),
            source,
        };
        let listener = TcpListener::bind(&self.config.bind_addr)
            .await
            .map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;
        Ok((listener, local_addr))
    }

    /// Dial `addr` and start a connection over the new stream
    #[instrument(skip(self), fields(node = %self.id.short()))]
    pub async fn connect(self: &Arc<Self>, addr: &str) -> Result<Arc<Connection>, NodeError> {
        split_host_port(addr)?;
        let (stream, peer_addr) = Client::default().connect(addr).await?;
        Ok(self.add_connection(Box::new(stream), Some(peer_addr), true))
    }

    /// Take ownership of an established stream: run the connected hooks and
    /// start the connection unless a hook stopped it
    pub fn add_connection(
        self: &Arc<Self>,
        stream: Box<dyn PeerStream>,
        peer_addr: Option<SocketAddr>,
        is_outbound: bool,
    ) -> Arc<Connection> {
        let connection = Connection::new(Arc::clone(self), stream, peer_addr, is_outbound);
        self.connections_table()
            .insert(connection.session_id(), Arc::clone(&connection));

        debug!(
            session_id = %connection.session_id(),
            outbound = is_outbound,
            "Connection established"
        );

        self.middleware.run_remote_node_connected(&connection);
        connection.start();
        connection
    }

    pub(crate) fn remove_connection(&self, session_id: Uuid) {
        self.connections_table().remove(&session_id);
    }

    /// Snapshot of the live connections
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.connections_table().values().cloned().collect()
    }

    pub fn connection(&self, session_id: Uuid) -> Option<Arc<Connection>> {
        self.connections_table().get(&session_id).cloned()
    }

    /// Stop listening and close every connection
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
        for connection in self.connections() {
            connection.stop(DisconnectReason::Requested);
        }
        info!(node = %self.id.short(), "Local node stopped");
    }

    async fn handle_direct(self: Arc<Self>, mut receiver: mpsc::Receiver<RemoteMessage>) {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            if *shutdown.borrow_and_update() {
                return;
            }
            tokio::select! {
                message = receiver.recv() => match message {
                    Some(message) => self.handle_direct_message(message),
                    None => return,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }

    fn handle_direct_message(&self, message: RemoteMessage) {
        let RemoteMessage { connection, envelope } = message;

        let reply = match envelope.message_type {
            MessageType::Ping => envelope.reply(Vec::new()),
            MessageType::GetNode => {
                let body = GetNodeReply { node: self.record() };
                match bincode::serialize(&body) {
                    Ok(payload) => envelope.reply(payload),
                    Err(e) => {
                        error!(error = %e, "Failed to serialize GetNode reply");
                        return;
                    }
                }
            }
            MessageType::Data => {
                let subscriber = self
                    .direct_subscriber
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                match subscriber {
                    Some(sender) => {
                        if sender.try_send(RemoteMessage { connection, envelope }).is_err() {
                            warn!("Direct msg queue full or closed, discarding message");
                        }
                    }
                    None => debug!("No direct subscriber, discarding data message"),
                }
                return;
            }
        };

        if let Err(e) = connection.send_message_async(reply) {
            warn!(
                session_id = %connection.session_id(),
                message_type = envelope.message_type.as_str(),
                error = %e,
                "Failed to send reply"
            );
        }
    }
}

impl std::fmt::Debug for LocalNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalNode")
            .field("id", &self.id)
            .field("local_addr", &self.local_addr())
            .finish()
    }
}
