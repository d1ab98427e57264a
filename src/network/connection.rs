use crate::messages::{Envelope, GetNodeReply};
use crate::network::reply::ReplySlot;
use crate::network::{ConnectionConfig, ConnectionError, DisconnectReason};
use crate::node::{resolve_declared_addr, LocalNode, NodeRecord};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Byte stream a connection can run over
pub trait PeerStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> PeerStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

const STATE_CREATED: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_STOPPED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Created,
    Running,
    Stopped,
}

/// An inbound envelope together with the connection it arrived on
#[derive(Clone)]
pub struct RemoteMessage {
    pub connection: Arc<Connection>,
    pub envelope: Envelope,
}

impl fmt::Debug for RemoteMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteMessage")
            .field("session_id", &self.connection.session_id())
            .field("envelope", &self.envelope)
            .finish()
    }
}

type Queues = (mpsc::Receiver<Envelope>, mpsc::Receiver<Envelope>);

// (rx, tx) loop tasks, each owning one half of the stream
type IoTasks = (JoinHandle<()>, JoinHandle<()>);

/// One link to a remote peer.
///
/// Created when a stream is accepted or dialed. [`Connection::start`] spawns
/// the receive, transmit and dispatch loops; [`Connection::stop`] tears
/// everything down. Both run their body at most once.
pub struct Connection {
    this: Weak<Connection>,
    session_id: Uuid,
    local: Arc<LocalNode>,
    is_outbound: bool,
    peer_addr: Option<SocketAddr>,
    pub(crate) config: ConnectionConfig,
    state: AtomicU8,
    disconnect_reason: OnceLock<DisconnectReason>,
    pub(crate) shutdown: watch::Sender<bool>,
    remote: watch::Sender<Option<NodeRecord>>,
    // Taken by start; dropped by stop if the connection never started
    stream: Mutex<Option<Box<dyn PeerStream>>>,
    // (inbound, outbound) receivers, taken by start
    queues: Mutex<Option<Queues>>,
    io_tasks: Mutex<Option<IoTasks>>,
    pub(crate) rx_sender: mpsc::Sender<Envelope>,
    tx_sender: mpsc::Sender<Envelope>,
}

impl Connection {
    pub fn new(
        local: Arc<LocalNode>,
        stream: Box<dyn PeerStream>,
        peer_addr: Option<SocketAddr>,
        is_outbound: bool,
    ) -> Arc<Self> {
        let config = local.config().connection.clone();
        let (rx_sender, rx_receiver) = mpsc::channel(config.rx_msg_chan_len);
        let (tx_sender, tx_receiver) = mpsc::channel(config.tx_msg_chan_len);
        let (shutdown, _) = watch::channel(false);
        let (remote, _) = watch::channel(None);

        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            session_id: Uuid::new_v4(),
            local,
            is_outbound,
            peer_addr,
            config,
            state: AtomicU8::new(STATE_CREATED),
            disconnect_reason: OnceLock::new(),
            shutdown,
            remote,
            stream: Mutex::new(Some(stream)),
            queues: Mutex::new(Some((rx_receiver, tx_receiver))),
            io_tasks: Mutex::new(None),
            rx_sender,
            tx_sender,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn is_outbound(&self) -> bool {
        self.is_outbound
    }

    /// Address observed on the socket, if the transport has one
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn local_node(&self) -> &Arc<LocalNode> {
        &self.local
    }

    /// The peer's record, None until it has described itself
    pub fn remote_node(&self) -> Option<NodeRecord> {
        self.remote.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        match self.state.load(Ordering::Acquire) {
            STATE_CREATED => ConnectionState::Created,
            STATE_RUNNING => ConnectionState::Running,
            _ => ConnectionState::Stopped,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_STOPPED
    }

    /// Why the connection stopped, once it has
    pub fn disconnect_reason(&self) -> Option<&DisconnectReason> {
        self.disconnect_reason.get()
    }

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the connection loops and resolve the remote node.
    ///
    /// Does nothing if the connection is already running or stopped.
    #[instrument(skip(self), fields(session_id = %self.session_id, outbound = self.is_outbound))]
    pub fn start(self: &Arc<Self>) {
        if self
            .state
            .compare_exchange(STATE_CREATED, STATE_RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Connection already started or stopped");
            return;
        }

        // Held until the loop handles are stored so stop() either sees them
        // or takes the stream itself
        let mut io_tasks = Self::lock(&self.io_tasks);

        let stream = Self::lock(&self.stream).take();
        let queues = Self::lock(&self.queues).take();
        let (Some(stream), Some((rx_receiver, tx_receiver))) = (stream, queues) else {
            return;
        };

        let (reader, writer) = tokio::io::split(stream);
        let rx_task = tokio::spawn(Arc::clone(self).rx_loop(reader));
        let tx_task = tokio::spawn(Arc::clone(self).tx_loop(writer, tx_receiver));
        *io_tasks = Some((rx_task, tx_task));
        drop(io_tasks);

        tokio::spawn(Arc::clone(self).dispatch_loop(rx_receiver));

        let connection = Arc::clone(self);
        tokio::spawn(async move { connection.resolve_remote().await });

        debug!("Connection started");
    }

    /// Stop the connection. Only the first call has any effect.
    ///
    /// The disconnect hooks run once the stream is closed. For a running
    /// connection that happens on a teardown task after both io loops have
    /// exited, so the hooks may fire after `stop` returns.
    #[instrument(skip(self), fields(session_id = %self.session_id))]
    pub fn stop(&self, reason: DisconnectReason) {
        if self.state.swap(STATE_STOPPED, Ordering::AcqRel) == STATE_STOPPED {
            return;
        }

        if reason.is_error() {
            warn!(remote = %self, reason = %reason, "Connection stops because of error");
        } else {
            info!(remote = %self, "Connection stops");
        }

        let _ = self.disconnect_reason.set(reason);
        self.shutdown.send_replace(true);

        let io_tasks = Self::lock(&self.io_tasks).take();
        drop(Self::lock(&self.stream).take());
        drop(Self::lock(&self.queues).take());

        self.local.remove_connection(self.session_id);

        let runtime = tokio::runtime::Handle::try_current().ok();
        match (io_tasks, self.this.upgrade(), runtime) {
            (Some((rx_task, tx_task)), Some(connection), Some(runtime)) => {
                runtime.spawn(connection.teardown(rx_task, tx_task));
            }
            _ => {
                self.local.middleware().run_remote_node_disconnected(self);
            }
        }
    }

    async fn teardown(self: Arc<Self>, rx_task: JoinHandle<()>, tx_task: JoinHandle<()>) {
        for task in [rx_task, tx_task] {
            if let Err(e) = task.await {
                warn!(session_id = %self.session_id, error = %e, "Connection io task failed");
            }
        }
        debug!(session_id = %self.session_id, "Connection stream closed");
        self.local.middleware().run_remote_node_disconnected(&self);
    }

    /// Wait until the remote node has described itself
    pub async fn wait_ready(&self) -> Result<NodeRecord, ConnectionError> {
        let mut remote = self.remote.subscribe();
        let mut shutdown = self.shutdown.subscribe();
        loop {
            let current = remote.borrow_and_update().clone();
            if let Some(record) = current {
                return Ok(record);
            }
            if self.is_stopped() {
                return Err(ConnectionError::Stopped);
            }
            tokio::select! {
                _ = remote.changed() => {}
                _ = wait_stopped(&mut shutdown) => {}
            }
        }
    }

    async fn resolve_remote(self: Arc<Self>) {
        let record = match self.get_node().await {
            Ok(record) => record,
            Err(e) => {
                self.stop(DisconnectReason::Resolution(format!("Get node error: {}", e)));
                return;
            }
        };

        let record = match resolve_declared_addr(record, self.peer_addr) {
            Ok(record) => record,
            Err(reason) => {
                self.stop(DisconnectReason::Resolution(reason));
                return;
            }
        };

        if self.is_stopped() {
            return;
        }

        info!(session_id = %self.session_id, remote = %record, "Remote node ready");
        self.remote.send_replace(Some(record));
        self.local.middleware().run_remote_node_ready(&self);
    }

    /// Queue an envelope for sending without waiting.
    ///
    /// With `expect_reply`, a reply slot keyed by the envelope's message id is
    /// registered and returned; it is released when dropped.
    pub fn send_message(
        &self,
        envelope: Envelope,
        expect_reply: bool,
    ) -> Result<Option<ReplySlot>, ConnectionError> {
        // Register before queueing so a fast reply cannot miss its slot
        let slot = if expect_reply {
            Some(self.local.alloc_reply_slot(envelope.message_id)?)
        } else {
            None
        };

        self.enqueue(envelope)?;
        Ok(slot)
    }

    /// Fire-and-forget send
    pub fn send_message_async(&self, envelope: Envelope) -> Result<(), ConnectionError> {
        self.enqueue(envelope)
    }

    /// Send and wait up to the reply timeout for the matching reply
    pub async fn send_message_sync(
        &self,
        envelope: Envelope,
    ) -> Result<RemoteMessage, ConnectionError> {
        let mut slot = self.local.alloc_reply_slot(envelope.message_id)?;
        self.enqueue(envelope)?;

        let timeout = self.config.reply_timeout;
        match tokio::time::timeout(timeout, slot.recv()).await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(ConnectionError::Stopped),
            Err(_) => Err(ConnectionError::ReplyTimeout { timeout }),
        }
    }

    fn enqueue(&self, envelope: Envelope) -> Result<(), ConnectionError> {
        if self.is_stopped() {
            return Err(ConnectionError::Stopped);
        }

        match self.tx_sender.try_send(envelope) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(envelope)) => {
                warn!(
                    session_id = %self.session_id,
                    message_id = %envelope.message_id,
                    "Tx msg queue full, discarding message"
                );
                Err(ConnectionError::TxQueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ConnectionError::Stopped),
        }
    }

    /// Send a Ping and wait for the reply
    pub async fn ping(&self) -> Result<(), ConnectionError> {
        self.send_message_sync(Envelope::new_ping()).await?;
        Ok(())
    }

    /// Ask the peer for its node record
    pub async fn get_node(&self) -> Result<NodeRecord, ConnectionError> {
        let reply = self.send_message_sync(Envelope::new_get_node()).await?;
        let body: GetNodeReply = bincode::deserialize(&reply.envelope.payload)
            .map_err(|e| ConnectionError::InvalidReply(e.to_string()))?;
        Ok(body.node)
    }

    /// Ping sent by the transmit loop when the link has been quiet
    pub(crate) fn keep_alive(&self) {
        if let Err(e) = self.send_message_async(Envelope::new_ping()) {
            debug!(session_id = %self.session_id, error = %e, "Keepalive ping not sent");
        }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.remote.borrow().as_ref() {
            Some(record) => write!(f, "{}", record),
            None => match self.peer_addr {
                Some(addr) => write!(f, "<unknown>@{}", addr),
                None => write!(f, "<unknown>#{}", self.session_id),
            },
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("session_id", &self.session_id)
            .field("is_outbound", &self.is_outbound)
            .field("peer_addr", &self.peer_addr)
            .field("state", &self.state())
            .finish()
    }
}

/// Resolves once the shutdown flag is set, including if it already was
pub(crate) async fn wait_stopped(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
