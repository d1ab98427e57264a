//! Correlation of inbound replies with the requests waiting for them.
//!
//! A sender that expects a reply allocates a [`ReplySlot`] keyed by the
//! request's message id. The dispatch loop hands any envelope carrying
//! `reply_to` to [`ReplyRegistry::deliver`], which fulfils and removes the
//! matching slot. Dropping a slot releases its entry, so an abandoned or
//! timed-out wait never leaves a stale entry behind.

use crate::messages::MessageId;
use crate::network::RemoteMessage;
use crate::node::NodeError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::trace;

struct PendingReply {
    generation: u64,
    sender: oneshot::Sender<RemoteMessage>,
}

/// Outstanding reply slots of one local node
#[derive(Default)]
pub struct ReplyRegistry {
    slots: Mutex<HashMap<MessageId, PendingReply>>,
    next_generation: AtomicU64,
}

impl ReplyRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<MessageId, PendingReply>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a one-shot delivery slot for `message_id`.
    ///
    /// Fails if a slot for the same id is still outstanding.
    pub fn alloc(self: &Arc<Self>, message_id: MessageId) -> Result<ReplySlot, NodeError> {
        let mut slots = self.slots();
        if slots.contains_key(&message_id) {
            return Err(NodeError::DuplicateReplySlot(message_id));
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        slots.insert(message_id, PendingReply { generation, sender });
        trace!(message_id = %message_id, "Reply slot allocated");

        Ok(ReplySlot {
            message_id,
            generation,
            receiver,
            registry: Arc::clone(self),
        })
    }

    /// Hand a reply to the slot waiting for it.
    ///
    /// Returns false if nobody is waiting for `reply_to`.
    pub fn deliver(&self, reply_to: MessageId, message: RemoteMessage) -> bool {
        let pending = self.slots().remove(&reply_to);
        match pending {
            Some(pending) => pending.sender.send(message).is_ok(),
            None => false,
        }
    }

    /// Number of slots still waiting for a reply
    pub fn pending(&self) -> usize {
        self.slots().len()
    }

    fn release(&self, message_id: MessageId, generation: u64) {
        let mut slots = self.slots();
        if slots
            .get(&message_id)
            .is_some_and(|pending| pending.generation == generation)
        {
            slots.remove(&message_id);
            trace!(message_id = %message_id, "Reply slot released");
        }
    }
}

/// Receiving end of an allocated reply slot; releases the slot on drop
pub struct ReplySlot {
    message_id: MessageId,
    generation: u64,
    receiver: oneshot::Receiver<RemoteMessage>,
    registry: Arc<ReplyRegistry>,
}

impl ReplySlot {
    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    /// Wait for the reply. Returns None if the slot was dropped by the registry.
    pub async fn recv(&mut self) -> Option<RemoteMessage> {
        (&mut self.receiver).await.ok()
    }
}

impl Drop for ReplySlot {
    fn drop(&mut self) {
        self.registry.release(self.message_id, self.generation);
    }
}

impl std::fmt::Debug for ReplySlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplySlot")
            .field("message_id", &self.message_id)
            .finish()
    }
}
