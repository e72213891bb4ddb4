//! Actors and lock groups
//!
//! An [`Actor`] is the addressable unit the bus delivers to. Its mutable state
//! lives in an [`ActorBehavior`] owned by the actor; the registry owns the
//! reference count.
//!
//! # Lock groups
//!
//! Every actor in one ownership tree (a call, its components and their
//! components) shares one [`LockGroup`]. The bus holds the group while a
//! handler runs, so all actors of a tree are serialized through it. Code must
//! never hold two different groups at once; actors of other trees are only
//! ever reached by sending them a message.

use crate::kind::ActorType;
use crate::message::Message;
use parking_lot::{Mutex, ReentrantMutex};
use rayo_types::jid::domain_of;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Lock shared by value among all actors of one ownership tree
pub type LockGroup = Arc<ReentrantMutex<()>>;

/// Stable slot key assigned by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub(crate) u64);

impl ActorId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor-{}", self.0)
    }
}

/// Per-actor message handling
pub trait ActorBehavior: Send + 'static {
    /// Handle one message. Runs on a bus worker with the tree lock held.
    fn receive(&mut self, actor: &Arc<Actor>, msg: Message);

    /// Runs exactly once, when the actor is finalized.
    fn cleanup(&mut self, _actor: &Actor) {}
}

/// Everything needed to register an actor except its behavior
#[derive(Debug, Clone)]
pub struct ActorSpec {
    pub(crate) actor_type: ActorType,
    pub(crate) id: Option<String>,
    pub(crate) address: Option<String>,
    pub(crate) parent: Option<Arc<Actor>>,
}

impl ActorSpec {
    pub fn new(actor_type: ActorType) -> Self {
        Self {
            actor_type,
            id: None,
            address: None,
            parent: None,
        }
    }

    /// Internal id used for engine event correlation
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Child actors retain their parent and share its lock group
    pub fn with_parent(mut self, parent: &Arc<Actor>) -> Self {
        self.parent = Some(Arc::clone(parent));
        self
    }
}

pub struct Actor {
    key: ActorId,
    actor_type: ActorType,
    id: Option<String>,
    address: Option<String>,
    domain: Option<String>,
    lock: LockGroup,
    seq: AtomicU64,
    parent: Option<Arc<Actor>>,
    behavior: Mutex<Option<Box<dyn ActorBehavior>>>,
    created_at: Instant,
}

impl Actor {
    pub(crate) fn new(key: ActorId, spec: ActorSpec, behavior: Box<dyn ActorBehavior>) -> Self {
        let lock = match &spec.parent {
            Some(parent) => Arc::clone(&parent.lock),
            None => Arc::new(ReentrantMutex::new(())),
        };
        let domain = spec
            .address
            .as_deref()
            .and_then(domain_of)
            .map(str::to_string);
        Self {
            key,
            actor_type: spec.actor_type,
            id: spec.id,
            address: spec.address,
            domain,
            lock,
            seq: AtomicU64::new(1),
            parent: spec.parent,
            behavior: Mutex::new(Some(behavior)),
            created_at: Instant::now(),
        }
    }

    pub fn key(&self) -> ActorId {
        self.key
    }

    pub fn actor_type(&self) -> ActorType {
        self.actor_type
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    pub fn parent(&self) -> Option<&Arc<Actor>> {
        self.parent.as_ref()
    }

    pub fn lock_group(&self) -> &LockGroup {
        &self.lock
    }

    /// True when both actors serialize through the same lock
    pub fn shares_lock_with(&self, other: &Actor) -> bool {
        Arc::ptr_eq(&self.lock, &other.lock)
    }

    /// Next value of the per-actor sequence; starts at 1
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    /// Address for logging; actors without one are shown by slot key
    pub fn label(&self) -> String {
        match &self.address {
            Some(address) => address.clone(),
            None => self.key.to_string(),
        }
    }

    /// Cleanup runs without the tree lock. A finalized actor is unreachable,
    /// so the finalizer owns its state exclusively.
    pub(crate) fn run_cleanup(&self) {
        let behavior = self.behavior.lock().take();
        if let Some(mut behavior) = behavior {
            behavior.cleanup(self);
        }
    }

    /// Drop the behavior without running cleanup
    pub(crate) fn discard(&self) {
        drop(self.behavior.lock().take());
    }
}

/// Invoke the actor's handler. The caller holds the tree lock.
pub(crate) fn dispatch(actor: &Arc<Actor>, msg: Message) {
    let mut behavior = actor.behavior.lock();
    match behavior.as_mut() {
        Some(behavior) => behavior.receive(actor, msg),
        None => debug!(
            actor = %actor.label(),
            from = %msg.from,
            "Actor already finalized, dropping message"
        ),
    }
}

impl fmt::Debug for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("key", &self.key)
            .field("type", &self.actor_type)
            .field("id", &self.id)
            .field("address", &self.address)
            .field("parent", &self.parent.as_ref().map(|p| p.label()))
            .finish()
    }
}
