//! Actor Registry
//!
//! Owns every live actor, two lookup tables (protocol address and internal
//! id), reference counts and the set of actors waiting for their last
//! reference to go away.
//!
//! Destruction happens in two phases:
//!
//! 1. [`Registry::mark_for_destruction`] removes the actor from both lookup
//!    tables at once, whatever its reference count.
//! 2. When the count drops to zero or below, the slot is removed and the
//!    actor is finalized: cleanup runs, then the parent reference is released.
//!
//! Finalization always runs after the registry lock has been dropped, so
//! cleanup code is free to send messages or release other actors.

use crate::actor::{Actor, ActorBehavior, ActorId, ActorSpec};
use crate::error::{ActorError, Result};
use crate::kind::ActorType;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

struct Slot {
    actor: Arc<Actor>,
    refs: i64,
    destroy: bool,
}

#[derive(Default)]
struct Tables {
    slots: HashMap<ActorId, Slot>,
    by_address: HashMap<String, ActorId>,
    by_id: HashMap<String, ActorId>,
    pending: BTreeSet<ActorId>,
    next_key: u64,
}

impl Tables {
    /// Remove lookup entries that still point at `key`
    fn unlink(&mut self, key: ActorId, actor: &Actor) {
        if let Some(address) = actor.address() {
            if self.by_address.get(address) == Some(&key) {
                self.by_address.remove(address);
            }
        }
        if let Some(id) = actor.id() {
            if self.by_id.get(id) == Some(&key) {
                self.by_id.remove(id);
            }
        }
    }

    fn lease(&mut self, key: ActorId) -> Option<Arc<Actor>> {
        let slot = self.slots.get_mut(&key)?;
        if slot.destroy {
            return None;
        }
        slot.refs += 1;
        debug!(actor = %slot.actor.label(), refs = slot.refs, "lookup retain");
        Some(Arc::clone(&slot.actor))
    }
}

/// Registry counters
#[derive(Debug, Default)]
pub struct RegistryMetrics {
    pub actors_created: AtomicU64,
    pub actors_finalized: AtomicU64,
    pub address_conflicts: AtomicU64,
    pub refcount_underflows: AtomicU64,
}

/// Registry statistics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub active: usize,
    pub pending_destruction: usize,
    pub actors_created: u64,
    pub actors_finalized: u64,
    pub address_conflicts: u64,
    pub refcount_underflows: u64,
}

/// One line of the administrative status listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActorStatus {
    pub key: u64,
    pub actor_type: ActorType,
    pub id: Option<String>,
    pub address: Option<String>,
    pub domain: Option<String>,
    pub refs: i64,
    pub pending_destruction: bool,
}

impl ActorStatus {
    fn of(slot: &Slot) -> Self {
        let actor = &slot.actor;
        Self {
            key: actor.key().value(),
            actor_type: actor.actor_type(),
            id: actor.id().map(str::to_string),
            address: actor.address().map(str::to_string),
            domain: actor.domain().map(str::to_string),
            refs: slot.refs,
            pending_destruction: slot.destroy,
        }
    }
}

/// Active and pending-destruction actors, ordered by creation
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistrySnapshot {
    pub active: Vec<ActorStatus>,
    pub pending: Vec<ActorStatus>,
}

/// Process-wide actor registry. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct Registry {
    tables: Arc<Mutex<Tables>>,
    metrics: Arc<RegistryMetrics>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new actor with a reference count of 1.
    ///
    /// Fails with [`ActorError::AddressConflict`] if another active actor
    /// owns the address; the registry is left unchanged and no parent
    /// reference is kept. A duplicate internal id only logs a warning.
    pub fn create(&self, spec: ActorSpec, behavior: Box<dyn ActorBehavior>) -> Result<Arc<Actor>> {
        let mut tables = self.tables.lock();

        if let Some(parent) = &spec.parent {
            let slot = tables.slots.get_mut(&parent.key()).ok_or_else(|| ActorError::ParentGone {
                parent: parent.label(),
            })?;
            slot.refs += 1;
            debug!(actor = %parent.label(), refs = slot.refs, "parent retain");
        }

        if let Some(address) = spec.address.as_deref() {
            if tables.by_address.contains_key(address) {
                if let Some(parent) = &spec.parent {
                    // the parent is still held by the caller, so this cannot reach zero
                    if let Some(slot) = tables.slots.get_mut(&parent.key()) {
                        slot.refs -= 1;
                    }
                }
                self.metrics.address_conflicts.fetch_add(1, Ordering::Relaxed);
                warn!(address, "Actor address already registered");
                return Err(ActorError::address_conflict(address));
            }
        }

        tables.next_key += 1;
        let key = ActorId(tables.next_key);
        let actor = Arc::new(Actor::new(key, spec, behavior));

        if let Some(address) = actor.address() {
            tables.by_address.insert(address.to_string(), key);
        }
        if let Some(id) = actor.id() {
            if let Some(previous) = tables.by_id.insert(id.to_string(), key) {
                warn!(id, previous = %previous, replacement = %key, "Duplicate internal actor id");
            }
        }
        tables.slots.insert(
            key,
            Slot {
                actor: Arc::clone(&actor),
                refs: 1,
                destroy: false,
            },
        );
        drop(tables);

        self.metrics.actors_created.fetch_add(1, Ordering::Relaxed);
        info!(
            actor = %actor.label(),
            actor_type = %actor.actor_type(),
            id = actor.id().unwrap_or(""),
            "Actor created"
        );
        Ok(actor)
    }

    /// Find a live actor by protocol address. The result holds a reference.
    pub fn lookup_by_address(&self, address: &str) -> Option<Lease> {
        let mut tables = self.tables.lock();
        let key = *tables.by_address.get(address)?;
        let actor = tables.lease(key)?;
        drop(tables);
        Some(Lease::wrap(actor, self.clone()))
    }

    /// Find a live actor by internal id. The result holds a reference.
    pub fn lookup_by_id(&self, id: &str) -> Option<Lease> {
        let mut tables = self.tables.lock();
        let key = *tables.by_id.get(id)?;
        let actor = tables.lease(key)?;
        drop(tables);
        Some(Lease::wrap(actor, self.clone()))
    }

    /// Take a reference that is released when the lease drops
    pub fn lease(&self, actor: &Arc<Actor>) -> Lease {
        self.retain(actor);
        Lease::wrap(Arc::clone(actor), self.clone())
    }

    pub fn retain(&self, actor: &Actor) {
        let mut tables = self.tables.lock();
        match tables.slots.get_mut(&actor.key()) {
            Some(slot) => {
                slot.refs += 1;
                debug!(actor = %actor.label(), refs = slot.refs, "retain");
            }
            None => warn!(actor = %actor.label(), "Retain of finalized actor ignored"),
        }
    }

    /// Drop one reference; finalizes the actor if it is marked for
    /// destruction and this was the last reference.
    pub fn release(&self, actor: &Actor) {
        let finalize = {
            let mut tables = self.tables.lock();
            let Some(slot) = tables.slots.get_mut(&actor.key()) else {
                warn!(actor = %actor.label(), "Release of finalized actor ignored");
                return;
            };
            slot.refs -= 1;
            let refs = slot.refs;
            debug!(actor = %actor.label(), refs, "release");
            if refs < 0 {
                self.metrics.refcount_underflows.fetch_add(1, Ordering::Relaxed);
                warn!(actor = %actor.label(), refs, "Reference count went negative");
            }
            if refs <= 0 && slot.destroy {
                tables.pending.remove(&actor.key());
                tables.slots.remove(&actor.key()).map(|slot| slot.actor)
            } else {
                None
            }
        };
        if let Some(actor) = finalize {
            self.finalize(actor);
        }
    }

    /// Make the actor undiscoverable and schedule it for finalization.
    /// Idempotent. Holders of existing references keep it alive.
    pub fn mark_for_destruction(&self, actor: &Actor) {
        let finalize = {
            let mut tables = self.tables.lock();
            let key = actor.key();
            let Some(slot) = tables.slots.get_mut(&key) else {
                debug!(actor = %actor.label(), "Destroy of finalized actor ignored");
                return;
            };
            if slot.destroy {
                return;
            }
            slot.destroy = true;
            let refs = slot.refs;
            tables.unlink(key, actor);
            info!(actor = %actor.label(), refs, "Actor marked for destruction");
            if refs <= 0 {
                tables.slots.remove(&key).map(|slot| slot.actor)
            } else {
                tables.pending.insert(key);
                None
            }
        };
        if let Some(actor) = finalize {
            self.finalize(actor);
        }
    }

    /// Drop the creation reference and mark for destruction in one step.
    ///
    /// Returns `false` if the actor was already marked, in which case the
    /// reference count is left alone. Owners that may see several teardown
    /// triggers use this instead of `release` + `mark_for_destruction`.
    pub fn destroy(&self, actor: &Actor) -> bool {
        let finalize = {
            let mut tables = self.tables.lock();
            let key = actor.key();
            let Some(slot) = tables.slots.get_mut(&key) else {
                debug!(actor = %actor.label(), "Destroy of finalized actor ignored");
                return false;
            };
            if slot.destroy {
                return false;
            }
            slot.destroy = true;
            slot.refs -= 1;
            let refs = slot.refs;
            if refs < 0 {
                self.metrics.refcount_underflows.fetch_add(1, Ordering::Relaxed);
                warn!(actor = %actor.label(), refs, "Reference count went negative");
            }
            tables.unlink(key, actor);
            info!(actor = %actor.label(), refs, "Actor destroyed");
            if refs <= 0 {
                tables.slots.remove(&key).map(|slot| slot.actor)
            } else {
                tables.pending.insert(key);
                None
            }
        };
        if let Some(actor) = finalize {
            self.finalize(actor);
        }
        true
    }

    /// Current reference count, if the actor still has a slot
    pub fn refs(&self, actor: &Actor) -> Option<i64> {
        self.tables.lock().slots.get(&actor.key()).map(|slot| slot.refs)
    }

    pub fn is_pending_destruction(&self, actor: &Actor) -> bool {
        self.tables.lock().pending.contains(&actor.key())
    }

    pub fn active_count(&self) -> usize {
        let tables = self.tables.lock();
        tables.slots.len() - tables.pending.len()
    }

    pub fn pending_count(&self) -> usize {
        self.tables.lock().pending.len()
    }

    /// Addresses of active actors of the given type
    pub fn addresses_of(&self, actor_type: ActorType) -> Vec<String> {
        let tables = self.tables.lock();
        let mut found: Vec<(ActorId, String)> = tables
            .slots
            .iter()
            .filter(|(_, slot)| !slot.destroy && slot.actor.actor_type() == actor_type)
            .filter_map(|(key, slot)| slot.actor.address().map(|a| (*key, a.to_string())))
            .collect();
        found.sort();
        found.into_iter().map(|(_, address)| address).collect()
    }

    /// Enumerate active and pending-destruction actors
    pub fn snapshot(&self) -> RegistrySnapshot {
        let tables = self.tables.lock();
        let mut snapshot = RegistrySnapshot::default();
        for slot in tables.slots.values() {
            if slot.destroy {
                snapshot.pending.push(ActorStatus::of(slot));
            } else {
                snapshot.active.push(ActorStatus::of(slot));
            }
        }
        snapshot.active.sort_by_key(|s| s.key);
        snapshot.pending.sort_by_key(|s| s.key);
        snapshot
    }

    pub fn stats(&self) -> RegistryStats {
        let (active, pending_destruction) = {
            let tables = self.tables.lock();
            (tables.slots.len() - tables.pending.len(), tables.pending.len())
        };
        RegistryStats {
            active,
            pending_destruction,
            actors_created: self.metrics.actors_created.load(Ordering::Relaxed),
            actors_finalized: self.metrics.actors_finalized.load(Ordering::Relaxed),
            address_conflicts: self.metrics.address_conflicts.load(Ordering::Relaxed),
            refcount_underflows: self.metrics.refcount_underflows.load(Ordering::Relaxed),
        }
    }

    /// Drop every actor without running cleanup. Used at shutdown, after the
    /// bus has stopped, to break references held by behaviors.
    pub fn clear(&self) -> usize {
        let slots: Vec<Slot> = {
            let mut tables = self.tables.lock();
            tables.by_address.clear();
            tables.by_id.clear();
            tables.pending.clear();
            tables.slots.drain().map(|(_, slot)| slot).collect()
        };
        let count = slots.len();
        for slot in &slots {
            slot.actor.discard();
        }
        if count > 0 {
            info!(count, "Discarded remaining actors");
        }
        count
    }

    fn finalize(&self, actor: Arc<Actor>) {
        info!(actor = %actor.label(), "Finalizing actor");
        actor.run_cleanup();
        self.metrics.actors_finalized.fetch_add(1, Ordering::Relaxed);
        if let Some(parent) = actor.parent() {
            self.release(parent);
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("Registry")
            .field("active", &stats.active)
            .field("pending_destruction", &stats.pending_destruction)
            .finish()
    }
}

/// A counted reference to an actor, released on drop
pub struct Lease {
    actor: Arc<Actor>,
    registry: Registry,
}

impl Lease {
    fn wrap(actor: Arc<Actor>, registry: Registry) -> Self {
        Self { actor, registry }
    }

    pub fn actor(&self) -> &Arc<Actor> {
        &self.actor
    }
}

impl Deref for Lease {
    type Target = Arc<Actor>;

    fn deref(&self) -> &Self::Target {
        &self.actor
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.registry.release(&self.actor);
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Lease").field(&self.actor.label()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::{ActorKind, Subkind};
    use crate::message::Message;
    use std::sync::atomic::AtomicUsize;

    struct Counting {
        cleanups: Arc<AtomicUsize>,
    }

    impl ActorBehavior for Counting {
        fn receive(&mut self, _actor: &Arc<Actor>, _msg: Message) {}

        fn cleanup(&mut self, _actor: &Actor) {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting() -> (Box<dyn ActorBehavior>, Arc<AtomicUsize>) {
        let cleanups = Arc::new(AtomicUsize::new(0));
        (
            Box::new(Counting {
                cleanups: Arc::clone(&cleanups),
            }),
            cleanups,
        )
    }

    fn call_spec(address: &str) -> ActorSpec {
        ActorSpec::new(ActorType::CALL)
            .with_address(address)
            .with_id(address.split('@').next().unwrap_or(address))
    }

    #[test]
    fn test_create_sets_initial_state() {
        let registry = Registry::new();
        let (behavior, _) = counting();
        let actor = registry.create(call_spec("c1@example.com"), behavior).unwrap();

        assert_eq!(registry.refs(&actor), Some(1));
        assert_eq!(actor.domain(), Some("example.com"));
        assert_eq!(actor.next_seq(), 1);
        assert_eq!(actor.next_seq(), 2);
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn test_duplicate_address_conflicts() {
        let registry = Registry::new();
        let (first, _) = counting();
        let (second, _) = counting();
        registry.create(call_spec("c1@example.com"), first).unwrap();

        let err = registry.create(call_spec("c1@example.com"), second).unwrap_err();
        assert!(matches!(err, ActorError::AddressConflict { .. }));
        assert_eq!(registry.active_count(), 1);
        assert_eq!(registry.stats().address_conflicts, 1);
    }

    #[test]
    fn test_conflict_rolls_back_parent_retain() {
        let registry = Registry::new();
        let (root, _) = counting();
        let call = registry.create(call_spec("c1@example.com"), root).unwrap();
        let (child, _) = counting();
        let spec = ActorSpec::new(ActorType::call_component(Subkind::Output))
            .with_address("c1@example.com/output-1")
            .with_parent(&call);
        registry.create(spec.clone(), child).unwrap();
        assert_eq!(registry.refs(&call), Some(2));

        let (duplicate, _) = counting();
        assert!(registry.create(spec, duplicate).is_err());
        assert_eq!(registry.refs(&call), Some(2));
    }

    #[test]
    fn test_cleanup_runs_once_after_last_release() {
        let registry = Registry::new();
        let (behavior, cleanups) = counting();
        let actor = registry.create(call_spec("c1@example.com"), behavior).unwrap();

        registry.retain(&actor);
        assert_eq!(registry.refs(&actor), Some(2));
        registry.mark_for_destruction(&actor);
        registry.release(&actor);
        assert_eq!(registry.refs(&actor), Some(1));
        assert_eq!(cleanups.load(Ordering::SeqCst), 0);

        registry.release(&actor);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(registry.refs(&actor), None);

        // late release on a finalized actor is only logged
        registry.release(&actor);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_without_destroy_keeps_slot() {
        let registry = Registry::new();
        let (behavior, cleanups) = counting();
        let actor = registry.create(call_spec("c1@example.com"), behavior).unwrap();

        registry.release(&actor);
        registry.release(&actor);
        assert_eq!(registry.refs(&actor), Some(-1));
        assert_eq!(registry.stats().refcount_underflows, 1);
        assert_eq!(cleanups.load(Ordering::SeqCst), 0);

        registry.mark_for_destruction(&actor);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_mark_for_destruction_hides_actor() {
        let registry = Registry::new();
        let (behavior, cleanups) = counting();
        let actor = registry.create(call_spec("c1@example.com"), behavior).unwrap();

        let lease = registry.lookup_by_address("c1@example.com").unwrap();
        assert_eq!(registry.refs(&actor), Some(2));

        registry.mark_for_destruction(&actor);
        registry.mark_for_destruction(&actor);
        assert!(registry.lookup_by_address("c1@example.com").is_none());
        assert!(registry.lookup_by_id("c1").is_none());
        assert!(registry.is_pending_destruction(&actor));
        assert_eq!(registry.snapshot().pending.len(), 1);

        registry.release(&actor);
        assert_eq!(cleanups.load(Ordering::SeqCst), 0);
        drop(lease);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(registry.pending_count(), 0);
    }

    #[test]
    fn test_destroy_releases_creation_reference_once() {
        let registry = Registry::new();
        let (behavior, cleanups) = counting();
        let actor = registry.create(call_spec("c1@example.com"), behavior).unwrap();
        let lease = registry.lookup_by_id("c1").unwrap();

        assert!(registry.destroy(&actor));
        assert!(!registry.destroy(&actor));
        assert_eq!(registry.refs(&actor), Some(1));
        assert!(registry.lookup_by_address("c1@example.com").is_none());

        drop(lease);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        assert!(!registry.destroy(&actor));
    }

    #[test]
    fn test_address_reusable_after_destroy() {
        let registry = Registry::new();
        let (first, _) = counting();
        let actor = registry.create(call_spec("c1@example.com"), first).unwrap();
        registry.retain(&actor);
        registry.mark_for_destruction(&actor);

        let (second, _) = counting();
        let replacement = registry.create(call_spec("c1@example.com"), second).unwrap();
        let found = registry.lookup_by_address("c1@example.com").unwrap();
        assert_eq!(found.key(), replacement.key());

        // finalizing the old actor leaves the new one reachable
        registry.release(&actor);
        registry.release(&actor);
        assert!(registry.lookup_by_id("c1").is_some());
    }

    #[test]
    fn test_child_shares_lock_and_releases_parent() {
        let registry = Registry::new();
        let (root, root_cleanups) = counting();
        let call = registry.create(call_spec("c1@example.com"), root).unwrap();
        let (child_behavior, child_cleanups) = counting();
        let child = registry
            .create(
                ActorSpec::new(ActorType::new(ActorKind::CallComponent, Subkind::Prompt))
                    .with_address("c1@example.com/prompt-1")
                    .with_parent(&call),
                child_behavior,
            )
            .unwrap();

        assert!(child.shares_lock_with(&call));
        registry.release(&call);
        registry.mark_for_destruction(&call);
        assert_eq!(root_cleanups.load(Ordering::SeqCst), 0);

        registry.release(&child);
        registry.mark_for_destruction(&child);
        assert_eq!(child_cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(root_cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(registry.stats().actors_finalized, 2);
    }

    #[test]
    fn test_snapshot_lists_pending_separately() {
        let registry = Registry::new();
        let (a, _) = counting();
        let (b, _) = counting();
        let first = registry.create(call_spec("a@example.com"), a).unwrap();
        registry.create(call_spec("b@example.com"), b).unwrap();
        registry.mark_for_destruction(&first);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.active.len(), 1);
        assert_eq!(snapshot.active[0].address.as_deref(), Some("b@example.com"));
        assert_eq!(snapshot.pending.len(), 1);
        assert!(snapshot.pending[0].pending_destruction);
    }
}
