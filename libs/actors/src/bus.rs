//! Message Bus
//!
//! One bounded FIFO queue shared by a fixed pool of worker threads. Workers
//! resolve each message's destination through the [`Registry`], take the
//! destination's lock group and run its handler.
//!
//! ## Delivery Guarantees
//!
//! - **Lossy under overload**: a full queue drops the new message and logs
//!   it; producers are never blocked and never see an error
//! - **Terminal answers**: a non-reply sent to a missing address gets exactly
//!   one `item-not-found` reply; an undeliverable reply is dropped
//! - **Per-tree serialization only**: there is no global order, and events
//!   between unrelated trees may arrive in any order
//!
//! # Shutdown
//!
//! Workers hold read access on a shared lock while they run. Shutdown sets a
//! flag, wakes every blocked worker, then takes write access, which succeeds
//! only once each worker has finished its in-flight delivery and exited.
//! Must not be called from a handler.

use crate::actor::{dispatch, Actor};
use crate::error::{ActorError, Result};
use crate::message::Message;
use crate::registry::Registry;
use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use rayo_types::{Stanza, StanzaError};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

pub const DEFAULT_QUEUE_CAPACITY: usize = 25_000;
pub const DEFAULT_WORKERS: usize = 8;

/// Queue and worker pool sizing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    pub workers: usize,
    pub capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Bus counters
#[derive(Debug, Default)]
pub struct BusMetrics {
    pub messages_sent: AtomicU64,
    pub messages_delivered: AtomicU64,
    pub destination_not_found: AtomicU64,
    pub replies_dropped: AtomicU64,
    pub overflow_drops: AtomicU64,
    pub shutdown_drops: AtomicU64,
}

/// Bus statistics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BusStats {
    pub messages_sent: u64,
    pub messages_delivered: u64,
    pub destination_not_found: u64,
    pub replies_dropped: u64,
    pub overflow_drops: u64,
    pub shutdown_drops: u64,
    pub queue_depth: usize,
    pub capacity: usize,
    pub workers: usize,
}

struct BusInner {
    registry: Registry,
    sender: Sender<Message>,
    receiver: Receiver<Message>,
    capacity: usize,
    shutdown: AtomicBool,
    wake: Mutex<Option<Sender<()>>>,
    wake_rx: Receiver<()>,
    live: Arc<RwLock<()>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    metrics: BusMetrics,
}

/// Handle to the message bus. Cheap to clone; clones share the queue.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl MessageBus {
    /// Create the queue without workers. Messages stay queued until
    /// [`spawn_workers`](Self::spawn_workers) or
    /// [`deliver_pending`](Self::deliver_pending) is called.
    pub fn new(registry: Registry, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(ActorError::configuration(
                "queue capacity must be positive",
                Some("capacity"),
            ));
        }
        let (sender, receiver) = bounded(capacity);
        let (wake, wake_rx) = bounded(1);
        Ok(Self {
            inner: Arc::new(BusInner {
                registry,
                sender,
                receiver,
                capacity,
                shutdown: AtomicBool::new(false),
                wake: Mutex::new(Some(wake)),
                wake_rx,
                live: Arc::new(RwLock::new(())),
                workers: Mutex::new(Vec::new()),
                metrics: BusMetrics::default(),
            }),
        })
    }

    /// Create the queue and start `config.workers` workers
    pub fn start(registry: Registry, config: &BusConfig) -> Result<Self> {
        let bus = Self::new(registry, config.capacity)?;
        bus.spawn_workers(config.workers)?;
        Ok(bus)
    }

    /// Start `count` worker threads. Returns once every worker is live.
    pub fn spawn_workers(&self, count: usize) -> Result<()> {
        if count == 0 {
            return Err(ActorError::configuration(
                "worker count must be positive",
                Some("workers"),
            ));
        }
        let (ready_tx, ready_rx) = bounded::<()>(count);
        let mut workers = self.inner.workers.lock();
        let first = workers.len();
        for index in first..first + count {
            let name = format!("rayo-msg-{}", index);
            let bus = self.clone();
            let ready = ready_tx.clone();
            let handle = std::thread::Builder::new()
                .name(name.clone())
                .spawn(move || bus.worker_loop(ready))
                .map_err(|source| ActorError::Spawn { name, source })?;
            workers.push(handle);
        }
        drop(workers);
        drop(ready_tx);

        for _ in 0..count {
            if ready_rx.recv().is_err() {
                break;
            }
        }
        info!(workers = count, capacity = self.inner.capacity, "Message workers started");
        Ok(())
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Queue `payload` for delivery from `from` to `to`
    #[track_caller]
    pub fn send(&self, from: &Actor, to: &str, payload: Stanza) {
        let _ = self.post(Message::new(from, to, payload, false));
    }

    /// Queue a copy of `payload`, leaving the caller's document untouched
    #[track_caller]
    pub fn send_copy(&self, from: &Actor, to: &str, payload: &Stanza) {
        let _ = self.post(Message::new(from, to, payload.clone(), false));
    }

    /// Queue a reply. Replies are never answered, even if undeliverable.
    #[track_caller]
    pub fn reply(&self, from: &Actor, to: &str, payload: Stanza) {
        let _ = self.post(Message::new(from, to, payload, true));
    }

    /// Non-blocking enqueue. Overflow and shutdown drop the message; the
    /// error is informational and callers are free to ignore it.
    pub fn post(&self, msg: Message) -> Result<()> {
        let inner = &self.inner;
        if inner.shutdown.load(Ordering::Acquire) {
            inner.metrics.shutdown_drops.fetch_add(1, Ordering::Relaxed);
            debug!(to = %msg.to, from = %msg.from, "Bus shut down, dropping message");
            return Err(ActorError::ShutDown);
        }
        match inner.sender.try_send(msg) {
            Ok(()) => {
                inner.metrics.messages_sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(msg)) => {
                inner.metrics.overflow_drops.fetch_add(1, Ordering::Relaxed);
                error!(
                    to = %msg.to,
                    from = %msg.from,
                    origin = %msg.origin,
                    capacity = inner.capacity,
                    "Failed to queue message, dropping"
                );
                Err(ActorError::QueueOverflow {
                    capacity: inner.capacity,
                })
            }
            Err(TrySendError::Disconnected(_)) => Err(ActorError::ShutDown),
        }
    }

    /// Deliver queued messages on the calling thread until the queue is
    /// empty, including messages queued by the handlers themselves.
    pub fn deliver_pending(&self) -> usize {
        let mut delivered = 0;
        while let Ok(msg) = self.inner.receiver.try_recv() {
            self.deliver(msg);
            delivered += 1;
        }
        delivered
    }

    pub fn queue_len(&self) -> usize {
        self.inner.receiver.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> BusStats {
        let metrics = &self.inner.metrics;
        BusStats {
            messages_sent: metrics.messages_sent.load(Ordering::Relaxed),
            messages_delivered: metrics.messages_delivered.load(Ordering::Relaxed),
            destination_not_found: metrics.destination_not_found.load(Ordering::Relaxed),
            replies_dropped: metrics.replies_dropped.load(Ordering::Relaxed),
            overflow_drops: metrics.overflow_drops.load(Ordering::Relaxed),
            shutdown_drops: metrics.shutdown_drops.load(Ordering::Relaxed),
            queue_depth: self.queue_len(),
            capacity: self.inner.capacity,
            workers: self.inner.workers.lock().len(),
        }
    }

    /// Stop accepting messages, wait for workers to finish in-flight
    /// deliveries and discard whatever is still queued. Idempotent.
    pub fn shutdown(&self) {
        let inner = &self.inner;
        if inner.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Shutting down message bus");

        drop(inner.wake.lock().take());
        drop(inner.live.write());

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *inner.workers.lock());
        for handle in handles {
            if handle.join().is_err() {
                warn!("Message worker panicked before shutdown");
            }
        }

        let discarded = inner.receiver.try_iter().count();
        if discarded > 0 {
            warn!(discarded, "Discarded queued messages at shutdown");
        }
        info!("Message bus shutdown complete");
    }

    fn worker_loop(self, ready: Sender<()>) {
        let live = Arc::clone(&self.inner.live);
        let _live = live.read();
        let _ = ready.send(());
        drop(ready);

        let inner = &self.inner;
        loop {
            select! {
                recv(inner.receiver) -> msg => match msg {
                    Ok(msg) => self.deliver(msg),
                    Err(_) => break,
                },
                recv(inner.wake_rx) -> _ => break,
            }
            if inner.shutdown.load(Ordering::Acquire) {
                break;
            }
        }
        debug!("Message worker exiting");
    }

    fn deliver(&self, msg: Message) {
        let inner = &self.inner;
        match inner.registry.lookup_by_address(&msg.to) {
            Some(lease) => {
                {
                    let _tree = lease.lock_group().lock();
                    debug!(
                        to = %msg.to,
                        from = %msg.from,
                        origin = %msg.origin,
                        reply = msg.is_reply,
                        "Delivering message"
                    );
                    dispatch(lease.actor(), msg);
                }
                inner.metrics.messages_delivered.fetch_add(1, Ordering::Relaxed);
            }
            None if msg.is_reply => {
                inner.metrics.replies_dropped.fetch_add(1, Ordering::Relaxed);
                debug!(to = %msg.to, from = %msg.from, "Reply destination not found, dropping");
            }
            None => {
                inner.metrics.destination_not_found.fetch_add(1, Ordering::Relaxed);
                debug!(
                    to = %msg.to,
                    from = %msg.from,
                    origin = %msg.origin,
                    "Destination not found, bouncing"
                );
                let error = msg.payload.error_reply(StanzaError::ItemNotFound);
                let _ = self.post(Message::bounce(&msg, error));
            }
        }
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("capacity", &self.inner.capacity)
            .field("queue_depth", &self.queue_len())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
