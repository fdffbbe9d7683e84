// ============================================
// File: crates/mowlink-client/src/services/correlator.rs
// ============================================
//! # Command Correlator
//!
//! ## Creation Reason
//! The transport carries no request ids. Commands are therefore
//! serialized per device and answered strictly in FIFO order: the next
//! inbound reply for a device resolves the head of that device's queue.
//!
//! ## Main Functionality
//! - `CommandCorrelator`: `enqueue` / `try_enqueue`, one worker per device
//! - `PendingQueue`: per-device FIFO of waiters, shared with the router
//! - `CommandSink`: the delivery path commands are sent through
//!
//! ## Command Flow
//! ```text
//! caller ──enqueue──► [capacity permit] ──► device worker
//!                                               │ push pending
//!                                               │ sink.deliver
//!                                               ▼
//!                    ┌──────── first one wins ────────┐
//!                    │                                │
//!           router.resolve(head)               deadline elapses
//!                    │                                │
//!                    ▼                                ▼
//!              Ok(reply bytes)                 CommandTimeout
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The entry is pushed BEFORE delivery so a fast reply is never lost
//! - Resolution and timeout both remove the entry under the queue lock;
//!   whichever removes it is authoritative, the other is a no-op
//! - `PendingQueue` is the only lock here; never take the device state
//!   lock while holding it
//! - A timeout never tears down the link or other devices' commands
//! - `shutdown` interrupts a delivery in progress and releases every
//!   queued caller at once
//!
//! ## Last Modified
//! v0.1.0 - Initial correlator
//! v0.1.1 - Shutdown no longer waits for in-flight delivery

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use mowlink_common::time::unix_timestamp_millis;
use mowlink_common::types::IotId;
use mowlink_core::protocol::DeviceCommand;

use crate::error::{ClientError, Result};

// ============================================
// CommandSink
// ============================================

/// Delivery path for encoded device commands.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandSink: Send + Sync {
    /// Sends `payload` to `iot_id`. Returns once the platform accepted it.
    async fn deliver(&self, iot_id: &IotId, payload: &[u8]) -> Result<()>;
}

// ============================================
// PendingQueue
// ============================================

type Outcome = Result<Vec<u8>>;

struct Pending {
    id: u64,
    opcode: String,
    reply: oneshot::Sender<Outcome>,
}

/// Per-device FIFO of commands waiting for a reply.
#[derive(Default)]
pub struct PendingQueue {
    queues: Mutex<HashMap<IotId, VecDeque<Pending>>>,
    next_id: AtomicU64,
}

impl PendingQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, iot_id: &IotId, opcode: &str) -> (u64, oneshot::Receiver<Outcome>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply, rx) = oneshot::channel();
        self.queues
            .lock()
            .entry(iot_id.clone())
            .or_default()
            .push_back(Pending {
                id,
                opcode: opcode.to_string(),
                reply,
            });
        (id, rx)
    }

    /// Removes entry `id`; `false` if it was already resolved.
    fn remove(&self, iot_id: &IotId, id: u64) -> bool {
        let mut queues = self.queues.lock();
        let Some(queue) = queues.get_mut(iot_id) else {
            return false;
        };
        let before = queue.len();
        queue.retain(|p| p.id != id);
        let removed = queue.len() != before;
        if queue.is_empty() {
            queues.remove(iot_id);
        }
        removed
    }

    /// Resolves the head of `iot_id`'s queue with `reply`.
    ///
    /// Returns `false` when nothing was pending for the device.
    pub fn resolve(&self, iot_id: &IotId, reply: Vec<u8>) -> bool {
        let mut queues = self.queues.lock();
        let Some(pending) = queues.get_mut(iot_id).and_then(VecDeque::pop_front) else {
            return false;
        };
        if queues.get(iot_id).is_some_and(VecDeque::is_empty) {
            queues.remove(iot_id);
        }

        trace!(iot_id = %iot_id, opcode = %pending.opcode, "Resolving pending command");
        // Sent under the lock so a waiter whose `remove` fails always finds the reply.
        pending.reply.send(Ok(reply)).is_ok()
    }

    /// Fails every pending entry with `TransportFailure`.
    pub fn fail_all(&self, reason: &str) -> usize {
        let drained: Vec<Pending> = self
            .queues
            .lock()
            .drain()
            .flat_map(|(_, queue)| queue)
            .collect();
        let count = drained.len();
        for pending in drained {
            let _ = pending.reply.send(Err(ClientError::transport(reason)));
        }
        count
    }

    /// Number of entries pending for `iot_id`.
    #[must_use]
    pub fn pending(&self, iot_id: &IotId) -> usize {
        self.queues.lock().get(iot_id).map_or(0, VecDeque::len)
    }

    /// Number of entries pending across all devices.
    #[must_use]
    pub fn total_pending(&self) -> usize {
        self.queues.lock().values().map(VecDeque::len).sum()
    }
}

impl std::fmt::Debug for PendingQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingQueue")
            .field("total_pending", &self.total_pending())
            .finish()
    }
}

// ============================================
// Device Worker
// ============================================

struct Job {
    opcode: String,
    payload: Vec<u8>,
    reply: oneshot::Sender<Outcome>,
    _permit: OwnedSemaphorePermit,
}

/// State a device worker needs; deliberately excludes the worker map.
#[derive(Clone)]
struct WorkerContext {
    sink: Arc<dyn CommandSink>,
    queue: Arc<PendingQueue>,
    deadline: Duration,
    cancel: CancellationToken,
}

impl WorkerContext {
    async fn run(self, iot_id: IotId, mut jobs: mpsc::UnboundedReceiver<Job>) {
        debug!(iot_id = %iot_id, "Command worker started");

        loop {
            let job = tokio::select! {
                () = self.cancel.cancelled() => break,
                job = jobs.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };
            let outcome = self.execute(&iot_id, &job.opcode, &job.payload).await;
            let _ = job.reply.send(outcome);
        }

        jobs.close();
        while let Ok(job) = jobs.try_recv() {
            let _ = job
                .reply
                .send(Err(ClientError::transport("command worker stopped")));
        }
        debug!(iot_id = %iot_id, "Command worker stopped");
    }

    async fn execute(&self, iot_id: &IotId, opcode: &str, payload: &[u8]) -> Outcome {
        if self.cancel.is_cancelled() {
            return Err(ClientError::transport("correlator shut down"));
        }

        let (entry, mut rx) = self.queue.push(iot_id, opcode);

        let delivered = tokio::select! {
            () = self.cancel.cancelled() => {
                self.queue.remove(iot_id, entry);
                return Err(ClientError::transport("correlator shut down"));
            }
            delivered = self.sink.deliver(iot_id, payload) => delivered,
        };
        if let Err(e) = delivered {
            self.queue.remove(iot_id, entry);
            warn!(iot_id = %iot_id, opcode = %opcode, error = %e, "Command delivery failed");
            return Err(e);
        }
        debug!(iot_id = %iot_id, opcode = %opcode, bytes = payload.len(), "Command delivered");

        match tokio::time::timeout(self.deadline, &mut rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ClientError::transport("pending entry dropped")),
            Err(_) => {
                if self.queue.remove(iot_id, entry) {
                    warn!(iot_id = %iot_id, opcode = %opcode, "Command timed out");
                    Err(ClientError::CommandTimeout {
                        iot_id: iot_id.to_string(),
                        opcode: opcode.to_string(),
                        timeout_ms: u64::try_from(self.deadline.as_millis()).unwrap_or(u64::MAX),
                    })
                } else {
                    // Resolved in the same instant the deadline fired; the
                    // reply is already in the channel.
                    rx.await
                        .unwrap_or_else(|_| Err(ClientError::transport("pending entry dropped")))
                }
            }
        }
    }
}

// ============================================
// CommandCorrelator
// ============================================

struct Inner {
    context: WorkerContext,
    workers: DashMap<IotId, mpsc::UnboundedSender<Job>>,
    permits: Arc<Semaphore>,
    capacity: usize,
}

/// Serializes commands per device and pairs them with replies.
#[derive(Clone)]
pub struct CommandCorrelator {
    inner: Arc<Inner>,
}

impl CommandCorrelator {
    /// Creates a correlator sending through `sink`.
    ///
    /// `capacity` bounds the commands buffered across all devices;
    /// `deadline` bounds the wait for each reply.
    #[must_use]
    pub fn new(
        sink: Arc<dyn CommandSink>,
        queue: Arc<PendingQueue>,
        capacity: usize,
        deadline: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                context: WorkerContext {
                    sink,
                    queue,
                    deadline,
                    cancel: CancellationToken::new(),
                },
                workers: DashMap::new(),
                permits: Arc::new(Semaphore::new(capacity)),
                capacity,
            }),
        }
    }

    /// Shared pending queue, for the router.
    #[must_use]
    pub fn queue(&self) -> Arc<PendingQueue> {
        Arc::clone(&self.inner.context.queue)
    }

    /// Reply deadline.
    #[must_use]
    pub fn deadline(&self) -> Duration {
        self.inner.context.deadline
    }

    /// Sends a command and waits for its reply, blocking while the
    /// correlator is at capacity.
    ///
    /// # Errors
    /// Returns `CommandTimeout` when no reply arrives in time,
    /// `TransportFailure` after shutdown, or the sink's error.
    pub async fn enqueue(&self, iot_id: &IotId, opcode: &str, payload: Vec<u8>) -> Result<Vec<u8>> {
        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| ClientError::transport("correlator shut down"))?;
        self.submit(iot_id, opcode, payload, permit).await
    }

    /// Like [`enqueue`](Self::enqueue) but fails fast with `QueueFull`
    /// at capacity.
    ///
    /// # Errors
    /// Returns `QueueFull` at capacity, plus every error of `enqueue`.
    pub async fn try_enqueue(&self, iot_id: &IotId, opcode: &str, payload: Vec<u8>) -> Result<Vec<u8>> {
        let permit = match Arc::clone(&self.inner.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => {
                return Err(ClientError::QueueFull {
                    capacity: self.inner.capacity,
                })
            }
            Err(TryAcquireError::Closed) => {
                return Err(ClientError::transport("correlator shut down"))
            }
        };
        self.submit(iot_id, opcode, payload, permit).await
    }

    /// Encodes `command` with the current time and sends it.
    ///
    /// # Errors
    /// See [`enqueue`](Self::enqueue).
    pub async fn send(&self, iot_id: &IotId, command: &DeviceCommand) -> Result<Vec<u8>> {
        let timestamp = u64::try_from(unix_timestamp_millis()).unwrap_or_default();
        self.enqueue(iot_id, command.opcode(), command.encode(timestamp))
            .await
    }

    async fn submit(
        &self,
        iot_id: &IotId,
        opcode: &str,
        payload: Vec<u8>,
        permit: OwnedSemaphorePermit,
    ) -> Result<Vec<u8>> {
        if self.inner.context.cancel.is_cancelled() {
            return Err(ClientError::transport("correlator shut down"));
        }

        let (reply, rx) = oneshot::channel();
        let job = Job {
            opcode: opcode.to_string(),
            payload,
            reply,
            _permit: permit,
        };
        self.worker_for(iot_id)
            .send(job)
            .map_err(|_| ClientError::transport("command worker stopped"))?;

        tokio::select! {
            biased;
            outcome = rx => outcome.map_err(|_| ClientError::transport("command worker stopped"))?,
            () = self.inner.context.cancel.cancelled() => {
                Err(ClientError::transport("correlator shut down"))
            }
        }
    }

    fn worker_for(&self, iot_id: &IotId) -> mpsc::UnboundedSender<Job> {
        self.inner
            .workers
            .entry(iot_id.clone())
            .or_insert_with(|| {
                let (tx, rx) = mpsc::unbounded_channel();
                tokio::spawn(self.inner.context.clone().run(iot_id.clone(), rx));
                tx
            })
            .clone()
    }

    /// Resolves the head command of `iot_id`; `false` if none waited.
    pub fn resolve(&self, iot_id: &IotId, reply: Vec<u8>) -> bool {
        self.inner.context.queue.resolve(iot_id, reply)
    }

    /// Stops all workers and fails in-flight and queued commands with
    /// `TransportFailure`.
    pub fn shutdown(&self, reason: &str) {
        self.inner.context.cancel.cancel();
        self.inner.permits.close();
        let failed = self.inner.context.queue.fail_all(reason);
        self.inner.workers.clear();
        debug!(failed, reason = %reason, "Command correlator shut down");
    }

    /// Returns `true` after [`shutdown`](Self::shutdown).
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.context.cancel.is_cancelled()
    }
}

impl std::fmt::Debug for CommandCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandCorrelator")
            .field("capacity", &self.inner.capacity)
            .field("deadline", &self.inner.context.deadline)
            .field("workers", &self.inner.workers.len())
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================
