//! Admission control for outbound Drive calls.
//!
//! A fixed pool of active slots plus a bounded FIFO queue of waiters:
//!
//! - While fewer than `max_active` slots are taken, `acquire()` grants one
//!   immediately.
//! - Otherwise the caller joins the queue, unless it already holds
//!   `max_queue` waiters, in which case the call fails at once with
//!   [`MinutagError::QueueFull`].
//! - Releasing a slot hands it straight to the oldest waiter. The active
//!   count only goes down when nobody is waiting.
//!
//! Slots are represented by [`SlotPermit`]; dropping the permit releases the
//! slot, so every successful `acquire()` is paired with exactly one release.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::config::AdmissionConfig;
use crate::{MinutagError, Result};

/// Capacity settings for an [`AdmissionController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionLimits {
    /// Maximum number of concurrently granted slots.
    pub max_active: usize,
    /// Maximum number of queued waiters.
    pub max_queue: usize,
    /// Retry hint attached to rejections.
    pub retry_after_secs: u64,
    /// Maximum time a waiter stays queued.
    pub queue_timeout: Option<Duration>,
}

impl AdmissionLimits {
    /// Create limits without a queue timeout.
    pub fn new(max_active: usize, max_queue: usize) -> Self {
        Self {
            max_active,
            max_queue,
            retry_after_secs: 3,
            queue_timeout: None,
        }
    }

    /// Set the retry hint.
    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = secs;
        self
    }

    /// Set the queue timeout.
    pub fn with_queue_timeout(mut self, timeout: Duration) -> Self {
        self.queue_timeout = Some(timeout);
        self
    }
}

impl From<&AdmissionConfig> for AdmissionLimits {
    fn from(config: &AdmissionConfig) -> Self {
        Self {
            max_active: config.max_concurrency,
            max_queue: config.max_queue,
            retry_after_secs: config.retry_after_secs,
            queue_timeout: config.queue_timeout(),
        }
    }
}

/// Point-in-time view of the controller counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionStats {
    /// Slots currently granted.
    pub active: usize,
    /// Callers waiting for a slot.
    pub queued: usize,
    /// Configured slot count.
    pub max_active: usize,
    /// Configured queue length.
    pub max_queue: usize,
}

#[derive(Debug)]
struct Waiter {
    ticket: u64,
    grant: oneshot::Sender<()>,
}

#[derive(Debug, Default)]
struct SlotState {
    active: usize,
    pending: VecDeque<Waiter>,
    next_ticket: u64,
}

/// Bounds concurrent access to the remote storage service.
#[derive(Debug)]
pub struct AdmissionController {
    limits: AdmissionLimits,
    state: Mutex<SlotState>,
}

impl AdmissionController {
    /// Create a controller with fresh counters.
    pub fn new(limits: AdmissionLimits) -> Self {
        Self {
            limits,
            state: Mutex::new(SlotState::default()),
        }
    }

    /// Snapshot of the current counters.
    pub fn stats(&self) -> AdmissionStats {
        let state = self.lock();
        AdmissionStats {
            active: state.active,
            queued: state.pending.len(),
            max_active: self.limits.max_active,
            max_queue: self.limits.max_queue,
        }
    }

    /// Wait for a slot.
    ///
    /// Fails immediately with [`MinutagError::QueueFull`] when the queue is
    /// at capacity, and with [`MinutagError::QueueTimeout`] when a queue
    /// timeout is configured and expires. Dropping the returned future while
    /// queued removes the caller from the queue.
    pub async fn acquire(self: &Arc<Self>) -> Result<SlotPermit> {
        let (ticket, grant) = {
            let mut state = self.lock();

            if state.active < self.limits.max_active {
                state.active += 1;
                debug!(active = state.active, "Admission slot granted");
                return Ok(SlotPermit {
                    controller: Arc::clone(self),
                });
            }

            if state.pending.len() >= self.limits.max_queue {
                warn!(
                    active = state.active,
                    queued = state.pending.len(),
                    "Admission queue full, rejecting request"
                );
                return Err(MinutagError::QueueFull {
                    retry_after_secs: self.limits.retry_after_secs,
                });
            }

            let ticket = state.next_ticket;
            state.next_ticket += 1;
            let (tx, rx) = oneshot::channel();
            state.pending.push_back(Waiter { ticket, grant: tx });
            debug!(ticket, queued = state.pending.len(), "Waiting for admission slot");
            (ticket, rx)
        };

        let mut queued = QueuedAdmission {
            controller: Arc::clone(self),
            ticket,
            grant: Some(grant),
        };

        match self.limits.queue_timeout {
            Some(limit) => match tokio::time::timeout(limit, queued.wait()).await {
                Ok(granted) => granted?,
                Err(_) => {
                    warn!(ticket, ?limit, "Timed out waiting for admission slot");
                    return Err(MinutagError::QueueTimeout {
                        retry_after_secs: self.limits.retry_after_secs,
                    });
                }
            },
            None => queued.wait().await?,
        }

        debug!(ticket, "Admission slot handed over from queue");
        Ok(SlotPermit {
            controller: Arc::clone(self),
        })
    }

    /// Run `operation` inside a slot.
    ///
    /// The slot is released on every exit path, and the operation's result
    /// is returned unchanged.
    pub async fn with_slot<F, Fut, T>(self: &Arc<Self>, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _permit = self.acquire().await?;
        operation().await
    }

    /// Give a slot back, or pass it to the oldest waiter.
    fn release(&self) {
        let mut state = self.lock();

        while let Some(waiter) = state.pending.pop_front() {
            if waiter.grant.send(()).is_ok() {
                return;
            }
        }

        state.active = state.active.saturating_sub(1);
        debug!(active = state.active, "Admission slot released");
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A caller sitting in the pending queue.
///
/// Dropping it before the grant arrives takes it out of the queue; if the
/// grant already arrived, the slot is released again.
struct QueuedAdmission {
    controller: Arc<AdmissionController>,
    ticket: u64,
    grant: Option<oneshot::Receiver<()>>,
}

impl QueuedAdmission {
    async fn wait(&mut self) -> Result<()> {
        if let Some(grant) = self.grant.as_mut() {
            if grant.await.is_ok() {
                self.grant = None;
                return Ok(());
            }
        }
        Err(MinutagError::Io(std::io::Error::other(
            "admission queue closed",
        )))
    }
}

impl Drop for QueuedAdmission {
    fn drop(&mut self) {
        let Some(mut grant) = self.grant.take() else {
            return;
        };

        let removed = {
            let mut state = self.controller.lock();
            let before = state.pending.len();
            state.pending.retain(|w| w.ticket != self.ticket);
            state.pending.len() != before
        };

        // Not in the queue any more means release() already sent the grant.
        if !removed && grant.try_recv().is_ok() {
            self.controller.release();
        }
    }
}

/// A granted slot. Dropping it releases the slot.
#[derive(Debug)]
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct SlotPermit {
    controller: Arc<AdmissionController>,
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        self.controller.release();
    }
}
