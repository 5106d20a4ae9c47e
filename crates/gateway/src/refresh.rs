//! Single-flight token refresh coordination
//!
//! Holds the `refreshing` flag and the queue of requests parked behind an
//! in-flight refresh. The first caller to `join` while no refresh is running
//! gets a `RefreshLease` and must perform the refresh; everyone else gets a
//! receiver that resolves when the lease settles.
//!
//! The check-and-set of `refreshing` happens under one lock before any await,
//! so two callers can never both lead. The lock is never held across an
//! await point.
//!
//! Every successful refresh bumps a generation counter under the same lock.
//! A request that records the generation before dispatch can ask
//! `join_after` whether a refresh completed while it was in flight; that
//! question and the lead/queue decision are answered in one step.
//!
//! Settlement:
//! - `succeed` → flag cleared, generation bumped, every waiter receives the
//!   new token in FIFO order
//! - `fail` → flag cleared, every waiter receives `Failed`
//! - lease dropped unsettled (leader cancelled) → flag cleared, waiters'
//!   channels closed so they stop waiting immediately

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use common::Secret;
use tokio::sync::oneshot;
use tracing::warn;

use crate::telemetry;

/// How an in-flight refresh ended, as seen by queued requests.
#[derive(Debug, Clone)]
pub enum Settlement {
    Refreshed(Secret<String>),
    Failed,
}

#[derive(Default)]
struct Inner {
    refreshing: bool,
    generation: u64,
    waiters: VecDeque<oneshot::Sender<Settlement>>,
}

/// Owner of the refresh flag and the pending-refresh queue.
///
/// One instance per gateway, so separate gateways never share a refresh.
#[derive(Default)]
pub struct RefreshCoordinator {
    inner: Mutex<Inner>,
}

/// Role assigned to a caller that needs a fresh token.
pub enum Ticket<'a> {
    /// No refresh was running; the holder must perform it and settle the lease.
    Lead(RefreshLease<'a>),
    /// A refresh is running; wait for its settlement.
    Wait(oneshot::Receiver<Settlement>),
    /// The caller's token is already out of date; replay with the current one.
    Replay,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lead a new refresh, or queue behind the one in flight.
    pub fn join(&self) -> Ticket<'_> {
        self.enter(|_| false)
    }

    /// Like `join` for a request dispatched at generation `seen`.
    ///
    /// Returns `Ticket::Replay` when no refresh is running and either a
    /// refresh succeeded since `seen` or the caller already knows its token
    /// was replaced (`token_changed`). A running refresh always queues.
    pub fn join_after(&self, seen: u64, token_changed: bool) -> Ticket<'_> {
        self.enter(|generation| token_changed || generation != seen)
    }

    /// Successful refreshes so far. Read before the token a request sends.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    fn enter(&self, stale: impl FnOnce(u64) -> bool) -> Ticket<'_> {
        let mut inner = self.lock();
        if inner.refreshing {
            let (tx, rx) = oneshot::channel();
            inner.waiters.push_back(tx);
            Ticket::Wait(rx)
        } else if stale(inner.generation) {
            Ticket::Replay
        } else {
            inner.refreshing = true;
            Ticket::Lead(RefreshLease {
                coordinator: self,
                settled: false,
            })
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.lock().refreshing
    }

    /// Number of requests currently queued behind the refresh.
    pub fn queued(&self) -> usize {
        self.lock().waiters.len()
    }

    /// Clear the flag and hand the queue to the caller in one step.
    fn settle(&self, settlement: Option<Settlement>) -> usize {
        let waiters = {
            let mut inner = self.lock();
            inner.refreshing = false;
            if matches!(settlement, Some(Settlement::Refreshed(_))) {
                inner.generation += 1;
            }
            std::mem::take(&mut inner.waiters)
        };
        let count = waiters.len();
        if let Some(settlement) = settlement {
            for waiter in waiters {
                // Receiver gone means that request already timed out.
                let _ = waiter.send(settlement.clone());
            }
        }
        count
    }
}

/// Obligation to settle the refresh this caller is leading.
pub struct RefreshLease<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl RefreshLease<'_> {
    /// Publish the new token to every queued request. Returns how many were queued.
    pub fn succeed(mut self, token: &Secret<String>) -> usize {
        self.settled = true;
        self.coordinator
            .settle(Some(Settlement::Refreshed(token.clone())))
    }

    /// Reject every queued request. Returns how many were queued.
    pub fn fail(mut self) -> usize {
        self.settled = true;
        self.coordinator.settle(Some(Settlement::Failed))
    }
}

impl Drop for RefreshLease<'_> {
    fn drop(&mut self) {
        if !self.settled {
            let released = self.coordinator.settle(None);
            telemetry::record_refresh("abandoned");
            warn!(released, "token refresh abandoned before settling");
        }
    }
}
