//! Windowed admission gate.
//!
//! A [`WindowGate`] holds `capacity` slots per window. Callers take a slot with
//! one of the `acquire` methods before starting a rate-limited operation and
//! get back a [`SlotPermit`]. Capacity comes back in one of two ways:
//!
//! - the permit is dropped (or explicitly released) while its window is still
//!   current, under [`ReleasePolicy::Immediate`];
//! - the [`Replenisher`](super::Replenisher) tops the gate off at the next
//!   window boundary.
//!
//! Every replenishment advances an epoch, and a permit only returns its slot
//! if it was acquired in the current epoch. A slot is therefore restored by
//! exactly one of the two paths and `available` can never exceed `capacity`.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, trace};

/// Errors produced by the gate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    /// The gate was configured with zero slots.
    #[error("gate capacity must be at least 1")]
    ZeroCapacity,

    /// The gate was configured with an empty window.
    #[error("gate window must be longer than zero")]
    ZeroWindow,

    /// The caller's cancellation signal fired while it was waiting.
    #[error("wait for a submission slot was cancelled")]
    Cancelled,

    /// No slot became available within the caller's maximum wait.
    #[error("no submission slot became available within {0:?}")]
    Timeout(Duration),
}

/// How a finished operation's slot is returned to the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleasePolicy {
    /// The slot is returned as soon as the permit is dropped, unless a
    /// replenishment already restored it.
    #[default]
    Immediate,
    /// Dropping a permit does nothing; only the window boundary restores
    /// capacity. At most `capacity` operations start per window.
    WindowBoundary,
}

/// Point-in-time view of the gate, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateSnapshot {
    /// Configured slots per window
    pub capacity: u32,
    /// Slots that can be acquired right now
    pub available: u32,
    /// Number of replenishments so far
    pub epoch: u64,
    /// Callers currently parked in an acquire call
    pub waiting: usize,
}

#[derive(Debug)]
struct GateState {
    available: u32,
    epoch: u64,
    waiting: usize,
}

/// A bounded pool of slots replenished once per window.
///
/// The gate is `Sync` and meant to be shared behind an `Arc` by every caller
/// of a client, no matter how many tasks or threads they run on.
#[derive(Debug)]
pub struct WindowGate {
    capacity: u32,
    window: Duration,
    policy: ReleasePolicy,
    state: Mutex<GateState>,
    notify: Notify,
}

impl WindowGate {
    /// Create a gate with `capacity` slots per `window` and the default
    /// release policy.
    pub fn new(capacity: u32, window: Duration) -> Result<Self, GateError> {
        Self::with_policy(capacity, window, ReleasePolicy::default())
    }

    /// Create a gate with an explicit release policy.
    pub fn with_policy(
        capacity: u32,
        window: Duration,
        policy: ReleasePolicy,
    ) -> Result<Self, GateError> {
        if capacity == 0 {
            return Err(GateError::ZeroCapacity);
        }
        if window.is_zero() {
            return Err(GateError::ZeroWindow);
        }

        Ok(Self {
            capacity,
            window,
            policy,
            state: Mutex::new(GateState {
                available: capacity,
                epoch: 0,
                waiting: 0,
            }),
            notify: Notify::new(),
        })
    }

    /// Slots per window.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Replenishment period.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Configured release policy.
    pub fn policy(&self) -> ReleasePolicy {
        self.policy
    }

    /// Slots that can be acquired right now.
    pub fn available(&self) -> u32 {
        self.state.lock().available
    }

    /// Take a consistent snapshot of the gate state.
    pub fn snapshot(&self) -> GateSnapshot {
        let state = self.state.lock();
        GateSnapshot {
            capacity: self.capacity,
            available: state.available,
            epoch: state.epoch,
            waiting: state.waiting,
        }
    }

    /// Take a slot if one is free, without waiting.
    pub fn try_acquire(&self) -> Option<SlotPermit<'_>> {
        let mut state = self.state.lock();
        if state.available == 0 {
            return None;
        }
        state.available -= 1;

        trace!(
            available = state.available,
            epoch = state.epoch,
            "Slot acquired"
        );

        Some(SlotPermit {
            gate: self,
            epoch: state.epoch,
        })
    }

    /// Wait until a slot is free and take it.
    ///
    /// Dropping the returned future before it completes leaves the gate
    /// untouched.
    pub async fn acquire(&self) -> SlotPermit<'_> {
        if let Some(permit) = self.try_acquire() {
            return permit;
        }

        let _waiting = WaitingGuard::register(self);

        loop {
            // Register for wakeups before looking at the count so a release
            // or replenishment between the check and the await is not lost.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(permit) = self.try_acquire() {
                return permit;
            }

            notified.await;
        }
    }

    /// Wait at most `max_wait` for a slot.
    pub async fn acquire_timeout(&self, max_wait: Duration) -> Result<SlotPermit<'_>, GateError> {
        match tokio::time::timeout(max_wait, self.acquire()).await {
            Ok(permit) => Ok(permit),
            Err(_) => {
                debug!(max_wait = ?max_wait, "Timed out waiting for a slot");
                Err(GateError::Timeout(max_wait))
            }
        }
    }

    /// Wait for a slot until `cancel` resolves.
    ///
    /// Cancellation wins if both are ready at the same time.
    pub async fn acquire_until<F>(&self, cancel: F) -> Result<SlotPermit<'_>, GateError>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = cancel => {
                debug!("Wait for a slot cancelled");
                Err(GateError::Cancelled)
            }
            permit = self.acquire() => Ok(permit),
        }
    }

    /// Restore the gate to full capacity and start a new epoch.
    ///
    /// Permits acquired before this call no longer return their slot when
    /// dropped.
    pub fn replenish(&self) {
        let (restored, epoch, waiting) = {
            let mut state = self.state.lock();
            state.epoch = state.epoch.wrapping_add(1);
            let restored = self.capacity - state.available;
            state.available = self.capacity;
            (restored, state.epoch, state.waiting)
        };

        debug!(
            restored = restored,
            epoch = epoch,
            waiting = waiting,
            "Gate replenished"
        );

        if restored > 0 {
            self.notify.notify_waiters();
        }
    }

    fn release_slot(&self, epoch: u64) {
        if self.policy == ReleasePolicy::WindowBoundary {
            trace!(epoch = epoch, "Slot held until window boundary");
            return;
        }

        let restored = {
            let mut state = self.state.lock();
            // A replenishment since acquisition already gave this slot back.
            if state.epoch != epoch || state.available >= self.capacity {
                false
            } else {
                state.available += 1;
                true
            }
        };

        if restored {
            trace!(epoch = epoch, "Slot released");
            self.notify.notify_one();
        } else {
            trace!(epoch = epoch, "Slot already restored by replenishment");
        }
    }
}

/// A slot taken from a [`WindowGate`].
///
/// Dropping the permit ends the admitted operation on every exit path,
/// including panics and cancelled futures. Under [`ReleasePolicy::Immediate`]
/// that hands the slot back; under [`ReleasePolicy::WindowBoundary`] the slot
/// stays spent until the next replenish.
#[derive(Debug)]
#[must_use = "dropping the permit ends the admitted operation"]
pub struct SlotPermit<'a> {
    gate: &'a WindowGate,
    epoch: u64,
}

impl SlotPermit<'_> {
    /// Epoch the slot was acquired in.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Hand the slot back now.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for SlotPermit<'_> {
    fn drop(&mut self) {
        self.gate.release_slot(self.epoch);
    }
}

/// Counts a caller as parked for as long as it is alive.
struct WaitingGuard<'a> {
    gate: &'a WindowGate,
}

impl<'a> WaitingGuard<'a> {
    fn register(gate: &'a WindowGate) -> Self {
        let waiting = {
            let mut state = gate.state.lock();
            state.waiting += 1;
            state.waiting
        };
        trace!(waiting = waiting, "Waiting for a slot");
        Self { gate }
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.gate.state.lock().waiting -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::oneshot;
    use tokio_test::{assert_pending, assert_ready, task};

    fn gate(capacity: u32) -> WindowGate {
        WindowGate::new(capacity, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_rejects_invalid_configuration() {
        assert_eq!(
            WindowGate::new(0, Duration::from_secs(1)).unwrap_err(),
            GateError::ZeroCapacity
        );
        assert_eq!(
            WindowGate::new(1, Duration::ZERO).unwrap_err(),
            GateError::ZeroWindow
        );
    }

    #[test]
    fn test_try_acquire_until_exhausted() {
        let gate = gate(2);

        let first = gate.try_acquire();
        let second = gate.try_acquire();
        assert!(first.is_some());
        assert!(second.is_some());
        assert_eq!(gate.available(), 0);

        // The third caller gets nothing
        assert!(gate.try_acquire().is_none());
    }

    #[test]
    fn test_drop_returns_slot_within_window() {
        let gate = gate(1);

        let permit = gate.try_acquire().unwrap();
        assert_eq!(gate.available(), 0);

        permit.release();
        assert_eq!(gate.available(), 1);
    }

    #[test]
    fn test_window_boundary_policy_holds_slot() {
        let gate =
            WindowGate::with_policy(1, Duration::from_secs(1), ReleasePolicy::WindowBoundary)
                .unwrap();

        gate.try_acquire().unwrap().release();
        assert_eq!(gate.available(), 0);

        gate.replenish();
        assert_eq!(gate.available(), 1);

        let permit = gate.try_acquire().unwrap();
        drop(permit);
        assert_eq!(gate.available(), 0);
        assert!(gate.try_acquire().is_none());
    }

    #[test]
    fn test_release_after_replenish_does_not_overfill() {
        let gate = gate(2);

        let a = gate.try_acquire().unwrap();
        let b = gate.try_acquire().unwrap();
        gate.replenish();
        assert_eq!(gate.available(), 2);

        drop(a);
        drop(b);
        assert_eq!(gate.available(), 2);
    }

    #[test]
    fn test_replenish_advances_epoch() {
        let gate = gate(3);
        let permit = gate.try_acquire().unwrap();
        assert_eq!(permit.epoch(), 0);

        gate.replenish();
        let snapshot = gate.snapshot();
        assert_eq!(snapshot.epoch, 1);
        assert_eq!(snapshot.available, 3);
        assert_eq!(snapshot.capacity, 3);

        let next = gate.try_acquire().unwrap();
        assert_eq!(next.epoch(), 1);
        drop(permit);
        // The stale permit gave nothing back
        assert_eq!(gate.available(), 2);
    }

    #[test]
    fn test_acquire_blocks_until_release() {
        let gate = gate(1);
        let held = gate.try_acquire().unwrap();

        let mut waiter = task::spawn(gate.acquire());
        assert_pending!(waiter.poll());
        assert_eq!(gate.snapshot().waiting, 1);

        drop(held);
        assert!(waiter.is_woken());
        let permit = assert_ready!(waiter.poll());
        assert_eq!(gate.available(), 0);
        assert_eq!(gate.snapshot().waiting, 0);
        drop(permit);
    }

    #[test]
    fn test_replenish_wakes_every_waiter() {
        let gate = gate(2);
        let a = gate.try_acquire().unwrap();
        let b = gate.try_acquire().unwrap();

        let mut first = task::spawn(gate.acquire());
        let mut second = task::spawn(gate.acquire());
        assert_pending!(first.poll());
        assert_pending!(second.poll());

        gate.replenish();
        assert!(first.is_woken());
        assert!(second.is_woken());

        let p1 = assert_ready!(first.poll());
        let p2 = assert_ready!(second.poll());
        assert_eq!(gate.available(), 0);

        drop((a, b, p1, p2));
        // Only the two permits from the new epoch return their slots
        assert_eq!(gate.available(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_timeout_leaves_gate_unchanged() {
        let gate = gate(1);
        let _held = gate.try_acquire().unwrap();
        let before = gate.snapshot();

        let result = gate.acquire_timeout(Duration::from_millis(100)).await;
        assert_eq!(
            result.unwrap_err(),
            GateError::Timeout(Duration::from_millis(100))
        );
        assert_eq!(gate.snapshot(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_until_cancelled() {
        let gate = Arc::new(gate(1));
        let _held = gate.try_acquire().unwrap();
        let before = gate.snapshot();

        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                gate.acquire_until(cancel_rx).await.map(|p| p.epoch())
            })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(gate.snapshot().waiting, 1);
        cancel_tx.send(()).unwrap();

        let result = waiter.await.unwrap();
        assert_eq!(result, Err(GateError::Cancelled));
        assert_eq!(gate.snapshot(), before);
    }

    #[tokio::test]
    async fn test_acquire_until_prefers_free_slot_when_not_cancelled() {
        let gate = gate(1);
        let permit = gate
            .acquire_until(std::future::pending::<()>())
            .await
            .unwrap();
        assert_eq!(gate.available(), 0);
        drop(permit);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_capacity_invariant_under_contention() {
        let gate = Arc::new(gate(3));
        let mut handles = Vec::new();

        for i in 0..64 {
            let gate = Arc::clone(&gate);
            handles.push(tokio::spawn(async move {
                let permit = gate.acquire().await;
                assert!(gate.available() <= gate.capacity());
                tokio::task::yield_now().await;
                if i % 5 == 0 {
                    gate.replenish();
                }
                drop(permit);
                assert!(gate.available() <= gate.capacity());
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = gate.snapshot();
        assert_eq!(snapshot.available, 3);
        assert_eq!(snapshot.waiting, 0);
    }
}
