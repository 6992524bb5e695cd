//! Counting gate that bounds how many jobs run at once.
//!
//! Callers take a slot with `acquire` and return it with `release`. When no
//! slot is free, `acquire` parks the caller in a FIFO queue. `release` hands
//! its slot straight to the oldest parked caller instead of bumping the free
//! count, so a newcomer can never overtake a waiter.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("cannot change max_concurrent while {in_use} slot(s) are in use")]
    SlotsInUse { in_use: usize },
    #[error("max_concurrent must be at least 1")]
    ZeroCeiling,
}

/// Snapshot of gate occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateStats {
    pub max_concurrent: usize,
    pub available: usize,
    pub in_use: usize,
    pub waiting: usize,
}

#[derive(Debug)]
struct GateState {
    max_concurrent: usize,
    available: usize,
    waiters: VecDeque<oneshot::Sender<()>>,
}

impl GateState {
    fn live_waiters(&self) -> usize {
        self.waiters.iter().filter(|w| !w.is_closed()).count()
    }
}

/// A parked `acquire`. If dropped after a handoff landed but before the
/// caller observed it, the slot is passed on instead of leaking.
struct PendingSlot<'a> {
    gate: &'a SlotGate,
    rx: Option<oneshot::Receiver<()>>,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            rx.close();
            if rx.try_recv().is_ok() {
                self.gate.release();
            }
        }
    }
}

#[derive(Debug)]
pub struct SlotGate {
    state: Mutex<GateState>,
}

impl SlotGate {
    /// Gate with `max_concurrent` slots (at least 1).
    pub fn new(max_concurrent: usize) -> Self {
        let max = max_concurrent.max(1);
        Self {
            state: Mutex::new(GateState {
                max_concurrent: max,
                available: max,
                waiters: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a slot, waiting in FIFO order if none is free. Returns without
    /// suspending when a slot is available.
    ///
    /// Dropping the returned future before it resolves gives up the place in
    /// line; a slot handed to an abandoned waiter goes to the next one.
    pub async fn acquire(&self) {
        let rx = {
            let mut state = self.lock();
            if state.available > 0 {
                state.available -= 1;
                return;
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            rx
        };
        let mut pending = PendingSlot {
            gate: self,
            rx: Some(rx),
        };
        if let Some(rx) = pending.rx.as_mut() {
            let _ = rx.await;
        }
        pending.rx = None;
    }

    /// Take a slot only if one is free right now.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.lock();
        if state.available > 0 {
            state.available -= 1;
            true
        } else {
            false
        }
    }

    /// Return a slot: hand it to the oldest live waiter, or make it free.
    /// The free count never exceeds the ceiling, so a stray double release is absorbed.
    pub fn release(&self) {
        let mut state = self.lock();
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.send(()).is_ok() {
                return;
            }
        }
        state.available = (state.available + 1).min(state.max_concurrent);
    }

    pub fn available(&self) -> usize {
        self.lock().available
    }

    /// Callers currently parked in `acquire`.
    pub fn waiting(&self) -> usize {
        self.lock().live_waiters()
    }

    pub fn max_concurrent(&self) -> usize {
        self.lock().max_concurrent
    }

    pub fn stats(&self) -> GateStats {
        let state = self.lock();
        GateStats {
            max_concurrent: state.max_concurrent,
            available: state.available,
            in_use: state.max_concurrent - state.available,
            waiting: state.live_waiters(),
        }
    }

    /// Change the ceiling. Only allowed while every slot is free; resets the
    /// free count to the new ceiling.
    pub fn set_max_concurrent(&self, new_max: usize) -> Result<(), GateError> {
        if new_max == 0 {
            return Err(GateError::ZeroCeiling);
        }
        let mut state = self.lock();
        if state.available != state.max_concurrent {
            return Err(GateError::SlotsInUse {
                in_use: state.max_concurrent - state.available,
            });
        }
        state.max_concurrent = new_max;
        state.available = new_max;
        Ok(())
    }
}
