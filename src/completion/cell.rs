use super::{OperationState, Outcome};
use crate::marshal::ErrorPayload;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

enum Slot<T> {
    Pending(Vec<Waker>),
    Complete(Outcome<T>),
    Abandoned,
}

/// Single-assignment outcome slot shared between one writer and any number
/// of waiters.
///
/// The slot is guarded by a mutex, so everything the writer did before
/// completing is visible to a waiter once it observes the outcome.
pub struct CompletionCell<T> {
    slot: Mutex<Slot<T>>,
    cond: Condvar,
    state: AtomicU8,
}

impl<T> CompletionCell<T> {
    fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Pending(Vec::new())),
            cond: Condvar::new(),
            state: AtomicU8::new(OperationState::Submitted as u8),
        }
    }

    pub fn state(&self) -> OperationState {
        OperationState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_complete(&self) -> bool {
        self.state().is_terminal()
    }

    fn mark_running(&self) {
        let _ = self.state.compare_exchange(
            OperationState::Submitted as u8,
            OperationState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    fn complete(&self, outcome: Outcome<T>) {
        let terminal = match &outcome {
            Outcome::Success(_) => OperationState::Succeeded,
            Outcome::Failure(_) => OperationState::Failed,
        };

        let wakers = {
            let mut slot = self.slot.lock();
            let wakers = match &mut *slot {
                Slot::Pending(wakers) => std::mem::take(wakers),
                _ => panic!("completion cell written twice"),
            };
            *slot = Slot::Complete(outcome);
            self.state.store(terminal as u8, Ordering::Release);
            self.cond.notify_all();
            wakers
        };

        for waker in wakers {
            waker.wake();
        }
    }

    fn abandon(&self) {
        let wakers = {
            let mut slot = self.slot.lock();
            let wakers = match &mut *slot {
                Slot::Pending(wakers) => std::mem::take(wakers),
                _ => return,
            };
            *slot = Slot::Abandoned;
            self.cond.notify_all();
            wakers
        };

        for waker in wakers {
            waker.wake();
        }
    }
}

impl<T: Clone> CompletionCell<T> {
    /// Block until the outcome is written.
    ///
    /// The outcome is cloned out so nothing runs under the slot lock.
    pub fn wait(&self) -> Outcome<T> {
        let mut slot = self.slot.lock();
        loop {
            match &*slot {
                Slot::Complete(outcome) => return outcome.clone(),
                Slot::Abandoned => abandoned(),
                Slot::Pending(_) => self.cond.wait(&mut slot),
            }
        }
    }

    /// The outcome, if it is already written.
    pub fn try_get(&self) -> Option<Outcome<T>> {
        match &*self.slot.lock() {
            Slot::Complete(outcome) => Some(outcome.clone()),
            Slot::Abandoned => abandoned(),
            Slot::Pending(_) => None,
        }
    }

    /// Poll for the outcome, registering `cx`'s waker while pending.
    pub fn poll_outcome(&self, cx: &mut Context<'_>) -> Poll<Outcome<T>> {
        let mut slot = self.slot.lock();
        match &mut *slot {
            Slot::Complete(outcome) => Poll::Ready(outcome.clone()),
            Slot::Abandoned => abandoned(),
            Slot::Pending(wakers) => {
                if !wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

fn abandoned() -> ! {
    panic!("operation was dropped without completing its future")
}

/// The write side of a [`CompletionCell`].
///
/// Completing consumes the completer. Dropping it unwritten abandons the
/// cell, and every waiter panics instead of blocking forever.
pub struct Completer<T> {
    cell: Option<Arc<CompletionCell<T>>>,
}

impl<T> Completer<T> {
    pub fn mark_running(&self) {
        if let Some(cell) = &self.cell {
            cell.mark_running();
        }
    }

    pub fn complete_success(self, value: T) {
        self.complete(Outcome::Success(value));
    }

    pub fn complete_failure(self, error: ErrorPayload) {
        self.complete(Outcome::Failure(error));
    }

    pub fn complete(mut self, outcome: Outcome<T>) {
        if let Some(cell) = self.cell.take() {
            cell.complete(outcome);
        }
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        if let Some(cell) = self.cell.take() {
            // Sole owner: no future was handed out, nobody to wake.
            if Arc::strong_count(&cell) == 1 {
                return;
            }
            tracing::error!("completer dropped without completing");
            cell.abandon();
        }
    }
}

impl<T> std::fmt::Debug for Completer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completer")
            .field("state", &self.cell.as_ref().map(|c| c.state()))
            .finish()
    }
}

impl<T> std::fmt::Debug for CompletionCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionCell")
            .field("state", &self.state())
            .finish()
    }
}

/// A fresh cell and its single writer.
pub fn completion_pair<T>() -> (Completer<T>, Arc<CompletionCell<T>>) {
    let cell = Arc::new(CompletionCell::new());
    (
        Completer {
            cell: Some(cell.clone()),
        },
        cell,
    )
}
