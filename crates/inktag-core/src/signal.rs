//! Completion gate shared between the cooperative loop and hardware jobs.

use core::cell::Cell;

use critical_section::Mutex;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignalState {
    Pending,
    Completed,
}

/// Pending/Completed flag.
///
/// The consumer arms it with [`CompletionSignal::set_waiting`], exactly one
/// producer flips it with [`CompletionSignal::signal_complete`]. Readers poll
/// and never block. Every access happens inside a critical section so the
/// flip is visible to the other core as a whole.
pub struct CompletionSignal {
    state: Mutex<Cell<SignalState>>,
}

impl core::fmt::Debug for CompletionSignal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("CompletionSignal").field(&self.state()).finish()
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionSignal {
    /// Creates a signal in the `Pending` state.
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(Cell::new(SignalState::Pending)),
        }
    }

    /// Creates a signal in the `Completed` state.
    pub const fn completed_new() -> Self {
        Self {
            state: Mutex::new(Cell::new(SignalState::Completed)),
        }
    }

    pub fn state(&self) -> SignalState {
        critical_section::with(|cs| self.state.borrow(cs).get())
    }

    /// Arms the gate for a new cycle.
    pub fn set_waiting(&self) {
        critical_section::with(|cs| self.state.borrow(cs).set(SignalState::Pending));
    }

    /// Releases the gate.
    pub fn signal_complete(&self) {
        critical_section::with(|cs| self.state.borrow(cs).set(SignalState::Completed));
    }

    /// Arms the gate only when it is currently released.
    ///
    /// Returns `false` when a cycle is already in flight.
    pub fn try_claim(&self) -> bool {
        critical_section::with(|cs| {
            let cell = self.state.borrow(cs);
            if cell.get() == SignalState::Pending {
                return false;
            }
            cell.set(SignalState::Pending);
            true
        })
    }

    pub fn completed(&self) -> bool {
        self.state() == SignalState::Completed
    }

    pub fn pending(&self) -> bool {
        self.state() == SignalState::Pending
    }
}
