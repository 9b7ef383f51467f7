//! Maps connectivity transitions onto service start/stop decisions.

use heapless::Deque;
use log::{error, warn};

use crate::{
    connect::{ConnectionState, StateListener},
    services::restart::RestartReason,
};

/// Time a bring-up state (`Enabled`, `ConnectTimeout`, `ApStarting`) may
/// last before the device restarts.
pub const AP_START_GRACE_MS: u32 = 30_000;

const LOG_CAPACITY: usize = 16;

/// Drained `(previous, next)` pairs, oldest first.
pub type Transitions = Deque<(ConnectionState, ConnectionState), LOG_CAPACITY>;

/// Buffers transitions until the control loop drains them.
#[derive(Debug, Default)]
pub struct TransitionLog {
    pending: Transitions,
}

impl TransitionLog {
    pub const fn new() -> Self {
        Self {
            pending: Deque::new(),
        }
    }

    /// Takes everything recorded so far, oldest first.
    pub fn take(&mut self) -> Transitions {
        core::mem::replace(&mut self.pending, Deque::new())
    }
}

impl StateListener for TransitionLog {
    fn on_transition(&mut self, previous: ConnectionState, next: ConnectionState) {
        if self.pending.is_full() {
            warn!("orchestrator: transition log full, dropping oldest");
            self.pending.pop_front();
        }
        let _ = self.pending.push_back((previous, next));
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Reaction {
    None,
    /// Start the web server, then the site on top of it.
    StartWeb,
    StopWeb,
    Restart(RestartReason),
}

#[derive(Debug)]
pub struct Orchestrator {
    state: ConnectionState,
    grace_ms: u32,
    stall_reported: bool,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(AP_START_GRACE_MS)
    }
}

impl Orchestrator {
    pub const fn new(grace_ms: u32) -> Self {
        Self {
            state: ConnectionState::Disabled,
            grace_ms,
            stall_reported: false,
        }
    }

    /// Last state seen through [`Self::on_transition`].
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn grace_ms(&self) -> u32 {
        self.grace_ms
    }

    pub fn on_transition(&mut self, _previous: ConnectionState, next: ConnectionState) -> Reaction {
        self.state = next;
        match next {
            ConnectionState::Connected | ConnectionState::ApStarted => Reaction::StartWeb,
            ConnectionState::Disconnected => Reaction::StopWeb,
            ConnectionState::OtaTimeout => Reaction::Restart(RestartReason::OtaIdle),
            _ => Reaction::None,
        }
    }

    /// Reports a bring-up stall once.
    pub fn watchdog(&mut self, stalled: bool) -> Reaction {
        if !stalled || self.stall_reported {
            return Reaction::None;
        }

        error!(
            "orchestrator: stuck in {:?} for {} ms",
            self.state, self.grace_ms
        );
        self.stall_reported = true;
        Reaction::Restart(RestartReason::Fatal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    #[test]
    fn usable_networks_start_the_web_stack() {
        let mut orchestrator = Orchestrator::default();
        assert_eq!(orchestrator.on_transition(Connecting, Connected), Reaction::StartWeb);
        assert_eq!(orchestrator.on_transition(ApStarting, ApStarted), Reaction::StartWeb);
        assert_eq!(orchestrator.on_transition(Connected, Disconnected), Reaction::StopWeb);
        assert_eq!(orchestrator.on_transition(Disconnected, Reconnecting), Reaction::None);
        assert_eq!(orchestrator.state(), Reconnecting);
    }

    #[test]
    fn ota_idle_requests_restart() {
        let mut orchestrator = Orchestrator::default();
        assert_eq!(
            orchestrator.on_transition(OtaStarted, OtaTimeout),
            Reaction::Restart(RestartReason::OtaIdle)
        );
    }

    #[test]
    fn stall_is_reported_once() {
        let mut orchestrator = Orchestrator::new(10);
        assert_eq!(orchestrator.watchdog(false), Reaction::None);
        assert_eq!(
            orchestrator.watchdog(true),
            Reaction::Restart(RestartReason::Fatal)
        );
        assert_eq!(orchestrator.watchdog(true), Reaction::None);
    }

    #[test]
    fn log_keeps_newest_transitions() {
        let mut log = TransitionLog::new();
        for _ in 0..LOG_CAPACITY {
            log.on_transition(Disabled, Enabled);
        }
        log.on_transition(Enabled, ApStarting);

        let drained = log.take();
        assert_eq!(drained.len(), LOG_CAPACITY);
        assert_eq!(drained.back(), Some(&(Enabled, ApStarting)));
        assert!(log.take().is_empty());
    }
}
