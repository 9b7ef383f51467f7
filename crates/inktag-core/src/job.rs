//! Hand-off of panel work to the preemptive job context.

use crate::{panel::PanelCommand, signal::CompletionSignal};

/// One unit of panel work. The worker flips `signal` when it is done,
/// whatever the outcome.
#[derive(Clone, Debug)]
pub struct PanelJob {
    pub command: PanelCommand,
    pub signal: &'static CompletionSignal,
}

/// The job context refused to start a job (pool exhausted).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct JobRejected;

/// Starts a [`PanelJob`] on a context with its own stack and priority.
pub trait JobSpawner {
    fn spawn(&mut self, job: PanelJob) -> Result<(), JobRejected>;
}
