//! Periodic driver of the connectivity state machine.

use super::TaskKind;
use crate::{
    connect::{
        ConnectionConfig, ConnectionStateMachine, NetworkInterface, OtaServices, StateListener,
    },
    scheduler::{Scheduler, SchedulerError, TaskId, TaskSpec},
};

pub const POLL_INTERVAL_MS: u32 = 50;

pub struct ConnectService<N, O, L> {
    machine: ConnectionStateMachine<N, O, L>,
    task: Option<TaskId>,
}

impl<N, O, L> ConnectService<N, O, L>
where
    N: NetworkInterface,
    O: OtaServices,
    L: StateListener,
{
    pub fn new(machine: ConnectionStateMachine<N, O, L>) -> Self {
        Self {
            machine,
            task: None,
        }
    }

    pub fn machine(&self) -> &ConnectionStateMachine<N, O, L> {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut ConnectionStateMachine<N, O, L> {
        &mut self.machine
    }

    /// Starts an attempt cycle and the poll task.
    pub fn begin(
        &mut self,
        scheduler: &mut Scheduler<TaskKind>,
        config: ConnectionConfig,
    ) -> Result<bool, SchedulerError> {
        let task = match self.task {
            Some(task) => task,
            None => {
                let task = scheduler.add(TaskSpec::forever(TaskKind::ConnectPoll, POLL_INTERVAL_MS))?;
                self.task = Some(task);
                task
            }
        };

        let started = self.machine.begin(config, scheduler.now_ms());
        scheduler.enable(task);
        Ok(started)
    }

    pub fn poll(&mut self, now_ms: u64) {
        self.machine.poll(now_ms);
    }

    pub fn end(&mut self, scheduler: &mut Scheduler<TaskKind>) {
        if let Some(task) = self.task.take() {
            scheduler.remove(task);
        }
        self.machine.end(scheduler.now_ms());
    }
}
