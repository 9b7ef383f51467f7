//! Display service: serializes panel work onto the hardware-job context.
//!
//! At most one job is in flight. The busy signal doubles as the gate of the
//! follow-up tasks, so the cooperative loop never waits on the panel.

use log::{info, warn};

use super::{RETRY_DELAY_MS, TaskKind};
use crate::{
    job::{JobSpawner, PanelJob},
    panel::{ImageName, PanelCommand, TagStyle},
    scheduler::{Scheduler, SchedulerError, TaskId, TaskSpec},
    signal::CompletionSignal,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DisplayError {
    NotInitialized,
    /// A job is still running; nothing was queued.
    Busy,
    /// The job context refused the job.
    Rejected,
    NameTooLong,
}

#[derive(Clone, Copy, Debug)]
struct DisplayTasks {
    init: TaskId,
    ready: TaskId,
    done: TaskId,
}

pub struct DisplayService<J> {
    spawner: J,
    busy: &'static CompletionSignal,
    initialized: bool,
    tasks: Option<DisplayTasks>,
    in_flight: Option<PanelCommand>,
    last_finished: Option<PanelCommand>,
    /// Set by `end()` when a job held the panel; see [`DisplayService::hibernate_if_owed`].
    hibernate_owed: bool,
}

impl<J> DisplayService<J>
where
    J: JobSpawner,
{
    /// `busy` must start out `Completed`.
    pub fn new(spawner: J, busy: &'static CompletionSignal) -> Self {
        Self {
            spawner,
            busy,
            initialized: false,
            tasks: None,
            in_flight: None,
            last_finished: None,
            hibernate_owed: false,
        }
    }

    /// Registers the service tasks and schedules panel bring-up.
    pub fn begin(&mut self, scheduler: &mut Scheduler<TaskKind>) -> Result<(), SchedulerError> {
        let tasks = match self.tasks {
            Some(tasks) => tasks,
            None => {
                let tasks = DisplayTasks {
                    init: scheduler.add(TaskSpec::once(TaskKind::DisplayInit))?,
                    ready: scheduler.add(TaskSpec::once(TaskKind::DisplayReady))?,
                    done: scheduler.add(TaskSpec::once(TaskKind::DisplayDone))?,
                };
                self.tasks = Some(tasks);
                tasks
            }
        };

        scheduler.enable(tasks.init);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_busy(&self) -> bool {
        self.busy.pending()
    }

    /// Command of the job currently running.
    pub fn in_flight(&self) -> Option<&PanelCommand> {
        self.in_flight.as_ref()
    }

    /// Last content command whose job finished.
    ///
    /// The job context does not report back how the job went, so an image
    /// that failed to decode still lands here.
    pub fn last_finished(&self) -> Option<&PanelCommand> {
        self.last_finished.as_ref()
    }

    pub fn wipe(&mut self, scheduler: &mut Scheduler<TaskKind>) -> Result<(), DisplayError> {
        self.request(scheduler, PanelCommand::Wipe)
    }

    pub fn print_tag(
        &mut self,
        scheduler: &mut Scheduler<TaskKind>,
        style: TagStyle,
    ) -> Result<(), DisplayError> {
        self.request(scheduler, PanelCommand::PrintTag(style))
    }

    /// Shows the bitmap pair `<name>.b.bmp` / `<name>.r.bmp`.
    pub fn show_image(
        &mut self,
        scheduler: &mut Scheduler<TaskKind>,
        name: &str,
    ) -> Result<(), DisplayError> {
        let name = ImageName::try_from(name).map_err(|_| DisplayError::NameTooLong)?;
        self.request(scheduler, PanelCommand::ShowImage(name))
    }

    pub fn power_off(&mut self, scheduler: &mut Scheduler<TaskKind>) -> Result<(), DisplayError> {
        self.request(scheduler, PanelCommand::PowerOff)
    }

    /// Routes a task callback owned by this service.
    pub fn run(&mut self, scheduler: &mut Scheduler<TaskKind>, kind: TaskKind) {
        match kind {
            TaskKind::DisplayInit => self.start_init(scheduler),
            TaskKind::DisplayReady => {
                self.initialized = true;
                self.finish_job();
                info!("display: initialized");
            }
            TaskKind::DisplayDone => self.finish_job(),
            _ => {}
        }
    }

    /// Removes the tasks and puts the panel to sleep.
    ///
    /// Returns the signal to wait on before cutting power, if any job is
    /// running or was started here. When a job is still running the
    /// hibernate is owed until [`DisplayService::hibernate_if_owed`].
    pub fn end(&mut self, scheduler: &mut Scheduler<TaskKind>) -> Option<&'static CompletionSignal> {
        if let Some(tasks) = self.tasks.take() {
            scheduler.remove(tasks.init);
            scheduler.remove(tasks.ready);
            scheduler.remove(tasks.done);
        }

        let was_initialized = core::mem::replace(&mut self.initialized, false);
        if self.busy.pending() {
            warn!("display: ending with {:?} in flight", self.in_flight);
            self.hibernate_owed = match self.in_flight {
                Some(PanelCommand::Hibernate | PanelCommand::PowerOff) => false,
                Some(PanelCommand::Initialize) => true,
                _ => was_initialized,
            };
            return Some(self.busy);
        }
        if !was_initialized {
            return None;
        }

        match self.dispatch(PanelCommand::Hibernate) {
            Ok(()) => Some(self.busy),
            Err(err) => {
                warn!("display: hibernate not started: {:?}", err);
                None
            }
        }
    }

    /// Starts the hibernate `end()` had to skip, once the running job is
    /// done. Returns the signal of the new job.
    pub fn hibernate_if_owed(&mut self) -> Option<&'static CompletionSignal> {
        if !core::mem::take(&mut self.hibernate_owed) {
            return None;
        }
        self.finish_job();
        match self.dispatch(PanelCommand::Hibernate) {
            Ok(()) => Some(self.busy),
            Err(err) => {
                warn!("display: late hibernate not started: {:?}", err);
                None
            }
        }
    }

    fn request(
        &mut self,
        scheduler: &mut Scheduler<TaskKind>,
        command: PanelCommand,
    ) -> Result<(), DisplayError> {
        if !self.initialized {
            return Err(DisplayError::NotInitialized);
        }

        self.dispatch(command)?;
        if let Some(tasks) = self.tasks {
            scheduler.enable_after(tasks.done, self.busy);
        }
        Ok(())
    }

    fn start_init(&mut self, scheduler: &mut Scheduler<TaskKind>) {
        let Some(tasks) = self.tasks else {
            return;
        };

        match self.dispatch(PanelCommand::Initialize) {
            Ok(()) => {
                scheduler.enable_after(tasks.ready, self.busy);
            }
            Err(err) => {
                warn!("display: init not started: {:?}, retrying", err);
                scheduler.enable_delayed(tasks.init, RETRY_DELAY_MS);
            }
        }
    }

    fn dispatch(&mut self, command: PanelCommand) -> Result<(), DisplayError> {
        if !self.busy.try_claim() {
            warn!(
                "display: busy with {:?}, {:?} rejected",
                self.in_flight, command
            );
            return Err(DisplayError::Busy);
        }

        let job = PanelJob {
            command: command.clone(),
            signal: self.busy,
        };
        if self.spawner.spawn(job).is_err() {
            self.busy.signal_complete();
            warn!("display: job context refused {:?}", command);
            return Err(DisplayError::Rejected);
        }

        info!("display: dispatched {:?}", command);
        self.in_flight = Some(command);
        Ok(())
    }

    fn finish_job(&mut self) {
        match self.in_flight.take() {
            Some(command @ (PanelCommand::PowerOff | PanelCommand::Hibernate)) => {
                info!("display: {:?} finished", command);
            }
            Some(command) => {
                info!("display: {:?} finished", command);
                self.last_finished = Some(command);
            }
            None => {}
        }
    }
}
