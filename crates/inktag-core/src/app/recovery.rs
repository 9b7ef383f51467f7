//! Recovery image: connectivity with firmware updates and a portal, no
//! display and no site.

use log::{debug, info, warn};

use super::{
    Board, Platform, clear_config, drain_transitions, load_config, save_config, start_control,
};
use crate::{
    connect::{ConnectOptions, ConnectionState, ConnectionStateMachine, OtaServices},
    control::{ControlInbox, ControlRequest},
    ota::{OTA_CLEANUP_DELAY_MS, OTA_RESTART_DELAY_MS},
    orchestrator::{Orchestrator, Reaction, TransitionLog},
    scheduler::{Scheduler, SchedulerError, TaskHandler, TaskId},
    services::{
        TaskKind,
        connect::ConnectService,
        restart::{RestartReason, RestartService},
        web::WebServerService,
    },
    settings,
    status::{DeviceStatus, StatusBoard},
};

/// Board services of the recovery image.
pub trait RecoveryPlatform: Platform {
    type Ota: OtaServices;
}

pub struct Recovery<P: RecoveryPlatform> {
    scheduler: Scheduler<TaskKind>,
    services: RecoveryServices<P>,
}

struct RecoveryServices<P: RecoveryPlatform> {
    connect: ConnectService<P::Network, P::Ota, TransitionLog>,
    web: WebServerService<P::Server>,
    restart: RestartService<P::Reset>,
    orchestrator: Orchestrator,
    config: P::Config,
    inbox: P::Inbox,
    status: &'static StatusBoard,
}

impl<P> Recovery<P>
where
    P: RecoveryPlatform,
{
    pub fn new(board: Board<P>, ota: P::Ota, options: ConnectOptions) -> Self {
        let mut machine =
            ConnectionStateMachine::new(board.network, ota, options.with_ota_exposed(true));
        machine.listen(TransitionLog::new());

        Self {
            scheduler: Scheduler::new(),
            services: RecoveryServices {
                connect: ConnectService::new(machine),
                web: WebServerService::new(board.server),
                restart: RestartService::new(board.reset),
                orchestrator: Orchestrator::default(),
                config: board.config,
                inbox: board.inbox,
                status: board.status,
            },
        }
    }

    pub fn start(&mut self) -> Result<(), SchedulerError> {
        let services = &mut self.services;
        let stored = load_config(&mut services.config);
        let config = settings::resolve(stored.as_ref());

        services.restart.begin(&mut self.scheduler)?;
        services.connect.begin(&mut self.scheduler, config)?;
        start_control(&mut self.scheduler)?;
        info!("recovery: started");
        Ok(())
    }

    pub fn tick(&mut self, now_ms: u64) -> usize {
        self.scheduler.execute(now_ms, &mut self.services)
    }

    pub fn state(&self) -> ConnectionState {
        self.services.connect.machine().state()
    }

    pub fn status(&self) -> DeviceStatus {
        self.services.snapshot()
    }

    pub fn restart_reason(&self) -> Option<RestartReason> {
        self.services.restart.reason()
    }
}

impl<P> RecoveryServices<P>
where
    P: RecoveryPlatform,
{
    fn snapshot(&self) -> DeviceStatus {
        let machine = self.connect.machine();
        DeviceStatus {
            state: machine.state(),
            address: machine.ip_address(),
            server_running: self.web.is_running(),
            restart: self.restart.reason(),
            ..DeviceStatus::boot()
        }
    }

    fn orchestrate(&mut self, scheduler: &mut Scheduler<TaskKind>) {
        let now_ms = scheduler.now_ms();
        let mut transitions = drain_transitions(self.connect.machine_mut());
        while let Some((previous, next)) = transitions.pop_front() {
            let reaction = self.orchestrator.on_transition(previous, next);
            self.react(scheduler, reaction);
        }

        let stalled = self
            .connect
            .machine()
            .stalled(now_ms, self.orchestrator.grace_ms());
        let reaction = self.orchestrator.watchdog(stalled);
        self.react(scheduler, reaction);
    }

    fn react(&mut self, scheduler: &mut Scheduler<TaskKind>, reaction: Reaction) {
        match reaction {
            Reaction::None => {}
            Reaction::StartWeb => {
                if let Err(err) = self.web.begin(scheduler) {
                    warn!("recovery: web server not scheduled: {:?}", err);
                }
            }
            Reaction::StopWeb => self.web.end(scheduler),
            Reaction::Restart(reason) => {
                self.restart.restart(scheduler, reason);
            }
        }
    }

    fn handle_request(&mut self, scheduler: &mut Scheduler<TaskKind>, request: ControlRequest) {
        match request {
            ControlRequest::UpdateActivity => {
                self.connect
                    .machine_mut()
                    .note_update_activity(scheduler.now_ms());
            }
            ControlRequest::UpdateFinished { success } => {
                let reason = if success {
                    RestartReason::UpdateApplied
                } else {
                    RestartReason::UpdateFailed
                };
                self.restart.restart_delayed(
                    scheduler,
                    OTA_CLEANUP_DELAY_MS,
                    OTA_RESTART_DELAY_MS,
                    reason,
                );
            }
            ControlRequest::Restart => {
                self.restart.restart(scheduler, RestartReason::Plain);
            }
            ControlRequest::ClearWifi => {
                clear_config(&mut self.config);
                self.restart.restart(scheduler, RestartReason::ResetWifi);
            }
            ControlRequest::SaveWifi(record) => {
                if save_config(&mut self.config, &record) {
                    self.restart.restart(scheduler, RestartReason::Plain);
                }
            }
            ControlRequest::Wipe | ControlRequest::PrintTag(_) | ControlRequest::ShowImage(_) => {
                debug!("recovery: no display in this image");
            }
        }
    }

    fn cleanup(&mut self, scheduler: &mut Scheduler<TaskKind>) {
        info!("recovery: stopping services before restart");
        self.web.end(scheduler);
        self.connect.end(scheduler);
        self.restart.arm_reset(scheduler, None);
    }
}

impl<P> TaskHandler<TaskKind> for RecoveryServices<P>
where
    P: RecoveryPlatform,
{
    fn run(&mut self, scheduler: &mut Scheduler<TaskKind>, id: TaskId, kind: TaskKind) {
        match kind {
            TaskKind::ConnectPoll => {
                self.connect.poll(scheduler.now_ms());
                self.orchestrate(scheduler);
            }
            TaskKind::ControlPoll => {
                while let Some(request) = self.inbox.next_request() {
                    self.handle_request(scheduler, request);
                }
                self.status.publish(&self.snapshot());
            }
            TaskKind::WebServerStart => self.web.run(scheduler, id),
            TaskKind::RestartCleanup => self.cleanup(scheduler),
            TaskKind::RestartReset => self.restart.fire(),
            TaskKind::WebsiteMount
            | TaskKind::DisplayInit
            | TaskKind::DisplayReady
            | TaskKind::DisplayDone => {
                warn!("recovery: unexpected task {:?}", kind);
            }
        }
    }
}
