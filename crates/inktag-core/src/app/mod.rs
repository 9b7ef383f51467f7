//! Composition roots of the two firmware images.
//!
//! [`Application`] runs the name tag: display, web server, website and
//! restart service on top of the connectivity lifecycle. [`Recovery`] runs
//! the companion update image. Both own every service and drive them from a
//! single scheduler.

mod recovery;

use log::{debug, info, warn};

pub use recovery::{Recovery, RecoveryPlatform};

use crate::{
    connect::{
        ConnectOptions, ConnectionState, ConnectionStateMachine, NetworkInterface, OtaDisabled,
        OtaServices,
    },
    control::{ControlInbox, ControlRequest},
    job::JobSpawner,
    orchestrator::{Orchestrator, Reaction, TransitionLog, Transitions},
    scheduler::{Scheduler, SchedulerError, TaskHandler, TaskId, TaskSpec},
    services::{
        TaskKind,
        connect::ConnectService,
        display::DisplayService,
        restart::{RestartReason, RestartService, SystemReset},
        web::{HttpServer, SiteRoutes, WebServerService, WebsiteService},
    },
    settings::{self, ConfigStore, StoredConnection},
    signal::CompletionSignal,
    status::{DeviceStatus, StatusBoard},
};

/// Period of the control task (request inbox and status publishing).
pub const CONTROL_INTERVAL_MS: u32 = 100;

/// Board services both images need.
pub trait Platform {
    type Network: NetworkInterface;
    type Server: HttpServer;
    type Reset: SystemReset;
    type Config: ConfigStore;
    type Inbox: ControlInbox;
}

/// Additional board services of the application image.
pub trait ApplicationPlatform: Platform {
    type Jobs: JobSpawner;
    type Site: SiteRoutes;
}

pub struct Board<P: Platform> {
    pub network: P::Network,
    pub server: P::Server,
    pub reset: P::Reset,
    pub config: P::Config,
    pub inbox: P::Inbox,
    pub status: &'static StatusBoard,
}

pub struct Application<P: ApplicationPlatform> {
    scheduler: Scheduler<TaskKind>,
    services: AppServices<P>,
}

struct AppServices<P: ApplicationPlatform> {
    connect: ConnectService<P::Network, OtaDisabled, TransitionLog>,
    display: DisplayService<P::Jobs>,
    web: WebServerService<P::Server>,
    website: WebsiteService<P::Site>,
    restart: RestartService<P::Reset>,
    orchestrator: Orchestrator,
    config: P::Config,
    inbox: P::Inbox,
    status: &'static StatusBoard,
}

impl<P> Application<P>
where
    P: ApplicationPlatform,
{
    /// `busy` is the display's completion signal and must start `Completed`.
    pub fn new(
        board: Board<P>,
        jobs: P::Jobs,
        site: P::Site,
        busy: &'static CompletionSignal,
        options: ConnectOptions,
    ) -> Self {
        let mut machine =
            ConnectionStateMachine::new(board.network, OtaDisabled, options.with_ota_exposed(false));
        machine.listen(TransitionLog::new());

        Self {
            scheduler: Scheduler::new(),
            services: AppServices {
                connect: ConnectService::new(machine),
                display: DisplayService::new(jobs, busy),
                web: WebServerService::new(board.server),
                website: WebsiteService::new(site),
                restart: RestartService::new(board.reset),
                orchestrator: Orchestrator::default(),
                config: board.config,
                inbox: board.inbox,
                status: board.status,
            },
        }
    }

    /// Loads the stored network and starts every service.
    pub fn start(&mut self) -> Result<(), SchedulerError> {
        let services = &mut self.services;
        let stored = load_config(&mut services.config);
        let config = settings::resolve(stored.as_ref());

        services.restart.begin(&mut self.scheduler)?;
        services.display.begin(&mut self.scheduler)?;
        services.connect.begin(&mut self.scheduler, config)?;
        start_control(&mut self.scheduler)?;
        info!("app: started");
        Ok(())
    }

    /// One scheduler pass; returns the number of callbacks run.
    pub fn tick(&mut self, now_ms: u64) -> usize {
        self.scheduler.execute(now_ms, &mut self.services)
    }

    pub fn state(&self) -> ConnectionState {
        self.services.connect.machine().state()
    }

    pub fn display(&self) -> &DisplayService<P::Jobs> {
        &self.services.display
    }

    pub fn status(&self) -> DeviceStatus {
        self.services.snapshot()
    }

    pub fn restart_reason(&self) -> Option<RestartReason> {
        self.services.restart.reason()
    }
}

impl<P> AppServices<P>
where
    P: ApplicationPlatform,
{
    fn snapshot(&self) -> DeviceStatus {
        let machine = self.connect.machine();
        DeviceStatus {
            state: machine.state(),
            address: machine.ip_address(),
            display_initialized: self.display.is_initialized(),
            display_busy: self.display.is_busy(),
            server_running: self.web.is_running(),
            site_mounted: self.website.is_mounted(),
            restart: self.restart.reason(),
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
                    warn!("app: web server not scheduled: {:?}", err);
                }
                if let Err(err) = self.website.begin(scheduler) {
                    warn!("app: website not scheduled: {:?}", err);
                }
            }
            Reaction::StopWeb => {
                self.website.end(scheduler);
                self.web.end(scheduler);
            }
            Reaction::Restart(reason) => {
                self.restart.restart(scheduler, reason);
            }
        }
    }

    fn handle_request(&mut self, scheduler: &mut Scheduler<TaskKind>, request: ControlRequest) {
        debug!("app: request {:?}", request);
        let result = match request {
            ControlRequest::Wipe => self.display.wipe(scheduler),
            ControlRequest::PrintTag(style) => self.display.print_tag(scheduler, style),
            ControlRequest::ShowImage(name) => self.display.show_image(scheduler, name.as_str()),
            ControlRequest::Restart => {
                self.restart.restart(scheduler, RestartReason::Plain);
                Ok(())
            }
            ControlRequest::ClearWifi => {
                clear_config(&mut self.config);
                self.restart.restart(scheduler, RestartReason::ResetWifi);
                Ok(())
            }
            ControlRequest::SaveWifi(record) => {
                if save_config(&mut self.config, &record) {
                    self.restart.restart(scheduler, RestartReason::Plain);
                }
                Ok(())
            }
            ControlRequest::UpdateActivity | ControlRequest::UpdateFinished { .. } => {
                debug!("app: updates are handled by the recovery image");
                Ok(())
            }
        };

        if let Err(err) = result {
            warn!("app: display request refused: {:?}", err);
        }
    }

    fn cleanup(&mut self, scheduler: &mut Scheduler<TaskKind>) {
        info!("app: stopping services before restart");
        self.website.end(scheduler);
        self.web.end(scheduler);
        self.connect.end(scheduler);
        let wait = self.display.end(scheduler);
        self.restart.arm_reset(scheduler, wait);
    }
}

impl<P> TaskHandler<TaskKind> for AppServices<P>
where
    P: ApplicationPlatform,
{
    fn on_enable(&mut self, _scheduler: &mut Scheduler<TaskKind>, _id: TaskId, kind: TaskKind) -> bool {
        match kind {
            TaskKind::WebsiteMount => self.website.allows(self.orchestrator.state()),
            _ => true,
        }
    }

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
            TaskKind::WebsiteMount => self.website.run(scheduler, id),
            TaskKind::DisplayInit | TaskKind::DisplayReady | TaskKind::DisplayDone => {
                self.display.run(scheduler, kind)
            }
            TaskKind::RestartCleanup => self.cleanup(scheduler),
            TaskKind::RestartReset => match self.display.hibernate_if_owed() {
                Some(wait) => self.restart.defer_reset(scheduler, wait),
                None => self.restart.fire(),
            },
        }
    }
}

fn drain_transitions<N, O>(machine: &mut ConnectionStateMachine<N, O, TransitionLog>) -> Transitions
where
    N: NetworkInterface,
    O: OtaServices,
{
    machine
        .listener_mut()
        .map(TransitionLog::take)
        .unwrap_or_default()
}

fn start_control(scheduler: &mut Scheduler<TaskKind>) -> Result<TaskId, SchedulerError> {
    let task = scheduler.add(TaskSpec::forever(TaskKind::ControlPoll, CONTROL_INTERVAL_MS))?;
    scheduler.enable(task);
    Ok(task)
}

fn load_config<C: ConfigStore>(config: &mut C) -> Option<StoredConnection> {
    match config.load() {
        Ok(stored) => {
            info!("app: stored network: {}", stored.is_some());
            stored
        }
        Err(err) => {
            warn!("app: settings unreadable: {:?}", err);
            None
        }
    }
}

fn clear_config<C: ConfigStore>(config: &mut C) {
    if let Err(err) = config.clear() {
        warn!("app: clearing settings failed: {:?}", err);
    }
}

fn save_config<C: ConfigStore>(config: &mut C, record: &StoredConnection) -> bool {
    match config.save(record) {
        Ok(()) => true,
        Err(err) => {
            warn!("app: saving settings failed: {:?}", err);
            false
        }
    }
}

#[cfg(test)]
mod tests;
