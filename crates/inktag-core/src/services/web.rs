//! HTTP server lifecycle and the site routes mounted on top of it.

use core::fmt::Debug;

use log::{debug, info, warn};

use super::{RETRY_DELAY_MS, TaskKind};
use crate::{
    connect::ConnectionState,
    scheduler::{Scheduler, SchedulerError, TaskId, TaskSpec},
};

/// Listener side of the HTTP stack.
pub trait HttpServer {
    type Error: Debug;

    fn start(&mut self) -> Result<(), Self::Error>;
    fn stop(&mut self);
}

/// Control pages served by a running [`HttpServer`].
pub trait SiteRoutes {
    type Error: Debug;

    fn mount(&mut self) -> Result<(), Self::Error>;
    fn unmount(&mut self);
}

pub struct WebServerService<S> {
    server: S,
    task: Option<TaskId>,
    running: bool,
}

impl<S> WebServerService<S>
where
    S: HttpServer,
{
    pub const fn new(server: S) -> Self {
        Self {
            server,
            task: None,
            running: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Stops a running server, then schedules a fresh start.
    pub fn begin(&mut self, scheduler: &mut Scheduler<TaskKind>) -> Result<(), SchedulerError> {
        if self.running {
            info!("web: restarting server");
            self.server.stop();
            self.running = false;
        }

        let task = match self.task {
            Some(task) => task,
            None => {
                let task = scheduler.add(TaskSpec::once(TaskKind::WebServerStart))?;
                self.task = Some(task);
                task
            }
        };
        scheduler.enable(task);
        Ok(())
    }

    pub fn run(&mut self, scheduler: &mut Scheduler<TaskKind>, id: TaskId) {
        match self.server.start() {
            Ok(()) => {
                self.running = true;
                info!("web: server started");
            }
            Err(err) => {
                warn!("web: server start failed: {:?}", err);
                scheduler.enable_delayed(id, RETRY_DELAY_MS);
            }
        }
    }

    pub fn end(&mut self, scheduler: &mut Scheduler<TaskKind>) {
        if let Some(task) = self.task.take() {
            scheduler.remove(task);
        }
        if self.running {
            self.server.stop();
            self.running = false;
            info!("web: server stopped");
        }
    }
}

pub struct WebsiteService<R> {
    routes: R,
    task: Option<TaskId>,
    mounted: bool,
}

impl<R> WebsiteService<R>
where
    R: SiteRoutes,
{
    pub const fn new(routes: R) -> Self {
        Self {
            routes,
            task: None,
            mounted: false,
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Schedules mounting; the task is guarded by [`Self::allows`].
    pub fn begin(&mut self, scheduler: &mut Scheduler<TaskKind>) -> Result<(), SchedulerError> {
        let task = match self.task {
            Some(task) => task,
            None => {
                let task = scheduler.add(TaskSpec::once(TaskKind::WebsiteMount).guarded())?;
                self.task = Some(task);
                task
            }
        };
        scheduler.enable(task);
        Ok(())
    }

    /// Enable guard: the site only goes up on a usable network.
    pub fn allows(&self, state: ConnectionState) -> bool {
        let allowed = state.serves_site();
        if !allowed {
            debug!("website: not mounting in {:?}", state);
        }
        allowed
    }

    pub fn run(&mut self, scheduler: &mut Scheduler<TaskKind>, id: TaskId) {
        if self.mounted {
            return;
        }

        match self.routes.mount() {
            Ok(()) => {
                self.mounted = true;
                info!("website: mounted");
            }
            Err(err) => {
                warn!("website: mount failed: {:?}", err);
                scheduler.enable_delayed(id, RETRY_DELAY_MS);
            }
        }
    }

    pub fn end(&mut self, scheduler: &mut Scheduler<TaskKind>) {
        if let Some(task) = self.task.take() {
            scheduler.remove(task);
        }
        if self.mounted {
            self.routes.unmount();
            self.mounted = false;
            info!("website: unmounted");
        }
    }
}
