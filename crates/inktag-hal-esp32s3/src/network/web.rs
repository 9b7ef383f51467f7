//! Switches the HTTP task consults before serving a connection.

use core::sync::atomic::{AtomicBool, Ordering};

use inktag_core::{
    connect::OtaServices,
    services::web::{HttpServer, SiteRoutes},
};
use log::info;

#[derive(Debug)]
pub struct WebGate {
    serving: AtomicBool,
    site: AtomicBool,
    updates: AtomicBool,
}

impl WebGate {
    pub const fn new() -> Self {
        Self {
            serving: AtomicBool::new(false),
            site: AtomicBool::new(false),
            updates: AtomicBool::new(false),
        }
    }

    /// The listener accepts connections.
    pub fn is_serving(&self) -> bool {
        self.serving.load(Ordering::Acquire)
    }

    /// The site routes answer requests.
    pub fn site_mounted(&self) -> bool {
        self.site.load(Ordering::Acquire)
    }

    /// Firmware uploads are accepted.
    pub fn updates_exposed(&self) -> bool {
        self.updates.load(Ordering::Acquire)
    }
}

impl Default for WebGate {
    fn default() -> Self {
        Self::new()
    }
}

/// [`HttpServer`] half of a [`WebGate`].
#[derive(Clone, Copy)]
pub struct ServerSwitch(pub &'static WebGate);

impl HttpServer for ServerSwitch {
    type Error = core::convert::Infallible;

    fn start(&mut self) -> Result<(), Self::Error> {
        self.0.serving.store(true, Ordering::Release);
        info!("web: listening");
        Ok(())
    }

    fn stop(&mut self) {
        self.0.serving.store(false, Ordering::Release);
        info!("web: stopped");
    }
}

/// [`SiteRoutes`] half of a [`WebGate`].
#[derive(Clone, Copy)]
pub struct SiteSwitch(pub &'static WebGate);

impl SiteRoutes for SiteSwitch {
    type Error = core::convert::Infallible;

    fn mount(&mut self) -> Result<(), Self::Error> {
        self.0.site.store(true, Ordering::Release);
        Ok(())
    }

    fn unmount(&mut self) {
        self.0.site.store(false, Ordering::Release);
    }
}

/// [`OtaServices`] half of a [`WebGate`]: opens the upload route.
#[derive(Clone, Copy)]
pub struct UpdateSwitch(pub &'static WebGate);

impl OtaServices for UpdateSwitch {
    type Error = core::convert::Infallible;

    fn expose(&mut self, hostname: &str) -> Result<(), Self::Error> {
        self.0.updates.store(true, Ordering::Release);
        info!("web: updates open on {}", hostname);
        Ok(())
    }

    fn withdraw(&mut self) {
        self.0.updates.store(false, Ordering::Release);
        info!("web: updates closed");
    }
}
