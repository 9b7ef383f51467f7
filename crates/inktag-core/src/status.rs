//! Device status shared between the control loop and the HTTP tasks.

use core::{
    net::Ipv4Addr,
    sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering},
};

use crate::{connect::ConnectionState, services::restart::RestartReason};

const NO_RESTART: u8 = u8::MAX;

/// Immutable status snapshot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DeviceStatus {
    pub state: ConnectionState,
    pub address: Option<Ipv4Addr>,
    pub display_initialized: bool,
    pub display_busy: bool,
    pub server_running: bool,
    pub site_mounted: bool,
    pub restart: Option<RestartReason>,
}

impl DeviceStatus {
    pub const fn boot() -> Self {
        Self {
            state: ConnectionState::Disabled,
            address: None,
            display_initialized: false,
            display_busy: false,
            server_running: false,
            site_mounted: false,
            restart: None,
        }
    }
}

/// Lock-free shared status; the control loop is the only writer.
#[derive(Debug)]
pub struct StatusBoard {
    state: AtomicU8,
    address: AtomicU32,
    display_initialized: AtomicBool,
    display_busy: AtomicBool,
    server_running: AtomicBool,
    site_mounted: AtomicBool,
    restart: AtomicU8,
    revision: AtomicU32,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Disabled as u8),
            address: AtomicU32::new(0),
            display_initialized: AtomicBool::new(false),
            display_busy: AtomicBool::new(false),
            server_running: AtomicBool::new(false),
            site_mounted: AtomicBool::new(false),
            restart: AtomicU8::new(NO_RESTART),
            revision: AtomicU32::new(0),
        }
    }

    pub fn snapshot(&self) -> DeviceStatus {
        let address = self.address.load(Ordering::Acquire);
        DeviceStatus {
            state: ConnectionState::from_u8(self.state.load(Ordering::Acquire))
                .unwrap_or(ConnectionState::Disabled),
            address: (address != 0).then(|| Ipv4Addr::from_bits(address)),
            display_initialized: self.display_initialized.load(Ordering::Acquire),
            display_busy: self.display_busy.load(Ordering::Acquire),
            server_running: self.server_running.load(Ordering::Acquire),
            site_mounted: self.site_mounted.load(Ordering::Acquire),
            restart: RestartReason::from_u8(self.restart.load(Ordering::Acquire)),
        }
    }

    /// Bumped whenever a published field changes.
    pub fn revision(&self) -> u32 {
        self.revision.load(Ordering::Acquire)
    }

    pub fn publish(&self, status: &DeviceStatus) {
        let mut changed = false;
        changed |= Self::store_u8(&self.state, status.state.as_u8());
        changed |= Self::store_u32(
            &self.address,
            status.address.map(Ipv4Addr::to_bits).unwrap_or(0),
        );
        changed |= Self::store_bool(&self.display_initialized, status.display_initialized);
        changed |= Self::store_bool(&self.display_busy, status.display_busy);
        changed |= Self::store_bool(&self.server_running, status.server_running);
        changed |= Self::store_bool(&self.site_mounted, status.site_mounted);
        changed |= Self::store_u8(
            &self.restart,
            status.restart.map(RestartReason::as_u8).unwrap_or(NO_RESTART),
        );

        if changed {
            self.revision.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn store_bool(slot: &AtomicBool, value: bool) -> bool {
        slot.swap(value, Ordering::AcqRel) != value
    }

    fn store_u8(slot: &AtomicU8, value: u8) -> bool {
        slot.swap(value, Ordering::AcqRel) != value
    }

    fn store_u32(slot: &AtomicU32, value: u32) -> bool {
        slot.swap(value, Ordering::AcqRel) != value
    }
}
