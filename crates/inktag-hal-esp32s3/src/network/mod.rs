//! Radio state shared between the async Wi-Fi driver and the control loop.
//!
//! The control loop talks to the driver through [`RadioLink`], which only
//! queues commands and drains events; the driver task owns the controller
//! and the IP stacks and reports back through the same [`RadioShared`].

use core::{
    net::Ipv4Addr,
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
};

use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
use heapless::String;
use inktag_core::connect::{
    AccessPointSettings, NetworkEvent, NetworkInterface, PASSWORD_MAX_LEN, SSID_MAX_LEN,
    StationSettings, StaticIp,
};
use log::{debug, warn};

pub mod web;

pub const HOSTNAME_MAX_LEN: usize = 32;
const COMMAND_QUEUE: usize = 4;
const EVENT_QUEUE: usize = 8;

/// Work for the driver task.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RadioCommand {
    Station {
        hostname: String<HOSTNAME_MAX_LEN>,
        ssid: String<SSID_MAX_LEN>,
        password: String<PASSWORD_MAX_LEN>,
        static_ip: Option<StaticIp>,
    },
    AccessPoint {
        ssid: String<SSID_MAX_LEN>,
        password: Option<String<PASSWORD_MAX_LEN>>,
        address: Ipv4Addr,
        prefix_len: u8,
    },
    Disconnect,
    Reconnect,
    Shutdown,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LinkError {
    /// A setting does not fit its buffer.
    TooLong,
    /// The driver has not drained earlier commands.
    Busy,
}

/// Lock-free address state plus the command and event queues.
pub struct RadioShared {
    commands: Channel<CriticalSectionRawMutex, RadioCommand, COMMAND_QUEUE>,
    events: Channel<CriticalSectionRawMutex, NetworkEvent, EVENT_QUEUE>,
    address: AtomicU32,
    has_address: AtomicBool,
    dns_answer: AtomicU32,
    dns_running: AtomicBool,
}

impl RadioShared {
    pub const fn new() -> Self {
        Self {
            commands: Channel::new(),
            events: Channel::new(),
            address: AtomicU32::new(0),
            has_address: AtomicBool::new(false),
            dns_answer: AtomicU32::new(0),
            dns_running: AtomicBool::new(false),
        }
    }

    /// Next command for the driver task.
    pub async fn next_command(&self) -> RadioCommand {
        self.commands.receive().await
    }

    /// Reports a driver event to the control loop.
    pub fn post_event(&self, event: NetworkEvent) {
        debug!("radio: event {:?}", event);
        if self.events.try_send(event).is_err() {
            warn!("radio: event queue full, dropped {:?}", event);
        }
    }

    pub fn set_address(&self, address: Option<Ipv4Addr>) {
        let raw = address.map(u32::from).unwrap_or(0);
        self.address.store(raw, Ordering::Release);
        self.has_address.store(address.is_some(), Ordering::Release);
    }

    pub fn address(&self) -> Option<Ipv4Addr> {
        self.has_address
            .load(Ordering::Acquire)
            .then(|| Ipv4Addr::from(self.address.load(Ordering::Acquire)))
    }

    /// Address every DNS query is answered with, while the captive DNS runs.
    pub fn dns_answer(&self) -> Option<Ipv4Addr> {
        self.dns_running
            .load(Ordering::Acquire)
            .then(|| Ipv4Addr::from(self.dns_answer.load(Ordering::Acquire)))
    }

    fn set_dns_answer(&self, answer: Option<Ipv4Addr>) {
        if let Some(answer) = answer {
            self.dns_answer.store(answer.into(), Ordering::Release);
        }
        self.dns_running.store(answer.is_some(), Ordering::Release);
    }

    fn send(&self, command: RadioCommand) -> Result<(), LinkError> {
        self.commands.try_send(command).map_err(|_| LinkError::Busy)
    }
}

impl Default for RadioShared {
    fn default() -> Self {
        Self::new()
    }
}

/// [`NetworkInterface`] handed to the connection state machine.
#[derive(Clone, Copy)]
pub struct RadioLink {
    shared: &'static RadioShared,
}

impl RadioLink {
    pub const fn new(shared: &'static RadioShared) -> Self {
        Self { shared }
    }

    fn send_or_log(&self, command: RadioCommand) {
        if let Err(err) = self.shared.send(command) {
            warn!("radio: command dropped: {:?}", err);
        }
    }
}

impl NetworkInterface for RadioLink {
    type Error = LinkError;

    fn enter_station(&mut self, settings: &StationSettings<'_>) -> Result<(), Self::Error> {
        self.shared.send(RadioCommand::Station {
            hostname: bounded(settings.hostname)?,
            ssid: bounded(settings.ssid)?,
            password: bounded(settings.password)?,
            static_ip: settings.static_ip,
        })
    }

    fn enter_access_point(
        &mut self,
        settings: &AccessPointSettings<'_>,
    ) -> Result<(), Self::Error> {
        let password = match settings.password {
            Some(password) => Some(bounded(password)?),
            None => None,
        };
        self.shared.send(RadioCommand::AccessPoint {
            ssid: bounded(settings.ssid)?,
            password,
            address: settings.address,
            prefix_len: settings.prefix_len,
        })
    }

    fn disconnect(&mut self) {
        self.shared.set_address(None);
        self.send_or_log(RadioCommand::Disconnect);
    }

    fn reconnect(&mut self) {
        self.send_or_log(RadioCommand::Reconnect);
    }

    fn shutdown(&mut self) {
        self.shared.set_address(None);
        self.shared.set_dns_answer(None);
        self.send_or_log(RadioCommand::Shutdown);
    }

    fn start_captive_dns(&mut self, answer: Ipv4Addr) -> Result<(), Self::Error> {
        self.shared.set_dns_answer(Some(answer));
        Ok(())
    }

    fn stop_captive_dns(&mut self) {
        self.shared.set_dns_answer(None);
    }

    fn next_event(&mut self) -> Option<NetworkEvent> {
        self.shared.events.try_receive().ok()
    }

    fn ip_address(&self) -> Option<Ipv4Addr> {
        self.shared.address()
    }
}

fn bounded<const N: usize>(text: &str) -> Result<String<N>, LinkError> {
    String::try_from(text).map_err(|_| LinkError::TooLong)
}

