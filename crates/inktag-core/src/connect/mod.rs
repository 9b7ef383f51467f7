//! Connectivity lifecycle: station join, access-point fallback, OTA exposure.

mod machine;

use core::{convert::Infallible, fmt::Debug, net::Ipv4Addr};

use heapless::String;

pub use machine::ConnectionStateMachine;

pub const SSID_MAX_LEN: usize = 32;
pub const PASSWORD_MAX_LEN: usize = 64;
/// WPA2 minimum; shorter access-point passwords start an open network.
pub const AP_PASSWORD_MIN_LEN: usize = 8;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum ConnectionState {
    Disabled = 0,
    Enabled = 1,
    Connecting = 2,
    ConnectTimeout = 3,
    Connected = 4,
    Disconnected = 5,
    Reconnecting = 6,
    ApStarting = 7,
    ApStarted = 8,
    OtaStarting = 9,
    OtaStarted = 10,
    OtaTimeout = 11,
}

impl ConnectionState {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Disabled,
            1 => Self::Enabled,
            2 => Self::Connecting,
            3 => Self::ConnectTimeout,
            4 => Self::Connected,
            5 => Self::Disconnected,
            6 => Self::Reconnecting,
            7 => Self::ApStarting,
            8 => Self::ApStarted,
            9 => Self::OtaStarting,
            10 => Self::OtaStarted,
            11 => Self::OtaTimeout,
            _ => return None,
        })
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Enabled => "enabled",
            Self::Connecting => "connecting",
            Self::ConnectTimeout => "connect-timeout",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
            Self::ApStarting => "ap-starting",
            Self::ApStarted => "ap-started",
            Self::OtaStarting => "ota-starting",
            Self::OtaStarted => "ota-started",
            Self::OtaTimeout => "ota-timeout",
        }
    }

    /// States in which the site may be mounted.
    pub const fn serves_site(self) -> bool {
        matches!(self, Self::Connected | Self::ApStarted)
    }

    /// States in which the device runs its own access point.
    pub const fn is_access_point(self) -> bool {
        matches!(
            self,
            Self::ApStarting | Self::ApStarted | Self::OtaStarting | Self::OtaStarted
        )
    }
}

/// Network driver notifications.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NetworkEvent {
    StationGotAddress,
    StationLostAddress,
    StationDisconnected,
    AccessPointStarted,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StaticIp {
    pub address: Ipv4Addr,
    pub prefix_len: u8,
    pub gateway: Ipv4Addr,
    /// `0.0.0.0` leaves the station without a resolver.
    pub dns: Ipv4Addr,
}

impl StaticIp {
    /// Resolver to hand the IP stack.
    pub fn dns_server(&self) -> Option<Ipv4Addr> {
        (!self.dns.is_unspecified()).then_some(self.dns)
    }
}

/// Connection settings for one attempt cycle.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnectionConfig {
    pub station_ssid: String<SSID_MAX_LEN>,
    pub station_password: String<PASSWORD_MAX_LEN>,
    pub ap_mode: bool,
    pub static_ip: Option<StaticIp>,
}

impl ConnectionConfig {
    /// Configuration that goes straight to the access point.
    pub fn access_point() -> Self {
        Self {
            station_ssid: String::new(),
            station_password: String::new(),
            ap_mode: true,
            static_ip: None,
        }
    }

    /// Station configuration; returns `None` when a field does not fit.
    pub fn station(ssid: &str, password: &str) -> Option<Self> {
        if ssid.is_empty() {
            return None;
        }

        let mut station_ssid = String::new();
        station_ssid.push_str(ssid).ok()?;
        let mut station_password = String::new();
        station_password.push_str(password).ok()?;

        Some(Self {
            station_ssid,
            station_password,
            ap_mode: false,
            static_ip: None,
        })
    }

    pub fn with_static_ip(mut self, static_ip: Option<StaticIp>) -> Self {
        self.static_ip = static_ip;
        self
    }
}

/// Timeouts and addressing of the connectivity lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ConnectOptions {
    pub hostname: &'static str,
    pub ap_ssid: &'static str,
    pub ap_password: &'static str,
    pub ap_address: Ipv4Addr,
    pub ap_prefix_len: u8,
    pub connect_timeout_ms: u32,
    pub ota_timeout_ms: u32,
    pub expose_ota: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            hostname: "inktag",
            ap_ssid: "inktag",
            ap_password: "",
            ap_address: Ipv4Addr::new(192, 168, 4, 1),
            ap_prefix_len: 24,
            connect_timeout_ms: 20_000,
            ota_timeout_ms: 300_000,
            expose_ota: false,
        }
    }
}

impl ConnectOptions {
    pub const fn with_hostname(mut self, hostname: &'static str) -> Self {
        self.hostname = hostname;
        self
    }

    pub const fn with_access_point(mut self, ssid: &'static str, password: &'static str) -> Self {
        self.ap_ssid = ssid;
        self.ap_password = password;
        self
    }

    pub const fn with_connect_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.connect_timeout_ms = timeout_ms;
        self
    }

    pub const fn with_ota_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.ota_timeout_ms = timeout_ms;
        self
    }

    pub const fn with_ota_exposed(mut self, expose_ota: bool) -> Self {
        self.expose_ota = expose_ota;
        self
    }
}

/// Station parameters handed to the interface.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StationSettings<'a> {
    pub hostname: &'a str,
    pub ssid: &'a str,
    pub password: &'a str,
    pub static_ip: Option<StaticIp>,
}

/// Access-point parameters handed to the interface.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AccessPointSettings<'a> {
    pub ssid: &'a str,
    /// `None` starts an open network.
    pub password: Option<&'a str>,
    pub address: Ipv4Addr,
    pub prefix_len: u8,
}

/// Radio and IP stack as seen by the state machine.
///
/// Mode commands must be idempotent: a failed command is re-issued verbatim
/// on the next poll.
pub trait NetworkInterface {
    type Error: Debug;

    fn enter_station(&mut self, settings: &StationSettings<'_>) -> Result<(), Self::Error>;
    fn enter_access_point(&mut self, settings: &AccessPointSettings<'_>)
    -> Result<(), Self::Error>;
    /// Leaves the current network and forgets a static address.
    fn disconnect(&mut self);
    /// Asks the driver to rejoin the configured network.
    fn reconnect(&mut self);
    /// Switches the radio off.
    fn shutdown(&mut self);
    /// Starts answering every DNS query with `answer`.
    fn start_captive_dns(&mut self, answer: Ipv4Addr) -> Result<(), Self::Error>;
    fn stop_captive_dns(&mut self);
    fn next_event(&mut self) -> Option<NetworkEvent>;
    fn ip_address(&self) -> Option<Ipv4Addr>;
}

/// Firmware-update endpoints exposed once the network is up.
pub trait OtaServices {
    type Error: Debug;

    fn expose(&mut self, hostname: &str) -> Result<(), Self::Error>;
    fn withdraw(&mut self);
}

/// OTA backend for images that never expose updates.
#[derive(Clone, Copy, Debug, Default)]
pub struct OtaDisabled;

impl OtaServices for OtaDisabled {
    type Error = Infallible;

    fn expose(&mut self, _hostname: &str) -> Result<(), Self::Error> {
        Ok(())
    }

    fn withdraw(&mut self) {}
}

/// Observer of completed transitions.
pub trait StateListener {
    fn on_transition(&mut self, previous: ConnectionState, next: ConnectionState);
}

impl<F> StateListener for F
where
    F: FnMut(ConnectionState, ConnectionState),
{
    fn on_transition(&mut self, previous: ConnectionState, next: ConnectionState) {
        self(previous, next)
    }
}

#[cfg(test)]
pub(crate) mod testing;
