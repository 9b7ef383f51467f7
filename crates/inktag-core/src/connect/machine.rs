use log::{debug, info, warn};

use super::{
    AP_PASSWORD_MIN_LEN, AccessPointSettings, ConnectOptions, ConnectionConfig, ConnectionState,
    NetworkEvent, NetworkInterface, OtaServices, StateListener, StationSettings,
};

/// Connectivity state machine.
///
/// Driven by [`Self::poll`] from a periodic scheduler task; network events
/// are drained from the interface at the start of every poll or can be fed
/// directly through [`Self::handle_event`].
pub struct ConnectionStateMachine<N, O, L> {
    network: N,
    ota: O,
    options: ConnectOptions,
    config: Option<ConnectionConfig>,
    state: ConnectionState,
    entered_ms: u64,
    activity_ms: u64,
    dns_ready: bool,
    ap_up: bool,
    ota_exposed: bool,
    listener: Option<L>,
}

impl<N, O, L> ConnectionStateMachine<N, O, L>
where
    N: NetworkInterface,
    O: OtaServices,
    L: StateListener,
{
    pub fn new(network: N, ota: O, options: ConnectOptions) -> Self {
        Self {
            network,
            ota,
            options,
            config: None,
            state: ConnectionState::Disabled,
            entered_ms: 0,
            activity_ms: 0,
            dns_ready: false,
            ap_up: false,
            ota_exposed: false,
            listener: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    pub fn config(&self) -> Option<&ConnectionConfig> {
        self.config.as_ref()
    }

    /// Time the current state was entered.
    pub fn entered_at_ms(&self) -> u64 {
        self.entered_ms
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut N {
        &mut self.network
    }

    pub fn ip_address(&self) -> Option<core::net::Ipv4Addr> {
        self.network.ip_address()
    }

    /// Registers the single transition observer, replacing any previous one.
    pub fn listen(&mut self, listener: L) {
        self.listener = Some(listener);
    }

    /// Removes and returns the transition observer.
    pub fn unlisten(&mut self) -> Option<L> {
        self.listener.take()
    }

    pub fn listener_mut(&mut self) -> Option<&mut L> {
        self.listener.as_mut()
    }

    /// Starts an attempt cycle. Ignored unless disabled.
    pub fn begin(&mut self, config: ConnectionConfig, now_ms: u64) -> bool {
        if self.state != ConnectionState::Disabled {
            warn!("connect: begin ignored in {:?}", self.state);
            return false;
        }

        info!(
            "connect: begin ap_mode={} ssid={}",
            config.ap_mode,
            config.station_ssid.as_str()
        );
        self.config = Some(config);
        self.dns_ready = false;
        self.ap_up = false;
        self.ota_exposed = false;
        self.transition(ConnectionState::Enabled, now_ms);
        true
    }

    /// Resets the OTA idle timer.
    pub fn note_update_activity(&mut self, now_ms: u64) {
        self.activity_ms = now_ms;
    }

    /// `true` when stuck in a bring-up state for at least `grace_ms`.
    pub fn stalled(&self, now_ms: u64, grace_ms: u32) -> bool {
        matches!(
            self.state,
            ConnectionState::Enabled
                | ConnectionState::ConnectTimeout
                | ConnectionState::ApStarting
        ) && now_ms.saturating_sub(self.entered_ms) >= grace_ms as u64
    }

    pub fn handle_event(&mut self, event: NetworkEvent, now_ms: u64) {
        debug!("connect: event {:?} in {:?}", event, self.state);

        match event {
            NetworkEvent::StationGotAddress => {
                if matches!(
                    self.state,
                    ConnectionState::Connecting | ConnectionState::Reconnecting
                ) {
                    if let Some(address) = self.network.ip_address() {
                        info!("connect: station address {}", address);
                    }
                    self.transition(ConnectionState::Connected, now_ms);
                }
            }
            NetworkEvent::StationLostAddress | NetworkEvent::StationDisconnected => {
                if self.state == ConnectionState::Connected {
                    self.transition(ConnectionState::Disconnected, now_ms);
                }
            }
            NetworkEvent::AccessPointStarted => {
                if self.state == ConnectionState::ApStarting {
                    self.ap_up = true;
                    if self.dns_ready {
                        self.transition(ConnectionState::ApStarted, now_ms);
                    }
                }
            }
        }
    }

    /// One evaluation step: events, mode commands and timeouts.
    pub fn poll(&mut self, now_ms: u64) {
        while let Some(event) = self.network.next_event() {
            self.handle_event(event, now_ms);
        }

        if self.state == ConnectionState::Enabled {
            let ap_mode = self.config.as_ref().is_none_or(|config| config.ap_mode);
            if ap_mode {
                self.start_access_point(now_ms);
            } else {
                self.start_station(now_ms);
            }
        }

        if self.state == ConnectionState::Connecting
            && self.elapsed_ms(now_ms) >= self.options.connect_timeout_ms as u64
        {
            warn!("connect: no address after {} ms", self.options.connect_timeout_ms);
            self.network.disconnect();
            self.transition(ConnectionState::ConnectTimeout, now_ms);
        }

        if self.state == ConnectionState::ConnectTimeout {
            self.start_access_point(now_ms);
        }

        if self.state == ConnectionState::ApStarting {
            self.finish_access_point(now_ms);
        }

        if self.state == ConnectionState::OtaStarted
            && self.idle_ms(now_ms) >= self.options.ota_timeout_ms as u64
        {
            warn!("connect: no update activity for {} ms", self.options.ota_timeout_ms);
            self.transition(ConnectionState::OtaTimeout, now_ms);
        }

        if self.state == ConnectionState::Reconnecting {
            self.transition(ConnectionState::Connecting, now_ms);
        }

        if self.state == ConnectionState::Disconnected {
            self.network.reconnect();
            self.transition(ConnectionState::Reconnecting, now_ms);
        }

        if self.options.expose_ota
            && matches!(
                self.state,
                ConnectionState::ApStarted | ConnectionState::Connected
            )
        {
            self.transition(ConnectionState::OtaStarting, now_ms);
        }

        if self.state == ConnectionState::OtaStarting {
            self.expose_ota(now_ms);
        }
    }

    /// Returns to `Disabled` and releases DNS, OTA and the interface.
    pub fn end(&mut self, now_ms: u64) {
        if self.ota_exposed {
            self.ota.withdraw();
            self.ota_exposed = false;
        }
        if self.dns_ready {
            self.network.stop_captive_dns();
            self.dns_ready = false;
        }
        self.network.shutdown();
        self.ap_up = false;
        self.config = None;
        self.transition(ConnectionState::Disabled, now_ms);
    }

    fn start_station(&mut self, now_ms: u64) {
        let Some(config) = self.config.as_ref() else {
            return;
        };

        let settings = StationSettings {
            hostname: self.options.hostname,
            ssid: config.station_ssid.as_str(),
            password: config.station_password.as_str(),
            static_ip: config.static_ip,
        };

        match self.network.enter_station(&settings) {
            Ok(()) => self.transition(ConnectionState::Connecting, now_ms),
            Err(err) => warn!("connect: station mode failed: {:?}", err),
        }
    }

    fn start_access_point(&mut self, now_ms: u64) {
        let password = self.options.ap_password;
        let settings = AccessPointSettings {
            ssid: self.options.ap_ssid,
            password: (password.len() >= AP_PASSWORD_MIN_LEN).then_some(password),
            address: self.options.ap_address,
            prefix_len: self.options.ap_prefix_len,
        };

        if let Err(err) = self.network.enter_access_point(&settings) {
            warn!("connect: access point mode failed: {:?}", err);
            return;
        }

        self.ap_up = false;
        self.dns_ready = false;
        self.transition(ConnectionState::ApStarting, now_ms);
    }

    fn finish_access_point(&mut self, now_ms: u64) {
        if !self.dns_ready {
            match self.network.start_captive_dns(self.options.ap_address) {
                Ok(()) => self.dns_ready = true,
                Err(err) => {
                    warn!("connect: captive dns failed: {:?}", err);
                    return;
                }
            }
        }

        if self.ap_up {
            info!(
                "connect: access point '{}' at {}",
                self.options.ap_ssid, self.options.ap_address
            );
            self.transition(ConnectionState::ApStarted, now_ms);
        }
    }

    fn expose_ota(&mut self, now_ms: u64) {
        match self.ota.expose(self.options.hostname) {
            Ok(()) => {
                self.ota_exposed = true;
                self.transition(ConnectionState::OtaStarted, now_ms);
            }
            Err(err) => warn!("connect: ota services failed: {:?}", err),
        }
    }

    fn elapsed_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.entered_ms)
    }

    fn idle_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.entered_ms.max(self.activity_ms))
    }

    fn transition(&mut self, next: ConnectionState, now_ms: u64) {
        if next == self.state {
            return;
        }

        let previous = self.state;
        info!("connect: {:?} -> {:?}", previous, next);
        self.state = next;
        self.entered_ms = now_ms;
        self.activity_ms = now_ms;

        if let Some(listener) = self.listener.as_mut() {
            listener.on_transition(previous, next);
        }
    }
}
