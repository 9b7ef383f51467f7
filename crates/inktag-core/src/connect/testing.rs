//! Scripted network and OTA backends for host tests.

use core::net::Ipv4Addr;
use std::{cell::RefCell, collections::VecDeque, rc::Rc, string::String as StdString, vec::Vec};

use super::*;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Station(StdString),
    AccessPoint(StdString, Option<StdString>),
    Disconnect,
    Reconnect,
    Shutdown,
    StartDns(Ipv4Addr),
    StopDns,
    Expose,
    Withdraw,
}

#[derive(Default)]
pub struct Wire {
    pub calls: Vec<Call>,
    pub events: VecDeque<NetworkEvent>,
    pub fail_mode: bool,
    pub fail_dns: bool,
}

#[derive(Clone, Default)]
pub struct FakeNetwork(pub Rc<RefCell<Wire>>);

impl NetworkInterface for FakeNetwork {
    type Error = &'static str;

    fn enter_station(&mut self, settings: &StationSettings<'_>) -> Result<(), Self::Error> {
        let mut wire = self.0.borrow_mut();
        wire.calls.push(Call::Station(settings.ssid.into()));
        if wire.fail_mode { Err("mode") } else { Ok(()) }
    }

    fn enter_access_point(
        &mut self,
        settings: &AccessPointSettings<'_>,
    ) -> Result<(), Self::Error> {
        let mut wire = self.0.borrow_mut();
        wire.calls.push(Call::AccessPoint(
            settings.ssid.into(),
            settings.password.map(Into::into),
        ));
        if wire.fail_mode { Err("mode") } else { Ok(()) }
    }

    fn disconnect(&mut self) {
        self.0.borrow_mut().calls.push(Call::Disconnect);
    }

    fn reconnect(&mut self) {
        self.0.borrow_mut().calls.push(Call::Reconnect);
    }

    fn shutdown(&mut self) {
        self.0.borrow_mut().calls.push(Call::Shutdown);
    }

    fn start_captive_dns(&mut self, answer: Ipv4Addr) -> Result<(), Self::Error> {
        let mut wire = self.0.borrow_mut();
        wire.calls.push(Call::StartDns(answer));
        if wire.fail_dns { Err("dns") } else { Ok(()) }
    }

    fn stop_captive_dns(&mut self) {
        self.0.borrow_mut().calls.push(Call::StopDns);
    }

    fn next_event(&mut self) -> Option<NetworkEvent> {
        self.0.borrow_mut().events.pop_front()
    }

    fn ip_address(&self) -> Option<Ipv4Addr> {
        Some(Ipv4Addr::new(10, 0, 0, 7))
    }
}

#[derive(Clone, Default)]
pub struct FakeOta(pub Rc<RefCell<Wire>>);

impl OtaServices for FakeOta {
    type Error = ();

    fn expose(&mut self, _hostname: &str) -> Result<(), Self::Error> {
        self.0.borrow_mut().calls.push(Call::Expose);
        Ok(())
    }

    fn withdraw(&mut self) {
        self.0.borrow_mut().calls.push(Call::Withdraw);
    }
}

