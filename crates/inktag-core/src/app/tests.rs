use std::{
    boxed::Box,
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::Rc,
    vec,
    vec::Vec,
};

use super::*;
use crate::{
    connect::{
        NetworkEvent,
        testing::{Call, FakeNetwork, FakeOta, Wire},
    },
    job::{JobRejected, PanelJob},
    panel::{ImageName, PanelCommand},
};

#[derive(Clone, Default)]
struct FakeJobs {
    log: Rc<RefCell<Vec<PanelCommand>>>,
    hold: Rc<Cell<bool>>,
}

impl JobSpawner for FakeJobs {
    fn spawn(&mut self, job: PanelJob) -> Result<(), JobRejected> {
        self.log.borrow_mut().push(job.command);
        if !self.hold.get() {
            job.signal.signal_complete();
        }
        Ok(())
    }
}

type Events = Rc<RefCell<Vec<&'static str>>>;

struct FakeServer(Events);

impl HttpServer for FakeServer {
    type Error = ();

    fn start(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().push("server-start");
        Ok(())
    }

    fn stop(&mut self) {
        self.0.borrow_mut().push("server-stop");
    }
}

struct FakeSite(Events);

impl SiteRoutes for FakeSite {
    type Error = ();

    fn mount(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().push("site-mount");
        Ok(())
    }

    fn unmount(&mut self) {
        self.0.borrow_mut().push("site-unmount");
    }
}

struct FakeReset(Rc<Cell<u32>>);

impl SystemReset for FakeReset {
    fn reset(&mut self) {
        self.0.set(self.0.get() + 1);
    }
}

struct MemConfig(Rc<RefCell<Option<StoredConnection>>>);

impl ConfigStore for MemConfig {
    type Error = ();

    fn load(&mut self) -> Result<Option<StoredConnection>, Self::Error> {
        Ok(self.0.borrow().clone())
    }

    fn save(&mut self, record: &StoredConnection) -> Result<(), Self::Error> {
        *self.0.borrow_mut() = Some(record.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), Self::Error> {
        *self.0.borrow_mut() = None;
        Ok(())
    }
}

struct Queue(Rc<RefCell<VecDeque<ControlRequest>>>);

impl ControlInbox for Queue {
    fn next_request(&mut self) -> Option<ControlRequest> {
        self.0.borrow_mut().pop_front()
    }
}

struct Host;

impl Platform for Host {
    type Network = FakeNetwork;
    type Server = FakeServer;
    type Reset = FakeReset;
    type Config = MemConfig;
    type Inbox = Queue;
}

impl ApplicationPlatform for Host {
    type Jobs = FakeJobs;
    type Site = FakeSite;
}

impl RecoveryPlatform for Host {
    type Ota = FakeOta;
}

struct Rig {
    wire: Rc<RefCell<Wire>>,
    events: Events,
    jobs: FakeJobs,
    busy: &'static CompletionSignal,
    resets: Rc<Cell<u32>>,
    stored: Rc<RefCell<Option<StoredConnection>>>,
    inbox: Rc<RefCell<VecDeque<ControlRequest>>>,
    status: &'static StatusBoard,
}

impl Rig {
    fn new(stored: Option<StoredConnection>) -> Self {
        Self {
            wire: Rc::default(),
            events: Rc::default(),
            jobs: FakeJobs::default(),
            busy: Box::leak(Box::new(CompletionSignal::completed_new())),
            resets: Rc::default(),
            stored: Rc::new(RefCell::new(stored)),
            inbox: Rc::default(),
            status: Box::leak(Box::new(StatusBoard::new())),
        }
    }

    fn board(&self) -> Board<Host> {
        Board {
            network: FakeNetwork(self.wire.clone()),
            server: FakeServer(self.events.clone()),
            reset: FakeReset(self.resets.clone()),
            config: MemConfig(self.stored.clone()),
            inbox: Queue(self.inbox.clone()),
            status: self.status,
        }
    }

    fn application(&self) -> Application<Host> {
        let mut app = Application::new(
            self.board(),
            self.jobs.clone(),
            FakeSite(self.events.clone()),
            self.busy,
            ConnectOptions::default(),
        );
        app.start().unwrap();
        app
    }

    fn recovery(&self, options: ConnectOptions) -> Recovery<Host> {
        let mut recovery = Recovery::new(self.board(), FakeOta(self.wire.clone()), options);
        recovery.start().unwrap();
        recovery
    }

    fn push_event(&self, event: NetworkEvent) {
        self.wire.borrow_mut().events.push_back(event);
    }

    fn request(&self, request: ControlRequest) {
        self.inbox.borrow_mut().push_back(request);
    }

    fn called(&self, call: &Call) -> bool {
        self.wire.borrow().calls.contains(call)
    }
}

fn home() -> Option<StoredConnection> {
    StoredConnection::new("home", "hunter22", false)
}

fn image(name: &str) -> ImageName {
    ImageName::try_from(name).unwrap()
}

/// Brings the application up on the stored network: display ready,
/// web server and site running.
fn connected_application(rig: &Rig) -> Application<Host> {
    let mut app = rig.application();
    app.tick(0);
    assert_eq!(app.state(), ConnectionState::Connecting);

    rig.push_event(NetworkEvent::StationGotAddress);
    app.tick(50);
    assert_eq!(app.state(), ConnectionState::Connected);
    assert!(app.display().is_initialized());

    app.tick(100);
    app
}

#[test]
fn station_start_brings_up_server_before_site() {
    let rig = Rig::new(home());
    let mut app = connected_application(&rig);

    assert_eq!(*rig.events.borrow(), vec!["server-start", "site-mount"]);
    assert!(rig.called(&Call::Station("home".into())));
    assert_eq!(*rig.jobs.log.borrow(), vec![PanelCommand::Initialize]);

    app.tick(200);
    let published = rig.status.snapshot();
    assert_eq!(published, app.status());
    assert!(published.server_running && published.site_mounted);
    assert_eq!(published.address, Some(core::net::Ipv4Addr::new(10, 0, 0, 7)));
}

#[test]
fn missing_settings_start_the_access_point_and_its_site() {
    let rig = Rig::new(None);
    let mut app = rig.application();

    app.tick(0);
    assert_eq!(app.state(), ConnectionState::ApStarting);
    rig.push_event(NetworkEvent::AccessPointStarted);
    app.tick(50);
    assert_eq!(app.state(), ConnectionState::ApStarted);
    app.tick(100);

    assert_eq!(*rig.events.borrow(), vec!["server-start", "site-mount"]);
    assert!(!rig.called(&Call::Expose));
}

#[test]
fn losing_the_network_takes_the_site_down() {
    let rig = Rig::new(home());
    let mut app = connected_application(&rig);

    rig.push_event(NetworkEvent::StationDisconnected);
    app.tick(150);

    assert_eq!(app.state(), ConnectionState::Reconnecting);
    assert_eq!(
        *rig.events.borrow(),
        vec!["server-start", "site-mount", "site-unmount", "server-stop"]
    );
    assert!(rig.called(&Call::Reconnect));
}

#[test]
fn second_display_request_is_refused_while_busy() {
    let rig = Rig::new(home());
    let mut app = connected_application(&rig);
    rig.jobs.hold.set(true);

    rig.request(ControlRequest::ShowImage(image("logo")));
    app.tick(200);
    assert!(app.display().is_busy());

    rig.request(ControlRequest::ShowImage(image("other")));
    app.tick(300);
    assert_eq!(
        app.display().in_flight(),
        Some(&PanelCommand::ShowImage(image("logo")))
    );
    assert_eq!(rig.jobs.log.borrow().len(), 2);

    rig.busy.signal_complete();
    app.tick(350);
    assert_eq!(app.display().in_flight(), None);
    assert_eq!(
        app.display().last_finished(),
        Some(&PanelCommand::ShowImage(image("logo")))
    );
}

#[test]
fn restart_hibernates_the_panel_and_stops_services() {
    let rig = Rig::new(home());
    let mut app = connected_application(&rig);

    rig.request(ControlRequest::Restart);
    app.tick(200);
    assert_eq!(app.restart_reason(), Some(RestartReason::Plain));

    app.tick(700);
    assert_eq!(
        rig.jobs.log.borrow().last(),
        Some(&PanelCommand::Hibernate)
    );
    assert!(rig.called(&Call::Shutdown));
    assert_eq!(app.state(), ConnectionState::Disabled);
    assert_eq!(
        *rig.events.borrow(),
        vec!["server-start", "site-mount", "site-unmount", "server-stop"]
    );

    app.tick(1_199);
    assert_eq!(rig.resets.get(), 0);
    app.tick(1_200);
    assert_eq!(rig.resets.get(), 1);
}

#[test]
fn restart_hibernates_after_the_running_panel_job() {
    let rig = Rig::new(home());
    let mut app = connected_application(&rig);
    rig.jobs.hold.set(true);

    rig.request(ControlRequest::ShowImage(image("logo")));
    rig.request(ControlRequest::Restart);
    app.tick(200);
    app.tick(700);
    app.tick(5_000);
    assert_eq!(rig.resets.get(), 0);
    assert_eq!(
        rig.jobs.log.borrow().last(),
        Some(&PanelCommand::ShowImage(image("logo")))
    );

    rig.busy.signal_complete();
    app.tick(5_001);
    assert_eq!(rig.resets.get(), 0);
    assert_eq!(
        rig.jobs.log.borrow().last(),
        Some(&PanelCommand::Hibernate)
    );

    app.tick(5_002);
    assert_eq!(rig.resets.get(), 0);
    rig.busy.signal_complete();
    app.tick(5_003);
    assert_eq!(rig.resets.get(), 1);
    assert_eq!(
        rig.jobs
            .log
            .borrow()
            .iter()
            .filter(|command| **command == PanelCommand::Hibernate)
            .count(),
        1
    );
}

#[test]
fn clearing_wifi_forgets_the_network_and_restarts() {
    let rig = Rig::new(home());
    let mut app = connected_application(&rig);

    rig.request(ControlRequest::ClearWifi);
    app.tick(200);

    assert_eq!(*rig.stored.borrow(), None);
    assert_eq!(app.restart_reason(), Some(RestartReason::ResetWifi));
    app.tick(300);
    assert_eq!(rig.status.snapshot().restart, Some(RestartReason::ResetWifi));
}

#[test]
fn saving_wifi_stores_the_record_and_restarts() {
    let rig = Rig::new(None);
    let mut app = rig.application();
    app.tick(0);

    rig.request(ControlRequest::SaveWifi(home().unwrap()));
    app.tick(100);

    assert_eq!(*rig.stored.borrow(), home());
    assert_eq!(app.restart_reason(), Some(RestartReason::Plain));
}

fn ota_recovery(rig: &Rig, options: ConnectOptions) -> Recovery<Host> {
    let mut recovery = rig.recovery(options);
    recovery.tick(0);
    assert_eq!(recovery.state(), ConnectionState::ApStarting);

    rig.push_event(NetworkEvent::AccessPointStarted);
    recovery.tick(50);
    assert_eq!(recovery.state(), ConnectionState::OtaStarted);
    recovery.tick(100);
    recovery
}

fn run_until(recovery: &mut Recovery<Host>, from_ms: u64, to_ms: u64) {
    for now_ms in (from_ms..=to_ms).step_by(50) {
        recovery.tick(now_ms);
    }
}

#[test]
fn recovery_exposes_updates_on_the_access_point() {
    let rig = Rig::new(None);
    let recovery = ota_recovery(&rig, ConnectOptions::default());

    assert!(rig.called(&Call::Expose));
    assert_eq!(*rig.events.borrow(), vec!["server-start"]);
    assert!(recovery.status().server_running);
    assert!(!recovery.status().display_initialized);
}

#[test]
fn idle_update_window_restarts_the_device() {
    let rig = Rig::new(None);
    let mut recovery = ota_recovery(&rig, ConnectOptions::default().with_ota_timeout_ms(1_000));

    run_until(&mut recovery, 150, 1_000);
    assert_eq!(recovery.state(), ConnectionState::OtaStarted);
    assert_eq!(recovery.restart_reason(), None);

    recovery.tick(1_050);
    assert_eq!(recovery.state(), ConnectionState::OtaTimeout);
    assert_eq!(recovery.restart_reason(), Some(RestartReason::OtaIdle));

    run_until(&mut recovery, 1_100, 1_550);
    assert!(rig.called(&Call::Withdraw));
    assert!(rig.called(&Call::StopDns));
    assert_eq!(*rig.events.borrow(), vec!["server-start", "server-stop"]);

    run_until(&mut recovery, 1_600, 2_000);
    assert_eq!(rig.resets.get(), 0);
    recovery.tick(2_050);
    assert_eq!(rig.resets.get(), 1);
}

#[test]
fn upload_activity_extends_the_update_window() {
    let rig = Rig::new(None);
    let mut recovery = ota_recovery(&rig, ConnectOptions::default().with_ota_timeout_ms(1_000));

    run_until(&mut recovery, 150, 850);
    rig.request(ControlRequest::UpdateActivity);
    recovery.tick(900);

    run_until(&mut recovery, 950, 1_850);
    assert_eq!(recovery.state(), ConnectionState::OtaStarted);
    recovery.tick(1_900);
    assert_eq!(recovery.state(), ConnectionState::OtaTimeout);
}

#[test]
fn finished_update_restarts_after_the_update_delays() {
    let rig = Rig::new(None);
    let mut recovery = ota_recovery(&rig, ConnectOptions::default());

    rig.request(ControlRequest::UpdateFinished { success: true });
    recovery.tick(200);
    assert_eq!(recovery.restart_reason(), Some(RestartReason::UpdateApplied));

    recovery.tick(1_199);
    assert!(!rig.called(&Call::Shutdown));
    recovery.tick(1_200);
    assert!(rig.called(&Call::Shutdown));

    recovery.tick(2_199);
    assert_eq!(rig.resets.get(), 0);
    recovery.tick(2_200);
    assert_eq!(rig.resets.get(), 1);
}

#[test]
fn stalled_access_point_restarts_once() {
    let rig = Rig::new(None);
    rig.wire.borrow_mut().fail_dns = true;
    let mut recovery = rig.recovery(ConnectOptions::default());

    recovery.tick(0);
    recovery.tick(29_950);
    assert_eq!(recovery.state(), ConnectionState::ApStarting);
    assert_eq!(recovery.restart_reason(), None);

    recovery.tick(30_000);
    assert_eq!(recovery.restart_reason(), Some(RestartReason::Fatal));
}
