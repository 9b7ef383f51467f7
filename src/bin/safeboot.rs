#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]

use embassy_executor::Spawner;
use embassy_net::StackResources;
use embassy_sync::{blocking_mutex::raw::NoopRawMutex, mutex::Mutex};
use embassy_time::{Instant, Timer};
use esp_hal::{clock::CpuClock, timer::timg::TimerGroup};
use esp_storage::FlashStorage;
use inktag_core::{
    Board, Platform, Recovery, RecoveryPlatform,
    connect::ConnectOptions,
    dhcp::{LeasePool, MAX_LEASES},
    ota::OtaSession,
    status::StatusBoard,
};
use inktag_hal_esp32s3::{
    control::{ControlQueue, QueueInbox},
    network::{
        RadioLink, RadioShared,
        web::{ServerSwitch, UpdateSwitch, WebGate},
    },
    platform::system::ChipReset,
    storage::{ota::FirmwareSlot, settings::FlashConfigStore},
};
use log::{LevelFilter, error, info, warn};
use static_cell::StaticCell;

use http::{SiteKind, WebContext};

#[path = "main/captive.rs"]
mod captive;
#[path = "main/http.rs"]
mod http;
#[path = "main/radio.rs"]
mod radio;

const APP_NAME: &str = "safeboot";
const HOSTNAME: &str = match option_env!("SAFEBOOT_HOSTNAME") {
    Some(hostname) => hostname,
    None => "inktag-safeboot",
};
const AP_SSID: &str = match option_env!("SAFEBOOT_AP_SSID") {
    Some(ssid) => ssid,
    None => "inktag-safeboot",
};
const AP_PASSWORD: &str = match option_env!("SAFEBOOT_AP_PASSWORD") {
    Some(password) => password,
    None => "",
};

const CONNECT_TIMEOUT_MS: u32 = 20_000;
const CONTROL_TICK_MS: u64 = 10;

static RADIO: RadioShared = RadioShared::new();
static WEB: WebGate = WebGate::new();
static STATUS: StatusBoard = StatusBoard::new();
static CONTROL: ControlQueue = ControlQueue::new();
static STA_RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();
static AP_RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();

struct Firmware;

impl Platform for Firmware {
    type Network = RadioLink;
    type Server = ServerSwitch;
    type Reset = ChipReset;
    type Config = FlashConfigStore;
    type Inbox = QueueInbox;
}

impl RecoveryPlatform for Firmware {
    type Ota = UpdateSwitch;
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    error!("panic: {}", info);
    loop {}
}

// This creates a default app-descriptor required by the esp-idf bootloader.
esp_bootloader_esp_idf::esp_app_desc!();

#[esp_rtos::main]
async fn main(_spawner: Spawner) -> ! {
    esp_println::logger::init_logger(LevelFilter::Info);
    esp_println::println!("boot: {} starting", APP_NAME);

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 65536);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // Next reset goes back to the application unless an upload replaces it.
    let mut slot = FirmwareSlot::new(FlashStorage::new(peripherals.FLASH));
    if let Err(err) = slot.boot_application_next() {
        warn!("boot: application slot not selected: {:?}", err);
    }
    let updates = Mutex::<NoopRawMutex, _>::new(OtaSession::new(slot));

    let settings = match FlashConfigStore::new() {
        Ok(store) => store,
        Err(err) => {
            error!("boot: settings partition unavailable: {:?}", err);
            halt().await
        }
    };

    let radio_controller = match esp_radio::init() {
        Ok(controller) => controller,
        Err(err) => {
            error!("boot: esp-radio init failed: {:?}", err);
            halt().await
        }
    };
    let wifi_config = esp_radio::wifi::Config::default();
    let (controller, interfaces) =
        match esp_radio::wifi::new(&radio_controller, peripherals.WIFI, wifi_config) {
            Ok(parts) => parts,
            Err(err) => {
                error!("boot: wifi peripheral init failed: {:?}", err);
                halt().await
            }
        };

    let options = ConnectOptions::default()
        .with_hostname(HOSTNAME)
        .with_access_point(AP_SSID, AP_PASSWORD)
        .with_connect_timeout_ms(CONNECT_TIMEOUT_MS);

    let (sta, mut sta_runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        STA_RESOURCES.init(StackResources::new()),
        0x52B9_07E4_C16A_3D8F,
    );
    let (ap, mut ap_runner) = embassy_net::new(
        interfaces.ap,
        radio::access_point_config(options.ap_address, options.ap_prefix_len),
        AP_RESOURCES.init(StackResources::new()),
        0x0D7C_E35A_98B2_6F41,
    );

    let board = Board::<Firmware> {
        network: RadioLink::new(&RADIO),
        server: ServerSwitch(&WEB),
        reset: ChipReset,
        config: settings,
        inbox: QueueInbox(&CONTROL),
        status: &STATUS,
    };
    let mut recovery = Recovery::new(board, UpdateSwitch(&WEB), options);
    if let Err(err) = recovery.start() {
        error!("boot: services not scheduled: {:?}", err);
        halt().await
    }

    let web = WebContext {
        app_name: APP_NAME,
        site: SiteKind::Recovery,
        gate: &WEB,
        status: &STATUS,
        control: &CONTROL,
        updates: Some(&updates),
    };
    let pool = LeasePool::new(options.ap_address, options.ap_prefix_len, MAX_LEASES as u8);

    let net_future = embassy_futures::join::join(sta_runner.run(), ap_runner.run());
    let radio_future = radio::radio_loop(controller, sta, ap, &RADIO);
    let server_future = embassy_futures::join::join4(
        http::serve(sta, &web),
        http::serve(ap, &web),
        captive::dns_loop(ap, &RADIO),
        captive::dhcp_loop(ap, pool),
    );
    let control_future = async {
        loop {
            if recovery.tick(Instant::now().as_millis()) == 0 {
                Timer::after_millis(CONTROL_TICK_MS).await;
            } else {
                embassy_futures::yield_now().await;
            }
        }
    };

    info!("{}: hostname={} ap_ssid={}", APP_NAME, HOSTNAME, AP_SSID);
    let _ = embassy_futures::join::join4(net_future, radio_future, server_future, control_future)
        .await;
    unreachable!()
}

async fn halt() -> ! {
    warn!("boot: halted");
    loop {
        Timer::after_secs(1).await;
    }
}
