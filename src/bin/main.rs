#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]

use embassy_executor::Spawner;
use embassy_net::StackResources;
use embassy_time::{Instant, Timer};
use embedded_hal_bus::spi::ExclusiveDevice;
use esp_hal::{
    Blocking,
    clock::CpuClock,
    delay::Delay,
    gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull},
    interrupt::software::SoftwareInterruptControl,
    spi::master::Spi,
    system::Stack,
    time::Rate,
    timer::timg::TimerGroup,
};
use gdey0154z90::Gdey0154z90;
use inktag_core::{
    Application, ApplicationPlatform, Board, CompletionSignal, Platform,
    connect::ConnectOptions,
    dhcp::{LeasePool, MAX_LEASES},
    image_store::PartitionImageStore,
    panel::{PanelWorker, WorkerConfig},
    status::StatusBoard,
};
use inktag_hal_esp32s3::{
    control::{ControlQueue, QueueInbox},
    network::{
        RadioLink, RadioShared,
        web::{ServerSwitch, SiteSwitch, WebGate},
    },
    platform::{
        jobs::{JobQueue, JobSender},
        panel::EpaperDisplay,
        system::ChipReset,
    },
    storage::{images::ImagePartition, settings::FlashConfigStore},
};
use log::{LevelFilter, error, info, warn};
use static_cell::StaticCell;

use http::{NoUpdates, SiteKind, WebContext};

#[path = "main/captive.rs"]
mod captive;
#[path = "main/http.rs"]
mod http;
#[path = "main/radio.rs"]
mod radio;

const APP_NAME: &str = "inktag";
const HOSTNAME: &str = match option_env!("INKTAG_HOSTNAME") {
    Some(hostname) => hostname,
    None => "inktag",
};
const AP_SSID: &str = match option_env!("INKTAG_AP_SSID") {
    Some(ssid) => ssid,
    None => "inktag",
};
const AP_PASSWORD: &str = match option_env!("INKTAG_AP_PASSWORD") {
    Some(password) => password,
    None => "",
};
const TAG_TEXT: &str = match option_env!("INKTAG_TAG_TEXT") {
    Some(text) => text,
    None => "inktag",
};

const PANEL_SPI_HZ: u32 = 4_000_000;
const CONNECT_TIMEOUT_MS: u32 = 20_000;
const CONTROL_TICK_MS: u64 = 10;
const PANEL_CORE_STACK_BYTES: usize = 16 * 1024;

static RADIO: RadioShared = RadioShared::new();
static WEB: WebGate = WebGate::new();
static STATUS: StatusBoard = StatusBoard::new();
static CONTROL: ControlQueue = ControlQueue::new();
static PANEL_JOBS: JobQueue = JobQueue::new();
static PANEL_BUSY: CompletionSignal = CompletionSignal::completed_new();
static STA_RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();
static AP_RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();
static PANEL_CORE_STACK: StaticCell<Stack<PANEL_CORE_STACK_BYTES>> = StaticCell::new();

type PanelSpi = ExclusiveDevice<Spi<'static, Blocking>, Output<'static>, Delay>;
type Panel = EpaperDisplay<PanelSpi, Output<'static>, Output<'static>, Input<'static>, Delay>;
type Worker = PanelWorker<Panel, PartitionImageStore<ImagePartition>>;

struct Firmware;

impl Platform for Firmware {
    type Network = RadioLink;
    type Server = ServerSwitch;
    type Reset = ChipReset;
    type Config = FlashConfigStore;
    type Inbox = QueueInbox;
}

impl ApplicationPlatform for Firmware {
    type Jobs = JobSender;
    type Site = SiteSwitch;
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    error!("panic: {}", info);
    loop {}
}

// This creates a default app-descriptor required by the esp-idf bootloader.
esp_bootloader_esp_idf::esp_app_desc!();

/// Runs panel jobs one at a time on the second core.
#[embassy_executor::task]
async fn panel_task(mut worker: Worker, jobs: &'static JobQueue) -> ! {
    loop {
        let job = jobs.receive().await;
        worker.run(job);
    }
}

#[esp_rtos::main]
async fn main(_spawner: Spawner) -> ! {
    esp_println::logger::init_logger(LevelFilter::Info);
    esp_println::println!("boot: {} starting", APP_NAME);

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    // esp-radio requires an allocator.
    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 65536);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // Wiring: SCK=GPIO12 MOSI=GPIO11 CS=GPIO10 DC=GPIO9 RST=GPIO8 BUSY=GPIO7
    let spi_config = esp_hal::spi::master::Config::default()
        .with_frequency(Rate::from_hz(PANEL_SPI_HZ))
        .with_mode(esp_hal::spi::Mode::_0);
    let spi = Spi::new(peripherals.SPI2, spi_config)
        .unwrap()
        .with_sck(peripherals.GPIO12)
        .with_mosi(peripherals.GPIO11);
    let cs = Output::new(peripherals.GPIO10, Level::High, OutputConfig::default());
    let dc = Output::new(peripherals.GPIO9, Level::Low, OutputConfig::default());
    let rst = Output::new(peripherals.GPIO8, Level::High, OutputConfig::default());
    let busy = Input::new(peripherals.GPIO7, InputConfig::default().with_pull(Pull::None));
    let spi_device = ExclusiveDevice::new(spi, cs, Delay::new()).unwrap();

    let driver = Gdey0154z90::new(
        spi_device,
        dc,
        rst,
        busy,
        gdey0154z90::Config::default(),
    );
    let panel = EpaperDisplay::new(driver, Delay::new());
    let images = match ImagePartition::new() {
        Ok(partition) => partition,
        Err(err) => {
            error!("boot: image partition unavailable: {:?}", err);
            halt().await
        }
    };
    let worker = PanelWorker::new(
        panel,
        PartitionImageStore::new(images),
        WorkerConfig {
            tag_text: TAG_TEXT,
            ..WorkerConfig::default()
        },
    );

    let sw_ints = SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start_second_core(
        peripherals.CPU_CTRL,
        sw_ints.software_interrupt0,
        sw_ints.software_interrupt1,
        PANEL_CORE_STACK.init(Stack::new()),
        move || {
            static EXECUTOR: StaticCell<esp_rtos::embassy::Executor> = StaticCell::new();
            let executor = EXECUTOR.init(esp_rtos::embassy::Executor::new());
            executor.run(|spawner| {
                spawner.must_spawn(panel_task(worker, &PANEL_JOBS));
            });
        },
    );

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
        0x1C7A_6B2E_95D0_4F13,
    );
    let (ap, mut ap_runner) = embassy_net::new(
        interfaces.ap,
        radio::access_point_config(options.ap_address, options.ap_prefix_len),
        AP_RESOURCES.init(StackResources::new()),
        0x6E21_D0B7_3A94_C855,
    );

    let board = Board::<Firmware> {
        network: RadioLink::new(&RADIO),
        server: ServerSwitch(&WEB),
        reset: ChipReset,
        config: settings,
        inbox: QueueInbox(&CONTROL),
        status: &STATUS,
    };
    let mut app = Application::new(
        board,
        JobSender(&PANEL_JOBS),
        SiteSwitch(&WEB),
        &PANEL_BUSY,
        options,
    );
    if let Err(err) = app.start() {
        error!("boot: services not scheduled: {:?}", err);
        halt().await
    }

    let web = WebContext::<NoUpdates> {
        app_name: APP_NAME,
        site: SiteKind::Application,
        gate: &WEB,
        status: &STATUS,
        control: &CONTROL,
        updates: None,
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
            let ran = app.tick(Instant::now().as_millis());
            if ran == 0 {
                Timer::after_millis(CONTROL_TICK_MS).await;
            } else {
                embassy_futures::yield_now().await;
            }
        }
    };

    info!(
        "{}: hostname={} ap_ssid={} spi_hz={}",
        APP_NAME, HOSTNAME, AP_SSID, PANEL_SPI_HZ
    );
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
