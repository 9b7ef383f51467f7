//! HTTP listener shared by both images; routing and pages come from
//! `inktag_core::http`.

use core::fmt::Write as _;

use embassy_net::{Stack, tcp::TcpSocket};
use embassy_sync::{blocking_mutex::raw::NoopRawMutex, mutex::Mutex};
use embassy_time::{Duration, Instant, Timer};
use embedded_io_async::Write;
use heapless::String as HeaplessString;
use inktag_core::{
    control::ControlRequest,
    http::{self, HTTP_PORT, HotspotProbe, Request, Route},
    ota::{self, FirmwareSink, OtaSession},
    status::StatusBoard,
};
use inktag_hal_esp32s3::{
    control::{self, ControlQueue},
    network::web::WebGate,
};
use log::{debug, info, warn};

const HEAD_BYTES: usize = 1024;
const PAGE_BYTES: usize = 3072;
const SOCKET_RX_BYTES: usize = 2048;
const SOCKET_TX_BYTES: usize = 2048;
const SOCKET_TIMEOUT_SECS: u64 = 30;
const IDLE_POLL_MS: u64 = 200;
const ACTIVITY_REPORT_MS: u64 = 1_000;

type Page = HeaplessString<PAGE_BYTES>;

/// Firmware sink of an image without uploads.
pub enum NoUpdates {}

impl FirmwareSink for NoUpdates {
    type Error = core::convert::Infallible;

    fn prepare(&mut self) -> Result<u32, Self::Error> {
        match *self {}
    }

    fn write(&mut self, _offset: u32, _chunk: &[u8]) -> Result<(), Self::Error> {
        match *self {}
    }

    fn activate(&mut self, _len: u32) -> Result<(), Self::Error> {
        match *self {}
    }
}

/// Which page set a listener serves.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SiteKind {
    /// Home page, display controls, 404 for unknown paths.
    Application,
    /// Credential and upload portal on every unknown path.
    Recovery,
}

pub struct WebContext<'a, S> {
    pub app_name: &'static str,
    pub site: SiteKind,
    pub gate: &'static WebGate,
    pub status: &'static StatusBoard,
    pub control: &'static ControlQueue,
    pub updates: Option<&'a Mutex<NoopRawMutex, OtaSession<S>>>,
}

/// Serves one interface until the firmware resets.
pub async fn serve<S: FirmwareSink>(stack: Stack<'_>, ctx: &WebContext<'_, S>) -> ! {
    let mut rx_buffer = [0u8; SOCKET_RX_BYTES];
    let mut tx_buffer = [0u8; SOCKET_TX_BYTES];
    let mut head = [0u8; HEAD_BYTES];
    let mut probe = HotspotProbe::new();

    loop {
        if !ctx.gate.is_serving() {
            Timer::after_millis(IDLE_POLL_MS).await;
            continue;
        }

        let mut socket = TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
        socket.set_timeout(Some(Duration::from_secs(SOCKET_TIMEOUT_SECS)));
        if let Err(err) = socket.accept(HTTP_PORT).await {
            warn!("http: accept failed: {:?}", err);
            Timer::after_millis(IDLE_POLL_MS).await;
            continue;
        }

        if ctx.gate.is_serving() {
            if let Err(err) = handle(&mut socket, ctx, &mut head, &mut probe).await {
                warn!("http: connection dropped: {:?}", err);
            }
        }

        let _ = socket.flush().await;
        socket.close();
    }
}

async fn handle<S: FirmwareSink>(
    socket: &mut TcpSocket<'_>,
    ctx: &WebContext<'_, S>,
    head: &mut [u8; HEAD_BYTES],
    probe: &mut HotspotProbe,
) -> Result<(), embassy_net::tcp::Error> {
    let (filled, head_len) = read_head(socket, head).await?;
    let Ok(text) = core::str::from_utf8(&head[..head_len]) else {
        return respond_text(socket, 400, "Bad request.").await;
    };
    let Some(request) = Request::parse(text) else {
        return respond_text(socket, 400, "Bad request.").await;
    };

    let route = request.route();
    debug!("http: {} -> {:?}", request.path, route);
    let content_length = Request::content_length(text).unwrap_or(0);

    match route {
        Route::Status => {
            let mut page = Page::new();
            let _ = http::write_status(&mut page, &ctx.status.snapshot(), uptime_ms());
            socket.write_all(page.as_bytes()).await
        }
        Route::HotspotDetect => {
            if probe.next_is_success() {
                let mut page = Page::new();
                let _ = http::write_head(&mut page, 200, "text/html");
                let _ = page.push_str(http::HOTSPOT_SUCCESS);
                socket.write_all(page.as_bytes()).await
            } else {
                respond_portal(socket, ctx).await
            }
        }
        Route::Update => match (ctx.site, ctx.updates) {
            (SiteKind::Recovery, Some(updates)) if ctx.gate.updates_exposed() => {
                let body = &head[head_len..filled];
                receive_update(socket, ctx, updates, body, content_length).await
            }
            _ => respond_text(socket, 404, "Not found.").await,
        },
        Route::SaveWifi => {
            let wanted = (head_len + content_length).min(HEAD_BYTES);
            let body_end = read_more(socket, head, filled, wanted).await?;
            let body = core::str::from_utf8(&head[head_len..body_end]).unwrap_or("");
            match http::wifi_form(body) {
                Some(record) => {
                    control::post(ctx.control, ControlRequest::SaveWifi(record));
                    respond_text(socket, 200, "Saved. Restarting now...").await
                }
                None => respond_text(socket, 400, "Missing SSID.").await,
            }
        }
        Route::Home => match ctx.site {
            SiteKind::Application if ctx.gate.site_mounted() => {
                let mut page = Page::new();
                let _ = http::write_home(
                    &mut page,
                    ctx.app_name,
                    &ctx.status.snapshot(),
                    uptime_ms(),
                );
                socket.write_all(page.as_bytes()).await
            }
            SiteKind::Application => respond_text(socket, 503, "Starting.").await,
            SiteKind::Recovery => respond_portal(socket, ctx).await,
        },
        Route::Restart | Route::ClearWifi => {
            respond_control(socket, ctx, route, request.query).await
        }
        Route::DisplayWipe | Route::DisplayTag | Route::DisplayImage => match ctx.site {
            SiteKind::Application if ctx.gate.site_mounted() => {
                respond_control(socket, ctx, route, request.query).await
            }
            SiteKind::Application => respond_text(socket, 503, "Starting.").await,
            SiteKind::Recovery => respond_portal(socket, ctx).await,
        },
        Route::NotFound => match ctx.site {
            SiteKind::Application => respond_text(socket, 404, "Not found.").await,
            SiteKind::Recovery => respond_portal(socket, ctx).await,
        },
    }
}

/// Reads until the end of the request head; returns the bytes read and the
/// offset of the body.
async fn read_head(
    socket: &mut TcpSocket<'_>,
    head: &mut [u8; HEAD_BYTES],
) -> Result<(usize, usize), embassy_net::tcp::Error> {
    let mut filled = 0;
    while filled < head.len() {
        let read = socket.read(&mut head[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
        if let Some(end) = head[..filled].windows(4).position(|w| w == b"\r\n\r\n") {
            return Ok((filled, end + 4));
        }
    }
    Ok((filled, filled))
}

/// Continues reading into `head` until `wanted` bytes are buffered or the
/// peer stops sending; returns the bytes buffered.
async fn read_more(
    socket: &mut TcpSocket<'_>,
    head: &mut [u8; HEAD_BYTES],
    mut filled: usize,
    wanted: usize,
) -> Result<usize, embassy_net::tcp::Error> {
    while filled < wanted {
        let read = socket.read(&mut head[filled..wanted]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled.min(wanted))
}

async fn receive_update<S: FirmwareSink>(
    socket: &mut TcpSocket<'_>,
    ctx: &WebContext<'_, S>,
    updates: &Mutex<NoopRawMutex, OtaSession<S>>,
    first: &[u8],
    content_length: usize,
) -> Result<(), embassy_net::tcp::Error> {
    let mut session = updates.lock().await;
    let mut last_report = Instant::now();
    control::post(ctx.control, ControlRequest::UpdateActivity);

    let expected = u32::try_from(content_length).unwrap_or(u32::MAX);
    let first = &first[..first.len().min(content_length)];
    let mut status = session.begin(expected);
    if status.is_ok() && !first.is_empty() {
        status = session.write(first);
    }

    // A short body leaves the session below `expected`; finish() refuses it.
    let mut received = first.len();
    let mut chunk = [0u8; 1024];
    while received < content_length {
        let window = chunk.len().min(content_length - received);
        let read = socket.read(&mut chunk[..window]).await?;
        if read == 0 {
            break;
        }
        received += read;
        if status.is_ok() {
            status = session.write(&chunk[..read]);
        }

        if last_report.elapsed().as_millis() >= ACTIVITY_REPORT_MS {
            control::post(ctx.control, ControlRequest::UpdateActivity);
            last_report = Instant::now();
        }
    }

    let result = session.finish();
    info!("http: upload of {} bytes finished: {:?}", received, result);
    control::post(
        ctx.control,
        ControlRequest::UpdateFinished {
            success: result.is_ok(),
        },
    );

    let mut message = HeaplessString::<96>::new();
    let _ = ota::outcome_message(&mut message, result);
    respond_text(socket, if result.is_ok() { 200 } else { 502 }, &message).await
}

async fn respond_control<S>(
    socket: &mut TcpSocket<'_>,
    ctx: &WebContext<'_, S>,
    route: Route,
    query: &str,
) -> Result<(), embassy_net::tcp::Error> {
    if let Some((code, text)) = http::display_refusal(route, &ctx.status.snapshot()) {
        return respond_text(socket, code, text).await;
    }
    match http::control_request(route, query) {
        Ok(request) => {
            if control::post(ctx.control, request) {
                let mut page = Page::new();
                let _ = http::write_redirect(&mut page, "/");
                socket.write_all(page.as_bytes()).await
            } else {
                respond_text(socket, 503, "Busy.").await
            }
        }
        Err(reason) => respond_text(socket, 400, reason).await,
    }
}

async fn respond_portal<S>(
    socket: &mut TcpSocket<'_>,
    ctx: &WebContext<'_, S>,
) -> Result<(), embassy_net::tcp::Error> {
    let mut page = Page::new();
    let _ = http::write_portal(&mut page, ctx.app_name, ctx.gate.updates_exposed());
    socket.write_all(page.as_bytes()).await
}

async fn respond_text(
    socket: &mut TcpSocket<'_>,
    code: u16,
    text: &str,
) -> Result<(), embassy_net::tcp::Error> {
    let mut page = HeaplessString::<256>::new();
    let _ = http::write_head(&mut page, code, "text/plain");
    let _ = page.write_str(text);
    socket.write_all(page.as_bytes()).await
}

fn uptime_ms() -> u64 {
    Instant::now().as_millis()
}
