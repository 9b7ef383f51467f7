//! Request routing and page rendering for the embedded HTTP server.
//!
//! The socket side lives in the firmware; everything here works on text
//! buffers so it can be tested on the host.

use core::fmt::{self, Write};

use heapless::String;

use crate::{
    connect::{PASSWORD_MAX_LEN, SSID_MAX_LEN},
    control::ControlRequest,
    panel::{ImageName, TagStyle},
    settings::StoredConnection,
    status::DeviceStatus,
};

pub const HTTP_PORT: u16 = 80;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Method {
    Get,
    Post,
    Other,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Route {
    Home,
    Status,
    Restart,
    ClearWifi,
    DisplayWipe,
    DisplayTag,
    DisplayImage,
    SaveWifi,
    Update,
    HotspotDetect,
    NotFound,
}

impl Route {
    pub fn resolve(method: Method, path: &str) -> Self {
        match (method, path) {
            (Method::Get, "/") => Self::Home,
            (Method::Get, "/status") => Self::Status,
            (Method::Get, "/restart") => Self::Restart,
            (Method::Get, "/clearwifi") => Self::ClearWifi,
            (Method::Get, "/display/wipe") => Self::DisplayWipe,
            (Method::Get, "/display/tag") => Self::DisplayTag,
            (Method::Get, "/display/image") => Self::DisplayImage,
            (Method::Post, "/wifi") => Self::SaveWifi,
            (Method::Post, "/update") => Self::Update,
            (_, "/hotspot-detect.html") => Self::HotspotDetect,
            _ => Self::NotFound,
        }
    }

    /// Routes that only exist while the site is mounted.
    pub const fn needs_site(self) -> bool {
        matches!(
            self,
            Self::Home
                | Self::Restart
                | Self::ClearWifi
                | Self::DisplayWipe
                | Self::DisplayTag
                | Self::DisplayImage
                | Self::SaveWifi
        )
    }
}

/// Request line and body of one HTTP/1.x request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Request<'a> {
    pub method: Method,
    pub path: &'a str,
    pub query: &'a str,
    pub body: &'a str,
}

impl<'a> Request<'a> {
    pub fn parse(text: &'a str) -> Option<Self> {
        let (head, body) = text.split_once("\r\n\r\n").unwrap_or((text, ""));
        let request_line = head.lines().next()?;
        let mut parts = request_line.split_whitespace();

        let method = match parts.next()? {
            "GET" => Method::Get,
            "POST" => Method::Post,
            _ => Method::Other,
        };
        let target = parts.next()?;
        let (path, query) = target.split_once('?').unwrap_or((target, ""));

        Some(Self {
            method,
            path,
            query,
            body,
        })
    }

    pub fn route(&self) -> Route {
        Route::resolve(self.method, self.path)
    }

    /// Value of `Content-Length` in `head`, if present.
    pub fn content_length(head: &str) -> Option<usize> {
        head.lines().find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.trim()
                .eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse().ok())
                .flatten()
        })
    }
}

/// Raw value of `key` in an `a=b&c=d` string.
pub fn param<'a>(encoded: &'a str, key: &str) -> Option<&'a str> {
    encoded
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| *name == key)
        .map(|(_, value)| value)
}

/// Form/URL decoding; characters that do not fit are dropped.
pub fn url_decode<const N: usize>(raw: &str) -> String<N> {
    let mut out = String::<N>::new();
    let bytes = raw.as_bytes();
    let mut decoded = [0u8; 4];
    let mut pending = 0usize;
    let mut index = 0usize;

    while index < bytes.len() {
        let byte = match bytes[index] {
            b'+' => b' ',
            b'%' if index + 2 < bytes.len() => {
                let hex = core::str::from_utf8(&bytes[index + 1..index + 3]).ok();
                match hex.and_then(|hex| u8::from_str_radix(hex, 16).ok()) {
                    Some(value) => {
                        index += 2;
                        value
                    }
                    None => b'%',
                }
            }
            other => other,
        };
        index += 1;

        decoded[pending] = byte;
        pending += 1;
        match core::str::from_utf8(&decoded[..pending]) {
            Ok(text) => {
                let _ = out.push_str(text);
                pending = 0;
            }
            Err(err) if err.error_len().is_some() || pending == decoded.len() => pending = 0,
            Err(_) => {}
        }
    }

    out
}

/// Maps a display or maintenance route onto a control request.
pub fn control_request(route: Route, query: &str) -> Result<ControlRequest, &'static str> {
    match route {
        Route::Restart => Ok(ControlRequest::Restart),
        Route::ClearWifi => Ok(ControlRequest::ClearWifi),
        Route::DisplayWipe => Ok(ControlRequest::Wipe),
        Route::DisplayTag => {
            let style = param(query, "style").unwrap_or("black");
            TagStyle::from_name(style)
                .map(ControlRequest::PrintTag)
                .ok_or("unknown tag style")
        }
        Route::DisplayImage => {
            let name = url_decode::<32>(param(query, "name").ok_or("missing image name")?);
            if name.is_empty() {
                return Err("missing image name");
            }
            ImageName::try_from(name.as_str())
                .map(ControlRequest::ShowImage)
                .map_err(|_| "image name too long")
        }
        _ => Err("not a control route"),
    }
}

/// Status code and text a display route is refused with while the panel
/// cannot take a job; `None` lets the request through.
pub fn display_refusal(route: Route, status: &DeviceStatus) -> Option<(u16, &'static str)> {
    if !matches!(
        route,
        Route::DisplayWipe | Route::DisplayTag | Route::DisplayImage
    ) {
        return None;
    }
    if !status.display_initialized {
        Some((503, "Display not ready."))
    } else if status.display_busy {
        Some((409, "Busy."))
    } else {
        None
    }
}

/// Credential form posted to `/wifi`.
pub fn wifi_form(body: &str) -> Option<StoredConnection> {
    let ssid = url_decode::<SSID_MAX_LEN>(param(body, "ssid").unwrap_or(""));
    let password = url_decode::<PASSWORD_MAX_LEN>(param(body, "password").unwrap_or(""));
    let ap_mode = matches!(param(body, "ap"), Some("on" | "1" | "true"));

    if ssid.is_empty() && !ap_mode {
        return None;
    }
    StoredConnection::new(ssid.as_str(), password.as_str(), ap_mode)
}

/// `N days HH:MM:SS`.
pub fn write_uptime<W: Write>(out: &mut W, uptime_ms: u64) -> fmt::Result {
    let secs = uptime_ms / 1_000;
    let days = secs / 86_400;
    write!(
        out,
        "{} day{} {:02}:{:02}:{:02}",
        days,
        if days == 1 { "" } else { "s" },
        (secs / 3_600) % 24,
        (secs / 60) % 60,
        secs % 60
    )
}

pub fn write_head<W: Write>(out: &mut W, code: u16, content_type: &str) -> fmt::Result {
    let reason = match code {
        200 => "OK",
        302 => "Found",
        400 => "Bad Request",
        404 => "Not Found",
        409 => "Conflict",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Error",
    };
    write!(
        out,
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nConnection: close\r\n\r\n",
        code, reason, content_type
    )
}

pub fn write_redirect<W: Write>(out: &mut W, location: &str) -> fmt::Result {
    write!(
        out,
        "HTTP/1.1 302 Found\r\nLocation: {}\r\nConnection: close\r\n\r\n",
        location
    )
}

/// Home page of the application image.
pub fn write_home<W: Write>(
    out: &mut W,
    app_name: &str,
    status: &DeviceStatus,
    uptime_ms: u64,
) -> fmt::Result {
    write_head(out, 200, "text/html; charset=utf-8")?;
    write!(
        out,
        "<!DOCTYPE html><html lang=\"en\"><head>\
         <meta name=\"viewport\" content=\"width=device-width,initial-scale=1,user-scalable=no\" />\
         <title>{}</title></head><body><h2>Hello!</h2><p>{} {}</p><p>Uptime: ",
        app_name,
        app_name,
        env!("CARGO_PKG_VERSION")
    )?;
    write_uptime(out, uptime_ms)?;
    out.write_str("</p>")?;

    if let Some(reason) = status.restart {
        write!(out, "<p>{}...</p>", reason.label())?;
    }

    write!(
        out,
        "<p>Display: {}</p>\
         <p><a href=\"/display/tag?style=black\">Black tag</a> \
         <a href=\"/display/tag?style=red\">Red tag</a> \
         <a href=\"/display/tag?style=blank\">Blank</a> \
         <a href=\"/display/wipe\">Wipe</a></p>\
         <form action=\"/display/image\"><input name=\"name\" /><button>Show image</button></form>\
         <form method=\"POST\" action=\"/wifi\">\
         <input name=\"ssid\" placeholder=\"SSID\" />\
         <input name=\"password\" type=\"password\" placeholder=\"Password\" />\
         <label><input name=\"ap\" type=\"checkbox\" />Access point</label>\
         <button>Save WiFi</button></form>\
         <p><a href=\"/restart\">Restart</a> <a href=\"/clearwifi\">Clear WiFi</a></p>\
         </body></html>",
        display_label(status)
    )
}

/// Plain-text status of `/status`.
pub fn write_status<W: Write>(out: &mut W, status: &DeviceStatus, uptime_ms: u64) -> fmt::Result {
    write_head(out, 200, "text/plain")?;
    writeln!(out, "state: {}", status.state.label())?;
    match status.address {
        Some(address) => writeln!(out, "address: {}", address)?,
        None => out.write_str("address: -\n")?,
    }
    writeln!(out, "display: {}", display_label(status))?;
    writeln!(out, "server: {}", status.server_running)?;
    writeln!(out, "site: {}", status.site_mounted)?;
    if let Some(reason) = status.restart {
        writeln!(out, "restart: {:?}", reason)?;
    }
    out.write_str("uptime: ")?;
    write_uptime(out, uptime_ms)?;
    out.write_str("\n")
}

/// Captive-portal landing page with the credential and upload forms.
pub fn write_portal<W: Write>(out: &mut W, app_name: &str, ota: bool) -> fmt::Result {
    write_head(out, 200, "text/html; charset=utf-8")?;
    write!(
        out,
        "<!DOCTYPE html><html><head>\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
         <title>{}</title></head><body><h1>{}</h1>\
         <form method=\"POST\" action=\"/wifi\">\
         <input name=\"ssid\" placeholder=\"SSID\" />\
         <input name=\"password\" type=\"password\" placeholder=\"Password\" />\
         <button>Connect</button></form>",
        app_name, app_name
    )?;
    if ota {
        out.write_str(
            "<form method=\"POST\" action=\"/update\" enctype=\"application/octet-stream\">\
             <input type=\"file\" name=\"firmware\" /><button>Update</button></form>",
        )?;
    }
    out.write_str("</body></html>")
}

pub const HOTSPOT_SUCCESS: &str =
    "<HTML><HEAD><TITLE>Success</TITLE></HEAD><BODY>Success</BODY></HTML>";

/// Portal probes before a captive-network assistant is told it is online.
pub const HOTSPOT_PORTAL_HITS: u8 = 2;

/// Answers Apple's captive-network probe: the portal first, then success.
#[derive(Clone, Copy, Debug, Default)]
pub struct HotspotProbe {
    hits: u8,
}

impl HotspotProbe {
    pub const fn new() -> Self {
        Self { hits: 0 }
    }

    /// `true` once the probe should see the success page.
    pub fn next_is_success(&mut self) -> bool {
        self.hits = self.hits.saturating_add(1);
        self.hits > HOTSPOT_PORTAL_HITS
    }
}

fn display_label(status: &DeviceStatus) -> &'static str {
    match (status.display_initialized, status.display_busy) {
        (false, _) => "starting",
        (true, true) => "busy",
        (true, false) => "ready",
    }
}

#[cfg(test)]
mod tests {
    use core::net::Ipv4Addr;

    use super::*;
    use crate::{connect::ConnectionState, services::restart::RestartReason};

    #[test]
    fn request_line_and_query_are_split() {
        let text = "GET /display/tag?style=red HTTP/1.1\r\nHost: x\r\n\r\n";
        let request = Request::parse(text).unwrap();

        assert_eq!(request.method, Method::Get);
        assert_eq!(request.route(), Route::DisplayTag);
        assert_eq!(
            control_request(request.route(), request.query),
            Ok(ControlRequest::PrintTag(TagStyle::Red))
        );
    }

    #[test]
    fn display_routes_are_refused_while_panel_is_busy_or_cold() {
        let mut status = DeviceStatus::boot();
        assert_eq!(
            display_refusal(Route::DisplayImage, &status),
            Some((503, "Display not ready."))
        );

        status.display_initialized = true;
        status.display_busy = true;
        assert_eq!(display_refusal(Route::DisplayWipe, &status), Some((409, "Busy.")));
        assert_eq!(display_refusal(Route::DisplayTag, &status), Some((409, "Busy.")));
        assert_eq!(display_refusal(Route::Restart, &status), None);

        status.display_busy = false;
        assert_eq!(display_refusal(Route::DisplayImage, &status), None);
    }

    #[test]
    fn unknown_paths_and_methods_are_not_found() {
        assert_eq!(Route::resolve(Method::Post, "/"), Route::NotFound);
        assert_eq!(Route::resolve(Method::Get, "/nope"), Route::NotFound);
        assert_eq!(Route::resolve(Method::Get, "/update"), Route::NotFound);
        assert_eq!(
            Route::resolve(Method::Other, "/hotspot-detect.html"),
            Route::HotspotDetect
        );
    }

    #[test]
    fn image_names_are_decoded_and_bounded() {
        assert_eq!(
            control_request(Route::DisplayImage, "name=my%20logo"),
            Ok(ControlRequest::ShowImage(ImageName::try_from("my logo").unwrap()))
        );
        assert_eq!(
            control_request(Route::DisplayImage, "name="),
            Err("missing image name")
        );
        assert_eq!(
            control_request(Route::DisplayTag, "style=green"),
            Err("unknown tag style")
        );
    }

    #[test]
    fn wifi_form_is_decoded() {
        let record = wifi_form("ssid=My+Net&password=p%40ss%21").unwrap();
        assert_eq!(record.ssid.as_str(), "My Net");
        assert_eq!(record.password.as_str(), "p@ss!");
        assert!(!record.ap_mode);

        assert!(wifi_form("ap=on").unwrap().ap_mode);
        assert_eq!(wifi_form("password=x"), None);
    }

    #[test]
    fn url_decode_keeps_multibyte_text() {
        let decoded: String<16> = url_decode("caf%C3%A9%2");
        assert_eq!(decoded.as_str(), "café%2");
    }

    #[test]
    fn content_length_is_case_insensitive() {
        let head = "POST /update HTTP/1.1\r\ncontent-length: 1234\r\n";
        assert_eq!(Request::content_length(head), Some(1234));
        assert_eq!(Request::content_length("GET / HTTP/1.1"), None);
    }

    #[test]
    fn uptime_uses_days_and_clock() {
        let mut out: String<32> = String::new();
        write_uptime(&mut out, ((86_400 + 3_723) * 1_000) as u64).unwrap();
        assert_eq!(out.as_str(), "1 day 01:02:03");

        out.clear();
        write_uptime(&mut out, 59_999).unwrap();
        assert_eq!(out.as_str(), "0 days 00:00:59");
    }

    #[test]
    fn home_page_shows_the_restart_banner() {
        let mut status = DeviceStatus::boot();
        status.state = ConnectionState::Connected;
        status.address = Some(Ipv4Addr::new(10, 0, 0, 2));
        status.restart = Some(RestartReason::ResetWifi);

        let mut page: String<4096> = String::new();
        write_home(&mut page, "inktag", &status, 1_000).unwrap();

        assert!(page.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(page.contains(RestartReason::ResetWifi.label()));
    }

    #[test]
    fn hotspot_probe_turns_to_success_after_two_hits() {
        let mut probe = HotspotProbe::new();
        assert!(!probe.next_is_success());
        assert!(!probe.next_is_success());
        assert!(probe.next_is_success());
    }
}
