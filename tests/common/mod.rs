#![allow(dead_code)]

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use lumix_rs::LumixCam;
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// In-memory stand-in for the camera's HTTP side.
#[derive(Default)]
pub struct FakeCamera {
    pub access_granted: bool,
    pub deny_access: bool,
    pub busy: bool,
    pub settings: HashMap<String, String>,
    pub files: Vec<String>,
    pub blobs: HashMap<String, Vec<u8>>,
    /// Successive `sd_access` values reported by `getstate`, then `off`.
    pub sd_access: VecDeque<&'static str>,
    /// `mode` or `mode:value` for every cam.cgi hit.
    pub requests: Vec<String>,
    pub stream_port: Option<u16>,
    /// Overrides `NumberReturned` and drops `TotalMatches` from browse replies.
    pub reported_count: Option<u32>,
    pub port: u16,
}

impl FakeCamera {
    pub fn paired() -> Self {
        Self {
            access_granted: true,
            settings: HashMap::from([
                ("iso".to_string(), "200".to_string()),
                ("focal".to_string(), "56/10".to_string()),
                ("shtrspeed".to_string(), "1/125".to_string()),
            ]),
            ..Default::default()
        }
    }

    pub fn with_files(mut self, files: &[&str]) -> Self {
        self.files = files.iter().map(|f| f.to_string()).collect();
        self
    }
}

type Shared = Arc<Mutex<FakeCamera>>;

pub struct FakeDevice {
    pub addr: SocketAddr,
    pub state: Shared,
}

impl FakeDevice {
    pub async fn spawn(camera: FakeCamera) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(FakeCamera {
            port: addr.port(),
            ..camera
        }));

        let app = Router::new()
            .route("/cam.cgi", get(cam_cgi))
            .route("/Server0/CDS_control", post(cds_control))
            .fallback(media)
            .with_state(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    /// Client with every endpoint pointed at this device.
    pub fn client(&self) -> LumixCam {
        let port = self.addr.port();
        LumixCam::new("127.0.0.1")
            .with_control_port(port)
            .with_media_port(port)
            .with_dlna_port(port)
            .with_timeout(Duration::from_secs(2))
            .with_mode_switch_delay(Duration::ZERO)
            .with_preview_bind(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .with_preview_port(0)
    }

    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn count(&self, request: &str) -> usize {
        self.requests().iter().filter(|r| r.as_str() == request).count()
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}/{}", self.addr, path.trim_start_matches('/'))
    }
}

/// Bare TCP server that answers every request with `reply` verbatim, then keeps the
/// connection open for `hold` before closing it.
pub async fn spawn_raw_http(reply: Vec<u8>, hold: Duration) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let reply = reply.clone();
            tokio::spawn(async move {
                let mut seen = Vec::new();
                let mut buf = [0u8; 1024];
                while !seen.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => seen.extend_from_slice(&buf[..n]),
                    }
                }
                let _ = socket.write_all(&reply).await;
                let _ = socket.flush().await;
                tokio::time::sleep(hold).await;
            });
        }
    });

    addr
}

/// Client whose control and media endpoints point at `addr`.
pub fn raw_client(addr: SocketAddr) -> LumixCam {
    LumixCam::new("127.0.0.1")
        .with_control_port(addr.port())
        .with_media_port(addr.port())
        .with_dlna_port(addr.port())
        .with_mode_switch_delay(Duration::ZERO)
}

/// Port that was free a moment ago.
pub fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn xml(body: String) -> Response {
    ([(header::CONTENT_TYPE, "text/xml")], body).into_response()
}

fn reply(result: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<camrply><result>{}</result></camrply>",
        result
    )
}

fn iso_in_range(value: &str) -> bool {
    value == "auto" || value.parse::<u32>().is_ok_and(|n| (100..=25600).contains(&n))
}

async fn cam_cgi(State(state): State<Shared>, Query(q): Query<HashMap<String, String>>) -> Response {
    let mut cam = state.lock().unwrap();
    let mode = q.get("mode").cloned().unwrap_or_default();
    let value = q.get("value").cloned();
    let kind = q.get("type").cloned().unwrap_or_default();

    cam.requests.push(match &value {
        Some(v) if mode == "camcmd" || mode == "startstream" => format!("{}:{}", mode, v),
        _ => mode.clone(),
    });

    let body = match mode.as_str() {
        "getstate" if !cam.access_granted => reply("err_unsuitable_app"),
        "getstate" => {
            let sd = cam.sd_access.pop_front().unwrap_or("off");
            format!(
                "<camrply><result>ok</result><state><batt>4/5</batt><cammode>rec</cammode><remaincapacity>812</remaincapacity><sdcardstatus>write_enable</sdcardstatus><sd_access>{}</sd_access><version>2.1</version></state></camrply>",
                sd
            )
        }
        "accctrl" if cam.deny_access => reply("err_reject"),
        "accctrl" => {
            cam.access_granted = true;
            reply("ok")
        }
        "camcmd" => match value.as_deref() {
            Some("capture") if cam.busy => reply("err_busy"),
            Some("capture") => {
                let name = format!("IMG_{:04}.JPG", cam.files.len() + 1);
                cam.files.push(name);
                reply("ok")
            }
            Some("recmode" | "playmode" | "video_recstart" | "video_recstop") => reply("ok"),
            _ => reply("err_param"),
        },
        "getsetting" => match cam.settings.get(&kind) {
            Some(v) => format!(
                "<camrply><result>ok</result><settingvalue {}=\"{}\"></settingvalue></camrply>",
                kind, v
            ),
            None => reply("err_param"),
        },
        "setsetting" => {
            let v = value.unwrap_or_default();
            if !cam.settings.contains_key(&kind) || (kind == "iso" && !iso_in_range(&v)) {
                reply("err_param")
            } else {
                cam.settings.insert(kind, v);
                reply("ok")
            }
        }
        "startstream" => {
            cam.stream_port = value.and_then(|v| v.parse().ok());
            reply("ok")
        }
        "stopstream" => reply("ok"),
        "get_content_info" => format!(
            "<camrply><result>ok</result><current_position>0</current_position><total_content_number>{}</total_content_number></camrply>",
            cam.files.len()
        ),
        _ => reply("err_non_support"),
    };

    xml(body)
}

fn tag_value(body: &str, tag: &str) -> Option<usize> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)? + start;
    body[start..end].trim().parse().ok()
}

async fn cds_control(State(state): State<Shared>, body: String) -> Response {
    let start = tag_value(&body, "StartingIndex").unwrap_or(0);
    let count = tag_value(&body, "RequestedCount").unwrap_or(15);
    let cam = state.lock().unwrap();

    let mut didl = String::from(
        r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/">"#,
    );
    let mut returned = 0;
    for (i, title) in cam.files.iter().enumerate().skip(start).take(count) {
        returned += 1;
        didl.push_str(&format!(
            r#"<item id="{id}" parentID="0" restricted="0"><dc:title>{title}</dc:title><dc:date>2024-05-01T10:20:30</dc:date><upnp:class>object.item.imageItem.photo</upnp:class><res protocolInfo="http-get:*:image/jpeg:DLNA.ORG_PN=JPEG_LRG">http://127.0.0.1:{port}/{title}</res><res protocolInfo="http-get:*:image/jpeg:DLNA.ORG_PN=JPEG_TN">http://127.0.0.1:{port}/thumb/{title}</res></item>"#,
            id = 1_000_000 + i + 1,
            title = title,
            port = cam.port,
        ));
    }
    didl.push_str("</DIDL-Lite>");

    let counts = match cam.reported_count {
        Some(n) => format!("<NumberReturned>{}</NumberReturned>", n),
        None => format!(
            "<NumberReturned>{}</NumberReturned><TotalMatches>{}</TotalMatches>",
            returned,
            cam.files.len()
        ),
    };

    xml(format!(
        r#"<?xml version="1.0"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/"><s:Body><u:BrowseResponse xmlns:u="urn:schemas-upnp-org:service:ContentDirectory:1"><Result>{}</Result>{}<UpdateID>1</UpdateID></u:BrowseResponse></s:Body></s:Envelope>"#,
        quick_xml::escape::escape(&didl),
        counts
    ))
}

async fn media(State(state): State<Shared>, uri: Uri) -> Response {
    let name = uri.path().trim_start_matches('/').to_string();
    let cam = state.lock().unwrap();

    if let Some(bytes) = cam.blobs.get(&name) {
        return bytes.clone().into_response();
    }
    if cam.files.contains(&name) {
        return format!("JPEGDATA:{}", name).into_response();
    }
    StatusCode::NOT_FOUND.into_response()
}
