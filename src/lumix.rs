use crate::constants::{
    BROWSE_PATH, CONTROL_PATH, CONTROL_PORT, DEVICE_ID, DEVICE_NAME, DLNA_PORT, MEDIA_PORT,
    PREVIEW_PORT,
};
use crate::error::{LumixError, Result};
use crate::protocol::CommandResult;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use strum::AsRefStr;
use tokio::time::Duration;
use tracing::{debug, trace, warn};
use url::Url;

/// Request modes understood by `cam.cgi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    GetState,
    AccCtrl,
    CamCmd,
    GetSetting,
    SetSetting,
    StartStream,
    StopStream,
    #[strum(serialize = "get_content_info")]
    GetContentInfo,
}

#[derive(Clone)]
pub struct LumixCam {
    pub(crate) host: String,
    pub(crate) control_port: u16,
    pub(crate) media_port: u16,
    pub(crate) dlna_port: u16,
    pub(crate) preview_port: u16,
    pub(crate) preview_bind: IpAddr,

    pub(crate) timeout: Duration,
    pub(crate) download_timeout: Duration,
    pub(crate) heartbeat_interval: Duration,
    pub(crate) mode_switch_delay: Duration,

    pub(crate) device_id: String,
    pub(crate) device_name: String,

    pub(crate) access_granted: Arc<AtomicBool>,

    pub(crate) http: reqwest::Client,
}

impl LumixCam {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            control_port: CONTROL_PORT,
            media_port: MEDIA_PORT,
            dlna_port: DLNA_PORT,
            preview_port: PREVIEW_PORT,
            preview_bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            timeout: Duration::from_secs(5),
            download_timeout: Duration::from_secs(120),
            heartbeat_interval: Duration::from_secs(2),
            mode_switch_delay: Duration::from_secs(1),
            device_id: DEVICE_ID.to_string(),
            device_name: DEVICE_NAME.to_string(),
            access_granted: Arc::new(AtomicBool::new(false)),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub fn with_control_port(mut self, port: u16) -> Self {
        self.control_port = port;
        self
    }

    pub fn with_media_port(mut self, port: u16) -> Self {
        self.media_port = port;
        self
    }

    pub fn with_dlna_port(mut self, port: u16) -> Self {
        self.dlna_port = port;
        self
    }

    /// Port 0 lets the OS pick; the bound port is what gets announced to the camera.
    pub fn with_preview_port(mut self, port: u16) -> Self {
        self.preview_port = port;
        self
    }

    pub fn with_preview_bind(mut self, addr: IpAddr) -> Self {
        self.preview_bind = addr;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Pause after switching between rec and play mode before the camera is queried again.
    pub fn with_mode_switch_delay(mut self, delay: Duration) -> Self {
        self.mode_switch_delay = delay;
        self
    }

    pub fn with_identity(mut self, device_id: impl Into<String>, name: impl Into<String>) -> Self {
        self.device_id = device_id.into();
        self.device_name = name.into();
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn control_url(&self) -> String {
        format!("http://{}:{}/{}", self.host, self.control_port, CONTROL_PATH)
    }

    pub(crate) fn browse_url(&self) -> String {
        format!("http://{}:{}/{}", self.host, self.dlna_port, BROWSE_PATH)
    }

    pub(crate) fn media_base(&self) -> Result<Url> {
        Ok(Url::parse(&format!("http://{}:{}/", self.host, self.media_port))?)
    }

    pub(crate) fn warn_without_access(&self, what: &str) {
        if !self.access_granted.load(Ordering::Acquire) {
            warn!(host = %self.host, command = what, "issuing command before access was granted");
        }
    }

    /// Sends one `cam.cgi` request and returns the raw reply body.
    pub(crate) async fn request(&self, mode: Mode, params: &[(&str, &str)]) -> Result<String> {
        let mut query: Vec<(&str, &str)> = Vec::with_capacity(params.len() + 1);
        query.push(("mode", mode.as_ref()));
        query.extend_from_slice(params);

        debug!(host = %self.host, mode = mode.as_ref(), ?params, "sending camera request");

        let body = self
            .http
            .get(self.control_url())
            .query(&query)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
            .map_err(LumixError::transfer)?;

        trace!(mode = mode.as_ref(), body = %body, "camera reply");
        Ok(body)
    }

    /// Parsed reply, with a non-`ok` result turned into an error.
    pub(crate) async fn command(&self, mode: Mode, params: &[(&str, &str)]) -> Result<CommandResult> {
        let body = self.request(mode, params).await?;
        CommandResult::from_xml(&body)?.ensure_ok(mode.as_ref())
    }

    pub(crate) async fn settle(&self) {
        if !self.mode_switch_delay.is_zero() {
            tokio::time::sleep(self.mode_switch_delay).await;
        }
    }
}

impl std::fmt::Debug for LumixCam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LumixCam")
            .field("host", &self.host)
            .field("control_port", &self.control_port)
            .field("media_port", &self.media_port)
            .field("dlna_port", &self.dlna_port)
            .field("preview_port", &self.preview_port)
            .field("access_granted", &self.access_granted.load(Ordering::Acquire))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_names_match_cam_cgi() {
        assert_eq!(Mode::GetState.as_ref(), "getstate");
        assert_eq!(Mode::AccCtrl.as_ref(), "accctrl");
        assert_eq!(Mode::SetSetting.as_ref(), "setsetting");
        assert_eq!(Mode::StartStream.as_ref(), "startstream");
        assert_eq!(Mode::GetContentInfo.as_ref(), "get_content_info");
    }

    #[test]
    fn endpoints_follow_configured_ports() {
        let cam = LumixCam::new("10.0.0.2")
            .with_control_port(8080)
            .with_dlna_port(9000)
            .with_media_port(9001);

        assert_eq!(cam.control_url(), "http://10.0.0.2:8080/cam.cgi");
        assert_eq!(cam.browse_url(), "http://10.0.0.2:9000/Server0/CDS_control");
        assert_eq!(cam.media_base().unwrap().as_str(), "http://10.0.0.2:9001/");
    }
}
