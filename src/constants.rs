use phf::phf_map;

pub const DEFAULT_HOST: &str = "192.168.54.1";

pub const CONTROL_PORT: u16 = 80;
pub const MEDIA_PORT: u16 = 50001;
pub const DLNA_PORT: u16 = 60606;
pub const PREVIEW_PORT: u16 = 49152;

pub const CONTROL_PATH: &str = "cam.cgi";
pub const BROWSE_PATH: &str = "Server0/CDS_control";

pub const DEVICE_ID: &str = "4D454930-0100-1000-8001-020A0003BD13";
pub const DEVICE_NAME: &str = "lumix-rs";

pub const BROWSE_PAGE_SIZE: u32 = 50;
pub const PREVIEW_FRAME_PACKET_LIMIT: usize = 256;
pub const MAX_DATAGRAM: usize = 65536;

pub const SOAP_BROWSE_ACTION: &str = "\"urn:schemas-upnp-org:service:ContentDirectory:1#Browse\"";
pub const SOAP_USER_AGENT: &str = "Panasonic Android/1 DM-CP";

pub static CODES: phf::Map<&'static str, &'static str> = phf_map! {
    "ok" => "OK",
    "err_busy" => "Camera is busy",
    "err_reject" => "Request rejected",
    "err_param" => "Invalid or unsupported parameter",
    "err_non_support" => "Operation not supported",
    "err_unsuitable_app" => "Camera is not accepting commands from this application",
    "err_critical" => "Critical camera error",
};

pub static SETTING_ALIASES: phf::Map<&'static str, &'static str> = phf_map! {
    "aperture" => "focal",
    "shutter" => "shtrspeed",
    "shutterspeed" => "shtrspeed",
    "wb" => "whitebalance",
    "ev" => "exposure",
};

pub fn describe_code(code: &str) -> &str {
    CODES.get(code).copied().unwrap_or(code)
}

pub fn resolve_setting(key: &str) -> &str {
    SETTING_ALIASES.get(key).copied().unwrap_or(key)
}

pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
pub const DAY_FORMAT: &str = "%Y-%m-%d";
