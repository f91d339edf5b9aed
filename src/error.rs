use thiserror::Error;

#[derive(Error, Debug)]
pub enum LumixError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Not found: {0}")]
    NotFoundError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<reqwest::Error> for LumixError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            if status == reqwest::StatusCode::NOT_FOUND {
                return LumixError::NotFoundError(e.to_string());
            }
            return LumixError::ProtocolError(format!("HTTP {}: {}", status, e));
        }

        // reqwest files a body cut short or stalled past the deadline under "decode"
        if e.is_timeout() || e.is_body() || broke_on_the_wire(&e) {
            return LumixError::ConnectionError(e.to_string());
        }

        if e.is_decode() {
            return LumixError::ProtocolError(e.to_string());
        }

        // connect, reset and everything else on the wire
        LumixError::ConnectionError(e.to_string())
    }
}

impl LumixError {
    /// A response body that stopped arriving before it was complete.
    pub(crate) fn transfer(e: reqwest::Error) -> Self {
        match LumixError::from(e) {
            LumixError::ProtocolError(msg) => LumixError::ConnectionError(msg),
            other => other,
        }
    }
}

fn broke_on_the_wire(e: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(e);
    while let Some(err) = source {
        if err.is::<std::io::Error>() {
            return true;
        }
        // hyper's incomplete-message error carries no io source
        let text = err.to_string();
        if text.contains("incomplete") || text.contains("connection closed") {
            return true;
        }
        source = err.source();
    }
    false
}

impl From<url::ParseError> for LumixError {
    fn from(e: url::ParseError) -> Self {
        LumixError::InvalidArgument(format!("Invalid URL: {}", e))
    }
}

impl From<quick_xml::Error> for LumixError {
    fn from(e: quick_xml::Error) -> Self {
        LumixError::ProtocolError(format!("Malformed XML: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, LumixError>;
