use std::fmt;

use crate::types::{ParameterKey, ParameterRange};

#[derive(Debug)]
pub enum Error {
    /// Timeout, refused connection or non-2xx status from the device.
    Http(reqwest::Error),
    /// The repaired response body is still not a JSON object, or a value
    /// the caller needed was missing or not numeric.
    MalformedResponse(String),
    /// Rejected locally; nothing was sent to the device.
    OutOfRange {
        key: ParameterKey,
        value: f64,
        range: ParameterRange,
    },
    /// The device answered with a sentinel (N/A, N/D, unknown) for this key.
    UnsupportedParameter(ParameterKey),
    UnknownParameter(String),
    InvalidSchedule(String),
    Json(serde_json::Error),
    Io(std::io::Error),
}

impl Error {
    /// Network-class failure: the device could not be reached or refused the request.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Http(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::MalformedResponse(msg) => write!(f, "malformed response: {msg}"),
            Error::OutOfRange { key, value, range } => write!(
                f,
                "{}={value} is outside valid range [{}, {}]",
                key.wire_key(),
                range.min,
                range.max
            ),
            Error::UnsupportedParameter(key) => {
                write!(f, "{} not supported or rejected by controller", key.wire_key())
            }
            Error::UnknownParameter(name) => write!(f, "unknown parameter: {name}"),
            Error::InvalidSchedule(msg) => write!(f, "invalid schedule: {msg}"),
            Error::Json(e) => write!(f, "JSON error: {e}"),
            Error::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(e) => Some(e),
            Error::Json(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
