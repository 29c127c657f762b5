use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::logger::{MessageLogMode, MessageLogger};
use crate::protocol::{
    parse_response, range_query, read_query, value_as_f64, write_query, ParsedResponse,
    DEFAULT_PATH, MODE_KEY,
};
use crate::range::range_from_response;
use crate::transport::{HttpTransport, DEFAULT_TIMEOUT};
use crate::types::*;
use crate::{Error, Result};

type SnapshotCallback = Box<dyn Fn(&DeviceStatus) + Send + Sync>;

pub struct AtmoWebClientBuilder {
    host: String,
    port: u16,
    path: String,
    timeout: Duration,
    snapshot_callbacks: Vec<SnapshotCallback>,
    log_mode: Option<MessageLogMode>,
    log_path: Option<PathBuf>,
}

impl AtmoWebClientBuilder {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 80,
            path: DEFAULT_PATH.to_string(),
            timeout: DEFAULT_TIMEOUT,
            snapshot_callbacks: Vec::new(),
            log_mode: None,
            log_path: None,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn path(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }

    /// Per-query timeout. Bounds how long one unresponsive call can stall a poll cycle.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn on_snapshot(mut self, f: impl Fn(&DeviceStatus) + Send + Sync + 'static) -> Self {
        self.snapshot_callbacks.push(Box::new(f));
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<PathBuf>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<AtmoWebClient> {
        let url = format!("http://{}:{}{}", self.host, self.port, self.path);
        let transport = HttpTransport::new(url, self.timeout)?;

        let logger = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => Some(MessageLogger::new(mode, path)?),
            _ => None,
        };

        Ok(AtmoWebClient {
            transport,
            snapshot_callbacks: self.snapshot_callbacks,
            logger,
        })
    }
}

/// Validated access to incubator setpoints over AtmoWEB.
///
/// Writes are checked against the range the device reports at the time of
/// the write; the value echoed back by the device is the authoritative
/// result, since firmware may clamp or round.
pub struct AtmoWebClient {
    transport: HttpTransport,
    snapshot_callbacks: Vec<SnapshotCallback>,
    logger: Option<MessageLogger>,
}

impl AtmoWebClient {
    pub fn builder(host: impl Into<String>) -> AtmoWebClientBuilder {
        AtmoWebClientBuilder::new(host)
    }

    pub fn url(&self) -> &str {
        self.transport.url()
    }

    /// Send one query and return the repaired, parsed response.
    pub async fn query(&mut self, params: &[(String, String)]) -> Result<ParsedResponse> {
        let body = match self.transport.query(params).await {
            Ok(body) => body,
            Err(e) => {
                if let Some(ref mut logger) = self.logger {
                    logger.log_query_error(params, &e.to_string());
                }
                return Err(e);
            }
        };
        if let Some(ref mut logger) = self.logger {
            logger.log_query(params, &body);
        }
        parse_response(&body)
    }

    /// Current valid range for `key`, or `None` when the firmware reports none.
    pub async fn get_range(&mut self, key: ParameterKey) -> Result<Option<ParameterRange>> {
        let response = self.query(&range_query(key.wire_key())).await?;
        let range = range_from_response(key.wire_key(), &response);
        debug!(key = %key, ?range, "fetched range");
        Ok(range)
    }

    /// Validate and write a setpoint; returns the value the device echoed.
    ///
    /// The range is fetched fresh on every call because interlocks can move
    /// it. An out-of-range value is rejected before anything is written.
    pub async fn set(&mut self, key: ParameterKey, value: f64) -> Result<f64> {
        let wire = key.wire_key();

        if let Some(range) = self.get_range(key).await? {
            if !range.contains(value) {
                warn!(key = %wire, value, min = range.min, max = range.max, "setpoint out of range");
                return Err(Error::OutOfRange { key, value, range });
            }
        } else {
            debug!(key = %wire, "no range reported, skipping validation");
        }

        let response = self.query(&write_query(wire, value)).await?;
        let actual = match response.get(wire) {
            Some(Value::String(s)) if is_sentinel(s) => {
                return Err(Error::UnsupportedParameter(key));
            }
            Some(echo) => value_as_f64(echo).ok_or_else(|| {
                Error::MalformedResponse(format!("non-numeric echo for {wire}: {echo}"))
            })?,
            None => {
                return Err(Error::MalformedResponse(format!("no echo for {wire}")));
            }
        };

        if actual != value {
            info!(key = %wire, requested = value, actual, "device adjusted setpoint");
        } else {
            debug!(key = %wire, actual, "setpoint written");
        }
        Ok(actual)
    }

    /// Current setpoint. Best effort: any failure reads as `None`.
    pub async fn get(&mut self, key: ParameterKey) -> Option<f64> {
        self.read_numeric(key.wire_key()).await
    }

    /// Current sensor reading for `key`. Best effort like [`Self::get`].
    pub async fn get_reading(&mut self, key: ParameterKey) -> Option<f64> {
        self.read_numeric(key.read_key()).await
    }

    pub async fn setpoints(&mut self) -> BTreeMap<ParameterKey, Option<f64>> {
        let mut out = BTreeMap::new();
        for key in ParameterKey::ALL {
            out.insert(key, self.get(key).await);
        }
        out
    }

    pub async fn readings(&mut self) -> BTreeMap<ParameterKey, Option<f64>> {
        let mut out = BTreeMap::new();
        for key in ParameterKey::ALL {
            out.insert(key, self.get_reading(key).await);
        }
        out
    }

    /// Operating mode as reported by the controller (e.g. `Manual`).
    pub async fn mode(&mut self) -> Option<String> {
        let response = match self.query(&read_query([MODE_KEY])).await {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "mode read failed");
                return None;
            }
        };
        match response.get(MODE_KEY)? {
            Value::String(s) if !is_sentinel(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Snapshot of mode, readings and setpoints for history writers.
    /// Also delivered to `on_snapshot` callbacks and the message log.
    pub async fn status(&mut self) -> DeviceStatus {
        let timestamp = Utc::now();
        let mode = self.mode().await;
        let readings = self.readings().await;
        let setpoints = self.setpoints().await;
        let status = DeviceStatus {
            timestamp,
            mode,
            readings,
            setpoints,
        };

        if let Some(ref mut logger) = self.logger {
            logger.log_snapshot(&status);
        }
        for cb in &self.snapshot_callbacks {
            cb(&status);
        }
        status
    }

    async fn read_numeric(&mut self, wire: &str) -> Option<f64> {
        match self.query(&read_query([wire])).await {
            Ok(response) => response.get(wire).and_then(value_as_f64),
            Err(e) => {
                debug!(key = %wire, error = %e, "read failed");
                None
            }
        }
    }
}
