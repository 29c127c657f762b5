use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Controllable incubator parameters.
/// Serialized as the AtmoWEB wire key so snapshots read like device traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ParameterKey {
    #[serde(rename = "TempSet")]
    Temperature,
    #[serde(rename = "HumSet")]
    Humidity,
    #[serde(rename = "CO2Set")]
    Co2,
    #[serde(rename = "O2Set")]
    O2,
    #[serde(rename = "FanSet")]
    Fan,
}

impl ParameterKey {
    pub const ALL: [ParameterKey; 5] = [
        ParameterKey::Temperature,
        ParameterKey::Humidity,
        ParameterKey::Co2,
        ParameterKey::O2,
        ParameterKey::Fan,
    ];

    /// Setpoint key used in the AtmoWEB query string.
    pub fn wire_key(&self) -> &'static str {
        match self {
            ParameterKey::Temperature => "TempSet",
            ParameterKey::Humidity => "HumSet",
            ParameterKey::Co2 => "CO2Set",
            ParameterKey::O2 => "O2Set",
            ParameterKey::Fan => "FanSet",
        }
    }

    /// Sensor reading key paired with this setpoint.
    pub fn read_key(&self) -> &'static str {
        match self {
            ParameterKey::Temperature => "Temp1Read",
            ParameterKey::Humidity => "HumRead",
            ParameterKey::Co2 => "CO2Read",
            ParameterKey::O2 => "O2Read",
            ParameterKey::Fan => "FanRead",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ParameterKey::Temperature => "temperature",
            ParameterKey::Humidity => "humidity",
            ParameterKey::Co2 => "co2",
            ParameterKey::O2 => "o2",
            ParameterKey::Fan => "fan",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            ParameterKey::Temperature => "\u{00b0}C",
            ParameterKey::Humidity => "% RH",
            ParameterKey::Co2 | ParameterKey::O2 | ParameterKey::Fan => "%",
        }
    }

    pub fn from_wire_key(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.wire_key() == s)
    }
}

impl FromStr for ParameterKey {
    type Err = Error;

    /// Accepts the wire key (`TempSet`) or the lowercase name (`temperature`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_wire_key(s)
            .or_else(|| Self::ALL.into_iter().find(|k| k.name() == s))
            .ok_or_else(|| Error::UnknownParameter(s.to_string()))
    }
}

impl fmt::Display for ParameterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_key())
    }
}

/// Inclusive bounds reported by the device for one setpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParameterRange {
    pub min: f64,
    pub max: f64,
}

impl ParameterRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }
}

/// Tokens the firmware uses in place of a value it cannot provide.
pub const SENTINEL_TOKENS: [&str; 3] = ["N/A", "N/D", "UNKNOWN"];

pub fn is_sentinel(s: &str) -> bool {
    let s = s.trim();
    SENTINEL_TOKENS.iter().any(|t| t.eq_ignore_ascii_case(s))
}

/// Point-in-time view of the device handed to history writers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceStatus {
    pub timestamp: DateTime<Utc>,
    pub mode: Option<String>,
    pub readings: BTreeMap<ParameterKey, Option<f64>>,
    pub setpoints: BTreeMap<ParameterKey, Option<f64>>,
}

/// Outcome events emitted by the schedule engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    SetpointApplied {
        entry_index: usize,
        key: ParameterKey,
        requested: f64,
        actual: f64,
    },
    SetpointFailed {
        entry_index: usize,
        key: String,
        value: f64,
        error: String,
    },
    SetpointUnavailable {
        entry_index: usize,
        key: ParameterKey,
        value: f64,
    },
    EntryExecuted {
        entry_index: usize,
        timestamp: DateTime<Utc>,
        succeeded: usize,
        failed: usize,
        not_available: usize,
    },
    ScheduleExhausted,
}
