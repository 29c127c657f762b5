use std::path::Path;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::types::ParameterKey;
use crate::{Error, Result};

// `%#z` takes `Z`, `+02`, `+0200` and `+02:00`.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%#z",
    "%Y-%m-%d %H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M%#z",
    "%Y-%m-%d %H:%M%#z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// How timestamps without a zone designator are placed on the timeline.
/// Timestamps ending in `Z` or carrying an offset are always honoured as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NaiveTimePolicy {
    #[default]
    Utc,
    /// Wall-clock time of the host running the schedule.
    Local,
}

impl NaiveTimePolicy {
    fn resolve(self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        match self {
            NaiveTimePolicy::Utc => Some(naive.and_utc()),
            NaiveTimePolicy::Local => Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

pub fn parse_timestamp(s: &str, policy: NaiveTimePolicy) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Some(dt) = DateTime::parse_from_rfc3339(s).ok().or_else(|| {
        OFFSET_FORMATS
            .iter()
            .find_map(|fmt| DateTime::parse_from_str(s, fmt).ok())
    }) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .ok_or_else(|| Error::InvalidSchedule(format!("unparseable timestamp: {s:?}")))?;
    policy
        .resolve(naive)
        .ok_or_else(|| Error::InvalidSchedule(format!("nonexistent local time: {s:?}")))
}

/// One point-in-time instruction: apply these setpoints at `timestamp`.
///
/// Setpoint keys are kept as written so an unknown key is reported when the
/// entry runs instead of disappearing at load.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEntry {
    pub timestamp: DateTime<Utc>,
    pub setpoints: Vec<(String, f64)>,
}

impl ScheduleEntry {
    pub fn new(timestamp: DateTime<Utc>, setpoints: Vec<(String, f64)>) -> Self {
        Self {
            timestamp,
            setpoints,
        }
    }

    /// Setpoint keys that do not name a known parameter.
    pub fn unknown_keys(&self) -> impl Iterator<Item = &str> {
        self.setpoints
            .iter()
            .map(|(k, _)| k.as_str())
            .filter(|k| k.parse::<ParameterKey>().is_err())
    }
}

#[derive(Deserialize)]
struct RawEntry {
    timestamp: String,
    #[serde(default)]
    setpoints: Map<String, Value>,
}

/// Ordered schedule, immutable once loaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleDocument {
    entries: Vec<ScheduleEntry>,
}

impl ScheduleDocument {
    pub fn new(entries: Vec<ScheduleEntry>) -> Self {
        Self { entries }
    }

    pub fn from_path(path: impl AsRef<Path>, policy: NaiveTimePolicy) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let doc = Self::from_json_str(&text, policy)?;
        info!(path = %path.display(), entries = doc.len(), "loaded schedule");
        Ok(doc)
    }

    /// Parse a schedule file body. Members other than `schedule` are ignored.
    pub fn from_json_str(text: &str, policy: NaiveTimePolicy) -> Result<Self> {
        let root: Value = serde_json::from_str(text)?;
        let raw_entries = match root.get("schedule") {
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(Error::InvalidSchedule(
                    "'schedule' must be a list of setpoint entries".to_string(),
                ));
            }
            None => {
                return Err(Error::InvalidSchedule(
                    "schedule file must contain 'schedule' key".to_string(),
                ));
            }
        };

        let mut entries = Vec::with_capacity(raw_entries.len());
        for (index, item) in raw_entries.iter().enumerate() {
            let raw = RawEntry::deserialize(item)
                .map_err(|e| Error::InvalidSchedule(format!("entry {index}: {e}")))?;
            let timestamp = parse_timestamp(&raw.timestamp, policy)?;

            let mut setpoints = Vec::with_capacity(raw.setpoints.len());
            for (key, value) in raw.setpoints {
                let value = value.as_f64().ok_or_else(|| {
                    Error::InvalidSchedule(format!("entry {index}: {key} is not a number"))
                })?;
                setpoints.push((key, value));
            }

            let entry = ScheduleEntry::new(timestamp, setpoints);
            for key in entry.unknown_keys() {
                warn!(entry = index, key, "unknown setpoint key in schedule");
            }
            entries.push(entry);
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&ScheduleEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
