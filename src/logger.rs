use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;

use crate::types::DeviceStatus;

/// How status snapshots are written to the message log.
/// Queries are always written in full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLogMode {
    Full,
    /// First snapshot in full, then only fields that changed.
    Diffed,
}

pub(crate) struct MessageLogger {
    mode: MessageLogMode,
    file: File,
    previous_snapshot: Option<BTreeMap<String, Value>>,
}

impl MessageLogger {
    pub fn new(mode: MessageLogMode, path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            mode,
            file,
            previous_snapshot: None,
        })
    }

    pub fn log_query(&mut self, params: &[(String, String)], body: &str) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "query",
            "params": params_object(params),
            "body": body,
        });
        self.write_line(&entry);
    }

    pub fn log_query_error(&mut self, params: &[(String, String)], error: &str) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "query",
            "params": params_object(params),
            "error": error,
        });
        self.write_line(&entry);
    }

    pub fn log_snapshot(&mut self, status: &DeviceStatus) {
        let body = match serde_json::to_value(status) {
            Ok(v) => v,
            Err(e) => {
                warn!("failed to serialize status snapshot: {e}");
                return;
            }
        };
        let mut fields = BTreeMap::new();
        flatten("", &body, &mut fields);
        fields.remove("timestamp");

        let entry = match (self.mode, self.previous_snapshot.as_ref()) {
            (MessageLogMode::Diffed, Some(prev)) => {
                let changes: Vec<Value> = changed_fields(prev, &fields)
                    .into_iter()
                    .map(|(path, old, new)| json!({ "path": path, "old": old, "new": new }))
                    .collect();
                json!({
                    "ts": status.timestamp.to_rfc3339(),
                    "dir": "status",
                    "changes": changes,
                })
            }
            (MessageLogMode::Diffed, None) => json!({
                "ts": status.timestamp.to_rfc3339(),
                "dir": "status",
                "full": true,
                "body": body,
            }),
            (MessageLogMode::Full, _) => json!({
                "ts": status.timestamp.to_rfc3339(),
                "dir": "status",
                "body": body,
            }),
        };
        self.write_line(&entry);
        self.previous_snapshot = Some(fields);
    }

    fn write_line(&mut self, entry: &Value) {
        if let Ok(line) = serde_json::to_string(entry)
            && let Err(e) = writeln!(self.file, "{line}")
        {
            warn!("failed to write log entry: {e}");
        }
    }
}

fn params_object(params: &[(String, String)]) -> Value {
    Value::Object(
        params
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

/// Flatten nested objects into dotted paths.
fn flatten(prefix: &str, value: &Value, out: &mut BTreeMap<String, Value>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&path, child, out);
            }
        }
        leaf => {
            out.insert(prefix.to_string(), leaf.clone());
        }
    }
}

fn changed_fields(
    previous: &BTreeMap<String, Value>,
    current: &BTreeMap<String, Value>,
) -> Vec<(String, Value, Value)> {
    let mut changes: Vec<_> = current
        .iter()
        .filter(|(path, new)| previous.get(*path) != Some(*new))
        .map(|(path, new)| {
            let old = previous.get(path).cloned().unwrap_or(Value::Null);
            (path.clone(), old, new.clone())
        })
        .collect();
    changes.extend(
        previous
            .iter()
            .filter(|(path, _)| !current.contains_key(*path))
            .map(|(path, old)| (path.clone(), old.clone(), Value::Null)),
    );
    changes
}
