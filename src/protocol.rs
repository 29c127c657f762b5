//! AtmoWEB wire format: query-string builders and the response repair parser.
//!
//! The firmware answers with near-JSON text whose defects vary by revision:
//! missing outer braces, trailing commas, typographic quotes, bare keys and
//! bare sentinel values. Rather than special-case revisions, [`repair`] runs a
//! fixed, ordered pipeline of text rewrites and hands the result to a strict
//! JSON parser. There is exactly one repair pass.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::types::is_sentinel;
use crate::{Error, Result};

pub const DEFAULT_PATH: &str = "/atmoweb";

/// Wire key for the current operating mode.
pub const MODE_KEY: &str = "CurOp";

/// Structured device response: wire key to number, string or nested object.
pub type ParsedResponse = Map<String, Value>;

const CURLY_QUOTES: [char; 3] = ['\u{201E}', '\u{201C}', '\u{201D}'];

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*\}").expect("invalid trailing comma regex"));

static BARE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([,{]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:").expect("invalid bare key regex")
});

// No look-ahead in `regex`: the terminator is captured and written back.
static BARE_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r":\s*([A-Za-z_][A-Za-z0-9_./-]*)\s*([,}])").expect("invalid bare value regex")
});

/// Rewrite a raw device response into strict JSON text.
pub fn repair(raw: &str) -> String {
    let mut text: String = raw
        .trim()
        .chars()
        .map(|c| if CURLY_QUOTES.contains(&c) { '"' } else { c })
        .collect();

    if !text.starts_with('{') {
        text.insert(0, '{');
    }
    if !text.ends_with('}') {
        let kept = text.trim_end_matches([',', ' ', '\t', '\r', '\n']).len();
        text.truncate(kept);
        text.push('}');
    }

    let text = TRAILING_COMMA.replace_all(&text, "}");
    let text = BARE_KEY.replace_all(&text, "${1}\"${2}\":");
    let text = BARE_VALUE.replace_all(&text, ":\"${1}\"${2}");
    text.into_owned()
}

/// Repair and strictly parse a device response.
pub fn parse_response(raw: &str) -> Result<ParsedResponse> {
    let repaired = repair(raw);
    match serde_json::from_str::<Value>(&repaired) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(Error::MalformedResponse(format!(
            "expected an object, got {other}"
        ))),
        Err(e) => Err(Error::MalformedResponse(format!("{e} in {repaired:?}"))),
    }
}

/// Numeric view of a response value. Numeric strings count; sentinels do not.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if !is_sentinel(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Query parameters requesting the current value of each key.
pub fn read_query<'a>(keys: impl IntoIterator<Item = &'a str>) -> Vec<(String, String)> {
    keys.into_iter()
        .map(|k| (k.to_string(), String::new()))
        .collect()
}

/// Read of a setpoint together with both firmware range shapes. Older
/// firmware only answers the keys it is asked for, so the flat bounds are
/// requested explicitly.
pub fn range_query(wire_key: &str) -> Vec<(String, String)> {
    let mut query = read_query([wire_key]);
    for suffix in ["_Range", "_RangeMin", "_RangeMax"] {
        query.push((format!("{wire_key}{suffix}"), String::new()));
    }
    query
}

pub fn write_query(wire_key: &str, value: f64) -> Vec<(String, String)> {
    vec![(wire_key.to_string(), value.to_string())]
}
