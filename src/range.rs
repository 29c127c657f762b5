use serde_json::{Map, Value};

use crate::protocol::{value_as_f64, ParsedResponse};
use crate::types::ParameterRange;

const MIN_KEYS: [&str; 3] = ["min", "Min", "MIN"];
const MAX_KEYS: [&str; 3] = ["max", "Max", "MAX"];

fn first_numeric(block: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .find_map(|k| block.get(*k))
        .and_then(value_as_f64)
}

/// Interpret the range for `wire_key` from a read response.
///
/// Newer firmware nests `{key}_Range: {min, max}`; older firmware sends flat
/// `{key}_RangeMin` / `{key}_RangeMax`. The nested shape wins when both are
/// present. `None` means the device gave nothing usable, so the caller skips
/// validation.
pub fn range_from_response(wire_key: &str, response: &ParsedResponse) -> Option<ParameterRange> {
    if let Some(Value::Object(block)) = response.get(&format!("{wire_key}_Range"))
        && let (Some(min), Some(max)) = (
            first_numeric(block, &MIN_KEYS),
            first_numeric(block, &MAX_KEYS),
        )
    {
        return Some(ParameterRange::new(min, max));
    }

    let min = response
        .get(&format!("{wire_key}_RangeMin"))
        .and_then(value_as_f64)?;
    let max = response
        .get(&format!("{wire_key}_RangeMax"))
        .and_then(value_as_f64)?;
    Some(ParameterRange::new(min, max))
}
