//! Formatting helpers for daemon-reported timestamps, sizes and documents.

use chrono::{DateTime, FixedOffset, SecondsFormat};
use serde_json::{Map, Value};

/// Parse a timestamp reported by the service.
///
/// Accepts RFC 3339 (`2019-06-10T17:19:43.654466283-05:00`) and the Go
/// `time.Time` string form (`2018-12-07 13:10:15.014139258 -0600 CST`, with
/// an optional trailing monotonic clock reading `m=+0.000`).
pub fn datetime_parse(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt);
    }

    // date, time and numeric offset; the zone abbreviation is redundant
    let mut parts = value.split_whitespace();
    let (date, time, offset) = (parts.next()?, parts.next()?, parts.next()?);
    DateTime::parse_from_str(&format!("{} {} {}", date, time, offset), "%Y-%m-%d %H:%M:%S%.f %z")
        .ok()
}

/// Format a timestamp as RFC 3339 with second precision.
pub fn datetime_format(dt: &DateTime<FixedOffset>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Human-readable size in decimal units, e.g. `5.58 MB`.
pub fn human_size(bytes: i64) -> String {
    const UNITS: [&str; 7] = ["B", "kB", "MB", "GB", "TB", "PB", "EB"];

    if bytes < 0 {
        return "-".to_string();
    }

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1000.0 && unit < UNITS.len() - 1 {
        size /= 1000.0;
        unit += 1;
    }

    if unit == 0 {
        return format!("{} B", bytes);
    }

    let number = format!("{:.2}", size);
    let number = number.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", number, UNITS[unit])
}

/// Lowercase every object key, recursively.
///
/// Inspect documents mix `Config`, `config` and `ConfigDigest`-style keys
/// depending on the daemon version; folding makes lookups stable.
pub fn fold_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k.to_lowercase(), fold_keys(v)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(fold_keys).collect()),
        other => other,
    }
}

/// First 12 characters of an id, as shown by `podman ps`.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(12) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}
