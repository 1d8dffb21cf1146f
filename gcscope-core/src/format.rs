//! Formatting helpers shared by event rendering and the CLI.

use chrono::{DateTime, Utc};

const UNITS: &[&str] = &["K", "M", "G", "T"];

/// Format a byte count with a binary unit (e.g., "24.0M").
pub fn format_bytes(bytes: i64) -> String {
    let sign = if bytes < 0 { "-" } else { "" };
    let mut value = bytes.unsigned_abs() as f64;
    if value < 1024.0 {
        return format!("{sign}{}B", bytes.unsigned_abs());
    }
    let mut unit = UNITS[0];
    value /= 1024.0;
    for next in &UNITS[1..] {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = next;
    }
    format!("{sign}{value:.1}{unit}")
}

/// Format an optional byte count, or "?" if unknown.
pub fn format_bytes_opt(bytes: Option<i64>) -> String {
    bytes.map_or_else(|| "?".to_string(), format_bytes)
}

/// Format milliseconds with microsecond precision (e.g., "3.200ms").
pub fn format_ms(ms: f64) -> String {
    format!("{ms:.3}ms")
}

/// Format optional milliseconds, or "?" if unknown.
pub fn format_ms_opt(ms: Option<f64>) -> String {
    ms.map_or_else(|| "?".to_string(), format_ms)
}

/// Format an uptime in ms as seconds since JVM start (e.g., "12.345s").
pub fn format_uptime(ms: f64) -> String {
    format!("{:.3}s", ms / 1000.0)
}

/// Format a wall-clock timestamp with millisecond precision.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

pub fn format_percent(value: f64) -> String {
    format!("{value:.2}%")
}
