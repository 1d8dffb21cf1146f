//! Shared line grammar for every log generation.
//!
//! Holds the size, duration and CPU-time captures that all parsers use,
//! plus the two line-prefix grammars: legacy `date: uptime: ` prefixes and
//! unified `[decoration][level][tags]` prefixes.

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::model::CpuTime;

/// Size with optional fraction and unit, e.g. `69952K`, `24.0M`, `30000 K`
pub const SIZE: &str = r"\d+(?:[.,]\d+)?\s?[BKMGT]?";

static SIZE_PARTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+(?:[.,]\d+)?)\s?([BKMGT]?)$").unwrap());

static MEMORY_CHANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?P<pre>{SIZE})(?:\((?P<precap>{SIZE})\))?->(?P<post>{SIZE})(?:\((?P<postcap>{SIZE})\))?"
    ))
    .unwrap()
});

static TRAILING_MEMORY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^(?P<head>.*?)\s+(?P<mem>{SIZE}(?:\({SIZE}\))?->{SIZE}(?:\({SIZE}\))?)$"
    ))
    .unwrap()
});

static TRAILING_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<head>.*?)\s*(?P<value>\d+(?:[.,]\d+)?)(?P<unit>ms|s)$").unwrap()
});

static LEGACY_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?P<date>\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}[.,]\d{3}[+-]\d{4}): )?(?:(?P<uptime>\d+[.,]\d+): )?(?P<rest>.*)$",
    )
    .unwrap()
});

static DATESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}[.,]\d{3}[+-]\d{2}:?\d{2}$").unwrap()
});

static UPTIME_DECORATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+(?:[.,]\d+)?)(s|ms)$").unwrap());

static TAGS_DECORATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]+(?:,[a-z0-9_]+)*$").unwrap());

static GC_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^GC\((\d+)\)\s*").unwrap());

static LEGACY_TIMES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\[Times: user=(?P<user>\d+[.,]\d+) sys=(?P<sys>\d+[.,]\d+), real=(?P<real>\d+[.,]\d+) secs\s*\]",
    )
    .unwrap()
});

static UNIFIED_CPU: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"User=(?P<user>\d+[.,]\d+)s Sys=(?P<sys>\d+[.,]\d+)s Real=(?P<real>\d+[.,]\d+)s")
        .unwrap()
});

static STOPPED_SAFEPOINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"Total time for which application threads were stopped: (?P<total>\d+[.,]\d+) seconds(?:, Stopping threads took: (?P<reach>\d+[.,]\d+) seconds)?",
    )
    .unwrap()
});

static NAMED_SAFEPOINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"Safepoint "[^"]*", Time since last: \d+ ns, Reaching safepoint: (?P<reach>\d+) ns(?:, Cleanup: \d+ ns)?, At safepoint: \d+ ns, Total: (?P<total>\d+) ns"#,
    )
    .unwrap()
});

/// Parse a number that may use a decimal comma.
pub fn number(text: &str) -> Option<f64> {
    text.trim().replace(',', ".").parse().ok()
}

/// Seconds as printed by the JVM, returned in ms.
pub fn seconds_to_ms(text: &str) -> Option<f64> {
    number(text).map(|s| s * 1000.0)
}

/// Size with unit suffix, in bytes. A bare number is taken as bytes.
pub fn size(text: &str) -> Option<i64> {
    let caps = SIZE_PARTS.captures(text.trim())?;
    let value = number(&caps[1])?;
    let multiplier = match &caps[2] {
        "K" => 1i64 << 10,
        "M" => 1 << 20,
        "G" => 1 << 30,
        "T" => 1 << 40,
        _ => 1,
    };
    Some((value * multiplier as f64).round() as i64)
}

/// Plain region count, e.g. the `24` of `Eden regions: 24->0(21)`.
pub fn count(text: &str) -> Option<i64> {
    text.trim().parse().ok()
}

/// A `pre(precap)->post(postcap)` capture with any part optional.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemoryChange {
    pub pre_used: Option<i64>,
    pub pre_capacity: Option<i64>,
    pub post_used: Option<i64>,
    pub post_capacity: Option<i64>,
}

impl MemoryChange {
    fn from_captures(caps: &Captures<'_>, convert: fn(&str) -> Option<i64>) -> Self {
        let get = |name: &str| caps.name(name).and_then(|m| convert(m.as_str()));
        Self {
            pre_used: get("pre"),
            pre_capacity: get("precap"),
            post_used: get("post"),
            post_capacity: get("postcap"),
        }
    }

    /// First memory change in `text`, sizes converted to bytes.
    pub fn find(text: &str) -> Option<Self> {
        MEMORY_CHANGE
            .captures(text)
            .map(|caps| Self::from_captures(&caps, size))
    }

    /// First memory change in `text`, values kept as plain region counts.
    pub fn find_regions(text: &str) -> Option<Self> {
        static REGION_CHANGE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(
                r"(?P<pre>\d+)(?:\((?P<precap>\d+)\))?->(?P<post>\d+)(?:\((?P<postcap>\d+)\))?",
            )
            .unwrap()
        });
        REGION_CHANGE
            .captures(text)
            .map(|caps| Self::from_captures(&caps, count))
    }

    pub fn into_item(self, generation: crate::model::Generation) -> crate::model::MemoryItem {
        crate::model::MemoryItem {
            generation,
            pre_used: self.pre_used,
            pre_capacity: self.pre_capacity,
            post_used: self.post_used,
            post_capacity: self.post_capacity,
            in_regions: false,
        }
    }
}

/// Strip a trailing `12.345ms` or `1.2s` and return it in ms.
pub fn split_trailing_duration(text: &str) -> (&str, Option<f64>) {
    match TRAILING_DURATION.captures(text) {
        Some(caps) => {
            let head = caps.name("head").map_or("", |m| m.as_str());
            let value = number(&caps["value"]);
            let ms = match &caps["unit"] {
                "s" => value.map(|v| v * 1000.0),
                _ => value,
            };
            (head, ms)
        }
        None => (text, None),
    }
}

/// Strip a trailing `24M->4M(256M)` style memory change.
pub fn split_trailing_memory(text: &str) -> (&str, Option<MemoryChange>) {
    match TRAILING_MEMORY.captures(text) {
        Some(caps) => {
            let head = caps.name("head").map_or("", |m| m.as_str());
            (head, MemoryChange::find(&caps["mem"]))
        }
        None => (text, None),
    }
}

/// Split `Pause Young (Normal) (G1 Evacuation Pause)` into the name and
/// its parenthesized groups. Nested parentheses stay within their group.
pub fn split_title(text: &str) -> (&str, Vec<&str>) {
    let text = text.trim();
    let Some(open) = text.find(" (") else {
        return (text, Vec::new());
    };
    let name = &text[..open];
    let mut groups = Vec::new();
    let mut depth = 0usize;
    let mut group_start = None;
    for (i, c) in text.char_indices().skip_while(|(i, _)| *i <= open) {
        match c {
            '(' => {
                if depth == 0 {
                    group_start = Some(i + 1);
                }
                depth += 1;
            }
            ')' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(start) = group_start.take() {
                        groups.push(&text[start..i]);
                    }
                }
            }
            _ => {}
        }
    }
    (name, groups)
}

fn parse_datestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.replace(',', ".");
    DateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%.3f%z")
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// A legacy line after its `date: uptime: ` prefix.
#[derive(Debug, Clone, Copy)]
pub struct LegacyLine<'a> {
    pub datestamp: Option<DateTime<Utc>>,
    /// ms since JVM start
    pub uptime: Option<f64>,
    pub rest: &'a str,
}

pub fn legacy_line(line: &str) -> LegacyLine<'_> {
    match LEGACY_PREFIX.captures(line) {
        Some(caps) => LegacyLine {
            datestamp: caps.name("date").and_then(|m| parse_datestamp(m.as_str())),
            uptime: caps.name("uptime").and_then(|m| seconds_to_ms(m.as_str())),
            rest: caps.name("rest").map_or(line, |m| m.as_str()),
        },
        None => LegacyLine {
            datestamp: None,
            uptime: None,
            rest: line,
        },
    }
}

/// A unified logging line split into decorations and message.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnifiedLine<'a> {
    pub datestamp: Option<DateTime<Utc>>,
    pub uptime: Option<f64>,
    pub level: Option<&'a str>,
    pub tags: Option<&'a str>,
    pub gc_id: Option<u64>,
    pub message: &'a str,
}

impl UnifiedLine<'_> {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags
            .is_some_and(|tags| tags.split(',').any(|t| t == tag))
    }
}

const LEVELS: &[&str] = &["trace", "debug", "info", "warning", "error"];

/// Parse the `[...]` decorations. Returns `None` when the line carries
/// no decoration at all.
pub fn unified_line(line: &str) -> Option<UnifiedLine<'_>> {
    let mut parsed = UnifiedLine::default();
    let mut rest = line.trim_end();
    let mut decorated = false;

    while let Some(inner_start) = rest.strip_prefix('[') {
        let Some(close) = inner_start.find(']') else {
            break;
        };
        let content = inner_start[..close].trim();
        if DATESTAMP.is_match(content) {
            parsed.datestamp = parse_datestamp(content);
        } else if let Some(caps) = UPTIME_DECORATION.captures(content) {
            let value = number(&caps[1]);
            parsed.uptime = match &caps[2] {
                "s" => value.map(|v| v * 1000.0),
                _ => value,
            };
        } else if LEVELS.contains(&content) {
            parsed.level = Some(content);
        } else if TAGS_DECORATION.is_match(content) {
            parsed.tags = Some(content);
        } else if !content.is_empty() && content.bytes().all(|b| b.is_ascii_digit()) {
            // pid or tid
        } else {
            break;
        }
        decorated = true;
        rest = &inner_start[close + 1..];
    }

    if !decorated {
        return None;
    }

    let mut message = rest.trim_start();
    if let Some(caps) = GC_ID.captures(message) {
        parsed.gc_id = caps[1].parse().ok();
        message = &message[caps[0].len()..];
    }
    parsed.message = message;
    Some(parsed)
}

/// GC sequence id of a unified line, if it has one.
pub fn unified_gc_id(line: &str) -> Option<u64> {
    unified_line(line).and_then(|l| l.gc_id)
}

/// `[Times: user=.. sys=.., real=.. secs]`
pub fn legacy_cpu(text: &str) -> Option<CpuTime> {
    let caps = LEGACY_TIMES.captures(text)?;
    cpu_from(&caps)
}

/// Remove a `[Times: ...]` block so later matches do not see it.
pub fn strip_legacy_cpu(text: &str) -> std::borrow::Cow<'_, str> {
    LEGACY_TIMES.replace(text, "")
}

/// `User=..s Sys=..s Real=..s`
pub fn unified_cpu(text: &str) -> Option<CpuTime> {
    let caps = UNIFIED_CPU.captures(text)?;
    cpu_from(&caps)
}

fn cpu_from(caps: &Captures<'_>) -> Option<CpuTime> {
    Some(CpuTime {
        user: seconds_to_ms(&caps["user"])?,
        sys: seconds_to_ms(&caps["sys"])?,
        real: seconds_to_ms(&caps["real"])?,
    })
}

/// Total stopped time and time to reach the safepoint, in ms.
pub fn safepoint(text: &str) -> Option<(f64, Option<f64>)> {
    if let Some(caps) = STOPPED_SAFEPOINT.captures(text) {
        let total = seconds_to_ms(&caps["total"])?;
        let reach = caps.name("reach").and_then(|m| seconds_to_ms(m.as_str()));
        return Some((total, reach));
    }
    let caps = NAMED_SAFEPOINT.captures(text)?;
    let nanos = |name: &str| number(&caps[name]).map(|ns| ns / 1_000_000.0);
    Some((nanos("total")?, nanos("reach")))
}

/// Option string of a `CommandLine flags:` header line.
pub fn command_line_flags(text: &str) -> Option<&str> {
    text.trim()
        .strip_prefix("CommandLine flags:")
        .map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_units() {
        assert_eq!(size("69952K"), Some(69952 * 1024));
        assert_eq!(size("24.0M"), Some(24 << 20));
        assert_eq!(size("0.0B"), Some(0));
        assert_eq!(size("30000 K"), Some(30000 * 1024));
        assert_eq!(size("4523.5K"), Some(4_632_064));
        assert_eq!(size("1,5G"), Some(1_610_612_736));
        assert_eq!(size("junk"), None);
    }

    #[test]
    fn test_memory_change() {
        let change = MemoryChange::find("[PSYoungGen: 65536K->10720K(76288K)]").unwrap();
        assert_eq!(change.pre_used, Some(65536 * 1024));
        assert_eq!(change.pre_capacity, None);
        assert_eq!(change.post_used, Some(10720 * 1024));
        assert_eq!(change.post_capacity, Some(76288 * 1024));

        let change = MemoryChange::find("Eden: 24.0M(24.0M)->0.0B(21.0M)").unwrap();
        assert_eq!(change.pre_capacity, Some(24 << 20));
        assert_eq!(change.post_capacity, Some(21 << 20));

        let regions = MemoryChange::find_regions("Eden regions: 24->0(21)").unwrap();
        assert_eq!(regions.pre_used, Some(24));
        assert_eq!(regions.post_used, Some(0));
        assert_eq!(regions.post_capacity, Some(21));
    }

    #[test]
    fn test_trailing_summary() {
        let text = "Pause Young (Normal) (G1 Evacuation Pause) 24M->4M(256M) 3.215ms";
        let (head, duration) = split_trailing_duration(text);
        assert_eq!(duration, Some(3.215));
        let (head, memory) = split_trailing_memory(head);
        assert_eq!(head, "Pause Young (Normal) (G1 Evacuation Pause)");
        assert_eq!(memory.unwrap().post_used, Some(4 << 20));

        let (name, groups) = split_title(head);
        assert_eq!(name, "Pause Young");
        assert_eq!(groups, vec!["Normal", "G1 Evacuation Pause"]);
    }

    #[test]
    fn test_split_title_keeps_nested_parens() {
        let (name, groups) = split_title("Pause Full (System.gc())");
        assert_eq!(name, "Pause Full");
        assert_eq!(groups, vec!["System.gc()"]);
        assert_eq!(split_title("Concurrent Cycle"), ("Concurrent Cycle", vec![]));
    }

    #[test]
    fn test_legacy_prefix() {
        let line = legacy_line(
            "2021-05-06T02:00:00.123+0800: 0.524: [GC (Allocation Failure) [PSYoungGen: 1K->1K(2K)]",
        );
        assert_eq!(line.uptime, Some(524.0));
        assert!(line.datestamp.is_some());
        assert!(line.rest.starts_with("[GC (Allocation Failure)"));

        let line = legacy_line("   [Eden: 24.0M(24.0M)->0.0B(21.0M)]");
        assert_eq!(line.uptime, None);
        assert_eq!(line.rest, "   [Eden: 24.0M(24.0M)->0.0B(21.0M)]");
    }

    #[test]
    fn test_unified_decorations() {
        let line = unified_line(
            "[2021-05-06T02:00:00.300+0000][0.300s][info][gc,start    ] GC(3) Pause Young (Normal) (G1 Evacuation Pause)",
        )
        .unwrap();
        assert_eq!(line.uptime, Some(300.0));
        assert!(line.datestamp.is_some());
        assert_eq!(line.level, Some("info"));
        assert!(line.has_tag("start"));
        assert_eq!(line.gc_id, Some(3));
        assert_eq!(line.message, "Pause Young (Normal) (G1 Evacuation Pause)");

        let line = unified_line("[12ms][info][gc] Using G1").unwrap();
        assert_eq!(line.uptime, Some(12.0));
        assert_eq!(line.gc_id, None);
        assert_eq!(line.message, "Using G1");

        assert!(unified_line("0.524: [GC pause").is_none());
    }

    #[test]
    fn test_cpu_and_safepoint() {
        let cpu = legacy_cpu(" [Times: user=0.02 sys=0.01, real=0.03 secs] ").unwrap();
        assert_eq!(cpu.user, 20.0);
        assert_eq!(cpu.real, 30.0);
        let cpu = unified_cpu("User=0.01s Sys=0.00s Real=0.02s").unwrap();
        assert_eq!(cpu.real, 20.0);

        let (total, reach) = safepoint(
            "Total time for which application threads were stopped: 0.0012345 seconds, Stopping threads took: 0.0000123 seconds",
        )
        .unwrap();
        assert!((total - 1.2345).abs() < 1e-9);
        assert!((reach.unwrap() - 0.0123).abs() < 1e-9);

        let (total, reach) = safepoint(
            r#"Safepoint "G1CollectForAllocation", Time since last: 1000 ns, Reaching safepoint: 2000000 ns, At safepoint: 1000000 ns, Total: 3000000 ns"#,
        )
        .unwrap();
        assert_eq!(total, 3.0);
        assert_eq!(reach, Some(2.0));
    }
}
