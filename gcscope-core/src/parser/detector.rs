//! Log format sniffing.
//!
//! Looks at the first non-empty lines of a log. An explicit declaration
//! (`Using G1`, `CommandLine flags: -XX:+UseG1GC`) wins over line markers
//! such as `PSYoungGen` or `Pause Mark Start`.

use super::grammar;
use super::ParseOptions;
use crate::error::{Error, Result};
use crate::model::{CollectorFamily, LogFormat, LogStyle};
use crate::vmoption::VmOptions;

/// `Using ...` declarations of unified logs.
const DECLARATIONS: &[(&str, CollectorFamily)] = &[
    ("Using G1", CollectorFamily::G1),
    ("Using The Z Garbage Collector", CollectorFamily::Zgc),
    ("Using Z Garbage Collector", CollectorFamily::Zgc),
    ("Using Serial", CollectorFamily::Serial),
    ("Using Parallel", CollectorFamily::Parallel),
    ("Using Concurrent Mark Sweep", CollectorFamily::Cms),
    ("Using Shenandoah", CollectorFamily::Shenandoah),
    ("Using Epsilon", CollectorFamily::Epsilon),
];

/// Text that only one family prints.
const MARKERS: &[(&str, CollectorFamily)] = &[
    ("G1 Evacuation Pause", CollectorFamily::G1),
    ("GC pause (", CollectorFamily::G1),
    ("GC concurrent-root-region-scan", CollectorFamily::G1),
    ("Eden regions:", CollectorFamily::G1),
    ("Pause Young (Normal)", CollectorFamily::G1),
    ("Pause Young (Concurrent Start)", CollectorFamily::G1),
    ("garbage-first heap", CollectorFamily::G1),
    ("Garbage Collection (", CollectorFamily::Zgc),
    ("Pause Mark Start", CollectorFamily::Zgc),
    ("Allocation Stall (", CollectorFamily::Zgc),
    ("Shenandoah", CollectorFamily::Shenandoah),
    ("PSYoungGen", CollectorFamily::Parallel),
    ("ParOldGen", CollectorFamily::Parallel),
    ("ParNew", CollectorFamily::Cms),
    ("CMS-concurrent", CollectorFamily::Cms),
    ("CMS Initial Mark", CollectorFamily::Cms),
    ("Pause Initial Mark", CollectorFamily::Cms),
    ("DefNew", CollectorFamily::Serial),
    ("Tenured", CollectorFamily::Serial),
];

/// Sniff the format of `text` from its first `sniff_lines` non-empty lines.
pub fn detect(text: &str, sniff_lines: usize) -> Result<LogFormat> {
    resolve_format(
        text,
        &ParseOptions {
            sniff_lines,
            ..ParseOptions::default()
        },
    )
}

/// Combine caller choices with sniffing for whatever was left open.
pub fn resolve_format(text: &str, options: &ParseOptions) -> Result<LogFormat> {
    let lines: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(options.sniff_lines.max(1))
        .collect();

    let family = match options.family {
        Some(family) => family,
        None => detect_family(&lines).ok_or_else(|| {
            Error::UnsupportedFormat(
                "no collector family marker in the leading lines".to_string(),
            )
        })?,
    };
    let style = options.style.unwrap_or_else(|| detect_style(&lines));
    tracing::debug!(%family, %style, "resolved log format");
    Ok(LogFormat::new(family, style))
}

fn detect_style(lines: &[&str]) -> LogStyle {
    if lines.iter().any(|l| grammar::unified_line(l).is_some()) {
        LogStyle::Unified
    } else {
        LogStyle::Legacy
    }
}

fn detect_family(lines: &[&str]) -> Option<CollectorFamily> {
    explicit_family(lines).or_else(|| {
        lines.iter().find_map(|line| {
            MARKERS
                .iter()
                .find(|(marker, _)| line.contains(marker))
                .map(|(_, family)| *family)
        })
    })
}

fn explicit_family(lines: &[&str]) -> Option<CollectorFamily> {
    lines.iter().find_map(|line| {
        if let Some(flags) = grammar::command_line_flags(line) {
            return VmOptions::parse(flags)
                .ok()
                .and_then(|opts| opts.collector_family());
        }
        let message = grammar::unified_line(line).map_or(*line, |l| l.message);
        DECLARATIONS
            .iter()
            .find(|(declaration, _)| message.starts_with(declaration))
            .map(|(_, family)| *family)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_unified_g1() {
        let log = "[0.010s][info][gc] Using G1\n\
                   [0.300s][info][gc] GC(0) Pause Young (Normal) \
                   (G1 Evacuation Pause) 24M->4M(256M) 3.215ms\n";
        let format = detect(log, 200).unwrap();
        assert_eq!(format, LogFormat::new(CollectorFamily::G1, LogStyle::Unified));
    }

    #[test]
    fn test_detect_legacy_from_command_line() {
        let log = "Java HotSpot(TM) 64-Bit Server VM (25.131-b11)\n\
                   CommandLine flags: -XX:InitialHeapSize=268435456 -XX:+UseConcMarkSweepGC\n\
                   0.500: [GC (Allocation Failure) 0.500: \
                   [DefNew: 1K->1K(2K), 0.001 secs] 1K->1K(4K), 0.001 secs]\n";
        let format = detect(log, 200).unwrap();
        // the declared collector wins over the DefNew marker
        assert_eq!(format, LogFormat::new(CollectorFamily::Cms, LogStyle::Legacy));
    }

    #[test]
    fn test_detect_from_markers() {
        let log = "0.524: [GC (Allocation Failure) [PSYoungGen: 65536K->10720K(76288K)] \
                   65536K->13250K(251392K), 0.0087450 secs]\n";
        assert_eq!(
            detect(log, 200).unwrap(),
            LogFormat::new(CollectorFamily::Parallel, LogStyle::Legacy)
        );
    }

    #[test]
    fn test_shenandoah_is_recognized_by_name() {
        let log = "[0.005s][info][gc] Using Shenandoah\n";
        let format = detect(log, 200).unwrap();
        assert_eq!(format.family, CollectorFamily::Shenandoah);
    }

    #[test]
    fn test_sniff_window_is_respected() {
        let mut log = String::new();
        for _ in 0..10 {
            log.push_str("noise\n");
        }
        log.push_str("[0.010s][info][gc] Using G1\n");
        assert!(detect(&log, 5).is_err());
        assert!(detect(&log, 20).is_ok());
    }

    #[test]
    fn test_caller_choice_overrides_sniffing() {
        let options = ParseOptions {
            family: Some(CollectorFamily::Serial),
            ..ParseOptions::default()
        };
        let format = resolve_format("[0.010s][info][gc] Using G1\n", &options).unwrap();
        assert_eq!(format, LogFormat::new(CollectorFamily::Serial, LogStyle::Unified));
    }
}
