//! Legacy (JDK 8 `-XX:+PrintGCDetails`) parser for Serial, Parallel and CMS.
//!
//! Pause lines carry everything on one line:
//!
//! ```text
//! 0.524: [GC (Allocation Failure) [PSYoungGen: 65536K->10720K(76288K)] 65536K->13250K(251392K), 0.0087450 secs] [Times: user=0.02 sys=0.01, real=0.01 secs]
//! ```
//!
//! CMS concurrent cycles span many lines, from `CMS Initial Mark` to
//! `CMS-concurrent-reset`.

use std::sync::LazyLock;

use regex::Regex;

use super::common::{self, Touch};
use crate::model::{
    CollectorFamily, EventKind, GcCause, GcEvent, Generation, LogFormat, LogStyle, MemoryItem,
    ModelBuilder, SpecialSituation,
};
use crate::parser::grammar::{self, MemoryChange, SIZE};
use crate::parser::{scan_lines, GcLogParser, LineOutcome};

static PAUSE_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[(?P<full>Full )?GC ?(?:\((?P<cause>System\.gc\(\)|[^()]+)\))?").unwrap()
});

static GEN_SECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\[(?P<gen>DefNew|ParNew|ASPSYoungGen|PSYoungGen|Tenured|ASParOldGen|ParOldGen|PSOldGen|CMS Perm|CMS|Metaspace|PSPermGen|Perm)(?: \((?P<flag>[a-z ]+)\))?\s*:\s*(?P<mem>{SIZE}(?:\({SIZE}\))?->{SIZE}(?:\({SIZE}\))?)"
    ))
    .unwrap()
});

static TOTAL_AFTER_SECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\]\s*(?P<mem>{SIZE}(?:\({SIZE}\))?->{SIZE}(?:\({SIZE}\))?)"
    ))
    .unwrap()
});

static TRAILING_SECS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r", (?P<secs>\d+[.,]\d+) secs\]\s*$").unwrap());

static INITIAL_MARK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"CMS-initial-mark: (?P<old>{SIZE})\((?P<oldcap>{SIZE})\)\]\s*(?P<total>{SIZE})\((?P<totalcap>{SIZE})\)"
    ))
    .unwrap()
});

static REMARK_OLD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"CMS-remark: (?P<old>{SIZE})\((?P<oldcap>{SIZE})\)\]\s*(?P<total>{SIZE})\((?P<totalcap>{SIZE})\)"
    ))
    .unwrap()
});

static YG_OCCUPANCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"YG occupancy: (?P<used>{SIZE}) \((?P<cap>{SIZE})\)"
    ))
    .unwrap()
});

static REMARK_SUBPHASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:(?P<ts>\d+[.,]\d+): )?\[(?P<name>Rescan \((?:non-)?parallel\) ?|weak refs processing|class unloading|scrub symbol table|scrub string table), (?P<secs>\d+[.,]\d+) secs\]",
    )
    .unwrap()
});

static CONCURRENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\[CMS-concurrent-(?P<phase>abortable-preclean|preclean|mark|sweep|reset)(?:-start\]|: (?P<cpu>\d+[.,]\d+)/(?P<wall>\d+[.,]\d+) secs\])",
    )
    .unwrap()
});

fn generation_of(section: &str) -> Generation {
    match section {
        "DefNew" | "ParNew" | "PSYoungGen" | "ASPSYoungGen" => Generation::Young,
        "Metaspace" | "PSPermGen" | "Perm" | "CMS Perm" => Generation::Metaspace,
        _ => Generation::Old,
    }
}

fn snapshot(generation: Generation, used: Option<i64>, capacity: Option<i64>) -> MemoryItem {
    MemoryItem {
        generation,
        pre_used: used,
        pre_capacity: capacity,
        post_used: used,
        post_capacity: capacity,
        in_regions: false,
    }
}

/// Parser for legacy Serial, Parallel and CMS logs.
pub struct LegacyGenerationalParser {
    family: CollectorFamily,
}

impl LegacyGenerationalParser {
    pub fn new(family: CollectorFamily) -> Self {
        Self { family }
    }
}

#[derive(Debug, Default)]
struct State {
    touched: Option<Touch>,
}

impl GcLogParser for LegacyGenerationalParser {
    fn format(&self) -> LogFormat {
        LogFormat::new(self.family, LogStyle::Legacy)
    }

    fn parse_into(&self, text: &str, builder: &mut ModelBuilder) {
        let mut state = State::default();
        scan_lines(text, builder, |b, line_no, line| {
            parse_line(&mut state, b, line_no, line)
        });
    }
}

fn parse_line(state: &mut State, b: &mut ModelBuilder, line_no: usize, raw: &str) -> LineOutcome {
    let line = grammar::legacy_line(raw);
    let rest = line.rest.trim();

    if let Some(outcome) = common::header_line(b, rest) {
        return outcome;
    }
    if common::legacy_heap_dump_line(rest) {
        return LineOutcome::Ignored;
    }

    let time = b.resolve_time(line.uptime, line.datestamp);
    if let Some(outcome) = common::safepoint_line(b, time, rest, line_no) {
        return outcome;
    }
    if rest.starts_with("[Times:") {
        return match grammar::legacy_cpu(rest) {
            Some(cpu) if common::attach_cpu(b, state.touched, cpu) => LineOutcome::Recognized,
            _ => LineOutcome::Unrecognized,
        };
    }
    if rest.starts_with("CMS: abort preclean") {
        return LineOutcome::Ignored;
    }

    let Some(time) = time else {
        return LineOutcome::Unrecognized;
    };
    if rest.starts_with("[CMS-concurrent-") {
        return concurrent_phase(state, b, time, rest, line_no);
    }
    if rest.starts_with("[GC") || rest.starts_with("[Full GC") {
        if rest.contains("CMS-initial-mark") {
            return initial_mark(state, b, time, rest, line_no);
        }
        if rest.contains("CMS-remark") || rest.contains("CMS Final Remark") {
            return final_remark(state, b, time, line.uptime.is_some(), rest, line_no);
        }
        return pause(state, b, time, rest, line_no);
    }
    LineOutcome::Unrecognized
}

fn trailing_secs(b: &mut ModelBuilder, body: &str) -> Option<f64> {
    let secs = TRAILING_SECS
        .captures(body)
        .and_then(|c| grammar::seconds_to_ms(&c["secs"]));
    common::checked_duration(b, secs)
}

fn pause(
    state: &mut State,
    b: &mut ModelBuilder,
    time: f64,
    rest: &str,
    line_no: usize,
) -> LineOutcome {
    let cpu = grammar::legacy_cpu(rest);
    let stripped = grammar::strip_legacy_cpu(rest);
    let body = stripped.trim_end();

    let Some(caps) = PAUSE_START.captures(body) else {
        return LineOutcome::Unrecognized;
    };
    let kind = if caps.name("full").is_some() {
        EventKind::FullGc
    } else {
        EventKind::YoungGc
    };
    let cause = caps.name("cause").map(|m| GcCause::new(m.as_str()));
    let mut event = GcEvent::new(kind, time).with_cause(cause).with_line(line_no);

    let mut sections = 0;
    for section in GEN_SECTION.captures_iter(body) {
        sections += 1;
        if let Some(change) = MemoryChange::find(&section["mem"]) {
            event.put_memory(change.into_item(generation_of(&section["gen"])));
        }
    }
    let total = if sections > 0 {
        TOTAL_AFTER_SECTION
            .captures(body)
            .and_then(|c| MemoryChange::find(&c["mem"]))
    } else {
        MemoryChange::find(body)
    };
    if let Some(total) = total {
        event.put_memory(total.into_item(Generation::Total));
    }

    if body.contains("promotion failed") || body.contains("--[") {
        event.mark(SpecialSituation::PromotionFailed);
    }
    if body.contains("concurrent mode failure") || body.contains("concurrent mode interrupted") {
        event.mark(SpecialSituation::ConcurrentModeFailure);
    }
    event.duration = trailing_secs(b, body);
    event.cpu = cpu;

    let index = b.push_event(event);
    state.touched = Some(Touch::Event(index));
    LineOutcome::Recognized
}

/// Newest CMS cycle still in progress, or a fresh one starting at `time`.
fn open_cycle(b: &mut ModelBuilder, time: f64, line_no: usize) -> usize {
    match b.last_event_where(|e| e.kind == EventKind::CmsConcurrentCycle) {
        Some(index) if b.events()[index].duration.is_none() => index,
        _ => b.push_event(GcEvent::new(EventKind::CmsConcurrentCycle, time).with_line(line_no)),
    }
}

fn initial_mark(
    state: &mut State,
    b: &mut ModelBuilder,
    time: f64,
    rest: &str,
    line_no: usize,
) -> LineOutcome {
    let cpu = grammar::legacy_cpu(rest);
    let stripped = grammar::strip_legacy_cpu(rest);
    let body = stripped.trim_end();

    let cycle = b.push_event(GcEvent::new(EventKind::CmsConcurrentCycle, time).with_line(line_no));
    let mut phase = GcEvent::new(EventKind::CmsInitialMark, time)
        .with_duration(trailing_secs(b, body))
        .with_line(line_no);
    phase.cpu = cpu;
    if let Some(caps) = INITIAL_MARK.captures(body) {
        phase.put_memory(snapshot(
            Generation::Old,
            grammar::size(&caps["old"]),
            grammar::size(&caps["oldcap"]),
        ));
        phase.put_memory(snapshot(
            Generation::Total,
            grammar::size(&caps["total"]),
            grammar::size(&caps["totalcap"]),
        ));
    }
    b.add_phase_to(cycle, phase);
    state.touched = Some(Touch::last_phase(b, cycle));
    LineOutcome::Recognized
}

fn final_remark(
    state: &mut State,
    b: &mut ModelBuilder,
    time: f64,
    has_uptime: bool,
    rest: &str,
    line_no: usize,
) -> LineOutcome {
    let cpu = grammar::legacy_cpu(rest);
    let stripped = grammar::strip_legacy_cpu(rest);
    let body = stripped.trim_end();

    let cycle = open_cycle(b, time, line_no);
    let mut remark = GcEvent::new(EventKind::CmsFinalRemark, time)
        .with_duration(trailing_secs(b, body))
        .with_line(line_no);
    remark.cpu = cpu;
    if let Some(caps) = YG_OCCUPANCY.captures(body) {
        remark.put_memory(snapshot(
            Generation::Young,
            grammar::size(&caps["used"]),
            grammar::size(&caps["cap"]),
        ));
    }
    if let Some(caps) = REMARK_OLD.captures(body) {
        remark.put_memory(snapshot(
            Generation::Old,
            grammar::size(&caps["old"]),
            grammar::size(&caps["oldcap"]),
        ));
        remark.put_memory(snapshot(
            Generation::Total,
            grammar::size(&caps["total"]),
            grammar::size(&caps["totalcap"]),
        ));
    }

    let mut subphases = Vec::new();
    let mut offset = 0.0;
    for caps in REMARK_SUBPHASE.captures_iter(body) {
        let kind = match caps["name"].trim() {
            name if name.starts_with("Rescan") => EventKind::CmsRescan,
            "weak refs processing" => EventKind::CmsWeakRefsProcessing,
            "class unloading" => EventKind::CmsClassUnloading,
            "scrub symbol table" => EventKind::CmsScrubSymbolTable,
            _ => EventKind::CmsScrubStringTable,
        };
        let duration = grammar::seconds_to_ms(&caps["secs"]);
        let start = match caps.name("ts").and_then(|m| grammar::seconds_to_ms(m.as_str())) {
            Some(ts) if has_uptime => ts,
            _ => time + offset,
        };
        offset += duration.unwrap_or(0.0);
        subphases.push(
            GcEvent::new(kind, start)
                .with_duration(duration)
                .with_line(line_no),
        );
    }

    b.add_phase_to(cycle, remark);
    state.touched = Some(Touch::last_phase(b, cycle));
    for subphase in subphases {
        b.add_phase_to(cycle, subphase);
    }
    LineOutcome::Recognized
}

fn concurrent_phase(
    state: &mut State,
    b: &mut ModelBuilder,
    time: f64,
    rest: &str,
    line_no: usize,
) -> LineOutcome {
    let Some(caps) = CONCURRENT.captures(rest) else {
        return LineOutcome::Unrecognized;
    };
    let kind = match &caps["phase"] {
        "mark" => EventKind::CmsConcurrentMark,
        "preclean" => EventKind::CmsConcurrentPreclean,
        "abortable-preclean" => EventKind::CmsConcurrentAbortablePreclean,
        "sweep" => EventKind::CmsConcurrentSweep,
        _ => EventKind::CmsConcurrentReset,
    };
    let wall = caps
        .name("wall")
        .and_then(|m| grammar::seconds_to_ms(m.as_str()));
    let wall = common::checked_duration(b, wall);

    let cycle = open_cycle(b, time, line_no);
    let Some(touch) = common::start_or_finish_phase(b, cycle, kind, time, wall, line_no) else {
        return LineOutcome::Unrecognized;
    };
    if let Some(cpu) = grammar::legacy_cpu(rest) {
        common::attach_cpu(b, Some(touch), cpu);
    }
    state.touched = Some(touch);

    if kind == EventKind::CmsConcurrentReset && wall.is_some() {
        let end = touch.resolve(b).and_then(|p| p.end());
        if let (Some(end), Some(event)) = (end, b.event_mut(cycle)) {
            event.duration = Some((end - event.start).max(0.0));
        }
    }
    LineOutcome::Recognized
}
