//! Legacy (JDK 8) G1 parser.
//!
//! A detailed young pause spreads over an indented block:
//!
//! ```text
//! 0.299: [GC pause (G1 Evacuation Pause) (young), 0.0035543 secs]
//!    [Parallel Time: 3.2 ms, GC Workers: 8]
//!    [Code Root Fixup: 0.0 ms]
//!    [Eden: 24.0M(24.0M)->0.0B(21.0M) Survivors: 0.0B->3072.0K Heap: 24.0M(256.0M)->4032.0K(256.0M)]
//!  [Times: user=0.01 sys=0.00, real=0.00 secs]
//! ```
//!
//! Lines indented deeper than the phase list carry per-worker detail and
//! are skipped.

use std::sync::LazyLock;

use regex::Regex;

use super::common::{self, Touch};
use crate::model::{
    CollectorFamily, EventKind, GcCause, GcEvent, Generation, LogFormat, LogStyle, ModelBuilder,
    SpecialSituation,
};
use crate::parser::grammar::{self, MemoryChange, SIZE};
use crate::parser::{scan_lines, GcLogParser, LineOutcome};

static PAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\[GC pause(?: \((?P<cause>[^()]+)\))? \((?P<kind>young|mixed)\)(?P<flags>(?: \([a-z- ]+\))*)",
    )
    .unwrap()
});

static FULL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[Full GC ?(?:\((?P<cause>System\.gc\(\)|[^()]+)\))?").unwrap()
});

static TRAILING_SECS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r", (?P<secs>\d+[.,]\d+) secs\]\s*$").unwrap());

static PAUSE_CONTINUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^, (?P<secs>\d+[.,]\d+) secs\]").unwrap());

static PARALLEL_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[Parallel Time: (?P<ms>\d+[.,]\d+) ms, GC Workers: (?P<workers>\d+)\]").unwrap()
});

static SIMPLE_PHASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\[(?P<name>Code Root Fixup|Code Root Purge|Clear CT|Other): (?P<ms>\d+[.,]\d+) ms\]",
    )
    .unwrap()
});

static HEAP_SUMMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^\[Eden: (?P<eden>\S+) Survivors: (?P<surv>{SIZE}->{SIZE}) Heap: (?P<heap>\S+)\](?:, \[Metaspace: (?P<meta>[^\]]+)\])?"
    ))
    .unwrap()
});

static CONCURRENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\[GC concurrent-(?P<phase>root-region-scan|mark|cleanup)-(?P<edge>start|end|abort)(?:, (?P<secs>\d+[.,]\d+) secs)?\]",
    )
    .unwrap()
});

static REMARK_SUBPHASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:(?P<ts>\d+[.,]\d+): )?\[(?P<name>Finalize Marking|GC ref-proc|Unloading), (?P<secs>\d+[.,]\d+) secs\]",
    )
    .unwrap()
});

/// Parser for JDK 8 G1 logs.
#[derive(Debug, Default)]
pub struct LegacyG1Parser;

impl LegacyG1Parser {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Default)]
struct State {
    touched: Option<Touch>,
    /// Pause whose indented detail block is being read
    pause: Option<usize>,
}

impl GcLogParser for LegacyG1Parser {
    fn format(&self) -> LogFormat {
        LogFormat::new(CollectorFamily::G1, LogStyle::Legacy)
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
    let indent = line.rest.len() - line.rest.trim_start().len();
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
    if let Some(caps) = PAUSE_CONTINUATION.captures(rest) {
        let secs = grammar::seconds_to_ms(&caps["secs"]);
        let duration = common::checked_duration(b, secs);
        return match state.pause.and_then(|i| b.event_mut(i)) {
            Some(event) => {
                event.duration = duration;
                LineOutcome::Recognized
            }
            None => LineOutcome::Unrecognized,
        };
    }
    if rest.contains("[G1Ergonomics") && !rest.starts_with("[GC pause") {
        return LineOutcome::Ignored;
    }
    if time.is_none() && indent > 0 && rest.starts_with('[') {
        return detail_line(state, b, indent, rest, line_no);
    }

    let Some(time) = time else {
        return LineOutcome::Unrecognized;
    };
    if rest.starts_with("[GC pause") {
        return pause(state, b, time, rest, line_no);
    }
    if rest.starts_with("[Full GC") {
        return full(state, b, time, rest, line_no);
    }
    if rest.starts_with("[GC concurrent-") {
        return concurrent(state, b, time, rest, line_no);
    }
    if rest.starts_with("[GC remark") {
        return remark(state, b, time, line.uptime.is_some(), rest, line_no);
    }
    if rest.starts_with("[GC cleanup") {
        return cleanup(state, b, time, rest, line_no);
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
    let stripped = grammar::strip_legacy_cpu(rest);
    let body = stripped.trim_end();
    let Some(caps) = PAUSE.captures(body) else {
        return LineOutcome::Unrecognized;
    };
    let kind = match &caps["kind"] {
        "mixed" => EventKind::G1MixedGc,
        _ => EventKind::YoungGc,
    };
    let cause = caps.name("cause").map(|m| GcCause::new(m.as_str()));
    let mut event = GcEvent::new(kind, time).with_cause(cause).with_line(line_no);
    let flags = &caps["flags"];
    if flags.contains("initial-mark") {
        event.mark(SpecialSituation::InitialMark);
    }
    if flags.contains("to-space exhausted") || flags.contains("to-space overflow") {
        event.mark(SpecialSituation::ToSpaceExhausted);
    }

    if let Some(change) = MemoryChange::find(&body[caps[0].len()..]) {
        event.put_memory(change.into_item(Generation::Total));
    }
    event.duration = trailing_secs(b, body);
    event.cpu = grammar::legacy_cpu(rest);

    let index = b.push_event(event);
    state.pause = Some(index);
    state.touched = Some(Touch::Event(index));
    LineOutcome::Recognized
}

fn full(
    state: &mut State,
    b: &mut ModelBuilder,
    time: f64,
    rest: &str,
    line_no: usize,
) -> LineOutcome {
    let stripped = grammar::strip_legacy_cpu(rest);
    let body = stripped.trim_end();
    let Some(caps) = FULL.captures(body) else {
        return LineOutcome::Unrecognized;
    };
    let cause = caps.name("cause").map(|m| GcCause::new(m.as_str()));
    let mut event = GcEvent::new(EventKind::FullGc, time)
        .with_cause(cause)
        .with_line(line_no);
    if let Some(change) = MemoryChange::find(&body[caps[0].len()..]) {
        event.put_memory(change.into_item(Generation::Total));
    }
    event.duration = trailing_secs(b, body);
    event.cpu = grammar::legacy_cpu(rest);

    let index = b.push_event(event);
    state.pause = Some(index);
    state.touched = Some(Touch::Event(index));
    LineOutcome::Recognized
}

fn detail_line(
    state: &mut State,
    b: &mut ModelBuilder,
    indent: usize,
    rest: &str,
    line_no: usize,
) -> LineOutcome {
    let Some(parent) = state.pause else {
        return LineOutcome::Unrecognized;
    };
    if indent > 3 {
        return LineOutcome::Ignored;
    }
    if let Some(caps) = PARALLEL_TIME.captures(rest) {
        if let Ok(workers) = caps["workers"].parse::<u32>() {
            b.note_parallel_threads(workers);
        }
        let ms = grammar::number(&caps["ms"]);
        let ms = common::checked_duration(b, ms);
        common::push_sequential_phase(b, parent, EventKind::G1ParallelTime, ms, line_no);
        return LineOutcome::Recognized;
    }
    if let Some(caps) = SIMPLE_PHASE.captures(rest) {
        let kind = match &caps["name"] {
            "Code Root Fixup" => EventKind::G1CodeRootFixup,
            "Code Root Purge" => EventKind::G1CodeRootPurge,
            "Clear CT" => EventKind::G1ClearCardTable,
            _ => EventKind::G1OtherPhase,
        };
        let ms = grammar::number(&caps["ms"]);
        let ms = common::checked_duration(b, ms);
        common::push_sequential_phase(b, parent, kind, ms, line_no);
        return LineOutcome::Recognized;
    }
    if let Some(caps) = HEAP_SUMMARY.captures(rest) {
        let Some(event) = b.event_mut(parent) else {
            return LineOutcome::Unrecognized;
        };
        if let Some(change) = MemoryChange::find(&caps["eden"]) {
            event.put_memory(change.into_item(Generation::Eden));
        }
        if let Some(change) = MemoryChange::find(&caps["surv"]) {
            let mut item = change.into_item(Generation::Survivor);
            item.pre_capacity = item.pre_used;
            item.post_capacity = item.post_used;
            event.put_memory(item);
        }
        if let Some(change) = MemoryChange::find(&caps["heap"]) {
            event.put_memory(change.into_item(Generation::Total));
        }
        if let Some(change) = caps.name("meta").and_then(|m| MemoryChange::find(m.as_str())) {
            event.put_memory(change.into_item(Generation::Metaspace));
        }
        return LineOutcome::Recognized;
    }
    if rest.starts_with("[Evacuation Failure") {
        if let Some(event) = b.event_mut(parent) {
            event.mark(SpecialSituation::ToSpaceExhausted);
        }
        return LineOutcome::Recognized;
    }
    LineOutcome::Ignored
}

/// Newest concurrent cycle, created at `time` when none exists yet.
fn ensure_cycle(b: &mut ModelBuilder, time: f64, line_no: usize) -> usize {
    match b.last_event_where(|e| e.kind == EventKind::G1ConcurrentCycle) {
        Some(index) => index,
        None => b.push_event(GcEvent::new(EventKind::G1ConcurrentCycle, time).with_line(line_no)),
    }
}

fn extend_cycle(b: &mut ModelBuilder, cycle: usize, end: f64) {
    if let Some(event) = b.event_mut(cycle) {
        let duration = (end - event.start).max(0.0);
        event.duration = Some(event.duration.map_or(duration, |d| d.max(duration)));
    }
}

fn concurrent(
    state: &mut State,
    b: &mut ModelBuilder,
    time: f64,
    rest: &str,
    line_no: usize,
) -> LineOutcome {
    if rest.starts_with("[GC concurrent-mark-reset-for-overflow") {
        return LineOutcome::Ignored;
    }
    let Some(caps) = CONCURRENT.captures(rest) else {
        return LineOutcome::Unrecognized;
    };
    let kind = match &caps["phase"] {
        "root-region-scan" => EventKind::G1ConcurrentScanRootRegions,
        "mark" => EventKind::G1ConcurrentMark,
        _ => EventKind::G1ConcurrentCleanupForNextMark,
    };
    let edge = &caps["edge"];

    if kind == EventKind::G1ConcurrentScanRootRegions && edge == "start" {
        b.push_event(GcEvent::new(EventKind::G1ConcurrentCycle, time).with_line(line_no));
    }
    let cycle = ensure_cycle(b, time, line_no);

    if edge == "abort" {
        if let Some(event) = b.event_mut(cycle) {
            event.mark(SpecialSituation::ConcurrentMarkAborted);
        }
        extend_cycle(b, cycle, time);
        state.touched = Some(Touch::Event(cycle));
        return LineOutcome::Recognized;
    }

    let duration = match edge {
        "end" => {
            let secs = caps.name("secs").and_then(|m| grammar::seconds_to_ms(m.as_str()));
            common::checked_duration(b, secs)
        }
        _ => None,
    };
    let Some(touch) = common::start_or_finish_phase(b, cycle, kind, time, duration, line_no)
    else {
        return LineOutcome::Unrecognized;
    };
    state.touched = Some(touch);
    if kind == EventKind::G1ConcurrentCleanupForNextMark && edge == "end" {
        extend_cycle(b, cycle, time);
    }
    LineOutcome::Recognized
}

fn remark(
    state: &mut State,
    b: &mut ModelBuilder,
    time: f64,
    has_uptime: bool,
    rest: &str,
    line_no: usize,
) -> LineOutcome {
    let stripped = grammar::strip_legacy_cpu(rest);
    let body = stripped.trim_end();
    let cycle = ensure_cycle(b, time, line_no);
    let mut remark = GcEvent::new(EventKind::G1Remark, time)
        .with_duration(trailing_secs(b, body))
        .with_line(line_no);
    remark.cpu = grammar::legacy_cpu(rest);

    let mut subphases = Vec::new();
    let mut offset = 0.0;
    for caps in REMARK_SUBPHASE.captures_iter(body) {
        let kind = match &caps["name"] {
            "Finalize Marking" => EventKind::G1FinalizeMarking,
            "GC ref-proc" => EventKind::G1RefProc,
            _ => EventKind::G1Unloading,
        };
        let duration = grammar::seconds_to_ms(&caps["secs"]);
        let start = match caps.name("ts").and_then(|m| grammar::seconds_to_ms(m.as_str())) {
            Some(ts) if has_uptime => ts,
            _ => time + offset,
        };
        offset += duration.unwrap_or(0.0);
        subphases.push(GcEvent::new(kind, start).with_duration(duration).with_line(line_no));
    }

    if !b.add_phase_to(cycle, remark) {
        return LineOutcome::Unrecognized;
    }
    state.touched = Some(Touch::last_phase(b, cycle));
    state.pause = None;
    for subphase in subphases {
        b.add_phase_to(cycle, subphase);
    }
    LineOutcome::Recognized
}

fn cleanup(
    state: &mut State,
    b: &mut ModelBuilder,
    time: f64,
    rest: &str,
    line_no: usize,
) -> LineOutcome {
    let stripped = grammar::strip_legacy_cpu(rest);
    let body = stripped.trim_end();
    let cycle = ensure_cycle(b, time, line_no);
    let mut phase = GcEvent::new(EventKind::G1Cleanup, time)
        .with_duration(trailing_secs(b, body))
        .with_line(line_no);
    phase.cpu = grammar::legacy_cpu(rest);
    if let Some(change) = MemoryChange::find(body) {
        phase.put_memory(change.into_item(Generation::Total));
    }
    let end = phase.end();
    if !b.add_phase_to(cycle, phase) {
        return LineOutcome::Unrecognized;
    }
    state.touched = Some(Touch::last_phase(b, cycle));
    state.pause = None;
    if let Some(end) = end {
        extend_cycle(b, cycle, end);
    }
    LineOutcome::Recognized
}
