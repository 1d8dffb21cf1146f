//! Unified logging ZGC parser (JDK 11 to 17, non-generational ZGC).
//!
//! A collection is bracketed by `Garbage Collection (cause)` lines. Heap
//! numbers come from a table printed before the closing line:
//!
//! ```text
//! [1.020s][info][gc,heap] GC(0)  Capacity:  400M (100%)  400M (100%)  400M (100%)  400M (100%) ...
//! [1.020s][info][gc,heap] GC(0)      Used:   88M (22%)    92M (23%)    48M (12%)    48M (12%) ...
//! [1.020s][info][gc     ] GC(0) Garbage Collection (Warmup) 88M(22%)->48M(12%)
//! ```
//!
//! The first table column is the heap at Mark Start, the fourth at
//! Relocate End.

use std::sync::LazyLock;

use regex::Regex;

use super::common::{self, Touch, UnifiedTracker};
use crate::model::{
    CollectorFamily, EventKind, GcCause, GcEvent, Generation, LogFormat, LogStyle, MemoryItem,
    ModelBuilder,
};
use crate::parser::grammar::{self, UnifiedLine};
use crate::parser::{scan_lines, GcLogParser, LineOutcome};

static SUMMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<head>.*?)\s+(?P<pre>\d+(?:[.,]\d+)?[BKMGT]?)\(\d+%\)->(?P<post>\d+(?:[.,]\d+)?[BKMGT]?)\(\d+%\)$",
    )
    .unwrap()
});

static TABLE_ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<row>Capacity|Free|Used|Live|Allocated|Garbage|Reclaimed):\s+(?P<cells>.*)$")
        .unwrap()
});

static TABLE_CELL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<size>\d+(?:[.,]\d+)?[BKMGT]?)\s*\(\s*\d+%\)|(?P<dash>-)").unwrap()
});

/// Tags whose lines report statistics outside the model.
const DETAIL_TAGS: &[&str] = &["heap", "marking", "phases", "task"];

/// Column of the heap table holding the Relocate End snapshot.
const RELOCATE_END: usize = 3;

/// Parser for unified ZGC logs.
#[derive(Debug, Default)]
pub struct UnifiedZgcParser;

impl UnifiedZgcParser {
    pub fn new() -> Self {
        Self
    }
}

impl GcLogParser for UnifiedZgcParser {
    fn format(&self) -> LogFormat {
        LogFormat::new(CollectorFamily::Zgc, LogStyle::Unified)
    }

    fn parse_into(&self, text: &str, builder: &mut ModelBuilder) {
        let mut tracker = UnifiedTracker::default();
        scan_lines(text, builder, |b, line_no, raw| {
            let Some(line) = grammar::unified_line(raw) else {
                return common::header_line(b, raw).unwrap_or(LineOutcome::Unrecognized);
            };
            match parse_line(&mut tracker, b, line_no, &line) {
                LineOutcome::Unrecognized
                    if common::unified_noise(&line)
                        || DETAIL_TAGS.iter().any(|t| line.has_tag(t)) =>
                {
                    LineOutcome::Ignored
                }
                other => other,
            }
        });
    }
}

fn parse_line(
    tracker: &mut UnifiedTracker,
    b: &mut ModelBuilder,
    line_no: usize,
    line: &UnifiedLine<'_>,
) -> LineOutcome {
    let time = b.resolve_time(line.uptime, line.datestamp);
    if let Some(outcome) = common::unified_common(b, tracker, line, time, line_no) {
        return outcome;
    }
    let Some(time) = time else {
        return LineOutcome::Unrecognized;
    };
    let id = line.gc_id;
    let message = line.message.trim();

    if let Some(caps) = TABLE_ROW.captures(message) {
        return table_row(b, id, &caps["row"], &caps["cells"]);
    }

    let (head, memory) = match SUMMARY.captures(message) {
        Some(caps) => (
            caps.name("head").map_or("", |m| m.as_str()),
            Some((grammar::size(&caps["pre"]), grammar::size(&caps["post"]))),
        ),
        None => (message, None),
    };
    let (head, duration) = grammar::split_trailing_duration(head);
    let duration = common::checked_duration(b, duration);
    let (name, groups) = grammar::split_title(head);

    match name {
        "Garbage Collection" => {
            let kind = EventKind::ZgcGarbageCollection;
            let index = common::unified_event(b, id, kind, time, None, line_no);
            let Some(event) = b.event_mut(index) else {
                return LineOutcome::Unrecognized;
            };
            if let Some(cause) = groups.first() {
                event.cause = Some(GcCause::new(*cause));
            }
            if let Some((pre, post)) = memory {
                event.duration = Some((time - event.start).max(0.0));
                let mut total = event
                    .raw(Generation::Total)
                    .copied()
                    .unwrap_or_else(|| MemoryItem::new(Generation::Total));
                total.pre_used = total.pre_used.or(pre);
                total.post_used = total.post_used.or(post);
                event.put_memory(total);
            }
            tracker.touch(id, Touch::Event(index));
            LineOutcome::Recognized
        }
        "Allocation Stall" | "Out Of Memory" => {
            let kind = if name == "Allocation Stall" {
                EventKind::ZgcAllocationStall
            } else {
                EventKind::ZgcOutOfMemory
            };
            let duration = if kind == EventKind::ZgcOutOfMemory {
                Some(0.0)
            } else {
                duration
            };
            let mut event = GcEvent::new(kind, common::start_from_end(time, duration))
                .with_id(id)
                .with_duration(duration)
                .with_line(line_no);
            event.thread = groups.first().map(|t| t.to_string());
            b.push_stall(event);
            LineOutcome::Recognized
        }
        _ => match phase_kind(name) {
            Some(kind) => phase(tracker, b, id, kind, time, duration, line_no),
            None => LineOutcome::Unrecognized,
        },
    }
}

fn phase_kind(name: &str) -> Option<EventKind> {
    Some(match name {
        "Pause Mark Start" => EventKind::ZgcPauseMarkStart,
        "Concurrent Mark" => EventKind::ZgcConcurrentMark,
        "Concurrent Mark Continue" => EventKind::ZgcConcurrentMarkContinue,
        "Concurrent Mark Free" => EventKind::ZgcConcurrentMarkFree,
        "Pause Mark End" => EventKind::ZgcPauseMarkEnd,
        "Concurrent Process Non-Strong References" => {
            EventKind::ZgcConcurrentProcessNonStrongReferences
        }
        "Concurrent Reset Relocation Set" => EventKind::ZgcConcurrentResetRelocationSet,
        "Concurrent Destroy Detached Pages" => EventKind::ZgcConcurrentDestroyDetachedPages,
        "Concurrent Select Relocation Set" => EventKind::ZgcConcurrentSelectRelocationSet,
        "Concurrent Prepare Relocation Set" => EventKind::ZgcConcurrentPrepareRelocationSet,
        "Pause Relocate Start" => EventKind::ZgcPauseRelocateStart,
        "Concurrent Relocate" => EventKind::ZgcConcurrentRelocate,
        _ => return None,
    })
}

fn phase(
    tracker: &mut UnifiedTracker,
    b: &mut ModelBuilder,
    id: Option<u64>,
    kind: EventKind,
    time: f64,
    duration: Option<f64>,
    line_no: usize,
) -> LineOutcome {
    let start = common::start_from_end(time, duration);
    let parent = match id.and_then(|id| b.find_by_id(id, EventKind::ZgcGarbageCollection)) {
        Some(parent) => parent,
        None => b.push_event(
            GcEvent::new(EventKind::ZgcGarbageCollection, start)
                .with_id(id)
                .with_line(line_no),
        ),
    };
    match common::start_or_finish_phase(b, parent, kind, time, duration, line_no) {
        Some(touch) => {
            tracker.touch(id, touch);
            LineOutcome::Recognized
        }
        None => LineOutcome::Unrecognized,
    }
}

fn table_row(b: &mut ModelBuilder, id: Option<u64>, row: &str, cells: &str) -> LineOutcome {
    if row != "Capacity" && row != "Used" {
        return LineOutcome::Ignored;
    }
    let values: Vec<Option<i64>> = TABLE_CELL
        .captures_iter(cells)
        .map(|c| c.name("size").and_then(|m| grammar::size(m.as_str())))
        .collect();
    let (Some(&first), Some(&relocate_end)) = (values.first(), values.get(RELOCATE_END)) else {
        return LineOutcome::Unrecognized;
    };
    let target = id.and_then(|id| b.find_by_id(id, EventKind::ZgcGarbageCollection));
    let Some(event) = target.and_then(|t| b.event_mut(t)) else {
        return LineOutcome::Unrecognized;
    };
    let mut total = event
        .raw(Generation::Total)
        .copied()
        .unwrap_or_else(|| MemoryItem::new(Generation::Total));
    if row == "Capacity" {
        total.pre_capacity = first;
        total.post_capacity = relocate_end;
    } else {
        total.pre_used = first;
        total.post_used = relocate_end;
    }
    event.put_memory(total);
    LineOutcome::Recognized
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ModelBuilder {
        let mut b =
            ModelBuilder::new(LogFormat::new(CollectorFamily::Zgc, LogStyle::Unified)).unwrap();
        UnifiedZgcParser::new().parse_into(text, &mut b);
        b
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    const CYCLE: &str = "\
[0.013s][info][gc          ] Using The Z Garbage Collector
[1.000s][info][gc,start    ] GC(0) Garbage Collection (Warmup)
[1.000s][info][gc,phases   ] GC(0) Pause Mark Start 0.010ms
[1.010s][info][gc,phases   ] GC(0) Concurrent Mark 10.000ms
[1.010s][info][gc,phases   ] GC(0) Pause Mark End 0.020ms
[1.012s][info][gc,phases   ] GC(0) Concurrent Process Non-Strong References 1.000ms
[1.015s][info][gc,phases   ] GC(0) Concurrent Select Relocation Set 3.000ms
[1.015s][info][gc,phases   ] GC(0) Pause Relocate Start 0.010ms
[1.020s][info][gc,phases   ] GC(0) Concurrent Relocate 5.000ms
[1.020s][info][gc,load     ] GC(0) Load: 0.50/0.40/0.30
[1.020s][info][gc,marking  ] GC(0) Mark: 2 stripe(s), 1 proactive flush(es), 1 terminate flush(es), 0 completion(s), 0 continuation(s)
[1.020s][info][gc,metaspace] GC(0) Metaspace: 10M used, 10M committed, 1088M reserved
[1.020s][info][gc,heap     ] GC(0) Min Capacity: 8M(2%)
[1.020s][info][gc,heap     ] GC(0)                Mark Start          Mark End        Relocate Start      Relocate End           High               Low
[1.020s][info][gc,heap     ] GC(0)  Capacity:      400M (100%)        400M (100%)        400M (100%)        400M (100%)        400M (100%)        400M (100%)
[1.020s][info][gc,heap     ] GC(0)      Free:      312M (78%)         308M (77%)         352M (88%)         352M (88%)         352M (88%)         306M (76%)
[1.020s][info][gc,heap     ] GC(0)      Used:       88M (22%)          92M (23%)          48M (12%)          48M (12%)          94M (24%)          48M (12%)
[1.020s][info][gc,heap     ] GC(0)      Live:         -                 41M (10%)          41M (10%)          41M (10%)             -                  -
[1.020s][info][gc          ] GC(0) Garbage Collection (Warmup) 88M(22%)->48M(12%)
";

    #[test]
    fn test_collection_cycle() {
        let b = parse(CYCLE);
        assert_eq!(b.stats().unrecognized, 0);
        assert_eq!(b.events().len(), 1);
        let event = &b.events()[0];
        assert_eq!(event.kind, EventKind::ZgcGarbageCollection);
        assert_eq!(event.cause.as_ref().unwrap().as_str(), "Warmup");
        assert!(close(event.start, 1000.0));
        assert!(close(event.duration.unwrap(), 20.0));
        assert_eq!(event.phases.len(), 7);
        assert!(close(event.phases[1].start, 1000.0));
        let total = event.raw(Generation::Total).unwrap();
        assert_eq!(total.pre_used, Some(88 << 20));
        assert_eq!(total.post_used, Some(48 << 20));
        assert_eq!(total.post_capacity, Some(400 << 20));
        let metaspace = event.raw(Generation::Metaspace).unwrap();
        assert_eq!(metaspace.post_used, Some(10 << 20));
    }

    #[test]
    fn test_stall_and_oom() {
        let b = parse(
            "[5.000s][info][gc] Allocation Stall (main) 12.345ms\n\
             [6.000s][info][gc] Out Of Memory (worker-1)\n",
        );
        assert!(b.events().is_empty());
        assert_eq!(b.stalls.len(), 2);
        let stall = &b.stalls[0];
        assert_eq!(stall.kind, EventKind::ZgcAllocationStall);
        assert_eq!(stall.thread.as_deref(), Some("main"));
        assert!(close(stall.start, 5000.0 - 12.345));
        assert_eq!(b.stalls[1].kind, EventKind::ZgcOutOfMemory);
    }

    #[test]
    fn test_summary_without_start_line() {
        let b = parse(
            "[2.000s][info][gc,phases] GC(1) Pause Mark Start 0.010ms\n\
             [2.050s][info][gc] GC(1) Garbage Collection (Proactive) 100M(25%)->60M(15%)\n",
        );
        let event = &b.events()[0];
        assert!(close(event.start, 1999.99));
        assert!(close(event.duration.unwrap(), 50.01));
        assert_eq!(event.raw(Generation::Total).unwrap().pre_used, Some(100 << 20));
    }
}
