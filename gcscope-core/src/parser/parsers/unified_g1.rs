//! Unified logging (JDK 9+) G1 parser.
//!
//! Each collection is announced by a start line and summarized by an end
//! line carrying the heap change and duration, both tagged with the same
//! `GC(n)` id:
//!
//! ```text
//! [0.300s][info][gc,start] GC(0) Pause Young (Normal) (G1 Evacuation Pause)
//! [0.303s][info][gc,heap ] GC(0) Eden regions: 24->0(21)
//! [0.303s][info][gc      ] GC(0) Pause Young (Normal) (G1 Evacuation Pause) 24M->4M(256M) 3.215ms
//! ```

use std::sync::LazyLock;

use regex::Regex;

use super::common::{self, Touch, UnifiedTracker};
use crate::model::{
    CollectorFamily, EventKind, GcCause, GcEvent, Generation, LogFormat, LogStyle, ModelBuilder,
    SpecialSituation,
};
use crate::parser::grammar::{self, MemoryChange, UnifiedLine};
use crate::parser::{scan_lines, GcLogParser, LineOutcome};

static REGION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<gen>Eden|Survivor|Old|Humongous|Archive) regions: (?P<change>\S+)").unwrap()
});

/// Parser for unified G1 logs.
#[derive(Debug, Default)]
pub struct UnifiedG1Parser;

impl UnifiedG1Parser {
    pub fn new() -> Self {
        Self
    }
}

impl GcLogParser for UnifiedG1Parser {
    fn format(&self) -> LogFormat {
        LogFormat::new(CollectorFamily::G1, LogStyle::Unified)
    }

    fn parse_into(&self, text: &str, builder: &mut ModelBuilder) {
        let mut tracker = UnifiedTracker::default();
        scan_lines(text, builder, |b, line_no, raw| {
            let Some(line) = grammar::unified_line(raw) else {
                return common::header_line(b, raw).unwrap_or(LineOutcome::Unrecognized);
            };
            parse_line(&mut tracker, b, line_no, &line)
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

    if let Some(caps) = REGION_LINE.captures(message) {
        return region_line(b, id, &caps["gen"], &caps["change"]);
    }
    if message.starts_with("To-space exhausted") || message.starts_with("Evacuation Failure") {
        return match id.and_then(|id| common::memory_target(b, id)) {
            Some(target) => {
                if let Some(event) = b.event_mut(target) {
                    event.mark(SpecialSituation::ToSpaceExhausted);
                }
                LineOutcome::Recognized
            }
            None => LineOutcome::Unrecognized,
        };
    }

    let (head, duration) = grammar::split_trailing_duration(message);
    let duration = common::checked_duration(b, duration);
    let (head, memory) = grammar::split_trailing_memory(head);
    let (name, groups) = grammar::split_title(head);

    let outcome = match name {
        "Pause Young" | "Pause Mixed" | "Pause Initial Mark" | "Pause Full" => {
            pause(tracker, b, id, name, &groups, time, duration, memory, line_no)
        }
        "Pause Remark" => {
            cycle_pause(tracker, b, id, EventKind::G1Remark, time, duration, memory, line_no)
        }
        "Pause Cleanup" => {
            cycle_pause(tracker, b, id, EventKind::G1Cleanup, time, duration, memory, line_no)
        }
        "Concurrent Cycle" | "Concurrent Mark Cycle" => {
            cycle(tracker, b, id, EventKind::G1ConcurrentCycle, time, duration, line_no)
        }
        "Concurrent Undo Cycle" => {
            cycle(tracker, b, id, EventKind::G1ConcurrentUndoCycle, time, duration, line_no)
        }
        "Concurrent Mark Abort" => {
            let parent = cycle_for(b, id, time, line_no);
            if let Some(event) = b.event_mut(parent) {
                event.mark(SpecialSituation::ConcurrentMarkAborted);
            }
            LineOutcome::Recognized
        }
        "Concurrent Create Live Data"
        | "Concurrent Complete Cleanup"
        | "Concurrent Mark Reset For Overflow" => LineOutcome::Ignored,
        "Finalize Marking" | "Reference Processing" | "Class Unloading" | "Unloading" => {
            remark_subphase(b, id, name, time, duration, line_no)
        }
        _ => {
            if let Some(kind) = concurrent_kind(name) {
                concurrent_phase(tracker, b, id, kind, time, duration, line_no)
            } else if let Some(kind) = young_phase_kind(name) {
                young_phase(b, id, kind, duration, line_no)
            } else if let Some(kind) = common::full_phase_kind(name) {
                full_phase(tracker, b, id, kind, time, duration, line_no)
            } else {
                LineOutcome::Unrecognized
            }
        }
    };
    match outcome {
        LineOutcome::Unrecognized if common::unified_noise(line) => LineOutcome::Ignored,
        other => other,
    }
}

fn concurrent_kind(name: &str) -> Option<EventKind> {
    Some(match name {
        "Concurrent Clear Claimed Marks" => EventKind::G1ConcurrentClearClaimedMarks,
        "Concurrent Scan Root Regions" => EventKind::G1ConcurrentScanRootRegions,
        "Concurrent Mark" => EventKind::G1ConcurrentMark,
        "Concurrent Mark From Roots" => EventKind::G1ConcurrentMarkFromRoots,
        "Concurrent Preclean" => EventKind::G1ConcurrentPreclean,
        "Concurrent Cleanup for Next Mark" => EventKind::G1ConcurrentCleanupForNextMark,
        _ if name.starts_with("Concurrent Rebuild Remembered Sets") => {
            EventKind::G1ConcurrentRebuildRememberedSets
        }
        _ => return None,
    })
}

fn young_phase_kind(name: &str) -> Option<EventKind> {
    Some(match name.strip_suffix(':')? {
        "Pre Evacuate Collection Set" => EventKind::G1PreEvacuateCollectionSet,
        "Merge Heap Roots" => EventKind::G1MergeHeapRoots,
        "Evacuate Collection Set" => EventKind::G1EvacuateCollectionSet,
        "Post Evacuate Collection Set" => EventKind::G1PostEvacuateCollectionSet,
        "Other" => EventKind::G1OtherPhase,
        _ => return None,
    })
}

fn region_line(
    b: &mut ModelBuilder,
    id: Option<u64>,
    generation: &str,
    change: &str,
) -> LineOutcome {
    let generation = match generation {
        "Eden" => Generation::Eden,
        "Survivor" => Generation::Survivor,
        "Old" => Generation::Old,
        "Humongous" => Generation::Humongous,
        _ => Generation::Archive,
    };
    let Some(change) = MemoryChange::find_regions(change) else {
        return LineOutcome::Unrecognized;
    };
    let target = id.and_then(|id| common::memory_target(b, id));
    match target.and_then(|t| b.event_mut(t)) {
        Some(event) => {
            event.put_memory(change.into_item(generation).regions());
            LineOutcome::Recognized
        }
        None => LineOutcome::Unrecognized,
    }
}

#[allow(clippy::too_many_arguments)]
fn pause(
    tracker: &mut UnifiedTracker,
    b: &mut ModelBuilder,
    id: Option<u64>,
    name: &str,
    groups: &[&str],
    time: f64,
    duration: Option<f64>,
    memory: Option<MemoryChange>,
    line_no: usize,
) -> LineOutcome {
    let mut kind = match name {
        "Pause Mixed" => EventKind::G1MixedGc,
        "Pause Full" => EventKind::FullGc,
        _ => EventKind::YoungGc,
    };
    let mut situations = Vec::new();
    if name == "Pause Initial Mark" {
        situations.push(SpecialSituation::InitialMark);
    }
    let mut cause = None;
    for group in groups {
        match *group {
            "Normal" | "Concurrent End" => {}
            "Mixed" => kind = EventKind::G1MixedGc,
            "Concurrent Start" => situations.push(SpecialSituation::InitialMark),
            "Prepare Mixed" => situations.push(SpecialSituation::PrepareMixed),
            "Evacuation Failure" | "To-space exhausted" => {
                situations.push(SpecialSituation::ToSpaceExhausted)
            }
            other => cause = Some(GcCause::new(other)),
        }
    }

    let index = common::unified_event(b, id, kind, time, duration, line_no);
    if let Some(event) = b.event_mut(index) {
        if cause.is_some() {
            event.cause = cause;
        }
        for situation in situations {
            event.mark(situation);
        }
        if let Some(memory) = memory {
            event.put_memory(memory.into_item(Generation::Total));
        }
    }
    tracker.touch(id, Touch::Event(index));
    LineOutcome::Recognized
}

/// Concurrent cycle owning phases of `id`, created when the log never
/// announced it.
fn cycle_for(b: &mut ModelBuilder, id: Option<u64>, time: f64, line_no: usize) -> usize {
    let existing =
        id.and_then(|id| b.last_event_where(|e| e.id == Some(id) && e.kind.is_concurrent_cycle()));
    match existing {
        Some(index) => index,
        None => b.push_event(
            GcEvent::new(EventKind::G1ConcurrentCycle, time)
                .with_id(id)
                .with_line(line_no),
        ),
    }
}

fn cycle(
    tracker: &mut UnifiedTracker,
    b: &mut ModelBuilder,
    id: Option<u64>,
    kind: EventKind,
    time: f64,
    duration: Option<f64>,
    line_no: usize,
) -> LineOutcome {
    let index = common::unified_event(b, id, kind, time, duration, line_no);
    tracker.touch(id, Touch::Event(index));
    LineOutcome::Recognized
}

#[allow(clippy::too_many_arguments)]
fn cycle_pause(
    tracker: &mut UnifiedTracker,
    b: &mut ModelBuilder,
    id: Option<u64>,
    kind: EventKind,
    time: f64,
    duration: Option<f64>,
    memory: Option<MemoryChange>,
    line_no: usize,
) -> LineOutcome {
    let parent = cycle_for(b, id, time, line_no);
    let Some(touch) = common::start_or_finish_phase(b, parent, kind, time, duration, line_no) else {
        return LineOutcome::Unrecognized;
    };
    if let (Some(memory), Some(phase)) = (memory, touch.resolve(b)) {
        phase.put_memory(memory.into_item(Generation::Total));
    }
    tracker.touch(id, touch);
    LineOutcome::Recognized
}

fn concurrent_phase(
    tracker: &mut UnifiedTracker,
    b: &mut ModelBuilder,
    id: Option<u64>,
    kind: EventKind,
    time: f64,
    duration: Option<f64>,
    line_no: usize,
) -> LineOutcome {
    let profile = b.profile();
    let parent = id
        .and_then(|id| {
            b.last_event_where(|e| e.id == Some(id) && profile.is_phase_of(kind, e.kind))
        })
        .unwrap_or_else(|| cycle_for(b, id, common::start_from_end(time, duration), line_no));
    match common::start_or_finish_phase(b, parent, kind, time, duration, line_no) {
        Some(touch) => {
            tracker.touch(id, touch);
            LineOutcome::Recognized
        }
        None => LineOutcome::Unrecognized,
    }
}

fn remark_subphase(
    b: &mut ModelBuilder,
    id: Option<u64>,
    name: &str,
    time: f64,
    duration: Option<f64>,
    line_no: usize,
) -> LineOutcome {
    let kind = match name {
        "Finalize Marking" => EventKind::G1FinalizeMarking,
        "Reference Processing" => EventKind::G1RefProc,
        _ => EventKind::G1Unloading,
    };
    let Some(parent) = id.and_then(|id| b.find_by_id(id, EventKind::G1ConcurrentCycle)) else {
        return LineOutcome::Ignored;
    };
    let phase = GcEvent::new(kind, common::start_from_end(time, duration))
        .with_id(id)
        .with_duration(duration)
        .with_line(line_no);
    if b.add_phase_to(parent, phase) {
        LineOutcome::Recognized
    } else {
        LineOutcome::Ignored
    }
}

fn young_phase(
    b: &mut ModelBuilder,
    id: Option<u64>,
    kind: EventKind,
    duration: Option<f64>,
    line_no: usize,
) -> LineOutcome {
    let parent = id.and_then(|id| b.last_event_where(|e| e.id == Some(id) && e.kind.is_young()));
    match parent {
        Some(parent) if common::push_sequential_phase(b, parent, kind, duration, line_no) => {
            LineOutcome::Recognized
        }
        _ => LineOutcome::Unrecognized,
    }
}

fn full_phase(
    tracker: &mut UnifiedTracker,
    b: &mut ModelBuilder,
    id: Option<u64>,
    kind: EventKind,
    time: f64,
    duration: Option<f64>,
    line_no: usize,
) -> LineOutcome {
    let Some(parent) = id.and_then(|id| b.find_by_id(id, EventKind::FullGc)) else {
        return LineOutcome::Unrecognized;
    };
    match common::start_or_finish_phase(b, parent, kind, time, duration, line_no) {
        Some(touch) => {
            tracker.touch(id, touch);
            LineOutcome::Recognized
        }
        None => LineOutcome::Unrecognized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ModelBuilder {
        let mut b =
            ModelBuilder::new(LogFormat::new(CollectorFamily::G1, LogStyle::Unified)).unwrap();
        UnifiedG1Parser::new().parse_into(text, &mut b);
        b
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    const YOUNG: &str = "\
[0.010s][info][gc] Using G1
[0.011s][info][gc,init] Heap Region Size: 1M
[0.300s][info][gc,start    ] GC(0) Pause Young (Normal) (G1 Evacuation Pause)
[0.300s][info][gc,task     ] GC(0) Using 8 workers of 8 for evacuation
[0.303s][info][gc,phases   ] GC(0)   Pre Evacuate Collection Set: 0.1ms
[0.303s][info][gc,phases   ] GC(0)   Merge Heap Roots: 0.1ms
[0.303s][info][gc,phases   ] GC(0)   Evacuate Collection Set: 2.5ms
[0.303s][info][gc,phases   ] GC(0)   Post Evacuate Collection Set: 0.3ms
[0.303s][info][gc,phases   ] GC(0)   Other: 0.2ms
[0.303s][info][gc,heap     ] GC(0) Eden regions: 24->0(21)
[0.303s][info][gc,heap     ] GC(0) Survivor regions: 0->3(3)
[0.303s][info][gc,heap     ] GC(0) Old regions: 0->1
[0.303s][info][gc,heap     ] GC(0) Humongous regions: 0->0
[0.303s][info][gc,metaspace] GC(0) Metaspace: 1024K(1216K)->1024K(1216K) NonClass: 900K(1000K)->900K(1000K) Class: 124K(216K)->124K(216K)
[0.303s][info][gc          ] GC(0) Pause Young (Normal) (G1 Evacuation Pause) 24M->4M(256M) 3.215ms
[0.303s][info][gc,cpu      ] GC(0) User=0.01s Sys=0.00s Real=0.00s
";

    #[test]
    fn test_young_pause() {
        let b = parse(YOUNG);
        assert_eq!(b.stats().unrecognized, 0);
        assert_eq!(b.region_size, Some(1 << 20));
        assert_eq!(b.parallel_threads, Some(8));
        assert_eq!(b.events().len(), 1);
        let event = &b.events()[0];
        assert_eq!(event.kind, EventKind::YoungGc);
        assert_eq!(event.id, Some(0));
        assert!(close(event.start, 300.0));
        assert!(close(event.duration.unwrap(), 3.215));
        assert_eq!(event.cause.as_ref().unwrap().as_str(), "G1 Evacuation Pause");
        assert_eq!(event.phases.len(), 5);
        assert!(close(event.phases[2].start, 300.2));
        let eden = event
            .raw_memory
            .iter()
            .find(|m| m.generation == Generation::Eden)
            .unwrap();
        assert!(eden.in_regions);
        assert_eq!(eden.pre_used, Some(24));
        assert_eq!(event.raw(Generation::Total).unwrap().pre_used, Some(24 << 20));
        assert_eq!(event.raw(Generation::Metaspace).unwrap().post_capacity, Some(1216 * 1024));
        assert!(event.cpu.is_some());
    }

    #[test]
    fn test_concurrent_cycle() {
        let b = parse(
            "[1.000s][info][gc          ] GC(5) Concurrent Mark Cycle
[1.000s][info][gc,marking  ] GC(5) Concurrent Clear Claimed Marks
[1.000s][info][gc,marking  ] GC(5) Concurrent Clear Claimed Marks 0.010ms
[1.000s][info][gc,marking  ] GC(5) Concurrent Scan Root Regions
[1.001s][info][gc,marking  ] GC(5) Concurrent Scan Root Regions 1.000ms
[1.001s][info][gc,marking  ] GC(5) Concurrent Mark (1.001s)
[1.001s][info][gc,marking  ] GC(5) Concurrent Mark From Roots
[1.005s][info][gc,marking  ] GC(5) Concurrent Mark From Roots 4.000ms
[1.006s][info][gc,marking  ] GC(5) Concurrent Mark (1.001s, 1.006s) 5.000ms
[1.006s][info][gc,start    ] GC(5) Pause Remark
[1.008s][info][gc          ] GC(5) Pause Remark 40M->38M(256M) 2.000ms
[1.008s][info][gc,cpu      ] GC(5) User=0.01s Sys=0.00s Real=0.00s
[1.008s][info][gc,marking  ] GC(5) Concurrent Rebuild Remembered Sets
[1.010s][info][gc,marking  ] GC(5) Concurrent Rebuild Remembered Sets 2.000ms
[1.010s][info][gc,start    ] GC(5) Pause Cleanup
[1.011s][info][gc          ] GC(5) Pause Cleanup 38M->38M(256M) 0.500ms
[1.011s][info][gc,marking  ] GC(5) Concurrent Cleanup for Next Mark
[1.012s][info][gc,marking  ] GC(5) Concurrent Cleanup for Next Mark 1.000ms
[1.012s][info][gc          ] GC(5) Concurrent Mark Cycle 12.000ms
",
        );
        assert_eq!(b.stats().unrecognized, 0);
        assert_eq!(b.events().len(), 1);
        let cycle = &b.events()[0];
        assert_eq!(cycle.kind, EventKind::G1ConcurrentCycle);
        assert!(close(cycle.duration.unwrap(), 12.0));
        assert_eq!(cycle.phases.len(), 8);
        let remark = cycle
            .phases
            .iter()
            .find(|p| p.kind == EventKind::G1Remark)
            .unwrap();
        assert!(close(remark.start, 1006.0));
        assert!(close(remark.duration.unwrap(), 2.0));
        assert!(remark.cpu.is_some());
        assert_eq!(remark.raw(Generation::Total).unwrap().post_used, Some(38 << 20));
        let mark = cycle
            .phases
            .iter()
            .find(|p| p.kind == EventKind::G1ConcurrentMark)
            .unwrap();
        assert!(close(mark.start, 1001.0));
        assert!(close(mark.duration.unwrap(), 5.0));
    }

    #[test]
    fn test_pause_flavours() {
        let b = parse(
            "[2.000s][info][gc] GC(7) Pause Young (Concurrent Start) (G1 Humongous Allocation) 100M->90M(256M) 5.000ms
[3.000s][info][gc] GC(8) Pause Young (Prepare Mixed) (G1 Evacuation Pause) 100M->90M(256M) 5.000ms
[4.000s][info][gc] GC(9) Pause Young (Mixed) (G1 Evacuation Pause) 100M->60M(256M) 5.000ms
[5.000s][info][gc] GC(10) Pause Young (Normal) (G1 Evacuation Pause) (Evacuation Failure) 250M->250M(256M) 50.000ms
",
        );
        let events = b.events();
        assert!(events[0].has(SpecialSituation::InitialMark));
        assert!(events[0].cause.as_ref().unwrap().is_humongous());
        assert!(close(events[0].start, 1995.0));
        assert!(events[1].has(SpecialSituation::PrepareMixed));
        assert_eq!(events[2].kind, EventKind::G1MixedGc);
        assert!(events[3].has(SpecialSituation::ToSpaceExhausted));
    }

    #[test]
    fn test_full_gc_phases() {
        let b = parse(
            "[6.000s][info][gc,start    ] GC(11) Pause Full (System.gc())
[6.000s][info][gc,phases,start] GC(11) Phase 1: Mark live objects
[6.010s][info][gc,phases      ] GC(11) Phase 1: Mark live objects 10.000ms
[6.010s][info][gc,phases,start] GC(11) Phase 2: Prepare for compaction
[6.015s][info][gc,phases      ] GC(11) Phase 2: Prepare for compaction 5.000ms
[6.030s][info][gc             ] GC(11) Pause Full (System.gc()) 200M->50M(256M) 30.000ms
",
        );
        let event = &b.events()[0];
        assert_eq!(event.kind, EventKind::FullGc);
        assert_eq!(event.cause.as_ref().unwrap().as_str(), "System.gc()");
        assert_eq!(event.phases.len(), 2);
        assert!(close(event.phases[1].start, 6010.0));
        assert!(close(event.duration.unwrap(), 30.0));
    }

    #[test]
    fn test_phase_without_announced_cycle() {
        let b =
            parse("[1.012s][info][gc,marking] GC(5) Concurrent Cleanup for Next Mark 1.000ms\n");
        let cycle = &b.events()[0];
        assert_eq!(cycle.kind, EventKind::G1ConcurrentCycle);
        assert_eq!(cycle.id, Some(5));
        assert_eq!(cycle.phases.len(), 1);
    }

    #[test]
    fn test_debug_detail_is_ignored() {
        let b = parse(
            "[0.300s][info][gc,start] GC(0) Pause Young (Normal) (G1 Evacuation Pause)
[0.301s][debug][gc,phases] GC(0)     Ext Root Scanning (ms):   Min:  0.1, Avg:  0.2, Max:  0.3, Diff:  0.2, Sum:  1.5, Workers: 8
[0.301s][info][gc,ergo] GC(0) Some ergonomics decision
",
        );
        assert_eq!(b.stats().ignored, 2);
        assert_eq!(b.stats().unrecognized, 0);
    }
}
