//! Helpers shared by the format-specific parsers.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::model::{CpuTime, EventKind, GcEvent, Generation, MemoryItem, ModelBuilder};
use crate::parser::grammar::{self, MemoryChange, UnifiedLine};
use crate::parser::LineOutcome;
use crate::vmoption::VmOptions;

static WORKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Using (?P<used>\d+) workers of (?P<max>\d+) for (?P<what>[a-z ]+)").unwrap()
});

static WORKER_COUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<what>Parallel|Concurrent|Runtime) Workers: (?P<n>\d+)").unwrap()
});

static REGION_SIZE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^Heap region size: (?P<size>{})",
        grammar::SIZE
    ))
    .unwrap()
});

static ZGC_METASPACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^Metaspace: (?P<used>{size}) used, (?P<committed>{size}) committed",
        size = grammar::SIZE
    ))
    .unwrap()
});

/// Last thing a parser wrote to, so continuation lines know where to go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Touch {
    Event(usize),
    Phase(usize, usize),
}

impl Touch {
    /// Touch for the newest phase of `parent`.
    pub fn last_phase(builder: &ModelBuilder, parent: usize) -> Touch {
        match builder.events().get(parent).map(|e| e.phases.len()) {
            Some(len) if len > 0 => Touch::Phase(parent, len - 1),
            _ => Touch::Event(parent),
        }
    }

    pub fn resolve<'a>(self, builder: &'a mut ModelBuilder) -> Option<&'a mut GcEvent> {
        match self {
            Touch::Event(event) => builder.event_mut(event),
            Touch::Phase(event, phase) => builder.event_mut(event)?.phases.get_mut(phase),
        }
    }
}

pub(super) fn attach_cpu(builder: &mut ModelBuilder, touch: Option<Touch>, cpu: CpuTime) -> bool {
    match touch.and_then(|t| t.resolve(builder)) {
        Some(event) => {
            event.cpu = Some(cpu);
            true
        }
        None => false,
    }
}

/// Drop a negative duration to unknown.
pub(super) fn checked_duration(builder: &mut ModelBuilder, duration: Option<f64>) -> Option<f64> {
    match duration {
        Some(d) if d < 0.0 || !d.is_finite() => {
            builder.stats_mut().downgraded += 1;
            None
        }
        other => other,
    }
}

/// Start of an event whose end line printed `duration`; `time` is when
/// the line was written.
pub(super) fn start_from_end(time: f64, duration: Option<f64>) -> f64 {
    match duration {
        Some(d) => (time - d).max(0.0),
        None => time,
    }
}

/// Append a phase that the log reports only as a duration. Such phases
/// run back to back from the parent's start.
pub(super) fn push_sequential_phase(
    builder: &mut ModelBuilder,
    parent: usize,
    kind: EventKind,
    duration: Option<f64>,
    line_no: usize,
) -> bool {
    let Some(event) = builder.events().get(parent) else {
        return false;
    };
    let offset: f64 = event
        .phases
        .iter()
        .filter(|p| p.kind.is_phase_of(event.kind))
        .filter_map(|p| p.duration)
        .sum();
    let start = event.start + offset;
    let phase = GcEvent::new(kind, start)
        .with_id(event.id)
        .with_duration(duration)
        .with_line(line_no);
    builder.add_phase_to(parent, phase)
}

/// Open or close a phase of `parent` from a start line (no duration) or
/// an end line (duration printed).
pub(super) fn start_or_finish_phase(
    builder: &mut ModelBuilder,
    parent: usize,
    kind: EventKind,
    time: f64,
    duration: Option<f64>,
    line_no: usize,
) -> Option<Touch> {
    let id = builder.events().get(parent)?.id;
    if let Some(duration) = duration {
        let open = builder.events()[parent]
            .phases
            .iter()
            .rposition(|p| p.kind == kind && p.duration.is_none());
        if let Some(index) = open {
            builder.event_mut(parent)?.phases[index].duration = Some(duration);
            return Some(Touch::Phase(parent, index));
        }
    }
    let start = start_from_end(time, duration);
    let phase = GcEvent::new(kind, start)
        .with_id(id)
        .with_duration(duration)
        .with_line(line_no);
    builder
        .add_phase_to(parent, phase)
        .then(|| Touch::last_phase(builder, parent))
}

/// Find the still-open top-level event `kind` with `id`, closing it when
/// `duration` is known, or create it. Unified logs print a start line and
/// an end line per event, and either may be missing.
pub(super) fn unified_event(
    builder: &mut ModelBuilder,
    id: Option<u64>,
    kind: EventKind,
    time: f64,
    duration: Option<f64>,
    line_no: usize,
) -> usize {
    let open = id
        .and_then(|id| builder.find_by_id(id, kind))
        .filter(|&index| builder.events()[index].duration.is_none());
    match open {
        Some(index) => {
            if let (Some(duration), Some(event)) = (duration, builder.event_mut(index)) {
                event.duration = Some(duration);
            }
            index
        }
        None => builder.push_event(
            GcEvent::new(kind, start_from_end(time, duration))
                .with_id(id)
                .with_duration(duration)
                .with_line(line_no),
        ),
    }
}

/// Serial, CMS and G1 full collections share these phase titles.
pub(super) fn full_phase_kind(name: &str) -> Option<EventKind> {
    Some(match name {
        "Phase 1: Mark live objects" => EventKind::FullMarkLiveObjects,
        "Phase 2: Compute new object addresses" => EventKind::FullComputeNewAddresses,
        "Phase 2: Prepare for compaction" | "Phase 2: Prepare compaction" => {
            EventKind::FullPrepareForCompaction
        }
        "Phase 3: Adjust pointers" => EventKind::FullAdjustPointers,
        "Phase 4: Move objects" => EventKind::FullMoveObjects,
        "Phase 4: Compact heap" => EventKind::FullCompactHeap,
        _ => return None,
    })
}

/// Header lines common to every log generation.
pub(super) fn header_line(builder: &mut ModelBuilder, text: &str) -> Option<LineOutcome> {
    if let Some(flags) = grammar::command_line_flags(text) {
        return Some(match VmOptions::parse(flags) {
            Ok(options) => {
                builder.vm_options_mut().extend(options);
                LineOutcome::Recognized
            }
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed command line in log");
                builder.stats_mut().downgraded += 1;
                LineOutcome::Ignored
            }
        });
    }
    let text = text.trim_start();
    if ["Java HotSpot", "OpenJDK", "Memory:"]
        .iter()
        .any(|p| text.starts_with(p))
    {
        return Some(LineOutcome::Ignored);
    }
    None
}

/// Safepoint summary lines, modeled as their own event.
pub(super) fn safepoint_line(
    builder: &mut ModelBuilder,
    time: Option<f64>,
    text: &str,
    line_no: usize,
) -> Option<LineOutcome> {
    let (total, reach) = grammar::safepoint(text)?;
    let Some(time) = time else {
        return Some(LineOutcome::Unrecognized);
    };
    let mut event = GcEvent::new(EventKind::Safepoint, start_from_end(time, Some(total)))
        .with_duration(Some(total))
        .with_line(line_no);
    event.time_to_safepoint = reach;
    builder.push_safepoint(event);
    Some(LineOutcome::Recognized)
}

/// Newest event with `id` that owns heap numbers. Concurrent-cycle
/// containers never do.
pub(super) fn memory_target(builder: &ModelBuilder, id: u64) -> Option<usize> {
    builder.last_event_where(|e| e.id == Some(id) && !e.kind.is_concurrent_cycle())
}

/// Per-GC-id bookkeeping for unified logs.
#[derive(Debug, Default)]
pub(super) struct UnifiedTracker {
    touched: HashMap<u64, Touch>,
}

impl UnifiedTracker {
    pub fn touch(&mut self, id: Option<u64>, touch: Touch) {
        if let Some(id) = id {
            self.touched.insert(id, touch);
        }
    }

    pub fn touched(&self, id: Option<u64>) -> Option<Touch> {
        id.and_then(|id| self.touched.get(&id).copied())
    }
}

/// Lines every unified parser understands the same way.
pub(super) fn unified_common(
    builder: &mut ModelBuilder,
    tracker: &UnifiedTracker,
    line: &UnifiedLine<'_>,
    time: Option<f64>,
    line_no: usize,
) -> Option<LineOutcome> {
    let message = line.message.trim();
    if let Some(outcome) = header_line(builder, message) {
        return Some(outcome);
    }
    if let Some(outcome) = safepoint_line(builder, time, message, line_no) {
        return Some(outcome);
    }
    if let Some(caps) = WORKERS.captures(message) {
        if let Ok(used) = caps["used"].parse::<u32>() {
            if caps["what"].contains("marking") {
                builder.note_concurrent_threads(used);
            } else {
                builder.note_parallel_threads(used);
            }
        }
        return Some(LineOutcome::Recognized);
    }
    if let Some(caps) = WORKER_COUNT.captures(message) {
        if let Ok(n) = caps["n"].parse::<u32>() {
            match &caps["what"] {
                "Parallel" => builder.note_parallel_threads(n),
                "Concurrent" => builder.note_concurrent_threads(n),
                _ => {}
            }
        }
        return Some(LineOutcome::Recognized);
    }
    if let Some(caps) = REGION_SIZE.captures(message) {
        if let Some(bytes) = grammar::size(&caps["size"]) {
            builder.set_region_size(bytes);
        }
        return Some(LineOutcome::Recognized);
    }
    if message.starts_with("Using ") {
        return Some(LineOutcome::Recognized);
    }
    if let Some(cpu) = grammar::unified_cpu(message) {
        return Some(if attach_cpu(builder, tracker.touched(line.gc_id), cpu) {
            LineOutcome::Recognized
        } else {
            LineOutcome::Unrecognized
        });
    }
    if message.starts_with("Metaspace:") {
        return Some(metaspace_line(builder, line.gc_id, message));
    }
    if line.has_tag("init") || (line.has_tag("heap") && line.has_tag("exit")) {
        return Some(LineOutcome::Ignored);
    }
    None
}

fn metaspace_line(builder: &mut ModelBuilder, id: Option<u64>, message: &str) -> LineOutcome {
    let Some(target) = id.and_then(|id| memory_target(builder, id)) else {
        return LineOutcome::Unrecognized;
    };
    let mut items = Vec::new();
    if let Some(caps) = ZGC_METASPACE.captures(message) {
        let used = grammar::size(&caps["used"]);
        let mut item = MemoryItem::with_change(
            Generation::Metaspace,
            used,
            used,
            grammar::size(&caps["committed"]),
        );
        item.pre_capacity = item.post_capacity;
        items.push(item);
    } else {
        let body = &message["Metaspace:".len()..];
        let (meta, rest) = match body.find("NonClass:") {
            Some(at) => body.split_at(at),
            None => (body, ""),
        };
        if let Some(change) = MemoryChange::find(meta) {
            items.push(change.into_item(Generation::Metaspace));
        }
        if let Some(rest) = rest.strip_prefix("NonClass:") {
            let (non_class, class) = match rest.find(" Class:") {
                Some(at) => (&rest[..at], &rest[at + " Class:".len()..]),
                None => (rest, ""),
            };
            if let Some(change) = MemoryChange::find(non_class) {
                items.push(change.into_item(Generation::NonClass));
            }
            if let Some(change) = MemoryChange::find(class) {
                items.push(change.into_item(Generation::Class));
            }
        }
    }
    if items.is_empty() {
        return LineOutcome::Unrecognized;
    }
    if let Some(event) = builder.event_mut(target) {
        for item in items {
            event.put_memory(item);
        }
    }
    LineOutcome::Recognized
}

/// Tags of unified lines that only carry detail the model has no use for.
const NOISE_TAGS: &[&str] = &[
    "age",
    "alloc",
    "ergo",
    "humongous",
    "ihop",
    "load",
    "mmu",
    "nmethod",
    "plab",
    "ref",
    "reloc",
    "remset",
    "stats",
    "stringdedup",
    "tlab",
];

/// Whether an otherwise unmatched unified line is known detail output.
pub(super) fn unified_noise(line: &UnifiedLine<'_>) -> bool {
    matches!(line.level, Some("debug" | "trace"))
        || NOISE_TAGS.iter().any(|tag| line.has_tag(tag))
        || legacy_heap_dump_line(line.message)
}

/// Prefixes of heap dumps printed around collections in legacy logs.
const LEGACY_HEAP_DUMP: &[&str] = &[
    "Heap",
    "{Heap",
    "}",
    "par new generation",
    "def new generation",
    "PSYoungGen ",
    "ParOldGen ",
    "PSOldGen ",
    "eden space",
    "from space",
    "to space",
    "object space",
    "tenured generation",
    "the space",
    "concurrent mark-sweep generation",
    "concurrent-mark-sweep perm gen",
    "Metaspace ",
    "class space",
    "garbage-first heap",
    "region size",
    "compacting perm gen",
];

pub(super) fn legacy_heap_dump_line(text: &str) -> bool {
    let text = text.trim_start();
    LEGACY_HEAP_DUMP.iter().any(|p| text.starts_with(p)) && !text.contains("->")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CollectorFamily, LogFormat, LogStyle};

    fn g1() -> ModelBuilder {
        ModelBuilder::new(LogFormat::new(CollectorFamily::G1, LogStyle::Unified)).unwrap()
    }

    #[test]
    fn test_sequential_phases_run_back_to_back() {
        let mut b = g1();
        let parent = b.push_event(GcEvent::new(EventKind::YoungGc, 100.0).with_id(Some(1)));
        assert!(push_sequential_phase(
            &mut b,
            parent,
            EventKind::G1PreEvacuateCollectionSet,
            Some(0.5),
            1
        ));
        assert!(push_sequential_phase(
            &mut b,
            parent,
            EventKind::G1EvacuateCollectionSet,
            Some(2.0),
            2
        ));
        let phases = &b.events()[parent].phases;
        assert_eq!(phases[0].start, 100.0);
        assert_eq!(phases[1].start, 100.5);
    }

    #[test]
    fn test_start_then_finish_phase() {
        let mut b = g1();
        let parent =
            b.push_event(GcEvent::new(EventKind::G1ConcurrentCycle, 10.0).with_id(Some(2)));
        start_or_finish_phase(&mut b, parent, EventKind::G1ConcurrentMark, 11.0, None, 1);
        let touch = start_or_finish_phase(
            &mut b,
            parent,
            EventKind::G1ConcurrentMark,
            20.0,
            Some(9.0),
            2,
        );
        assert_eq!(touch, Some(Touch::Phase(parent, 0)));
        let phases = &b.events()[parent].phases;
        assert_eq!(phases.len(), 1);
        assert_eq!(phases[0].start, 11.0);
        assert_eq!(phases[0].duration, Some(9.0));
    }

    #[test]
    fn test_metaspace_forms() {
        let mut b = g1();
        b.push_event(GcEvent::new(EventKind::YoungGc, 1.0).with_id(Some(0)));
        let line = grammar::unified_line(
            "[1.000s][info][gc,metaspace] GC(0) Metaspace: 1024K(1216K)->1024K(1216K) NonClass: 900K(1000K)->900K(1000K) Class: 124K(216K)->124K(216K)",
        )
        .unwrap();
        let tracker = UnifiedTracker::default();
        let outcome = unified_common(&mut b, &tracker, &line, Some(1000.0), 1);
        assert_eq!(outcome, Some(LineOutcome::Recognized));
        let event = &b.events()[0];
        assert_eq!(event.raw(Generation::Metaspace).unwrap().post_used, Some(1024 * 1024));
        assert_eq!(event.raw(Generation::Class).unwrap().pre_capacity, Some(216 * 1024));
        assert_eq!(event.raw(Generation::NonClass).unwrap().pre_used, Some(900 * 1024));
    }

    #[test]
    fn test_worker_lines() {
        let mut b = g1();
        let tracker = UnifiedTracker::default();
        let line =
            grammar::unified_line("[0.3s][info][gc,task] GC(0) Using 8 workers of 8 for evacuation")
                .unwrap();
        unified_common(&mut b, &tracker, &line, Some(300.0), 1);
        let line =
            grammar::unified_line("[0.4s][info][gc,task] GC(1) Using 2 workers of 2 for marking")
                .unwrap();
        unified_common(&mut b, &tracker, &line, Some(400.0), 2);
        assert_eq!(b.parallel_threads, Some(8));
        assert_eq!(b.concurrent_threads, Some(2));
    }
}
