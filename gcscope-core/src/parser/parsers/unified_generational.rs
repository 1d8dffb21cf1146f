//! Unified logging (JDK 9+) parser for Serial, Parallel and CMS.
//!
//! ```text
//! [0.512s][info][gc,start] GC(0) Pause Young (Allocation Failure)
//! [0.520s][info][gc,heap ] GC(0) PSYoungGen: 65536K->10720K(76288K)
//! [0.520s][info][gc,heap ] GC(0) ParOldGen: 0K->2530K(175104K)
//! [0.520s][info][gc      ] GC(0) Pause Young (Allocation Failure) 64M->12M(245M) 8.745ms
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

static HEAP_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<gen>DefNew|PSYoungGen|ParNew|Tenured|ParOldGen|PSOldGen|CMS): (?P<rest>.*)$")
        .unwrap()
});

/// Parser for unified Serial, Parallel and CMS logs.
pub struct UnifiedGenerationalParser {
    family: CollectorFamily,
}

impl UnifiedGenerationalParser {
    pub fn new(family: CollectorFamily) -> Self {
        Self { family }
    }
}

impl GcLogParser for UnifiedGenerationalParser {
    fn format(&self) -> LogFormat {
        LogFormat::new(self.family, LogStyle::Unified)
    }

    fn parse_into(&self, text: &str, builder: &mut ModelBuilder) {
        let mut tracker = UnifiedTracker::default();
        scan_lines(text, builder, |b, line_no, raw| {
            let Some(line) = grammar::unified_line(raw) else {
                return common::header_line(b, raw).unwrap_or(LineOutcome::Unrecognized);
            };
            let outcome = parse_line(&mut tracker, b, line_no, &line);
            match outcome {
                LineOutcome::Unrecognized if common::unified_noise(&line) => LineOutcome::Ignored,
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

    if let Some(caps) = HEAP_LINE.captures(message) {
        let generation = match &caps["gen"] {
            "DefNew" | "PSYoungGen" | "ParNew" => Generation::Young,
            _ => Generation::Old,
        };
        let Some(change) = MemoryChange::find(&caps["rest"]) else {
            return LineOutcome::Unrecognized;
        };
        return match id
            .and_then(|id| common::memory_target(b, id))
            .and_then(|t| b.event_mut(t))
        {
            Some(event) => {
                event.put_memory(change.into_item(generation));
                LineOutcome::Recognized
            }
            None => LineOutcome::Unrecognized,
        };
    }
    if message.starts_with("Promotion failed") {
        return match id.and_then(|id| b.find_by_id(id, EventKind::YoungGc)) {
            Some(index) => {
                if let Some(event) = b.event_mut(index) {
                    event.mark(SpecialSituation::PromotionFailed);
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

    match name {
        "Pause Young" | "Pause Full" => {
            let kind = if name == "Pause Full" {
                EventKind::FullGc
            } else {
                EventKind::YoungGc
            };
            let index = common::unified_event(b, id, kind, time, duration, line_no);
            if let Some(event) = b.event_mut(index) {
                if let Some(cause) = groups.first() {
                    event.cause = Some(GcCause::new(*cause));
                }
                if let Some(memory) = memory {
                    event.put_memory(memory.into_item(Generation::Total));
                }
            }
            tracker.touch(id, Touch::Event(index));
            LineOutcome::Recognized
        }
        "Pause Initial Mark" | "Pause Remark" => {
            let kind = if name == "Pause Remark" {
                EventKind::CmsFinalRemark
            } else {
                EventKind::CmsInitialMark
            };
            let cycle = cms_cycle(b, id, time, duration, line_no);
            let Some(touch) = common::start_or_finish_phase(b, cycle, kind, time, duration, line_no)
            else {
                return LineOutcome::Unrecognized;
            };
            if let (Some(memory), Some(phase)) = (memory, touch.resolve(b)) {
                phase.put_memory(memory.into_item(Generation::Total));
            }
            tracker.touch(id, touch);
            LineOutcome::Recognized
        }
        _ => {
            if let Some(kind) = cms_concurrent_kind(name) {
                let cycle = cms_cycle(b, id, time, duration, line_no);
                let Some(touch) =
                    common::start_or_finish_phase(b, cycle, kind, time, duration, line_no)
                else {
                    return LineOutcome::Unrecognized;
                };
                tracker.touch(id, touch);
                if kind == EventKind::CmsConcurrentReset && duration.is_some() {
                    let end = touch.resolve(b).and_then(|p| p.end());
                    if let (Some(end), Some(event)) = (end, b.event_mut(cycle)) {
                        event.duration = Some((end - event.start).max(0.0));
                    }
                }
                LineOutcome::Recognized
            } else if let Some(kind) = full_phase_kind(name) {
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
            } else {
                LineOutcome::Unrecognized
            }
        }
    }
}

fn cms_concurrent_kind(name: &str) -> Option<EventKind> {
    Some(match name {
        "Concurrent Mark" => EventKind::CmsConcurrentMark,
        "Concurrent Preclean" => EventKind::CmsConcurrentPreclean,
        "Concurrent Abortable Preclean" => EventKind::CmsConcurrentAbortablePreclean,
        "Concurrent Sweep" => EventKind::CmsConcurrentSweep,
        "Concurrent Reset" => EventKind::CmsConcurrentReset,
        _ => return None,
    })
}

/// Serial and CMS print the mark-compact phase titles; Parallel names its
/// own.
fn full_phase_kind(name: &str) -> Option<EventKind> {
    let kind = match name {
        "Marking Phase" => EventKind::ParallelMarkingPhase,
        "Summary Phase" => EventKind::ParallelSummaryPhase,
        "Adjust Roots" => EventKind::ParallelAdjustRoots,
        "Compaction Phase" => EventKind::ParallelCompactionPhase,
        "Post Compact" => EventKind::ParallelPostCompact,
        _ => return common::full_phase_kind(name),
    };
    Some(kind)
}

/// CMS cycle for `id`, created at the first line that mentions it.
fn cms_cycle(
    b: &mut ModelBuilder,
    id: Option<u64>,
    time: f64,
    duration: Option<f64>,
    line_no: usize,
) -> usize {
    let existing = id.and_then(|id| b.find_by_id(id, EventKind::CmsConcurrentCycle));
    match existing {
        Some(index) => index,
        None => b.push_event(
            GcEvent::new(
                EventKind::CmsConcurrentCycle,
                common::start_from_end(time, duration),
            )
            .with_id(id)
            .with_line(line_no),
        ),
    }
}
