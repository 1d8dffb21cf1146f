//! Collection events and their phases.

use super::cause::GcCause;
use super::kind::{EventKind, Level, PauseClass};
use super::memory::{MemoryAggregate, MemoryItem};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Real time and CPU-reported time may disagree by this much (ms) before
/// the real time is trusted over the printed duration.
const REAL_TIME_TOLERANCE_MS: f64 = 10.0;

/// Noteworthy conditions attached to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialSituation {
    ToSpaceExhausted,
    PromotionFailed,
    ConcurrentModeFailure,
    YoungGcBecameFullGc,
    InitialMark,
    PrepareMixed,
    ConcurrentMarkAborted,
}

impl SpecialSituation {
    pub fn name(self) -> &'static str {
        match self {
            SpecialSituation::ToSpaceExhausted => "To-space Exhausted",
            SpecialSituation::PromotionFailed => "Promotion Failed",
            SpecialSituation::ConcurrentModeFailure => "Concurrent Mode Failure",
            SpecialSituation::YoungGcBecameFullGc => "Young GC Became Full GC",
            SpecialSituation::InitialMark => "Initial Mark",
            SpecialSituation::PrepareMixed => "Prepare Mixed",
            SpecialSituation::ConcurrentMarkAborted => "Concurrent Mark Aborted",
        }
    }
}

/// CPU time reported for an event, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CpuTime {
    pub user: f64,
    pub sys: f64,
    pub real: f64,
}

/// One collection activity. Top-level events own their phases; phases
/// never own further phases because sub-phases are flattened into the
/// top-level event's list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GcEvent {
    /// Sequence number printed by the JVM, when the log has one
    pub id: Option<u64>,
    pub kind: EventKind,
    /// Start, in ms since JVM start
    pub start: f64,
    pub duration: Option<f64>,
    /// Wall-clock start, resolved from the model's reference timestamp
    pub timestamp: Option<DateTime<Utc>>,
    pub cause: Option<GcCause>,
    pub cpu: Option<CpuTime>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phases: Vec<GcEvent>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub special_situations: BTreeSet<SpecialSituation>,
    /// Memory items exactly as the log reported them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub raw_memory: Vec<MemoryItem>,
    #[serde(default, skip_serializing_if = "MemoryAggregate::is_empty")]
    pub memory: MemoryAggregate,
    pub pause: Option<f64>,
    pub interval: Option<f64>,
    pub promotion: Option<i64>,
    pub allocation: Option<i64>,
    pub reclamation: Option<i64>,
    /// Time taken to reach a safepoint, for safepoint events
    pub time_to_safepoint: Option<f64>,
    /// Thread named by allocation stalls and out-of-memory events
    pub thread: Option<String>,
    /// 1-based line in the source log where the event was first seen
    pub line: Option<usize>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
}

impl GcEvent {
    pub fn new(kind: EventKind, start: f64) -> Self {
        Self {
            id: None,
            kind,
            start,
            duration: None,
            timestamp: None,
            cause: None,
            cpu: None,
            phases: Vec::new(),
            special_situations: BTreeSet::new(),
            raw_memory: Vec::new(),
            memory: MemoryAggregate::default(),
            pause: None,
            interval: None,
            promotion: None,
            allocation: None,
            reclamation: None,
            time_to_safepoint: None,
            thread: None,
            line: None,
            text: String::new(),
        }
    }

    pub fn with_id(mut self, id: Option<u64>) -> Self {
        self.id = id;
        self
    }

    pub fn with_duration(mut self, duration: Option<f64>) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_cause(mut self, cause: Option<GcCause>) -> Self {
        self.cause = cause;
        self
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    /// End time, if the duration is known.
    pub fn end(&self) -> Option<f64> {
        self.duration.map(|d| self.start + d)
    }

    pub fn has(&self, situation: SpecialSituation) -> bool {
        self.special_situations.contains(&situation)
    }

    pub fn mark(&mut self, situation: SpecialSituation) {
        self.special_situations.insert(situation);
    }

    /// Replace or add a raw memory item of the same generation.
    pub fn put_memory(&mut self, item: MemoryItem) {
        match self
            .raw_memory
            .iter_mut()
            .find(|m| m.generation == item.generation && m.in_regions == item.in_regions)
        {
            Some(existing) => *existing = item,
            None => self.raw_memory.push(item),
        }
    }

    pub fn raw(&self, generation: super::Generation) -> Option<&MemoryItem> {
        self.raw_memory
            .iter()
            .find(|m| m.generation == generation && !m.in_regions)
    }

    pub fn raw_mut(&mut self, generation: super::Generation) -> Option<&mut MemoryItem> {
        self.raw_memory
            .iter_mut()
            .find(|m| m.generation == generation && !m.in_regions)
    }

    /// End of the latest phase with a known end.
    pub fn last_phase_end(&self) -> Option<f64> {
        self.phases
            .iter()
            .filter_map(GcEvent::end)
            .max_by(f64::total_cmp)
    }

    /// Pause contributed by this event.
    ///
    /// Paused kinds use the printed duration unless the reported real time
    /// disagrees by more than [`REAL_TIME_TOLERANCE_MS`]. Concurrent kinds
    /// pause for zero. Partial kinds sum their direct paused phases.
    pub fn compute_pause(&self) -> Option<f64> {
        match self.kind.pause_class() {
            PauseClass::Pause => {
                let duration = self.duration?;
                match self.cpu {
                    Some(cpu) if (cpu.real - duration).abs() > REAL_TIME_TOLERANCE_MS => {
                        Some(cpu.real)
                    }
                    _ => Some(duration),
                }
            }
            PauseClass::Concurrent => Some(0.0),
            PauseClass::Partial => {
                let mut total = 0.0;
                for phase in self.phases.iter().filter(|p| {
                    p.kind.level() == Level::Phase && p.kind.pause_class() == PauseClass::Pause
                }) {
                    total += phase.compute_pause()?;
                }
                Some(total)
            }
        }
    }

    /// Move every time of this event and its phases by `delta` ms.
    pub fn shift(&mut self, delta: f64) {
        self.start += delta;
        for phase in &mut self.phases {
            phase.shift(delta);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pause_prefers_real_time_when_far_apart() {
        let mut event = GcEvent::new(EventKind::YoungGc, 100.0).with_duration(Some(5.0));
        event.cpu = Some(CpuTime {
            user: 1.0,
            sys: 0.0,
            real: 40.0,
        });
        assert_eq!(event.compute_pause(), Some(40.0));

        event.cpu = Some(CpuTime {
            user: 1.0,
            sys: 0.0,
            real: 10.0,
        });
        assert_eq!(event.compute_pause(), Some(5.0));
    }

    #[test]
    fn test_partial_pause_sums_direct_paused_phases() {
        let mut cycle = GcEvent::new(EventKind::G1ConcurrentCycle, 0.0).with_duration(Some(50.0));
        cycle
            .phases
            .push(GcEvent::new(EventKind::G1ConcurrentMark, 1.0).with_duration(Some(20.0)));
        cycle
            .phases
            .push(GcEvent::new(EventKind::G1Remark, 25.0).with_duration(Some(3.0)));
        // sub-phase of remark, must not be double counted
        cycle
            .phases
            .push(GcEvent::new(EventKind::G1FinalizeMarking, 25.0).with_duration(Some(1.0)));
        cycle
            .phases
            .push(GcEvent::new(EventKind::G1Cleanup, 40.0).with_duration(Some(0.5)));
        assert_eq!(cycle.compute_pause(), Some(3.5));
    }

    #[test]
    fn test_concurrent_pause_is_zero() {
        let event = GcEvent::new(EventKind::G1ConcurrentUndoCycle, 0.0);
        assert_eq!(event.compute_pause(), Some(0.0));
    }

    #[test]
    fn test_unknown_duration_gives_unknown_pause() {
        let event = GcEvent::new(EventKind::FullGc, 0.0);
        assert_eq!(event.compute_pause(), None);
    }
}
