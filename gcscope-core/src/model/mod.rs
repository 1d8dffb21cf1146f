//! The GC event model.
//!
//! A [`GcModel`] is produced once by the derived-info pipeline and is
//! read-only afterwards. It owns the top-level events (each with its
//! phases) and a flat, start-ordered index over every event and phase.

mod builder;
mod cause;
mod event;
mod family;
mod kind;
mod memory;

pub use builder::ModelBuilder;
pub(crate) use builder::offset_millis;
pub use cause::{CauseClass, GcCause};
pub use event::{CpuTime, GcEvent, SpecialSituation};
pub use family::{CollectorFamily, FamilyProfile, LogFormat, LogStyle};
pub use kind::{EventKind, KindInfo, Level, PauseClass};
pub use memory::{merge, subtract, Generation, MemoryAggregate, MemoryItem};

use crate::parser::ParseStats;
use crate::vmoption::VmOptions;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Position of an event in the model: a top-level event, or one of its
/// phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct EventRef {
    pub event: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<usize>,
}

impl EventRef {
    pub fn top(event: usize) -> Self {
        Self { event, phase: None }
    }

    pub fn phase(event: usize, phase: usize) -> Self {
        Self {
            event,
            phase: Some(phase),
        }
    }

    pub fn is_phase(&self) -> bool {
        self.phase.is_some()
    }
}

/// Summary facts about an analyzed log.
#[derive(Debug, Clone, Serialize)]
pub struct ModelMetadata {
    pub collector: CollectorFamily,
    pub style: LogStyle,
    pub start_time: f64,
    pub end_time: f64,
    pub parallel_threads: Option<u32>,
    pub concurrent_threads: Option<u32>,
    pub region_size: Option<i64>,
    pub has_timestamps: bool,
    pub has_cpu_time: bool,
    pub event_count: usize,
    pub phase_count: usize,
    pub safepoint_count: usize,
    pub stall_count: usize,
    /// Distinct causes of top-level events, sorted
    pub causes: Vec<GcCause>,
    /// Important kinds that actually occur in this log
    pub important_kinds: Vec<EventKind>,
    pub pause_counted_kinds: Vec<EventKind>,
}

#[derive(Debug, Serialize)]
pub struct GcModel {
    pub(crate) format: LogFormat,
    #[serde(skip)]
    pub(crate) profile: &'static FamilyProfile,
    pub(crate) events: Vec<GcEvent>,
    #[serde(skip)]
    pub(crate) all_events: Vec<EventRef>,
    pub(crate) safepoints: Vec<GcEvent>,
    pub(crate) stalls: Vec<GcEvent>,
    pub(crate) start_time: f64,
    pub(crate) end_time: f64,
    pub(crate) reference_timestamp: Option<DateTime<Utc>>,
    pub(crate) parallel_threads: Option<u32>,
    pub(crate) concurrent_threads: Option<u32>,
    pub(crate) region_size: Option<i64>,
    pub(crate) vm_options: VmOptions,
    pub(crate) metadata: ModelMetadata,
    pub(crate) stats: ParseStats,
}

impl GcModel {
    pub fn format(&self) -> LogFormat {
        self.format
    }

    pub fn profile(&self) -> &'static FamilyProfile {
        self.profile
    }

    /// Top-level events, each owning its phases.
    pub fn events(&self) -> &[GcEvent] {
        &self.events
    }

    /// Every event and phase, ordered by start time.
    pub fn all_events(&self) -> &[EventRef] {
        &self.all_events
    }

    pub fn resolve(&self, r: EventRef) -> &GcEvent {
        let top = &self.events[r.event];
        match r.phase {
            Some(phase) => &top.phases[phase],
            None => top,
        }
    }

    /// Iterate the flat list as `(ref, event)` pairs.
    pub fn iter_all(&self) -> impl Iterator<Item = (EventRef, &GcEvent)> + '_ {
        self.all_events.iter().map(move |r| (*r, self.resolve(*r)))
    }

    pub fn safepoints(&self) -> &[GcEvent] {
        &self.safepoints
    }

    /// Allocation stalls and out-of-memory reports.
    pub fn stalls(&self) -> &[GcEvent] {
        &self.stalls
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    pub fn reference_timestamp(&self) -> Option<DateTime<Utc>> {
        self.reference_timestamp
    }

    pub fn parallel_threads(&self) -> Option<u32> {
        self.parallel_threads
    }

    pub fn concurrent_threads(&self) -> Option<u32> {
        self.concurrent_threads
    }

    pub fn region_size(&self) -> Option<i64> {
        self.region_size
    }

    pub fn vm_options(&self) -> &VmOptions {
        &self.vm_options
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn parse_stats(&self) -> &ParseStats {
        &self.stats
    }
}
