//! Mutable accumulation of parsed events.
//!
//! Parsers only ever see a [`ModelBuilder`]. The pipeline consumes it and
//! produces the immutable [`GcModel`](super::GcModel).

use super::event::GcEvent;
use super::family::{FamilyProfile, LogFormat};
use super::kind::EventKind;
use crate::error::{Error, Result};
use crate::parser::ParseStats;
use crate::vmoption::VmOptions;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

/// Resolves log times to ms since JVM start.
///
/// When a log carries only wall-clock datestamps, the first datestamp
/// becomes time zero and `synthetic` is set.
#[derive(Debug, Clone, Default)]
struct Clock {
    reference: Option<DateTime<Utc>>,
    synthetic: bool,
}

/// `reference` shifted by `ms`, or `None` when that leaves the representable range.
pub(crate) fn offset_millis(reference: DateTime<Utc>, ms: f64) -> Option<DateTime<Utc>> {
    if !ms.is_finite() {
        return None;
    }
    reference.checked_add_signed(chrono::TimeDelta::microseconds((ms * 1000.0) as i64))
}

fn millis_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_microseconds().unwrap_or(0) as f64 / 1000.0
}

#[derive(Debug)]
pub struct ModelBuilder {
    format: LogFormat,
    profile: &'static FamilyProfile,
    pub(crate) events: Vec<GcEvent>,
    pub(crate) safepoints: Vec<GcEvent>,
    pub(crate) stalls: Vec<GcEvent>,
    clock: Clock,
    pub(crate) last_seen: Option<f64>,
    pub(crate) parallel_threads: Option<u32>,
    pub(crate) concurrent_threads: Option<u32>,
    pub(crate) region_size: Option<i64>,
    pub(crate) vm_options: VmOptions,
    pub(crate) stats: ParseStats,
}

impl ModelBuilder {
    pub fn new(format: LogFormat) -> Result<Self> {
        let profile = format.family.profile().ok_or_else(|| {
            Error::UnsupportedFormat(format!("{} logs are not supported", format.family))
        })?;
        Ok(Self {
            format,
            profile,
            events: Vec::new(),
            safepoints: Vec::new(),
            stalls: Vec::new(),
            clock: Clock::default(),
            last_seen: None,
            parallel_threads: None,
            concurrent_threads: None,
            region_size: None,
            vm_options: VmOptions::default(),
            stats: ParseStats::default(),
        })
    }

    pub fn format(&self) -> LogFormat {
        self.format
    }

    pub fn profile(&self) -> &'static FamilyProfile {
        self.profile
    }

    pub fn stats(&self) -> &ParseStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut ParseStats {
        &mut self.stats
    }

    pub fn events(&self) -> &[GcEvent] {
        &self.events
    }

    pub fn reference_timestamp(&self) -> Option<DateTime<Utc>> {
        self.clock.reference
    }

    /// Convert a line's uptime and/or datestamp into ms since JVM start.
    pub fn resolve_time(
        &mut self,
        uptime: Option<f64>,
        datestamp: Option<DateTime<Utc>>,
    ) -> Option<f64> {
        let time = match (uptime, datestamp) {
            (Some(uptime), Some(date)) => {
                if self.clock.reference.is_none() {
                    self.clock.reference = offset_millis(date, -uptime);
                }
                Some(uptime)
            }
            (Some(uptime), None) => Some(uptime),
            (None, Some(date)) => {
                let reference = *self.clock.reference.get_or_insert_with(|| {
                    self.clock.synthetic = true;
                    date
                });
                Some(millis_between(reference, date))
            }
            (None, None) => None,
        }?;
        self.observe(time);
        Some(time)
    }

    /// Record that the log reached `time`.
    pub fn observe(&mut self, time: f64) {
        self.last_seen = Some(match self.last_seen {
            Some(seen) => seen.max(time),
            None => time,
        });
    }

    pub fn push_event(&mut self, event: GcEvent) -> usize {
        tracing::trace!(kind = ?event.kind, start = event.start, "event");
        self.events.push(event);
        self.events.len() - 1
    }

    pub fn event_mut(&mut self, index: usize) -> Option<&mut GcEvent> {
        self.events.get_mut(index)
    }

    /// Newest event satisfying `pred`.
    pub fn last_event_where(&self, pred: impl Fn(&GcEvent) -> bool) -> Option<usize> {
        self.events.iter().rposition(pred)
    }

    /// Newest event of `kind` carrying sequence id `id`.
    pub fn find_by_id(&self, id: u64, kind: EventKind) -> Option<usize> {
        self.last_event_where(|e| e.id == Some(id) && e.kind == kind)
    }

    /// Newest event of any kind carrying sequence id `id`.
    pub fn find_any_by_id(&self, id: u64) -> Option<usize> {
        self.last_event_where(|e| e.id == Some(id))
    }

    /// Attach `phase` to the newest top-level event that may legally own it.
    /// Returns the parent index, or `None` if no parent exists.
    pub fn add_phase(&mut self, phase: GcEvent) -> Option<usize> {
        let profile = self.profile;
        let parent = self.last_event_where(|e| profile.is_phase_of(phase.kind, e.kind))?;
        self.events[parent].phases.push(phase);
        Some(parent)
    }

    /// Attach `phase` to a specific parent, if the relation is legal.
    pub fn add_phase_to(&mut self, parent: usize, phase: GcEvent) -> bool {
        let legal = self
            .events
            .get(parent)
            .is_some_and(|e| self.profile.is_phase_of(phase.kind, e.kind));
        if legal {
            self.events[parent].phases.push(phase);
        }
        legal
    }

    pub fn push_safepoint(&mut self, event: GcEvent) {
        self.safepoints.push(event);
    }

    pub fn push_stall(&mut self, event: GcEvent) {
        self.stalls.push(event);
    }

    pub fn set_region_size(&mut self, bytes: i64) {
        self.region_size = Some(bytes);
    }

    pub fn note_parallel_threads(&mut self, threads: u32) {
        self.parallel_threads = Some(self.parallel_threads.map_or(threads, |t| t.max(threads)));
    }

    pub fn note_concurrent_threads(&mut self, threads: u32) {
        self.concurrent_threads =
            Some(self.concurrent_threads.map_or(threads, |t| t.max(threads)));
    }

    pub fn vm_options_mut(&mut self) -> &mut VmOptions {
        &mut self.vm_options
    }

    /// Order top-level events by sequence id when both carry one, else by
    /// start time. The sort is stable.
    pub fn sort_events(&mut self) {
        self.events.sort_by(compare_events);
        self.safepoints.sort_by(|a, b| a.start.total_cmp(&b.start));
        self.stalls.sort_by(|a, b| a.start.total_cmp(&b.start));
    }

    /// Combine independently built partial models of the same log.
    ///
    /// Partial models whose times were synthesized from datestamps are
    /// rebased onto the earliest reference before their events are pooled.
    pub fn merge(format: LogFormat, parts: Vec<ModelBuilder>) -> Result<ModelBuilder> {
        let mut merged = ModelBuilder::new(format)?;
        let earliest = parts.iter().filter_map(|p| p.clock.reference).min();
        merged.clock.reference = earliest;
        merged.clock.synthetic = parts.iter().any(|p| p.clock.synthetic);

        for mut part in parts {
            let delta = match (part.clock.synthetic, part.clock.reference, earliest) {
                (true, Some(reference), Some(earliest)) => millis_between(earliest, reference),
                _ => 0.0,
            };
            if delta != 0.0 {
                for event in part
                    .events
                    .iter_mut()
                    .chain(part.safepoints.iter_mut())
                    .chain(part.stalls.iter_mut())
                {
                    event.shift(delta);
                }
                part.last_seen = part.last_seen.map(|t| t + delta);
            }

            merged.events.append(&mut part.events);
            merged.safepoints.append(&mut part.safepoints);
            merged.stalls.append(&mut part.stalls);
            if let Some(seen) = part.last_seen {
                merged.observe(seen);
            }
            if let Some(threads) = part.parallel_threads {
                merged.note_parallel_threads(threads);
            }
            if let Some(threads) = part.concurrent_threads {
                merged.note_concurrent_threads(threads);
            }
            if merged.region_size.is_none() {
                merged.region_size = part.region_size;
            }
            merged.vm_options.extend(part.vm_options);
            merged.stats.absorb(&part.stats);
        }

        merged.sort_events();
        Ok(merged)
    }
}

fn compare_events(a: &GcEvent, b: &GcEvent) -> Ordering {
    match (a.id, b.id) {
        (Some(x), Some(y)) if x != y => x.cmp(&y),
        _ => a.start.total_cmp(&b.start),
    }
}
