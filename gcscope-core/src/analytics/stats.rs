//! Statistics over a finished model.
//!
//! Every query takes a [`TimeRange`] of uptime milliseconds and looks the
//! range up in the start-ordered flat event list by binary search. Queries
//! that find nothing to measure return `None` (or empty collections)
//! instead of zeros.

use crate::model::{
    EventKind, EventRef, GcCause, GcEvent, GcModel, Generation, SpecialSituation,
};
use serde::Serialize;
use std::collections::BTreeMap;

/// Closed interval of uptime milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Zero-length and inverted ranges hold no data.
    pub fn is_empty(&self) -> bool {
        !(self.end > self.start)
    }

    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PauseStatistics {
    pub count: usize,
    pub total: f64,
    pub mean: f64,
    pub median: f64,
    pub p99: f64,
    pub max: f64,
    /// Share of the range spent paused, in percent
    pub pause_percent: f64,
    /// Share of the range not spent paused, in percent
    pub throughput: f64,
}

/// Count, mean, max and total of a set of durations.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DurationSummary {
    pub count: usize,
    pub average: Option<f64>,
    pub max: Option<f64>,
    pub total: f64,
}

#[derive(Debug, Clone, Default)]
struct DurationAcc {
    count: usize,
    known: usize,
    total: f64,
    max: Option<f64>,
}

impl DurationAcc {
    fn add(&mut self, value: Option<f64>) {
        self.count += 1;
        if let Some(value) = value {
            self.known += 1;
            self.total += value;
            self.max = Some(self.max.map_or(value, |m| m.max(value)));
        }
    }

    fn finish(self) -> DurationSummary {
        DurationSummary {
            count: self.count,
            average: (self.known > 0).then(|| self.total / self.known as f64),
            max: self.max,
            total: self.total,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Averager {
    sum: f64,
    n: usize,
}

impl Averager {
    fn add(&mut self, value: Option<f64>) {
        if let Some(value) = value {
            self.sum += value;
            self.n += 1;
        }
    }

    fn average(&self) -> Option<f64> {
        (self.n > 0).then(|| self.sum / self.n as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseStatistic {
    pub kind: EventKind,
    pub duration: DurationSummary,
    pub average_interval: Option<f64>,
}

/// Statistics for one parent kind and the phases seen under it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParentPhaseStatistics {
    pub parent: EventKind,
    pub duration: DurationSummary,
    pub average_interval: Option<f64>,
    pub phases: Vec<PhaseStatistic>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationStatistics {
    pub generation: Generation,
    pub capacity_average: Option<f64>,
    pub used_max: Option<i64>,
    /// Average used bytes after full collections
    pub after_full_average: Option<f64>,
    /// Average used bytes after collections of the old generation
    pub after_old_average: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectStatistics {
    pub allocation_total: Option<i64>,
    /// Bytes per ms over the range
    pub allocation_rate: Option<f64>,
    pub promotion_total: Option<i64>,
    pub promotion_rate: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Overview {
    pub kinds: BTreeMap<EventKind, usize>,
    pub special_situations: BTreeMap<SpecialSituation, usize>,
    pub causes: BTreeMap<GcCause, usize>,
}

/// Kinds whose memory afterwards shows what the old generation holds.
fn after_old_collection(kind: EventKind) -> bool {
    kind.collects_old()
        || matches!(
            kind,
            EventKind::G1Remark | EventKind::G1Cleanup | EventKind::CmsFinalRemark
        )
}

fn percentile(sorted: &[f64], fraction: f64) -> f64 {
    let rank = (fraction * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

fn median(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

impl GcModel {
    /// The whole span of the log.
    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(self.start_time, self.end_time)
    }

    /// Flat-list entries whose start lies in `range`.
    pub fn refs_in(&self, range: TimeRange) -> &[EventRef] {
        if range.is_empty() {
            return &[];
        }
        let start = |r: &EventRef| self.resolve(*r).start;
        let from = self.all_events.partition_point(|r| start(r) < range.start);
        let to = self.all_events.partition_point(|r| start(r) <= range.end);
        &self.all_events[from..to.max(from)]
    }

    /// Events and phases starting in `range`, in start order.
    pub fn events_in(&self, range: TimeRange) -> impl Iterator<Item = &GcEvent> + '_ {
        self.refs_in(range).iter().map(move |r| self.resolve(*r))
    }

    fn top_events_in(&self, range: TimeRange) -> impl Iterator<Item = &GcEvent> + '_ {
        self.refs_in(range)
            .iter()
            .filter(|r| !r.is_phase())
            .map(move |r| self.resolve(*r))
    }

    /// Pauses of every pause-counted kind starting in `range`.
    pub fn pause_statistics(&self, range: TimeRange) -> Option<PauseStatistics> {
        let mut pauses: Vec<f64> = self
            .events_in(range)
            .filter(|e| self.profile.counts_pause(e.kind))
            .filter_map(|e| e.pause)
            .collect();
        if pauses.is_empty() || range.is_empty() {
            return None;
        }
        pauses.sort_by(f64::total_cmp);

        let total: f64 = pauses.iter().sum();
        let pause_percent = (total / range.duration() * 100.0).min(100.0);
        Some(PauseStatistics {
            count: pauses.len(),
            total,
            mean: total / pauses.len() as f64,
            median: median(&pauses),
            p99: percentile(&pauses, 0.99),
            max: pauses[pauses.len() - 1],
            pause_percent,
            throughput: 100.0 - pause_percent,
        })
    }

    /// Per parent kind: the parent's durations and intervals and those of
    /// each phase kind under it.
    pub fn phase_statistics(&self, range: TimeRange) -> Vec<ParentPhaseStatistics> {
        struct Acc {
            duration: DurationAcc,
            interval: Averager,
            phases: BTreeMap<EventKind, (DurationAcc, Averager)>,
        }

        let mut parents: BTreeMap<EventKind, Acc> = BTreeMap::new();
        for event in self.top_events_in(range).filter(|e| !e.phases.is_empty()) {
            let acc = parents.entry(event.kind).or_insert_with(|| Acc {
                duration: DurationAcc::default(),
                interval: Averager::default(),
                phases: BTreeMap::new(),
            });
            acc.duration.add(event.duration);
            acc.interval.add(event.interval);
            for phase in &event.phases {
                let (duration, interval) = acc.phases.entry(phase.kind).or_default();
                duration.add(phase.duration);
                interval.add(phase.interval);
            }
        }

        parents
            .into_iter()
            .map(|(parent, acc)| ParentPhaseStatistics {
                parent,
                duration: acc.duration.finish(),
                average_interval: acc.interval.average(),
                phases: acc
                    .phases
                    .into_iter()
                    .map(|(kind, (duration, interval))| PhaseStatistic {
                        kind,
                        duration: duration.finish(),
                        average_interval: interval.average(),
                    })
                    .collect(),
            })
            .collect()
    }

    /// Per generation capacity and usage over `range`.
    pub fn memory_statistics(&self, range: TimeRange) -> Vec<GenerationStatistics> {
        #[derive(Default)]
        struct Acc {
            capacity: Averager,
            used_max: Option<i64>,
            after_full: Averager,
            after_old: Averager,
        }

        let mut generations: BTreeMap<Generation, Acc> = BTreeMap::new();
        for event in self.events_in(range) {
            for item in event.memory.iter() {
                let acc = generations.entry(item.generation).or_default();
                acc.capacity.add(item.post_capacity.map(|c| c as f64));
                for used in [item.pre_used, item.post_used].into_iter().flatten() {
                    acc.used_max = Some(acc.used_max.map_or(used, |m| m.max(used)));
                }
                let post = item.post_used.map(|u| u as f64);
                if event.kind.is_full() {
                    acc.after_full.add(post);
                }
                if after_old_collection(event.kind) {
                    acc.after_old.add(post);
                }
            }
        }

        generations
            .into_iter()
            .map(|(generation, acc)| GenerationStatistics {
                generation,
                capacity_average: acc.capacity.average(),
                used_max: acc.used_max,
                after_full_average: acc.after_full.average(),
                after_old_average: acc.after_old.average(),
            })
            .collect()
    }

    /// Allocation and promotion totals and rates over `range`.
    pub fn object_statistics(&self, range: TimeRange) -> ObjectStatistics {
        let mut allocation: Option<i64> = None;
        let mut promotion: Option<i64> = None;
        for event in self.top_events_in(range) {
            if let Some(bytes) = event.allocation {
                allocation = Some(allocation.unwrap_or(0) + bytes);
            }
            if let Some(bytes) = event.promotion {
                promotion = Some(promotion.unwrap_or(0) + bytes);
            }
        }
        let rate = |total: Option<i64>| {
            total
                .filter(|_| !range.is_empty())
                .map(|t| t as f64 / range.duration())
        };
        ObjectStatistics {
            allocation_total: allocation,
            allocation_rate: rate(allocation),
            promotion_total: promotion,
            promotion_rate: rate(promotion),
        }
    }

    /// Counts of kinds, special situations and causes over the whole log.
    pub fn overview(&self) -> Overview {
        let mut overview = Overview::default();
        for (_, event) in self.iter_all() {
            *overview.kinds.entry(event.kind).or_default() += 1;
            for situation in &event.special_situations {
                *overview.special_situations.entry(*situation).or_default() += 1;
            }
        }
        for event in self.stalls.iter().chain(self.safepoints.iter()) {
            *overview.kinds.entry(event.kind).or_default() += 1;
        }
        for cause in self.events.iter().filter_map(|e| e.cause.as_ref()) {
            *overview.causes.entry(cause.clone()).or_default() += 1;
        }
        overview
    }
}
