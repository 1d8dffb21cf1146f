//! Projection of a model into labelled time-series samples.

use super::metrics_registry::{
    GC_CPU_MS, GC_MEMORY_CAPACITY_BYTES, GC_MEMORY_USED_AFTER_BYTES,
    GC_MEMORY_USED_BEFORE_BYTES, GC_PAUSE_MS, GC_PHASE_DURATION_MS,
};
use super::stats::TimeRange;
use crate::model::{GcEvent, GcModel};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// One labelled observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSample {
    pub name: &'static str,
    pub labels: BTreeMap<&'static str, String>,
    /// Ms since JVM start
    pub uptime: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub value: f64,
}

impl MetricSample {
    fn new(name: &'static str, event: &GcEvent, value: f64) -> Self {
        Self {
            name,
            labels: BTreeMap::new(),
            uptime: event.start,
            timestamp: event.timestamp,
            value,
        }
    }

    fn label(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.labels.insert(key, value.into());
        self
    }

    pub fn get_label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

impl GcModel {
    /// Samples for every event and phase starting in `range`, in start
    /// order. Unknown quantities produce no sample.
    pub fn metrics(&self, range: TimeRange) -> Vec<MetricSample> {
        let mut samples = Vec::new();
        for r in self.refs_in(range) {
            let event = self.resolve(*r);
            let kind = event.kind.name();

            if self.profile.counts_pause(event.kind) {
                if let Some(pause) = event.pause {
                    let cause = self
                        .events
                        .get(r.event)
                        .and_then(|top| top.cause.as_ref())
                        .map(|c| c.as_str().to_string())
                        .unwrap_or_default();
                    samples.push(
                        MetricSample::new(GC_PAUSE_MS, event, pause)
                            .label("kind", kind)
                            .label("cause", cause),
                    );
                }
            }

            if r.is_phase() {
                if let Some(duration) = event.duration {
                    let parent = self.events[r.event].kind.name();
                    samples.push(
                        MetricSample::new(GC_PHASE_DURATION_MS, event, duration)
                            .label("parent", parent)
                            .label("phase", kind),
                    );
                }
                continue;
            }

            for item in event.memory.iter() {
                let generation = item.generation.name();
                let series = [
                    (GC_MEMORY_USED_BEFORE_BYTES, item.pre_used),
                    (GC_MEMORY_USED_AFTER_BYTES, item.post_used),
                    (GC_MEMORY_CAPACITY_BYTES, item.post_capacity),
                ];
                for (name, bytes) in series {
                    if let Some(bytes) = bytes {
                        samples.push(
                            MetricSample::new(name, event, bytes as f64)
                                .label("kind", kind)
                                .label("generation", generation),
                        );
                    }
                }
            }

            if let Some(cpu) = event.cpu {
                for (mode, value) in [("user", cpu.user), ("sys", cpu.sys), ("real", cpu.real)] {
                    samples.push(
                        MetricSample::new(GC_CPU_MS, event, value)
                            .label("kind", kind)
                            .label("mode", mode),
                    );
                }
            }
        }
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        CollectorFamily, CpuTime, EventKind, GcCause, Generation, LogFormat, LogStyle, MemoryItem,
        ModelBuilder,
    };
    use crate::pipeline;

    const M: i64 = 1024 * 1024;

    fn model() -> GcModel {
        let format = LogFormat::new(CollectorFamily::Cms, LogStyle::Legacy);
        let mut b = ModelBuilder::new(format).unwrap();
        let mut young = GcEvent::new(EventKind::YoungGc, 100.0)
            .with_duration(Some(5.0))
            .with_cause(Some(GcCause::new("Allocation Failure")));
        young.put_memory(MemoryItem::with_change(
            Generation::Young,
            Some(30 * M),
            Some(2 * M),
            Some(40 * M),
        ));
        young.cpu = Some(CpuTime {
            user: 8.0,
            sys: 1.0,
            real: 5.0,
        });
        b.push_event(young);

        let mut cycle =
            GcEvent::new(EventKind::CmsConcurrentCycle, 200.0).with_duration(Some(50.0));
        cycle
            .phases
            .push(GcEvent::new(EventKind::CmsInitialMark, 200.0).with_duration(Some(1.0)));
        cycle
            .phases
            .push(GcEvent::new(EventKind::CmsConcurrentMark, 201.0).with_duration(Some(20.0)));
        b.push_event(cycle);
        b.observe(400.0);
        pipeline::run(b).unwrap()
    }

    #[test]
    fn test_samples_per_series() {
        let model = model();
        let samples = model.metrics(model.time_range());
        let count = |name: &str| samples.iter().filter(|s| s.name == name).count();

        assert_eq!(count(GC_PAUSE_MS), 2);
        assert_eq!(count(GC_CPU_MS), 3);
        assert_eq!(count(GC_PHASE_DURATION_MS), 2);
        assert_eq!(count(GC_MEMORY_USED_BEFORE_BYTES), 1);
        assert_eq!(count(GC_MEMORY_CAPACITY_BYTES), 1);

        let pause = samples.iter().find(|s| s.name == GC_PAUSE_MS).unwrap();
        assert_eq!(pause.get_label("kind"), Some("Young GC"));
        assert_eq!(pause.get_label("cause"), Some("Allocation Failure"));
        assert_eq!(pause.value, 5.0);

        let phase = samples
            .iter()
            .find(|s| {
                s.name == GC_PHASE_DURATION_MS && s.get_label("phase") == Some("Concurrent Mark")
            })
            .unwrap();
        assert_eq!(phase.get_label("parent"), Some("CMS"));
        assert_eq!(phase.value, 20.0);
    }

    #[test]
    fn test_range_limits_samples() {
        let model = model();
        assert!(model.metrics(TimeRange::new(150.0, 160.0)).is_empty());
        let late = model.metrics(TimeRange::new(150.0, 400.0));
        assert!(late.iter().all(|s| s.uptime >= 200.0));
    }
}
