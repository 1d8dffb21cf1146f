//! Metrics registry for discovery and documentation.

use serde::Serialize;

/// Type of metric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricValueType {
    Integer,
    Float,
}

impl MetricValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricValueType::Integer => "integer",
            MetricValueType::Float => "float",
        }
    }
}

/// Descriptor for a metric series produced by [`GcModel::metrics`].
///
/// [`GcModel::metrics`]: crate::model::GcModel::metrics
#[derive(Debug, Clone, Serialize)]
pub struct MetricDescriptor {
    pub name: &'static str,
    pub labels: &'static [&'static str],
    pub value_type: MetricValueType,
    pub summary: &'static str,
    pub description: &'static str,
}

pub const GC_PAUSE_MS: &str = "gc_pause_ms";
pub const GC_MEMORY_USED_BEFORE_BYTES: &str = "gc_memory_used_before_bytes";
pub const GC_MEMORY_USED_AFTER_BYTES: &str = "gc_memory_used_after_bytes";
pub const GC_MEMORY_CAPACITY_BYTES: &str = "gc_memory_capacity_bytes";
pub const GC_CPU_MS: &str = "gc_cpu_ms";
pub const GC_PHASE_DURATION_MS: &str = "gc_phase_duration_ms";

const ALL_METRICS: &[MetricDescriptor] = &[
    MetricDescriptor {
        name: GC_PAUSE_MS,
        labels: &["kind", "cause"],
        value_type: MetricValueType::Float,
        summary: "Stop-the-world pause of one event.",
        description: "Pause time in ms of every pause-counted event or phase. \
                      The cause label is empty when the log does not name one.",
    },
    MetricDescriptor {
        name: GC_MEMORY_USED_BEFORE_BYTES,
        labels: &["kind", "generation"],
        value_type: MetricValueType::Integer,
        summary: "Used bytes of a generation before a collection.",
        description: "One sample per top-level event and generation with a known size before.",
    },
    MetricDescriptor {
        name: GC_MEMORY_USED_AFTER_BYTES,
        labels: &["kind", "generation"],
        value_type: MetricValueType::Integer,
        summary: "Used bytes of a generation after a collection.",
        description: "One sample per top-level event and generation with a known size after.",
    },
    MetricDescriptor {
        name: GC_MEMORY_CAPACITY_BYTES,
        labels: &["kind", "generation"],
        value_type: MetricValueType::Integer,
        summary: "Capacity of a generation after a collection.",
        description: "One sample per top-level event and generation with a known capacity.",
    },
    MetricDescriptor {
        name: GC_CPU_MS,
        labels: &["kind", "mode"],
        value_type: MetricValueType::Float,
        summary: "CPU time reported for a collection.",
        description: "The user, sys and real figures of an event's CPU line, one sample per mode.",
    },
    MetricDescriptor {
        name: GC_PHASE_DURATION_MS,
        labels: &["parent", "phase"],
        value_type: MetricValueType::Float,
        summary: "Duration of one phase.",
        description: "Wall-clock duration in ms of every phase with a known duration.",
    },
];

/// List all registered metrics.
pub fn list_metrics() -> Vec<MetricDescriptor> {
    ALL_METRICS.to_vec()
}

/// Look up a metric by name.
pub fn find_metric(name: &str) -> Option<&'static MetricDescriptor> {
    ALL_METRICS.iter().find(|m| m.name == name)
}

/// List metrics that carry a given label.
pub fn list_metrics_with_label(label: &str) -> Vec<MetricDescriptor> {
    ALL_METRICS
        .iter()
        .filter(|m| m.labels.contains(&label))
        .cloned()
        .collect()
}
