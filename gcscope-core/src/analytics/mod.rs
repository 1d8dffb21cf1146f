//! Analytics over a finished [`GcModel`](crate::model::GcModel).
//!
//! - [`stats`]: pause, phase, memory and object statistics over a time range
//! - [`metrics`]: labelled time-series samples, described by [`metrics_registry`]
//! - [`diagnoser`]: the rule engine, with the built-in rules in [`rules`]

pub mod diagnoser;
pub mod metrics;
pub mod metrics_registry;
pub mod rules;
pub mod stats;

pub use diagnoser::{Diagnoser, Diagnosis, DiagnosisContext, DiagnosisRule, Severity};
pub use metrics::MetricSample;
pub use metrics_registry::{list_metrics, MetricDescriptor, MetricValueType};
pub use rules::{builtin_rules, create_default_diagnoser};
pub use stats::{
    DurationSummary, GenerationStatistics, ObjectStatistics, Overview, ParentPhaseStatistics,
    PauseStatistics, PhaseStatistic, TimeRange,
};
