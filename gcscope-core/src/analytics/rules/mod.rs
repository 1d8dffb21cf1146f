//! Built-in diagnosis rules.
//!
//! - `situation`: special situations and notable causes
//! - `sequence`: patterns over the order of collections
//! - `pause`: pause length, overhead and allocation stalls
//! - `memory`: sudden changes in generation sizing

mod memory;
mod pause;
mod sequence;
mod situation;

pub use memory::YoungGenShrinkRule;
pub use pause::{AllocationStallRule, HighGcOverheadRule, LongPauseRule};
pub use sequence::{CycleRestartRule, FrequentFullGcRule, MetaspaceFullGcRule};
pub use situation::{CauseRule, SituationRule};

use super::diagnoser::{Diagnoser, DiagnosisRule};
use crate::config::DiagnoserConfig;
use crate::model::{GcEvent, GcModel};

/// Top-level stop-the-world collections in start order.
pub(crate) fn collections(model: &GcModel) -> impl Iterator<Item = &GcEvent> + '_ {
    model
        .events()
        .iter()
        .filter(|e| e.kind.is_young() || e.kind.is_full())
}

/// Every built-in rule, in reporting order.
pub fn builtin_rules() -> Vec<Box<dyn DiagnosisRule>> {
    vec![
        Box::new(MetaspaceFullGcRule),
        Box::new(CycleRestartRule),
        Box::new(YoungGenShrinkRule),
        Box::new(CauseRule::explicit_gc()),
        Box::new(SituationRule::to_space_exhausted()),
        Box::new(SituationRule::promotion_failed()),
        Box::new(SituationRule::concurrent_mode_failure()),
        Box::new(CauseRule::humongous_allocation()),
        Box::new(LongPauseRule),
        Box::new(AllocationStallRule),
        Box::new(HighGcOverheadRule),
        Box::new(FrequentFullGcRule),
    ]
}

/// Create a diagnoser with every built-in rule registered.
pub fn create_default_diagnoser(config: DiagnoserConfig) -> Diagnoser {
    let mut diagnoser = Diagnoser::new(config);
    for rule in builtin_rules() {
        diagnoser.register(rule);
    }
    diagnoser
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::model::{CollectorFamily, GcEvent, GcModel, LogFormat, LogStyle, ModelBuilder};
    use crate::pipeline;

    /// Run events through the pipeline as a log of `family`.
    pub fn model_of(family: CollectorFamily, events: Vec<GcEvent>, last_seen: f64) -> GcModel {
        let mut b = ModelBuilder::new(LogFormat::new(family, LogStyle::Unified)).unwrap();
        for event in events {
            b.push_event(event);
        }
        b.observe(last_seen);
        pipeline::run(b).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_diagnoser_has_every_rule() {
        let diagnoser = create_default_diagnoser(DiagnoserConfig::default());
        let names = diagnoser.rule_names();
        assert_eq!(names.len(), 12);
        for name in [
            "metaspace_full_gc_run",
            "g1_cycle_restart",
            "young_gen_shrink",
            "explicit_gc",
            "to_space_exhausted",
            "promotion_failed",
            "concurrent_mode_failure",
            "humongous_allocation",
            "long_pause",
            "allocation_stall",
            "high_gc_overhead",
            "frequent_full_gc",
        ] {
            assert!(diagnoser.has_rule(name), "{name}");
        }
    }
}
