use crate::analytics::diagnoser::{Diagnosis, DiagnosisContext, DiagnosisRule, Severity};
use crate::model::{GcCause, GcEvent, SpecialSituation};

/// Reports events flagged with a special situation.
pub struct SituationRule {
    name: &'static str,
    situation: SpecialSituation,
    /// Cause that replaces the flag once the pipeline reclassifies the event
    cause: Option<&'static str>,
    severity: Severity,
    problem: &'static str,
    suggestions: &'static [&'static str],
}

impl SituationRule {
    pub fn to_space_exhausted() -> Self {
        Self {
            name: "to_space_exhausted",
            situation: SpecialSituation::ToSpaceExhausted,
            cause: None,
            severity: Severity::Critical,
            problem: "Evacuation ran out of free regions (to-space exhausted)",
            suggestions: &[
                "Increase the heap size",
                "Raise G1ReservePercent to keep more regions free for evacuation",
                "Start marking earlier by lowering InitiatingHeapOccupancyPercent",
            ],
        }
    }

    pub fn promotion_failed() -> Self {
        Self {
            name: "promotion_failed",
            situation: SpecialSituation::PromotionFailed,
            cause: Some(GcCause::PROMOTION_FAILED),
            severity: Severity::Critical,
            problem: "Young collection could not promote objects into old generation",
            suggestions: &[
                "Increase the old generation or the whole heap",
                "Start old generation collection earlier",
                "Look for fragmentation caused by large objects",
            ],
        }
    }

    pub fn concurrent_mode_failure() -> Self {
        Self {
            name: "concurrent_mode_failure",
            situation: SpecialSituation::ConcurrentModeFailure,
            cause: None,
            severity: Severity::Critical,
            problem: "Concurrent collection could not finish before old generation filled up",
            suggestions: &[
                "Lower CMSInitiatingOccupancyFraction and set UseCMSInitiatingOccupancyOnly",
                "Increase the old generation",
                "Increase ConcGCThreads",
            ],
        }
    }

    fn matches(&self, event: &GcEvent) -> bool {
        event.has(self.situation)
            || self
                .cause
                .is_some_and(|c| event.cause.as_ref().is_some_and(|e| e.as_str() == c))
    }
}

impl DiagnosisRule for SituationRule {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.problem
    }

    fn diagnose(&self, ctx: &DiagnosisContext) -> Option<Diagnosis> {
        let mut matching = ctx
            .model
            .iter_all()
            .map(|(_, e)| e)
            .filter(|e| self.matches(e));
        let first = matching.next()?;
        let occurrences = 1 + matching.count();
        if occurrences < ctx.config.special_situation_min_count {
            return None;
        }

        let mut diagnosis = Diagnosis::new(self.name, self.severity, self.problem)
            .at(Some(first.start), occurrences);
        for suggestion in self.suggestions {
            diagnosis = diagnosis.suggest(*suggestion);
        }
        Some(diagnosis)
    }
}

/// Reports top-level events with a notable cause.
pub struct CauseRule {
    name: &'static str,
    predicate: fn(&GcCause) -> bool,
    severity: Severity,
    problem: &'static str,
    suggestions: &'static [&'static str],
}

impl CauseRule {
    pub fn explicit_gc() -> Self {
        Self {
            name: "explicit_gc",
            predicate: GcCause::is_explicit,
            severity: Severity::Warning,
            problem: "Collections were requested explicitly (System.gc() or heap inspection)",
            suggestions: &[
                "Find and remove System.gc() calls",
                "Use DisableExplicitGC or ExplicitGCInvokesConcurrent",
            ],
        }
    }

    pub fn humongous_allocation() -> Self {
        Self {
            name: "humongous_allocation",
            predicate: GcCause::is_humongous,
            severity: Severity::Warning,
            problem: "Humongous allocations triggered collections",
            suggestions: &[
                "Increase G1HeapRegionSize so the objects are no longer humongous",
                "Reduce the size of large arrays allocated by the application",
            ],
        }
    }
}

impl DiagnosisRule for CauseRule {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.problem
    }

    fn diagnose(&self, ctx: &DiagnosisContext) -> Option<Diagnosis> {
        let mut matching = ctx
            .model
            .events()
            .iter()
            .filter(|e| e.cause.as_ref().is_some_and(self.predicate));
        let first = matching.next()?;
        let occurrences = 1 + matching.count();
        if occurrences < ctx.config.special_situation_min_count {
            return None;
        }

        let mut diagnosis = Diagnosis::new(self.name, self.severity, self.problem)
            .at(Some(first.start), occurrences);
        for suggestion in self.suggestions {
            diagnosis = diagnosis.suggest(*suggestion);
        }
        Some(diagnosis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::rules::testing::model_of;
    use crate::config::DiagnoserConfig;
    use crate::model::{CollectorFamily, EventKind};

    fn young(start: f64, cause: &str) -> GcEvent {
        GcEvent::new(EventKind::YoungGc, start)
            .with_duration(Some(2.0))
            .with_cause(Some(GcCause::new(cause)))
    }

    #[test]
    fn test_to_space_exhausted_reports_first_event() {
        let mut exhausted = young(300.0, GcCause::G1_EVACUATION_PAUSE);
        exhausted.mark(SpecialSituation::ToSpaceExhausted);
        let model = model_of(
            CollectorFamily::G1,
            vec![young(100.0, GcCause::G1_EVACUATION_PAUSE), exhausted],
            400.0,
        );
        let config = DiagnoserConfig::default();
        let ctx = DiagnosisContext {
            model: &model,
            config: &config,
        };
        let diagnosis = SituationRule::to_space_exhausted().diagnose(&ctx).unwrap();
        assert_eq!(diagnosis.first_event, Some(300.0));
        assert_eq!(diagnosis.occurrences, 1);
        assert_eq!(diagnosis.severity, Severity::Critical);
    }

    #[test]
    fn test_promotion_failed_matches_reclassified_cause() {
        let mut failed = young(100.0, GcCause::ALLOCATION_FAILURE);
        failed.mark(SpecialSituation::PromotionFailed);
        let model = model_of(CollectorFamily::Parallel, vec![failed], 200.0);
        assert_eq!(model.events()[0].kind, EventKind::FullGc);

        let config = DiagnoserConfig::default();
        let ctx = DiagnosisContext {
            model: &model,
            config: &config,
        };
        assert!(SituationRule::promotion_failed().diagnose(&ctx).is_some());
        assert!(SituationRule::concurrent_mode_failure().diagnose(&ctx).is_none());
    }

    #[test]
    fn test_cause_rule_respects_min_count() {
        let model = model_of(
            CollectorFamily::G1,
            vec![
                young(100.0, GcCause::SYSTEM_GC),
                young(200.0, GcCause::G1_HUMONGOUS_ALLOCATION),
            ],
            300.0,
        );
        let config = DiagnoserConfig {
            special_situation_min_count: 2,
            ..DiagnoserConfig::default()
        };
        let ctx = DiagnosisContext {
            model: &model,
            config: &config,
        };
        assert!(CauseRule::explicit_gc().diagnose(&ctx).is_none());

        let config = DiagnoserConfig::default();
        let ctx = DiagnosisContext {
            model: &model,
            config: &config,
        };
        let explicit = CauseRule::explicit_gc().diagnose(&ctx).unwrap();
        assert_eq!(explicit.first_event, Some(100.0));
        let humongous = CauseRule::humongous_allocation().diagnose(&ctx).unwrap();
        assert_eq!(humongous.first_event, Some(200.0));
    }
}
