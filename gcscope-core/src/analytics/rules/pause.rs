use crate::analytics::diagnoser::{Diagnosis, DiagnosisContext, DiagnosisRule, Severity};
use crate::format::{format_ms, format_percent};
use crate::model::EventKind;

/// Individual pauses above the configured threshold.
pub struct LongPauseRule;

impl DiagnosisRule for LongPauseRule {
    fn name(&self) -> &str {
        "long_pause"
    }

    fn description(&self) -> &str {
        "Stop-the-world pauses longer than the configured threshold"
    }

    fn diagnose(&self, ctx: &DiagnosisContext) -> Option<Diagnosis> {
        let model = ctx.model;
        let threshold = ctx.config.long_pause_ms;
        let mut first = None;
        let mut longest = 0.0f64;
        let mut count = 0;
        for (_, event) in model.iter_all() {
            if !model.profile().counts_pause(event.kind) {
                continue;
            }
            let Some(pause) = event.pause.filter(|p| *p > threshold) else {
                continue;
            };
            count += 1;
            longest = longest.max(pause);
            first.get_or_insert(event.start);
        }
        if count == 0 {
            return None;
        }
        Some(
            Diagnosis::new(
                self.name(),
                Severity::Warning,
                format!(
                    "{count} pauses exceeded {}, the longest took {}",
                    format_ms(threshold),
                    format_ms(longest)
                ),
            )
            .suggest("Check the phases of the longest pauses for the dominant cost")
            .suggest(
                "Set a pause-time goal with MaxGCPauseMillis or consider a low-latency collector",
            )
            .at(first, count),
        )
    }
}

/// Application threads stalled waiting for memory.
pub struct AllocationStallRule;

impl DiagnosisRule for AllocationStallRule {
    fn name(&self) -> &str {
        "allocation_stall"
    }

    fn description(&self) -> &str {
        "Allocation stalls or out-of-memory reports"
    }

    fn diagnose(&self, ctx: &DiagnosisContext) -> Option<Diagnosis> {
        let stalls = ctx.model.stalls();
        let first = stalls.first()?;
        let oom = stalls
            .iter()
            .filter(|e| e.kind == EventKind::ZgcOutOfMemory)
            .count();

        let (severity, problem) = if oom > 0 {
            (
                Severity::Critical,
                format!(
                    "{} allocation stalls and {oom} out-of-memory reports",
                    stalls.len() - oom
                ),
            )
        } else {
            (
                Severity::Warning,
                format!("{} allocation stalls", stalls.len()),
            )
        };
        Some(
            Diagnosis::new(self.name(), severity, problem)
                .suggest("Increase the heap size")
                .suggest("Increase ConcGCThreads so collection keeps up with allocation")
                .at(Some(first.start), stalls.len()),
        )
    }
}

/// Too much wall-clock time spent paused.
pub struct HighGcOverheadRule;

impl DiagnosisRule for HighGcOverheadRule {
    fn name(&self) -> &str {
        "high_gc_overhead"
    }

    fn description(&self) -> &str {
        "Share of time spent in pauses above the configured threshold"
    }

    fn diagnose(&self, ctx: &DiagnosisContext) -> Option<Diagnosis> {
        let model = ctx.model;
        let stats = model.pause_statistics(model.time_range())?;
        if stats.pause_percent <= ctx.config.high_overhead_percent {
            return None;
        }
        Some(
            Diagnosis::new(
                self.name(),
                Severity::Warning,
                format!(
                    "{} of the time was spent in pauses",
                    format_percent(stats.pause_percent)
                ),
            )
            .suggest("Increase the heap size")
            .suggest("Reduce the allocation rate of the application")
            .at(Some(model.start_time()), stats.count),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::rules::testing::model_of;
    use crate::config::DiagnoserConfig;
    use crate::model::{
        CollectorFamily, GcEvent, GcModel, LogFormat, LogStyle, ModelBuilder,
    };
    use crate::pipeline;

    fn young(start: f64, duration: f64) -> GcEvent {
        GcEvent::new(EventKind::YoungGc, start).with_duration(Some(duration))
    }

    fn run(
        rule: &dyn DiagnosisRule,
        model: &GcModel,
        config: &DiagnoserConfig,
    ) -> Option<Diagnosis> {
        rule.diagnose(&DiagnosisContext { model, config })
    }

    #[test]
    fn test_long_pause() {
        let model = model_of(
            CollectorFamily::Parallel,
            vec![young(0.0, 20.0), young(1000.0, 1500.0), young(5000.0, 1200.0)],
            10_000.0,
        );
        let config = DiagnoserConfig::default();
        let diagnosis = run(&LongPauseRule, &model, &config).unwrap();
        assert_eq!(diagnosis.occurrences, 2);
        assert_eq!(diagnosis.first_event, Some(1000.0));
        assert!(diagnosis.problem.contains("1500.000ms"));

        let relaxed = DiagnoserConfig {
            long_pause_ms: 2000.0,
            ..DiagnoserConfig::default()
        };
        assert!(run(&LongPauseRule, &model, &relaxed).is_none());
    }

    #[test]
    fn test_high_gc_overhead() {
        let config = DiagnoserConfig::default();
        let busy = model_of(
            CollectorFamily::Serial,
            vec![young(0.0, 100.0), young(400.0, 100.0)],
            1000.0,
        );
        let diagnosis = run(&HighGcOverheadRule, &busy, &config).unwrap();
        assert_eq!(diagnosis.problem, "20.00% of the time was spent in pauses");

        let idle = model_of(
            CollectorFamily::Serial,
            vec![young(0.0, 10.0), young(400.0, 10.0)],
            1000.0,
        );
        assert!(run(&HighGcOverheadRule, &idle, &config).is_none());
    }

    #[test]
    fn test_allocation_stall() {
        let config = DiagnoserConfig::default();
        let mut b =
            ModelBuilder::new(LogFormat::new(CollectorFamily::Zgc, LogStyle::Unified)).unwrap();
        b.push_stall(GcEvent::new(EventKind::ZgcAllocationStall, 50.0).with_duration(Some(3.0)));
        b.push_stall(GcEvent::new(EventKind::ZgcOutOfMemory, 80.0).with_duration(Some(0.0)));
        b.observe(100.0);
        let model = pipeline::run(b).unwrap();

        let diagnosis = run(&AllocationStallRule, &model, &config).unwrap();
        assert_eq!(diagnosis.severity, Severity::Critical);
        assert_eq!(diagnosis.occurrences, 2);
        assert_eq!(diagnosis.first_event, Some(50.0));

        let calm = model_of(CollectorFamily::Zgc, vec![], 100.0);
        assert!(run(&AllocationStallRule, &calm, &config).is_none());
    }
}
