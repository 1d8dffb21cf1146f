use super::collections;
use crate::analytics::diagnoser::{Diagnosis, DiagnosisContext, DiagnosisRule, Severity};
use crate::model::{CollectorFamily, EventKind, GcEvent, SpecialSituation};

/// Longest run of consecutive items matching `pred`, and where it starts.
fn longest_run<'a>(
    items: impl Iterator<Item = &'a GcEvent>,
    pred: impl Fn(&GcEvent) -> bool,
) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    let mut current: Option<(usize, f64)> = None;
    for item in items {
        if pred(item) {
            let (len, start) = current.unwrap_or((0, item.start));
            current = Some((len + 1, start));
            if best.map_or(true, |(b, _)| len + 1 > b) {
                best = current;
            }
        } else {
            current = None;
        }
    }
    best
}

/// Back-to-back full collections triggered by metaspace.
pub struct MetaspaceFullGcRule;

impl DiagnosisRule for MetaspaceFullGcRule {
    fn name(&self) -> &str {
        "metaspace_full_gc_run"
    }

    fn description(&self) -> &str {
        "Consecutive full collections caused by metaspace exhaustion"
    }

    fn diagnose(&self, ctx: &DiagnosisContext) -> Option<Diagnosis> {
        let (run, start) = longest_run(collections(ctx.model), |e| {
            e.kind.is_full() && e.cause.as_ref().is_some_and(|c| c.is_metaspace())
        })?;
        if run < ctx.config.metaspace_full_gc_run {
            return None;
        }
        Some(
            Diagnosis::new(
                self.name(),
                Severity::Critical,
                format!("{run} consecutive full collections were caused by metaspace"),
            )
            .suggest("Increase MaxMetaspaceSize")
            .suggest("Look for class loader leaks from repeated class generation or redeploys")
            .at(Some(start), run),
        )
    }
}

/// G1 concurrent cycles that keep restarting without reaching mixed
/// collections.
///
/// A restart shows up as a cycle that aborted its marking, or as cycles
/// and single young collections strictly alternating.
pub struct CycleRestartRule;

impl DiagnosisRule for CycleRestartRule {
    fn name(&self) -> &str {
        "g1_cycle_restart"
    }

    fn description(&self) -> &str {
        "G1 concurrent marking cycles restarting back to back"
    }

    fn diagnose(&self, ctx: &DiagnosisContext) -> Option<Diagnosis> {
        if ctx.model.format().family != CollectorFamily::G1 {
            return None;
        }
        let events = ctx.model.events();

        let aborted: Vec<&GcEvent> = events
            .iter()
            .filter(|e| e.has(SpecialSituation::ConcurrentMarkAborted))
            .collect();

        // cycles in the longest strict cycle/young alternation
        let mut best: Option<(usize, f64)> = None;
        let mut current: Option<(usize, f64)> = None;
        let mut youngs_since_cycle = 0usize;
        for event in events {
            match event.kind {
                EventKind::G1ConcurrentCycle | EventKind::G1ConcurrentUndoCycle => {
                    current = match current {
                        Some((n, start)) if youngs_since_cycle == 1 => Some((n + 1, start)),
                        _ => Some((1, event.start)),
                    };
                    youngs_since_cycle = 0;
                    if best.map_or(true, |(b, _)| current.is_some_and(|(c, _)| c > b)) {
                        best = current;
                    }
                }
                EventKind::YoungGc | EventKind::G1MixedGc | EventKind::FullGc => {
                    if event.kind != EventKind::YoungGc {
                        current = None;
                    }
                    youngs_since_cycle += 1;
                }
                _ => {}
            }
        }

        let alternating = best.filter(|(n, _)| *n >= ctx.config.cycle_restart_min_run);
        let (occurrences, first) = match (alternating, aborted.first()) {
            (Some((n, start)), _) => (n.max(aborted.len()), start),
            (None, Some(first)) => (aborted.len(), first.start),
            (None, None) => return None,
        };

        Some(
            Diagnosis::new(
                self.name(),
                Severity::Warning,
                "Concurrent marking cycles keep restarting without reclaiming old regions",
            )
            .suggest("Increase the heap size")
            .suggest("Raise InitiatingHeapOccupancyPercent or let adaptive IHOP settle")
            .suggest("Check for humongous objects filling old regions")
            .at(Some(first), occurrences),
        )
    }
}

/// Full collections making up too large a share of all collections.
pub struct FrequentFullGcRule;

impl DiagnosisRule for FrequentFullGcRule {
    fn name(&self) -> &str {
        "frequent_full_gc"
    }

    fn description(&self) -> &str {
        "More than a third of collections are full collections"
    }

    fn diagnose(&self, ctx: &DiagnosisContext) -> Option<Diagnosis> {
        let (mut total, mut full) = (0usize, 0usize);
        let mut first = None;
        for event in collections(ctx.model) {
            total += 1;
            if event.kind.is_full() {
                full += 1;
                first.get_or_insert(event.start);
            }
        }
        if full == 0 || full * 3 <= total {
            return None;
        }
        Some(
            Diagnosis::new(
                self.name(),
                Severity::Warning,
                format!("{full} of {total} collections were full collections"),
            )
            .suggest("Increase the heap or old generation size")
            .suggest("Check the causes of the full collections")
            .at(first, full),
        )
    }
}
