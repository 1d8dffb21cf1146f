use super::collections;
use crate::analytics::diagnoser::{Diagnosis, DiagnosisContext, DiagnosisRule, Severity};
use crate::format::format_bytes;
use crate::model::Generation;

/// Young capacity dropping sharply while the heap capacity stays put.
///
/// The old generation took the space, which usually means the heap is
/// too small for the live set and the collector is squeezing young.
pub struct YoungGenShrinkRule;

impl DiagnosisRule for YoungGenShrinkRule {
    fn name(&self) -> &str {
        "young_gen_shrink"
    }

    fn description(&self) -> &str {
        "Sudden young generation shrink at constant heap capacity"
    }

    fn diagnose(&self, ctx: &DiagnosisContext) -> Option<Diagnosis> {
        let ratio = ctx.config.heap_shrink_ratio;
        let capacities = collections(ctx.model).filter_map(|e| {
            let young = e.memory.get(Generation::Young)?.post_capacity?;
            let total = e.memory.get(Generation::Total)?.post_capacity?;
            Some((e.start, young, total))
        });

        let mut previous: Option<(i64, i64)> = None;
        let mut first: Option<(f64, i64, i64)> = None;
        let mut count = 0;
        for (start, young, total) in capacities {
            if let Some((prev_young, prev_total)) = previous {
                let shrunk = prev_young > 0 && (young as f64) < prev_young as f64 * ratio;
                if shrunk && total == prev_total {
                    count += 1;
                    first.get_or_insert((start, prev_young, young));
                }
            }
            previous = Some((young, total));
        }

        let (start, from, to) = first?;
        Some(
            Diagnosis::new(
                self.name(),
                Severity::Warning,
                format!(
                    "Young generation shrank from {} to {} while heap capacity stayed the same",
                    format_bytes(from),
                    format_bytes(to)
                ),
            )
            .suggest("Increase the heap size so the old generation has room for the live set")
            .suggest("Set a minimum young size with NewSize or G1NewSizePercent")
            .at(Some(start), count),
        )
    }
}
