//! Region counts to bytes.
//!
//! Unified G1 logs print per-generation usage as region counts. The
//! region byte size is either declared in the log or inferred from
//! collections whose heap total was printed in bytes.

use crate::model::{GcEvent, Generation, MemoryItem};

const REGION_GENERATIONS: &[Generation] = &[
    Generation::Eden,
    Generation::Survivor,
    Generation::Old,
    Generation::Humongous,
    Generation::Archive,
];

fn has_regions(event: &GcEvent) -> bool {
    event.raw_memory.iter().any(|m| m.in_regions)
}

fn region_sum(event: &GcEvent, side: fn(&MemoryItem) -> Option<i64>) -> Option<i64> {
    let mut sum = 0;
    let mut seen = false;
    for item in event
        .raw_memory
        .iter()
        .filter(|m| m.in_regions && REGION_GENERATIONS.contains(&m.generation))
    {
        sum += side(item)?;
        seen = true;
    }
    seen.then_some(sum)
}

/// Infer the region size from the largest bytes-per-region ratio seen.
///
/// Used bytes never exceed the regions they occupy, so the ratio is at
/// most the true size and rounding up to a power of two recovers it.
pub(super) fn infer_region_size(events: &[GcEvent]) -> Option<i64> {
    let mut ratio: Option<f64> = None;
    for event in events.iter().filter(|e| has_regions(e)) {
        let Some(total) = event.raw(Generation::Total) else {
            continue;
        };
        let sides: [(Option<i64>, fn(&MemoryItem) -> Option<i64>); 2] = [
            (total.pre_used, |m| m.pre_used),
            (total.post_used, |m| m.post_used),
        ];
        for (bytes, side) in sides {
            let (Some(bytes), Some(regions)) = (bytes, region_sum(event, side)) else {
                continue;
            };
            if regions > 0 && bytes > 0 {
                let candidate = bytes as f64 / regions as f64;
                ratio = Some(ratio.map_or(candidate, |r| r.max(candidate)));
            }
        }
    }
    let ratio = ratio?;
    let size = (ratio.ceil() as u64).next_power_of_two();
    i64::try_from(size).ok()
}

/// Rewrite region-count items of `event` and its phases as bytes.
/// A byte item already printed for the same generation keeps its values.
pub(super) fn convert(event: &mut GcEvent, region_size: i64) {
    for phase in &mut event.phases {
        convert_items(phase, region_size);
    }
    convert_items(event, region_size);
}

fn convert_items(event: &mut GcEvent, region_size: i64) {
    if !has_regions(event) {
        return;
    }
    let regions: Vec<MemoryItem> = event
        .raw_memory
        .iter()
        .filter(|m| m.in_regions)
        .copied()
        .collect();
    event.raw_memory.retain(|m| !m.in_regions);
    for item in regions {
        let bytes = item.scaled(region_size);
        match event.raw_mut(item.generation) {
            Some(existing) => existing.fill_unknown(&bytes),
            None => event.raw_memory.push(bytes),
        }
    }
}

/// Whether any event still carries region counts.
pub(super) fn any_regions(events: &[GcEvent]) -> bool {
    events
        .iter()
        .any(|e| has_regions(e) || e.phases.iter().any(has_regions))
}
