//! Duration repair and generational normalization.

use crate::model::{EventKind, GcCause, GcEvent, Generation, Level, SpecialSituation};

/// Young and full collections printed for the same work start and end
/// within this many ms of each other.
const SAME_SPAN_TOLERANCE_MS: f64 = 1.0;

fn non_negative(value: f64) -> Option<f64> {
    (value >= 0.0).then_some(value)
}

/// Order phases by start and fill unknown durations.
///
/// A phase without a duration runs until the next phase at its level
/// starts, or until its parent ends. A parent without a duration ends
/// with its last phase. Returns how many values were impossible and left
/// unknown.
pub(super) fn fix_durations(event: &mut GcEvent) -> usize {
    let mut downgraded = 0;
    event.phases.sort_by(|a, b| a.start.total_cmp(&b.start));

    let parent_end = event.end();
    for i in 0..event.phases.len() {
        if event.phases[i].duration.is_some() {
            continue;
        }
        let start = event.phases[i].start;
        let top_level = event.phases[i].kind.level() == Level::Phase;
        let boundary = event.phases[i + 1..]
            .iter()
            .find(|p| p.start > start && (!top_level || p.kind.level() == Level::Phase))
            .map(|p| p.start)
            .or(parent_end);
        if let Some(boundary) = boundary {
            let duration = non_negative(boundary - start);
            downgraded += usize::from(duration.is_none());
            event.phases[i].duration = duration;
        }
    }

    if event.duration.is_none() {
        if let Some(end) = event.last_phase_end() {
            let duration = non_negative(end - event.start);
            downgraded += usize::from(duration.is_none());
            event.duration = duration;
        }
    }
    downgraded
}

fn same_span(a: &GcEvent, b: &GcEvent) -> bool {
    let ends = match (a.end(), b.end()) {
        (Some(x), Some(y)) => (x - y).abs() <= SAME_SPAN_TOLERANCE_MS,
        _ => false,
    };
    ends && (a.start - b.start).abs() <= SAME_SPAN_TOLERANCE_MS
}

/// Fold a young collection into the full collection printed right after
/// it for the same span. Returns how many young collections were folded.
pub(super) fn merge_young_into_full(events: &mut Vec<GcEvent>) -> usize {
    let mut merged = 0;
    let mut i = 0;
    while i + 1 < events.len() {
        if !(events[i].kind == EventKind::YoungGc
            && events[i + 1].kind.is_full()
            && same_span(&events[i], &events[i + 1]))
        {
            i += 1;
            continue;
        }

        let young = events.remove(i);
        let full = &mut events[i];
        full.mark(SpecialSituation::YoungGcBecameFullGc);
        full.id = full.id.or(young.id);
        full.cpu = full.cpu.or(young.cpu);
        if full.cause.is_none() {
            full.cause = young.cause;
        }
        full.line = match (full.line, young.line) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        for item in young.raw_memory {
            if item.in_regions || full.raw(item.generation).is_none() {
                full.put_memory(item);
            }
        }
        merged += 1;
    }
    merged
}

/// A young collection that failed promotion was really a full
/// collection.
pub(super) fn reclassify_promotion_failures(events: &mut [GcEvent]) -> usize {
    let mut changed = 0;
    for event in events
        .iter_mut()
        .filter(|e| e.kind.is_young() && e.has(SpecialSituation::PromotionFailed))
    {
        event.kind = EventKind::FullGc;
        event.cause = Some(GcCause::new(GcCause::PROMOTION_FAILED));
        event.special_situations.remove(&SpecialSituation::PromotionFailed);
        changed += 1;
    }
    changed
}

/// Legacy full collections print the young generation before it has
/// been emptied. The real young occupancy afterwards is zero.
pub(super) fn zero_young_after_full(events: &mut [GcEvent]) {
    for event in events.iter_mut().filter(|e| e.kind.is_full()) {
        if let Some(young) = event.raw_mut(Generation::Young) {
            young.post_used = Some(0);
        }
    }
}
