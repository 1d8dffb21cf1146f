//! Memory aggregation and the byte quantities derived from it.

use crate::model::{GcEvent, Generation, MemoryAggregate, MemoryItem};
use crate::vmoption::VmOptions;

/// Aggregate every event's memory, phases before their parent, and
/// derive reclamation, promotion and allocation.
///
/// Allocation is the growth of the heap between the end of one
/// collection and the start of the next. Concurrent cycle containers are
/// left out of that chain because their snapshots overlap the pauses
/// inside them.
pub(super) fn aggregate(events: &mut [GcEvent], vm_options: &VmOptions) {
    let metaspace_limit = vm_options
        .get_size("MaxMetaspaceSize")
        .and_then(|bytes| i64::try_from(bytes).ok());

    let mut previous_post: Option<i64> = None;
    for event in events.iter_mut() {
        for phase in &mut event.phases {
            fill(phase, metaspace_limit);
        }
        fill(event, metaspace_limit);

        if event.kind.is_concurrent_cycle() {
            continue;
        }
        let Some(total) = event.memory.get(Generation::Total).copied() else {
            continue;
        };
        if event.allocation.is_none() {
            event.allocation = match (total.pre_used, previous_post) {
                (Some(pre), Some(prev)) if pre >= prev => Some(pre - prev),
                _ => None,
            };
        }
        if total.post_used.is_some() {
            previous_post = total.post_used;
        }
    }
}

fn fill(event: &mut GcEvent, metaspace_limit: Option<i64>) {
    let mut memory = MemoryAggregate::from_raw(&event.raw_memory);
    if let (Some(mut metaspace), Some(limit)) =
        (memory.get(Generation::Metaspace).copied(), metaspace_limit)
    {
        if metaspace.post_capacity.is_none() {
            metaspace.post_capacity = Some(limit);
            memory.set(metaspace);
        }
    }
    event.memory = memory;

    if event.reclamation.is_none() {
        event.reclamation = event
            .memory
            .get(Generation::Total)
            .and_then(MemoryItem::reduction);
    }
    if event.promotion.is_none() && event.kind.can_promote() {
        event.promotion = promotion(&event.memory);
    }
}

/// Bytes that moved into the old generation.
///
/// Whatever left young without leaving the heap was promoted, except for
/// the share explained by humongous regions growing.
fn promotion(memory: &MemoryAggregate) -> Option<i64> {
    let young = memory.get(Generation::Young)?.reduction()?;
    let total = memory.get(Generation::Total)?.reduction()?;
    let humongous_growth = match memory.get(Generation::Humongous) {
        Some(item) => -item.reduction()?,
        None => 0,
    };
    let promoted = young - total - humongous_growth;
    (promoted >= 0).then_some(promoted)
}
