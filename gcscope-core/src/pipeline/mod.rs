//! Derived-info pipeline
//!
//! Consumes a [`ModelBuilder`] once all lines are parsed and produces the
//! immutable [`GcModel`]. The passes run in a fixed order:
//!
//! 1. Drop a trailing event the log cut off
//! 2. Sort events and decide the model's start and end
//! 3. Fill phase and parent durations
//! 4. Normalize young/full collections (generational families)
//! 5. Compute pauses and build the flat, start-ordered index
//! 6. Stamp wall-clock timestamps
//! 7. Compute intervals between events of the same kind
//! 8. Convert region counts to bytes (unified G1)
//! 9. Aggregate memory; derive reclamation, promotion and allocation
//! 10. Render each event's text
//! 11. Collect metadata
//!
//! Only an unsupported format is fatal. Everything else that cannot be
//! resolved is left unknown.

mod memory;
mod region;
mod render;
mod repair;

pub use render::render;

use crate::error::{Error, Result};
use crate::model::{
    offset_millis, EventKind, EventRef, GcCause, GcEvent, GcModel, LogStyle, ModelBuilder,
    ModelMetadata,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};

/// Run every pass over a parsed builder.
pub fn run(builder: ModelBuilder) -> Result<GcModel> {
    let format = builder.format();
    let profile = format
        .family
        .profile()
        .ok_or_else(|| Error::UnsupportedFormat(format!("{format} logs are not supported")))?;
    let reference = builder.reference_timestamp();

    let mut events = builder.events;
    let mut safepoints = builder.safepoints;
    let mut stalls = builder.stalls;
    let mut stats = builder.stats;
    let vm_options = builder.vm_options;

    // 1-2
    events.sort_by(|a, b| a.start.total_cmp(&b.start));
    if events.last().is_some_and(|e| e.end().is_none()) {
        if let Some(dropped) = events.pop() {
            tracing::warn!(
                kind = %dropped.kind,
                start = dropped.start,
                line = dropped.line,
                "dropping truncated trailing event"
            );
        }
    }
    let (start_time, end_time) = time_bounds(&events, builder.last_seen);

    // 3-4
    for event in &mut events {
        stats.downgraded += repair::fix_durations(event);
    }
    if profile.generational {
        let merged = repair::merge_young_into_full(&mut events);
        let reclassified = repair::reclassify_promotion_failures(&mut events);
        if merged + reclassified > 0 {
            tracing::debug!(merged, reclassified, "normalized young collections");
        }
        if format.style == LogStyle::Legacy {
            repair::zero_young_after_full(&mut events);
        }
    }

    // 5
    for event in &mut events {
        for phase in &mut event.phases {
            phase.pause = phase.compute_pause();
        }
        event.pause = event.compute_pause();
    }
    for event in safepoints.iter_mut().chain(stalls.iter_mut()) {
        event.pause = event.compute_pause();
    }
    let all_events = flatten(&events);

    // 6
    if let Some(reference) = reference {
        for event in events
            .iter_mut()
            .chain(safepoints.iter_mut())
            .chain(stalls.iter_mut())
        {
            stamp(event, reference);
        }
    }

    // 7
    assign_intervals(&mut events, &all_events);

    // 8-9
    let mut region_size = builder.region_size;
    if profile.region_based && format.style == LogStyle::Unified && region::any_regions(&events)
    {
        if region_size.is_none() {
            region_size = region::infer_region_size(&events);
            tracing::debug!(region_size, "inferred region size");
        }
        match region_size {
            Some(size) => events.iter_mut().for_each(|e| region::convert(e, size)),
            None => tracing::warn!("region counts present but region size unknown"),
        }
    }
    memory::aggregate(&mut events, &vm_options);

    // 10
    for event in &mut events {
        for phase in &mut event.phases {
            phase.text = render::render(phase);
        }
        event.text = render::render(event);
    }
    for event in safepoints.iter_mut().chain(stalls.iter_mut()) {
        event.text = render::render(event);
    }

    // 11
    let parallel_threads = builder.parallel_threads.or_else(|| {
        vm_options
            .get_int("ParallelGCThreads")
            .and_then(|n| u32::try_from(n).ok())
    });
    let concurrent_threads = builder.concurrent_threads.or_else(|| {
        vm_options
            .get_int("ConcGCThreads")
            .and_then(|n| u32::try_from(n).ok())
    });

    let mut model = GcModel {
        format,
        profile,
        events,
        all_events,
        safepoints,
        stalls,
        start_time,
        end_time,
        reference_timestamp: reference,
        parallel_threads,
        concurrent_threads,
        region_size,
        vm_options,
        metadata: ModelMetadata {
            collector: format.family,
            style: format.style,
            start_time,
            end_time,
            parallel_threads,
            concurrent_threads,
            region_size,
            has_timestamps: reference.is_some(),
            has_cpu_time: false,
            event_count: 0,
            phase_count: 0,
            safepoint_count: 0,
            stall_count: 0,
            causes: Vec::new(),
            important_kinds: Vec::new(),
            pause_counted_kinds: profile.pause_counted.to_vec(),
        },
        stats,
    };
    model.metadata = metadata(&model);

    tracing::info!(
        format = %format,
        events = model.events.len(),
        flat = model.all_events.len(),
        start = start_time,
        end = end_time,
        "pipeline finished"
    );
    Ok(model)
}

/// Model start and end. The end also covers the last time the log
/// mentioned.
fn time_bounds(events: &[GcEvent], last_seen: Option<f64>) -> (f64, f64) {
    let start = events
        .iter()
        .map(|e| e.start)
        .min_by(f64::total_cmp)
        .unwrap_or(0.0);
    let mut end = start;
    if let Some(last) = events.last() {
        for candidate in [Some(last.start), last.end(), last.last_phase_end(), last_seen]
            .into_iter()
            .flatten()
        {
            end = end.max(candidate);
        }
    } else if let Some(seen) = last_seen {
        end = end.max(seen);
    }
    (start, end)
}

/// Every event followed by its phases, stably ordered by start.
fn flatten(events: &[GcEvent]) -> Vec<EventRef> {
    let mut refs: Vec<(f64, EventRef)> = Vec::new();
    for (i, event) in events.iter().enumerate() {
        refs.push((event.start, EventRef::top(i)));
        for (j, phase) in event.phases.iter().enumerate() {
            refs.push((phase.start, EventRef::phase(i, j)));
        }
    }
    refs.sort_by(|a, b| a.0.total_cmp(&b.0));
    refs.into_iter().map(|(_, r)| r).collect()
}

/// Timestamps that would overflow stay unset.
fn stamp(event: &mut GcEvent, reference: DateTime<Utc>) {
    event.timestamp = offset_millis(reference, event.start);
    for phase in &mut event.phases {
        phase.timestamp = offset_millis(reference, phase.start);
    }
}

fn event_at(events: &mut [GcEvent], r: EventRef) -> &mut GcEvent {
    let top = &mut events[r.event];
    match r.phase {
        Some(phase) => &mut top.phases[phase],
        None => top,
    }
}

/// Gap between an event's start and the end of the previous event of the
/// same kind. Mixed collections share the young timeline.
fn assign_intervals(events: &mut [GcEvent], order: &[EventRef]) {
    let mut previous_end: HashMap<EventKind, Option<f64>> = HashMap::new();
    for r in order {
        let event = event_at(events, *r);
        let key = event.kind.interval_key();
        if let Some(Some(end)) = previous_end.get(&key) {
            let gap = event.start - end;
            event.interval = (gap >= 0.0).then_some(gap);
        }
        previous_end.insert(key, event.end());
    }
}

fn metadata(model: &GcModel) -> ModelMetadata {
    let mut causes: BTreeSet<GcCause> = BTreeSet::new();
    let mut kinds: BTreeSet<EventKind> = BTreeSet::new();
    let mut has_cpu_time = false;
    for (_, event) in model.iter_all() {
        kinds.insert(event.kind);
        has_cpu_time |= event.cpu.is_some();
    }
    for event in &model.events {
        if let Some(cause) = &event.cause {
            causes.insert(cause.clone());
        }
    }
    for event in &model.stalls {
        kinds.insert(event.kind);
    }

    ModelMetadata {
        has_cpu_time,
        event_count: model.events.len(),
        phase_count: model.all_events.len() - model.events.len(),
        safepoint_count: model.safepoints.len(),
        stall_count: model.stalls.len(),
        causes: causes.into_iter().collect(),
        important_kinds: model
            .profile
            .important
            .iter()
            .copied()
            .filter(|k| kinds.contains(k))
            .collect(),
        ..model.metadata.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        CollectorFamily, CpuTime, Generation, LogFormat, MemoryItem, SpecialSituation,
    };
    use chrono::TimeZone;

    const M: i64 = 1024 * 1024;

    fn builder(family: CollectorFamily, style: LogStyle) -> ModelBuilder {
        ModelBuilder::new(LogFormat::new(family, style)).unwrap()
    }

    fn young(start: f64, duration: Option<f64>) -> GcEvent {
        GcEvent::new(EventKind::YoungGc, start).with_duration(duration)
    }

    #[test]
    fn test_truncated_trailing_event_is_dropped() {
        let mut b = builder(CollectorFamily::Parallel, LogStyle::Legacy);
        b.push_event(young(10.0, None));
        b.push_event(young(100.0, Some(5.0)));
        b.push_event(young(200.0, None));
        b.observe(250.0);
        let model = run(b).unwrap();
        assert_eq!(model.events().len(), 2);
        // an interior event keeps its unknown duration
        assert_eq!(model.events()[0].duration, None);
        assert_eq!(model.events()[0].pause, None);
        assert_eq!(model.start_time(), 10.0);
        assert_eq!(model.end_time(), 250.0);
    }

    #[test]
    fn test_flat_list_puts_parent_before_phases() {
        let mut b = builder(CollectorFamily::G1, LogStyle::Unified);
        let mut cycle = GcEvent::new(EventKind::G1ConcurrentCycle, 50.0);
        cycle
            .phases
            .push(GcEvent::new(EventKind::G1Remark, 80.0).with_duration(Some(3.0)));
        cycle
            .phases
            .push(GcEvent::new(EventKind::G1ConcurrentMark, 50.0).with_duration(Some(30.0)));
        b.push_event(young(10.0, Some(2.0)));
        b.push_event(cycle);
        b.push_event(young(60.0, Some(2.0)));
        let model = run(b).unwrap();

        let kinds: Vec<_> = model.iter_all().map(|(_, e)| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::YoungGc,
                EventKind::G1ConcurrentCycle,
                EventKind::G1ConcurrentMark,
                EventKind::YoungGc,
                EventKind::G1Remark,
            ]
        );
        let cycle = &model.events()[1];
        assert_eq!(cycle.duration, Some(33.0));
        assert_eq!(cycle.pause, Some(3.0));
        assert_eq!(model.events()[2].interval, Some(48.0));
        assert_eq!(model.metadata().phase_count, 2);
    }

    #[test]
    fn test_timestamps_follow_reference() {
        let mut b = builder(CollectorFamily::G1, LogStyle::Unified);
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let start = b
            .resolve_time(Some(1500.0), Some(t0 + chrono::Duration::milliseconds(1500)))
            .unwrap();
        b.push_event(young(start, Some(2.0)));
        let model = run(b).unwrap();
        assert_eq!(
            model.events()[0].timestamp,
            Some(t0 + chrono::Duration::milliseconds(1500))
        );
        assert!(model.metadata().has_timestamps);
        assert!(model.events()[0].text.starts_with("2024-03-01T12:00:01.500Z Young GC"));
    }

    #[test]
    fn test_overflowing_timestamp_stays_unset() {
        let mut b = builder(CollectorFamily::G1, LogStyle::Unified);
        let start = b
            .resolve_time(Some(0.0), Some(DateTime::<Utc>::MAX_UTC))
            .unwrap();
        b.push_event(young(start + 5.0, Some(2.0)));
        let model = run(b).unwrap();
        assert_eq!(model.events()[0].timestamp, None);
    }

    #[test]
    fn test_pause_prefers_real_time() {
        let mut b = builder(CollectorFamily::Serial, LogStyle::Legacy);
        let mut event = young(0.0, Some(5.0));
        event.cpu = Some(CpuTime {
            user: 1.0,
            sys: 1.0,
            real: 30.0,
        });
        b.push_event(event);
        let model = run(b).unwrap();
        assert_eq!(model.events()[0].pause, Some(30.0));
        assert!(model.metadata().has_cpu_time);
    }

    #[test]
    fn test_legacy_full_zeroes_young_after() {
        let mut b = builder(CollectorFamily::Parallel, LogStyle::Legacy);
        let mut full = GcEvent::new(EventKind::FullGc, 0.0).with_duration(Some(80.0));
        full.put_memory(MemoryItem::with_change(
            Generation::Young,
            Some(10 * M),
            Some(3 * M),
            Some(20 * M),
        ));
        full.put_memory(MemoryItem::with_change(
            Generation::Total,
            Some(100 * M),
            Some(40 * M),
            Some(200 * M),
        ));
        b.push_event(full);
        let model = run(b).unwrap();
        let memory = &model.events()[0].memory;
        assert_eq!(memory.get(Generation::Young).unwrap().post_used, Some(0));
        assert_eq!(memory.get(Generation::Old).unwrap().post_used, Some(40 * M));
    }

    #[test]
    fn test_promotion_failure_is_full_in_metadata() {
        let mut b = builder(CollectorFamily::Cms, LogStyle::Legacy);
        let mut event = young(0.0, Some(300.0));
        event.cause = Some(GcCause::new("Allocation Failure"));
        event.mark(SpecialSituation::PromotionFailed);
        b.push_event(event);
        let model = run(b).unwrap();
        assert_eq!(model.events()[0].kind, EventKind::FullGc);
        let causes: Vec<_> = model.metadata().causes.iter().map(|c| c.as_str()).collect();
        assert_eq!(causes, vec!["Promotion Failed"]);
        assert_eq!(model.metadata().important_kinds, vec![EventKind::FullGc]);
    }

    #[test]
    fn test_thread_counts_fall_back_to_vm_options() {
        let mut b = builder(CollectorFamily::G1, LogStyle::Unified);
        let options =
            crate::vmoption::VmOptions::parse("-XX:ParallelGCThreads=8 -XX:ConcGCThreads=2")
                .unwrap();
        b.vm_options_mut().extend(options);
        b.note_concurrent_threads(3);
        b.push_event(young(0.0, Some(1.0)));
        let model = run(b).unwrap();
        assert_eq!(model.parallel_threads(), Some(8));
        assert_eq!(model.concurrent_threads(), Some(3));
    }
}
