//! Closed catalogue of collection activities.
//!
//! Every activity a parser can report is one [`EventKind`] variant. The
//! variant's static [`KindInfo`] fixes its display name, pause
//! classification, nesting level and the parents it may appear under.

use serde::{Deserialize, Serialize};

/// Whether an activity stops application threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseClass {
    /// Stops all application threads
    Pause,
    /// Runs alongside application threads
    Concurrent,
    /// Container whose pause is the sum of its direct paused phases
    Partial,
}

/// Where an activity sits in the event tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    /// Top-level event
    Event,
    /// Direct child of an event
    Phase,
    /// Nested one level deeper, flattened into the grandparent's phase list
    Subphase,
}

/// Static description of an [`EventKind`].
#[derive(Debug, Clone, Copy)]
pub struct KindInfo {
    pub name: &'static str,
    pub pause: PauseClass,
    pub level: Level,
    pub parents: &'static [EventKind],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    // Top-level events
    YoungGc,
    G1MixedGc,
    FullGc,
    G1ConcurrentCycle,
    G1ConcurrentUndoCycle,
    CmsConcurrentCycle,
    ZgcGarbageCollection,
    Safepoint,
    ZgcAllocationStall,
    ZgcOutOfMemory,

    // G1 young/mixed pause phases
    G1PreEvacuateCollectionSet,
    G1MergeHeapRoots,
    G1EvacuateCollectionSet,
    G1PostEvacuateCollectionSet,
    G1ParallelTime,
    G1CodeRootFixup,
    G1CodeRootPurge,
    G1ClearCardTable,
    G1OtherPhase,

    // Full collection phases
    FullMarkLiveObjects,
    FullComputeNewAddresses,
    FullPrepareForCompaction,
    FullAdjustPointers,
    FullMoveObjects,
    FullCompactHeap,
    ParallelMarkingPhase,
    ParallelSummaryPhase,
    ParallelAdjustRoots,
    ParallelCompactionPhase,
    ParallelPostCompact,

    // G1 concurrent cycle
    G1ConcurrentClearClaimedMarks,
    G1ConcurrentScanRootRegions,
    G1ConcurrentMark,
    G1ConcurrentMarkFromRoots,
    G1ConcurrentPreclean,
    G1Remark,
    G1FinalizeMarking,
    G1RefProc,
    G1Unloading,
    G1ConcurrentRebuildRememberedSets,
    G1Cleanup,
    G1ConcurrentCleanupForNextMark,

    // CMS concurrent cycle
    CmsInitialMark,
    CmsConcurrentMark,
    CmsConcurrentPreclean,
    CmsConcurrentAbortablePreclean,
    CmsFinalRemark,
    CmsRescan,
    CmsWeakRefsProcessing,
    CmsClassUnloading,
    CmsScrubSymbolTable,
    CmsScrubStringTable,
    CmsConcurrentSweep,
    CmsConcurrentReset,

    // ZGC cycle
    ZgcPauseMarkStart,
    ZgcConcurrentMark,
    ZgcConcurrentMarkContinue,
    ZgcConcurrentMarkFree,
    ZgcPauseMarkEnd,
    ZgcConcurrentProcessNonStrongReferences,
    ZgcConcurrentResetRelocationSet,
    ZgcConcurrentDestroyDetachedPages,
    ZgcConcurrentSelectRelocationSet,
    ZgcConcurrentPrepareRelocationSet,
    ZgcPauseRelocateStart,
    ZgcConcurrentRelocate,
}

use EventKind::*;
use Level::{Event as Top, Phase, Subphase};
use PauseClass::{Concurrent, Partial, Pause};

const NO_PARENT: &[EventKind] = &[];
const YOUNG_PAUSES: &[EventKind] = &[YoungGc, G1MixedGc];
const FULL: &[EventKind] = &[FullGc];
const G1_CYCLE: &[EventKind] = &[G1ConcurrentCycle];
const G1_CYCLES: &[EventKind] = &[G1ConcurrentCycle, G1ConcurrentUndoCycle];
const CMS_CYCLE: &[EventKind] = &[CmsConcurrentCycle];
const ZGC_CYCLE: &[EventKind] = &[ZgcGarbageCollection];

const fn info(
    name: &'static str,
    pause: PauseClass,
    level: Level,
    parents: &'static [EventKind],
) -> KindInfo {
    KindInfo {
        name,
        pause,
        level,
        parents,
    }
}

impl EventKind {
    /// Every catalogued kind, in declaration order.
    pub const ALL: &'static [EventKind] = &[
        YoungGc,
        G1MixedGc,
        FullGc,
        G1ConcurrentCycle,
        G1ConcurrentUndoCycle,
        CmsConcurrentCycle,
        ZgcGarbageCollection,
        Safepoint,
        ZgcAllocationStall,
        ZgcOutOfMemory,
        G1PreEvacuateCollectionSet,
        G1MergeHeapRoots,
        G1EvacuateCollectionSet,
        G1PostEvacuateCollectionSet,
        G1ParallelTime,
        G1CodeRootFixup,
        G1CodeRootPurge,
        G1ClearCardTable,
        G1OtherPhase,
        FullMarkLiveObjects,
        FullComputeNewAddresses,
        FullPrepareForCompaction,
        FullAdjustPointers,
        FullMoveObjects,
        FullCompactHeap,
        ParallelMarkingPhase,
        ParallelSummaryPhase,
        ParallelAdjustRoots,
        ParallelCompactionPhase,
        ParallelPostCompact,
        G1ConcurrentClearClaimedMarks,
        G1ConcurrentScanRootRegions,
        G1ConcurrentMark,
        G1ConcurrentMarkFromRoots,
        G1ConcurrentPreclean,
        G1Remark,
        G1FinalizeMarking,
        G1RefProc,
        G1Unloading,
        G1ConcurrentRebuildRememberedSets,
        G1Cleanup,
        G1ConcurrentCleanupForNextMark,
        CmsInitialMark,
        CmsConcurrentMark,
        CmsConcurrentPreclean,
        CmsConcurrentAbortablePreclean,
        CmsFinalRemark,
        CmsRescan,
        CmsWeakRefsProcessing,
        CmsClassUnloading,
        CmsScrubSymbolTable,
        CmsScrubStringTable,
        CmsConcurrentSweep,
        CmsConcurrentReset,
        ZgcPauseMarkStart,
        ZgcConcurrentMark,
        ZgcConcurrentMarkContinue,
        ZgcConcurrentMarkFree,
        ZgcPauseMarkEnd,
        ZgcConcurrentProcessNonStrongReferences,
        ZgcConcurrentResetRelocationSet,
        ZgcConcurrentDestroyDetachedPages,
        ZgcConcurrentSelectRelocationSet,
        ZgcConcurrentPrepareRelocationSet,
        ZgcPauseRelocateStart,
        ZgcConcurrentRelocate,
    ];

    /// Static catalogue entry for this kind.
    pub const fn info(self) -> KindInfo {
        match self {
            YoungGc => info("Young GC", Pause, Top, NO_PARENT),
            G1MixedGc => info("Mixed GC", Pause, Top, NO_PARENT),
            FullGc => info("Full GC", Pause, Top, NO_PARENT),
            G1ConcurrentCycle => info("Concurrent Cycle", Partial, Top, NO_PARENT),
            G1ConcurrentUndoCycle => info("Concurrent Undo Cycle", Concurrent, Top, NO_PARENT),
            CmsConcurrentCycle => info("CMS", Partial, Top, NO_PARENT),
            ZgcGarbageCollection => info("ZGC Garbage Collection", Partial, Top, NO_PARENT),
            Safepoint => info("Safepoint", Pause, Top, NO_PARENT),
            ZgcAllocationStall => info("Allocation Stall", Concurrent, Top, NO_PARENT),
            ZgcOutOfMemory => info("Out Of Memory", Concurrent, Top, NO_PARENT),

            G1PreEvacuateCollectionSet => {
                info("Pre Evacuate Collection Set", Pause, Phase, YOUNG_PAUSES)
            }
            G1MergeHeapRoots => info("Merge Heap Roots", Pause, Phase, YOUNG_PAUSES),
            G1EvacuateCollectionSet => info("Evacuate Collection Set", Pause, Phase, YOUNG_PAUSES),
            G1PostEvacuateCollectionSet => {
                info("Post Evacuate Collection Set", Pause, Phase, YOUNG_PAUSES)
            }
            G1ParallelTime => info("Parallel Time", Pause, Phase, YOUNG_PAUSES),
            G1CodeRootFixup => info("Code Root Fixup", Pause, Phase, YOUNG_PAUSES),
            G1CodeRootPurge => info("Code Root Purge", Pause, Phase, YOUNG_PAUSES),
            G1ClearCardTable => info("Clear CT", Pause, Phase, YOUNG_PAUSES),
            G1OtherPhase => info("Other", Pause, Phase, YOUNG_PAUSES),

            FullMarkLiveObjects => info("Phase 1: Mark live objects", Pause, Phase, FULL),
            FullComputeNewAddresses => {
                info("Phase 2: Compute new object addresses", Pause, Phase, FULL)
            }
            FullPrepareForCompaction => info("Phase 2: Prepare for compaction", Pause, Phase, FULL),
            FullAdjustPointers => info("Phase 3: Adjust pointers", Pause, Phase, FULL),
            FullMoveObjects => info("Phase 4: Move objects", Pause, Phase, FULL),
            FullCompactHeap => info("Phase 4: Compact heap", Pause, Phase, FULL),
            ParallelMarkingPhase => info("Marking Phase", Pause, Phase, FULL),
            ParallelSummaryPhase => info("Summary Phase", Pause, Phase, FULL),
            ParallelAdjustRoots => info("Adjust Roots", Pause, Phase, FULL),
            ParallelCompactionPhase => info("Compaction Phase", Pause, Phase, FULL),
            ParallelPostCompact => info("Post Compact", Pause, Phase, FULL),

            G1ConcurrentClearClaimedMarks => {
                info("Concurrent Clear Claimed Marks", Concurrent, Phase, G1_CYCLE)
            }
            G1ConcurrentScanRootRegions => {
                info("Concurrent Scan Root Regions", Concurrent, Phase, G1_CYCLE)
            }
            G1ConcurrentMark => info("Concurrent Mark", Concurrent, Phase, G1_CYCLE),
            G1ConcurrentMarkFromRoots => {
                info("Concurrent Mark From Roots", Concurrent, Subphase, G1_CYCLE)
            }
            G1ConcurrentPreclean => info("Concurrent Preclean", Concurrent, Subphase, G1_CYCLE),
            G1Remark => info("Pause Remark", Pause, Phase, G1_CYCLE),
            G1FinalizeMarking => info("Finalize Marking", Pause, Subphase, G1_CYCLE),
            G1RefProc => info("Reference Processing", Pause, Subphase, G1_CYCLE),
            G1Unloading => info("Class Unloading", Pause, Subphase, G1_CYCLE),
            G1ConcurrentRebuildRememberedSets => {
                info("Concurrent Rebuild Remembered Sets", Concurrent, Phase, G1_CYCLE)
            }
            G1Cleanup => info("Pause Cleanup", Pause, Phase, G1_CYCLE),
            G1ConcurrentCleanupForNextMark => {
                info("Concurrent Cleanup for Next Mark", Concurrent, Phase, G1_CYCLES)
            }

            CmsInitialMark => info("Initial Mark", Pause, Phase, CMS_CYCLE),
            CmsConcurrentMark => info("Concurrent Mark", Concurrent, Phase, CMS_CYCLE),
            CmsConcurrentPreclean => info("Concurrent Preclean", Concurrent, Phase, CMS_CYCLE),
            CmsConcurrentAbortablePreclean => {
                info("Concurrent Abortable Preclean", Concurrent, Phase, CMS_CYCLE)
            }
            CmsFinalRemark => info("Final Remark", Pause, Phase, CMS_CYCLE),
            CmsRescan => info("Rescan", Pause, Subphase, CMS_CYCLE),
            CmsWeakRefsProcessing => info("Weak Refs Processing", Pause, Subphase, CMS_CYCLE),
            CmsClassUnloading => info("Class Unloading", Pause, Subphase, CMS_CYCLE),
            CmsScrubSymbolTable => info("Scrub Symbol Table", Pause, Subphase, CMS_CYCLE),
            CmsScrubStringTable => info("Scrub String Table", Pause, Subphase, CMS_CYCLE),
            CmsConcurrentSweep => info("Concurrent Sweep", Concurrent, Phase, CMS_CYCLE),
            CmsConcurrentReset => info("Concurrent Reset", Concurrent, Phase, CMS_CYCLE),

            ZgcPauseMarkStart => info("Pause Mark Start", Pause, Phase, ZGC_CYCLE),
            ZgcConcurrentMark => info("Concurrent Mark", Concurrent, Phase, ZGC_CYCLE),
            ZgcConcurrentMarkContinue => {
                info("Concurrent Mark Continue", Concurrent, Phase, ZGC_CYCLE)
            }
            ZgcConcurrentMarkFree => info("Concurrent Mark Free", Concurrent, Phase, ZGC_CYCLE),
            ZgcPauseMarkEnd => info("Pause Mark End", Pause, Phase, ZGC_CYCLE),
            ZgcConcurrentProcessNonStrongReferences => info(
                "Concurrent Process Non-Strong References",
                Concurrent,
                Phase,
                ZGC_CYCLE,
            ),
            ZgcConcurrentResetRelocationSet => {
                info("Concurrent Reset Relocation Set", Concurrent, Phase, ZGC_CYCLE)
            }
            ZgcConcurrentDestroyDetachedPages => {
                info("Concurrent Destroy Detached Pages", Concurrent, Phase, ZGC_CYCLE)
            }
            ZgcConcurrentSelectRelocationSet => {
                info("Concurrent Select Relocation Set", Concurrent, Phase, ZGC_CYCLE)
            }
            ZgcConcurrentPrepareRelocationSet => {
                info("Concurrent Prepare Relocation Set", Concurrent, Phase, ZGC_CYCLE)
            }
            ZgcPauseRelocateStart => info("Pause Relocate Start", Pause, Phase, ZGC_CYCLE),
            ZgcConcurrentRelocate => info("Concurrent Relocate", Concurrent, Phase, ZGC_CYCLE),
        }
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn pause_class(self) -> PauseClass {
        self.info().pause
    }

    pub fn level(self) -> Level {
        self.info().level
    }

    /// Parents under which this kind may legally appear as a phase.
    pub fn parents(self) -> &'static [EventKind] {
        self.info().parents
    }

    /// Whether this kind may be a phase of `parent`.
    pub fn is_phase_of(self, parent: EventKind) -> bool {
        self.parents().contains(&parent)
    }

    pub fn is_young(self) -> bool {
        matches!(self, YoungGc | G1MixedGc)
    }

    pub fn is_full(self) -> bool {
        self == FullGc
    }

    /// Containers for a concurrent marking cycle. Their own memory
    /// snapshots do not participate in the allocation chain.
    pub fn is_concurrent_cycle(self) -> bool {
        matches!(
            self,
            G1ConcurrentCycle | G1ConcurrentUndoCycle | CmsConcurrentCycle
        )
    }

    /// Kinds whose collection can move objects from young to old.
    pub fn can_promote(self) -> bool {
        self.is_young()
    }

    /// Kinds that collect the old generation.
    pub fn collects_old(self) -> bool {
        matches!(self, FullGc | G1MixedGc)
    }

    /// Key under which intervals are tracked. Mixed collections share
    /// the young collection timeline.
    pub fn interval_key(self) -> EventKind {
        if self == G1MixedGc {
            YoungGc
        } else {
            self
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue_is_complete() {
        // every variant is listed once
        let mut seen = std::collections::HashSet::new();
        for kind in EventKind::ALL {
            assert!(seen.insert(*kind), "{kind:?} listed twice");
        }
        assert_eq!(seen.len(), EventKind::ALL.len());
    }

    #[test]
    fn test_phase_parent_consistency() {
        for kind in EventKind::ALL {
            match kind.level() {
                Level::Event => assert!(kind.parents().is_empty(), "{kind:?}"),
                _ => {
                    assert!(!kind.parents().is_empty(), "{kind:?} has no parent");
                    for parent in kind.parents() {
                        assert_eq!(parent.level(), Level::Event, "{kind:?} -> {parent:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_pause_classes() {
        assert_eq!(EventKind::YoungGc.pause_class(), PauseClass::Pause);
        assert_eq!(EventKind::G1ConcurrentCycle.pause_class(), PauseClass::Partial);
        assert_eq!(EventKind::G1ConcurrentMark.pause_class(), PauseClass::Concurrent);
        assert!(EventKind::G1Remark.is_phase_of(EventKind::G1ConcurrentCycle));
        assert!(!EventKind::G1Remark.is_phase_of(EventKind::CmsConcurrentCycle));
    }

    #[test]
    fn test_interval_key_merges_mixed_into_young() {
        assert_eq!(EventKind::G1MixedGc.interval_key(), EventKind::YoungGc);
        assert_eq!(EventKind::FullGc.interval_key(), EventKind::FullGc);
    }
}
