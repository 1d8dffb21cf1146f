//! Collector families and their capability tables.

use super::kind::EventKind::{self, *};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorFamily {
    Serial,
    Parallel,
    Cms,
    G1,
    Zgc,
    Shenandoah,
    Epsilon,
}

impl CollectorFamily {
    pub fn name(self) -> &'static str {
        match self {
            CollectorFamily::Serial => "Serial",
            CollectorFamily::Parallel => "Parallel",
            CollectorFamily::Cms => "CMS",
            CollectorFamily::G1 => "G1",
            CollectorFamily::Zgc => "ZGC",
            CollectorFamily::Shenandoah => "Shenandoah",
            CollectorFamily::Epsilon => "Epsilon",
        }
    }

    /// Capability tables, or `None` for families that are recognized but
    /// not analyzed.
    pub fn profile(self) -> Option<&'static FamilyProfile> {
        match self {
            CollectorFamily::Serial => Some(&SERIAL),
            CollectorFamily::Parallel => Some(&PARALLEL),
            CollectorFamily::Cms => Some(&CMS),
            CollectorFamily::G1 => Some(&G1),
            CollectorFamily::Zgc => Some(&ZGC),
            CollectorFamily::Shenandoah | CollectorFamily::Epsilon => None,
        }
    }
}

impl std::fmt::Display for CollectorFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for CollectorFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "serial" => Ok(CollectorFamily::Serial),
            "parallel" => Ok(CollectorFamily::Parallel),
            "cms" => Ok(CollectorFamily::Cms),
            "g1" => Ok(CollectorFamily::G1),
            "zgc" => Ok(CollectorFamily::Zgc),
            "shenandoah" => Ok(CollectorFamily::Shenandoah),
            "epsilon" => Ok(CollectorFamily::Epsilon),
            other => Err(format!("unknown collector family '{other}'")),
        }
    }
}

/// Log generation: JDK 8 style or unified logging (JDK 9+).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStyle {
    Legacy,
    Unified,
}

impl std::fmt::Display for LogStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LogStyle::Legacy => "legacy",
            LogStyle::Unified => "unified",
        })
    }
}

impl std::str::FromStr for LogStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "legacy" | "jdk8" => Ok(LogStyle::Legacy),
            "unified" | "jdk9" => Ok(LogStyle::Unified),
            other => Err(format!("unknown log style '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogFormat {
    pub family: CollectorFamily,
    pub style: LogStyle,
}

impl LogFormat {
    pub fn new(family: CollectorFamily, style: LogStyle) -> Self {
        Self { family, style }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.family, self.style)
    }
}

/// What a collector family can produce.
#[derive(Debug)]
pub struct FamilyProfile {
    pub family: CollectorFamily,
    /// Kinds legal as top-level events
    pub top_level: &'static [EventKind],
    /// Kinds legal as phases, each under the parents its catalogue entry names
    pub phases: &'static [EventKind],
    /// Kinds counted in pause statistics
    pub pause_counted: &'static [EventKind],
    /// Kinds worth surfacing in summaries
    pub important: &'static [EventKind],
    /// Young/full pause family that gets young-to-full normalization
    pub generational: bool,
    /// Heap is split into fixed-size regions
    pub region_based: bool,
}

impl FamilyProfile {
    pub fn is_top_level(&self, kind: EventKind) -> bool {
        self.top_level.contains(&kind)
    }

    pub fn is_phase_of(&self, phase: EventKind, parent: EventKind) -> bool {
        self.phases.contains(&phase) && self.is_top_level(parent) && phase.is_phase_of(parent)
    }

    pub fn counts_pause(&self, kind: EventKind) -> bool {
        self.pause_counted.contains(&kind)
    }

    pub fn is_important(&self, kind: EventKind) -> bool {
        self.important.contains(&kind)
    }
}

const GENERATIONAL_FULL_PHASES: &[EventKind] = &[
    FullMarkLiveObjects,
    FullComputeNewAddresses,
    FullPrepareForCompaction,
    FullAdjustPointers,
    FullMoveObjects,
    FullCompactHeap,
];

static SERIAL: FamilyProfile = FamilyProfile {
    family: CollectorFamily::Serial,
    top_level: &[YoungGc, FullGc, Safepoint],
    phases: GENERATIONAL_FULL_PHASES,
    pause_counted: &[YoungGc, FullGc],
    important: &[YoungGc, FullGc],
    generational: true,
    region_based: false,
};

static PARALLEL: FamilyProfile = FamilyProfile {
    family: CollectorFamily::Parallel,
    top_level: &[YoungGc, FullGc, Safepoint],
    phases: &[
        ParallelMarkingPhase,
        ParallelSummaryPhase,
        ParallelAdjustRoots,
        ParallelCompactionPhase,
        ParallelPostCompact,
    ],
    pause_counted: &[YoungGc, FullGc],
    important: &[YoungGc, FullGc],
    generational: true,
    region_based: false,
};

static CMS: FamilyProfile = FamilyProfile {
    family: CollectorFamily::Cms,
    top_level: &[YoungGc, FullGc, CmsConcurrentCycle, Safepoint],
    phases: &[
        FullMarkLiveObjects,
        FullComputeNewAddresses,
        FullAdjustPointers,
        FullMoveObjects,
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
    ],
    pause_counted: &[YoungGc, FullGc, CmsInitialMark, CmsFinalRemark],
    important: &[YoungGc, FullGc, CmsConcurrentCycle, CmsInitialMark, CmsFinalRemark],
    generational: true,
    region_based: false,
};

static G1: FamilyProfile = FamilyProfile {
    family: CollectorFamily::G1,
    top_level: &[
        YoungGc,
        G1MixedGc,
        FullGc,
        G1ConcurrentCycle,
        G1ConcurrentUndoCycle,
        Safepoint,
    ],
    phases: &[
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
        FullPrepareForCompaction,
        FullAdjustPointers,
        FullCompactHeap,
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
    ],
    pause_counted: &[YoungGc, G1MixedGc, FullGc, G1Remark, G1Cleanup],
    important: &[YoungGc, G1MixedGc, FullGc, G1ConcurrentCycle, G1Remark, G1Cleanup],
    generational: false,
    region_based: true,
};

static ZGC: FamilyProfile = FamilyProfile {
    family: CollectorFamily::Zgc,
    top_level: &[ZgcGarbageCollection, ZgcAllocationStall, ZgcOutOfMemory, Safepoint],
    phases: &[
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
    ],
    pause_counted: &[ZgcPauseMarkStart, ZgcPauseMarkEnd, ZgcPauseRelocateStart],
    important: &[ZgcGarbageCollection, ZgcAllocationStall, ZgcOutOfMemory],
    generational: false,
    region_based: false,
};

#[cfg(test)]
mod tests {
    use super::*;

    const SUPPORTED: &[CollectorFamily] = &[
        CollectorFamily::Serial,
        CollectorFamily::Parallel,
        CollectorFamily::Cms,
        CollectorFamily::G1,
        CollectorFamily::Zgc,
    ];

    #[test]
    fn test_unsupported_families_have_no_profile() {
        assert!(CollectorFamily::Shenandoah.profile().is_none());
        assert!(CollectorFamily::Epsilon.profile().is_none());
    }

    #[test]
    fn test_profiles_are_consistent_with_catalogue() {
        for family in SUPPORTED {
            let profile = family.profile().unwrap();
            assert_eq!(profile.family, *family);
            for phase in profile.phases {
                assert!(
                    phase.parents().iter().any(|p| profile.is_top_level(*p)),
                    "{family}: {phase:?} has no legal parent"
                );
            }
            for kind in profile.pause_counted {
                assert!(
                    profile.is_top_level(*kind) || profile.phases.contains(kind),
                    "{family}: {kind:?} counted but never produced"
                );
            }
        }
    }

    #[test]
    fn test_phase_relation() {
        let g1 = CollectorFamily::G1.profile().unwrap();
        assert!(g1.is_phase_of(G1Remark, G1ConcurrentCycle));
        assert!(!g1.is_phase_of(CmsFinalRemark, CmsConcurrentCycle));
        assert!(g1.is_phase_of(G1ConcurrentCleanupForNextMark, G1ConcurrentUndoCycle));
    }

    #[test]
    fn test_parse_family_and_style() {
        assert_eq!("g1".parse::<CollectorFamily>(), Ok(CollectorFamily::G1));
        assert_eq!("Unified".parse::<LogStyle>(), Ok(LogStyle::Unified));
        assert!("bogus".parse::<CollectorFamily>().is_err());
    }
}
