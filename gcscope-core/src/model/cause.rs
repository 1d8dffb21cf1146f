//! Collection causes as printed by the JVM.

use serde::{Deserialize, Serialize};

/// Broad grouping of causes used by statistics and diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CauseClass {
    Allocation,
    Metaspace,
    Humongous,
    Explicit,
    Heuristic,
    Failure,
    Other,
}

/// Free-form cause string, kept as printed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GcCause(String);

impl GcCause {
    pub const ALLOCATION_FAILURE: &'static str = "Allocation Failure";
    pub const G1_EVACUATION_PAUSE: &'static str = "G1 Evacuation Pause";
    pub const G1_HUMONGOUS_ALLOCATION: &'static str = "G1 Humongous Allocation";
    pub const METADATA_GC_THRESHOLD: &'static str = "Metadata GC Threshold";
    pub const METADATA_CLEAR_SOFT_REFERENCES: &'static str = "Metadata GC Clear Soft References";
    pub const SYSTEM_GC: &'static str = "System.gc()";
    pub const HEAP_DUMP: &'static str = "Heap Dump Initiated GC";
    pub const HEAP_INSPECTION: &'static str = "Heap Inspection Initiated GC";
    pub const PROMOTION_FAILED: &'static str = "Promotion Failed";
    pub const ERGONOMICS: &'static str = "Ergonomics";
    pub const GC_LOCKER: &'static str = "GCLocker Initiated GC";
    pub const WARMUP: &'static str = "Warmup";
    pub const PROACTIVE: &'static str = "Proactive";
    pub const ALLOCATION_RATE: &'static str = "Allocation Rate";
    pub const ALLOCATION_STALL: &'static str = "Allocation Stall";
    pub const TIMER: &'static str = "Timer";
    pub const HIGH_USAGE: &'static str = "High Usage";

    pub fn new(cause: impl Into<String>) -> Self {
        GcCause(cause.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn class(&self) -> CauseClass {
        match self.0.as_str() {
            Self::ALLOCATION_FAILURE | Self::G1_EVACUATION_PAUSE | Self::ALLOCATION_RATE => {
                CauseClass::Allocation
            }
            Self::ALLOCATION_STALL => CauseClass::Allocation,
            Self::METADATA_GC_THRESHOLD | Self::METADATA_CLEAR_SOFT_REFERENCES => {
                CauseClass::Metaspace
            }
            Self::G1_HUMONGOUS_ALLOCATION => CauseClass::Humongous,
            Self::SYSTEM_GC | Self::HEAP_DUMP | Self::HEAP_INSPECTION => CauseClass::Explicit,
            Self::ERGONOMICS
            | Self::WARMUP
            | Self::PROACTIVE
            | Self::TIMER
            | Self::HIGH_USAGE
            | Self::GC_LOCKER => CauseClass::Heuristic,
            Self::PROMOTION_FAILED => CauseClass::Failure,
            other if other.contains("Allocation Failure") => CauseClass::Allocation,
            _ => CauseClass::Other,
        }
    }

    pub fn is_metaspace(&self) -> bool {
        self.class() == CauseClass::Metaspace
    }

    pub fn is_explicit(&self) -> bool {
        self.class() == CauseClass::Explicit
    }

    pub fn is_humongous(&self) -> bool {
        self.class() == CauseClass::Humongous
    }
}

impl std::fmt::Display for GcCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(GcCause::new("Metadata GC Threshold").is_metaspace());
        assert!(GcCause::new(" System.gc() ").is_explicit());
        assert!(GcCause::new("G1 Humongous Allocation").is_humongous());
        assert_eq!(GcCause::new("Ergonomics").class(), CauseClass::Heuristic);
        assert_eq!(GcCause::new("CMS Final Remark").class(), CauseClass::Other);
    }
}
