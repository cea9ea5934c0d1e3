use serde::{Deserialize, Serialize};

use crate::governance::domain::DepartmentId;
use crate::governance::storage::StoreError;

/// Capacity figures of one department. `occupied + reserved <= max_headcount` in every committed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CapacityFigures {
    pub max_headcount: u32,
    pub occupied: u32,
    pub reserved: u32,
}

impl CapacityFigures {
    pub fn committed(&self) -> u64 {
        u64::from(self.occupied) + u64::from(self.reserved)
    }

    pub fn available(&self) -> u32 {
        let free = u64::from(self.max_headcount).saturating_sub(self.committed());
        u32::try_from(free).unwrap_or(u32::MAX)
    }

    /// Whether `extra` more headcount can be committed without breaking the ceiling.
    pub fn fits(&self, extra: u32) -> bool {
        self.committed() + u64::from(extra) <= u64::from(self.max_headcount)
    }

    pub fn is_consistent(&self) -> bool {
        self.fits(0)
    }
}

/// Versioned capacity row as persisted by a [`CapacityStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityRecord {
    pub department_id: DepartmentId,
    pub figures: CapacityFigures,
    pub version: u64,
}

/// One conditional write: applies `next` only if the row is still at `expected_version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityWrite {
    pub department_id: DepartmentId,
    pub expected_version: u64,
    pub next: CapacityFigures,
}

impl CapacityWrite {
    pub fn replacing(current: &CapacityRecord, next: CapacityFigures) -> Self {
        Self {
            department_id: current.department_id.clone(),
            expected_version: current.version,
            next,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapOutcome {
    Committed,
    VersionConflict,
}

/// Persistence port for department capacity rows.
///
/// `compare_and_swap` must be all-or-nothing across the batch: either every write's version
/// matches and all are applied (each bumping its version by one), or nothing changes.
pub trait CapacityStore: Send + Sync {
    fn insert(&self, record: CapacityRecord) -> Result<(), StoreError>;
    fn load(&self, department_id: &DepartmentId) -> Result<Option<CapacityRecord>, StoreError>;
    fn list(&self) -> Result<Vec<CapacityRecord>, StoreError>;
    fn compare_and_swap(&self, writes: &[CapacityWrite]) -> Result<SwapOutcome, StoreError>;
}
