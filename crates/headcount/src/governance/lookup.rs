use super::domain::{DepartmentId, DepartmentProfile, Position, PositionId};
use super::storage::StoreError;

/// Read-only master data owned by the organization/department/position CRUD surface.
///
/// `Ok(None)` is authoritative: the engine reports it as `NotFound` without retrying.
pub trait MasterData: Send + Sync {
    fn department(&self, id: &DepartmentId) -> Result<Option<DepartmentProfile>, StoreError>;
    fn position(&self, id: &PositionId) -> Result<Option<Position>, StoreError>;
    fn departments(&self) -> Result<Vec<DepartmentProfile>, StoreError>;
}
