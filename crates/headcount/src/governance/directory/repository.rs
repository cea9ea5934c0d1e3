use crate::governance::domain::{DepartmentId, Employee, EmployeeId, TurnoverEvent};
use crate::governance::storage::StoreError;

/// Storage abstraction for employee records. Records are never deleted; resignation is a field.
pub trait EmployeeRepository: Send + Sync {
    fn insert(&self, employee: Employee) -> Result<Employee, StoreError>;
    fn fetch(&self, id: &EmployeeId) -> Result<Option<Employee>, StoreError>;
    fn list(&self) -> Result<Vec<Employee>, StoreError>;
    /// Store `next` only if the persisted row still equals `expected`. Returns whether it did.
    fn replace_if(&self, expected: &Employee, next: Employee) -> Result<bool, StoreError>;
}

/// Append-only join/resign/transfer history.
pub trait TurnoverLog: Send + Sync {
    fn append(&self, event: TurnoverEvent) -> Result<(), StoreError>;
    fn events(&self) -> Result<Vec<TurnoverEvent>, StoreError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmployeeFilter {
    pub department_id: Option<DepartmentId>,
    pub active_only: bool,
}

impl EmployeeFilter {
    pub fn active_in(department_id: &DepartmentId) -> Self {
        Self {
            department_id: Some(department_id.clone()),
            active_only: true,
        }
    }

    pub fn matches(&self, employee: &Employee) -> bool {
        (!self.active_only || employee.is_active())
            && self
                .department_id
                .as_ref()
                .map_or(true, |department| &employee.department_id == department)
    }
}
