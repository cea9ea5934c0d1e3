//! Mutex-backed implementations of every persistence port, used by the API binary and tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::directory::{EmployeeRepository, TurnoverLog};
use super::domain::{
    Approval, DepartmentId, DepartmentProfile, Employee, EmployeeId, ManpowerPlan,
    ManpowerRequest, PlanId, Position, PositionId, RequestNo, TurnoverEvent,
};
use super::ledger::ApprovalStore;
use super::lookup::MasterData;
use super::plans::PlanRepository;
use super::quota::{CapacityRecord, CapacityStore, CapacityWrite, SwapOutcome};
use super::requests::{RequestFilter, RequestRepository};
use super::storage::StoreError;

fn lock<'a, T>(mutex: &'a Mutex<T>, name: &str) -> Result<MutexGuard<'a, T>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::Unavailable(format!("{name} mutex poisoned")))
}

#[derive(Default, Clone)]
pub struct InMemoryMasterData {
    departments: Arc<Mutex<HashMap<DepartmentId, DepartmentProfile>>>,
    positions: Arc<Mutex<HashMap<PositionId, Position>>>,
}

impl InMemoryMasterData {
    pub fn register_department(&self, department: DepartmentProfile) -> Result<(), StoreError> {
        let mut guard = lock(&self.departments, "department")?;
        if guard.contains_key(&department.id) {
            return Err(StoreError::Conflict(department.id.to_string()));
        }
        guard.insert(department.id.clone(), department);
        Ok(())
    }

    pub fn register_position(&self, position: Position) -> Result<(), StoreError> {
        let mut guard = lock(&self.positions, "position")?;
        if guard.contains_key(&position.id) {
            return Err(StoreError::Conflict(position.id.to_string()));
        }
        guard.insert(position.id.clone(), position);
        Ok(())
    }
}

impl MasterData for InMemoryMasterData {
    fn department(&self, id: &DepartmentId) -> Result<Option<DepartmentProfile>, StoreError> {
        Ok(lock(&self.departments, "department")?.get(id).cloned())
    }

    fn position(&self, id: &PositionId) -> Result<Option<Position>, StoreError> {
        Ok(lock(&self.positions, "position")?.get(id).cloned())
    }

    fn departments(&self) -> Result<Vec<DepartmentProfile>, StoreError> {
        let mut departments = lock(&self.departments, "department")?
            .values()
            .cloned()
            .collect::<Vec<_>>();
        departments.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(departments)
    }
}

/// One mutex over all rows, so a multi-row swap is checked and applied under a single lock.
#[derive(Default, Clone)]
pub struct InMemoryCapacityStore {
    rows: Arc<Mutex<HashMap<DepartmentId, CapacityRecord>>>,
}

impl CapacityStore for InMemoryCapacityStore {
    fn insert(&self, record: CapacityRecord) -> Result<(), StoreError> {
        let mut guard = lock(&self.rows, "capacity")?;
        if guard.contains_key(&record.department_id) {
            return Err(StoreError::Conflict(record.department_id.to_string()));
        }
        guard.insert(record.department_id.clone(), record);
        Ok(())
    }

    fn load(&self, department_id: &DepartmentId) -> Result<Option<CapacityRecord>, StoreError> {
        Ok(lock(&self.rows, "capacity")?.get(department_id).cloned())
    }

    fn list(&self) -> Result<Vec<CapacityRecord>, StoreError> {
        Ok(lock(&self.rows, "capacity")?.values().cloned().collect())
    }

    fn compare_and_swap(&self, writes: &[CapacityWrite]) -> Result<SwapOutcome, StoreError> {
        let mut guard = lock(&self.rows, "capacity")?;
        for write in writes {
            match guard.get(&write.department_id) {
                None => return Err(StoreError::NotFound(write.department_id.to_string())),
                Some(row) if row.version != write.expected_version => {
                    return Ok(SwapOutcome::VersionConflict)
                }
                Some(_) => {}
            }
        }
        for write in writes {
            if let Some(row) = guard.get_mut(&write.department_id) {
                row.figures = write.next;
                row.version += 1;
            }
        }
        Ok(SwapOutcome::Committed)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryRequestRepository {
    records: Arc<Mutex<HashMap<RequestNo, ManpowerRequest>>>,
}

impl RequestRepository for InMemoryRequestRepository {
    fn insert(&self, request: ManpowerRequest) -> Result<ManpowerRequest, StoreError> {
        let mut guard = lock(&self.records, "request")?;
        if guard.contains_key(&request.request_no) {
            return Err(StoreError::Conflict(request.request_no.to_string()));
        }
        guard.insert(request.request_no.clone(), request.clone());
        Ok(request)
    }

    fn fetch(&self, request_no: &RequestNo) -> Result<Option<ManpowerRequest>, StoreError> {
        Ok(lock(&self.records, "request")?.get(request_no).cloned())
    }

    fn list(&self, filter: &RequestFilter) -> Result<Vec<ManpowerRequest>, StoreError> {
        Ok(lock(&self.records, "request")?
            .values()
            .filter(|request| filter.matches(request))
            .cloned()
            .collect())
    }

    fn replace_if(
        &self,
        expected: &ManpowerRequest,
        next: ManpowerRequest,
    ) -> Result<bool, StoreError> {
        let mut guard = lock(&self.records, "request")?;
        match guard.get_mut(&expected.request_no) {
            Some(current) if current == expected => {
                *current = next;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(expected.request_no.to_string())),
        }
    }
}

#[derive(Default, Clone)]
pub struct InMemoryApprovalStore {
    rows: Arc<Mutex<Vec<Approval>>>,
}

impl ApprovalStore for InMemoryApprovalStore {
    fn append(&self, approval: Approval) -> Result<Approval, StoreError> {
        lock(&self.rows, "approval")?.push(approval.clone());
        Ok(approval)
    }

    fn for_request(&self, request_no: &RequestNo) -> Result<Vec<Approval>, StoreError> {
        Ok(lock(&self.rows, "approval")?
            .iter()
            .filter(|row| &row.request_no == request_no)
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryEmployeeRepository {
    records: Arc<Mutex<HashMap<EmployeeId, Employee>>>,
}

impl EmployeeRepository for InMemoryEmployeeRepository {
    fn insert(&self, employee: Employee) -> Result<Employee, StoreError> {
        let mut guard = lock(&self.records, "employee")?;
        if guard.contains_key(&employee.id) {
            return Err(StoreError::Conflict(employee.id.to_string()));
        }
        guard.insert(employee.id.clone(), employee.clone());
        Ok(employee)
    }

    fn fetch(&self, id: &EmployeeId) -> Result<Option<Employee>, StoreError> {
        Ok(lock(&self.records, "employee")?.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<Employee>, StoreError> {
        Ok(lock(&self.records, "employee")?.values().cloned().collect())
    }

    fn replace_if(&self, expected: &Employee, next: Employee) -> Result<bool, StoreError> {
        let mut guard = lock(&self.records, "employee")?;
        match guard.get_mut(&expected.id) {
            Some(current) if current == expected => {
                *current = next;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(expected.id.to_string())),
        }
    }
}

#[derive(Default, Clone)]
pub struct InMemoryTurnoverLog {
    events: Arc<Mutex<Vec<TurnoverEvent>>>,
}

impl TurnoverLog for InMemoryTurnoverLog {
    fn append(&self, event: TurnoverEvent) -> Result<(), StoreError> {
        lock(&self.events, "turnover")?.push(event);
        Ok(())
    }

    fn events(&self) -> Result<Vec<TurnoverEvent>, StoreError> {
        Ok(lock(&self.events, "turnover")?.clone())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryPlanRepository {
    records: Arc<Mutex<HashMap<PlanId, ManpowerPlan>>>,
}

impl PlanRepository for InMemoryPlanRepository {
    fn insert(&self, plan: ManpowerPlan) -> Result<ManpowerPlan, StoreError> {
        let mut guard = lock(&self.records, "plan")?;
        if guard.contains_key(&plan.id) {
            return Err(StoreError::Conflict(plan.id.to_string()));
        }
        guard.insert(plan.id.clone(), plan.clone());
        Ok(plan)
    }

    fn fetch(&self, id: &PlanId) -> Result<Option<ManpowerPlan>, StoreError> {
        Ok(lock(&self.records, "plan")?.get(id).cloned())
    }

    fn update(&self, plan: ManpowerPlan) -> Result<(), StoreError> {
        let mut guard = lock(&self.records, "plan")?;
        match guard.get_mut(&plan.id) {
            Some(current) => {
                *current = plan;
                Ok(())
            }
            None => Err(StoreError::NotFound(plan.id.to_string())),
        }
    }

    fn delete(&self, id: &PlanId) -> Result<bool, StoreError> {
        Ok(lock(&self.records, "plan")?.remove(id).is_some())
    }

    fn list(&self) -> Result<Vec<ManpowerPlan>, StoreError> {
        Ok(lock(&self.records, "plan")?.values().cloned().collect())
    }
}
