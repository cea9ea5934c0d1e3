use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{error, info, warn};

use super::repository::{EmployeeFilter, EmployeeRepository, TurnoverLog};
use crate::governance::compensation::compensate;
use crate::governance::domain::{
    DepartmentId, DepartmentProfile, Employee, EmployeeAttributes, EmployeeId, PositionId,
    RequestNo, TurnoverEvent, TurnoverKind,
};
use crate::governance::lookup::MasterData;
use crate::governance::outcome::GovernanceError;
use crate::governance::quota::{HeadcountQuotaTracker, QuotaError};
use crate::governance::requests::RequestLifecycleManager;

/// Source of truth for who occupies headcount. Every change in occupancy goes through the
/// quota tracker first; the employee record follows only once capacity has been committed.
pub struct EmployeeDirectory {
    lookup: Arc<dyn MasterData>,
    employees: Arc<dyn EmployeeRepository>,
    turnover: Arc<dyn TurnoverLog>,
    quota: Arc<HeadcountQuotaTracker>,
    requests: Arc<RequestLifecycleManager>,
    compensation_attempts: u32,
    sequence: AtomicU64,
}

impl EmployeeDirectory {
    pub fn new(
        lookup: Arc<dyn MasterData>,
        employees: Arc<dyn EmployeeRepository>,
        turnover: Arc<dyn TurnoverLog>,
        quota: Arc<HeadcountQuotaTracker>,
        requests: Arc<RequestLifecycleManager>,
        compensation_attempts: u32,
    ) -> Self {
        Self {
            lookup,
            employees,
            turnover,
            quota,
            requests,
            compensation_attempts,
            sequence: AtomicU64::new(1),
        }
    }

    /// Hire into a department. With `fulfills` the hire consumes that request's reservation;
    /// without it the hire is unplanned and needs free capacity.
    pub fn hire(
        &self,
        department_id: &DepartmentId,
        position_id: &PositionId,
        attributes: EmployeeAttributes,
        fulfills: Option<&RequestNo>,
    ) -> Result<Employee, GovernanceError> {
        if attributes.first_name.trim().is_empty() {
            return Err(GovernanceError::Validation(
                "employee first name is required".to_string(),
            ));
        }
        self.placement(department_id, position_id)?;

        if let Some(request_no) = fulfills {
            self.requests.claim_fulfillment(request_no, department_id)?;
        }

        let consumes_reservation = fulfills.is_some();
        if let Err(err) = self.quota.occupy(department_id, 1, consumes_reservation) {
            if let QuotaError::CapacityExceeded(shortfall) = &err {
                warn!(
                    department = %department_id,
                    occupied = shortfall.occupied,
                    reserved = shortfall.reserved,
                    max_headcount = shortfall.max_headcount,
                    "unplanned hire refused: department is full"
                );
            }
            if let Some(request_no) = fulfills {
                self.requests.return_fulfillment(request_no)?;
            }
            return Err(err.into());
        }

        let employee = Employee {
            id: self.next_employee_id(),
            first_name: attributes.first_name.trim().to_string(),
            last_name: attributes.last_name.trim().to_string(),
            department_id: department_id.clone(),
            position_id: position_id.clone(),
            employment_type: attributes.employment_type,
            hire_date: attributes.hire_date,
            resign_date: None,
            fulfilled_request: fulfills.cloned(),
        };

        let stored = match self.employees.insert(employee) {
            Ok(stored) => stored,
            Err(err) => {
                error!(department = %department_id, error = %err, "employee insert failed; reverting occupancy");
                compensate(
                    "revert hire occupancy",
                    self.compensation_attempts,
                    self.quota.policy(),
                    || {
                        self.quota
                            .revert_occupy(department_id, 1, consumes_reservation)
                            .map(|_| ())
                            .map_err(GovernanceError::from)
                    },
                )?;
                if let Some(request_no) = fulfills {
                    self.requests.return_fulfillment(request_no)?;
                }
                return Err(err.into());
            }
        };

        self.log_turnover(TurnoverEvent {
            employee_id: stored.id.clone(),
            kind: TurnoverKind::Join,
            department_id: department_id.clone(),
            from_department_id: None,
            date: stored.hire_date,
            reason: fulfills.map(|request_no| format!("fulfills {request_no}")),
        });
        info!(
            employee = %stored.id,
            department = %department_id,
            request = fulfills.map(RequestNo::as_str).unwrap_or("unplanned"),
            "employee hired"
        );
        Ok(stored)
    }

    /// Mark a resignation and free the occupied slot. The record stays for history.
    pub fn resign(
        &self,
        employee_id: &EmployeeId,
        date: NaiveDate,
        reason: Option<&str>,
    ) -> Result<Employee, GovernanceError> {
        let employee = self.fetch_existing(employee_id)?;
        ensure_active(&employee, "resign")?;
        if date < employee.hire_date {
            return Err(GovernanceError::Validation(format!(
                "resign date {date} is before hire date {}",
                employee.hire_date
            )));
        }

        let mut resigned = employee.clone();
        resigned.resign_date = Some(date);
        self.claim(&employee, resigned.clone(), "resign")?;

        if let Err(err) = self.quota.vacate(&employee.department_id, 1) {
            self.restore(&resigned, &employee)?;
            return Err(err.into());
        }

        self.log_turnover(TurnoverEvent {
            employee_id: employee.id.clone(),
            kind: TurnoverKind::Resign,
            department_id: employee.department_id.clone(),
            from_department_id: None,
            date,
            reason: reason.map(str::to_string),
        });
        info!(employee = %employee.id, department = %employee.department_id, "employee resigned");
        Ok(resigned)
    }

    /// Move an employee to another department and position, capacity permitting.
    /// A refused move leaves both the employee and both departments as they were.
    pub fn transfer_department(
        &self,
        employee_id: &EmployeeId,
        department_id: &DepartmentId,
        position_id: &PositionId,
        date: NaiveDate,
    ) -> Result<Employee, GovernanceError> {
        let employee = self.fetch_existing(employee_id)?;
        ensure_active(&employee, "transfer")?;
        if &employee.department_id == department_id {
            return Err(GovernanceError::NoOp(format!(
                "employee {} is already in department {}",
                employee.id, department_id
            )));
        }
        self.placement(department_id, position_id)?;

        let mut moved = employee.clone();
        moved.department_id = department_id.clone();
        moved.position_id = position_id.clone();
        self.claim(&employee, moved.clone(), "transfer")?;

        if let Err(err) = self
            .quota
            .transfer(&employee.department_id, department_id, 1)
        {
            self.restore(&moved, &employee)?;
            if let QuotaError::CapacityExceeded(shortfall) = &err {
                warn!(
                    employee = %employee.id,
                    from = %employee.department_id,
                    to = %department_id,
                    occupied = shortfall.occupied,
                    max_headcount = shortfall.max_headcount,
                    "transfer refused: destination is full"
                );
            }
            return Err(err.into());
        }

        self.log_turnover(TurnoverEvent {
            employee_id: employee.id.clone(),
            kind: TurnoverKind::Transfer,
            department_id: department_id.clone(),
            from_department_id: Some(employee.department_id.clone()),
            date,
            reason: None,
        });
        info!(
            employee = %employee.id,
            from = %employee.department_id,
            to = %department_id,
            "employee transferred"
        );
        Ok(moved)
    }

    pub fn get(&self, employee_id: &EmployeeId) -> Result<Employee, GovernanceError> {
        self.fetch_existing(employee_id)
    }

    pub fn list(&self, filter: &EmployeeFilter) -> Result<Vec<Employee>, GovernanceError> {
        let mut employees = self
            .employees
            .list()?
            .into_iter()
            .filter(|employee| filter.matches(employee))
            .collect::<Vec<_>>();
        employees.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(employees)
    }

    /// Active employees in a department, counted from the records themselves.
    pub fn active_headcount(&self, department_id: &DepartmentId) -> Result<u32, GovernanceError> {
        let count = self.list(&EmployeeFilter::active_in(department_id))?.len();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    pub fn turnover(&self) -> Result<Vec<TurnoverEvent>, GovernanceError> {
        Ok(self.turnover.events()?)
    }

    /// Validate that the department exists and the position belongs to it.
    fn placement(
        &self,
        department_id: &DepartmentId,
        position_id: &PositionId,
    ) -> Result<DepartmentProfile, GovernanceError> {
        let department = self
            .lookup
            .department(department_id)?
            .ok_or_else(|| GovernanceError::not_found("department", department_id))?;
        let position = self
            .lookup
            .position(position_id)?
            .ok_or_else(|| GovernanceError::not_found("position", position_id))?;
        if position.department_id != department.id {
            return Err(GovernanceError::Validation(format!(
                "position '{}' does not belong to department '{}'",
                position.title, department.name
            )));
        }
        Ok(department)
    }

    fn fetch_existing(&self, employee_id: &EmployeeId) -> Result<Employee, GovernanceError> {
        self.employees
            .fetch(employee_id)?
            .ok_or_else(|| GovernanceError::not_found("employee", employee_id))
    }

    /// Conditionally write the employee change ahead of the quota call, so two concurrent
    /// resignations or transfers of the same person cannot both move capacity.
    fn claim(
        &self,
        current: &Employee,
        next: Employee,
        action: &'static str,
    ) -> Result<(), GovernanceError> {
        if self.employees.replace_if(current, next)? {
            return Ok(());
        }

        let latest = self.fetch_existing(&current.id)?;
        ensure_active(&latest, action)?;
        Err(GovernanceError::Contention {
            resource: format!("employee {}", current.id),
            attempts: 1,
        })
    }

    fn restore(&self, claimed: &Employee, original: &Employee) -> Result<(), GovernanceError> {
        compensate("restore employee", self.compensation_attempts, self.quota.policy(), || {
            if self.employees.replace_if(claimed, original.clone())? {
                Ok(())
            } else {
                error!(employee = %original.id, "employee changed while its update was being rolled back");
                Err(GovernanceError::InvariantViolation(format!(
                    "employee {} changed during rollback",
                    original.id
                )))
            }
        })
    }

    fn log_turnover(&self, event: TurnoverEvent) {
        if let Err(err) = self.turnover.append(event) {
            warn!(error = %err, "turnover event not recorded");
        }
    }

    fn next_employee_id(&self) -> EmployeeId {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed);
        EmployeeId(format!("EMP-{id:06}"))
    }
}

fn ensure_active(employee: &Employee, action: &'static str) -> Result<(), GovernanceError> {
    match employee.resign_date {
        None => Ok(()),
        Some(date) => Err(GovernanceError::InvalidTransition {
            subject: format!("employee {}", employee.id),
            status: format!("resigned on {date}"),
            action,
        }),
    }
}
