//! Headcount governance: manpower request approvals and the department capacity ledger.
//!
//! [`HeadcountEngine`] wires the components together over a set of persistence ports.
//! Department capacity is written only by [`HeadcountQuotaTracker`]; requests only by
//! [`RequestLifecycleManager`]; approval rows only by [`ApprovalLedger`].

pub(crate) mod compensation;
pub mod directory;
pub mod domain;
pub mod ledger;
pub mod lookup;
pub mod memory;
pub mod outcome;
pub mod plans;
pub mod quota;
pub mod requests;
pub mod router;
pub mod seed;
pub mod storage;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use serde::Serialize;

use crate::config::GovernanceConfig;

pub use directory::{EmployeeDirectory, EmployeeFilter, EmployeeRepository, TurnoverLog};
pub use domain::{
    Actor, ActorId, Approval, ApprovalOutcome, DepartmentId, DepartmentProfile, Employee,
    EmployeeAttributes, EmployeeId, EmploymentType, ManpowerPlan, ManpowerRequest,
    NewManpowerRequest, PlanId, Position, PositionId, RequestNo, RequestStatus, RequestType,
    Role, TurnoverEvent, TurnoverKind,
};
pub use ledger::{ApprovalHistory, ApprovalLedger, ApprovalStore};
pub use lookup::MasterData;
pub use outcome::{GovernanceError, OutcomeClass};
pub use plans::{ManpowerPlanTracker, NewManpowerPlan, PlanChanges, PlanDeficit, PlanRepository};
pub use quota::{
    CapacityShortfall, CapacitySnapshot, CapacityStore, ContentionPolicy, HeadcountQuotaTracker,
    QuotaError, Reservation,
};
pub use requests::{
    Decision, LifecycleSettings, RequestFilter, RequestLifecycleManager, RequestRepository,
};
pub use router::governance_router;
pub use storage::StoreError;

/// Every persistence port the engine needs.
#[derive(Clone)]
pub struct EngineStores {
    pub master: Arc<dyn MasterData>,
    pub capacity: Arc<dyn CapacityStore>,
    pub requests: Arc<dyn RequestRepository>,
    pub approvals: Arc<dyn ApprovalStore>,
    pub employees: Arc<dyn EmployeeRepository>,
    pub turnover: Arc<dyn TurnoverLog>,
    pub plans: Arc<dyn PlanRepository>,
}

impl EngineStores {
    /// Mutex-backed stores over the given master data.
    pub fn in_memory(master: Arc<dyn MasterData>) -> Self {
        Self {
            master,
            capacity: Arc::new(memory::InMemoryCapacityStore::default()),
            requests: Arc::new(memory::InMemoryRequestRepository::default()),
            approvals: Arc::new(memory::InMemoryApprovalStore::default()),
            employees: Arc::new(memory::InMemoryEmployeeRepository::default()),
            turnover: Arc::new(memory::InMemoryTurnoverLog::default()),
            plans: Arc::new(memory::InMemoryPlanRepository::default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub contention: ContentionPolicy,
    pub lifecycle: LifecycleSettings,
}

impl EngineSettings {
    pub fn from_config(config: &GovernanceConfig) -> Self {
        Self {
            contention: ContentionPolicy::from_config(config),
            lifecycle: LifecycleSettings::from_config(config),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&GovernanceConfig::default())
    }
}

/// Capacity figures joined with the department's master data and live staff count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepartmentCapacity {
    pub department: DepartmentProfile,
    pub capacity: CapacitySnapshot,
    pub active_employees: u32,
}

pub struct HeadcountEngine {
    master: Arc<dyn MasterData>,
    quota: Arc<HeadcountQuotaTracker>,
    ledger: Arc<ApprovalLedger>,
    requests: Arc<RequestLifecycleManager>,
    directory: Arc<EmployeeDirectory>,
    plans: Arc<ManpowerPlanTracker>,
}

impl HeadcountEngine {
    pub fn new(stores: EngineStores, settings: EngineSettings) -> Self {
        let quota = Arc::new(HeadcountQuotaTracker::new(
            stores.capacity,
            stores.master.clone(),
            settings.contention,
        ));
        let ledger = Arc::new(ApprovalLedger::new(stores.approvals));
        let compensation_attempts = settings.lifecycle.compensation_attempts;
        let requests = Arc::new(RequestLifecycleManager::new(
            stores.master.clone(),
            stores.requests,
            ledger.clone(),
            quota.clone(),
            settings.lifecycle,
        ));
        let directory = Arc::new(EmployeeDirectory::new(
            stores.master.clone(),
            stores.employees,
            stores.turnover,
            quota.clone(),
            requests.clone(),
            compensation_attempts,
        ));
        let plans = Arc::new(ManpowerPlanTracker::new(
            stores.master.clone(),
            stores.plans,
            quota.clone(),
        ));

        Self {
            master: stores.master,
            quota,
            ledger,
            requests,
            directory,
            plans,
        }
    }

    pub fn in_memory(master: Arc<dyn MasterData>, settings: EngineSettings) -> Self {
        Self::new(EngineStores::in_memory(master), settings)
    }

    pub fn quota(&self) -> &HeadcountQuotaTracker {
        &self.quota
    }

    pub fn ledger(&self) -> &ApprovalLedger {
        &self.ledger
    }

    pub fn requests(&self) -> &RequestLifecycleManager {
        &self.requests
    }

    pub fn directory(&self) -> &EmployeeDirectory {
        &self.directory
    }

    pub fn plans(&self) -> &ManpowerPlanTracker {
        &self.plans
    }

    /// Headcount summary of every department that has a capacity ledger.
    pub fn capacity_overview(&self) -> Result<Vec<DepartmentCapacity>, GovernanceError> {
        let mut overview = Vec::new();
        for capacity in self.quota.snapshots()? {
            let department = self
                .master
                .department(&capacity.department_id)?
                .ok_or_else(|| GovernanceError::not_found("department", &capacity.department_id))?;
            let active_employees = self.directory.active_headcount(&department.id)?;
            overview.push(DepartmentCapacity {
                department,
                capacity,
                active_employees,
            });
        }
        Ok(overview)
    }
}
