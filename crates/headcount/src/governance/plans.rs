//! Manpower plans: yearly headcount targets compared against an occupancy snapshot.
//!
//! Read-mostly and outside the consistency path: plans read capacity snapshots but never
//! write to the quota tracker, the directory, or requests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::domain::{DepartmentId, ManpowerPlan, PlanId, PositionId};
use super::lookup::MasterData;
use super::outcome::GovernanceError;
use super::quota::HeadcountQuotaTracker;
use super::storage::StoreError;

pub trait PlanRepository: Send + Sync {
    fn insert(&self, plan: ManpowerPlan) -> Result<ManpowerPlan, StoreError>;
    fn fetch(&self, id: &PlanId) -> Result<Option<ManpowerPlan>, StoreError>;
    /// Fails with `StoreError::NotFound` when the plan does not exist.
    fn update(&self, plan: ManpowerPlan) -> Result<(), StoreError>;
    fn delete(&self, id: &PlanId) -> Result<bool, StoreError>;
    fn list(&self) -> Result<Vec<ManpowerPlan>, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewManpowerPlan {
    pub department_id: DepartmentId,
    pub position_id: PositionId,
    pub year: i32,
    pub planned_headcount: u32,
}

/// Partial update. Moving the plan (or asking for a refresh) re-reads the occupancy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanChanges {
    #[serde(default)]
    pub department_id: Option<DepartmentId>,
    #[serde(default)]
    pub position_id: Option<PositionId>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub planned_headcount: Option<u32>,
    #[serde(default)]
    pub refresh_snapshot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanDeficit {
    #[serde(flatten)]
    pub plan: ManpowerPlan,
    pub shortfall: u32,
}

pub struct ManpowerPlanTracker {
    lookup: Arc<dyn MasterData>,
    plans: Arc<dyn PlanRepository>,
    quota: Arc<HeadcountQuotaTracker>,
    sequence: AtomicU64,
}

impl ManpowerPlanTracker {
    pub fn new(
        lookup: Arc<dyn MasterData>,
        plans: Arc<dyn PlanRepository>,
        quota: Arc<HeadcountQuotaTracker>,
    ) -> Self {
        Self {
            lookup,
            plans,
            quota,
            sequence: AtomicU64::new(1),
        }
    }

    pub fn create(&self, plan: NewManpowerPlan) -> Result<ManpowerPlan, GovernanceError> {
        validate_year(plan.year)?;
        self.validate_placement(&plan.department_id, &plan.position_id)?;
        let occupied = self.quota.snapshot(&plan.department_id)?.occupied;

        let id = self.sequence.fetch_add(1, Ordering::Relaxed);
        let stored = self.plans.insert(ManpowerPlan {
            id: PlanId(format!("PLAN-{id:04}")),
            department_id: plan.department_id,
            position_id: plan.position_id,
            year: plan.year,
            planned_headcount: plan.planned_headcount,
            occupied_snapshot: occupied,
            snapshot_at: Utc::now(),
        })?;
        info!(plan = %stored.id, department = %stored.department_id, year = stored.year, "manpower plan created");
        Ok(stored)
    }

    pub fn update(&self, id: &PlanId, changes: PlanChanges) -> Result<ManpowerPlan, GovernanceError> {
        let mut plan = self
            .plans
            .fetch(id)?
            .ok_or_else(|| GovernanceError::not_found("manpower plan", id))?;

        let moved = changes.department_id.is_some() || changes.position_id.is_some();
        let resnapshot = moved || changes.refresh_snapshot;
        if let Some(department_id) = changes.department_id {
            plan.department_id = department_id;
        }
        if let Some(position_id) = changes.position_id {
            plan.position_id = position_id;
        }
        if let Some(year) = changes.year {
            validate_year(year)?;
            plan.year = year;
        }
        if let Some(planned) = changes.planned_headcount {
            plan.planned_headcount = planned;
        }

        if moved {
            self.validate_placement(&plan.department_id, &plan.position_id)?;
        }
        if resnapshot {
            plan.occupied_snapshot = self.quota.snapshot(&plan.department_id)?.occupied;
            plan.snapshot_at = Utc::now();
        }

        self.plans.update(plan.clone()).map_err(|err| match err {
            StoreError::NotFound(_) => GovernanceError::not_found("manpower plan", id),
            other => other.into(),
        })?;
        Ok(plan)
    }

    pub fn delete(&self, id: &PlanId) -> Result<(), GovernanceError> {
        if self.plans.delete(id)? {
            info!(plan = %id, "manpower plan deleted");
            Ok(())
        } else {
            Err(GovernanceError::not_found("manpower plan", id))
        }
    }

    pub fn list(&self) -> Result<Vec<ManpowerPlan>, GovernanceError> {
        let mut plans = self.plans.list()?;
        plans.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(plans)
    }

    /// Plans whose target exceeds the occupancy recorded with them, largest gap first.
    pub fn deficit(&self) -> Result<Vec<PlanDeficit>, GovernanceError> {
        let mut deficits = self
            .list()?
            .into_iter()
            .filter(|plan| plan.planned_headcount > plan.occupied_snapshot)
            .map(|plan| PlanDeficit {
                shortfall: plan.shortfall(),
                plan,
            })
            .collect::<Vec<_>>();
        deficits.sort_by(|a, b| {
            b.shortfall
                .cmp(&a.shortfall)
                .then_with(|| a.plan.id.cmp(&b.plan.id))
        });
        Ok(deficits)
    }

    fn validate_placement(
        &self,
        department_id: &DepartmentId,
        position_id: &PositionId,
    ) -> Result<(), GovernanceError> {
        self.lookup
            .department(department_id)?
            .ok_or_else(|| GovernanceError::not_found("department", department_id))?;
        let position = self
            .lookup
            .position(position_id)?
            .ok_or_else(|| GovernanceError::not_found("position", position_id))?;
        if &position.department_id != department_id {
            return Err(GovernanceError::Validation(format!(
                "position '{}' does not belong to department {}",
                position.title, department_id
            )));
        }
        Ok(())
    }
}

fn validate_year(year: i32) -> Result<(), GovernanceError> {
    if (1900..=9999).contains(&year) {
        Ok(())
    } else {
        Err(GovernanceError::Validation(format!(
            "plan year {year} is out of range"
        )))
    }
}
