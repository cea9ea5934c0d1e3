//! Department capacity ledger: the single enforcement point of `occupied + reserved <= max`.
//!
//! Every mutation is a read-validate-conditional-write loop against versioned capacity rows.
//! A version conflict means another caller committed first; the loop reloads and revalidates
//! against the fresh figures, so a refusal always reports the state that caused it.

mod policy;
mod store;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::domain::DepartmentId;
use super::lookup::MasterData;
use super::storage::StoreError;

pub use policy::ContentionPolicy;
pub use store::{CapacityFigures, CapacityRecord, CapacityStore, CapacityWrite, SwapOutcome};

/// Read-side view of a department's capacity; always a committed state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapacitySnapshot {
    pub department_id: DepartmentId,
    pub max_headcount: u32,
    pub occupied: u32,
    pub reserved: u32,
    pub available: u32,
    pub version: u64,
}

impl From<&CapacityRecord> for CapacitySnapshot {
    fn from(record: &CapacityRecord) -> Self {
        Self {
            department_id: record.department_id.clone(),
            max_headcount: record.figures.max_headcount,
            occupied: record.figures.occupied,
            reserved: record.figures.reserved,
            available: record.figures.available(),
            version: record.version,
        }
    }
}

/// Quota held against a department until it is occupied or released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reservation {
    pub department_id: DepartmentId,
    pub amount: u32,
    pub snapshot: CapacitySnapshot,
}

/// Figures observed when a capacity check refused an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapacityShortfall {
    pub department_id: DepartmentId,
    pub requested: u32,
    pub max_headcount: u32,
    pub occupied: u32,
    pub reserved: u32,
}

impl CapacityShortfall {
    fn observed(record: &CapacityRecord, requested: u32, max_headcount: u32) -> Self {
        Self {
            department_id: record.department_id.clone(),
            requested,
            max_headcount,
            occupied: record.figures.occupied,
            reserved: record.figures.reserved,
        }
    }
}

impl fmt::Display for CapacityShortfall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "department {} would exceed its max headcount (max: {}, occupied: {}, reserved: {}, requested: {})",
            self.department_id, self.max_headcount, self.occupied, self.reserved, self.requested
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuotaError {
    #[error("department {0} has no capacity ledger")]
    UnknownDepartment(DepartmentId),
    #[error("department {0} already has a capacity ledger")]
    AlreadyRegistered(DepartmentId),
    #[error("{operation} amount must be at least 1")]
    InvalidAmount { operation: &'static str },
    #[error("cannot transfer headcount from department {0} to itself")]
    SelfTransfer(DepartmentId),
    #[error("{0}")]
    CapacityExceeded(CapacityShortfall),
    #[error("capacity update on {departments} abandoned after {attempts} conflicting attempts")]
    Contention { departments: String, attempts: u32 },
    #[error("capacity invariant violated on department {department_id}: {detail}")]
    InvariantViolation {
        department_id: DepartmentId,
        detail: String,
    },
    #[error(transparent)]
    Storage(#[from] StoreError),
}

fn invariant(department_id: &DepartmentId, operation: &'static str, detail: String) -> QuotaError {
    error!(department = %department_id, operation, %detail, "capacity invariant violation");
    QuotaError::InvariantViolation {
        department_id: department_id.clone(),
        detail,
    }
}

fn require_amount(operation: &'static str, amount: u32) -> Result<(), QuotaError> {
    if amount == 0 {
        return Err(QuotaError::InvalidAmount { operation });
    }
    Ok(())
}

fn add(record: &CapacityRecord, operation: &'static str, lhs: u32, rhs: u32) -> Result<u32, QuotaError> {
    lhs.checked_add(rhs)
        .ok_or_else(|| invariant(&record.department_id, operation, "counter overflow".to_string()))
}

/// Owns every write to department capacity figures.
pub struct HeadcountQuotaTracker {
    store: Arc<dyn CapacityStore>,
    lookup: Arc<dyn MasterData>,
    policy: ContentionPolicy,
}

impl HeadcountQuotaTracker {
    pub fn new(
        store: Arc<dyn CapacityStore>,
        lookup: Arc<dyn MasterData>,
        policy: ContentionPolicy,
    ) -> Self {
        Self {
            store,
            lookup,
            policy,
        }
    }

    pub fn policy(&self) -> &ContentionPolicy {
        &self.policy
    }

    /// Register the capacity ledger of a department known to master data.
    pub fn open_department(
        &self,
        department_id: &DepartmentId,
        max_headcount: u32,
    ) -> Result<CapacitySnapshot, QuotaError> {
        if self.lookup.department(department_id)?.is_none() {
            return Err(QuotaError::UnknownDepartment(department_id.clone()));
        }

        let record = CapacityRecord {
            department_id: department_id.clone(),
            figures: CapacityFigures {
                max_headcount,
                occupied: 0,
                reserved: 0,
            },
            version: 0,
        };
        self.store.insert(record.clone()).map_err(|err| match err {
            StoreError::Conflict(_) => QuotaError::AlreadyRegistered(department_id.clone()),
            other => QuotaError::Storage(other),
        })?;

        info!(department = %department_id, max_headcount, "capacity ledger opened");
        Ok(CapacitySnapshot::from(&record))
    }

    /// Change the authorized ceiling; refused while committed headcount sits above it.
    pub fn set_ceiling(
        &self,
        department_id: &DepartmentId,
        max_headcount: u32,
    ) -> Result<CapacitySnapshot, QuotaError> {
        let committed = self.commit_one("set_ceiling", department_id, |record| {
            let mut next = record.figures;
            next.max_headcount = max_headcount;
            if !next.is_consistent() {
                return Err(QuotaError::CapacityExceeded(CapacityShortfall::observed(
                    record,
                    0,
                    max_headcount,
                )));
            }
            Ok(next)
        })?;
        info!(department = %department_id, max_headcount, "capacity ceiling changed");
        Ok(CapacitySnapshot::from(&committed))
    }

    /// Atomically test `occupied + reserved + amount <= max` and hold `amount` as reserved.
    pub fn reserve(
        &self,
        department_id: &DepartmentId,
        amount: u32,
    ) -> Result<Reservation, QuotaError> {
        require_amount("reserve", amount)?;
        let committed = self.commit_one("reserve", department_id, |record| {
            if !record.figures.fits(amount) {
                return Err(QuotaError::CapacityExceeded(CapacityShortfall::observed(
                    record,
                    amount,
                    record.figures.max_headcount,
                )));
            }
            let mut next = record.figures;
            next.reserved = add(record, "reserve", next.reserved, amount)?;
            Ok(next)
        })?;
        debug!(department = %department_id, amount, reserved = committed.figures.reserved, "headcount reserved");

        Ok(Reservation {
            department_id: department_id.clone(),
            amount,
            snapshot: CapacitySnapshot::from(&committed),
        })
    }

    /// Return reserved headcount to the pool. Never clamps: over-release is an invariant violation.
    pub fn release(
        &self,
        department_id: &DepartmentId,
        amount: u32,
    ) -> Result<CapacitySnapshot, QuotaError> {
        require_amount("release", amount)?;
        let committed = self.commit_one("release", department_id, |record| {
            if record.figures.reserved < amount {
                return Err(invariant(
                    &record.department_id,
                    "release",
                    format!(
                        "release of {amount} exceeds reserved headcount {}",
                        record.figures.reserved
                    ),
                ));
            }
            let mut next = record.figures;
            next.reserved -= amount;
            Ok(next)
        })?;
        debug!(department = %department_id, amount, reserved = committed.figures.reserved, "reservation released");
        Ok(CapacitySnapshot::from(&committed))
    }

    /// Fill headcount. With `consumes_reservation` the amount moves from reserved to occupied;
    /// otherwise it is an unplanned hire subject to the same capacity check as `reserve`.
    pub fn occupy(
        &self,
        department_id: &DepartmentId,
        amount: u32,
        consumes_reservation: bool,
    ) -> Result<CapacitySnapshot, QuotaError> {
        require_amount("occupy", amount)?;
        let committed = self.commit_one("occupy", department_id, |record| {
            let mut next = record.figures;
            if consumes_reservation {
                if record.figures.reserved < amount {
                    return Err(invariant(
                        &record.department_id,
                        "occupy",
                        format!(
                            "hire of {amount} against reservation exceeds reserved headcount {}",
                            record.figures.reserved
                        ),
                    ));
                }
                next.reserved -= amount;
            } else if !record.figures.fits(amount) {
                return Err(QuotaError::CapacityExceeded(CapacityShortfall::observed(
                    record,
                    amount,
                    record.figures.max_headcount,
                )));
            }
            next.occupied = add(record, "occupy", next.occupied, amount)?;
            Ok(next)
        })?;
        debug!(
            department = %department_id,
            amount,
            consumes_reservation,
            occupied = committed.figures.occupied,
            "headcount occupied"
        );
        Ok(CapacitySnapshot::from(&committed))
    }

    /// Free occupied headcount after a resignation or outbound move.
    pub fn vacate(
        &self,
        department_id: &DepartmentId,
        amount: u32,
    ) -> Result<CapacitySnapshot, QuotaError> {
        require_amount("vacate", amount)?;
        let committed = self.commit_one("vacate", department_id, |record| {
            if record.figures.occupied < amount {
                return Err(invariant(
                    &record.department_id,
                    "vacate",
                    format!(
                        "vacate of {amount} exceeds occupied headcount {}",
                        record.figures.occupied
                    ),
                ));
            }
            let mut next = record.figures;
            next.occupied -= amount;
            Ok(next)
        })?;
        debug!(department = %department_id, amount, occupied = committed.figures.occupied, "headcount vacated");
        Ok(CapacitySnapshot::from(&committed))
    }

    /// Move occupied headcount between departments.
    ///
    /// Computed as `vacate(from)` followed by an unplanned `occupy(to)` and committed as one
    /// conditional write over both rows, so a refused destination leaves the source untouched
    /// and no reader ever observes the headcount in neither or both departments.
    pub fn transfer(
        &self,
        from: &DepartmentId,
        to: &DepartmentId,
        amount: u32,
    ) -> Result<(CapacitySnapshot, CapacitySnapshot), QuotaError> {
        require_amount("transfer", amount)?;
        if from == to {
            return Err(QuotaError::SelfTransfer(from.clone()));
        }

        let committed = self.commit("transfer", &[from, to], |records| {
            let (source, destination) = (&records[0], &records[1]);
            if source.figures.occupied < amount {
                return Err(invariant(
                    &source.department_id,
                    "transfer",
                    format!(
                        "transfer of {amount} exceeds occupied headcount {}",
                        source.figures.occupied
                    ),
                ));
            }
            if !destination.figures.fits(amount) {
                return Err(QuotaError::CapacityExceeded(CapacityShortfall::observed(
                    destination,
                    amount,
                    destination.figures.max_headcount,
                )));
            }

            let mut vacated = source.figures;
            vacated.occupied -= amount;
            let mut occupied = destination.figures;
            occupied.occupied = add(destination, "transfer", occupied.occupied, amount)?;
            Ok(vec![vacated, occupied])
        })?;

        debug!(from = %from, to = %to, amount, "headcount transferred");
        Ok((
            CapacitySnapshot::from(&committed[0]),
            CapacitySnapshot::from(&committed[1]),
        ))
    }

    /// Compensating inverse of [`occupy`](Self::occupy) for a hire whose record never landed.
    pub(crate) fn revert_occupy(
        &self,
        department_id: &DepartmentId,
        amount: u32,
        restore_reservation: bool,
    ) -> Result<CapacitySnapshot, QuotaError> {
        require_amount("revert_occupy", amount)?;
        let committed = self.commit_one("revert_occupy", department_id, |record| {
            if record.figures.occupied < amount {
                return Err(invariant(
                    &record.department_id,
                    "revert_occupy",
                    format!(
                        "revert of {amount} exceeds occupied headcount {}",
                        record.figures.occupied
                    ),
                ));
            }
            let mut next = record.figures;
            next.occupied -= amount;
            if restore_reservation {
                next.reserved = add(record, "revert_occupy", next.reserved, amount)?;
            }
            Ok(next)
        })?;
        warn!(department = %department_id, amount, restore_reservation, "occupy reverted");
        Ok(CapacitySnapshot::from(&committed))
    }

    pub fn snapshot(&self, department_id: &DepartmentId) -> Result<CapacitySnapshot, QuotaError> {
        let record = self.load(department_id)?;
        Ok(CapacitySnapshot::from(&record))
    }

    pub fn snapshots(&self) -> Result<Vec<CapacitySnapshot>, QuotaError> {
        let mut records = self.store.list()?;
        records.sort_by(|a, b| a.department_id.cmp(&b.department_id));
        Ok(records.iter().map(CapacitySnapshot::from).collect())
    }

    fn load(&self, department_id: &DepartmentId) -> Result<CapacityRecord, QuotaError> {
        self.store
            .load(department_id)?
            .ok_or_else(|| QuotaError::UnknownDepartment(department_id.clone()))
    }

    fn commit_one<F>(
        &self,
        operation: &'static str,
        department_id: &DepartmentId,
        plan: F,
    ) -> Result<CapacityRecord, QuotaError>
    where
        F: Fn(&CapacityRecord) -> Result<CapacityFigures, QuotaError>,
    {
        let mut committed = self.commit(operation, &[department_id], |records| {
            plan(&records[0]).map(|next| vec![next])
        })?;
        Ok(committed.remove(0))
    }

    /// Load, plan, and conditionally write the given rows until the write lands or the
    /// contention budget runs out. `plan` is re-run against fresh rows on every attempt.
    fn commit<F>(
        &self,
        operation: &'static str,
        departments: &[&DepartmentId],
        plan: F,
    ) -> Result<Vec<CapacityRecord>, QuotaError>
    where
        F: Fn(&[CapacityRecord]) -> Result<Vec<CapacityFigures>, QuotaError>,
    {
        let mut attempt = 0;
        loop {
            let current = departments
                .iter()
                .map(|id| self.load(id))
                .collect::<Result<Vec<_>, _>>()?;
            let next = plan(&current)?;

            for (record, figures) in current.iter().zip(&next) {
                if !figures.is_consistent() {
                    return Err(invariant(
                        &record.department_id,
                        operation,
                        format!(
                            "planned figures break the ceiling (max: {}, occupied: {}, reserved: {})",
                            figures.max_headcount, figures.occupied, figures.reserved
                        ),
                    ));
                }
            }

            let writes = current
                .iter()
                .zip(&next)
                .map(|(record, figures)| CapacityWrite::replacing(record, *figures))
                .collect::<Vec<_>>();

            match self.store.compare_and_swap(&writes)? {
                SwapOutcome::Committed => {
                    return Ok(current
                        .into_iter()
                        .zip(next)
                        .map(|(record, figures)| CapacityRecord {
                            department_id: record.department_id,
                            figures,
                            version: record.version + 1,
                        })
                        .collect());
                }
                SwapOutcome::VersionConflict => {
                    attempt += 1;
                    if self.policy.is_exhausted(attempt) {
                        let departments = departments
                            .iter()
                            .map(|id| id.as_str())
                            .collect::<Vec<_>>()
                            .join(", ");
                        warn!(operation, %departments, attempts = attempt, "capacity contention budget exhausted");
                        return Err(QuotaError::Contention {
                            departments,
                            attempts: attempt,
                        });
                    }
                    debug!(operation, attempt, "capacity version conflict, retrying");
                    let delay = self.policy.backoff_delay(attempt - 1);
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
            }
        }
    }
}
