use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use super::repository::{RequestFilter, RequestRepository};
use crate::config::GovernanceConfig;
use crate::governance::compensation;
use crate::governance::domain::{
    Actor, Approval, ApprovalOutcome, DepartmentId, DepartmentProfile, Fulfillment,
    ManpowerRequest, NewManpowerRequest, RequestNo, RequestStatus, APPROVAL_LEVEL,
    REJECTION_LEVEL,
};
use crate::governance::ledger::{ApprovalHistory, ApprovalLedger};
use crate::governance::lookup::MasterData;
use crate::governance::outcome::GovernanceError;
use crate::governance::quota::{HeadcountQuotaTracker, QuotaError};
use crate::governance::storage::StoreError;

const DEFAULT_APPROVAL_COMMENT: &str = "Approved within department capacity";

/// Policy knobs for compensation and reservation expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleSettings {
    pub compensation_attempts: u32,
    pub reservation_ttl: Option<Duration>,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self::from_config(&GovernanceConfig::default())
    }
}

impl LifecycleSettings {
    pub fn from_config(config: &GovernanceConfig) -> Self {
        Self {
            compensation_attempts: config.compensation_attempts.max(1),
            reservation_ttl: config
                .reservation_ttl_days
                .map(|days| Duration::days(i64::from(days))),
        }
    }
}

/// A committed approval or rejection together with its ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub request: ManpowerRequest,
    pub approval: Approval,
}

/// Owns the manpower request state machine.
///
/// ```text
/// Draft ──submit──▶ WaitingApproval ──approve──▶ Approved
///   │                    │  └──────reject──────▶ Rejected
///   └──────cancel────────┴─────────cancel──────▶ Cancelled
/// ```
pub struct RequestLifecycleManager {
    lookup: Arc<dyn MasterData>,
    repository: Arc<dyn RequestRepository>,
    ledger: Arc<ApprovalLedger>,
    quota: Arc<HeadcountQuotaTracker>,
    settings: LifecycleSettings,
    sequence: AtomicU64,
}

impl RequestLifecycleManager {
    pub fn new(
        lookup: Arc<dyn MasterData>,
        repository: Arc<dyn RequestRepository>,
        ledger: Arc<ApprovalLedger>,
        quota: Arc<HeadcountQuotaTracker>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            lookup,
            repository,
            ledger,
            quota,
            settings,
            sequence: AtomicU64::new(1),
        }
    }

    /// Submit a request straight into `WaitingApproval`. Capacity is not checked until approval.
    pub fn create_request(
        &self,
        request: NewManpowerRequest,
        creator: &Actor,
    ) -> Result<ManpowerRequest, GovernanceError> {
        self.persist(request, creator, RequestStatus::WaitingApproval)
    }

    /// Save a request as `Draft` for later submission.
    pub fn save_draft(
        &self,
        request: NewManpowerRequest,
        creator: &Actor,
    ) -> Result<ManpowerRequest, GovernanceError> {
        self.persist(request, creator, RequestStatus::Draft)
    }

    pub fn submit_draft(
        &self,
        request_no: &RequestNo,
        actor: &Actor,
    ) -> Result<ManpowerRequest, GovernanceError> {
        let (_, submitted) = self.update_request(request_no, |current| {
            expect_status(current, &[RequestStatus::Draft], "submit")?;
            let mut next = current.clone();
            next.status = RequestStatus::WaitingApproval;
            Ok(next)
        })?;
        info!(request = %request_no, actor = %actor.id, "draft submitted for approval");
        Ok(submitted)
    }

    /// Reserve the requested headcount and approve. A refused reservation leaves no trace.
    ///
    /// The approver first claims the request, so a duplicate approval is turned away before
    /// it can touch quota. The ledger row is written before the request flips to `Approved`.
    pub fn approve(
        &self,
        request_no: &RequestNo,
        approver: &Actor,
        comment: Option<&str>,
    ) -> Result<Decision, GovernanceError> {
        let claimed = self.claim_decision(request_no, approver, "approve")?;
        let amount = claimed.requested_headcount;
        let department_id = claimed.department_id.clone();

        let reservation = match self.quota.reserve(&department_id, amount) {
            Ok(reservation) => reservation,
            Err(err) => {
                if let QuotaError::CapacityExceeded(shortfall) = &err {
                    warn!(
                        request = %request_no,
                        department = %department_id,
                        requested = amount,
                        occupied = shortfall.occupied,
                        reserved = shortfall.reserved,
                        max_headcount = shortfall.max_headcount,
                        "approval refused: department capacity exceeded"
                    );
                }
                self.release_decision(request_no, approver)?;
                return Err(err.into());
            }
        };

        let decided_at = Utc::now();
        let comment = comment
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .unwrap_or(DEFAULT_APPROVAL_COMMENT);
        let approval = match self.ledger.record(
            request_no,
            &approver.id,
            ApprovalOutcome::Approved,
            APPROVAL_LEVEL,
            comment,
            decided_at,
        ) {
            Ok(approval) => approval,
            Err(err) => {
                error!(request = %request_no, error = %err, "approval ledger write failed; rolling back");
                self.compensate_release(&department_id, amount)?;
                self.release_decision(request_no, approver)?;
                return Err(err.into());
            }
        };

        let approved = self.commit_decision(request_no, approver, |next| {
            next.status = RequestStatus::Approved;
            next.approved_headcount = amount;
            next.decided_at = Some(decided_at);
        })?;

        info!(
            request = %request_no,
            department = %department_id,
            approver = %approver.id,
            amount,
            reserved = reservation.snapshot.reserved,
            max_headcount = reservation.snapshot.max_headcount,
            "request approved"
        );
        Ok(Decision {
            request: approved,
            approval,
        })
    }

    /// Reject with a mandatory comment. Nothing was reserved, so quota is untouched.
    pub fn reject(
        &self,
        request_no: &RequestNo,
        approver: &Actor,
        comment: &str,
    ) -> Result<Decision, GovernanceError> {
        let comment = comment.trim();
        if comment.is_empty() {
            return Err(GovernanceError::Validation(
                "a comment is required to reject a request".to_string(),
            ));
        }

        self.claim_decision(request_no, approver, "reject")?;
        let decided_at = Utc::now();
        let approval = match self.ledger.record(
            request_no,
            &approver.id,
            ApprovalOutcome::Rejected,
            REJECTION_LEVEL,
            comment,
            decided_at,
        ) {
            Ok(approval) => approval,
            Err(err) => {
                error!(request = %request_no, error = %err, "rejection ledger write failed; rolling back");
                self.release_decision(request_no, approver)?;
                return Err(err.into());
            }
        };

        let rejected = self.commit_decision(request_no, approver, |next| {
            next.status = RequestStatus::Rejected;
            next.decided_at = Some(decided_at);
        })?;

        info!(request = %request_no, approver = %approver.id, "request rejected");
        Ok(Decision {
            request: rejected,
            approval,
        })
    }

    /// Withdraw a draft or pending request.
    pub fn cancel(
        &self,
        request_no: &RequestNo,
        actor: &Actor,
        reason: Option<&str>,
    ) -> Result<ManpowerRequest, GovernanceError> {
        let decided_at = Utc::now();
        let (_, cancelled) = self.update_request(request_no, |current| {
            expect_status(
                current,
                &[RequestStatus::Draft, RequestStatus::WaitingApproval],
                "cancel",
            )?;
            expect_unclaimed(current, "cancel")?;
            let mut next = current.clone();
            next.status = RequestStatus::Cancelled;
            next.decided_at = Some(decided_at);
            Ok(next)
        })?;
        info!(request = %request_no, actor = %actor.id, reason = reason.unwrap_or(""), "request cancelled");
        Ok(cancelled)
    }

    /// Give back whatever an approved request still holds in reserve.
    pub fn close_reservation(
        &self,
        request_no: &RequestNo,
        actor: &Actor,
    ) -> Result<ManpowerRequest, GovernanceError> {
        let closed = self.release_remaining(request_no)?;
        info!(
            request = %request_no,
            actor = %actor.id,
            released = closed.fulfillment.released,
            "reservation closed"
        );
        Ok(closed)
    }

    /// Close every reservation older than the configured TTL. Without a TTL nothing expires.
    pub fn expire_reservations(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ManpowerRequest>, GovernanceError> {
        let Some(ttl) = self.settings.reservation_ttl else {
            return Ok(Vec::new());
        };

        let approved = self
            .repository
            .list(&RequestFilter::with_status(RequestStatus::Approved))?;

        let mut expired = Vec::new();
        for request in approved {
            let Some(decided_at) = request.decided_at else {
                continue;
            };
            if request.remaining_reservation() == 0 || decided_at + ttl > now {
                continue;
            }

            match self.release_remaining(&request.request_no) {
                Ok(closed) => {
                    info!(request = %closed.request_no, "stale reservation expired");
                    expired.push(closed);
                }
                // Filled or closed by someone else since the listing.
                Err(GovernanceError::NoOp(_)) | Err(GovernanceError::InvalidTransition { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(expired)
    }

    pub fn get(&self, request_no: &RequestNo) -> Result<ManpowerRequest, GovernanceError> {
        self.fetch_existing(request_no)
    }

    pub fn list(&self, filter: &RequestFilter) -> Result<Vec<ManpowerRequest>, GovernanceError> {
        let mut requests = self.repository.list(filter)?;
        requests.sort_by(|a, b| a.request_no.cmp(&b.request_no));
        Ok(requests)
    }

    pub fn approvals(&self, request_no: &RequestNo) -> Result<ApprovalHistory, GovernanceError> {
        self.fetch_existing(request_no)?;
        Ok(self.ledger.history(request_no)?)
    }

    /// Count one hire against an approved request's reservation.
    pub(crate) fn claim_fulfillment(
        &self,
        request_no: &RequestNo,
        department_id: &DepartmentId,
    ) -> Result<ManpowerRequest, GovernanceError> {
        let (_, claimed) = self.update_request(request_no, |current| {
            expect_status(current, &[RequestStatus::Approved], "fill")?;
            if &current.department_id != department_id {
                return Err(GovernanceError::Validation(format!(
                    "request {} reserves headcount in department {}, not {}",
                    current.request_no, current.department_id, department_id
                )));
            }
            if current.remaining_reservation() == 0 {
                return Err(GovernanceError::Validation(format!(
                    "request {} has no remaining reserved headcount",
                    current.request_no
                )));
            }
            let mut next = current.clone();
            next.fulfillment.filled += 1;
            Ok(next)
        })?;
        Ok(claimed)
    }

    /// Undo a [`claim_fulfillment`](Self::claim_fulfillment) whose hire did not go through.
    pub(crate) fn return_fulfillment(&self, request_no: &RequestNo) -> Result<(), GovernanceError> {
        self.compensate("return fulfillment claim", || {
            self.update_request(request_no, |current| {
                if current.fulfillment.filled == 0 {
                    return Err(request_invariant(current, "no filled headcount to return"));
                }
                let mut next = current.clone();
                next.fulfillment.filled -= 1;
                Ok(next)
            })
            .map(|_| ())
        })
    }

    fn persist(
        &self,
        request: NewManpowerRequest,
        creator: &Actor,
        status: RequestStatus,
    ) -> Result<ManpowerRequest, GovernanceError> {
        let department = self.validate(&request)?;
        let reason = request
            .reason
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());

        let attempts = self.quota.policy().max_attempts;
        for _ in 0..attempts {
            let record = ManpowerRequest {
                request_no: self.next_request_no(),
                organization_id: department.organization_id.clone(),
                department_id: department.id.clone(),
                position_id: request.position_id.clone(),
                request_type: request.request_type,
                employment_type: request.employment_type,
                requested_headcount: request.requested_headcount,
                approved_headcount: 0,
                reason: reason.clone(),
                status,
                created_by: creator.id.clone(),
                created_at: Utc::now(),
                decided_at: None,
                fulfillment: Fulfillment::default(),
                decision_claim: None,
            };

            match self.repository.insert(record) {
                Ok(stored) => {
                    info!(
                        request = %stored.request_no,
                        department = %stored.department_id,
                        requested = stored.requested_headcount,
                        status = stored.status.label(),
                        creator = %creator.id,
                        "manpower request created"
                    );
                    return Ok(stored);
                }
                Err(StoreError::Conflict(taken)) => {
                    warn!(request = %taken, "request number already taken, drawing the next one");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(GovernanceError::Contention {
            resource: "request numbering".to_string(),
            attempts,
        })
    }

    fn validate(&self, request: &NewManpowerRequest) -> Result<DepartmentProfile, GovernanceError> {
        if request.requested_headcount < 1 {
            return Err(GovernanceError::Validation(
                "requested headcount must be at least 1".to_string(),
            ));
        }

        let department = self
            .lookup
            .department(&request.department_id)?
            .ok_or_else(|| GovernanceError::not_found("department", &request.department_id))?;
        let position = self
            .lookup
            .position(&request.position_id)?
            .ok_or_else(|| GovernanceError::not_found("position", &request.position_id))?;

        if position.department_id != department.id {
            return Err(GovernanceError::Validation(format!(
                "position '{}' does not belong to department '{}'",
                position.title, department.name
            )));
        }
        Ok(department)
    }

    fn next_request_no(&self) -> RequestNo {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed);
        RequestNo(format!("MR-{id:06}"))
    }

    fn fetch_existing(&self, request_no: &RequestNo) -> Result<ManpowerRequest, GovernanceError> {
        self.repository
            .fetch(request_no)?
            .ok_or_else(|| GovernanceError::not_found("request", request_no))
    }

    /// Conditional read-modify-write on one request, retried while other writers win the race.
    /// Returns the row as read and as written.
    fn update_request<F>(
        &self,
        request_no: &RequestNo,
        change: F,
    ) -> Result<(ManpowerRequest, ManpowerRequest), GovernanceError>
    where
        F: Fn(&ManpowerRequest) -> Result<ManpowerRequest, GovernanceError>,
    {
        let policy = self.quota.policy();
        let mut attempt = 0;
        loop {
            let current = self.fetch_existing(request_no)?;
            let next = change(&current)?;
            if self.repository.replace_if(&current, next.clone())? {
                return Ok((current, next));
            }

            attempt += 1;
            if policy.is_exhausted(attempt) {
                return Err(GovernanceError::Contention {
                    resource: format!("request {request_no}"),
                    attempts: attempt,
                });
            }
        }
    }

    fn release_remaining(&self, request_no: &RequestNo) -> Result<ManpowerRequest, GovernanceError> {
        let (before, closed) = self.update_request(request_no, |current| {
            expect_status(
                current,
                &[RequestStatus::Approved],
                "close the reservation of",
            )?;
            let remaining = current.remaining_reservation();
            if remaining == 0 {
                return Err(GovernanceError::NoOp(format!(
                    "request {} holds no reserved headcount",
                    current.request_no
                )));
            }
            let mut next = current.clone();
            next.fulfillment.released += remaining;
            Ok(next)
        })?;

        let amount = closed.fulfillment.released - before.fulfillment.released;
        if let Err(err) = self.quota.release(&closed.department_id, amount) {
            self.compensate("reopen reservation", || {
                self.update_request(request_no, |current| {
                    if current.fulfillment.released < amount {
                        return Err(request_invariant(current, "released headcount went missing"));
                    }
                    let mut next = current.clone();
                    next.fulfillment.released -= amount;
                    Ok(next)
                })
                .map(|_| ())
            })?;
            return Err(err.into());
        }
        Ok(closed)
    }

    /// Take the exclusive right to decide a pending request.
    fn claim_decision(
        &self,
        request_no: &RequestNo,
        approver: &Actor,
        action: &'static str,
    ) -> Result<ManpowerRequest, GovernanceError> {
        let (_, claimed) = self.update_request(request_no, |current| {
            expect_status(current, &[RequestStatus::WaitingApproval], action)?;
            expect_unclaimed(current, action)?;
            let mut next = current.clone();
            next.decision_claim = Some(approver.id.clone());
            Ok(next)
        })?;
        Ok(claimed)
    }

    /// Hand back a claim whose decision did not go through.
    fn release_decision(&self, request_no: &RequestNo, approver: &Actor) -> Result<(), GovernanceError> {
        self.compensate("release decision claim", || {
            self.update_request(request_no, |current| {
                ensure_claimed_by(current, approver)?;
                let mut next = current.clone();
                next.decision_claim = None;
                Ok(next)
            })
            .map(|_| ())
        })
    }

    /// Apply a claimed decision whose ledger row is already written. Only storage trouble can
    /// stop it; on failure the claim stays in place so nobody else decides the request.
    fn commit_decision<F>(
        &self,
        request_no: &RequestNo,
        approver: &Actor,
        apply: F,
    ) -> Result<ManpowerRequest, GovernanceError>
    where
        F: Fn(&mut ManpowerRequest),
    {
        let committed = compensation::retry_transient(
            "commit decision",
            self.settings.compensation_attempts,
            self.quota.policy(),
            || {
                self.update_request(request_no, |current| {
                    ensure_claimed_by(current, approver)?;
                    let mut next = current.clone();
                    next.decision_claim = None;
                    apply(&mut next);
                    Ok(next)
                })
                .map(|(_, next)| next)
            },
        );
        committed.map_err(|err| {
            error!(
                request = %request_no,
                approver = %approver.id,
                error = %err,
                "decision is in the approval ledger but the request was not updated; claim kept"
            );
            err
        })
    }

    fn compensate_release(
        &self,
        department_id: &DepartmentId,
        amount: u32,
    ) -> Result<(), GovernanceError> {
        self.compensate("release reservation", || {
            self.quota
                .release(department_id, amount)
                .map(|_| ())
                .map_err(GovernanceError::from)
        })
    }

    fn compensate<F>(&self, action: &'static str, step: F) -> Result<(), GovernanceError>
    where
        F: FnMut() -> Result<(), GovernanceError>,
    {
        compensation::compensate(
            action,
            self.settings.compensation_attempts,
            self.quota.policy(),
            step,
        )
    }
}

fn expect_status(
    request: &ManpowerRequest,
    allowed: &[RequestStatus],
    action: &'static str,
) -> Result<(), GovernanceError> {
    if allowed.contains(&request.status) {
        return Ok(());
    }
    Err(GovernanceError::InvalidTransition {
        subject: format!("request {}", request.request_no),
        status: request.status.label().to_string(),
        action,
    })
}

fn expect_unclaimed(request: &ManpowerRequest, action: &'static str) -> Result<(), GovernanceError> {
    match &request.decision_claim {
        None => Ok(()),
        Some(approver) => Err(GovernanceError::InvalidTransition {
            subject: format!("request {}", request.request_no),
            status: format!("{} (being decided by {approver})", request.status.label()),
            action,
        }),
    }
}

fn ensure_claimed_by(request: &ManpowerRequest, approver: &Actor) -> Result<(), GovernanceError> {
    if request.status == RequestStatus::WaitingApproval
        && request.decision_claim.as_ref() == Some(&approver.id)
    {
        return Ok(());
    }
    Err(request_invariant(
        request,
        "decision claim was lost before the decision was applied",
    ))
}

fn request_invariant(request: &ManpowerRequest, detail: &str) -> GovernanceError {
    error!(request = %request.request_no, detail, "request invariant violation");
    GovernanceError::InvariantViolation(format!("request {}: {detail}", request.request_no))
}
