use axum::http::StatusCode;
use serde::Serialize;

use super::quota::{CapacityShortfall, QuotaError};
use super::storage::StoreError;

/// Status class handed to outer layers, which map it onto their own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeClass {
    Success,
    ValidationFailure,
    NotFound,
    Conflict,
    ServerError,
}

impl OutcomeClass {
    pub const fn status_code(self) -> StatusCode {
        match self {
            OutcomeClass::Success => StatusCode::OK,
            OutcomeClass::ValidationFailure => StatusCode::BAD_REQUEST,
            OutcomeClass::NotFound => StatusCode::NOT_FOUND,
            OutcomeClass::Conflict => StatusCode::CONFLICT,
            OutcomeClass::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Label carried in the response envelope's `status` field.
    pub const fn envelope_status(self) -> &'static str {
        match self {
            OutcomeClass::Success => "success",
            OutcomeClass::ServerError => "error",
            _ => "fail",
        }
    }
}

/// Error raised by the engine's request, directory, and plan operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GovernanceError {
    #[error("{0}")]
    Validation(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("cannot {action} {subject}: current status is {status}")]
    InvalidTransition {
        subject: String,
        status: String,
        action: &'static str,
    },
    #[error("nothing to do: {0}")]
    NoOp(String),
    #[error("{0}")]
    CapacityExceeded(CapacityShortfall),
    #[error("{resource} is under contention after {attempts} attempts; retry later")]
    Contention { resource: String, attempts: u32 },
    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl GovernanceError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn class(&self) -> OutcomeClass {
        match self {
            GovernanceError::Validation(_) | GovernanceError::NoOp(_) => {
                OutcomeClass::ValidationFailure
            }
            GovernanceError::NotFound { .. } => OutcomeClass::NotFound,
            GovernanceError::InvalidTransition { .. }
            | GovernanceError::CapacityExceeded(_)
            | GovernanceError::Contention { .. } => OutcomeClass::Conflict,
            GovernanceError::InvariantViolation(_) | GovernanceError::Storage(_) => {
                OutcomeClass::ServerError
            }
        }
    }

    /// Expected business outcome, as opposed to a sign the system itself is unhealthy.
    pub fn is_business_outcome(&self) -> bool {
        !matches!(
            self,
            GovernanceError::InvariantViolation(_) | GovernanceError::Storage(_)
        )
    }

    /// Whether the caller may simply retry the same call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GovernanceError::Contention { .. })
    }
}

impl From<QuotaError> for GovernanceError {
    fn from(value: QuotaError) -> Self {
        match value {
            QuotaError::UnknownDepartment(id) => GovernanceError::not_found("department", id),
            QuotaError::AlreadyRegistered(id) => GovernanceError::Validation(format!(
                "department {id} already has a capacity ledger"
            )),
            QuotaError::InvalidAmount { .. } => GovernanceError::Validation(value.to_string()),
            QuotaError::SelfTransfer(_) => GovernanceError::NoOp(value.to_string()),
            QuotaError::CapacityExceeded(shortfall) => GovernanceError::CapacityExceeded(shortfall),
            QuotaError::Contention {
                departments,
                attempts,
            } => GovernanceError::Contention {
                resource: format!("department capacity ({departments})"),
                attempts,
            },
            QuotaError::InvariantViolation { .. } => {
                GovernanceError::InvariantViolation(value.to_string())
            }
            QuotaError::Storage(err) => GovernanceError::Storage(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::domain::DepartmentId;

    #[test]
    fn capacity_and_transition_are_business_conflicts() {
        let shortfall = CapacityShortfall {
            department_id: DepartmentId::new("eng"),
            requested: 3,
            max_headcount: 10,
            occupied: 8,
            reserved: 0,
        };
        let capacity = GovernanceError::from(QuotaError::CapacityExceeded(shortfall));
        assert_eq!(capacity.class(), OutcomeClass::Conflict);
        assert!(capacity.is_business_outcome());
        assert!(capacity.to_string().contains("max: 10, occupied: 8, reserved: 0"));

        let transition = GovernanceError::InvalidTransition {
            subject: "request MR-000001".to_string(),
            status: "approved".to_string(),
            action: "approve",
        };
        assert_eq!(transition.class(), OutcomeClass::Conflict);
        assert!(transition.is_business_outcome());
    }

    #[test]
    fn system_faults_are_server_errors() {
        let invariant = GovernanceError::from(QuotaError::InvariantViolation {
            department_id: DepartmentId::new("ops"),
            detail: "negative reserved".to_string(),
        });
        assert_eq!(invariant.class(), OutcomeClass::ServerError);
        assert!(!invariant.is_business_outcome());

        let storage = GovernanceError::from(StoreError::Unavailable("down".to_string()));
        assert_eq!(storage.class().status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(storage.class().envelope_status(), "error");
    }

    #[test]
    fn unknown_department_maps_to_not_found() {
        let err = GovernanceError::from(QuotaError::UnknownDepartment(DepartmentId::new("x")));
        assert_eq!(
            err,
            GovernanceError::NotFound {
                entity: "department",
                id: "x".to_string()
            }
        );
        assert_eq!(err.class().envelope_status(), "fail");
    }

    #[test]
    fn contention_is_retryable() {
        let err = GovernanceError::from(QuotaError::Contention {
            departments: "eng".to_string(),
            attempts: 8,
        });
        assert!(err.is_retryable());
        assert_eq!(err.class(), OutcomeClass::Conflict);
    }
}
