use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(OrganizationId);
string_id!(DepartmentId);
string_id!(PositionId);
string_id!(EmployeeId);
string_id!(
    /// Human-readable request number, e.g. `MR-000042`. Doubles as the request identity.
    RequestNo
);
string_id!(ApprovalId);
string_id!(PlanId);
string_id!(
    /// Opaque identity handed over by the authentication layer.
    ActorId
);

/// Role classification supplied alongside the acting identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    #[serde(rename = "HR")]
    Hr,
    #[serde(rename = "HR-Manager")]
    HrManager,
    Manager,
    Employee,
    Other(String),
}

impl Role {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "Admin" => Self::Admin,
            "HR" => Self::Hr,
            "HR-Manager" => Self::HrManager,
            "Manager" => Self::Manager,
            "Employee" => Self::Employee,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Admin => "Admin",
            Self::Hr => "HR",
            Self::HrManager => "HR-Manager",
            Self::Manager => "Manager",
            Self::Employee => "Employee",
            Self::Other(name) => name,
        }
    }

    /// Roles entitled to approve or reject manpower requests.
    pub fn can_decide_requests(&self) -> bool {
        matches!(self, Self::Manager | Self::HrManager | Self::Admin)
    }

    /// Roles entitled to maintain employees and manpower plans.
    pub fn can_manage_workforce(&self) -> bool {
        matches!(self, Self::Admin | Self::Hr)
    }
}

/// Acting identity and role, already authenticated by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: ActorId::new(id),
            role,
        }
    }
}

/// Master-data view of a department. Capacity lives in the quota tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentProfile {
    pub id: DepartmentId,
    pub organization_id: OrganizationId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub title: String,
    pub department_id: DepartmentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    Draft,
    WaitingApproval,
    Approved,
    Rejected,
    Cancelled,
}

impl RequestStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RequestStatus::Draft => "draft",
            RequestStatus::WaitingApproval => "waiting_approval",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestStatus::Approved | RequestStatus::Rejected | RequestStatus::Cancelled
        )
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('_', "").as_str() {
            "draft" => Some(Self::Draft),
            "waitingapproval" => Some(Self::WaitingApproval),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RequestType {
    #[default]
    New,
    Replacement,
    Project,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EmploymentType {
    #[default]
    Permanent,
    Contract,
    Intern,
    Other,
}

/// Hiring progress against an approved reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Fulfillment {
    pub filled: u32,
    pub released: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManpowerRequest {
    pub request_no: RequestNo,
    pub organization_id: OrganizationId,
    pub department_id: DepartmentId,
    pub position_id: PositionId,
    pub request_type: RequestType,
    pub employment_type: EmploymentType,
    pub requested_headcount: u32,
    pub approved_headcount: u32,
    pub reason: Option<String>,
    pub status: RequestStatus,
    pub created_by: ActorId,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub fulfillment: Fulfillment,
    /// Approver holding the right to decide while their decision is committed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_claim: Option<ActorId>,
}

impl ManpowerRequest {
    /// Headcount still held in the department's `reserved` ledger on behalf of this request.
    pub fn remaining_reservation(&self) -> u32 {
        if self.status != RequestStatus::Approved {
            return 0;
        }
        self.approved_headcount
            .saturating_sub(self.fulfillment.filled)
            .saturating_sub(self.fulfillment.released)
    }
}

/// Caller-supplied fields for a new request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewManpowerRequest {
    pub department_id: DepartmentId,
    pub position_id: PositionId,
    pub requested_headcount: u32,
    #[serde(default)]
    pub request_type: RequestType,
    #[serde(default)]
    pub employment_type: EmploymentType,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApprovalOutcome {
    Approved,
    Rejected,
}

/// Level recorded on approvals in the single-level workflow.
pub const APPROVAL_LEVEL: u8 = 1;
/// Level recorded on rejections; a rejection closes the chain at any depth.
pub const REJECTION_LEVEL: u8 = 99;

/// One immutable decision against a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub id: ApprovalId,
    pub request_no: RequestNo,
    pub approver: ActorId,
    pub outcome: ApprovalOutcome,
    pub level: u8,
    pub comment: String,
    pub decided_at: DateTime<Utc>,
    /// Append order within the ledger; breaks ties between equal timestamps.
    pub sequence: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub first_name: String,
    pub last_name: String,
    pub department_id: DepartmentId,
    pub position_id: PositionId,
    pub employment_type: EmploymentType,
    pub hire_date: NaiveDate,
    pub resign_date: Option<NaiveDate>,
    pub fulfilled_request: Option<RequestNo>,
}

impl Employee {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn is_active(&self) -> bool {
        self.resign_date.is_none()
    }
}

/// Personal and contractual details captured at hire time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeAttributes {
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub employment_type: EmploymentType,
    pub hire_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnoverKind {
    Join,
    Resign,
    Transfer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnoverEvent {
    pub employee_id: EmployeeId,
    pub kind: TurnoverKind,
    pub department_id: DepartmentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_department_id: Option<DepartmentId>,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManpowerPlan {
    pub id: PlanId,
    pub department_id: DepartmentId,
    pub position_id: PositionId,
    pub year: i32,
    pub planned_headcount: u32,
    /// Department occupancy observed when the plan was created or last refreshed.
    pub occupied_snapshot: u32,
    pub snapshot_at: DateTime<Utc>,
}

impl ManpowerPlan {
    pub fn shortfall(&self) -> u32 {
        self.planned_headcount.saturating_sub(self.occupied_snapshot)
    }
}
