use crate::governance::domain::{DepartmentId, ManpowerRequest, RequestNo, RequestStatus};
use crate::governance::storage::StoreError;

/// Storage abstraction for manpower requests.
pub trait RequestRepository: Send + Sync {
    /// Fails with `StoreError::Conflict` when the request number is taken.
    fn insert(&self, request: ManpowerRequest) -> Result<ManpowerRequest, StoreError>;
    fn fetch(&self, request_no: &RequestNo) -> Result<Option<ManpowerRequest>, StoreError>;
    fn list(&self, filter: &RequestFilter) -> Result<Vec<ManpowerRequest>, StoreError>;
    /// Store `next` only if the persisted row still equals `expected`. Returns whether it did.
    fn replace_if(
        &self,
        expected: &ManpowerRequest,
        next: ManpowerRequest,
    ) -> Result<bool, StoreError>;
}

/// Optional narrowing for request listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub department_id: Option<DepartmentId>,
}

impl RequestFilter {
    pub fn with_status(status: RequestStatus) -> Self {
        Self {
            status: Some(status),
            department_id: None,
        }
    }

    pub fn matches(&self, request: &ManpowerRequest) -> bool {
        self.status.map_or(true, |status| request.status == status)
            && self
                .department_id
                .as_ref()
                .map_or(true, |department| &request.department_id == department)
    }
}
