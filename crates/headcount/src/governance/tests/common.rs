use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Barrier, Mutex};
use std::time::Duration;

use chrono::NaiveDate;

use crate::governance::domain::{
    Actor, Approval, DepartmentId, DepartmentProfile, Employee, EmployeeAttributes, EmployeeId,
    EmploymentType, ManpowerRequest, NewManpowerRequest, OrganizationId, Position, PositionId,
    RequestNo, RequestStatus, RequestType, Role,
};
use crate::governance::ledger::ApprovalStore;
use crate::governance::memory::{
    InMemoryCapacityStore, InMemoryEmployeeRepository, InMemoryMasterData,
    InMemoryRequestRepository,
};
use crate::governance::quota::{
    CapacityRecord, CapacityStore, CapacityWrite, ContentionPolicy, SwapOutcome,
};
use crate::governance::requests::{RequestFilter, RequestRepository};
use crate::governance::storage::StoreError;
use crate::governance::{EngineSettings, EngineStores, HeadcountEngine};
use crate::governance::directory::EmployeeRepository;

pub(super) fn dept(id: &str) -> DepartmentId {
    DepartmentId::new(id)
}

pub(super) fn position_of(department: &str) -> PositionId {
    PositionId::new(format!("{department}-dev"))
}

pub(super) fn manager() -> Actor {
    Actor::new("mgr-1", Role::Manager)
}

pub(super) fn requester() -> Actor {
    Actor::new("emp-7", Role::Employee)
}

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn new_request(department: &str, headcount: u32) -> NewManpowerRequest {
    NewManpowerRequest {
        department_id: dept(department),
        position_id: position_of(department),
        requested_headcount: headcount,
        request_type: RequestType::New,
        employment_type: EmploymentType::Permanent,
        reason: Some("Backfill for the platform roadmap".to_string()),
    }
}

pub(super) fn attributes(first_name: &str) -> EmployeeAttributes {
    EmployeeAttributes {
        first_name: first_name.to_string(),
        last_name: "Tester".to_string(),
        employment_type: EmploymentType::Permanent,
        hire_date: date(2025, 3, 1),
    }
}

/// Departments `(id, max_headcount)`, each with one `<id>-dev` position.
pub(super) fn master_data(departments: &[(&str, u32)]) -> InMemoryMasterData {
    let master = InMemoryMasterData::default();
    for (id, _) in departments {
        master
            .register_department(DepartmentProfile {
                id: dept(id),
                organization_id: OrganizationId::new("acme"),
                name: id.to_uppercase(),
            })
            .expect("department registers");
        master
            .register_position(Position {
                id: position_of(id),
                title: format!("{id} developer"),
                department_id: dept(id),
                description: None,
            })
            .expect("position registers");
    }
    master
}

pub(super) fn settings() -> EngineSettings {
    EngineSettings {
        contention: ContentionPolicy::without_backoff(64),
        ..EngineSettings::default()
    }
}

pub(super) fn engine(departments: &[(&str, u32)]) -> Arc<HeadcountEngine> {
    engine_with(departments, |_| {})
}

/// Build an engine whose stores the caller may swap before the ledgers are opened.
pub(super) fn engine_with(
    departments: &[(&str, u32)],
    customize: impl FnOnce(&mut EngineStores),
) -> Arc<HeadcountEngine> {
    let master = master_data(departments);
    let mut stores = EngineStores::in_memory(Arc::new(master));
    customize(&mut stores);
    let engine = HeadcountEngine::new(stores, settings());
    for (id, max) in departments {
        engine
            .quota()
            .open_department(&dept(id), *max)
            .expect("capacity ledger opens");
    }
    Arc::new(engine)
}

/// Fill `count` seats with unplanned hires.
pub(super) fn staff(engine: &HeadcountEngine, department: &str, count: u32) -> Vec<Employee> {
    (0..count)
        .map(|index| {
            engine
                .directory()
                .hire(
                    &dept(department),
                    &position_of(department),
                    attributes(&format!("Staff{index}")),
                    None,
                )
                .expect("unplanned hire fits")
        })
        .collect()
}

/// `(max_headcount, occupied, reserved)` as currently committed.
pub(super) fn figures(engine: &HeadcountEngine, department: &str) -> (u32, u32, u32) {
    let snapshot = engine
        .quota()
        .snapshot(&dept(department))
        .expect("department has a ledger");
    (snapshot.max_headcount, snapshot.occupied, snapshot.reserved)
}

pub(super) fn submitted(engine: &HeadcountEngine, department: &str, headcount: u32) -> RequestNo {
    engine
        .requests()
        .create_request(new_request(department, headcount), &requester())
        .expect("request is created")
        .request_no
}

/// Capacity store that loses every conditional write, as if another writer always won.
#[derive(Default)]
pub(super) struct AlwaysConflictingCapacityStore {
    pub(super) inner: InMemoryCapacityStore,
    pub(super) swaps: AtomicU32,
}

impl CapacityStore for AlwaysConflictingCapacityStore {
    fn insert(&self, record: CapacityRecord) -> Result<(), StoreError> {
        self.inner.insert(record)
    }

    fn load(&self, department_id: &DepartmentId) -> Result<Option<CapacityRecord>, StoreError> {
        self.inner.load(department_id)
    }

    fn list(&self) -> Result<Vec<CapacityRecord>, StoreError> {
        self.inner.list()
    }

    fn compare_and_swap(&self, _writes: &[CapacityWrite]) -> Result<SwapOutcome, StoreError> {
        self.swaps.fetch_add(1, Ordering::SeqCst);
        Ok(SwapOutcome::VersionConflict)
    }
}

/// Capacity store whose first `conflicts` swaps lose to a phantom writer.
pub(super) struct EventuallyCommittingCapacityStore {
    pub(super) inner: InMemoryCapacityStore,
    pub(super) conflicts: AtomicU32,
}

impl EventuallyCommittingCapacityStore {
    pub(super) fn new(conflicts: u32) -> Self {
        Self {
            inner: InMemoryCapacityStore::default(),
            conflicts: AtomicU32::new(conflicts),
        }
    }
}

impl CapacityStore for EventuallyCommittingCapacityStore {
    fn insert(&self, record: CapacityRecord) -> Result<(), StoreError> {
        self.inner.insert(record)
    }

    fn load(&self, department_id: &DepartmentId) -> Result<Option<CapacityRecord>, StoreError> {
        self.inner.load(department_id)
    }

    fn list(&self) -> Result<Vec<CapacityRecord>, StoreError> {
        self.inner.list()
    }

    fn compare_and_swap(&self, writes: &[CapacityWrite]) -> Result<SwapOutcome, StoreError> {
        let remaining = self.conflicts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.conflicts.store(remaining - 1, Ordering::SeqCst);
            return Ok(SwapOutcome::VersionConflict);
        }
        self.inner.compare_and_swap(writes)
    }
}

/// Approval store that is down.
#[derive(Default)]
pub(super) struct UnavailableApprovalStore;

impl ApprovalStore for UnavailableApprovalStore {
    fn append(&self, _approval: Approval) -> Result<Approval, StoreError> {
        Err(StoreError::Unavailable("approval store offline".to_string()))
    }

    fn for_request(&self, _request_no: &RequestNo) -> Result<Vec<Approval>, StoreError> {
        Ok(Vec::new())
    }
}

/// Employee repository that refuses inserts but otherwise behaves.
#[derive(Default)]
pub(super) struct RejectingInsertEmployees {
    pub(super) inner: InMemoryEmployeeRepository,
}

impl EmployeeRepository for RejectingInsertEmployees {
    fn insert(&self, _employee: Employee) -> Result<Employee, StoreError> {
        Err(StoreError::Unavailable("employee store offline".to_string()))
    }

    fn fetch(&self, id: &EmployeeId) -> Result<Option<Employee>, StoreError> {
        self.inner.fetch(id)
    }

    fn list(&self) -> Result<Vec<Employee>, StoreError> {
        self.inner.list()
    }

    fn replace_if(&self, expected: &Employee, next: Employee) -> Result<bool, StoreError> {
        self.inner.replace_if(expected, next)
    }
}

/// Request repository that parks the approval commit of one request until the test resumes it.
pub(super) struct GatedRequests {
    inner: InMemoryRequestRepository,
    armed: Mutex<Option<RequestNo>>,
    parked: Barrier,
    resumed: Barrier,
}

impl Default for GatedRequests {
    fn default() -> Self {
        Self {
            inner: InMemoryRequestRepository::default(),
            armed: Mutex::new(None),
            parked: Barrier::new(2),
            resumed: Barrier::new(2),
        }
    }
}

impl GatedRequests {
    pub(super) fn arm(&self, request_no: &RequestNo) {
        *self.armed.lock().expect("gate mutex") = Some(request_no.clone());
    }

    /// Block until the armed approval is parked in front of its commit.
    pub(super) fn wait_until_parked(&self) {
        self.parked.wait();
    }

    pub(super) fn resume(&self) {
        self.resumed.wait();
    }
}

impl RequestRepository for GatedRequests {
    fn insert(&self, request: ManpowerRequest) -> Result<ManpowerRequest, StoreError> {
        self.inner.insert(request)
    }

    fn fetch(&self, request_no: &RequestNo) -> Result<Option<ManpowerRequest>, StoreError> {
        self.inner.fetch(request_no)
    }

    fn list(&self, filter: &RequestFilter) -> Result<Vec<ManpowerRequest>, StoreError> {
        self.inner.list(filter)
    }

    fn replace_if(
        &self,
        expected: &ManpowerRequest,
        next: ManpowerRequest,
    ) -> Result<bool, StoreError> {
        let gated = {
            let mut armed = self.armed.lock().expect("gate mutex");
            let hit = next.status == RequestStatus::Approved
                && armed.as_ref() == Some(&next.request_no);
            if hit {
                *armed = None;
            }
            hit
        };
        if gated {
            self.parked.wait();
            self.resumed.wait();
        }
        self.inner.replace_if(expected, next)
    }
}

/// Capacity store whose first conditional write signals `stalled` and then waits for
/// `release`, like a long backoff. `starved` records a release that never came.
pub(super) struct StallingCapacityStore {
    pub(super) inner: InMemoryCapacityStore,
    stalled: Mutex<Option<Sender<()>>>,
    release: Mutex<Option<Receiver<()>>>,
    pub(super) starved: AtomicBool,
}

impl StallingCapacityStore {
    pub(super) fn new(stalled: Sender<()>, release: Receiver<()>) -> Self {
        Self {
            inner: InMemoryCapacityStore::default(),
            stalled: Mutex::new(Some(stalled)),
            release: Mutex::new(Some(release)),
            starved: AtomicBool::new(false),
        }
    }
}

impl CapacityStore for StallingCapacityStore {
    fn insert(&self, record: CapacityRecord) -> Result<(), StoreError> {
        self.inner.insert(record)
    }

    fn load(&self, department_id: &DepartmentId) -> Result<Option<CapacityRecord>, StoreError> {
        self.inner.load(department_id)
    }

    fn list(&self) -> Result<Vec<CapacityRecord>, StoreError> {
        self.inner.list()
    }

    fn compare_and_swap(&self, writes: &[CapacityWrite]) -> Result<SwapOutcome, StoreError> {
        let release = self.release.lock().expect("release mutex").take();
        if let Some(release) = release {
            if let Some(stalled) = self.stalled.lock().expect("stalled mutex").take() {
                let _ = stalled.send(());
            }
            if release.recv_timeout(Duration::from_secs(5)).is_err() {
                self.starved.store(true, Ordering::SeqCst);
            }
        }
        self.inner.compare_and_swap(writes)
    }
}
