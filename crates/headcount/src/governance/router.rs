//! HTTP surface of the engine. This layer owns authentication and role checks; the engine
//! trusts the actor it is handed.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use super::directory::EmployeeFilter;
use super::domain::{
    Actor, DepartmentId, EmployeeAttributes, EmployeeId, NewManpowerRequest, PlanId, PositionId,
    RequestNo, RequestStatus, Role,
};
use super::outcome::{GovernanceError, OutcomeClass};
use super::plans::{NewManpowerPlan, PlanChanges};
use super::requests::RequestFilter;
use super::HeadcountEngine;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

type Reply = Result<Response, Response>;

/// Router builder exposing the request workflow, capacity, directory and plan endpoints.
pub fn governance_router(engine: Arc<HeadcountEngine>) -> Router {
    Router::new()
        .route(
            "/api/v1/manpower/requests",
            post(create_request).get(list_requests),
        )
        .route("/api/v1/manpower/requests/:request_no", get(get_request))
        .route(
            "/api/v1/manpower/requests/:request_no/approve",
            post(approve_request),
        )
        .route(
            "/api/v1/manpower/requests/:request_no/reject",
            post(reject_request),
        )
        .route(
            "/api/v1/manpower/requests/:request_no/submit",
            post(submit_request),
        )
        .route(
            "/api/v1/manpower/requests/:request_no/cancel",
            post(cancel_request),
        )
        .route(
            "/api/v1/manpower/requests/:request_no/close",
            post(close_request),
        )
        .route(
            "/api/v1/manpower/requests/:request_no/approvals",
            get(request_approvals),
        )
        .route(
            "/api/v1/manpower/reservations/expire",
            post(expire_reservations),
        )
        .route("/api/v1/departments/capacity", get(capacity_overview))
        .route(
            "/api/v1/departments/:department_id/capacity",
            get(department_capacity).put(set_ceiling),
        )
        .route("/api/v1/employees", post(hire_employee).get(list_employees))
        .route("/api/v1/employees/:employee_id/resign", post(resign_employee))
        .route(
            "/api/v1/employees/:employee_id/department",
            patch(transfer_employee),
        )
        .route("/api/v1/turnover", get(turnover))
        .route("/api/v1/manpower/plans", post(create_plan).get(list_plans))
        .route("/api/v1/manpower/plans/deficit", get(plan_deficit))
        .route(
            "/api/v1/manpower/plans/:plan_id",
            put(update_plan).delete(delete_plan),
        )
        .with_state(engine)
}

#[derive(Debug, Deserialize)]
struct CreateRequestBody {
    #[serde(flatten)]
    request: NewManpowerRequest,
    #[serde(default)]
    draft: bool,
}

#[derive(Debug, Default, Deserialize)]
struct CommentBody {
    #[serde(default)]
    comment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ReasonBody {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ExpireBody {
    #[serde(default)]
    now: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
struct RequestQuery {
    status: Option<String>,
    department: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CeilingBody {
    max_headcount: u32,
}

#[derive(Debug, Deserialize)]
struct HireBody {
    department_id: DepartmentId,
    position_id: PositionId,
    #[serde(flatten)]
    attributes: EmployeeAttributes,
    #[serde(default)]
    fulfills_request: Option<RequestNo>,
}

#[derive(Debug, Default, Deserialize)]
struct EmployeeQuery {
    department: Option<String>,
    #[serde(default)]
    active: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ResignBody {
    #[serde(default)]
    date: Option<NaiveDate>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransferBody {
    department_id: DepartmentId,
    position_id: PositionId,
    #[serde(default)]
    date: Option<NaiveDate>,
}

async fn create_request(
    State(engine): State<Arc<HeadcountEngine>>,
    headers: HeaderMap,
    body: Bytes,
) -> Reply {
    let actor = authenticate(&headers)?;
    let body: CreateRequestBody = parse_body(&body)?;
    let created = run_engine(&engine, move |engine| {
        let requests = engine.requests();
        if body.draft {
            requests.save_draft(body.request, &actor)
        } else {
            requests.create_request(body.request, &actor)
        }
    })
    .await?;
    Ok(success(
        StatusCode::CREATED,
        format!("request {} created", created.request_no),
        created,
    ))
}

async fn list_requests(
    State(engine): State<Arc<HeadcountEngine>>,
    headers: HeaderMap,
    Query(query): Query<RequestQuery>,
) -> Reply {
    authenticate(&headers)?;
    let status = match query.status.as_deref().filter(|raw| !raw.trim().is_empty()) {
        Some(raw) => Some(RequestStatus::parse(raw).ok_or_else(|| {
            failure(GovernanceError::Validation(format!(
                "unknown request status '{raw}'"
            )))
        })?),
        None => None,
    };
    let filter = RequestFilter {
        status,
        department_id: query.department.map(DepartmentId),
    };
    let requests = run_engine(&engine, move |engine| engine.requests().list(&filter)).await?;
    Ok(success(
        StatusCode::OK,
        format!("{} request(s)", requests.len()),
        requests,
    ))
}

async fn get_request(
    State(engine): State<Arc<HeadcountEngine>>,
    headers: HeaderMap,
    Path(request_no): Path<String>,
) -> Reply {
    authenticate(&headers)?;
    let request = run_engine(&engine, move |engine| {
        engine.requests().get(&RequestNo(request_no))
    })
    .await?;
    Ok(success(StatusCode::OK, "request found", request))
}

async fn approve_request(
    State(engine): State<Arc<HeadcountEngine>>,
    headers: HeaderMap,
    Path(request_no): Path<String>,
    body: Bytes,
) -> Reply {
    let actor = authorize(&headers, Role::can_decide_requests, "approve requests")?;
    let body: CommentBody = parse_optional_body(&body)?;
    let decision = run_engine(&engine, move |engine| {
        engine
            .requests()
            .approve(&RequestNo(request_no), &actor, body.comment.as_deref())
    })
    .await?;
    Ok(success(
        StatusCode::OK,
        format!("request {} approved", decision.request.request_no),
        decision,
    ))
}

async fn reject_request(
    State(engine): State<Arc<HeadcountEngine>>,
    headers: HeaderMap,
    Path(request_no): Path<String>,
    body: Bytes,
) -> Reply {
    let actor = authorize(&headers, Role::can_decide_requests, "reject requests")?;
    let body: CommentBody = parse_optional_body(&body)?;
    let decision = run_engine(&engine, move |engine| {
        engine.requests().reject(
            &RequestNo(request_no),
            &actor,
            body.comment.as_deref().unwrap_or_default(),
        )
    })
    .await?;
    Ok(success(
        StatusCode::OK,
        format!("request {} rejected", decision.request.request_no),
        decision,
    ))
}

async fn submit_request(
    State(engine): State<Arc<HeadcountEngine>>,
    headers: HeaderMap,
    Path(request_no): Path<String>,
) -> Reply {
    let actor = authenticate(&headers)?;
    let request_no = RequestNo(request_no);
    ensure_owner_or_approver(&engine, &actor, &request_no, "submit").await?;
    let submitted = run_engine(&engine, move |engine| {
        engine.requests().submit_draft(&request_no, &actor)
    })
    .await?;
    Ok(success(StatusCode::OK, "request submitted", submitted))
}

async fn cancel_request(
    State(engine): State<Arc<HeadcountEngine>>,
    headers: HeaderMap,
    Path(request_no): Path<String>,
    body: Bytes,
) -> Reply {
    let actor = authenticate(&headers)?;
    let body: ReasonBody = parse_optional_body(&body)?;
    let request_no = RequestNo(request_no);
    ensure_owner_or_approver(&engine, &actor, &request_no, "cancel").await?;
    let cancelled = run_engine(&engine, move |engine| {
        engine
            .requests()
            .cancel(&request_no, &actor, body.reason.as_deref())
    })
    .await?;
    Ok(success(StatusCode::OK, "request cancelled", cancelled))
}

async fn close_request(
    State(engine): State<Arc<HeadcountEngine>>,
    headers: HeaderMap,
    Path(request_no): Path<String>,
) -> Reply {
    let actor = authorize(&headers, Role::can_decide_requests, "close reservations")?;
    let closed = run_engine(&engine, move |engine| {
        engine
            .requests()
            .close_reservation(&RequestNo(request_no), &actor)
    })
    .await?;
    Ok(success(
        StatusCode::OK,
        format!("released {} reserved headcount", closed.fulfillment.released),
        closed,
    ))
}

async fn request_approvals(
    State(engine): State<Arc<HeadcountEngine>>,
    headers: HeaderMap,
    Path(request_no): Path<String>,
) -> Reply {
    authenticate(&headers)?;
    let history = run_engine(&engine, move |engine| {
        engine.requests().approvals(&RequestNo(request_no))
    })
    .await?;
    Ok(success(
        StatusCode::OK,
        format!("{} decision(s)", history.len()),
        history.into_vec(),
    ))
}

async fn expire_reservations(
    State(engine): State<Arc<HeadcountEngine>>,
    headers: HeaderMap,
    body: Bytes,
) -> Reply {
    authorize(&headers, Role::can_decide_requests, "expire reservations")?;
    let body: ExpireBody = parse_optional_body(&body)?;
    let now = body.now.unwrap_or_else(Utc::now);
    let expired =
        run_engine(&engine, move |engine| engine.requests().expire_reservations(now)).await?;
    Ok(success(
        StatusCode::OK,
        format!("{} reservation(s) expired", expired.len()),
        expired,
    ))
}

async fn capacity_overview(
    State(engine): State<Arc<HeadcountEngine>>,
    headers: HeaderMap,
) -> Reply {
    authenticate(&headers)?;
    let overview = run_engine(&engine, |engine| engine.capacity_overview()).await?;
    Ok(success(StatusCode::OK, "department capacity", overview))
}

async fn department_capacity(
    State(engine): State<Arc<HeadcountEngine>>,
    headers: HeaderMap,
    Path(department_id): Path<String>,
) -> Reply {
    authenticate(&headers)?;
    let snapshot = run_engine(&engine, move |engine| {
        Ok(engine.quota().snapshot(&DepartmentId(department_id))?)
    })
    .await?;
    Ok(success(StatusCode::OK, "department capacity", snapshot))
}

async fn set_ceiling(
    State(engine): State<Arc<HeadcountEngine>>,
    headers: HeaderMap,
    Path(department_id): Path<String>,
    body: Bytes,
) -> Reply {
    authorize(&headers, Role::can_manage_workforce, "change headcount ceilings")?;
    let body: CeilingBody = parse_body(&body)?;
    let snapshot = run_engine(&engine, move |engine| {
        Ok(engine
            .quota()
            .set_ceiling(&DepartmentId(department_id), body.max_headcount)?)
    })
    .await?;
    Ok(success(StatusCode::OK, "headcount ceiling updated", snapshot))
}

async fn hire_employee(
    State(engine): State<Arc<HeadcountEngine>>,
    headers: HeaderMap,
    body: Bytes,
) -> Reply {
    authorize(&headers, Role::can_manage_workforce, "hire employees")?;
    let body: HireBody = parse_body(&body)?;
    let employee = run_engine(&engine, move |engine| {
        engine.directory().hire(
            &body.department_id,
            &body.position_id,
            body.attributes,
            body.fulfills_request.as_ref(),
        )
    })
    .await?;
    Ok(success(
        StatusCode::CREATED,
        format!("employee {} hired", employee.id),
        employee,
    ))
}

async fn list_employees(
    State(engine): State<Arc<HeadcountEngine>>,
    headers: HeaderMap,
    Query(query): Query<EmployeeQuery>,
) -> Reply {
    authenticate(&headers)?;
    let filter = EmployeeFilter {
        department_id: query.department.map(DepartmentId),
        active_only: query.active,
    };
    let employees = run_engine(&engine, move |engine| engine.directory().list(&filter)).await?;
    Ok(success(
        StatusCode::OK,
        format!("{} employee(s)", employees.len()),
        employees,
    ))
}

async fn resign_employee(
    State(engine): State<Arc<HeadcountEngine>>,
    headers: HeaderMap,
    Path(employee_id): Path<String>,
    body: Bytes,
) -> Reply {
    authorize(&headers, Role::can_manage_workforce, "record resignations")?;
    let body: ResignBody = parse_optional_body(&body)?;
    let date = body.date.unwrap_or_else(|| Utc::now().date_naive());
    let employee = run_engine(&engine, move |engine| {
        engine
            .directory()
            .resign(&EmployeeId(employee_id), date, body.reason.as_deref())
    })
    .await?;
    Ok(success(StatusCode::OK, "employee resigned", employee))
}

async fn transfer_employee(
    State(engine): State<Arc<HeadcountEngine>>,
    headers: HeaderMap,
    Path(employee_id): Path<String>,
    body: Bytes,
) -> Reply {
    authorize(&headers, Role::can_manage_workforce, "transfer employees")?;
    let body: TransferBody = parse_body(&body)?;
    let date = body.date.unwrap_or_else(|| Utc::now().date_naive());
    let employee = run_engine(&engine, move |engine| {
        engine.directory().transfer_department(
            &EmployeeId(employee_id),
            &body.department_id,
            &body.position_id,
            date,
        )
    })
    .await?;
    Ok(success(StatusCode::OK, "employee transferred", employee))
}

async fn turnover(State(engine): State<Arc<HeadcountEngine>>, headers: HeaderMap) -> Reply {
    authenticate(&headers)?;
    let events = run_engine(&engine, |engine| engine.directory().turnover()).await?;
    Ok(success(
        StatusCode::OK,
        format!("{} turnover event(s)", events.len()),
        events,
    ))
}

async fn create_plan(
    State(engine): State<Arc<HeadcountEngine>>,
    headers: HeaderMap,
    body: Bytes,
) -> Reply {
    authorize(&headers, Role::can_manage_workforce, "maintain manpower plans")?;
    let body: NewManpowerPlan = parse_body(&body)?;
    let plan = run_engine(&engine, move |engine| engine.plans().create(body)).await?;
    Ok(success(
        StatusCode::CREATED,
        format!("plan {} created", plan.id),
        plan,
    ))
}

async fn list_plans(State(engine): State<Arc<HeadcountEngine>>, headers: HeaderMap) -> Reply {
    authenticate(&headers)?;
    let plans = run_engine(&engine, |engine| engine.plans().list()).await?;
    Ok(success(
        StatusCode::OK,
        format!("{} plan(s)", plans.len()),
        plans,
    ))
}

async fn update_plan(
    State(engine): State<Arc<HeadcountEngine>>,
    headers: HeaderMap,
    Path(plan_id): Path<String>,
    body: Bytes,
) -> Reply {
    authorize(&headers, Role::can_manage_workforce, "maintain manpower plans")?;
    let changes: PlanChanges = parse_body(&body)?;
    let plan = run_engine(&engine, move |engine| {
        engine.plans().update(&PlanId(plan_id), changes)
    })
    .await?;
    Ok(success(StatusCode::OK, "plan updated", plan))
}

async fn delete_plan(
    State(engine): State<Arc<HeadcountEngine>>,
    headers: HeaderMap,
    Path(plan_id): Path<String>,
) -> Reply {
    authorize(&headers, Role::can_manage_workforce, "maintain manpower plans")?;
    let plan_id = PlanId(plan_id);
    let target = plan_id.clone();
    run_engine(&engine, move |engine| engine.plans().delete(&target)).await?;
    Ok(success(
        StatusCode::OK,
        format!("plan {plan_id} deleted"),
        serde_json::Value::Null,
    ))
}

async fn plan_deficit(State(engine): State<Arc<HeadcountEngine>>, headers: HeaderMap) -> Reply {
    authenticate(&headers)?;
    let deficits = run_engine(&engine, |engine| engine.plans().deficit()).await?;
    Ok(success(
        StatusCode::OK,
        format!("{} plan(s) below target", deficits.len()),
        deficits,
    ))
}

/// Run an engine call on the blocking pool. Capacity retries back off with `thread::sleep`,
/// which must not stall the async workers.
async fn run_engine<T, F>(engine: &Arc<HeadcountEngine>, work: F) -> Result<T, Response>
where
    T: Send + 'static,
    F: FnOnce(&HeadcountEngine) -> Result<T, GovernanceError> + Send + 'static,
{
    let engine = Arc::clone(engine);
    match tokio::task::spawn_blocking(move || work(&engine)).await {
        Ok(result) => result.map_err(failure),
        Err(err) => {
            error!(error = %err, "engine task did not complete");
            let outcome = OutcomeClass::ServerError;
            let payload = json!({
                "status": outcome.envelope_status(),
                "outcome": outcome,
                "message": "engine task did not complete",
            });
            Err((outcome.status_code(), Json(payload)).into_response())
        }
    }
}

fn authenticate(headers: &HeaderMap) -> Result<Actor, Response> {
    let id = header_text(headers, ACTOR_ID_HEADER).ok_or_else(|| {
        refuse(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            format!("missing {ACTOR_ID_HEADER} header"),
        )
    })?;
    let role = header_text(headers, ACTOR_ROLE_HEADER).ok_or_else(|| {
        refuse(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            format!("missing {ACTOR_ROLE_HEADER} header"),
        )
    })?;
    Ok(Actor::new(id, Role::parse(role)))
}

fn authorize(
    headers: &HeaderMap,
    allowed: fn(&Role) -> bool,
    action: &str,
) -> Result<Actor, Response> {
    let actor = authenticate(headers)?;
    if allowed(&actor.role) {
        Ok(actor)
    } else {
        Err(refuse(
            StatusCode::FORBIDDEN,
            "forbidden",
            format!("role {} may not {action}", actor.role.label()),
        ))
    }
}

/// Drafts and pending requests may be withdrawn by their creator or by an approver.
async fn ensure_owner_or_approver(
    engine: &Arc<HeadcountEngine>,
    actor: &Actor,
    request_no: &RequestNo,
    action: &str,
) -> Result<(), Response> {
    if actor.role.can_decide_requests() {
        return Ok(());
    }
    let lookup = request_no.clone();
    let request = run_engine(engine, move |engine| engine.requests().get(&lookup)).await?;
    if request.created_by == actor.id {
        Ok(())
    } else {
        Err(refuse(
            StatusCode::FORBIDDEN,
            "forbidden",
            format!("only the creator or an approver may {action} request {request_no}"),
        ))
    }
}

fn header_text<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(|err| {
        failure(GovernanceError::Validation(format!(
            "invalid request body: {err}"
        )))
    })
}

/// Like [`parse_body`], but an empty body yields the default payload.
fn parse_optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    parse_body(body)
}

fn success<T: Serialize>(status: StatusCode, message: impl Into<String>, data: T) -> Response {
    let outcome = OutcomeClass::Success;
    let payload = json!({
        "status": outcome.envelope_status(),
        "outcome": outcome,
        "message": message.into(),
        "data": data,
    });
    (status, Json(payload)).into_response()
}

fn failure(err: GovernanceError) -> Response {
    let outcome = err.class();
    let mut payload = json!({
        "status": outcome.envelope_status(),
        "outcome": outcome,
        "message": err.to_string(),
    });
    if let GovernanceError::CapacityExceeded(shortfall) = &err {
        payload["data"] = json!(shortfall);
    }
    (outcome.status_code(), Json(payload)).into_response()
}

fn refuse(status: StatusCode, outcome: &str, message: String) -> Response {
    let payload = json!({
        "status": "fail",
        "outcome": outcome,
        "message": message,
    });
    (status, Json(payload)).into_response()
}
