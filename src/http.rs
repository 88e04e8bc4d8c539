//! Thin HTTP/JSON layer over the engine. Owns no domain logic: handlers
//! parse ids and bodies, call the engine, and shape status codes per the
//! API convention (201 created, 200 full, 204 empty list, 206 windowed
//! list, 400 malformed or conflicting, 404 unknown id, 409 busy machine).

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use ulid::Ulid;

use crate::engine::{Engine, EngineError, MachineFilter, OrderFilter, ScheduleFilter};
use crate::model::*;
use crate::observability::{REQUEST_DURATION_SECONDS, REQUESTS_TOTAL};

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/api/v1/machines", get(list_machines).post(create_machine))
        .route(
            "/api/v1/machines/{id}",
            get(get_machine).put(update_machine).delete(delete_machine),
        )
        .route("/api/v1/schedules", get(list_schedules).post(create_schedule))
        .route(
            "/api/v1/schedules/{id}",
            get(get_schedule).put(update_schedule).delete(delete_schedule),
        )
        .route("/api/v1/orders", get(list_orders).post(create_order))
        .route("/api/v1/orders/count", get(count_orders))
        .route(
            "/api/v1/orders/{id}",
            get(get_order).put(update_order).delete(delete_order),
        )
        .route("/api/v1/orders/{id}/comments", post(add_comment))
        .with_state(engine)
}

// ── Response shaping ─────────────────────────────────────────────

fn error_response(e: &EngineError) -> Response {
    let status = match e {
        EngineError::MalformedInput(_) | EngineError::ScheduleConflict { .. } => {
            StatusCode::BAD_REQUEST
        }
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::MachineBusy(_) => StatusCode::CONFLICT,
        EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("{e}");
    }
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}

fn entity_response<T: Serialize>(status: StatusCode, wrap: &'static str, entity: T) -> Response {
    (status, Json(json!({ wrap: entity }))).into_response()
}

/// Empty lists are 204; a list windowed by both `limit` and `skip` is 206;
/// everything else is 200 — the convention the original API promises.
fn list_response<T: Serialize>(
    wrap: &'static str,
    items: Vec<T>,
    limit: Option<usize>,
    skip: Option<usize>,
) -> Response {
    if items.is_empty() {
        return StatusCode::NO_CONTENT.into_response();
    }
    let status = if limit.is_some() && skip.is_some() {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };
    (status, Json(json!({ wrap: items }))).into_response()
}

fn parse_id(raw: &str) -> Result<Ulid, EngineError> {
    Ulid::from_string(raw).map_err(|_| EngineError::MalformedInput("id is not a valid ULID"))
}

/// A body that fails to parse (bad JSON, missing required field, wrong
/// type) is malformed input — 400, like every other validation failure.
fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, EngineError> {
    body.map(|Json(v)| v)
        .map_err(|_| EngineError::MalformedInput("invalid request body"))
}

fn track(op: &'static str, started: Instant, resp: Response) -> Response {
    metrics::counter!(
        REQUESTS_TOTAL,
        "op" => op,
        "status" => resp.status().as_u16().to_string()
    )
    .increment(1);
    metrics::histogram!(REQUEST_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());
    resp
}

// ── Machines ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MachineListParams {
    limit: Option<usize>,
    skip: Option<usize>,
    #[serde(rename = "type")]
    machine_type: Option<MachineType>,
    fablab_id: Option<String>,
}

async fn list_machines(
    State(engine): State<Arc<Engine>>,
    Query(params): Query<MachineListParams>,
) -> Response {
    let started = Instant::now();
    let filter = MachineFilter {
        machine_type: params.machine_type,
        fablab_id: params.fablab_id,
    };
    let machines = engine.list_machines(&filter, params.limit, params.skip).await;
    track(
        "list_machines",
        started,
        list_response("machines", machines, params.limit, params.skip),
    )
}

async fn create_machine(
    State(engine): State<Arc<Engine>>,
    body: Result<Json<MachineDraft>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let result = match parse_body(body) {
        Ok(draft) => engine.create_machine(draft).await,
        Err(e) => Err(e),
    };
    let resp = match result {
        Ok(machine) => entity_response(StatusCode::CREATED, "machine", machine),
        Err(e) => error_response(&e),
    };
    track("create_machine", started, resp)
}

async fn get_machine(State(engine): State<Arc<Engine>>, Path(id): Path<String>) -> Response {
    let started = Instant::now();
    let resp = match parse_id(&id) {
        Ok(id) => match engine.get_machine(id).await {
            Ok(machine) => entity_response(StatusCode::OK, "machine", machine),
            Err(e) => error_response(&e),
        },
        Err(e) => error_response(&e),
    };
    track("get_machine", started, resp)
}

async fn update_machine(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<String>,
    body: Result<Json<MachinePatch>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let result = match parse_id(&id).and_then(|id| parse_body(body).map(|patch| (id, patch))) {
        Ok((id, patch)) => engine.update_machine(id, patch).await,
        Err(e) => Err(e),
    };
    let resp = match result {
        Ok(machine) => entity_response(StatusCode::OK, "machine", machine),
        Err(e) => error_response(&e),
    };
    track("update_machine", started, resp)
}

async fn delete_machine(State(engine): State<Arc<Engine>>, Path(id): Path<String>) -> Response {
    let started = Instant::now();
    let resp = match parse_id(&id) {
        Ok(id) => match engine.delete_machine(id).await {
            Ok(machine) => entity_response(StatusCode::OK, "machine", machine),
            Err(e) => error_response(&e),
        },
        Err(e) => error_response(&e),
    };
    track("delete_machine", started, resp)
}

// ── Schedules ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleListParams {
    limit: Option<usize>,
    skip: Option<usize>,
    machine_id: Option<Ulid>,
    order_id: Option<Ulid>,
    fablab_id: Option<String>,
}

async fn list_schedules(
    State(engine): State<Arc<Engine>>,
    Query(params): Query<ScheduleListParams>,
) -> Response {
    let started = Instant::now();
    let filter = ScheduleFilter {
        machine_id: params.machine_id,
        order_id: params.order_id,
        fablab_id: params.fablab_id,
    };
    let schedules = engine.list_schedules(&filter, params.limit, params.skip);
    track(
        "list_schedules",
        started,
        list_response("schedules", schedules, params.limit, params.skip),
    )
}

async fn create_schedule(
    State(engine): State<Arc<Engine>>,
    body: Result<Json<ScheduleDraft>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let result = match parse_body(body) {
        Ok(draft) => engine.create_schedule(draft).await,
        Err(e) => Err(e),
    };
    let resp = match result {
        Ok(schedule) => entity_response(StatusCode::CREATED, "schedule", schedule),
        Err(e) => error_response(&e),
    };
    track("create_schedule", started, resp)
}

async fn get_schedule(State(engine): State<Arc<Engine>>, Path(id): Path<String>) -> Response {
    let started = Instant::now();
    let resp = match parse_id(&id).and_then(|id| engine.get_schedule(id)) {
        Ok(schedule) => entity_response(StatusCode::OK, "schedule", schedule),
        Err(e) => error_response(&e),
    };
    track("get_schedule", started, resp)
}

async fn update_schedule(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<String>,
    body: Result<Json<SchedulePatch>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let result = match parse_id(&id).and_then(|id| parse_body(body).map(|patch| (id, patch))) {
        Ok((id, patch)) => engine.update_schedule(id, patch).await,
        Err(e) => Err(e),
    };
    let resp = match result {
        Ok(schedule) => entity_response(StatusCode::OK, "schedule", schedule),
        Err(e) => error_response(&e),
    };
    track("update_schedule", started, resp)
}

async fn delete_schedule(State(engine): State<Arc<Engine>>, Path(id): Path<String>) -> Response {
    let started = Instant::now();
    let resp = match parse_id(&id) {
        Ok(id) => match engine.delete_schedule(id).await {
            Ok(schedule) => entity_response(StatusCode::OK, "schedule", schedule),
            Err(e) => error_response(&e),
        },
        Err(e) => error_response(&e),
    };
    track("delete_schedule", started, resp)
}

// ── Orders ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderListParams {
    limit: Option<usize>,
    skip: Option<usize>,
    status: Option<OrderStatus>,
}

#[derive(Debug, Deserialize)]
struct CommentDraft {
    author: String,
    content: String,
}

async fn list_orders(
    State(engine): State<Arc<Engine>>,
    Query(params): Query<OrderListParams>,
) -> Response {
    let started = Instant::now();
    let filter = OrderFilter {
        status: params.status,
    };
    let orders = engine.list_orders(&filter, params.limit, params.skip);
    track(
        "list_orders",
        started,
        list_response("orders", orders, params.limit, params.skip),
    )
}

async fn count_orders(
    State(engine): State<Arc<Engine>>,
    Query(params): Query<OrderListParams>,
) -> Response {
    let started = Instant::now();
    let filter = OrderFilter {
        status: params.status,
    };
    let count = engine.count_orders(&filter);
    track(
        "count_orders",
        started,
        (StatusCode::OK, Json(json!({ "count": count }))).into_response(),
    )
}

async fn create_order(
    State(engine): State<Arc<Engine>>,
    body: Result<Json<OrderDraft>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let result = match parse_body(body) {
        Ok(draft) => engine.create_order(draft).await,
        Err(e) => Err(e),
    };
    let resp = match result {
        Ok(order) => entity_response(StatusCode::CREATED, "order", order),
        Err(e) => error_response(&e),
    };
    track("create_order", started, resp)
}

async fn get_order(State(engine): State<Arc<Engine>>, Path(id): Path<String>) -> Response {
    let started = Instant::now();
    let resp = match parse_id(&id).and_then(|id| engine.get_order(id)) {
        Ok(order) => entity_response(StatusCode::OK, "order", order),
        Err(e) => error_response(&e),
    };
    track("get_order", started, resp)
}

async fn update_order(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<String>,
    body: Result<Json<OrderPatch>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let result = match parse_id(&id).and_then(|id| parse_body(body).map(|patch| (id, patch))) {
        Ok((id, patch)) => engine.update_order(id, patch).await,
        Err(e) => Err(e),
    };
    let resp = match result {
        Ok(order) => entity_response(StatusCode::OK, "order", order),
        Err(e) => error_response(&e),
    };
    track("update_order", started, resp)
}

async fn delete_order(State(engine): State<Arc<Engine>>, Path(id): Path<String>) -> Response {
    let started = Instant::now();
    let resp = match parse_id(&id) {
        Ok(id) => match engine.delete_order(id).await {
            Ok(order) => entity_response(StatusCode::OK, "order", order),
            Err(e) => error_response(&e),
        },
        Err(e) => error_response(&e),
    };
    track("delete_order", started, resp)
}

async fn add_comment(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<String>,
    body: Result<Json<CommentDraft>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let result = match parse_id(&id).and_then(|id| parse_body(body).map(|draft| (id, draft))) {
        Ok((id, draft)) => engine.add_comment(id, draft.author, draft.content).await,
        Err(e) => Err(e),
    };
    let resp = match result {
        Ok(order) => entity_response(StatusCode::CREATED, "order", order),
        Err(e) => error_response(&e),
    };
    track("add_comment", started, resp)
}
