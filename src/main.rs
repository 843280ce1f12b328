mod collab;
mod config;
mod http;
mod idempotency;
mod metrics;
mod models;
mod review;
mod sessions;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use eyre::WrapErr;
use idempotency::IdempotencyStore;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{
    ApiError, ImageRequest, KeyRequest, LoadBatchRequest, LoadBatchResponse, SessionView,
    ToggleResponse, WaitQuery,
};
use review::{
    AiPreview, ApprovalOutcome, BatchItem, KeyOutcome, Orchestrator, ReviewError,
    ReviewErrorKind, SearchReport,
};
use serde::Serialize;
use serde_json::{Value, json};
use sessions::{SessionHandle, SessionStore};
use std::{future::Future, net::SocketAddr};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};
use uuid::Uuid;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "hermes.api", "server crashed: {err:?}");
    }
}

async fn run() -> eyre::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .wrap_err("installing prometheus recorder")?;
    let state = AppState {
        orchestrator: Orchestrator::from_env(),
        sessions: SessionStore::default(),
        idempotency: IdempotencyStore::from_env(),
        prometheus_handle,
    };
    let app = router(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8000);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!(target = "hermes.api", "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("binding {addr}"))?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    orchestrator: Orchestrator,
    sessions: SessionStore,
    idempotency: IdempotencyStore,
    prometheus_handle: PrometheusHandle,
}

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    let items = Router::new()
        .route("/toggle", post(toggle_image))
        .route("/select", post(select_image))
        .route("/ai_preview", post(ai_preview))
        .route("/approve", post(approve_item))
        .route("/quick_approve", post(quick_approve_item))
        .route("/skip", post(skip_item));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/batches", post(load_batch))
        .route("/batches/{id}", get(get_batch).delete(discard_batch))
        .route("/batches/{id}/search", post(start_search))
        .route("/batches/{id}/cancel", post(cancel_batch))
        .route("/batches/{id}/keys", post(press_key))
        .nest("/batches/{id}/items/{item_id}", items)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::extract::DefaultBodyLimit::max(body_limit_from_env()))
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
///
/// Returns `status`, `service` and the number of live sessions.
async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "hermes-hero-rs",
        "sessions": state.sessions.count().await,
    }))
}

fn body_limit_from_env() -> usize {
    std::env::var("REQUEST_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(256 * 1024)
}

async fn metrics_endpoint(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Ok(secret) = std::env::var("METRICS_KEY") {
        let presented = headers
            .get("X-Metrics-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != secret {
            return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
        }
    }
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.prometheus_handle.render(),
    )
        .into_response()
}

async fn session_for(state: &AppState, id: Uuid) -> Result<SessionHandle, AppError> {
    state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| AppError::from(ReviewError::not_found("session", format!("unknown batch {id}"))))
}

/// Load a batch of catalog items and register a new review session.
///
/// - Method: `POST`
/// - Path: `/batches`
/// - Body: `LoadBatchRequest`
/// - Response: `LoadBatchResponse` (`empty: true` when nothing matched)
async fn load_batch(
    State(state): State<AppState>,
    Json(payload): Json<LoadBatchRequest>,
) -> Result<Json<LoadBatchResponse>, AppError> {
    crate::metrics::inc_requests("/batches");
    let session = state
        .orchestrator
        .load(payload.filter, payload.batch_size)
        .await?;
    let empty = session.items.is_empty();
    let handle = state.sessions.insert(session).await;
    if let Some(previous) = payload.replaces {
        state.sessions.discard(previous).await;
    }
    if payload.auto_search && !empty {
        handle.spawn_search(&state.orchestrator);
    }
    let view = SessionView::from(&*handle.session.lock().await);
    Ok(Json(LoadBatchResponse {
        empty,
        session: view,
    }))
}

async fn get_batch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let handle = session_for(&state, id).await?;
    let view = SessionView::from(&*handle.session.lock().await);
    Ok(Json(view))
}

async fn discard_batch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.sessions.discard(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ReviewError::not_found("session", format!("unknown batch {id}")).into())
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum SearchResponse {
    Finished(SearchReport),
    Started { started: bool },
}

/// Start the serial search cycle over the batch's pending items.
///
/// - Method: `POST`
/// - Path: `/batches/{id}/search`
/// - Query: `wait=true` blocks until the cycle ends and returns the report
async fn start_search(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<WaitQuery>,
) -> Result<(StatusCode, Json<SearchResponse>), AppError> {
    crate::metrics::inc_requests("/batches/search");
    let handle = session_for(&state, id).await?;
    if query.wait {
        let report = state
            .orchestrator
            .run_search(&handle.session, &handle.cancel)
            .await?;
        return Ok((StatusCode::OK, Json(SearchResponse::Finished(report))));
    }
    if handle.session.lock().await.search_running {
        return Err(ReviewError::validation(
            "search",
            "a search cycle is already running for this batch",
        )
        .into());
    }
    handle.spawn_search(&state.orchestrator);
    Ok((
        StatusCode::ACCEPTED,
        Json(SearchResponse::Started { started: true }),
    ))
}

async fn cancel_batch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    if !state.sessions.cancel_tasks(id).await {
        return Err(ReviewError::not_found("session", format!("unknown batch {id}")).into());
    }
    Ok(Json(json!({ "cancelled": true })))
}

async fn toggle_image(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(Uuid, String)>,
    Json(payload): Json<ImageRequest>,
) -> Result<Json<ToggleResponse>, AppError> {
    let handle = session_for(&state, id).await?;
    let (excluded, item) = state
        .orchestrator
        .toggle_exclude(&handle.session, &item_id, &payload.image_id)
        .await?;
    Ok(Json(ToggleResponse { excluded, item }))
}

async fn select_image(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(Uuid, String)>,
    Json(payload): Json<ImageRequest>,
) -> Result<Json<BatchItem>, AppError> {
    let handle = session_for(&state, id).await?;
    let item = state
        .orchestrator
        .select(&handle.session, &item_id, &payload.image_id)
        .await?;
    Ok(Json(item))
}

/// Run the hero enhancement pipeline for the item's selected image.
///
/// - Method: `POST`
/// - Path: `/batches/{id}/items/{item_id}/ai_preview`
/// - Query: `wait=true` blocks until polling ends
/// - Response: `AiPreview`; `202` with `ai_status: processing` when not waiting
async fn ai_preview(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(Uuid, String)>,
    Query(query): Query<WaitQuery>,
) -> Result<(StatusCode, Json<AiPreview>), AppError> {
    crate::metrics::inc_requests("/batches/items/ai_preview");
    let handle = session_for(&state, id).await?;
    let ticket = state
        .orchestrator
        .begin_preview(&handle.session, &item_id)
        .await?;
    if query.wait {
        let preview = state
            .orchestrator
            .run_preview(&handle.session, ticket, &handle.cancel)
            .await?;
        return Ok((StatusCode::OK, Json(preview)));
    }
    let pending = AiPreview {
        item_id: ticket.item_id.clone(),
        ai_status: review::AiStatus::Processing,
        candidate: None,
        stages: Vec::new(),
    };
    handle.spawn_preview(&state.orchestrator, ticket);
    Ok((StatusCode::ACCEPTED, Json(pending)))
}

fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Runs a commit once per `Idempotency-Key`; replays return the stored outcome.
async fn replayable<Fut>(
    state: &AppState,
    headers: &HeaderMap,
    scope: String,
    commit: Fut,
) -> Result<Json<Value>, AppError>
where
    Fut: Future<Output = Result<ApprovalOutcome, ReviewError>>,
{
    let Some(key) = idempotency_key(headers) else {
        return Ok(Json(json!(commit.await?)));
    };
    let cache_key = format!("{scope}:{key}");
    if let Some(existing) = state.idempotency.get(&cache_key).await {
        info!(target = "hermes.api", scope = %scope, "idempotent_replay");
        return Ok(Json(existing));
    }
    let outcome = json!(commit.await?);
    state.idempotency.put(cache_key, &outcome).await;
    Ok(Json(outcome))
}

async fn approve_item(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(Uuid, String)>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    crate::metrics::inc_requests("/batches/items/approve");
    let handle = session_for(&state, id).await?;
    let scope = format!("{id}:{item_id}:approve");
    let commit = state.orchestrator.approve(&handle.session, &item_id);
    replayable(&state, &headers, scope, commit).await
}

async fn quick_approve_item(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(Uuid, String)>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    crate::metrics::inc_requests("/batches/items/quick_approve");
    let handle = session_for(&state, id).await?;
    let scope = format!("{id}:{item_id}:quick_approve");
    let commit = state.orchestrator.quick_approve(&handle.session, &item_id);
    replayable(&state, &headers, scope, commit).await
}

async fn skip_item(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(Uuid, String)>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    crate::metrics::inc_requests("/batches/items/skip");
    let handle = session_for(&state, id).await?;
    let scope = format!("{id}:{item_id}:skip");
    let commit = state.orchestrator.skip(&handle.session, &item_id);
    replayable(&state, &headers, scope, commit).await
}

/// Keyboard sink: `confirm`, `cancel`, `next`, `previous`.
async fn press_key(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<KeyRequest>,
) -> Result<Json<KeyOutcome>, AppError> {
    let handle = session_for(&state, id).await?;
    let outcome = state
        .orchestrator
        .key(&handle.session, payload.command)
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug)]
enum AppError {
    Review(ReviewError),
}

impl From<ReviewError> for AppError {
    fn from(value: ReviewError) -> Self {
        Self::Review(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Review(err) => {
                let (status, code) = match err.kind() {
                    ReviewErrorKind::Validation => (StatusCode::BAD_REQUEST, "invalid_request"),
                    ReviewErrorKind::NotFound => (StatusCode::NOT_FOUND, "not_found"),
                    ReviewErrorKind::LoadFailed => (StatusCode::BAD_GATEWAY, "batch_load_failed"),
                    ReviewErrorKind::Network => (StatusCode::BAD_GATEWAY, "upstream_failed"),
                    ReviewErrorKind::CommitFailure => (StatusCode::BAD_GATEWAY, "commit_failed"),
                    ReviewErrorKind::Timeout => (StatusCode::GATEWAY_TIMEOUT, "timed_out"),
                    ReviewErrorKind::Cancelled => (StatusCode::CONFLICT, "cancelled"),
                    ReviewErrorKind::EmptyResult => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "empty_result")
                    }
                    ReviewErrorKind::EnhancementFailed => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "enhancement_failed")
                    }
                };
                if status.is_server_error() {
                    error!(target = "hermes.api", stage = err.stage(), error = %err, "request_failed");
                }
                let payload = ApiError {
                    error: code.to_string(),
                    detail: Some(err.to_string()),
                };
                (status, Json(payload)).into_response()
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}
