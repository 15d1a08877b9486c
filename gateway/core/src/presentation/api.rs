// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Gateway HTTP API
//!
//! Registration lives under `/platform/agents`, the standard routing surface
//! (`/agents`, `/runs`, `/sessions`) sits at the root. Every failure is
//! rendered as `{code, kind, message, details}` with a status derived from
//! its [`ErrorKind`].

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Path, Query, Request, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, KeepAliveStream, Sse},
        IntoResponse, Response,
    },
    routing::{delete, get, post},
    Json, Router,
};
use futures::stream::{self, BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::application::gateway::MeshGateway;
use crate::application::router::CreateRunRequest;
use crate::domain::agent::AgentFilter;
use crate::domain::error::{ErrorKind, MeshError, MeshResult};
use crate::domain::protocol::{normalize_input, AgentList, AgentManifest, CreateRunBody};
use crate::domain::run::{RunId, RunRecord};
use crate::domain::session::{SessionId, SessionRecord};
use crate::infrastructure::event_bus::EventBusError;

const DEFAULT_RUN_LIST_LIMIT: usize = 50;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<MeshGateway>,
}

pub fn app(gateway: Arc<MeshGateway>) -> Router {
    let state = AppState { gateway };

    Router::new()
        .route("/health", get(health))
        .route("/platform/agents/register", post(register_agent))
        .route("/platform/agents/cleanup", delete(cleanup_agents))
        .route("/platform/agents/{name}", delete(deregister_agent))
        .route("/agents", get(list_agents))
        .route("/agents/{name}", get(get_agent))
        .route("/runs", post(create_run).get(list_runs))
        .route("/runs/{id}", get(get_run))
        .route("/runs/{id}/cancel", post(cancel_run))
        .route("/runs/{id}/events", get(stream_run_events))
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", get(get_session).delete(delete_session))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::MissingRequiredFields
        | ErrorKind::ManifestError
        | ErrorKind::CapabilityError
        | ErrorKind::VerificationFailed => StatusCode::BAD_REQUEST,
        ErrorKind::NameConflict | ErrorKind::SessionAgentMismatch | ErrorKind::InvalidState => {
            StatusCode::CONFLICT
        }
        ErrorKind::AgentNotFound | ErrorKind::SessionNotFound | ErrorKind::RunNotFound => {
            StatusCode::NOT_FOUND
        }
        ErrorKind::AgentUnavailable | ErrorKind::PlatformUnavailable => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ErrorKind::RoutingTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::AgentInvocationFailed | ErrorKind::PlatformConnectionError => {
            StatusCode::BAD_GATEWAY
        }
        ErrorKind::PlatformAuthenticationError => StatusCode::UNAUTHORIZED,
        ErrorKind::NoFreePort
        | ErrorKind::ServerStartTimeout
        | ErrorKind::WorkerHandlerFailed
        | ErrorKind::StoreError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for MeshError {
    fn into_response(self) -> Response {
        let status = status_for(self.kind);
        if status.is_server_error() {
            warn!(code = self.code(), "{}", self.message);
        } else {
            debug!(code = self.code(), "{}", self.message);
        }
        (status, Json(self.to_body())).into_response()
    }
}

/// `Json` extractor whose rejections render as [`MeshError`] bodies.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = MeshError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(rejection_error(rejection)),
        }
    }
}

/// Name of the field in a serde "missing field `x`" message.
fn missing_field(text: &str) -> Option<String> {
    let rest = text.split("missing field `").nth(1)?;
    Some(rest.split('`').next()?.to_string())
}

fn rejection_error(rejection: JsonRejection) -> MeshError {
    let text = rejection.body_text();
    match rejection {
        JsonRejection::JsonDataError(_) => match missing_field(&text) {
            Some(field) => MeshError::missing_fields(vec![field], &[], vec![]),
            None => MeshError::manifest(vec![], text),
        },
        JsonRejection::MissingJsonContentType(_) => {
            MeshError::manifest(vec![], "request body must be sent as application/json")
        }
        _ => MeshError::manifest(vec![], text),
    }
}

fn parse_run_id(raw: &str) -> MeshResult<RunId> {
    RunId::from_string(raw).map_err(|_| MeshError::run_not_found(raw))
}

fn parse_session_id(raw: &str) -> MeshResult<SessionId> {
    SessionId::from_string(raw).map_err(|_| MeshError::session_not_found(raw))
}

async fn health(State(state): State<AppState>) -> MeshResult<Json<Value>> {
    let agents = state.gateway.registry.list(&AgentFilter::default()).await?;
    Ok(Json(json!({
        "status": "healthy",
        "uptime_seconds": state.gateway.uptime_seconds(),
        "agents": agents.len(),
    })))
}

async fn register_agent(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<Value>,
) -> MeshResult<Json<Value>> {
    let record = state.gateway.registry.register_json(payload).await?;
    Ok(Json(json!({
        "message": format!("Agent '{}' registered successfully", record.name),
        "agent_name": record.name.as_str(),
        "status": record.status.as_str(),
        "agent": record.manifest(),
    })))
}

async fn deregister_agent(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> MeshResult<Json<Value>> {
    state.gateway.registry.deregister(&name).await?;
    Ok(Json(json!({
        "message": format!("Agent '{}' deregistered", name),
        "agent_name": name,
    })))
}

async fn cleanup_agents(State(state): State<AppState>) -> MeshResult<Json<Value>> {
    let removed = state.gateway.registry.cleanup_all().await?;
    Ok(Json(json!({
        "message": format!("Removed {} agents", removed.len()),
        "deleted_count": removed.len(),
    })))
}

async fn list_agents(
    State(state): State<AppState>,
    Query(filter): Query<AgentFilter>,
) -> MeshResult<Json<AgentList>> {
    let agents = state.gateway.registry.list(&filter).await?;
    Ok(Json(AgentList {
        agents: agents.iter().map(|a| a.manifest()).collect(),
    }))
}

async fn get_agent(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> MeshResult<Json<AgentManifest>> {
    let agent = state.gateway.registry.lookup(&name).await?;
    Ok(Json(agent.manifest()))
}

async fn create_run(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateRunBody>,
) -> MeshResult<Json<RunRecord>> {
    let mut request = CreateRunRequest::new(body.agent, normalize_input(body.input));
    if let Some(session_id) = body.session_id {
        request = request.with_session(session_id);
    }
    if body.stateful {
        request = request.stateful();
    }
    let run = state.gateway.runs.create_run(request).await?;
    Ok(Json(run))
}

#[derive(Debug, Deserialize)]
struct ListRunsQuery {
    agent: Option<String>,
    limit: Option<usize>,
}

async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<ListRunsQuery>,
) -> MeshResult<Json<Value>> {
    let runs = state
        .gateway
        .runs
        .list_runs(query.agent.as_deref(), query.limit.unwrap_or(DEFAULT_RUN_LIST_LIMIT))
        .await?;
    Ok(Json(json!({ "runs": runs })))
}

async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> MeshResult<Json<RunRecord>> {
    let run = state.gateway.runs.get_run(parse_run_id(&id)?).await?;
    Ok(Json(run))
}

async fn cancel_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> MeshResult<Json<RunRecord>> {
    let run = state.gateway.runs.cancel_run(parse_run_id(&id)?).await?;
    Ok(Json(run))
}

fn state_event(run: &RunRecord) -> Result<Event, axum::Error> {
    Event::default().event("state").json_data(json!({
        "run_id": run.id,
        "agent_name": run.agent_name,
        "state": run.state(),
    }))
}

/// Current state first, then every transition until the run is terminal.
async fn stream_run_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> MeshResult<impl IntoResponse> {
    let run_id = parse_run_id(&id)?;
    // Subscribe before reading so no transition falls between the two
    let receiver = state.gateway.event_bus.subscribe_run(run_id);
    let run = state.gateway.runs.get_run(run_id).await?;

    let initial = stream::once(futures::future::ready(state_event(&run)));
    if run.is_terminal() {
        return Ok(sse(initial.boxed()));
    }

    let updates = stream::unfold((receiver, false), |(mut receiver, done)| async move {
        if done {
            return None;
        }
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let terminal = event.state().is_terminal();
                    let item = Event::default().event("transition").json_data(&event);
                    return Some((item, (receiver, terminal)));
                }
                Err(EventBusError::Lagged(skipped)) => {
                    warn!(skipped, "Run event stream lagged");
                }
                Err(_) => return None,
            }
        }
    });

    Ok(sse(initial.chain(updates).boxed()))
}

fn sse(
    events: BoxStream<'static, Result<Event, axum::Error>>,
) -> Sse<KeepAliveStream<BoxStream<'static, Result<Event, axum::Error>>>> {
    Sse::new(events).keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
struct CreateSessionBody {
    agent: String,
}

async fn create_session(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateSessionBody>,
) -> MeshResult<Json<SessionRecord>> {
    let session = state.gateway.sessions.create(&body.agent).await?;
    Ok(Json(session))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> MeshResult<Json<SessionRecord>> {
    let session = state.gateway.sessions.get(parse_session_id(&id)?).await?;
    Ok(Json(session))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> MeshResult<Json<Value>> {
    state.gateway.sessions.delete(parse_session_id(&id)?).await?;
    Ok(Json(json!({ "message": format!("Session '{}' deleted", id) })))
}
