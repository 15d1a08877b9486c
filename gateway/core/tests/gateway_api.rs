// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end tests of the gateway HTTP API against a real echo worker
//! listening on an ephemeral localhost port.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use mesh_gateway_core::application::repository_factory::RegistryStore;
use mesh_gateway_core::application::MeshGateway;
use mesh_gateway_core::config::GatewayConfig;
use mesh_gateway_core::events::RunEvent;
use mesh_gateway_core::infrastructure::event_bus::DomainEvent;
use mesh_gateway_core::infrastructure::HttpAgentClient;
use mesh_gateway_core::presentation::api::app;
use mesh_gateway_core::protocol::{AgentRunRequest, AgentRunResponse, Message};
use mesh_gateway_core::run::{RunRecord, RunState};

const TOKEN: &str = "worker-secret";

async fn spawn_echo_worker(name: &'static str) -> String {
    let router = Router::new()
        .route(
            "/agents",
            get(move || async move { Json(json!({ "agents": [{ "name": name }] })) }),
        )
        .route("/ping", get(|| async { Json(json!({ "status": "ok" })) }))
        .route(
            "/runs",
            post(|headers: axum::http::HeaderMap, Json(req): Json<AgentRunRequest>| async move {
                let authorized = headers
                    .get(header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .map_or(false, |v| v == format!("Bearer {}", TOKEN));
                if !authorized {
                    return Err(StatusCode::UNAUTHORIZED);
                }
                let text: String = req.input.iter().map(Message::content).collect();
                Ok(Json(AgentRunResponse {
                    run_id: req.run_id,
                    status: AgentRunResponse::COMPLETED.to_string(),
                    output: vec![Message::agent_text(format!("Processed: {}", text))],
                    session_context: None,
                }))
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn closed_endpoint() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

fn gateway(config: GatewayConfig) -> Arc<MeshGateway> {
    let client = Arc::new(HttpAgentClient::new().unwrap());
    Arc::new(MeshGateway::new(
        config,
        RegistryStore::in_memory(),
        client.clone(),
        client,
    ))
}

fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.health.enabled = false;
    config.timeouts.verification_ms = 2_000;
    config.timeouts.run_ms = 2_000;
    config
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn registration(name: &str, endpoint: &str) -> Value {
    json!({
        "agent_name": name,
        "agent_type": "custom",
        "capabilities": ["text"],
        "acp_base_url": endpoint,
        "auth_token": TOKEN,
        "description": "echoes its input",
    })
}

#[tokio::test]
async fn happy_path_registers_and_routes() {
    let endpoint = spawn_echo_worker("echo").await;
    let gateway = gateway(test_config());
    let router = app(gateway.clone());

    let (status, body) = send(&router, "POST", "/platform/agents/register", Some(registration("echo", &endpoint))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "active");
    assert_eq!(body["agent_name"], "echo");
    assert!(body["agent"].get("auth_token").is_none());

    let (status, body) = send(&router, "GET", "/agents", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["agents"].as_array().unwrap().len(), 1);

    let mut events = gateway.event_bus.subscribe();
    let (status, body) = send(
        &router,
        "POST",
        "/runs",
        Some(json!({ "agent": "echo", "input": [{ "content": "hi" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let run: RunRecord = serde_json::from_value(body).unwrap();
    assert_eq!(run.state(), RunState::Completed);
    assert_eq!(run.output_text().as_deref(), Some("Processed: hi"));

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let DomainEvent::Run(RunEvent::StateChanged { run_id, to, .. }) = event {
            if run_id == run.id {
                seen.push(to);
            }
        }
    }
    assert_eq!(seen, vec![RunState::Created, RunState::InProgress, RunState::Completed]);

    let (status, body) = send(&router, "GET", &format!("/runs/{}", run.id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "completed");

    // Terminal runs cannot be cancelled
    let (status, body) = send(&router, "POST", &format!("/runs/{}/cancel", run.id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "invalid_state");
}

#[tokio::test]
async fn unreachable_agent_is_never_listed() {
    let gateway = gateway(test_config());
    let router = app(gateway);

    let (status, body) = send(
        &router,
        "POST",
        "/platform/agents/register",
        Some(registration("ghost", &closed_endpoint())),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "verification_failed");
    assert_eq!(body["details"]["error_class"], "connection_refused");

    let (_, body) = send(&router, "GET", "/agents?status=active", None).await;
    assert!(body["agents"].as_array().unwrap().is_empty());

    let (status, body) = send(
        &router,
        "POST",
        "/runs",
        Some(json!({ "agent": "ghost", "input": ["hello"] })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "agent_not_found");
}

#[tokio::test]
async fn duplicate_active_name_conflicts() {
    let endpoint = spawn_echo_worker("echo").await;
    let router = app(gateway(test_config()));

    let (status, _) = send(&router, "POST", "/platform/agents/register", Some(registration("echo", &endpoint))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&router, "POST", "/platform/agents/register", Some(registration("echo", &endpoint))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "REG_001");
}

#[tokio::test]
async fn malformed_registration_is_rejected_before_verification() {
    let router = app(gateway(test_config()));

    let (status, body) = send(
        &router,
        "POST",
        "/platform/agents/register",
        Some(json!({ "agent_name": "echo", "agent_type": "custom" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "missing_required_fields");
}

#[tokio::test]
async fn stale_session_is_not_recreated() {
    let endpoint = spawn_echo_worker("echo").await;
    let mut config = test_config();
    config.sessions.inactivity_secs = 1;
    let router = app(gateway(config));

    send(&router, "POST", "/platform/agents/register", Some(registration("echo", &endpoint))).await;
    let (status, session) = send(&router, "POST", "/sessions", Some(json!({ "agent": "echo" }))).await;
    assert_eq!(status, StatusCode::OK);
    let session_id = session["id"].as_str().unwrap().to_string();

    tokio::time::sleep(Duration::from_millis(1_200)).await;

    let (status, body) = send(
        &router,
        "POST",
        "/runs",
        Some(json!({ "agent": "echo", "input": ["hi"], "session_id": session_id })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "session_not_found");

    let (status, _) = send(&router, "GET", &format!("/sessions/{}", session_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let router = app(gateway(test_config()));

    let (status, body) = send(&router, "GET", "/runs/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "run_not_found");

    let (status, _) = send(&router, "GET", &format!("/runs/{}", uuid::Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&router, "DELETE", "/platform/agents/nobody", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "agent_not_found");
}

#[tokio::test]
async fn cleanup_removes_every_agent() {
    let first = spawn_echo_worker("alpha").await;
    let second = spawn_echo_worker("beta").await;
    let router = app(gateway(test_config()));

    send(&router, "POST", "/platform/agents/register", Some(registration("alpha", &first))).await;
    send(&router, "POST", "/platform/agents/register", Some(registration("beta", &second))).await;

    let (status, body) = send(&router, "DELETE", "/platform/agents/cleanup", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted_count"], 2);

    let (_, body) = send(&router, "GET", "/health", None).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["agents"], 0);
}

#[tokio::test]
async fn body_rejections_use_the_error_envelope() {
    let router = app(gateway(test_config()));

    let (status, body) = send(&router, "POST", "/runs", Some(json!({ "input": ["hi"] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "REG_004");
    assert_eq!(body["details"]["missing_fields"], json!(["agent"]));

    let request = Request::builder()
        .method("POST")
        .uri("/sessions")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["code"], "REG_003");
    assert_eq!(body["kind"], "manifest_error");

    let request = Request::builder()
        .method("POST")
        .uri("/platform/agents/register")
        .body(Body::from(registration("plain", &closed_endpoint()).to_string()))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["code"], "REG_003");
}

#[tokio::test]
async fn finished_run_streams_its_final_state() {
    let endpoint = spawn_echo_worker("streamer").await;
    let router = app(gateway(test_config()));
    send(&router, "POST", "/platform/agents/register", Some(registration("streamer", &endpoint))).await;

    let (status, body) = send(
        &router,
        "POST",
        "/runs",
        Some(json!({ "agent": "streamer", "input": ["hi"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let run_id = body["id"].as_str().unwrap().to_string();

    let request = Request::builder()
        .uri(format!("/runs/{}/events", run_id))
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
    assert!(content_type.map_or(false, |v| v.to_str().unwrap_or("").starts_with("text/event-stream")));

    // Terminal runs end the stream after the snapshot
    let bytes = tokio::time::timeout(
        Duration::from_secs(5),
        axum::body::to_bytes(response.into_body(), usize::MAX),
    )
    .await
    .unwrap()
    .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("event: state"), "{text}");
    assert!(text.contains("\"state\":\"completed\""), "{text}");
    assert!(text.contains(&run_id), "{text}");

    let (status, _) = send(&router, "GET", &format!("/runs/{}/events", uuid::Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
