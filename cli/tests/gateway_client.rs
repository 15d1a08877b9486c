// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use mesh_agent_sdk::{process_fn, Callbacks, RunInput, WorkerConfig, WorkerProcess};
use mesh_gateway::commands::echo::echo_reply;
use mesh_gateway::daemon::{check_gateway_running, GatewayClient, GatewayStatus};
use mesh_gateway::daemon::client::AgentQuery;
use mesh_gateway_core::application::repository_factory::RegistryStore;
use mesh_gateway_core::application::MeshGateway;
use mesh_gateway_core::config::GatewayConfig;
use mesh_gateway_core::infrastructure::HttpAgentClient;
use mesh_gateway_core::presentation::api::app;
use mesh_gateway_core::run::RunState;

async fn spawn_gateway() -> (String, u16) {
    let mut config = GatewayConfig::default();
    config.health.enabled = false;
    let client = Arc::new(HttpAgentClient::new().unwrap());
    let gateway = Arc::new(MeshGateway::new(
        config,
        RegistryStore::in_memory(),
        client.clone(),
        client,
    ));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app(gateway)).await.unwrap();
    });
    (format!("http://127.0.0.1:{}", port), port)
}

#[tokio::test]
async fn status_and_empty_registry() {
    let (url, port) = spawn_gateway().await;

    let status = check_gateway_running("127.0.0.1", port).await.unwrap();
    assert!(matches!(status, GatewayStatus::Running { agents: Some(0), .. }));

    let client = GatewayClient::new(url).unwrap();
    assert!(client.list_agents(&AgentQuery::default()).await.unwrap().is_empty());
    assert_eq!(client.cleanup_agents().await.unwrap(), 0);

    let err = client.get_run(uuid::Uuid::new_v4()).await.unwrap_err();
    assert!(err.to_string().contains("RUN_007"), "{err}");
}

#[tokio::test]
async fn echo_worker_round_trip_through_the_cli_client() {
    let (url, _) = spawn_gateway().await;

    let (registered_tx, mut registered_rx) = mpsc::unbounded_channel();
    let mut config = WorkerConfig::new("cli_echo", "custom", vec!["text".into()], Some(&url))
        .with_hosts("127.0.0.1", "127.0.0.1")
        .with_port_range(42000..=42100)
        .with_callbacks(Callbacks::new().on_register(move |_| {
            let _ = registered_tx.send(());
        }));
    config.platform_url = url.clone();

    let handler = process_fn(|input: RunInput| Ok(echo_reply(&input, true)));
    let worker = WorkerProcess::bind(config, handler).await.unwrap();
    let shutdown = worker.shutdown_handle();
    let running = tokio::spawn(worker.run());
    tokio::time::timeout(Duration::from_secs(10), registered_rx.recv())
        .await
        .unwrap()
        .unwrap();

    let client = GatewayClient::new(url).unwrap();
    let agents = client.list_agents(&AgentQuery::default()).await.unwrap();
    assert_eq!(agents.len(), 1);
    assert_eq!(client.get_agent("cli_echo").await.unwrap().name, "cli_echo");

    let run = client.create_run("cli_echo", "hi", None, true).await.unwrap();
    assert_eq!(run.state(), RunState::Completed);
    assert_eq!(run.output_text().as_deref(), Some("Processed: hi"));
    let session_id = run.session_id.unwrap();

    let second = client
        .create_run("cli_echo", "again", Some(session_id.0), false)
        .await
        .unwrap();
    assert_eq!(second.session_id, Some(session_id));

    let mut states = Vec::new();
    client
        .watch_run(second.id.0, |event| {
            if let Some(state) = event["state"].as_str() {
                states.push(state.to_string());
            }
        })
        .await
        .unwrap();
    assert_eq!(states, vec!["completed".to_string()]);

    let runs = client.list_runs(Some("cli_echo"), 10).await.unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].id, second.id);

    shutdown.shutdown();
    running.await.unwrap().unwrap();
}
