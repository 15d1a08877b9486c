// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0

//! # Worker Startup
//!
//! Turns a process function into a reachable, registered agent:
//!
//! 1. validate the worker description
//! 2. allocate a local port (bound listener)
//! 3. generate the bearer credential
//! 4. start the protocol server as its own task
//! 5. poll the server until it answers
//! 6. register with the gateway, firing `on_register` or `on_error`
//! 7. serve until shutdown, then fire `on_shutdown` and optionally deregister
//!
//! Steps 1-3 happen in [`WorkerProcess::bind`], steps 4-7 in
//! [`WorkerProcess::run`]. Registration runs as a separate task that `run`
//! joins before entering the serving phase.

use std::ops::RangeInclusive;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use mesh_gateway_core::agent::{AgentName, RegistrationRequest};
use mesh_gateway_core::error::{ErrorKind, MeshError, MeshResult};
use mesh_gateway_core::protocol::AgentManifest;
use serde_json::json;

use crate::client::{PlatformClient, DEFAULT_REQUEST_TIMEOUT};
use crate::credential::generate_credential;
use crate::handler::{Callbacks, ProcessFn, ShutdownReason};
use crate::port::{allocate_port, DEFAULT_PORT_RANGE};
use crate::server::{self, WorkerServerState};

pub const PLATFORM_URL_ENV: &str = "PLATFORM_BASE_URL";
pub const DEFAULT_PLATFORM_URL: &str = "http://localhost:8000";

/// Environment override > explicit argument > built-in default.
pub fn resolve_platform_url(env_value: Option<String>, argument: Option<&str>) -> String {
    env_value
        .filter(|v| !v.trim().is_empty())
        .or_else(|| argument.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_PLATFORM_URL.to_string())
}

/// Bounded readiness poll with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            attempts: 20,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl ReadinessPolicy {
    /// Delay before attempt `n + 1` (doubling, capped).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub name: String,
    pub kind: String,
    pub capabilities: Vec<String>,
    pub version: String,
    pub description: String,
    pub tags: Vec<String>,
    pub contact: String,
    /// Resolved once at construction
    pub platform_url: String,
    pub bind_host: String,
    pub advertise_host: String,
    pub port_range: RangeInclusive<u16>,
    pub readiness: ReadinessPolicy,
    pub registration_timeout: Duration,
    pub deregister_on_shutdown: bool,
    pub callbacks: Callbacks,
}

impl WorkerConfig {
    pub fn new(
        name: impl Into<String>,
        kind: impl Into<String>,
        capabilities: Vec<String>,
        platform_url: Option<&str>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            capabilities,
            version: mesh_gateway_core::protocol::default_version(),
            description: String::new(),
            tags: Vec::new(),
            contact: String::new(),
            platform_url: resolve_platform_url(std::env::var(PLATFORM_URL_ENV).ok(), platform_url),
            bind_host: "127.0.0.1".to_string(),
            advertise_host: "localhost".to_string(),
            port_range: DEFAULT_PORT_RANGE,
            readiness: ReadinessPolicy::default(),
            registration_timeout: DEFAULT_REQUEST_TIMEOUT,
            deregister_on_shutdown: false,
            callbacks: Callbacks::default(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = contact.into();
        self
    }

    pub fn with_port_range(mut self, range: RangeInclusive<u16>) -> Self {
        self.port_range = range;
        self
    }

    pub fn with_hosts(mut self, bind_host: impl Into<String>, advertise_host: impl Into<String>) -> Self {
        self.bind_host = bind_host.into();
        self.advertise_host = advertise_host.into();
        self
    }

    pub fn with_readiness(mut self, readiness: ReadinessPolicy) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn with_registration_timeout(mut self, timeout: Duration) -> Self {
        self.registration_timeout = timeout;
        self
    }

    pub fn with_callbacks(mut self, callbacks: Callbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn deregister_on_shutdown(mut self, enabled: bool) -> Self {
        self.deregister_on_shutdown = enabled;
        self
    }

    /// Fails fast before any port is taken or request sent.
    pub fn validate(&self) -> MeshResult<()> {
        const REQUIRED: [&str; 4] = ["agent_name", "agent_type", "capabilities", "process_function"];

        let mut missing = Vec::new();
        let mut provided = vec!["process_function".to_string()];
        for (field, present) in [
            ("agent_name", !self.name.trim().is_empty()),
            ("agent_type", !self.kind.trim().is_empty()),
            ("capabilities", !self.capabilities.is_empty()),
        ] {
            if present {
                provided.push(field.to_string());
            } else {
                missing.push(field.to_string());
            }
        }
        if !missing.is_empty() {
            return Err(MeshError::missing_fields(missing, &REQUIRED, provided));
        }

        AgentName::parse(&self.name)?;
        let blank: Vec<String> = self
            .capabilities
            .iter()
            .filter(|c| c.trim().is_empty())
            .cloned()
            .collect();
        if !blank.is_empty() {
            return Err(MeshError::capability(blank));
        }
        Ok(())
    }

    fn manifest(&self) -> AgentManifest {
        AgentManifest {
            name: self.name.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
            capabilities: self.capabilities.clone(),
            tags: self.tags.clone(),
            contact: self.contact.clone(),
            kind: Some(self.kind.clone()),
            status: None,
        }
    }
}

/// Stops a running [`WorkerProcess`] from another task.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// One worker: its listener, credential and configuration.
pub struct WorkerProcess {
    config: WorkerConfig,
    handler: ProcessFn,
    listener: TcpListener,
    port: u16,
    credential: String,
    shutdown: CancellationToken,
}

impl WorkerProcess {
    pub async fn bind(config: WorkerConfig, handler: ProcessFn) -> MeshResult<Self> {
        if let Err(e) = config.validate() {
            config.callbacks.error(&e);
            return Err(e);
        }

        let listener = match allocate_port(&config.bind_host, config.port_range.clone()).await {
            Ok(listener) => listener,
            Err(e) => {
                config.callbacks.error(&e);
                return Err(e);
            }
        };
        let port = listener
            .local_addr()
            .map_err(|e| MeshError::new(ErrorKind::NoFreePort, format!("Bound listener has no address: {}", e)))?
            .port();

        Ok(Self {
            config,
            handler,
            listener,
            port,
            credential: generate_credential(),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.config.advertise_host, self.port)
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            token: self.shutdown.clone(),
        }
    }

    fn registration(&self) -> RegistrationRequest {
        RegistrationRequest {
            agent_name: self.config.name.clone(),
            agent_type: self.config.kind.clone(),
            capabilities: self.config.capabilities.clone(),
            acp_base_url: self.endpoint(),
            auth_token: self.credential.clone(),
            version: Some(self.config.version.clone()),
            description: Some(self.config.description.clone()),
            tags: self.config.tags.clone(),
            contact: Some(self.config.contact.clone()),
        }
    }

    /// Serve, register, then block until shutdown.
    pub async fn run(self) -> MeshResult<()> {
        let callbacks = self.config.callbacks.clone();
        let platform = PlatformClient::new(self.config.platform_url.clone())
            .with_timeout(self.config.registration_timeout);
        let registration = self.registration();
        let endpoint = self.endpoint();
        let name = self.config.name.clone();

        let state = WorkerServerState::new(
            self.config.manifest(),
            self.credential.clone(),
            self.handler.clone(),
            callbacks.clone(),
        );
        let server_token = self.shutdown.child_token();
        let mut server = tokio::spawn(server::serve(
            self.listener,
            server::router(state),
            server_token.clone(),
        ));

        let local_url = format!("http://{}:{}", local_probe_host(&self.config.bind_host), self.port);
        let readiness = self.config.readiness;
        let startup_platform = platform.clone();
        let startup = tokio::spawn(async move {
            wait_until_ready(&local_url, readiness).await?;
            startup_platform.register(&registration).await
        });

        let registered = match startup.await {
            Ok(result) => result,
            Err(e) => Err(MeshError::new(
                ErrorKind::ServerStartTimeout,
                format!("Startup task failed: {}", e),
            )),
        };
        let response = match registered {
            Ok(response) => response,
            Err(e) => {
                error!(agent_name = %name, error = %e, "Worker startup failed");
                callbacks.error(&e);
                server_token.cancel();
                if let Err(join) = server.await {
                    warn!(agent_name = %name, error = %join, "Protocol server task ended abnormally");
                }
                return Err(e);
            }
        };
        callbacks.registered(&response);
        info!(
            agent_name = %name,
            endpoint = %endpoint,
            platform_url = %platform.base_url(),
            "Worker started and registered"
        );

        let reason = tokio::select! {
            _ = self.shutdown.cancelled() => ShutdownReason::ProgrammaticRequest,
            _ = shutdown_signal() => ShutdownReason::UserRequest,
            result = &mut server => {
                let cause = match result {
                    Ok(Ok(())) => "server stopped".to_string(),
                    Ok(Err(e)) => e.to_string(),
                    Err(e) => e.to_string(),
                };
                let e = MeshError::new(ErrorKind::WorkerHandlerFailed, format!("Protocol server exited: {}", cause));
                callbacks.error(&e);
                return Err(e);
            }
        };

        info!(agent_name = %name, reason = %reason, "Worker shutting down");
        server_token.cancel();
        if let Err(e) = server.await {
            warn!(agent_name = %name, error = %e, "Protocol server task ended abnormally");
        }
        callbacks.shutdown(reason);

        if self.config.deregister_on_shutdown {
            if let Err(e) = platform.deregister(&name).await {
                warn!(agent_name = %name, error = %e, "Deregistration failed");
                callbacks.error(&e);
            }
        }
        Ok(())
    }
}

/// `bind` followed by `run`.
pub async fn start(config: WorkerConfig, handler: ProcessFn) -> MeshResult<()> {
    WorkerProcess::bind(config, handler).await?.run().await
}

fn local_probe_host(bind_host: &str) -> &str {
    match bind_host {
        "0.0.0.0" => "127.0.0.1",
        "::" => "[::1]",
        other => other,
    }
}

async fn wait_until_ready(base_url: &str, policy: ReadinessPolicy) -> MeshResult<()> {
    let client = reqwest::Client::new();
    let url = format!("{}/ping", base_url);
    for attempt in 0..policy.attempts {
        // Any HTTP answer means the server is up; a 503 only reflects the health hook
        match client.get(&url).timeout(policy.max_delay).send().await {
            Ok(response) => {
                debug!(attempt, status = %response.status(), "Protocol server ready");
                return Ok(());
            }
            Err(e) => debug!(attempt, error = %e, "Protocol server not ready"),
        }
        if attempt + 1 < policy.attempts {
            tokio::time::sleep(policy.delay(attempt)).await;
        }
    }
    Err(MeshError::new(
        ErrorKind::ServerStartTimeout,
        format!("Protocol server at {} did not answer after {} attempts", base_url, policy.attempts),
    )
    .with_details(json!({ "endpoint": base_url, "attempts": policy.attempts })))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_url_precedence() {
        assert_eq!(
            resolve_platform_url(Some("http://env:1".into()), Some("http://arg:2")),
            "http://env:1"
        );
        assert_eq!(resolve_platform_url(None, Some("http://arg:2")), "http://arg:2");
        assert_eq!(resolve_platform_url(Some(String::new()), None), DEFAULT_PLATFORM_URL);
        assert_eq!(resolve_platform_url(None, None), DEFAULT_PLATFORM_URL);
    }

    #[test]
    fn readiness_backoff_doubles_and_caps() {
        let policy = ReadinessPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_millis(50));
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(4), Duration::from_millis(800));
        assert_eq!(policy.delay(5), Duration::from_secs(1));
        assert_eq!(policy.delay(40), Duration::from_secs(1));
    }

    fn closed_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{}", port)
    }

    #[tokio::test]
    async fn readiness_gives_up_without_a_trailing_delay() {
        let policy = ReadinessPolicy {
            attempts: 1,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(5),
        };
        let started = std::time::Instant::now();
        let err = wait_until_ready(&closed_url(), policy).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ServerStartTimeout);
        assert_eq!(err.details["attempts"], 1);
        assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
    }

    #[tokio::test]
    async fn unhealthy_answer_still_counts_as_ready() {
        let app = axum::Router::new().route(
            "/ping",
            axum::routing::get(|| async { axum::http::StatusCode::SERVICE_UNAVAILABLE }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        wait_until_ready(&url, ReadinessPolicy::default()).await.unwrap();
    }

    #[test]
    fn validation_reports_missing_fields_first() {
        let config = WorkerConfig::new("", "custom", vec![], Some("http://x"));
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingRequiredFields);
        let missing = err.details["missing_fields"].as_array().unwrap();
        assert_eq!(missing.len(), 2);

        let config = WorkerConfig::new("bad name!", "custom", vec!["text".into()], None);
        assert_eq!(config.validate().unwrap_err().kind, ErrorKind::ManifestError);

        let config = WorkerConfig::new("echo", "custom", vec![" ".into()], None);
        assert_eq!(config.validate().unwrap_err().kind, ErrorKind::CapabilityError);
    }
}
