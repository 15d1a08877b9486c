// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Worker-facing handler types: the process function, its input and output
//! shapes, and the optional lifecycle callbacks.

use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

use mesh_gateway_core::error::MeshError;
use mesh_gateway_core::protocol::{AgentRunRequest, Message};

/// What the process function sees for one routed run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunInput {
    pub run_id: String,
    pub messages: Vec<Message>,
    pub session_id: Option<String>,
    pub session_context: Option<Value>,
}

impl RunInput {
    /// Concatenated text of every input message.
    pub fn text(&self) -> String {
        self.messages.iter().map(Message::content).collect::<Vec<_>>().join("\n")
    }
}

impl From<AgentRunRequest> for RunInput {
    fn from(req: AgentRunRequest) -> Self {
        Self {
            run_id: req.run_id,
            messages: req.input,
            session_id: req.session_id,
            session_context: req.session_context,
        }
    }
}

/// Process function result. Strings become a single agent message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOutput {
    pub messages: Vec<Message>,
    /// Merged into the session context by the gateway
    pub session_context: Option<Value>,
}

impl RunOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::agent_text(content)],
            session_context: None,
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.session_context = Some(context);
        self
    }
}

impl From<String> for RunOutput {
    fn from(content: String) -> Self {
        Self::text(content)
    }
}

impl From<&str> for RunOutput {
    fn from(content: &str) -> Self {
        Self::text(content)
    }
}

impl From<Vec<Message>> for RunOutput {
    fn from(messages: Vec<Message>) -> Self {
        Self {
            messages,
            session_context: None,
        }
    }
}

pub type ProcessFn = Arc<dyn Fn(RunInput) -> anyhow::Result<RunOutput> + Send + Sync>;

/// Wrap a closure as a [`ProcessFn`].
pub fn process_fn<F, O>(f: F) -> ProcessFn
where
    F: Fn(RunInput) -> anyhow::Result<O> + Send + Sync + 'static,
    O: Into<RunOutput>,
{
    Arc::new(move |input: RunInput| f(input).map(Into::into))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Shutdown handle triggered
    ProgrammaticRequest,
    /// Ctrl+C / SIGTERM
    UserRequest,
}

impl ShutdownReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProgrammaticRequest => "programmatic_request",
            Self::UserRequest => "user_request",
        }
    }
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

type RegisterHook = Arc<dyn Fn(&Value) + Send + Sync>;
type MessageHook = Arc<dyn Fn(&RunInput) -> anyhow::Result<()> + Send + Sync>;
type ErrorHook = Arc<dyn Fn(&MeshError) + Send + Sync>;
type ShutdownHook = Arc<dyn Fn(ShutdownReason) + Send + Sync>;
type HealthHook = Arc<dyn Fn() -> String + Send + Sync>;

/// Optional lifecycle hooks, each invoked synchronously at a fixed point.
///
/// | Hook | Fired |
/// |------|-------|
/// | `on_register` | after the gateway accepted the registration, with its response body |
/// | `on_message` | before the process function, for every routed run |
/// | `on_error` | on startup, handler and deregistration failures |
/// | `on_shutdown` | once, when the accept loop stops |
/// | `on_health_check` | on `GET /ping`; its value is the reported status |
#[derive(Clone, Default)]
pub struct Callbacks {
    on_register: Option<RegisterHook>,
    on_message: Option<MessageHook>,
    on_error: Option<ErrorHook>,
    on_shutdown: Option<ShutdownHook>,
    on_health_check: Option<HealthHook>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_register(mut self, f: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.on_register = Some(Arc::new(f));
        self
    }

    pub fn on_message(mut self, f: impl Fn(&RunInput) -> anyhow::Result<()> + Send + Sync + 'static) -> Self {
        self.on_message = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&MeshError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn on_shutdown(mut self, f: impl Fn(ShutdownReason) + Send + Sync + 'static) -> Self {
        self.on_shutdown = Some(Arc::new(f));
        self
    }

    pub fn on_health_check(mut self, f: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.on_health_check = Some(Arc::new(f));
        self
    }

    pub(crate) fn registered(&self, response: &Value) {
        if let Some(hook) = &self.on_register {
            guarded("on_register", || hook(response));
        }
    }

    /// Runs inside the handler task; panics there fail the run.
    pub(crate) fn message(&self, input: &RunInput) -> anyhow::Result<()> {
        match &self.on_message {
            Some(hook) => hook(input),
            None => Ok(()),
        }
    }

    pub(crate) fn error(&self, error: &MeshError) {
        if let Some(hook) = &self.on_error {
            guarded("on_error", || hook(error));
        }
    }

    pub(crate) fn shutdown(&self, reason: ShutdownReason) {
        if let Some(hook) = &self.on_shutdown {
            guarded("on_shutdown", || hook(reason));
        }
    }

    pub(crate) fn health_status(&self) -> String {
        match &self.on_health_check {
            Some(hook) => guarded("on_health_check", || hook()).unwrap_or_else(|| "unhealthy".to_string()),
            None => "ok".to_string(),
        }
    }
}

/// A panicking hook is logged and otherwise ignored.
fn guarded<T>(hook: &str, f: impl FnOnce() -> T) -> Option<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(hook, "Worker callback panicked");
            None
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_register", &self.on_register.is_some())
            .field("on_message", &self.on_message.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_shutdown", &self.on_shutdown.is_some())
            .field("on_health_check", &self.on_health_check.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn string_results_become_agent_messages() {
        let handler = process_fn(|input: RunInput| Ok(format!("Processed: {}", input.text())));
        let output = handler(RunInput {
            run_id: "r".into(),
            messages: vec![Message::text("hi")],
            session_id: None,
            session_context: None,
        })
        .unwrap();
        assert_eq!(output.messages, vec![Message::agent_text("Processed: hi")]);
    }

    #[test]
    fn unset_hooks_are_no_ops() {
        let callbacks = Callbacks::new();
        assert_eq!(callbacks.health_status(), "ok");
        callbacks.registered(&Value::Null);
        callbacks.shutdown(ShutdownReason::UserRequest);
    }

    #[test]
    fn hooks_fire_when_set() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let callbacks = Callbacks::new()
            .on_shutdown(move |reason| {
                assert_eq!(reason.as_str(), "programmatic_request");
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .on_health_check(|| "degraded".to_string());

        callbacks.shutdown(ShutdownReason::ProgrammaticRequest);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(callbacks.health_status(), "degraded");
    }

    #[test]
    fn panicking_hooks_are_contained() {
        let callbacks = Callbacks::new()
            .on_error(|_| panic!("hook bug"))
            .on_health_check(|| panic!("hook bug"));

        callbacks.error(&MeshError::new(
            mesh_gateway_core::error::ErrorKind::WorkerHandlerFailed,
            "boom",
        ));
        assert_eq!(callbacks.health_status(), "unhealthy");
    }
}
