// Copyright (c) 2026 Agent Mesh Contributors
// SPDX-License-Identifier: AGPL-3.0

// Gateway Configuration
//
// YAML document with every field defaulted, so an empty file (or no file at
// all) yields a working gateway:
//
//   network:  { bind_address: 0.0.0.0, port: 8000 }
//   timeouts: { verification_ms: 5000, run_ms: 30000, cancel_signal_ms: 2000 }
//   sessions: { inactivity_secs: 86400, sweep_interval_secs: 60 }
//   health:   { enabled: true, interval_secs: 3, max_failures: 3 }

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub sessions: SessionConfig,

    #[serde(default)]
    pub health: HealthConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network bind address (e.g. "0.0.0.0" or "127.0.0.1")
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP API port
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Bound on the post-registration liveness check
    #[serde(default = "default_verification_ms")]
    pub verification_ms: u64,

    /// Bound on one agent invocation
    #[serde(default = "default_run_ms")]
    pub run_ms: u64,

    /// Bound on the best-effort cancel notification sent to an agent
    #[serde(default = "default_cancel_signal_ms")]
    pub cancel_signal_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_inactivity_secs")]
    pub inactivity_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_health_interval_secs")]
    pub interval_secs: u64,

    /// Consecutive failed pings before an agent is marked inactive
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
}

fn default_true() -> bool {
    true
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_verification_ms() -> u64 {
    5_000
}

fn default_run_ms() -> u64 {
    30_000
}

fn default_cancel_signal_ms() -> u64 {
    2_000
}

fn default_inactivity_secs() -> u64 {
    24 * 60 * 60
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_health_interval_secs() -> u64 {
    3
}

fn default_max_failures() -> u32 {
    3
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            verification_ms: default_verification_ms(),
            run_ms: default_run_ms(),
            cancel_signal_ms: default_cancel_signal_ms(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_secs: default_inactivity_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_health_interval_secs(),
            max_failures: default_max_failures(),
        }
    }
}

impl TimeoutConfig {
    pub fn verification(&self) -> Duration {
        Duration::from_millis(self.verification_ms)
    }

    pub fn run(&self) -> Duration {
        Duration::from_millis(self.run_ms)
    }

    pub fn cancel_signal(&self) -> Duration {
        Duration::from_millis(self.cancel_signal_ms)
    }
}

impl SessionConfig {
    pub fn inactivity(&self) -> Duration {
        Duration::from_secs(self.inactivity_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl GatewayConfig {
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        // An empty document parses as null, which serde_yaml rejects for a struct
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Load from an explicit path (failing if it is missing or invalid), or
    /// fall back to defaults. The result is always validated.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match path {
            Some(path) => {
                tracing::info!("Loading configuration from {:?}", path);
                Self::from_yaml_file(path).map_err(|e| {
                    anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
                })?
            }
            None => {
                tracing::info!("No configuration file given, using defaults");
                Self::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.network.bind_address.trim().is_empty() {
            anyhow::bail!("network.bind_address cannot be empty");
        }

        for (field, value) in [
            ("timeouts.verification_ms", self.timeouts.verification_ms),
            ("timeouts.run_ms", self.timeouts.run_ms),
            ("timeouts.cancel_signal_ms", self.timeouts.cancel_signal_ms),
            ("sessions.inactivity_secs", self.sessions.inactivity_secs),
            ("sessions.sweep_interval_secs", self.sessions.sweep_interval_secs),
            ("health.interval_secs", self.health.interval_secs),
        ] {
            if value == 0 {
                anyhow::bail!("{} must be greater than zero", field);
            }
        }

        if self.health.enabled && self.health.max_failures == 0 {
            anyhow::bail!("health.max_failures must be at least 1 when health checks are enabled");
        }

        Ok(())
    }
}
