//! Process-level configuration, loaded from the environment at startup
//! (spec §4.1, §9 "Global state").
//!
//! `session_secret` must not be a default value outside development or
//! test; the process fails fast at startup otherwise, per spec §4.1
//! "Session ensure".

use std::collections::HashSet;
use std::net::SocketAddr;

const DEV_DEFAULT_SECRET: &str = "dev-only-insecure-secret-do-not-use-in-production";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub session_secret: Vec<u8>,
    pub session_ttl_sec: u64,
    pub allowed_origins: HashSet<String>,
    pub admin_token: Option<String>,
    pub max_active_runs_per_owner: usize,
    pub max_active_runs: usize,
    pub allow_dev_secret: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("SIMULATOR_SESSION_SECRET must be set to a non-default value outside development/test (set SIMULATOR_ALLOW_DEV_SECRET=1 to override locally)")]
    DefaultSecretInProduction,
    #[error("invalid bind address: {0}")]
    InvalidBindAddr(String),
}

impl AppConfig {
    /// Load from environment variables, applying the teacher's
    /// env-first configuration convention (spec SPEC_FULL §1
    /// "Configuration").
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr = std::env::var("SIMULATOR_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let bind_addr = bind_addr.parse().map_err(|_| ConfigError::InvalidBindAddr(bind_addr.clone()))?;

        let allow_dev_secret = std::env::var("SIMULATOR_ALLOW_DEV_SECRET")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let session_secret = std::env::var("SIMULATOR_SESSION_SECRET").unwrap_or_else(|_| DEV_DEFAULT_SECRET.to_string());
        if session_secret == DEV_DEFAULT_SECRET && !allow_dev_secret {
            return Err(ConfigError::DefaultSecretInProduction);
        }

        let allowed_origins: HashSet<String> = std::env::var("SIMULATOR_ALLOWED_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let admin_token = std::env::var("SIMULATOR_ADMIN_TOKEN").ok().filter(|s| !s.is_empty());

        let max_active_runs_per_owner = std::env::var("SIMULATOR_MAX_ACTIVE_RUNS_PER_OWNER")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);
        let max_active_runs = std::env::var("SIMULATOR_MAX_ACTIVE_RUNS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(100);
        let session_ttl_sec = std::env::var("SIMULATOR_SESSION_TTL_SEC")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3600);

        Ok(Self {
            bind_addr,
            session_secret: session_secret.into_bytes(),
            session_ttl_sec,
            allowed_origins,
            admin_token,
            max_active_runs_per_owner,
            max_active_runs,
            allow_dev_secret,
        })
    }
}
