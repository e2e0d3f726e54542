//! Configuration types.

use std::time::Duration;

use crate::error::ConfigError;

/// Default window in which a repeated sync to the same `(step, path)` is dropped.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Default idle time after which a session is evicted from memory.
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 1800;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Repeated syncs to the same `(step, path)` inside this window are suppressed.
    pub debounce_window: Duration,
    /// Session idle timeout (sessions are pruned after this duration).
    pub session_idle_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            session_idle_timeout: Duration::from_secs(DEFAULT_SESSION_IDLE_SECS), // 30 minutes
        }
    }
}

impl EngineConfig {
    /// Build from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let debounce_ms: u64 = std::env::var("ONBOARDING_DEBOUNCE_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_DEBOUNCE_MS);
        let idle_secs: u64 = std::env::var("ONBOARDING_SESSION_IDLE_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SESSION_IDLE_SECS);

        Self {
            debounce_window: Duration::from_millis(debounce_ms),
            session_idle_timeout: Duration::from_secs(idle_secs),
        }
    }
}

/// HTTP server configuration for the binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            db_path: "./data/onboarding.db".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let port: u16 = std::env::var("ONBOARDING_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8080);

        let db_path = std::env::var("ONBOARDING_DB_PATH")
            .unwrap_or_else(|_| "./data/onboarding.db".to_string());

        Self { port, db_path }
    }

    /// Reject values the server cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ONBOARDING_PORT".to_string(),
                message: "port must be non-zero".to_string(),
            });
        }
        if self.db_path.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "ONBOARDING_DB_PATH".to_string(),
                message: "path must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
