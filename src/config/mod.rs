use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub operations: OperationsConfig,
    pub rollback: RollbackConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationsConfig {
    /// Default batch size when a create request does not supply one
    pub default_batch_size: usize,
    /// Hard cap on entity ids per bulk operation
    pub max_entity_ids: usize,
    /// Log a progress line every N processed entities
    pub log_progress_every: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackConfig {
    /// Startup seed for the coordinator's auto-rollback toggle
    pub auto_rollback: bool,
    /// Startup seed for how many recent versions stay eligible as targets
    pub version_retention: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub enable_cors: bool,
    pub enable_request_logging: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Operations overrides
        if let Ok(v) = env::var("OPS_DEFAULT_BATCH_SIZE") {
            self.operations.default_batch_size =
                v.parse().unwrap_or(self.operations.default_batch_size);
        }
        if let Ok(v) = env::var("OPS_MAX_ENTITY_IDS") {
            self.operations.max_entity_ids = v.parse().unwrap_or(self.operations.max_entity_ids);
        }
        if let Ok(v) = env::var("OPS_LOG_PROGRESS_EVERY") {
            self.operations.log_progress_every =
                v.parse().unwrap_or(self.operations.log_progress_every);
        }

        // Rollback overrides
        if let Ok(v) = env::var("ROLLBACK_AUTO") {
            self.rollback.auto_rollback = v.parse().unwrap_or(self.rollback.auto_rollback);
        }
        if let Ok(v) = env::var("ROLLBACK_VERSION_RETENTION") {
            self.rollback.version_retention =
                v.parse().unwrap_or(self.rollback.version_retention);
        }

        // API overrides
        if let Ok(v) = env::var("API_ENABLE_CORS") {
            self.api.enable_cors = v.parse().unwrap_or(self.api.enable_cors);
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging =
                v.parse().unwrap_or(self.api.enable_request_logging);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            operations: OperationsConfig {
                default_batch_size: 10,
                max_entity_ids: 10_000,
                log_progress_every: 50,
            },
            rollback: RollbackConfig {
                auto_rollback: true,
                version_retention: 10,
            },
            api: ApiConfig {
                enable_cors: true,
                enable_request_logging: true,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            ..Self::development()
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            operations: OperationsConfig {
                default_batch_size: 50,
                max_entity_ids: 50_000,
                log_progress_every: 500,
            },
            rollback: RollbackConfig {
                auto_rollback: true,
                version_retention: 25,
            },
            api: ApiConfig {
                enable_cors: false,
                enable_request_logging: true,
            },
        }
    }
}

static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

/// Process-wide configuration, loaded once from the environment.
/// The runtime-mutable rollback policy lives in the coordinator and is
/// seeded from this at startup.
pub fn config() -> &'static AppConfig {
    &CONFIG
}
