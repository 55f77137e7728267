/// Configuration management for the EcoNeT portal
use crate::error::{PortalError, PortalResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main portal configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub session: SessionPolicyConfig,
    pub access: AccessConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub db_path: PathBuf,
}

/// Timing knobs for the session lifecycle core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPolicyConfig {
    /// Seconds of network access earned per bottle
    pub seconds_per_bottle: i64,
    /// Age after which an awaiting_insertion session is reclaimed
    pub stale_session_age_seconds: i64,
    /// Idle time after which an inserting session loses the slot
    pub inserting_lock_timeout_seconds: i64,
    /// Interval between expiry sweeps
    pub sweep_interval_seconds: u64,
}

/// Access enforcement configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Manage iptables FORWARD rules instead of the in-memory backend
    pub use_iptables: bool,
    /// Log iptables commands without running them
    pub dry_run: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl PortalConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> PortalResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("PORTAL_HOSTNAME").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORTAL_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| PortalError::Validation("Invalid port number".to_string()))?;

        let data_directory: PathBuf = env::var("PORTAL_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let db_path = env::var("PORTAL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("portal.sqlite"));

        let session = SessionPolicyConfig {
            seconds_per_bottle: parse_env_i64("PORTAL_SECONDS_PER_BOTTLE", 120),
            stale_session_age_seconds: parse_env_i64("PORTAL_STALE_SESSION_AGE", 600),
            inserting_lock_timeout_seconds: parse_env_i64("PORTAL_INSERTING_LOCK_TIMEOUT", 180),
            sweep_interval_seconds: env::var("PORTAL_SWEEP_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
        };

        let access = AccessConfig {
            use_iptables: parse_env_bool("PORTAL_USE_IPTABLES", false),
            dry_run: parse_env_bool("PORTAL_DRY_RUN", true),
        };

        let level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(PortalConfig {
            service: ServiceConfig {
                hostname,
                port,
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            storage: StorageConfig {
                data_directory,
                db_path,
            },
            session,
            access,
            logging: LoggingConfig { level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> PortalResult<()> {
        if self.service.hostname.is_empty() {
            return Err(PortalError::Validation(
                "Hostname cannot be empty".to_string(),
            ));
        }

        if self.session.seconds_per_bottle < 1 {
            return Err(PortalError::Validation(
                "seconds_per_bottle must be at least 1".to_string(),
            ));
        }

        if self.session.sweep_interval_seconds == 0 {
            return Err(PortalError::Validation(
                "sweep_interval_seconds must be at least 1".to_string(),
            ));
        }

        if self.session.stale_session_age_seconds < 1
            || self.session.inserting_lock_timeout_seconds < 1
        {
            return Err(PortalError::Validation(
                "staleness thresholds must be at least 1 second".to_string(),
            ));
        }

        Ok(())
    }

    /// Default configuration for tests: in-memory access backend, standard
    /// credit rate and staleness thresholds.
    pub fn for_tests() -> Self {
        PortalConfig {
            service: ServiceConfig {
                hostname: "127.0.0.1".to_string(),
                port: 0,
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            storage: StorageConfig {
                data_directory: PathBuf::from("./data"),
                db_path: PathBuf::from(":memory:"),
            },
            session: SessionPolicyConfig {
                seconds_per_bottle: 120,
                stale_session_age_seconds: 600,
                inserting_lock_timeout_seconds: 180,
                sweep_interval_seconds: 60,
            },
            access: AccessConfig {
                use_iptables: false,
                dry_run: true,
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
            },
        }
    }
}

fn parse_env_i64(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
