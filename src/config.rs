use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::models::RoleType;

/// Application-level constants
pub const APP_NAME: &str = "CareCircle";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A provider whose current/maximum patient ratio is strictly above this
/// value is reported as overloaded.
pub const OVERLOAD_THRESHOLD: f64 = 0.9;

/// Capacity assumed for a provider with no identity on record.
pub const DEFAULT_MAX_PATIENTS: u32 = 20;

/// Number of entries in the report's recent-assignment feed.
pub const RECENT_ASSIGNMENTS_LIMIT: usize = 10;

/// Alternatives returned next to the recommended provider.
pub const ALTERNATIVE_PROVIDER_COUNT: usize = 3;

/// Outbox entries that failed this many times are reported as dead letters.
pub const MAX_DELIVERY_ATTEMPTS: u32 = 5;

/// Get the application data directory
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default location of the SQLite store
pub fn database_path() -> PathBuf {
    app_data_dir().join("carecircle.db")
}

/// Log filter used when `RUST_LOG` is unset
pub fn default_log_filter() -> &'static str {
    "carecircle=info"
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid config {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// Tunables for the coordination services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    pub overload_threshold: f64,
    pub default_max_patients: u32,
    pub recent_assignments_limit: usize,
    pub alternative_provider_count: usize,
    pub max_delivery_attempts: u32,
    /// Roles that start `pending` and need approval when granted.
    pub provider_roles: Vec<RoleType>,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            overload_threshold: OVERLOAD_THRESHOLD,
            default_max_patients: DEFAULT_MAX_PATIENTS,
            recent_assignments_limit: RECENT_ASSIGNMENTS_LIMIT,
            alternative_provider_count: ALTERNATIVE_PROVIDER_COUNT,
            max_delivery_attempts: MAX_DELIVERY_ATTEMPTS,
            provider_roles: vec![
                RoleType::Doctor,
                RoleType::Nutritionist,
                RoleType::Yoga,
                RoleType::Therapist,
                RoleType::Admin,
            ],
        }
    }
}

impl CoordinationConfig {
    /// Load overrides from a JSON file; missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn needs_approval(&self, role: RoleType) -> bool {
        role != RoleType::Patient && self.provider_roles.contains(&role)
    }
}
