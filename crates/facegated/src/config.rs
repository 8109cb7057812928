use facegate_core::PolicyConfig;
use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// The single identity that verification can accept.
    pub target_identity: String,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Whether to create the pre-joined view when migrating the database.
    pub create_prejoined_view: bool,
    /// Listen address for the HTTP API.
    pub http_addr: String,
    /// Whether to serve the D-Bus interface on the session bus.
    pub dbus_enabled: bool,
    /// Acceptance thresholds.
    pub policy: PolicyConfig,
}

impl Config {
    /// Load configuration from `FACEGATE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facegate");

        let db_path = std::env::var("FACEGATE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("identities.db"));

        let defaults = PolicyConfig::default();

        Self {
            target_identity: std::env::var("FACEGATE_TARGET_IDENTITY")
                .unwrap_or_else(|_| "Vishmish".to_string()),
            db_path,
            create_prejoined_view: env_flag("FACEGATE_DB_PREJOINED_VIEW", true),
            http_addr: std::env::var("FACEGATE_HTTP_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            dbus_enabled: env_flag("FACEGATE_DBUS_ENABLED", true),
            policy: PolicyConfig {
                min_references: env_usize("FACEGATE_MIN_REFERENCES", defaults.min_references),
                match_threshold: env_f64("FACEGATE_MATCH_THRESHOLD", defaults.match_threshold),
                best_min_multi: env_f64("FACEGATE_BEST_MIN_MULTI", defaults.best_min_multi),
                best_min_single: env_f64("FACEGATE_BEST_MIN_SINGLE", defaults.best_min_single),
            },
        }
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key).map(|v| v != "0").unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
