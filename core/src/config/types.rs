use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub check: CheckConfig,

    #[serde(default)]
    pub rotation: RotationConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub config_store: ConfigStoreConfig,
}

/// Run-coordinator knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    #[serde(default = "default_spoof_attempt_max")]
    pub spoof_attempt_max: u32,

    #[serde(default = "default_stabilization_ms")]
    pub stabilization_ms: u64,

    /// Well-known config the tunnel reverts to when a shopping session ends
    /// and no user baseline is selected.
    #[serde(default = "default_baseline_config")]
    pub default_baseline_config: String,

    #[serde(default = "default_url_resolve_timeout_ms")]
    pub url_resolve_timeout_ms: u64,
}

fn default_spoof_attempt_max() -> u32 {
    2
}

fn default_stabilization_ms() -> u64 {
    2_000
}

fn default_baseline_config() -> String {
    "baseline_saltlake_ut-US-UT-137.conf".to_string()
}

fn default_url_resolve_timeout_ms() -> u64 {
    5_000
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            spoof_attempt_max: default_spoof_attempt_max(),
            stabilization_ms: default_stabilization_ms(),
            default_baseline_config: default_baseline_config(),
            url_resolve_timeout_ms: default_url_resolve_timeout_ms(),
        }
    }
}

/// Rotation ring + health knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationConfig {
    #[serde(default)]
    pub bundled_configs: Vec<String>,

    #[serde(default)]
    pub blocked_configs: Vec<String>,

    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    #[serde(default = "default_priority_provider")]
    pub priority_provider: Option<String>,
}

fn default_failure_threshold() -> u32 {
    2
}

fn default_cooldown_ms() -> u64 {
    10 * 60 * 1000
}

fn default_priority_provider() -> Option<String> {
    Some("proton".to_string())
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            bundled_configs: Vec::new(),
            blocked_configs: Vec::new(),
            failure_threshold: default_failure_threshold(),
            cooldown_ms: default_cooldown_ms(),
            priority_provider: default_priority_provider(),
        }
    }
}

/// Durable-write retry knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_persist_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_persist_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_persist_jitter_max_ms")]
    pub jitter_max_ms: u64,
}

fn default_persist_max_attempts() -> u32 {
    3
}

fn default_persist_backoff_base_ms() -> u64 {
    300
}

fn default_persist_jitter_max_ms() -> u64 {
    250
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_persist_max_attempts(),
            backoff_base_ms: default_persist_backoff_base_ms(),
            jitter_max_ms: default_persist_jitter_max_ms(),
        }
    }
}

/// Telemetry backend endpoint (plugins consume this).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_summary_table")]
    pub summary_table: String,

    #[serde(default = "default_attempts_table")]
    pub attempts_table: String,

    #[serde(default = "default_telemetry_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_summary_table() -> String {
    "price_checks".to_string()
}

fn default_attempts_table() -> String {
    "price_check_attempts".to_string()
}

fn default_telemetry_timeout_ms() -> u64 {
    10_000
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            summary_table: default_summary_table(),
            attempts_table: default_attempts_table(),
            timeout_ms: default_telemetry_timeout_ms(),
        }
    }
}

/// Where the file-backed config store keeps its data. `None` = platform
/// data dir.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigStoreConfig {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}
