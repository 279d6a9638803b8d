use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable submission payload for one price check.
#[derive(Clone, Debug, PartialEq)]
pub struct CheckRequest {
    pub raw_url: String,
    pub dirty_baseline_cents: Option<i64>,
    pub submitted_at: DateTime<Utc>,
}

impl CheckRequest {
    pub fn new(raw_url: impl Into<String>) -> Self {
        Self {
            raw_url: raw_url.into(),
            dirty_baseline_cents: None,
            submitted_at: Utc::now(),
        }
    }

    /// Parse a user-entered "price I saw earlier" field. Non-digits are
    /// stripped before parsing; a blank field means no declared price.
    pub fn with_dirty_baseline_text(mut self, raw: &str) -> Self {
        self.dirty_baseline_cents = parse_dirty_baseline_cents(raw);
        self
    }

    pub fn with_dirty_baseline_cents(mut self, cents: i64) -> Self {
        self.dirty_baseline_cents = Some(cents);
        self
    }
}

pub fn sanitize_digits(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

pub fn parse_dirty_baseline_cents(raw: &str) -> Option<i64> {
    let normalized = sanitize_digits(raw);
    if normalized.is_empty() {
        return None;
    }
    normalized.parse::<i64>().ok()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptPhase {
    Baseline,
    Spoof,
}

impl fmt::Display for AttemptPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptPhase::Baseline => write!(f, "baseline"),
            AttemptPhase::Spoof => write!(f, "spoof"),
        }
    }
}

/// One row of the append-only attempt audit trail. Never mutated after it
/// is pushed onto a run; column names match the telemetry schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub phase: AttemptPhase,
    pub attempt_index: u32,
    pub vpn_config: Option<String>,
    pub success: bool,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub extracted_price_cents: Option<i64>,
    pub detected_tactics: Option<Vec<String>>,
    pub debug_extraction_path: Option<String>,
    pub latency_ms: u64,
}

/// Terminal outcome tag persisted on the summary row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    Success,
    DegradedBaselineFailed,
    StrategyFailed,
    SpoofFailed,
    VpnPermissionDenied,
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            CheckOutcome::Success => "success",
            CheckOutcome::DegradedBaselineFailed => "degraded_baseline_failed",
            CheckOutcome::StrategyFailed => "strategy_failed",
            CheckOutcome::SpoofFailed => "spoof_failed",
            CheckOutcome::VpnPermissionDenied => "vpn_permission_denied",
        };
        write!(f, "{tag}")
    }
}

/// Persisted summary row for one run. Optional columns are the newer part
/// of the schema; `to_legacy_payload` drops them for deployments whose
/// schema is behind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub product_url: String,
    pub domain: String,
    pub baseline_price_cents: i64,
    pub found_price_cents: i64,
    pub strategy_id: Option<String>,
    pub strategy_name: Option<String>,
    pub extraction_successful: bool,
    pub attempted_configs: Option<Vec<String>>,
    pub final_config: Option<String>,
    pub retry_count: u32,
    pub outcome: Option<CheckOutcome>,
    pub degraded: Option<bool>,
    pub baseline_success: Option<bool>,
    pub spoof_success: Option<bool>,
    pub dirty_baseline_price_cents: Option<i64>,
    pub raw_extraction_data: serde_json::Value,
    pub created_at: Option<String>,
}

impl RunSummary {
    /// Reduced payload used when the summary insert is rejected for schema
    /// reasons: strategy/attempt/outcome columns nulled, core columns kept.
    pub fn to_legacy_payload(&self) -> RunSummary {
        RunSummary {
            strategy_name: None,
            attempted_configs: None,
            final_config: None,
            retry_count: 0,
            outcome: None,
            degraded: None,
            baseline_success: None,
            spoof_success: None,
            dirty_baseline_price_cents: None,
            ..self.clone()
        }
    }
}
