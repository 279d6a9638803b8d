use std::collections::HashSet;

use crate::extract::ExtractionOutput;
use crate::strategy::StrategyPlan;
use crate::tunnel::PermissionToken;
use crate::types::{AttemptRecord, CheckOutcome};

/// Presentation view of a finished check, computed once per terminal
/// success.
#[derive(Clone, Debug, PartialEq)]
pub struct SummaryData {
    pub baseline_price: String,
    pub spoofed_price: String,
    pub dirty_baseline_price: Option<String>,
    pub potential_savings: Option<String>,
    pub is_victory: bool,
    pub tactics: Vec<String>,
    pub strategy_name: String,
    pub tunnel_config: String,
    pub attempted_configs: Vec<String>,
    pub final_config: String,
    pub retry_count: u32,
    pub outcome: CheckOutcome,
    pub diagnostics: Vec<String>,
}

/// Coordinator phase as the host sees it. Tagged variants, no sentinel
/// values for "no active run".
#[derive(Clone, Debug, PartialEq)]
pub enum ProcessState {
    Idle,
    Processing { message: String },
    Success { summary: SummaryData },
    Error { message: String },
}

/// Snapshot published over the status watch channel.
#[derive(Clone, Debug, PartialEq)]
pub struct CheckStatus {
    pub process: ProcessState,
    /// Unassisted-browsing signal: the host should let the user keep
    /// shopping without the workflow.
    pub show_browser: bool,
    pub last_submitted_url: Option<String>,
}

impl Default for CheckStatus {
    fn default() -> Self {
        Self {
            process: ProcessState::Idle,
            show_browser: false,
            last_submitted_url: None,
        }
    }
}

/// Everything one in-flight run accumulates between the strategy phase and
/// its terminal state. Cloned wholesale into the suspended continuation.
#[derive(Clone, Debug)]
pub(crate) struct RunCtx {
    pub generation: u64,
    pub url: String,
    pub dirty_baseline_cents: Option<i64>,
    pub baseline: ExtractionOutput,
    pub plan: StrategyPlan,
    pub attempts: Vec<AttemptRecord>,
    pub tried_configs: Vec<String>,
    pub diagnostics: Vec<String>,
    pub tunnel_connected: bool,
}

impl RunCtx {
    pub fn tried_set(&self) -> HashSet<String> {
        self.tried_configs.iter().cloned().collect()
    }
}

/// Serialized state of a run paused on an OS permission grant. At most one
/// exists; a newer submission replaces and thereby cancels it.
#[derive(Debug)]
pub(crate) struct SuspendedContinuation {
    pub ctx: RunCtx,
    pub attempt_index: u32,
    pub waiting_config: String,
}

/// Outcome of one spoof attempt sub-protocol execution.
#[derive(Debug)]
pub(crate) enum SpoofOutcome {
    PermissionRequired {
        token: PermissionToken,
    },
    Failure {
        connected: bool,
        error_type: String,
        error_message: String,
        user_message: String,
        latency_ms: u64,
    },
    Success {
        result: ExtractionOutput,
        latency_ms: u64,
    },
    /// The surrounding run was superseded mid-attempt.
    Cancelled,
}

/// How the bounded spoof loop ended.
#[derive(Debug)]
pub(crate) enum PhaseEnd {
    Success {
        spoofed: ExtractionOutput,
        final_config: String,
    },
    /// Loop finished without a spoofed price. `message` carries the
    /// mid-loop "no healthy configs" diagnostic when that was the cause.
    Exhausted {
        message: Option<String>,
    },
    Suspended,
    Cancelled,
}
