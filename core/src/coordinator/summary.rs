use crate::types::{AttemptPhase, AttemptRecord, CheckOutcome, RunSummary};
use crate::url::host_of;

use super::types::{RunCtx, SummaryData};
use crate::extract::ExtractionOutput;

/// Display name until strategy resolution grows real strategies.
pub const DEFAULT_STRATEGY_NAME: &str = "Default Strategy (stub)";

pub fn format_usd(cents: i64) -> String {
    format!("${:.2}", cents as f64 / 100.0)
}

/// Retries = spoof attempts beyond the first. Baseline rows don't count.
pub(crate) fn retry_count_from_attempts(attempts: &[AttemptRecord]) -> u32 {
    let spoof_rows = attempts
        .iter()
        .filter(|row| row.phase == AttemptPhase::Spoof)
        .count() as u32;
    spoof_rows.saturating_sub(1)
}

pub(crate) struct SummaryRowSpec<'a> {
    pub url: &'a str,
    pub strategy_id: Option<String>,
    pub strategy_name: Option<String>,
    pub baseline_price_cents: i64,
    pub found_price_cents: i64,
    pub extraction_successful: bool,
    pub tactics: &'a [String],
    pub attempted_configs: Vec<String>,
    pub final_config: Option<String>,
    pub retry_count: u32,
    pub outcome: CheckOutcome,
    pub degraded: bool,
    pub baseline_success: bool,
    pub spoof_success: bool,
    pub dirty_baseline_price_cents: Option<i64>,
    pub diagnostics: &'a [String],
}

pub(crate) fn build_summary_row(spec: SummaryRowSpec<'_>) -> RunSummary {
    RunSummary {
        product_url: spec.url.to_string(),
        domain: host_of(spec.url),
        baseline_price_cents: spec.baseline_price_cents,
        found_price_cents: spec.found_price_cents,
        strategy_id: spec.strategy_id,
        strategy_name: spec.strategy_name,
        extraction_successful: spec.extraction_successful,
        attempted_configs: Some(spec.attempted_configs),
        final_config: spec.final_config,
        retry_count: spec.retry_count,
        outcome: Some(spec.outcome),
        degraded: Some(spec.degraded),
        baseline_success: Some(spec.baseline_success),
        spoof_success: Some(spec.spoof_success),
        dirty_baseline_price_cents: spec.dirty_baseline_price_cents,
        raw_extraction_data: serde_json::json!({
            "detected_tactics": spec.tactics,
            "diagnostics": spec.diagnostics,
        }),
        created_at: None,
    }
}

pub(crate) fn build_success_summary(
    ctx: &RunCtx,
    spoofed: &ExtractionOutput,
    final_config: &str,
    retry_count: u32,
) -> SummaryData {
    let potential_savings_cents = ctx
        .dirty_baseline_cents
        .map(|dirty| dirty - spoofed.price_cents);
    let is_victory = potential_savings_cents.unwrap_or(0) > 0;

    SummaryData {
        baseline_price: format_usd(ctx.baseline.price_cents),
        spoofed_price: format_usd(spoofed.price_cents),
        dirty_baseline_price: ctx.dirty_baseline_cents.map(format_usd),
        potential_savings: potential_savings_cents
            .filter(|cents| *cents > 0)
            .map(format_usd),
        is_victory,
        tactics: ctx.baseline.tactics.clone(),
        strategy_name: DEFAULT_STRATEGY_NAME.to_string(),
        tunnel_config: ctx.plan.tunnel_config.clone(),
        attempted_configs: ctx.tried_configs.clone(),
        final_config: final_config.to_string(),
        retry_count,
        outcome: CheckOutcome::Success,
        diagnostics: ctx.diagnostics.clone(),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn usd_formatting_pads_cents() {
        assert_eq!(format_usd(1999), "$19.99");
        assert_eq!(format_usd(1299), "$12.99");
        assert_eq!(format_usd(5), "$0.05");
        assert_eq!(format_usd(0), "$0.00");
    }

    #[test]
    fn retry_count_ignores_baseline_rows() {
        let row = |phase, index| AttemptRecord {
            phase,
            attempt_index: index,
            vpn_config: None,
            success: false,
            error_type: None,
            error_message: None,
            extracted_price_cents: None,
            detected_tactics: None,
            debug_extraction_path: None,
            latency_ms: 0,
        };

        assert_eq!(retry_count_from_attempts(&[]), 0);
        assert_eq!(retry_count_from_attempts(&[row(AttemptPhase::Baseline, 0)]), 0);
        assert_eq!(
            retry_count_from_attempts(&[
                row(AttemptPhase::Baseline, 0),
                row(AttemptPhase::Spoof, 1),
            ]),
            0
        );
        assert_eq!(
            retry_count_from_attempts(&[
                row(AttemptPhase::Baseline, 0),
                row(AttemptPhase::Spoof, 1),
                row(AttemptPhase::Spoof, 2),
            ]),
            1
        );
    }
}
