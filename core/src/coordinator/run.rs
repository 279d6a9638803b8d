use std::time::Instant;

use crate::types::{AttemptPhase, AttemptRecord, CheckOutcome, CheckRequest};
use crate::url::canonicalize_url;

use super::summary::{
    build_success_summary, build_summary_row, retry_count_from_attempts, SummaryRowSpec,
    DEFAULT_STRATEGY_NAME,
};
use super::types::{PhaseEnd, ProcessState, RunCtx, SpoofOutcome, SuspendedContinuation};
use super::PriceCheckCoordinator;

const NO_HEALTHY_CONFIGS: &str = "No healthy VPN configs available for spoof attempts.";
const PERMISSION_DENIED: &str = "VPN permission denied. Continuing without VPN optimization.";

impl PriceCheckCoordinator {
    /// Drive one price check to a terminal state or to a permission
    /// suspension. Returns once neither this call nor a resumed
    /// continuation has more work to do right now.
    pub async fn submit(&self, request: CheckRequest) {
        let generation = self.bump_generation();
        if self.pending_slot().take().is_some() {
            tracing::debug!(
                target: "fairprice.coordinator",
                "suspended run cancelled by new submission"
            );
        }

        let raw_url = request.raw_url.trim().to_string();
        self.update_status(generation, |status| {
            status.last_submitted_url = (!raw_url.is_empty()).then(|| raw_url.clone());
            status.process = ProcessState::Idle;
            status.show_browser = false;
        });
        if raw_url.is_empty() {
            return;
        }

        let _run = self.run_lock.lock().await;
        if self.is_cancelled(generation) {
            return;
        }

        // A prior run may still be holding the tunnel for shopping; this
        // check owns the tunnel now.
        let shopping_active = self.hold_state().shopping_active;
        if shopping_active {
            if let Err(err) = self.deps.tunnel.disconnect().await {
                let message = format!("VPN disconnect failed before new check: {err}");
                tracing::error!(
                    target: "fairprice.coordinator",
                    error = %err,
                    "tunnel teardown failed before new run"
                );
                self.update_status(generation, |status| {
                    status.process = ProcessState::Error { message };
                });
                return;
            }
            let mut hold = self.hold_state();
            hold.shopping_active = false;
            hold.active_config = None;
        }

        self.set_processing(generation, "Gathering baseline price...");
        let url = canonicalize_url(self.deps.url_resolver.as_ref(), &raw_url).await;

        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut diagnostics: Vec<String> = Vec::new();

        let started = Instant::now();
        let baseline_result = self.deps.extraction.load_and_extract(&url).await;
        let baseline_latency_ms = started.elapsed().as_millis() as u64;

        let baseline = match baseline_result {
            Ok(output) => {
                attempts.push(AttemptRecord {
                    phase: AttemptPhase::Baseline,
                    attempt_index: 0,
                    vpn_config: None,
                    success: true,
                    error_type: None,
                    error_message: None,
                    extracted_price_cents: Some(output.price_cents),
                    detected_tactics: Some(output.tactics.clone()),
                    debug_extraction_path: output.debug_extraction_path.clone(),
                    latency_ms: baseline_latency_ms,
                });
                output
            }
            Err(err) => {
                attempts.push(AttemptRecord {
                    phase: AttemptPhase::Baseline,
                    attempt_index: 0,
                    vpn_config: None,
                    success: false,
                    error_type: Some("extraction_failure".to_string()),
                    error_message: Some(err.to_string()),
                    extracted_price_cents: None,
                    detected_tactics: None,
                    debug_extraction_path: None,
                    latency_ms: baseline_latency_ms,
                });
                let mut message = format!(
                    "Baseline extraction failed: {err}. You can continue shopping normally."
                );
                diagnostics.push(message.clone());
                tracing::error!(
                    target: "fairprice.coordinator",
                    error = %err,
                    "baseline extraction failed"
                );

                self.set_processing(generation, "Logging fallback result...");
                let row = build_summary_row(SummaryRowSpec {
                    url: &url,
                    strategy_id: None,
                    strategy_name: None,
                    baseline_price_cents: 0,
                    found_price_cents: 0,
                    extraction_successful: false,
                    tactics: &[],
                    attempted_configs: Vec::new(),
                    final_config: None,
                    retry_count: 0,
                    outcome: CheckOutcome::DegradedBaselineFailed,
                    degraded: true,
                    baseline_success: false,
                    spoof_success: false,
                    dirty_baseline_price_cents: request.dirty_baseline_cents,
                    diagnostics: &diagnostics,
                });
                if let Err(log_err) = self.deps.run_log.log_run(&row, &attempts).await {
                    tracing::error!(
                        target: "fairprice.coordinator",
                        error = %log_err,
                        "degraded summary insert failed"
                    );
                    message = format!("{message} | Telemetry log failed: {log_err}");
                }

                self.update_status(generation, |status| {
                    status.process = ProcessState::Error { message };
                    status.show_browser = true;
                });
                return;
            }
        };

        self.set_processing(generation, "Determining strategy...");
        let plan = match self
            .deps
            .strategy
            .determine_strategy(&url, &baseline.tactics)
            .await
        {
            Ok(plan) => plan,
            Err(err) => {
                let message = format!("Strategy resolution failed: {err}");
                diagnostics.push(message.clone());
                tracing::error!(
                    target: "fairprice.coordinator",
                    error = %err,
                    "strategy resolution failed"
                );

                self.set_processing(generation, "Logging run result...");
                let row = build_summary_row(SummaryRowSpec {
                    url: &url,
                    strategy_id: None,
                    strategy_name: None,
                    baseline_price_cents: baseline.price_cents,
                    found_price_cents: baseline.price_cents,
                    extraction_successful: false,
                    tactics: &baseline.tactics,
                    attempted_configs: Vec::new(),
                    final_config: None,
                    retry_count: 0,
                    outcome: CheckOutcome::StrategyFailed,
                    degraded: false,
                    baseline_success: true,
                    spoof_success: false,
                    dirty_baseline_price_cents: request.dirty_baseline_cents,
                    diagnostics: &diagnostics,
                });
                if let Err(log_err) = self.deps.run_log.log_run(&row, &attempts).await {
                    tracing::error!(
                        target: "fairprice.coordinator",
                        error = %log_err,
                        "strategy-failed summary insert failed"
                    );
                }

                self.update_status(generation, |status| {
                    status.process = ProcessState::Error { message };
                });
                return;
            }
        };

        let mut ctx = RunCtx {
            generation,
            url,
            dirty_baseline_cents: request.dirty_baseline_cents,
            baseline,
            plan,
            attempts,
            tried_configs: Vec::new(),
            diagnostics,
            tunnel_connected: false,
        };

        let end = self.spoof_phase(&mut ctx, 0, None).await;
        self.finish_phase(ctx, end).await;
    }

    /// Host callback resolving a pending OS permission request. Resumes the
    /// suspended run at its stored attempt, or closes it out as denied.
    pub async fn on_permission_result(&self, granted: bool) {
        let Some(pending) = self.pending_slot().take() else {
            return;
        };
        if self.is_cancelled(pending.ctx.generation) {
            tracing::debug!(
                target: "fairprice.coordinator",
                "stale permission result ignored"
            );
            return;
        }

        if !granted {
            let mut ctx = pending.ctx;
            ctx.diagnostics.push(PERMISSION_DENIED.to_string());
            ctx.attempts.push(AttemptRecord {
                phase: AttemptPhase::Spoof,
                attempt_index: pending.attempt_index + 1,
                vpn_config: Some(pending.waiting_config.clone()),
                success: false,
                error_type: Some("vpn_permission_denied".to_string()),
                error_message: Some(PERMISSION_DENIED.to_string()),
                extracted_price_cents: None,
                detected_tactics: None,
                debug_extraction_path: None,
                latency_ms: 0,
            });

            let row = build_summary_row(SummaryRowSpec {
                url: &ctx.url,
                strategy_id: ctx.plan.strategy_id.clone(),
                strategy_name: Some(DEFAULT_STRATEGY_NAME.to_string()),
                baseline_price_cents: ctx.baseline.price_cents,
                found_price_cents: ctx.baseline.price_cents,
                extraction_successful: false,
                tactics: &ctx.baseline.tactics,
                attempted_configs: ctx.tried_configs.clone(),
                final_config: None,
                retry_count: retry_count_from_attempts(&ctx.attempts),
                outcome: CheckOutcome::VpnPermissionDenied,
                degraded: true,
                baseline_success: true,
                spoof_success: false,
                dirty_baseline_price_cents: ctx.dirty_baseline_cents,
                diagnostics: &ctx.diagnostics,
            });
            if let Err(log_err) = self.deps.run_log.log_run(&row, &ctx.attempts).await {
                tracing::error!(
                    target: "fairprice.coordinator",
                    error = %log_err,
                    "permission-denied summary insert failed"
                );
            }

            self.update_status(ctx.generation, |status| {
                status.process = ProcessState::Error {
                    message: PERMISSION_DENIED.to_string(),
                };
                status.show_browser = true;
            });
            return;
        }

        let _run = self.run_lock.lock().await;
        let mut ctx = pending.ctx;
        if self.is_cancelled(ctx.generation) {
            return;
        }
        // Re-enter the loop at the stored attempt with the stored config;
        // baseline and strategy are never re-run.
        let end = self
            .spoof_phase(&mut ctx, pending.attempt_index, Some(pending.waiting_config))
            .await;
        self.finish_phase(ctx, end).await;
    }

    /// The bounded spoof loop. `preselected` carries the config a resumed
    /// run was trying when it suspended.
    pub(crate) async fn spoof_phase(
        &self,
        ctx: &mut RunCtx,
        start_attempt: u32,
        mut preselected: Option<String>,
    ) -> PhaseEnd {
        let max = self.cfg.spoof_attempt_max;
        let mut exhausted_message: Option<String> = None;

        for attempt in start_attempt..max {
            if self.is_cancelled(ctx.generation) {
                return PhaseEnd::Cancelled;
            }

            let config = match preselected.take() {
                Some(config) => config,
                None => match self.deps.rotation.next(&ctx.tried_set()) {
                    Some(config) => config,
                    None => {
                        let fallback = ctx.plan.tunnel_config.clone();
                        if ctx.tried_configs.contains(&fallback) {
                            // Deliberate early exit: the engine is dry and
                            // the strategy's pick was already tried. Does
                            // not consume an attempt.
                            ctx.diagnostics.push(NO_HEALTHY_CONFIGS.to_string());
                            exhausted_message = Some(NO_HEALTHY_CONFIGS.to_string());
                            break;
                        }
                        fallback
                    }
                },
            };
            if !ctx.tried_configs.contains(&config) {
                ctx.tried_configs.push(config.clone());
            }

            let attempt_number = attempt + 1;
            match self
                .run_spoof_attempt(ctx.generation, &ctx.url, &config, attempt_number)
                .await
            {
                SpoofOutcome::PermissionRequired { token } => {
                    if ctx.tunnel_connected {
                        let _ = self.release_tunnel("before suspension").await;
                        ctx.tunnel_connected = false;
                    }

                    *self.pending_slot() = Some(SuspendedContinuation {
                        ctx: ctx.clone(),
                        attempt_index: attempt,
                        waiting_config: config,
                    });
                    self.set_processing(ctx.generation, "Waiting for VPN permission...");
                    if self.permission_tx.try_send(token).is_err() {
                        tracing::warn!(
                            target: "fairprice.coordinator",
                            "permission request dropped: buffer full or receiver gone"
                        );
                    }
                    return PhaseEnd::Suspended;
                }

                SpoofOutcome::Failure {
                    connected,
                    error_type,
                    error_message,
                    user_message,
                    latency_ms,
                } => {
                    ctx.tunnel_connected |= connected;
                    ctx.attempts.push(AttemptRecord {
                        phase: AttemptPhase::Spoof,
                        attempt_index: attempt_number,
                        vpn_config: Some(config.clone()),
                        success: false,
                        error_type: Some(error_type),
                        error_message: Some(error_message.clone()),
                        extracted_price_cents: None,
                        detected_tactics: None,
                        debug_extraction_path: None,
                        latency_ms,
                    });
                    ctx.diagnostics.push(user_message);
                    tracing::error!(
                        target: "fairprice.coordinator",
                        attempt = attempt_number,
                        config = %config,
                        error = %error_message,
                        "spoof attempt failed"
                    );
                }

                SpoofOutcome::Success { result, latency_ms } => {
                    ctx.tunnel_connected = true;
                    ctx.attempts.push(AttemptRecord {
                        phase: AttemptPhase::Spoof,
                        attempt_index: attempt_number,
                        vpn_config: Some(config.clone()),
                        success: true,
                        error_type: None,
                        error_message: None,
                        extracted_price_cents: Some(result.price_cents),
                        detected_tactics: Some(result.tactics.clone()),
                        debug_extraction_path: result.debug_extraction_path.clone(),
                        latency_ms,
                    });
                    return PhaseEnd::Success {
                        spoofed: result,
                        final_config: config,
                    };
                }

                SpoofOutcome::Cancelled => return PhaseEnd::Cancelled,
            }
        }

        PhaseEnd::Exhausted {
            message: exhausted_message,
        }
    }

    /// Shared tail of the submission and resume paths: persist, release or
    /// hold the tunnel, publish the terminal state.
    pub(crate) async fn finish_phase(&self, mut ctx: RunCtx, end: PhaseEnd) {
        match end {
            PhaseEnd::Suspended => {}

            PhaseEnd::Cancelled => {
                // Superseded run: release the tunnel quietly; the status
                // channel belongs to the newer run now.
                if ctx.tunnel_connected {
                    let _ = self.release_tunnel("superseded run").await;
                }
            }

            PhaseEnd::Exhausted { message } => {
                let mut message = message
                    .unwrap_or_else(|| "Spoofed extraction failed after bounded retry.".to_string());

                self.set_processing(ctx.generation, "Logging run result...");
                let row = build_summary_row(SummaryRowSpec {
                    url: &ctx.url,
                    strategy_id: ctx.plan.strategy_id.clone(),
                    strategy_name: Some(DEFAULT_STRATEGY_NAME.to_string()),
                    baseline_price_cents: ctx.baseline.price_cents,
                    found_price_cents: ctx.baseline.price_cents,
                    extraction_successful: false,
                    tactics: &ctx.baseline.tactics,
                    attempted_configs: ctx.tried_configs.clone(),
                    final_config: None,
                    retry_count: retry_count_from_attempts(&ctx.attempts),
                    outcome: CheckOutcome::SpoofFailed,
                    degraded: true,
                    baseline_success: true,
                    spoof_success: false,
                    dirty_baseline_price_cents: ctx.dirty_baseline_cents,
                    diagnostics: &ctx.diagnostics,
                });
                if let Err(log_err) = self.deps.run_log.log_run(&row, &ctx.attempts).await {
                    tracing::error!(
                        target: "fairprice.coordinator",
                        error = %log_err,
                        "spoof-failed summary insert failed"
                    );
                }

                if ctx.tunnel_connected {
                    if let Some(err) = self.release_tunnel("after exhausted run").await {
                        message = format!("{message} | VPN disconnect failed: {err}");
                    }
                    ctx.tunnel_connected = false;
                }

                self.update_status(ctx.generation, |status| {
                    status.process = ProcessState::Error { message };
                });
            }

            PhaseEnd::Success {
                spoofed,
                final_config,
            } => {
                let retry_count = retry_count_from_attempts(&ctx.attempts);
                let row = build_summary_row(SummaryRowSpec {
                    url: &ctx.url,
                    strategy_id: ctx.plan.strategy_id.clone(),
                    strategy_name: Some(DEFAULT_STRATEGY_NAME.to_string()),
                    baseline_price_cents: ctx.baseline.price_cents,
                    found_price_cents: spoofed.price_cents,
                    extraction_successful: true,
                    tactics: &ctx.baseline.tactics,
                    attempted_configs: ctx.tried_configs.clone(),
                    final_config: Some(final_config.clone()),
                    retry_count,
                    outcome: CheckOutcome::Success,
                    degraded: false,
                    baseline_success: true,
                    spoof_success: true,
                    dirty_baseline_price_cents: ctx.dirty_baseline_cents,
                    diagnostics: &ctx.diagnostics,
                });

                self.set_processing(ctx.generation, "Logging to database...");
                if let Err(log_err) = self.deps.run_log.log_run(&row, &ctx.attempts).await {
                    let mut message = format!("Telemetry log failed: {log_err}");
                    tracing::error!(
                        target: "fairprice.coordinator",
                        error = %log_err,
                        "summary insert failed"
                    );
                    if ctx.tunnel_connected {
                        if let Some(err) = self.release_tunnel("after summary log failure").await {
                            message = format!("{message} | VPN disconnect failed: {err}");
                        }
                        ctx.tunnel_connected = false;
                    }
                    self.update_status(ctx.generation, |status| {
                        status.process = ProcessState::Error { message };
                    });
                    return;
                }
                tracing::info!(target: "fairprice.coordinator", "summary insert succeeded");

                let summary = build_success_summary(&ctx, &spoofed, &final_config, retry_count);
                {
                    let mut hold = self.hold_state();
                    hold.shopping_active = true;
                    hold.active_config = Some(final_config);
                }
                self.update_status(ctx.generation, |status| {
                    status.process = ProcessState::Success { summary };
                    status.show_browser = false;
                });
            }
        }
    }
}
