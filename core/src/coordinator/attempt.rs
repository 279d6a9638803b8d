use std::time::{Duration, Instant};

use crate::tunnel::TunnelError;

use super::types::SpoofOutcome;
use super::PriceCheckCoordinator;

impl PriceCheckCoordinator {
    /// One spoof attempt: connect, stabilize, extract. Latency covers the
    /// whole sub-protocol. A permission-required connect result is not
    /// reported to the rotation engine — it says nothing about the config.
    pub(crate) async fn run_spoof_attempt(
        &self,
        generation: u64,
        url: &str,
        config: &str,
        attempt_number: u32,
    ) -> SpoofOutcome {
        let max = self.cfg.spoof_attempt_max;
        let started = Instant::now();

        self.set_processing(
            generation,
            &format!("Connecting VPN ({attempt_number}/{max})..."),
        );
        match self.deps.tunnel.connect(config).await {
            Err(TunnelError::PermissionRequired(token)) => {
                return SpoofOutcome::PermissionRequired { token };
            }
            Err(err) => {
                self.deps.rotation.report(config, false);
                return SpoofOutcome::Failure {
                    connected: false,
                    error_type: "tunnel_connect_failure".to_string(),
                    error_message: err.to_string(),
                    user_message: format!("Spoof attempt failed: {err}"),
                    latency_ms: started.elapsed().as_millis() as u64,
                };
            }
            Ok(()) => {}
        }

        self.hold_state().active_config = Some(config.to_string());

        // Routing needs a moment to settle after the tunnel comes up; a
        // superseding submission interrupts the wait.
        tracing::info!(
            target: "fairprice.coordinator",
            config = %config,
            "starting tunnel stabilization window"
        );
        self.set_processing(generation, "Stabilizing secure tunnel...");
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(self.cfg.stabilization_ms)) => {}
            _ = self.cancelled(generation) => {
                tracing::warn!(
                    target: "fairprice.coordinator",
                    config = %config,
                    "spoof attempt interrupted during stabilization"
                );
                return SpoofOutcome::Cancelled;
            }
        }

        self.set_processing(
            generation,
            &format!("Extracting spoofed price ({attempt_number}/{max})..."),
        );
        match self.deps.extraction.load_and_extract(url).await {
            Ok(result) => {
                self.deps.rotation.report(config, true);
                SpoofOutcome::Success {
                    result,
                    latency_ms: started.elapsed().as_millis() as u64,
                }
            }
            Err(err) => {
                self.deps.rotation.report(config, false);
                SpoofOutcome::Failure {
                    connected: true,
                    error_type: "extraction_failure".to_string(),
                    error_message: err.to_string(),
                    user_message: format!("Spoof attempt failed: {err}"),
                    latency_ms: started.elapsed().as_millis() as u64,
                }
            }
        }
    }
}
