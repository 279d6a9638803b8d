//! The run coordinator: drives one price check from submission to a
//! terminal state, suspending mid-flight when the OS requires a tunnel
//! permission grant and resuming from exactly that point on the host's
//! callback. At most one run executes against the tunnel at a time.

mod attempt;
mod run;
mod summary;
mod types;


use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, watch};

use crate::config::CheckConfig;
use crate::extract::Extraction;
use crate::persist::RunLog;
use crate::rotation::RotationEngine;
use crate::store::ConfigStore;
use crate::strategy::Strategy;
use crate::tunnel::{PermissionToken, Tunnel};
use crate::url::UrlResolver;

pub use summary::{format_usd, DEFAULT_STRATEGY_NAME};
pub use types::{CheckStatus, ProcessState, SummaryData};

use types::SuspendedContinuation;

/// Collaborators, injected at construction. Lifecycle is the host's; the
/// coordinator never builds its own clients.
pub struct CoordinatorDeps {
    pub extraction: Arc<dyn Extraction>,
    pub tunnel: Arc<dyn Tunnel>,
    pub strategy: Arc<dyn Strategy>,
    pub rotation: Arc<dyn RotationEngine>,
    pub run_log: Arc<dyn RunLog>,
    pub config_store: Arc<dyn ConfigStore>,
    pub url_resolver: Arc<dyn UrlResolver>,
}

#[derive(Debug, Default)]
struct TunnelHold {
    /// Winning tunnel kept up for the post-success shopping phase.
    shopping_active: bool,
    /// Config the tunnel is believed to be connected with right now.
    active_config: Option<String>,
}

pub struct PriceCheckCoordinator {
    deps: CoordinatorDeps,
    cfg: CheckConfig,
    status_tx: watch::Sender<CheckStatus>,
    /// Bumped on every submission; a run whose generation is stale has been
    /// superseded and must stop touching shared state.
    generation_tx: watch::Sender<u64>,
    permission_tx: mpsc::Sender<PermissionToken>,
    permission_rx: Mutex<Option<mpsc::Receiver<PermissionToken>>>,
    pending: Mutex<Option<SuspendedContinuation>>,
    /// Serializes run execution against the shared tunnel resource.
    run_lock: tokio::sync::Mutex<()>,
    hold: Mutex<TunnelHold>,
}

impl PriceCheckCoordinator {
    pub fn new(deps: CoordinatorDeps, cfg: CheckConfig) -> Self {
        let (status_tx, _) = watch::channel(CheckStatus::default());
        let (generation_tx, _) = watch::channel(0u64);
        // One-shot buffer: a second request while the host hasn't consumed
        // the first is dropped, matching at-most-one pending suspension.
        let (permission_tx, permission_rx) = mpsc::channel(1);

        Self {
            deps,
            cfg,
            status_tx,
            generation_tx,
            permission_tx,
            permission_rx: Mutex::new(Some(permission_rx)),
            pending: Mutex::new(None),
            run_lock: tokio::sync::Mutex::new(()),
            hold: Mutex::new(TunnelHold::default()),
        }
    }

    /// Live progress/terminal-state feed.
    pub fn status(&self) -> watch::Receiver<CheckStatus> {
        self.status_tx.subscribe()
    }

    /// Permission-request stream for the host to act on. The first caller
    /// takes ownership of the receiver.
    pub fn take_permission_requests(&self) -> Option<mpsc::Receiver<PermissionToken>> {
        self.permission_slot().take()
    }

    pub fn enter_shopping_mode(&self) {
        self.status_tx.send_modify(|status| status.show_browser = true);
    }

    pub fn back_to_app(&self) {
        self.status_tx.send_modify(|status| status.show_browser = false);
    }

    /// End the shopping session: revert the tunnel to the baseline config
    /// and clear run state. A revert failure is reported through the status
    /// channel but never blocks the reset.
    pub async fn close_session(&self) {
        let error = self.ensure_baseline_tunnel().await;
        if error.is_none() {
            self.hold_state().shopping_active = false;
        }
        self.status_tx.send_modify(|status| {
            status.last_submitted_url = None;
            status.show_browser = false;
            status.process = match &error {
                Some(message) => ProcessState::Error {
                    message: message.clone(),
                },
                None => ProcessState::Idle,
            };
        });
    }

    /// App teardown variant of `close_session`: revert failure is only
    /// logged.
    pub async fn on_app_closing(&self) {
        match self.ensure_baseline_tunnel().await {
            Some(message) => {
                tracing::error!(target: "fairprice.coordinator", %message, "baseline revert failed during teardown");
            }
            None => self.hold_state().shopping_active = false,
        }
    }

    async fn ensure_baseline_tunnel(&self) -> Option<String> {
        let baseline = self
            .deps
            .config_store
            .baseline_config_id()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| self.cfg.default_baseline_config.clone());

        if self.hold_state().active_config.as_deref() == Some(baseline.as_str()) {
            tracing::debug!(
                target: "fairprice.coordinator",
                config = %baseline,
                "baseline tunnel already active; skipping reconnect"
            );
            return None;
        }

        match self.deps.tunnel.connect(&baseline).await {
            Ok(()) => {
                self.hold_state().active_config = Some(baseline.clone());
                tracing::info!(
                    target: "fairprice.coordinator",
                    config = %baseline,
                    "reverted tunnel to baseline config"
                );
                None
            }
            Err(err) => {
                tracing::error!(
                    target: "fairprice.coordinator",
                    config = %baseline,
                    error = %err,
                    "failed to revert tunnel to baseline config"
                );
                Some(format!("Failed to revert VPN to baseline: {err}"))
            }
        }
    }

    /// Disconnect the tunnel and drop the believed-active config. Failures
    /// are logged and returned for callers that surface them.
    pub(crate) async fn release_tunnel(&self, context: &'static str) -> Option<crate::tunnel::TunnelError> {
        match self.deps.tunnel.disconnect().await {
            Ok(()) => {
                self.hold_state().active_config = None;
                None
            }
            Err(err) => {
                tracing::error!(
                    target: "fairprice.coordinator",
                    error = %err,
                    context,
                    "tunnel release failed"
                );
                Some(err)
            }
        }
    }

    fn bump_generation(&self) -> u64 {
        let mut next = 0;
        self.generation_tx.send_modify(|g| {
            *g += 1;
            next = *g;
        });
        next
    }

    fn current_generation(&self) -> u64 {
        *self.generation_tx.borrow()
    }

    fn is_cancelled(&self, generation: u64) -> bool {
        self.current_generation() != generation
    }

    /// Resolves once `generation` is superseded. Used to make the
    /// stabilization delay cancellable.
    async fn cancelled(&self, generation: u64) {
        let mut rx = self.generation_tx.subscribe();
        loop {
            if *rx.borrow_and_update() != generation {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Status writes are generation-guarded so a superseded run cannot
    /// clobber its successor's progress.
    fn update_status(&self, generation: u64, update: impl FnOnce(&mut CheckStatus)) {
        if self.is_cancelled(generation) {
            return;
        }
        self.status_tx.send_modify(update);
    }

    fn set_processing(&self, generation: u64, message: &str) {
        self.update_status(generation, |status| {
            status.process = ProcessState::Processing {
                message: message.to_string(),
            };
        });
    }

    fn hold_state(&self) -> MutexGuard<'_, TunnelHold> {
        self.hold.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn pending_slot(&self) -> MutexGuard<'_, Option<SuspendedContinuation>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn permission_slot(&self) -> MutexGuard<'_, Option<mpsc::Receiver<PermissionToken>>> {
        self.permission_rx.lock().unwrap_or_else(|e| e.into_inner())
    }
}
