//! Durable-write policy around the telemetry store: session bootstrap,
//! bounded retry with backoff + jitter, and the legacy-schema fallback for
//! summary rows. Attempt telemetry is best-effort by design.

mod retry;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{AttemptRecord, RunSummary};

pub use retry::{retry_with_backoff, RetryPolicy};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Network-shaped failure worth retrying.
    #[error("transient store failure: {0}")]
    Transient(String),

    /// The write was rejected because the deployed schema is behind the
    /// payload (unknown column or similar).
    #[error("store schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("store failure: {0}")]
    Fatal(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

/// Raw durable-storage collaborator. Implementations classify their own
/// failures; the retry/fallback policy lives above this seam.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Make sure an authenticated session exists, creating an anonymous one
    /// if absent. Idempotent and cheap to call every run.
    async fn ensure_session(&self) -> Result<(), StoreError>;

    async fn insert_summary(&self, row: &RunSummary) -> Result<(), StoreError>;

    async fn insert_attempts(&self, rows: &[AttemptRecord]) -> Result<(), StoreError>;
}

/// What the coordinator consumes: one call that lands a run's summary and
/// its attempt telemetry.
#[async_trait]
pub trait RunLog: Send + Sync {
    async fn log_run(
        &self,
        summary: &RunSummary,
        attempts: &[AttemptRecord],
    ) -> Result<(), StoreError>;
}

pub struct PersistenceAdapter {
    store: Arc<dyn TelemetryStore>,
    policy: RetryPolicy,
}

impl PersistenceAdapter {
    pub fn new(store: Arc<dyn TelemetryStore>) -> Self {
        Self::with_policy(store, RetryPolicy::default())
    }

    pub fn with_policy(store: Arc<dyn TelemetryStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    async fn insert_summary_with_fallback(&self, summary: &RunSummary) -> Result<(), StoreError> {
        let result = retry_with_backoff(&self.policy, StoreError::is_transient, || {
            self.store.insert_summary(summary)
        })
        .await;

        match result {
            Err(StoreError::SchemaMismatch(reason)) => {
                // Compatibility guard: if schema columns are behind, keep
                // core logging alive with the reduced payload.
                tracing::warn!(
                    target: "fairprice.persist",
                    reason = %reason,
                    "summary insert rejected by schema; retrying with legacy payload"
                );
                let legacy = summary.to_legacy_payload();
                retry_with_backoff(&self.policy, StoreError::is_transient, || {
                    self.store.insert_summary(&legacy)
                })
                .await
            }
            other => other,
        }
    }
}

#[async_trait]
impl RunLog for PersistenceAdapter {
    async fn log_run(
        &self,
        summary: &RunSummary,
        attempts: &[AttemptRecord],
    ) -> Result<(), StoreError> {
        self.store.ensure_session().await?;
        self.insert_summary_with_fallback(summary).await?;

        if !attempts.is_empty() {
            let result = retry_with_backoff(&self.policy, StoreError::is_transient, || {
                self.store.insert_attempts(attempts)
            })
            .await;
            if let Err(err) = result {
                tracing::warn!(
                    target: "fairprice.persist",
                    error = %err,
                    "attempt telemetry insert failed; continuing without attempt rows"
                );
            }
        }

        Ok(())
    }
}
