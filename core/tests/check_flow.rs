//! End-to-end runs through the public API: real rotation engine, real
//! persistence adapter over an in-memory store, scripted extraction and
//! tunnel collaborators.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use fairprice_core::api::{
    AttemptPhase, AttemptRecord, CheckConfig, CheckOutcome, CheckRequest, CoordinatorDeps,
    Extraction, ExtractionOutput, NoopUrlResolver, NullConfigStore, PersistenceAdapter,
    PooledRotationEngine, PriceCheckCoordinator, ProcessState, RunSummary, StaticStrategy,
    StoreError, StrategyPlan, TelemetryStore, Tunnel, TunnelError,
};
use fairprice_core::config::RotationConfig;

struct ScriptedExtraction {
    results: Mutex<VecDeque<Result<ExtractionOutput, String>>>,
}

impl ScriptedExtraction {
    fn new(results: Vec<Result<ExtractionOutput, String>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
        }
    }
}

#[async_trait]
impl Extraction for ScriptedExtraction {
    async fn load_and_extract(&self, _url: &str) -> anyhow::Result<ExtractionOutput> {
        match self.results.lock().unwrap().pop_front() {
            Some(Ok(output)) => Ok(output),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Err(anyhow::anyhow!("no scripted extraction result")),
        }
    }
}

#[derive(Default)]
struct AlwaysUpTunnel;

#[async_trait]
impl Tunnel for AlwaysUpTunnel {
    async fn connect(&self, _config: &str) -> Result<(), TunnelError> {
        Ok(())
    }
    async fn disconnect(&self) -> Result<(), TunnelError> {
        Ok(())
    }
}

#[derive(Default)]
struct MemoryStore {
    summaries: Mutex<Vec<RunSummary>>,
    attempts: Mutex<Vec<AttemptRecord>>,
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn ensure_session(&self) -> Result<(), StoreError> {
        Ok(())
    }
    async fn insert_summary(&self, row: &RunSummary) -> Result<(), StoreError> {
        self.summaries.lock().unwrap().push(row.clone());
        Ok(())
    }
    async fn insert_attempts(&self, rows: &[AttemptRecord]) -> Result<(), StoreError> {
        self.attempts.lock().unwrap().extend(rows.iter().cloned());
        Ok(())
    }
}

fn coordinator_with(
    extraction: ScriptedExtraction,
    rotation_cfg: RotationConfig,
    strategy_config: &str,
) -> (PriceCheckCoordinator, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::default());
    let deps = CoordinatorDeps {
        extraction: Arc::new(extraction),
        tunnel: Arc::new(AlwaysUpTunnel),
        strategy: Arc::new(StaticStrategy::new(StrategyPlan {
            strategy_id: Some("strat_test_123".to_string()),
            tunnel_config: strategy_config.to_string(),
        })),
        rotation: Arc::new(PooledRotationEngine::new(&rotation_cfg, None)),
        run_log: Arc::new(PersistenceAdapter::new(store.clone())),
        config_store: Arc::new(NullConfigStore),
        url_resolver: Arc::new(NoopUrlResolver),
    };
    (
        PriceCheckCoordinator::new(deps, CheckConfig::default()),
        store,
    )
}

#[tokio::test(start_paused = true)]
async fn spoofed_check_lands_summary_and_telemetry() {
    let extraction = ScriptedExtraction::new(vec![
        Ok(ExtractionOutput::new(1999, vec!["cookie_tracking".into()])),
        Ok(ExtractionOutput::new(1299, vec![])),
    ]);
    // Empty pool: the strategy's suggested config carries the run.
    let (coordinator, store) = coordinator_with(extraction, RotationConfig::default(), "wg-test");

    coordinator
        .submit(CheckRequest::new("https://example.com/p/123"))
        .await;

    let status = coordinator.status().borrow().clone();
    let summary = match &status.process {
        ProcessState::Success { summary } => summary.clone(),
        other => panic!("expected success, got {other:?}"),
    };
    assert_eq!(summary.baseline_price, "$19.99");
    assert_eq!(summary.spoofed_price, "$12.99");
    assert_eq!(summary.attempted_configs, vec!["wg-test".to_string()]);
    assert_eq!(summary.retry_count, 0);
    assert_eq!(summary.outcome, CheckOutcome::Success);
    assert_eq!(summary.tactics, vec!["cookie_tracking".to_string()]);

    let summaries = store.summaries.lock().unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].baseline_price_cents, 1999);
    assert_eq!(summaries[0].found_price_cents, 1299);
    assert_eq!(summaries[0].outcome, Some(CheckOutcome::Success));

    let attempts = store.attempts.lock().unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].phase, AttemptPhase::Baseline);
    assert_eq!(attempts[1].phase, AttemptPhase::Spoof);
    assert_eq!(attempts[1].extracted_price_cents, Some(1299));
}

#[tokio::test(start_paused = true)]
async fn rotation_pool_supplies_a_second_config_after_a_transient_failure() {
    let extraction = ScriptedExtraction::new(vec![
        Ok(ExtractionOutput::new(2599, vec![])),
        Err("blocked by bot wall".to_string()),
        Ok(ExtractionOutput::new(2299, vec![])),
    ]);
    let rotation_cfg = RotationConfig {
        bundled_configs: vec!["wg-slc-a.conf".into(), "wg-slc-b.conf".into()],
        ..RotationConfig::default()
    };
    let (coordinator, store) = coordinator_with(extraction, rotation_cfg, "wg-fallback");

    coordinator
        .submit(CheckRequest::new("https://example.com/p/456"))
        .await;

    let summaries = store.summaries.lock().unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].outcome, Some(CheckOutcome::Success));
    assert_eq!(summaries[0].retry_count, 1);
    assert_eq!(summaries[0].final_config, Some("wg-slc-b.conf".to_string()));
    assert_eq!(
        summaries[0].attempted_configs,
        Some(vec!["wg-slc-a.conf".to_string(), "wg-slc-b.conf".to_string()])
    );

    let attempts = store.attempts.lock().unwrap();
    let spoof_rows: Vec<_> = attempts
        .iter()
        .filter(|row| row.phase == AttemptPhase::Spoof)
        .collect();
    assert_eq!(spoof_rows.len(), 2);
    assert!(!spoof_rows[0].success);
    assert!(spoof_rows[1].success);
}
