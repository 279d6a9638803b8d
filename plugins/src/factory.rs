use std::sync::Arc;

use anyhow::Result;

use fairprice_core::api::{
    AppConfig, ConfigStore, PersistenceAdapter, PooledRotationEngine, RetryPolicy, RotationEngine,
    RunLog, TelemetryStore, UrlResolver,
};

use crate::configstore::FileConfigStore;
use crate::store::PostgrestTelemetryStore;
use crate::urlresolve::HttpUrlResolver;

pub fn build_telemetry_store(cfg: &AppConfig) -> Result<Arc<dyn TelemetryStore>> {
    Ok(Arc::new(PostgrestTelemetryStore::new(&cfg.telemetry)?))
}

pub fn build_run_log(cfg: &AppConfig) -> Result<Arc<dyn RunLog>> {
    let store = build_telemetry_store(cfg)?;
    Ok(Arc::new(PersistenceAdapter::with_policy(
        store,
        RetryPolicy::from(&cfg.persistence),
    )))
}

pub fn build_config_store(cfg: &AppConfig) -> Result<Arc<dyn ConfigStore>> {
    Ok(Arc::new(FileConfigStore::new(&cfg.config_store)?))
}

pub fn build_rotation(cfg: &AppConfig, store: Arc<dyn ConfigStore>) -> Arc<dyn RotationEngine> {
    Arc::new(PooledRotationEngine::new(&cfg.rotation, Some(store)))
}

pub fn build_url_resolver(cfg: &AppConfig) -> Result<Arc<dyn UrlResolver>> {
    Ok(Arc::new(HttpUrlResolver::new(cfg.check.url_resolve_timeout_ms)?))
}
