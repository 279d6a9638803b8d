//! Stable re-exports for consumers (`plugins` and host applications).
//!
//! Prefer importing from `fairprice_core::api` instead of reaching into
//! internal modules.

pub use crate::config::{
    AppConfig, CheckConfig, ConfigStoreConfig, PersistenceConfig, RotationConfig, TelemetryConfig,
};
pub use crate::coordinator::{
    format_usd, CheckStatus, CoordinatorDeps, PriceCheckCoordinator, ProcessState, SummaryData,
};
pub use crate::extract::{Extraction, ExtractionOutput};
pub use crate::persist::{
    retry_with_backoff, PersistenceAdapter, RetryPolicy, RunLog, StoreError, TelemetryStore,
};
pub use crate::rotation::{PooledRotationEngine, RotationEngine};
pub use crate::store::{ConfigRecord, ConfigSource, ConfigStore, NullConfigStore};
pub use crate::strategy::{StaticStrategy, Strategy, StrategyPlan};
pub use crate::tunnel::{PermissionToken, Tunnel, TunnelError};
pub use crate::types::{
    AttemptPhase, AttemptRecord, CheckOutcome, CheckRequest, RunSummary,
};
pub use crate::url::{canonicalize_url, extract_first_url, NoopUrlResolver, UrlResolver};
