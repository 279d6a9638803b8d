use async_trait::async_trait;

/// Strategy decision for one URL: an optional strategy identifier for
/// telemetry plus the tunnel config the strategy suggests.
#[derive(Clone, Debug, PartialEq)]
pub struct StrategyPlan {
    pub strategy_id: Option<String>,
    pub tunnel_config: String,
}

#[async_trait]
pub trait Strategy: Send + Sync {
    async fn determine_strategy(
        &self,
        url: &str,
        baseline_tactics: &[String],
    ) -> anyhow::Result<StrategyPlan>;
}

/// Fixed-plan strategy. Useful as a placeholder until a real strategy
/// service is wired in, and for tests.
pub struct StaticStrategy {
    plan: StrategyPlan,
}

impl StaticStrategy {
    pub fn new(plan: StrategyPlan) -> Self {
        Self { plan }
    }
}

#[async_trait]
impl Strategy for StaticStrategy {
    async fn determine_strategy(
        &self,
        _url: &str,
        _baseline_tactics: &[String],
    ) -> anyhow::Result<StrategyPlan> {
        Ok(self.plan.clone())
    }
}
