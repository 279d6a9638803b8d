//! Round-robin rotation over the tunnel-config pool with failure-driven
//! cooldown. Health state lives for the whole process; the ring itself is
//! recomputed per call so user imports become visible without a restart.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::config::RotationConfig;
use crate::store::{detect_provider_hint, ConfigStore};

/// Injectable millisecond clock for cooldown arithmetic.
pub type ClockMs = Arc<dyn Fn() -> i64 + Send + Sync>;

pub fn system_clock() -> ClockMs {
    Arc::new(|| chrono::Utc::now().timestamp_millis())
}

pub trait RotationEngine: Send + Sync {
    /// Deduplicated, blocked-filtered, priority-ordered ring of config ids.
    fn list(&self) -> Vec<String>;

    /// Next usable config: advances the cursor at most one full pass,
    /// skipping excluded ids and ids in cooldown. `None` after a full pass
    /// without a candidate — callers need their own fallback.
    fn next(&self, excluding: &HashSet<String>) -> Option<String>;

    /// Attempt outcome feedback. Success resets health; failures accumulate
    /// toward the cooldown threshold.
    fn report(&self, config: &str, success: bool);
}

#[derive(Clone, Copy, Debug, Default)]
struct ConfigHealth {
    consecutive_failures: u32,
    cooldown_until_ms: i64,
}

#[derive(Default)]
struct RingState {
    cursor: usize,
    health: HashMap<String, ConfigHealth>,
}

pub struct PooledRotationEngine {
    bundled: Vec<String>,
    store: Option<Arc<dyn ConfigStore>>,
    blocked: HashSet<String>,
    priority_provider: Option<String>,
    failure_threshold: u32,
    cooldown_ms: i64,
    clock: ClockMs,
    state: Mutex<RingState>,
}

impl PooledRotationEngine {
    pub fn new(cfg: &RotationConfig, store: Option<Arc<dyn ConfigStore>>) -> Self {
        Self::with_clock(cfg, store, system_clock())
    }

    pub fn with_clock(
        cfg: &RotationConfig,
        store: Option<Arc<dyn ConfigStore>>,
        clock: ClockMs,
    ) -> Self {
        Self {
            bundled: cfg.bundled_configs.clone(),
            store,
            blocked: cfg.blocked_configs.iter().cloned().collect(),
            priority_provider: cfg.priority_provider.clone(),
            failure_threshold: cfg.failure_threshold.max(1),
            cooldown_ms: cfg.cooldown_ms as i64,
            clock,
            state: Mutex::new(RingState::default()),
        }
    }

    /// Ring = bundled ∪ enabled user configs, deduplicated (first occurrence
    /// wins), sorted, priority provider stably in front, blocked removed.
    /// Store reads happen outside the health lock.
    fn ring(&self) -> Vec<String> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut entries: Vec<(String, Option<String>)> = Vec::new();

        for id in &self.bundled {
            if self.blocked.contains(id) || !seen.insert(id.clone()) {
                continue;
            }
            let hint = detect_provider_hint(id, "").map(str::to_string);
            entries.push((id.clone(), hint));
        }

        if let Some(store) = &self.store {
            for record in store.list_enabled_user_configs() {
                if self.blocked.contains(&record.id) || !seen.insert(record.id.clone()) {
                    continue;
                }
                let hint = record
                    .provider_hint
                    .clone()
                    .or_else(|| detect_provider_hint(&record.display_name, "").map(str::to_string));
                entries.push((record.id, hint));
            }
        }

        entries.sort_by(|a, b| a.0.cmp(&b.0));
        if let Some(priority) = &self.priority_provider {
            // Stable: within each partition the alphabetical order holds.
            entries.sort_by_key(|(_, hint)| hint.as_deref() != Some(priority.as_str()));
        }

        entries.into_iter().map(|(id, _)| id).collect()
    }
}

impl RotationEngine for PooledRotationEngine {
    fn list(&self) -> Vec<String> {
        self.ring()
    }

    fn next(&self, excluding: &HashSet<String>) -> Option<String> {
        let ring = self.ring();
        if ring.is_empty() {
            return None;
        }

        let now = (self.clock)();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for _ in 0..ring.len() {
            let index = state.cursor % ring.len();
            state.cursor = (index + 1) % ring.len();
            let config = &ring[index];
            if excluding.contains(config) {
                continue;
            }
            let health = state.health.entry(config.clone()).or_default();
            if health.cooldown_until_ms > now {
                continue;
            }
            return Some(config.clone());
        }
        None
    }

    fn report(&self, config: &str, success: bool) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let health = state.health.entry(config.to_string()).or_default();
        if success {
            health.consecutive_failures = 0;
            health.cooldown_until_ms = 0;
            return;
        }

        health.consecutive_failures += 1;
        if health.consecutive_failures >= self.failure_threshold {
            health.cooldown_until_ms = (self.clock)() + self.cooldown_ms;
            health.consecutive_failures = 0;
            tracing::info!(
                target: "fairprice.rotation",
                config = %config,
                cooldown_ms = self.cooldown_ms,
                "config entered cooldown"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, Ordering};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::store::{ConfigRecord, ConfigSource};

    fn cfg(bundled: &[&str]) -> RotationConfig {
        RotationConfig {
            bundled_configs: bundled.iter().map(|s| s.to_string()).collect(),
            ..RotationConfig::default()
        }
    }

    fn manual_clock(start_ms: i64) -> (Arc<AtomicI64>, ClockMs) {
        let now = Arc::new(AtomicI64::new(start_ms));
        let handle = now.clone();
        let clock: ClockMs = Arc::new(move || handle.load(Ordering::SeqCst));
        (now, clock)
    }

    struct StaticStore(Vec<ConfigRecord>);

    impl ConfigStore for StaticStore {
        fn list_user_configs(&self) -> Vec<ConfigRecord> {
            self.0.clone()
        }
        fn read_user_config_text(&self, _id: &str) -> anyhow::Result<String> {
            Err(anyhow::anyhow!("not stored"))
        }
        fn import_user_config(&self, _n: &str, _raw: &str) -> anyhow::Result<ConfigRecord> {
            Err(anyhow::anyhow!("read-only"))
        }
        fn set_user_config_enabled(&self, _id: &str, _enabled: bool) -> anyhow::Result<()> {
            Ok(())
        }
        fn baseline_config_id(&self) -> Option<String> {
            None
        }
        fn set_baseline_config_id(&self, _id: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn user_record(id: &str, provider: Option<&str>, enabled: bool) -> ConfigRecord {
        ConfigRecord {
            id: id.into(),
            source: ConfigSource::User,
            display_name: id.into(),
            provider_hint: provider.map(str::to_string),
            enabled,
        }
    }

    #[test]
    fn list_is_sorted_and_deduplicated() {
        let engine = PooledRotationEngine::new(&cfg(&["z.conf", "a.conf", "m.conf", "a.conf"]), None);
        assert_eq!(engine.list(), vec!["a.conf", "m.conf", "z.conf"]);
    }

    #[test]
    fn list_filters_blocked_and_disabled() {
        let mut rotation = cfg(&["a.conf", "b.conf"]);
        rotation.blocked_configs = vec!["b.conf".into()];
        let store = Arc::new(StaticStore(vec![
            user_record("user:one", None, true),
            user_record("user:two", None, false),
        ]));
        let engine = PooledRotationEngine::new(&rotation, Some(store));
        assert_eq!(engine.list(), vec!["a.conf", "user:one"]);
    }

    #[test]
    fn priority_provider_configs_precede_the_rest() {
        let mut rotation = cfg(&["alpha.conf", "proton_us-UT-1.conf", "zeta.conf"]);
        rotation.priority_provider = Some("proton".into());
        let store = Arc::new(StaticStore(vec![
            user_record("user:office", None, true),
            user_record("user:proton-home", Some("proton"), true),
        ]));
        let engine = PooledRotationEngine::new(&rotation, Some(store));
        assert_eq!(
            engine.list(),
            vec![
                "proton_us-UT-1.conf",
                "user:proton-home",
                "alpha.conf",
                "user:office",
                "zeta.conf",
            ]
        );
    }

    #[test]
    fn next_round_robins_and_honors_exclusions() {
        let engine = PooledRotationEngine::new(&cfg(&["a.conf", "b.conf", "c.conf"]), None);
        assert_eq!(engine.next(&HashSet::new()), Some("a.conf".into()));
        assert_eq!(engine.next(&HashSet::new()), Some("b.conf".into()));

        let excluding: HashSet<String> = ["c.conf".to_string()].into_iter().collect();
        assert_eq!(engine.next(&excluding), Some("a.conf".into()));

        let all: HashSet<String> = engine.list().into_iter().collect();
        assert_eq!(engine.next(&all), None);
    }

    #[test]
    fn cooldown_starts_at_threshold_and_expires_with_the_clock() {
        let (now, clock) = manual_clock(1_000);
        let rotation = cfg(&["a.conf", "b.conf"]);
        let engine = PooledRotationEngine::with_clock(&rotation, None, clock);

        engine.report("a.conf", false);
        engine.report("a.conf", false);

        let excluding: HashSet<String> = ["b.conf".to_string()].into_iter().collect();
        assert_eq!(engine.next(&excluding), None);

        now.fetch_add(10 * 60 * 1000 + 1, Ordering::SeqCst);
        assert_eq!(engine.next(&excluding), Some("a.conf".into()));
    }

    #[test]
    fn success_resets_failure_count_and_cooldown() {
        let (now, clock) = manual_clock(1_000);
        let engine = PooledRotationEngine::with_clock(&cfg(&["a.conf"]), None, clock);

        engine.report("a.conf", false);
        engine.report("a.conf", true);
        engine.report("a.conf", false);
        // One failure since the success: still below the threshold.
        assert_eq!(engine.next(&HashSet::new()), Some("a.conf".into()));

        engine.report("a.conf", false);
        assert_eq!(engine.next(&HashSet::new()), None);

        engine.report("a.conf", true);
        assert_eq!(engine.next(&HashSet::new()), Some("a.conf".into()));
        let _ = now;
    }

    #[test]
    fn repeated_threshold_hits_restart_the_window_not_stack_it() {
        let (now, clock) = manual_clock(0);
        let engine = PooledRotationEngine::with_clock(&cfg(&["a.conf"]), None, clock);

        engine.report("a.conf", false);
        engine.report("a.conf", false);
        now.store(5 * 60 * 1000, Ordering::SeqCst);
        engine.report("a.conf", false);
        engine.report("a.conf", false);

        // Window restarted at t=5m, so expiry is t=15m, not t=20m.
        now.store(15 * 60 * 1000 + 1, Ordering::SeqCst);
        assert_eq!(engine.next(&HashSet::new()), Some("a.conf".into()));
    }
}
