//! Tunnel-config inventory: bundled configs ship with the app, user configs
//! are imported at runtime. The rotation ring and the session-close baseline
//! revert both read from here.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigSource {
    Bundled,
    User,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConfigRecord {
    pub id: String,
    pub source: ConfigSource,
    pub display_name: String,
    pub provider_hint: Option<String>,
    pub enabled: bool,
}

/// Inventory of user-imported tunnel configs plus the baseline-config
/// selection. Implementations own durability; all operations are cheap
/// metadata reads/writes.
pub trait ConfigStore: Send + Sync {
    fn list_user_configs(&self) -> Vec<ConfigRecord>;

    fn list_enabled_user_configs(&self) -> Vec<ConfigRecord> {
        self.list_user_configs()
            .into_iter()
            .filter(|c| c.enabled)
            .collect()
    }

    fn read_user_config_text(&self, config_id: &str) -> anyhow::Result<String>;

    fn import_user_config(
        &self,
        display_name: &str,
        raw_config_text: &str,
    ) -> anyhow::Result<ConfigRecord>;

    fn set_user_config_enabled(&self, config_id: &str, enabled: bool) -> anyhow::Result<()>;

    fn baseline_config_id(&self) -> Option<String>;

    fn set_baseline_config_id(&self, config_id: &str) -> anyhow::Result<()>;
}

/// Store for hosts without an inventory: no user configs, no baseline
/// selection, imports rejected.
pub struct NullConfigStore;

impl ConfigStore for NullConfigStore {
    fn list_user_configs(&self) -> Vec<ConfigRecord> {
        Vec::new()
    }

    fn read_user_config_text(&self, _config_id: &str) -> anyhow::Result<String> {
        Err(anyhow::anyhow!("user tunnel config store unavailable"))
    }

    fn import_user_config(
        &self,
        _display_name: &str,
        _raw_config_text: &str,
    ) -> anyhow::Result<ConfigRecord> {
        Err(anyhow::anyhow!("user tunnel config store unavailable"))
    }

    fn set_user_config_enabled(&self, _config_id: &str, _enabled: bool) -> anyhow::Result<()> {
        Ok(())
    }

    fn baseline_config_id(&self) -> Option<String> {
        None
    }

    fn set_baseline_config_id(&self, _config_id: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

const PROVIDER_HINTS: &[(&str, &str)] = &[
    ("proton", "proton"),
    ("surfshark", "surfshark"),
    ("mullvad", "mullvad"),
    ("nord", "nordvpn"),
];

/// Best-effort provider detection from the display name and the head of the
/// config text.
pub fn detect_provider_hint(display_name: &str, raw_config_text: &str) -> Option<&'static str> {
    let head: String = raw_config_text.chars().take(300).collect();
    let combined = format!("{display_name}\n{head}").to_lowercase();
    PROVIDER_HINTS
        .iter()
        .find(|(needle, _)| combined.contains(needle))
        .map(|(_, hint)| *hint)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn provider_hint_matches_name_or_config_head() {
        assert_eq!(detect_provider_hint("ProtonVPN US-UT#42", ""), Some("proton"));
        assert_eq!(
            detect_provider_hint("imported", "[Interface]\n# Mullvad wg config"),
            Some("mullvad")
        );
        assert_eq!(detect_provider_hint("NordLynx home", ""), Some("nordvpn"));
        assert_eq!(detect_provider_hint("office", "[Interface]"), None);
    }
}
