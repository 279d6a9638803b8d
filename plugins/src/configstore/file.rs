use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fairprice_core::api::{ConfigRecord, ConfigSource, ConfigStore, ConfigStoreConfig};
use fairprice_core::store::detect_provider_hint;

const METADATA_FILE: &str = "configs.json";
const USER_ID_PREFIX: &str = "user:";
const MAX_DISPLAY_NAME: usize = 80;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct StoreMetadata {
    #[serde(default)]
    configs: Vec<ConfigMetadata>,
    #[serde(default)]
    baseline_config_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ConfigMetadata {
    id: String,
    display_name: String,
    provider_hint: Option<String>,
    enabled: bool,
    created_at: String,
}

/// File-backed tunnel-config inventory: one metadata JSON plus one payload
/// file per imported config under the app data dir.
pub struct FileConfigStore {
    dir: PathBuf,
    // Serializes metadata read-modify-write cycles.
    lock: Mutex<()>,
}

impl FileConfigStore {
    pub fn new(cfg: &ConfigStoreConfig) -> anyhow::Result<Self> {
        let dir = match &cfg.data_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .ok_or_else(|| anyhow::anyhow!("no platform data directory available"))?
                .join("fairprice")
                .join("vpn_user_configs"),
        };
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    pub fn at_dir(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        Self::new(&ConfigStoreConfig {
            data_dir: Some(dir.into()),
        })
    }

    fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    fn payload_path(&self, config_id: &str) -> PathBuf {
        // Ids carry a "user:" prefix; keep file names portable.
        self.dir.join(format!("{}.conf", config_id.replace(':', "_")))
    }

    /// Unreadable or corrupt metadata degrades to an empty inventory rather
    /// than failing listing.
    fn read_metadata(&self) -> StoreMetadata {
        let path = self.metadata_path();
        let Ok(payload) = fs::read_to_string(&path) else {
            return StoreMetadata::default();
        };
        serde_json::from_str(&payload).unwrap_or_else(|err| {
            tracing::warn!(
                target: "fairprice.store",
                path = %path.display(),
                error = %err,
                "config store metadata unreadable; treating as empty"
            );
            StoreMetadata::default()
        })
    }

    fn write_metadata(&self, metadata: &StoreMetadata) -> anyhow::Result<()> {
        let payload = serde_json::to_string_pretty(metadata)?;
        fs::write(self.metadata_path(), payload)?;
        Ok(())
    }

    fn record_from(meta: &ConfigMetadata) -> ConfigRecord {
        ConfigRecord {
            id: meta.id.clone(),
            source: ConfigSource::User,
            display_name: meta.display_name.clone(),
            provider_hint: meta.provider_hint.clone(),
            enabled: meta.enabled,
        }
    }

    fn validate_config_text(raw: &str) -> anyhow::Result<()> {
        let has_interface = raw.lines().any(|l| l.trim().eq_ignore_ascii_case("[Interface]"));
        let has_peer = raw.lines().any(|l| l.trim().eq_ignore_ascii_case("[Peer]"));
        if !has_interface || !has_peer {
            anyhow::bail!("not a valid WireGuard config: missing [Interface]/[Peer] section");
        }
        Ok(())
    }

    /// Content-identical import returns the existing record instead of a
    /// duplicate.
    fn find_existing(&self, metadata: &StoreMetadata, normalized: &str) -> Option<ConfigRecord> {
        for meta in &metadata.configs {
            if let Ok(existing) = fs::read_to_string(self.payload_path(&meta.id)) {
                if existing == normalized {
                    return Some(Self::record_from(meta));
                }
            }
        }
        None
    }
}

impl ConfigStore for FileConfigStore {
    fn list_user_configs(&self) -> Vec<ConfigRecord> {
        let mut configs = self.read_metadata().configs;
        configs.sort_by_key(|meta| meta.display_name.to_lowercase());
        configs.iter().map(Self::record_from).collect()
    }

    fn read_user_config_text(&self, config_id: &str) -> anyhow::Result<String> {
        if !config_id.starts_with(USER_ID_PREFIX) {
            anyhow::bail!("config id is not a user config id: {config_id}");
        }
        let metadata = self.read_metadata();
        if !metadata.configs.iter().any(|meta| meta.id == config_id) {
            anyhow::bail!("user tunnel config not found: {config_id}");
        }
        Ok(fs::read_to_string(self.payload_path(config_id))?)
    }

    fn import_user_config(
        &self,
        display_name: &str,
        raw_config_text: &str,
    ) -> anyhow::Result<ConfigRecord> {
        Self::validate_config_text(raw_config_text)?;
        let normalized = raw_config_text.trim().to_string();

        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut metadata = self.read_metadata();

        if let Some(existing) = self.find_existing(&metadata, &normalized) {
            return Ok(existing);
        }

        let id = format!("{USER_ID_PREFIX}{}", Uuid::new_v4());
        let safe_name = if display_name.trim().is_empty() {
            "Imported VPN Config".to_string()
        } else {
            display_name.chars().take(MAX_DISPLAY_NAME).collect()
        };
        let provider_hint = detect_provider_hint(&safe_name, &normalized).map(str::to_string);

        fs::write(self.payload_path(&id), &normalized)?;
        metadata.configs.push(ConfigMetadata {
            id: id.clone(),
            display_name: safe_name.clone(),
            provider_hint: provider_hint.clone(),
            enabled: true,
            created_at: chrono::Utc::now().to_rfc3339(),
        });
        if metadata.baseline_config_id.is_none() {
            metadata.baseline_config_id = Some(id.clone());
        }
        self.write_metadata(&metadata)?;

        tracing::info!(
            target: "fairprice.store",
            config = %id,
            provider = provider_hint.as_deref().unwrap_or("unknown"),
            "imported user tunnel config"
        );
        Ok(ConfigRecord {
            id,
            source: ConfigSource::User,
            display_name: safe_name,
            provider_hint,
            enabled: true,
        })
    }

    fn set_user_config_enabled(&self, config_id: &str, enabled: bool) -> anyhow::Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut metadata = self.read_metadata();
        let Some(meta) = metadata.configs.iter_mut().find(|meta| meta.id == config_id) else {
            anyhow::bail!("user tunnel config not found: {config_id}");
        };
        meta.enabled = enabled;
        self.write_metadata(&metadata)
    }

    fn baseline_config_id(&self) -> Option<String> {
        self.read_metadata().baseline_config_id
    }

    fn set_baseline_config_id(&self, config_id: &str) -> anyhow::Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut metadata = self.read_metadata();
        metadata.baseline_config_id = Some(config_id.to_string());
        self.write_metadata(&metadata)
    }
}
