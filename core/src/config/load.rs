use std::path::Path;

use super::types::AppConfig;

pub fn load_default() -> anyhow::Result<AppConfig> {
    let mut cfg: AppConfig = if Path::new("config.toml").exists() {
        let s = std::fs::read_to_string("config.toml")?;
        toml::from_str::<AppConfig>(&s)?
    } else {
        AppConfig::default()
    };

    if let Ok(v) = std::env::var("FAIRPRICE_TELEMETRY_URL") {
        if !v.trim().is_empty() {
            cfg.telemetry.base_url = v;
        }
    }
    if let Ok(v) = std::env::var("FAIRPRICE_TELEMETRY_API_KEY") {
        if !v.trim().is_empty() {
            cfg.telemetry.api_key = v;
        }
    }
    if let Ok(v) = std::env::var("FAIRPRICE_BASELINE_CONFIG") {
        if !v.trim().is_empty() {
            cfg.check.default_baseline_config = v;
        }
    }

    Ok(cfg)
}
