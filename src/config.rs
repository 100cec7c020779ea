//! Layered configuration (§6, §6a). Loaded from environment variables with
//! documented defaults; kept deliberately simple (no separate config-layering
//! crate) to match the dependency-light configuration style already present
//! in this codebase.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutosaveConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    pub batch_size: usize,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        AutosaveConfig {
            enabled: true,
            interval_ms: 5_000,
            batch_size: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bind_addr: String,
    pub default_row_count: u32,
    pub default_column_count: u32,
    pub autosave: AutosaveConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "127.0.0.1:8080".to_string(),
            default_row_count: crate::model::DEFAULT_ROW_COUNT,
            default_column_count: crate::model::DEFAULT_COLUMN_COUNT,
            autosave: AutosaveConfig::default(),
        }
    }
}

impl Config {
    /// Load from environment variables, falling back to defaults for
    /// anything unset. Parse failures are fatal at process start, so they
    /// are surfaced as `anyhow::Error` with context rather than entering
    /// the core's closed `CoreError` taxonomy.
    pub fn from_env() -> anyhow::Result<Config> {
        let mut config = Config::default();

        if let Ok(v) = std::env::var("SHEET_BIND_ADDR") {
            config.bind_addr = v;
        }
        if let Ok(v) = std::env::var("SHEET_DEFAULT_ROW_COUNT") {
            config.default_row_count = v
                .parse()
                .map_err(|e| anyhow::anyhow!("SHEET_DEFAULT_ROW_COUNT: {e}"))?;
        }
        if let Ok(v) = std::env::var("SHEET_DEFAULT_COLUMN_COUNT") {
            config.default_column_count = v
                .parse()
                .map_err(|e| anyhow::anyhow!("SHEET_DEFAULT_COLUMN_COUNT: {e}"))?;
        }
        if let Ok(v) = std::env::var("SHEET_AUTOSAVE_ENABLED") {
            config.autosave.enabled = v
                .parse()
                .map_err(|e| anyhow::anyhow!("SHEET_AUTOSAVE_ENABLED: {e}"))?;
        }
        if let Ok(v) = std::env::var("SHEET_AUTOSAVE_INTERVAL_MS") {
            config.autosave.interval_ms = v
                .parse()
                .map_err(|e| anyhow::anyhow!("SHEET_AUTOSAVE_INTERVAL_MS: {e}"))?;
        }
        if let Ok(v) = std::env::var("SHEET_AUTOSAVE_BATCH_SIZE") {
            config.autosave.batch_size = v
                .parse()
                .map_err(|e| anyhow::anyhow!("SHEET_AUTOSAVE_BATCH_SIZE: {e}"))?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert!(config.autosave.enabled);
        assert_eq!(config.default_row_count, 1000);
        assert_eq!(config.default_column_count, 26);
    }
}
