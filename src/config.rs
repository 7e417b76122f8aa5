use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatasetConfig {
    pub path: PathBuf,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data_processed/dataset_final_simple.csv"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DisplayConfig {
    pub currency_symbol: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            currency_symbol: "R$".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
        }
    }
}

const DEFAULT_CONFIG: &str = r#"
[dataset]
path = "data_processed/dataset_final_simple.csv"

[display]
currency_symbol = "R$"

[log]
filter = "warn"
"#;

const LOCAL_CONFIG: &str = "dashboard.toml";

/// Loads configuration from an explicit file, then `dashboard.toml` in the
/// working directory, then the embedded default.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<DashboardConfig> {
    if let Some(path) = explicit {
        return read_config(path);
    }

    let local = Path::new(LOCAL_CONFIG);
    if local.exists() {
        return read_config(local);
    }

    Ok(toml::from_str(DEFAULT_CONFIG)?)
}

fn read_config(path: &Path) -> anyhow::Result<DashboardConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("invalid config {}", path.display()))
}
