// src/config.rs
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{AppError, Result};

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:3000/api";
pub const DEFAULT_TICK_RATE_MS: u64 = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { base_url: DEFAULT_API_URL.to_string(), token: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub tick_rate_ms: u64,
    pub expand_all: bool, // open every department on first load
}

impl Default for UiConfig {
    fn default() -> Self {
        Self { tick_rate_ms: DEFAULT_TICK_RATE_MS, expand_all: false }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub year_id: Option<i64>,
    pub log_file: Option<PathBuf>,
    pub ui: UiConfig,
}

impl Config {
    /// Loads the TOML config and applies environment overrides.
    ///
    /// An explicit `path` must exist. Without one, the per-user config file is
    /// read when present and defaults are used otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => match Self::default_path() {
                Some(p) if p.exists() => Self::from_file(&p)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("expense-budget").join("config.toml"))
    }

    fn from_file(path: &Path) -> Result<Self> {
        log::info!("Loading config from {}", path.display());
        let content = fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| AppError::Config(e.to_string()))
    }

    /// `BUDGET_API_URL`, `BUDGET_API_TOKEN`, `BUDGET_YEAR_ID` and
    /// `BUDGET_LOG_FILE` override the file values.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("BUDGET_API_URL").filter(|v| !v.trim().is_empty()) {
            self.api.base_url = url;
        }
        if let Some(token) = lookup("BUDGET_API_TOKEN").filter(|v| !v.trim().is_empty()) {
            self.api.token = Some(token);
        }
        if let Some(year) = lookup("BUDGET_YEAR_ID") {
            let year = year
                .trim()
                .parse::<i64>()
                .map_err(|_| AppError::Config(format!("BUDGET_YEAR_ID must be an integer, got '{year}'")))?;
            self.year_id = Some(year);
        }
        if let Some(file) = lookup("BUDGET_LOG_FILE").filter(|v| !v.trim().is_empty()) {
            self.log_file = Some(PathBuf::from(file));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.api.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(AppError::Config(format!(
                "api.base_url must start with http:// or https://, got '{url}'"
            )));
        }
        if self.ui.tick_rate_ms == 0 {
            return Err(AppError::Config("ui.tick_rate_ms must be greater than 0".into()));
        }
        Ok(())
    }
}
