//! Engine configuration: TOML file plus environment overrides

use crate::attention::{AttentionParams, DEFAULT_PRIOR_STRENGTH, DEFAULT_TEMPERATURE, DEFAULT_TOP_K};
use crate::contributions::DEFAULT_TOP_N;
use crate::errors::{Result, RiskError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Risk engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Model artifact locations
    pub model: ModelConfig,
    /// Explanation sizes and attention tuning
    pub explain: ExplainConfig,
    /// Batch pipeline behaviour
    pub batch: BatchConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
    pub scaler_path: Option<PathBuf>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models/risk_model.json"),
            scaler_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExplainConfig {
    /// Entries in each of `top_positive` / `top_negative`
    pub top_n: usize,
    /// Entries in `top_attended_features`
    pub top_k: usize,
    pub temperature: f64,
    pub prior_strength: f64,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            top_k: DEFAULT_TOP_K,
            temperature: DEFAULT_TEMPERATURE,
            prior_strength: DEFAULT_PRIOR_STRENGTH,
        }
    }
}

impl ExplainConfig {
    pub fn attention_params(&self) -> AttentionParams {
        AttentionParams {
            top_k: self.top_k,
            temperature: self.temperature,
            prior_strength: self.prior_strength,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchConfig {
    /// Score rows on the rayon thread pool
    pub parallel: bool,
    pub include_contributions: bool,
    pub include_attention: bool,
    /// Columns searched, in order, for a row's region name
    pub id_columns: Vec<String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            include_contributions: false,
            include_attention: false,
            id_columns: vec!["region".into(), "county_name".into(), "区县".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| RiskError::Config(format!("Failed to parse {}: {e}", path.display())))
    }

    /// Save configuration as pretty TOML
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| RiskError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Apply `RISK_ENGINE_*` environment variables
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup; unparsable values are config errors
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("RISK_ENGINE_MODEL_PATH") {
            self.model.path = PathBuf::from(val);
        }
        if let Some(val) = lookup("RISK_ENGINE_SCALER_PATH") {
            self.model.scaler_path = (!val.is_empty()).then(|| PathBuf::from(val));
        }
        if let Some(val) = lookup("RISK_ENGINE_TOP_N") {
            self.explain.top_n = parse_override("RISK_ENGINE_TOP_N", &val)?;
        }
        if let Some(val) = lookup("RISK_ENGINE_TOP_K") {
            self.explain.top_k = parse_override("RISK_ENGINE_TOP_K", &val)?;
        }
        if let Some(val) = lookup("RISK_ENGINE_PARALLEL") {
            self.batch.parallel = parse_override("RISK_ENGINE_PARALLEL", &val)?;
        }
        if let Some(val) = lookup("RISK_ENGINE_LOG_LEVEL") {
            self.logging.level = val;
        }
        Ok(())
    }

    /// Reject unusable values and return warnings for questionable ones
    pub fn validate(&self) -> Result<Vec<String>> {
        if self.explain.top_n == 0 {
            return Err(RiskError::Config("explain.top_n must be at least 1".into()));
        }
        if self.explain.top_k == 0 {
            return Err(RiskError::Config("explain.top_k must be at least 1".into()));
        }
        if !self.explain.temperature.is_finite() || self.explain.temperature <= 0.0 {
            return Err(RiskError::Config(format!(
                "explain.temperature must be positive, got {}",
                self.explain.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.explain.prior_strength) {
            return Err(RiskError::Config(format!(
                "explain.prior_strength must be within [0, 1], got {}",
                self.explain.prior_strength
            )));
        }

        let mut warnings = Vec::new();
        if self.model.path.as_os_str().is_empty() {
            warnings.push("Model path is empty".to_string());
        }
        if self.explain.temperature > 10.0 {
            warnings.push("Attention temperature above 10 makes weights nearly uniform".to_string());
        }
        if self.explain.top_n > 50 || self.explain.top_k > 50 {
            warnings.push("Top lists longer than 50 entries are hard to review".to_string());
        }
        if self.batch.id_columns.is_empty() {
            warnings.push("No id columns configured, batch rows will be named by position".to_string());
        }

        if warnings.is_empty() {
            info!("Configuration validation passed");
        } else {
            warn!("Configuration validation warnings: {:?}", warnings);
        }
        Ok(warnings)
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| RiskError::Config(format!("{key} has invalid value `{value}`")))
}
