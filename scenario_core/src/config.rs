use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sampling::SamplingMode;

pub const BUILTIN_ENGINE_CONFIG: &str = include_str!("data/engine_config.json");
pub const ENGINE_CONFIG_ENV: &str = "SCENARIO_ENGINE_CONFIG_PATH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    travel_mode: String,
    sampling_mode: SamplingMode,
    iqr_divisor: f64,
    baseline_population_column: String,
    api_seed: u64,
}

impl EngineConfig {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            serde_json::from_str(BUILTIN_ENGINE_CONFIG)
                .expect("builtin engine config should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, EngineConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, EngineConfigError> {
        let contents =
            fs::read_to_string(path).map_err(|source| EngineConfigError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })?;
        EngineConfig::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), EngineConfigError> {
        if !self.iqr_divisor.is_finite() || self.iqr_divisor <= 0.0 {
            return Err(EngineConfigError::Invalid {
                field: "iqr_divisor",
                reason: format!("must be positive, got {}", self.iqr_divisor),
            });
        }
        if self.travel_mode.trim().is_empty() {
            return Err(EngineConfigError::Invalid {
                field: "travel_mode",
                reason: "must not be empty".to_string(),
            });
        }
        if self.baseline_population_column.trim().is_empty() {
            return Err(EngineConfigError::Invalid {
                field: "baseline_population_column",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn travel_mode(&self) -> &str {
        &self.travel_mode
    }

    pub fn sampling_mode(&self) -> SamplingMode {
        self.sampling_mode
    }

    /// Spread of sampled features is `iqr / iqr_divisor`.
    pub fn iqr_divisor(&self) -> f64 {
        self.iqr_divisor
    }

    /// Population label of the persisted default table.
    pub fn baseline_population_column(&self) -> &str {
        &self.baseline_population_column
    }

    /// Seed of one-shot evaluations when the caller gives none.
    pub fn api_seed(&self) -> u64 {
        self.api_seed
    }

    pub fn with_travel_mode(mut self, mode: impl Into<String>) -> Self {
        self.travel_mode = mode.into();
        self
    }

    pub fn with_sampling_mode(mut self, mode: SamplingMode) -> Self {
        self.sampling_mode = mode;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            travel_mode: "walk".to_string(),
            sampling_mode: SamplingMode::SharedDraw,
            iqr_divisor: 5.0,
            baseline_population_column: "population_estimate".to_string(),
            api_seed: 42,
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineConfigError {
    #[error("failed to parse engine config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read engine config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid engine config field '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct EngineConfigMetadata {
    path: Option<PathBuf>,
}

impl EngineConfigMetadata {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// File the config came from; `None` for the builtin.
    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }
}

pub fn load_engine_config_from_env() -> (Arc<EngineConfig>, EngineConfigMetadata) {
    let Some(path) = env::var(ENGINE_CONFIG_ENV).ok().map(PathBuf::from) else {
        tracing::info!(target: "scenario::config", "engine_config.loaded=builtin");
        return (EngineConfig::builtin(), EngineConfigMetadata::new(None));
    };

    match EngineConfig::from_file(&path) {
        Ok(config) => {
            tracing::info!(
                target: "scenario::config",
                path = %path.display(),
                "engine_config.loaded=file"
            );
            (Arc::new(config), EngineConfigMetadata::new(Some(path)))
        }
        Err(err) => {
            tracing::warn!(
                target: "scenario::config",
                path = %path.display(),
                error = %err,
                "engine_config.load_failed"
            );
            tracing::info!(target: "scenario::config", "engine_config.loaded=builtin");
            (EngineConfig::builtin(), EngineConfigMetadata::new(None))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_matches_defaults() {
        assert_eq!(*EngineConfig::builtin(), EngineConfig::default());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = EngineConfig::from_json_str(r#"{"sampling_mode": "independent"}"#)
            .expect("config");
        assert_eq!(config.sampling_mode(), SamplingMode::Independent);
        assert_eq!(config.travel_mode(), "walk");
        assert_eq!(config.api_seed(), 42);
    }

    #[test]
    fn non_positive_divisor_is_rejected() {
        let err = EngineConfig::from_json_str(r#"{"iqr_divisor": 0.0}"#).unwrap_err();
        assert!(matches!(
            err,
            EngineConfigError::Invalid {
                field: "iqr_divisor",
                ..
            }
        ));
    }

    #[test]
    fn read_failures_carry_the_path() {
        let err = EngineConfig::from_file(Path::new("/nonexistent/engine_config.json"))
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/engine_config.json"));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("engine_config.json");
        fs::write(&path, r#"{"travel_mode": "bike", "api_seed": 7}"#).expect("write");
        let config = EngineConfig::from_file(&path).expect("config");
        assert_eq!(config.travel_mode(), "bike");
        assert_eq!(config.api_seed(), 7);
    }
}
