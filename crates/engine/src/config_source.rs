//! Loading engine configuration from a JSON file plus environment overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use invintel_core::{EngineConfig, EngineError, EngineResult};

use crate::collaborators::ConfigSource;

/// Path of the JSON configuration file.
pub const CONFIG_PATH_ENV: &str = "INVINTEL_CONFIG";
pub const LEAD_TIME_DAYS_ENV: &str = "INVINTEL_LEAD_TIME_DAYS";
pub const DPDU_DEMAND_WEIGHT_ENV: &str = "INVINTEL_DPDU_DEMAND_WEIGHT";
pub const DPDU_URGENCY_WEIGHT_ENV: &str = "INVINTEL_DPDU_URGENCY_WEIGHT";

/// Reads configuration on every fetch, so edits take effect on the next run.
///
/// Without a path the defaults are used. Environment overrides are applied
/// before validation either way.
#[derive(Debug, Clone, Default)]
pub struct FileConfigSource {
    path: Option<PathBuf>,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Path from `INVINTEL_CONFIG`, if set.
    pub fn from_env() -> Self {
        Self {
            path: std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn load(&self) -> Result<EngineConfig> {
        let mut config = match &self.path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                parse_config(&raw).with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => EngineConfig::default(),
        };

        apply_overrides(&mut config, |key| std::env::var(key).ok())?;
        config.validate()?;

        info!(
            path = ?self.path,
            lead_time_days = config.lead_time.lead_time_days,
            dpdu_demand_weight = config.dpdu.demand_weight,
            "engine configuration loaded"
        );
        Ok(config)
    }
}

impl ConfigSource for FileConfigSource {
    fn fetch_config(&self) -> EngineResult<EngineConfig> {
        self.load().map_err(|e| match e.downcast_ref::<EngineError>() {
            Some(engine) => engine.clone(),
            None => EngineError::invalid_config(format!("{e:#}")),
        })
    }
}

pub fn parse_config(raw: &str) -> Result<EngineConfig> {
    Ok(serde_json::from_str(raw)?)
}

/// Apply the environment overrides found through `lookup`.
pub fn apply_overrides(
    config: &mut EngineConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    let parse = |key: &str| -> Result<Option<f64>> {
        match lookup(key) {
            Some(raw) => {
                let v = raw
                    .trim()
                    .parse::<f64>()
                    .with_context(|| format!("{key} must be a number (got {raw:?})"))?;
                Ok(Some(v))
            }
            None => Ok(None),
        }
    };

    if let Some(v) = parse(LEAD_TIME_DAYS_ENV)? {
        config.lead_time.lead_time_days = v;
    }
    if let Some(v) = parse(DPDU_DEMAND_WEIGHT_ENV)? {
        config.dpdu.demand_weight = v;
    }
    if let Some(v) = parse(DPDU_URGENCY_WEIGHT_ENV)? {
        config.dpdu.urgency_weight = v;
    }
    Ok(())
}
