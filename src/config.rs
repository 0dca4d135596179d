//! # Engine Configuration
//!
//! Environment-aware configuration loading for the chunked-execution engine.
//! Values are layered: built-in defaults, then an optional base YAML file,
//! then an optional per-environment overlay, then `GAPFILL_*` environment
//! variables. Environment detection checks `GAPFILL_ENV` then `APP_ENV` and
//! falls back to `development`.

use crate::constants::defaults;
use crate::error::{GapfillError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use tracing::{debug, warn};

/// Runtime knobs for the chunked processor, scheduler, and retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Wall-clock budget per invocation, in milliseconds
    pub time_budget_ms: u64,

    /// Optional cap on units processed per invocation (the chunk-row limit)
    pub max_units_per_invocation: Option<u32>,

    /// Re-invocation delay after a budget or unit-cap pause, in minutes
    pub resume_delay_minutes: u32,

    /// Re-invocation delay after an upstream capacity pause, in minutes
    pub capacity_resume_delay_minutes: u32,

    /// Pacing sleep between successive units, in milliseconds (0 disables)
    pub unit_pacing_ms: u64,

    /// Error-message substrings classified as upstream capacity exhaustion.
    /// Matched case-insensitively; this is deployment configuration, not
    /// hardcoded policy, because the wording belongs to the upstream service.
    pub quota_signatures: Vec<String>,

    /// Broadcast capacity of the lifecycle event channel
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            time_budget_ms: defaults::TIME_BUDGET_MS,
            max_units_per_invocation: None,
            resume_delay_minutes: defaults::RESUME_DELAY_MINUTES,
            capacity_resume_delay_minutes: defaults::CAPACITY_RESUME_DELAY_MINUTES,
            unit_pacing_ms: defaults::UNIT_PACING_MS,
            quota_signatures: defaults::QUOTA_SIGNATURES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            event_channel_capacity: defaults::EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Load configuration with environment auto-detection from the default
    /// `config/` directory.
    pub fn load() -> Result<Self> {
        Self::load_from_directory(Path::new("config"), &detect_environment())
    }

    /// Load configuration from a specific directory with an explicit
    /// environment. Useful for testing without touching process-global
    /// environment variables.
    pub fn load_from_directory(config_dir: &Path, environment: &str) -> Result<Self> {
        debug!(
            environment = %environment,
            config_dir = %config_dir.display(),
            "Loading engine configuration"
        );

        let base_defaults = Config::try_from(&EngineConfig::default())?;

        let settings = Config::builder()
            .add_source(base_defaults)
            .add_source(File::from(config_dir.join("gapfill")).required(false))
            .add_source(File::from(config_dir.join("gapfill").join(environment)).required(false))
            .add_source(
                Environment::with_prefix("GAPFILL")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("quota_signatures"),
            )
            .build()?;

        let loaded: EngineConfig = settings.try_deserialize()?;
        loaded.validate()?;

        debug!(
            time_budget_ms = loaded.time_budget_ms,
            resume_delay_minutes = loaded.resume_delay_minutes,
            capacity_resume_delay_minutes = loaded.capacity_resume_delay_minutes,
            "Engine configuration loaded"
        );

        Ok(loaded)
    }

    /// Load configuration, falling back to built-in defaults if loading fails.
    /// Keeps long-running deployments alive through a bad config push.
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Configuration loading failed, using built-in defaults");
                Self::default()
            }
        }
    }

    /// Validate loaded values against the engine's operating bounds.
    pub fn validate(&self) -> Result<()> {
        let delay_range = defaults::MIN_TRIGGER_DELAY_MINUTES..=defaults::MAX_TRIGGER_DELAY_MINUTES;

        if !delay_range.contains(&self.resume_delay_minutes) {
            return Err(GapfillError::Configuration(format!(
                "resume_delay_minutes must be within {delay_range:?}, got {}",
                self.resume_delay_minutes
            )));
        }
        if !delay_range.contains(&self.capacity_resume_delay_minutes) {
            return Err(GapfillError::Configuration(format!(
                "capacity_resume_delay_minutes must be within {delay_range:?}, got {}",
                self.capacity_resume_delay_minutes
            )));
        }
        if self.quota_signatures.is_empty() {
            return Err(GapfillError::Configuration(
                "quota_signatures must not be empty".to_string(),
            ));
        }
        if self.max_units_per_invocation == Some(0) {
            return Err(GapfillError::Configuration(
                "max_units_per_invocation must be at least 1 when set".to_string(),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(GapfillError::Configuration(
                "event_channel_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Detect the current environment from environment variables.
pub fn detect_environment() -> String {
    env::var("GAPFILL_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}
