//! Configuration parsing and structures

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::env::expand_env_vars;
use crate::probe::ProbeKind;
use crate::validator::ValidationPolicy;

/// Listing prefix used when a scenario does not name one
pub const DEFAULT_SCENARIO_PREFIX: &str = "additional/";

// =============================================================================
// Raw Config (Deserialized from YAML)
// =============================================================================

/// Raw configuration as deserialized from YAML.
/// This is converted to `Config` via `resolve()`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Object store connection
    pub storage: StorageConfig,

    /// Validation defaults shared by every scenario
    #[serde(default)]
    pub validation: RawValidationConfig,

    /// Optional CSV report destination
    pub report: Option<ReportConfig>,

    /// Scenarios to run, in order
    pub scenarios: Vec<RawScenarioConfig>,
}

/// Validation thresholds; every field is optional so scenarios can
/// override only what they need
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawValidationConfig {
    /// Successful observations needed per probe
    pub required_successes: Option<u32>,

    /// Upper bound on rounds
    pub max_attempts: Option<u32>,

    /// Pause between rounds (e.g. "1s", "500ms")
    #[serde(default)]
    #[serde(with = "humantime_serde")]
    pub delay: Option<Duration>,
}

/// Raw scenario before defaults are applied
#[derive(Debug, Clone, Deserialize)]
pub struct RawScenarioConfig {
    /// Scenario label, written to report rows
    pub name: String,

    /// Prefix the workload is uploaded under
    pub prefix: Option<String>,

    /// Number of objects to upload
    pub quantity: usize,

    /// Concurrent upload/delete workers
    pub workers: Option<usize>,

    /// Probes to run; all four when omitted
    pub probes: Option<Vec<ProbeKind>>,

    /// Per-scenario validation overrides
    pub validation: Option<RawValidationConfig>,

    /// Delete the workload afterwards
    pub cleanup: Option<bool>,
}

// =============================================================================
// Resolved Config (Ready for use)
// =============================================================================

/// Top-level configuration (resolved from RawConfig)
#[derive(Debug, Clone)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Object store connection
    pub storage: StorageConfig,

    /// Report destination, if any
    pub report: Option<ReportConfig>,

    /// Scenarios (fully resolved)
    pub scenarios: Vec<ScenarioConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// S3 connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Bucket under test
    pub bucket: String,

    /// AWS region
    pub region: Option<String>,

    /// Custom endpoint URL (for S3-compatible stores)
    pub endpoint: Option<String>,

    /// Force path-style addressing (for MinIO, LocalStack, etc.)
    #[serde(default)]
    pub force_path_style: bool,

    /// Named AWS profile; also used as the profile column in reports
    pub profile: Option<String>,

    /// Static access key (requires `secret_key`)
    pub access_key: Option<String>,

    /// Static secret key (requires `access_key`)
    pub secret_key: Option<String>,

    /// Per-request timeout applied by the client
    #[serde(default = "default_request_timeout")]
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

impl StorageConfig {
    /// Label for the profile/region report column
    pub fn profile_label(&self) -> String {
        self.profile
            .clone()
            .or_else(|| self.region.clone())
            .unwrap_or_else(|| "default".to_string())
    }
}

/// CSV report settings
#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    /// File rows are appended to
    pub path: PathBuf,
}

/// Scenario configuration (resolved)
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    pub name: String,
    pub prefix: String,
    pub quantity: usize,
    pub workers: usize,
    pub probes: Vec<ProbeKind>,
    pub policy: ValidationPolicy,
    pub cleanup: bool,
}

// =============================================================================
// Resolution Logic
// =============================================================================

impl RawValidationConfig {
    /// Overlay the fields that are set onto `base`
    fn apply(&self, base: ValidationPolicy) -> ValidationPolicy {
        ValidationPolicy {
            required_successes: self.required_successes.unwrap_or(base.required_successes),
            max_attempts: self.max_attempts.unwrap_or(base.max_attempts),
            delay: self.delay.unwrap_or(base.delay),
        }
    }
}

impl RawConfig {
    /// Resolve raw config into final config by merging scenario overrides with defaults
    pub fn resolve(self) -> Result<Config, ConfigError> {
        let RawConfig {
            logging,
            storage,
            validation,
            report,
            scenarios,
        } = self;

        let defaults = validation.apply(ValidationPolicy::default());

        let scenarios = scenarios
            .into_iter()
            .map(|raw| Self::resolve_scenario(&defaults, raw))
            .collect();

        Ok(Config {
            logging,
            storage,
            report,
            scenarios,
        })
    }

    fn resolve_scenario(defaults: &ValidationPolicy, raw: RawScenarioConfig) -> ScenarioConfig {
        let policy = match &raw.validation {
            Some(overrides) => overrides.apply(defaults.clone()),
            None => defaults.clone(),
        };

        ScenarioConfig {
            name: raw.name,
            prefix: raw
                .prefix
                .unwrap_or_else(|| DEFAULT_SCENARIO_PREFIX.to_string()),
            quantity: raw.quantity,
            workers: raw.workers.unwrap_or(1),
            probes: raw.probes.unwrap_or_else(|| ProbeKind::ALL.to_vec()),
            policy,
            cleanup: raw.cleanup.unwrap_or(true),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.clone(), e.to_string()))?;

        Self::from_str(&content)
    }

    /// Parse configuration from a YAML string, expanding `${VAR}` references first
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(content)?;
        let raw: RawConfig =
            serde_yaml::from_str(&expanded).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        raw.resolve()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.bucket.is_empty() {
            return Err(ConfigError::ValidationError(
                "storage.bucket cannot be empty".to_string(),
            ));
        }

        if self.storage.access_key.is_some() != self.storage.secret_key.is_some() {
            return Err(ConfigError::ValidationError(
                "storage.access_key and storage.secret_key must be set together".to_string(),
            ));
        }

        if self.scenarios.is_empty() {
            return Err(ConfigError::ValidationError(
                "At least one scenario is required".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for scenario in &self.scenarios {
            if !names.insert(scenario.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate scenario name: {}",
                    scenario.name
                )));
            }
            scenario.validate()?;
        }

        Ok(())
    }
}

impl ScenarioConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: &str| {
            Err(ConfigError::ValidationError(format!(
                "Scenario {}: {}",
                self.name, msg
            )))
        };

        if self.quantity == 0 {
            return fail("quantity must be at least 1");
        }
        if self.workers == 0 {
            return fail("workers must be at least 1");
        }
        if self.policy.required_successes == 0 {
            return fail("required_successes must be at least 1");
        }
        if self.policy.max_attempts == 0 {
            return fail("max_attempts must be at least 1");
        }
        if self.probes.is_empty() {
            return fail("at least one probe is required");
        }

        let mut seen = HashSet::new();
        for kind in &self.probes {
            if !seen.insert(*kind) {
                return fail(&format!("probe {} listed twice", kind));
            }
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}
