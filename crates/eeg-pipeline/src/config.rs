//! Pipeline configuration
//!
//! One serde document covering every stage. Missing sections fall back to
//! their defaults, so a config file only needs the values it changes.

use eeg_core::{EegError, EegResult};
use eeg_processing::{ArtifactConfig, FeatureConfig, IcaConfig, PreprocessConfig, PreprocessParams};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub loader: LoaderConfig,
    pub preprocess: PreprocessConfig,
    pub artifacts: ArtifactConfig,
    pub ica: IcaConfig,
    pub features: FeatureConfig,
    pub cache: CacheConfig,
    pub export: ExportConfig,
    pub recovery: RecoveryScope,
}

/// Recording loader settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Sampling rate for delimited files without a time column
    pub default_sampling_rate: Option<f64>,
}

/// Fingerprint cache capacities
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub recording_capacity: usize,
    pub bundle_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            recording_capacity: 16,
            bundle_capacity: 64,
        }
    }
}

/// Exporter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Report rendering attempts before giving up
    pub max_report_attempts: u32,
    /// Delay before the second attempt, doubled after each failure (ms)
    pub report_backoff_ms: u64,
    /// Samples drawn per trace in the signal figure
    pub max_plot_points: usize,
    /// Seconds of signal shown in the signal figure
    pub plot_seconds: f64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_report_attempts: 3,
            report_backoff_ms: 100,
            max_plot_points: 2000,
            plot_seconds: 10.0,
        }
    }
}

impl ExportConfig {
    /// Delay after failed attempt `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.report_backoff_ms.saturating_mul(factor))
    }
}

/// Which cached bundles may stand in for a failed extraction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryScope {
    /// Never substitute
    Disabled,
    /// Only a bundle extracted from the same source bytes
    #[default]
    SameSource,
    /// The most recently cached bundle of any source
    AnyRecent,
}

impl PipelineConfig {
    /// Defaults for 50 Hz mains regions
    pub fn mains_50hz() -> Self {
        Self::with_line_frequency(50.0)
    }

    /// Defaults for 60 Hz mains regions
    pub fn mains_60hz() -> Self {
        Self::with_line_frequency(60.0)
    }

    fn with_line_frequency(notch_freq: f64) -> Self {
        let mut config = Self::default();
        config.preprocess.params.notch_freq = notch_freq;
        config
    }

    /// Default filter parameters for a run
    pub fn params(&self) -> PreprocessParams {
        self.preprocess.params
    }

    pub fn validate(&self) -> EegResult<()> {
        if let Some(rate) = self.loader.default_sampling_rate {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(EegError::configuration(format!(
                    "default sampling rate must be positive, got {}",
                    rate
                )));
            }
        }
        self.preprocess.validate()?;
        self.artifacts.validate()?;
        self.ica.validate()?;
        self.features.validate()?;

        if self.cache.recording_capacity == 0 || self.cache.bundle_capacity == 0 {
            return Err(EegError::configuration("cache capacities must be at least 1"));
        }
        if self.export.max_report_attempts == 0 {
            return Err(EegError::configuration("max_report_attempts must be at least 1"));
        }
        if self.export.max_plot_points < 2 {
            return Err(EegError::configuration("max_plot_points must be at least 2"));
        }
        if !(self.export.plot_seconds > 0.0) {
            return Err(EegError::configuration("plot_seconds must be positive"));
        }
        Ok(())
    }

    /// Export configuration to JSON
    pub fn to_json(&self) -> EegResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| EegError::configuration(format!("Failed to serialize configuration: {}", e)))
    }

    /// Import configuration from JSON
    pub fn from_json(json: &str) -> EegResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| EegError::configuration(format!("Failed to deserialize configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> EegResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            EegError::configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }
}
