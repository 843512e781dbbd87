//! Configuration for preprocessing and feature extraction

use eeg_core::{EegError, EegResult};
use serde::{Deserialize, Serialize};

/// Filter parameters for one preprocessing call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PreprocessParams {
    /// High-pass corner (Hz)
    pub l_freq: f64,
    /// Low-pass corner (Hz)
    pub h_freq: f64,
    /// Mains frequency (Hz); harmonics are removed too
    pub notch_freq: f64,
}

impl Default for PreprocessParams {
    fn default() -> Self {
        Self {
            l_freq: 1.0,
            h_freq: 40.0,
            notch_freq: 50.0,
        }
    }
}

impl PreprocessParams {
    pub fn new(l_freq: f64, h_freq: f64, notch_freq: f64) -> Self {
        Self {
            l_freq,
            h_freq,
            notch_freq,
        }
    }

    /// Check the parameters on their own, without a sampling rate
    pub fn validate(&self) -> EegResult<()> {
        for (name, value) in [
            ("l_freq", self.l_freq),
            ("h_freq", self.h_freq),
            ("notch_freq", self.notch_freq),
        ] {
            if !value.is_finite() {
                return Err(EegError::invalid_parameter(name, format!("{} is not finite", value)));
            }
        }
        if self.l_freq <= 0.0 {
            return Err(EegError::invalid_parameter(
                "l_freq",
                format!("must be positive, got {}", self.l_freq),
            ));
        }
        if self.l_freq >= self.h_freq {
            return Err(EegError::invalid_parameter(
                "h_freq",
                format!("must exceed l_freq ({} >= {})", self.l_freq, self.h_freq),
            ));
        }
        if self.notch_freq <= 0.0 {
            return Err(EegError::invalid_parameter(
                "notch_freq",
                format!("must be positive, got {}", self.notch_freq),
            ));
        }
        Ok(())
    }

    /// Check the parameters against a recording's sampling rate
    pub fn validate_for(&self, sampling_rate: f64) -> EegResult<()> {
        self.validate()?;
        let nyquist = sampling_rate / 2.0;
        if self.h_freq >= nyquist {
            return Err(EegError::invalid_parameter(
                "h_freq",
                format!("{} Hz is not below Nyquist ({} Hz)", self.h_freq, nyquist),
            ));
        }
        Ok(())
    }
}

/// Preprocessing engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Default filter parameters
    pub params: PreprocessParams,
    /// Butterworth order for each of the high-pass and low-pass halves
    pub filter_order: usize,
    /// Notch quality factor
    pub notch_q: f64,
    /// Window length for sinusoid fitting (seconds)
    pub line_window_secs: f64,
    /// Bad channel detection and interpolation
    pub bad_channels: BadChannelConfig,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            params: PreprocessParams::default(),
            filter_order: 4,
            notch_q: 30.0,
            line_window_secs: 4.0,
            bad_channels: BadChannelConfig::default(),
        }
    }
}

impl PreprocessConfig {
    pub fn validate(&self) -> EegResult<()> {
        self.params.validate()?;
        if self.filter_order == 0 || self.filter_order > 16 {
            return Err(EegError::invalid_parameter(
                "filter_order",
                format!("must be in 1..=16, got {}", self.filter_order),
            ));
        }
        if !(self.notch_q > 0.0) {
            return Err(EegError::invalid_parameter("notch_q", "must be positive"));
        }
        if !(self.line_window_secs > 0.0) {
            return Err(EegError::invalid_parameter("line_window_secs", "must be positive"));
        }
        self.bad_channels.validate()
    }
}

/// Bad channel detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BadChannelConfig {
    /// Robust z-score of log-variance above which a channel is bad
    pub z_threshold: f64,
    /// Standard deviation at or below which a channel counts as flat
    pub flat_threshold: f64,
    /// Neighbours used for interpolation
    pub n_neighbors: usize,
}

impl Default for BadChannelConfig {
    fn default() -> Self {
        Self {
            z_threshold: 3.0,
            flat_threshold: 1e-10,
            n_neighbors: 4,
        }
    }
}

impl BadChannelConfig {
    pub fn validate(&self) -> EegResult<()> {
        if !(self.z_threshold > 0.0) {
            return Err(EegError::invalid_parameter("z_threshold", "must be positive"));
        }
        if self.n_neighbors == 0 {
            return Err(EegError::invalid_parameter("n_neighbors", "must be at least 1"));
        }
        Ok(())
    }
}

/// FastICA settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IcaConfig {
    /// Fraction of variance the retained components must explain
    pub variance_threshold: f64,
    pub max_iter: usize,
    pub tolerance: f64,
    pub random_seed: u64,
    /// Upper bound on the number of components, if any
    pub max_components: Option<usize>,
}

impl Default for IcaConfig {
    fn default() -> Self {
        Self {
            variance_threshold: 0.95,
            max_iter: 200,
            tolerance: 1e-4,
            random_seed: 42,
            max_components: None,
        }
    }
}

impl IcaConfig {
    pub fn validate(&self) -> EegResult<()> {
        if !(self.variance_threshold > 0.0 && self.variance_threshold <= 1.0) {
            return Err(EegError::invalid_parameter(
                "variance_threshold",
                format!("must be in (0, 1], got {}", self.variance_threshold),
            ));
        }
        if self.max_iter == 0 {
            return Err(EegError::invalid_parameter("max_iter", "must be at least 1"));
        }
        if !(self.tolerance > 0.0) {
            return Err(EegError::invalid_parameter("tolerance", "must be positive"));
        }
        if self.max_components == Some(0) {
            return Err(EegError::invalid_parameter("max_components", "must be at least 1"));
        }
        Ok(())
    }
}

/// Artifact detector thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// |r| against an eye reference that flags a component
    pub ocular_threshold: f64,
    /// |r| against the heartbeat reference that flags a component
    pub cardiac_threshold: f64,
    /// Band used to estimate a heartbeat reference from EEG (Hz)
    pub cardiac_band: (f64, f64),
    /// Frequency splitting low and high power for muscle detection (Hz)
    pub muscle_split_hz: f64,
    /// High/low power ratio above which a component is muscular
    pub muscle_ratio: f64,
    /// |r| against the motion reference that flags a component
    pub movement_threshold: f64,
    /// Motion samples within this many SD of the mean are zeroed
    pub movement_sd: f64,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            ocular_threshold: 0.5,
            cardiac_threshold: 0.3,
            cardiac_band: (8.0, 16.0),
            muscle_split_hz: 30.0,
            muscle_ratio: 2.0,
            movement_threshold: 0.3,
            movement_sd: 3.0,
        }
    }
}

impl ArtifactConfig {
    pub fn validate(&self) -> EegResult<()> {
        for (name, value) in [
            ("ocular_threshold", self.ocular_threshold),
            ("cardiac_threshold", self.cardiac_threshold),
            ("movement_threshold", self.movement_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(EegError::invalid_parameter(
                    name,
                    format!("must be in (0, 1], got {}", value),
                ));
            }
        }
        let (lo, hi) = self.cardiac_band;
        if !(lo > 0.0 && lo < hi) {
            return Err(EegError::invalid_parameter(
                "cardiac_band",
                format!("invalid band ({}, {})", lo, hi),
            ));
        }
        if !(self.muscle_split_hz > 0.0) || !(self.muscle_ratio > 0.0) {
            return Err(EegError::invalid_parameter(
                "muscle_ratio",
                "split frequency and ratio must be positive",
            ));
        }
        if !(self.movement_sd > 0.0) {
            return Err(EegError::invalid_parameter("movement_sd", "must be positive"));
        }
        Ok(())
    }
}

/// Frequency band definition for spectral analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub name: String,
    pub low_freq: f64,
    pub high_freq: f64,
}

impl FrequencyBand {
    pub fn new(name: &str, low_freq: f64, high_freq: f64) -> Self {
        Self {
            name: name.to_string(),
            low_freq,
            high_freq,
        }
    }

    /// Classical EEG rhythm bands
    pub fn eeg_bands() -> Vec<FrequencyBand> {
        vec![
            FrequencyBand::new("delta", 1.0, 4.0),
            FrequencyBand::new("theta", 4.0, 8.0),
            FrequencyBand::new("alpha", 8.0, 13.0),
            FrequencyBand::new("beta", 13.0, 30.0),
            FrequencyBand::new("gamma", 30.0, 40.0),
        ]
    }

    /// Inclusive membership test
    pub fn contains(&self, freq: f64) -> bool {
        freq >= self.low_freq && freq <= self.high_freq
    }
}

/// Complexity metric settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplexityConfig {
    /// Embedding dimension for the entropy measures
    pub embedding_dim: usize,
    /// Tolerance as a fraction of the channel standard deviation
    pub tolerance_factor: f64,
    /// Central samples analysed per channel
    pub max_samples: usize,
    /// Also compute Lyapunov exponent and correlation dimension
    pub nonlinear_dynamics: bool,
}

impl Default for ComplexityConfig {
    fn default() -> Self {
        Self {
            embedding_dim: 2,
            tolerance_factor: 0.2,
            max_samples: 2048,
            nonlinear_dynamics: false,
        }
    }
}

/// Feature extraction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub bands: Vec<FrequencyBand>,
    /// Welch segment length (samples)
    pub welch_segment: usize,
    /// Welch overlap fraction
    pub welch_overlap: f64,
    /// Worker threads for parallel families (0 = rayon default)
    pub worker_threads: usize,
    pub complexity: ComplexityConfig,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            bands: FrequencyBand::eeg_bands(),
            welch_segment: 2048,
            welch_overlap: 0.5,
            worker_threads: 0,
            complexity: ComplexityConfig::default(),
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> EegResult<()> {
        if self.bands.is_empty() {
            return Err(EegError::invalid_parameter("bands", "at least one band is required"));
        }
        for band in &self.bands {
            if !(band.low_freq >= 0.0 && band.low_freq < band.high_freq) {
                return Err(EegError::invalid_parameter(
                    "bands",
                    format!(
                        "band '{}' has invalid range {}-{} Hz",
                        band.name, band.low_freq, band.high_freq
                    ),
                ));
            }
        }
        if self.welch_segment < 8 {
            return Err(EegError::invalid_parameter("welch_segment", "must be at least 8"));
        }
        if !(self.welch_overlap >= 0.0 && self.welch_overlap < 1.0) {
            return Err(EegError::invalid_parameter(
                "welch_overlap",
                format!("must be in [0, 1), got {}", self.welch_overlap),
            ));
        }
        if self.complexity.embedding_dim == 0 {
            return Err(EegError::invalid_parameter("embedding_dim", "must be at least 1"));
        }
        if !(self.complexity.tolerance_factor > 0.0) {
            return Err(EegError::invalid_parameter("tolerance_factor", "must be positive"));
        }
        if self.complexity.max_samples < 16 {
            return Err(EegError::invalid_parameter("max_samples", "must be at least 16"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params() {
        let params = PreprocessParams::default();
        assert_eq!(params.l_freq, 1.0);
        assert_eq!(params.h_freq, 40.0);
        assert_eq!(params.notch_freq, 50.0);
        assert!(params.validate_for(256.0).is_ok());
    }

    #[test]
    fn test_inverted_band_rejected() {
        let err = PreprocessParams::new(40.0, 1.0, 50.0).validate().unwrap_err();
        assert!(matches!(err, EegError::InvalidParameter { .. }));
    }

    #[test]
    fn test_nyquist_and_finiteness() {
        assert!(PreprocessParams::new(1.0, 128.0, 50.0).validate_for(256.0).is_err());
        assert!(PreprocessParams::new(f64::NAN, 40.0, 50.0).validate().is_err());
        assert!(PreprocessParams::new(1.0, 40.0, 0.0).validate().is_err());
        assert!(PreprocessParams::new(0.0, 40.0, 50.0).validate().is_err());
    }

    #[test]
    fn test_sub_config_validation() {
        assert!(PreprocessConfig::default().validate().is_ok());
        assert!(IcaConfig::default().validate().is_ok());
        assert!(ArtifactConfig::default().validate().is_ok());
        assert!(FeatureConfig::default().validate().is_ok());

        let mut ica = IcaConfig::default();
        ica.variance_threshold = 1.5;
        assert!(ica.validate().is_err());

        let mut features = FeatureConfig::default();
        features.welch_overlap = 1.0;
        assert!(features.validate().is_err());
    }

    #[test]
    fn test_band_bounds_inclusive() {
        let alpha = FrequencyBand::new("alpha", 8.0, 13.0);
        assert!(alpha.contains(8.0));
        assert!(alpha.contains(13.0));
        assert!(!alpha.contains(13.01));
        assert_eq!(FrequencyBand::eeg_bands().len(), 5);
    }
}
