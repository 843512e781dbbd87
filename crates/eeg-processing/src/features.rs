//! Feature extraction for EEG recordings
//!
//! Produces a [`FeatureBundle`] with five families: band powers,
//! connectivity, temporal, statistical and complexity features. Families
//! are computed on a dedicated rayon pool and validated individually, then
//! the bundle is validated as a whole.

use crate::complexity::complexity_metrics;
use crate::config::FeatureConfig;
use crate::processor::StageTimer;
use crate::spectral::{Psd, Welch};
use crate::stats::{kurtosis, mean, pearson, rms, skewness, std_dev, variance, zero_crossings};
use eeg_core::{EegError, EegResult, Fingerprint, Recording};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const BAND_POWERS: &str = "band_powers";
pub const CONNECTIVITY: &str = "connectivity";
pub const TEMPORAL: &str = "temporal";
pub const STATISTICAL: &str = "statistical";
pub const COMPLEXITY: &str = "complexity";

/// Tolerance for symmetry and unit-diagonal checks
const MATRIX_TOLERANCE: f64 = 1e-9;

/// Per-channel metric lists keyed by metric name
pub type FeatureFamily = BTreeMap<String, Vec<f64>>;

/// Validated features of one recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBundle {
    pub band_powers: FeatureFamily,
    /// N×N Pearson correlation matrix
    pub connectivity: Vec<Vec<f64>>,
    pub temporal: FeatureFamily,
    pub statistical: FeatureFamily,
    pub complexity: FeatureFamily,
    pub channel_names: Vec<String>,
}

impl FeatureBundle {
    pub fn n_channels(&self) -> usize {
        self.channel_names.len()
    }

    fn families(&self) -> [(&'static str, &FeatureFamily); 4] {
        [
            (BAND_POWERS, &self.band_powers),
            (TEMPORAL, &self.temporal),
            (STATISTICAL, &self.statistical),
            (COMPLEXITY, &self.complexity),
        ]
    }

    /// Cross-family consistency check
    ///
    /// Every list must hold one finite value per channel and the
    /// connectivity matrix must be N×N, symmetric, within [-1, 1] and have
    /// a unit diagonal.
    pub fn validate(&self) -> EegResult<()> {
        let n = self.n_channels();
        if n == 0 {
            return Err(EegError::feature_validation("bundle", "no channels"));
        }

        for (family, metrics) in self.families() {
            validate_family(family, metrics)?;
            for (metric, values) in metrics {
                if values.len() != n {
                    return Err(EegError::feature_validation(
                        family,
                        format!("'{}' has {} values for {} channels", metric, values.len(), n),
                    ));
                }
            }
        }

        validate_connectivity(&self.connectivity)?;
        if self.connectivity.len() != n {
            return Err(EegError::feature_validation(
                CONNECTIVITY,
                format!("matrix is {}x{} for {} channels", self.connectivity.len(), self.connectivity.len(), n),
            ));
        }
        for i in 0..n {
            if (self.connectivity[i][i] - 1.0).abs() > MATRIX_TOLERANCE {
                return Err(EegError::feature_validation(
                    CONNECTIVITY,
                    format!("diagonal entry {} is {}", i, self.connectivity[i][i]),
                ));
            }
            for j in (i + 1)..n {
                let (a, b) = (self.connectivity[i][j], self.connectivity[j][i]);
                if (a - b).abs() > MATRIX_TOLERANCE {
                    return Err(EegError::feature_validation(
                        CONNECTIVITY,
                        format!("asymmetric at ({}, {}): {} vs {}", i, j, a, b),
                    ));
                }
                if !(-1.0..=1.0).contains(&a) {
                    return Err(EegError::feature_validation(
                        CONNECTIVITY,
                        format!("entry ({}, {}) = {} outside [-1, 1]", i, j, a),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Deterministic JSON encoding (ordered maps, fixed field order)
    pub fn canonical_json(&self) -> EegResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            EegError::feature_validation("bundle", format!("serialization failed: {}", e))
        })
    }

    /// SHA-256 of the canonical JSON
    pub fn fingerprint(&self) -> EegResult<Fingerprint> {
        Ok(Fingerprint::of_bytes(&self.canonical_json()?))
    }

    /// Metric value for one channel, searching all families
    pub fn value(&self, metric: &str, channel: usize) -> Option<f64> {
        self.families()
            .iter()
            .find_map(|(_, family)| family.get(metric))
            .and_then(|values| values.get(channel).copied())
    }
}

/// A family must be non-empty and contain only finite values
pub fn validate_family(family: &str, metrics: &FeatureFamily) -> EegResult<()> {
    if metrics.is_empty() {
        return Err(EegError::feature_validation(family, "no metrics computed"));
    }
    for (metric, values) in metrics {
        if values.is_empty() {
            return Err(EegError::feature_validation(family, format!("'{}' is empty", metric)));
        }
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(EegError::feature_validation(
                family,
                format!("'{}' has non-finite value {} at channel {}", metric, values[pos], pos),
            ));
        }
    }
    Ok(())
}

/// Connectivity must be a non-empty square matrix of finite values
pub fn validate_connectivity(matrix: &[Vec<f64>]) -> EegResult<()> {
    if matrix.is_empty() {
        return Err(EegError::feature_validation(CONNECTIVITY, "empty matrix"));
    }
    let n = matrix.len();
    for (i, row) in matrix.iter().enumerate() {
        if row.len() != n {
            return Err(EegError::feature_validation(
                CONNECTIVITY,
                format!("row {} has {} entries, expected {}", i, row.len(), n),
            ));
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(EegError::feature_validation(
                CONNECTIVITY,
                format!("row {} has non-finite entries", i),
            ));
        }
    }
    Ok(())
}

/// Pearson correlation between all channel pairs
///
/// The upper triangle is computed and mirrored; the diagonal is exactly 1.
/// Pairs involving a zero-variance channel are 0.
pub fn connectivity_matrix(channels: &[&[f64]]) -> Vec<Vec<f64>> {
    let n = channels.len();
    let upper: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| ((i + 1)..n).map(|j| pearson(channels[i], channels[j])).collect())
        .collect();

    let mut matrix = vec![vec![0.0; n]; n];
    for i in 0..n {
        matrix[i][i] = 1.0;
        for (offset, &r) in upper[i].iter().enumerate() {
            let j = i + 1 + offset;
            matrix[i][j] = r;
            matrix[j][i] = r;
        }
    }
    matrix
}

/// Temporal family: mean, std, kurtosis, skewness
pub fn temporal_features(channels: &[&[f64]]) -> FeatureFamily {
    let mut family = FeatureFamily::new();
    family.insert("mean".into(), channels.iter().map(|c| mean(c)).collect());
    family.insert("std".into(), channels.iter().map(|c| std_dev(c)).collect());
    family.insert("kurtosis".into(), channels.iter().map(|c| kurtosis(c)).collect());
    family.insert("skewness".into(), channels.iter().map(|c| skewness(c)).collect());
    family
}

/// Statistical family: variance, peak_to_peak, zero_crossings, rms
pub fn statistical_features(channels: &[&[f64]]) -> FeatureFamily {
    let peak_to_peak = |c: &[f64]| {
        let max = c.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        let min = c.iter().fold(f64::INFINITY, |a, &b| a.min(b));
        if c.is_empty() {
            0.0
        } else {
            max - min
        }
    };

    let mut family = FeatureFamily::new();
    family.insert("variance".into(), channels.iter().map(|c| variance(c)).collect());
    family.insert("peak_to_peak".into(), channels.iter().map(|c| peak_to_peak(c)).collect());
    family.insert(
        "zero_crossings".into(),
        channels.iter().map(|c| zero_crossings(c) as f64).collect(),
    );
    family.insert("rms".into(), channels.iter().map(|c| rms(c)).collect());
    family
}

/// Feature extractor with its own worker pool
pub struct FeatureExtractor {
    config: FeatureConfig,
    pool: rayon::ThreadPool,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> EegResult<Self> {
        config.validate()?;
        let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("eeg-feature-worker-{}", i));
        if config.worker_threads > 0 {
            builder = builder.num_threads(config.worker_threads);
        }
        let pool = builder
            .build()
            .map_err(|e| EegError::processing(format!("Failed to create thread pool: {}", e)))?;
        Ok(Self { config, pool })
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    pub fn worker_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Welch PSD of every EEG channel
    pub fn spectra(&self, recording: &Recording) -> EegResult<Vec<Psd>> {
        let fs = recording.sampling_rate();
        let (segment, overlap) = (self.config.welch_segment, self.config.welch_overlap);
        self.pool.install(|| {
            recording
                .channels()
                .par_iter()
                .map_init(
                    || Welch::new(segment, overlap),
                    |welch, channel| welch.estimate(&channel.data, fs),
                )
                .collect()
        })
    }

    /// Mean PSD over bins of each band, bands computed independently
    pub fn band_powers(&self, spectra: &[Psd]) -> FeatureFamily {
        self.pool.install(|| {
            self.config
                .bands
                .par_iter()
                .map(|band| {
                    let values = spectra
                        .iter()
                        .map(|psd| psd.band_mean(band.low_freq, band.high_freq))
                        .collect();
                    (band.name.clone(), values)
                })
                .collect()
        })
    }

    /// Complexity metrics per channel, computed in parallel
    pub fn complexity(&self, channels: &[&[f64]]) -> FeatureFamily {
        let per_channel: Vec<BTreeMap<&'static str, f64>> = self.pool.install(|| {
            channels
                .par_iter()
                .map(|c| complexity_metrics(c, &self.config.complexity))
                .collect()
        });

        let mut family = FeatureFamily::new();
        for metrics in &per_channel {
            for (&name, &value) in metrics {
                family.entry(name.to_string()).or_default().push(value);
            }
        }
        family
    }

    /// Extract and validate all feature families
    pub fn extract(&self, recording: &Recording) -> EegResult<FeatureBundle> {
        let total = StageTimer::start();
        let channels = recording.data();

        let timer = StageTimer::start();
        let spectra = self.spectra(recording)?;
        let band_powers = self.band_powers(&spectra);
        validate_family(BAND_POWERS, &band_powers)?;
        debug!(elapsed_ms = timer.elapsed_ms(), "band powers");

        let timer = StageTimer::start();
        let connectivity = self.pool.install(|| connectivity_matrix(&channels));
        validate_connectivity(&connectivity)?;
        debug!(elapsed_ms = timer.elapsed_ms(), "connectivity");

        let temporal = temporal_features(&channels);
        validate_family(TEMPORAL, &temporal)?;
        let statistical = statistical_features(&channels);
        validate_family(STATISTICAL, &statistical)?;

        let timer = StageTimer::start();
        let complexity = self.complexity(&channels);
        validate_family(COMPLEXITY, &complexity)?;
        debug!(elapsed_ms = timer.elapsed_ms(), "complexity");

        let bundle = FeatureBundle {
            band_powers,
            connectivity,
            temporal,
            statistical,
            complexity,
            channel_names: recording.channel_names(),
        };
        bundle.validate()?;

        info!(
            channels = bundle.n_channels(),
            elapsed_ms = total.elapsed_ms(),
            "features extracted"
        );
        Ok(bundle)
    }
}
