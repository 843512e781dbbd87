//! Preprocessing engine
//!
//! Runs the fixed stage sequence on a raw recording:
//! band-pass, notch, bad channel repair, ICA artifact removal and residual
//! line-noise cleanup. Every stage derives a new recording; a failure in
//! any stage fails the whole call.

use crate::artifacts::{default_detectors, run_detectors, ArtifactDetector, DetectionContext, DetectionReport};
use crate::channels::{BadChannelDetector, BadChannelReport, ChannelInterpolator};
use crate::config::{ArtifactConfig, IcaConfig, PreprocessConfig, PreprocessParams};
use crate::filters::{line_harmonics, BandPassFilter, LineNoiseRemover, NotchFilter};
use crate::ica::FastIca;
use crate::processor::{RecordingProcessor, StageTimer};
use crate::spectral::Welch;
use eeg_core::{EegResult, Recording, RecordingStage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Half-width of the band around each line harmonic counted as artifact (Hz)
const LINE_GUARD_HZ: f64 = 1.0;

/// Summary of one preprocessing call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessReport {
    pub params: PreprocessParams,
    pub bad_channels: BadChannelReport,
    pub n_components: usize,
    pub ica_iterations: usize,
    pub ica_converged: bool,
    /// Share of variance carried by the retained components
    pub ica_explained_variance: f64,
    pub detections: DetectionReport,
    /// In-band power over total power after cleaning, in [0, 1]
    pub quality_score: f64,
    pub stage_timings_ms: BTreeMap<String, f64>,
}

/// Cleaned recording with its report
#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub recording: Recording,
    pub report: PreprocessReport,
}

/// Multi-stage artifact removal
pub struct PreprocessEngine {
    config: PreprocessConfig,
    ica: FastIca,
    detectors: Vec<Box<dyn ArtifactDetector>>,
}

impl Default for PreprocessEngine {
    fn default() -> Self {
        Self::new(PreprocessConfig::default(), IcaConfig::default(), &ArtifactConfig::default())
    }
}

impl PreprocessEngine {
    pub fn new(config: PreprocessConfig, ica: IcaConfig, artifacts: &ArtifactConfig) -> Self {
        Self {
            config,
            ica: FastIca::new(ica),
            detectors: default_detectors(artifacts),
        }
    }

    /// Replace the detector list
    pub fn with_detectors(mut self, detectors: Vec<Box<dyn ArtifactDetector>>) -> Self {
        self.detectors = detectors;
        self
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Run all stages on `recording`
    pub fn preprocess(&self, recording: &Recording, params: PreprocessParams) -> EegResult<Preprocessed> {
        params.validate_for(recording.sampling_rate())?;
        let mut timings = BTreeMap::new();

        let timer = StageTimer::start();
        let band_passed = BandPassFilter::new(params.l_freq, params.h_freq, self.config.filter_order)
            .process(recording)?;
        timings.insert("bandpass".to_string(), timer.elapsed_ms());
        info!(l_freq = params.l_freq, h_freq = params.h_freq, "band-pass applied");

        let timer = StageTimer::start();
        let notched = NotchFilter::new(params.notch_freq, self.config.notch_q).process(&band_passed)?;
        timings.insert("notch".to_string(), timer.elapsed_ms());
        info!(
            notch_freq = params.notch_freq,
            harmonics = line_harmonics(params.notch_freq, recording.sampling_rate()).len(),
            "notch applied"
        );

        let timer = StageTimer::start();
        let bad = BadChannelDetector::new(self.config.bad_channels.clone()).detect(&notched);
        let (repaired, bad_channels) =
            ChannelInterpolator::new(self.config.bad_channels.n_neighbors).interpolate(&notched, &bad)?;
        timings.insert("bad_channels".to_string(), timer.elapsed_ms());
        if bad_channels.bad.is_empty() {
            info!("no bad channels");
        } else {
            info!(bad = ?bad_channels.bad, interpolated = bad_channels.interpolated.len(), "bad channels repaired");
        }

        let timer = StageTimer::start();
        let data = repaired.data();
        let decomposition = self.ica.fit(&data)?;
        let sources = decomposition.sources();
        let detections = run_detectors(&self.detectors, &DetectionContext::new(&repaired, &sources))?;
        let cleaned_data = decomposition.remove_components(&data, &detections.excluded)?;
        let cleaned = repaired.derive(RecordingStage::Filtered, cleaned_data)?;
        timings.insert("ica".to_string(), timer.elapsed_ms());
        info!(
            components = decomposition.n_components(),
            excluded = ?detections.excluded,
            "ICA artifact removal"
        );

        let timer = StageTimer::start();
        let finished = LineNoiseRemover::new(params.notch_freq, self.config.line_window_secs).process(&cleaned)?;
        timings.insert("line_noise".to_string(), timer.elapsed_ms());

        let quality = quality_score(&finished, &params)?;
        if quality < 0.5 {
            warn!(quality, "low signal quality after preprocessing");
        } else {
            info!(quality, "preprocessing complete");
        }

        let report = PreprocessReport {
            params,
            bad_channels,
            n_components: decomposition.n_components(),
            ica_iterations: decomposition.n_iter(),
            ica_converged: decomposition.converged(),
            ica_explained_variance: decomposition.explained_variance(),
            detections,
            quality_score: quality,
            stage_timings_ms: timings,
        };
        Ok(Preprocessed {
            recording: finished,
            report,
        })
    }
}

/// In-band power over total power, pooled across channels
///
/// Bins within a guard band around the line frequency and its harmonics
/// count towards the total but never towards the in-band power.
pub fn quality_score(recording: &Recording, params: &PreprocessParams) -> EegResult<f64> {
    let fs = recording.sampling_rate();
    let harmonics = line_harmonics(params.notch_freq, fs);
    let segment = ((2.0 * fs).round() as usize).max(8);
    let mut welch = Welch::new(segment, 0.5);

    let mut in_band = 0.0;
    let mut total = 0.0;
    for channel in recording.channels() {
        let psd = welch.estimate(&channel.data, fs)?;
        for (&f, &p) in psd.freqs.iter().zip(psd.power.iter()) {
            total += p;
            let near_line = harmonics.iter().any(|h| (f - h).abs() <= LINE_GUARD_HZ);
            if f >= params.l_freq && f <= params.h_freq && !near_line {
                in_band += p;
            }
        }
    }

    if !(total > 0.0) {
        return Ok(0.0);
    }
    Ok((in_band / total).clamp(0.0, 1.0))
}
