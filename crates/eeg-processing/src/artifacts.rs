//! Artifact component detection
//!
//! Each detector inspects the independent components of a recording and
//! returns the indices it considers artifactual. Detectors run in a fixed
//! order and the excluded set is the union of their outputs.

use crate::channels::electrode_label;
use crate::config::ArtifactConfig;
use crate::filters::SosFilter;
use crate::spectral::welch;
use crate::stats::{mean, pearson, row_mean, std_dev};
use eeg_core::{ChannelKind, EegResult, Recording};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Index of an independent component
pub type ComponentIndex = usize;

/// Inputs shared by all detectors
pub struct DetectionContext<'a> {
    /// Recording the decomposition was fitted on, auxiliary channels included
    pub recording: &'a Recording,
    /// Component time courses, one row per component
    pub sources: &'a [Vec<f64>],
}

impl<'a> DetectionContext<'a> {
    pub fn new(recording: &'a Recording, sources: &'a [Vec<f64>]) -> Self {
        Self { recording, sources }
    }

    /// Components whose |r| with any reference reaches `threshold`
    fn correlated_with(&self, references: &[&[f64]], threshold: f64) -> BTreeSet<ComponentIndex> {
        self.sources
            .iter()
            .enumerate()
            .filter(|(_, source)| {
                references
                    .iter()
                    .any(|reference| pearson(source, reference).abs() >= threshold)
            })
            .map(|(i, _)| i)
            .collect()
    }
}

/// Component-level artifact classifier
pub trait ArtifactDetector: Send + Sync {
    /// Detector name used in reports
    fn name(&self) -> &'static str;

    /// Indices of components classified as artifact
    fn detect(&self, ctx: &DetectionContext<'_>) -> EegResult<BTreeSet<ComponentIndex>>;
}

/// Eye blinks and saccades
#[derive(Debug, Clone)]
pub struct OcularDetector {
    pub threshold: f64,
}

impl ArtifactDetector for OcularDetector {
    fn name(&self) -> &'static str {
        "ocular"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> EegResult<BTreeSet<ComponentIndex>> {
        let eog = ctx.recording.auxiliary_of(ChannelKind::Eog);
        let references: Vec<&[f64]> = if !eog.is_empty() {
            eog.iter().map(|c| c.data.as_slice()).collect()
        } else {
            ctx.recording
                .channels()
                .iter()
                .filter(|c| electrode_label(&c.name).is_some_and(|label| label.starts_with("FP")))
                .map(|c| c.data.as_slice())
                .collect()
        };

        if references.is_empty() {
            debug!("no eye reference available, skipping ocular detection");
            return Ok(BTreeSet::new());
        }
        Ok(ctx.correlated_with(&references, self.threshold))
    }
}

/// Heartbeat
#[derive(Debug, Clone)]
pub struct CardiacDetector {
    pub threshold: f64,
    /// Band used to estimate a reference from EEG when no ECG is recorded
    pub band: (f64, f64),
}

impl CardiacDetector {
    fn estimated_reference(&self, recording: &Recording) -> EegResult<Option<Vec<f64>>> {
        let fs = recording.sampling_rate();
        let (low, high) = self.band;
        if high >= fs / 2.0 {
            warn!(high, nyquist = fs / 2.0, "cardiac band exceeds Nyquist, skipping estimate");
            return Ok(None);
        }
        let channel_mean = row_mean(&recording.data());
        let filter = SosFilter::butterworth_highpass(4, low, fs)?
            .chain(SosFilter::butterworth_lowpass(4, high, fs)?);
        Ok(Some(filter.filtfilt(&channel_mean)))
    }
}

impl ArtifactDetector for CardiacDetector {
    fn name(&self) -> &'static str {
        "cardiac"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> EegResult<BTreeSet<ComponentIndex>> {
        let ecg = ctx.recording.auxiliary_of(ChannelKind::Ecg);
        let reference = match ecg.first() {
            Some(channel) => channel.data.clone(),
            None => match self.estimated_reference(ctx.recording)? {
                Some(reference) => reference,
                None => return Ok(BTreeSet::new()),
            },
        };
        Ok(ctx.correlated_with(&[reference.as_slice()], self.threshold))
    }
}

/// Muscle activity: broadband power above the split frequency
#[derive(Debug, Clone)]
pub struct MuscleDetector {
    pub split_hz: f64,
    pub ratio: f64,
}

impl ArtifactDetector for MuscleDetector {
    fn name(&self) -> &'static str {
        "muscular"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> EegResult<BTreeSet<ComponentIndex>> {
        let fs = ctx.recording.sampling_rate();
        if self.split_hz >= fs / 2.0 {
            return Ok(BTreeSet::new());
        }
        let segment = ((2.0 * fs).round() as usize).max(8);

        let mut flagged = BTreeSet::new();
        for (index, source) in ctx.sources.iter().enumerate() {
            let psd = welch(source, fs, segment, 0.5)?;
            let low = psd.band_sum(0.0, self.split_hz);
            let high = psd.band_sum(self.split_hz, f64::INFINITY);
            if high > self.ratio * low {
                debug!(component = index, high, low, "muscular component");
                flagged.insert(index);
            }
        }
        Ok(flagged)
    }
}

/// Head or body movement, from accelerometer/gyroscope channels
#[derive(Debug, Clone)]
pub struct MovementDetector {
    pub threshold: f64,
    /// Samples within this many SD of the mean magnitude are zeroed
    pub sd: f64,
}

impl MovementDetector {
    /// Magnitude across motion axes with quiet samples zeroed
    pub fn reference(&self, motion: &[&[f64]]) -> Vec<f64> {
        let n = motion.first().map(|m| m.len()).unwrap_or(0);
        let magnitude: Vec<f64> = (0..n)
            .map(|i| motion.iter().map(|axis| axis[i] * axis[i]).sum::<f64>().sqrt())
            .collect();

        let m = mean(&magnitude);
        let limit = self.sd * std_dev(&magnitude);
        magnitude
            .into_iter()
            .map(|v| if (v - m).abs() <= limit { 0.0 } else { v })
            .collect()
    }
}

impl ArtifactDetector for MovementDetector {
    fn name(&self) -> &'static str {
        "movement"
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> EegResult<BTreeSet<ComponentIndex>> {
        let motion = ctx.recording.auxiliary_of(ChannelKind::Motion);
        if motion.is_empty() {
            return Ok(BTreeSet::new());
        }
        let axes: Vec<&[f64]> = motion.iter().map(|c| c.data.as_slice()).collect();
        let reference = self.reference(&axes);
        Ok(ctx.correlated_with(&[reference.as_slice()], self.threshold))
    }
}

/// The four detectors in their fixed order
pub fn default_detectors(config: &ArtifactConfig) -> Vec<Box<dyn ArtifactDetector>> {
    vec![
        Box::new(OcularDetector {
            threshold: config.ocular_threshold,
        }),
        Box::new(CardiacDetector {
            threshold: config.cardiac_threshold,
            band: config.cardiac_band,
        }),
        Box::new(MuscleDetector {
            split_hz: config.muscle_split_hz,
            ratio: config.muscle_ratio,
        }),
        Box::new(MovementDetector {
            threshold: config.movement_threshold,
            sd: config.movement_sd,
        }),
    ]
}

/// Union of detector outputs
pub fn union_exclusions<'a, I>(sets: I) -> BTreeSet<ComponentIndex>
where
    I: IntoIterator<Item = &'a BTreeSet<ComponentIndex>>,
{
    sets.into_iter().flatten().copied().collect()
}

/// Per-detector findings and their union
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub per_detector: BTreeMap<String, BTreeSet<ComponentIndex>>,
    pub excluded: BTreeSet<ComponentIndex>,
}

/// Run detectors in order and merge their findings
pub fn run_detectors(
    detectors: &[Box<dyn ArtifactDetector>],
    ctx: &DetectionContext<'_>,
) -> EegResult<DetectionReport> {
    let mut per_detector = BTreeMap::new();
    for detector in detectors {
        let found = detector.detect(ctx)?;
        debug!(detector = detector.name(), components = ?found, "artifact detection");
        per_detector.insert(detector.name().to_string(), found);
    }
    let excluded = union_exclusions(per_detector.values());
    Ok(DetectionReport {
        per_detector,
        excluded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use eeg_core::Channel;
    use std::f64::consts::PI;

    fn set(items: &[usize]) -> BTreeSet<usize> {
        items.iter().copied().collect()
    }

    fn sine(freq: f64, fs: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| (2.0 * PI * freq * i as f64 / fs).sin()).collect()
    }

    #[test]
    fn test_union_exclusions() {
        let sets = [set(&[1, 2]), set(&[2, 3]), set(&[]), set(&[4])];
        assert_eq!(union_exclusions(&sets), set(&[1, 2, 3, 4]));
        assert!(union_exclusions(&[] as &[BTreeSet<usize>]).is_empty());
    }

    #[test]
    fn test_ocular_uses_eog_reference() {
        let fs = 128.0;
        let blink = sine(1.0, fs, 512);
        let recording = Recording::new(
            fs,
            vec![
                Channel::new("Cz", sine(10.0, fs, 512)),
                Channel::new("EOG", blink.clone()),
            ],
        )
        .unwrap();
        let sources = vec![sine(10.0, fs, 512), blink.iter().map(|v| -2.0 * v).collect()];
        let ctx = DetectionContext::new(&recording, &sources);

        let found = OcularDetector { threshold: 0.5 }.detect(&ctx).unwrap();
        assert_eq!(found, set(&[1]));
    }

    #[test]
    fn test_ocular_falls_back_to_frontal_channels() {
        let fs = 128.0;
        let recording = Recording::new(
            fs,
            vec![Channel::new("Fp1", sine(1.0, fs, 512)), Channel::new("O1", sine(10.0, fs, 512))],
        )
        .unwrap();
        let sources = vec![sine(10.0, fs, 512), sine(1.0, fs, 512)];
        let ctx = DetectionContext::new(&recording, &sources);
        assert_eq!(OcularDetector { threshold: 0.5 }.detect(&ctx).unwrap(), set(&[1]));

        // EDF-style decorated label
        let decorated = Recording::new(
            fs,
            vec![
                Channel::new("EEG Fp1-REF", sine(1.0, fs, 512)),
                Channel::new("EEG O1-REF", sine(10.0, fs, 512)),
            ],
        )
        .unwrap();
        let ctx = DetectionContext::new(&decorated, &sources);
        assert_eq!(OcularDetector { threshold: 0.5 }.detect(&ctx).unwrap(), set(&[1]));

        let no_frontal =
            Recording::new(fs, vec![Channel::new("O1", sine(10.0, fs, 512))]).unwrap();
        let ctx = DetectionContext::new(&no_frontal, &sources);
        assert!(OcularDetector { threshold: 0.5 }.detect(&ctx).unwrap().is_empty());
    }

    #[test]
    fn test_cardiac_with_ecg_channel() {
        let fs = 128.0;
        let beat = sine(1.2, fs, 1024);
        let recording = Recording::new(
            fs,
            vec![Channel::new("Cz", sine(10.0, fs, 1024)), Channel::new("ECG", beat.clone())],
        )
        .unwrap();
        let sources = vec![beat, sine(6.0, fs, 1024)];
        let ctx = DetectionContext::new(&recording, &sources);
        let found = CardiacDetector {
            threshold: 0.3,
            band: (8.0, 16.0),
        }
        .detect(&ctx)
        .unwrap();
        assert_eq!(found, set(&[0]));
    }

    #[test]
    fn test_muscle_detector_flags_high_frequency() {
        let fs = 256.0;
        let recording = Recording::new(fs, vec![Channel::new("T7", sine(10.0, fs, 1024))]).unwrap();
        let sources = vec![sine(10.0, fs, 1024), sine(70.0, fs, 1024)];
        let ctx = DetectionContext::new(&recording, &sources);
        let found = MuscleDetector {
            split_hz: 30.0,
            ratio: 2.0,
        }
        .detect(&ctx)
        .unwrap();
        assert_eq!(found, set(&[1]));
    }

    #[test]
    fn test_movement_requires_motion_channels() {
        let fs = 100.0;
        let n = 1000;
        let mut acc = vec![0.01; n];
        for v in &mut acc[500..520] {
            *v = 5.0;
        }
        let mut jolt = vec![0.0; n];
        for v in &mut jolt[500..520] {
            *v = 3.0;
        }

        let detector = MovementDetector { threshold: 0.3, sd: 3.0 };
        let sources = vec![sine(10.0, fs, n), jolt];

        let still = Recording::new(fs, vec![Channel::new("Cz", sine(10.0, fs, n))]).unwrap();
        assert!(detector
            .detect(&DetectionContext::new(&still, &sources))
            .unwrap()
            .is_empty());

        let moving = Recording::new(
            fs,
            vec![Channel::new("Cz", sine(10.0, fs, n)), Channel::new("ACC", acc)],
        )
        .unwrap();
        let found = detector
            .detect(&DetectionContext::new(&moving, &sources))
            .unwrap();
        assert_eq!(found, set(&[1]));
    }

    #[test]
    fn test_movement_reference_zeroes_quiet_samples() {
        let detector = MovementDetector { threshold: 0.3, sd: 3.0 };
        let mut x = vec![0.0; 200];
        x[100] = 10.0;
        let reference = detector.reference(&[x.as_slice()]);
        assert_eq!(reference[100], 10.0);
        assert_eq!(reference.iter().filter(|v| **v != 0.0).count(), 1);
    }

    #[test]
    fn test_run_detectors_reports_each() {
        let fs = 256.0;
        let recording = Recording::new(fs, vec![Channel::new("O2", sine(10.0, fs, 1024))]).unwrap();
        let sources = vec![sine(10.0, fs, 1024), sine(70.0, fs, 1024)];
        let ctx = DetectionContext::new(&recording, &sources);
        let report = run_detectors(&default_detectors(&ArtifactConfig::default()), &ctx).unwrap();

        assert_eq!(report.per_detector.len(), 4);
        assert_eq!(report.per_detector["muscular"], set(&[1]));
        assert!(report.excluded.contains(&1));
        assert_eq!(
            report.excluded,
            union_exclusions(report.per_detector.values())
        );
    }
}
