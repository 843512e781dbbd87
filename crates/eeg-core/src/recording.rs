//! Recording: core container for multichannel EEG data

use crate::error::{EegError, EegResult};
use crate::fingerprint::Fingerprint;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Role of a channel within a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Scalp EEG electrode
    Eeg,
    /// Electrooculogram (eye movement / blink reference)
    Eog,
    /// Electrocardiogram (heartbeat reference)
    Ecg,
    /// Accelerometer or gyroscope
    Motion,
}

impl ChannelKind {
    /// Classify a channel by its label
    ///
    /// Matching is case-insensitive on the leading token, so `EOG-L`,
    /// `VEOG` and `ecg 1` are all recognised.
    pub fn classify(name: &str) -> Self {
        let upper = name.trim().to_ascii_uppercase();
        let token: String = upper.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
        match token.as_str() {
            "EOG" | "HEOG" | "VEOG" => ChannelKind::Eog,
            "ECG" | "EKG" => ChannelKind::Ecg,
            "ACC" | "GYRO" | "MOTION" => ChannelKind::Motion,
            _ => ChannelKind::Eeg,
        }
    }

    pub fn is_auxiliary(&self) -> bool {
        !matches!(self, ChannelKind::Eeg)
    }
}

/// Processing stage a recording was produced by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingStage {
    Raw,
    Filtered,
}

/// One named time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub kind: ChannelKind,
    pub data: Vec<f64>,
    /// Flagged as unusable (by the source file or by detection)
    pub bad: bool,
}

impl Channel {
    /// Create a channel, classifying its kind from the name
    pub fn new(name: impl Into<String>, data: Vec<f64>) -> Self {
        let name = name.into();
        let kind = ChannelKind::classify(&name);
        Self {
            name,
            kind,
            data,
            bad: false,
        }
    }

    /// Create a channel with an explicit kind
    pub fn with_kind(name: impl Into<String>, kind: ChannelKind, data: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            kind,
            data,
            bad: false,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats::calculate(&self.data)
    }
}

/// Multichannel recording at a single sampling rate
///
/// EEG channels are the ones features are computed on. Auxiliary channels
/// (EOG, ECG, motion) travel alongside unchanged and serve as references
/// for artifact detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    sampling_rate: f64,
    channels: Vec<Channel>,
    auxiliary: Vec<Channel>,
    source: Option<Fingerprint>,
    stage: RecordingStage,
}

impl Recording {
    /// Build a raw recording, routing each channel by its kind
    ///
    /// Fails with [`EegError::Validation`] when names repeat, sample counts
    /// differ, or the sampling rate is not a positive finite number.
    pub fn new(sampling_rate: f64, channels: Vec<Channel>) -> EegResult<Self> {
        if !sampling_rate.is_finite() || sampling_rate <= 0.0 {
            return Err(EegError::validation(format!(
                "sampling rate must be positive, got {}",
                sampling_rate
            )));
        }

        let mut names = HashSet::new();
        for channel in &channels {
            if !names.insert(channel.name.as_str()) {
                return Err(EegError::validation(format!(
                    "duplicate channel name '{}'",
                    channel.name
                )));
            }
        }

        if let Some(first) = channels.first() {
            let expected = first.len();
            if let Some(bad) = channels.iter().find(|c| c.len() != expected) {
                return Err(EegError::validation(format!(
                    "channel '{}' has {} samples, expected {}",
                    bad.name,
                    bad.len(),
                    expected
                )));
            }
        }

        let (auxiliary, channels): (Vec<_>, Vec<_>) =
            channels.into_iter().partition(|c| c.kind.is_auxiliary());

        Ok(Recording {
            sampling_rate,
            channels,
            auxiliary,
            source: None,
            stage: RecordingStage::Raw,
        })
    }

    /// Attach the fingerprint of the bytes this recording was parsed from
    pub fn with_source(mut self, source: Fingerprint) -> Self {
        self.source = Some(source);
        self
    }

    /// Check the invariants a loaded recording must satisfy
    pub fn validate(&self) -> EegResult<()> {
        if self.channels.is_empty() {
            return Err(EegError::validation("recording has no EEG channels"));
        }
        if self.n_samples() == 0 {
            return Err(EegError::validation("recording has no samples"));
        }
        for channel in self.channels.iter().chain(self.auxiliary.iter()) {
            if let Some(pos) = channel.data.iter().position(|v| v.is_nan()) {
                return Err(EegError::validation(format!(
                    "channel '{}' contains NaN at sample {}",
                    channel.name, pos
                )));
            }
        }
        Ok(())
    }

    /// Derive a recording with replaced EEG data
    ///
    /// Names, bad flags, auxiliary channels and lineage carry over. `data`
    /// must hold one row per EEG channel, all the same length as before.
    pub fn derive(&self, stage: RecordingStage, data: Vec<Vec<f64>>) -> EegResult<Recording> {
        if data.len() != self.channels.len() {
            return Err(EegError::validation(format!(
                "derived data has {} rows for {} channels",
                data.len(),
                self.channels.len()
            )));
        }
        let n = self.n_samples();
        if let Some(row) = data.iter().position(|row| row.len() != n) {
            return Err(EegError::validation(format!(
                "derived row {} has {} samples, expected {}",
                row,
                data[row].len(),
                n
            )));
        }

        let channels = self
            .channels
            .iter()
            .zip(data)
            .map(|(channel, data)| Channel {
                name: channel.name.clone(),
                kind: channel.kind,
                data,
                bad: channel.bad,
            })
            .collect();

        Ok(Recording {
            sampling_rate: self.sampling_rate,
            channels,
            auxiliary: self.auxiliary.clone(),
            source: self.source,
            stage,
        })
    }

    /// Copy of this recording with the bad flags replaced
    pub fn with_bad_flags(&self, bad: &[bool]) -> Recording {
        let mut next = self.clone();
        for (channel, &flag) in next.channels.iter_mut().zip(bad.iter()) {
            channel.bad = flag;
        }
        next
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn nyquist(&self) -> f64 {
        self.sampling_rate / 2.0
    }

    /// Number of EEG channels
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel
    pub fn n_samples(&self) -> usize {
        self.channels
            .first()
            .or_else(|| self.auxiliary.first())
            .map(|c| c.len())
            .unwrap_or(0)
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.n_samples() as f64 / self.sampling_rate
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel(&self, index: usize) -> Option<&Channel> {
        self.channels.get(index)
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name.clone()).collect()
    }

    /// EEG data as one slice per channel
    pub fn data(&self) -> Vec<&[f64]> {
        self.channels.iter().map(|c| c.data.as_slice()).collect()
    }

    pub fn auxiliary(&self) -> &[Channel] {
        &self.auxiliary
    }

    /// Auxiliary channels of the given kind
    pub fn auxiliary_of(&self, kind: ChannelKind) -> Vec<&Channel> {
        self.auxiliary.iter().filter(|c| c.kind == kind).collect()
    }

    /// Indices of EEG channels flagged bad
    pub fn bad_channels(&self) -> Vec<usize> {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, c)| c.bad)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn source(&self) -> Option<Fingerprint> {
        self.source
    }

    pub fn stage(&self) -> RecordingStage {
        self.stage
    }

    /// Time vector for plotting
    pub fn time_vector(&self) -> Vec<f64> {
        let dt = 1.0 / self.sampling_rate;
        (0..self.n_samples()).map(|i| i as f64 * dt).collect()
    }

    pub fn channel_stats(&self, index: usize) -> EegResult<ChannelStats> {
        self.channels
            .get(index)
            .map(Channel::stats)
            .ok_or_else(|| {
                EegError::validation(format!(
                    "channel index {} out of bounds (0-{})",
                    index,
                    self.channels.len().saturating_sub(1)
                ))
            })
    }
}

/// Basic statistics for a channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub mean: f64,
    pub rms: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub peak_to_peak: f64,
}

impl ChannelStats {
    pub fn calculate(data: &[f64]) -> Self {
        if data.is_empty() {
            return Self {
                mean: 0.0,
                rms: 0.0,
                std_dev: 0.0,
                min: 0.0,
                max: 0.0,
                peak_to_peak: 0.0,
            };
        }

        let n = data.len() as f64;
        let mean = data.iter().sum::<f64>() / n;
        let rms = (data.iter().map(|x| x * x).sum::<f64>() / n).sqrt();
        let variance = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        let min = data.iter().fold(f64::INFINITY, |a, &b| a.min(b));
        let max = data.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));

        Self {
            mean,
            rms,
            std_dev: variance.sqrt(),
            min,
            max,
            peak_to_peak: max - min,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_recording() -> Recording {
        Recording::new(
            256.0,
            vec![
                Channel::new("Fp1", vec![1.0, 2.0, 3.0, 4.0]),
                Channel::new("EOG", vec![0.0; 4]),
                Channel::new("Cz", vec![-1.0, 0.0, 1.0, 0.0]),
                Channel::new("ECG", vec![0.5; 4]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_channel_classification() {
        assert_eq!(ChannelKind::classify("VEOG"), ChannelKind::Eog);
        assert_eq!(ChannelKind::classify("eog-left"), ChannelKind::Eog);
        assert_eq!(ChannelKind::classify("EKG"), ChannelKind::Ecg);
        assert_eq!(ChannelKind::classify("ACC_X"), ChannelKind::Motion);
        assert_eq!(ChannelKind::classify("Gyro1"), ChannelKind::Motion);
        assert_eq!(ChannelKind::classify("Fp1"), ChannelKind::Eeg);
        assert_eq!(ChannelKind::classify("EEG Fz"), ChannelKind::Eeg);
    }

    #[test]
    fn test_recording_partitions_auxiliary() {
        let rec = sample_recording();
        assert_eq!(rec.channel_count(), 2);
        assert_eq!(rec.channel_names(), vec!["Fp1", "Cz"]);
        assert_eq!(rec.auxiliary().len(), 2);
        assert_eq!(rec.auxiliary_of(ChannelKind::Ecg).len(), 1);
        assert_eq!(rec.n_samples(), 4);
        assert_eq!(rec.stage(), RecordingStage::Raw);
        assert!(rec.validate().is_ok());
    }

    #[test]
    fn test_rejects_mismatched_lengths() {
        let result = Recording::new(
            100.0,
            vec![Channel::new("A", vec![0.0; 3]), Channel::new("B", vec![0.0; 4])],
        );
        assert!(matches!(result, Err(EegError::Validation { .. })));
    }

    #[test]
    fn test_rejects_duplicate_names_and_bad_rate() {
        let dup = Recording::new(
            100.0,
            vec![Channel::new("A", vec![0.0]), Channel::new("A", vec![0.0])],
        );
        assert!(dup.is_err());
        assert!(Recording::new(0.0, vec![Channel::new("A", vec![0.0])]).is_err());
    }

    #[test]
    fn test_validate_catches_nan_and_empty() {
        let rec = Recording::new(100.0, vec![Channel::new("A", vec![0.0, f64::NAN])]).unwrap();
        let err = rec.validate().unwrap_err();
        assert!(err.to_string().contains("NaN"));

        let aux_only = Recording::new(100.0, vec![Channel::new("ECG", vec![0.0])]).unwrap();
        assert!(aux_only.validate().is_err());
    }

    #[test]
    fn test_derive_keeps_original() {
        let raw = sample_recording().with_source(Fingerprint::of_bytes(b"x"));
        let filtered = raw
            .derive(RecordingStage::Filtered, vec![vec![0.0; 4], vec![1.0; 4]])
            .unwrap();

        assert_eq!(filtered.stage(), RecordingStage::Filtered);
        assert_eq!(filtered.source(), raw.source());
        assert_eq!(filtered.auxiliary().len(), 2);
        assert_eq!(raw.channels()[0].data, vec![1.0, 2.0, 3.0, 4.0]);

        assert!(raw.derive(RecordingStage::Filtered, vec![vec![0.0; 4]]).is_err());
        assert!(raw
            .derive(RecordingStage::Filtered, vec![vec![0.0; 4], vec![0.0; 3]])
            .is_err());
    }

    #[test]
    fn test_channel_stats() {
        let rec = sample_recording();
        let stats = rec.channel_stats(0).unwrap();
        assert!((stats.mean - 2.5).abs() < 1e-12);
        assert!((stats.peak_to_peak - 3.0).abs() < 1e-12);
        assert!(rec.channel_stats(5).is_err());
    }
}
