//! Bad channel detection and interpolation

use crate::config::BadChannelConfig;
use crate::stats::{mad, median, std_dev, variance};
use eeg_core::{EegResult, Recording, RecordingStage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Scale factor turning a MAD into a standard-deviation estimate
const MAD_TO_SD: f64 = 1.4826;

/// Approximate 10-20 electrode positions on the unit sphere
/// (x to the right ear, y to the nasion, z to the vertex)
const POSITIONS_1020: &[(&str, [f64; 3])] = &[
    ("FPZ", [0.0, 1.0, 0.0]),
    ("FP1", [-0.31, 0.95, 0.0]),
    ("FP2", [0.31, 0.95, 0.0]),
    ("AF3", [-0.41, 0.86, 0.31]),
    ("AF4", [0.41, 0.86, 0.31]),
    ("F7", [-0.81, 0.59, 0.0]),
    ("F3", [-0.55, 0.67, 0.50]),
    ("FZ", [0.0, 0.72, 0.69]),
    ("F4", [0.55, 0.67, 0.50]),
    ("F8", [0.81, 0.59, 0.0]),
    ("FC5", [-0.87, 0.33, 0.36]),
    ("FC1", [-0.36, 0.37, 0.86]),
    ("FC2", [0.36, 0.37, 0.86]),
    ("FC6", [0.87, 0.33, 0.36]),
    ("T7", [-1.0, 0.0, 0.0]),
    ("T3", [-1.0, 0.0, 0.0]),
    ("C3", [-0.72, 0.0, 0.69]),
    ("CZ", [0.0, 0.0, 1.0]),
    ("C4", [0.72, 0.0, 0.69]),
    ("T8", [1.0, 0.0, 0.0]),
    ("T4", [1.0, 0.0, 0.0]),
    ("CP5", [-0.87, -0.33, 0.36]),
    ("CP1", [-0.36, -0.37, 0.86]),
    ("CP2", [0.36, -0.37, 0.86]),
    ("CP6", [0.87, -0.33, 0.36]),
    ("P7", [-0.81, -0.59, 0.0]),
    ("T5", [-0.81, -0.59, 0.0]),
    ("P3", [-0.55, -0.67, 0.50]),
    ("PZ", [0.0, -0.72, 0.69]),
    ("P4", [0.55, -0.67, 0.50]),
    ("P8", [0.81, -0.59, 0.0]),
    ("T6", [0.81, -0.59, 0.0]),
    ("PO3", [-0.41, -0.86, 0.31]),
    ("PO4", [0.41, -0.86, 0.31]),
    ("O1", [-0.31, -0.95, 0.0]),
    ("OZ", [0.0, -1.0, 0.0]),
    ("O2", [0.31, -0.95, 0.0]),
];

/// Upper-case electrode label with decorations such as `EEG Fp1-REF` removed
pub fn electrode_label(name: &str) -> Option<String> {
    let upper = name.trim().to_ascii_uppercase();
    let stripped = upper.strip_prefix("EEG").unwrap_or(&upper);
    stripped
        .trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .split(['-', ' ', '_'])
        .next()
        .filter(|label| !label.is_empty())
        .map(str::to_string)
}

/// Position of a channel on the 10-20 layout, if its label is recognised
pub fn position_1020(name: &str) -> Option<[f64; 3]> {
    let label = electrode_label(name)?;
    POSITIONS_1020
        .iter()
        .find(|(known, _)| *known == label)
        .map(|(_, pos)| *pos)
}

fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
}

/// Outcome of the bad channel stage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BadChannelReport {
    /// Channels marked bad (flat, outlying or pre-flagged)
    pub bad: Vec<String>,
    /// Channels replaced by interpolation
    pub interpolated: Vec<String>,
    /// Channels left unchanged for lack of good neighbours
    pub unrepaired: Vec<String>,
    /// Data of each bad channel before interpolation
    #[serde(skip)]
    pub originals: BTreeMap<String, Vec<f64>>,
}

/// Flags flat and outlying channels
#[derive(Debug, Clone, Default)]
pub struct BadChannelDetector {
    config: BadChannelConfig,
}

impl BadChannelDetector {
    pub fn new(config: BadChannelConfig) -> Self {
        Self { config }
    }

    /// Indices of bad EEG channels, pre-flagged ones included
    pub fn detect(&self, recording: &Recording) -> Vec<usize> {
        let channels = recording.channels();
        let mut bad = vec![false; channels.len()];

        for (i, channel) in channels.iter().enumerate() {
            if channel.bad {
                bad[i] = true;
            } else if std_dev(&channel.data) <= self.config.flat_threshold {
                debug!(channel = %channel.name, "flat channel");
                bad[i] = true;
            }
        }

        // Robust z-score of log-variance over the remaining channels
        let candidates: Vec<(usize, f64)> = channels
            .iter()
            .enumerate()
            .filter(|(i, _)| !bad[*i])
            .map(|(i, c)| (i, variance(&c.data).ln()))
            .collect();
        if candidates.len() >= 3 {
            let log_vars: Vec<f64> = candidates.iter().map(|(_, v)| *v).collect();
            let center = median(&log_vars);
            let spread = mad(&log_vars) * MAD_TO_SD;
            if spread > 0.0 {
                for (i, log_var) in candidates {
                    let z = (log_var - center) / spread;
                    if z.abs() > self.config.z_threshold {
                        debug!(channel = %channels[i].name, z, "outlying channel variance");
                        bad[i] = true;
                    }
                }
            }
        }

        bad.iter()
            .enumerate()
            .filter(|(_, &b)| b)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Replaces bad channels with a distance-weighted mix of good neighbours
#[derive(Debug, Clone)]
pub struct ChannelInterpolator {
    n_neighbors: usize,
}

impl Default for ChannelInterpolator {
    fn default() -> Self {
        Self { n_neighbors: 4 }
    }
}

impl ChannelInterpolator {
    pub fn new(n_neighbors: usize) -> Self {
        Self {
            n_neighbors: n_neighbors.max(1),
        }
    }

    /// Neighbour indices and weights for channel `target`
    fn neighbours(&self, recording: &Recording, target: usize, good: &[usize]) -> Vec<(usize, f64)> {
        let names: Vec<&str> = recording.channels().iter().map(|c| c.name.as_str()).collect();

        let by_position = position_1020(names[target]).and_then(|origin| {
            let mut ranked: Vec<(usize, f64)> = good
                .iter()
                .filter_map(|&j| position_1020(names[j]).map(|p| (j, distance(&origin, &p))))
                .collect();
            if ranked.is_empty() {
                return None;
            }
            ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
            ranked.truncate(self.n_neighbors);
            Some(ranked)
        });

        let ranked = by_position.unwrap_or_else(|| {
            let mut ranked: Vec<(usize, f64)> = good
                .iter()
                .map(|&j| (j, (j as f64 - target as f64).abs()))
                .collect();
            ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
            ranked.truncate(self.n_neighbors);
            ranked
        });

        // A neighbour at zero distance takes all the weight
        if let Some(&(j, _)) = ranked.iter().find(|(_, d)| *d <= f64::EPSILON) {
            return vec![(j, 1.0)];
        }
        let total: f64 = ranked.iter().map(|(_, d)| 1.0 / d).sum();
        ranked.into_iter().map(|(j, d)| (j, (1.0 / d) / total)).collect()
    }

    /// Derive a recording with `bad` channels interpolated and all flags reset
    pub fn interpolate(
        &self,
        recording: &Recording,
        bad: &[usize],
    ) -> EegResult<(Recording, BadChannelReport)> {
        let channels = recording.channels();
        let mut report = BadChannelReport::default();
        let good: Vec<usize> = (0..channels.len()).filter(|i| !bad.contains(i)).collect();
        let mut data: Vec<Vec<f64>> = channels.iter().map(|c| c.data.clone()).collect();

        for &target in bad {
            let name = channels[target].name.clone();
            report.bad.push(name.clone());
            report.originals.insert(name.clone(), channels[target].data.clone());

            if good.is_empty() {
                warn!(channel = %name, "no good neighbours, channel left unchanged");
                report.unrepaired.push(name);
                continue;
            }

            let weights = self.neighbours(recording, target, &good);
            let mut row = vec![0.0; recording.n_samples()];
            for (j, w) in &weights {
                for (out, v) in row.iter_mut().zip(&channels[*j].data) {
                    *out += w * v;
                }
            }
            debug!(channel = %name, neighbours = weights.len(), "interpolated");
            data[target] = row;
            report.interpolated.push(name);
        }

        let derived = recording
            .derive(RecordingStage::Filtered, data)?
            .with_bad_flags(&vec![false; channels.len()]);
        Ok((derived, report))
    }
}
