//! Seeded EEG simulator
//!
//! Each channel is a mix of theta, alpha and beta rhythms with random phase,
//! Gaussian background noise and a slow baseline wander. Optional line hum
//! and physiological artifacts are layered on top; every enabled artifact
//! also gets its own reference channel (EOG, ECG, ACC) so downstream
//! detectors have something to correlate against.

use eeg_core::{Channel, EegError, EegResult, Recording};
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Electrode labels in the order channels are produced
pub const STANDARD_MONTAGE: &[&str] = &[
    "Fp1", "Fp2", "F3", "F4", "C3", "C4", "O1", "O2", "F7", "F8", "T3", "T4", "P3", "P4", "T5",
    "T6", "Fz", "Cz", "Pz",
];

/// Which artifacts to inject
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Eye blinks, strongest on frontal-polar sites
    pub blinks: bool,
    /// Cardiac field leaking into every electrode
    pub heartbeat: bool,
    /// Head movement bursts
    pub motion: bool,
}

impl ArtifactConfig {
    pub fn all() -> Self {
        Self {
            blinks: true,
            heartbeat: true,
            motion: true,
        }
    }

    pub fn any(&self) -> bool {
        self.blinks || self.heartbeat || self.motion
    }
}

/// Simulation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub channels: usize,
    pub seconds: f64,
    pub sampling_rate: f64,
    /// Fixed seed for reproducible output; wall clock when absent
    pub seed: Option<u64>,
    /// Mains frequency of the injected hum, none for a clean signal
    pub line_freq: Option<f64>,
    /// Background noise standard deviation (µV)
    pub noise_std: f64,
    pub artifacts: ArtifactConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            channels: 8,
            seconds: 10.0,
            sampling_rate: 256.0,
            seed: None,
            line_freq: Some(50.0),
            noise_std: 2.0,
            artifacts: ArtifactConfig::default(),
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> EegResult<()> {
        if self.channels == 0 || self.channels > STANDARD_MONTAGE.len() {
            return Err(EegError::invalid_parameter(
                "channels",
                format!("must be between 1 and {}", STANDARD_MONTAGE.len()),
            ));
        }
        if !self.sampling_rate.is_finite() || self.sampling_rate <= 0.0 {
            return Err(EegError::invalid_parameter("sampling_rate", "must be positive"));
        }
        if !self.seconds.is_finite() || self.seconds * self.sampling_rate < 1.0 {
            return Err(EegError::invalid_parameter(
                "seconds",
                "must cover at least one sample",
            ));
        }
        if let Some(freq) = self.line_freq {
            if !freq.is_finite() || freq <= 0.0 {
                return Err(EegError::invalid_parameter("line_freq", "must be positive"));
            }
        }
        if !self.noise_std.is_finite() || self.noise_std < 0.0 {
            return Err(EegError::invalid_parameter("noise_std", "must be non-negative"));
        }
        Ok(())
    }

    pub fn n_samples(&self) -> usize {
        (self.seconds * self.sampling_rate).round() as usize
    }
}

/// Rhythm amplitudes (µV) for one electrode
#[derive(Debug, Clone, Copy)]
struct RhythmProfile {
    theta: f64,
    alpha: f64,
    beta: f64,
}

impl RhythmProfile {
    /// Alpha dominates posterior sites, theta frontal ones
    fn for_label(label: &str) -> Self {
        match label.chars().next() {
            Some('O') | Some('P') => Self {
                theta: 4.0,
                alpha: 20.0,
                beta: 3.0,
            },
            Some('F') => Self {
                theta: 8.0,
                alpha: 6.0,
                beta: 4.0,
            },
            _ => Self {
                theta: 5.0,
                alpha: 10.0,
                beta: 5.0,
            },
        }
    }
}

/// How strongly a blink reaches an electrode
fn blink_weight(label: &str) -> f64 {
    if label.starts_with("Fp") {
        1.0
    } else if label.starts_with('F') {
        0.4
    } else {
        0.05
    }
}

fn gaussian_pulse(t: f64, center: f64, width: f64) -> f64 {
    (-0.5 * ((t - center) / width).powi(2)).exp()
}

/// Random event onsets with gaps drawn from `[min_gap, max_gap)` seconds
fn event_times<R: Rng>(rng: &mut R, seconds: f64, min_gap: f64, max_gap: f64) -> Vec<f64> {
    let mut times = Vec::new();
    let mut t = rng.gen_range(0.0..max_gap);
    while t < seconds {
        times.push(t);
        t += rng.gen_range(min_gap..max_gap);
    }
    times
}

/// Seeded EEG generator
pub struct EegSimulator {
    config: SimulationConfig,
    rng: rand::rngs::StdRng,
    normal_dist: Normal<f64>,
}

impl EegSimulator {
    pub fn new(config: SimulationConfig) -> EegResult<Self> {
        config.validate()?;

        let seed = config.seed.unwrap_or_else(|| {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        });
        let rng = rand::rngs::StdRng::seed_from_u64(seed);
        let normal_dist = Normal::new(0.0, config.noise_std).map_err(|e| {
            EegError::invalid_parameter("noise_std", format!("bad noise distribution: {}", e))
        })?;

        Ok(EegSimulator {
            config,
            rng,
            normal_dist,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Generate one recording
    ///
    /// Successive calls continue the random stream, so two simulators with
    /// the same seed produce the same sequence of recordings.
    pub fn generate(&mut self) -> EegResult<Recording> {
        let fs = self.config.sampling_rate;
        let n = self.config.n_samples();
        let seconds = n as f64 / fs;
        let artifacts = self.config.artifacts.clone();

        let blinks = if artifacts.blinks {
            event_times(&mut self.rng, seconds, 2.0, 6.0)
        } else {
            Vec::new()
        };
        let motion_bursts = if artifacts.motion {
            event_times(&mut self.rng, seconds, 3.0, 8.0)
        } else {
            Vec::new()
        };
        let heart_rate = self.rng.gen_range(1.0..1.4);

        let blink_at = |t: f64| -> f64 {
            blinks
                .iter()
                .map(|&onset| gaussian_pulse(t, onset, 0.08))
                .sum()
        };
        let heartbeat_at = |t: f64| -> f64 {
            let phase = (t * heart_rate).fract() / heart_rate;
            gaussian_pulse(phase, 0.5 / heart_rate, 0.012)
        };
        let motion_at = |t: f64| -> f64 {
            motion_bursts
                .iter()
                .filter(|&&onset| t >= onset && t < onset + 1.0)
                .map(|&onset| (2.0 * PI * 3.0 * (t - onset)).sin())
                .sum()
        };

        let mut channels = Vec::with_capacity(self.config.channels + 3);
        for label in STANDARD_MONTAGE.iter().take(self.config.channels) {
            let profile = RhythmProfile::for_label(label);
            let theta_f = self.rng.gen_range(5.0..7.0);
            let alpha_f = self.rng.gen_range(9.0..11.5);
            let beta_f = self.rng.gen_range(16.0..24.0);
            let phases: [f64; 4] = [
                self.rng.gen_range(0.0..2.0 * PI),
                self.rng.gen_range(0.0..2.0 * PI),
                self.rng.gen_range(0.0..2.0 * PI),
                self.rng.gen_range(0.0..2.0 * PI),
            ];
            let blink_gain = blink_weight(label) * 120.0;

            let mut data = Vec::with_capacity(n);
            for i in 0..n {
                let t = i as f64 / fs;
                let mut value = profile.theta * (2.0 * PI * theta_f * t + phases[0]).sin()
                    + profile.alpha * (2.0 * PI * alpha_f * t + phases[1]).sin()
                    + profile.beta * (2.0 * PI * beta_f * t + phases[2]).sin();

                // Baseline wander
                value += 3.0 * (2.0 * PI * 0.1 * t + phases[3]).sin();
                value += self.normal_dist.sample(&mut self.rng);

                if let Some(line) = self.config.line_freq {
                    value += 5.0 * (2.0 * PI * line * t).sin();
                }
                if artifacts.blinks {
                    value += blink_gain * blink_at(t);
                }
                if artifacts.heartbeat {
                    value += 4.0 * heartbeat_at(t);
                }
                if artifacts.motion {
                    value += 25.0 * motion_at(t);
                }
                data.push(value);
            }
            channels.push(Channel::new(*label, data));
        }

        if artifacts.blinks {
            let data = (0..n)
                .map(|i| {
                    let t = i as f64 / fs;
                    200.0 * blink_at(t) + 0.5 * self.normal_dist.sample(&mut self.rng)
                })
                .collect();
            channels.push(Channel::new("EOG", data));
        }
        if artifacts.heartbeat {
            let data = (0..n)
                .map(|i| {
                    let t = i as f64 / fs;
                    1000.0 * heartbeat_at(t) + 0.5 * self.normal_dist.sample(&mut self.rng)
                })
                .collect();
            channels.push(Channel::new("ECG", data));
        }
        if artifacts.motion {
            // Gravity plus the movement bursts, in g
            let data = (0..n)
                .map(|i| {
                    let t = i as f64 / fs;
                    1.0 + 0.8 * motion_at(t) + 0.01 * self.rng.gen_range(-1.0..1.0)
                })
                .collect();
            channels.push(Channel::new("ACC", data));
        }

        Recording::new(fs, channels)
    }
}
