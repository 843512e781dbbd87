//! Spectral estimation
//!
//! Welch's averaged periodogram with a periodic Hann window, constant
//! detrending per segment and one-sided density scaling (V²/Hz).

use eeg_core::{EegError, EegResult};
use num_complex::Complex;
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Power spectral density of one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Psd {
    pub freqs: Vec<f64>,
    pub power: Vec<f64>,
}

impl Psd {
    /// Mean density over bins with `low <= f <= high`; 0 when no bin falls inside
    pub fn band_mean(&self, low: f64, high: f64) -> f64 {
        let (sum, count) = self
            .freqs
            .iter()
            .zip(self.power.iter())
            .filter(|(f, _)| **f >= low && **f <= high)
            .fold((0.0, 0usize), |(s, c), (_, p)| (s + p, c + 1));
        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }

    /// Summed density over bins in `[low, high)`
    pub fn band_sum(&self, low: f64, high: f64) -> f64 {
        self.freqs
            .iter()
            .zip(self.power.iter())
            .filter(|(f, _)| **f >= low && **f < high)
            .map(|(_, p)| p)
            .sum()
    }

    /// Frequency spacing between bins
    pub fn resolution(&self) -> f64 {
        match self.freqs.as_slice() {
            [first, second, ..] => second - first,
            _ => 0.0,
        }
    }

    /// Restrict to `[fmin, fmax]`
    pub fn crop(&self, fmin: f64, fmax: f64) -> Psd {
        let (freqs, power) = self
            .freqs
            .iter()
            .zip(self.power.iter())
            .filter(|(f, _)| **f >= fmin && **f <= fmax)
            .map(|(f, p)| (*f, *p))
            .unzip();
        Psd { freqs, power }
    }
}

/// Periodic Hann window
pub fn hann(len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / len as f64).cos())
        .collect()
}

/// Welch estimator with a reusable FFT plan
pub struct Welch {
    segment: usize,
    overlap: f64,
    planner: RealFftPlanner<f64>,
}

impl Welch {
    /// `segment` samples per window, `overlap` as a fraction in [0, 1)
    pub fn new(segment: usize, overlap: f64) -> Self {
        Self {
            segment,
            overlap,
            planner: RealFftPlanner::new(),
        }
    }

    /// Estimate the PSD of `data` sampled at `fs`
    ///
    /// A recording shorter than the configured segment is analysed as a
    /// single segment of its own length.
    pub fn estimate(&mut self, data: &[f64], fs: f64) -> EegResult<Psd> {
        let n = data.len();
        if n < 2 {
            return Err(EegError::processing(format!(
                "cannot estimate a spectrum from {} samples",
                n
            )));
        }

        let seg = self.segment.min(n).max(2);
        let step = ((seg as f64 * (1.0 - self.overlap)).round() as usize).clamp(1, seg);
        let n_segments = (n - seg) / step + 1;

        let window = hann(seg);
        let window_power: f64 = window.iter().map(|w| w * w).sum();
        let scale = 1.0 / (fs * window_power);

        let fft = self.planner.plan_fft_forward(seg);
        let mut input = fft.make_input_vec();
        let mut spectrum: Vec<Complex<f64>> = fft.make_output_vec();
        let n_bins = spectrum.len();
        let mut accum = vec![0.0; n_bins];

        for s in 0..n_segments {
            let chunk = &data[s * step..s * step + seg];
            let mean = chunk.iter().sum::<f64>() / seg as f64;
            for ((slot, &x), &w) in input.iter_mut().zip(chunk).zip(&window) {
                *slot = (x - mean) * w;
            }
            fft.process(&mut input, &mut spectrum)
                .map_err(|e| EegError::processing(format!("FFT failed: {}", e)))?;
            for (acc, c) in accum.iter_mut().zip(spectrum.iter()) {
                *acc += c.norm_sqr();
            }
        }

        let last = n_bins - 1;
        let power = accum
            .iter()
            .enumerate()
            .map(|(k, &p)| {
                let density = p * scale / n_segments as f64;
                // DC and (for even lengths) Nyquist appear once in the one-sided spectrum
                if k == 0 || (seg % 2 == 0 && k == last) {
                    density
                } else {
                    2.0 * density
                }
            })
            .collect();
        let freqs = (0..n_bins).map(|k| k as f64 * fs / seg as f64).collect();

        Ok(Psd { freqs, power })
    }
}

/// One-shot Welch estimate
pub fn welch(data: &[f64], fs: f64, segment: usize, overlap: f64) -> EegResult<Psd> {
    Welch::new(segment, overlap).estimate(data, fs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hann_endpoints() {
        let w = hann(8);
        assert_eq!(w[0], 0.0);
        assert!((w[4] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_peak_at_tone_frequency() {
        let fs = 256.0;
        let data: Vec<f64> = (0..4096)
            .map(|i| (2.0 * PI * 10.0 * i as f64 / fs).sin())
            .collect();
        let psd = welch(&data, fs, 2048, 0.5).unwrap();

        let peak = psd
            .power
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| psd.freqs[i])
            .unwrap();
        assert!((peak - 10.0).abs() < 0.2);
        assert_eq!(psd.freqs.len(), 1025);
        assert!((psd.resolution() - 0.125).abs() < 1e-12);
    }

    #[test]
    fn test_parseval_for_white_noise_level() {
        // Integrated density matches signal variance
        let fs = 100.0;
        let data: Vec<f64> = (0..8192)
            .map(|i| if i % 2 == 0 { 1.0 } else { -1.0 } * ((i * 7919) % 13) as f64 / 13.0)
            .collect();
        let psd = welch(&data, fs, 1024, 0.5).unwrap();
        let integrated: f64 = psd.power.iter().sum::<f64>() * psd.resolution();
        let mean = data.iter().sum::<f64>() / data.len() as f64;
        let var = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / data.len() as f64;
        assert!((integrated / var - 1.0).abs() < 0.1);
    }

    #[test]
    fn test_short_recording_uses_own_length() {
        let data = vec![0.0, 1.0, 0.0, -1.0, 0.0, 1.0, 0.0, -1.0, 0.0, 1.0];
        let psd = welch(&data, 10.0, 2048, 0.5).unwrap();
        assert_eq!(psd.freqs.len(), 6);
        assert!(psd.power.iter().all(|p| p.is_finite()));
        assert!(welch(&[1.0], 10.0, 2048, 0.5).is_err());
    }

    #[test]
    fn test_band_mean_inclusive() {
        let psd = Psd {
            freqs: vec![0.0, 1.0, 2.0, 3.0, 4.0],
            power: vec![10.0, 1.0, 2.0, 3.0, 4.0],
        };
        assert_eq!(psd.band_mean(1.0, 4.0), 2.5);
        assert_eq!(psd.band_mean(5.0, 6.0), 0.0);
        assert_eq!(psd.band_sum(1.0, 3.0), 3.0);
        assert_eq!(psd.crop(1.0, 2.0).freqs, vec![1.0, 2.0]);
    }
}
