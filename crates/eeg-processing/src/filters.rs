//! Digital filters for EEG preprocessing
//!
//! All IIR filters are cascades of biquad sections run forward and backward
//! (zero phase). Each pass starts from the steady-state response to the
//! first sample, and the signal is padded with an odd extension, so edges
//! do not ring.

use crate::processor::RecordingProcessor;
use eeg_core::{EegError, EegResult, Recording, RecordingStage};
use rayon::prelude::*;
use std::f64::consts::PI;
use tracing::debug;

/// Pass band of a Butterworth section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Response {
    Lowpass,
    Highpass,
}

/// Single biquad section (2nd order)
///
/// y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2] - a1*y[n-1] - a2*y[n-2]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadSection {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadSection {
    /// Gain at 0 Hz
    pub fn dc_gain(&self) -> f64 {
        let den = 1.0 + self.a1 + self.a2;
        if den.abs() < f64::EPSILON {
            return 0.0;
        }
        (self.b0 + self.b1 + self.b2) / den
    }

    /// State after an infinitely long unit step, in transposed direct form II
    fn step_state(&self) -> (f64, f64) {
        let g = self.dc_gain();
        (g - self.b0, self.b2 - self.a2 * g)
    }

    /// Filter in place, transposed direct form II, from state `(z1, z2)`
    fn run(&self, data: &mut [f64], (mut z1, mut z2): (f64, f64)) {
        for x in data.iter_mut() {
            let input = *x;
            let output = self.b0 * input + z1;
            z1 = self.b1 * input - self.a1 * output + z2;
            z2 = self.b2 * input - self.a2 * output;
            *x = output;
        }
    }

    fn second_order(kind: Response, k: f64, q: f64) -> Self {
        let k2 = k * k;
        let norm = 1.0 / (1.0 + k / q + k2);
        let a1 = 2.0 * (k2 - 1.0) * norm;
        let a2 = (1.0 - k / q + k2) * norm;
        match kind {
            Response::Highpass => BiquadSection {
                b0: norm,
                b1: -2.0 * norm,
                b2: norm,
                a1,
                a2,
            },
            Response::Lowpass => {
                let b0 = k2 * norm;
                BiquadSection {
                    b0,
                    b1: 2.0 * b0,
                    b2: b0,
                    a1,
                    a2,
                }
            }
        }
    }

    fn first_order(kind: Response, k: f64) -> Self {
        let norm = 1.0 / (k + 1.0);
        let a1 = (k - 1.0) * norm;
        match kind {
            Response::Highpass => BiquadSection {
                b0: norm,
                b1: -norm,
                b2: 0.0,
                a1,
                a2: 0.0,
            },
            Response::Lowpass => BiquadSection {
                b0: k * norm,
                b1: k * norm,
                b2: 0.0,
                a1,
                a2: 0.0,
            },
        }
    }

    /// Notch biquad at `freq` with quality factor `q`
    pub fn notch(freq: f64, q: f64, fs: f64) -> Self {
        let omega = 2.0 * PI * freq / fs;
        let alpha = omega.sin() / (2.0 * q);
        let cos_omega = omega.cos();
        let a0 = 1.0 + alpha;

        BiquadSection {
            b0: 1.0 / a0,
            b1: -2.0 * cos_omega / a0,
            b2: 1.0 / a0,
            a1: -2.0 * cos_omega / a0,
            a2: (1.0 - alpha) / a0,
        }
    }
}

/// Cascade of biquad sections
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SosFilter {
    sections: Vec<BiquadSection>,
}

impl SosFilter {
    pub fn new(sections: Vec<BiquadSection>) -> Self {
        Self { sections }
    }

    pub fn sections(&self) -> &[BiquadSection] {
        &self.sections
    }

    /// Append another cascade after this one
    pub fn chain(mut self, other: SosFilter) -> Self {
        self.sections.extend(other.sections);
        self
    }

    /// Butterworth low-pass of the given order
    pub fn butterworth_lowpass(order: usize, cutoff: f64, fs: f64) -> EegResult<Self> {
        Self::butterworth(Response::Lowpass, order, cutoff, fs)
    }

    /// Butterworth high-pass of the given order
    pub fn butterworth_highpass(order: usize, cutoff: f64, fs: f64) -> EegResult<Self> {
        Self::butterworth(Response::Highpass, order, cutoff, fs)
    }

    fn butterworth(kind: Response, order: usize, cutoff: f64, fs: f64) -> EegResult<Self> {
        if order == 0 {
            return Err(EegError::invalid_parameter("filter_order", "must be at least 1"));
        }
        if !(cutoff > 0.0 && cutoff < fs / 2.0) {
            return Err(EegError::invalid_parameter(
                "cutoff_freq",
                format!("{} Hz must lie in (0, {}) Hz", cutoff, fs / 2.0),
            ));
        }

        // Pre-warp frequency for bilinear transform
        let k = (PI * cutoff / fs).tan();

        let mut sections = Vec::with_capacity((order + 1) / 2);
        for pair in 0..order / 2 {
            let angle = PI * (2 * pair + 1) as f64 / (2 * order) as f64;
            let q = 1.0 / (2.0 * angle.sin());
            sections.push(BiquadSection::second_order(kind, k, q));
        }
        if order % 2 == 1 {
            sections.push(BiquadSection::first_order(kind, k));
        }

        Ok(Self { sections })
    }

    /// Notch sections at `freq` and every harmonic strictly below Nyquist
    pub fn notch_harmonics(freq: f64, q: f64, fs: f64) -> Self {
        let sections = line_harmonics(freq, fs)
            .into_iter()
            .map(|f| BiquadSection::notch(f, q, fs))
            .collect();
        Self { sections }
    }

    /// Gain at 0 Hz of the whole cascade
    pub fn dc_gain(&self) -> f64 {
        self.sections.iter().map(BiquadSection::dc_gain).product()
    }

    /// Single causal pass, initialised to the steady state of `data[0]`
    pub fn filter(&self, data: &[f64]) -> Vec<f64> {
        let mut out = data.to_vec();
        self.filter_in_place(&mut out);
        out
    }

    fn filter_in_place(&self, data: &mut [f64]) {
        let Some(&x0) = data.first() else {
            return;
        };
        let mut level = x0;
        for section in &self.sections {
            let (z1, z2) = section.step_state();
            section.run(data, (z1 * level, z2 * level));
            level *= section.dc_gain();
        }
    }

    /// Forward-backward filtering with odd-extension padding
    pub fn filtfilt(&self, data: &[f64]) -> Vec<f64> {
        let n = data.len();
        if n == 0 || self.sections.is_empty() {
            return data.to_vec();
        }

        let padlen = (3 * (2 * self.sections.len() + 1)).min(n - 1);
        let first = data[0];
        let last = data[n - 1];

        let mut ext = Vec::with_capacity(n + 2 * padlen);
        ext.extend((1..=padlen).rev().map(|i| 2.0 * first - data[i]));
        ext.extend_from_slice(data);
        ext.extend((1..=padlen).map(|i| 2.0 * last - data[n - 1 - i]));

        self.filter_in_place(&mut ext);
        ext.reverse();
        self.filter_in_place(&mut ext);
        ext.reverse();

        ext[padlen..padlen + n].to_vec()
    }
}

/// Line frequency and its harmonics strictly below Nyquist
pub fn line_harmonics(freq: f64, fs: f64) -> Vec<f64> {
    let nyquist = fs / 2.0;
    if !(freq > 0.0) {
        return Vec::new();
    }
    (1..)
        .map(|h| freq * h as f64)
        .take_while(|&f| f < nyquist)
        .collect()
}

fn filter_channels(input: &Recording, filter: &SosFilter) -> Vec<Vec<f64>> {
    input
        .channels()
        .par_iter()
        .map(|channel| filter.filtfilt(&channel.data))
        .collect()
}

/// Zero-phase Butterworth band-pass
///
/// Implemented as a high-pass at `l_freq` cascaded with a low-pass at
/// `h_freq`, each of order `order`.
#[derive(Debug, Clone)]
pub struct BandPassFilter {
    pub l_freq: f64,
    pub h_freq: f64,
    pub order: usize,
}

impl BandPassFilter {
    pub fn new(l_freq: f64, h_freq: f64, order: usize) -> Self {
        Self {
            l_freq,
            h_freq,
            order,
        }
    }

    pub fn design(&self, fs: f64) -> EegResult<SosFilter> {
        if self.l_freq >= self.h_freq {
            return Err(EegError::invalid_parameter(
                "h_freq",
                "low cutoff must be less than high cutoff",
            ));
        }
        let highpass = SosFilter::butterworth_highpass(self.order, self.l_freq, fs)?;
        let lowpass = SosFilter::butterworth_lowpass(self.order, self.h_freq, fs)?;
        Ok(highpass.chain(lowpass))
    }
}

impl RecordingProcessor for BandPassFilter {
    fn process(&self, input: &Recording) -> EegResult<Recording> {
        let filter = self.design(input.sampling_rate())?;
        debug!(
            l_freq = self.l_freq,
            h_freq = self.h_freq,
            sections = filter.sections().len(),
            "band-pass designed"
        );
        input.derive(RecordingStage::Filtered, filter_channels(input, &filter))
    }

    fn name(&self) -> &str {
        "bandpass"
    }
}

/// Zero-phase notch at the line frequency and its harmonics
#[derive(Debug, Clone)]
pub struct NotchFilter {
    pub notch_freq: f64,
    pub q_factor: f64,
}

impl NotchFilter {
    pub fn new(notch_freq: f64, q_factor: f64) -> Self {
        Self {
            notch_freq,
            q_factor,
        }
    }
}

impl RecordingProcessor for NotchFilter {
    fn process(&self, input: &Recording) -> EegResult<Recording> {
        let filter = SosFilter::notch_harmonics(self.notch_freq, self.q_factor, input.sampling_rate());
        debug!(
            notch_freq = self.notch_freq,
            harmonics = filter.sections().len(),
            "notch designed"
        );
        input.derive(RecordingStage::Filtered, filter_channels(input, &filter))
    }

    fn name(&self) -> &str {
        "notch"
    }
}

/// Residual line-noise removal by windowed sinusoid fitting
///
/// Each window is fitted by least squares with a cosine/sine pair at the
/// line frequency and each harmonic below Nyquist; the fit is subtracted.
#[derive(Debug, Clone)]
pub struct LineNoiseRemover {
    pub line_freq: f64,
    pub window_secs: f64,
}

impl LineNoiseRemover {
    pub fn new(line_freq: f64, window_secs: f64) -> Self {
        Self {
            line_freq,
            window_secs,
        }
    }

    /// Clean one channel
    pub fn clean(&self, data: &[f64], fs: f64) -> Vec<f64> {
        let harmonics = line_harmonics(self.line_freq, fs);
        let window = ((self.window_secs * fs).round() as usize).max(1);
        let mut out = data.to_vec();

        for chunk in out.chunks_mut(window) {
            for &freq in &harmonics {
                subtract_sinusoid(chunk, freq, fs);
            }
        }
        out
    }
}

/// Least-squares fit of a*cos + b*sin at `freq`, subtracted in place
fn subtract_sinusoid(chunk: &mut [f64], freq: f64, fs: f64) {
    let omega = 2.0 * PI * freq / fs;
    let (mut cc, mut cs, mut ss, mut xc, mut xs) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for (i, &x) in chunk.iter().enumerate() {
        let (s, c) = (omega * i as f64).sin_cos();
        cc += c * c;
        cs += c * s;
        ss += s * s;
        xc += x * c;
        xs += x * s;
    }

    let det = cc * ss - cs * cs;
    if det.abs() < 1e-9 * (cc * ss).max(1.0) {
        return;
    }
    let a = (xc * ss - xs * cs) / det;
    let b = (xs * cc - xc * cs) / det;

    for (i, x) in chunk.iter_mut().enumerate() {
        let (s, c) = (omega * i as f64).sin_cos();
        *x -= a * c + b * s;
    }
}

impl RecordingProcessor for LineNoiseRemover {
    fn process(&self, input: &Recording) -> EegResult<Recording> {
        let fs = input.sampling_rate();
        let cleaned = input
            .channels()
            .par_iter()
            .map(|channel| self.clean(&channel.data, fs))
            .collect();
        input.derive(RecordingStage::Filtered, cleaned)
    }

    fn name(&self) -> &str {
        "line_noise"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eeg_core::Channel;

    fn tone(freq: f64, fs: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| (2.0 * PI * freq * i as f64 / fs).sin()).collect()
    }

    fn rms_middle(data: &[f64]) -> f64 {
        let quarter = data.len() / 4;
        let mid = &data[quarter..data.len() - quarter];
        (mid.iter().map(|x| x * x).sum::<f64>() / mid.len() as f64).sqrt()
    }

    #[test]
    fn test_butterworth_section_count() {
        let lp = SosFilter::butterworth_lowpass(4, 40.0, 256.0).unwrap();
        assert_eq!(lp.sections().len(), 2);
        let odd = SosFilter::butterworth_highpass(3, 1.0, 256.0).unwrap();
        assert_eq!(odd.sections().len(), 2);
    }

    #[test]
    fn test_dc_gains() {
        let lp = SosFilter::butterworth_lowpass(4, 40.0, 256.0).unwrap();
        assert!((lp.dc_gain() - 1.0).abs() < 1e-9);
        let hp = SosFilter::butterworth_highpass(4, 1.0, 256.0).unwrap();
        assert!(hp.dc_gain().abs() < 1e-9);
    }

    #[test]
    fn test_cutoff_above_nyquist_rejected() {
        let result = SosFilter::butterworth_lowpass(4, 200.0, 256.0);
        assert!(matches!(result, Err(EegError::InvalidParameter { .. })));
    }

    #[test]
    fn test_lowpass_attenuates_high_tone() {
        let fs = 256.0;
        let lp = SosFilter::butterworth_lowpass(4, 20.0, fs).unwrap();

        let pass = lp.filtfilt(&tone(5.0, fs, 2048));
        let stop = lp.filtfilt(&tone(80.0, fs, 2048));

        assert!((rms_middle(&pass) - std::f64::consts::FRAC_1_SQRT_2).abs() < 0.02);
        assert!(rms_middle(&stop) < 1e-3);
    }

    #[test]
    fn test_filtfilt_keeps_constant_through_lowpass() {
        let lp = SosFilter::butterworth_lowpass(4, 10.0, 256.0).unwrap();
        let out = lp.filtfilt(&[3.0; 500]);
        assert!(out.iter().all(|v| (v - 3.0).abs() < 1e-9));
    }

    #[test]
    fn test_highpass_removes_offset() {
        let fs = 256.0;
        let hp = SosFilter::butterworth_highpass(4, 1.0, fs).unwrap();
        let data: Vec<f64> = tone(10.0, fs, 4096).iter().map(|v| v + 5.0).collect();
        let out = hp.filtfilt(&data);
        let mid = &out[1024..3072];
        let mean = mid.iter().sum::<f64>() / mid.len() as f64;
        assert!(mean.abs() < 0.05);
    }

    #[test]
    fn test_notch_harmonics_below_nyquist() {
        assert_eq!(line_harmonics(50.0, 256.0), vec![50.0, 100.0]);
        assert_eq!(line_harmonics(50.0, 200.0), vec![50.0]);
        assert!(line_harmonics(60.0, 100.0).is_empty());
    }

    #[test]
    fn test_notch_filter() {
        let fs = 1000.0;
        let notch = SosFilter::notch_harmonics(50.0, 30.0, fs);
        let hum = notch.filtfilt(&tone(50.0, fs, 4000));
        let alpha = notch.filtfilt(&tone(10.0, fs, 4000));

        assert!(rms_middle(&hum) < 0.01);
        assert!((rms_middle(&alpha) - std::f64::consts::FRAC_1_SQRT_2).abs() < 0.01);
    }

    #[test]
    fn test_line_noise_remover() {
        let fs = 250.0;
        let signal = tone(7.0, fs, 2500);
        let noisy: Vec<f64> = signal
            .iter()
            .zip(tone(50.0, fs, 2500))
            .map(|(s, h)| s + 0.8 * h)
            .collect();

        let cleaned = LineNoiseRemover::new(50.0, 4.0).clean(&noisy, fs);
        let residual: f64 = cleaned
            .iter()
            .zip(signal.iter())
            .map(|(c, s)| (c - s).powi(2))
            .sum::<f64>()
            / signal.len() as f64;
        assert!(residual.sqrt() < 0.05);
    }

    #[test]
    fn test_band_pass_derives_filtered_recording() {
        let fs = 256.0;
        let raw = Recording::new(fs, vec![Channel::new("Cz", tone(10.0, fs, 1024))]).unwrap();
        let filtered = BandPassFilter::new(1.0, 40.0, 4).process(&raw).unwrap();

        assert_eq!(filtered.stage(), RecordingStage::Filtered);
        assert_eq!(filtered.n_samples(), raw.n_samples());
        assert_eq!(raw.stage(), RecordingStage::Raw);
    }
}
