//! Signal complexity measures
//!
//! Entropy measures follow the usual template-matching definitions with
//! Chebyshev distance. Hurst exponent uses rescaled-range analysis. The
//! nonlinear-dynamics pair (largest Lyapunov exponent after Rosenstein and
//! correlation dimension after Grassberger and Procaccia) work on a delay
//! embedding and are costlier, so they are opt-in.

use crate::config::ComplexityConfig;
use crate::stats::{mean, std_dev};
use std::collections::BTreeMap;

/// Embedding dimension for the nonlinear-dynamics measures
const DYNAMICS_EMBEDDING: usize = 10;
/// Samples followed along each trajectory for the Lyapunov estimate
const TRAJECTORY_LEN: usize = 20;

/// Central window of at most `max_samples` samples
pub fn central_window(data: &[f64], max_samples: usize) -> &[f64] {
    if data.len() <= max_samples {
        return data;
    }
    let start = (data.len() - max_samples) / 2;
    &data[start..start + max_samples]
}

fn chebyshev(data: &[f64], i: usize, j: usize, m: usize) -> f64 {
    (0..m)
        .map(|k| (data[i + k] - data[j + k]).abs())
        .fold(0.0, f64::max)
}

/// Sample entropy with embedding `m` and tolerance `r`
///
/// Returns infinity when no template of length `m + 1` matches.
pub fn sample_entropy(data: &[f64], m: usize, r: f64) -> f64 {
    let n = data.len();
    if n <= m + 1 {
        return f64::INFINITY;
    }
    let templates = n - m;
    let mut b = 0u64;
    let mut a = 0u64;

    for i in 0..templates {
        for j in (i + 1)..templates {
            if chebyshev(data, i, j, m) <= r {
                b += 1;
                if (data[i + m] - data[j + m]).abs() <= r {
                    a += 1;
                }
            }
        }
    }

    if a == 0 || b == 0 {
        return f64::INFINITY;
    }
    -((a as f64) / (b as f64)).ln()
}

/// Approximate entropy with embedding `m` and tolerance `r`
pub fn approximate_entropy(data: &[f64], m: usize, r: f64) -> f64 {
    let phi = |len: usize| -> f64 {
        let count = data.len().saturating_sub(len) + 1;
        if count == 0 || data.len() < len {
            return 0.0;
        }
        (0..count)
            .map(|i| {
                let matches = (0..count)
                    .filter(|&j| chebyshev(data, i, j, len) <= r)
                    .count();
                (matches as f64 / count as f64).ln()
            })
            .sum::<f64>()
            / count as f64
    };

    if data.len() <= m + 1 {
        return 0.0;
    }
    phi(m) - phi(m + 1)
}

/// Least-squares slope of y on x
fn slope(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() < 2 || x.len() != y.len() {
        return None;
    }
    let mx = mean(x);
    let my = mean(y);
    let sxx: f64 = x.iter().map(|v| (v - mx).powi(2)).sum();
    if sxx <= 0.0 {
        return None;
    }
    let sxy: f64 = x.iter().zip(y).map(|(a, b)| (a - mx) * (b - my)).sum();
    Some(sxy / sxx)
}

/// Hurst exponent by rescaled-range analysis; 0.5 when undefined
pub fn hurst_exponent(data: &[f64]) -> f64 {
    let n = data.len();
    let mut log_n = Vec::new();
    let mut log_rs = Vec::new();

    let mut size = 8;
    while size <= n / 2 {
        let mut ratios = Vec::new();
        for chunk in data.chunks_exact(size) {
            let m = mean(chunk);
            let s = std_dev(chunk);
            if s <= 0.0 {
                continue;
            }
            let mut cumulative = 0.0;
            let mut lo = 0.0f64;
            let mut hi = 0.0f64;
            for v in chunk {
                cumulative += v - m;
                lo = lo.min(cumulative);
                hi = hi.max(cumulative);
            }
            ratios.push((hi - lo) / s);
        }
        if !ratios.is_empty() {
            log_n.push((size as f64).ln());
            log_rs.push(mean(&ratios).ln());
        }
        size *= 2;
    }

    match slope(&log_n, &log_rs) {
        Some(h) if h.is_finite() => h,
        _ => 0.5,
    }
}

/// Delay for embedding: first lag where autocorrelation falls below 1 - 1/e
fn embedding_lag(data: &[f64]) -> usize {
    let m = mean(data);
    let var: f64 = data.iter().map(|v| (v - m).powi(2)).sum();
    if var <= 0.0 {
        return 1;
    }
    let threshold = 1.0 - 1.0 / std::f64::consts::E;
    let max_lag = (data.len() / 20).max(1);
    for lag in 1..=max_lag {
        let acf: f64 = data
            .iter()
            .zip(&data[lag..])
            .map(|(a, b)| (a - m) * (b - m))
            .sum::<f64>()
            / var;
        if acf < threshold {
            return lag;
        }
    }
    max_lag
}

fn embed(data: &[f64], dim: usize, lag: usize) -> Vec<Vec<f64>> {
    let span = (dim - 1) * lag;
    if data.len() <= span {
        return Vec::new();
    }
    (0..data.len() - span)
        .map(|i| (0..dim).map(|k| data[i + k * lag]).collect())
        .collect()
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
}

/// Largest Lyapunov exponent (per sample) by Rosenstein's method
pub fn lyapunov_exponent(data: &[f64]) -> f64 {
    let lag = embedding_lag(data);
    let orbit = embed(data, DYNAMICS_EMBEDDING, lag);
    let min_separation = lag * DYNAMICS_EMBEDDING;
    if orbit.len() <= TRAJECTORY_LEN + min_separation + 1 {
        return 0.0;
    }
    let usable = orbit.len() - TRAJECTORY_LEN;

    let mut divergence = vec![0.0; TRAJECTORY_LEN];
    let mut counts = vec![0usize; TRAJECTORY_LEN];

    for i in 0..usable {
        let nearest = (0..usable)
            .filter(|&j| i.abs_diff(j) > min_separation)
            .map(|j| (j, euclidean(&orbit[i], &orbit[j])))
            .filter(|(_, d)| *d > 0.0)
            .min_by(|a, b| a.1.total_cmp(&b.1));
        let Some((j, _)) = nearest else {
            continue;
        };
        for k in 0..TRAJECTORY_LEN {
            let d = euclidean(&orbit[i + k], &orbit[j + k]);
            if d > 0.0 {
                divergence[k] += d.ln();
                counts[k] += 1;
            }
        }
    }

    let (steps, logs): (Vec<f64>, Vec<f64>) = divergence
        .iter()
        .zip(&counts)
        .enumerate()
        .filter(|(_, (_, &c))| c > 0)
        .map(|(k, (sum, &c))| (k as f64, sum / c as f64))
        .unzip();
    match slope(&steps, &logs) {
        Some(lambda) if lambda.is_finite() => lambda,
        _ => 0.0,
    }
}

/// Correlation dimension by the Grassberger-Procaccia algorithm
pub fn correlation_dimension(data: &[f64]) -> f64 {
    let sd = std_dev(data);
    if sd <= 0.0 {
        return 0.0;
    }
    let lag = embedding_lag(data);
    let orbit = embed(data, DYNAMICS_EMBEDDING, lag);
    if orbit.len() < 10 {
        return 0.0;
    }

    let mut distances = Vec::with_capacity(orbit.len() * (orbit.len() - 1) / 2);
    for i in 0..orbit.len() {
        for j in (i + 1)..orbit.len() {
            distances.push(euclidean(&orbit[i], &orbit[j]));
        }
    }
    distances.sort_by(|a, b| a.total_cmp(b));
    let pairs = distances.len() as f64;

    let mut log_r = Vec::new();
    let mut log_c = Vec::new();
    let mut r = 0.1 * sd;
    while r <= 0.5 * sd {
        let within = distances.partition_point(|&d| d < r);
        if within > 0 {
            log_r.push(r.ln());
            log_c.push((within as f64 / pairs).ln());
        }
        r *= 1.03;
    }

    match slope(&log_r, &log_c) {
        Some(dim) if dim.is_finite() => dim,
        _ => 0.0,
    }
}

/// All enabled complexity metrics for one channel
pub fn complexity_metrics(data: &[f64], config: &ComplexityConfig) -> BTreeMap<&'static str, f64> {
    let window = central_window(data, config.max_samples);
    let r = config.tolerance_factor * std_dev(window);
    let m = config.embedding_dim;

    let mut metrics = BTreeMap::new();
    metrics.insert("sample_entropy", sample_entropy(window, m, r));
    metrics.insert("approximate_entropy", approximate_entropy(window, m, r));
    metrics.insert("hurst_exponent", hurst_exponent(window));
    if config.nonlinear_dynamics {
        metrics.insert("lyapunov_exponent", lyapunov_exponent(window));
        metrics.insert("correlation_dimension", correlation_dimension(window));
    }
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};
    use std::f64::consts::PI;

    fn white_noise(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).unwrap();
        (0..n).map(|_| normal.sample(&mut rng)).collect()
    }

    fn sine(n: usize) -> Vec<f64> {
        (0..n).map(|i| (2.0 * PI * i as f64 / 50.0).sin()).collect()
    }

    #[test]
    fn test_central_window() {
        let data: Vec<f64> = (0..10).map(|i| i as f64).collect();
        assert_eq!(central_window(&data, 4), &[3.0, 4.0, 5.0, 6.0]);
        assert_eq!(central_window(&data, 20).len(), 10);
    }

    #[test]
    fn test_entropy_orders_regular_below_random() {
        let regular = sine(600);
        let random = white_noise(600, 7);
        let r_reg = 0.2 * std_dev(&regular);
        let r_rand = 0.2 * std_dev(&random);

        assert!(sample_entropy(&regular, 2, r_reg) < sample_entropy(&random, 2, r_rand));
        assert!(approximate_entropy(&regular, 2, r_reg) < approximate_entropy(&random, 2, r_rand));
    }

    #[test]
    fn test_sample_entropy_without_matches_is_infinite() {
        let ramp: Vec<f64> = (0..50).map(|i| i as f64).collect();
        assert!(sample_entropy(&ramp, 2, 0.1).is_infinite());
        assert_eq!(sample_entropy(&[1.0; 40], 2, 0.0), 0.0);
    }

    #[test]
    fn test_hurst_white_noise_near_half() {
        let noise = white_noise(4096, 11);
        let h = hurst_exponent(&noise);
        assert!(h > 0.35 && h < 0.75, "hurst = {}", h);

        let walk: Vec<f64> = noise
            .iter()
            .scan(0.0, |acc, v| {
                *acc += v;
                Some(*acc)
            })
            .collect();
        assert!(hurst_exponent(&walk) > h);
        assert_eq!(hurst_exponent(&[2.0; 100]), 0.5);
    }

    #[test]
    fn test_nonlinear_metrics_are_finite() {
        let mixed: Vec<f64> = sine(800)
            .iter()
            .zip(white_noise(800, 3))
            .map(|(s, n)| s + 0.1 * n)
            .collect();
        assert!(lyapunov_exponent(&mixed).is_finite());
        let dim = correlation_dimension(&mixed);
        assert!(dim.is_finite() && dim > 0.0);
        assert_eq!(correlation_dimension(&[1.0; 100]), 0.0);
    }

    #[test]
    fn test_metric_selection() {
        let data = sine(300);
        let mut config = ComplexityConfig::default();
        let base = complexity_metrics(&data, &config);
        assert_eq!(base.len(), 3);

        config.nonlinear_dynamics = true;
        let full = complexity_metrics(&data, &config);
        assert_eq!(full.len(), 5);
        assert!(full.contains_key("correlation_dimension"));
    }
}
