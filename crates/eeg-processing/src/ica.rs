//! Independent component analysis (FastICA)
//!
//! Centering, PCA whitening down to the components that explain the
//! configured share of variance, then symmetric FastICA with the log-cosh
//! contrast. The random start is seeded so decompositions are reproducible.

use crate::config::IcaConfig;
use eeg_core::{EegError, EegResult};
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Result of a FastICA fit on `n_channels × n_samples` data
#[derive(Debug, Clone)]
pub struct IcaDecomposition {
    mean: Vec<f64>,
    /// `n_channels × n_components`
    mixing: DMatrix<f64>,
    /// `n_components × n_channels`
    unmixing: DMatrix<f64>,
    /// `n_components × n_samples`
    sources: DMatrix<f64>,
    n_iter: usize,
    converged: bool,
    explained_variance: f64,
}

impl IcaDecomposition {
    pub fn n_components(&self) -> usize {
        self.sources.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.sources.ncols()
    }

    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    /// Share of total variance carried by the retained components
    pub fn explained_variance(&self) -> f64 {
        self.explained_variance
    }

    /// Time course of one component
    pub fn source(&self, index: usize) -> Option<Vec<f64>> {
        (index < self.n_components()).then(|| self.sources.row(index).iter().copied().collect())
    }

    /// All component time courses, one row per component
    pub fn sources(&self) -> Vec<Vec<f64>> {
        (0..self.n_components())
            .map(|i| self.sources.row(i).iter().copied().collect())
            .collect()
    }

    pub fn mixing(&self) -> &DMatrix<f64> {
        &self.mixing
    }

    pub fn unmixing(&self) -> &DMatrix<f64> {
        &self.unmixing
    }

    /// Remove the excluded components from the original data
    ///
    /// Variance outside the retained PCA subspace is left untouched, so an
    /// empty exclusion set returns the input data.
    pub fn remove_components(
        &self,
        data: &[&[f64]],
        exclude: &BTreeSet<usize>,
    ) -> EegResult<Vec<Vec<f64>>> {
        if data.len() != self.mixing.nrows() {
            return Err(EegError::processing(format!(
                "decomposition has {} channels, data has {}",
                self.mixing.nrows(),
                data.len()
            )));
        }
        if let Some(&bad) = exclude.iter().find(|&&i| i >= self.n_components()) {
            return Err(EegError::processing(format!(
                "component {} out of range (0-{})",
                bad,
                self.n_components().saturating_sub(1)
            )));
        }

        let mut cleaned: Vec<Vec<f64>> = data.iter().map(|row| row.to_vec()).collect();
        for &component in exclude {
            let source = self.sources.row(component);
            for (ch, row) in cleaned.iter_mut().enumerate() {
                let weight = self.mixing[(ch, component)];
                if weight == 0.0 {
                    continue;
                }
                for (value, s) in row.iter_mut().zip(source.iter()) {
                    *value -= weight * s;
                }
            }
        }
        Ok(cleaned)
    }

    /// Per-channel means removed before the fit
    pub fn channel_means(&self) -> &[f64] {
        &self.mean
    }
}

/// Deterministic FastICA estimator
#[derive(Debug, Clone, Default)]
pub struct FastIca {
    config: IcaConfig,
}

impl FastIca {
    pub fn new(config: IcaConfig) -> Self {
        Self { config }
    }

    /// Fit on `data`, one slice per channel
    pub fn fit(&self, data: &[&[f64]]) -> EegResult<IcaDecomposition> {
        let n_channels = data.len();
        let n_samples = data.first().map(|r| r.len()).unwrap_or(0);
        if n_channels == 0 || n_samples < 2 {
            return Err(EegError::processing(format!(
                "ICA needs at least one channel and two samples, got {}x{}",
                n_channels, n_samples
            )));
        }
        if data.iter().any(|row| row.len() != n_samples) {
            return Err(EegError::processing("ICA input rows differ in length"));
        }
        for (row, values) in data.iter().enumerate() {
            if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
                return Err(EegError::processing(format!(
                    "ICA input row {} has a non-finite sample at {}",
                    row, pos
                )));
            }
        }

        let mean: Vec<f64> = data
            .iter()
            .map(|row| row.iter().sum::<f64>() / n_samples as f64)
            .collect();
        let centered = DMatrix::from_fn(n_channels, n_samples, |i, j| data[i][j] - mean[i]);

        let (whitening, dewhitening, explained) = self.whitening(&centered)?;
        let z = &whitening * &centered;
        let k = z.nrows();
        debug!(components = k, explained, "PCA whitening");

        let (w, n_iter, converged) = self.symmetric_fastica(&z)?;
        if !converged {
            warn!(
                iterations = n_iter,
                tolerance = self.config.tolerance,
                "FastICA did not converge"
            );
        }

        let sources = &w * &z;
        let unmixing = &w * &whitening;
        let mixing = &dewhitening * w.transpose();

        Ok(IcaDecomposition {
            mean,
            mixing,
            unmixing,
            sources,
            n_iter,
            converged,
            explained_variance: explained,
        })
    }

    /// Returns (K, K⁺, explained share) for the retained principal components
    fn whitening(&self, centered: &DMatrix<f64>) -> EegResult<(DMatrix<f64>, DMatrix<f64>, f64)> {
        let n = centered.ncols() as f64;
        let covariance = (centered * centered.transpose()) / n;
        let eigen = SymmetricEigen::new(covariance);

        let mut order: Vec<usize> = (0..eigen.eigenvalues.len()).collect();
        order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

        let largest = order.first().map(|&i| eigen.eigenvalues[i]).unwrap_or(0.0);
        if !(largest > 0.0) {
            return Err(EegError::processing("recording has no variance to decompose"));
        }
        let floor = largest * 1e-12;
        let total: f64 = eigen.eigenvalues.iter().filter(|&&v| v > floor).sum();

        let limit = self.config.max_components.unwrap_or(usize::MAX);
        let mut kept = Vec::new();
        let mut cumulative = 0.0;
        for &i in &order {
            let value = eigen.eigenvalues[i];
            if value <= floor || kept.len() >= limit {
                break;
            }
            kept.push(i);
            cumulative += value;
            if cumulative / total >= self.config.variance_threshold {
                break;
            }
        }

        let n_channels = centered.nrows();
        let k = kept.len();
        let whitening = DMatrix::from_fn(k, n_channels, |r, c| {
            let idx = kept[r];
            eigen.eigenvectors[(c, idx)] / eigen.eigenvalues[idx].sqrt()
        });
        let dewhitening = DMatrix::from_fn(n_channels, k, |r, c| {
            let idx = kept[c];
            eigen.eigenvectors[(r, idx)] * eigen.eigenvalues[idx].sqrt()
        });

        Ok((whitening, dewhitening, cumulative / total))
    }

    fn symmetric_fastica(&self, z: &DMatrix<f64>) -> EegResult<(DMatrix<f64>, usize, bool)> {
        let k = z.nrows();
        let n = z.ncols() as f64;

        let mut rng = StdRng::seed_from_u64(self.config.random_seed);
        let init = DMatrix::from_fn(k, k, |_, _| rng.gen_range(-1.0..1.0));
        let mut w = symmetric_decorrelation(&init)?;

        for iteration in 1..=self.config.max_iter {
            let wz = &w * z;
            let g = wz.map(|v| v.tanh());
            let g_prime_mean = DVector::from_fn(k, |i, _| {
                g.row(i).iter().map(|v| 1.0 - v * v).sum::<f64>() / n
            });

            let update = (&g * z.transpose()) / n - DMatrix::from_diagonal(&g_prime_mean) * &w;
            let next = symmetric_decorrelation(&update)?;

            let change = (&next * w.transpose())
                .diagonal()
                .iter()
                .map(|d| (d.abs() - 1.0).abs())
                .fold(0.0, f64::max);
            w = next;

            if change < self.config.tolerance {
                return Ok((w, iteration, true));
            }
        }

        Ok((w, self.config.max_iter, false))
    }
}

/// W ← (W Wᵀ)^{-1/2} W
fn symmetric_decorrelation(w: &DMatrix<f64>) -> EegResult<DMatrix<f64>> {
    let eigen = SymmetricEigen::new(w * w.transpose());
    if eigen.eigenvalues.iter().any(|&v| !(v > 1e-15)) {
        return Err(EegError::processing("unmixing matrix became singular"));
    }
    let inv_sqrt = DVector::from_iterator(
        eigen.eigenvalues.len(),
        eigen.eigenvalues.iter().map(|v| 1.0 / v.sqrt()),
    );
    let e = &eigen.eigenvectors;
    Ok(e * DMatrix::from_diagonal(&inv_sqrt) * e.transpose() * w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn mixed_sources(n: usize) -> (Vec<Vec<f64>>, Vec<f64>, Vec<f64>) {
        let sine: Vec<f64> = (0..n).map(|i| (2.0 * PI * 3.0 * i as f64 / 200.0).sin()).collect();
        let square: Vec<f64> = (0..n)
            .map(|i| if (i / 37) % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        let mixed = vec![
            sine.iter().zip(&square).map(|(a, b)| 0.8 * a + 0.3 * b).collect(),
            sine.iter().zip(&square).map(|(a, b)| 0.2 * a + 0.9 * b).collect(),
            sine.iter().zip(&square).map(|(a, b)| 0.5 * a - 0.5 * b).collect(),
        ];
        (mixed, sine, square)
    }

    fn rows(data: &[Vec<f64>]) -> Vec<&[f64]> {
        data.iter().map(|r| r.as_slice()).collect()
    }

    #[test]
    fn test_rejects_non_finite_input() {
        let (mut mixed, _, _) = mixed_sources(500);
        mixed[1][42] = f64::INFINITY;
        let err = FastIca::new(IcaConfig::default()).fit(&rows(&mixed)).unwrap_err();
        assert!(matches!(err, EegError::Processing { .. }));
        assert!(err.to_string().contains("row 1 has a non-finite sample at 42"));
    }

    #[test]
    fn test_recovers_independent_sources() {
        let (mixed, sine, square) = mixed_sources(4000);
        let ica = FastIca::new(IcaConfig {
            variance_threshold: 0.999,
            ..IcaConfig::default()
        });
        let decomposition = ica.fit(&rows(&mixed)).unwrap();
        assert_eq!(decomposition.n_components(), 2);

        let sources = decomposition.sources();
        let best = |target: &[f64]| {
            sources
                .iter()
                .map(|s| crate::stats::pearson(s, target).abs())
                .fold(0.0, f64::max)
        };
        assert!(best(&sine) > 0.95);
        assert!(best(&square) > 0.95);
    }

    #[test]
    fn test_deterministic() {
        let (mixed, _, _) = mixed_sources(1000);
        let a = FastIca::default().fit(&rows(&mixed)).unwrap();
        let b = FastIca::default().fit(&rows(&mixed)).unwrap();
        assert_eq!(a.sources(), b.sources());
    }

    #[test]
    fn test_empty_exclusion_is_identity() {
        let (mixed, _, _) = mixed_sources(500);
        let data = rows(&mixed);
        let decomposition = FastIca::default().fit(&data).unwrap();
        let cleaned = decomposition.remove_components(&data, &BTreeSet::new()).unwrap();
        assert_eq!(cleaned, mixed);
    }

    #[test]
    fn test_removing_all_components_leaves_residual_only() {
        let (mixed, _, _) = mixed_sources(2000);
        let data = rows(&mixed);
        let decomposition = FastIca::new(IcaConfig {
            variance_threshold: 1.0,
            ..IcaConfig::default()
        })
        .fit(&data)
        .unwrap();
        let all: BTreeSet<usize> = (0..decomposition.n_components()).collect();
        let cleaned = decomposition.remove_components(&data, &all).unwrap();

        // Rank-2 data: every centered sample is explained by the components
        for (row, mean) in cleaned.iter().zip(decomposition.channel_means()) {
            assert!(row.iter().all(|v| (v - mean).abs() < 1e-6));
        }
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(FastIca::default().fit(&[]).is_err());
        let flat = vec![vec![1.0; 10], vec![1.0; 10]];
        assert!(FastIca::default().fit(&rows(&flat)).is_err());

        let (mixed, _, _) = mixed_sources(300);
        let data = rows(&mixed);
        let decomposition = FastIca::default().fit(&data).unwrap();
        let out_of_range: BTreeSet<usize> = [10].into_iter().collect();
        assert!(decomposition.remove_components(&data, &out_of_range).is_err());
    }
}
