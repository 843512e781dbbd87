//! Small numeric helpers shared by detectors and feature families

/// Arithmetic mean; 0 for an empty slice
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Population variance
pub fn variance(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let m = mean(data);
    data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / data.len() as f64
}

/// Population standard deviation
pub fn std_dev(data: &[f64]) -> f64 {
    variance(data).sqrt()
}

/// Median of an unsorted slice; 0 for an empty slice
pub fn median(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Median absolute deviation around the median
pub fn mad(data: &[f64]) -> f64 {
    let m = median(data);
    let deviations: Vec<f64> = data.iter().map(|x| (x - m).abs()).collect();
    median(&deviations)
}

/// Pearson correlation; 0 when either series has no variance
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let (a, b) = (&a[..n], &b[..n]);
    let ma = mean(a);
    let mb = mean(b);

    let mut cov = 0.0;
    let mut va = 0.0;
    let mut vb = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        let dx = x - ma;
        let dy = y - mb;
        cov += dx * dy;
        va += dx * dx;
        vb += dy * dy;
    }

    if va <= f64::EPSILON * n as f64 || vb <= f64::EPSILON * n as f64 {
        return 0.0;
    }
    (cov / (va.sqrt() * vb.sqrt())).clamp(-1.0, 1.0)
}

/// Central moments (m2, m3, m4) normalised by n
pub fn central_moments(data: &[f64]) -> (f64, f64, f64) {
    if data.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let n = data.len() as f64;
    let m = mean(data);

    let mut m2 = 0.0;
    let mut m3 = 0.0;
    let mut m4 = 0.0;
    for &x in data {
        let d = x - m;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    (m2 / n, m3 / n, m4 / n)
}

/// Fisher skewness; 0 for a constant series
pub fn skewness(data: &[f64]) -> f64 {
    let (m2, m3, _) = central_moments(data);
    if m2 <= 0.0 {
        return 0.0;
    }
    m3 / m2.powf(1.5)
}

/// Fisher (excess) kurtosis; 0 for a constant series
pub fn kurtosis(data: &[f64]) -> f64 {
    let (m2, _, m4) = central_moments(data);
    if m2 <= 0.0 {
        return 0.0;
    }
    m4 / (m2 * m2) - 3.0
}

/// Sign changes between consecutive samples
pub fn zero_crossings(data: &[f64]) -> usize {
    data.windows(2)
        .filter(|w| (w[0] >= 0.0 && w[1] < 0.0) || (w[0] < 0.0 && w[1] >= 0.0))
        .count()
}

/// Root mean square
pub fn rms(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    (data.iter().map(|x| x * x).sum::<f64>() / data.len() as f64).sqrt()
}

/// Element-wise mean across equal-length rows
pub fn row_mean(rows: &[&[f64]]) -> Vec<f64> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    let mut out = vec![0.0; first.len()];
    for row in rows {
        for (acc, v) in out.iter_mut().zip(row.iter()) {
            *acc += v;
        }
    }
    let n = rows.len() as f64;
    out.iter_mut().for_each(|v| *v /= n);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_and_mad() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
        assert_eq!(mad(&[1.0, 1.0, 2.0, 2.0, 4.0, 6.0, 9.0]), 1.0);
    }

    #[test]
    fn test_pearson() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [2.0, 4.0, 6.0, 8.0];
        let c = [4.0, 3.0, 2.0, 1.0];
        assert!((pearson(&a, &b) - 1.0).abs() < 1e-12);
        assert!((pearson(&a, &c) + 1.0).abs() < 1e-12);
        assert_eq!(pearson(&a, &[5.0; 4]), 0.0);
    }

    #[test]
    fn test_moments() {
        let symmetric = [-2.0, -1.0, 0.0, 1.0, 2.0];
        assert!(skewness(&symmetric).abs() < 1e-12);
        // Uniform discrete on 5 points has excess kurtosis -1.3
        assert!((kurtosis(&symmetric) + 1.3).abs() < 1e-12);
        assert_eq!(kurtosis(&[1.0; 8]), 0.0);
    }

    #[test]
    fn test_zero_crossings_and_rms() {
        assert_eq!(zero_crossings(&[1.0, -1.0, 1.0, 2.0, -3.0]), 3);
        assert!((rms(&[3.0, -3.0]) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_row_mean() {
        let a = [1.0, 2.0];
        let b = [3.0, 6.0];
        assert_eq!(row_mean(&[&a, &b]), vec![2.0, 4.0]);
    }
}
