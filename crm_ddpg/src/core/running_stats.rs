//! Running statistics for observation and return normalization.
//!
//! Both trackers use Welford's online update, so they can be fed one
//! sample at a time from the rollout loop without keeping history.
//!
//! # Example
//! ```ignore
//! use crm_ddpg::core::RunningMeanStd;
//!
//! let mut stats = RunningMeanStd::new(4);
//! stats.update_batch(&flat_observations);
//! let normalized = stats.normalize_batch(&flat_observations, Some(5.0));
//! ```

use serde::{Deserialize, Serialize};

/// Minimum variance used when normalizing.
///
/// Keeps near-constant observation features (one-hot automaton states,
/// for instance) from blowing up after normalization.
const MIN_VARIANCE: f64 = 1e-2;

/// Per-dimension running mean and standard deviation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningMeanStd {
    /// Running mean per dimension
    mean: Vec<f64>,
    /// Sum of squared deviations per dimension (variance = var_sum / count)
    var_sum: Vec<f64>,
    /// Number of samples seen
    count: f64,
}

impl RunningMeanStd {
    /// Create a tracker for `dim`-dimensional vectors.
    pub fn new(dim: usize) -> Self {
        Self {
            mean: vec![0.0; dim],
            var_sum: vec![0.0; dim],
            count: 0.0,
        }
    }

    /// Update with a single vector.
    ///
    /// # Panics
    /// Panics if the vector length differs from the tracked dimension.
    pub fn update(&mut self, x: &[f32]) {
        assert_eq!(x.len(), self.mean.len(), "Observation dimension mismatch");

        self.count += 1.0;
        for (i, &v) in x.iter().enumerate() {
            let v = v as f64;
            let delta = v - self.mean[i];
            self.mean[i] += delta / self.count;
            self.var_sum[i] += delta * (v - self.mean[i]);
        }
    }

    /// Update with a flattened batch `[n * dim]`.
    pub fn update_batch(&mut self, batch: &[f32]) {
        let dim = self.mean.len();
        if dim == 0 {
            return;
        }
        for row in batch.chunks_exact(dim) {
            self.update(row);
        }
    }

    /// Standard deviation for dimension `i`, floored by `MIN_VARIANCE`.
    #[inline]
    fn std(&self, i: usize) -> f64 {
        if self.count < 2.0 {
            1.0
        } else {
            (self.var_sum[i] / self.count).max(MIN_VARIANCE).sqrt()
        }
    }

    /// Normalize a flattened batch, optionally clipping to `[-clip, clip]`.
    pub fn normalize_batch(&self, batch: &[f32], clip: Option<f32>) -> Vec<f32> {
        let dim = self.mean.len();
        batch
            .iter()
            .enumerate()
            .map(|(k, &x)| {
                let i = k % dim;
                let z = ((x as f64 - self.mean[i]) / self.std(i)) as f32;
                match clip {
                    Some(c) => z.clamp(-c, c),
                    None => z,
                }
            })
            .collect()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Standard deviation vector.
    pub fn std_vec(&self) -> Vec<f64> {
        (0..self.mean.len()).map(|i| self.std(i)).collect()
    }

    pub fn count(&self) -> f64 {
        self.count
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }
}

/// Running statistics for a scalar stream (TD targets for return normalization).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunningScalarStats {
    mean: f64,
    var_sum: f64,
    count: f64,
}

impl RunningScalarStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, x: f32) {
        self.count += 1.0;
        let x = x as f64;
        let delta = x - self.mean;
        self.mean += delta / self.count;
        self.var_sum += delta * (x - self.mean);
    }

    pub fn update_batch(&mut self, values: &[f32]) {
        for &x in values {
            self.update(x);
        }
    }

    pub fn std(&self) -> f64 {
        if self.count < 2.0 {
            1.0
        } else {
            (self.var_sum / self.count).max(MIN_VARIANCE).sqrt()
        }
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn count(&self) -> f64 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_welford_mean() {
        let mut stats = RunningMeanStd::new(2);
        stats.update(&[1.0, 2.0]);
        stats.update(&[3.0, 4.0]);
        stats.update(&[5.0, 6.0]);

        assert!((stats.mean()[0] - 3.0).abs() < 1e-10);
        assert!((stats.mean()[1] - 4.0).abs() < 1e-10);
    }

    #[test]
    fn test_welford_variance() {
        let mut stats = RunningMeanStd::new(1);
        // Mean = 5, variance = 4
        stats.update_batch(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((stats.std_vec()[0] - 2.0).abs() < 1e-10);
    }

    #[test]
    fn test_constant_feature_is_floored() {
        let mut stats = RunningMeanStd::new(2);
        for _ in 0..100 {
            stats.update(&[1.0, 0.0]);
        }
        let z = stats.normalize_batch(&[2.0, 0.0], None);
        // std floored at sqrt(1e-2) = 0.1
        assert!((z[0] - 10.0).abs() < 1e-4);
        assert_eq!(z[1], 0.0);
    }

    #[test]
    fn test_normalize_batch_clips() {
        let mut stats = RunningMeanStd::new(1);
        stats.update_batch(&[0.0, 2.0, 0.0, 2.0]);
        let z = stats.normalize_batch(&[100.0, -100.0, 1.0], Some(5.0));
        assert_eq!(z[0], 5.0);
        assert_eq!(z[1], -5.0);
        assert!(z[2].abs() < 1e-6);
    }

    #[test]
    fn test_scalar_stats() {
        let mut stats = RunningScalarStats::new();
        assert_eq!(stats.std(), 1.0);
        stats.update_batch(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        // Population std of 1..=5
        assert!((stats.std() - 2f64.sqrt()).abs() < 1e-10);
        assert_eq!(stats.count(), 5.0);
    }
}
