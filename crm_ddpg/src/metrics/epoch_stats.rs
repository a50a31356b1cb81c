//! Per-epoch training statistics.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::algorithms::estimator::{EstimatorDiagnostics, TrainLosses};

/// Episodes kept for the rolling return history.
pub const RETURN_HISTORY_LEN: usize = 100;

pub const NUM_COLUMNS: usize = 24;

/// Column names, in the order produced by [`EpochStats::values`].
pub const COLUMNS: [&str; NUM_COLUMNS] = [
    "epoch",
    "total/steps",
    "total/episodes",
    "total/duration",
    "total/steps_per_second",
    "rollout/return",
    "rollout/return_std",
    "rollout/return_history",
    "rollout/episode_steps",
    "rollout/episodes",
    "rollout/actions_mean",
    "rollout/actions_std",
    "rollout/Q_mean",
    "train/loss_actor",
    "train/loss_critic",
    "train/param_noise_distance",
    "train/skipped_steps",
    "eval/return",
    "eval/success_rate",
    "reference/Q_mean",
    "reference/Q_std",
    "reference/action_mean",
    "reference/action_std",
    "reference/param_noise_stddev",
];

/// Aggregates logged at the end of every epoch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    pub epoch: usize,

    // total
    pub total_steps: f64,
    pub total_episodes: f64,
    pub duration_secs: f64,
    pub steps_per_second: f64,

    // rollout
    pub rollout_return: f64,
    pub rollout_return_std: f64,
    /// Mean return over the last [`RETURN_HISTORY_LEN`] episodes.
    pub rollout_return_history: f64,
    pub rollout_episode_steps: f64,
    pub rollout_episodes: f64,
    pub rollout_actions_mean: f64,
    pub rollout_actions_std: f64,
    pub rollout_q_mean: f64,

    // train
    pub train_loss_actor: f64,
    pub train_loss_critic: f64,
    pub train_param_noise_distance: Option<f64>,
    /// Train steps skipped because the store held less than one batch.
    pub train_skipped_steps: f64,

    // eval
    pub eval_return: Option<f64>,
    pub eval_success_rate: Option<f64>,

    // estimator diagnostics on a reference batch
    pub reference_q_mean: Option<f64>,
    pub reference_q_std: Option<f64>,
    pub reference_action_mean: Option<f64>,
    pub reference_action_std: Option<f64>,
    pub param_noise_stddev: Option<f64>,
}

impl EpochStats {
    /// Values aligned with [`COLUMNS`].
    pub fn values(&self) -> [Option<f64>; NUM_COLUMNS] {
        [
            Some(self.epoch as f64),
            Some(self.total_steps),
            Some(self.total_episodes),
            Some(self.duration_secs),
            Some(self.steps_per_second),
            Some(self.rollout_return),
            Some(self.rollout_return_std),
            Some(self.rollout_return_history),
            Some(self.rollout_episode_steps),
            Some(self.rollout_episodes),
            Some(self.rollout_actions_mean),
            Some(self.rollout_actions_std),
            Some(self.rollout_q_mean),
            Some(self.train_loss_actor),
            Some(self.train_loss_critic),
            self.train_param_noise_distance,
            Some(self.train_skipped_steps),
            self.eval_return,
            self.eval_success_rate,
            self.reference_q_mean,
            self.reference_q_std,
            self.reference_action_mean,
            self.reference_action_std,
            self.param_noise_stddev,
        ]
    }

    /// Present entries as `(name, value)` pairs.
    pub fn as_pairs(&self) -> Vec<(&'static str, f64)> {
        COLUMNS
            .iter()
            .zip(self.values())
            .filter_map(|(k, v)| v.map(|v| (*k, v)))
            .collect()
    }

    pub fn with_diagnostics(mut self, diag: &EstimatorDiagnostics) -> Self {
        self.reference_q_mean = Some(diag.reference_q_mean as f64);
        self.reference_q_std = Some(diag.reference_q_std as f64);
        self.reference_action_mean = Some(diag.reference_action_mean as f64);
        self.reference_action_std = Some(diag.reference_action_std as f64);
        self.param_noise_stddev = diag.param_noise_stddev.map(f64::from);
        self
    }

    /// Average the statistics of several independent workers.
    ///
    /// Optional entries are averaged over the workers that report them.
    /// The epoch index is taken from the first worker.
    pub fn reduce_mean(workers: &[EpochStats]) -> Option<EpochStats> {
        let first = workers.first()?;
        let avg = |f: fn(&EpochStats) -> f64| workers.iter().map(f).sum::<f64>() / workers.len() as f64;
        let avg_opt = |f: fn(&EpochStats) -> Option<f64>| {
            let present: Vec<f64> = workers.iter().filter_map(f).collect();
            (!present.is_empty()).then(|| present.iter().sum::<f64>() / present.len() as f64)
        };

        Some(EpochStats {
            epoch: first.epoch,
            total_steps: avg(|s| s.total_steps),
            total_episodes: avg(|s| s.total_episodes),
            duration_secs: avg(|s| s.duration_secs),
            steps_per_second: avg(|s| s.steps_per_second),
            rollout_return: avg(|s| s.rollout_return),
            rollout_return_std: avg(|s| s.rollout_return_std),
            rollout_return_history: avg(|s| s.rollout_return_history),
            rollout_episode_steps: avg(|s| s.rollout_episode_steps),
            rollout_episodes: avg(|s| s.rollout_episodes),
            rollout_actions_mean: avg(|s| s.rollout_actions_mean),
            rollout_actions_std: avg(|s| s.rollout_actions_std),
            rollout_q_mean: avg(|s| s.rollout_q_mean),
            train_loss_actor: avg(|s| s.train_loss_actor),
            train_loss_critic: avg(|s| s.train_loss_critic),
            train_param_noise_distance: avg_opt(|s| s.train_param_noise_distance),
            train_skipped_steps: avg(|s| s.train_skipped_steps),
            eval_return: avg_opt(|s| s.eval_return),
            eval_success_rate: avg_opt(|s| s.eval_success_rate),
            reference_q_mean: avg_opt(|s| s.reference_q_mean),
            reference_q_std: avg_opt(|s| s.reference_q_std),
            reference_action_mean: avg_opt(|s| s.reference_action_mean),
            reference_action_std: avg_opt(|s| s.reference_action_std),
            param_noise_stddev: avg_opt(|s| s.param_noise_stddev),
        })
    }
}

// ============================================================================
// Recorder
// ============================================================================

/// Collects raw values during an epoch and produces [`EpochStats`].
///
/// The return history survives across epochs; everything else is cleared
/// by [`EpochRecorder::finish`].
#[derive(Debug, Clone, Default)]
pub struct EpochRecorder {
    episode_returns: Vec<f64>,
    episode_steps: Vec<f64>,
    return_history: VecDeque<f64>,
    actions: Vec<f64>,
    q_values: Vec<f64>,
    actor_losses: Vec<f64>,
    critic_losses: Vec<f64>,
    distances: Vec<f64>,
    skipped: usize,
    eval_returns: Vec<f64>,
    eval_successes: Vec<f64>,
}

impl EpochRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_episode(&mut self, episode_return: f32, steps: usize) {
        self.episode_returns.push(episode_return as f64);
        self.episode_steps.push(steps as f64);
        if self.return_history.len() == RETURN_HISTORY_LEN {
            self.return_history.pop_front();
        }
        self.return_history.push_back(episode_return as f64);
    }

    pub fn record_actions(&mut self, actions: &[f32]) {
        self.actions.extend(actions.iter().map(|&a| a as f64));
    }

    pub fn record_q_values(&mut self, q: &[f32]) {
        self.q_values.extend(q.iter().map(|&v| v as f64));
    }

    pub fn record_losses(&mut self, losses: TrainLosses) {
        self.actor_losses.push(losses.actor_loss as f64);
        self.critic_losses.push(losses.critic_loss as f64);
    }

    pub fn record_distance(&mut self, distance: f32) {
        self.distances.push(distance as f64);
    }

    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    pub fn record_evaluation(&mut self, mean_return: f64, success_rate: f64) {
        self.eval_returns.push(mean_return);
        self.eval_successes.push(success_rate);
    }

    /// Build the epoch's statistics and clear the per-epoch buffers.
    pub fn finish(&mut self, epoch: usize, total_steps: usize, total_episodes: usize, duration_secs: f64) -> EpochStats {
        let (rollout_return, rollout_return_std) = mean_std(&self.episode_returns);
        let (rollout_actions_mean, rollout_actions_std) = mean_std(&self.actions);
        let history: Vec<f64> = self.return_history.iter().copied().collect();

        let stats = EpochStats {
            epoch,
            total_steps: total_steps as f64,
            total_episodes: total_episodes as f64,
            duration_secs,
            steps_per_second: if duration_secs > 0.0 {
                total_steps as f64 / duration_secs
            } else {
                0.0
            },
            rollout_return,
            rollout_return_std,
            rollout_return_history: mean_std(&history).0,
            rollout_episode_steps: mean_std(&self.episode_steps).0,
            rollout_episodes: self.episode_returns.len() as f64,
            rollout_actions_mean,
            rollout_actions_std,
            rollout_q_mean: mean_std(&self.q_values).0,
            train_loss_actor: mean_std(&self.actor_losses).0,
            train_loss_critic: mean_std(&self.critic_losses).0,
            train_param_noise_distance: (!self.distances.is_empty()).then(|| mean_std(&self.distances).0),
            train_skipped_steps: self.skipped as f64,
            eval_return: (!self.eval_returns.is_empty()).then(|| mean_std(&self.eval_returns).0),
            eval_success_rate: (!self.eval_successes.is_empty()).then(|| mean_std(&self.eval_successes).0),
            ..EpochStats::default()
        };

        let history = std::mem::take(&mut self.return_history);
        *self = Self {
            return_history: history,
            ..Self::default()
        };
        stats
    }
}

/// Mean and population std; zeros for an empty slice.
fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_aggregates_epoch() {
        let mut rec = EpochRecorder::new();
        rec.record_episode(1.0, 10);
        rec.record_episode(3.0, 20);
        rec.record_actions(&[0.5, -0.5]);
        rec.record_losses(TrainLosses {
            critic_loss: 2.0,
            actor_loss: -1.0,
        });
        rec.record_skipped();

        let stats = rec.finish(0, 100, 2, 2.0);
        assert_eq!(stats.rollout_return, 2.0);
        assert_eq!(stats.rollout_return_std, 1.0);
        assert_eq!(stats.rollout_episode_steps, 15.0);
        assert_eq!(stats.rollout_actions_mean, 0.0);
        assert_eq!(stats.train_loss_critic, 2.0);
        assert_eq!(stats.train_skipped_steps, 1.0);
        assert_eq!(stats.steps_per_second, 50.0);
        assert_eq!(stats.eval_return, None);
        assert_eq!(stats.train_param_noise_distance, None);
    }

    #[test]
    fn test_history_survives_epochs_and_is_bounded() {
        let mut rec = EpochRecorder::new();
        for i in 0..RETURN_HISTORY_LEN {
            rec.record_episode(i as f32, 1);
        }
        let first = rec.finish(0, 0, 0, 0.0);
        assert_eq!(first.rollout_episodes, RETURN_HISTORY_LEN as f64);

        rec.record_episode(1000.0, 1);
        let stats = rec.finish(1, 0, 0, 0.0);
        assert_eq!(stats.rollout_episodes, 1.0);
        // Oldest entry (0) was evicted
        let expected = ((1..RETURN_HISTORY_LEN).sum::<usize>() as f64 + 1000.0) / RETURN_HISTORY_LEN as f64;
        assert!((stats.rollout_return_history - expected).abs() < 1e-9);
    }

    #[test]
    fn test_reduce_mean() {
        let a = EpochStats {
            epoch: 3,
            rollout_return: 1.0,
            eval_return: Some(4.0),
            ..EpochStats::default()
        };
        let b = EpochStats {
            epoch: 3,
            rollout_return: 3.0,
            eval_return: None,
            ..EpochStats::default()
        };
        let m = EpochStats::reduce_mean(&[a, b]).unwrap();
        assert_eq!(m.epoch, 3);
        assert_eq!(m.rollout_return, 2.0);
        assert_eq!(m.eval_return, Some(4.0));
        assert_eq!(m.reference_q_mean, None);
        assert!(EpochStats::reduce_mean(&[]).is_none());
    }

    #[test]
    fn test_pairs_skip_missing_entries() {
        let stats = EpochStats::default();
        let pairs = stats.as_pairs();
        assert!(pairs.iter().any(|(k, _)| *k == "rollout/return"));
        assert!(!pairs.iter().any(|(k, _)| *k == "eval/return"));
        assert_eq!(stats.values().len(), COLUMNS.len());
    }
}
