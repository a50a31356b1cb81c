//! Policy/value estimator interface used by the trainer.
//!
//! The trainer never touches networks directly. Everything it needs from
//! the actor-critic pair goes through [`Estimator`], so tests can drive
//! the rollout loop with a lightweight stand-in.

use crate::core::transition::Batch;
use crate::error::Result;

/// Actions (and optionally values) for a batch of observations.
#[derive(Debug, Clone, Default)]
pub struct ActOutput {
    /// Flattened actions `[n * action_dim]`, each in `[-1, 1]`.
    pub actions: Vec<f32>,
    /// Q(s, μ(s)) per observation when requested.
    pub q_values: Option<Vec<f32>>,
}

/// Losses from one gradient step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrainLosses {
    pub critic_loss: f32,
    pub actor_loss: f32,
}

/// Summary statistics evaluated on a fixed reference batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EstimatorDiagnostics {
    pub reference_q_mean: f32,
    pub reference_q_std: f32,
    pub reference_action_mean: f32,
    pub reference_action_std: f32,
    /// Mean over dimensions of the observation normalizer's running mean.
    pub obs_rms_mean: Option<f32>,
    /// Mean over dimensions of the observation normalizer's running std.
    pub obs_rms_std: Option<f32>,
    /// Current parameter noise scale, if parameter noise is active.
    pub param_noise_stddev: Option<f32>,
}

/// Actor-critic pair with target copies and exploration state.
pub trait Estimator {
    fn obs_size(&self) -> usize;

    fn action_dim(&self) -> usize;

    /// Discount factor of the value targets.
    fn discount(&self) -> f32;

    /// Compute actions for flattened observations `[n * obs_size]`.
    ///
    /// With `apply_noise` the configured exploration is applied (perturbed
    /// actor or action noise) and the result is clipped to `[-1, 1]`.
    fn act(&mut self, obs: &[f32], apply_noise: bool, compute_value: bool) -> Result<ActOutput>;

    /// Feed freshly collected observations to the running normalizer.
    fn observe(&mut self, obs: &[f32]);

    /// One critic and one actor gradient step.
    fn train(&mut self, batch: &Batch) -> Result<TrainLosses>;

    /// Move the target networks towards the online networks.
    fn sync_targets(&mut self);

    /// Recalibrate parameter noise on `batch`.
    ///
    /// Returns the measured action distance, or `None` without parameter noise.
    fn adapt_param_noise(&mut self, batch: &Batch) -> Result<Option<f32>>;

    /// Episode boundary: re-draw the parameter perturbation and reset action noise.
    fn reset(&mut self);

    fn diagnostics(&mut self, reference: &Batch) -> Result<EstimatorDiagnostics>;
}
