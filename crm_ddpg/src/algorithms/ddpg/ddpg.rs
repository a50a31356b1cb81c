//! DDPG estimator: deterministic actor, Q-critic and their target copies.
//!
//! # Update
//!
//! ```text
//! y       = reward_scale · r + γ (1 − d) Q'(s', μ'(s'))
//! L_critic = mean((Q(s, a) − y)²)
//! L_actor  = −mean(Q(s, μ(s)))
//! θ'      ← τ θ + (1 − τ) θ'
//! ```
//!
//! With return normalization the critic regresses onto normalized targets
//! and its outputs are mapped back to the raw scale before use.

use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use super::config::DdpgConfig;
use super::networks::{DdpgActor, DdpgCritic};
use crate::algorithms::estimator::{ActOutput, Estimator, EstimatorDiagnostics, TrainLosses};
use crate::core::running_stats::{RunningMeanStd, RunningScalarStats};
use crate::core::target_network::soft_update;
use crate::core::transition::Batch;
use crate::error::{CrmError, Result};
use crate::noise::{
    action_distance, perturb_params, ActionNoise, ActionNoiseKind, AdaptiveParamNoiseSpec,
};

/// DDPG actor-critic with exploration state.
pub struct Ddpg<B, Actor, Critic, AO, CO>
where
    B: AutodiffBackend,
    Actor: DdpgActor<B> + AutodiffModule<B>,
    Critic: DdpgCritic<B> + AutodiffModule<B>,
    AO: Optimizer<Actor, B>,
    CO: Optimizer<Critic, B>,
{
    config: DdpgConfig,
    actor: Actor,
    critic: Critic,
    target_actor: Actor,
    target_critic: Critic,
    /// Actor used for exploration when parameter noise is active.
    perturbed_actor: Option<Actor>,
    actor_optim: AO,
    critic_optim: CO,
    param_noise: Option<AdaptiveParamNoiseSpec>,
    action_noise_kind: Option<ActionNoiseKind>,
    /// One process per replica, created on first use.
    action_noise: Vec<Box<dyn ActionNoise>>,
    obs_rms: Option<RunningMeanStd>,
    ret_rms: Option<RunningScalarStats>,
    rng: Xoshiro256PlusPlus,
    obs_size: usize,
    action_dim: usize,
    device: B::Device,
}

impl<B, Actor, Critic, AO, CO> Ddpg<B, Actor, Critic, AO, CO>
where
    B: AutodiffBackend,
    Actor: DdpgActor<B> + AutodiffModule<B>,
    Critic: DdpgCritic<B> + AutodiffModule<B>,
    AO: Optimizer<Actor, B>,
    CO: Optimizer<Critic, B>,
{
    /// Build the estimator. Target networks start as copies of the online ones.
    pub fn new(
        actor: Actor,
        critic: Critic,
        actor_optim: AO,
        critic_optim: CO,
        config: DdpgConfig,
        device: B::Device,
    ) -> Result<Self> {
        config.validate()?;
        let noise = config.noise()?;
        let obs_size = actor.obs_size();
        let action_dim = actor.action_dim();

        let mut ddpg = Self {
            target_actor: actor.clone(),
            target_critic: critic.clone(),
            perturbed_actor: None,
            actor,
            critic,
            actor_optim,
            critic_optim,
            param_noise: noise.param_noise,
            action_noise_kind: noise.action_noise,
            action_noise: Vec::new(),
            obs_rms: config.normalize_observations.then(|| RunningMeanStd::new(obs_size)),
            ret_rms: config.normalize_returns.then(RunningScalarStats::new),
            rng: Xoshiro256PlusPlus::seed_from_u64(config.seed),
            obs_size,
            action_dim,
            device,
            config,
        };
        ddpg.perturb_actor();
        Ok(ddpg)
    }

    pub fn config(&self) -> &DdpgConfig {
        &self.config
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn critic(&self) -> &Critic {
        &self.critic
    }

    pub fn target_actor(&self) -> &Actor {
        &self.target_actor
    }

    pub fn target_critic(&self) -> &Critic {
        &self.target_critic
    }

    pub fn param_noise(&self) -> Option<AdaptiveParamNoiseSpec> {
        self.param_noise
    }

    pub fn obs_rms(&self) -> Option<&RunningMeanStd> {
        self.obs_rms.as_ref()
    }

    /// Re-draw the exploration copy of the actor from the current weights.
    fn perturb_actor(&mut self) {
        let Some(spec) = self.param_noise else {
            self.perturbed_actor = None;
            return;
        };
        self.perturbed_actor = Some(perturb_params::<B, _, _>(
            &self.actor,
            spec.current_stddev,
            &mut self.rng,
        ));
    }

    /// Normalize (when enabled) and clip observations.
    fn prepare_obs(&self, obs: &[f32]) -> Vec<f32> {
        let clip = self.config.observation_clip;
        match &self.obs_rms {
            Some(rms) => rms.normalize_batch(obs, Some(clip)),
            None => obs.iter().map(|x| x.clamp(-clip, clip)).collect(),
        }
    }

    fn obs_tensor(&self, obs: &[f32]) -> Result<Tensor<B, 2>> {
        let rows = rows_of(obs.len(), self.obs_size, "obs")?;
        Ok(matrix::<B>(&self.prepare_obs(obs), rows, self.obs_size, &self.device))
    }

    /// Critic output in raw return scale.
    fn denormalize_q(&self, q: Tensor<B, 2>) -> Tensor<B, 2> {
        match &self.ret_rms {
            Some(rms) => q.mul_scalar(rms.std() as f32).add_scalar(rms.mean() as f32),
            None => q,
        }
    }

    fn ensure_action_noise(&mut self, n: usize) {
        if let Some(kind) = self.action_noise_kind {
            while self.action_noise.len() < n {
                let seed = self.config.seed.wrapping_add(1 + self.action_noise.len() as u64);
                self.action_noise.push(kind.build(self.action_dim, seed));
            }
        }
    }
}

impl<B, Actor, Critic, AO, CO> Estimator for Ddpg<B, Actor, Critic, AO, CO>
where
    B: AutodiffBackend,
    Actor: DdpgActor<B> + AutodiffModule<B>,
    Critic: DdpgCritic<B> + AutodiffModule<B>,
    AO: Optimizer<Actor, B>,
    CO: Optimizer<Critic, B>,
{
    fn obs_size(&self) -> usize {
        self.obs_size
    }

    fn action_dim(&self) -> usize {
        self.action_dim
    }

    fn discount(&self) -> f32 {
        self.config.gamma
    }

    fn act(&mut self, obs: &[f32], apply_noise: bool, compute_value: bool) -> Result<ActOutput> {
        let n = rows_of(obs.len(), self.obs_size, "obs")?;
        let x = self.obs_tensor(obs)?;

        let policy = match (&self.perturbed_actor, apply_noise) {
            (Some(perturbed), true) => perturbed.forward(x.clone()),
            _ => self.actor.forward(x.clone()),
        };
        let mut actions = to_vec(policy)?;

        let q_values = if compute_value {
            let q = self.critic.forward(x.clone(), self.actor.forward(x));
            Some(to_vec(self.denormalize_q(q))?)
        } else {
            None
        };

        // Action noise stacks on the perturbed actor's output when both are set
        if apply_noise && self.action_noise_kind.is_some() {
            self.ensure_action_noise(n);
            for (row, process) in actions
                .chunks_exact_mut(self.action_dim)
                .zip(self.action_noise.iter_mut())
            {
                for (a, eps) in row.iter_mut().zip(process.sample()) {
                    *a += eps;
                }
            }
        }
        for a in actions.iter_mut() {
            *a = a.clamp(-1.0, 1.0);
        }

        Ok(ActOutput { actions, q_values })
    }

    fn observe(&mut self, obs: &[f32]) {
        if let Some(rms) = self.obs_rms.as_mut() {
            rms.update_batch(obs);
        }
    }

    fn train(&mut self, batch: &Batch) -> Result<TrainLosses> {
        let n = batch.len();
        if n == 0 {
            return Err(CrmError::InsufficientData {
                requested: 1,
                available: 0,
            });
        }
        rows_of(batch.actions.len(), self.action_dim, "action")?;

        let obs = self.obs_tensor(&batch.obs)?;
        let next_obs = self.obs_tensor(&batch.next_obs)?;
        let actions = matrix::<B>(&batch.actions, n, self.action_dim, &self.device);
        let rewards = matrix::<B>(&batch.rewards, n, 1, &self.device)
            .mul_scalar(self.config.reward_scale);
        let not_done = matrix::<B>(&batch.terminals, n, 1, &self.device)
            .mul_scalar(-1.0)
            .add_scalar(1.0);

        // ====================================================================
        // CRITIC UPDATE
        // ====================================================================

        let next_q = self
            .target_critic
            .forward(next_obs.clone(), self.target_actor.forward(next_obs));
        let next_q = self.denormalize_q(next_q);
        let target_q = (rewards + not_done * next_q.mul_scalar(self.config.gamma)).detach();

        let regression_target = match self.ret_rms.as_mut() {
            Some(rms) => {
                rms.update_batch(&to_vec(target_q.clone())?);
                target_q
                    .sub_scalar(rms.mean() as f32)
                    .div_scalar(rms.std() as f32)
            }
            None => target_q,
        };

        let q = self.critic.forward(obs.clone(), actions);
        let critic_loss = (q - regression_target).powf_scalar(2.0).mean();
        let critic_loss_val = scalar(critic_loss.clone())?;

        let grads = critic_loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.critic);
        self.critic = self
            .critic_optim
            .step(self.config.critic_lr, self.critic.clone(), grads);

        // ====================================================================
        // ACTOR UPDATE
        // ====================================================================

        let q_pi = self.critic.forward(obs.clone(), self.actor.forward(obs));
        let actor_loss = self.denormalize_q(q_pi).mean().neg();
        let actor_loss_val = scalar(actor_loss.clone())?;

        let grads = actor_loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.actor);
        self.actor = self
            .actor_optim
            .step(self.config.actor_lr, self.actor.clone(), grads);

        Ok(TrainLosses {
            critic_loss: critic_loss_val,
            actor_loss: actor_loss_val,
        })
    }

    fn sync_targets(&mut self) {
        let tau = self.config.tau;
        self.target_actor = soft_update::<B, _>(&self.actor, self.target_actor.clone(), tau);
        self.target_critic = soft_update::<B, _>(&self.critic, self.target_critic.clone(), tau);
    }

    fn adapt_param_noise(&mut self, batch: &Batch) -> Result<Option<f32>> {
        let Some(spec) = self.param_noise else {
            return Ok(None);
        };
        if batch.is_empty() {
            return Err(CrmError::InsufficientData {
                requested: 1,
                available: 0,
            });
        }

        let obs = self.obs_tensor(&batch.obs)?;
        let adaptive = perturb_params::<B, _, _>(&self.actor, spec.current_stddev, &mut self.rng);
        let clean = to_vec(self.actor.forward(obs.clone()))?;
        let noisy = to_vec(adaptive.forward(obs))?;

        let distance = action_distance(&clean, &noisy);
        let next = spec.adapted(distance);
        log::debug!(
            "param noise: distance {:.4}, stddev {:.4} -> {:.4}",
            distance,
            spec.current_stddev,
            next.current_stddev
        );
        self.param_noise = Some(next);
        Ok(Some(distance))
    }

    fn reset(&mut self) {
        for process in self.action_noise.iter_mut() {
            process.reset();
        }
        self.perturb_actor();
    }

    fn diagnostics(&mut self, reference: &Batch) -> Result<EstimatorDiagnostics> {
        let n = reference.len();
        if n == 0 {
            return Err(CrmError::InsufficientData {
                requested: 1,
                available: 0,
            });
        }

        let obs = self.obs_tensor(&reference.obs)?;
        let actions = matrix::<B>(&reference.actions, n, self.action_dim, &self.device);
        let q = to_vec(self.denormalize_q(self.critic.forward(obs.clone(), actions)))?;
        let pi = to_vec(self.actor.forward(obs))?;

        let (q_mean, q_std) = mean_std(&q);
        let (a_mean, a_std) = mean_std(&pi);
        let (obs_rms_mean, obs_rms_std) = match &self.obs_rms {
            Some(rms) => {
                let dim = rms.dim().max(1) as f64;
                let mean = rms.mean().iter().sum::<f64>() / dim;
                let std = rms.std_vec().iter().sum::<f64>() / dim;
                (Some(mean as f32), Some(std as f32))
            }
            None => (None, None),
        };

        Ok(EstimatorDiagnostics {
            reference_q_mean: q_mean,
            reference_q_std: q_std,
            reference_action_mean: a_mean,
            reference_action_std: a_std,
            obs_rms_mean,
            obs_rms_std,
            param_noise_stddev: self.param_noise.map(|s| s.current_stddev),
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Number of rows in a flattened `[rows * width]` buffer.
fn rows_of(len: usize, width: usize, field: &'static str) -> Result<usize> {
    if width == 0 || len % width != 0 {
        return Err(CrmError::ShapeMismatch {
            field,
            expected: width,
            actual: len,
        });
    }
    Ok(len / width)
}

fn matrix<B: Backend>(data: &[f32], rows: usize, cols: usize, device: &B::Device) -> Tensor<B, 2> {
    Tensor::<B, 1>::from_floats(data, device).reshape([rows, cols])
}

fn to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| CrmError::Tensor(format!("{:?}", e)))
}

fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> Result<f32> {
    to_vec(tensor)?
        .first()
        .copied()
        .ok_or_else(|| CrmError::Tensor("empty loss tensor".to_string()))
}

pub(crate) fn mean_std(values: &[f32]) -> (f32, f32) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    (mean, var.sqrt())
}
