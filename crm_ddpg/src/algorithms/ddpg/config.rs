//! DDPG configuration.

use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::{AdamConfig, Optimizer};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::noise::NoiseConfig;

// ============================================================================
// DDPG Configuration
// ============================================================================

/// Hyper-parameters of the actor-critic estimator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DdpgConfig {
    // ========================================================================
    // Learning
    // ========================================================================
    /// Discount factor.
    pub gamma: f32,

    /// Target network tracking rate.
    pub tau: f32,

    /// Actor learning rate.
    pub actor_lr: f64,

    /// Critic learning rate.
    pub critic_lr: f64,

    /// L2 penalty on critic weights (applied as Adam weight decay). 0 disables it.
    pub critic_l2_reg: f32,

    /// Gradient norm clipping for both networks. None = no clipping.
    pub clip_norm: Option<f32>,

    /// Multiplier applied to rewards when forming TD targets.
    pub reward_scale: f32,

    // ========================================================================
    // Normalization
    // ========================================================================
    /// Normalize observations with running statistics.
    pub normalize_observations: bool,

    /// Clip range for normalized observations (symmetric).
    pub observation_clip: f32,

    /// Train the critic on normalized returns.
    pub normalize_returns: bool,

    // ========================================================================
    // Exploration
    // ========================================================================
    /// Noise string, e.g. `adaptive-param_0.2`, `ou_0.2`, `none`.
    pub noise_type: String,

    /// Seed for host-side noise generators.
    pub seed: u64,
}

impl Default for DdpgConfig {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            tau: 0.01,
            actor_lr: 1e-4,
            critic_lr: 1e-3,
            critic_l2_reg: 1e-2,
            clip_norm: None,
            reward_scale: 1.0,
            normalize_observations: true,
            observation_clip: 5.0,
            normalize_returns: false,
            noise_type: "adaptive-param_0.2".to_string(),
            seed: 0,
        }
    }
}

impl DdpgConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings for small unit-test problems: no noise, no normalization.
    pub fn deterministic() -> Self {
        Self {
            noise_type: "none".to_string(),
            normalize_observations: false,
            critic_l2_reg: 0.0,
            ..Self::default()
        }
    }

    pub fn with_gamma(mut self, gamma: f32) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_tau(mut self, tau: f32) -> Self {
        self.tau = tau;
        self
    }

    pub fn with_actor_lr(mut self, lr: f64) -> Self {
        self.actor_lr = lr;
        self
    }

    pub fn with_critic_lr(mut self, lr: f64) -> Self {
        self.critic_lr = lr;
        self
    }

    pub fn with_critic_l2_reg(mut self, reg: f32) -> Self {
        self.critic_l2_reg = reg;
        self
    }

    pub fn with_clip_norm(mut self, clip_norm: Option<f32>) -> Self {
        self.clip_norm = clip_norm;
        self
    }

    pub fn with_reward_scale(mut self, scale: f32) -> Self {
        self.reward_scale = scale;
        self
    }

    pub fn with_normalize_observations(mut self, enabled: bool) -> Self {
        self.normalize_observations = enabled;
        self
    }

    pub fn with_normalize_returns(mut self, enabled: bool) -> Self {
        self.normalize_returns = enabled;
        self
    }

    pub fn with_noise_type(mut self, noise_type: impl Into<String>) -> Self {
        self.noise_type = noise_type.into();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Parse the noise string.
    pub fn noise(&self) -> Result<NoiseConfig> {
        NoiseConfig::parse(&self.noise_type)
    }

    /// Validate numeric ranges and the noise string.
    pub fn validate(&self) -> Result<()> {
        use crate::error::CrmError;

        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(CrmError::config(format!("gamma must be in [0, 1], got {}", self.gamma)));
        }
        if !(0.0..=1.0).contains(&self.tau) {
            return Err(CrmError::config(format!("tau must be in [0, 1], got {}", self.tau)));
        }
        if self.actor_lr <= 0.0 || self.critic_lr <= 0.0 {
            return Err(CrmError::config("learning rates must be positive"));
        }
        if self.observation_clip <= 0.0 {
            return Err(CrmError::config("observation clip must be positive"));
        }
        self.noise().map(|_| ())
    }

    /// Create the actor and critic Adam optimizers.
    pub fn create_optimizers<B, Actor, Critic>(
        &self,
    ) -> (impl Optimizer<Actor, B>, impl Optimizer<Critic, B>)
    where
        B: AutodiffBackend,
        Actor: AutodiffModule<B>,
        Critic: AutodiffModule<B>,
    {
        let mut actor_config = AdamConfig::new().with_epsilon(1e-8);
        let mut critic_config = AdamConfig::new().with_epsilon(1e-8);

        if self.critic_l2_reg > 0.0 {
            critic_config =
                critic_config.with_weight_decay(Some(WeightDecayConfig::new(self.critic_l2_reg)));
        }

        if let Some(max_norm) = self.clip_norm {
            actor_config =
                actor_config.with_grad_clipping(Some(GradientClippingConfig::Norm(max_norm)));
            critic_config =
                critic_config.with_grad_clipping(Some(GradientClippingConfig::Norm(max_norm)));
        }

        (actor_config.init(), critic_config.init())
    }
}
