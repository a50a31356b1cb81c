//! Training loop configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{CrmError, Result};
use crate::relabel::FeedbackMode;

use super::evaluator::{EvalRewardSource, EvaluatorConfig, MilestoneChain};

const EVAL_SEED_OFFSET: u64 = 10_000;

/// When the replay memory grows with the automaton's state count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryScaling {
    /// Scale only when counterfactual expansion is on.
    #[default]
    WhenCounterfactual,
    /// Scale under counterfactual expansion or reward shaping.
    WhenAnyFeedback,
    Never,
}

impl MemoryScaling {
    /// Factor applied to memory capacity and batch size.
    pub fn factor(self, mode: FeedbackMode, num_rm_states: usize) -> usize {
        let scale = match self {
            MemoryScaling::WhenCounterfactual => mode.uses_counterfactual(),
            MemoryScaling::WhenAnyFeedback => mode != FeedbackMode::Off,
            MemoryScaling::Never => false,
        };
        if scale {
            num_rm_states.max(1)
        } else {
            1
        }
    }
}

impl FromStr for MemoryScaling {
    type Err = CrmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "when_counterfactual" | "crm" => Ok(MemoryScaling::WhenCounterfactual),
            "when_any_feedback" | "any" => Ok(MemoryScaling::WhenAnyFeedback),
            "never" => Ok(MemoryScaling::Never),
            other => Err(CrmError::config(format!("unknown memory scaling \"{}\"", other))),
        }
    }
}

/// Loop sizes, memory sizing, evaluation and bookkeeping settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    // ========================================================================
    // Loop Structure
    // ========================================================================
    /// Number of epochs (ignored when `total_timesteps` is set).
    pub nb_epochs: usize,

    /// Derive the epoch count from a step budget.
    pub total_timesteps: Option<usize>,

    /// Cycles per epoch.
    pub nb_epoch_cycles: usize,

    /// Rollout steps per cycle.
    pub nb_rollout_steps: usize,

    /// Gradient steps per cycle.
    pub nb_train_steps: usize,

    // ========================================================================
    // Replay Memory
    // ========================================================================
    /// Memory capacity before automaton scaling.
    pub memory_limit: usize,

    /// Batch size before automaton scaling.
    pub batch_size: usize,

    pub memory_scaling: MemoryScaling,

    /// Train steps between parameter-noise recalibrations.
    pub param_noise_adaption_interval: usize,

    // ========================================================================
    // Feedback
    // ========================================================================
    pub feedback: FeedbackMode,

    // ========================================================================
    // Evaluation
    // ========================================================================
    /// Rollout steps between evaluations. 0 disables evaluation.
    pub eval_freq: usize,

    /// Episodes per evaluation.
    pub eval_nbr: usize,

    /// Per-step probability of injecting a uniform action perturbation.
    pub eval_noise_level: f32,

    /// Step cap per evaluation episode.
    pub eval_max_steps: usize,

    /// Discount used when scoring evaluation episodes. None = the estimator's discount.
    pub eval_gamma: Option<f32>,

    pub eval_reward_source: EvalRewardSource,

    pub milestones: MilestoneChain,

    // ========================================================================
    // Bookkeeping
    // ========================================================================
    /// Environment runs with dropped detections (used in result paths).
    pub missing: bool,

    /// Root directory for persisted results. None = don't persist.
    pub results_dir: Option<PathBuf>,

    /// Seed for the trainer's own random streams.
    pub seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            nb_epochs: 500,
            total_timesteps: None,
            nb_epoch_cycles: 20,
            nb_rollout_steps: 100,
            nb_train_steps: 50,
            memory_limit: 1_000_000,
            batch_size: 64,
            memory_scaling: MemoryScaling::default(),
            param_noise_adaption_interval: 50,
            feedback: FeedbackMode::Off,
            eval_freq: 1000,
            eval_nbr: 5,
            eval_noise_level: 0.0,
            eval_max_steps: 1000,
            eval_gamma: None,
            eval_reward_source: EvalRewardSource::default(),
            milestones: MilestoneChain::canonical(),
            missing: false,
            results_dir: None,
            seed: 0,
        }
    }
}

impl TrainerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tiny loop for tests and smoke runs.
    pub fn smoke() -> Self {
        Self {
            nb_epochs: 1,
            nb_epoch_cycles: 2,
            nb_rollout_steps: 5,
            nb_train_steps: 2,
            memory_limit: 1000,
            batch_size: 4,
            param_noise_adaption_interval: 2,
            eval_freq: 0,
            eval_nbr: 1,
            eval_max_steps: 20,
            ..Self::default()
        }
    }

    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_nb_epochs(mut self, n: usize) -> Self {
        self.nb_epochs = n;
        self
    }

    pub fn with_total_timesteps(mut self, steps: Option<usize>) -> Self {
        self.total_timesteps = steps;
        self
    }

    pub fn with_nb_epoch_cycles(mut self, n: usize) -> Self {
        self.nb_epoch_cycles = n;
        self
    }

    pub fn with_nb_rollout_steps(mut self, n: usize) -> Self {
        self.nb_rollout_steps = n;
        self
    }

    pub fn with_nb_train_steps(mut self, n: usize) -> Self {
        self.nb_train_steps = n;
        self
    }

    pub fn with_memory_limit(mut self, limit: usize) -> Self {
        self.memory_limit = limit;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_memory_scaling(mut self, scaling: MemoryScaling) -> Self {
        self.memory_scaling = scaling;
        self
    }

    pub fn with_param_noise_adaption_interval(mut self, interval: usize) -> Self {
        self.param_noise_adaption_interval = interval;
        self
    }

    pub fn with_feedback(mut self, feedback: FeedbackMode) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn with_eval_freq(mut self, freq: usize) -> Self {
        self.eval_freq = freq;
        self
    }

    pub fn with_eval_nbr(mut self, n: usize) -> Self {
        self.eval_nbr = n;
        self
    }

    pub fn with_eval_noise_level(mut self, level: f32) -> Self {
        self.eval_noise_level = level;
        self
    }

    pub fn with_eval_max_steps(mut self, steps: usize) -> Self {
        self.eval_max_steps = steps;
        self
    }

    pub fn with_eval_gamma(mut self, gamma: Option<f32>) -> Self {
        self.eval_gamma = gamma;
        self
    }

    pub fn with_eval_reward_source(mut self, source: EvalRewardSource) -> Self {
        self.eval_reward_source = source;
        self
    }

    pub fn with_missing(mut self, missing: bool) -> Self {
        self.missing = missing;
        self
    }

    pub fn with_results_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.results_dir = dir;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Rollout steps per epoch (per replica).
    pub fn steps_per_epoch(&self) -> usize {
        self.nb_epoch_cycles * self.nb_rollout_steps
    }

    /// Epoch count, derived from `total_timesteps` when set.
    pub fn resolved_epochs(&self) -> usize {
        match self.total_timesteps {
            Some(total) if self.steps_per_epoch() > 0 => total / self.steps_per_epoch(),
            _ => self.nb_epochs,
        }
    }

    /// Evaluation settings, seeded apart from the training streams.
    ///
    /// `discount` is the estimator's own discount, used unless `eval_gamma` overrides it.
    pub fn evaluator_config(&self, discount: f32) -> EvaluatorConfig {
        EvaluatorConfig {
            episodes: self.eval_nbr,
            max_steps: self.eval_max_steps,
            noise_level: self.eval_noise_level,
            gamma: self.eval_gamma.unwrap_or(discount),
            reward_source: self.eval_reward_source,
            milestones: self.milestones.clone(),
            seed: self.seed.wrapping_add(EVAL_SEED_OFFSET),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("nb_epoch_cycles", self.nb_epoch_cycles),
            ("nb_rollout_steps", self.nb_rollout_steps),
            ("memory_limit", self.memory_limit),
            ("batch_size", self.batch_size),
            ("param_noise_adaption_interval", self.param_noise_adaption_interval),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(CrmError::config(format!("{} must be positive", name)));
            }
        }
        if self.resolved_epochs() == 0 {
            return Err(CrmError::config("training would run zero epochs"));
        }
        if !(0.0..=1.0).contains(&self.eval_noise_level) {
            return Err(CrmError::config(format!(
                "eval noise level must be in [0, 1], got {}",
                self.eval_noise_level
            )));
        }
        if let Some(gamma) = self.eval_gamma {
            if !(0.0..=1.0).contains(&gamma) {
                return Err(CrmError::config(format!("eval gamma must be in [0, 1], got {}", gamma)));
            }
        }
        if self.eval_freq > 0 && (self.eval_nbr == 0 || self.eval_max_steps == 0) {
            return Err(CrmError::config("evaluation needs at least one episode of at least one step"));
        }
        Ok(())
    }
}
