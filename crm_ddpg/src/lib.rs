//! # CRM-DDPG: Reward-Machine Experience for Off-Policy Actor-Critic
//!
//! Deterministic policy gradient training whose experience stream is
//! enriched by a reward machine: every real step can be relabeled for each
//! automaton state (counterfactual experience) or rewarded with a shaped
//! signal, and progress is measured on automaton milestones.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                             Trainer                                 │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  act + noise  ┌──────────────────┐                │
//! │  │  Estimator   │──────────────▶│ RewardMachineEnv │                │
//! │  │ actor/critic │               │  (n replicas)    │                │
//! │  │  + targets   │               └────────┬─────────┘                │
//! │  └──────▲───────┘                        │ EnvStep + StepInfo       │
//! │         │ train / sync / adapt           ▼                          │
//! │  ┌──────┴───────┐   transitions ┌──────────────────┐                │
//! │  │ ReplayMemory │◀──────────────│ Counterfactual   │                │
//! │  │ (ring)       │               │ Expander         │                │
//! │  └──────────────┘               └──────────────────┘                │
//! │                                                                     │
//! │  every eval_freq steps: Evaluator ─▶ ResultsRecord (JSON)           │
//! │  every epoch:           EpochStats ─▶ MetricsLogger                 │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use crm_ddpg::{Ddpg, DdpgConfig, FeedbackMode, MlpConfig, Trainer, TrainerConfig};
//!
//! let ddpg_config = DdpgConfig::new().with_noise_type("adaptive-param_0.2");
//! let mlp = MlpConfig::new(env.obs_size(), env.action_dim());
//! let (actor_optim, critic_optim) = ddpg_config.create_optimizers::<B, MlpActor<B>, MlpCritic<B>>();
//! let ddpg = Ddpg::new(mlp.init_actor(&device), mlp.init_critic(&device),
//!                      actor_optim, critic_optim, ddpg_config, device)?;
//!
//! let config = TrainerConfig::new().with_feedback(FeedbackMode::Counterfactual);
//! let mut trainer = Trainer::new(config, env, ddpg)?.with_eval_env(eval_env)?;
//! trainer.run()?;
//! ```

pub mod algorithms;
pub mod buffers;
pub mod core;
pub mod environment;
pub mod error;
pub mod metrics;
pub mod noise;
pub mod relabel;
pub mod runners;

// Re-export commonly used types
pub use crate::core::running_stats::{RunningMeanStd, RunningScalarStats};
pub use crate::core::transition::{Batch, Transition, TransitionShape};
pub use error::{CrmError, Result};

pub use buffers::{ReplayMemory, ReplayMemoryConfig};

pub use noise::{
    ActionNoise, ActionNoiseKind, AdaptiveParamNoiseSpec, NoiseConfig, NormalActionNoise,
    OrnsteinUhlenbeckActionNoise,
};

// Estimators
pub use algorithms::{
    ActOutput, Ddpg, DdpgActor, DdpgConfig, DdpgCritic, Estimator, EstimatorDiagnostics, MlpActor, MlpConfig,
    MlpCritic, TrainLosses,
};

// Environment contract
pub use environment::{symmetric_action_high, EnvStep, RewardMachineEnv, RmState, StepInfo};
pub use relabel::{CounterfactualExpander, FeedbackMode};

// Runners
pub use runners::{
    EpisodeOutcome, EvalRewardSource, EvaluationReport, Evaluator, EvaluatorConfig, MemoryScaling,
    MilestoneChain, Phase, ResultsKey, ResultsRecord, Trainer, TrainerConfig, TrainingSummary,
};

pub use metrics::{ConsoleLogger, CsvLogger, EpochRecorder, EpochStats, MetricsLogger, MultiLogger};
