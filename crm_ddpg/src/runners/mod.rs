//! Training orchestration.
//!
//! # Components
//!
//! - [`Trainer`]: explicit phase machine over epochs, cycles, rollout and train steps
//! - [`Evaluator`]: clean rollouts scored by reward-machine milestones
//! - [`ResultsRecord`]: per-checkpoint evaluation series persisted as JSON
//!
//! # Counterfactual Experience
//!
//! With counterfactual expansion every real step stores one transition per
//! automaton state, so the trainer multiplies memory capacity and batch
//! size by the automaton's state count (see [`MemoryScaling`]). The
//! expansion reads the first replica only; several replicas are rejected
//! when the trainer is built.

pub mod evaluator;
pub mod results;
pub mod trainer;
pub mod trainer_config;

#[cfg(test)]
pub mod tests;

pub use evaluator::{
    EpisodeOutcome, EvalRewardSource, EvaluationReport, Evaluator, EvaluatorConfig, MilestoneChain,
};
pub use results::{ResultsKey, ResultsRecord};
pub use trainer::{Phase, Trainer, TrainingSummary};
pub use trainer_config::{MemoryScaling, TrainerConfig};
