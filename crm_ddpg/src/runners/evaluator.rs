//! Milestone-scored evaluation rollouts.
//!
//! Episodes are run without exploration noise. Progress is scored on the
//! reward machine rather than on the environment reward: each advance
//! along the milestone chain is worth 1, discounted by `gamma^step`.

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::algorithms::estimator::Estimator;
use crate::environment::{RewardMachineEnv, RmState};
use crate::error::{CrmError, Result};

/// Magnitude of the uniform perturbation injected at evaluation time.
pub const EVAL_PERTURBATION: f32 = 0.1;

// ============================================================================
// Milestones
// ============================================================================

/// Ordered automaton states whose successive visits are rewarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneChain {
    /// States in the order they must be reached.
    pub ordered: Vec<RmState>,
    /// States that count as acceptance after the last ordered state.
    pub accepting: Vec<RmState>,
}

impl MilestoneChain {
    pub fn new(ordered: Vec<RmState>, accepting: Vec<RmState>) -> Self {
        Self { ordered, accepting }
    }

    /// `0 → 1 → 2 → 3 → 4 → accepting`, where acceptance is `-1` or `5`.
    pub fn canonical() -> Self {
        Self {
            ordered: (0..5).map(RmState).collect(),
            accepting: vec![RmState::ACCEPTING, RmState(5)],
        }
    }

    /// 1 when `prev → next` is the next link of the chain, 0 otherwise.
    pub fn step_reward(&self, prev: RmState, next: RmState) -> f32 {
        let Some(i) = self.ordered.iter().position(|&s| s == prev) else {
            return 0.0;
        };
        let advanced = match self.ordered.get(i + 1) {
            Some(&following) => next == following,
            None => self.accepting.contains(&next),
        };
        if advanced {
            1.0
        } else {
            0.0
        }
    }

    pub fn is_success(&self, state: RmState) -> bool {
        self.accepting.contains(&state)
    }
}

impl Default for MilestoneChain {
    fn default() -> Self {
        Self::canonical()
    }
}

/// Which reward an evaluation episode accumulates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalRewardSource {
    /// Milestone advances of the reward machine.
    #[default]
    Milestones,
    /// The environment's native reward.
    Environment,
}

impl FromStr for EvalRewardSource {
    type Err = CrmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "milestones" | "rm" => Ok(EvalRewardSource::Milestones),
            "environment" | "env" => Ok(EvalRewardSource::Environment),
            other => Err(CrmError::config(format!("unknown evaluation reward source \"{}\"", other))),
        }
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Outcome of one evaluation episode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeOutcome {
    pub success: bool,
    pub discounted_return: f64,
    /// Automaton state at the end of the episode (partial success).
    pub final_rm_state: RmState,
    pub length: usize,
}

/// All episodes of one evaluation checkpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationReport {
    /// Rollout step counter when the checkpoint was taken.
    pub env_step: usize,
    pub episodes: Vec<EpisodeOutcome>,
}

impl EvaluationReport {
    pub fn mean_return(&self) -> f64 {
        self.mean_of(|e| e.discounted_return)
    }

    pub fn success_rate(&self) -> f64 {
        self.mean_of(|e| if e.success { 1.0 } else { 0.0 })
    }

    pub fn mean_length(&self) -> f64 {
        self.mean_of(|e| e.length as f64)
    }

    fn mean_of(&self, f: impl Fn(&EpisodeOutcome) -> f64) -> f64 {
        if self.episodes.is_empty() {
            return 0.0;
        }
        self.episodes.iter().map(f).sum::<f64>() / self.episodes.len() as f64
    }
}

// ============================================================================
// Evaluator
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    pub episodes: usize,
    pub max_steps: usize,
    /// Per-step probability of a shared uniform action perturbation.
    pub noise_level: f32,
    pub gamma: f32,
    pub reward_source: EvalRewardSource,
    pub milestones: MilestoneChain,
    pub seed: u64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            episodes: 5,
            max_steps: 1000,
            noise_level: 0.0,
            gamma: 0.99,
            reward_source: EvalRewardSource::default(),
            milestones: MilestoneChain::canonical(),
            seed: 0,
        }
    }
}

/// Runs clean evaluation episodes and scores automaton progress.
///
/// Vectorized evaluation environments are stepped as a whole but only
/// replica 0 is scored.
pub struct Evaluator {
    config: EvaluatorConfig,
    rng: Xoshiro256PlusPlus,
}

impl Evaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        let rng = Xoshiro256PlusPlus::seed_from_u64(config.seed);
        Self { config, rng }
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Run `episodes` evaluation episodes.
    ///
    /// `action_high` scales the policy's `[-1, 1]` output into the
    /// environment's bounds.
    pub fn evaluate<E, M>(
        &mut self,
        env: &mut E,
        estimator: &mut M,
        action_high: &[f32],
        env_step: usize,
    ) -> Result<EvaluationReport>
    where
        E: RewardMachineEnv + ?Sized,
        M: Estimator + ?Sized,
    {
        if action_high.len() != env.action_dim() {
            return Err(CrmError::ShapeMismatch {
                field: "action_high",
                expected: env.action_dim(),
                actual: action_high.len(),
            });
        }

        let episodes = (0..self.config.episodes)
            .map(|_| self.episode(env, estimator, action_high))
            .collect::<Result<Vec<_>>>()?;

        Ok(EvaluationReport { env_step, episodes })
    }

    fn episode<E, M>(&mut self, env: &mut E, estimator: &mut M, action_high: &[f32]) -> Result<EpisodeOutcome>
    where
        E: RewardMachineEnv + ?Sized,
        M: Estimator + ?Sized,
    {
        let n_envs = env.n_envs();
        let obs_size = env.obs_size();
        let milestones = &self.config.milestones;

        let mut obs = env.reset();
        let mut prev = RmState::INITIAL;
        let mut discounted_return = 0.0f64;
        let mut discount = 1.0f64;
        let mut length = 0;
        let mut success = false;

        while length < self.config.max_steps {
            let out = estimator.act(&obs, false, false)?;
            let mut actions: Vec<f32> = out
                .actions
                .iter()
                .zip(action_high.iter().cycle())
                .map(|(a, h)| a * h)
                .collect();

            if self.rng.gen::<f32>() < self.config.noise_level {
                let delta = self.rng.gen_range(-EVAL_PERTURBATION..EVAL_PERTURBATION);
                for (a, h) in actions.iter_mut().zip(action_high.iter().cycle()) {
                    *a = (*a + delta).clamp(-h, *h);
                }
            }

            let step = env.step(&actions)?;
            step.validate(n_envs, obs_size)?;
            let state = step.infos[0].require_rm_state(0)?;

            let reward = match self.config.reward_source {
                EvalRewardSource::Milestones => milestones.step_reward(prev, state),
                EvalRewardSource::Environment => step.rewards[0],
            };
            discounted_return += discount * reward as f64;
            discount *= self.config.gamma as f64;
            length += 1;
            prev = state;

            if milestones.is_success(state) {
                success = true;
                break;
            }
            if step.dones[0] {
                break;
            }
            obs = step.observations;
        }

        Ok(EpisodeOutcome {
            success,
            discounted_return,
            final_rm_state: prev,
            length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_milestone_scoring() {
        let chain = MilestoneChain::canonical();
        for i in 0..4 {
            assert_eq!(chain.step_reward(RmState(i), RmState(i + 1)), 1.0);
        }
        assert_eq!(chain.step_reward(RmState(4), RmState::ACCEPTING), 1.0);
        assert_eq!(chain.step_reward(RmState(4), RmState(5)), 1.0);

        // Staying, skipping, regressing
        assert_eq!(chain.step_reward(RmState(2), RmState(2)), 0.0);
        assert_eq!(chain.step_reward(RmState(1), RmState(3)), 0.0);
        assert_eq!(chain.step_reward(RmState(3), RmState(2)), 0.0);
        assert_eq!(chain.step_reward(RmState(0), RmState::ACCEPTING), 0.0);
        assert_eq!(chain.step_reward(RmState::ACCEPTING, RmState(0)), 0.0);
    }

    #[test]
    fn test_success_markers() {
        let chain = MilestoneChain::canonical();
        assert!(chain.is_success(RmState::ACCEPTING));
        assert!(chain.is_success(RmState(5)));
        assert!(!chain.is_success(RmState(4)));
    }

    #[test]
    fn test_reward_source_parsing() {
        assert_eq!("rm".parse::<EvalRewardSource>().unwrap(), EvalRewardSource::Milestones);
        assert_eq!("environment".parse::<EvalRewardSource>().unwrap(), EvalRewardSource::Environment);
        assert!(matches!("both".parse::<EvalRewardSource>(), Err(CrmError::Configuration(_))));
    }

    #[test]
    fn test_report_aggregates() {
        let outcome = |success, ret| EpisodeOutcome {
            success,
            discounted_return: ret,
            final_rm_state: RmState(2),
            length: 10,
        };
        let report = EvaluationReport {
            env_step: 100,
            episodes: vec![outcome(true, 2.0), outcome(false, 1.0)],
        };
        assert_eq!(report.mean_return(), 1.5);
        assert_eq!(report.success_rate(), 0.5);
        assert_eq!(report.mean_length(), 10.0);
        assert_eq!(EvaluationReport::default().mean_return(), 0.0);
    }
}
