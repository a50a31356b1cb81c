//! Environment contract for reward-machine tasks.
//!
//! The trainer only needs vectorized stepping plus a per-replica info
//! record carrying the automaton state and the counterfactual or shaped
//! feedback. Automaton semantics stay inside the environment.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::transition::Transition;
use crate::error::{CrmError, Result};

/// Reward machine state index.
///
/// Compared by equality only. `ACCEPTING` marks the terminal accepting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RmState(pub i32);

impl RmState {
    pub const ACCEPTING: RmState = RmState(-1);
    pub const INITIAL: RmState = RmState(0);

    pub fn is_accepting(self) -> bool {
        self == Self::ACCEPTING
    }
}

impl fmt::Display for RmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-replica step info.
///
/// Which fields must be present depends on the feedback mode; see
/// [`StepInfo::require_rm_state`] and friends.
#[derive(Debug, Clone, Default)]
pub struct StepInfo {
    /// Automaton state after the step.
    pub rm_state: Option<RmState>,
    /// One relabeled transition per automaton state (`crm-experience`).
    pub crm_experience: Option<Vec<Transition>>,
    /// Shaped reward for the real transition (`rs-reward`).
    pub rs_reward: Option<f32>,
}

impl StepInfo {
    pub fn new(rm_state: RmState) -> Self {
        Self {
            rm_state: Some(rm_state),
            ..Self::default()
        }
    }

    pub fn with_crm_experience(mut self, experience: Vec<Transition>) -> Self {
        self.crm_experience = Some(experience);
        self
    }

    pub fn with_rs_reward(mut self, reward: f32) -> Self {
        self.rs_reward = Some(reward);
        self
    }

    pub fn require_rm_state(&self, replica: usize) -> Result<RmState> {
        self.rm_state.ok_or(CrmError::MalformedInfo {
            replica,
            key: "rm_state",
        })
    }

    pub fn require_crm_experience(&self, replica: usize) -> Result<&[Transition]> {
        self.crm_experience
            .as_deref()
            .ok_or(CrmError::MalformedInfo {
                replica,
                key: "crm-experience",
            })
    }

    pub fn require_rs_reward(&self, replica: usize) -> Result<f32> {
        self.rs_reward.ok_or(CrmError::MalformedInfo {
            replica,
            key: "rs-reward",
        })
    }
}

/// Result of stepping every replica once.
#[derive(Debug, Clone)]
pub struct EnvStep {
    /// Observations after the step `[n_envs * obs_size]`.
    ///
    /// For replicas that finished, this is the first observation of the
    /// next episode (environments auto-reset).
    pub observations: Vec<f32>,
    /// Rewards `[n_envs]`.
    pub rewards: Vec<f32>,
    /// Episode-end flags `[n_envs]`.
    pub dones: Vec<bool>,
    /// One info record per replica.
    pub infos: Vec<StepInfo>,
    /// Final observations of finished replicas, when the environment keeps them.
    pub terminal_observations: Option<Vec<f32>>,
}

impl EnvStep {
    pub fn new(observations: Vec<f32>, rewards: Vec<f32>, dones: Vec<bool>, infos: Vec<StepInfo>) -> Self {
        Self {
            observations,
            rewards,
            dones,
            infos,
            terminal_observations: None,
        }
    }

    /// Check the step's layout against the environment's declared sizes.
    pub fn validate(&self, n_envs: usize, obs_size: usize) -> Result<()> {
        let checks: [(&'static str, usize, usize); 4] = [
            ("observations", n_envs * obs_size, self.observations.len()),
            ("rewards", n_envs, self.rewards.len()),
            ("dones", n_envs, self.dones.len()),
            ("infos", n_envs, self.infos.len()),
        ];
        for (field, expected, actual) in checks {
            if expected != actual {
                return Err(CrmError::ShapeMismatch {
                    field,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }
}

/// Vectorized environment driven by a reward machine.
pub trait RewardMachineEnv {
    /// Number of parallel replicas.
    fn n_envs(&self) -> usize;

    /// Size of one replica's observation.
    fn obs_size(&self) -> usize;

    fn action_dim(&self) -> usize;

    /// Upper action bound per dimension. Bounds are `[-high, high]`.
    fn action_high(&self) -> Vec<f32>;

    /// Lower action bound per dimension. Must mirror `action_high`.
    fn action_low(&self) -> Vec<f32> {
        self.action_high().iter().map(|h| -h).collect()
    }

    /// Number of automaton states (used to scale the replay memory).
    fn num_rm_states(&self) -> usize;

    /// Reset every replica and return the initial observations.
    fn reset(&mut self) -> Vec<f32>;

    /// Step every replica with actions scaled into the environment bounds.
    fn step(&mut self, actions: &[f32]) -> Result<EnvStep>;

    /// Short name used in result paths.
    fn name(&self) -> &str {
        "env"
    }
}

/// Check that action bounds are symmetric and non-degenerate.
pub fn symmetric_action_high<E: RewardMachineEnv + ?Sized>(env: &E) -> Result<Vec<f32>> {
    let high = env.action_high();
    let low = env.action_low();
    if high.len() != env.action_dim() || low.len() != env.action_dim() {
        return Err(CrmError::config(format!(
            "action bounds have {} / {} entries for {} action dims",
            low.len(),
            high.len(),
            env.action_dim()
        )));
    }
    for (l, h) in low.iter().zip(&high) {
        if !(*h > 0.0) || (l + h).abs() > 1e-6 {
            return Err(CrmError::config(format!(
                "action bounds must be symmetric and non-empty, got [{}, {}]",
                l, h
            )));
        }
    }
    Ok(high)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bounds {
        low: Vec<f32>,
        high: Vec<f32>,
    }

    impl RewardMachineEnv for Bounds {
        fn n_envs(&self) -> usize {
            1
        }
        fn obs_size(&self) -> usize {
            1
        }
        fn action_dim(&self) -> usize {
            self.high.len()
        }
        fn action_high(&self) -> Vec<f32> {
            self.high.clone()
        }
        fn action_low(&self) -> Vec<f32> {
            self.low.clone()
        }
        fn num_rm_states(&self) -> usize {
            1
        }
        fn reset(&mut self) -> Vec<f32> {
            vec![0.0]
        }
        fn step(&mut self, _actions: &[f32]) -> Result<EnvStep> {
            Ok(EnvStep::new(vec![0.0], vec![0.0], vec![false], vec![StepInfo::new(RmState(0))]))
        }
    }

    #[test]
    fn test_symmetric_bounds_accepted() {
        let env = Bounds {
            low: vec![-2.0, -1.0],
            high: vec![2.0, 1.0],
        };
        assert_eq!(symmetric_action_high(&env).unwrap(), vec![2.0, 1.0]);
    }

    #[test]
    fn test_asymmetric_bounds_rejected() {
        let env = Bounds {
            low: vec![0.0],
            high: vec![1.0],
        };
        assert!(matches!(symmetric_action_high(&env), Err(CrmError::Configuration(_))));
    }

    #[test]
    fn test_missing_info_fields() {
        let info = StepInfo::default();
        assert!(matches!(
            info.require_rm_state(2),
            Err(CrmError::MalformedInfo {
                replica: 2,
                key: "rm_state"
            })
        ));
        assert!(matches!(
            info.require_crm_experience(0),
            Err(CrmError::MalformedInfo {
                key: "crm-experience",
                ..
            })
        ));
        assert!(matches!(
            info.require_rs_reward(0),
            Err(CrmError::MalformedInfo { key: "rs-reward", .. })
        ));
    }

    #[test]
    fn test_step_layout_validation() {
        let step = EnvStep::new(vec![0.0; 4], vec![0.0; 2], vec![false; 2], vec![StepInfo::default(); 2]);
        assert!(step.validate(2, 2).is_ok());
        assert!(matches!(
            step.validate(2, 3),
            Err(CrmError::ShapeMismatch { field: "observations", .. })
        ));
    }

    #[test]
    fn test_accepting_marker() {
        assert!(RmState::ACCEPTING.is_accepting());
        assert!(!RmState(5).is_accepting());
        assert_eq!(RmState(3).to_string(), "3");
    }
}
