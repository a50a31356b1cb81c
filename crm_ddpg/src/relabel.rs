//! Counterfactual experience expansion.
//!
//! Turns one real vectorized step into the transitions that are stored:
//!
//! | mode             | stored per step                                     |
//! |------------------|-----------------------------------------------------|
//! | `Off`            | one real transition per replica                     |
//! | `Counterfactual` | every alternative in replica 0's `crm-experience`   |
//! | `Shaping`        | one real transition per replica, reward `rs-reward` |
//! | `Both`           | same as `Counterfactual` (the environment shapes)   |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::transition::{Transition, TransitionShape};
use crate::environment::EnvStep;
use crate::error::{CrmError, Result};

/// How reward-machine feedback is turned into stored experience.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackMode {
    #[default]
    Off,
    Counterfactual,
    Shaping,
    Both,
}

impl FeedbackMode {
    pub fn uses_counterfactual(self) -> bool {
        matches!(self, FeedbackMode::Counterfactual | FeedbackMode::Both)
    }

    pub fn uses_shaping(self) -> bool {
        matches!(self, FeedbackMode::Shaping | FeedbackMode::Both)
    }

    /// Directory label used when persisting results.
    pub fn label(self) -> &'static str {
        match self {
            FeedbackMode::Off => "ddpg",
            FeedbackMode::Counterfactual => "crm",
            FeedbackMode::Shaping => "rs",
            FeedbackMode::Both => "crm_rs",
        }
    }

    /// Counterfactual expansion reads replica 0 only, so it needs a single replica.
    pub fn check_replicas(self, n_envs: usize) -> Result<()> {
        if n_envs == 0 {
            return Err(CrmError::config("environment reports zero replicas"));
        }
        if self.uses_counterfactual() && n_envs > 1 {
            return Err(CrmError::config(format!(
                "counterfactual experience requires a single replica, got {}",
                n_envs
            )));
        }
        Ok(())
    }
}

impl fmt::Display for FeedbackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for FeedbackMode {
    type Err = CrmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "off" | "ddpg" | "none" => Ok(FeedbackMode::Off),
            "crm" | "counterfactual" => Ok(FeedbackMode::Counterfactual),
            "rs" | "shaping" => Ok(FeedbackMode::Shaping),
            "crm_rs" | "both" => Ok(FeedbackMode::Both),
            other => Err(CrmError::config(format!("unknown feedback mode \"{}\"", other))),
        }
    }
}

/// Expands real steps into stored transitions.
#[derive(Debug, Clone)]
pub struct CounterfactualExpander {
    mode: FeedbackMode,
    shape: TransitionShape,
    /// Per-dimension action bound, used to map environment-space actions
    /// of counterfactual alternatives back into `[-1, 1]`.
    action_high: Vec<f32>,
}

impl CounterfactualExpander {
    pub fn new(mode: FeedbackMode, shape: TransitionShape, action_high: Vec<f32>) -> Result<Self> {
        if action_high.len() != shape.action_dim {
            return Err(CrmError::ShapeMismatch {
                field: "action_high",
                expected: shape.action_dim,
                actual: action_high.len(),
            });
        }
        Ok(Self {
            mode,
            shape,
            action_high,
        })
    }

    pub fn mode(&self) -> FeedbackMode {
        self.mode
    }

    /// Transitions to store for one vectorized step.
    ///
    /// `obs` and `actions` are the flattened inputs of the step; actions in
    /// policy space.
    pub fn expand(&self, obs: &[f32], actions: &[f32], step: &EnvStep) -> Result<Vec<Transition>> {
        if self.mode.uses_counterfactual() {
            return self.counterfactual(step);
        }

        let out = self.real(obs, actions, step)?;
        if !self.mode.uses_shaping() {
            return Ok(out);
        }
        out.into_iter()
            .enumerate()
            .map(|(i, t)| Ok(t.with_reward(step.infos[i].require_rs_reward(i)?)))
            .collect()
    }

    /// Unroll the real batched step, one transition per replica.
    fn real(&self, obs: &[f32], actions: &[f32], step: &EnvStep) -> Result<Vec<Transition>> {
        let TransitionShape {
            obs_size,
            action_dim,
        } = self.shape;
        let n = step.dones.len();

        let next_obs = match &step.terminal_observations {
            Some(terminal) if terminal.len() == step.observations.len() => terminal,
            _ => &step.observations,
        };

        (0..n)
            .map(|i| {
                let t = Transition::new(
                    slice_row(obs, i, obs_size, "obs")?,
                    slice_row(actions, i, action_dim, "action")?,
                    step.rewards[i],
                    slice_row(next_obs, i, obs_size, "next_obs")?,
                    step.dones[i],
                );
                Ok(t)
            })
            .collect()
    }

    fn counterfactual(&self, step: &EnvStep) -> Result<Vec<Transition>> {
        let experience = step
            .infos
            .first()
            .ok_or(CrmError::MalformedInfo {
                replica: 0,
                key: "crm-experience",
            })?
            .require_crm_experience(0)?;

        experience
            .iter()
            .map(|alt| {
                self.shape.validate(alt)?;
                let mut t = alt.clone();
                for (a, h) in t.action.iter_mut().zip(&self.action_high) {
                    *a = (*a / h).clamp(-1.0, 1.0);
                }
                Ok(t)
            })
            .collect()
    }
}

fn slice_row(data: &[f32], row: usize, width: usize, field: &'static str) -> Result<Vec<f32>> {
    data.get(row * width..(row + 1) * width)
        .map(<[f32]>::to_vec)
        .ok_or(CrmError::ShapeMismatch {
            field,
            expected: (row + 1) * width,
            actual: data.len(),
        })
}
