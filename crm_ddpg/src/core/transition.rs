//! Transition types for the replay store and training batches.
//!
//! - `Transition`: one `(obs, action, reward, next_obs, done)` tuple
//! - `TransitionShape`: the canonical layout every stored transition must match
//! - `Batch`: struct-of-arrays view of sampled transitions, ready for tensors

use crate::error::{CrmError, Result};

/// Single environment step as stored in the replay memory.
///
/// Actions are kept in policy space (`[-1, 1]` per dimension), before
/// scaling into the environment's action bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Observation before the step
    pub obs: Vec<f32>,
    /// Action taken
    pub action: Vec<f32>,
    /// Reward received
    pub reward: f32,
    /// Observation after the step
    pub next_obs: Vec<f32>,
    /// Episode ended on this step
    pub done: bool,
}

impl Transition {
    /// Create a new transition.
    pub fn new(obs: Vec<f32>, action: Vec<f32>, reward: f32, next_obs: Vec<f32>, done: bool) -> Self {
        Self {
            obs,
            action,
            reward,
            next_obs,
            done,
        }
    }

    /// Same transition with a different reward.
    pub fn with_reward(mut self, reward: f32) -> Self {
        self.reward = reward;
        self
    }

    /// Terminal mask value used in TD targets (1.0 when done).
    #[inline]
    pub fn terminal_mask(&self) -> f32 {
        if self.done {
            1.0
        } else {
            0.0
        }
    }
}

/// Observation and action sizes shared by every transition in a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionShape {
    pub obs_size: usize,
    pub action_dim: usize,
}

impl TransitionShape {
    pub fn new(obs_size: usize, action_dim: usize) -> Self {
        Self {
            obs_size,
            action_dim,
        }
    }

    /// Check that a transition matches this shape.
    pub fn validate(&self, transition: &Transition) -> Result<()> {
        check_len("obs", self.obs_size, transition.obs.len())?;
        check_len("next_obs", self.obs_size, transition.next_obs.len())?;
        check_len("action", self.action_dim, transition.action.len())
    }
}

fn check_len(field: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(CrmError::ShapeMismatch {
            field,
            expected,
            actual,
        })
    }
}

/// Struct-of-arrays batch.
///
/// All vectors are flattened row-major:
/// `obs` is `[len * obs_size]`, `actions` is `[len * action_dim]`,
/// `rewards` and `terminals` are `[len]`.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub obs: Vec<f32>,
    pub actions: Vec<f32>,
    pub rewards: Vec<f32>,
    pub next_obs: Vec<f32>,
    pub terminals: Vec<f32>,
    pub obs_size: usize,
    pub action_dim: usize,
}

impl Batch {
    /// Create an empty batch with room for `capacity` transitions.
    pub fn with_capacity(shape: TransitionShape, capacity: usize) -> Self {
        Self {
            obs: Vec::with_capacity(capacity * shape.obs_size),
            actions: Vec::with_capacity(capacity * shape.action_dim),
            rewards: Vec::with_capacity(capacity),
            next_obs: Vec::with_capacity(capacity * shape.obs_size),
            terminals: Vec::with_capacity(capacity),
            obs_size: shape.obs_size,
            action_dim: shape.action_dim,
        }
    }

    /// Append one transition. The caller guarantees the shape.
    pub fn push(&mut self, t: &Transition) {
        self.obs.extend_from_slice(&t.obs);
        self.actions.extend_from_slice(&t.action);
        self.rewards.push(t.reward);
        self.next_obs.extend_from_slice(&t.next_obs);
        self.terminals.push(t.terminal_mask());
    }

    /// Number of transitions in the batch.
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }
}
