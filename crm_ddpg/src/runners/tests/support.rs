//! Mock components shared by the runner tests.

use std::cell::Cell;
use std::rc::Rc;

use crate::algorithms::estimator::{ActOutput, Estimator, EstimatorDiagnostics, TrainLosses};
use crate::core::transition::{Batch, Transition};
use crate::environment::{EnvStep, RewardMachineEnv, RmState, StepInfo};
use crate::error::{CrmError, Result};

pub const OBS: usize = 2;
pub const ACT: usize = 1;

// ============================================================================
// Chain Environment
// ============================================================================

/// Automaton `0 → 1 → … → k-1 → accepting`, advancing every `advance_every` steps.
///
/// Observation per replica: `[steps in episode, automaton state]`.
pub struct ChainEnv {
    pub n_envs: usize,
    pub num_states: usize,
    /// 0 never advances.
    pub advance_every: usize,
    /// Episode timeout.
    pub episode_cap: usize,
    pub high: Vec<f32>,
    pub low: Option<Vec<f32>>,
    /// Omit `rm_state` from the info payload.
    pub drop_rm_state: bool,
    /// Total `step` calls, shared with the test body.
    pub steps: Rc<Cell<usize>>,
    pub last_actions: Vec<f32>,
    t: Vec<usize>,
    state: Vec<i32>,
}

impl ChainEnv {
    pub fn new(n_envs: usize, num_states: usize) -> Self {
        Self {
            n_envs,
            num_states,
            advance_every: 2,
            episode_cap: 50,
            high: vec![2.0],
            low: None,
            drop_rm_state: false,
            steps: Rc::new(Cell::new(0)),
            last_actions: Vec::new(),
            t: vec![0; n_envs],
            state: vec![0; n_envs],
        }
    }

    pub fn with_advance_every(mut self, n: usize) -> Self {
        self.advance_every = n;
        self
    }

    pub fn with_episode_cap(mut self, cap: usize) -> Self {
        self.episode_cap = cap;
        self
    }

    fn next_state(&self, state: i32) -> i32 {
        if state + 1 >= self.num_states as i32 {
            RmState::ACCEPTING.0
        } else {
            state + 1
        }
    }

    fn observation(&self, i: usize) -> [f32; OBS] {
        [self.t[i] as f32, self.state[i] as f32]
    }
}

impl RewardMachineEnv for ChainEnv {
    fn n_envs(&self) -> usize {
        self.n_envs
    }

    fn obs_size(&self) -> usize {
        OBS
    }

    fn action_dim(&self) -> usize {
        ACT
    }

    fn action_high(&self) -> Vec<f32> {
        self.high.clone()
    }

    fn action_low(&self) -> Vec<f32> {
        match &self.low {
            Some(low) => low.clone(),
            None => self.high.iter().map(|h| -h).collect(),
        }
    }

    fn num_rm_states(&self) -> usize {
        self.num_states
    }

    fn reset(&mut self) -> Vec<f32> {
        self.t.iter_mut().for_each(|t| *t = 0);
        self.state.iter_mut().for_each(|s| *s = 0);
        (0..self.n_envs).flat_map(|i| self.observation(i)).collect()
    }

    fn step(&mut self, actions: &[f32]) -> Result<EnvStep> {
        if actions.len() != self.n_envs * ACT {
            return Err(CrmError::ShapeMismatch {
                field: "actions",
                expected: self.n_envs * ACT,
                actual: actions.len(),
            });
        }
        self.steps.set(self.steps.get() + 1);
        self.last_actions = actions.to_vec();

        let mut observations = Vec::with_capacity(self.n_envs * OBS);
        let mut rewards = Vec::with_capacity(self.n_envs);
        let mut dones = Vec::with_capacity(self.n_envs);
        let mut infos = Vec::with_capacity(self.n_envs);

        for i in 0..self.n_envs {
            let before = self.observation(i);
            self.t[i] += 1;
            let advance = self.advance_every > 0 && self.t[i] % self.advance_every == 0;

            let experience: Vec<Transition> = (0..self.num_states as i32)
                .map(|u| {
                    let next = if advance { self.next_state(u) } else { u };
                    Transition::new(
                        vec![before[0], u as f32],
                        vec![actions[i]],
                        if next != u { 1.0 } else { 0.0 },
                        vec![self.t[i] as f32, next as f32],
                        next == RmState::ACCEPTING.0,
                    )
                })
                .collect();

            let prev = self.state[i];
            if advance {
                self.state[i] = self.next_state(prev);
            }
            let reward = if self.state[i] != prev { 1.0 } else { 0.0 };
            let done = self.state[i] == RmState::ACCEPTING.0 || self.t[i] >= self.episode_cap;

            let mut info = StepInfo::new(RmState(self.state[i]))
                .with_crm_experience(experience)
                .with_rs_reward(reward + 0.5);
            if self.drop_rm_state {
                info.rm_state = None;
            }

            if done {
                self.t[i] = 0;
                self.state[i] = 0;
            }
            observations.extend(self.observation(i));
            rewards.push(reward);
            dones.push(done);
            infos.push(info);
        }

        Ok(EnvStep::new(observations, rewards, dones, infos))
    }

    fn name(&self) -> &str {
        "chain"
    }
}

// ============================================================================
// Scripted Estimator
// ============================================================================

/// Constant policy that counts how the trainer drives it.
#[derive(Debug, Default)]
pub struct ScriptedEstimator {
    pub action: f32,
    pub gamma: f32,
    pub param_noise: bool,
    pub acts: usize,
    pub resets: usize,
    pub trains: usize,
    pub syncs: usize,
    /// Train-step index (value of `trains`) at each adaptation.
    pub adapted_at: Vec<usize>,
    pub observed_rows: usize,
    pub last_batch_len: usize,
}

impl ScriptedEstimator {
    pub fn new(action: f32) -> Self {
        Self {
            action,
            gamma: 0.99,
            ..Self::default()
        }
    }

    pub fn with_gamma(mut self, gamma: f32) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_param_noise(mut self) -> Self {
        self.param_noise = true;
        self
    }
}

impl Estimator for ScriptedEstimator {
    fn obs_size(&self) -> usize {
        OBS
    }

    fn action_dim(&self) -> usize {
        ACT
    }

    fn discount(&self) -> f32 {
        self.gamma
    }

    fn act(&mut self, obs: &[f32], _apply_noise: bool, compute_value: bool) -> Result<ActOutput> {
        if obs.len() % OBS != 0 {
            return Err(CrmError::ShapeMismatch {
                field: "obs",
                expected: OBS,
                actual: obs.len(),
            });
        }
        self.acts += 1;
        let n = obs.len() / OBS;
        Ok(ActOutput {
            actions: vec![self.action; n * ACT],
            q_values: compute_value.then(|| vec![0.5; n]),
        })
    }

    fn observe(&mut self, obs: &[f32]) {
        self.observed_rows += obs.len() / OBS;
    }

    fn train(&mut self, batch: &Batch) -> Result<TrainLosses> {
        self.trains += 1;
        self.last_batch_len = batch.len();
        Ok(TrainLosses {
            critic_loss: 1.0 / self.trains as f32,
            actor_loss: -1.0,
        })
    }

    fn sync_targets(&mut self) {
        self.syncs += 1;
    }

    fn adapt_param_noise(&mut self, _batch: &Batch) -> Result<Option<f32>> {
        if !self.param_noise {
            return Ok(None);
        }
        self.adapted_at.push(self.trains);
        Ok(Some(0.1))
    }

    fn reset(&mut self) {
        self.resets += 1;
    }

    fn diagnostics(&mut self, _reference: &Batch) -> Result<EstimatorDiagnostics> {
        Ok(EstimatorDiagnostics {
            reference_q_mean: 0.5,
            ..EstimatorDiagnostics::default()
        })
    }
}
