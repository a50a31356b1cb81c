//! Vectorized 2-D waypoint patrol with a reward-machine progress tracker.
//!
//! A point agent moves inside `[-1, 1]^2` and must visit the four corner
//! waypoints in order, then return home to the origin. The automaton has
//! one state per pending target:
//!
//! ```text
//!   0 ──wp0──▶ 1 ──wp1──▶ 2 ──wp2──▶ 3 ──wp3──▶ 4 ──home──▶ accepting (-1)
//! ```
//!
//! Observation per replica: `[x, y, one_hot(rm_state; 5)]`; the accepting
//! state encodes as all zeros. Action: a velocity in `[-0.1, 0.1]^2`.
//! Reward 1 on every automaton advance, 0 otherwise. Replicas auto-reset
//! on acceptance or after `max_steps`.

use rand::Rng;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crm_ddpg::{CrmError, EnvStep, RewardMachineEnv, RmState, StepInfo, Transition};

const TARGETS: [[f32; 2]; NUM_RM_STATES] = [[0.7, 0.7], [-0.7, 0.7], [-0.7, -0.7], [0.7, -0.7], [0.0, 0.0]];
const DETECTION_RADIUS: f32 = 0.15;
const START_SPREAD: f32 = 0.2;
/// Probability of missing a detection when `missing` is on.
const MISS_PROB: f64 = 0.2;
/// Discount used by the shaping potential.
const SHAPING_GAMMA: f32 = 0.99;
const NUM_RM_STATES: usize = 5;

pub struct WaypointEnv {
    pos: Vec<[f32; 2]>,
    rm: Vec<RmState>,
    ticks: Vec<usize>,
    n_envs: usize,
    max_steps: usize,
    missing: bool,
    shape_experience: bool,
    rng: Xoshiro256PlusPlus,
}

impl WaypointEnv {
    pub const OBS_SIZE: usize = 2 + NUM_RM_STATES;
    pub const ACTION_DIM: usize = 2;
    pub const ACTION_HIGH: f32 = 0.1;
    pub const DEFAULT_MAX_STEPS: usize = 200;

    pub fn new(n_envs: usize, seed: u64) -> Self {
        let mut env = Self {
            pos: vec![[0.0; 2]; n_envs],
            rm: vec![RmState::INITIAL; n_envs],
            ticks: vec![0; n_envs],
            n_envs,
            max_steps: Self::DEFAULT_MAX_STEPS,
            missing: false,
            shape_experience: false,
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
        };
        for i in 0..n_envs {
            env.reset_replica(i);
        }
        env
    }

    /// Drop waypoint detections with a fixed probability.
    pub fn with_missing(mut self, missing: bool) -> Self {
        self.missing = missing;
        self
    }

    /// Put shaped rewards on the relabeled `crm_experience` transitions.
    pub fn with_shaped_experience(mut self, shaped: bool) -> Self {
        self.shape_experience = shaped;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    fn reset_replica(&mut self, i: usize) {
        self.pos[i] = [
            self.rng.gen_range(-START_SPREAD..=START_SPREAD),
            self.rng.gen_range(-START_SPREAD..=START_SPREAD),
        ];
        self.rm[i] = RmState::INITIAL;
        self.ticks[i] = 0;
    }

    fn observe_replica(&self, i: usize, out: &mut Vec<f32>) {
        encode(self.pos[i], self.rm[i], out);
    }

    /// Index of the target the agent stands on, if it is detected.
    fn detect(&mut self, pos: [f32; 2]) -> Option<usize> {
        let hit = TARGETS.iter().position(|t| {
            let (dx, dy) = (pos[0] - t[0], pos[1] - t[1]);
            (dx * dx + dy * dy).sqrt() <= DETECTION_RADIUS
        })?;
        if self.missing && self.rng.gen_bool(MISS_PROB) {
            return None;
        }
        Some(hit)
    }
}

/// Automaton transition on a detection.
fn delta(state: RmState, detection: Option<usize>) -> RmState {
    match detection {
        Some(k) if state.0 >= 0 && state.0 as usize == k => {
            if k + 1 == NUM_RM_STATES {
                RmState::ACCEPTING
            } else {
                RmState(k as i32 + 1)
            }
        }
        _ => state,
    }
}

/// Shaping potential: number of targets already reached.
fn potential(state: RmState) -> f32 {
    if state.is_accepting() {
        NUM_RM_STATES as f32
    } else {
        state.0 as f32
    }
}

fn shaped(reward: f32, from: RmState, to: RmState) -> f32 {
    reward + SHAPING_GAMMA * potential(to) - potential(from)
}

fn encode(pos: [f32; 2], state: RmState, out: &mut Vec<f32>) {
    out.extend_from_slice(&pos);
    let start = out.len();
    out.resize(start + NUM_RM_STATES, 0.0);
    if !state.is_accepting() {
        out[start + state.0 as usize] = 1.0;
    }
}

impl RewardMachineEnv for WaypointEnv {
    fn n_envs(&self) -> usize {
        self.n_envs
    }

    fn obs_size(&self) -> usize {
        Self::OBS_SIZE
    }

    fn action_dim(&self) -> usize {
        Self::ACTION_DIM
    }

    fn action_high(&self) -> Vec<f32> {
        vec![Self::ACTION_HIGH; Self::ACTION_DIM]
    }

    fn num_rm_states(&self) -> usize {
        NUM_RM_STATES
    }

    fn reset(&mut self) -> Vec<f32> {
        let mut obs = Vec::with_capacity(self.n_envs * Self::OBS_SIZE);
        for i in 0..self.n_envs {
            self.reset_replica(i);
            self.observe_replica(i, &mut obs);
        }
        obs
    }

    fn step(&mut self, actions: &[f32]) -> crm_ddpg::Result<EnvStep> {
        if actions.len() != self.n_envs * Self::ACTION_DIM {
            return Err(CrmError::ShapeMismatch {
                field: "actions",
                expected: self.n_envs * Self::ACTION_DIM,
                actual: actions.len(),
            });
        }

        let mut observations = Vec::with_capacity(self.n_envs * Self::OBS_SIZE);
        let mut terminal = Vec::with_capacity(self.n_envs * Self::OBS_SIZE);
        let mut rewards = Vec::with_capacity(self.n_envs);
        let mut dones = Vec::with_capacity(self.n_envs);
        let mut infos = Vec::with_capacity(self.n_envs);

        for i in 0..self.n_envs {
            let a = &actions[i * Self::ACTION_DIM..(i + 1) * Self::ACTION_DIM];
            let before = self.pos[i];
            let after = [
                (before[0] + a[0].clamp(-Self::ACTION_HIGH, Self::ACTION_HIGH)).clamp(-1.0, 1.0),
                (before[1] + a[1].clamp(-Self::ACTION_HIGH, Self::ACTION_HIGH)).clamp(-1.0, 1.0),
            ];
            let detection = self.detect(after);
            self.ticks[i] += 1;
            let timed_out = self.ticks[i] >= self.max_steps;

            // Same motion and detection, replayed from every non-accepting state
            let experience: Vec<Transition> = (0..NUM_RM_STATES as i32)
                .map(|u| {
                    let from = RmState(u);
                    let to = delta(from, detection);
                    let reward = if to != from { 1.0 } else { 0.0 };
                    let mut obs = Vec::with_capacity(Self::OBS_SIZE);
                    let mut next_obs = Vec::with_capacity(Self::OBS_SIZE);
                    encode(before, from, &mut obs);
                    encode(after, to, &mut next_obs);
                    Transition::new(
                        obs,
                        a.to_vec(),
                        if self.shape_experience { shaped(reward, from, to) } else { reward },
                        next_obs,
                        to.is_accepting() || timed_out,
                    )
                })
                .collect();

            let prev = self.rm[i];
            let next = delta(prev, detection);
            let reward = if next != prev { 1.0 } else { 0.0 };
            let done = next.is_accepting() || timed_out;

            self.pos[i] = after;
            self.rm[i] = next;
            self.observe_replica(i, &mut terminal);
            if done {
                self.reset_replica(i);
            }
            self.observe_replica(i, &mut observations);

            rewards.push(reward);
            dones.push(done);
            infos.push(
                StepInfo::new(next)
                    .with_crm_experience(experience)
                    .with_rs_reward(shaped(reward, prev, next)),
            );
        }

        let mut step = EnvStep::new(observations, rewards, dones, infos);
        step.terminal_observations = Some(terminal);
        Ok(step)
    }

    fn name(&self) -> &str {
        "waypoints"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Steer replica 0 straight at `target`, one maximal step at a time.
    fn drive_to(env: &mut WaypointEnv, target: [f32; 2]) -> EnvStep {
        loop {
            let p = env.pos[0];
            let action = [
                (target[0] - p[0]).clamp(-WaypointEnv::ACTION_HIGH, WaypointEnv::ACTION_HIGH),
                (target[1] - p[1]).clamp(-WaypointEnv::ACTION_HIGH, WaypointEnv::ACTION_HIGH),
            ];
            let step = env.step(&action).unwrap();
            if step.rewards[0] > 0.0 || step.dones[0] {
                return step;
            }
        }
    }

    #[test]
    fn test_observation_layout() {
        let mut env = WaypointEnv::new(3, 1);
        let obs = env.reset();
        assert_eq!(obs.len(), 3 * WaypointEnv::OBS_SIZE);
        for row in obs.chunks(WaypointEnv::OBS_SIZE) {
            assert!(row[0].abs() <= START_SPREAD && row[1].abs() <= START_SPREAD);
            assert_eq!(&row[2..], &[1.0, 0.0, 0.0, 0.0, 0.0]);
        }
    }

    #[test]
    fn test_patrol_reaches_accepting_state() {
        let mut env = WaypointEnv::new(1, 7);
        env.reset();
        let mut visited = Vec::new();
        for target in TARGETS {
            let step = drive_to(&mut env, target);
            assert_eq!(step.rewards[0], 1.0);
            visited.push(step.infos[0].rm_state.unwrap());
        }
        assert_eq!(
            visited,
            vec![RmState(1), RmState(2), RmState(3), RmState(4), RmState::ACCEPTING]
        );
    }

    #[test]
    fn test_acceptance_auto_resets_and_keeps_terminal_observation() {
        let mut env = WaypointEnv::new(1, 3);
        env.reset();
        let mut last = None;
        for target in TARGETS {
            last = Some(drive_to(&mut env, target));
        }
        let step = last.unwrap();
        assert!(step.dones[0]);

        let terminal = step.terminal_observations.unwrap();
        assert_eq!(&terminal[2..], &[0.0; NUM_RM_STATES]);
        assert_eq!(&step.observations[2..], &[1.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_counterfactual_experience_covers_every_state() {
        let mut env = WaypointEnv::new(1, 0);
        env.reset();
        let step = drive_to(&mut env, TARGETS[0]);
        let experience = step.infos[0].crm_experience.as_ref().unwrap();
        assert_eq!(experience.len(), NUM_RM_STATES);

        // Only the alternative waiting for waypoint 0 advances
        let rewards: Vec<f32> = experience.iter().map(|t| t.reward).collect();
        assert_eq!(rewards, vec![1.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(&experience[0].next_obs[2..], &[0.0, 1.0, 0.0, 0.0, 0.0]);
        for t in experience {
            assert_eq!(t.obs.len(), WaypointEnv::OBS_SIZE);
            assert_eq!(t.action.len(), WaypointEnv::ACTION_DIM);
        }
    }

    #[test]
    fn test_shaping_is_potential_based() {
        assert!((shaped(1.0, RmState(0), RmState(1)) - (1.0 + 0.99)).abs() < 1e-6);
        assert!((shaped(0.0, RmState(2), RmState(2)) - (0.99 * 2.0 - 2.0)).abs() < 1e-6);
        assert!((shaped(1.0, RmState(4), RmState::ACCEPTING) - (1.0 + 0.99 * 5.0 - 4.0)).abs() < 1e-6);
    }

    #[test]
    fn test_shaped_experience_flag() {
        let mut env = WaypointEnv::new(1, 0).with_shaped_experience(true);
        env.reset();
        let step = drive_to(&mut env, TARGETS[0]);
        let experience = step.infos[0].crm_experience.as_ref().unwrap();
        assert!((experience[0].reward - shaped(1.0, RmState(0), RmState(1))).abs() < 1e-6);
        assert_eq!(step.infos[0].rs_reward, Some(experience[0].reward));
    }

    #[test]
    fn test_missing_detections_are_dropped_sometimes() {
        let mut misses = 0;
        for seed in 0..50 {
            let mut env = WaypointEnv::new(1, seed).with_missing(true);
            env.pos[0] = TARGETS[0];
            let step = env.step(&[0.0, 0.0]).unwrap();
            if step.rewards[0] == 0.0 {
                assert_eq!(step.infos[0].rm_state, Some(RmState::INITIAL));
                misses += 1;
            }
        }
        assert!(misses > 0 && misses < 50);

        let mut env = WaypointEnv::new(1, 0);
        env.pos[0] = TARGETS[0];
        assert_eq!(env.step(&[0.0, 0.0]).unwrap().rewards[0], 1.0);
    }

    #[test]
    fn test_timeout_ends_episode() {
        let mut env = WaypointEnv::new(2, 0).with_max_steps(3);
        env.reset();
        let zeros = [0.0; 4];
        assert!(!env.step(&zeros).unwrap().dones[0]);
        assert!(!env.step(&zeros).unwrap().dones[0]);
        let step = env.step(&zeros).unwrap();
        assert_eq!(step.dones, vec![true, true]);
        assert_eq!(env.ticks, vec![0, 0]);
    }

    #[test]
    fn test_rejects_wrong_action_length() {
        let mut env = WaypointEnv::new(2, 0);
        assert!(matches!(
            env.step(&[0.0; 3]),
            Err(CrmError::ShapeMismatch { field: "actions", .. })
        ));
    }
}
