//! Action-space exploration noise processes.

use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rand_xoshiro::Xoshiro256PlusPlus;

use super::config::ActionNoiseKind;

/// Mean-reversion rate of the Ornstein-Uhlenbeck process.
pub const OU_THETA: f32 = 0.15;
/// Integration step of the Ornstein-Uhlenbeck process.
pub const OU_DT: f32 = 1e-2;

/// A stateful noise source added to raw policy actions.
pub trait ActionNoise: Send {
    /// Draw the next noise vector.
    fn sample(&mut self) -> Vec<f32>;

    /// Reset internal state at an episode boundary.
    fn reset(&mut self);
}

/// Zero-mean Gaussian noise with a fixed per-dimension scale.
pub struct NormalActionNoise {
    sigma: Vec<f32>,
    rng: Xoshiro256PlusPlus,
}

impl NormalActionNoise {
    pub fn new(sigma: Vec<f32>, seed: u64) -> Self {
        Self {
            sigma,
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
        }
    }
}

impl ActionNoise for NormalActionNoise {
    fn sample(&mut self) -> Vec<f32> {
        let rng = &mut self.rng;
        self.sigma
            .iter()
            .map(|&s| s * rng.sample::<f32, _>(StandardNormal))
            .collect()
    }

    fn reset(&mut self) {}
}

/// Ornstein-Uhlenbeck process:
///
/// ```text
/// x ← x + θ(μ − x)·dt + σ·√dt·N(0, 1)
/// ```
pub struct OrnsteinUhlenbeckActionNoise {
    mu: Vec<f32>,
    sigma: Vec<f32>,
    x0: Option<Vec<f32>>,
    state: Vec<f32>,
    rng: Xoshiro256PlusPlus,
}

impl OrnsteinUhlenbeckActionNoise {
    pub fn new(mu: Vec<f32>, sigma: Vec<f32>, seed: u64) -> Self {
        let state = vec![0.0; mu.len()];
        Self {
            mu,
            sigma,
            x0: None,
            state,
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
        }
    }

    /// Start (and restart) the process from `x0` instead of zero.
    pub fn with_initial_state(mut self, x0: Vec<f32>) -> Self {
        self.state = x0.clone();
        self.x0 = Some(x0);
        self
    }

    pub fn state(&self) -> &[f32] {
        &self.state
    }
}

impl ActionNoise for OrnsteinUhlenbeckActionNoise {
    fn sample(&mut self) -> Vec<f32> {
        let sqrt_dt = OU_DT.sqrt();
        for i in 0..self.state.len() {
            let z: f32 = self.rng.sample(StandardNormal);
            self.state[i] += OU_THETA * (self.mu[i] - self.state[i]) * OU_DT
                + self.sigma[i] * sqrt_dt * z;
        }
        self.state.clone()
    }

    fn reset(&mut self) {
        match &self.x0 {
            Some(x0) => self.state.copy_from_slice(x0),
            None => self.state.fill(0.0),
        }
    }
}

impl ActionNoiseKind {
    /// Build a zero-mean process of this kind for `action_dim` dimensions.
    pub fn build(&self, action_dim: usize, seed: u64) -> Box<dyn ActionNoise> {
        match *self {
            ActionNoiseKind::Normal { sigma } => {
                Box::new(NormalActionNoise::new(vec![sigma; action_dim], seed))
            }
            ActionNoiseKind::OrnsteinUhlenbeck { sigma } => Box::new(
                OrnsteinUhlenbeckActionNoise::new(vec![0.0; action_dim], vec![sigma; action_dim], seed),
            ),
        }
    }
}
