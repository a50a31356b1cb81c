//! Exploration noise.
//!
//! - `config`: noise-string parsing into a [`NoiseConfig`]
//! - `action_noise`: Gaussian and Ornstein-Uhlenbeck processes added to actions
//! - `param_noise`: adaptive parameter-space perturbation of the actor

pub mod action_noise;
pub mod config;
pub mod param_noise;

pub use action_noise::{ActionNoise, NormalActionNoise, OrnsteinUhlenbeckActionNoise};
pub use config::{ActionNoiseKind, NoiseConfig};
pub use param_noise::{action_distance, perturb_params, AdaptiveParamNoiseSpec};
