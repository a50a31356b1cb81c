//! DDPG (Deep Deterministic Policy Gradient).
//!
//! ```text
//! Actor μ(s)      ── soft update ──► Target actor μ'(s)
//! Critic Q(s, a)  ── soft update ──► Target critic Q'(s, a)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use crm_ddpg::algorithms::ddpg::{Ddpg, DdpgConfig, MlpConfig};
//!
//! let config = DdpgConfig::new().with_noise_type("adaptive-param_0.2");
//! let mlp = MlpConfig::new(obs_size, action_dim);
//! let (actor_optim, critic_optim) = config.create_optimizers::<B, _, _>();
//! let ddpg = Ddpg::new(
//!     mlp.init_actor(&device),
//!     mlp.init_critic(&device),
//!     actor_optim,
//!     critic_optim,
//!     config,
//!     device,
//! )?;
//! ```

mod config;
mod ddpg;
mod networks;

#[cfg(test)]
mod tests;

pub use config::DdpgConfig;
pub use ddpg::Ddpg;
pub(crate) use ddpg::mean_std;
pub use networks::{DdpgActor, DdpgCritic, MlpActor, MlpConfig, MlpCritic, FINAL_LAYER_INIT};
