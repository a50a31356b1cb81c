//! Core types shared by the estimator, the replay store and the trainer.

pub mod running_stats;
pub mod target_network;
pub mod transition;

pub use running_stats::{RunningMeanStd, RunningScalarStats};
pub use target_network::{flatten_params, soft_update};
pub use transition::{Batch, Transition, TransitionShape};
