//! Estimators.

pub mod ddpg;
pub mod estimator;

pub use ddpg::{Ddpg, DdpgActor, DdpgConfig, DdpgCritic, MlpActor, MlpConfig, MlpCritic};
pub use estimator::{ActOutput, Estimator, EstimatorDiagnostics, TrainLosses};
