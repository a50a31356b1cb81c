//! Test suite for the training runners.
//!
//! # Test Organization
//!
//! - `support`: Chain-automaton environment and scripted estimator
//! - `trainer_tests`: Phase machine, storage discipline, training cadence, persistence
//! - `evaluator_tests`: Milestone scoring, stopping rules, injected noise

pub mod support;
