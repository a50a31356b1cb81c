//! Tests for the DDPG estimator.
//!
//! - Acting: shapes, clipping, exploration modes
//! - Training: loss reduction on a fixed batch
//! - Target tracking and parameter noise adaptation

use super::*;
use crate::algorithms::estimator::Estimator;
use crate::core::target_network::flatten_params;
use crate::core::transition::{Batch, Transition, TransitionShape};
use crate::error::CrmError;
use burn::backend::{Autodiff, NdArray};
use burn::optim::Optimizer;

type B = Autodiff<NdArray<f32>>;

const OBS: usize = 3;
const ACT: usize = 2;

fn build(
    config: DdpgConfig,
) -> Ddpg<B, MlpActor<B>, MlpCritic<B>, impl Optimizer<MlpActor<B>, B>, impl Optimizer<MlpCritic<B>, B>>
{
    let device = Default::default();
    let mlp = MlpConfig::new(OBS, ACT).with_hidden_size(16);
    let (actor_optim, critic_optim) = config.create_optimizers::<B, MlpActor<B>, MlpCritic<B>>();
    Ddpg::new(
        mlp.init_actor(&device),
        mlp.init_critic(&device),
        actor_optim,
        critic_optim,
        config,
        device,
    )
    .unwrap()
}

fn fixed_batch(n: usize) -> Batch {
    let mut batch = Batch::with_capacity(TransitionShape::new(OBS, ACT), n);
    for i in 0..n {
        let x = i as f32 / n as f32;
        batch.push(&Transition::new(
            vec![x, 1.0 - x, 0.5],
            vec![0.2, -0.2],
            1.0,
            vec![x, x, x],
            true,
        ));
    }
    batch
}

// ============================================================================
// Acting
// ============================================================================

#[test]
fn test_act_shapes_and_values() {
    let mut ddpg = build(DdpgConfig::deterministic());
    let out = ddpg.act(&[0.1; OBS * 4], false, true).unwrap();

    assert_eq!(out.actions.len(), 4 * ACT);
    assert_eq!(out.q_values.as_ref().map(|q| q.len()), Some(4));
    assert!(out.actions.iter().all(|a| (-1.0..=1.0).contains(a)));
}

#[test]
fn test_act_rejects_ragged_observations() {
    let mut ddpg = build(DdpgConfig::deterministic());
    assert!(matches!(
        ddpg.act(&[0.0; OBS + 1], false, false),
        Err(CrmError::ShapeMismatch { field: "obs", .. })
    ));
}

#[test]
fn test_act_without_noise_is_deterministic() {
    let mut ddpg = build(DdpgConfig::new().with_noise_type("ou_0.5"));
    let a = ddpg.act(&[0.3; OBS], false, false).unwrap().actions;
    let b = ddpg.act(&[0.3; OBS], false, false).unwrap().actions;
    assert_eq!(a, b);
}

#[test]
fn test_action_noise_perturbs_and_clips() {
    let mut ddpg = build(DdpgConfig::new().with_noise_type("normal_5.0"));
    let clean = ddpg.act(&[0.3; OBS * 2], false, false).unwrap().actions;
    let noisy = ddpg.act(&[0.3; OBS * 2], true, false).unwrap().actions;

    assert_ne!(clean, noisy);
    assert!(noisy.iter().all(|a| (-1.0..=1.0).contains(a)));
    // sigma 5 saturates most dimensions
    assert!(noisy.iter().any(|a| a.abs() == 1.0));
}

#[test]
fn test_param_noise_reset_redraws_perturbation() {
    let mut ddpg = build(DdpgConfig::new().with_noise_type("adaptive-param_0.5"));
    let obs = [0.4; OBS];

    let clean = ddpg.act(&obs, false, false).unwrap().actions;
    let first = ddpg.act(&obs, true, false).unwrap().actions;
    let again = ddpg.act(&obs, true, false).unwrap().actions;
    assert_ne!(clean, first);
    // Same perturbation until the next reset
    assert_eq!(first, again);

    ddpg.reset();
    let second = ddpg.act(&obs, true, false).unwrap().actions;
    assert_ne!(first, second);
}

/// Test combined parameter and action noise.
/// INTENT: The perturbed actor's output receives the action-noise draw on top.
#[test]
fn test_param_and_action_noise_both_apply() {
    let obs = [0.4; OBS];

    // Zero-scale action noise isolates the parameter perturbation
    let mut ddpg = build(DdpgConfig::new().with_noise_type("adaptive-param_0.5,normal_0"));
    let clean = ddpg.act(&obs, false, false).unwrap().actions;
    let first = ddpg.act(&obs, true, false).unwrap().actions;
    let again = ddpg.act(&obs, true, false).unwrap().actions;
    assert_ne!(clean, first);
    assert_eq!(first, again);

    // The perturbation is fixed until reset, so differences come from the action draws
    let mut ddpg = build(DdpgConfig::new().with_noise_type("adaptive-param_0.5,normal_0.05"));
    let batch_obs = [0.4; OBS * 4];
    let first_noisy = ddpg.act(&batch_obs, true, false).unwrap().actions;
    let second_noisy = ddpg.act(&batch_obs, true, false).unwrap().actions;
    assert_ne!(first_noisy, second_noisy);
    assert!(ddpg.param_noise().is_some());
}

#[test]
fn test_observe_updates_normalizer() {
    let mut ddpg = build(DdpgConfig::deterministic().with_normalize_observations(true));
    ddpg.observe(&[1.0, 2.0, 3.0, 3.0, 4.0, 5.0]);

    let rms = ddpg.obs_rms().unwrap();
    assert_eq!(rms.count(), 2.0);
    assert!((rms.mean()[0] - 2.0).abs() < 1e-9);
}

// ============================================================================
// Training
// ============================================================================

#[test]
fn test_train_reduces_critic_loss() {
    let mut ddpg = build(DdpgConfig::deterministic().with_critic_lr(1e-2));
    let batch = fixed_batch(16);

    let first = ddpg.train(&batch).unwrap();
    let mut last = first;
    for _ in 0..100 {
        last = ddpg.train(&batch).unwrap();
    }

    // Terminal transitions: target is the reward itself
    assert!(first.critic_loss > 0.5);
    assert!(last.critic_loss < first.critic_loss * 0.2, "{:?} -> {:?}", first, last);
    assert!(last.actor_loss.is_finite());
}

#[test]
fn test_train_with_return_normalization() {
    let mut ddpg = build(DdpgConfig::deterministic().with_normalize_returns(true));
    let losses = ddpg.train(&fixed_batch(8)).unwrap();
    assert!(losses.critic_loss.is_finite());
    assert!(losses.actor_loss.is_finite());
}

#[test]
fn test_train_empty_batch_is_insufficient_data() {
    let mut ddpg = build(DdpgConfig::deterministic());
    let empty = Batch::with_capacity(TransitionShape::new(OBS, ACT), 0);
    assert!(matches!(ddpg.train(&empty), Err(CrmError::InsufficientData { .. })));
}

// ============================================================================
// Target Tracking
// ============================================================================

#[test]
fn test_targets_start_as_copies() {
    let ddpg = build(DdpgConfig::deterministic());
    assert_eq!(
        flatten_params::<B, _>(ddpg.actor()),
        flatten_params::<B, _>(ddpg.target_actor())
    );
    assert_eq!(
        flatten_params::<B, _>(ddpg.critic()),
        flatten_params::<B, _>(ddpg.target_critic())
    );
}

#[test]
fn test_sync_targets_blends_by_tau() {
    let tau = 0.25;
    let mut ddpg = build(DdpgConfig::deterministic().with_tau(tau).with_critic_lr(1e-2));
    ddpg.train(&fixed_batch(8)).unwrap();

    let online = flatten_params::<B, _>(ddpg.critic());
    let before = flatten_params::<B, _>(ddpg.target_critic());
    assert_ne!(online, before);

    ddpg.sync_targets();
    let after = flatten_params::<B, _>(ddpg.target_critic());
    for i in 0..online.len() {
        let expected = tau * online[i] + (1.0 - tau) * before[i];
        assert!((after[i] - expected).abs() < 1e-5, "index {}", i);
    }
}

// ============================================================================
// Parameter Noise
// ============================================================================

#[test]
fn test_adapt_param_noise_moves_stddev() {
    let mut ddpg = build(DdpgConfig::new().with_noise_type("adaptive-param_0.2"));
    let before = ddpg.param_noise().unwrap();

    let distance = ddpg.adapt_param_noise(&fixed_batch(8)).unwrap().unwrap();
    let after = ddpg.param_noise().unwrap();

    assert!(distance > 0.0);
    if distance > before.desired_action_stddev {
        assert!(after.current_stddev < before.current_stddev);
    } else {
        assert!(after.current_stddev > before.current_stddev);
    }
}

#[test]
fn test_adapt_without_param_noise_is_noop() {
    let mut ddpg = build(DdpgConfig::new().with_noise_type("ou_0.2"));
    assert_eq!(ddpg.adapt_param_noise(&fixed_batch(4)).unwrap(), None);
}

#[test]
fn test_diagnostics() {
    let mut ddpg = build(DdpgConfig::new().with_noise_type("adaptive-param_0.2"));
    ddpg.observe(&[0.0, 1.0, 2.0, 2.0, 1.0, 0.0]);
    let diag = ddpg.diagnostics(&fixed_batch(8)).unwrap();

    assert!(diag.reference_q_mean.is_finite());
    assert!(diag.reference_action_std >= 0.0);
    assert_eq!(diag.param_noise_stddev, Some(0.2));
    assert!(diag.obs_rms_mean.is_some());
}

#[test]
fn test_invalid_noise_fails_construction() {
    let device = Default::default();
    let config = DdpgConfig::new().with_noise_type("adaptive-param_0.2,gumbel_0.1");
    let mlp = MlpConfig::new(OBS, ACT);
    let (actor_optim, critic_optim) = config.create_optimizers::<B, MlpActor<B>, MlpCritic<B>>();
    let result = Ddpg::new(
        mlp.init_actor::<B>(&device),
        mlp.init_critic::<B>(&device),
        actor_optim,
        critic_optim,
        config,
        device,
    );
    assert!(matches!(result, Err(CrmError::Configuration(_))));
}
