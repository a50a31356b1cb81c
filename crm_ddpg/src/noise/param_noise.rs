//! Adaptive parameter-space noise.
//!
//! Instead of perturbing actions, the actor's weights are perturbed with
//! `N(0, σ)`. The scale σ is recalibrated so that the induced change in
//! actions tracks a desired action-space standard deviation:
//!
//! ```text
//! d = sqrt(mean((μ(s) − μ̃(s))²))
//! σ ← σ / coef   if d > desired
//! σ ← σ · coef   otherwise
//! ```

use burn::module::{Module, ModuleMapper, Param};
use burn::prelude::*;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// Default multiplicative step for the stddev adaptation.
pub const DEFAULT_ADOPTION_COEFFICIENT: f32 = 1.01;

/// Adaptive parameter noise state.
///
/// Treated as a value: [`adapted`](Self::adapted) returns the next spec
/// instead of mutating in place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveParamNoiseSpec {
    pub initial_stddev: f32,
    pub desired_action_stddev: f32,
    pub adoption_coefficient: f32,
    pub current_stddev: f32,
}

impl AdaptiveParamNoiseSpec {
    pub fn new(initial_stddev: f32, desired_action_stddev: f32) -> Self {
        Self {
            initial_stddev,
            desired_action_stddev,
            adoption_coefficient: DEFAULT_ADOPTION_COEFFICIENT,
            current_stddev: initial_stddev,
        }
    }

    /// Next spec given the measured action distance.
    pub fn adapted(self, distance: f32) -> Self {
        let current_stddev = if distance > self.desired_action_stddev {
            self.current_stddev / self.adoption_coefficient
        } else {
            self.current_stddev * self.adoption_coefficient
        };
        Self {
            current_stddev,
            ..self
        }
    }
}

impl Default for AdaptiveParamNoiseSpec {
    fn default() -> Self {
        Self::new(0.1, 0.1)
    }
}

/// RMS distance between two flattened action batches.
pub fn action_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() {
        return 0.0;
    }
    let sum: f32 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    (sum / a.len() as f32).sqrt()
}

/// Adds host-drawn Gaussian noise to every float parameter.
struct PerturbMapper<'a, R: Rng> {
    stddev: f32,
    rng: &'a mut R,
}

impl<B: Backend, R: Rng> ModuleMapper<B> for PerturbMapper<'_, R> {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        let val = param.val();
        let shape = val.dims();
        let numel: usize = shape.iter().product();

        let noise: Vec<f32> = (0..numel)
            .map(|_| self.rng.sample::<f32, _>(StandardNormal) * self.stddev)
            .collect();
        let noise = Tensor::<B, 1>::from_floats(noise.as_slice(), &val.device()).reshape(shape);

        Param::initialized(param.id.clone(), (val + noise).detach())
    }
}

/// Copy of `module` with every float parameter perturbed by `N(0, stddev)`.
pub fn perturb_params<B, M, R>(module: &M, stddev: f32, rng: &mut R) -> M
where
    B: Backend,
    M: Module<B>,
    R: Rng,
{
    let mut mapper = PerturbMapper { stddev, rng };
    module.clone().map(&mut mapper)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::flatten_params;
    use burn::backend::NdArray;
    use burn::nn::LinearConfig;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_adaptation_shrinks_when_too_far() {
        let spec = AdaptiveParamNoiseSpec::new(0.2, 0.2);
        let next = spec.adapted(0.5);
        assert!(next.current_stddev < spec.current_stddev);
        assert!((next.current_stddev - 0.2 / 1.01).abs() < 1e-6);
    }

    #[test]
    fn test_adaptation_grows_when_close() {
        let spec = AdaptiveParamNoiseSpec::new(0.2, 0.2);
        let next = spec.adapted(0.05);
        assert!(next.current_stddev > spec.current_stddev);
        // Equal distance counts as "not too far"
        assert!(spec.adapted(0.2).current_stddev > spec.current_stddev);
    }

    #[test]
    fn test_adaptation_monotone_sequence() {
        let mut spec = AdaptiveParamNoiseSpec::new(0.1, 0.1);
        let mut previous = spec.current_stddev;
        for _ in 0..10 {
            spec = spec.adapted(1.0);
            assert!(spec.current_stddev < previous);
            previous = spec.current_stddev;
        }
        for _ in 0..10 {
            spec = spec.adapted(0.0);
            assert!(spec.current_stddev > previous);
            previous = spec.current_stddev;
        }
        assert_eq!(spec.initial_stddev, 0.1);
    }

    #[test]
    fn test_action_distance() {
        assert_eq!(action_distance(&[], &[]), 0.0);
        assert!((action_distance(&[0.0, 0.0], &[3.0, 4.0]) - 12.5f32.sqrt()).abs() < 1e-6);
        assert_eq!(action_distance(&[0.3, -0.2], &[0.3, -0.2]), 0.0);
    }

    #[test]
    fn test_perturb_changes_every_parameter() {
        let device = Default::default();
        let layer = LinearConfig::new(4, 3).init::<TestBackend>(&device);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);

        let perturbed = perturb_params::<TestBackend, _, _>(&layer, 0.1, &mut rng);
        let before = flatten_params::<TestBackend, _>(&layer);
        let after = flatten_params::<TestBackend, _>(&perturbed);

        assert_eq!(before.len(), after.len());
        assert!(before.iter().zip(&after).all(|(a, b)| a != b));
        let dist = action_distance(&before, &after);
        assert!(dist > 0.02 && dist < 0.3, "rms perturbation {}", dist);
    }

    #[test]
    fn test_perturb_is_deterministic_for_seed() {
        let device = Default::default();
        let layer = LinearConfig::new(2, 2).init::<TestBackend>(&device);

        let mut a = Xoshiro256PlusPlus::seed_from_u64(9);
        let mut b = Xoshiro256PlusPlus::seed_from_u64(9);
        let pa = perturb_params::<TestBackend, _, _>(&layer, 0.5, &mut a);
        let pb = perturb_params::<TestBackend, _, _>(&layer, 0.5, &mut b);

        assert_eq!(
            flatten_params::<TestBackend, _>(&pa),
            flatten_params::<TestBackend, _>(&pb)
        );
    }
}
