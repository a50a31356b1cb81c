//! Deterministic actor and Q-critic network traits, plus default MLPs.
//!
//! ```text
//! Actor:  obs ──► MLP ──► tanh ──► action ∈ [-1, 1]^A
//! Critic: [obs, action] ──► MLP ──► Q(s, a) ∈ R
//! ```

use burn::module::Module;
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::{relu, tanh};

/// Output layer weights are drawn from `U(-FINAL_LAYER_INIT, FINAL_LAYER_INIT)`
/// so initial actions and Q-values start near zero.
pub const FINAL_LAYER_INIT: f64 = 3e-3;

// ============================================================================
// Traits
// ============================================================================

/// Deterministic policy network μ(s).
///
/// `forward` must return actions in `[-1, 1]` per dimension; scaling into
/// environment bounds happens outside the network.
pub trait DdpgActor<B: Backend>: Module<B> + Clone + Send + 'static {
    /// Map observations `[batch, obs_size]` to actions `[batch, action_dim]`.
    fn forward(&self, obs: Tensor<B, 2>) -> Tensor<B, 2>;

    fn obs_size(&self) -> usize;

    fn action_dim(&self) -> usize;
}

/// Action-value network Q(s, a).
pub trait DdpgCritic<B: Backend>: Module<B> + Clone + Send + 'static {
    /// Map `[batch, obs_size]` observations and `[batch, action_dim]`
    /// actions to values `[batch, 1]`.
    fn forward(&self, obs: Tensor<B, 2>, action: Tensor<B, 2>) -> Tensor<B, 2>;
}

// ============================================================================
// MLP Actor
// ============================================================================

/// Hidden layer sizes shared by the default networks.
#[derive(Debug, Clone)]
pub struct MlpConfig {
    pub obs_size: usize,
    pub action_dim: usize,
    pub hidden_size: usize,
}

impl MlpConfig {
    pub fn new(obs_size: usize, action_dim: usize) -> Self {
        Self {
            obs_size,
            action_dim,
            hidden_size: 64,
        }
    }

    pub fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.hidden_size = hidden_size;
        self
    }

    pub fn init_actor<B: Backend>(&self, device: &B::Device) -> MlpActor<B> {
        MlpActor {
            fc1: LinearConfig::new(self.obs_size, self.hidden_size).init(device),
            fc2: LinearConfig::new(self.hidden_size, self.hidden_size).init(device),
            head: final_layer(self.hidden_size, self.action_dim).init(device),
            obs_size: self.obs_size,
            action_dim: self.action_dim,
        }
    }

    pub fn init_critic<B: Backend>(&self, device: &B::Device) -> MlpCritic<B> {
        MlpCritic {
            fc1: LinearConfig::new(self.obs_size + self.action_dim, self.hidden_size).init(device),
            fc2: LinearConfig::new(self.hidden_size, self.hidden_size).init(device),
            head: final_layer(self.hidden_size, 1).init(device),
        }
    }
}

fn final_layer(d_input: usize, d_output: usize) -> LinearConfig {
    LinearConfig::new(d_input, d_output).with_initializer(Initializer::Uniform {
        min: -FINAL_LAYER_INIT,
        max: FINAL_LAYER_INIT,
    })
}

/// Two hidden ReLU layers with a tanh output head.
#[derive(Module, Debug)]
pub struct MlpActor<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    head: Linear<B>,
    obs_size: usize,
    action_dim: usize,
}

impl<B: Backend> DdpgActor<B> for MlpActor<B> {
    fn forward(&self, obs: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = relu(self.fc1.forward(obs));
        let x = relu(self.fc2.forward(x));
        tanh(self.head.forward(x))
    }

    fn obs_size(&self) -> usize {
        self.obs_size
    }

    fn action_dim(&self) -> usize {
        self.action_dim
    }
}

// ============================================================================
// MLP Critic
// ============================================================================

/// Q-network over the concatenated observation and action.
#[derive(Module, Debug)]
pub struct MlpCritic<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    head: Linear<B>,
}

impl<B: Backend> DdpgCritic<B> for MlpCritic<B> {
    fn forward(&self, obs: Tensor<B, 2>, action: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = Tensor::cat(vec![obs, action], 1);
        let x = relu(self.fc1.forward(x));
        let x = relu(self.fc2.forward(x));
        self.head.forward(x)
    }
}
