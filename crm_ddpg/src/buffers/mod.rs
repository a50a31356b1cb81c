//! Experience storage.

pub mod replay_memory;

pub use replay_memory::{ReplayMemory, ReplayMemoryConfig};
