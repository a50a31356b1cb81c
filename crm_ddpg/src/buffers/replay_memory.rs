//! Uniform replay memory for off-policy training.
//!
//! - **Ring buffer** semantics: once full, each append overwrites the oldest entry
//! - **Uniform sampling with replacement**: every stored transition is equally likely
//! - **Shape-checked appends**: every entry matches the store's `TransitionShape`
//!
//! The memory is owned by a single trainer and mutated through `&mut self`.

use crate::core::transition::{Batch, Transition, TransitionShape};
use crate::error::{CrmError, Result};

/// Upper bound on the up-front allocation; the ring grows lazily beyond it.
const INITIAL_RESERVE: usize = 4096;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the replay memory.
#[derive(Debug, Clone)]
pub struct ReplayMemoryConfig {
    /// Maximum number of transitions kept.
    pub capacity: usize,
    /// Batch size used by the trainer.
    pub batch_size: usize,
    /// Seed for the sampling RNG.
    pub seed: u64,
}

impl Default for ReplayMemoryConfig {
    fn default() -> Self {
        Self {
            capacity: 1_000_000,
            batch_size: 64,
            seed: 0,
        }
    }
}

impl ReplayMemoryConfig {
    pub fn new(capacity: usize, batch_size: usize) -> Self {
        Self {
            capacity,
            batch_size,
            seed: 0,
        }
    }

    /// Multiply capacity and batch size by `factor`.
    ///
    /// Used when every real step yields one transition per automaton state.
    pub fn scaled(mut self, factor: usize) -> Self {
        self.capacity *= factor.max(1);
        self.batch_size *= factor.max(1);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

// ============================================================================
// Ring Buffer (Internal)
// ============================================================================

/// Fixed-capacity ring with O(1) append and random access.
struct Ring<T> {
    items: Vec<T>,
    capacity: usize,
    write_pos: usize,
}

impl<T> Ring<T> {
    fn new(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity.min(INITIAL_RESERVE)),
            capacity,
            write_pos: 0,
        }
    }

    fn push(&mut self, item: T) {
        if self.items.len() < self.capacity {
            self.items.push(item);
        } else {
            self.items[self.write_pos] = item;
        }
        self.write_pos = (self.write_pos + 1) % self.capacity;
    }

    #[inline]
    fn get(&self, idx: usize) -> &T {
        &self.items[idx]
    }

    #[inline]
    fn len(&self) -> usize {
        self.items.len()
    }
}

// ============================================================================
// Replay Memory
// ============================================================================

/// Fixed-capacity transition store.
pub struct ReplayMemory {
    config: ReplayMemoryConfig,
    shape: TransitionShape,
    ring: Ring<Transition>,
    rng: fastrand::Rng,
    total_pushed: u64,
}

impl ReplayMemory {
    /// Create an empty memory.
    ///
    /// Fails with a configuration error if capacity or batch size is zero.
    pub fn new(config: ReplayMemoryConfig, shape: TransitionShape) -> Result<Self> {
        if config.capacity == 0 {
            return Err(CrmError::config("replay memory capacity must be positive"));
        }
        if config.batch_size == 0 {
            return Err(CrmError::config("batch size must be positive"));
        }
        Ok(Self {
            ring: Ring::new(config.capacity),
            rng: fastrand::Rng::with_seed(config.seed),
            shape,
            config,
            total_pushed: 0,
        })
    }

    /// Append one transition, evicting the oldest entry when full.
    pub fn push(&mut self, transition: Transition) -> Result<()> {
        self.shape.validate(&transition)?;
        self.ring.push(transition);
        self.total_pushed += 1;
        Ok(())
    }

    /// Append every transition of an iterator. Stops at the first malformed one.
    pub fn extend<I>(&mut self, transitions: I) -> Result<usize>
    where
        I: IntoIterator<Item = Transition>,
    {
        let mut count = 0;
        for t in transitions {
            self.push(t)?;
            count += 1;
        }
        Ok(count)
    }

    /// Draw `batch_size` independent uniform samples (with replacement).
    pub fn sample(&mut self, batch_size: usize) -> Result<Batch> {
        let len = self.ring.len();
        if len == 0 {
            return Err(CrmError::InsufficientData {
                requested: batch_size,
                available: 0,
            });
        }

        let mut batch = Batch::with_capacity(self.shape, batch_size);
        for _ in 0..batch_size {
            let idx = self.rng.usize(..len);
            batch.push(self.ring.get(idx));
        }
        Ok(batch)
    }

    /// Sample with the configured batch size.
    pub fn sample_batch(&mut self) -> Result<Batch> {
        self.sample(self.config.batch_size)
    }

    /// Sample with the configured batch size once at least that many
    /// transitions are stored.
    ///
    /// Fails with `InsufficientData` while the store is smaller than a batch.
    pub fn sample_full_batch(&mut self) -> Result<Batch> {
        let available = self.ring.len();
        if available < self.config.batch_size {
            return Err(CrmError::InsufficientData {
                requested: self.config.batch_size,
                available,
            });
        }
        self.sample_batch()
    }

    /// Whether a full configured batch could be drawn without repeats.
    pub fn has_batch(&self) -> bool {
        self.ring.len() >= self.config.batch_size
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    pub fn shape(&self) -> TransitionShape {
        self.shape
    }

    /// Number of transitions ever appended, including evicted ones.
    pub fn total_pushed(&self) -> u64 {
        self.total_pushed
    }

    /// Iterate stored transitions in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.ring.items.iter()
    }
}
