//! Single-threaded DDPG training loop with reward-machine feedback.
//!
//! # Phases
//!
//! ```text
//! Init ─▶ Rollout ×nb_rollout_steps ─▶ Train ×nb_train_steps ─▶ (Evaluate)? ─┐
//!            ▲                                                              │
//!            └──────────────── next cycle (nb_epoch_cycles) ◀───────────────┤
//!                                                                           ▼
//!                                          Terminated ◀── last epoch ── EpochEnd
//! ```
//!
//! Each [`Trainer::advance`] call executes exactly one unit of the current
//! phase (one rollout step, one train step, one evaluation, one epoch
//! summary) and moves to the next phase.

use std::time::Instant;

use crate::algorithms::estimator::Estimator;
use crate::buffers::{ReplayMemory, ReplayMemoryConfig};
use crate::core::transition::TransitionShape;
use crate::environment::{symmetric_action_high, RewardMachineEnv};
use crate::error::{CrmError, Result};
use crate::metrics::{EpochRecorder, EpochStats, MetricsLogger};
use crate::relabel::CounterfactualExpander;

use super::evaluator::Evaluator;
use super::results::{ResultsKey, ResultsRecord};
use super::trainer_config::TrainerConfig;

/// Position of the trainer in the nested epoch/cycle/step loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Rollout { epoch: usize, cycle: usize, step: usize },
    Train { epoch: usize, cycle: usize, step: usize },
    Evaluate { epoch: usize, cycle: usize },
    EpochEnd { epoch: usize },
    Terminated,
}

impl Phase {
    pub fn is_terminated(self) -> bool {
        self == Phase::Terminated
    }
}

/// Counters reported once training ends.
#[derive(Debug, Clone, Default)]
pub struct TrainingSummary {
    pub epochs: usize,
    pub rollout_steps: usize,
    pub env_steps: usize,
    pub episodes: usize,
    pub train_steps: usize,
    pub stored_transitions: usize,
    pub evaluations: usize,
}

/// Drives rollout, storage, training and evaluation for one run.
pub struct Trainer<E, M>
where
    E: RewardMachineEnv,
    M: Estimator,
{
    config: TrainerConfig,
    epochs: usize,
    env: E,
    eval_env: Option<E>,
    estimator: M,
    memory: ReplayMemory,
    expander: CounterfactualExpander,
    evaluator: Evaluator,
    action_high: Vec<f32>,
    logger: Option<Box<dyn MetricsLogger>>,

    phase: Phase,
    obs: Vec<f32>,
    episode_rewards: Vec<f32>,
    episode_steps: Vec<usize>,

    /// Vectorized rollout steps taken.
    rollout_steps: usize,
    /// Transitions observed across all replicas.
    env_steps: usize,
    episodes: usize,
    train_steps: usize,
    evaluations: usize,
    last_eval_bucket: usize,

    recorder: EpochRecorder,
    epoch_stats: Vec<EpochStats>,
    results: ResultsRecord,
    started: Option<Instant>,
}

impl<E, M> Trainer<E, M>
where
    E: RewardMachineEnv,
    M: Estimator,
{
    /// Validate the setup and size the replay memory.
    ///
    /// Fails with `Configuration` when the configuration, the action bounds
    /// or the replica count cannot be trained on; nothing is stepped yet.
    pub fn new(config: TrainerConfig, env: E, estimator: M) -> Result<Self> {
        config.validate()?;
        let action_high = symmetric_action_high(&env)?;
        config.feedback.check_replicas(env.n_envs())?;
        check_sizes(&env, &estimator)?;

        let shape = TransitionShape::new(env.obs_size(), env.action_dim());
        let factor = config.memory_scaling.factor(config.feedback, env.num_rm_states());
        let memory_config = ReplayMemoryConfig::new(config.memory_limit, config.batch_size)
            .scaled(factor)
            .with_seed(config.seed);
        let memory = ReplayMemory::new(memory_config, shape)?;
        let expander = CounterfactualExpander::new(config.feedback, shape, action_high.clone())?;
        let evaluator = Evaluator::new(config.evaluator_config(estimator.discount()));

        log::info!(
            "trainer for {}: mode={} replicas={} memory={}x{} batch={}",
            env.name(),
            config.feedback,
            env.n_envs(),
            factor,
            config.memory_limit,
            memory.batch_size()
        );

        let n_envs = env.n_envs();
        let results = ResultsRecord::with_baseline(config.eval_max_steps);
        Ok(Self {
            epochs: config.resolved_epochs(),
            config,
            env,
            eval_env: None,
            estimator,
            memory,
            expander,
            evaluator,
            action_high,
            logger: None,
            phase: Phase::Init,
            obs: Vec::new(),
            episode_rewards: vec![0.0; n_envs],
            episode_steps: vec![0; n_envs],
            rollout_steps: 0,
            env_steps: 0,
            episodes: 0,
            train_steps: 0,
            evaluations: 0,
            last_eval_bucket: 0,
            recorder: EpochRecorder::new(),
            epoch_stats: Vec::new(),
            results,
            started: None,
        })
    }

    /// Attach a dedicated evaluation environment.
    pub fn with_eval_env(mut self, eval_env: E) -> Result<Self> {
        check_sizes(&eval_env, &self.estimator)?;
        symmetric_action_high(&eval_env)?;
        self.eval_env = Some(eval_env);
        Ok(self)
    }

    /// Forward every epoch's statistics to `logger`.
    pub fn with_logger<L: MetricsLogger + 'static>(mut self, logger: L) -> Self {
        self.logger = Some(Box::new(logger));
        self
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn memory(&self) -> &ReplayMemory {
        &self.memory
    }

    pub fn estimator(&self) -> &M {
        &self.estimator
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn results(&self) -> &ResultsRecord {
        &self.results
    }

    pub fn epoch_stats(&self) -> &[EpochStats] {
        &self.epoch_stats
    }

    pub fn rollout_steps(&self) -> usize {
        self.rollout_steps
    }

    pub fn env_steps(&self) -> usize {
        self.env_steps
    }

    pub fn train_steps(&self) -> usize {
        self.train_steps
    }

    pub fn summary(&self) -> TrainingSummary {
        TrainingSummary {
            epochs: self.epoch_stats.len(),
            rollout_steps: self.rollout_steps,
            env_steps: self.env_steps,
            episodes: self.episodes,
            train_steps: self.train_steps,
            stored_transitions: self.memory.len(),
            evaluations: self.evaluations,
        }
    }

    /// Run until [`Phase::Terminated`].
    pub fn run(&mut self) -> Result<TrainingSummary> {
        while !self.phase.is_terminated() {
            self.advance()?;
        }
        Ok(self.summary())
    }

    /// Execute one unit of the current phase and return the next phase.
    pub fn advance(&mut self) -> Result<Phase> {
        let next = match self.phase {
            Phase::Init => {
                self.init();
                self.cycle_start(0, 0)
            }
            Phase::Rollout { epoch, cycle, step } => {
                self.rollout_step()?;
                if step + 1 < self.config.nb_rollout_steps {
                    Phase::Rollout {
                        epoch,
                        cycle,
                        step: step + 1,
                    }
                } else if self.config.nb_train_steps > 0 {
                    Phase::Train { epoch, cycle, step: 0 }
                } else {
                    self.after_training(epoch, cycle)
                }
            }
            Phase::Train { epoch, cycle, step } => {
                self.train_step()?;
                if step + 1 < self.config.nb_train_steps {
                    Phase::Train {
                        epoch,
                        cycle,
                        step: step + 1,
                    }
                } else {
                    self.after_training(epoch, cycle)
                }
            }
            Phase::Evaluate { epoch, cycle } => {
                self.evaluate()?;
                self.after_cycle(epoch, cycle)
            }
            Phase::EpochEnd { epoch } => {
                self.end_epoch(epoch)?;
                if epoch + 1 < self.epochs {
                    self.cycle_start(epoch + 1, 0)
                } else {
                    self.terminate()?;
                    Phase::Terminated
                }
            }
            Phase::Terminated => Phase::Terminated,
        };
        self.phase = next;
        Ok(next)
    }

    // ========================================================================
    // Phase Units
    // ========================================================================

    fn init(&mut self) {
        self.obs = self.env.reset();
        self.estimator.reset();
        self.episode_rewards.iter_mut().for_each(|r| *r = 0.0);
        self.episode_steps.iter_mut().for_each(|s| *s = 0);
        self.started = Some(Instant::now());
        log::debug!("training for {} epochs", self.epochs);
    }

    /// With several replicas the exploration state is refreshed per cycle.
    fn cycle_start(&mut self, epoch: usize, cycle: usize) -> Phase {
        if self.env.n_envs() > 1 {
            self.estimator.reset();
        }
        Phase::Rollout { epoch, cycle, step: 0 }
    }

    fn rollout_step(&mut self) -> Result<()> {
        let n_envs = self.env.n_envs();
        let action_dim = self.env.action_dim();

        let out = self.estimator.act(&self.obs, true, true)?;
        self.recorder.record_actions(&out.actions);
        if let Some(q) = &out.q_values {
            self.recorder.record_q_values(q);
        }

        let scaled: Vec<f32> = out
            .actions
            .iter()
            .enumerate()
            .map(|(i, a)| a * self.action_high[i % action_dim])
            .collect();
        let step = self.env.step(&scaled)?;
        step.validate(n_envs, self.env.obs_size())?;
        for (i, info) in step.infos.iter().enumerate() {
            info.require_rm_state(i)?;
        }

        self.rollout_steps += 1;
        self.env_steps += n_envs;

        let transitions = self.expander.expand(&self.obs, &out.actions, &step)?;
        let stored_obs: Vec<f32> = transitions.iter().flat_map(|t| t.obs.iter().copied()).collect();
        self.estimator.observe(&stored_obs);
        self.memory.extend(transitions)?;

        for i in 0..n_envs {
            self.episode_rewards[i] += step.rewards[i];
            self.episode_steps[i] += 1;
            if step.dones[i] {
                self.recorder.record_episode(self.episode_rewards[i], self.episode_steps[i]);
                self.episodes += 1;
                self.episode_rewards[i] = 0.0;
                self.episode_steps[i] = 0;
                if n_envs == 1 {
                    self.estimator.reset();
                }
            }
        }

        self.obs = step.observations;
        Ok(())
    }

    fn train_step(&mut self) -> Result<()> {
        let batch = match self.memory.sample_full_batch() {
            Ok(batch) => batch,
            Err(e) if e.is_recoverable() => {
                log::debug!("train step skipped: {}", e);
                self.recorder.record_skipped();
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if self.train_steps % self.config.param_noise_adaption_interval == 0 {
            let reference = self.memory.sample_batch()?;
            if let Some(distance) = self.estimator.adapt_param_noise(&reference)? {
                self.recorder.record_distance(distance);
            }
        }

        let losses = self.estimator.train(&batch)?;
        self.estimator.sync_targets();
        self.recorder.record_losses(losses);
        self.train_steps += 1;
        Ok(())
    }

    fn after_training(&mut self, epoch: usize, cycle: usize) -> Phase {
        if self.config.eval_freq > 0 {
            let bucket = self.rollout_steps / self.config.eval_freq;
            if bucket > self.last_eval_bucket {
                self.last_eval_bucket = bucket;
                return Phase::Evaluate { epoch, cycle };
            }
        }
        self.after_cycle(epoch, cycle)
    }

    fn after_cycle(&mut self, epoch: usize, cycle: usize) -> Phase {
        if cycle + 1 < self.config.nb_epoch_cycles {
            self.cycle_start(epoch, cycle + 1)
        } else {
            Phase::EpochEnd { epoch }
        }
    }

    fn evaluate(&mut self) -> Result<()> {
        let Some(eval_env) = self.eval_env.as_mut() else {
            log::debug!("evaluation due at step {} but no evaluation environment", self.rollout_steps);
            return Ok(());
        };

        let report = self
            .evaluator
            .evaluate(eval_env, &mut self.estimator, &self.action_high, self.rollout_steps)?;
        log::info!("step: {} and reward: {}", self.rollout_steps, report.mean_return());
        log::debug!(
            "evaluation at step {}: success rate {:.2}, mean length {:.1}",
            self.rollout_steps,
            report.success_rate(),
            report.mean_length()
        );

        self.recorder.record_evaluation(report.mean_return(), report.success_rate());
        self.results.push(&report);
        self.evaluations += 1;
        Ok(())
    }

    fn end_epoch(&mut self, epoch: usize) -> Result<()> {
        let duration = self.started.map(|t| t.elapsed().as_secs_f64()).unwrap_or(0.0);
        let mut stats = self.recorder.finish(epoch, self.env_steps, self.episodes, duration);

        if self.memory.has_batch() {
            let reference = self.memory.sample_batch()?;
            let diagnostics = self.estimator.diagnostics(&reference)?;
            stats = stats.with_diagnostics(&diagnostics);
        }

        log::debug!(
            "epoch {}: return {:.3} (history {:.3}), critic loss {:.4}, actor loss {:.4}",
            epoch,
            stats.rollout_return,
            stats.rollout_return_history,
            stats.train_loss_critic,
            stats.train_loss_actor
        );

        if let Some(logger) = self.logger.as_mut() {
            logger.log(&stats);
        }
        self.epoch_stats.push(stats);
        Ok(())
    }

    fn terminate(&mut self) -> Result<()> {
        if let Some(logger) = self.logger.as_mut() {
            logger.flush();
        }

        let Some(root) = &self.config.results_dir else {
            return Ok(());
        };
        let key = ResultsKey {
            env_name: self.env.name().to_string(),
            feedback: self.config.feedback,
            missing: self.config.missing,
            noise_level: self.config.eval_noise_level,
            seed: self.config.seed,
        };
        let path = key.path(root);
        self.results.save(&path)?;
        log::info!("saved {} evaluation checkpoints to {}", self.results.len(), path.display());
        Ok(())
    }
}

fn check_sizes<E, M>(env: &E, estimator: &M) -> Result<()>
where
    E: RewardMachineEnv + ?Sized,
    M: Estimator + ?Sized,
{
    if env.obs_size() != estimator.obs_size() {
        return Err(CrmError::ShapeMismatch {
            field: "obs",
            expected: estimator.obs_size(),
            actual: env.obs_size(),
        });
    }
    if env.action_dim() != estimator.action_dim() {
        return Err(CrmError::ShapeMismatch {
            field: "action",
            expected: estimator.action_dim(),
            actual: env.action_dim(),
        });
    }
    Ok(())
}
