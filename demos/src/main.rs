//! CRM-DDPG demo runner.
//!
//! Trains DDPG on the waypoint patrol task with the chosen reward-machine
//! feedback, sweeping seeds on worker threads.
//!
//! ```bash
//! # Plain DDPG, one seed
//! cargo run --release -- --mode ddpg
//!
//! # Counterfactual experience, 3 seeds, results under ./results
//! cargo run --release -- --mode crm --seeds 0,1,2 --results-dir results
//!
//! # Reward shaping with missed detections and noisy evaluation
//! cargo run --release -- --mode rs --missing --eval-noise 0.1
//!
//! # Quick check
//! cargo run -- --mode crm_rs --smoke
//! ```

mod waypoint_env;

use std::path::PathBuf;
use std::process::ExitCode;

use burn::backend::{Autodiff, NdArray};
use clap::Parser;
use rayon::prelude::*;

use crm_ddpg::{
    ConsoleLogger, CsvLogger, Ddpg, DdpgConfig, EpochStats, EvalRewardSource, FeedbackMode, MemoryScaling,
    MlpActor, MlpConfig, MlpCritic, MultiLogger, Trainer, TrainerConfig, TrainingSummary,
};
use waypoint_env::WaypointEnv;

type B = Autodiff<NdArray<f32>>;

/// Command-line arguments for the demo binary.
#[derive(Parser, Debug)]
#[command(name = "crm-ddpg", about = "DDPG with reward-machine feedback on a waypoint patrol")]
struct Cli {
    /// Feedback mode: ddpg, crm, rs or crm_rs.
    #[arg(long, default_value = "ddpg")]
    mode: FeedbackMode,

    /// Comma-separated seeds; each runs independently.
    #[arg(long, value_delimiter = ',', default_value = "0")]
    seeds: Vec<u64>,

    /// Base trainer configuration (JSON). Flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use the small smoke-test loop sizes.
    #[arg(long)]
    smoke: bool,

    #[arg(long)]
    epochs: Option<usize>,

    /// Derive the epoch count from a step budget instead.
    #[arg(long)]
    total_timesteps: Option<usize>,

    #[arg(long)]
    cycles: Option<usize>,

    #[arg(long)]
    rollout_steps: Option<usize>,

    #[arg(long)]
    train_steps: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    /// Replay capacity before automaton scaling.
    #[arg(long)]
    memory_limit: Option<usize>,

    /// When memory grows with the automaton: when_counterfactual, when_any_feedback or never.
    #[arg(long)]
    memory_scaling: Option<MemoryScaling>,

    /// Train steps between parameter-noise recalibrations.
    #[arg(long)]
    adaption_interval: Option<usize>,

    /// Parallel training replicas (DDPG and RS only).
    #[arg(long, default_value_t = 1)]
    n_envs: usize,

    /// Exploration noise string, e.g. `adaptive-param_0.2`, `ou_0.2`, `normal_0.1`.
    #[arg(long, default_value = "adaptive-param_0.2")]
    noise: String,

    // ---------- learner ----------
    #[arg(long)]
    gamma: Option<f32>,

    /// Polyak coefficient of the target networks.
    #[arg(long)]
    tau: Option<f32>,

    #[arg(long)]
    actor_lr: Option<f64>,

    #[arg(long)]
    critic_lr: Option<f64>,

    /// L2 penalty on the critic's hidden-layer weights.
    #[arg(long)]
    critic_l2_reg: Option<f32>,

    /// Global gradient-norm clip for both networks.
    #[arg(long)]
    clip_norm: Option<f32>,

    #[arg(long)]
    reward_scale: Option<f32>,

    #[arg(long)]
    normalize_returns: bool,

    #[arg(long)]
    no_normalize_observations: bool,

    /// Width of the actor and critic hidden layers.
    #[arg(long)]
    hidden_size: Option<usize>,

    #[arg(long)]
    eval_freq: Option<usize>,

    #[arg(long)]
    eval_episodes: Option<usize>,

    /// Step cap of each evaluation episode.
    #[arg(long)]
    eval_max_steps: Option<usize>,

    /// Evaluation discount; defaults to the learner's gamma.
    #[arg(long)]
    eval_gamma: Option<f32>,

    /// Score evaluations on milestones or on the environment reward.
    #[arg(long)]
    eval_reward_source: Option<EvalRewardSource>,

    /// Probability of perturbing each evaluation action.
    #[arg(long, default_value_t = 0.0)]
    eval_noise: f32,

    /// Drop waypoint detections at random.
    #[arg(long)]
    missing: bool,

    /// Episode cap of the patrol task during training.
    #[arg(long, default_value_t = WaypointEnv::DEFAULT_MAX_STEPS)]
    max_steps: usize,

    /// Root directory for evaluation results.
    #[arg(long)]
    results_dir: Option<PathBuf>,

    /// Per-epoch CSV, one file per seed (`<stem>_<seed>.csv`).
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Print every n-th epoch to stdout.
    #[arg(long, default_value_t = 1)]
    log_interval: usize,
}

/// Build the trainer configuration for one seed from the base config and flags.
fn build_config(cli: &Cli, seed: u64) -> crm_ddpg::Result<TrainerConfig> {
    let mut cfg = match &cli.config {
        Some(path) => TrainerConfig::from_json_file(path)?,
        None if cli.smoke => TrainerConfig::smoke(),
        None => TrainerConfig::new(),
    };

    // ---------- experiment key ----------
    cfg = cfg
        .with_feedback(cli.mode)
        .with_missing(cli.missing)
        .with_eval_noise_level(cli.eval_noise)
        .with_seed(seed);
    if cli.results_dir.is_some() {
        cfg = cfg.with_results_dir(cli.results_dir.clone());
    }

    // ---------- loop overrides ----------
    if let Some(n) = cli.epochs {
        cfg = cfg.with_nb_epochs(n);
    }
    if cli.total_timesteps.is_some() {
        cfg = cfg.with_total_timesteps(cli.total_timesteps);
    }
    if let Some(n) = cli.cycles {
        cfg = cfg.with_nb_epoch_cycles(n);
    }
    if let Some(n) = cli.rollout_steps {
        cfg = cfg.with_nb_rollout_steps(n);
    }
    if let Some(n) = cli.train_steps {
        cfg = cfg.with_nb_train_steps(n);
    }
    if let Some(n) = cli.batch_size {
        cfg = cfg.with_batch_size(n);
    }
    if let Some(n) = cli.memory_limit {
        cfg = cfg.with_memory_limit(n);
    }
    if let Some(scaling) = cli.memory_scaling {
        cfg = cfg.with_memory_scaling(scaling);
    }
    if let Some(n) = cli.adaption_interval {
        cfg = cfg.with_param_noise_adaption_interval(n);
    }

    // ---------- evaluation overrides ----------
    if let Some(n) = cli.eval_freq {
        cfg = cfg.with_eval_freq(n);
    }
    if let Some(n) = cli.eval_episodes {
        cfg = cfg.with_eval_nbr(n);
    }
    if let Some(n) = cli.eval_max_steps {
        cfg = cfg.with_eval_max_steps(n);
    }
    if cli.eval_gamma.is_some() {
        cfg = cfg.with_eval_gamma(cli.eval_gamma);
    }
    if let Some(source) = cli.eval_reward_source {
        cfg = cfg.with_eval_reward_source(source);
    }

    cfg.validate()?;
    Ok(cfg)
}

/// Learner settings for one seed; flags override the defaults.
fn build_ddpg_config(cli: &Cli, seed: u64) -> DdpgConfig {
    let mut cfg = DdpgConfig::new()
        .with_noise_type(cli.noise.as_str())
        .with_normalize_observations(!cli.no_normalize_observations)
        .with_normalize_returns(cli.normalize_returns)
        .with_seed(seed);
    if let Some(gamma) = cli.gamma {
        cfg = cfg.with_gamma(gamma);
    }
    if let Some(tau) = cli.tau {
        cfg = cfg.with_tau(tau);
    }
    if let Some(lr) = cli.actor_lr {
        cfg = cfg.with_actor_lr(lr);
    }
    if let Some(lr) = cli.critic_lr {
        cfg = cfg.with_critic_lr(lr);
    }
    if let Some(reg) = cli.critic_l2_reg {
        cfg = cfg.with_critic_l2_reg(reg);
    }
    if cli.clip_norm.is_some() {
        cfg = cfg.with_clip_norm(cli.clip_norm);
    }
    if let Some(scale) = cli.reward_scale {
        cfg = cfg.with_reward_scale(scale);
    }
    cfg
}

fn build_logger(cli: &Cli, seed: u64) -> crm_ddpg::Result<MultiLogger> {
    let mut logger = MultiLogger::new();
    // Interleaved tables from several threads are unreadable
    if cli.seeds.len() == 1 {
        logger = logger.add(ConsoleLogger::new(cli.log_interval));
    }
    if let Some(csv) = &cli.csv {
        let stem = csv.file_stem().and_then(|s| s.to_str()).unwrap_or("metrics");
        let path = csv.with_file_name(format!("{}_{}.csv", stem, seed));
        logger = logger.add(CsvLogger::new(path)?);
    }
    Ok(logger)
}

/// Train one seed to completion.
fn run_seed(cli: &Cli, seed: u64) -> crm_ddpg::Result<(TrainingSummary, Vec<EpochStats>)> {
    let config = build_config(cli, seed)?;

    let env = WaypointEnv::new(cli.n_envs, seed)
        .with_missing(cli.missing)
        .with_shaped_experience(cli.mode.uses_shaping())
        .with_max_steps(cli.max_steps);
    let eval_env = WaypointEnv::new(1, seed.wrapping_add(1))
        .with_missing(cli.missing)
        .with_max_steps(cli.max_steps);

    let device = Default::default();
    let ddpg_config = build_ddpg_config(cli, seed);
    let mut mlp = MlpConfig::new(WaypointEnv::OBS_SIZE, WaypointEnv::ACTION_DIM);
    if let Some(width) = cli.hidden_size {
        mlp = mlp.with_hidden_size(width);
    }
    let (actor_optim, critic_optim) = ddpg_config.create_optimizers::<B, MlpActor<B>, MlpCritic<B>>();
    let ddpg = Ddpg::new(
        mlp.init_actor::<B>(&device),
        mlp.init_critic::<B>(&device),
        actor_optim,
        critic_optim,
        ddpg_config,
        device,
    )?;

    let mut trainer = Trainer::new(config, env, ddpg)?
        .with_eval_env(eval_env)?
        .with_logger(build_logger(cli, seed)?);
    let summary = trainer.run()?;
    Ok((summary, trainer.epoch_stats().to_vec()))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    log::info!(
        "mode={} seeds={:?} missing={} eval_noise={} noise={}",
        cli.mode,
        cli.seeds,
        cli.missing,
        cli.eval_noise,
        cli.noise
    );

    let runs: Vec<(u64, crm_ddpg::Result<(TrainingSummary, Vec<EpochStats>)>)> = cli
        .seeds
        .par_iter()
        .map(|&seed| (seed, run_seed(&cli, seed)))
        .collect();

    let mut failed = false;
    let mut per_seed = Vec::new();
    for (seed, run) in runs {
        match run {
            Ok((summary, stats)) => {
                log::info!(
                    "seed {}: {} epochs, {} env steps, {} episodes, {} train steps, {} evaluations",
                    seed,
                    summary.epochs,
                    summary.env_steps,
                    summary.episodes,
                    summary.train_steps,
                    summary.evaluations
                );
                per_seed.push(stats);
            }
            Err(e) => {
                log::error!("seed {} failed: {}", seed, e);
                failed = true;
            }
        }
    }

    // Seed average of the final epoch
    let finals: Vec<EpochStats> = per_seed.iter().filter_map(|s| s.last().cloned()).collect();
    if finals.len() > 1 {
        if let Some(mean) = EpochStats::reduce_mean(&finals) {
            println!("\nFinal epoch, mean over {} seeds:", finals.len());
            for (key, value) in mean.as_pairs() {
                println!("  {:<32} {:>12.4}", key, value);
            }
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
