//! Epoch loggers.
//!
//! Provides different logging backends for epoch statistics.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::epoch_stats::{EpochStats, COLUMNS};

/// Logger trait for different logging backends.
pub trait MetricsLogger: Send {
    /// Log one epoch's statistics.
    fn log(&mut self, stats: &EpochStats);

    /// Flush any buffered output.
    fn flush(&mut self);
}

/// Console logger with a fixed-width table.
pub struct ConsoleLogger {
    log_interval: usize,
    logged: usize,
    show_header: bool,
}

impl ConsoleLogger {
    /// Create a new console logger.
    ///
    /// # Arguments
    ///
    /// * `log_interval` - Epochs between log rows (0 behaves like 1)
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
            logged: 0,
            show_header: true,
        }
    }

    fn print_header(&self) {
        println!(
            "{:>6} {:>10} {:>8} {:>10} {:>10} {:>9} {:>10} {:>10} {:>9} {:>7} {:>8}",
            "Epoch", "Steps", "Episodes", "Return", "History", "Q", "Actor", "Critic", "Eval", "Succ", "SPS"
        );
        println!("{}", "-".repeat(107));
    }
}

impl MetricsLogger for ConsoleLogger {
    fn log(&mut self, stats: &EpochStats) {
        self.logged += 1;
        if (self.logged - 1) % self.log_interval != 0 {
            return;
        }

        if self.show_header {
            self.print_header();
            self.show_header = false;
        }

        let eval = stats
            .eval_return
            .map(|r| format!("{:.3}", r))
            .unwrap_or_else(|| "-".to_string());
        let success = stats
            .eval_success_rate
            .map(|r| format!("{:.2}", r))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:>6} {:>10} {:>8} {:>10.3} {:>10.3} {:>9.3} {:>10.4} {:>10.4} {:>9} {:>7} {:>8.0}",
            stats.epoch,
            stats.total_steps,
            stats.total_episodes,
            stats.rollout_return,
            stats.rollout_return_history,
            stats.rollout_q_mean,
            stats.train_loss_actor,
            stats.train_loss_critic,
            eval,
            success,
            stats.steps_per_second
        );
    }

    fn flush(&mut self) {
        let _ = std::io::stdout().flush();
    }
}

/// CSV file logger, one row per epoch.
///
/// Missing optional entries are written as empty cells.
pub struct CsvLogger {
    writer: BufWriter<File>,
}

impl CsvLogger {
    /// Create a new CSV logger and write the header row.
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", COLUMNS.join(","))?;
        Ok(Self { writer })
    }
}

impl MetricsLogger for CsvLogger {
    fn log(&mut self, stats: &EpochStats) {
        let row: Vec<String> = stats
            .values()
            .iter()
            .map(|v| v.map(|v| v.to_string()).unwrap_or_default())
            .collect();
        if let Err(e) = writeln!(self.writer, "{}", row.join(",")) {
            log::warn!("failed to write epoch {} to csv: {}", stats.epoch, e);
        }
    }

    fn flush(&mut self) {
        let _ = self.writer.flush();
    }
}

impl Drop for CsvLogger {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Multi-logger that writes to multiple backends.
#[derive(Default)]
pub struct MultiLogger {
    loggers: Vec<Box<dyn MetricsLogger>>,
}

impl MultiLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a logger.
    pub fn add<L: MetricsLogger + 'static>(mut self, logger: L) -> Self {
        self.loggers.push(Box::new(logger));
        self
    }

    pub fn len(&self) -> usize {
        self.loggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loggers.is_empty()
    }
}

impl MetricsLogger for MultiLogger {
    fn log(&mut self, stats: &EpochStats) {
        for logger in &mut self.loggers {
            logger.log(stats);
        }
    }

    fn flush(&mut self) {
        for logger in &mut self.loggers {
            logger.flush();
        }
    }
}
