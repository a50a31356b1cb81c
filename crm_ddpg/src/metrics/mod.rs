//! Epoch statistics and logging.
//!
//! ## Statistics
//!
//! - [`EpochRecorder`]: Collects raw rollout/train/eval values during an epoch
//! - [`EpochStats`]: Aggregated snapshot, averaged across workers with `reduce_mean`
//!
//! ## Loggers
//!
//! - [`ConsoleLogger`]: Fixed-width console table
//! - [`CsvLogger`]: CSV file logging for analysis
//! - [`MultiLogger`]: Combine multiple loggers

pub mod epoch_stats;
pub mod logger;

pub use epoch_stats::{EpochRecorder, EpochStats, COLUMNS, RETURN_HISTORY_LEN};
pub use logger::{ConsoleLogger, CsvLogger, MetricsLogger, MultiLogger};
