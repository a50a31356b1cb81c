//! Evaluation results persisted at the end of training.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use crate::environment::RmState;
use crate::error::Result;
use crate::relabel::FeedbackMode;

use super::evaluator::EvaluationReport;

/// One entry per evaluation checkpoint in every series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultsRecord {
    pub successes: Vec<Vec<bool>>,
    /// Final automaton state of each episode.
    pub partial_successes: Vec<Vec<RmState>>,
    /// Discounted milestone return of each episode.
    pub results: Vec<Vec<f64>>,
    pub ep_lengths: Vec<Vec<usize>>,
    /// Rollout step counter at each checkpoint.
    pub env_steps: Vec<usize>,
}

impl ResultsRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record opened with the untrained checkpoint at env step 0: one
    /// unsuccessful episode stuck in state 0 for the full `episode_cap`.
    pub fn with_baseline(episode_cap: usize) -> Self {
        Self {
            successes: vec![vec![false]],
            partial_successes: vec![vec![RmState(0)]],
            results: vec![vec![0.0]],
            ep_lengths: vec![vec![episode_cap]],
            env_steps: vec![0],
        }
    }

    pub fn push(&mut self, report: &EvaluationReport) {
        let eps = &report.episodes;
        self.successes.push(eps.iter().map(|e| e.success).collect());
        self.partial_successes.push(eps.iter().map(|e| e.final_rm_state).collect());
        self.results.push(eps.iter().map(|e| e.discounted_return).collect());
        self.ep_lengths.push(eps.iter().map(|e| e.length).collect());
        self.env_steps.push(report.env_step);
    }

    /// Number of checkpoints.
    pub fn len(&self) -> usize {
        self.env_steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.env_steps.is_empty()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

/// Identifies a run's results file.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultsKey {
    pub env_name: String,
    pub feedback: FeedbackMode,
    pub missing: bool,
    pub noise_level: f32,
    pub seed: u64,
}

impl ResultsKey {
    /// `<root>/<env>_results/<mode>[_missing][_noise_<level>]/<seed>.json`
    pub fn path(&self, root: impl AsRef<Path>) -> PathBuf {
        let mut run = self.feedback.label().to_string();
        if self.missing {
            run.push_str("_missing");
        }
        if self.noise_level > 0.0 {
            run.push_str(&format!("_noise_{}", self.noise_level));
        }
        root.as_ref()
            .join(format!("{}_results", self.env_name))
            .join(run)
            .join(format!("{}.json", self.seed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runners::evaluator::EpisodeOutcome;

    fn report(step: usize) -> EvaluationReport {
        EvaluationReport {
            env_step: step,
            episodes: vec![
                EpisodeOutcome {
                    success: true,
                    discounted_return: 4.5,
                    final_rm_state: RmState::ACCEPTING,
                    length: 40,
                },
                EpisodeOutcome {
                    success: false,
                    discounted_return: 1.0,
                    final_rm_state: RmState(2),
                    length: 1000,
                },
            ],
        }
    }

    #[test]
    fn test_push_keeps_series_aligned() {
        let mut record = ResultsRecord::new();
        record.push(&report(1000));
        record.push(&report(2000));

        assert_eq!(record.len(), 2);
        assert_eq!(record.successes.len(), record.results.len());
        assert_eq!(record.partial_successes.len(), record.ep_lengths.len());
        assert_eq!(record.successes[0], vec![true, false]);
        assert_eq!(record.partial_successes[1], vec![RmState(-1), RmState(2)]);
        assert_eq!(record.env_steps, vec![1000, 2000]);
    }

    #[test]
    fn test_baseline_precedes_evaluations() {
        let mut record = ResultsRecord::with_baseline(1000);
        assert_eq!(record.len(), 1);
        record.push(&report(500));

        assert_eq!(record.env_steps, vec![0, 500]);
        assert_eq!(record.successes[0], vec![false]);
        assert_eq!(record.partial_successes[0], vec![RmState(0)]);
        assert_eq!(record.results[0], vec![0.0]);
        assert_eq!(record.ep_lengths, vec![vec![1000], vec![40, 1000]]);
    }

    #[test]
    fn test_path_layout() {
        let key = ResultsKey {
            env_name: "waypoints".into(),
            feedback: FeedbackMode::Counterfactual,
            missing: true,
            noise_level: 0.1,
            seed: 7,
        };
        assert_eq!(
            key.path("out"),
            PathBuf::from("out/waypoints_results/crm_missing_noise_0.1/7.json")
        );

        let plain = ResultsKey {
            feedback: FeedbackMode::Off,
            missing: false,
            noise_level: 0.0,
            ..key
        };
        assert_eq!(plain.path("out"), PathBuf::from("out/waypoints_results/ddpg/7.json"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env_results").join("crm").join("0.json");

        let mut record = ResultsRecord::new();
        record.push(&report(500));
        record.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        // Automaton states are stored as plain integers
        assert!(text.contains("-1"));
        assert_eq!(ResultsRecord::load(&path).unwrap(), record);
    }
}
