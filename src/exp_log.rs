//! Experiment Log Writer
//!
//! Accumulates one record per training epoch and persists the whole run as a
//! JSON file after every epoch. Each flush rewrites the file completely, so
//! the last write wins and a crashed run still leaves a readable log of all
//! completed epochs. Writes are sequential in the training loop's single
//! thread of control.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::error::Result;

/// Loss and accuracy for one split of one epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitMetrics {
    pub loss: f64,
    pub accuracy: f64,
}

/// Per-epoch record: training metrics, plus test metrics on the epochs
/// where the held-out set was evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train: SplitMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<SplitMetrics>,
}

impl EpochRecord {
    /// Create a record with training metrics only
    pub fn new(epoch: usize, train: SplitMetrics) -> Self {
        Self {
            epoch,
            train,
            test: None,
        }
    }

    /// Attach test metrics to the record
    pub fn with_test(mut self, test: SplitMetrics) -> Self {
        self.test = Some(test);
        self
    }
}

/// Append-only, ordered sequence of epoch records for one experiment run.
///
/// The only durable artifact the training loops own.
#[derive(Debug, Clone, Default)]
pub struct ExperimentLog {
    records: Vec<EpochRecord>,
}

impl ExperimentLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record. Records are never removed or reordered.
    pub fn append(&mut self, record: EpochRecord) {
        self.records.push(record);
    }

    /// All records appended so far, in order
    pub fn records(&self) -> &[EpochRecord] {
        &self.records
    }

    /// Number of recorded epochs
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no epoch has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Persist the full log to `path`, overwriting any previous flush.
    pub fn flush(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.records)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load a previously flushed log (used by tests and post-hoc analysis)
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let records: Vec<EpochRecord> = serde_json::from_str(&json)?;
        Ok(Self { records })
    }
}

/// Resolve the log file path for an experiment:
/// `<outdir>/<name>/<name>.json`.
pub fn log_path(outdir: &Path, name: &str) -> PathBuf {
    outdir.join(name).join(format!("{}.json", name))
}

/// Write the run configuration next to the experiment log, once at startup.
///
/// The config file includes a timestamp so runs sharing a name can still be
/// told apart in post-hoc analysis.
pub fn write_run_config<C: Serialize>(outdir: &Path, name: &str, config: &C) -> Result<()> {
    #[derive(Serialize)]
    struct RunConfig<'a, C> {
        started_at: String,
        config: &'a C,
    }

    let dir = outdir.join(name);
    fs::create_dir_all(&dir)?;

    let wrapped = RunConfig {
        started_at: chrono::Local::now().to_rfc3339(),
        config,
    };
    let json = serde_json::to_string_pretty(&wrapped)?;
    fs::write(dir.join(format!("{}_config.json", name)), json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(epoch: usize, loss: f64, accuracy: f64) -> EpochRecord {
        EpochRecord::new(epoch, SplitMetrics { loss, accuracy })
    }

    #[test]
    fn test_append_keeps_order() {
        let mut log = ExperimentLog::new();
        log.append(record(0, 2.3, 0.1));
        log.append(record(1, 1.9, 0.3));

        assert_eq!(log.len(), 2);
        assert_eq!(log.records()[0].epoch, 0);
        assert_eq!(log.records()[1].epoch, 1);
    }

    #[test]
    fn test_flush_overwrites_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");

        let mut log = ExperimentLog::new();
        log.append(record(0, 2.3, 0.1));
        log.flush(&path).unwrap();

        log.append(record(1, 1.9, 0.3).with_test(SplitMetrics {
            loss: 2.0,
            accuracy: 0.25,
        }));
        log.flush(&path).unwrap();

        let loaded = ExperimentLog::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.records()[1].test.as_ref().unwrap().accuracy, 0.25);
    }

    #[test]
    fn test_test_metrics_omitted_when_absent() {
        let json = serde_json::to_string(&record(3, 1.0, 0.5)).unwrap();
        assert!(!json.contains("test"));

        let with_test = record(3, 1.0, 0.5).with_test(SplitMetrics {
            loss: 1.2,
            accuracy: 0.4,
        });
        let json = serde_json::to_string(&with_test).unwrap();
        assert!(json.contains("test"));
    }

    #[test]
    fn test_log_path_layout() {
        let path = log_path(Path::new("results"), "noisy_student");
        assert_eq!(
            path,
            Path::new("results/noisy_student/noisy_student.json")
        );
    }

    #[test]
    fn test_write_run_config() {
        #[derive(Serialize)]
        struct Cfg {
            epochs: usize,
        }

        let dir = tempfile::tempdir().unwrap();
        write_run_config(dir.path(), "exp", &Cfg { epochs: 5 }).unwrap();

        let written = std::fs::read_to_string(dir.path().join("exp/exp_config.json")).unwrap();
        assert!(written.contains("\"epochs\": 5"));
        assert!(written.contains("started_at"));
    }
}
