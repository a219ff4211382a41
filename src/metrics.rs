//! Per-request latency accounting.
//!
//! Samples flow through an unbounded channel into a single sink task that
//! owns the metrics file, so workers never contend on the file and a sink
//! failure never reaches a client reply.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// One latency sample, bucketed by algorithm index and reread mode.
#[derive(Debug, Clone, Copy)]
pub struct MetricRecord {
    pub algorithm_index: usize,
    pub reread_mode: bool,
    pub elapsed_ms: f64,
}

/// On-disk shape of the metrics file: one list of samples per algorithm
/// index, per reread mode, plus the catalogue order the indices refer to.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MetricsFile {
    #[serde(rename = "execution_times_REREAD_ON_QUERY_true", default)]
    pub reread: Vec<Vec<f64>>,
    #[serde(rename = "execution_times_REREAD_ON_QUERY_false", default)]
    pub cached: Vec<Vec<f64>>,
    #[serde(default)]
    pub algorithms: Vec<String>,
}

impl MetricsFile {
    fn with_algorithms(algorithms: Vec<String>) -> Self {
        Self { reread: Vec::new(), cached: Vec::new(), algorithms }
    }

    /// Append a sample to its bucket, growing the bucket list on demand.
    pub fn apply(&mut self, record: &MetricRecord) {
        let buckets = if record.reread_mode { &mut self.reread } else { &mut self.cached };
        while buckets.len() <= record.algorithm_index {
            buckets.push(Vec::new());
        }
        buckets[record.algorithm_index].push(record.elapsed_ms);
    }
}

/// Existing metrics state at `path`, or a fresh file for this catalogue.
pub fn load_or_default(path: &Path, algorithms: Vec<String>) -> MetricsFile {
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<MetricsFile>(&content) {
            Ok(mut file) => {
                file.algorithms = algorithms;
                file
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "metrics file is not valid JSON, starting fresh");
                MetricsFile::with_algorithms(algorithms)
            }
        },
        Err(_) => MetricsFile::with_algorithms(algorithms),
    }
}

/// Serialize and write the whole metrics file.
pub fn persist(path: &Path, file: &MetricsFile) -> std::io::Result<()> {
    let serialized = serde_json::to_string_pretty(file).map_err(std::io::Error::from)?;
    std::fs::write(path, serialized)
}

// ---------------------------------------------------------------------------
// Sink task
// ---------------------------------------------------------------------------

/// Handle used by request workers to hand samples to the sink task.
#[derive(Clone)]
pub struct MetricsSink {
    tx: mpsc::UnboundedSender<MetricRecord>,
}

impl MetricsSink {
    /// Spawn the sink task. Existing samples at `path` are kept; a missing
    /// or corrupt file is replaced on the first write.
    pub fn spawn(path: PathBuf, algorithms: Vec<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_sink(path, algorithms, rx));
        Self { tx }
    }

    /// Queue a sample. Never blocks; a closed sink is logged and ignored.
    pub fn record(&self, record: MetricRecord) {
        if self.tx.send(record).is_err() {
            debug!("metrics sink closed, sample dropped");
        }
    }
}

async fn run_sink(
    path: PathBuf,
    algorithms: Vec<String>,
    mut rx: mpsc::UnboundedReceiver<MetricRecord>,
) {
    let mut state = load_or_default(&path, algorithms);
    while let Some(record) = rx.recv().await {
        state.apply(&record);
        if let Err(e) = persist(&path, &state) {
            warn!(path = %path.display(), error = %e, "failed to persist metrics sample");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_grows_buckets_on_demand() {
        let mut file = MetricsFile::with_algorithms(vec!["default".into(), "binary".into()]);
        file.apply(&MetricRecord { algorithm_index: 1, reread_mode: false, elapsed_ms: 2.5 });
        file.apply(&MetricRecord { algorithm_index: 1, reread_mode: false, elapsed_ms: 3.0 });
        file.apply(&MetricRecord { algorithm_index: 0, reread_mode: true, elapsed_ms: 1.0 });

        assert_eq!(file.cached, vec![vec![], vec![2.5, 3.0]]);
        assert_eq!(file.reread, vec![vec![1.0]]);
    }

    #[test]
    fn persist_and_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");

        let mut file = MetricsFile::with_algorithms(vec!["default".into()]);
        file.apply(&MetricRecord { algorithm_index: 0, reread_mode: true, elapsed_ms: 4.25 });
        persist(&path, &file).unwrap();

        let reloaded = load_or_default(&path, vec!["default".into()]);
        assert_eq!(reloaded.reread, vec![vec![4.25]]);
        assert_eq!(reloaded.algorithms, vec!["default"]);

        // The serialized keys carry the reread mode spelled out.
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("execution_times_REREAD_ON_QUERY_true"));
        assert!(raw.contains("execution_times_REREAD_ON_QUERY_false"));
    }

    #[test]
    fn corrupt_metrics_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        std::fs::write(&path, "{ not json").unwrap();

        let file = load_or_default(&path, vec!["default".into()]);
        assert!(file.reread.is_empty());
        assert!(file.cached.is_empty());
        assert_eq!(file.algorithms, vec!["default"]);
    }

    #[test]
    fn missing_metrics_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let file = load_or_default(&dir.path().join("absent.json"), vec!["default".into()]);
        assert!(file.cached.is_empty());
    }
}
