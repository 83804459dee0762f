//! Indexing progress reporting.
//!
//! The job record's `progress` column is the source of truth; reporters
//! mirror each checkpoint to the terminal during `rindex index`. Progress
//! goes to **stderr** so stdout stays parseable for scripts.

use std::io::Write;
use std::sync::Arc;

use repo_indexer_core::models::IndexStatus;

/// One progress checkpoint of a run.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexProgressEvent {
    pub repo: String,
    pub status: IndexStatus,
    pub progress: u8,
    pub indexed_files: u64,
    pub total_files: u64,
}

/// Receives progress checkpoints from the orchestrator.
pub trait IndexProgressReporter: Send + Sync {
    fn report(&self, event: &IndexProgressEvent);
}

/// Human-friendly progress on stderr: "index acme/app  INDEXING  40%  1,234 / 5,000 files".
pub struct StderrProgress;

impl IndexProgressReporter for StderrProgress {
    fn report(&self, event: &IndexProgressEvent) {
        let line = if event.total_files > 0 {
            format!(
                "index {}  {}  {:>3}%  {} / {} files\n",
                event.repo,
                event.status,
                event.progress,
                format_number(event.indexed_files),
                format_number(event.total_files)
            )
        } else {
            format!(
                "index {}  {}  {:>3}%\n",
                event.repo, event.status, event.progress
            )
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IndexProgressReporter for JsonProgress {
    fn report(&self, event: &IndexProgressEvent) {
        let obj = serde_json::json!({
            "event": "progress",
            "repo": event.repo,
            "status": event.status,
            "progress": event.progress,
            "indexedFiles": event.indexed_files,
            "totalFiles": event.total_files,
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter for background runs.
pub struct NoProgress;

impl IndexProgressReporter for NoProgress {
    fn report(&self, _event: &IndexProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Arc<dyn IndexProgressReporter> {
        match self {
            ProgressMode::Off => Arc::new(NoProgress),
            ProgressMode::Human => Arc::new(StderrProgress),
            ProgressMode::Json => Arc::new(JsonProgress),
        }
    }
}
