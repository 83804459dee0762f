//! Core data models.
//!
//! These types flow between the extractor, the gateway and the job store.
//! Wire-facing types serialize with camelCase field names so that stored
//! vector metadata and API responses share one shape.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of structural entity recognised in a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    File,
    Class,
    Function,
    Method,
    Component,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::File => "file",
            EntityType::Class => "class",
            EntityType::Function => "function",
            EntityType::Method => "method",
            EntityType::Component => "component",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structural entity extracted from one file.
///
/// Line numbers are 1-based and inclusive. `content` has already been
/// passed through the truncator with the budget for its entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEntity {
    pub entity_type: EntityType,
    /// Methods are `Class.method`; notebook inner entities `cell_N::name`.
    pub name: String,
    pub start_line: usize,
    pub end_line: usize,
    pub content: String,
    pub imports: Vec<String>,
    pub exported_symbols: Vec<String>,
    pub parent_class: Option<String>,
    pub called_functions: Vec<String>,
    pub docstring: Option<String>,
}

impl ParsedEntity {
    pub fn new(
        entity_type: EntityType,
        name: impl Into<String>,
        start_line: usize,
        end_line: usize,
        content: String,
    ) -> Self {
        Self {
            entity_type,
            name: name.into(),
            start_line,
            end_line,
            content,
            imports: Vec::new(),
            exported_symbols: Vec::new(),
            parent_class: None,
            called_functions: Vec::new(),
            docstring: None,
        }
    }
}

/// Metadata stored alongside each vector record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    pub repo_full_name: String,
    pub user_id: String,
    pub file_path: String,
    pub file_name: String,
    pub file_url: String,
    pub entity_type: EntityType,
    pub entity_name: String,
    pub start_line: usize,
    pub end_line: usize,
    pub content: String,
    #[serde(default)]
    pub docstring: Option<String>,
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub exported_symbols: Vec<String>,
    #[serde(default)]
    pub parent_class: Option<String>,
    #[serde(default)]
    pub called_functions: Vec<String>,
}

/// One vector record: a deterministic id, the text to embed, and metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeChunk {
    pub id: String,
    pub data: String,
    pub metadata: ChunkMetadata,
}

/// Lifecycle state of an indexing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexStatus {
    Pending,
    Cloning,
    Parsing,
    Indexing,
    Completed,
    Failed,
}

impl IndexStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStatus::Pending => "PENDING",
            IndexStatus::Cloning => "CLONING",
            IndexStatus::Parsing => "PARSING",
            IndexStatus::Indexing => "INDEXING",
            IndexStatus::Completed => "COMPLETED",
            IndexStatus::Failed => "FAILED",
        }
    }

    /// COMPLETED and FAILED end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, IndexStatus::Completed | IndexStatus::Failed)
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(IndexStatus::Pending),
            "CLONING" => Ok(IndexStatus::Cloning),
            "PARSING" => Ok(IndexStatus::Parsing),
            "INDEXING" => Ok(IndexStatus::Indexing),
            "COMPLETED" => Ok(IndexStatus::Completed),
            "FAILED" => Ok(IndexStatus::Failed),
            other => anyhow::bail!("unknown index status '{}'", other),
        }
    }
}

/// Persisted job record, one per `(user_id, repo_full_name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedRepository {
    pub user_id: String,
    pub repo_full_name: String,
    pub repo_url: String,
    pub branch: String,
    pub status: IndexStatus,
    pub progress: u8,
    pub total_files: u64,
    pub indexed_files: u64,
    pub error_message: Option<String>,
    pub last_indexed_at: Option<DateTime<Utc>>,
    /// Unix seconds of the last write, used for stale-run detection.
    #[serde(skip)]
    pub updated_at: i64,
}

impl IndexedRepository {
    /// A fresh record as written by a successful claim.
    pub fn pending(user_id: &str, repo_full_name: &str, repo_url: &str, now: i64) -> Self {
        Self {
            user_id: user_id.to_string(),
            repo_full_name: repo_full_name.to_string(),
            repo_url: repo_url.to_string(),
            branch: String::new(),
            status: IndexStatus::Pending,
            progress: 0,
            total_files: 0,
            indexed_files: 0,
            error_message: None,
            last_indexed_at: None,
            updated_at: now,
        }
    }

    /// Apply a partial update in place.
    pub fn apply(&mut self, update: &JobUpdate, now: i64) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(progress) = update.progress {
            self.progress = progress;
        }
        if let Some(branch) = &update.branch {
            self.branch = branch.clone();
        }
        if let Some(url) = &update.repo_url {
            self.repo_url = url.clone();
        }
        if let Some(total) = update.total_files {
            self.total_files = total;
        }
        if let Some(indexed) = update.indexed_files {
            self.indexed_files = indexed;
        }
        if let Some(message) = &update.error_message {
            self.error_message = Some(message.clone());
        }
        if let Some(at) = update.last_indexed_at {
            self.last_indexed_at = Some(at);
        }
        self.updated_at = now;
    }

    /// Reset the run fields for a new run, keeping branch and history.
    pub fn reset_for_run(&mut self, status: IndexStatus, repo_url: &str, now: i64) {
        self.status = status;
        self.repo_url = repo_url.to_string();
        self.progress = 0;
        self.total_files = 0;
        self.indexed_files = 0;
        self.error_message = None;
        self.updated_at = now;
    }
}

/// Partial update of a job record. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<IndexStatus>,
    pub progress: Option<u8>,
    pub branch: Option<String>,
    pub repo_url: Option<String>,
    pub total_files: Option<u64>,
    pub indexed_files: Option<u64>,
    pub error_message: Option<String>,
    pub last_indexed_at: Option<DateTime<Utc>>,
}

impl JobUpdate {
    pub fn status(status: IndexStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn progress(progress: u8) -> Self {
        Self {
            progress: Some(progress),
            ..Self::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(IndexStatus::Failed),
            error_message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_repo_url(mut self, url: impl Into<String>) -> Self {
        self.repo_url = Some(url.into());
        self
    }

    pub fn with_total_files(mut self, total: u64) -> Self {
        self.total_files = Some(total);
        self
    }

    pub fn with_indexed_files(mut self, indexed: u64) -> Self {
        self.indexed_files = Some(indexed);
        self
    }

    pub fn with_last_indexed_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_indexed_at = Some(at);
        self
    }
}

/// Split `owner/repo` into its two parts.
///
/// Both parts must be non-empty and consist of ASCII alphanumerics,
/// `-`, `_` or `.`.
pub fn split_repo_full_name(full_name: &str) -> Option<(&str, &str)> {
    let (owner, repo) = full_name.split_once('/')?;
    let valid = |part: &str| {
        !part.is_empty()
            && part != "."
            && part != ".."
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };
    if valid(owner) && valid(repo) {
        Some((owner, repo))
    } else {
        None
    }
}
