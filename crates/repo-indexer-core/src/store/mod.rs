//! Persistence abstractions for indexing jobs and user credentials.
//!
//! The [`JobStore`] trait holds one [`IndexedRepository`] record per
//! `(user_id, repo_full_name)`. The application backs it with SQLite; the
//! in-memory versions in [`memory`] serve tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`claim`](JobStore::claim) | Atomically reserve a key for a new run |
//! | [`start_run`](JobStore::start_run) | Reset the record to CLONING |
//! | [`update`](JobStore::update) | Apply a partial update |
//! | [`get`](JobStore::get) | Fetch one record |
//! | [`list`](JobStore::list) | All records of a user |
//! | [`delete`](JobStore::delete) | Remove a record |

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{IndexedRepository, JobUpdate};

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Reserve `(user_id, repo_full_name)` for a new run.
    ///
    /// Succeeds when no record exists, when the record is terminal, or
    /// when its last write is older than `stale_before` (unix seconds).
    /// A successful claim leaves the record PENDING with progress and
    /// counters reset and returns it. Returns `None` while another run
    /// is active. The check and the write are one atomic step.
    async fn claim(
        &self,
        user_id: &str,
        repo_full_name: &str,
        repo_url: &str,
        stale_before: i64,
    ) -> Result<Option<IndexedRepository>>;

    /// Create or reset the record to CLONING with progress 0, counters 0
    /// and no error. Branch and last-indexed time are kept.
    async fn start_run(
        &self,
        user_id: &str,
        repo_full_name: &str,
        repo_url: &str,
    ) -> Result<IndexedRepository>;

    /// Apply `update` to an existing record.
    async fn update(&self, user_id: &str, repo_full_name: &str, update: JobUpdate) -> Result<()>;

    async fn get(&self, user_id: &str, repo_full_name: &str) -> Result<Option<IndexedRepository>>;

    /// Records of `user_id`, ordered by repository name.
    async fn list(&self, user_id: &str) -> Result<Vec<IndexedRepository>>;

    /// Returns whether a record was removed.
    async fn delete(&self, user_id: &str, repo_full_name: &str) -> Result<bool>;
}

/// Source of a user's GitHub access token.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn get_user_credential(&self, user_id: &str) -> Result<Option<String>>;
}
