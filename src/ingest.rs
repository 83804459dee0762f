//! Indexing pipeline orchestration.
//!
//! Coordinates one run for a `(user, repository)` pair: credential →
//! default branch → tarball → archive ingest → stale chunk delete →
//! entity extraction → batched upsert. Every step checkpoints the job
//! record, and any failure marks it FAILED with the error chain.
//!
//! | Step | Status | Progress |
//! |------|--------|----------|
//! | run started | CLONING | 0 |
//! | branch resolved | CLONING | 5 |
//! | tarball downloaded | PARSING | 15 |
//! | archive ingested | INDEXING | 25 |
//! | files extracted | INDEXING | 25 → 75 |
//! | chunks built | INDEXING | 80 |
//! | chunks upserted | INDEXING | 80 → 98 |
//! | done | COMPLETED | 100 |
//!
//! The orchestrator takes no lock. Callers serialize runs per key with
//! [`JobStore::claim`](repo_indexer_core::store::JobStore::claim).

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{error, info, warn};

use repo_indexer_core::chunk::{build_chunks, ChunkContext};
use repo_indexer_core::extract::ExtractorRegistry;
use repo_indexer_core::models::{split_repo_full_name, CodeChunk, IndexStatus, JobUpdate};
use repo_indexer_core::store::{CredentialProvider, JobStore};
use repo_indexer_core::vector::{ChunkGateway, UPSERT_BATCH_SIZE};

use crate::archive::{ingest_tarball, ArchiveFilter};
use crate::github::RepoProvider;
use crate::progress::{IndexProgressEvent, IndexProgressReporter, NoProgress};

/// Files extracted between two progress checkpoints.
pub const FILE_CHECKPOINT_INTERVAL: u64 = 50;

/// Outcome of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSummary {
    pub branch: String,
    pub files: u64,
    pub failed_files: u64,
    pub chunks: usize,
    pub deleted_chunks: usize,
}

/// Runs the indexing pipeline against injected collaborators.
#[derive(Clone)]
pub struct Indexer {
    jobs: Arc<dyn JobStore>,
    credentials: Arc<dyn CredentialProvider>,
    provider: Arc<dyn RepoProvider>,
    gateway: ChunkGateway,
    filter: Arc<ArchiveFilter>,
    extractors: Arc<ExtractorRegistry>,
    reporter: Arc<dyn IndexProgressReporter>,
}

impl Indexer {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        credentials: Arc<dyn CredentialProvider>,
        provider: Arc<dyn RepoProvider>,
        gateway: ChunkGateway,
        filter: ArchiveFilter,
    ) -> Self {
        Self {
            jobs,
            credentials,
            provider,
            gateway,
            filter: Arc::new(filter),
            extractors: Arc::new(ExtractorRegistry::new()),
            reporter: Arc::new(NoProgress),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn IndexProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_extractors(mut self, extractors: ExtractorRegistry) -> Self {
        self.extractors = Arc::new(extractors);
        self
    }

    /// Index `repo_full_name` (`owner/repo`) for `user_id`.
    ///
    /// The job record is created or reset to CLONING first. On failure the
    /// record is left FAILED with the error chain as its message and the
    /// error is returned.
    pub async fn index_repository(
        &self,
        repo_full_name: &str,
        user_id: &str,
    ) -> Result<IndexSummary> {
        let repo_url = format!("https://github.com/{repo_full_name}");
        self.jobs
            .start_run(user_id, repo_full_name, &repo_url)
            .await
            .with_context(|| format!("Failed to start index job for {repo_full_name}"))?;
        info!(repo = repo_full_name, user = user_id, "indexing started");

        let mut tracker = ProgressTracker::new(self, repo_full_name, user_id);
        tracker.notify();

        match self.run(repo_full_name, user_id, &repo_url, &mut tracker).await {
            Ok(summary) => {
                info!(
                    repo = repo_full_name,
                    user = user_id,
                    files = summary.files,
                    chunks = summary.chunks,
                    "indexing completed"
                );
                Ok(summary)
            }
            Err(err) => {
                self.fail_run(repo_full_name, user_id, &err).await;
                Err(err)
            }
        }
    }

    /// Mark the record FAILED with `err`'s full chain.
    pub async fn fail_run(&self, repo_full_name: &str, user_id: &str, err: &anyhow::Error) {
        error!(
            repo = repo_full_name,
            user = user_id,
            error = %format!("{err:#}"),
            "indexing failed"
        );
        if let Err(write_err) = self
            .jobs
            .update(user_id, repo_full_name, JobUpdate::failed(format!("{err:#}")))
            .await
        {
            error!(repo = repo_full_name, error = %write_err, "could not record failed run");
        }
    }

    async fn run(
        &self,
        repo_full_name: &str,
        user_id: &str,
        repo_url: &str,
        tracker: &mut ProgressTracker<'_>,
    ) -> Result<IndexSummary> {
        let (owner, repo) = split_repo_full_name(repo_full_name).with_context(|| {
            format!("Invalid repository name '{repo_full_name}', expected owner/repo")
        })?;
        let token = self
            .credentials
            .get_user_credential(user_id)
            .await
            .context("Failed to look up GitHub credential")?
            .with_context(|| format!("No GitHub credential stored for user {user_id}"))?;

        let branch = self
            .provider
            .default_branch(owner, repo, &token)
            .await
            .with_context(|| format!("Failed to resolve default branch of {repo_full_name}"))?;
        tracker
            .advance(JobUpdate::progress(5).with_branch(&branch).with_repo_url(repo_url))
            .await?;

        let tarball = self
            .provider
            .download_tarball(owner, repo, &branch, &token)
            .await
            .with_context(|| format!("Failed to download {repo_full_name}@{branch}"))?;
        info!(repo = repo_full_name, branch = %branch, bytes = tarball.len(), "tarball downloaded");
        tracker
            .advance(JobUpdate::status(IndexStatus::Parsing).with_progress(15))
            .await?;

        let filter = self.filter.clone();
        let contents = tokio::task::spawn_blocking(move || ingest_tarball(&tarball[..], &filter))
            .await
            .context("Archive ingestion task failed")?
            .with_context(|| format!("Failed to unpack {repo_full_name}"))?;
        let total = contents.len() as u64;
        info!(
            repo = repo_full_name,
            files = total,
            filtered = contents.skipped_filtered,
            oversize = contents.skipped_oversize,
            binary = contents.skipped_binary,
            undecodable = contents.skipped_undecodable,
            "archive ingested"
        );
        tracker
            .advance(
                JobUpdate::status(IndexStatus::Indexing)
                    .with_total_files(total)
                    .with_progress(25),
            )
            .await?;

        let deleted_chunks = self
            .gateway
            .delete_chunks(repo_full_name, user_id, None)
            .await?;
        info!(repo = repo_full_name, deleted = deleted_chunks, "stale chunks deleted");

        let ctx = ChunkContext {
            user_id,
            repo_full_name,
            branch: &branch,
        };
        let mut chunks: Vec<CodeChunk> = Vec::new();
        let mut failed_files = 0;
        for (i, (path, text)) in contents.files.iter().enumerate() {
            match self.extractors.parse(text, path) {
                Ok(entities) => chunks.extend(build_chunks(&ctx, path, entities)),
                Err(err) => {
                    warn!(
                        repo = repo_full_name,
                        path = %path,
                        error = %format!("{err:#}"),
                        "skipping unparseable file"
                    );
                    failed_files += 1;
                }
            }
            let done = i as u64 + 1;
            if done % FILE_CHECKPOINT_INTERVAL == 0 && done < total {
                tracker
                    .advance(
                        JobUpdate::progress(interpolate(25, 50, done, total))
                            .with_indexed_files(done),
                    )
                    .await?;
            }
        }
        tracker
            .advance(JobUpdate::progress(80).with_indexed_files(total))
            .await?;

        let total_chunks = chunks.len() as u64;
        let mut upserted = 0u64;
        for batch in chunks.chunks(UPSERT_BATCH_SIZE) {
            self.gateway
                .upsert_chunks(batch)
                .await
                .with_context(|| format!("Failed to store chunks of {repo_full_name}"))?;
            upserted += batch.len() as u64;
            tracker
                .advance(JobUpdate::progress(interpolate(80, 18, upserted, total_chunks)))
                .await?;
        }

        tracker
            .advance(
                JobUpdate::status(IndexStatus::Completed)
                    .with_progress(100)
                    .with_last_indexed_at(Utc::now()),
            )
            .await?;

        Ok(IndexSummary {
            branch,
            files: total,
            failed_files,
            chunks: chunks.len(),
            deleted_chunks,
        })
    }
}

/// `start + span * done / total`, or `start + span` when `total` is 0.
fn interpolate(start: u8, span: u8, done: u64, total: u64) -> u8 {
    if total == 0 {
        return start.saturating_add(span);
    }
    let offset = (u64::from(span) * done.min(total)) / total;
    start.saturating_add(offset as u8)
}

/// Writes progress checkpoints of one run, never lowering the percentage.
struct ProgressTracker<'a> {
    indexer: &'a Indexer,
    repo_full_name: &'a str,
    user_id: &'a str,
    event: IndexProgressEvent,
}

impl<'a> ProgressTracker<'a> {
    fn new(indexer: &'a Indexer, repo_full_name: &'a str, user_id: &'a str) -> Self {
        Self {
            indexer,
            repo_full_name,
            user_id,
            event: IndexProgressEvent {
                repo: repo_full_name.to_string(),
                status: IndexStatus::Cloning,
                progress: 0,
                indexed_files: 0,
                total_files: 0,
            },
        }
    }

    async fn advance(&mut self, mut update: JobUpdate) -> Result<()> {
        if let Some(progress) = update.progress {
            let progress = progress.clamp(self.event.progress, 100);
            update.progress = Some(progress);
            self.event.progress = progress;
        }
        if let Some(status) = update.status {
            self.event.status = status;
        }
        if let Some(total) = update.total_files {
            self.event.total_files = total;
        }
        if let Some(indexed) = update.indexed_files {
            self.event.indexed_files = indexed;
        }

        self.indexer
            .jobs
            .update(self.user_id, self.repo_full_name, update)
            .await
            .context("Failed to record indexing progress")?;
        self.notify();
        Ok(())
    }

    fn notify(&self) {
        self.indexer.reporter.report(&self.event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolation_stays_in_its_band() {
        assert_eq!(interpolate(25, 50, 0, 200), 25);
        assert_eq!(interpolate(25, 50, 50, 200), 37);
        assert_eq!(interpolate(25, 50, 200, 200), 75);
        assert_eq!(interpolate(80, 18, 100, 250), 87);
        assert_eq!(interpolate(80, 18, 250, 250), 98);
        assert_eq!(interpolate(80, 18, 0, 0), 98);
        assert_eq!(interpolate(80, 18, 500, 250), 98);
    }
}
