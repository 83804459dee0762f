//! Process-wide collaborators, built once and shared by the CLI and the
//! HTTP server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::info;

use repo_indexer_core::models::IndexedRepository;
use repo_indexer_core::status::StatusService;
use repo_indexer_core::store::{CredentialProvider, JobStore};
use repo_indexer_core::vector::{ChunkGateway, InMemoryVectorIndex, SearchHit, VectorIndex};

use crate::archive::ArchiveFilter;
use crate::config::{Config, VectorConfig};
use crate::db;
use crate::github::{GitHubClient, RepoProvider};
use crate::ingest::{IndexSummary, Indexer};
use crate::migrate;
use crate::progress::IndexProgressReporter;
use crate::sqlite_store::{SqliteCredentialStore, SqliteJobStore};
use crate::upstash::UpstashIndex;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub jobs: Arc<dyn JobStore>,
    pub status: StatusService,
    pub gateway: ChunkGateway,
    pub indexer: Indexer,
}

/// A claimed run that is executing in the background.
pub struct StartedRun {
    pub record: IndexedRepository,
    pub handle: JoinHandle<()>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted { chunks: usize },
    NotFound,
    Active,
}

/// Build the configured vector backend.
pub fn vector_backend(config: &VectorConfig) -> Result<Arc<dyn VectorIndex>> {
    match config.provider.as_str() {
        "memory" => Ok(Arc::new(InMemoryVectorIndex::new())),
        "upstash" => Ok(Arc::new(UpstashIndex::new(config)?)),
        other => bail!("Unknown vector provider: '{}'", other),
    }
}

impl AppState {
    /// Open the database (applying migrations) and build the GitHub and
    /// vector clients from `config`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;

        let jobs = Arc::new(SqliteJobStore::new(pool.clone()));
        let credentials = Arc::new(SqliteCredentialStore::new(pool));
        let provider = Arc::new(GitHubClient::new(&config.github)?);
        let index = vector_backend(&config.vector)?;

        Self::new(config.clone(), jobs, credentials, provider, index)
    }

    pub fn new(
        config: Config,
        jobs: Arc<dyn JobStore>,
        credentials: Arc<dyn CredentialProvider>,
        provider: Arc<dyn RepoProvider>,
        index: Arc<dyn VectorIndex>,
    ) -> Result<Self> {
        let gateway = ChunkGateway::new(index);
        let filter = ArchiveFilter::from_config(&config.indexing)?;
        let indexer = Indexer::new(jobs.clone(), credentials, provider, gateway.clone(), filter);

        Ok(Self {
            config: Arc::new(config),
            status: StatusService::new(jobs.clone()),
            jobs,
            gateway,
            indexer,
        })
    }

    fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.config.indexing.run_timeout_secs)
    }

    fn stale_before(&self) -> i64 {
        Utc::now().timestamp() - self.config.indexing.stale_after_secs as i64
    }

    /// Claim the key and run the pipeline on a background task.
    ///
    /// Returns `None` while another run for the key is active.
    pub async fn start_indexing(
        &self,
        repo_full_name: &str,
        user_id: &str,
    ) -> Result<Option<StartedRun>> {
        let repo_url = format!("https://github.com/{repo_full_name}");
        let Some(record) = self
            .jobs
            .claim(user_id, repo_full_name, &repo_url, self.stale_before())
            .await?
        else {
            return Ok(None);
        };

        let handle = spawn_run(
            self.indexer.clone(),
            self.run_timeout(),
            repo_full_name.to_string(),
            user_id.to_string(),
        );
        Ok(Some(StartedRun { record, handle }))
    }

    /// Claim the key and run the pipeline on the current task.
    pub async fn run_foreground(
        &self,
        repo_full_name: &str,
        user_id: &str,
        reporter: Arc<dyn IndexProgressReporter>,
    ) -> Result<IndexSummary> {
        let repo_url = format!("https://github.com/{repo_full_name}");
        if self
            .jobs
            .claim(user_id, repo_full_name, &repo_url, self.stale_before())
            .await?
            .is_none()
        {
            bail!("{repo_full_name} is already being indexed");
        }

        let indexer = self.indexer.clone().with_reporter(reporter);
        let timeout = self.run_timeout();
        let run = indexer.index_repository(repo_full_name, user_id);
        match tokio::time::timeout(timeout, run).await {
            Ok(result) => result,
            Err(_) => {
                let err = timed_out(timeout);
                indexer.fail_run(repo_full_name, user_id, &err).await;
                Err(err)
            }
        }
    }

    /// Delete a repository's chunks, then its job record.
    pub async fn delete_repository(
        &self,
        repo_full_name: &str,
        user_id: &str,
    ) -> Result<DeleteOutcome> {
        let Some(record) = self.jobs.get(user_id, repo_full_name).await? else {
            return Ok(DeleteOutcome::NotFound);
        };
        if record.status.is_active() && record.updated_at >= self.stale_before() {
            return Ok(DeleteOutcome::Active);
        }

        let chunks = self
            .gateway
            .delete_chunks(repo_full_name, user_id, None)
            .await?;
        self.jobs.delete(user_id, repo_full_name).await?;
        info!(repo = repo_full_name, user = user_id, chunks, "repository deleted");
        Ok(DeleteOutcome::Deleted { chunks })
    }

    pub async fn search(
        &self,
        query: &str,
        repo_full_name: &str,
        user_id: &str,
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        self.gateway.search(query, repo_full_name, user_id, top_k).await
    }
}

fn timed_out(timeout: Duration) -> anyhow::Error {
    anyhow::anyhow!("indexing timed out after {}s", timeout.as_secs())
}

/// Run one indexing job under `timeout`. A timed-out run is marked FAILED.
fn spawn_run(
    indexer: Indexer,
    timeout: Duration,
    repo_full_name: String,
    user_id: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let run = indexer.index_repository(&repo_full_name, &user_id);
        if tokio::time::timeout(timeout, run).await.is_err() {
            indexer
                .fail_run(&repo_full_name, &user_id, &timed_out(timeout))
                .await;
        }
    })
}
