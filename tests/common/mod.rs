//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::sync::{Mutex, Notify};

use repo_indexer::archive::ArchiveFilter;
use repo_indexer::github::RepoProvider;
use repo_indexer::ingest::Indexer;
use repo_indexer_core::store::memory::{InMemoryJobStore, StaticCredentials};
use repo_indexer_core::vector::{ChunkGateway, InMemoryVectorIndex};

pub const USER: &str = "u1";
pub const REPO: &str = "acme/app";
pub const TOKEN: &str = "ghp_test";

/// Gzipped tarball with every path under a GitHub-style top-level directory.
pub fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, body) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, format!("acme-app-1a2b3c/{path}"), body.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Scripted [`RepoProvider`]: fixed branch, swappable tarball, optional
/// failure, and an optional gate that holds downloads until released.
pub struct FakeGitHub {
    pub branch: String,
    tarball: Mutex<Vec<u8>>,
    fail_download: Mutex<Option<String>>,
    gate: Option<Arc<Notify>>,
    pub downloads: AtomicUsize,
}

impl FakeGitHub {
    pub fn new(tarball: Vec<u8>) -> Self {
        Self {
            branch: "main".to_string(),
            tarball: Mutex::new(tarball),
            fail_download: Mutex::new(None),
            gate: None,
            downloads: AtomicUsize::new(0),
        }
    }

    pub fn gated(tarball: Vec<u8>, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(tarball)
        }
    }

    pub async fn set_tarball(&self, tarball: Vec<u8>) {
        *self.tarball.lock().await = tarball;
    }

    pub async fn fail_downloads(&self, message: &str) {
        *self.fail_download.lock().await = Some(message.to_string());
    }

    pub async fn restore_downloads(&self) {
        *self.fail_download.lock().await = None;
    }
}

#[async_trait]
impl RepoProvider for FakeGitHub {
    async fn default_branch(&self, _owner: &str, _repo: &str, token: &str) -> Result<String> {
        if token != TOKEN {
            bail!("GitHub API error 401 Unauthorized");
        }
        Ok(self.branch.clone())
    }

    async fn download_tarball(
        &self,
        _owner: &str,
        _repo: &str,
        _git_ref: &str,
        _token: &str,
    ) -> Result<Vec<u8>> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(message) = self.fail_download.lock().await.clone() {
            bail!("{message}");
        }
        Ok(self.tarball.lock().await.clone())
    }
}

/// In-memory collaborators of one pipeline.
pub struct Harness {
    pub jobs: Arc<InMemoryJobStore>,
    pub index: Arc<InMemoryVectorIndex>,
    pub github: Arc<FakeGitHub>,
    pub indexer: Indexer,
}

impl Harness {
    pub fn new(tarball: Vec<u8>) -> Self {
        Self::with_credentials(tarball, StaticCredentials::new().with(USER, TOKEN))
    }

    pub fn with_credentials(tarball: Vec<u8>, credentials: StaticCredentials) -> Self {
        let jobs = Arc::new(InMemoryJobStore::new());
        let index = Arc::new(InMemoryVectorIndex::new());
        let github = Arc::new(FakeGitHub::new(tarball));
        let indexer = Indexer::new(
            jobs.clone(),
            Arc::new(credentials),
            github.clone(),
            ChunkGateway::new(index.clone()),
            ArchiveFilter::new(&[], 1024 * 1024).unwrap(),
        );
        Self {
            jobs,
            index,
            github,
            indexer,
        }
    }
}
