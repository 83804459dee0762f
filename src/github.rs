//! GitHub REST client for repository metadata and tarball downloads.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | [`RepoProvider::default_branch`] | `GET /repos/{owner}/{repo}` |
//! | [`RepoProvider::download_tarball`] | `GET /repos/{owner}/{repo}/tarball/{ref}` |
//!
//! Both requests carry the user's token as a bearer credential. Tarball
//! requests answer with a redirect to the codeload host, which reqwest
//! follows. The body is read chunk by chunk and refused once it passes
//! `max_tarball_mb`.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client, Response};
use serde::Deserialize;

use crate::config::GitHubConfig;

/// Source of repository metadata and archives.
#[async_trait]
pub trait RepoProvider: Send + Sync {
    async fn default_branch(&self, owner: &str, repo: &str, token: &str) -> Result<String>;

    /// Gzipped tarball of `git_ref`.
    async fn download_tarball(
        &self,
        owner: &str,
        repo: &str,
        git_ref: &str,
        token: &str,
    ) -> Result<Vec<u8>>;
}

#[derive(Deserialize)]
struct RepoMetadata {
    default_branch: String,
}

pub struct GitHubClient {
    http: Client,
    api_base: String,
    max_tarball_bytes: u64,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            header::HeaderValue::from_static("2022-11-28"),
        );

        let http = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build GitHub HTTP client")?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            max_tarball_bytes: config.max_tarball_bytes(),
        })
    }

    async fn get(&self, path: &str, token: &str) -> Result<Response> {
        let url = format!("{}{}", self.api_base, path);
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .with_context(|| format!("GitHub request failed: GET {}", path))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("GitHub API error {} for {}: {}", status, path, body.trim());
        }
        Ok(response)
    }
}

#[async_trait]
impl RepoProvider for GitHubClient {
    async fn default_branch(&self, owner: &str, repo: &str, token: &str) -> Result<String> {
        let metadata: RepoMetadata = self
            .get(&format!("/repos/{owner}/{repo}"), token)
            .await?
            .json()
            .await
            .with_context(|| format!("Invalid repository metadata for {owner}/{repo}"))?;
        Ok(metadata.default_branch)
    }

    async fn download_tarball(
        &self,
        owner: &str,
        repo: &str,
        git_ref: &str,
        token: &str,
    ) -> Result<Vec<u8>> {
        let mut response = self
            .get(&format!("/repos/{owner}/{repo}/tarball/{git_ref}"), token)
            .await?;

        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .with_context(|| format!("Tarball download of {owner}/{repo} interrupted"))?
        {
            if (bytes.len() + chunk.len()) as u64 > self.max_tarball_bytes {
                bail!(
                    "Tarball of {owner}/{repo} exceeds {} bytes",
                    self.max_tarball_bytes
                );
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }
}
