//! SQLite-backed [`JobStore`] and [`CredentialProvider`].
//!
//! Job records live in `indexed_repositories`, keyed by
//! `(user_id, repo_full_name)`. `claim` is a single conditional upsert, so
//! two concurrent claims for the same key cannot both succeed.

use std::str::FromStr;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use repo_indexer_core::models::{IndexStatus, IndexedRepository, JobUpdate};
use repo_indexer_core::store::{CredentialProvider, JobStore};

const SELECT_RECORD: &str = r#"
    SELECT user_id, repo_full_name, repo_url, branch, status, progress,
           total_files, indexed_files, error_message, last_indexed_at, updated_at
    FROM indexed_repositories
"#;

pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch(
        &self,
        user_id: &str,
        repo_full_name: &str,
    ) -> Result<Option<IndexedRepository>> {
        let row = sqlx::query(&format!(
            "{SELECT_RECORD} WHERE user_id = ? AND repo_full_name = ?"
        ))
        .bind(user_id)
        .bind(repo_full_name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn fetch_existing(
        &self,
        user_id: &str,
        repo_full_name: &str,
    ) -> Result<IndexedRepository> {
        self.fetch(user_id, repo_full_name)
            .await?
            .with_context(|| format!("index job for {repo_full_name} vanished"))
    }
}

fn record_from_row(row: &SqliteRow) -> Result<IndexedRepository> {
    let status: String = row.get("status");
    let last_indexed_at: Option<i64> = row.get("last_indexed_at");
    let progress: i64 = row.get("progress");
    let total_files: i64 = row.get("total_files");
    let indexed_files: i64 = row.get("indexed_files");

    Ok(IndexedRepository {
        user_id: row.get("user_id"),
        repo_full_name: row.get("repo_full_name"),
        repo_url: row.get("repo_url"),
        branch: row.get("branch"),
        status: IndexStatus::from_str(&status)?,
        progress: progress.clamp(0, 100) as u8,
        total_files: total_files.max(0) as u64,
        indexed_files: indexed_files.max(0) as u64,
        error_message: row.get("error_message"),
        last_indexed_at: last_indexed_at.and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn claim(
        &self,
        user_id: &str,
        repo_full_name: &str,
        repo_url: &str,
        stale_before: i64,
    ) -> Result<Option<IndexedRepository>> {
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO indexed_repositories (user_id, repo_full_name, repo_url, status,
                                              progress, total_files, indexed_files,
                                              created_at, updated_at)
            VALUES (?, ?, ?, 'PENDING', 0, 0, 0, ?, ?)
            ON CONFLICT(user_id, repo_full_name) DO UPDATE SET
                repo_url = excluded.repo_url,
                status = 'PENDING',
                progress = 0,
                total_files = 0,
                indexed_files = 0,
                error_message = NULL,
                updated_at = excluded.updated_at
            WHERE indexed_repositories.status IN ('COMPLETED', 'FAILED')
               OR indexed_repositories.updated_at < ?
            "#,
        )
        .bind(user_id)
        .bind(repo_full_name)
        .bind(repo_url)
        .bind(now)
        .bind(now)
        .bind(stale_before)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.fetch_existing(user_id, repo_full_name).await.map(Some)
    }

    async fn start_run(
        &self,
        user_id: &str,
        repo_full_name: &str,
        repo_url: &str,
    ) -> Result<IndexedRepository> {
        let now = Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO indexed_repositories (user_id, repo_full_name, repo_url, status,
                                              progress, total_files, indexed_files,
                                              created_at, updated_at)
            VALUES (?, ?, ?, 'CLONING', 0, 0, 0, ?, ?)
            ON CONFLICT(user_id, repo_full_name) DO UPDATE SET
                repo_url = excluded.repo_url,
                status = 'CLONING',
                progress = 0,
                total_files = 0,
                indexed_files = 0,
                error_message = NULL,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(repo_full_name)
        .bind(repo_url)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.fetch_existing(user_id, repo_full_name).await
    }

    async fn update(&self, user_id: &str, repo_full_name: &str, update: JobUpdate) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE indexed_repositories SET
                status = COALESCE(?, status),
                progress = COALESCE(?, progress),
                branch = COALESCE(?, branch),
                repo_url = COALESCE(?, repo_url),
                total_files = COALESCE(?, total_files),
                indexed_files = COALESCE(?, indexed_files),
                error_message = COALESCE(?, error_message),
                last_indexed_at = COALESCE(?, last_indexed_at),
                updated_at = ?
            WHERE user_id = ? AND repo_full_name = ?
            "#,
        )
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.progress.map(i64::from))
        .bind(update.branch.as_deref())
        .bind(update.repo_url.as_deref())
        .bind(update.total_files.map(|n| n as i64))
        .bind(update.indexed_files.map(|n| n as i64))
        .bind(update.error_message.as_deref())
        .bind(update.last_indexed_at.map(|at| at.timestamp()))
        .bind(Utc::now().timestamp())
        .bind(user_id)
        .bind(repo_full_name)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            bail!("no index job for {repo_full_name} (user {user_id})");
        }
        Ok(())
    }

    async fn get(&self, user_id: &str, repo_full_name: &str) -> Result<Option<IndexedRepository>> {
        self.fetch(user_id, repo_full_name).await
    }

    async fn list(&self, user_id: &str) -> Result<Vec<IndexedRepository>> {
        let rows = sqlx::query(&format!(
            "{SELECT_RECORD} WHERE user_id = ? ORDER BY repo_full_name"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn delete(&self, user_id: &str, repo_full_name: &str) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM indexed_repositories WHERE user_id = ? AND repo_full_name = ?")
                .bind(user_id)
                .bind(repo_full_name)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// GitHub access tokens in `user_credentials`.
pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn set_credential(&self, user_id: &str, access_token: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_credentials (user_id, access_token, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                access_token = excluded.access_token,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(access_token)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialProvider for SqliteCredentialStore {
    async fn get_user_credential(&self, user_id: &str) -> Result<Option<String>> {
        let token =
            sqlx::query_scalar("SELECT access_token FROM user_credentials WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(token)
    }
}
