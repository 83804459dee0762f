//! In-memory [`JobStore`] and [`CredentialProvider`] for tests.
//!
//! The job store keeps every applied update in a history log so tests
//! can assert the order of status and progress transitions.

use std::collections::{BTreeMap, HashMap};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::{CredentialProvider, JobStore};
use crate::models::{IndexStatus, IndexedRepository, JobUpdate};

type Key = (String, String);

fn key(user_id: &str, repo_full_name: &str) -> Key {
    (user_id.to_string(), repo_full_name.to_string())
}

#[derive(Default)]
pub struct InMemoryJobStore {
    records: Mutex<BTreeMap<Key, IndexedRepository>>,
    history: Mutex<Vec<JobUpdate>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every update applied so far, `start_run` included as a CLONING
    /// update, in order.
    pub fn history(&self) -> Vec<JobUpdate> {
        self.history.lock().clone()
    }

    /// Overwrite a record's last-write time.
    pub fn set_updated_at(&self, user_id: &str, repo_full_name: &str, at: i64) {
        if let Some(record) = self.records.lock().get_mut(&key(user_id, repo_full_name)) {
            record.updated_at = at;
        }
    }

    /// Insert a record as-is.
    pub fn insert(&self, record: IndexedRepository) {
        self.records
            .lock()
            .insert(key(&record.user_id, &record.repo_full_name), record);
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn claim(
        &self,
        user_id: &str,
        repo_full_name: &str,
        repo_url: &str,
        stale_before: i64,
    ) -> Result<Option<IndexedRepository>> {
        let now = Utc::now().timestamp();
        let mut records = self.records.lock();
        match records.get_mut(&key(user_id, repo_full_name)) {
            Some(record) if record.status.is_active() && record.updated_at >= stale_before => {
                Ok(None)
            }
            Some(record) => {
                record.reset_for_run(IndexStatus::Pending, repo_url, now);
                Ok(Some(record.clone()))
            }
            None => {
                let record = IndexedRepository::pending(user_id, repo_full_name, repo_url, now);
                records.insert(key(user_id, repo_full_name), record.clone());
                Ok(Some(record))
            }
        }
    }

    async fn start_run(
        &self,
        user_id: &str,
        repo_full_name: &str,
        repo_url: &str,
    ) -> Result<IndexedRepository> {
        let now = Utc::now().timestamp();
        let mut records = self.records.lock();
        let record = records
            .entry(key(user_id, repo_full_name))
            .or_insert_with(|| IndexedRepository::pending(user_id, repo_full_name, repo_url, now));
        record.reset_for_run(IndexStatus::Cloning, repo_url, now);
        self.history.lock().push(
            JobUpdate::status(IndexStatus::Cloning)
                .with_progress(0)
                .with_repo_url(repo_url),
        );
        Ok(record.clone())
    }

    async fn update(&self, user_id: &str, repo_full_name: &str, update: JobUpdate) -> Result<()> {
        let now = Utc::now().timestamp();
        let mut records = self.records.lock();
        let Some(record) = records.get_mut(&key(user_id, repo_full_name)) else {
            bail!("no index job for {repo_full_name} (user {user_id})");
        };
        record.apply(&update, now);
        self.history.lock().push(update);
        Ok(())
    }

    async fn get(&self, user_id: &str, repo_full_name: &str) -> Result<Option<IndexedRepository>> {
        Ok(self.records.lock().get(&key(user_id, repo_full_name)).cloned())
    }

    async fn list(&self, user_id: &str) -> Result<Vec<IndexedRepository>> {
        Ok(self
            .records
            .lock()
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete(&self, user_id: &str, repo_full_name: &str) -> Result<bool> {
        Ok(self.records.lock().remove(&key(user_id, repo_full_name)).is_some())
    }
}

/// Fixed user-to-token map.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    tokens: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, user_id: &str, token: &str) -> Self {
        self.tokens.insert(user_id.to_string(), token.to_string());
        self
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn get_user_credential(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self.tokens.get(user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn claim_rejects_active_runs_until_stale() {
        let store = InMemoryJobStore::new();
        let now = Utc::now().timestamp();

        let first = store.claim("u1", "acme/app", "url", now - 600).await.unwrap();
        assert_eq!(first.unwrap().status, IndexStatus::Pending);
        assert!(store.claim("u1", "acme/app", "url", now - 600).await.unwrap().is_none());

        store.set_updated_at("u1", "acme/app", now - 3600);
        assert!(store.claim("u1", "acme/app", "url", now - 600).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn claim_reuses_terminal_records() {
        let store = InMemoryJobStore::new();
        let now = Utc::now().timestamp();
        store.start_run("u1", "acme/app", "url").await.unwrap();
        store
            .update("u1", "acme/app", JobUpdate::failed("boom").with_progress(40))
            .await
            .unwrap();

        let claimed = store.claim("u1", "acme/app", "url", now - 600).await.unwrap().unwrap();
        assert_eq!(claimed.status, IndexStatus::Pending);
        assert_eq!(claimed.progress, 0);
        assert_eq!(claimed.error_message, None);
    }

    #[tokio::test]
    async fn update_requires_a_record() {
        let store = InMemoryJobStore::new();
        assert!(store.update("u1", "acme/app", JobUpdate::progress(5)).await.is_err());
    }

    #[tokio::test]
    async fn list_is_per_user_and_ordered() {
        let store = InMemoryJobStore::new();
        for repo in ["zeta/z", "acme/a", "mid/m"] {
            store.start_run("u1", repo, "url").await.unwrap();
        }
        store.start_run("u2", "acme/b", "url").await.unwrap();
        let names: Vec<_> = store
            .list("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.repo_full_name)
            .collect();
        assert_eq!(names, vec!["acme/a", "mid/m", "zeta/z"]);
    }
}
