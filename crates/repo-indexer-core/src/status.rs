//! Read-only accessors over indexing job records.

use std::sync::Arc;

use anyhow::Result;

use crate::models::IndexedRepository;
use crate::store::JobStore;

#[derive(Clone)]
pub struct StatusService {
    jobs: Arc<dyn JobStore>,
}

impl StatusService {
    pub fn new(jobs: Arc<dyn JobStore>) -> Self {
        Self { jobs }
    }

    pub async fn get_status(
        &self,
        user_id: &str,
        repo_full_name: &str,
    ) -> Result<Option<IndexedRepository>> {
        self.jobs.get(user_id, repo_full_name).await
    }

    /// All records of `user_id`, ordered by repository name.
    pub async fn list_statuses(&self, user_id: &str) -> Result<Vec<IndexedRepository>> {
        let mut records = self.jobs.list(user_id).await?;
        records.sort_by(|a, b| a.repo_full_name.cmp(&b.repo_full_name));
        Ok(records)
    }

    /// Whether a run for the key is in a non-terminal state.
    pub async fn is_active(&self, user_id: &str, repo_full_name: &str) -> Result<bool> {
        Ok(self
            .jobs
            .get(user_id, repo_full_name)
            .await?
            .is_some_and(|r| r.status.is_active()))
    }
}
