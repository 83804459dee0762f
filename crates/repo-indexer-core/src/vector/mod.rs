//! Vector index abstraction and the scoped chunk gateway.
//!
//! [`VectorIndex`] is the backend seam: a hosted index that embeds the
//! `data` text of each record server-side, supports metadata filters, id
//! prefix range scans and deletion by id. [`ChunkGateway`] layers the
//! repository rules on top of any backend:
//!
//! - upserts are sent in batches of at most [`UPSERT_BATCH_SIZE`];
//! - deletes by id go out in batches of at most [`DELETE_BATCH_SIZE`];
//! - deleting a whole repository scans the id namespace prefix and, when
//!   that fails, falls back to repeated filtered queries;
//! - an index that reports itself empty has nothing to delete.

pub mod filter;
pub mod memory;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::chunk::namespace_prefix;
use crate::models::{ChunkMetadata, CodeChunk};

pub use filter::{escape_filter_value, scope_filter};
pub use memory::InMemoryVectorIndex;

pub const UPSERT_BATCH_SIZE: usize = 100;
pub const DELETE_BATCH_SIZE: usize = 1000;
const RANGE_PAGE_SIZE: usize = 1000;
const FALLBACK_TOP_K: usize = 1000;
const MAX_FALLBACK_ROUNDS: usize = 100;

/// Cursor that starts a range scan.
pub const RANGE_START: &str = "0";

/// A record as sent to the index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorRecord {
    pub id: String,
    pub data: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    /// Text embedded by the index and compared against stored records.
    pub data: String,
    pub top_k: usize,
    pub filter: Option<String>,
    pub include_metadata: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueryMatch {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RangeRequest {
    pub cursor: String,
    pub limit: usize,
    pub prefix: Option<String>,
}

/// One page of a range scan. `next_cursor` is `None` after the last page.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RangePage {
    pub ids: Vec<String>,
    pub next_cursor: Option<String>,
}

/// Backend failure kinds the gateway distinguishes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VectorIndexError {
    /// The index holds no vectors yet; reads and deletes are vacuous.
    #[error("vector index is empty")]
    EmptyIndex,
    #[error("vector index returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("vector index request failed: {0}")]
    Transport(String),
    #[error("could not decode vector index response: {0}")]
    Decode(String),
}

pub type VectorResult<T> = std::result::Result<T, VectorIndexError>;

/// A hosted vector index with server-side embedding.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, records: &[VectorRecord]) -> VectorResult<()>;

    async fn query(&self, request: &QueryRequest) -> VectorResult<Vec<QueryMatch>>;

    /// Returns the number of ids actually removed.
    async fn delete(&self, ids: &[String]) -> VectorResult<usize>;

    async fn range(&self, request: &RangeRequest) -> VectorResult<RangePage>;
}

/// A scoped search result with decoded chunk metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub metadata: ChunkMetadata,
}

/// Repository-scoped operations over a [`VectorIndex`].
#[derive(Clone)]
pub struct ChunkGateway {
    index: Arc<dyn VectorIndex>,
}

impl ChunkGateway {
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self { index }
    }

    /// Upsert chunks in batches of [`UPSERT_BATCH_SIZE`].
    pub async fn upsert_chunks(&self, chunks: &[CodeChunk]) -> Result<()> {
        for batch in chunks.chunks(UPSERT_BATCH_SIZE) {
            let records = batch
                .iter()
                .map(|chunk| {
                    Ok(VectorRecord {
                        id: chunk.id.clone(),
                        data: chunk.data.clone(),
                        metadata: serde_json::to_value(&chunk.metadata)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            self.index
                .upsert(&records)
                .await
                .with_context(|| format!("failed to upsert {} chunks", records.len()))?;
        }
        Ok(())
    }

    /// Delete chunks of `(repo_full_name, user_id)`.
    ///
    /// With `ids`, exactly those ids are deleted. Without, every chunk of
    /// the repository is. Returns the number of ids removed.
    pub async fn delete_chunks(
        &self,
        repo_full_name: &str,
        user_id: &str,
        ids: Option<&[String]>,
    ) -> Result<usize> {
        if let Some(ids) = ids {
            return vacuous_if_empty(self.delete_ids(ids).await)
                .with_context(|| format!("failed to delete chunks of {repo_full_name}"));
        }

        let prefix = namespace_prefix(user_id, repo_full_name);
        match self.delete_by_prefix(&prefix).await {
            Ok(deleted) => Ok(deleted),
            Err(VectorIndexError::EmptyIndex) => Ok(0),
            Err(err) => {
                warn!(
                    repo = repo_full_name,
                    error = %err,
                    "prefix delete failed, falling back to filtered query delete"
                );
                vacuous_if_empty(self.delete_by_filter(repo_full_name, user_id).await)
                    .with_context(|| format!("failed to delete chunks of {repo_full_name}"))
            }
        }
    }

    /// Semantic search within one repository of one user.
    pub async fn search(
        &self,
        query: &str,
        repo_full_name: &str,
        user_id: &str,
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        let request = QueryRequest {
            data: query.to_string(),
            top_k,
            filter: Some(scope_filter(repo_full_name, user_id)),
            include_metadata: true,
        };
        let matches = match self.index.query(&request).await {
            Ok(matches) => matches,
            Err(VectorIndexError::EmptyIndex) => return Ok(Vec::new()),
            Err(err) => return Err(err).context("vector search failed"),
        };

        let mut hits = Vec::with_capacity(matches.len());
        for m in matches {
            let Some(raw) = m.metadata else {
                continue;
            };
            match serde_json::from_value::<ChunkMetadata>(raw) {
                Ok(metadata) => hits.push(SearchHit {
                    id: m.id,
                    score: m.score,
                    metadata,
                }),
                Err(err) => debug!(id = %m.id, error = %err, "skipping hit with foreign metadata"),
            }
        }
        Ok(hits)
    }

    async fn delete_ids(&self, ids: &[String]) -> VectorResult<usize> {
        let mut deleted = 0;
        for batch in ids.chunks(DELETE_BATCH_SIZE) {
            deleted += self.index.delete(batch).await?;
        }
        Ok(deleted)
    }

    /// Collect every id under `prefix`, then delete them.
    async fn delete_by_prefix(&self, prefix: &str) -> VectorResult<usize> {
        let mut ids = Vec::new();
        let mut cursor = RANGE_START.to_string();
        loop {
            let page = self
                .index
                .range(&RangeRequest {
                    cursor,
                    limit: RANGE_PAGE_SIZE,
                    prefix: Some(prefix.to_string()),
                })
                .await?;
            ids.extend(page.ids.into_iter().filter(|id| id.starts_with(prefix)));
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = next,
                _ => break,
            }
        }
        if ids.is_empty() {
            return Ok(0);
        }
        self.delete_ids(&ids).await
    }

    /// Query within the scope filter and delete the hits until none remain.
    async fn delete_by_filter(&self, repo_full_name: &str, user_id: &str) -> VectorResult<usize> {
        let request = QueryRequest {
            data: repo_full_name.to_string(),
            top_k: FALLBACK_TOP_K,
            filter: Some(scope_filter(repo_full_name, user_id)),
            include_metadata: false,
        };
        let mut deleted = 0;
        for _ in 0..MAX_FALLBACK_ROUNDS {
            let matches = self.index.query(&request).await?;
            if matches.is_empty() {
                break;
            }
            let ids: Vec<String> = matches.into_iter().map(|m| m.id).collect();
            let removed = self.delete_ids(&ids).await?;
            deleted += removed;
            if removed == 0 {
                break;
            }
        }
        Ok(deleted)
    }
}

fn vacuous_if_empty(result: VectorResult<usize>) -> VectorResult<usize> {
    match result {
        Err(VectorIndexError::EmptyIndex) => Ok(0),
        other => other,
    }
}
