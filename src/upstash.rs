//! Upstash Vector REST backend for [`VectorIndex`].
//!
//! The index embeds `data` server-side, so records carry text rather than
//! vectors.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | upsert | `POST /upsert-data` with `[{id, data, metadata}]` |
//! | query | `POST /query-data` with `{data, topK, includeMetadata, filter}` |
//! | delete | `DELETE /delete` with `[id, ...]` |
//! | range | `POST /range` with `{cursor, limit, prefix}` |
//!
//! Responses arrive as `{"result": ...}` or `{"error": "..."}`.
//!
//! Retry strategy:
//! - HTTP 429 or 5xx → retry with exponential backoff
//! - HTTP 4xx (not 429) → fail immediately
//! - Network error → retry

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use repo_indexer_core::vector::{
    QueryMatch, QueryRequest, RangePage, RangeRequest, VectorIndex, VectorIndexError,
    VectorRecord, VectorResult,
};

use crate::config::VectorConfig;

#[derive(Deserialize)]
struct Envelope<T> {
    result: Option<T>,
    error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryBody<'a> {
    data: &'a str,
    top_k: usize,
    include_metadata: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RangeBody<'a> {
    cursor: &'a str,
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    prefix: Option<&'a str>,
    include_metadata: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RangeResult {
    #[serde(default)]
    next_cursor: String,
    #[serde(default)]
    vectors: Vec<RangeVector>,
}

#[derive(Deserialize)]
struct RangeVector {
    id: String,
}

#[derive(Deserialize)]
struct DeleteResult {
    deleted: usize,
}

pub struct UpstashIndex {
    http: Client,
    base_url: String,
    token: String,
    max_retries: u32,
    backoff: Duration,
}

impl UpstashIndex {
    pub fn new(config: &VectorConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("vector.url required"))?;
        let token = config
            .token
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("vector.token required"))?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build vector index HTTP client")?;

        Ok(Self {
            http,
            base_url: url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            max_retries: config.max_retries,
            backoff: Duration::from_secs(1),
        })
    }

    /// Base delay of the exponential backoff (doubles per attempt).
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    async fn call<B, T>(&self, method: Method, path: &str, body: &B) -> VectorResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned + Send,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.backoff * (1u32 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(&self.token)
                .json(body)
                .send()
                .await;

            let response = match resp {
                Ok(response) => response,
                Err(e) => {
                    debug!(path, attempt, error = %e, "vector index request failed");
                    last_err = Some(VectorIndexError::Transport(e.to_string()));
                    continue;
                }
            };

            let status = response.status();
            let text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    last_err = Some(VectorIndexError::Transport(e.to_string()));
                    continue;
                }
            };

            if status.is_success() {
                return decode_result(&text);
            }

            let err = classify_error(status.as_u16(), &text);
            if status.as_u16() == 429 || status.is_server_error() {
                debug!(path, attempt, status = status.as_u16(), "retrying vector index call");
                last_err = Some(err);
                continue;
            }
            return Err(err);
        }

        Err(last_err
            .unwrap_or_else(|| VectorIndexError::Transport("vector index call failed".to_string())))
    }
}

fn decode_result<T: DeserializeOwned>(text: &str) -> VectorResult<T> {
    let envelope: Envelope<T> =
        serde_json::from_str(text).map_err(|e| VectorIndexError::Decode(e.to_string()))?;
    match (envelope.result, envelope.error) {
        (_, Some(message)) => Err(classify_message(200, message)),
        (Some(result), None) => Ok(result),
        (None, None) => Err(VectorIndexError::Decode("response has no result".to_string())),
    }
}

fn classify_error(status: u16, body: &str) -> VectorIndexError {
    let message = serde_json::from_str::<Envelope<serde_json::Value>>(body)
        .ok()
        .and_then(|e| e.error)
        .unwrap_or_else(|| body.trim().to_string());
    classify_message(status, message)
}

fn classify_message(status: u16, message: String) -> VectorIndexError {
    if is_empty_index_message(&message) {
        VectorIndexError::EmptyIndex
    } else {
        VectorIndexError::Api { status, message }
    }
}

fn is_empty_index_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("empty") && (lower.contains("index") || lower.contains("namespace"))
}

#[async_trait]
impl VectorIndex for UpstashIndex {
    async fn upsert(&self, records: &[VectorRecord]) -> VectorResult<()> {
        let _: serde_json::Value = self.call(Method::POST, "/upsert-data", records).await?;
        Ok(())
    }

    async fn query(&self, request: &QueryRequest) -> VectorResult<Vec<QueryMatch>> {
        let body = QueryBody {
            data: &request.data,
            top_k: request.top_k,
            include_metadata: request.include_metadata,
            filter: request.filter.as_deref(),
        };
        self.call(Method::POST, "/query-data", &body).await
    }

    async fn delete(&self, ids: &[String]) -> VectorResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result: DeleteResult = self.call(Method::DELETE, "/delete", ids).await?;
        Ok(result.deleted)
    }

    async fn range(&self, request: &RangeRequest) -> VectorResult<RangePage> {
        let body = RangeBody {
            cursor: &request.cursor,
            limit: request.limit,
            prefix: request.prefix.as_deref(),
            include_metadata: false,
        };
        let result: RangeResult = self.call(Method::POST, "/range", &body).await?;
        Ok(RangePage {
            ids: result.vectors.into_iter().map(|v| v.id).collect(),
            next_cursor: (!result.next_cursor.is_empty()).then_some(result.next_cursor),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_empty_index_messages() {
        assert_eq!(
            classify_error(400, r#"{"error":"Index is empty","status":400}"#),
            VectorIndexError::EmptyIndex
        );
        assert_eq!(
            classify_error(401, r#"{"error":"Unauthorized","status":401}"#),
            VectorIndexError::Api {
                status: 401,
                message: "Unauthorized".to_string()
            }
        );
        assert_eq!(
            classify_error(502, "bad gateway"),
            VectorIndexError::Api {
                status: 502,
                message: "bad gateway".to_string()
            }
        );
    }

    #[test]
    fn decodes_result_envelopes() {
        let deleted: DeleteResult = decode_result(r#"{"result":{"deleted":3}}"#).unwrap();
        assert_eq!(deleted.deleted, 3);
        assert!(matches!(
            decode_result::<DeleteResult>("not json"),
            Err(VectorIndexError::Decode(_))
        ));
        assert!(matches!(
            decode_result::<DeleteResult>(r#"{"error":"boom"}"#),
            Err(VectorIndexError::Api { .. })
        ));
    }

    #[test]
    fn range_body_is_camel_case() {
        let body = RangeBody {
            cursor: "0",
            limit: 1000,
            prefix: Some("abc-"),
            include_metadata: false,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "cursor": "0",
                "limit": 1000,
                "prefix": "abc-",
                "includeMetadata": false
            })
        );
    }
}
