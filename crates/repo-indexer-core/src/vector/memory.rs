//! In-memory [`VectorIndex`] for tests and local runs.
//!
//! Records live in a `BTreeMap` behind a `parking_lot::Mutex`, so range
//! scans come back in id order. Queries evaluate the equality-conjunction
//! filters the gateway produces and rank by naive term overlap with the
//! record text. Every call is logged, and one-shot failures can be
//! injected per operation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::filter::parse_equality_filter;
use super::{
    QueryMatch, QueryRequest, RangePage, RangeRequest, VectorIndex, VectorIndexError, VectorRecord,
    VectorResult,
};

/// One logged backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexCall {
    /// Number of records sent.
    Upsert(usize),
    /// Filter of the query.
    Query(Option<String>),
    /// Number of ids sent.
    Delete(usize),
    /// Prefix of the scan.
    Range(Option<String>),
}

#[derive(Default)]
struct Failures {
    upsert: Option<VectorIndexError>,
    query: Option<VectorIndexError>,
    delete: Option<VectorIndexError>,
    range: Option<VectorIndexError>,
}

#[derive(Default)]
pub struct InMemoryVectorIndex {
    records: Mutex<BTreeMap<String, VectorRecord>>,
    calls: Mutex<Vec<IndexCall>>,
    failures: Mutex<Failures>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn get(&self, id: &str) -> Option<VectorRecord> {
        self.records.lock().get(id).cloned()
    }

    /// Records whose `metadataField` equals `value`.
    pub fn records_where(&self, metadata_field: &str, value: &str) -> Vec<VectorRecord> {
        self.records
            .lock()
            .values()
            .filter(|r| r.metadata.get(metadata_field).and_then(|v| v.as_str()) == Some(value))
            .cloned()
            .collect()
    }

    pub fn calls(&self) -> Vec<IndexCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn fail_next_upsert(&self, err: VectorIndexError) {
        self.failures.lock().upsert = Some(err);
    }

    pub fn fail_next_query(&self, err: VectorIndexError) {
        self.failures.lock().query = Some(err);
    }

    pub fn fail_next_delete(&self, err: VectorIndexError) {
        self.failures.lock().delete = Some(err);
    }

    pub fn fail_next_range(&self, err: VectorIndexError) {
        self.failures.lock().range = Some(err);
    }

    fn record_call(&self, call: IndexCall) {
        self.calls.lock().push(call);
    }
}

fn matches_clauses(record: &VectorRecord, clauses: &[(String, String)]) -> bool {
    clauses.iter().all(|(field, value)| {
        record.metadata.get(field).and_then(|v| v.as_str()) == Some(value.as_str())
    })
}

fn overlap_score(terms: &[String], text: &str) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }
    let text = text.to_lowercase();
    let hits = terms.iter().filter(|t| text.contains(t.as_str())).count();
    hits as f32 / terms.len() as f32
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, records: &[VectorRecord]) -> VectorResult<()> {
        self.record_call(IndexCall::Upsert(records.len()));
        if let Some(err) = self.failures.lock().upsert.take() {
            return Err(err);
        }
        let mut stored = self.records.lock();
        for record in records {
            stored.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn query(&self, request: &QueryRequest) -> VectorResult<Vec<QueryMatch>> {
        self.record_call(IndexCall::Query(request.filter.clone()));
        if let Some(err) = self.failures.lock().query.take() {
            return Err(err);
        }
        let clauses = match &request.filter {
            Some(filter) => parse_equality_filter(filter).ok_or_else(|| VectorIndexError::Api {
                status: 400,
                message: format!("unsupported filter: {filter}"),
            })?,
            None => Vec::new(),
        };
        let terms: Vec<String> = request
            .data
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let stored = self.records.lock();
        let mut matches: Vec<QueryMatch> = stored
            .values()
            .filter(|r| matches_clauses(r, &clauses))
            .map(|r| QueryMatch {
                id: r.id.clone(),
                score: overlap_score(&terms, &r.data),
                metadata: request.include_metadata.then(|| r.metadata.clone()),
            })
            .collect();
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(request.top_k);
        Ok(matches)
    }

    async fn delete(&self, ids: &[String]) -> VectorResult<usize> {
        self.record_call(IndexCall::Delete(ids.len()));
        if let Some(err) = self.failures.lock().delete.take() {
            return Err(err);
        }
        let mut stored = self.records.lock();
        Ok(ids.iter().filter(|id| stored.remove(id.as_str()).is_some()).count())
    }

    /// Cursors are decimal offsets into the prefix-filtered id order.
    async fn range(&self, request: &RangeRequest) -> VectorResult<RangePage> {
        self.record_call(IndexCall::Range(request.prefix.clone()));
        if let Some(err) = self.failures.lock().range.take() {
            return Err(err);
        }
        let offset: usize = request.cursor.parse().map_err(|_| VectorIndexError::Api {
            status: 400,
            message: format!("invalid cursor '{}'", request.cursor),
        })?;
        let stored = self.records.lock();
        let matching: Vec<&String> = stored
            .keys()
            .filter(|id| request.prefix.as_deref().map_or(true, |p| id.starts_with(p)))
            .collect();
        let end = offset.saturating_add(request.limit).min(matching.len());
        let ids = matching
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|id| id.to_string())
            .collect();
        let next_cursor = (end < matching.len()).then(|| end.to_string());
        Ok(RangePage { ids, next_cursor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, repo: &str, data: &str) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            data: data.to_string(),
            metadata: json!({ "repoFullName": repo, "userId": "u1" }),
        }
    }

    #[tokio::test]
    async fn upsert_replaces_records_with_the_same_id() {
        let index = InMemoryVectorIndex::new();
        index.upsert(&[record("aa-1", "r", "old body")]).await.unwrap();
        index.upsert(&[record("aa-1", "r", "new body")]).await.unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("aa-1").unwrap().data, "new body");

        assert_eq!(index.delete(&["aa-1".into()]).await, Ok(1));
        assert!(index.get("aa-1").is_none());
    }

    #[tokio::test]
    async fn range_pages_through_a_prefix() {
        let index = InMemoryVectorIndex::new();
        let records: Vec<_> = (0..5).map(|i| record(&format!("aa-{i}"), "r", "x")).collect();
        index.upsert(&records).await.unwrap();
        index.upsert(&[record("bb-0", "r", "x")]).await.unwrap();

        let first = index
            .range(&RangeRequest {
                cursor: "0".into(),
                limit: 3,
                prefix: Some("aa-".into()),
            })
            .await
            .unwrap();
        assert_eq!(first.ids, vec!["aa-0", "aa-1", "aa-2"]);
        let second = index
            .range(&RangeRequest {
                cursor: first.next_cursor.unwrap(),
                limit: 3,
                prefix: Some("aa-".into()),
            })
            .await
            .unwrap();
        assert_eq!(second.ids, vec!["aa-3", "aa-4"]);
        assert_eq!(second.next_cursor, None);
    }

    #[tokio::test]
    async fn query_filters_and_ranks() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert(&[
                record("1", "acme/a", "parse the config file"),
                record("2", "acme/a", "render a button"),
                record("3", "acme/b", "parse the config file"),
            ])
            .await
            .unwrap();
        let matches = index
            .query(&QueryRequest {
                data: "parse config".into(),
                top_k: 10,
                filter: Some("repoFullName = 'acme/a'".into()),
                include_metadata: false,
            })
            .await
            .unwrap();
        let ids: Vec<_> = matches.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert!(matches[0].score > matches[1].score);
        assert!(matches[0].metadata.is_none());
    }

    #[tokio::test]
    async fn injected_failures_fire_once() {
        let index = InMemoryVectorIndex::new();
        index.fail_next_delete(VectorIndexError::EmptyIndex);
        assert_eq!(index.delete(&["x".into()]).await, Err(VectorIndexError::EmptyIndex));
        assert_eq!(index.delete(&["x".into()]).await, Ok(0));
    }
}
