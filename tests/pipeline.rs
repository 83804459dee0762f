//! End-to-end runs of the indexing pipeline against in-memory doubles.

mod common;

use std::sync::atomic::Ordering;

use common::{tarball, Harness, REPO, USER};
use repo_indexer_core::chunk::namespace_prefix;
use repo_indexer_core::extract::{EntityExtractor, ExtractorRegistry};
use repo_indexer_core::models::{EntityType, IndexStatus, ParsedEntity};
use repo_indexer_core::store::memory::StaticCredentials;
use repo_indexer_core::store::JobStore;
use repo_indexer_core::vector::memory::IndexCall;
use repo_indexer_core::vector::VectorIndexError;

fn entity_names(h: &Harness, path: &str) -> Vec<(String, String)> {
    let mut names: Vec<(String, String)> = h
        .index
        .records_where("filePath", path)
        .into_iter()
        .map(|r| {
            (
                r.metadata["entityType"].as_str().unwrap().to_string(),
                r.metadata["entityName"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn indexes_functions_with_their_calls() {
    let h = Harness::new(tarball(&[(
        "src/a.ts",
        "export function foo() { return bar(); }\nfunction bar(){}\n",
    )]));

    let summary = h.indexer.index_repository(REPO, USER).await.unwrap();
    assert_eq!(summary.files, 1);
    assert_eq!(summary.chunks, 3);
    assert_eq!(summary.branch, "main");

    assert_eq!(
        entity_names(&h, "src/a.ts"),
        vec![
            ("file".to_string(), "a.ts".to_string()),
            ("function".to_string(), "bar".to_string()),
            ("function".to_string(), "foo".to_string()),
        ]
    );

    let foo = h
        .index
        .records_where("entityName", "foo")
        .pop()
        .unwrap();
    let calls: Vec<&str> = foo.metadata["calledFunctions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert!(calls.contains(&"bar"));
    assert_eq!(
        foo.metadata["fileUrl"],
        "https://github.com/acme/app/blob/main/src/a.ts"
    );
    assert!(foo.id.starts_with(&namespace_prefix(USER, REPO)));

    let record = h.jobs.get(USER, REPO).await.unwrap().unwrap();
    assert_eq!(record.status, IndexStatus::Completed);
    assert_eq!(record.progress, 100);
    assert_eq!((record.total_files, record.indexed_files), (1, 1));
    assert_eq!(record.branch, "main");
    assert_eq!(record.repo_url, "https://github.com/acme/app");
    assert!(record.last_indexed_at.is_some());
    assert!(record.error_message.is_none());
}

#[tokio::test]
async fn repository_without_indexable_files_completes_empty() {
    let h = Harness::new(tarball(&[
        ("README.md", "# app\n"),
        ("node_modules/x/index.js", "module.exports = 1;\n"),
    ]));

    let summary = h.indexer.index_repository(REPO, USER).await.unwrap();
    assert_eq!(summary.chunks, 0);

    let record = h.jobs.get(USER, REPO).await.unwrap().unwrap();
    assert_eq!(record.status, IndexStatus::Completed);
    assert_eq!((record.total_files, record.indexed_files), (0, 0));
    assert!(h.index.is_empty());
    assert!(!h
        .index
        .calls()
        .iter()
        .any(|c| matches!(c, IndexCall::Upsert(_))));
}

#[tokio::test]
async fn missing_credential_fails_before_parsing() {
    let h = Harness::with_credentials(
        tarball(&[("src/a.ts", "export const a = 1;\n")]),
        StaticCredentials::new(),
    );

    let err = h.indexer.index_repository(REPO, USER).await.unwrap_err();
    assert!(format!("{err:#}").contains("No GitHub credential"));

    let record = h.jobs.get(USER, REPO).await.unwrap().unwrap();
    assert_eq!(record.status, IndexStatus::Failed);
    assert!(!record.error_message.clone().unwrap_or_default().is_empty());
    assert!(h
        .jobs
        .history()
        .iter()
        .all(|u| u.status != Some(IndexStatus::Parsing)));
    assert_eq!(h.github.downloads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn reindex_drops_chunks_of_deleted_files() {
    let h = Harness::new(tarball(&[
        ("src/a.ts", "export function foo() { return 1; }\n"),
        ("src/old.py", "def legacy():\n    return 0\n"),
    ]));
    h.indexer.index_repository(REPO, USER).await.unwrap();
    assert!(!h.index.records_where("filePath", "src/old.py").is_empty());

    h.github
        .set_tarball(tarball(&[("src/a.ts", "export function foo() { return 2; }\n")]))
        .await;
    h.index.clear_calls();
    h.indexer.index_repository(REPO, USER).await.unwrap();

    assert!(h.index.records_where("filePath", "src/old.py").is_empty());
    assert!(!h.index.records_where("filePath", "src/a.ts").is_empty());

    let calls = h.index.calls();
    let first_delete = calls
        .iter()
        .position(|c| matches!(c, IndexCall::Range(_) | IndexCall::Delete(_)))
        .unwrap();
    let first_upsert = calls
        .iter()
        .position(|c| matches!(c, IndexCall::Upsert(_)))
        .unwrap();
    assert!(first_delete < first_upsert);
}

#[tokio::test]
async fn reindex_after_failure_clears_the_error() {
    let h = Harness::new(tarball(&[("src/a.ts", "export const a = 1;\n")]));
    h.github.fail_downloads("connection reset").await;
    h.indexer.index_repository(REPO, USER).await.unwrap_err();
    let failed = h.jobs.get(USER, REPO).await.unwrap().unwrap();
    assert_eq!(failed.status, IndexStatus::Failed);
    assert!(failed.error_message.unwrap().contains("connection reset"));

    h.github.restore_downloads().await;
    h.indexer.index_repository(REPO, USER).await.unwrap();
    let record = h.jobs.get(USER, REPO).await.unwrap().unwrap();
    assert_eq!(record.status, IndexStatus::Completed);
    assert!(record.error_message.is_none());
    assert_eq!(record.progress, 100);
}

#[tokio::test]
async fn statuses_advance_in_order_and_progress_never_drops() {
    let files: Vec<(String, String)> = (0..120)
        .map(|i| (format!("src/f{i:03}.py"), format!("def f{i}():\n    return {i}\n")))
        .collect();
    let refs: Vec<(&str, &str)> = files.iter().map(|(p, b)| (p.as_str(), b.as_str())).collect();
    let h = Harness::new(tarball(&refs));

    let summary = h.indexer.index_repository(REPO, USER).await.unwrap();
    assert_eq!(summary.files, 120);

    let history = h.jobs.history();
    let statuses: Vec<IndexStatus> = history.iter().filter_map(|u| u.status).collect();
    assert_eq!(
        statuses,
        vec![
            IndexStatus::Cloning,
            IndexStatus::Parsing,
            IndexStatus::Indexing,
            IndexStatus::Completed
        ]
    );

    let progress: Vec<u8> = history.iter().filter_map(|u| u.progress).collect();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{progress:?}");
    assert_eq!(progress.first(), Some(&0));
    assert_eq!(progress.last(), Some(&100));
    for checkpoint in [5, 15, 25, 80] {
        assert!(progress.contains(&checkpoint), "missing {checkpoint} in {progress:?}");
    }

    // 120 files: checkpoints after 50 and 100
    let indexed: Vec<u64> = history.iter().filter_map(|u| u.indexed_files).collect();
    assert_eq!(indexed, vec![50, 100, 120]);

    // 120 header + 120 function chunks, upserted in three batches
    let upserts: Vec<usize> = h
        .index
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            IndexCall::Upsert(n) => Some(n),
            _ => None,
        })
        .collect();
    assert_eq!(upserts, vec![100, 100, 40]);
}

#[tokio::test]
async fn upsert_failure_fails_the_run() {
    let h = Harness::new(tarball(&[("src/a.ts", "export const a = 1;\n")]));
    h.index.fail_next_upsert(VectorIndexError::Api {
        status: 400,
        message: "metadata too large".to_string(),
    });

    let err = h.indexer.index_repository(REPO, USER).await.unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("metadata too large"), "{message}");

    let record = h.jobs.get(USER, REPO).await.unwrap().unwrap();
    assert_eq!(record.status, IndexStatus::Failed);
    assert!(record.error_message.unwrap().contains("metadata too large"));
    assert!(record.last_indexed_at.is_none());
}

#[tokio::test]
async fn download_failure_fails_the_run() {
    let h = Harness::new(Vec::new());
    h.github.fail_downloads("tarball request timed out").await;

    h.indexer.index_repository(REPO, USER).await.unwrap_err();
    let record = h.jobs.get(USER, REPO).await.unwrap().unwrap();
    assert_eq!(record.status, IndexStatus::Failed);
    assert!(record
        .error_message
        .unwrap()
        .contains("tarball request timed out"));
    assert_eq!(record.branch, "main");
}

#[tokio::test]
async fn corrupt_tarball_fails_the_run() {
    let h = Harness::new(b"not a tarball".to_vec());
    h.indexer.index_repository(REPO, USER).await.unwrap_err();
    let record = h.jobs.get(USER, REPO).await.unwrap().unwrap();
    assert_eq!(record.status, IndexStatus::Failed);
    assert!(h
        .jobs
        .history()
        .iter()
        .any(|u| u.status == Some(IndexStatus::Parsing)));
    assert!(h
        .jobs
        .history()
        .iter()
        .all(|u| u.status != Some(IndexStatus::Indexing)));
}

#[tokio::test]
async fn malformed_repository_names_fail_the_run() {
    let h = Harness::new(Vec::new());
    h.indexer.index_repository("not-a-repo", USER).await.unwrap_err();
    let record = h.jobs.get(USER, "not-a-repo").await.unwrap().unwrap();
    assert_eq!(record.status, IndexStatus::Failed);
    assert!(record.error_message.unwrap().contains("owner/repo"));
}

#[tokio::test]
async fn notebooks_are_indexed_per_cell() {
    let notebook = r##"{
        "cells": [
            {"cell_type": "markdown", "source": ["# Analysis of the quarterly data\n"]},
            {"cell_type": "code", "source": ["import pandas as pd\n", "df = pd.read_csv('x.csv')\n"]},
            {"cell_type": "code", "source": "def summarize(frame):\n    return frame.describe()\n"}
        ],
        "metadata": {"kernelspec": {"language": "python"}}
    }"##;
    let h = Harness::new(tarball(&[("nb/analysis.ipynb", notebook)]));
    h.indexer.index_repository(REPO, USER).await.unwrap();

    let names = entity_names(&h, "nb/analysis.ipynb");
    assert!(names.contains(&("file".to_string(), "analysis.ipynb".to_string())));
    assert!(names.contains(&("function".to_string(), "cell_2".to_string())));
    assert!(names.contains(&("function".to_string(), "cell_3".to_string())));
    assert!(names.contains(&("function".to_string(), "cell_3::summarize".to_string())));
    assert!(names
        .iter()
        .all(|(t, _)| *t != EntityType::Class.as_str()));
}

struct BrokenGoExtractor;

impl EntityExtractor for BrokenGoExtractor {
    fn name(&self) -> &'static str {
        "broken-go"
    }

    fn supports(&self, extension: &str) -> bool {
        extension == "go"
    }

    fn extract(&self, _content: &str, file_path: &str) -> anyhow::Result<Vec<ParsedEntity>> {
        anyhow::bail!("unbalanced braces in {file_path}")
    }
}

#[tokio::test]
async fn unparseable_files_are_skipped_and_the_run_completes() {
    let mut h = Harness::new(tarball(&[
        ("cmd/main.go", "package main\n\nfunc main() {\n"),
        ("src/a.ts", "export function foo() { return 1; }\n"),
        ("src/b.py", "def bar():\n    return 2\n"),
    ]));
    let mut extractors = ExtractorRegistry::new();
    extractors.register(Box::new(BrokenGoExtractor));
    h.indexer = h.indexer.clone().with_extractors(extractors);

    let summary = h.indexer.index_repository(REPO, USER).await.unwrap();
    assert_eq!(summary.files, 3);
    assert_eq!(summary.failed_files, 1);

    assert!(h.index.records_where("filePath", "cmd/main.go").is_empty());
    assert!(!h.index.records_where("filePath", "src/a.ts").is_empty());
    assert!(!h.index.records_where("filePath", "src/b.py").is_empty());

    let record = h.jobs.get(USER, REPO).await.unwrap().unwrap();
    assert_eq!(record.status, IndexStatus::Completed);
    assert_eq!((record.total_files, record.indexed_files), (3, 3));
    assert!(record.error_message.is_none());
}
