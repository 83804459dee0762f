//! SQLite job and credential stores on a scratch database.

use chrono::Utc;
use sqlx::SqlitePool;
use tempfile::TempDir;

use repo_indexer::config::Config;
use repo_indexer::db;
use repo_indexer::migrate;
use repo_indexer::sqlite_store::{SqliteCredentialStore, SqliteJobStore};
use repo_indexer_core::models::{IndexStatus, JobUpdate};
use repo_indexer_core::store::{CredentialProvider, JobStore};

async fn scratch_pool() -> (TempDir, SqlitePool) {
    let tmp = TempDir::new().unwrap();
    let config = Config::minimal(tmp.path().join("data").join("rindex.sqlite"));
    let pool = db::connect(&config).await.unwrap();
    migrate::apply(&pool).await.unwrap();
    (tmp, pool)
}

const URL: &str = "https://github.com/acme/app";

#[tokio::test]
async fn migrations_are_idempotent() {
    let tmp = TempDir::new().unwrap();
    let config = Config::minimal(tmp.path().join("rindex.sqlite"));
    migrate::run_migrations(&config).await.unwrap();
    migrate::run_migrations(&config).await.unwrap();
    assert!(config.db.path.exists());
}

#[tokio::test]
async fn claim_is_exclusive_until_the_run_ends() {
    let (_tmp, pool) = scratch_pool().await;
    let store = SqliteJobStore::new(pool);
    let stale_before = Utc::now().timestamp() - 600;

    let claimed = store.claim("u1", "acme/app", URL, stale_before).await.unwrap().unwrap();
    assert_eq!(claimed.status, IndexStatus::Pending);
    assert_eq!(claimed.progress, 0);
    assert!(store.claim("u1", "acme/app", URL, stale_before).await.unwrap().is_none());

    // Other keys are unaffected
    assert!(store.claim("u2", "acme/app", URL, stale_before).await.unwrap().is_some());

    store
        .update("u1", "acme/app", JobUpdate::status(IndexStatus::Completed).with_progress(100))
        .await
        .unwrap();
    let reclaimed = store.claim("u1", "acme/app", URL, stale_before).await.unwrap().unwrap();
    assert_eq!(reclaimed.status, IndexStatus::Pending);
    assert_eq!(reclaimed.progress, 0);
}

#[tokio::test]
async fn stale_active_runs_can_be_reclaimed() {
    let (_tmp, pool) = scratch_pool().await;
    let store = SqliteJobStore::new(pool.clone());
    let now = Utc::now().timestamp();

    store.start_run("u1", "acme/app", URL).await.unwrap();
    assert!(store.claim("u1", "acme/app", URL, now - 600).await.unwrap().is_none());

    sqlx::query("UPDATE indexed_repositories SET updated_at = ?")
        .bind(now - 3600)
        .execute(&pool)
        .await
        .unwrap();
    assert!(store.claim("u1", "acme/app", URL, now - 600).await.unwrap().is_some());
}

#[tokio::test]
async fn updates_are_partial_and_runs_reset_the_record() {
    let (_tmp, pool) = scratch_pool().await;
    let store = SqliteJobStore::new(pool);

    store.start_run("u1", "acme/app", URL).await.unwrap();
    store
        .update(
            "u1",
            "acme/app",
            JobUpdate::progress(25)
                .with_branch("main")
                .with_total_files(40)
                .with_indexed_files(10),
        )
        .await
        .unwrap();
    store
        .update("u1", "acme/app", JobUpdate::failed("tarball request timed out"))
        .await
        .unwrap();

    let failed = store.get("u1", "acme/app").await.unwrap().unwrap();
    assert_eq!(failed.status, IndexStatus::Failed);
    assert_eq!(failed.progress, 25);
    assert_eq!(failed.branch, "main");
    assert_eq!((failed.total_files, failed.indexed_files), (40, 10));
    assert_eq!(failed.error_message.as_deref(), Some("tarball request timed out"));

    let restarted = store.start_run("u1", "acme/app", URL).await.unwrap();
    assert_eq!(restarted.status, IndexStatus::Cloning);
    assert_eq!(restarted.progress, 0);
    assert_eq!((restarted.total_files, restarted.indexed_files), (0, 0));
    assert!(restarted.error_message.is_none());
    assert_eq!(restarted.branch, "main");

    let at = Utc::now();
    store
        .update(
            "u1",
            "acme/app",
            JobUpdate::status(IndexStatus::Completed)
                .with_progress(100)
                .with_last_indexed_at(at),
        )
        .await
        .unwrap();
    let done = store.get("u1", "acme/app").await.unwrap().unwrap();
    assert_eq!(
        done.last_indexed_at.map(|t| t.timestamp()),
        Some(at.timestamp())
    );
}

#[tokio::test]
async fn update_requires_an_existing_record() {
    let (_tmp, pool) = scratch_pool().await;
    let store = SqliteJobStore::new(pool);
    assert!(store
        .update("u1", "acme/app", JobUpdate::progress(10))
        .await
        .is_err());
}

#[tokio::test]
async fn list_is_per_user_and_ordered() {
    let (_tmp, pool) = scratch_pool().await;
    let store = SqliteJobStore::new(pool);
    for repo in ["acme/zeta", "acme/alpha", "acme/mid"] {
        store.start_run("u1", repo, URL).await.unwrap();
    }
    store.start_run("u2", "other/repo", URL).await.unwrap();

    let names: Vec<String> = store
        .list("u1")
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.repo_full_name)
        .collect();
    assert_eq!(names, vec!["acme/alpha", "acme/mid", "acme/zeta"]);

    assert!(store.delete("u1", "acme/mid").await.unwrap());
    assert!(!store.delete("u1", "acme/mid").await.unwrap());
    assert_eq!(store.list("u1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn credentials_round_trip() {
    let (_tmp, pool) = scratch_pool().await;
    let creds = SqliteCredentialStore::new(pool);
    assert_eq!(creds.get_user_credential("u1").await.unwrap(), None);

    creds.set_credential("u1", "ghp_one").await.unwrap();
    creds.set_credential("u1", "ghp_two").await.unwrap();
    assert_eq!(
        creds.get_user_credential("u1").await.unwrap().as_deref(),
        Some("ghp_two")
    );
}
