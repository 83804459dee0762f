//! `rindex` binary runs against a scratch config with the memory vector index.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_content = format!(
        r#"
[db]
path = "{}/data/rindex.sqlite"

[vector]
provider = "memory"
"#,
        root.display()
    );

    let config_path = config_dir.join("rindex.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_rindex(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_rindex"))
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("UPSTASH_VECTOR_REST_URL")
        .env_remove("UPSTASH_VECTOR_REST_TOKEN")
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run rindex");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn init_is_idempotent() {
    let (tmp, config) = setup_test_env();
    let (stdout, _, ok) = run_rindex(&config, &["init"]);
    assert!(ok);
    assert!(stdout.contains("Database initialized"));
    assert!(tmp.path().join("data/rindex.sqlite").exists());

    let (_, _, ok) = run_rindex(&config, &["init"]);
    assert!(ok);
}

#[test]
fn status_is_empty_for_a_new_user() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, ok) = run_rindex(&config, &["status", "--user", "u1"]);
    assert!(ok);
    assert!(stdout.contains("No indexed repositories."));

    let (_, stderr, ok) = run_rindex(&config, &["status", "acme/app", "--user", "u1"]);
    assert!(!ok);
    assert!(stderr.contains("has not been indexed"));
}

#[test]
fn index_without_a_credential_records_the_failure() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, ok) = run_rindex(
        &config,
        &["index", "acme/app", "--user", "u1", "--progress", "off"],
    );
    assert!(!ok);
    assert!(stderr.contains("No GitHub credential"), "{stderr}");

    let (stdout, _, ok) = run_rindex(&config, &["status", "--user", "u1"]);
    assert!(ok);
    assert!(stdout.contains("acme/app"));
    assert!(stdout.contains("FAILED"));
    assert!(stdout.contains("No GitHub credential"));

    let (stdout, _, ok) = run_rindex(&config, &["delete", "acme/app", "--user", "u1"]);
    assert!(ok);
    assert!(stdout.contains("Deleted acme/app"));

    let (_, _, ok) = run_rindex(&config, &["delete", "acme/app", "--user", "u1"]);
    assert!(!ok);
}

#[test]
fn credential_set_succeeds() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, ok) = run_rindex(&config, &["credential", "set", "u1", "ghp_secret"]);
    assert!(ok);
    assert!(stdout.contains("Stored credential for u1."));
    assert!(!stdout.contains("ghp_secret"));
}

#[test]
fn search_rejects_empty_queries() {
    let (_tmp, config) = setup_test_env();
    let (_, _, ok) = run_rindex(&config, &["search", "  ", "--repo", "acme/app", "--user", "u1"]);
    assert!(!ok);

    let (stdout, _, ok) = run_rindex(
        &config,
        &["search", "parse config", "--repo", "acme/app", "--user", "u1"],
    );
    assert!(ok);
    assert!(stdout.contains("No results."));
}

#[test]
fn upstash_without_credentials_is_a_config_error() {
    let (tmp, _) = setup_test_env();
    let config = tmp.path().join("config/upstash.toml");
    fs::write(
        &config,
        "[db]\npath = \"x.sqlite\"\n\n[vector]\nprovider = \"upstash\"\n",
    )
    .unwrap();

    let (_, stderr, ok) = run_rindex(&config, &["status", "--user", "u1"]);
    assert!(!ok);
    assert!(stderr.contains("vector.url"), "{stderr}");
}
