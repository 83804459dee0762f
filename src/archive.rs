//! In-memory ingestion of repository tarballs.
//!
//! GitHub tarballs wrap the tree in one top-level directory
//! (`owner-repo-<sha>/`), which is stripped from every path. Entries are
//! filtered on their path and declared size before their body is read;
//! rejected bodies are skipped by the tar reader when it advances.

use std::collections::BTreeMap;
use std::io::Read;

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::debug;

use crate::config::IndexingConfig;

/// Dependency trees, build output, VCS metadata, caches, lockfiles and
/// generated bundles.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "**/node_modules/**",
    "**/vendor/**",
    "**/bower_components/**",
    "**/.venv/**",
    "**/venv/**",
    "**/__pycache__/**",
    "**/dist/**",
    "**/build/**",
    "**/out/**",
    "**/.next/**",
    "**/.nuxt/**",
    "**/target/**",
    "**/coverage/**",
    "**/.git/**",
    "**/.svn/**",
    "**/.hg/**",
    "**/.cache/**",
    "**/.pytest_cache/**",
    "**/.mypy_cache/**",
    "**/.turbo/**",
    "**/package-lock.json",
    "**/yarn.lock",
    "**/pnpm-lock.yaml",
    "**/Cargo.lock",
    "**/poetry.lock",
    "**/composer.lock",
    "**/Gemfile.lock",
    "**/*.min.js",
    "**/*.min.css",
    "**/*.map",
    "**/*.bundle.js",
];

pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "js", "jsx", "ts", "tsx", "mjs", "cjs", "py", "ipynb", "java", "kt", "kts", "scala", "go",
    "rs", "rb", "php", "c", "h", "cc", "cpp", "hpp", "cs", "swift", "m", "vue", "svelte", "dart",
    "lua", "sh", "sql", "ex", "exs",
];

/// Path and size rules applied to archive entries.
#[derive(Debug, Clone)]
pub struct ArchiveFilter {
    exclude: GlobSet,
    max_file_bytes: u64,
}

impl ArchiveFilter {
    pub fn new(extra_excludes: &[String], max_file_bytes: u64) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in DEFAULT_EXCLUDES {
            builder.add(Glob::new(pattern)?);
        }
        for pattern in extra_excludes {
            builder.add(
                Glob::new(pattern).with_context(|| format!("Invalid exclude glob: '{}'", pattern))?,
            );
        }
        Ok(Self {
            exclude: builder.build()?,
            max_file_bytes,
        })
    }

    pub fn from_config(config: &IndexingConfig) -> Result<Self> {
        Self::new(&config.exclude_globs, config.max_file_bytes)
    }

    /// Whether a repository-relative path is indexable.
    pub fn accepts(&self, path: &str) -> bool {
        if self.exclude.is_match(path) {
            return false;
        }
        let file_name = path.rsplit('/').next().unwrap_or(path);
        match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                let ext = ext.to_ascii_lowercase();
                ALLOWED_EXTENSIONS.contains(&ext.as_str())
            }
            _ => false,
        }
    }
}

/// Decoded text files of one archive, keyed by repository-relative path.
#[derive(Debug, Default)]
pub struct ArchiveContents {
    pub files: BTreeMap<String, String>,
    pub skipped_filtered: usize,
    pub skipped_oversize: usize,
    pub skipped_binary: usize,
    pub skipped_undecodable: usize,
}

impl ArchiveContents {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Strip the archive's top-level directory. `None` for the directory
/// itself and for entries outside it.
fn strip_top_level(path: &str) -> Option<&str> {
    let (_, rest) = path.split_once('/')?;
    let rest = rest.trim_start_matches('/');
    (!rest.is_empty()).then_some(rest)
}

/// Decompress and untar a gzipped repository archive.
///
/// Per-entry problems (filtered paths, oversize, binary or non-UTF-8
/// content) skip the entry. A corrupt stream fails the whole call.
pub fn ingest_tarball<R: Read>(reader: R, filter: &ArchiveFilter) -> Result<ArchiveContents> {
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    let mut contents = ArchiveContents::default();

    for entry in archive.entries().context("Failed to read tarball")? {
        let mut entry = entry.context("Corrupt tarball entry")?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let raw_path = entry.path().context("Invalid path in tarball")?;
        let Some(path) = raw_path.to_str().and_then(strip_top_level).map(str::to_string) else {
            continue;
        };

        if !filter.accepts(&path) {
            contents.skipped_filtered += 1;
            continue;
        }
        if entry.size() > filter.max_file_bytes {
            debug!(path = %path, size = entry.size(), "skipping oversize file");
            contents.skipped_oversize += 1;
            continue;
        }

        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut bytes)
            .with_context(|| format!("Failed to read {} from tarball", path))?;

        if bytes.contains(&0) {
            contents.skipped_binary += 1;
            continue;
        }
        match String::from_utf8(bytes) {
            Ok(text) => {
                contents.files.insert(path, text);
            }
            Err(_) => {
                debug!(path = %path, "skipping file that is not valid UTF-8");
                contents.skipped_undecodable += 1;
            }
        }
    }

    Ok(contents)
}
