//! Heuristic structural entity extraction.
//!
//! Turns raw file text into [`ParsedEntity`] values without a compiler
//! front-end. Extraction is pure and deterministic: the same `(content,
//! path)` always yields the same entities in the same order.
//!
//! Dispatch goes through an [`ExtractorRegistry`]. Registered extractors
//! are consulted newest first by file extension; anything unclaimed falls
//! through to the [`HeuristicExtractor`], which handles every language
//! (with class/function/component detection for the JS/TS family and
//! Python, and a file-level entity for everything).
//!
//! # Example
//!
//! ```rust
//! use repo_indexer_core::extract::parse;
//! use repo_indexer_core::models::EntityType;
//!
//! let entities = parse("export function greet(name) {\n  return hi(name);\n}\n", "src/greet.js").unwrap();
//! assert_eq!(entities[0].entity_type, EntityType::File);
//! assert!(entities.iter().any(|e| e.name == "greet" && e.entity_type == EntityType::Function));
//! ```

mod blocks;
mod docstring;
pub mod heuristic;
pub mod notebook;
mod symbols;

use anyhow::Result;
use regex::Regex;

use crate::models::ParsedEntity;

pub use heuristic::HeuristicExtractor;
pub use notebook::NotebookExtractor;

/// Budget of the header `file` entity.
pub const FILE_HEADER_BUDGET: usize = 2000;
/// Budget of the `<fileName>:full` entity.
pub const FULL_FILE_BUDGET: usize = 4000;
pub const CLASS_BUDGET: usize = 2500;
/// Budget shared by methods, functions and components.
pub const MEMBER_BUDGET: usize = 1500;
pub const NOTEBOOK_OVERVIEW_BUDGET: usize = 3000;
pub const NOTEBOOK_CELL_BUDGET: usize = 2000;

/// Extracts entities from files of the extensions it supports.
pub trait EntityExtractor: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// `extension` is lower-case, without the leading dot.
    fn supports(&self, extension: &str) -> bool;

    fn extract(&self, content: &str, file_path: &str) -> Result<Vec<ParsedEntity>>;
}

/// Extension-keyed set of extractors with a heuristic fallback.
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn EntityExtractor>>,
    fallback: HeuristicExtractor,
}

impl ExtractorRegistry {
    /// A registry with only the heuristic fallback.
    pub fn empty() -> Self {
        Self {
            extractors: Vec::new(),
            fallback: HeuristicExtractor,
        }
    }

    /// The built-in registry: notebooks plus the heuristic fallback.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(NotebookExtractor));
        registry
    }

    /// Add an extractor. Later registrations take precedence.
    pub fn register(&mut self, extractor: Box<dyn EntityExtractor>) {
        self.extractors.push(extractor);
    }

    pub fn parse(&self, content: &str, file_path: &str) -> Result<Vec<ParsedEntity>> {
        let ext = extension_of(file_path);
        match self.extractors.iter().rev().find(|e| e.supports(&ext)) {
            Some(extractor) => extractor.extract(content, file_path),
            None => self.fallback.extract(content, file_path),
        }
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse one file with the built-in registry.
pub fn parse(content: &str, file_path: &str) -> Result<Vec<ParsedEntity>> {
    ExtractorRegistry::new().parse(content, file_path)
}

/// Language family that selects the structural heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// js, jsx, ts, tsx, mjs, cjs, vue, svelte
    Script,
    Python,
    Other,
}

impl SourceKind {
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "js" | "jsx" | "ts" | "tsx" | "mjs" | "cjs" | "vue" | "svelte" => SourceKind::Script,
            "py" => SourceKind::Python,
            _ => SourceKind::Other,
        }
    }

    /// Map a notebook kernel language name.
    pub fn from_language(language: &str) -> Self {
        match language.to_ascii_lowercase().as_str() {
            "python" | "python3" => SourceKind::Python,
            "javascript" | "typescript" => SourceKind::Script,
            _ => SourceKind::Other,
        }
    }
}

/// Lower-case extension of `path`, empty when there is none.
pub fn extension_of(path: &str) -> String {
    let name = file_name_of(path);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => String::new(),
    }
}

/// Last path component of a `/`-separated path.
pub fn file_name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

pub(crate) fn is_component_extension(ext: &str) -> bool {
    matches!(ext, "tsx" | "jsx" | "vue" | "svelte")
}

/// Join lines `start..=end` (0-based) back into text.
pub(crate) fn slice_lines(lines: &[&str], start: usize, end: usize) -> String {
    if lines.is_empty() || start >= lines.len() {
        return String::new();
    }
    let end = end.min(lines.len() - 1);
    lines[start..=end].join("\n")
}

pub(crate) fn compile_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| panic!("invalid regex literal {pattern}: {err}"))
}
