//! Mapping parsed entities to vector records.
//!
//! Chunk ids are deterministic so that re-indexing a repository upserts
//! over the previous records instead of duplicating them. Every id has
//! the shape `<namespace>-<entityhash>`:
//!
//! - `namespace` is the first 16 hex chars of SHA-256 over
//!   `(user_id, repo_full_name)`.
//! - `entityhash` is the first 32 hex chars of SHA-256 over
//!   `(user_id, repo_full_name, file_path, entity_name, entity_type)`.
//!
//! Fields are joined with the ASCII unit separator (`0x1f`), so that no
//! two distinct tuples hash the same input. All chunks of one
//! `(user, repo)` pair share the prefix returned by [`namespace_prefix`],
//! which the gateway uses for prefix deletion.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use crate::models::{ChunkMetadata, CodeChunk, EntityType, ParsedEntity};

const FIELD_SEPARATOR: u8 = 0x1f;
const NAMESPACE_HEX_LEN: usize = 16;
const ENTITY_HEX_LEN: usize = 32;

fn hash_fields(fields: &[&str], hex_len: usize) -> String {
    let mut hasher = Sha256::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            hasher.update([FIELD_SEPARATOR]);
        }
        hasher.update(field.as_bytes());
    }
    let digest = format!("{:x}", hasher.finalize());
    digest[..hex_len].to_string()
}

/// The id namespace shared by every chunk of `(user_id, repo_full_name)`.
pub fn repo_namespace(user_id: &str, repo_full_name: &str) -> String {
    hash_fields(&[user_id, repo_full_name], NAMESPACE_HEX_LEN)
}

/// The id prefix (namespace plus separator) used for prefix scans.
pub fn namespace_prefix(user_id: &str, repo_full_name: &str) -> String {
    format!("{}-", repo_namespace(user_id, repo_full_name))
}

/// Deterministic chunk id for one entity of one file.
pub fn chunk_id(
    user_id: &str,
    repo_full_name: &str,
    file_path: &str,
    entity_name: &str,
    entity_type: EntityType,
) -> String {
    let entity = hash_fields(
        &[
            user_id,
            repo_full_name,
            file_path,
            entity_name,
            entity_type.as_str(),
        ],
        ENTITY_HEX_LEN,
    );
    format!("{}{}", namespace_prefix(user_id, repo_full_name), entity)
}

/// Browser URL of a file on GitHub.
pub fn file_url(repo_full_name: &str, branch: &str, file_path: &str) -> String {
    format!("https://github.com/{repo_full_name}/blob/{branch}/{file_path}")
}

/// Repository coordinates shared by every chunk built in one run.
#[derive(Debug, Clone, Copy)]
pub struct ChunkContext<'a> {
    pub user_id: &'a str,
    pub repo_full_name: &'a str,
    pub branch: &'a str,
}

/// Build the chunks for one file's entities.
///
/// Entities that would collide on id (same name and type in the same
/// file, e.g. TypeScript overload signatures) keep only their first
/// occurrence.
pub fn build_chunks(
    ctx: &ChunkContext<'_>,
    file_path: &str,
    entities: Vec<ParsedEntity>,
) -> Vec<CodeChunk> {
    let file_name = file_path.rsplit('/').next().unwrap_or(file_path).to_string();
    let url = file_url(ctx.repo_full_name, ctx.branch, file_path);
    let mut seen = HashSet::new();
    let mut chunks = Vec::with_capacity(entities.len());

    for entity in entities {
        let id = chunk_id(
            ctx.user_id,
            ctx.repo_full_name,
            file_path,
            &entity.name,
            entity.entity_type,
        );
        if !seen.insert(id.clone()) {
            continue;
        }
        let data = embedding_text(file_path, &entity);
        chunks.push(CodeChunk {
            id,
            data,
            metadata: ChunkMetadata {
                repo_full_name: ctx.repo_full_name.to_string(),
                user_id: ctx.user_id.to_string(),
                file_path: file_path.to_string(),
                file_name: file_name.clone(),
                file_url: url.clone(),
                entity_type: entity.entity_type,
                entity_name: entity.name,
                start_line: entity.start_line,
                end_line: entity.end_line,
                content: entity.content,
                docstring: entity.docstring,
                imports: entity.imports,
                exported_symbols: entity.exported_symbols,
                parent_class: entity.parent_class,
                called_functions: entity.called_functions,
            },
        });
    }
    chunks
}

/// The text handed to the vector store for embedding.
fn embedding_text(file_path: &str, entity: &ParsedEntity) -> String {
    let mut text = format!(
        "File: {}\n{}: {}\n",
        file_path, entity.entity_type, entity.name
    );
    if let Some(parent) = &entity.parent_class {
        text.push_str(&format!("Class: {parent}\n"));
    }
    if let Some(doc) = &entity.docstring {
        text.push_str(doc);
        text.push('\n');
    }
    text.push('\n');
    text.push_str(&entity.content);
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_deterministic() {
        let a = chunk_id("u1", "acme/app", "src/a.ts", "greet", EntityType::Function);
        let b = chunk_id("u1", "acme/app", "src/a.ts", "greet", EntityType::Function);
        assert_eq!(a, b);
        assert_eq!(a.len(), NAMESPACE_HEX_LEN + 1 + ENTITY_HEX_LEN);
    }

    #[test]
    fn every_field_changes_the_id() {
        let base = chunk_id("u1", "acme/app", "src/a.ts", "greet", EntityType::Function);
        let variants = [
            chunk_id("u2", "acme/app", "src/a.ts", "greet", EntityType::Function),
            chunk_id("u1", "acme/other", "src/a.ts", "greet", EntityType::Function),
            chunk_id("u1", "acme/app", "src/b.ts", "greet", EntityType::Function),
            chunk_id("u1", "acme/app", "src/a.ts", "wave", EntityType::Function),
            chunk_id("u1", "acme/app", "src/a.ts", "greet", EntityType::Component),
        ];
        for v in variants {
            assert_ne!(base, v);
        }
    }

    #[test]
    fn separator_prevents_field_shifting() {
        let a = chunk_id("u1", "acme/app", "src/ab", "c", EntityType::File);
        let b = chunk_id("u1", "acme/app", "src/a", "bc", EntityType::File);
        assert_ne!(a, b);
    }

    #[test]
    fn ids_share_the_repo_prefix() {
        let prefix = namespace_prefix("u1", "acme/app");
        let id = chunk_id("u1", "acme/app", "x.py", "x.py", EntityType::File);
        assert!(id.starts_with(&prefix));
        assert!(!id.starts_with(&namespace_prefix("u2", "acme/app")));
    }

    #[test]
    fn builds_metadata_with_file_url() {
        let ctx = ChunkContext {
            user_id: "u1",
            repo_full_name: "acme/app",
            branch: "main",
        };
        let entity =
            ParsedEntity::new(EntityType::Function, "greet", 3, 5, "function greet() {}".into());
        let chunks = build_chunks(&ctx, "src/util/greet.ts", vec![entity.clone(), entity]);
        assert_eq!(chunks.len(), 1);
        let meta = &chunks[0].metadata;
        assert_eq!(meta.file_name, "greet.ts");
        assert_eq!(meta.file_url, "https://github.com/acme/app/blob/main/src/util/greet.ts");
        assert!(chunks[0].data.contains("function: greet"));

        let json = serde_json::to_value(meta).unwrap();
        assert_eq!(json["entityType"], "function");
        assert_eq!(json["startLine"], 3);
    }
}
