//! `rindex search`: scoped semantic search over one repository.

use anyhow::{bail, Result};

use crate::state::AppState;

pub async fn run_search(
    state: &AppState,
    query: &str,
    repo: &str,
    user_id: &str,
    top_k: usize,
) -> Result<()> {
    if query.trim().is_empty() {
        bail!("query must not be empty");
    }

    let hits = state.search(query, repo, user_id, top_k).await?;
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        let meta = &hit.metadata;
        println!(
            "{}. [{:.2}] {} {} ({}:{}-{})",
            i + 1,
            hit.score,
            meta.entity_type,
            meta.entity_name,
            meta.file_path,
            meta.start_line,
            meta.end_line
        );
        println!("    url: {}", meta.file_url);
        if let Some(doc) = &meta.docstring {
            println!("    doc: \"{}\"", excerpt(doc, 160));
        }
        println!("    excerpt: \"{}\"", excerpt(&meta.content, 240));
        println!("    id: {}", hit.id);
        println!();
    }
    Ok(())
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let mut cut: String = flat.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}
