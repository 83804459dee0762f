//! Jupyter notebook (`.ipynb`) extraction.
//!
//! A notebook yields an overview `file` entity, one `function` entity per
//! non-empty code cell (`cell_N`, N counting every cell from 1), and the
//! classes and functions found inside each code cell, named
//! `cell_N::<name>`. Line numbers are positions in the notebook's source
//! once all cells are concatenated in order.

use serde::Deserialize;
use tracing::warn;

use super::docstring::MAX_DOCSTRING_CHARS;
use super::heuristic::{extract_structures, FileSymbols};
use super::symbols::extract_called_functions;
use super::{
    file_name_of, EntityExtractor, SourceKind, NOTEBOOK_CELL_BUDGET, NOTEBOOK_OVERVIEW_BUDGET,
};
use crate::models::{EntityType, ParsedEntity};
use crate::truncate::truncate_at_boundary;

const PREVIEW_LINES: usize = 3;
const DEFAULT_KERNEL_LANGUAGE: &str = "python";

#[derive(Debug, Clone, Copy, Default)]
pub struct NotebookExtractor;

impl EntityExtractor for NotebookExtractor {
    fn name(&self) -> &'static str {
        "notebook"
    }

    fn supports(&self, extension: &str) -> bool {
        extension == "ipynb"
    }

    fn extract(&self, content: &str, file_path: &str) -> anyhow::Result<Vec<ParsedEntity>> {
        match serde_json::from_str::<Notebook>(content) {
            Ok(notebook) => Ok(extract_notebook(&notebook, file_path)),
            Err(err) => {
                warn!(file = file_path, error = %err, "skipping malformed notebook");
                Ok(Vec::new())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct Notebook {
    #[serde(default)]
    cells: Vec<Cell>,
    #[serde(default)]
    metadata: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct Cell {
    cell_type: String,
    #[serde(default)]
    source: CellSource,
}

/// nbformat stores cell source either as one string or as a list of lines.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CellSource {
    Text(String),
    Lines(Vec<String>),
}

impl Default for CellSource {
    fn default() -> Self {
        CellSource::Text(String::new())
    }
}

impl CellSource {
    fn text(&self) -> String {
        match self {
            CellSource::Text(s) => s.clone(),
            CellSource::Lines(lines) => lines.concat(),
        }
    }
}

impl Notebook {
    fn language(&self) -> &str {
        self.metadata
            .pointer("/kernelspec/language")
            .or_else(|| self.metadata.pointer("/language_info/name"))
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_KERNEL_LANGUAGE)
    }
}

fn extract_notebook(notebook: &Notebook, file_path: &str) -> Vec<ParsedEntity> {
    let kind = SourceKind::from_language(notebook.language());
    let cells: Vec<(&str, String)> = notebook
        .cells
        .iter()
        .map(|c| (c.cell_type.as_str(), c.source.text()))
        .collect();

    let code: String = cells
        .iter()
        .filter(|(ty, _)| *ty == "code")
        .map(|(_, text)| text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let notebook_symbols = FileSymbols::scan(&code, kind);

    let total_lines: usize = cells.iter().map(|(_, text)| text.lines().count()).sum();
    let mut entities = vec![overview(file_path, &cells, total_lines, &notebook_symbols)];

    let mut offset = 0;
    for (idx, (cell_type, text)) in cells.iter().enumerate() {
        let line_count = text.lines().count();
        if *cell_type == "code" && !text.trim().is_empty() {
            let cell_name = format!("cell_{}", idx + 1);
            let cell_symbols = FileSymbols::scan(text, kind);

            let mut cell = ParsedEntity::new(
                EntityType::Function,
                cell_name.clone(),
                offset + 1,
                offset + line_count.max(1),
                truncate_at_boundary(text, NOTEBOOK_CELL_BUDGET),
            );
            cell.imports = cell_symbols.imports.clone();
            cell.called_functions = extract_called_functions(text);
            cell.docstring = idx
                .checked_sub(1)
                .and_then(|prev| cells.get(prev))
                .filter(|(ty, _)| *ty == "markdown")
                .and_then(|(_, md)| markdown_docstring(md));
            entities.push(cell);

            let lines: Vec<&str> = text.lines().collect();
            for mut inner in extract_structures(&lines, kind, "py", &cell_symbols) {
                inner.name = format!("{cell_name}::{}", inner.name);
                inner.start_line += offset;
                inner.end_line += offset;
                entities.push(inner);
            }
        }
        offset += line_count;
    }
    entities
}

fn overview(
    file_path: &str,
    cells: &[(&str, String)],
    total_lines: usize,
    symbols: &FileSymbols,
) -> ParsedEntity {
    let file_name = file_name_of(file_path);
    let mut text = format!("# Notebook: {file_name}\n");

    let leading_markdown: Vec<&str> = cells
        .iter()
        .take_while(|(ty, _)| *ty != "code")
        .filter(|(ty, _)| *ty == "markdown")
        .map(|(_, md)| md.trim())
        .filter(|md| !md.is_empty())
        .collect();
    for md in &leading_markdown {
        text.push('\n');
        text.push_str(md);
        text.push('\n');
    }

    for (idx, (cell_type, source)) in cells.iter().enumerate() {
        if *cell_type != "code" || source.trim().is_empty() {
            continue;
        }
        let preview: Vec<&str> = source
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.trim().is_empty())
            .take(PREVIEW_LINES)
            .collect();
        text.push_str(&format!("\n[cell_{}]\n{}\n", idx + 1, preview.join("\n")));
    }

    let mut entity = ParsedEntity::new(
        EntityType::File,
        file_name,
        1,
        total_lines.max(1),
        truncate_at_boundary(&text, NOTEBOOK_OVERVIEW_BUDGET),
    );
    entity.imports = symbols.imports.clone();
    entity.exported_symbols = symbols.exports.clone();
    entity.docstring = leading_markdown.first().and_then(|md| markdown_docstring(md));
    entity
}

fn markdown_docstring(markdown: &str) -> Option<String> {
    let text = markdown.trim();
    if text.chars().count() <= 10 {
        return None;
    }
    Some(text.chars().take(MAX_DOCSTRING_CHARS).collect())
}
