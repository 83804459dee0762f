//! Regex and block-counting extraction for source files.
//!
//! Every file yields a header `file` entity. Files of moderate length
//! also get a `<fileName>:full` entity. The JS/TS family and Python add
//! classes (with their direct methods) and top-level functions; the
//! component extensions add UI components.

use once_cell::sync::Lazy;
use regex::Regex;

use super::blocks::{
    body_indent, depths_from, find_brace_block_end, find_indent_block_end, indent_of,
    python_header_end,
};
use super::docstring::{docstring_before, python_body_docstring};
use super::symbols::{called_functions_of, extract_exports, extract_imports};
use super::{
    compile_regex, extension_of, file_name_of, is_component_extension, slice_lines,
    EntityExtractor, SourceKind, CLASS_BUDGET, FILE_HEADER_BUDGET, FULL_FILE_BUDGET,
    MEMBER_BUDGET,
};
use crate::models::{EntityType, ParsedEntity};
use crate::truncate::truncate_at_boundary;

const HEADER_LINES: usize = 50;
const FULL_FILE_MAX_LINES: usize = 150;
const COMPONENT_SPAN_LINES: usize = 50;

const METHOD_KEYWORDS: [&str; 12] = [
    "if",
    "for",
    "while",
    "switch",
    "catch",
    "return",
    "function",
    "new",
    "await",
    "typeof",
    "super",
    "constructor",
];

/// Handles every extension; the fallback of [`super::ExtractorRegistry`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicExtractor;

impl EntityExtractor for HeuristicExtractor {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn supports(&self, _extension: &str) -> bool {
        true
    }

    fn extract(&self, content: &str, file_path: &str) -> anyhow::Result<Vec<ParsedEntity>> {
        Ok(extract_file(content, file_path))
    }
}

/// File-wide imports and exports attached to the entities of one file.
#[derive(Debug, Clone, Default)]
pub(crate) struct FileSymbols {
    pub imports: Vec<String>,
    pub exports: Vec<String>,
}

impl FileSymbols {
    pub(crate) fn scan(content: &str, kind: SourceKind) -> Self {
        Self {
            imports: extract_imports(content, kind),
            exports: extract_exports(content, kind),
        }
    }
}

fn extract_file(content: &str, file_path: &str) -> Vec<ParsedEntity> {
    let ext = extension_of(file_path);
    let kind = SourceKind::from_extension(&ext);
    let lines: Vec<&str> = content.lines().collect();
    let symbols = FileSymbols::scan(content, kind);
    let file_name = file_name_of(file_path);

    let mut entities = vec![file_entity(
        file_name,
        &lines,
        HEADER_LINES,
        FILE_HEADER_BUDGET,
        &symbols,
    )];
    if lines.len() > HEADER_LINES && lines.len() <= FULL_FILE_MAX_LINES {
        entities.push(file_entity(
            &format!("{file_name}:full"),
            &lines,
            lines.len(),
            FULL_FILE_BUDGET,
            &symbols,
        ));
    }
    entities.extend(extract_structures(&lines, kind, &ext, &symbols));
    entities
}

fn file_entity(
    name: &str,
    lines: &[&str],
    max_lines: usize,
    budget: usize,
    symbols: &FileSymbols,
) -> ParsedEntity {
    let end = lines.len().min(max_lines);
    let content = truncate_at_boundary(&slice_lines(lines, 0, end.saturating_sub(1)), budget);
    let mut entity = ParsedEntity::new(EntityType::File, name, 1, end.max(1), content);
    entity.imports = symbols.imports.clone();
    entity.exported_symbols = symbols.exports.clone();
    entity
}

/// Classes, methods, functions and components of one source text.
pub(crate) fn extract_structures(
    lines: &[&str],
    kind: SourceKind,
    ext: &str,
    symbols: &FileSymbols,
) -> Vec<ParsedEntity> {
    let mut entities = Vec::new();
    match kind {
        SourceKind::Script => {
            entities.extend(script_classes(lines, symbols));
            entities.extend(script_functions(lines, symbols));
            if is_component_extension(ext) {
                entities.extend(script_components(lines, symbols));
            }
        }
        SourceKind::Python => {
            entities.extend(python_classes(lines, symbols));
            entities.extend(python_functions(lines, symbols));
        }
        SourceKind::Other => {}
    }
    entities
}

struct Span<'a> {
    entity_type: EntityType,
    name: String,
    start: usize,
    end: usize,
    budget: usize,
    docstring: Option<String>,
    parent_class: Option<String>,
    /// Name matched against the file exports, `None` for members.
    export_name: Option<&'a str>,
}

fn build(lines: &[&str], span: Span<'_>, symbols: &FileSymbols) -> ParsedEntity {
    let raw = slice_lines(lines, span.start, span.end);
    let own_name = span.name.rsplit('.').next().unwrap_or(&span.name).to_string();
    let called = called_functions_of(&raw, &own_name);
    let mut entity = ParsedEntity::new(
        span.entity_type,
        span.name,
        span.start + 1,
        span.end + 1,
        truncate_at_boundary(&raw, span.budget),
    );
    entity.imports = symbols.imports.clone();
    if let Some(name) = span.export_name {
        if symbols.exports.iter().any(|e| e == name) {
            entity.exported_symbols = vec![name.to_string()];
        }
    }
    entity.parent_class = span.parent_class;
    entity.called_functions = called;
    entity.docstring = span.docstring;
    entity
}

fn script_classes(lines: &[&str], symbols: &FileSymbols) -> Vec<ParsedEntity> {
    static CLASS: Lazy<Regex> = Lazy::new(|| {
        compile_regex(
            r"^\s*(?:export\s+)?(?:default\s+)?(?:declare\s+)?(?:abstract\s+)?class\s+([A-Za-z_$][\w$]*)(?:\s*<[^>{]*>)?(?:\s+extends\s+([A-Za-z_$][\w$.]*))?",
        )
    });

    let mut entities = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        let Some(caps) = CLASS.captures(line) else {
            continue;
        };
        let name = caps[1].to_string();
        let end = find_brace_block_end(lines, idx);
        entities.push(build(
            lines,
            Span {
                entity_type: EntityType::Class,
                name: name.clone(),
                start: idx,
                end,
                budget: CLASS_BUDGET,
                docstring: docstring_before(lines, idx),
                parent_class: caps.get(2).map(|m| m.as_str().to_string()),
                export_name: Some(&name),
            },
            symbols,
        ));
        entities.extend(script_methods(lines, &name, idx, end, symbols));
    }
    entities
}

/// Direct members of the class spanning `start..=end`: lines at brace
/// depth one that look like a method or an arrow-function property.
fn script_methods(
    lines: &[&str],
    class: &str,
    start: usize,
    end: usize,
    symbols: &FileSymbols,
) -> Vec<ParsedEntity> {
    static METHOD: Lazy<Regex> = Lazy::new(|| {
        compile_regex(
            r"^\s*(?:(?:public|private|protected|static|async|readonly|override|abstract|get|set)\s+)*\*?\s*(#?[A-Za-z_$][\w$]*)\s*(?:<[^>]*>)?\s*\(",
        )
    });
    static ARROW_PROPERTY: Lazy<Regex> = Lazy::new(|| {
        compile_regex(
            r"^\s*(?:(?:public|private|protected|static|readonly|override)\s+)*(#?[A-Za-z_$][\w$]*)\s*(?::[^=]+)?=\s*(?:async\s+)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*(?::[^=]+)?=>",
        )
    });

    let depths = depths_from(lines, start, end);
    let mut methods = Vec::new();
    let mut j = start + 1;
    while j <= end {
        if depths.get(j - start) != Some(&1) {
            j += 1;
            continue;
        }
        let line = lines[j];
        let (name, is_arrow) = if let Some(caps) = METHOD.captures(line) {
            (caps[1].to_string(), false)
        } else if let Some(caps) = ARROW_PROPERTY.captures(line) {
            (caps[1].to_string(), true)
        } else {
            j += 1;
            continue;
        };
        let method_end = find_brace_block_end(lines, j).min(end);
        let has_body = is_arrow || lines[j..=method_end].iter().any(|l| l.contains('{'));
        if METHOD_KEYWORDS.contains(&name.as_str()) || !has_body {
            j = method_end + 1;
            continue;
        }
        methods.push(build(
            lines,
            Span {
                entity_type: EntityType::Method,
                name: format!("{class}.{name}"),
                start: j,
                end: method_end,
                budget: MEMBER_BUDGET,
                docstring: docstring_before(lines, j),
                parent_class: Some(class.to_string()),
                export_name: None,
            },
            symbols,
        ));
        j = method_end + 1;
    }
    methods
}

fn script_functions(lines: &[&str], symbols: &FileSymbols) -> Vec<ParsedEntity> {
    static FUNCTION: Lazy<Regex> = Lazy::new(|| {
        compile_regex(
            r"^(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)\s*(?:<[^>]*>)?\s*\(",
        )
    });
    static ARROW: Lazy<Regex> = Lazy::new(|| {
        compile_regex(
            r"^(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*(?::[^=]*)?=\s*(?:async\s+)?(?:function\b|\([^)]*\)\s*(?::[^=]*)?=>|\([^)]*$|[A-Za-z_$][\w$]*\s*=>)",
        )
    });

    let mut entities = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        let Some(caps) = FUNCTION.captures(line).or_else(|| ARROW.captures(line)) else {
            continue;
        };
        let name = caps[1].to_string();
        entities.push(build(
            lines,
            Span {
                entity_type: EntityType::Function,
                name: name.clone(),
                start: idx,
                end: find_brace_block_end(lines, idx),
                budget: MEMBER_BUDGET,
                docstring: docstring_before(lines, idx),
                parent_class: None,
                export_name: Some(&name),
            },
            symbols,
        ));
    }
    entities
}

/// Upper-case top-level `const`/`function` whose body returns JSX in
/// parentheses. The entity spans fifty lines past the declaration.
fn script_components(lines: &[&str], symbols: &FileSymbols) -> Vec<ParsedEntity> {
    static COMPONENT: Lazy<Regex> = Lazy::new(|| {
        compile_regex(r"^(?:export\s+)?(?:default\s+)?(?:const|function)\s+([A-Z][\w$]*)")
    });

    let mut entities = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        let Some(caps) = COMPONENT.captures(line) else {
            continue;
        };
        let body = slice_lines(lines, idx, find_brace_block_end(lines, idx));
        if !body.contains("return (") {
            continue;
        }
        let name = caps[1].to_string();
        entities.push(build(
            lines,
            Span {
                entity_type: EntityType::Component,
                name: name.clone(),
                start: idx,
                end: (idx + COMPONENT_SPAN_LINES).min(lines.len() - 1),
                budget: MEMBER_BUDGET,
                docstring: docstring_before(lines, idx),
                parent_class: None,
                export_name: Some(&name),
            },
            symbols,
        ));
    }
    entities
}

fn python_docstring(lines: &[&str], idx: usize) -> Option<String> {
    docstring_before(lines, idx)
        .or_else(|| python_body_docstring(lines, python_header_end(lines, idx)))
}

fn python_classes(lines: &[&str], symbols: &FileSymbols) -> Vec<ParsedEntity> {
    static CLASS: Lazy<Regex> =
        Lazy::new(|| compile_regex(r"^\s*class\s+([A-Za-z_]\w*)\s*(?:\(([^)]*)\))?\s*:"));

    let mut entities = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        let Some(caps) = CLASS.captures(line) else {
            continue;
        };
        let name = caps[1].to_string();
        let parent = caps.get(2).and_then(|bases| {
            bases
                .as_str()
                .split(',')
                .map(str::trim)
                .find(|b| !b.is_empty() && !b.contains('='))
                .filter(|b| *b != "object")
                .map(str::to_string)
        });
        let end = find_indent_block_end(lines, idx);
        let top_level = indent_of(line) == 0;
        entities.push(build(
            lines,
            Span {
                entity_type: EntityType::Class,
                name: name.clone(),
                start: idx,
                end,
                budget: CLASS_BUDGET,
                docstring: python_docstring(lines, idx),
                parent_class: parent,
                export_name: top_level.then_some(name.as_str()),
            },
            symbols,
        ));
        entities.extend(python_methods(lines, &name, idx, end, symbols));
    }
    entities
}

fn python_methods(
    lines: &[&str],
    class: &str,
    start: usize,
    end: usize,
    symbols: &FileSymbols,
) -> Vec<ParsedEntity> {
    static DEF: Lazy<Regex> =
        Lazy::new(|| compile_regex(r"^\s*(?:async\s+)?def\s+([A-Za-z_]\w*)\s*\("));

    let Some(member_indent) = body_indent(lines, start, end) else {
        return Vec::new();
    };
    let first_body_line = python_header_end(lines, start) + 1;
    let mut methods = Vec::new();
    for j in first_body_line..=end.min(lines.len().saturating_sub(1)) {
        let line = lines[j];
        if indent_of(line) != member_indent {
            continue;
        }
        let Some(caps) = DEF.captures(line) else {
            continue;
        };
        methods.push(build(
            lines,
            Span {
                entity_type: EntityType::Method,
                name: format!("{class}.{}", &caps[1]),
                start: j,
                end: find_indent_block_end(lines, j),
                budget: MEMBER_BUDGET,
                docstring: python_docstring(lines, j),
                parent_class: Some(class.to_string()),
                export_name: None,
            },
            symbols,
        ));
    }
    methods
}

fn python_functions(lines: &[&str], symbols: &FileSymbols) -> Vec<ParsedEntity> {
    static DEF: Lazy<Regex> =
        Lazy::new(|| compile_regex(r"^(?:async\s+)?def\s+([A-Za-z_]\w*)\s*\("));

    let mut entities = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        let Some(caps) = DEF.captures(line) else {
            continue;
        };
        let name = caps[1].to_string();
        entities.push(build(
            lines,
            Span {
                entity_type: EntityType::Function,
                name: name.clone(),
                start: idx,
                end: find_indent_block_end(lines, idx),
                budget: MEMBER_BUDGET,
                docstring: python_docstring(lines, idx),
                parent_class: None,
                export_name: Some(&name),
            },
            symbols,
        ));
    }
    entities
}
