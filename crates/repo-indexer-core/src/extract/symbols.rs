//! Imports, exports and call-site scanning.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{compile_regex, SourceKind};

/// Maximum number of distinct call targets recorded per entity.
pub const MAX_CALLED_FUNCTIONS: usize = 50;

const CALL_STOPLIST: [&str; 7] = ["if", "for", "while", "switch", "catch", "function", "class"];

fn push_unique(out: &mut Vec<String>, seen: &mut HashSet<String>, value: &str) {
    let value = value.trim();
    if !value.is_empty() && seen.insert(value.to_string()) {
        out.push(value.to_string());
    }
}

/// Module specifiers imported by `content`, in first-seen order.
pub(crate) fn extract_imports(content: &str, kind: SourceKind) -> Vec<String> {
    static JS_IMPORT_FROM: Lazy<Regex> = Lazy::new(|| {
        compile_regex(r#"(?m)^\s*import\s+(?:type\s+)?[\w$*{}\s,]+?\s+from\s*['"]([^'"]+)['"]"#)
    });
    static JS_IMPORT_BARE: Lazy<Regex> =
        Lazy::new(|| compile_regex(r#"(?m)^\s*import\s*['"]([^'"]+)['"]"#));
    static JS_REEXPORT: Lazy<Regex> = Lazy::new(|| {
        compile_regex(
            r#"(?m)^\s*export\s+(?:type\s+)?(?:\*(?:\s+as\s+[\w$]+)?|\{[^}]*\})\s*from\s*['"]([^'"]+)['"]"#,
        )
    });
    static JS_REQUIRE: Lazy<Regex> =
        Lazy::new(|| compile_regex(r#"\brequire\(\s*['"]([^'"]+)['"]\s*\)"#));
    static JS_DYNAMIC: Lazy<Regex> =
        Lazy::new(|| compile_regex(r#"\bimport\(\s*['"]([^'"]+)['"]\s*\)"#));
    static PY_IMPORT: Lazy<Regex> = Lazy::new(|| compile_regex(r"(?m)^\s*import\s+([^\n#]+)"));
    static PY_FROM: Lazy<Regex> =
        Lazy::new(|| compile_regex(r"(?m)^\s*from\s+([\w.]+)\s+import\b"));

    let mut out = Vec::new();
    let mut seen = HashSet::new();
    match kind {
        SourceKind::Script => {
            for re in [
                &*JS_IMPORT_FROM,
                &*JS_IMPORT_BARE,
                &*JS_REEXPORT,
                &*JS_REQUIRE,
                &*JS_DYNAMIC,
            ] {
                for caps in re.captures_iter(content) {
                    push_unique(&mut out, &mut seen, &caps[1]);
                }
            }
        }
        SourceKind::Python => {
            for caps in PY_IMPORT.captures_iter(content) {
                for module in caps[1].split(',') {
                    if let Some(name) = module.split_whitespace().next() {
                        push_unique(&mut out, &mut seen, name);
                    }
                }
            }
            for caps in PY_FROM.captures_iter(content) {
                push_unique(&mut out, &mut seen, &caps[1]);
            }
        }
        SourceKind::Other => {}
    }
    out
}

/// Names exported from the module in `content`.
pub(crate) fn extract_exports(content: &str, kind: SourceKind) -> Vec<String> {
    static JS_EXPORT_DECL: Lazy<Regex> = Lazy::new(|| {
        compile_regex(
            r"(?m)^\s*export\s+(?:default\s+)?(?:declare\s+)?(?:abstract\s+)?(?:async\s+)?(?:function\s*\*?|class|const|let|var|interface|type|enum)\s+([A-Za-z_$][\w$]*)",
        )
    });
    static JS_EXPORT_LIST: Lazy<Regex> =
        Lazy::new(|| compile_regex(r"(?m)^\s*export\s+(?:type\s+)?\{([^}]*)\}"));
    static JS_EXPORT_DEFAULT_NAME: Lazy<Regex> =
        Lazy::new(|| compile_regex(r"(?m)^\s*export\s+default\s+([A-Za-z_$][\w$]*)\s*;?\s*$"));
    static PY_TOP_LEVEL: Lazy<Regex> =
        Lazy::new(|| compile_regex(r"(?m)^(?:async\s+def|def|class)\s+([A-Za-z]\w*)"));

    let mut out = Vec::new();
    let mut seen = HashSet::new();
    match kind {
        SourceKind::Script => {
            for caps in JS_EXPORT_DECL.captures_iter(content) {
                push_unique(&mut out, &mut seen, &caps[1]);
            }
            for caps in JS_EXPORT_LIST.captures_iter(content) {
                for item in caps[1].split(',') {
                    let item = item.trim().trim_start_matches("type ").trim();
                    let exported = match item.split_once(" as ") {
                        Some((_, alias)) => alias,
                        None => item,
                    };
                    push_unique(&mut out, &mut seen, exported);
                }
            }
            for caps in JS_EXPORT_DEFAULT_NAME.captures_iter(content) {
                push_unique(&mut out, &mut seen, &caps[1]);
            }
        }
        SourceKind::Python => {
            for caps in PY_TOP_LEVEL.captures_iter(content) {
                push_unique(&mut out, &mut seen, &caps[1]);
            }
        }
        SourceKind::Other => {}
    }
    out
}

/// Distinct `identifier(` call targets in first-occurrence order.
pub(crate) fn extract_called_functions(content: &str) -> Vec<String> {
    scan_calls(content, None)
}

/// Call targets of an entity body, dropping the entity's own name unless
/// it calls itself (the declaration line matches the call pattern too).
pub(crate) fn called_functions_of(content: &str, own_name: &str) -> Vec<String> {
    let own_calls = CALL
        .captures_iter(content)
        .filter(|caps| &caps[1] == own_name)
        .count();
    let skip = (own_calls <= 1).then_some(own_name);
    scan_calls(content, skip)
}

static CALL: Lazy<Regex> = Lazy::new(|| compile_regex(r"([A-Za-z_$][A-Za-z0-9_$]*)\s*\("));

fn scan_calls(content: &str, skip: Option<&str>) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for caps in CALL.captures_iter(content) {
        let name = &caps[1];
        if CALL_STOPLIST.contains(&name) || skip == Some(name) {
            continue;
        }
        push_unique(&mut out, &mut seen, name);
        if out.len() >= MAX_CALLED_FUNCTIONS {
            break;
        }
    }
    out
}
