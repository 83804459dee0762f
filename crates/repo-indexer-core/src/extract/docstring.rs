//! Docstring recovery from the comments around an entity declaration.

const LOOKBACK_LINES: usize = 15;
const BLOCK_LOOKBACK_LINES: usize = 20;
const BODY_LOOKAHEAD_LINES: usize = 20;
/// Texts this short or shorter carry no useful description.
const MIN_DOCSTRING_CHARS: usize = 10;
pub(crate) const MAX_DOCSTRING_CHARS: usize = 500;

const TRIPLE_QUOTES: [&str; 2] = ["\"\"\"", "'''"];

/// Docstring immediately preceding the declaration on line `start`.
///
/// Walks back at most 15 lines. Blank lines are skipped; `//`, `#`,
/// `/* */` and triple-quoted blocks are collected; any other line stops
/// the scan.
pub(crate) fn docstring_before(lines: &[&str], start: usize) -> Option<String> {
    let floor = start.saturating_sub(LOOKBACK_LINES);
    let mut collected: Vec<String> = Vec::new();
    let mut i = start.min(lines.len());

    while i > floor {
        i -= 1;
        let trimmed = lines[i].trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.ends_with("*/") {
            if let Some(block) = block_before(lines, i, i, |l| l.starts_with("/*")) {
                collected.extend(block.into_iter().rev());
            }
            break;
        }
        if let Some(quote) = TRIPLE_QUOTES.iter().find(|q| trimmed.ends_with(**q)) {
            let block = if trimmed.len() >= 6 && trimmed.starts_with(quote) {
                Some(vec![trimmed.to_string()])
            } else if i > 0 {
                block_before(lines, i, i - 1, |l| l.contains(quote))
            } else {
                None
            };
            if let Some(block) = block {
                collected.extend(block.into_iter().rev());
            }
            break;
        }
        if trimmed.starts_with("//") || (trimmed.starts_with('#') && !trimmed.starts_with("#!")) {
            collected.push(trimmed.to_string());
            continue;
        }
        break;
    }

    collected.reverse();
    finish(&collected)
}

/// Lines `opener..=end`, where `opener` is the closest line at or below
/// `first_candidate`, within the block lookback, satisfying `is_opener`.
fn block_before(
    lines: &[&str],
    end: usize,
    first_candidate: usize,
    is_opener: impl Fn(&str) -> bool,
) -> Option<Vec<String>> {
    let floor = end.saturating_sub(BLOCK_LOOKBACK_LINES);
    (floor..=first_candidate)
        .rev()
        .find(|&j| is_opener(lines[j].trim()))
        .map(|j| lines[j..=end].iter().map(|l| l.trim().to_string()).collect())
}

/// Leading triple-quoted string in a Python body whose header ends on
/// line `header_end`.
pub(crate) fn python_body_docstring(lines: &[&str], header_end: usize) -> Option<String> {
    let first = lines
        .iter()
        .enumerate()
        .skip(header_end + 1)
        .find(|(_, l)| !l.trim().is_empty())?;
    let (start, line) = first;
    let trimmed = line.trim();
    let quote = TRIPLE_QUOTES.iter().find(|q| trimmed.starts_with(**q))?;

    if trimmed.len() >= 6 && trimmed[3..].contains(quote) {
        return finish(&[trimmed.to_string()]);
    }
    let limit = (start + BODY_LOOKAHEAD_LINES).min(lines.len().saturating_sub(1));
    for j in start + 1..=limit {
        if lines[j].contains(quote) {
            let block: Vec<String> =
                lines[start..=j].iter().map(|l| l.trim().to_string()).collect();
            return finish(&block);
        }
    }
    None
}

/// Strip comment markers, join, apply the length rules.
fn finish(raw: &[String]) -> Option<String> {
    let cleaned: Vec<String> = raw
        .iter()
        .map(|l| clean_line(l))
        .filter(|l| !l.is_empty())
        .collect();
    let text = cleaned.join("\n").trim().to_string();
    if text.chars().count() <= MIN_DOCSTRING_CHARS {
        return None;
    }
    Some(text.chars().take(MAX_DOCSTRING_CHARS).collect())
}

fn clean_line(line: &str) -> String {
    let mut s = line.trim();
    for prefix in ["/**", "/*", "///", "//", "#", "\"\"\"", "'''"] {
        if let Some(rest) = s.strip_prefix(prefix) {
            s = rest;
            break;
        }
    }
    for suffix in ["*/", "\"\"\"", "'''"] {
        if let Some(rest) = s.strip_suffix(suffix) {
            s = rest;
            break;
        }
    }
    let s = s.trim();
    let s = s.strip_prefix('*').unwrap_or(s);
    s.trim().to_string()
}
