//! Block extent detection: brace counting for C-like syntax and
//! indentation for Python.

/// Net brace events on one line, ignoring string literals and `//`
/// comments. Returns `(opens, closes)`.
pub(crate) fn brace_counts(line: &str) -> (usize, usize) {
    let mut opens = 0;
    let mut closes = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut prev = '\0';

    for c in line.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            prev = c;
            continue;
        }
        match c {
            '"' | '\'' | '`' => quote = Some(c),
            '/' if prev == '/' => break,
            '{' => opens += 1,
            '}' => closes += 1,
            _ => {}
        }
        prev = c;
    }
    (opens, closes)
}

/// Brace depth before each line, counted from `start`.
pub(crate) fn depths_from(lines: &[&str], start: usize, end: usize) -> Vec<i64> {
    let mut depth: i64 = 0;
    let mut out = Vec::with_capacity(end.saturating_sub(start) + 1);
    for line in lines.iter().take(end + 1).skip(start) {
        out.push(depth);
        let (opens, closes) = brace_counts(line);
        depth += opens as i64 - closes as i64;
    }
    out
}

/// Index of the last line of the brace block starting at `start`.
///
/// The block ends on the first line after which the depth returns to zero
/// once a brace has been opened. A line ending in `;` before any brace
/// has opened ends the statement there.
pub(crate) fn find_brace_block_end(lines: &[&str], start: usize) -> usize {
    let mut depth: i64 = 0;
    let mut opened = false;
    for (i, line) in lines.iter().enumerate().skip(start) {
        let (opens, closes) = brace_counts(line);
        if opens > 0 {
            opened = true;
        }
        depth += opens as i64 - closes as i64;
        if opened && depth <= 0 {
            return i;
        }
        if !opened && line.trim_end().ends_with(';') {
            return i;
        }
    }
    lines.len().saturating_sub(1).max(start)
}

/// Leading whitespace width, tabs counted as four columns.
pub(crate) fn indent_of(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

/// Index of the line closing a Python `def`/`class` header that may span
/// several lines through open parentheses.
pub(crate) fn python_header_end(lines: &[&str], start: usize) -> usize {
    let mut parens: i64 = 0;
    for (i, line) in lines.iter().enumerate().skip(start) {
        for c in line.chars() {
            match c {
                '(' | '[' => parens += 1,
                ')' | ']' => parens -= 1,
                _ => {}
            }
        }
        if parens <= 0 {
            return i;
        }
    }
    lines.len().saturating_sub(1).max(start)
}

/// Index of the last line of the indented block headed at `start`.
///
/// Blank lines and comment-only lines neither extend nor end the block.
pub(crate) fn find_indent_block_end(lines: &[&str], start: usize) -> usize {
    let base = lines.get(start).map(|l| indent_of(l)).unwrap_or(0);
    let header_end = python_header_end(lines, start);
    let mut end = header_end;
    for (i, line) in lines.iter().enumerate().skip(header_end + 1) {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if indent_of(line) <= base {
            break;
        }
        end = i;
    }
    end
}

/// Indentation of the first statement inside the block headed at `start`.
pub(crate) fn body_indent(lines: &[&str], start: usize, end: usize) -> Option<usize> {
    let header_end = python_header_end(lines, start);
    lines
        .iter()
        .take(end + 1)
        .skip(header_end + 1)
        .find(|l| {
            let t = l.trim();
            !t.is_empty() && !t.starts_with('#')
        })
        .map(|l| indent_of(l))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn braces_inside_strings_are_ignored() {
        assert_eq!(brace_counts(r#"const s = "{"; {"#), (1, 0));
        assert_eq!(brace_counts("x = '}' // {"), (0, 0));
        assert_eq!(brace_counts(r#"a = "\"{" + `}`"#), (0, 0));
    }

    #[test]
    fn block_spans_destructured_parameters() {
        let lines = vec!["function Card({ title }) {", "  return title;", "}", "const x = 1;"];
        assert_eq!(find_brace_block_end(&lines, 0), 2);
    }

    #[test]
    fn semicolon_ends_braceless_statement() {
        let lines = vec!["const add = (a, b) =>", "  a + b;", "function g() {", "}"];
        assert_eq!(find_brace_block_end(&lines, 0), 1);
    }

    #[test]
    fn one_line_block() {
        let lines = vec!["function f() { return 1; }", "f();"];
        assert_eq!(find_brace_block_end(&lines, 0), 0);
    }

    #[test]
    fn unterminated_block_runs_to_end() {
        let lines = vec!["class A {", "  m() {", "  }"];
        assert_eq!(find_brace_block_end(&lines, 0), 2);
    }

    #[test]
    fn python_block_by_indentation() {
        let lines = vec![
            "def f(",
            "    a,",
            "):",
            "    x = a",
            "",
            "# note",
            "    return x",
            "y = 1",
        ];
        assert_eq!(find_indent_block_end(&lines, 0), 6);
        assert_eq!(body_indent(&lines, 0, 6), Some(4));
    }
}
