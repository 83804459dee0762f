//! Metadata filter construction.
//!
//! Filters use the index's SQL-like syntax: `field = 'value'` clauses
//! joined by `AND`. Every value passes through [`escape_filter_value`], so
//! a repository or user name can never terminate its string literal.

/// Metadata field holding the repository full name.
pub const REPO_FIELD: &str = "repoFullName";
/// Metadata field holding the owning user id.
pub const USER_FIELD: &str = "userId";

/// Escape a value for a single-quoted filter literal.
///
/// Control characters are dropped, `\` becomes `\\` and `'` becomes `\'`.
pub fn escape_filter_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

fn eq_clause(field: &str, value: &str) -> String {
    format!("{field} = '{}'", escape_filter_value(value))
}

/// Filter matching the chunks of one repository owned by one user.
pub fn scope_filter(repo_full_name: &str, user_id: &str) -> String {
    format!(
        "{} AND {}",
        eq_clause(REPO_FIELD, repo_full_name),
        eq_clause(USER_FIELD, user_id)
    )
}

/// Parse a conjunction of equality clauses back into `(field, value)`
/// pairs. Returns `None` for anything outside that grammar.
pub(crate) fn parse_equality_filter(filter: &str) -> Option<Vec<(String, String)>> {
    let mut chars = filter.chars().peekable();
    let mut clauses = Vec::new();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let mut field = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_alphanumeric() || c == '_' || c == '.' {
                field.push(c);
                chars.next();
            } else {
                break;
            }
        }
        if field.is_empty() {
            return None;
        }
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        if chars.next() != Some('=') {
            return None;
        }
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        if chars.next() != Some('\'') {
            return None;
        }
        let mut value = String::new();
        loop {
            match chars.next()? {
                '\\' => value.push(chars.next()?),
                '\'' => break,
                c => value.push(c),
            }
        }
        clauses.push((field, value));

        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        if chars.peek().is_none() {
            return Some(clauses);
        }
        let keyword: String = chars.by_ref().take(3).collect();
        if !keyword.eq_ignore_ascii_case("and") {
            return None;
        }
    }
}
