//! Inverse statements for ground-data updates

use crate::prefixes::split_leading_prefixes;
use crate::syntax::matching_brace;
use once_cell::sync::Lazy;
use regex::Regex;

static DATA_HEAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(INSERT|DELETE)\s+DATA\s*\{").expect("valid regex"));

/// Whether the text performs a write
///
/// Any of `INSERT`, `DELETE` or `UPDATE` anywhere in the text counts.
#[must_use]
pub fn is_mutation(statement: &str) -> bool {
    let upper = statement.to_uppercase();
    ["INSERT", "DELETE", "UPDATE"]
        .iter()
        .any(|k| upper.contains(k))
}

/// Derive the statement that reverts `statement`
///
/// Only a body consisting of exactly one `INSERT DATA { … }` or
/// `DELETE DATA { … }` block is invertible. Leading prefix declarations are
/// carried over verbatim and the block body is kept byte for byte.
#[must_use]
pub fn derive_undo(statement: &str) -> Option<String> {
    let (prefixes, body) = split_leading_prefixes(statement);

    let head = DATA_HEAD.captures(body)?;
    let inverse = if head[1].eq_ignore_ascii_case("INSERT") {
        "DELETE"
    } else {
        "INSERT"
    };
    let open = head.get(0)?.end() - 1;
    let close = matching_brace(body, open)?;
    if !body[close + 1..].trim().is_empty() {
        return None;
    }
    let block = format!("{inverse} DATA {{{}}}", &body[open + 1..close]);

    if prefixes.is_empty() {
        Some(block)
    } else {
        Some(format!("{}\n{block}", prefixes.join("\n")))
    }
}
