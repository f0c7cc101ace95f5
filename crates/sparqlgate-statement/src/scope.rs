//! Confinement of updates to one named graph
//!
//! A request is split at its top-level `;` and every operation is scoped on
//! its own. Ground-data blocks get their body wrapped in `GRAPH <g> { … }`.
//! Pattern shapes get a `WITH <g>` clause in front of the operation. An
//! operation that already names a graph is left alone, so scoping is
//! idempotent. Keyword checks run on a copy with literals, IRIs and comments
//! blanked out, so words inside them never count.

use crate::explain::StatementKind;
use crate::syntax::{mask_opaque, matching_brace, operation_ranges};
use once_cell::sync::Lazy;
use regex::Regex;

static DATA_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:INSERT|DELETE)\s+DATA\s*\{").expect("valid regex"));

/// `GRAPH` followed by an IRI, a variable or a prefixed name.
static LEADING_GRAPH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*GRAPH(?:\s*<|\s+[?$]|\s+[A-Za-z_]?[\w\-.]*:)").expect("valid regex")
});

static DATASET_CLAUSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:^|[\s{};.])(?:WITH(?:\s*<|\s+[A-Za-z_]?[\w\-.]*:)|USING(?:\s*<|\s+NAMED\b|\s+[A-Za-z_]?[\w\-.]*:)|GRAPH(?:\s*<|\s+[?$]|\s+[A-Za-z_]?[\w\-.]*:))",
    )
    .expect("valid regex")
});

static FIRST_OPERATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|[\s;}])(DELETE|INSERT)(?:[\s{]|$)").expect("valid regex")
});

static DELETE_WHERE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^DELETE\s+WHERE\s*\{").expect("valid regex"));

/// Rewrites updates so they only touch one named graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphScoper {
    graph: String,
}

impl GraphScoper {
    /// Create a scoper for the given graph IRI (without angle brackets)
    pub fn new(graph: impl Into<String>) -> Self {
        Self {
            graph: graph.into(),
        }
    }

    /// The target graph IRI
    #[inline]
    #[must_use]
    pub fn graph(&self) -> &str {
        &self.graph
    }

    /// Return `update` confined to the target graph
    ///
    /// Operations other than ground data and pattern updates pass through
    /// unchanged, as does any operation whose braces do not balance.
    #[must_use]
    pub fn ensure_target_graph(&self, update: &str) -> String {
        let mut out = String::with_capacity(update.len() + self.graph.len() + 16);
        let mut cursor = 0;

        for range in operation_ranges(update) {
            out.push_str(&update[cursor..range.start]);
            out.push_str(&self.scope_operation(&update[range.clone()]));
            cursor = range.end;
        }
        out
    }

    fn scope_operation(&self, operation: &str) -> String {
        let masked = mask_opaque(operation);
        match StatementKind::classify(&masked) {
            StatementKind::InsertData | StatementKind::DeleteData => {
                self.scope_data_blocks(operation, &masked)
            }
            kind if kind.is_pattern_based() => self.scope_pattern_update(operation, &masked),
            _ => operation.to_string(),
        }
    }

    fn scope_data_blocks(&self, update: &str, masked: &str) -> String {
        let mut out = String::with_capacity(update.len() + self.graph.len() + 16);
        let mut cursor = 0;

        for m in DATA_OPEN.find_iter(masked) {
            if m.start() < cursor {
                continue;
            }
            let open = m.end() - 1;
            let Some(close) = matching_brace(update, open) else {
                break;
            };
            let body = &update[open + 1..close];

            out.push_str(&update[cursor..=open]);
            if LEADING_GRAPH.is_match(&masked[open + 1..close]) {
                out.push_str(body);
            } else {
                out.push_str(&format!(" GRAPH <{}> {{{body}}} ", self.graph));
            }
            cursor = close;
        }

        out.push_str(&update[cursor..]);
        out
    }

    fn scope_pattern_update(&self, update: &str, masked: &str) -> String {
        if DATASET_CLAUSE.is_match(masked) {
            return update.to_string();
        }
        let Some(op) = FIRST_OPERATION.captures(masked).and_then(|c| c.get(1)) else {
            return update.to_string();
        };
        let (head, operation) = update.split_at(op.start());
        let with = format!("WITH <{}>\n", self.graph);

        // WITH cannot precede the DELETE WHERE shorthand; spell out the template.
        if let Some(m) = DELETE_WHERE_OPEN.find(&masked[op.start()..]) {
            let open = m.end() - 1;
            if let Some(close) = matching_brace(operation, open) {
                let pattern = &operation[open + 1..close];
                return format!(
                    "{head}{with}DELETE {{{pattern}}}\nWHERE {{{pattern}}}{}",
                    &operation[close + 1..]
                );
            }
            return update.to_string();
        }

        format!("{head}{with}{operation}")
    }
}
