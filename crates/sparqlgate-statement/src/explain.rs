//! Update-shape classification and effect summary
//!
//! Classification is a rule table evaluated top-down on the upper-cased,
//! newline-flattened statement. The first matching rule wins even when a
//! later rule's keywords are also present.

use crate::prefixes::{PrefixMap, CURIE};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Maximum number of predicates reported
pub const MAX_PREDICATES: usize = 20;

/// `<s> <p> `: predicate written as an IRI.
static PRED_IRI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[^>]+>\s+<([^>]+)>\s+").expect("valid regex"));

/// `<s> prefix:local ` or `?s prefix:local `: predicate as a short form.
static PRED_CURIE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?:<[^>]+>|[^\s;]+)\s+({CURIE})\s+")).expect("valid regex")
});

/// `; <p> `: continuation of a predicate list.
static PRED_IRI_SEMI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r";\s*<([^>]+)>\s+").expect("valid regex"));

/// `; prefix:local `: continuation written as a short form.
static PRED_CURIE_SEMI: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r";\s*({CURIE})\s+")).expect("valid regex"));

/// Shape of an update statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatementKind {
    /// `INSERT DATA { … }`
    #[serde(rename = "INSERT DATA")]
    InsertData,
    /// `DELETE DATA { … }`
    #[serde(rename = "DELETE DATA")]
    DeleteData,
    /// `DELETE { … } INSERT { … } WHERE { … }`
    #[serde(rename = "DELETE/INSERT/WHERE")]
    DeleteInsertWhere,
    /// `DELETE … WHERE …`
    #[serde(rename = "DELETE WHERE")]
    DeleteWhere,
    /// `INSERT … WHERE …`
    #[serde(rename = "INSERT WHERE")]
    InsertWhere,
    /// Anything else
    #[serde(rename = "UPDATE")]
    Update,
}

type Rule = (fn(&str) -> bool, StatementKind);

/// Ordered classification rules over the upper-cased statement
const RULES: &[Rule] = &[
    (|q: &str| q.contains("INSERT DATA"), StatementKind::InsertData),
    (|q: &str| q.contains("DELETE DATA"), StatementKind::DeleteData),
    (
        |q: &str| q.contains("DELETE") && q.contains("INSERT") && q.contains("WHERE"),
        StatementKind::DeleteInsertWhere,
    ),
    (|q: &str| q.contains("DELETE") && q.contains("WHERE"), StatementKind::DeleteWhere),
    (|q: &str| q.contains("INSERT") && q.contains("WHERE"), StatementKind::InsertWhere),
];

impl StatementKind {
    /// Classify a statement
    #[must_use]
    pub fn classify(statement: &str) -> Self {
        let flattened = statement.trim().to_uppercase().replace('\n', " ");
        RULES
            .iter()
            .find(|(matches, _)| matches(flattened.as_str()))
            .map_or(Self::Update, |(_, kind)| *kind)
    }

    /// Canonical label
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InsertData => "INSERT DATA",
            Self::DeleteData => "DELETE DATA",
            Self::DeleteInsertWhere => "DELETE/INSERT/WHERE",
            Self::DeleteWhere => "DELETE WHERE",
            Self::InsertWhere => "INSERT WHERE",
            Self::Update => "UPDATE",
        }
    }

    /// Fixed one-sentence description of the effect
    #[must_use]
    pub fn summary(self) -> &'static str {
        match self {
            Self::InsertData => "Inserts the listed triples into the dataset immediately.",
            Self::DeleteData => "Deletes the listed triples from the dataset immediately.",
            Self::DeleteInsertWhere => {
                "Replaces values: for every WHERE match the DELETE triples are removed and the INSERT triples added."
            }
            Self::DeleteWhere => "Deletes every triple matched by the WHERE pattern.",
            Self::InsertWhere => "Inserts triples for every resource matched by the WHERE pattern.",
            Self::Update => "SPARQL update detected; see the statement for its exact effect.",
        }
    }

    /// Whether the shape selects its targets through a WHERE pattern
    #[inline]
    #[must_use]
    pub fn is_pattern_based(self) -> bool {
        matches!(
            self,
            Self::DeleteInsertWhere | Self::DeleteWhere | Self::InsertWhere
        )
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an update statement will do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explanation {
    /// Classified shape
    pub kind: StatementKind,
    /// Fixed text for the shape
    pub summary: String,
    /// Touched predicates, sorted, at most [`MAX_PREDICATES`]
    pub predicates: Vec<String>,
    /// Number of lines in the trimmed statement
    pub line_count: usize,
}

/// Explain a statement
#[must_use]
pub fn explain(statement: &str) -> Explanation {
    let trimmed = statement.trim();
    let kind = StatementKind::classify(trimmed);
    let prefixes = PrefixMap::parse(trimmed);

    let mut predicates: BTreeSet<String> = PRED_IRI
        .captures_iter(trimmed)
        .chain(PRED_IRI_SEMI.captures_iter(trimmed))
        .map(|c| c[1].to_string())
        .collect();
    predicates.extend(
        PRED_CURIE
            .captures_iter(trimmed)
            .chain(PRED_CURIE_SEMI.captures_iter(trimmed))
            .filter_map(|c| prefixes.expand(&c[1])),
    );

    Explanation {
        kind,
        summary: kind.summary().to_string(),
        predicates: predicates.into_iter().take(MAX_PREDICATES).collect(),
        line_count: trimmed.lines().count(),
    }
}
