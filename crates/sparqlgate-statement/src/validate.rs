//! Advisory validation against the schema allow-list
//!
//! Validation never blocks a statement. Every finding is reported as a
//! warning; `errors` stays empty and `ok` stays true so callers can surface
//! the warnings without treating them as a gate.

use crate::prefixes::{PrefixMap, CURIE};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

static CLASS_IRI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:\ba\s+|rdf:type\s+)<([^>]+)>").expect("valid regex")
});

static CLASS_CURIE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)(?:\ba\s+|rdf:type\s+)({CURIE})")).expect("valid regex")
});

static ANY_IRI: Lazy<Regex> = Lazy::new(|| Regex::new(r"<([^>]+)>").expect("valid regex"));

static ANY_CURIE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("({CURIE})")).expect("valid regex"));

/// Keywords whose absence earns the structural warning.
const STATEMENT_KEYWORDS: [&str; 6] = ["INSERT", "DELETE", "WHERE", "UPDATE", "SELECT", "ASK"];

/// Kind of a schema term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TermKind {
    /// An `rdfs:Class` or `owl:Class`
    Class,
    /// An `rdf:Property`, `owl:ObjectProperty` or `owl:DatatypeProperty`
    Property,
}

/// One snapshot of the store's known classes and properties
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermSnapshot {
    /// Known class IRIs
    pub classes: BTreeSet<String>,
    /// Known property IRIs
    pub properties: BTreeSet<String>,
}

impl TermSnapshot {
    /// Build a snapshot from class and property identifiers
    pub fn new<C, P>(classes: C, properties: P) -> Self
    where
        C: IntoIterator<Item = String>,
        P: IntoIterator<Item = String>,
    {
        Self {
            classes: classes.into_iter().collect(),
            properties: properties.into_iter().collect(),
        }
    }

    /// Whether the identifier is known under the given kind
    #[must_use]
    pub fn contains(&self, kind: TermKind, iri: &str) -> bool {
        match kind {
            TermKind::Class => self.classes.contains(iri),
            TermKind::Property => self.properties.contains(iri),
        }
    }

    /// True when neither set holds anything
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.properties.is_empty()
    }
}

/// Outcome of validating one statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Always true; validation is advisory
    pub ok: bool,
    /// Always empty; kept for the wire contract
    pub errors: Vec<String>,
    /// Human-readable findings in a stable order
    pub warnings: Vec<String>,
    /// Class IRIs referenced through `a`/`rdf:type`
    pub used_classes: BTreeSet<String>,
    /// Every other referenced IRI
    pub used_properties: BTreeSet<String>,
}

impl ValidationResult {
    /// True when there is something worth showing the caller
    #[inline]
    #[must_use]
    pub fn has_findings(&self) -> bool {
        !self.errors.is_empty() || !self.warnings.is_empty()
    }
}

/// Identifiers a statement refers to, split into classes and properties
#[must_use]
pub fn extract_used_terms(statement: &str) -> (BTreeSet<String>, BTreeSet<String>) {
    let prefixes = PrefixMap::parse(statement);

    let mut classes: BTreeSet<String> = CLASS_IRI
        .captures_iter(statement)
        .map(|c| c[1].to_string())
        .collect();
    classes.extend(
        CLASS_CURIE
            .captures_iter(statement)
            .filter_map(|c| prefixes.expand(&c[1])),
    );

    let mut referenced: BTreeSet<String> = ANY_IRI
        .captures_iter(statement)
        .map(|c| c[1].to_string())
        .collect();
    referenced.extend(
        ANY_CURIE
            .captures_iter(statement)
            .filter_map(|c| prefixes.expand(&c[1])),
    );
    for namespace in prefixes.namespaces() {
        referenced.remove(namespace);
    }

    let properties = referenced
        .into_iter()
        .filter(|iri| !classes.contains(iri) && iri.starts_with("http"))
        .collect();
    classes.retain(|iri| iri.starts_with("http"));

    (classes, properties)
}

/// Check a statement against a term snapshot
///
/// Unknown classes are reported before unknown properties, each group in
/// lexical order, followed by at most one structural warning.
#[must_use]
pub fn check(statement: &str, terms: &TermSnapshot) -> ValidationResult {
    let (used_classes, used_properties) = extract_used_terms(statement);

    let mut warnings: Vec<String> = used_classes
        .iter()
        .filter(|c| !terms.contains(TermKind::Class, c))
        .map(|c| format!("Unknown class: <{c}>"))
        .collect();
    warnings.extend(
        used_properties
            .iter()
            .filter(|p| !terms.contains(TermKind::Property, p))
            .map(|p| format!("Unknown property: <{p}>")),
    );

    let upper = statement.to_uppercase();
    if !STATEMENT_KEYWORDS.iter().any(|k| upper.contains(k)) {
        warnings.push("Statement contains no recognisable SPARQL update or query keywords.".to_string());
    }

    ValidationResult {
        ok: true,
        errors: Vec::new(),
        warnings,
        used_classes,
        used_properties,
    }
}
