//! Prefix declarations and short-form (CURIE) expansion
//!
//! Every analysis pass in this crate works on the same view of a statement:
//! the `PREFIX` declarations it makes and the absolute IRIs its short forms
//! expand to.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

/// `PREFIX name: <namespace>` anywhere in the text.
static PREFIX_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bPREFIX\s+([A-Za-z][\w\-]*):\s*<([^>]+)>").expect("valid regex")
});

/// A run of prefix declarations at the very start of a statement.
static LEADING_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(PREFIX\s+[A-Za-z][\w\-]*:\s*<[^>]*>)").expect("valid regex")
});

/// Pattern source for a short-form identifier such as `voc:vorname`.
pub(crate) const CURIE: &str = r"[A-Za-z][\w\-]*:[A-Za-z0-9_\-]+";

/// Mapping from declared prefix label to namespace IRI
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixMap {
    entries: BTreeMap<String, String>,
}

impl PrefixMap {
    /// Collect all `PREFIX` declarations of a statement
    ///
    /// Later declarations of the same label win.
    #[must_use]
    pub fn parse(statement: &str) -> Self {
        let entries = PREFIX_DECL
            .captures_iter(statement)
            .map(|c| (c[1].to_string(), c[2].to_string()))
            .collect();
        Self { entries }
    }

    /// Expand `prefix:local` into an absolute IRI
    ///
    /// Returns `None` when the text has no colon or the prefix was never
    /// declared.
    #[must_use]
    pub fn expand(&self, curie: &str) -> Option<String> {
        let (prefix, local) = curie.split_once(':')?;
        self.entries
            .get(prefix)
            .map(|namespace| format!("{namespace}{local}"))
    }

    /// Namespace IRIs that appear as declaration targets
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(String::as_str)
    }

    /// Number of declared prefixes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing was declared
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Split a statement into its leading prefix declarations and the rest
///
/// Each declaration is returned trimmed, in source order. Declarations that
/// appear after the first non-prefix token belong to the body.
#[must_use]
pub fn split_leading_prefixes(statement: &str) -> (Vec<String>, &str) {
    let mut declarations = Vec::new();
    let mut rest = statement;

    while let Some(caps) = LEADING_PREFIX.captures(rest) {
        declarations.push(caps[1].trim().to_string());
        let end = caps.get(0).map_or(0, |m| m.end());
        rest = &rest[end..];
    }

    (declarations, rest.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_declarations_on_separate_lines() {
        let q = "PREFIX voc:<http://example.org/voc#>\nPREFIX rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#>\nSELECT * WHERE { ?s ?p ?o }";
        let map = PrefixMap::parse(q);

        assert_eq!(map.len(), 2);
        assert_eq!(
            map.expand("voc:vorname").as_deref(),
            Some("http://example.org/voc#vorname")
        );
    }

    #[test]
    fn parses_declaration_sharing_a_line_with_the_body() {
        let map = PrefixMap::parse("PREFIX ex:<http://example.org/> INSERT DATA { <urn:a> ex:p 1 . }");
        assert_eq!(map.expand("ex:p").as_deref(), Some("http://example.org/p"));
    }

    #[test]
    fn unknown_prefix_does_not_expand() {
        let map = PrefixMap::parse("");
        assert!(map.is_empty());
        assert_eq!(map.expand("urn:test"), None);
        assert_eq!(map.expand("plain"), None);
    }

    #[test]
    fn splits_leading_prefixes_from_body() {
        let q = "PREFIX a:<http://a/>\n  PREFIX b: <http://b/>\n\nINSERT DATA { <urn:x> a:p b:o . }";
        let (prefixes, body) = split_leading_prefixes(q);

        assert_eq!(prefixes, vec!["PREFIX a:<http://a/>", "PREFIX b: <http://b/>"]);
        assert_eq!(body, "INSERT DATA { <urn:x> a:p b:o . }");
    }

    #[test]
    fn body_without_prefixes_is_returned_trimmed() {
        let (prefixes, body) = split_leading_prefixes("  DELETE DATA { <urn:x> <urn:p> 1 . }\n");
        assert!(prefixes.is_empty());
        assert_eq!(body, "DELETE DATA { <urn:x> <urn:p> 1 . }");
    }
}
