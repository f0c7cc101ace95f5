//! Redaction of personal literals from free text
//!
//! Free text is scrubbed before it leaves the process for the generation
//! capability. Quoted spans and keyword-introduced names become `PH<n>`
//! placeholders with a recoverable mapping; numbers and dates become the
//! fixed [`NUMBER_MARKER`] and are not recoverable.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// Replacement for every number or date token
pub const NUMBER_MARKER: &str = "PH_NUM";

static DOUBLE_QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"]+)""#).expect("valid regex"));

static SINGLE_QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'([^']+)'").expect("valid regex"));

static KEYWORD_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i:\b(given[- ]?name|first[- ]?name|surname|last[- ]?name|birth[- ]?name|",
        r"vorname|nachname|geburtsname|parish|gemeinde|place|ort|church|kirche|",
        r"role|pfarrer(?:in)?|name))\b\s*[:=]?\s*",
        r"(\p{Lu}[\p{L}\-]+(?:\s+\p{Lu}[\p{L}\-]+)?)",
    ))
    .expect("valid regex")
});

static NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\d{1,4}(?:[.\-]\d{1,2}(?:[.\-]\d{1,2})?)?\b").expect("valid regex")
});

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^PH\d+\b").expect("valid regex"));

static QUOTED_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["'](PH\d+)["']"#).expect("valid regex"));

/// Ordered mapping from placeholder token to the literal it replaced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaceholderMap(IndexMap<String, String>);

impl PlaceholderMap {
    /// Create an empty map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Original literal for a token
    #[must_use]
    pub fn get(&self, token: &str) -> Option<&str> {
        self.0.get(token).map(String::as_str)
    }

    /// Entries in the order they were recorded
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of recorded literals
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when nothing was recorded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn record(&mut self, original: &str) -> String {
        let token = format!("PH{}", self.0.len() + 1);
        self.0.insert(token.clone(), original.to_string());
        token
    }
}

/// Masked text together with its placeholder mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scrubbed {
    /// Text safe to hand to the generation capability
    pub text: String,
    /// Literals that can be restored later
    pub placeholders: PlaceholderMap,
}

/// Replace personal literals in `text` with placeholders
#[must_use]
pub fn scrub(text: &str) -> Scrubbed {
    let mut placeholders = PlaceholderMap::new();

    let double = DOUBLE_QUOTED.replace_all(text, |c: &Captures<'_>| placeholders.record(&c[1]));
    let quoted = SINGLE_QUOTED
        .replace_all(&double, |c: &Captures<'_>| placeholders.record(&c[1]))
        .into_owned();
    let named = KEYWORD_NAME
        .replace_all(&quoted, |c: &Captures<'_>| {
            let Some(value) = c.get(2) else {
                return c[0].to_string();
            };
            if PLACEHOLDER.is_match(&quoted[value.start()..]) {
                return c[0].to_string();
            }
            format!("{} {}", &c[1], placeholders.record(value.as_str()))
        })
        .into_owned();
    let text = NUMBER.replace_all(&named, NUMBER_MARKER).into_owned();

    Scrubbed { text, placeholders }
}

/// Put recorded literals back into a statement
///
/// Only quoted placeholders are restored, always as a double-quoted
/// literal. Unknown tokens are left as they are.
#[must_use]
pub fn rehydrate(statement: &str, placeholders: &PlaceholderMap) -> String {
    if placeholders.is_empty() {
        return statement.to_string();
    }
    QUOTED_PLACEHOLDER
        .replace_all(statement, |c: &Captures<'_>| match placeholders.get(&c[1]) {
            Some(original) => format!("\"{}\"", escape_literal(original)),
            None => c[0].to_string(),
        })
        .into_owned()
}

fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn quoted_name_round_trips() {
        let s = scrub("Add a pastor named \"Anna\"");
        assert_eq!(s.text, "Add a pastor named PH1");
        assert_eq!(s.placeholders.get("PH1"), Some("Anna"));

        let statement = "INSERT DATA { <urn:p1> <urn:given> \"PH1\" . }";
        assert_eq!(
            rehydrate(statement, &s.placeholders),
            "INSERT DATA { <urn:p1> <urn:given> \"Anna\" . }"
        );
    }

    #[test]
    fn numbering_follows_insertion_order() {
        let s = scrub("\"Anna\" and 'Berta' then surname Schmidt");
        assert_eq!(s.text, "PH1 and PH2 then surname PH3");
        let order: Vec<_> = s.placeholders.iter().map(|(_, v)| v).collect();
        assert_eq!(order, vec!["Anna", "Berta", "Schmidt"]);
    }

    #[test]
    fn keyword_names_in_german() {
        let s = scrub("Ändere den Nachname Müller-Lüdenscheidt in der Gemeinde Bad Kösen");
        assert_eq!(s.text, "Ändere den Nachname PH1 in der Gemeinde PH2");
        assert_eq!(s.placeholders.get("PH1"), Some("Müller-Lüdenscheidt"));
        assert_eq!(s.placeholders.get("PH2"), Some("Bad Kösen"));
    }

    #[test]
    fn keyword_before_placeholder_is_not_double_scrubbed() {
        let s = scrub("name \"Anna\"");
        assert_eq!(s.text, "name PH1");
        assert_eq!(s.placeholders.len(), 1);
    }

    #[test]
    fn years_are_lossy() {
        let s = scrub("born 1875, ordained 12.04.1901");
        assert!(!s.text.contains("1875"));
        assert!(!s.text.contains("1901"));
        assert!(s.text.contains(NUMBER_MARKER));
        assert!(s.placeholders.is_empty());
        assert!(!rehydrate(&s.text, &s.placeholders).contains("1875"));
    }

    #[test]
    fn rehydrate_escapes_and_normalises_quotes() {
        let mut map = PlaceholderMap::new();
        map.record("Der \"Alte\"");
        let out = rehydrate("<urn:s> <urn:t> 'PH1' .", &map);
        assert_eq!(out, r#"<urn:s> <urn:t> "Der \"Alte\"" ."#);
    }

    #[test]
    fn unknown_placeholder_is_left_alone() {
        let s = scrub("\"Anna\"");
        assert_eq!(rehydrate("\"PH7\"", &s.placeholders), "\"PH7\"");
    }

    #[test]
    fn lowercase_words_after_keywords_stay() {
        let s = scrub("change the name of the church");
        assert_eq!(s.text, "change the name of the church");
        assert!(s.placeholders.is_empty());
    }
}
