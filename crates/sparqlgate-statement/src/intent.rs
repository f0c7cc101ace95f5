//! Keyword heuristic for the caller's intent

use serde::{Deserialize, Serialize};
use std::fmt;

const INSERT_WORDS: &[&str] = &["füge", "hinzufügen", "insert", "add ", "create", "new ", "neu"];
const UPDATE_WORDS: &[&str] = &[
    "ändere", "update", "ersetze", "korrigiere", "change", "replace", "correct", "rename",
];
const DELETE_WORDS: &[&str] = &["lösche", "delete", "entferne", "remove"];

/// What the caller wants to do with the data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Add new facts
    Insert,
    /// Change existing facts
    Update,
    /// Remove facts
    Delete,
    /// Read only
    Select,
}

impl Intent {
    /// Guess the intent of a free-text request
    ///
    /// Insert words win over update words, which win over delete words.
    /// Text without any of them is a read.
    #[must_use]
    pub fn detect(text: &str) -> Self {
        let lower = format!("{} ", text.to_lowercase());
        let hit = |words: &[&str]| words.iter().any(|w| lower.contains(w));

        if hit(INSERT_WORDS) {
            Self::Insert
        } else if hit(UPDATE_WORDS) {
            Self::Update
        } else if hit(DELETE_WORDS) {
            Self::Delete
        } else {
            Self::Select
        }
    }

    /// Lowercase label used in hints
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Select => "select",
        }
    }

    /// Whether the intent writes to the store
    #[inline]
    #[must_use]
    pub fn is_mutating(self) -> bool {
        !matches!(self, Self::Select)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_german_and_english_keywords() {
        assert_eq!(Intent::detect("Füge einen neuen Pfarrer hinzu"), Intent::Insert);
        assert_eq!(Intent::detect("Add a pastor"), Intent::Insert);
        assert_eq!(Intent::detect("Korrigiere den Nachnamen"), Intent::Update);
        assert_eq!(Intent::detect("rename the parish"), Intent::Update);
        assert_eq!(Intent::detect("Lösche die Stelle"), Intent::Delete);
        assert_eq!(Intent::detect("remove the record"), Intent::Delete);
    }

    #[test]
    fn defaults_to_select() {
        assert_eq!(Intent::detect("Which pastors served in Halle?"), Intent::Select);
        assert!(!Intent::Select.is_mutating());
    }

    #[test]
    fn insert_wins_over_delete() {
        assert_eq!(Intent::detect("delete the old one and insert a new one"), Intent::Insert);
    }

    #[test]
    fn trailing_short_word_still_matches() {
        assert_eq!(Intent::detect("please add"), Intent::Insert);
    }
}
