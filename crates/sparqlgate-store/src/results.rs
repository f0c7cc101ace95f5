//! SPARQL 1.1 query results in JSON form

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One bound RDF term
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RdfTerm {
    /// `uri`, `literal`, `typed-literal` or `bnode`
    #[serde(rename = "type")]
    pub kind: String,
    /// Lexical value
    pub value: String,
    /// Language tag of a literal
    #[serde(rename = "xml:lang", default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    /// Datatype IRI of a literal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
}

impl RdfTerm {
    /// An IRI term
    #[must_use]
    pub fn uri(value: impl Into<String>) -> Self {
        Self {
            kind: "uri".to_string(),
            value: value.into(),
            lang: None,
            datatype: None,
        }
    }

    /// A plain literal
    #[must_use]
    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            kind: "literal".to_string(),
            value: value.into(),
            lang: None,
            datatype: None,
        }
    }
}

/// Variables of a result set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultHead {
    /// Projected variable names
    #[serde(default)]
    pub vars: Vec<String>,
}

/// Solution rows of a result set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultBindings {
    /// One map per solution
    #[serde(default)]
    pub bindings: Vec<BTreeMap<String, RdfTerm>>,
}

/// Response of a read call: solutions for SELECT, a boolean for ASK
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectResults {
    /// Variables
    #[serde(default)]
    pub head: ResultHead,
    /// Solutions, absent for ASK
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<ResultBindings>,
    /// ASK answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boolean: Option<bool>,
}

impl SelectResults {
    /// Build a single-variable result set
    #[must_use]
    pub fn from_column<I>(var: &str, values: I) -> Self
    where
        I: IntoIterator<Item = RdfTerm>,
    {
        let bindings = values
            .into_iter()
            .map(|term| BTreeMap::from([(var.to_string(), term)]))
            .collect();
        Self {
            head: ResultHead {
                vars: vec![var.to_string()],
            },
            results: Some(ResultBindings { bindings }),
            boolean: None,
        }
    }

    /// Values bound to `var`, in solution order, skipping unbound rows
    #[must_use]
    pub fn column(&self, var: &str) -> Vec<String> {
        self.rows()
            .iter()
            .filter_map(|row| row.get(var).map(|t| t.value.clone()))
            .collect()
    }

    /// Solution rows; empty for ASK
    #[must_use]
    pub fn rows(&self) -> &[BTreeMap<String, RdfTerm>] {
        match &self.results {
            Some(r) => &r.bindings,
            None => &[],
        }
    }

    /// Number of solutions
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows().len()
    }

    /// True when there are no solutions
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }
}
