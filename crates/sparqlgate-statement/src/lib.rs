//! Statement analysis for the sparqlgate pipeline
//!
//! Everything in this crate is a pure text transformation over SPARQL
//! statements and free-text requests. The passes are regex heuristics, not a
//! grammar; they are tuned for the statements the generation step and human
//! authors actually produce.
//!
//! - [`validate::check`] reports unknown classes and properties
//! - [`explain::explain`] classifies the update shape
//! - [`GraphScoper`] confines writes to one named graph
//! - [`derive_undo`] inverts ground-data updates
//! - [`scrub`] / [`rehydrate`] hide and restore personal literals
//!
//! # Example
//!
//! ```rust
//! use sparqlgate_statement::{derive_undo, GraphScoper};
//!
//! let scoper = GraphScoper::new("urn:graph:changes");
//! let scoped = scoper.ensure_target_graph("INSERT DATA { <urn:a> <urn:p> 1 . }");
//! assert!(scoped.contains("GRAPH <urn:graph:changes>"));
//! assert!(derive_undo(&scoped).unwrap().starts_with("DELETE DATA"));
//! ```

pub mod explain;
pub mod intent;
pub mod prefixes;
pub mod scope;
pub mod scrub;
mod syntax;
pub mod undo;
pub mod validate;

pub use explain::{explain, Explanation, StatementKind, MAX_PREDICATES};
pub use intent::Intent;
pub use prefixes::{split_leading_prefixes, PrefixMap};
pub use scope::GraphScoper;
pub use scrub::{rehydrate, scrub, PlaceholderMap, Scrubbed, NUMBER_MARKER};
pub use undo::{derive_undo, is_mutation};
pub use validate::{check, extract_used_terms, TermKind, TermSnapshot, ValidationResult};

/// Namespace of the project vocabulary
pub const VOC_NAMESPACE: &str = "http://meta-pfarrerbuch.evangelische-archive.de/vocabulary#";

/// Prefix block every generated statement must start with
pub const PREFIX_BLOCK: &str = "PREFIX voc:<http://meta-pfarrerbuch.evangelische-archive.de/vocabulary#>
PREFIX rdf:<http://www.w3.org/1999/02/22-rdf-syntax-ns#>
PREFIX rdfs:<http://www.w3.org/2000/01/rdf-schema#>
PREFIX owl:<http://www.w3.org/2002/07/owl#>";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_block_declares_vocabulary() {
        let map = PrefixMap::parse(PREFIX_BLOCK);
        assert_eq!(map.len(), 4);
        assert_eq!(
            map.expand("voc:vorname"),
            Some(format!("{VOC_NAMESPACE}vorname"))
        );
    }
}
