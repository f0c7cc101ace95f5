//! Triple store access for sparqlgate
//!
//! - [`TripleStore`] is the seam every caller goes through
//! - [`FusekiStore`] talks to Apache Jena Fuseki over HTTP
//! - [`InstrumentedStore`] adds metrics, tracing and the [`PerfLog`]
//! - [`AllowedTermCache`] and [`Validator`] check statements against the
//!   store's schema

pub mod error;
pub mod fuseki;
pub mod instrument;
pub mod perf;
pub mod results;
pub mod store;
pub mod terms;
pub mod validator;

pub use error::StoreError;
pub use fuseki::{FusekiStore, StoreConfig};
pub use instrument::{InstrumentedStore, STORE_LATENCY_METRIC};
pub use perf::{OpStats, PerfLog, PerfRow, PerfSummary, MAX_WINDOW_MINUTES};
pub use results::{RdfTerm, ResultBindings, ResultHead, SelectResults};
pub use store::{StoreOperation, TripleStore};
pub use terms::{AllowedTermCache, CLASSES_QUERY, PROPERTIES_QUERY};
pub use validator::{StatementValidator, Validator};
