//! Process-wide cache of the store's schema terms
//!
//! One snapshot, loaded lazily on first use and replaced wholesale on
//! refresh. A failed refresh leaves the previous snapshot in place.

use crate::error::StoreError;
use crate::store::TripleStore;
use moka::future::Cache;
use sparqlgate_statement::TermSnapshot;
use std::sync::Arc;
use tracing::{info, warn};

/// Distinct classes over `rdfs:Class` and `owl:Class`
pub const CLASSES_QUERY: &str = "PREFIX rdfs:<http://www.w3.org/2000/01/rdf-schema#>
PREFIX owl:<http://www.w3.org/2002/07/owl#>
SELECT DISTINCT ?x WHERE { { ?x a rdfs:Class } UNION { ?x a owl:Class } }";

/// Distinct properties over `rdf:Property`, `owl:ObjectProperty` and `owl:DatatypeProperty`
pub const PROPERTIES_QUERY: &str = "PREFIX rdf:<http://www.w3.org/1999/02/22-rdf-syntax-ns#>
PREFIX owl:<http://www.w3.org/2002/07/owl#>
SELECT DISTINCT ?p WHERE {
  { ?p a rdf:Property } UNION { ?p a owl:ObjectProperty } UNION { ?p a owl:DatatypeProperty }
}";

/// Cached allow-list of classes and properties
#[derive(Clone)]
pub struct AllowedTermCache {
    store: Arc<dyn TripleStore>,
    cache: Cache<(), Arc<TermSnapshot>>,
}

impl std::fmt::Debug for AllowedTermCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllowedTermCache")
            .field("loaded", &self.cache.contains_key(&()))
            .finish_non_exhaustive()
    }
}

impl AllowedTermCache {
    /// Cache backed by `store`; nothing is loaded until first use
    pub fn new(store: Arc<dyn TripleStore>) -> Self {
        Self {
            store,
            cache: Cache::new(1),
        }
    }

    /// The current snapshot, loading it on first call
    ///
    /// Concurrent first callers share one load.
    ///
    /// # Errors
    ///
    /// Returns the store error when nothing is cached and loading fails.
    pub async fn get(&self) -> Result<Arc<TermSnapshot>, StoreError> {
        let store = Arc::clone(&self.store);
        self.cache
            .try_get_with((), async move { load(store.as_ref()).await.map(Arc::new) })
            .await
            .map_err(|e| (*e).clone())
    }

    /// The current snapshot, or an empty one when it cannot be loaded
    pub async fn get_or_empty(&self) -> Arc<TermSnapshot> {
        match self.get().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "allowed terms unavailable, using empty allow-list");
                Arc::new(TermSnapshot::default())
            }
        }
    }

    /// Reload from the store and replace the snapshot atomically
    ///
    /// # Errors
    ///
    /// Returns the store error; the previous snapshot stays in effect.
    pub async fn refresh(&self) -> Result<Arc<TermSnapshot>, StoreError> {
        let snapshot = Arc::new(load(self.store.as_ref()).await?);
        self.cache.insert((), Arc::clone(&snapshot)).await;
        info!(
            classes = snapshot.classes.len(),
            properties = snapshot.properties.len(),
            "allowed terms refreshed"
        );
        Ok(snapshot)
    }
}

async fn load(store: &dyn TripleStore) -> Result<TermSnapshot, StoreError> {
    let classes = store.select(CLASSES_QUERY).await?.column("x");
    let properties = store.select(PROPERTIES_QUERY).await?.column("p");
    Ok(TermSnapshot::new(classes, properties))
}
