//! Timing decorator for any [`TripleStore`]

use crate::error::StoreError;
use crate::perf::{PerfLog, PerfRow};
use crate::results::SelectResults;
use crate::store::{StoreOperation, TripleStore};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Histogram of store call latency in seconds
pub const STORE_LATENCY_METRIC: &str = "sparqlgate_store_request_duration_seconds";

/// Wraps a store and records latency for every call
///
/// Each call emits a histogram sample labelled by operation and status,
/// a tracing event and, when a [`PerfLog`] is attached, one JSONL row.
/// A failing perf log never fails the call it measures.
#[derive(Debug)]
pub struct InstrumentedStore<S> {
    inner: S,
    perf: Option<Arc<PerfLog>>,
}

impl<S: TripleStore> InstrumentedStore<S> {
    /// Instrument `inner` with metrics and tracing only
    pub fn new(inner: S) -> Self {
        Self { inner, perf: None }
    }

    /// Also append rows to `perf`
    #[must_use]
    pub fn with_perf_log(mut self, perf: Arc<PerfLog>) -> Self {
        self.perf = Some(perf);
        self
    }

    /// The wrapped store
    #[inline]
    #[must_use]
    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn observe<T>(
        &self,
        op: StoreOperation,
        bytes: usize,
        started: Instant,
        result: &Result<T, StoreError>,
    ) {
        let elapsed = started.elapsed();
        let status = match result {
            Ok(_) => Some(200),
            Err(e) => e.status(),
        };
        let status_label = status.map_or_else(|| "error".to_string(), |s| s.to_string());

        metrics::histogram!(
            STORE_LATENCY_METRIC,
            "operation" => op.as_str(),
            "status" => status_label.clone()
        )
        .record(elapsed.as_secs_f64());

        let dur_ms = (elapsed.as_secs_f64() * 10_000.0).round() / 10.0;
        match result {
            Ok(_) => debug!(operation = %op, dur_ms, "store call"),
            Err(e) => warn!(operation = %op, status = %status_label, dur_ms, error = %e, "store call failed"),
        }

        if let Some(perf) = &self.perf {
            let row = PerfRow {
                ts: Utc::now(),
                kind: "store".to_string(),
                op: op.as_str().to_string(),
                status,
                dur_ms,
                bytes,
            };
            if let Err(e) = perf.append(&row).await {
                warn!(error = %e, "perf log append failed");
            }
        }
    }
}

#[async_trait]
impl<S: TripleStore> TripleStore for InstrumentedStore<S> {
    async fn select(&self, query: &str) -> Result<SelectResults, StoreError> {
        let started = Instant::now();
        let result = self.inner.select(query).await;
        self.observe(StoreOperation::Select, query.len(), started, &result)
            .await;
        result
    }

    async fn update(&self, update: &str) -> Result<(), StoreError> {
        let started = Instant::now();
        let result = self.inner.update(update).await;
        self.observe(StoreOperation::Update, update.len(), started, &result)
            .await;
        result
    }
}
