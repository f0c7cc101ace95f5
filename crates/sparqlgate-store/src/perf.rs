//! Store-call performance log and latency summaries
//!
//! Every store call appends one JSONL row. Summaries read the file back and
//! compute per-operation percentiles over a trailing window.

use crate::error::StoreError;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Longest summary window, one day
pub const MAX_WINDOW_MINUTES: u32 = 1440;

/// One timed store call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerfRow {
    /// Completion time
    pub ts: DateTime<Utc>,
    /// Source of the row
    pub kind: String,
    /// `select` or `update`
    pub op: String,
    /// HTTP status, absent when no response arrived
    pub status: Option<u16>,
    /// Duration in milliseconds, one decimal
    pub dur_ms: f64,
    /// Size of the statement sent
    pub bytes: usize,
}

/// Latency distribution of one operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpStats {
    /// Number of calls
    pub n: usize,
    /// Median in milliseconds
    pub p50: f64,
    /// 95th percentile in milliseconds
    pub p95: f64,
    /// Slowest call in milliseconds
    pub max: f64,
}

/// Per-operation latency over a window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerfSummary {
    /// Window length actually used
    pub window_minutes: u32,
    /// Stats keyed by operation
    pub operations: BTreeMap<String, OpStats>,
}

/// Append-only performance log
#[derive(Debug)]
pub struct PerfLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl PerfLog {
    /// Log at `path`; the file is created on first append
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Location of the log file
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PerfLog`] when the row cannot be written.
    pub async fn append(&self, row: &PerfRow) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(row).map_err(perf_error)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(perf_error)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(perf_error)?;
        file.write_all(line.as_bytes()).await.map_err(perf_error)?;
        Ok(())
    }

    /// Summarise the last `minutes` minutes
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PerfLog`] when an existing file cannot be read.
    pub async fn summary(&self, minutes: u32) -> Result<PerfSummary, StoreError> {
        self.summary_at(minutes, Utc::now()).await
    }

    /// Summarise the window ending at `now`
    ///
    /// `minutes` is clamped to `1..=MAX_WINDOW_MINUTES`. Unparseable lines
    /// are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PerfLog`] when an existing file cannot be read.
    pub async fn summary_at(
        &self,
        minutes: u32,
        now: DateTime<Utc>,
    ) -> Result<PerfSummary, StoreError> {
        let window_minutes = minutes.clamp(1, MAX_WINDOW_MINUTES);
        let since = now - ChronoDuration::minutes(i64::from(window_minutes));

        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(perf_error(e)),
        };

        let mut samples: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for row in content
            .lines()
            .filter_map(|line| serde_json::from_str::<PerfRow>(line).ok())
            .filter(|row| row.ts >= since && row.ts <= now)
        {
            samples.entry(row.op).or_default().push(row.dur_ms);
        }

        let operations = samples
            .into_iter()
            .map(|(op, mut durations)| {
                durations.sort_by(f64::total_cmp);
                (op, stats(&durations))
            })
            .collect();

        Ok(PerfSummary {
            window_minutes,
            operations,
        })
    }
}

fn perf_error(e: impl std::fmt::Display) -> StoreError {
    StoreError::PerfLog(e.to_string())
}

fn stats(sorted: &[f64]) -> OpStats {
    OpStats {
        n: sorted.len(),
        p50: percentile(sorted, 0.50),
        p95: percentile(sorted, 0.95),
        max: sorted.last().copied().unwrap_or_default(),
    }
}

/// Percentile with linear interpolation between closest ranks
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = p * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let value = sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64);
            (value * 10.0).round() / 10.0
        }
    }
}
