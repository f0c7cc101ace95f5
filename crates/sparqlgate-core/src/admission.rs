//! Sliding-window admission control
//!
//! Each identifier owns a queue of admission timestamps. A check evicts
//! entries older than the window, rejects when the remaining count has
//! reached `limit + burst` and otherwise records the current instant. The
//! DashMap entry guard serializes checks for one identifier.

use crate::error::GatewayError;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::warn;

/// Rate-limit settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionPolicy {
    /// Requests per window
    pub limit: u32,
    /// Extra requests tolerated on top of `limit`
    pub burst: u32,
    /// Window length in seconds
    pub window_secs: u64,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            limit: 120,
            burst: 30,
            window_secs: 60,
        }
    }
}

impl AdmissionPolicy {
    /// Policy with the given limit and burst over the default window
    #[must_use]
    pub fn new(limit: u32, burst: u32) -> Self {
        Self {
            limit,
            burst,
            ..Self::default()
        }
    }

    /// With window length
    #[inline]
    #[must_use]
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window_secs = window.as_secs().max(1);
        self
    }

    /// Requests admitted per window before rejection
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        let widen = |n: u32| usize::try_from(n).unwrap_or(usize::MAX);
        widen(self.limit).saturating_add(widen(self.burst))
    }

    /// Window as a duration
    #[inline]
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    fn normalised(mut self) -> Self {
        self.limit = self.limit.max(1);
        self.window_secs = self.window_secs.max(1);
        self
    }
}

/// Per-identifier sliding-window rate limiter
#[derive(Debug, Default)]
pub struct AdmissionGate {
    policy: RwLock<AdmissionPolicy>,
    hits: DashMap<String, VecDeque<Instant>>,
}

impl AdmissionGate {
    /// Gate enforcing `policy`
    #[must_use]
    pub fn new(policy: AdmissionPolicy) -> Self {
        Self {
            policy: RwLock::new(policy.normalised()),
            hits: DashMap::new(),
        }
    }

    /// Current policy
    #[inline]
    #[must_use]
    pub fn policy(&self) -> AdmissionPolicy {
        *self.policy.read()
    }

    /// Replace the policy
    ///
    /// Takes effect for the next check. Existing queues are kept.
    pub fn configure(&self, policy: AdmissionPolicy) {
        *self.policy.write() = policy.normalised();
    }

    /// Admit or reject one request from `identifier`
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::AdmissionDenied`] when the window is full.
    pub fn admit(&self, identifier: &str) -> Result<(), GatewayError> {
        self.admit_at(identifier, Instant::now())
    }

    /// Admit or reject one request observed at `now`
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::AdmissionDenied`] when the window is full.
    pub fn admit_at(&self, identifier: &str, now: Instant) -> Result<(), GatewayError> {
        let policy = self.policy();
        let window = policy.window();

        let mut queue = self.hits.entry(identifier.to_string()).or_default();
        while queue
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) > window)
        {
            queue.pop_front();
        }

        if queue.len() >= policy.capacity() {
            warn!(identifier, in_window = queue.len(), "admission denied");
            return Err(GatewayError::AdmissionDenied {
                identifier: identifier.to_string(),
            });
        }
        queue.push_back(now);
        Ok(())
    }

    /// Requests currently counted for `identifier`
    #[must_use]
    pub fn in_window(&self, identifier: &str) -> usize {
        self.hits.get(identifier).map_or(0, |q| q.len())
    }

    /// Forget every queue
    pub fn reset(&self) {
        self.hits.clear();
    }
}
