//! Single-use confirmation tokens for staged statements
//!
//! Staging hands out an unguessable token. Consuming removes the entry
//! whatever its age and yields it only while it is within the TTL, so an
//! expired token looks exactly like one that never existed. There is no
//! background sweep.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sparqlgate_statement::{Explanation, PlaceholderMap, ValidationResult};
use tracing::debug;

/// Default time a staged statement stays confirmable
pub const DEFAULT_TTL_SECS: u64 = 600;

/// A statement with its analysis, ready to be staged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedStatement {
    /// Statement as it will be executed, before placeholder rehydration
    pub statement: String,
    /// Advisory validation
    pub validation: ValidationResult,
    /// Shape and touched predicates
    pub explanation: Explanation,
    /// Literals hidden from the generation capability, if any
    pub placeholders: Option<PlaceholderMap>,
}

/// A staged statement waiting for confirmation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingConfirmation {
    /// Opaque token
    pub token: String,
    /// Staging time
    pub created_at: DateTime<Utc>,
    /// The staged payload
    pub staged: StagedStatement,
}

/// Volatile store of pending confirmations
#[derive(Debug)]
pub struct ConfirmationStore {
    ttl: Duration,
    pending: DashMap<String, PendingConfirmation>,
}

impl Default for ConfirmationStore {
    fn default() -> Self {
        Self::new(std::time::Duration::from_secs(DEFAULT_TTL_SECS))
    }
}

impl ConfirmationStore {
    /// Store with the given TTL
    ///
    /// A TTL beyond what a signed duration can hold never expires.
    #[must_use]
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            ttl: Duration::from_std(ttl).unwrap_or(Duration::MAX),
            pending: DashMap::new(),
        }
    }

    /// Configured TTL
    #[inline]
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Stage a payload now and return its token
    pub fn stage(&self, staged: StagedStatement) -> String {
        self.stage_at(staged, Utc::now())
    }

    /// Stage a payload with an explicit creation time
    pub fn stage_at(&self, staged: StagedStatement, now: DateTime<Utc>) -> String {
        let token = new_token();
        self.pending.insert(
            token.clone(),
            PendingConfirmation {
                token: token.clone(),
                created_at: now,
                staged,
            },
        );
        debug!(pending = self.pending.len(), "statement staged");
        token
    }

    /// Take the payload for `token`
    pub fn consume(&self, token: &str) -> Option<PendingConfirmation> {
        self.consume_at(token, Utc::now())
    }

    /// Take the payload for `token` as seen at `now`
    ///
    /// The entry is removed in every case; it is returned only when
    /// `now - created_at <= ttl`.
    pub fn consume_at(&self, token: &str, now: DateTime<Utc>) -> Option<PendingConfirmation> {
        let (_, pending) = self.pending.remove(token)?;
        if now - pending.created_at > self.ttl {
            debug!("confirmation token expired");
            return None;
        }
        Some(pending)
    }

    /// Number of entries, expired ones included
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True when nothing is staged
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// 256 random bits, hex encoded
fn new_token() -> String {
    hex::encode(rand::random::<[u8; 32]>())
}
