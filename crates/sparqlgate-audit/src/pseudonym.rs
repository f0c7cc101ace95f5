//! Deterministic masking of personal literals at log time
//!
//! A literal following one of the configured predicates is replaced by
//! `px-` and the first eight base32 characters of HMAC-SHA256(salt, literal).
//! The same literal always maps to the same pseudonym under one salt, so
//! audit entries stay correlatable without carrying the clear text.

use crate::error::AuditError;
use hmac::{Hmac, Mac};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const BASE32_LOWER: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

/// Pseudonym prefix
pub const PSEUDONYM_PREFIX: &str = "px-";

/// Log pseudonymization settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PseudonymConfig {
    /// Process-wide switch; when off masking is the identity
    pub enabled: bool,
    /// HMAC key
    pub salt: String,
    /// Predicates whose literal objects are masked, e.g. `voc:vorname`
    pub fields: Vec<String>,
}

impl Default for PseudonymConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            salt: "change-me-in-prod".to_string(),
            fields: vec!["voc:vorname".to_string(), "voc:nachname".to_string()],
        }
    }
}

impl PseudonymConfig {
    /// Parse a comma-separated field list, dropping blanks
    #[must_use]
    pub fn parse_fields(list: &str) -> Vec<String> {
        list.split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Masks configured predicate literals in statement text
#[derive(Clone)]
pub struct Pseudonymizer {
    enabled: bool,
    mac: HmacSha256,
    patterns: Vec<Regex>,
}

impl std::fmt::Debug for Pseudonymizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pseudonymizer")
            .field("enabled", &self.enabled)
            .field("fields", &self.patterns.len())
            .finish_non_exhaustive()
    }
}

impl Pseudonymizer {
    /// Build a pseudonymizer from its settings
    ///
    /// # Errors
    ///
    /// Returns an error when a field cannot be turned into a pattern or the
    /// key is rejected.
    pub fn new(config: &PseudonymConfig) -> Result<Self, AuditError> {
        let mac = HmacSha256::new_from_slice(config.salt.as_bytes())
            .map_err(|_| AuditError::InvalidKey)?;
        let patterns = config
            .fields
            .iter()
            .map(|field| field_pattern(field))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            enabled: config.enabled,
            mac,
            patterns,
        })
    }

    /// A pseudonymizer that never masks
    ///
    /// # Errors
    ///
    /// Never fails in practice; shares the constructor's signature.
    pub fn disabled() -> Result<Self, AuditError> {
        Self::new(&PseudonymConfig {
            enabled: false,
            ..PseudonymConfig::default()
        })
    }

    /// Whether masking is active
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Pseudonym for one literal value
    #[must_use]
    pub fn pseudonym(&self, value: &str) -> String {
        if value.is_empty() {
            return String::new();
        }
        let mut mac = self.mac.clone();
        mac.update(value.as_bytes());
        let digest = mac.finalize().into_bytes();
        format!("{PSEUDONYM_PREFIX}{}", base32_prefix(&digest))
    }

    /// Mask every configured predicate literal in `statement`
    #[must_use]
    pub fn mask(&self, statement: &str) -> String {
        if !self.enabled {
            return statement.to_string();
        }
        self.patterns.iter().fold(statement.to_string(), |text, re| {
            re.replace_all(&text, |c: &regex::Captures<'_>| {
                format!("{}{}{}", &c[1], self.pseudonym(&c[2]), &c[3])
            })
            .into_owned()
        })
    }
}

/// Pattern for `<field> "literal"` or `<field> 'literal'`.
fn field_pattern(field: &str) -> Result<Regex, AuditError> {
    let escaped = regex::escape(field);
    let source = if field.contains("://") {
        format!(r#"(<{escaped}>\s*["'])([^"']+)(["'])"#)
    } else {
        format!(r#"(\b{escaped}\s*["'])([^"']+)(["'])"#)
    };
    Regex::new(&source).map_err(|e| AuditError::InvalidField {
        field: field.to_string(),
        reason: e.to_string(),
    })
}

/// First eight RFC 4648 base32 characters of `bytes`, lowercased.
fn base32_prefix(bytes: &[u8]) -> String {
    let bits = bytes
        .iter()
        .take(5)
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
    (0..8)
        .map(|i| {
            let index = (bits >> (35 - 5 * i)) & 0x1f;
            char::from(BASE32_LOWER[usize::try_from(index).unwrap_or_default()])
        })
        .collect()
}
