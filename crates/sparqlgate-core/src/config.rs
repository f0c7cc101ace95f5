//! Gateway configuration
//!
//! Defaults, then an optional TOML file, then environment variables. Every
//! section deserializes with `#[serde(default)]`, so a file only needs the
//! keys it changes.

use crate::admission::AdmissionPolicy;
use crate::confirmation::DEFAULT_TTL_SECS;
use crate::error::ConfigError;
use crate::generation::LlmConfig;
use serde::{Deserialize, Serialize};
use sparqlgate_audit::PseudonymConfig;
use sparqlgate_store::StoreConfig;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Complete gateway configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Named graph every write is confined to
    pub changes_graph: String,
    /// Shared API credential; `None` disables caller authentication
    pub api_token: Option<String>,
    /// Lifetime of a confirmation token in seconds
    pub confirm_ttl_secs: u64,
    /// Audit log location
    pub audit_log_file: PathBuf,
    /// Performance log location; `None` disables the log
    pub perf_log_file: Option<PathBuf>,
    /// Triple store connection
    pub store: StoreConfig,
    /// Generation capability
    pub llm: LlmConfig,
    /// Rate limiting
    pub admission: AdmissionPolicy,
    /// Log pseudonymization
    pub pseudonym: PseudonymConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            changes_graph: "urn:sparqlgate:changes".to_string(),
            api_token: None,
            confirm_ttl_secs: DEFAULT_TTL_SECS,
            audit_log_file: PathBuf::from("logs/audit.jsonl"),
            perf_log_file: Some(PathBuf::from("logs/perf.jsonl")),
            store: StoreConfig::default(),
            llm: LlmConfig::default(),
            admission: AdmissionPolicy::default(),
            pseudonym: PseudonymConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With target graph
    #[must_use]
    pub fn with_changes_graph(mut self, graph: impl Into<String>) -> Self {
        self.changes_graph = graph.into();
        self
    }

    /// With API credential
    #[must_use]
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// With confirmation TTL
    #[inline]
    #[must_use]
    pub fn with_confirm_ttl(mut self, ttl: Duration) -> Self {
        self.confirm_ttl_secs = ttl.as_secs();
        self
    }

    /// With audit log location
    #[must_use]
    pub fn with_audit_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.audit_log_file = path.into();
        self
    }

    /// With performance log location
    #[must_use]
    pub fn with_perf_log_file(mut self, path: Option<PathBuf>) -> Self {
        self.perf_log_file = path;
        self
    }

    /// With store connection
    #[must_use]
    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    /// With generation settings
    #[must_use]
    pub fn with_llm(mut self, llm: LlmConfig) -> Self {
        self.llm = llm;
        self
    }

    /// With admission policy
    #[inline]
    #[must_use]
    pub fn with_admission(mut self, policy: AdmissionPolicy) -> Self {
        self.admission = policy;
        self
    }

    /// With pseudonymization settings
    #[must_use]
    pub fn with_pseudonym(mut self, pseudonym: PseudonymConfig) -> Self {
        self.pseudonym = pseudonym;
        self
    }

    /// Confirmation TTL as a duration
    #[inline]
    #[must_use]
    pub fn confirm_ttl(&self) -> Duration {
        Duration::from_secs(self.confirm_ttl_secs)
    }

    /// Parse a TOML document
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for invalid TOML or mistyped keys.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Defaults, overlaid by `path` when given, overlaid by the process
    /// environment
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed, or an
    /// environment variable has the wrong shape.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                debug!(path = %path.display(), "configuration file loaded");
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Defaults overlaid by the process environment
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for a malformed variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Overlay values from an environment lookup
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when a numeric variable does
    /// not parse.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| lookup(key);

        if let Some(v) = text("FUSEKI_BASE_URL") {
            self.store.base_url = v;
        }
        if let Some(v) = text("FUSEKI_DATASET") {
            self.store.dataset = v;
        }
        if let Some(v) = text("FUSEKI_USER") {
            self.store.user = v;
        }
        if let Some(v) = text("FUSEKI_PASSWORD") {
            self.store.password = v;
        }

        if let Some(v) = text("OPENAI_API_KEY") {
            self.llm.api_key = non_empty(v);
        }
        if let Some(v) = text("OPENAI_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = text("LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = parsed(&lookup, "LLM_TEMPERATURE")? {
            self.llm.temperature = v;
        }
        if let Some(v) = parsed(&lookup, "LLM_MAX_OUTPUT_TOKENS")? {
            self.llm.max_output_tokens = v;
        }

        if let Some(v) = text("CHANGES_GRAPH") {
            self.changes_graph = v;
        }
        if let Some(v) = text("API_AUTH_TOKEN") {
            self.api_token = non_empty(v);
        }
        if let Some(v) = parsed(&lookup, "CONFIRM_TTL_SECS")? {
            self.confirm_ttl_secs = v;
        }

        if let Some(v) = parsed(&lookup, "RATE_LIMIT_PER_MINUTE")? {
            self.admission.limit = v;
        }
        if let Some(v) = parsed(&lookup, "RATE_LIMIT_BURST")? {
            self.admission.burst = v;
        }

        if let Some(v) = text("PSEUDONYMIZE_LOGS") {
            self.pseudonym.enabled = flag(&v);
        }
        if let Some(v) = text("LOG_PSEUDO_SALT") {
            self.pseudonym.salt = v;
        }
        if let Some(v) = text("LOG_PSEUDO_FIELDS") {
            self.pseudonym.fields = PseudonymConfig::parse_fields(&v);
        }

        if let Some(v) = text("AUDIT_LOG_FILE") {
            self.audit_log_file = PathBuf::from(v);
        }
        if let Some(v) = text("PERF_LOG_FILE") {
            self.perf_log_file = non_empty(v).map(PathBuf::from);
        }
        Ok(())
    }
}

fn parsed<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw,
        })
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Anything but an explicit off value turns the switch on.
fn flag(value: &str) -> bool {
    !matches!(value.trim(), "" | "0" | "false" | "False" | "FALSE" | "no" | "off")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = GatewayConfig::new();
        assert_eq!(config.confirm_ttl(), Duration::from_secs(600));
        assert_eq!(config.store.query_url(), "http://localhost:3030/combined/sparql");
        assert_eq!(config.admission.capacity(), 150);
        assert!(config.pseudonym.enabled);
        assert!(config.api_token.is_none());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = GatewayConfig::from_toml_str(
            r#"
changes_graph = "urn:graph:edits"

[store]
dataset = "pfarrerbuch"

[admission]
limit = 10
"#,
        )
        .unwrap();

        assert_eq!(config.changes_graph, "urn:graph:edits");
        assert_eq!(config.store.dataset, "pfarrerbuch");
        assert_eq!(config.store.user, "admin");
        assert_eq!(config.admission.limit, 10);
        assert_eq!(config.admission.burst, 30);
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let err = GatewayConfig::from_toml_str("confirm_ttl_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn environment_overrides() {
        let mut config = GatewayConfig::default();
        config
            .apply_env(env(&[
                ("FUSEKI_BASE_URL", "http://fuseki:3030"),
                ("OPENAI_API_KEY", "sk-test"),
                ("LLM_TEMPERATURE", "0.3"),
                ("API_AUTH_TOKEN", "secret"),
                ("RATE_LIMIT_PER_MINUTE", "5"),
                ("PSEUDONYMIZE_LOGS", "false"),
                ("LOG_PSEUDO_FIELDS", "voc:vorname, ,voc:geburtsname"),
                ("PERF_LOG_FILE", ""),
            ]))
            .unwrap();

        assert_eq!(config.store.base_url, "http://fuseki:3030");
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
        assert!((config.llm.temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.api_token.as_deref(), Some("secret"));
        assert_eq!(config.admission.limit, 5);
        assert!(!config.pseudonym.enabled);
        assert_eq!(config.pseudonym.fields, vec!["voc:vorname", "voc:geburtsname"]);
        assert!(config.perf_log_file.is_none());
    }

    #[test]
    fn malformed_number_names_the_variable() {
        let mut config = GatewayConfig::default();
        let err = config
            .apply_env(env(&[("RATE_LIMIT_BURST", "lots")]))
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid value \"lots\" for RATE_LIMIT_BURST");
    }

    #[test]
    fn pseudonym_flag_values() {
        assert!(flag("1"));
        assert!(flag("yes"));
        assert!(!flag("0"));
        assert!(!flag("False"));
        assert!(!flag(""));
    }
}
