//! Append-only JSONL audit log
//!
//! Each line is one [`AuditRecord`]. Records are chained: a record's
//! `prev_hash` is the `hash` of the line before it, the first line chains
//! onto [`GENESIS_HASH`]. Appends are serialized through one async mutex so
//! lines never interleave and the chain never forks.

use crate::error::AuditError;
use crate::pseudonym::Pseudonymizer;
use crate::record::{AuditRecord, GENESIS_HASH};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Largest number of records returned by [`AuditLog::tail`]
pub const MAX_TAIL: usize = 500;

/// Durable audit trail of attempted mutations
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    pseudonymizer: Pseudonymizer,
    last_hash: Mutex<String>,
}

impl AuditLog {
    /// Open (or create) the log at `path`
    ///
    /// The chain continues from the last well-formed line already present.
    ///
    /// # Errors
    ///
    /// Returns an error when the parent directory cannot be created or the
    /// existing file cannot be read.
    pub async fn open(
        path: impl Into<PathBuf>,
        pseudonymizer: Pseudonymizer,
    ) -> Result<Self, AuditError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let last_hash = match fs::read_to_string(&path).await {
            Ok(content) => content
                .lines()
                .rev()
                .find_map(|line| serde_json::from_str::<AuditRecord>(line).ok())
                .map_or_else(|| GENESIS_HASH.to_string(), |r| r.hash),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => GENESIS_HASH.to_string(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), "audit log opened");

        Ok(Self {
            path,
            pseudonymizer,
            last_hash: Mutex::new(last_hash),
        })
    }

    /// Location of the log file
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mask, chain and persist a record
    ///
    /// Returns the record exactly as written.
    ///
    /// # Errors
    ///
    /// Returns an error when the record cannot be encoded or written. The
    /// chain head only advances after a successful write.
    pub async fn append(&self, mut record: AuditRecord) -> Result<AuditRecord, AuditError> {
        record.statement = self.pseudonymizer.mask(&record.statement);
        record.undo_statement = record
            .undo_statement
            .as_deref()
            .map(|u| self.pseudonymizer.mask(u));

        let mut last_hash = self.last_hash.lock().await;
        record.prev_hash.clone_from(&last_hash);
        record.hash = record.compute_hash()?;

        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        last_hash.clone_from(&record.hash);
        debug!(status = %record.status, hash = %record.hash, "audit record appended");
        Ok(record)
    }

    /// The last `limit` records, newest first
    ///
    /// `limit` is clamped to `1..=MAX_TAIL`. Lines that do not parse are
    /// skipped. A missing file yields no records.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read.
    pub async fn tail(&self, limit: usize) -> Result<Vec<AuditRecord>, AuditError> {
        let limit = limit.clamp(1, MAX_TAIL);
        let Some(content) = self.read().await? else {
            return Ok(Vec::new());
        };

        Ok(content
            .lines()
            .rev()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<AuditRecord>(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "skipping malformed audit line");
                    None
                }
            })
            .take(limit)
            .collect())
    }

    /// Check the whole hash chain
    ///
    /// Returns the number of verified records.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Malformed`] for a line that does not parse and
    /// [`AuditError::IntegrityViolation`] for the first record whose links
    /// or content do not match.
    pub async fn verify_integrity(&self) -> Result<usize, AuditError> {
        let _guard = self.last_hash.lock().await;
        let Some(content) = self.read().await? else {
            return Ok(0);
        };

        let mut prev = GENESIS_HASH.to_string();
        let mut count = 0;
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let line_no = index + 1;
            let record: AuditRecord =
                serde_json::from_str(line).map_err(|_| AuditError::Malformed { line: line_no })?;
            if record.prev_hash != prev || record.compute_hash()? != record.hash {
                return Err(AuditError::IntegrityViolation { line: line_no });
            }
            prev = record.hash;
            count += 1;
        }
        Ok(count)
    }

    async fn read(&self) -> Result<Option<String>, AuditError> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pseudonym::PseudonymConfig;
    use crate::record::AuditStatus;
    use pretty_assertions::assert_eq;
    use sparqlgate_statement::{check, explain, TermSnapshot};
    use tempfile::TempDir;

    fn record(status: AuditStatus, q: &str) -> AuditRecord {
        AuditRecord::new(status, q, check(q, &TermSnapshot::default()), explain(q))
    }

    async fn open(dir: &TempDir) -> AuditLog {
        let masker = Pseudonymizer::new(&PseudonymConfig::default()).unwrap();
        AuditLog::open(dir.path().join("logs/audit.jsonl"), masker)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn append_masks_and_chains() {
        let dir = TempDir::new().unwrap();
        let log = open(&dir).await;

        let q = r#"INSERT DATA { <urn:p> voc:vorname "Max" . }"#;
        let first = log
            .append(record(AuditStatus::Applied, q).with_undo(Some(q.replace("INSERT", "DELETE"))))
            .await
            .unwrap();
        let second = log
            .append(record(AuditStatus::Failed, q).with_error("500 boom"))
            .await
            .unwrap();

        assert!(!first.statement.contains("Max"));
        assert!(!first.undo_statement.as_deref().unwrap().contains("Max"));
        assert_eq!(first.prev_hash, GENESIS_HASH);
        assert_eq!(second.prev_hash, first.hash);
        assert_eq!(log.verify_integrity().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn tail_is_newest_first_and_clamped() {
        let dir = TempDir::new().unwrap();
        let log = open(&dir).await;
        for i in 0..3 {
            log.append(record(AuditStatus::Applied, &format!("INSERT DATA {{ <urn:a> <urn:p> {i} . }}")))
                .await
                .unwrap();
        }

        let two = log.tail(2).await.unwrap();
        assert_eq!(two.len(), 2);
        assert!(two[0].statement.contains(" 2 "));
        assert!(two[1].statement.contains(" 1 "));

        assert_eq!(log.tail(0).await.unwrap().len(), 1);
        assert_eq!(log.tail(10_000).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn tail_of_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let log = open(&dir).await;
        assert!(log.tail(10).await.unwrap().is_empty());
        assert_eq!(log.verify_integrity().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn tail_skips_malformed_lines() {
        let dir = TempDir::new().unwrap();
        let log = open(&dir).await;
        log.append(record(AuditStatus::Applied, "INSERT DATA { }"))
            .await
            .unwrap();
        let mut raw = fs::read_to_string(log.path()).await.unwrap();
        raw.push_str("not json\n");
        fs::write(log.path(), raw).await.unwrap();

        assert_eq!(log.tail(10).await.unwrap().len(), 1);
        assert!(log.verify_integrity().await.unwrap_err().is_corruption());
    }

    #[tokio::test]
    async fn tampering_breaks_the_chain() {
        let dir = TempDir::new().unwrap();
        let log = open(&dir).await;
        log.append(record(AuditStatus::Applied, "INSERT DATA { <urn:a> <urn:p> 1 . }"))
            .await
            .unwrap();
        log.append(record(AuditStatus::Applied, "INSERT DATA { <urn:a> <urn:p> 2 . }"))
            .await
            .unwrap();

        let raw = fs::read_to_string(log.path()).await.unwrap();
        fs::write(log.path(), raw.replacen("<urn:p> 1", "<urn:p> 9", 1))
            .await
            .unwrap();

        let err = log.verify_integrity().await.unwrap_err();
        assert!(matches!(err, AuditError::IntegrityViolation { line: 1 }));
    }

    #[tokio::test]
    async fn reopening_continues_the_chain() {
        let dir = TempDir::new().unwrap();
        let first = open(&dir).await;
        let a = first
            .append(record(AuditStatus::Applied, "INSERT DATA { }"))
            .await
            .unwrap();
        drop(first);

        let reopened = open(&dir).await;
        let b = reopened
            .append(record(AuditStatus::UndoApplied, "DELETE DATA { }"))
            .await
            .unwrap();
        assert_eq!(b.prev_hash, a.hash);
        assert_eq!(reopened.verify_integrity().await.unwrap(), 2);
    }
}
