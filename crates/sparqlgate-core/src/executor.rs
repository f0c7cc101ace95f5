//! Applying confirmed statements
//!
//! Every write ends in exactly one audit record, whether the store accepted
//! it or not. The record carries the staged text (placeholders intact) and
//! the undo statement, both masked by the audit log; the caller gets the
//! undo statement in clear text.

use crate::confirmation::PendingConfirmation;
use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use sparqlgate_audit::{AuditLog, AuditRecord, AuditStatus};
use sparqlgate_statement::{derive_undo, is_mutation, rehydrate, Explanation, ValidationResult};
use sparqlgate_store::TripleStore;
use std::sync::Arc;
use tracing::{error, info};

/// Result of a successful write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// `applied` or `undo_applied`
    pub status: AuditStatus,
    /// Text sent to the store
    pub executed: String,
    /// Clear-text inverse statement; always `None` for undo runs
    pub undo_statement: Option<String>,
    /// Advisory validation recorded with the write
    pub validation: ValidationResult,
    /// Shape recorded with the write
    pub explanation: Explanation,
    /// The persisted audit record
    pub record: AuditRecord,
}

/// Writes to the store and records the attempt
pub struct MutationExecutor {
    store: Arc<dyn TripleStore>,
    audit: Arc<AuditLog>,
}

impl std::fmt::Debug for MutationExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationExecutor")
            .field("audit", &self.audit.path())
            .finish_non_exhaustive()
    }
}

impl MutationExecutor {
    /// Executor over a store and an audit log
    #[must_use]
    pub fn new(store: Arc<dyn TripleStore>, audit: Arc<AuditLog>) -> Self {
        Self { store, audit }
    }

    /// Audit log in use
    #[inline]
    #[must_use]
    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// Apply a consumed confirmation
    ///
    /// # Errors
    ///
    /// - [`GatewayError::NotAMutation`] when the rehydrated text does not
    ///   write; nothing is sent or audited
    /// - [`GatewayError::RemoteFailure`] when the store rejects the write,
    ///   after a `failed` record has been appended
    /// - [`GatewayError::Audit`] when the record cannot be persisted
    pub async fn execute(
        &self,
        pending: PendingConfirmation,
    ) -> Result<ExecutionOutcome, GatewayError> {
        let staged = pending.staged;
        let executed = match &staged.placeholders {
            Some(map) => rehydrate(&staged.statement, map),
            None => staged.statement.clone(),
        };
        if !is_mutation(&executed) {
            return Err(GatewayError::NotAMutation);
        }
        let undo = derive_undo(&executed);

        if let Err(e) = self.store.update(&executed).await {
            let message = e.to_string();
            error!(error = %message, "confirmed update rejected by store");
            let record = AuditRecord::new(
                AuditStatus::Failed,
                staged.statement,
                staged.validation,
                staged.explanation,
            )
            .with_error(message.clone());
            self.audit.append(record).await?;
            return Err(GatewayError::RemoteFailure { message });
        }

        let record = AuditRecord::new(
            AuditStatus::Applied,
            staged.statement,
            staged.validation.clone(),
            staged.explanation.clone(),
        )
        .with_undo(undo.clone());
        let record = self.audit.append(record).await?;
        info!(
            kind = staged.explanation.kind.as_str(),
            undo = undo.is_some(),
            "update applied"
        );

        Ok(ExecutionOutcome {
            status: AuditStatus::Applied,
            executed,
            undo_statement: undo,
            validation: staged.validation,
            explanation: staged.explanation,
            record,
        })
    }

    /// Apply an undo statement
    ///
    /// The statement should already be graph-scoped and analysed; the
    /// analysis is recorded with it.
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute), with `undo_failed` records.
    pub async fn undo(
        &self,
        statement: &str,
        validation: ValidationResult,
        explanation: Explanation,
    ) -> Result<ExecutionOutcome, GatewayError> {
        if !is_mutation(statement) {
            return Err(GatewayError::NotAMutation);
        }

        if let Err(e) = self.store.update(statement).await {
            let message = e.to_string();
            error!(error = %message, "undo rejected by store");
            let record = AuditRecord::new(AuditStatus::UndoFailed, statement, validation, explanation)
                .with_error(message.clone());
            self.audit.append(record).await?;
            return Err(GatewayError::RemoteFailure { message });
        }

        let record = AuditRecord::new(
            AuditStatus::UndoApplied,
            statement,
            validation.clone(),
            explanation.clone(),
        );
        let record = self.audit.append(record).await?;
        info!("undo applied");

        Ok(ExecutionOutcome {
            status: AuditStatus::UndoApplied,
            executed: statement.to_string(),
            undo_statement: None,
            validation,
            explanation,
            record,
        })
    }
}
