//! sparqlgate core: the guarded mutation pipeline
//!
//! Free text or an author-written statement goes in; a confirmed, graph
//! scoped, audited write with an undo statement comes out. Nothing reaches
//! the store before a caller has confirmed a staged token.
//!
//! - [`MutationGateway`] authenticates, rate-limits and drives the pipeline
//! - [`GenerationGuardrail`] keeps the generation capability in line
//! - [`ConfirmationStore`] hands out single-use, expiring tokens
//! - [`MutationExecutor`] writes, derives the undo and audits
//!
//! # Example
//!
//! ```rust,ignore
//! use sparqlgate_core::prelude::*;
//!
//! # async fn example() -> Result<(), GatewayError> {
//! let gateway = MutationGateway::connect(GatewayConfig::from_env()?).await?;
//! let caller = Caller::new().with_origin("127.0.0.1");
//!
//! let preview = gateway
//!     .preview(&caller, "INSERT DATA { <urn:p> <urn:name> \"Anna\" . }")
//!     .await?;
//! let token = preview.token.unwrap_or_default();
//! let outcome = gateway.execute(&caller, &token).await?;
//! println!("undo with: {:?}", outcome.undo_statement);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod admission;
pub mod config;
pub mod confirmation;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod generation;
pub mod guardrail;

pub use admission::{AdmissionGate, AdmissionPolicy};
pub use config::GatewayConfig;
pub use confirmation::{ConfirmationStore, PendingConfirmation, StagedStatement, DEFAULT_TTL_SECS};
pub use error::{ConfigError, GatewayError, GenerationError};
pub use executor::{ExecutionOutcome, MutationExecutor};
pub use gateway::{Caller, Generated, MutationGateway, Preview, UndoSource};
pub use generation::{
    GenerationCapability, GenerationRequest, LlmConfig, Message, OpenAiGenerator, Role,
};
pub use guardrail::{
    extract_statement, forbidden_keyword, Draft, GenerationGuardrail, FORBIDDEN_KEYWORDS,
    MAX_ATTEMPTS,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving the gateway
    pub use crate::{
        AdmissionPolicy, Caller, ExecutionOutcome, GatewayConfig, GatewayError, Generated,
        MutationGateway, Preview, UndoSource,
    };
    pub use sparqlgate_statement::Intent;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
