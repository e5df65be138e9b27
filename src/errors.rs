//! Unified error type for the budget engine.
//!
//! Variants carry enough context (which bucket, link, or transaction) for the
//! caller to log and act on. Nothing in this crate retries on its own; the job
//! scheduler consults [`Error::is_retryable`].

use sea_orm::DbErr;
use thiserror::Error;

/// All failures surfaced by the engine.
#[derive(Debug, Error)]
pub enum Error {
    /// A referenced account, link, bank account, bucket, or transaction is missing.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of record that was looked up
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// A schedule cannot be computed, e.g. an unparseable recurrence rule.
    #[error("Invalid state: {message}")]
    InvalidState {
        /// What was inconsistent
        message: String,
    },

    /// The external transaction feed failed or was unreachable.
    #[error("External feed unavailable: {message}")]
    ExternalUnavailable {
        /// Error reported by the feed client
        message: String,
    },

    /// Attempted mutation of a field owned by the external source.
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Which mutation was rejected
        message: String,
    },

    /// User input failed validation.
    #[error("Validation error: {message}")]
    Validation {
        /// Which input was rejected
        message: String,
    },

    /// A spending bucket changed between read and write.
    #[error("Spending {spending_id} was modified concurrently")]
    Conflict {
        /// Bucket whose optimistic update matched no rows
        spending_id: i64,
    },

    /// An external link has no access credential stored.
    #[error("Link {link_id} has no external credentials")]
    MissingCredentials {
        /// Link that could not be synced
        link_id: i64,
    },

    /// Configuration could not be read or parsed.
    #[error("Configuration error: {message}")]
    Config {
        /// Details of the configuration failure
        message: String,
    },

    /// Error bubbled up from `SeaORM`.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// Job payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for [`Error::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for [`Error::InvalidState`].
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Whether an external scheduler should retry the operation that failed.
    ///
    /// Transient failures (feed outages, database errors, optimistic lock
    /// conflicts) are retryable. Everything else is permanent: retrying a
    /// missing link or an unparseable rule will fail the same way.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ExternalUnavailable { .. } | Self::Database(_) | Self::Conflict { .. }
        )
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
