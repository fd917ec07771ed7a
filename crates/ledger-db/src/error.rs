//! # Database Error Types
//!
//! Error types for database operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ExceptionTranslator ← Vendor code → ErrorCategory                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError::Semantic (this module) ← Plus pool/context/state faults      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ServiceError (service.rs) ← DbError | CoreError                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Caller matches on category(), never on vendor codes                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `sqlx::Error` has no `From` conversion here. Raw errors reach `DbError`
//! only through the translator, together with their operation and statement.

use thiserror::Error;

use crate::transaction::TransactionState;
use crate::translator::{ErrorCategory, SemanticError};

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// A classified storage failure.
    ///
    /// ## When This Occurs
    /// - UNIQUE violation on insert → `DuplicateKey`
    /// - Malformed statement → `SyntaxError`
    /// - Broken or unopenable database → `Connectivity`
    #[error(transparent)]
    Semantic(#[from] SemanticError),

    /// Entity not found in database.
    ///
    /// ## When This Occurs
    /// - `find_by_key` returns no row
    #[error("{entity} not found: {key}")]
    NotFound { entity: String, key: String },

    /// No connection could be taken from the pool.
    ///
    /// ## When This Occurs
    /// - Every connection is leased and `acquire_timeout` elapsed
    /// - The pool has been closed
    #[error("Could not acquire a connection: {source}")]
    Acquisition {
        #[source]
        source: sqlx::Error,
    },

    /// A connection is already bound to this transaction context.
    #[error("A connection is already bound to this transaction context")]
    ContextAlreadyBound,

    /// commit or rollback was asked for with nothing bound.
    #[error("No connection is bound to this transaction context")]
    ContextNotBound,

    /// A transaction manager was driven out of order.
    ///
    /// Programming error: never retried.
    #[error("Cannot {operation} a transaction that is {state}")]
    IllegalTransactionState {
        operation: &'static str,
        state: TransactionState,
    },

    /// Database could not be opened.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    ///
    /// ## When This Occurs
    /// - Invalid SQL in migration
    /// - Migration version conflict
    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and key.
    pub fn not_found(entity: impl Into<String>, key: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            key: key.into(),
        }
    }

    /// The semantic category, where one applies.
    ///
    /// Acquisition failures count as `Connectivity`.
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            DbError::Semantic(err) => Some(err.category),
            DbError::Acquisition { .. } | DbError::ConnectionFailed(_) => {
                Some(ErrorCategory::Connectivity)
            }
            _ => None,
        }
    }

    pub fn is_duplicate_key(&self) -> bool {
        self.category() == Some(ErrorCategory::DuplicateKey)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound { .. })
    }

    /// Faults that indicate a bug in the caller rather than a data problem.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DbError::IllegalTransactionState { .. }
                | DbError::ContextAlreadyBound
                | DbError::ContextNotBound
        )
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Unit Tests
// =============================================================================
