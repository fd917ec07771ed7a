//! # Exception Translator
//!
//! Turns a raw `sqlx::Error` into a vendor-independent [`ErrorCategory`].
//!
//! ## Translation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Translation                                    │
//! │                                                                         │
//! │  sqlx::Error::Database(db_err)                                         │
//! │       │   code()    = "2067"                                           │
//! │       │   message() = "UNIQUE constraint failed: member.member_id"     │
//! │       ▼                                                                 │
//! │  ErrorCodeTable::classify(code, message)                               │
//! │       │   rules checked in order, first match wins                     │
//! │       ▼                                                                 │
//! │  SemanticError { category: DuplicateKey, operation: "create",          │
//! │                  statement: "INSERT INTO member ...", source }         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Business code matches on the category, never on "2067"               │
//! │                                                                         │
//! │  sqlx::Error::{Io, Tls, PoolTimedOut, PoolClosed, WorkerCrashed, ..}   │
//! │       └──► Connectivity (no vendor code involved)                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## SQLite Codes
//! sqlx enables SQLite's extended result codes, so `code()` reports values
//! such as 2067 (`SQLITE_CONSTRAINT_UNIQUE`). The low byte of an extended
//! code is the primary code (2067 & 0xff = 19, `SQLITE_CONSTRAINT`); rules
//! with a primary code match every extended code derived from it.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

// =============================================================================
// Categories
// =============================================================================

/// Semantic classification of a storage-engine failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// A unique constraint rejected the write.
    DuplicateKey,
    /// The statement text is not valid for this engine.
    SyntaxError,
    /// The session with the engine is broken or could not be established.
    Connectivity,
    /// Anything the table does not recognise.
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorCategory::DuplicateKey => "duplicate key",
            ErrorCategory::SyntaxError => "syntax error",
            ErrorCategory::Connectivity => "connectivity failure",
            ErrorCategory::Unknown => "unknown database error",
        };
        f.write_str(label)
    }
}

/// A classified storage failure, carrying the original cause.
#[derive(Debug, Error)]
#[error("{category} during {operation}: {source}")]
pub struct SemanticError {
    pub category: ErrorCategory,

    /// Repository or transaction operation that issued the statement.
    pub operation: String,

    /// Statement text, for diagnostics.
    pub statement: String,

    /// The raw error as reported by sqlx.
    pub source: sqlx::Error,
}

// =============================================================================
// Code Table
// =============================================================================

#[derive(Debug, Clone)]
struct CodeRule {
    code: i32,
    marker: Option<&'static str>,
    category: ErrorCategory,
}

/// Mapping from vendor diagnostic codes to categories.
///
/// ## Example
/// ```rust
/// use ledger_db::translator::{ErrorCategory, ErrorCodeTable};
///
/// let sqlite = ErrorCodeTable::sqlite();
/// assert_eq!(
///     sqlite.classify(Some("2067"), "UNIQUE constraint failed: member.member_id"),
///     ErrorCategory::DuplicateKey
/// );
///
/// // Other vendors are described the same way
/// let h2 = ErrorCodeTable::new()
///     .duplicate_key(23505)
///     .syntax_error(42122);
/// assert_eq!(h2.classify(Some("42122"), "Column not found"), ErrorCategory::SyntaxError);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ErrorCodeTable {
    rules: Vec<CodeRule>,
    match_primary: bool,
}

impl ErrorCodeTable {
    /// Creates an empty table: every code classifies as Unknown.
    pub fn new() -> Self {
        ErrorCodeTable::default()
    }

    /// The table for SQLite.
    pub fn sqlite() -> Self {
        ErrorCodeTable::new()
            .primary_codes(true)
            // SQLITE_CONSTRAINT_UNIQUE, SQLITE_CONSTRAINT_PRIMARYKEY
            .duplicate_key(2067)
            .duplicate_key(1555)
            // SQLITE_CONSTRAINT without extended codes
            .rule(19, Some("UNIQUE constraint failed"), ErrorCategory::DuplicateKey)
            // SQLITE_ERROR covers grammar and much else; the message decides
            .rule(1, Some("syntax error"), ErrorCategory::SyntaxError)
            .rule(1, Some("incomplete input"), ErrorCategory::SyntaxError)
            .rule(1, Some("no such table"), ErrorCategory::SyntaxError)
            .rule(1, Some("no such column"), ErrorCategory::SyntaxError)
            // SQLITE_IOERR*, SQLITE_CANTOPEN, SQLITE_NOTADB
            .connectivity(10)
            .connectivity(14)
            .connectivity(26)
    }

    /// Whether rules also match on the low byte of an extended code.
    pub fn primary_codes(mut self, enabled: bool) -> Self {
        self.match_primary = enabled;
        self
    }

    pub fn duplicate_key(self, code: i32) -> Self {
        self.rule(code, None, ErrorCategory::DuplicateKey)
    }

    pub fn syntax_error(self, code: i32) -> Self {
        self.rule(code, None, ErrorCategory::SyntaxError)
    }

    pub fn connectivity(self, code: i32) -> Self {
        self.rule(code, None, ErrorCategory::Connectivity)
    }

    /// Adds a rule; with a marker, the message must contain it as well.
    pub fn rule(
        mut self,
        code: i32,
        marker: Option<&'static str>,
        category: ErrorCategory,
    ) -> Self {
        self.rules.push(CodeRule {
            code,
            marker,
            category,
        });
        self
    }

    /// Classifies a vendor code and message. Deterministic, never fails.
    pub fn classify(&self, code: Option<&str>, message: &str) -> ErrorCategory {
        let Some(code) = code.and_then(|c| c.trim().parse::<i32>().ok()) else {
            return ErrorCategory::Unknown;
        };
        let primary = code & 0xff;

        self.rules
            .iter()
            .find(|rule| {
                let code_matches =
                    rule.code == code || (self.match_primary && rule.code == primary);
                code_matches && rule.marker.map_or(true, |marker| message.contains(marker))
            })
            .map(|rule| rule.category)
            .unwrap_or(ErrorCategory::Unknown)
    }
}

// =============================================================================
// Translator
// =============================================================================

/// Classifies raw sqlx errors with an [`ErrorCodeTable`].
///
/// Cheap to clone; repositories and transaction managers share one.
#[derive(Debug, Clone)]
pub struct ExceptionTranslator {
    table: Arc<ErrorCodeTable>,
}

impl Default for ExceptionTranslator {
    fn default() -> Self {
        ExceptionTranslator::new(ErrorCodeTable::sqlite())
    }
}

impl ExceptionTranslator {
    pub fn new(table: ErrorCodeTable) -> Self {
        ExceptionTranslator {
            table: Arc::new(table),
        }
    }

    /// Wraps `raw` in a [`SemanticError`] with its category.
    pub fn translate(&self, operation: &str, statement: &str, raw: sqlx::Error) -> SemanticError {
        let category = self.categorize(&raw);

        tracing::debug!(
            operation = %operation,
            category = %category,
            error = %raw,
            "Translated database error"
        );

        SemanticError {
            category,
            operation: operation.to_string(),
            statement: statement.to_string(),
            source: raw,
        }
    }

    /// Category for a raw error without consuming it.
    pub fn categorize(&self, raw: &sqlx::Error) -> ErrorCategory {
        match raw {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code();
                self.table.classify(code.as_deref(), db_err.message())
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Configuration(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => ErrorCategory::Connectivity,
            _ => ErrorCategory::Unknown,
        }
    }
}

/// Translates with the SQLite table.
pub fn translate(operation: &str, statement: &str, raw: sqlx::Error) -> SemanticError {
    ExceptionTranslator::default().translate(operation, statement, raw)
}

// =============================================================================
// Unit Tests
// =============================================================================
