//! # Transaction Context
//!
//! Binds at most one leased connection to one logical unit of work.
//!
//! ## Connection Resolution
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  repository.update_balance(&mut ctx, "memberA", 8000)                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ctx.connection(&db)                                                   │
//! │       │                                                                 │
//! │       ├── bound?   → ContextConnection::Bound(&mut conn)               │
//! │       │              joins the open transaction, not released here     │
//! │       │                                                                 │
//! │       └── unbound? → ContextConnection::Leased(db.acquire())           │
//! │                      auto-commit, released when the statement is done  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A context is a plain value owned by the task running the unit of work and
//! passed down by `&mut`. Two tasks never share one.

use std::ops::{Deref, DerefMut};

use serde::Serialize;
use sqlx::SqliteConnection;

use crate::error::{DbError, DbResult};
use crate::pool::{Database, PooledConnection};

/// Whether a context currently holds a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContextState {
    Inactive,
    Active,
}

/// Per-unit-of-work connection binding.
#[derive(Debug, Default)]
pub struct TransactionContext {
    connection: Option<PooledConnection>,
}

impl TransactionContext {
    /// Creates an unbound context.
    pub fn new() -> Self {
        TransactionContext::default()
    }

    /// Binds `connection` to this context.
    ///
    /// ## Errors
    /// * `DbError::ContextAlreadyBound` - a connection is already bound; the
    ///   rejected one is dropped and returns to the pool
    pub fn bind(&mut self, connection: PooledConnection) -> DbResult<()> {
        if self.connection.is_some() {
            drop(connection);
            return Err(DbError::ContextAlreadyBound);
        }

        self.connection = Some(connection);
        Ok(())
    }

    /// The bound connection, if any.
    pub fn current(&mut self) -> Option<&mut PooledConnection> {
        self.connection.as_mut()
    }

    /// Removes and returns the bound connection. No-op when unbound.
    pub fn unbind(&mut self) -> Option<PooledConnection> {
        self.connection.take()
    }

    pub fn is_bound(&self) -> bool {
        self.connection.is_some()
    }

    pub fn state(&self) -> ContextState {
        if self.is_bound() {
            ContextState::Active
        } else {
            ContextState::Inactive
        }
    }

    /// Resolves the connection for one statement.
    pub async fn connection<'a>(&'a mut self, db: &Database) -> DbResult<ContextConnection<'a>> {
        match self.connection.as_mut() {
            Some(conn) => Ok(ContextConnection::Bound(conn)),
            None => Ok(ContextConnection::Leased(db.acquire().await?)),
        }
    }
}

/// The connection a single statement runs on.
#[derive(Debug)]
pub enum ContextConnection<'a> {
    /// The context's connection, inside its transaction.
    Bound(&'a mut PooledConnection),
    /// A short-lived auto-commit lease, released on drop.
    Leased(PooledConnection),
}

impl ContextConnection<'_> {
    pub fn is_bound(&self) -> bool {
        matches!(self, ContextConnection::Bound(_))
    }
}

impl Deref for ContextConnection<'_> {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        match self {
            ContextConnection::Bound(conn) => &***conn,
            ContextConnection::Leased(conn) => &**conn,
        }
    }
}

impl DerefMut for ContextConnection<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            ContextConnection::Bound(conn) => &mut ***conn,
            ContextConnection::Leased(conn) => &mut **conn,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
