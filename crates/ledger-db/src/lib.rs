//! # ledger-db: Database Layer for Ledger
//!
//! Transaction-scoped connection management over SQLite, with sqlx for
//! async access.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Ledger Data Flow                               │
//! │                                                                         │
//! │  TransferService::transfer(from, to, amount)        (service.rs)       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     ledger-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌────────────────┐   ┌───────────────┐   ┌───────────────┐   │   │
//! │  │   │ Transaction    │   │ Transaction   │   │ Account       │   │   │
//! │  │   │ Manager        │──►│ Context       │◄──│ Repository    │   │   │
//! │  │   │ begin/commit/  │   │ one bound     │   │ create/find/  │   │   │
//! │  │   │ rollback       │   │ connection    │   │ update/delete │   │   │
//! │  │   └───────┬────────┘   └───────────────┘   └───────┬───────┘   │   │
//! │  │           │ acquire                                 │ errors    │   │
//! │  │           ▼                                         ▼           │   │
//! │  │   ┌────────────────┐                     ┌─────────────────┐   │   │
//! │  │   │ Database       │                     │ Exception       │   │   │
//! │  │   │ (pool.rs)      │                     │ Translator      │   │   │
//! │  │   │ SqlitePool +   │                     │ vendor code →   │   │   │
//! │  │   │ lease counters │                     │ ErrorCategory   │   │   │
//! │  │   └────────────────┘                     └─────────────────┘   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (member table)              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool, lease accounting, configuration
//! - [`config`] - Configuration from environment variables
//! - [`translator`] - Vendor error codes → semantic categories
//! - [`context`] - Per-unit-of-work connection binding
//! - [`transaction`] - Transaction manager, wrapped and declarative styles
//! - [`repository`] - Account repository
//! - [`service`] - Transfer service
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ledger_db::{Database, DbConfig, TransferService};
//!
//! let db = Database::new(DbConfig::new("ledger.db")).await?;
//! let service = TransferService::new(db.clone());
//!
//! service.create_account("memberA", 10_000).await?;
//! service.create_account("memberB", 10_000).await?;
//! service.transfer("memberA", "memberB", 2_000).await?;
//!
//! assert_eq!(db.stats().outstanding(), 0);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod context;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod service;
pub mod transaction;
pub mod translator;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::ConfigError;
pub use context::{ContextConnection, ContextState, TransactionContext};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig, PoolStats, PooledConnection};
pub use service::{KeyGenerator, RandomSuffixKeys, ServiceError, ServiceResult, TransferService};
pub use transaction::{
    run_in_transaction, TransactionManager, TransactionState, Transactional, TxFuture,
};
pub use translator::{ErrorCategory, ErrorCodeTable, ExceptionTranslator, SemanticError};

// Repository re-exports for convenience
pub use repository::account::AccountRepository;
