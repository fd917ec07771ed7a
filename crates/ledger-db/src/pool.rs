//! # Database Pool Management
//!
//! Connection pool creation, configuration and lease accounting for SQLite.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Connection Pool                           │
//! │                                                                         │
//! │  DbConfig::new(path) ← Configure pool settings                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← Create pool + run migrations            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐   ┌──────────────────┐   │
//! │  │            SqlitePool                    │   │  PoolCounters    │   │
//! │  │  ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐       │   │  acquired: 12    │   │
//! │  │  │Conn1│ │Conn2│ │Conn3│ │Conn4│ ...   │   │  released: 11    │   │
//! │  │  └─────┘ └─────┘ └─────┘ └─────┘       │   └──────────────────┘   │
//! │  └─────────────────────────────────────────┘            ▲              │
//! │       │ Database::acquire()                              │              │
//! │       ▼                                                  │              │
//! │  PooledConnection ── dropped ───────────────────────────┘              │
//! │       │                                                                 │
//! │       └── still inside BEGIN? → ROLLBACK first, then back to the pool  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! File databases run in WAL (Write-Ahead Logging) mode:
//! - Readers don't block writers
//! - Writers queue on `busy_timeout` instead of failing with SQLITE_BUSY

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info, trace, warn};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::account::AccountRepository;
use crate::transaction::{TransactionManager, ROLLBACK_SQL};
use crate::translator::{ErrorCodeTable, ExceptionTranslator};

const IN_MEMORY_PATH: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use ledger_db::DbConfig;
///
/// let config = DbConfig::new("/path/to/ledger.db")
///     .max_connections(5)
///     .acquire_timeout(Duration::from_secs(2));
/// assert_eq!(config.max_connections, 5);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// How long `acquire` waits for a free connection.
    /// Default: 30 seconds
    pub acquire_timeout: Duration,

    /// Idle timeout before closing a connection. `None` keeps it forever.
    /// Default: 10 minutes
    pub idle_timeout: Option<Duration>,

    /// Lifetime after which a connection is replaced. `None` keeps it forever.
    /// Default: 30 minutes
    pub max_lifetime: Option<Duration>,

    /// How long a statement waits on a locked database.
    /// Default: 5 seconds
    pub busy_timeout: Duration,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a new database configuration with the given path.
    ///
    /// The file is created if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            max_lifetime: Some(Duration::from_secs(1800)),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// An in-memory database lives and dies with its connection, so the pool
    /// holds exactly one and never recycles it.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(IN_MEMORY_PATH),
            max_connections: 1,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: None,
            max_lifetime: None,
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets how long `acquire` may block.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == IN_MEMORY_PATH
    }

    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        let options = if self.is_in_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
        } else {
            SqliteConnectOptions::new()
                .filename(&self.database_path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
        };

        Ok(options
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(self.busy_timeout))
    }
}

// =============================================================================
// Lease Accounting
// =============================================================================

#[derive(Debug, Default)]
struct PoolCounters {
    acquired: AtomicU64,
    released: AtomicU64,
}

impl PoolCounters {
    /// Returns the lease id (1-based).
    fn record_acquire(&self) -> u64 {
        self.acquired.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn record_release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Snapshot of the lease counters.
///
/// `acquired == released` whenever no lease is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub acquired: u64,
    pub released: u64,
}

impl PoolStats {
    /// Leases currently held.
    pub fn outstanding(&self) -> u64 {
        self.acquired.saturating_sub(self.released)
    }
}

// =============================================================================
// Pooled Connection
// =============================================================================

const EXPECT_MSG: &str = "PooledConnection used after it was released";

/// A leased connection. Dropping it is the only way to release it.
///
/// ## Drop Behaviour
/// ```text
/// in_transaction == false → back to the pool, released += 1
/// in_transaction == true  → ROLLBACK on a spawned task, then back to the
///                           pool, released += 1
///                           (no runtime: connection is closed instead)
/// ```
pub struct PooledConnection {
    conn: Option<PoolConnection<Sqlite>>,
    lease_id: u64,
    in_transaction: bool,
    counters: Arc<PoolCounters>,
}

impl PooledConnection {
    pub fn lease_id(&self) -> u64 {
        self.lease_id
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Marks whether an explicit transaction is open on this connection.
    pub(crate) fn set_in_transaction(&mut self, open: bool) {
        self.in_transaction = open;
    }

    /// Closes the connection instead of returning it to the pool.
    ///
    /// Used when its session state is unknown (a failed ROLLBACK).
    pub(crate) fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            warn!(lease_id = self.lease_id, "Discarding connection");
            drop(conn.detach());
            self.counters.record_release();
        }
    }
}

impl Deref for PooledConnection {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_deref().expect(EXPECT_MSG)
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_deref_mut().expect(EXPECT_MSG)
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        let lease_id = self.lease_id;

        if !self.in_transaction {
            drop(conn);
            self.counters.record_release();
            trace!(lease_id, "Connection released");
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let counters = Arc::clone(&self.counters);
                warn!(lease_id, "Connection dropped inside a transaction, rolling back");

                handle.spawn(async move {
                    let result = sqlx::query(ROLLBACK_SQL).execute(&mut *conn).await;
                    match result {
                        Ok(_) => drop(conn),
                        Err(e) => {
                            warn!(
                                lease_id,
                                error = %e,
                                "Rollback on drop failed, closing connection"
                            );
                            drop(conn.detach());
                        }
                    }
                    counters.record_release();
                });
            }
            Err(_) => {
                // Closing the connection discards the open transaction
                warn!(
                    lease_id,
                    "Connection dropped inside a transaction outside a runtime, closing it"
                );
                drop(conn.detach());
                self.counters.record_release();
            }
        }
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("lease_id", &self.lease_id)
            .field("in_transaction", &self.in_transaction)
            .field("live", &self.conn.is_some())
            .finish()
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle: pool, lease counters, error translation.
///
/// Cheap to clone; clones share the pool and the counters.
///
/// ## Usage
/// ```rust,ignore
/// let db = Database::new(DbConfig::in_memory()).await?;
///
/// let mut ctx = TransactionContext::new();
/// let account = db.accounts().find_by_key(&mut ctx, "memberA").await?;
///
/// assert_eq!(db.stats().outstanding(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    /// The SQLite connection pool.
    pool: SqlitePool,
    counters: Arc<PoolCounters>,
    translator: ExceptionTranslator,
}

impl Database {
    /// Creates a new database connection pool.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite:
    ///    - WAL mode for file databases
    ///    - NORMAL synchronous
    ///    - Foreign keys enabled
    ///    - busy_timeout so concurrent writers wait for the lock
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing database connection"
        );

        let connect_options = config.connect_options()?;
        debug!("Connection options configured");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );

        let db = Database {
            pool,
            counters: Arc::new(PoolCounters::default()),
            translator: ExceptionTranslator::default(),
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Replaces the vendor code table used to classify errors.
    pub fn with_error_codes(mut self, table: ErrorCodeTable) -> Self {
        self.translator = ExceptionTranslator::new(table);
        self
    }

    /// Runs database migrations.
    ///
    /// Idempotent: safe to run multiple times.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Returns (total_migrations, applied_migrations).
    ///
    /// ## Errors
    /// * `DbError::MigrationFailed` - the migrations table is missing or
    ///   unreadable
    pub async fn migration_status(&self) -> DbResult<(usize, usize)> {
        migrations::migration_status(&self.pool).await
    }

    /// Leases a connection, waiting up to `acquire_timeout`.
    ///
    /// ## Errors
    /// * `DbError::Acquisition` - pool exhausted, closed, or unable to connect
    pub async fn acquire(&self) -> DbResult<PooledConnection> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|source| DbError::Acquisition { source })?;

        let lease_id = self.counters.record_acquire();
        trace!(lease_id, "Connection acquired");

        Ok(PooledConnection {
            conn: Some(conn),
            lease_id,
            in_transaction: false,
            counters: Arc::clone(&self.counters),
        })
    }

    /// Snapshot of acquire/release counts.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            acquired: self.counters.acquired.load(Ordering::SeqCst),
            released: self.counters.released.load(Ordering::SeqCst),
        }
    }

    pub fn translator(&self) -> &ExceptionTranslator {
        &self.translator
    }

    /// Returns the accounts repository.
    pub fn accounts(&self) -> AccountRepository {
        AccountRepository::new(self.clone())
    }

    /// Returns a fresh transaction manager in the `NotStarted` state.
    pub fn transaction(&self) -> TransactionManager {
        TransactionManager::new(self.clone())
    }

    /// Closes the database connection pool.
    ///
    /// After calling close, every acquire fails with `DbError::Acquisition`.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database is healthy (can execute queries).
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
