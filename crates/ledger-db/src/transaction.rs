//! # Transaction Manager
//!
//! Begin/commit/rollback on top of [`TransactionContext`] and the pool.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   NotStarted ──begin()──► Active ──commit()───► Committed              │
//! │                              │        │                                 │
//! │                              │        └─ COMMIT fails ─┐                │
//! │                              │                         ▼                │
//! │                              └──rollback()────────► RolledBack         │
//! │                                                                         │
//! │   Committed / RolledBack are terminal. Any other call returns          │
//! │   DbError::IllegalTransactionState. A manager is never reused.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Three Ways to Draw the Boundary
//! ```text
//! Explicit     let mut tx = db.transaction();
//!              tx.begin(&mut ctx).await?;  ...  tx.commit(&mut ctx).await?;
//!
//! Wrapped      run_in_transaction(&db, |ctx| Box::pin(async move { ... })).await
//!
//! Declarative  let op = Transactional::new(db, "transfer", |ctx, args| ...);
//!              op.call(args).await
//! ```
//! Wrapped and declarative use the same protocol: commit on `Ok`, roll back
//! on `Err` and hand the error back untouched.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::context::TransactionContext;
use crate::error::{DbError, DbResult};
use crate::pool::Database;

/// Takes the SQLite write lock at begin; concurrent writers wait on
/// `busy_timeout` here.
pub(crate) const BEGIN_SQL: &str = "BEGIN IMMEDIATE";
pub(crate) const COMMIT_SQL: &str = "COMMIT";
pub(crate) const ROLLBACK_SQL: &str = "ROLLBACK";

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransactionState {
    NotStarted,
    Active,
    Committed,
    RolledBack,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransactionState::NotStarted => "not started",
            TransactionState::Active => "active",
            TransactionState::Committed => "committed",
            TransactionState::RolledBack => "rolled back",
        };
        f.write_str(label)
    }
}

// =============================================================================
// Transaction Manager
// =============================================================================

/// Drives one transaction through its states.
#[derive(Debug)]
pub struct TransactionManager {
    db: Database,
    state: TransactionState,
    id: Uuid,
}

impl TransactionManager {
    pub fn new(db: Database) -> Self {
        TransactionManager {
            db,
            state: TransactionState::NotStarted,
            id: Uuid::new_v4(),
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Correlation id for log lines.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Leases a connection, opens a transaction on it and binds it to `ctx`.
    ///
    /// ## Errors
    /// * `IllegalTransactionState` - not in `NotStarted`
    /// * `Acquisition` - no connection within `acquire_timeout`
    /// * `ContextAlreadyBound` - `ctx` already holds a connection; the fresh
    ///   lease is released
    /// * `Semantic` - `BEGIN` itself failed
    pub async fn begin(&mut self, ctx: &mut TransactionContext) -> DbResult<()> {
        self.ensure_state("begin", TransactionState::NotStarted)?;

        let mut conn = self.db.acquire().await?;
        if ctx.is_bound() {
            drop(conn);
            return Err(DbError::ContextAlreadyBound);
        }

        sqlx::query(BEGIN_SQL)
            .execute(&mut *conn)
            .await
            .map_err(|e| self.db.translator().translate("begin", BEGIN_SQL, e))?;
        conn.set_in_transaction(true);

        let lease_id = conn.lease_id();
        ctx.bind(conn)?;
        self.state = TransactionState::Active;

        info!(transaction_id = %self.id, lease_id, "Transaction started");
        Ok(())
    }

    /// Commits, unbinds and releases.
    ///
    /// If `COMMIT` fails the transaction is rolled back, the connection is
    /// still released, and the manager ends in `RolledBack`.
    pub async fn commit(&mut self, ctx: &mut TransactionContext) -> DbResult<()> {
        self.ensure_state("commit", TransactionState::Active)?;

        let Some(mut conn) = ctx.unbind() else {
            self.state = TransactionState::RolledBack;
            return Err(DbError::ContextNotBound);
        };

        let result = sqlx::query(COMMIT_SQL).execute(&mut *conn).await;
        match result {
            Ok(_) => {
                conn.set_in_transaction(false);
                drop(conn);
                self.state = TransactionState::Committed;
                info!(transaction_id = %self.id, "Transaction committed");
                Ok(())
            }
            Err(raw) => {
                let err = self.db.translator().translate("commit", COMMIT_SQL, raw);
                warn!(transaction_id = %self.id, error = %err, "Commit failed, rolling back");

                let rollback = sqlx::query(ROLLBACK_SQL).execute(&mut *conn).await;
                match rollback {
                    Ok(_) => {
                        conn.set_in_transaction(false);
                        drop(conn);
                    }
                    Err(e) => {
                        error!(
                            transaction_id = %self.id,
                            error = %e,
                            "Rollback after failed commit failed"
                        );
                        conn.discard();
                    }
                }

                self.state = TransactionState::RolledBack;
                Err(err.into())
            }
        }
    }

    /// Rolls back, unbinds and releases.
    ///
    /// The connection is released even if `ROLLBACK` fails; it is closed
    /// rather than returned to the pool in that case.
    pub async fn rollback(&mut self, ctx: &mut TransactionContext) -> DbResult<()> {
        self.ensure_state("rollback", TransactionState::Active)?;
        self.state = TransactionState::RolledBack;

        let Some(mut conn) = ctx.unbind() else {
            return Err(DbError::ContextNotBound);
        };

        let result = sqlx::query(ROLLBACK_SQL).execute(&mut *conn).await;
        match result {
            Ok(_) => {
                conn.set_in_transaction(false);
                drop(conn);
                info!(transaction_id = %self.id, "Transaction rolled back");
                Ok(())
            }
            Err(raw) => {
                conn.discard();
                Err(self
                    .db
                    .translator()
                    .translate("rollback", ROLLBACK_SQL, raw)
                    .into())
            }
        }
    }

    fn ensure_state(&self, operation: &'static str, expected: TransactionState) -> DbResult<()> {
        if self.state != expected {
            return Err(DbError::IllegalTransactionState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }
}

// =============================================================================
// Wrapped Style
// =============================================================================

/// Future returned by a unit of work running inside a transaction.
pub type TxFuture<'c, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'c>>;

/// Runs `work` inside a fresh transaction.
///
/// `Ok` commits; `Err` rolls back and is returned unchanged. A failed
/// rollback is logged and does not replace the original error.
///
/// ## Example
/// ```rust,ignore
/// let balance = run_in_transaction(&db, |ctx| {
///     let accounts = accounts.clone();
///     Box::pin(async move {
///         let account = accounts.find_by_key(ctx, "memberA").await?;
///         accounts.update_balance(ctx, "memberA", account.balance + 1).await?;
///         Ok::<_, DbError>(account.balance + 1)
///     })
/// })
/// .await?;
/// ```
pub async fn run_in_transaction<T, E, F>(db: &Database, work: F) -> Result<T, E>
where
    F: for<'c> FnOnce(&'c mut TransactionContext) -> TxFuture<'c, T, E>,
    E: From<DbError>,
{
    let mut ctx = TransactionContext::new();
    let mut tx = db.transaction();

    tx.begin(&mut ctx).await?;
    let outcome = work(&mut ctx).await;
    finish(&mut tx, &mut ctx, outcome).await
}

async fn finish<T, E>(
    tx: &mut TransactionManager,
    ctx: &mut TransactionContext,
    outcome: Result<T, E>,
) -> Result<T, E>
where
    E: From<DbError>,
{
    match outcome {
        Ok(value) => {
            tx.commit(ctx).await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback(ctx).await {
                error!(
                    transaction_id = %tx.id(),
                    error = %rollback_err,
                    "Rollback failed, returning the original error"
                );
            }
            Err(err)
        }
    }
}

// =============================================================================
// Declarative Style
// =============================================================================

type BoxedDelegate<A, T, E> =
    Box<dyn for<'c> Fn(&'c mut TransactionContext, A) -> TxFuture<'c, T, E> + Send + Sync>;

/// A business operation that always runs inside its own transaction.
///
/// Built once around a delegate; each `call` gets a fresh context and
/// manager.
///
/// ## Example
/// ```rust,ignore
/// let deposit = Transactional::new(db.clone(), "deposit", move |ctx, args: (String, i64)| {
///     let accounts = accounts.clone();
///     Box::pin(async move {
///         let (key, amount) = args;
///         let account = accounts.find_by_key(ctx, &key).await?;
///         accounts.update_balance(ctx, &key, account.balance + amount).await?;
///         Ok::<_, DbError>(())
///     })
/// });
///
/// deposit.call(("memberA".into(), 500)).await?;
/// ```
pub struct Transactional<A, T, E> {
    db: Database,
    name: String,
    delegate: BoxedDelegate<A, T, E>,
}

impl<A, T, E> Transactional<A, T, E>
where
    E: From<DbError>,
{
    pub fn new<F>(db: Database, name: impl Into<String>, delegate: F) -> Self
    where
        F: for<'c> Fn(&'c mut TransactionContext, A) -> TxFuture<'c, T, E> + Send + Sync + 'static,
    {
        Transactional {
            db,
            name: name.into(),
            delegate: Box::new(delegate),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the delegate inside a fresh transaction.
    pub async fn call(&self, args: A) -> Result<T, E> {
        let mut ctx = TransactionContext::new();
        let mut tx = self.db.transaction();

        tx.begin(&mut ctx).await?;
        debug!(
            operation = %self.name,
            transaction_id = %tx.id(),
            "Invoking transactional operation"
        );

        let outcome = (self.delegate)(&mut ctx, args).await;
        finish(&mut tx, &mut ctx, outcome).await
    }
}

impl<A, T, E> fmt::Debug for Transactional<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transactional")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use std::time::Duration;

    async fn count_members(db: &Database) -> i64 {
        let mut conn = db.acquire().await.unwrap();
        sqlx::query_scalar("SELECT COUNT(*) FROM member")
            .fetch_one(&mut *conn)
            .await
            .unwrap()
    }

    async fn insert_on(ctx: &mut TransactionContext, db: &Database, key: &str) {
        let mut conn = ctx.connection(db).await.unwrap();
        sqlx::query("INSERT INTO member (member_id, money) VALUES (?1, 0)")
            .bind(key)
            .execute(&mut *conn)
            .await
            .unwrap();
    }

    async fn wait_for_release(db: &Database) {
        for _ in 0..200 {
            if db.stats().outstanding() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_commit_lifecycle() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut ctx = TransactionContext::new();
        let mut tx = db.transaction();

        assert_eq!(tx.state(), TransactionState::NotStarted);
        tx.begin(&mut ctx).await.unwrap();
        assert_eq!(tx.state(), TransactionState::Active);
        assert!(ctx.is_bound());

        insert_on(&mut ctx, &db, "memberA").await;
        tx.commit(&mut ctx).await.unwrap();

        assert_eq!(tx.state(), TransactionState::Committed);
        assert!(!ctx.is_bound());
        assert_eq!(db.stats().outstanding(), 0);
        assert_eq!(count_members(&db).await, 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut ctx = TransactionContext::new();
        let mut tx = db.transaction();

        tx.begin(&mut ctx).await.unwrap();
        insert_on(&mut ctx, &db, "memberA").await;
        tx.rollback(&mut ctx).await.unwrap();

        assert_eq!(tx.state(), TransactionState::RolledBack);
        assert_eq!(db.stats().outstanding(), 0);
        assert_eq!(count_members(&db).await, 0);
    }

    #[tokio::test]
    async fn test_illegal_transitions_are_fatal() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut ctx = TransactionContext::new();
        let mut tx = db.transaction();

        let err = tx.commit(&mut ctx).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::IllegalTransactionState {
                operation: "commit",
                state: TransactionState::NotStarted
            }
        ));
        assert!(err.is_fatal());
        assert!(tx.rollback(&mut ctx).await.unwrap_err().is_fatal());

        tx.begin(&mut ctx).await.unwrap();
        assert!(tx.begin(&mut ctx).await.unwrap_err().is_fatal());
        tx.commit(&mut ctx).await.unwrap();

        // Terminal: no reuse
        assert!(tx.begin(&mut ctx).await.unwrap_err().is_fatal());
        assert!(tx.commit(&mut ctx).await.unwrap_err().is_fatal());
        assert!(tx.rollback(&mut ctx).await.unwrap_err().is_fatal());
        assert_eq!(db.stats().outstanding(), 0);
    }

    #[tokio::test]
    async fn test_begin_on_bound_context_releases_lease() {
        let db = Database::new(DbConfig::in_memory().max_connections(2)).await.unwrap();
        let mut ctx = TransactionContext::new();

        let mut first = db.transaction();
        first.begin(&mut ctx).await.unwrap();

        let mut second = db.transaction();
        let err = second.begin(&mut ctx).await.unwrap_err();
        assert!(matches!(err, DbError::ContextAlreadyBound));
        assert_eq!(second.state(), TransactionState::NotStarted);
        assert_eq!(db.stats().outstanding(), 1);

        first.rollback(&mut ctx).await.unwrap();
        assert_eq!(db.stats().outstanding(), 0);
    }

    #[tokio::test]
    async fn test_run_in_transaction_commits_and_rolls_back() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let handle = db.clone();
        let value = run_in_transaction(&db, move |ctx| {
            Box::pin(async move {
                insert_on(ctx, &handle, "memberA").await;
                Ok::<_, DbError>(7)
            })
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(count_members(&db).await, 1);

        let handle = db.clone();
        let err = run_in_transaction(&db, move |ctx| {
            Box::pin(async move {
                insert_on(ctx, &handle, "memberB").await;
                Err::<(), _>(DbError::not_found("Account", "memberZ"))
            })
        })
        .await
        .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(count_members(&db).await, 1);
        assert_eq!(db.stats().outstanding(), 0);
    }

    #[tokio::test]
    async fn test_transactional_matches_wrapped_style() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let handle = db.clone();
        let insert = Transactional::new(db.clone(), "insert", move |ctx, key: String| {
            let handle = handle.clone();
            Box::pin(async move {
                insert_on(ctx, &handle, &key).await;
                if key == "bad" {
                    return Err(DbError::not_found("Account", key));
                }
                Ok::<_, DbError>(())
            })
        });

        insert.call("memberA".to_string()).await.unwrap();
        insert.call("memberB".to_string()).await.unwrap();
        assert!(insert.call("bad".to_string()).await.is_err());

        assert_eq!(insert.name(), "insert");
        assert_eq!(count_members(&db).await, 2);
        assert_eq!(db.stats().outstanding(), 0);
    }

    #[tokio::test]
    async fn test_failed_commit_rolls_back_and_releases() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        {
            let mut conn = db.acquire().await.unwrap();
            for ddl in [
                "CREATE TABLE parent (id INTEGER PRIMARY KEY)",
                "CREATE TABLE child (pid INTEGER \
                 REFERENCES parent(id) DEFERRABLE INITIALLY DEFERRED)",
            ] {
                sqlx::query(ddl).execute(&mut *conn).await.unwrap();
            }
        }

        let mut ctx = TransactionContext::new();
        let mut tx = db.transaction();
        tx.begin(&mut ctx).await.unwrap();
        insert_on(&mut ctx, &db, "memberA").await;
        {
            // Orphan row: the deferred foreign key is only checked at COMMIT
            let mut conn = ctx.connection(&db).await.unwrap();
            sqlx::query("INSERT INTO child (pid) VALUES (42)")
                .execute(&mut *conn)
                .await
                .unwrap();
        }

        let err = tx.commit(&mut ctx).await.unwrap_err();
        match err {
            DbError::Semantic(semantic) => {
                assert_eq!(semantic.operation, "commit");
                assert_eq!(semantic.statement, COMMIT_SQL);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert_eq!(tx.state(), TransactionState::RolledBack);
        assert!(!ctx.is_bound());
        let stats = db.stats();
        assert_eq!(stats.acquired, stats.released);
        assert_eq!(count_members(&db).await, 0);
    }

    #[tokio::test]
    async fn test_cancelled_transaction_rolls_back() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let handle = db.clone();
        let work = run_in_transaction(&db, move |ctx| {
            Box::pin(async move {
                insert_on(ctx, &handle, "memberA").await;
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, DbError>(())
            })
        });

        assert!(tokio::time::timeout(Duration::from_millis(50), work).await.is_err());

        wait_for_release(&db).await;
        let stats = db.stats();
        assert_eq!(stats.acquired, stats.released);
        assert_eq!(count_members(&db).await, 0);
    }
}
