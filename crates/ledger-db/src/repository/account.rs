//! # Account Repository
//!
//! Database operations for account records.
//!
//! Every statement runs on the connection resolved by
//! [`TransactionContext::connection`]. Raw sqlx errors are classified by the
//! database's translator before they leave this module.

use sqlx::sqlite::SqliteQueryResult;
use tracing::debug;

use crate::context::TransactionContext;
use crate::error::{DbError, DbResult};
use crate::pool::Database;
use ledger_core::Account;

const INSERT_SQL: &str = "INSERT INTO member (member_id, money) VALUES (?1, ?2)";
const SELECT_SQL: &str = "SELECT member_id, money FROM member WHERE member_id = ?1";
const SELECT_ALL_SQL: &str = "SELECT member_id, money FROM member ORDER BY member_id";
const UPDATE_SQL: &str = "UPDATE member SET money = ?1 WHERE member_id = ?2";
const DELETE_SQL: &str = "DELETE FROM member WHERE member_id = ?1";
const DELETE_ALL_SQL: &str = "DELETE FROM member";

/// Repository for account database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.accounts();
/// let mut ctx = TransactionContext::new();
///
/// repo.create(&mut ctx, &Account::new("memberA", 10_000)).await?;
/// let account = repo.find_by_key(&mut ctx, "memberA").await?;
/// ```
#[derive(Debug, Clone)]
pub struct AccountRepository {
    db: Database,
}

impl AccountRepository {
    /// Creates a new AccountRepository.
    pub fn new(db: Database) -> Self {
        AccountRepository { db }
    }

    /// Inserts a new account and returns it as stored.
    ///
    /// ## Errors
    /// * `DbError::Semantic` with `DuplicateKey` - the key is taken
    pub async fn create(
        &self,
        ctx: &mut TransactionContext,
        account: &Account,
    ) -> DbResult<Account> {
        debug!(
            operation = "create",
            key = %account.key,
            balance = account.balance,
            "Inserting account"
        );

        let mut conn = ctx.connection(&self.db).await?;
        sqlx::query(INSERT_SQL)
            .bind(account.key.as_str())
            .bind(account.balance)
            .execute(&mut *conn)
            .await
            .map_err(|e| self.translate("create", INSERT_SQL, e))?;

        Ok(account.clone())
    }

    /// Gets an account by key.
    ///
    /// ## Errors
    /// * `DbError::NotFound` - no account has this key
    pub async fn find_by_key(&self, ctx: &mut TransactionContext, key: &str) -> DbResult<Account> {
        debug!(operation = "find_by_key", key = %key, "Loading account");

        let mut conn = ctx.connection(&self.db).await?;
        let account = sqlx::query_as::<_, Account>(SELECT_SQL)
            .bind(key)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| self.translate("find_by_key", SELECT_SQL, e))?;

        account.ok_or_else(|| DbError::not_found("Account", key))
    }

    /// Sets the balance of an account. Returns rows affected.
    ///
    /// Zero rows (unknown key) is not an error.
    pub async fn update_balance(
        &self,
        ctx: &mut TransactionContext,
        key: &str,
        balance: i64,
    ) -> DbResult<u64> {
        debug!(operation = "update_balance", key = %key, balance, "Updating balance");

        let mut conn = ctx.connection(&self.db).await?;
        let result: SqliteQueryResult = sqlx::query(UPDATE_SQL)
            .bind(balance)
            .bind(key)
            .execute(&mut *conn)
            .await
            .map_err(|e| self.translate("update_balance", UPDATE_SQL, e))?;

        Ok(result.rows_affected())
    }

    /// Deletes an account. Returns rows affected.
    pub async fn delete(&self, ctx: &mut TransactionContext, key: &str) -> DbResult<u64> {
        debug!(operation = "delete", key = %key, "Deleting account");

        let mut conn = ctx.connection(&self.db).await?;
        let result = sqlx::query(DELETE_SQL)
            .bind(key)
            .execute(&mut *conn)
            .await
            .map_err(|e| self.translate("delete", DELETE_SQL, e))?;

        Ok(result.rows_affected())
    }

    /// Lists all accounts ordered by key.
    pub async fn find_all(&self, ctx: &mut TransactionContext) -> DbResult<Vec<Account>> {
        let mut conn = ctx.connection(&self.db).await?;
        let accounts = sqlx::query_as::<_, Account>(SELECT_ALL_SQL)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| self.translate("find_all", SELECT_ALL_SQL, e))?;

        debug!(operation = "find_all", count = accounts.len(), "Loaded accounts");
        Ok(accounts)
    }

    /// Deletes every account. Returns rows affected.
    pub async fn delete_all(&self, ctx: &mut TransactionContext) -> DbResult<u64> {
        let mut conn = ctx.connection(&self.db).await?;
        let result = sqlx::query(DELETE_ALL_SQL)
            .execute(&mut *conn)
            .await
            .map_err(|e| self.translate("delete_all", DELETE_ALL_SQL, e))?;

        debug!(operation = "delete_all", rows = result.rows_affected(), "Cleared accounts");
        Ok(result.rows_affected())
    }

    fn translate(&self, operation: &str, statement: &str, raw: sqlx::Error) -> DbError {
        self.db.translator().translate(operation, statement, raw).into()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use crate::translator::ErrorCategory;

    async fn setup() -> (Database, AccountRepository) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.accounts();
        (db, repo)
    }

    #[tokio::test]
    async fn test_crud_in_auto_commit() {
        let (db, repo) = setup().await;
        let mut ctx = TransactionContext::new();

        let stored = repo.create(&mut ctx, &Account::new("memberA", 10_000)).await.unwrap();
        assert_eq!(stored, Account::new("memberA", 10_000));
        repo.create(&mut ctx, &Account::new("memberB", 500)).await.unwrap();

        let a = repo.find_by_key(&mut ctx, "memberA").await.unwrap();
        assert_eq!(a, Account::new("memberA", 10_000));

        assert_eq!(repo.update_balance(&mut ctx, "memberA", 8_000).await.unwrap(), 1);
        assert_eq!(repo.find_by_key(&mut ctx, "memberA").await.unwrap().balance, 8_000);

        let all = repo.find_all(&mut ctx).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].key, "memberA");

        assert_eq!(repo.delete(&mut ctx, "memberB").await.unwrap(), 1);
        assert_eq!(repo.delete_all(&mut ctx).await.unwrap(), 1);
        assert!(repo.find_all(&mut ctx).await.unwrap().is_empty());

        // Each statement leased and released its own connection
        let stats = db.stats();
        assert_eq!(stats.acquired, 9);
        assert_eq!(stats.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_find_missing_is_not_found() {
        let (_db, repo) = setup().await;
        let mut ctx = TransactionContext::new();

        let err = repo.find_by_key(&mut ctx, "nobody").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_unknown_key_affects_nothing() {
        let (_db, repo) = setup().await;
        let mut ctx = TransactionContext::new();

        assert_eq!(repo.update_balance(&mut ctx, "nobody", 1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_classified() {
        let (db, repo) = setup().await;
        let mut ctx = TransactionContext::new();

        repo.create(&mut ctx, &Account::new("memberA", 1)).await.unwrap();
        let err = repo.create(&mut ctx, &Account::new("memberA", 2)).await.unwrap_err();

        assert!(err.is_duplicate_key());
        match err {
            DbError::Semantic(semantic) => {
                assert_eq!(semantic.operation, "create");
                assert_eq!(semantic.statement, INSERT_SQL);
                assert!(matches!(semantic.source, sqlx::Error::Database(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(db.stats().outstanding(), 0);
    }

    #[tokio::test]
    async fn test_bad_grammar_is_classified() {
        let (db, _repo) = setup().await;

        for statement in ["SELEC 1", "select bad grammar"] {
            let mut conn = db.acquire().await.unwrap();
            let raw = sqlx::query(statement).execute(&mut *conn).await.unwrap_err();
            let err = db.translator().translate("raw", statement, raw);
            assert_eq!(err.category, ErrorCategory::SyntaxError, "{statement}");
        }

        let mut conn = db.acquire().await.unwrap();
        let raw = sqlx::query("SELECT * FROM no_such_table")
            .execute(&mut *conn)
            .await
            .unwrap_err();
        assert_eq!(db.translator().categorize(&raw), ErrorCategory::SyntaxError);
    }

    #[tokio::test]
    async fn test_statements_join_bound_transaction() {
        let (db, repo) = setup().await;
        let mut ctx = TransactionContext::new();
        let mut tx = db.transaction();

        tx.begin(&mut ctx).await.unwrap();
        repo.create(&mut ctx, &Account::new("memberA", 10)).await.unwrap();
        repo.update_balance(&mut ctx, "memberA", 20).await.unwrap();
        assert_eq!(repo.find_by_key(&mut ctx, "memberA").await.unwrap().balance, 20);
        tx.rollback(&mut ctx).await.unwrap();

        // One lease for the whole transaction
        assert_eq!(db.stats().acquired, 1);

        let err = repo.find_by_key(&mut ctx, "memberA").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
