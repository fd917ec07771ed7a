//! # Transfer Service
//!
//! Business operations over accounts, each inside one transaction boundary.
//!
//! ## Transfer Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  transfer("memberA", "memberB", 2000)                                  │
//! │       │                                                                 │
//! │       ├── validate_transfer()  ← no connection taken yet               │
//! │       ▼                                                                 │
//! │  Transactional::call ─── BEGIN IMMEDIATE ───────────────────┐          │
//! │       │                                                      │          │
//! │       ├── find_by_key(from), find_by_key(to)                 │ one      │
//! │       ├── update_balance(from, from - 2000)                  │ bound    │
//! │       ├── ensure_recipient_allowed(to) ── "ex"? → ROLLBACK   │ conn     │
//! │       └── update_balance(to, to + 2000)                      │          │
//! │       │                                                      │          │
//! │       ▼                                                      │          │
//! │  COMMIT ─────────────────────────────────────────────────────┘          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Create Retry
//! ```text
//! create("memberA") ── DuplicateKey ──► create(alternate("memberA")) ──► Ok
//!                                                   │
//!                                                   └── DuplicateKey → Err
//! ```
//! Exactly one retry, inside the same transaction. A failed INSERT only
//! rolls back its own statement in SQLite.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::context::TransactionContext;
use crate::error::DbError;
use crate::pool::Database;
use crate::repository::account::AccountRepository;
use crate::transaction::{run_in_transaction, Transactional};
use ledger_core::{
    validation, Account, CoreError, RetryDescriptor, ValidationError, DEFAULT_FORBIDDEN_KEY,
};

// =============================================================================
// Errors
// =============================================================================

/// What callers of the service see.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        ServiceError::Core(err.into())
    }
}

impl ServiceError {
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, ServiceError::Db(err) if err.is_duplicate_key())
    }

    pub fn is_business_rule_violation(&self) -> bool {
        matches!(self, ServiceError::Core(CoreError::BusinessRuleViolation { .. }))
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

// =============================================================================
// Key Generation
// =============================================================================

/// Produces the alternate key used when a create collides.
pub trait KeyGenerator: Send + Sync {
    fn alternate(&self, original: &str) -> String;
}

/// `original` followed by a random number below 10000.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSuffixKeys;

impl KeyGenerator for RandomSuffixKeys {
    fn alternate(&self, original: &str) -> String {
        let suffix = Uuid::new_v4().as_u128() % 10_000;
        format!("{original}{suffix}")
    }
}

// =============================================================================
// Transfer Service
// =============================================================================

/// Arguments of one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub from: String,
    pub to: String,
    pub amount: i64,
}

type TransferOp = Transactional<TransferRequest, (), ServiceError>;

/// Account business operations.
///
/// ## Usage
/// ```rust,ignore
/// let service = TransferService::new(db.clone());
///
/// service.create_account("memberA", 10_000).await?;
/// service.create_account("memberB", 10_000).await?;
/// service.transfer("memberA", "memberB", 2_000).await?;
/// ```
#[derive(Clone)]
pub struct TransferService {
    db: Database,
    accounts: AccountRepository,
    forbidden_key: String,
    key_generator: Arc<dyn KeyGenerator>,
    transfer_op: Arc<TransferOp>,
}

impl TransferService {
    pub fn new(db: Database) -> Self {
        let accounts = db.accounts();
        let forbidden_key = DEFAULT_FORBIDDEN_KEY.to_string();
        let transfer_op = transfer_op(&db, &accounts, &forbidden_key);

        TransferService {
            db,
            accounts,
            forbidden_key,
            key_generator: Arc::new(RandomSuffixKeys),
            transfer_op,
        }
    }

    /// Sets the key that may never receive a transfer.
    pub fn with_forbidden_key(mut self, key: impl Into<String>) -> Self {
        self.forbidden_key = key.into();
        self.transfer_op = transfer_op(&self.db, &self.accounts, &self.forbidden_key);
        self
    }

    pub fn with_key_generator(mut self, generator: impl KeyGenerator + 'static) -> Self {
        self.key_generator = Arc::new(generator);
        self
    }

    pub fn forbidden_key(&self) -> &str {
        &self.forbidden_key
    }

    /// Moves `amount` from one account to another, atomically.
    ///
    /// ## Errors
    /// * `Core(Validation)` - bad keys, non-positive amount, same account;
    ///   nothing touched the database
    /// * `Core(BusinessRuleViolation)` - recipient is the forbidden key;
    ///   the debit was rolled back
    /// * `Db(NotFound)` - either account is missing
    pub async fn transfer(&self, from: &str, to: &str, amount: i64) -> ServiceResult<()> {
        validation::validate_transfer(from, to, amount)?;

        self.transfer_op
            .call(TransferRequest {
                from: from.to_string(),
                to: to.to_string(),
                amount,
            })
            .await?;

        info!(from = %from, to = %to, amount, "Transfer committed");
        Ok(())
    }

    /// Opens an account, retrying once under an alternate key on collision.
    ///
    /// Returns the account as stored, which carries the alternate key if the
    /// retry was taken.
    pub async fn create_account(&self, key: &str, balance: i64) -> ServiceResult<Account> {
        validation::validate_account_key(key)?;
        validation::validate_opening_balance(balance)?;

        let accounts = self.accounts.clone();
        let keys = Arc::clone(&self.key_generator);
        let account = Account::new(key, balance);

        run_in_transaction(&self.db, move |ctx| {
            Box::pin(async move { create_with_retry(&accounts, &*keys, ctx, account).await })
        })
        .await
    }

    /// Reads one account outside any transaction.
    pub async fn account(&self, key: &str) -> ServiceResult<Account> {
        let mut ctx = TransactionContext::new();
        Ok(self.accounts.find_by_key(&mut ctx, key).await?)
    }

    /// Lists all accounts outside any transaction.
    pub async fn accounts(&self) -> ServiceResult<Vec<Account>> {
        let mut ctx = TransactionContext::new();
        Ok(self.accounts.find_all(&mut ctx).await?)
    }
}

impl fmt::Debug for TransferService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferService")
            .field("forbidden_key", &self.forbidden_key)
            .field("transfer_op", &self.transfer_op)
            .finish_non_exhaustive()
    }
}

fn transfer_op(
    db: &Database,
    accounts: &AccountRepository,
    forbidden_key: &str,
) -> Arc<TransferOp> {
    let accounts = accounts.clone();
    let forbidden_key = forbidden_key.to_string();

    let op = Transactional::new(db.clone(), "transfer", move |ctx, request: TransferRequest| {
        let accounts = accounts.clone();
        let forbidden_key = forbidden_key.clone();
        Box::pin(async move { move_funds(&accounts, ctx, &request, &forbidden_key).await })
    });

    Arc::new(op)
}

async fn move_funds(
    accounts: &AccountRepository,
    ctx: &mut TransactionContext,
    request: &TransferRequest,
    forbidden_key: &str,
) -> ServiceResult<()> {
    let source = accounts.find_by_key(ctx, &request.from).await?;
    let target = accounts.find_by_key(ctx, &request.to).await?;

    accounts
        .update_balance(ctx, &source.key, source.debit(request.amount)?)
        .await?;

    validation::ensure_recipient_allowed(&target.key, forbidden_key)?;

    accounts
        .update_balance(ctx, &target.key, target.credit(request.amount)?)
        .await?;

    Ok(())
}

async fn create_with_retry(
    accounts: &AccountRepository,
    keys: &dyn KeyGenerator,
    ctx: &mut TransactionContext,
    account: Account,
) -> ServiceResult<Account> {
    match accounts.create(ctx, &account).await {
        Ok(stored) => Ok(stored),
        Err(err) if err.is_duplicate_key() => {
            let retry = RetryDescriptor::new(&account.key, keys.alternate(&account.key));
            warn!(
                original_key = %retry.original_key,
                alternate_key = %retry.alternate_key,
                "Duplicate key on create, retrying once"
            );
            validation::validate_account_key(&retry.alternate_key)?;

            let alternate = Account::new(retry.alternate_key, account.balance);
            Ok(accounts.create(ctx, &alternate).await?)
        }
        Err(err) => Err(err.into()),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use ledger_core::MAX_KEY_LENGTH;

    struct FixedKey(&'static str);

    impl KeyGenerator for FixedKey {
        fn alternate(&self, _original: &str) -> String {
            self.0.to_string()
        }
    }

    async fn service() -> TransferService {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        TransferService::new(db)
    }

    #[test]
    fn test_random_suffix_keys() {
        let alternate = RandomSuffixKeys.alternate("memberA");
        let suffix: u32 = alternate.strip_prefix("memberA").unwrap().parse().unwrap();
        assert!(suffix < 10_000);
    }

    #[tokio::test]
    async fn test_validation_happens_before_any_lease() {
        let service = service().await;

        let err = service.transfer("memberA", "memberB", 0).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Core(CoreError::Validation(ValidationError::MustBePositive { .. }))
        ));

        let err = service.transfer("memberA", "memberA", 5).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Core(CoreError::Validation(ValidationError::SameAccount { .. }))
        ));

        assert!(service.create_account("", 1).await.is_err());
        assert!(service.create_account("memberA", -1).await.is_err());
        assert_eq!(service.db.stats().acquired, 0);
    }

    #[tokio::test]
    async fn test_transfer_to_missing_account_rolls_back() {
        let service = service().await;
        service.create_account("memberA", 100).await.unwrap();

        let err = service.transfer("memberA", "ghost", 10).await.unwrap_err();
        assert!(matches!(err, ServiceError::Db(DbError::NotFound { .. })));
        assert_eq!(service.account("memberA").await.unwrap().balance, 100);
    }

    #[tokio::test]
    async fn test_custom_forbidden_key() {
        let service = service().await.with_forbidden_key("vault");
        service.create_account("memberA", 100).await.unwrap();
        service.create_account("vault", 0).await.unwrap();
        service.create_account("ex", 0).await.unwrap();

        let err = service.transfer("memberA", "vault", 10).await.unwrap_err();
        assert!(err.is_business_rule_violation());

        service.transfer("memberA", "ex", 10).await.unwrap();
        assert_eq!(service.account("ex").await.unwrap().balance, 10);
        assert_eq!(service.forbidden_key(), "vault");
    }

    #[tokio::test]
    async fn test_create_retries_with_alternate_key() {
        let service = service().await.with_key_generator(FixedKey("memberA-2"));

        let first = service.create_account("memberA", 5).await.unwrap();
        assert_eq!(first.key, "memberA");

        let second = service.create_account("memberA", 7).await.unwrap();
        assert_eq!(second, Account::new("memberA-2", 7));

        // Alternate is taken too: no third attempt
        let err = service.create_account("memberA", 9).await.unwrap_err();
        assert!(err.is_duplicate_key());
        assert_eq!(service.accounts().await.unwrap().len(), 2);
        assert_eq!(service.db.stats().outstanding(), 0);
    }

    #[tokio::test]
    async fn test_alternate_key_is_validated() {
        let service = service().await;
        let key = "m".repeat(MAX_KEY_LENGTH);

        service.create_account(&key, 5).await.unwrap();

        // The suffixed alternate would exceed the key length limit
        let err = service.create_account(&key, 7).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Core(CoreError::Validation(ValidationError::TooLong { .. }))
        ));

        let stored = service.accounts().await.unwrap();
        assert_eq!(stored, vec![Account::new(key.as_str(), 5)]);
        assert_eq!(service.db.stats().outstanding(), 0);
    }
}
