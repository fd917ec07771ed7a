//! # Domain Types
//!
//! ## Account ↔ Storage Mapping
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │   Account (Rust)              member (SQLite)                           │
//! │   ─────────────               ───────────────                           │
//! │   key: String        ◄──►     member_id TEXT UNIQUE                     │
//! │   balance: i64       ◄──►     money     INTEGER                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Balances are plain integers (smallest currency unit). A committed transfer
//! moves an amount from one balance to another and never changes their sum.

use serde::{Deserialize, Serialize};

use crate::error::{CoreResult, ValidationError};

// =============================================================================
// Account
// =============================================================================

/// An account record, keyed by a unique business identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Account {
    /// Unique account key.
    #[cfg_attr(feature = "sqlx", sqlx(rename = "member_id"))]
    pub key: String,

    /// Current balance.
    #[cfg_attr(feature = "sqlx", sqlx(rename = "money"))]
    pub balance: i64,
}

impl Account {
    /// Creates an account record.
    pub fn new(key: impl Into<String>, balance: i64) -> Self {
        Account {
            key: key.into(),
            balance,
        }
    }

    /// Balance after taking `amount` out of this account.
    ///
    /// Negative results are allowed; only arithmetic overflow is rejected.
    pub fn debit(&self, amount: i64) -> CoreResult<i64> {
        self.balance
            .checked_sub(amount)
            .ok_or_else(|| balance_overflow().into())
    }

    /// Balance after putting `amount` into this account.
    pub fn credit(&self, amount: i64) -> CoreResult<i64> {
        self.balance
            .checked_add(amount)
            .ok_or_else(|| balance_overflow().into())
    }
}

fn balance_overflow() -> ValidationError {
    ValidationError::OutOfRange {
        field: "balance".to_string(),
        min: i64::MIN,
        max: i64::MAX,
    }
}

// =============================================================================
// Retry Descriptor
// =============================================================================

/// Describes the single recovery attempt made after a duplicate-key failure.
///
/// Never persisted; it lives for the duration of one `create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetryDescriptor {
    /// The key that collided.
    pub original_key: String,

    /// The freshly generated key used for the retry.
    pub alternate_key: String,
}

impl RetryDescriptor {
    pub fn new(original_key: impl Into<String>, alternate_key: impl Into<String>) -> Self {
        RetryDescriptor {
            original_key: original_key.into(),
            alternate_key: alternate_key.into(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    #[test]
    fn test_debit_and_credit_conserve_sum() {
        let a = Account::new("memberA", 10_000);
        let b = Account::new("memberB", 10_000);

        let a_after = a.debit(2_000).unwrap();
        let b_after = b.credit(2_000).unwrap();

        assert_eq!(a_after, 8_000);
        assert_eq!(b_after, 12_000);
        assert_eq!(a_after + b_after, a.balance + b.balance);
    }

    #[test]
    fn test_debit_may_go_negative() {
        let a = Account::new("memberA", 100);
        assert_eq!(a.debit(250).unwrap(), -150);
    }

    #[test]
    fn test_overflow_is_rejected() {
        let rich = Account::new("rich", i64::MAX);
        let err = rich.credit(1).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::OutOfRange { .. })
        ));

        let poor = Account::new("poor", i64::MIN);
        assert!(poor.debit(1).is_err());
    }

    #[test]
    fn test_account_serializes_with_domain_names() {
        let json = serde_json::to_value(Account::new("memberA", 42)).unwrap();
        assert_eq!(json["key"], "memberA");
        assert_eq!(json["balance"], 42);
    }
}
