//! # Validation Module
//!
//! Input validation and business rules for Ledger.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Before the transaction (no connection held)                  │
//! │  ├── amount > 0, from != to                                            │
//! │  └── account key shape, opening balance                                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Inside the transaction (THIS MODULE: business rules)         │
//! │  └── recipient is not the reserved key → else rollback                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  └── UNIQUE(member_id) → DuplicateKey → one retry on create            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::MAX_KEY_LENGTH;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Rule name reported when a transfer targets the reserved recipient.
pub const FORBIDDEN_RECIPIENT_RULE: &str = "forbidden-recipient";

// =============================================================================
// Key Validators
// =============================================================================

/// Validates an account key.
///
/// ## Rules
/// - Must not be empty
/// - At most [`MAX_KEY_LENGTH`] characters
/// - No whitespace
///
/// ## Example
/// ```rust
/// use ledger_core::validation::validate_account_key;
///
/// assert!(validate_account_key("memberA").is_ok());
/// assert!(validate_account_key("").is_err());
/// assert!(validate_account_key("has space").is_err());
/// ```
pub fn validate_account_key(key: &str) -> ValidationResult<()> {
    if key.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "key".to_string(),
        });
    }

    if key.chars().count() > MAX_KEY_LENGTH {
        return Err(ValidationError::TooLong {
            field: "key".to_string(),
            max: MAX_KEY_LENGTH,
        });
    }

    if key.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: "key".to_string(),
            reason: "must not contain whitespace".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a transfer amount. Must be positive.
pub fn validate_amount(amount: i64) -> ValidationResult<()> {
    if amount <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }

    Ok(())
}

/// Validates the balance an account is opened with. Zero is allowed.
pub fn validate_opening_balance(balance: i64) -> ValidationResult<()> {
    if balance < 0 {
        return Err(ValidationError::OutOfRange {
            field: "balance".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates the shape of a transfer request before any connection is taken.
pub fn validate_transfer(from: &str, to: &str, amount: i64) -> ValidationResult<()> {
    validate_account_key(from)?;
    validate_account_key(to)?;
    validate_amount(amount)?;

    if from == to {
        return Err(ValidationError::SameAccount {
            key: from.to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Business Rules
// =============================================================================

/// Rejects the reserved recipient.
///
/// ## Transfer Workflow
/// ```text
/// find(from), find(to)
///      │
///      ▼
/// update(from, from - amount)      ← already written
///      │
///      ▼
/// ensure_recipient_allowed(to)     ← THIS FUNCTION
///      │
///      ├── to == forbidden → BusinessRuleViolation → ROLLBACK (debit undone)
///      │
///      └── OK → update(to, to + amount) → COMMIT
/// ```
pub fn ensure_recipient_allowed(to: &str, forbidden_key: &str) -> CoreResult<()> {
    if to == forbidden_key {
        return Err(CoreError::rule_violation(FORBIDDEN_RECIPIENT_RULE, to));
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_FORBIDDEN_KEY;

    #[test]
    fn test_validate_account_key() {
        assert!(validate_account_key("memberA").is_ok());
        assert!(validate_account_key("ex").is_ok());

        assert!(validate_account_key("").is_err());
        assert!(validate_account_key("   ").is_err());
        assert!(validate_account_key("tab\tkey").is_err());
        assert!(validate_account_key(&"k".repeat(MAX_KEY_LENGTH + 1)).is_err());
        assert!(validate_account_key(&"k".repeat(MAX_KEY_LENGTH)).is_ok());
    }

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount(1).is_ok());
        assert!(validate_amount(2_000).is_ok());

        assert!(validate_amount(0).is_err());
        assert!(validate_amount(-5).is_err());
    }

    #[test]
    fn test_validate_opening_balance() {
        assert!(validate_opening_balance(0).is_ok());
        assert!(validate_opening_balance(10_000).is_ok());
        assert!(validate_opening_balance(-1).is_err());
    }

    #[test]
    fn test_validate_transfer_rejects_self_transfer() {
        let err = validate_transfer("memberA", "memberA", 10).unwrap_err();
        assert!(matches!(err, ValidationError::SameAccount { .. }));

        assert!(validate_transfer("memberA", "memberB", 10).is_ok());
    }

    #[test]
    fn test_forbidden_recipient() {
        let err = ensure_recipient_allowed("ex", DEFAULT_FORBIDDEN_KEY).unwrap_err();
        match err {
            CoreError::BusinessRuleViolation { rule, key } => {
                assert_eq!(rule, FORBIDDEN_RECIPIENT_RULE);
                assert_eq!(key, "ex");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(ensure_recipient_allowed("memberB", DEFAULT_FORBIDDEN_KEY).is_ok());
        assert!(ensure_recipient_allowed("ex", "blocked").is_ok());
    }
}
