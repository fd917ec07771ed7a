//! # ledger-core: Pure Domain Logic for Ledger
//!
//! Account records and the business rules that guard fund movements.
//! Everything here is deterministic and free of I/O; the storage layer
//! (`ledger-db`) decides *where* these rules run, this crate decides *what*
//! they say.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Ledger Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 TransferService (ledger-db)                     │   │
//! │  │   transfer(from, to, amount) / create_account(key, balance)     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ calls rules inside the transaction     │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ ledger-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌────────────────┐  ┌──────────────────────┐  │   │
//! │  │   │   types   │  │   validation   │  │        error         │  │   │
//! │  │   │  Account  │  │ amount, keys,  │  │ BusinessRuleViolation│  │   │
//! │  │   │  Retry..  │  │ forbidden key  │  │ ValidationError      │  │   │
//! │  │   └───────────┘  └────────────────┘  └──────────────────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • PURE FUNCTIONS                         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use ledger_core::{Account, validation::ensure_recipient_allowed};
//!
//! let from = Account::new("memberA", 10_000);
//! assert_eq!(from.debit(2_000).unwrap(), 8_000);
//!
//! // The reserved recipient is rejected as a business rule violation
//! assert!(ensure_recipient_allowed("ex", "ex").is_err());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use types::{Account, RetryDescriptor};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Recipient key that transfers are never allowed to credit.
///
/// ## Business Reason
/// A reserved account used to exercise rollback: a transfer towards it
/// debits the sender first and must then be undone in full.
pub const DEFAULT_FORBIDDEN_KEY: &str = "ex";

/// Maximum length of an account key.
pub const MAX_KEY_LENGTH: usize = 64;
