//! # Repository Module
//!
//! Database repository implementations for the ledger.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository + Transaction Context                     │
//! │                                                                         │
//! │  TransferService                                                       │
//! │       │                                                                 │
//! │       │  accounts.find_by_key(&mut ctx, "memberA")                     │
//! │       ▼                                                                 │
//! │  AccountRepository                                                     │
//! │  ├── create(&mut ctx, &account)                                        │
//! │  ├── find_by_key(&mut ctx, key)                                        │
//! │  ├── update_balance(&mut ctx, key, balance)                            │
//! │  ├── delete(&mut ctx, key)                                             │
//! │  └── find_all / delete_all                                             │
//! │       │                                                                 │
//! │       │  ctx bound?   yes → same connection as the caller's BEGIN      │
//! │       │               no  → one-statement auto-commit lease            │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Repositories never begin, commit or roll back.
//!
//! ## Available Repositories
//!
//! - [`AccountRepository`](account::AccountRepository) - Account records in the `member` table

pub mod account;
