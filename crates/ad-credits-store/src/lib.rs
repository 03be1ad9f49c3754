//! Storage layer for ad-credits.
//!
//! This crate persists the credit ledger and the per-user balance cache. Every
//! operation that touches both is applied as one unit, so the cached balance never
//! diverges from the ledger sum once an operation returns.
//!
//! # Backends
//!
//! - [`MemoryStore`]: a mutex-guarded in-process store (default; used by tests)
//! - `RocksStore`: `RocksDB` with column families, behind the `rocksdb-backend` feature
//!
//! # Example
//!
//! ```
//! use ad_credits_core::{CreditBalance, CreditLedgerEntry, UserId};
//! use ad_credits_store::{MemoryStore, Store};
//!
//! let store = MemoryStore::new();
//! let user_id = UserId::generate();
//! store.create_balance(&CreditBalance::new(user_id, 10), None).unwrap();
//!
//! let spend = CreditLedgerEntry::debit(user_id, "image_generation", 5, None);
//! assert_eq!(store.consume(&spend).unwrap(), 5);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;

#[cfg(feature = "rocksdb-backend")]
pub mod keys;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
#[cfg(feature = "rocksdb-backend")]
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use ad_credits_core::{CreditBalance, CreditLedgerEntry, EntryId, UserId};

/// The storage trait defining all ledger and balance operations.
///
/// Implementations are injected explicitly (`Arc<dyn Store>`), which lets the
/// in-memory backend stand in for a real database in tests.
pub trait Store: Send + Sync {
    // =========================================================================
    // Balance Operations
    // =========================================================================

    /// Create a balance row, optionally together with its opening ledger entry.
    ///
    /// The opening entry's change must equal `balance.total_credits`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the user already has a balance.
    fn create_balance(
        &self,
        balance: &CreditBalance,
        opening: Option<&CreditLedgerEntry>,
    ) -> Result<()>;

    /// Get the cached balance for a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_balance(&self, user_id: &UserId) -> Result<Option<CreditBalance>>;

    // =========================================================================
    // Compound Operations
    // =========================================================================

    /// Append a spend and decrement the balance as one conditional update.
    ///
    /// The check and the decrement happen under the same critical section, so two
    /// concurrent spends can never both pass against the same balance.
    ///
    /// Returns the new balance.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the user has no balance.
    /// - `StoreError::InsufficientCredits` if the balance is too low. Nothing is written.
    /// - `StoreError::BalanceOverflow` if the new total does not fit. Nothing is written.
    fn consume(&self, entry: &CreditLedgerEntry) -> Result<i64>;

    /// Append a positive entry and increment the balance as one unit.
    ///
    /// When `idempotency_key` is given it is recorded with the entry, and a second
    /// call with the same key for the same user is rejected without writing.
    ///
    /// Returns the new balance.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the user has no balance.
    /// - `StoreError::DuplicateKey` if the key was already used.
    /// - `StoreError::BalanceOverflow` if the new total does not fit. Nothing is
    ///   written and the key stays unused.
    fn credit(&self, entry: &CreditLedgerEntry, idempotency_key: Option<&str>) -> Result<i64>;

    // =========================================================================
    // Ledger Queries
    // =========================================================================

    /// Get a ledger entry by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_entry(&self, entry_id: &EntryId) -> Result<Option<CreditLedgerEntry>>;

    /// List a user's entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_entries(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditLedgerEntry>>;

    /// All of a user's entries, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn entries_for_user(&self, user_id: &UserId) -> Result<Vec<CreditLedgerEntry>>;
}

/// Apply `change` to an in-flight balance, refusing totals that overflow.
pub(crate) fn apply_change(balance: &mut CreditBalance, change: i64) -> Result<i64> {
    balance.apply(change).ok_or(StoreError::BalanceOverflow {
        balance: balance.total_credits,
        change,
    })
}
