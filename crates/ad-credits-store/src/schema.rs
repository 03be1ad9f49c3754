//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Balance cache rows, keyed by `user_id`.
    pub const BALANCES: &str = "balances";

    /// Ledger entries, keyed by `entry_id` (ULID).
    pub const ENTRIES: &str = "entries";

    /// Index: entries by user, keyed by `user_id || entry_id`.
    /// Value is empty (index only).
    pub const ENTRIES_BY_USER: &str = "entries_by_user";

    /// Used idempotency keys, keyed by `user_id || key`.
    pub const IDEMPOTENCY_KEYS: &str = "idempotency_keys";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::BALANCES,
        cf::ENTRIES,
        cf::ENTRIES_BY_USER,
        cf::IDEMPOTENCY_KEYS,
    ]
}
