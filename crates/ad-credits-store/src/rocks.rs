//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.
//! Compound writes go through a single `WriteBatch`; read-check-write sequences
//! hold `write_lock` so the conditional decrement in `consume` is atomic.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use ad_credits_core::{CreditBalance, CreditLedgerEntry, EntryId, UserId};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{apply_change, Store};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path.as_ref(), cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::debug!(path = %path.as_ref().display(), "RocksDB store opened");

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Database("write lock poisoned".into()))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Stage an entry and its user index row.
    fn stage_entry(&self, batch: &mut WriteBatch, entry: &CreditLedgerEntry) -> Result<()> {
        let cf_entries = self.cf(cf::ENTRIES)?;
        let cf_by_user = self.cf(cf::ENTRIES_BY_USER)?;

        batch.put_cf(&cf_entries, keys::entry_key(&entry.id), Self::serialize(entry)?);
        batch.put_cf(
            &cf_by_user,
            keys::user_entry_key(&entry.user_id, &entry.id),
            [],
        );
        Ok(())
    }

    /// Stage a balance row.
    fn stage_balance(&self, batch: &mut WriteBatch, balance: &CreditBalance) -> Result<()> {
        let cf_balances = self.cf(cf::BALANCES)?;
        batch.put_cf(
            &cf_balances,
            keys::balance_key(&balance.user_id),
            Self::serialize(balance)?,
        );
        Ok(())
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Entry IDs for a user in ascending (oldest first) order.
    fn entry_ids_for_user(&self, user_id: &UserId) -> Result<Vec<EntryId>> {
        let cf_by_user = self.cf(cf::ENTRIES_BY_USER)?;
        let prefix = keys::user_entries_prefix(user_id);

        let iter = self
            .db
            .iterator_cf(&cf_by_user, IteratorMode::From(&prefix, Direction::Forward));

        let mut ids = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(&prefix) {
                break;
            }

            let id = keys::entry_id_from_user_key(&key)
                .ok_or_else(|| StoreError::Database("malformed entry index key".into()))?;
            ids.push(id);
        }

        Ok(ids)
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Balance Operations
    // =========================================================================

    fn create_balance(
        &self,
        balance: &CreditBalance,
        opening: Option<&CreditLedgerEntry>,
    ) -> Result<()> {
        let _guard = self.lock()?;

        if self.get_balance(&balance.user_id)?.is_some() {
            return Err(StoreError::AlreadyExists);
        }

        let mut batch = WriteBatch::default();
        self.stage_balance(&mut batch, balance)?;
        if let Some(entry) = opening {
            self.stage_entry(&mut batch, entry)?;
        }

        self.write(batch)
    }

    fn get_balance(&self, user_id: &UserId) -> Result<Option<CreditBalance>> {
        let cf = self.cf(cf::BALANCES)?;

        self.db
            .get_cf(&cf, keys::balance_key(user_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    // =========================================================================
    // Compound Operations
    // =========================================================================

    fn consume(&self, entry: &CreditLedgerEntry) -> Result<i64> {
        let _guard = self.lock()?;
        let required = entry.required_credits();

        let mut balance = self
            .get_balance(&entry.user_id)?
            .ok_or(StoreError::NotFound)?;

        if !balance.has_sufficient_credits(required) {
            return Err(StoreError::InsufficientCredits {
                balance: balance.total_credits,
                required,
            });
        }

        let new_balance = apply_change(&mut balance, entry.change)?;

        let mut batch = WriteBatch::default();
        self.stage_balance(&mut batch, &balance)?;
        self.stage_entry(&mut batch, entry)?;
        self.write(batch)?;

        Ok(new_balance)
    }

    fn credit(&self, entry: &CreditLedgerEntry, idempotency_key: Option<&str>) -> Result<i64> {
        let _guard = self.lock()?;

        let mut balance = self
            .get_balance(&entry.user_id)?
            .ok_or(StoreError::NotFound)?;
        let new_balance = apply_change(&mut balance, entry.change)?;

        let mut batch = WriteBatch::default();

        if let Some(key) = idempotency_key {
            let cf_keys = self.cf(cf::IDEMPOTENCY_KEYS)?;
            let stored_key = keys::idempotency_key(&entry.user_id, key);

            let seen = self
                .db
                .get_cf(&cf_keys, &stored_key)
                .map_err(|e| StoreError::Database(e.to_string()))?
                .is_some();
            if seen {
                return Err(StoreError::DuplicateKey {
                    key: key.to_string(),
                });
            }

            batch.put_cf(&cf_keys, &stored_key, keys::entry_key(&entry.id));
        }

        self.stage_balance(&mut batch, &balance)?;
        self.stage_entry(&mut batch, entry)?;
        self.write(batch)?;

        Ok(new_balance)
    }

    // =========================================================================
    // Ledger Queries
    // =========================================================================

    fn get_entry(&self, entry_id: &EntryId) -> Result<Option<CreditLedgerEntry>> {
        let cf = self.cf(cf::ENTRIES)?;

        self.db
            .get_cf(&cf, keys::entry_key(entry_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_entries(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditLedgerEntry>> {
        let mut ids = self.entry_ids_for_user(user_id)?;

        // Reverse to get newest first
        ids.reverse();

        let mut entries = Vec::new();
        for id in ids.into_iter().skip(offset).take(limit) {
            if let Some(entry) = self.get_entry(&id)? {
                entries.push(entry);
            }
        }

        Ok(entries)
    }

    fn entries_for_user(&self, user_id: &UserId) -> Result<Vec<CreditLedgerEntry>> {
        let mut entries = Vec::new();
        for id in self.entry_ids_for_user(user_id)? {
            if let Some(entry) = self.get_entry(&id)? {
                entries.push(entry);
            }
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ad_credits_core::reasons;
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn register(store: &RocksStore, credits: i64) -> UserId {
        let user_id = UserId::generate();
        let opening = CreditLedgerEntry::grant(user_id, credits, reasons::WELCOME_CREDITS, None);
        store
            .create_balance(&CreditBalance::new(user_id, credits), Some(&opening))
            .unwrap();
        user_id
    }

    #[test]
    fn balance_and_opening_entry_written_together() {
        let (store, _dir) = create_test_store();
        let user_id = register(&store, 15);

        assert_eq!(store.get_balance(&user_id).unwrap().unwrap().total_credits, 15);
        let entries = store.entries_for_user(&user_id).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].change, 15);

        let again = store.create_balance(&CreditBalance::new(user_id, 15), None);
        assert!(matches!(again, Err(StoreError::AlreadyExists)));
    }

    #[test]
    fn consume_and_list() {
        let (store, _dir) = create_test_store();
        let user_id = register(&store, 15);

        for ref_id in ["first", "second"] {
            let spend =
                CreditLedgerEntry::debit(user_id, "meta_ad_generation", 5, Some(ref_id.into()));
            store.consume(&spend).unwrap();
        }

        assert_eq!(store.get_balance(&user_id).unwrap().unwrap().total_credits, 5);

        let newest = store.list_entries(&user_id, 1, 0).unwrap();
        assert_eq!(newest[0].ref_id.as_deref(), Some("second"));

        let all = store.list_entries(&user_id, 10, 0).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].reason, reasons::WELCOME_CREDITS);
    }

    #[test]
    fn insufficient_credits_leaves_state_alone() {
        let (store, _dir) = create_test_store();
        let user_id = register(&store, 4);

        let spend = CreditLedgerEntry::debit(user_id, "image_generation", 5, None);
        let result = store.consume(&spend);

        assert!(matches!(
            result,
            Err(StoreError::InsufficientCredits {
                balance: 4,
                required: 5
            })
        ));
        assert_eq!(store.entries_for_user(&user_id).unwrap().len(), 1);
        assert_eq!(store.get_balance(&user_id).unwrap().unwrap().total_credits, 4);
    }

    #[test]
    fn credit_overflow_leaves_state_alone() {
        let (store, _dir) = create_test_store();
        let user_id = register(&store, 15);

        let grant = CreditLedgerEntry::grant(user_id, i64::MAX, reasons::CREDIT_PURCHASE, None);
        let result = store.credit(&grant, Some("cs_huge"));

        assert!(matches!(result, Err(StoreError::BalanceOverflow { .. })));
        assert_eq!(store.entries_for_user(&user_id).unwrap().len(), 1);
        assert_eq!(store.get_balance(&user_id).unwrap().unwrap().total_credits, 15);

        let retry = CreditLedgerEntry::grant(user_id, 10, reasons::CREDIT_PURCHASE, None);
        assert_eq!(store.credit(&retry, Some("cs_huge")).unwrap(), 25);
    }

    #[test]
    fn credit_idempotency_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let user_id = {
            let store = RocksStore::open(dir.path()).unwrap();
            let user_id = register(&store, 0);
            let refund = CreditLedgerEntry::refund(user_id, 5, Some("orig".into()));
            assert_eq!(store.credit(&refund, Some("orig")).unwrap(), 5);
            user_id
        };

        let store = RocksStore::open(dir.path()).unwrap();
        let again = CreditLedgerEntry::refund(user_id, 5, Some("orig".into()));
        let result = store.credit(&again, Some("orig"));

        assert!(matches!(result, Err(StoreError::DuplicateKey { .. })));
        assert_eq!(store.get_balance(&user_id).unwrap().unwrap().total_credits, 5);
    }
}
