//! In-memory storage implementation.
//!
//! All state sits behind one mutex, so every `Store` operation is a single
//! critical section.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use ad_credits_core::{CreditBalance, CreditLedgerEntry, EntryId, UserId};

use crate::error::{Result, StoreError};
use crate::{apply_change, Store};

#[derive(Default)]
struct Inner {
    balances: HashMap<UserId, CreditBalance>,
    entries: HashMap<EntryId, CreditLedgerEntry>,
    /// Entry IDs per user in append order.
    entries_by_user: HashMap<UserId, Vec<EntryId>>,
    idempotency_keys: HashSet<(UserId, String)>,
}

impl Inner {
    fn append(&mut self, entry: &CreditLedgerEntry) {
        self.entries.insert(entry.id, entry.clone());
        self.entries_by_user
            .entry(entry.user_id)
            .or_default()
            .push(entry.id);
    }
}

/// Mutex-guarded in-process store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Database("memory store lock poisoned".into()))
    }
}

impl Store for MemoryStore {
    fn create_balance(
        &self,
        balance: &CreditBalance,
        opening: Option<&CreditLedgerEntry>,
    ) -> Result<()> {
        let mut inner = self.lock()?;

        if inner.balances.contains_key(&balance.user_id) {
            return Err(StoreError::AlreadyExists);
        }

        inner.balances.insert(balance.user_id, balance.clone());
        if let Some(entry) = opening {
            inner.append(entry);
        }

        Ok(())
    }

    fn get_balance(&self, user_id: &UserId) -> Result<Option<CreditBalance>> {
        Ok(self.lock()?.balances.get(user_id).cloned())
    }

    fn consume(&self, entry: &CreditLedgerEntry) -> Result<i64> {
        let mut inner = self.lock()?;
        let required = entry.required_credits();

        let balance = inner
            .balances
            .get_mut(&entry.user_id)
            .ok_or(StoreError::NotFound)?;

        if !balance.has_sufficient_credits(required) {
            return Err(StoreError::InsufficientCredits {
                balance: balance.total_credits,
                required,
            });
        }

        let new_balance = apply_change(balance, entry.change)?;
        inner.append(entry);

        Ok(new_balance)
    }

    fn credit(&self, entry: &CreditLedgerEntry, idempotency_key: Option<&str>) -> Result<i64> {
        let mut inner = self.lock()?;

        let mut balance = inner
            .balances
            .get(&entry.user_id)
            .cloned()
            .ok_or(StoreError::NotFound)?;
        let new_balance = apply_change(&mut balance, entry.change)?;

        if let Some(key) = idempotency_key {
            if !inner
                .idempotency_keys
                .insert((entry.user_id, key.to_string()))
            {
                return Err(StoreError::DuplicateKey {
                    key: key.to_string(),
                });
            }
        }

        inner.balances.insert(entry.user_id, balance);
        inner.append(entry);

        Ok(new_balance)
    }

    fn get_entry(&self, entry_id: &EntryId) -> Result<Option<CreditLedgerEntry>> {
        Ok(self.lock()?.entries.get(entry_id).cloned())
    }

    fn list_entries(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditLedgerEntry>> {
        let inner = self.lock()?;
        let Some(ids) = inner.entries_by_user.get(user_id) else {
            return Ok(Vec::new());
        };

        Ok(ids
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .filter_map(|id| inner.entries.get(id).cloned())
            .collect())
    }

    fn entries_for_user(&self, user_id: &UserId) -> Result<Vec<CreditLedgerEntry>> {
        let inner = self.lock()?;
        let Some(ids) = inner.entries_by_user.get(user_id) else {
            return Ok(Vec::new());
        };

        Ok(ids
            .iter()
            .filter_map(|id| inner.entries.get(id).cloned())
            .collect())
    }
}
