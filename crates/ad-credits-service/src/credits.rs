//! Credit operations.
//!
//! [`CreditService`] gates paid actions: callers `consume` before doing the
//! expensive work, and `refund` if that work fails afterwards. The store is
//! injected explicitly so tests can run against [`ad_credits_store::MemoryStore`].

use std::sync::Arc;

use serde::Serialize;

use ad_credits_core::{
    reasons, CreditBalance, CreditCostTable, CreditError, CreditLedgerEntry, DailyUsage, EntryId,
    Result, UsageSummary, UserId,
};
use ad_credits_store::{Store, StoreError};

use crate::forwarder::{SpendEvent, UsageForwarder};

/// Default and maximum page size for usage history.
pub const MAX_HISTORY_LIMIT: usize = 100;

/// Idempotency key namespace for refunds of a named spend.
const REFUND_KEY_PREFIX: &str = "refund:";

/// Idempotency key namespace for grants carrying a reference.
const GRANT_KEY_PREFIX: &str = "grant:";

/// Result of a consume attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// Credits were deducted and one ledger entry was appended.
    Consumed {
        /// The appended entry.
        entry_id: EntryId,
        /// Credits deducted.
        cost: i64,
        /// Balance after deduction.
        balance: i64,
    },
    /// The balance did not cover the cost. Nothing was written.
    Insufficient {
        /// Current balance.
        balance: i64,
        /// Credits the action costs.
        required: i64,
    },
}

impl ConsumeOutcome {
    /// Whether the gated action may proceed.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self, Self::Consumed { .. })
    }
}

/// A refund of a paid action that failed after its credits were consumed.
#[derive(Debug, Clone, Default)]
pub struct RefundRequest {
    /// Action the original spend was for.
    pub action: String,
    /// Credits to return. Must be positive.
    pub amount: i64,
    /// Free-text reference stored on the refund entry.
    pub ref_id: Option<String>,
    /// The spend being reversed. When set, the refund is checked against it and
    /// can only be issued once.
    pub original_entry_id: Option<EntryId>,
}

/// Outcome of a refund.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundReceipt {
    /// The appended refund entry.
    pub entry_id: EntryId,
    /// Balance after the refund.
    pub balance: i64,
}

/// One page of ledger history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPage {
    /// Entries newest first.
    pub entries: Vec<CreditLedgerEntry>,
    /// Whether older entries follow this page.
    pub has_more: bool,
}

/// Comparison of the cached balance with the ledger sum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceAudit {
    /// The audited user.
    pub user_id: UserId,
    /// Cached balance.
    pub cached: i64,
    /// Sum of all ledger changes.
    pub ledger_sum: i64,
    /// Number of ledger entries.
    pub entries: usize,
    /// Whether the two agree.
    pub consistent: bool,
}

/// Credit metering operations over an injected store.
pub struct CreditService {
    store: Arc<dyn Store>,
    costs: Arc<CreditCostTable>,
    welcome_credits: i64,
    forwarder: Option<Arc<UsageForwarder>>,
}

impl CreditService {
    /// Create a service over `store` charging according to `costs`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, costs: Arc<CreditCostTable>, welcome_credits: i64) -> Self {
        Self {
            store,
            costs,
            welcome_credits,
            forwarder: None,
        }
    }

    /// Forward every successful spend to an analytics webhook.
    #[must_use]
    pub fn with_forwarder(mut self, forwarder: Arc<UsageForwarder>) -> Self {
        self.forwarder = Some(forwarder);
        self
    }

    /// The cost table in use.
    #[must_use]
    pub fn costs(&self) -> &CreditCostTable {
        &self.costs
    }

    /// Create a balance for a new user, including the welcome grant.
    ///
    /// # Errors
    ///
    /// - `CreditError::AccountAlreadyExists` if the user is already registered.
    /// - `CreditError::Storage` on storage failure.
    pub fn register(&self, user_id: UserId) -> Result<CreditBalance> {
        let balance = CreditBalance::new(user_id, self.welcome_credits);
        let opening = (self.welcome_credits > 0).then(|| {
            CreditLedgerEntry::grant(user_id, self.welcome_credits, reasons::WELCOME_CREDITS, None)
        });

        self.store
            .create_balance(&balance, opening.as_ref())
            .map_err(|e| match e {
                StoreError::AlreadyExists => CreditError::AccountAlreadyExists {
                    user_id: user_id.to_string(),
                },
                other => storage_error(other),
            })?;

        tracing::info!(
            user_id = %user_id,
            welcome_credits = self.welcome_credits,
            "Credit balance created"
        );

        Ok(balance)
    }

    /// Check the cost of `action` against the balance and deduct it if covered.
    ///
    /// Call this before performing the paid work so a failure happens before any
    /// expensive call is made.
    ///
    /// # Errors
    ///
    /// - `CreditError::UnknownAction` if the action has no cost. Nothing is written.
    /// - `CreditError::AccountNotFound` if the user has no balance.
    /// - `CreditError::Storage` on storage failure, with no partial state.
    pub fn consume(
        &self,
        user_id: UserId,
        action: &str,
        ref_id: Option<String>,
    ) -> Result<ConsumeOutcome> {
        let cost = self.costs.cost_of(action)?;
        let entry = CreditLedgerEntry::debit(user_id, action, cost, ref_id);

        match self.store.consume(&entry) {
            Ok(balance) => {
                tracing::info!(
                    user_id = %user_id,
                    action = %action,
                    cost,
                    balance,
                    entry_id = %entry.id,
                    "Credits consumed"
                );

                if let Some(forwarder) = &self.forwarder {
                    forwarder.spawn_forward(SpendEvent {
                        entry_id: entry.id.to_string(),
                        user_id: user_id.to_string(),
                        action: action.to_string(),
                        cost,
                        balance,
                        ref_id: entry.ref_id.clone(),
                    });
                }

                Ok(ConsumeOutcome::Consumed {
                    entry_id: entry.id,
                    cost,
                    balance,
                })
            }
            Err(StoreError::InsufficientCredits { balance, required }) => {
                tracing::info!(
                    user_id = %user_id,
                    action = %action,
                    balance,
                    required,
                    "Insufficient credits"
                );
                Ok(ConsumeOutcome::Insufficient { balance, required })
            }
            Err(StoreError::NotFound) => Err(CreditError::AccountNotFound {
                user_id: user_id.to_string(),
            }),
            Err(other) => {
                tracing::error!(user_id = %user_id, action = %action, error = %other, "Consume failed");
                Err(storage_error(other))
            }
        }
    }

    /// Return credits for a paid action that failed after consumption.
    ///
    /// Refunds that name the original spend are verified against it and can be
    /// issued once. Free-form refunds are not deduplicated but never return more
    /// than the action costs.
    ///
    /// # Errors
    ///
    /// - `CreditError::InvalidAmount` if the amount is not positive.
    /// - `CreditError::UnknownAction` if a free-form refund names an action with no cost.
    /// - `CreditError::InvalidRefund` if the amount exceeds the spend or the action cost.
    /// - `CreditError::DuplicateRefund` if the original spend was already refunded.
    /// - `CreditError::AccountNotFound` if the user has no balance.
    /// - `CreditError::Storage` on storage failure.
    pub fn refund(&self, user_id: UserId, request: &RefundRequest) -> Result<RefundReceipt> {
        if request.amount <= 0 {
            return Err(CreditError::InvalidAmount(format!(
                "refund amount must be positive, got {}",
                request.amount
            )));
        }

        match request.original_entry_id {
            Some(original_id) => {
                self.verify_original_spend(user_id, original_id, request.amount)?;
            }
            None => {
                let cost = self.costs.cost_of(&request.action)?;
                if request.amount > cost {
                    return Err(CreditError::InvalidRefund(format!(
                        "refund of {} exceeds the {cost} credit cost of {}",
                        request.amount, request.action
                    )));
                }
            }
        }

        let idempotency_key = request
            .original_entry_id
            .map(|original_id| format!("{REFUND_KEY_PREFIX}{original_id}"));
        let ref_id = request
            .original_entry_id
            .map(|original_id| original_id.to_string())
            .or_else(|| request.ref_id.clone())
            .or_else(|| Some(request.action.clone()));
        let entry = CreditLedgerEntry::refund(user_id, request.amount, ref_id);

        let balance = self
            .store
            .credit(&entry, idempotency_key.as_deref())
            .map_err(|e| credit_error(user_id, e))?;

        tracing::info!(
            user_id = %user_id,
            action = %request.action,
            amount = request.amount,
            balance,
            entry_id = %entry.id,
            "Credits refunded"
        );

        Ok(RefundReceipt {
            entry_id: entry.id,
            balance,
        })
    }

    /// Refund in the background. Failures are logged and otherwise dropped, which
    /// can leave the user under-credited.
    pub fn refund_detached(self: &Arc<Self>, user_id: UserId, request: RefundRequest) {
        let service = Arc::clone(self);
        let task = move || {
            if let Err(e) = service.refund(user_id, &request) {
                tracing::warn!(
                    user_id = %user_id,
                    action = %request.action,
                    amount = request.amount,
                    error = %e,
                    "Refund failed; user may be under-credited"
                );
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(task);
            }
            Err(_) => task(),
        }
    }

    fn verify_original_spend(
        &self,
        user_id: UserId,
        original_id: EntryId,
        amount: i64,
    ) -> Result<()> {
        let original = self
            .store
            .get_entry(&original_id)
            .map_err(storage_error)?
            .filter(|entry| entry.user_id == user_id)
            .ok_or_else(|| {
                CreditError::InvalidRefund(format!("no spend {original_id} for this user"))
            })?;

        if !original.is_spend() {
            return Err(CreditError::InvalidRefund(format!(
                "entry {original_id} is not a spend"
            )));
        }
        if amount > original.required_credits() {
            return Err(CreditError::InvalidRefund(format!(
                "refund of {amount} exceeds spend of {}",
                original.required_credits()
            )));
        }

        Ok(())
    }

    /// Add purchased or promotional credits.
    ///
    /// `ref_id` (for example a checkout session id) doubles as an idempotency key,
    /// so a replayed payment notification cannot credit twice.
    ///
    /// # Errors
    ///
    /// - `CreditError::InvalidAmount` if the amount is not positive or would
    ///   overflow the balance.
    /// - `CreditError::DuplicateRefund` if `ref_id` was already credited.
    /// - `CreditError::AccountNotFound` if the user has no balance.
    /// - `CreditError::Storage` on storage failure.
    pub fn grant(
        &self,
        user_id: UserId,
        amount: i64,
        reason: &str,
        ref_id: Option<String>,
    ) -> Result<i64> {
        if amount <= 0 {
            return Err(CreditError::InvalidAmount(format!(
                "grant amount must be positive, got {amount}"
            )));
        }

        let idempotency_key = ref_id
            .as_ref()
            .map(|ref_id| format!("{GRANT_KEY_PREFIX}{ref_id}"));
        let entry = CreditLedgerEntry::grant(user_id, amount, reason, ref_id);
        let balance = self
            .store
            .credit(&entry, idempotency_key.as_deref())
            .map_err(|e| credit_error(user_id, e))?;

        tracing::info!(user_id = %user_id, amount, reason = %reason, balance, "Credits granted");

        Ok(balance)
    }

    /// Read the cached balance.
    ///
    /// # Errors
    ///
    /// - `CreditError::AccountNotFound` if the user has no balance.
    /// - `CreditError::Storage` on storage failure.
    pub fn balance(&self, user_id: UserId) -> Result<CreditBalance> {
        self.store
            .get_balance(&user_id)
            .map_err(storage_error)?
            .ok_or_else(|| CreditError::AccountNotFound {
                user_id: user_id.to_string(),
            })
    }

    /// Credits spent per action. Empty (with a warning) if the ledger cannot be read.
    #[must_use]
    pub fn usage_summary(&self, user_id: UserId) -> UsageSummary {
        UsageSummary::from_entries(&self.entries_or_empty(user_id))
    }

    /// Credits spent per day. Empty (with a warning) if the ledger cannot be read.
    #[must_use]
    pub fn daily_usage(&self, user_id: UserId) -> DailyUsage {
        DailyUsage::from_entries(&self.entries_or_empty(user_id))
    }

    /// Ledger entries newest first, at most [`MAX_HISTORY_LIMIT`] per page.
    /// Empty (with a warning) if the ledger cannot be read.
    #[must_use]
    pub fn usage_history(&self, user_id: UserId, limit: usize, offset: usize) -> HistoryPage {
        let limit = limit.min(MAX_HISTORY_LIMIT);
        // One extra row tells whether another page follows.
        let mut entries = self
            .store
            .list_entries(&user_id, limit + 1, offset)
            .unwrap_or_else(|e| {
                tracing::warn!(user_id = %user_id, error = %e, "Failed to read usage history");
                Vec::new()
            });

        let has_more = entries.len() > limit;
        entries.truncate(limit);

        HistoryPage { entries, has_more }
    }

    /// Compare the cached balance with the ledger sum.
    ///
    /// # Errors
    ///
    /// - `CreditError::AccountNotFound` if the user has no balance.
    /// - `CreditError::Storage` on storage failure.
    pub fn audit(&self, user_id: UserId) -> Result<BalanceAudit> {
        let cached = self.balance(user_id)?.total_credits;
        let entries = self.store.entries_for_user(&user_id).map_err(storage_error)?;
        let ledger_sum: i64 = entries.iter().map(|e| e.change).sum();

        if ledger_sum != cached {
            tracing::error!(user_id = %user_id, cached, ledger_sum, "Balance diverged from ledger");
        }

        Ok(BalanceAudit {
            user_id,
            cached,
            ledger_sum,
            entries: entries.len(),
            consistent: ledger_sum == cached,
        })
    }

    fn entries_or_empty(&self, user_id: UserId) -> Vec<CreditLedgerEntry> {
        self.store.entries_for_user(&user_id).unwrap_or_else(|e| {
            tracing::warn!(user_id = %user_id, error = %e, "Failed to read ledger");
            Vec::new()
        })
    }
}

fn storage_error(err: StoreError) -> CreditError {
    CreditError::Storage(err.to_string())
}

fn credit_error(user_id: UserId, err: StoreError) -> CreditError {
    match err {
        StoreError::NotFound => CreditError::AccountNotFound {
            user_id: user_id.to_string(),
        },
        StoreError::DuplicateKey { key } => CreditError::DuplicateRefund { key },
        StoreError::BalanceOverflow { balance, change } => CreditError::InvalidAmount(format!(
            "adding {change} to a balance of {balance} overflows"
        )),
        other => storage_error(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ad_credits_core::actions;
    use ad_credits_store::MemoryStore;

    fn service_with(welcome: i64) -> (CreditService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let service = CreditService::new(
            store.clone(),
            Arc::new(CreditCostTable::default()),
            welcome,
        );
        (service, store)
    }

    fn ledger_len(store: &MemoryStore, user_id: UserId) -> usize {
        store.entries_for_user(&user_id).unwrap().len()
    }

    #[test]
    fn end_to_end_scenario() {
        let (service, store) = service_with(0);
        let user_id = UserId::generate();
        service.register(user_id).unwrap();
        assert_eq!(service.balance(user_id).unwrap().total_credits, 0);

        service
            .grant(user_id, 15, reasons::WELCOME_CREDITS, None)
            .unwrap();
        assert_eq!(service.balance(user_id).unwrap().total_credits, 15);

        let first = service
            .consume(user_id, actions::META_AD_GENERATION, None)
            .unwrap();
        assert!(first.success());
        assert_eq!(service.balance(user_id).unwrap().total_credits, 10);
        assert_eq!(ledger_len(&store, user_id), 2);

        for _ in 0..2 {
            assert!(service
                .consume(user_id, actions::META_AD_GENERATION, None)
                .unwrap()
                .success());
        }
        assert_eq!(service.balance(user_id).unwrap().total_credits, 0);
        assert_eq!(ledger_len(&store, user_id), 4);

        let fourth = service
            .consume(user_id, actions::META_AD_GENERATION, None)
            .unwrap();
        assert_eq!(
            fourth,
            ConsumeOutcome::Insufficient {
                balance: 0,
                required: 5
            }
        );
        assert_eq!(service.balance(user_id).unwrap().total_credits, 0);
        assert_eq!(ledger_len(&store, user_id), 4);
    }

    #[test]
    fn register_grants_welcome_credits_once() {
        let (service, store) = service_with(15);
        let user_id = UserId::generate();

        assert_eq!(service.register(user_id).unwrap().total_credits, 15);
        let entries = store.entries_for_user(&user_id).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].reason, reasons::WELCOME_CREDITS);

        let again = service.register(user_id).unwrap_err();
        assert!(matches!(again, CreditError::AccountAlreadyExists { .. }));
    }

    #[test]
    fn insufficient_consume_leaves_snapshot_unchanged() {
        let (service, store) = service_with(3);
        let user_id = UserId::generate();
        service.register(user_id).unwrap();

        let balance_before = store.get_balance(&user_id).unwrap();
        let ledger_before = store.entries_for_user(&user_id).unwrap();

        let outcome = service
            .consume(user_id, actions::IMAGE_GENERATION, None)
            .unwrap();

        assert!(!outcome.success());
        assert_eq!(store.get_balance(&user_id).unwrap(), balance_before);
        assert_eq!(store.entries_for_user(&user_id).unwrap(), ledger_before);
    }

    #[test]
    fn unknown_action_is_refused_without_writing() {
        let (service, store) = service_with(15);
        let user_id = UserId::generate();
        service.register(user_id).unwrap();

        let err = service.consume(user_id, "tiktok_ad_generation", None).unwrap_err();

        assert!(matches!(err, CreditError::UnknownAction { .. }));
        assert_eq!(ledger_len(&store, user_id), 1);
        assert_eq!(service.balance(user_id).unwrap().total_credits, 15);
    }

    #[test]
    fn consume_for_unregistered_user_is_not_found() {
        let (service, _) = service_with(15);
        let err = service
            .consume(UserId::generate(), actions::IMAGE_GENERATION, None)
            .unwrap_err();
        assert!(matches!(err, CreditError::AccountNotFound { .. }));
    }

    #[test]
    fn refund_restores_pre_consume_balance() {
        let (service, store) = service_with(15);
        let user_id = UserId::generate();
        service.register(user_id).unwrap();

        let ConsumeOutcome::Consumed { cost, .. } = service
            .consume(user_id, actions::IMAGE_GENERATION, Some("ad_1".into()))
            .unwrap()
        else {
            panic!("expected consumption");
        };
        let rows_after_consume = ledger_len(&store, user_id);

        let receipt = service
            .refund(
                user_id,
                &RefundRequest {
                    action: actions::IMAGE_GENERATION.into(),
                    amount: cost,
                    ..RefundRequest::default()
                },
            )
            .unwrap();

        assert_eq!(receipt.balance, 15);
        assert_eq!(ledger_len(&store, user_id), rows_after_consume + 1);
        let refund = store.get_entry(&receipt.entry_id).unwrap().unwrap();
        assert_eq!(refund.change, cost);
        assert_eq!(refund.reason, reasons::CREDIT_REFUND);
        assert_eq!(refund.ref_id.as_deref(), Some(actions::IMAGE_GENERATION));
    }

    #[test]
    fn free_form_refunds_are_not_deduplicated() {
        let (service, _) = service_with(15);
        let user_id = UserId::generate();
        service.register(user_id).unwrap();
        service
            .consume(user_id, actions::IMAGE_GENERATION, None)
            .unwrap();

        let request = RefundRequest {
            action: actions::IMAGE_GENERATION.into(),
            amount: 5,
            ref_id: Some("ad_1".into()),
            original_entry_id: None,
        };
        service.refund(user_id, &request).unwrap();
        service.refund(user_id, &request).unwrap();

        assert_eq!(service.balance(user_id).unwrap().total_credits, 20);
    }

    #[test]
    fn refund_of_named_spend_is_issued_once() {
        let (service, _) = service_with(15);
        let user_id = UserId::generate();
        service.register(user_id).unwrap();

        let ConsumeOutcome::Consumed { entry_id, cost, .. } = service
            .consume(user_id, actions::IMAGE_GENERATION, None)
            .unwrap()
        else {
            panic!("expected consumption");
        };

        let request = RefundRequest {
            action: actions::IMAGE_GENERATION.into(),
            amount: cost,
            ref_id: None,
            original_entry_id: Some(entry_id),
        };
        let receipt = service.refund(user_id, &request).unwrap();
        assert_eq!(receipt.balance, 15);

        let err = service.refund(user_id, &request).unwrap_err();
        assert!(matches!(err, CreditError::DuplicateRefund { .. }));
        assert_eq!(service.balance(user_id).unwrap().total_credits, 15);
    }

    #[test]
    fn refund_cannot_exceed_or_borrow_another_spend() {
        let (service, _) = service_with(15);
        let owner = UserId::generate();
        let stranger = UserId::generate();
        service.register(owner).unwrap();
        service.register(stranger).unwrap();

        let ConsumeOutcome::Consumed { entry_id, .. } = service
            .consume(owner, actions::CAMPAIGN_INSIGHTS, None)
            .unwrap()
        else {
            panic!("expected consumption");
        };

        let too_much = RefundRequest {
            action: actions::CAMPAIGN_INSIGHTS.into(),
            amount: 3,
            ref_id: None,
            original_entry_id: Some(entry_id),
        };
        assert!(matches!(
            service.refund(owner, &too_much),
            Err(CreditError::InvalidRefund(_))
        ));

        let someone_elses = RefundRequest {
            amount: 2,
            ..too_much
        };
        assert!(matches!(
            service.refund(stranger, &someone_elses),
            Err(CreditError::InvalidRefund(_))
        ));
    }

    #[test]
    fn free_form_refund_is_bounded_by_action_cost() {
        let (service, store) = service_with(15);
        let user_id = UserId::generate();
        service.register(user_id).unwrap();
        service
            .consume(user_id, actions::AD_COPY_REWRITE, None)
            .unwrap();
        let rows_before = ledger_len(&store, user_id);

        let over_cost = RefundRequest {
            action: actions::AD_COPY_REWRITE.into(),
            amount: 2,
            ..RefundRequest::default()
        };
        assert!(matches!(
            service.refund(user_id, &over_cost),
            Err(CreditError::InvalidRefund(_))
        ));

        let unpriced = RefundRequest {
            action: "tiktok_ad_generation".into(),
            amount: 1,
            ..RefundRequest::default()
        };
        assert!(matches!(
            service.refund(user_id, &unpriced),
            Err(CreditError::UnknownAction { .. })
        ));

        let huge = RefundRequest {
            action: actions::IMAGE_GENERATION.into(),
            amount: i64::MAX,
            ..RefundRequest::default()
        };
        assert!(matches!(
            service.refund(user_id, &huge),
            Err(CreditError::InvalidRefund(_))
        ));

        assert_eq!(ledger_len(&store, user_id), rows_before);
        assert_eq!(service.balance(user_id).unwrap().total_credits, 14);
    }

    #[test]
    fn grant_overflow_is_rejected_and_store_stays_usable() {
        let (service, store) = service_with(15);
        let user_id = UserId::generate();
        let bystander = UserId::generate();
        service.register(user_id).unwrap();
        service.register(bystander).unwrap();

        let err = service
            .grant(user_id, i64::MAX, reasons::CREDIT_PURCHASE, Some("cs_huge".into()))
            .unwrap_err();

        assert!(matches!(err, CreditError::InvalidAmount(_)));
        assert_eq!(service.balance(user_id).unwrap().total_credits, 15);
        assert_eq!(ledger_len(&store, user_id), 1);

        assert!(service
            .consume(bystander, actions::IMAGE_GENERATION, None)
            .unwrap()
            .success());
        // The rejected grant did not burn its reference.
        assert_eq!(
            service
                .grant(user_id, 10, reasons::CREDIT_PURCHASE, Some("cs_huge".into()))
                .unwrap(),
            25
        );
    }

    #[test]
    fn grant_reference_does_not_block_refund_of_same_id() {
        let (service, _) = service_with(15);
        let user_id = UserId::generate();
        service.register(user_id).unwrap();

        let ConsumeOutcome::Consumed { entry_id, cost, .. } = service
            .consume(user_id, actions::IMAGE_GENERATION, None)
            .unwrap()
        else {
            panic!("expected consumption");
        };

        service
            .grant(user_id, 10, reasons::BONUS_CREDITS, Some(entry_id.to_string()))
            .unwrap();

        let receipt = service
            .refund(
                user_id,
                &RefundRequest {
                    action: actions::IMAGE_GENERATION.into(),
                    amount: cost,
                    ref_id: None,
                    original_entry_id: Some(entry_id),
                },
            )
            .unwrap();
        assert_eq!(receipt.balance, 25);
    }

    #[test]
    fn refund_rejects_non_positive_amount() {
        let (service, _) = service_with(15);
        let user_id = UserId::generate();
        service.register(user_id).unwrap();

        let err = service
            .refund(
                user_id,
                &RefundRequest {
                    action: actions::IMAGE_GENERATION.into(),
                    amount: 0,
                    ..RefundRequest::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, CreditError::InvalidAmount(_)));
    }

    #[test]
    fn refund_detached_without_runtime_runs_inline() {
        let (service, _) = service_with(0);
        let service = Arc::new(service);
        let user_id = UserId::generate();
        service.register(user_id).unwrap();

        service.refund_detached(
            user_id,
            RefundRequest {
                action: actions::IMAGE_GENERATION.into(),
                amount: 5,
                ..RefundRequest::default()
            },
        );
        assert_eq!(service.balance(user_id).unwrap().total_credits, 5);

        // Failures are swallowed.
        service.refund_detached(
            UserId::generate(),
            RefundRequest {
                action: actions::IMAGE_GENERATION.into(),
                amount: 5,
                ..RefundRequest::default()
            },
        );
    }

    #[test]
    fn grant_is_idempotent_per_reference() {
        let (service, _) = service_with(0);
        let user_id = UserId::generate();
        service.register(user_id).unwrap();

        let balance = service
            .grant(user_id, 100, reasons::CREDIT_PURCHASE, Some("cs_42".into()))
            .unwrap();
        assert_eq!(balance, 100);

        let replay = service
            .grant(user_id, 100, reasons::CREDIT_PURCHASE, Some("cs_42".into()))
            .unwrap_err();
        assert!(matches!(replay, CreditError::DuplicateRefund { .. }));
        assert_eq!(service.balance(user_id).unwrap().total_credits, 100);
    }

    #[test]
    fn usage_summary_excludes_credits() {
        let (service, _) = service_with(15);
        let user_id = UserId::generate();
        service.register(user_id).unwrap();

        service
            .consume(user_id, actions::META_AD_GENERATION, None)
            .unwrap();
        service
            .consume(user_id, actions::AD_COPY_REWRITE, None)
            .unwrap();
        service
            .consume(user_id, actions::META_AD_GENERATION, None)
            .unwrap();

        let summary = service.usage_summary(user_id);
        assert_eq!(summary.get(actions::META_AD_GENERATION), 10);
        assert_eq!(summary.get(actions::AD_COPY_REWRITE), 1);
        assert_eq!(summary.get(reasons::WELCOME_CREDITS), 0);
        assert_eq!(summary.total_spent(), 11);

        let today = chrono::Utc::now().date_naive();
        assert_eq!(service.daily_usage(user_id).get(today), 11);
    }

    #[test]
    fn usage_history_is_capped() {
        let (service, _) = service_with(0);
        let user_id = UserId::generate();
        service.register(user_id).unwrap();
        service
            .grant(user_id, 200, reasons::BONUS_CREDITS, None)
            .unwrap();
        for _ in 0..150 {
            service
                .consume(user_id, actions::AD_COPY_REWRITE, None)
                .unwrap();
        }

        let page = service.usage_history(user_id, 500, 0);
        assert_eq!(page.entries.len(), MAX_HISTORY_LIMIT);
        assert!(page.has_more);
        assert!(page.entries.iter().all(CreditLedgerEntry::is_spend));

        let tail = service.usage_history(user_id, MAX_HISTORY_LIMIT, 100);
        assert_eq!(tail.entries.len(), 51);
        assert!(!tail.has_more);
        assert_eq!(tail.entries.last().unwrap().reason, reasons::BONUS_CREDITS);
    }

    #[test]
    fn usage_history_page_ending_exactly_has_no_more() {
        let (service, _) = service_with(15);
        let user_id = UserId::generate();
        service.register(user_id).unwrap();
        service
            .consume(user_id, actions::AD_COPY_REWRITE, None)
            .unwrap();

        let page = service.usage_history(user_id, 2, 0);
        assert_eq!(page.entries.len(), 2);
        assert!(!page.has_more);

        let first = service.usage_history(user_id, 1, 0);
        assert_eq!(first.entries.len(), 1);
        assert!(first.has_more);
    }

    #[test]
    fn conservation_holds_across_operations() {
        let (service, _) = service_with(15);
        let user_id = UserId::generate();
        service.register(user_id).unwrap();

        service
            .consume(user_id, actions::IMAGE_GENERATION, None)
            .unwrap();
        service
            .consume(user_id, actions::GOOGLE_AD_GENERATION, None)
            .unwrap();
        service
            .consume(user_id, actions::LINKEDIN_AD_GENERATION, None)
            .unwrap();
        service
            .consume(user_id, actions::MICROSOFT_AD_GENERATION, None)
            .unwrap();
        service
            .refund(
                user_id,
                &RefundRequest {
                    action: actions::LINKEDIN_AD_GENERATION.into(),
                    amount: 5,
                    ..RefundRequest::default()
                },
            )
            .unwrap();
        service
            .grant(user_id, 40, reasons::CREDIT_PURCHASE, Some("cs_1".into()))
            .unwrap();

        let audit = service.audit(user_id).unwrap();
        assert!(audit.consistent);
        assert_eq!(audit.cached, 45);
        assert_eq!(audit.ledger_sum, 45);
        assert_eq!(audit.entries, 6);
    }

    #[test]
    fn racing_consumes_allow_exactly_one() {
        let (service, _) = service_with(5);
        let service = Arc::new(service);
        let user_id = UserId::generate();
        service.register(user_id).unwrap();
        let barrier = Arc::new(std::sync::Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let service = Arc::clone(&service);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    service
                        .consume(user_id, actions::IMAGE_GENERATION, None)
                        .unwrap()
                        .success()
                })
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(successes, 1);
        assert_eq!(service.balance(user_id).unwrap().total_credits, 0);
        assert!(service.audit(user_id).unwrap().consistent);
    }
}
