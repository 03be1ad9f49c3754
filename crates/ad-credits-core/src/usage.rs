//! Usage aggregation over ledger entries.
//!
//! Only spends count as usage. Refunds, purchases and grants are excluded.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::CreditLedgerEntry;

/// Credits spent per action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageSummary {
    by_reason: BTreeMap<String, i64>,
}

impl UsageSummary {
    /// Sum the absolute value of every negative entry, grouped by reason.
    pub fn from_entries<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = &'a CreditLedgerEntry>,
    {
        let mut by_reason = BTreeMap::new();
        for entry in entries.into_iter().filter(|e| e.is_spend()) {
            *by_reason.entry(entry.reason.clone()).or_insert(0) += entry.change.abs();
        }
        Self { by_reason }
    }

    /// Credits spent on one action (zero if never used).
    #[must_use]
    pub fn get(&self, reason: &str) -> i64 {
        self.by_reason.get(reason).copied().unwrap_or(0)
    }

    /// Credits spent across all actions.
    #[must_use]
    pub fn total_spent(&self) -> i64 {
        self.by_reason.values().sum()
    }

    /// Whether nothing has been spent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_reason.is_empty()
    }

    /// Borrow the underlying mapping.
    #[must_use]
    pub fn as_map(&self) -> &BTreeMap<String, i64> {
        &self.by_reason
    }
}

/// Credits spent per UTC calendar day, for usage-over-time charts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DailyUsage {
    by_day: BTreeMap<NaiveDate, i64>,
}

impl DailyUsage {
    /// Sum spends per day of `created_at`.
    pub fn from_entries<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = &'a CreditLedgerEntry>,
    {
        let mut by_day = BTreeMap::new();
        for entry in entries.into_iter().filter(|e| e.is_spend()) {
            *by_day.entry(entry.created_at.date_naive()).or_insert(0) += entry.change.abs();
        }
        Self { by_day }
    }

    /// Iterate days in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, i64)> + '_ {
        self.by_day.iter().map(|(day, spent)| (*day, *spent))
    }

    /// Credits spent on a day.
    #[must_use]
    pub fn get(&self, day: NaiveDate) -> i64 {
        self.by_day.get(&day).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{reasons, UserId};
    use chrono::{TimeZone, Utc};

    #[test]
    fn summary_sums_spends_by_reason() {
        let user_id = UserId::generate();
        let entries = vec![
            CreditLedgerEntry::debit(user_id, "meta_ad_generation", 5, None),
            CreditLedgerEntry::debit(user_id, "image_generation", 3, None),
            CreditLedgerEntry::debit(user_id, "meta_ad_generation", 5, None),
            CreditLedgerEntry::grant(user_id, 15, reasons::WELCOME_CREDITS, None),
        ];

        let summary = UsageSummary::from_entries(&entries);

        let expected: BTreeMap<String, i64> = [
            ("image_generation".to_string(), 3),
            ("meta_ad_generation".to_string(), 10),
        ]
        .into_iter()
        .collect();
        assert_eq!(summary.as_map(), &expected);
        assert_eq!(summary.total_spent(), 13);
        assert_eq!(summary.get(reasons::WELCOME_CREDITS), 0);
    }

    #[test]
    fn refunds_are_not_usage() {
        let user_id = UserId::generate();
        let entries = vec![
            CreditLedgerEntry::debit(user_id, "image_generation", 5, None),
            CreditLedgerEntry::refund(user_id, 5, None),
        ];

        let summary = UsageSummary::from_entries(&entries);
        assert_eq!(summary.get("image_generation"), 5);
        assert_eq!(summary.get(reasons::CREDIT_REFUND), 0);
    }

    #[test]
    fn daily_usage_groups_by_day() {
        let user_id = UserId::generate();
        let mut first = CreditLedgerEntry::debit(user_id, "image_generation", 5, None);
        first.created_at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let mut second = CreditLedgerEntry::debit(user_id, "meta_ad_generation", 5, None);
        second.created_at = Utc.with_ymd_and_hms(2026, 3, 1, 23, 59, 0).unwrap();
        let mut third = CreditLedgerEntry::debit(user_id, "ad_copy_rewrite", 1, None);
        third.created_at = Utc.with_ymd_and_hms(2026, 3, 2, 0, 1, 0).unwrap();

        let daily = DailyUsage::from_entries(&[first, second, third]);

        let march_first = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let march_second = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert_eq!(daily.get(march_first), 10);
        assert_eq!(daily.get(march_second), 1);
        assert_eq!(daily.iter().count(), 2);
    }
}
