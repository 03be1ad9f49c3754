//! Credit cost table.
//!
//! Maps named paid actions to a whole-credit cost. The table is built once per
//! process; changing a cost is a deployment concern.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{CreditError, Result};

/// Named paid actions.
pub mod actions {
    /// AI image generation.
    pub const IMAGE_GENERATION: &str = "image_generation";

    /// Ad copy generation for Meta.
    pub const META_AD_GENERATION: &str = "meta_ad_generation";

    /// Ad copy generation for Google.
    pub const GOOGLE_AD_GENERATION: &str = "google_ad_generation";

    /// Ad copy generation for `LinkedIn`.
    pub const LINKEDIN_AD_GENERATION: &str = "linkedin_ad_generation";

    /// Ad copy generation for Microsoft.
    pub const MICROSOFT_AD_GENERATION: &str = "microsoft_ad_generation";

    /// Rewriting a single piece of existing copy.
    pub const AD_COPY_REWRITE: &str = "ad_copy_rewrite";

    /// AI summary of campaign performance.
    pub const CAMPAIGN_INSIGHTS: &str = "campaign_insights";
}

/// Cost of every billable action, in credits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CreditCostTable {
    costs: BTreeMap<String, i64>,
}

impl Default for CreditCostTable {
    fn default() -> Self {
        let costs = [
            (actions::IMAGE_GENERATION, 5),
            (actions::META_AD_GENERATION, 5),
            (actions::GOOGLE_AD_GENERATION, 5),
            (actions::LINKEDIN_AD_GENERATION, 5),
            (actions::MICROSOFT_AD_GENERATION, 5),
            (actions::AD_COPY_REWRITE, 1),
            (actions::CAMPAIGN_INSIGHTS, 2),
        ]
        .into_iter()
        .map(|(action, cost)| (action.to_string(), cost))
        .collect();

        Self { costs }
    }
}

impl CreditCostTable {
    /// Build a table from explicit costs.
    ///
    /// # Errors
    ///
    /// Returns `CreditError::Configuration` if any cost is not positive.
    pub fn from_costs<I, S>(costs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        let mut table = Self {
            costs: BTreeMap::new(),
        };
        table.merge(costs)?;
        Ok(table)
    }

    /// Merge overrides over the current table.
    ///
    /// # Errors
    ///
    /// Returns `CreditError::Configuration` if any cost is not positive. The table is
    /// left untouched in that case.
    pub fn merge<I, S>(&mut self, overrides: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        let overrides: Vec<(String, i64)> = overrides
            .into_iter()
            .map(|(action, cost)| (action.into(), cost))
            .collect();

        if let Some((action, cost)) = overrides.iter().find(|(_, cost)| *cost <= 0) {
            return Err(CreditError::Configuration(format!(
                "cost for {action} must be positive, got {cost}"
            )));
        }

        self.costs.extend(overrides);
        Ok(())
    }

    /// Parse a JSON object of `action -> cost` and merge it over the defaults.
    ///
    /// # Errors
    ///
    /// Returns `CreditError::Configuration` on malformed JSON or non-positive costs.
    pub fn from_json_overrides(json: &str) -> Result<Self> {
        let overrides: BTreeMap<String, i64> = serde_json::from_str(json)
            .map_err(|e| CreditError::Configuration(format!("invalid cost table: {e}")))?;

        let mut table = Self::default();
        table.merge(overrides)?;
        Ok(table)
    }

    /// Look up the cost of an action.
    ///
    /// # Errors
    ///
    /// Returns `CreditError::UnknownAction` when the action is not in the table.
    /// Unknown actions are never charged a guessed cost.
    pub fn cost_of(&self, action: &str) -> Result<i64> {
        self.costs
            .get(action)
            .copied()
            .ok_or_else(|| CreditError::UnknownAction {
                action: action.to_string(),
            })
    }

    /// Whether the action is billable.
    #[must_use]
    pub fn contains(&self, action: &str) -> bool {
        self.costs.contains_key(action)
    }

    /// Iterate over `(action, cost)` pairs in action order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.costs.iter().map(|(action, cost)| (action.as_str(), *cost))
    }

    /// Number of billable actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.costs.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.costs.is_empty()
    }
}
