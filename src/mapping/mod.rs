//! # Field mapping
//!
//! Pure translation from raw remote payloads into the value objects the
//! orchestrator works with. Nothing in here performs I/O; every output field
//! is read through an explicit name so an absent or renamed upstream field
//! degrades to `None` instead of failing.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Serialize;

pub mod delivery;
pub mod delivery_schema;
pub mod jira;

/// Project-level view of a remote record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RemoteProject {
    /// Issue-tracker key or delivery record id
    pub external_id: String,
    pub name: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub client_name: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub health: HealthIndicators,
    /// Single risk indicator carried on the record itself
    pub embedded_risk: Option<RemoteRisk>,
}

/// Traffic-light style health picklists from the delivery record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthIndicators {
    pub overall: Option<String>,
    pub time: Option<String>,
    pub cost: Option<String>,
    pub resources: Option<String>,
    pub summary: Option<String>,
}

impl HealthIndicators {
    pub fn is_empty(&self) -> bool {
        self.overall.is_none()
            && self.time.is_none()
            && self.cost.is_none()
            && self.resources.is_none()
            && self.summary.is_none()
    }
}

/// One issue returned by the tracker search.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RemoteIssue {
    pub key: String,
    pub summary: String,
    pub description: Option<String>,
    pub status: Option<String>,
    pub issue_type: Option<String>,
    pub assignee: Option<String>,
    pub priority: Option<String>,
    pub created: Option<DateTime<FixedOffset>>,
    pub updated: Option<DateTime<FixedOffset>>,
    /// Raw `duedate` value; parsed per issue during reconciliation
    pub due_date: Option<String>,
}

/// Financial figures read from the delivery record.
///
/// Role budgets and FTE totals are in days; prices and budgets are in
/// `currency`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteFinancials {
    pub record_id: String,
    pub currency: String,
    pub remaining_budget: Option<f64>,
    pub fte_day_price: Option<f64>,
    pub total_fte_days: Option<f64>,
    pub overrun_investment: Option<f64>,
    pub total_days_actuals_planned: Option<f64>,
    pub role_budgets: RoleFigures,
    pub budgeted_fte: RoleFigures,
    pub actual_fte: RoleFigures,
}

/// Per-role figures: project manager, solution architect, data engineer,
/// data scientist.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RoleFigures {
    pub pm: Option<f64>,
    pub sa: Option<f64>,
    pub de: Option<f64>,
    pub ds: Option<f64>,
}

impl RoleFigures {
    fn values(&self) -> [Option<f64>; 4] {
        [self.pm, self.sa, self.de, self.ds]
    }

    /// Sum of the present values, or `None` when every role is missing.
    pub fn sum(&self) -> Option<f64> {
        self.values()
            .into_iter()
            .flatten()
            .fold(None, |acc, value| Some(acc.unwrap_or(0.0) + value))
    }
}

impl RemoteFinancials {
    /// Empty figures for a record that returned no financial row.
    pub fn empty(record_id: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            currency: delivery_schema::DEFAULT_CURRENCY.to_string(),
            remaining_budget: None,
            fte_day_price: None,
            total_fte_days: None,
            overrun_investment: None,
            total_days_actuals_planned: None,
            role_budgets: RoleFigures::default(),
            budgeted_fte: RoleFigures::default(),
            actual_fte: RoleFigures::default(),
        }
    }

    /// Total budget in currency.
    ///
    /// Prefers FTE days times day price, then the summed role day budgets
    /// times day price. Never computes with a missing or zero price.
    pub fn total_budget(&self) -> Option<f64> {
        let price = self.fte_day_price.filter(|price| *price > 0.0)?;

        if let Some(days) = self.total_fte_days.filter(|days| *days > 0.0) {
            return Some(days * price);
        }

        self.role_budgets
            .sum()
            .filter(|days| *days > 0.0)
            .map(|days| days * price)
    }

    /// Total minus remaining, when both are known.
    pub fn spent_budget(&self) -> Option<f64> {
        Some(self.total_budget()? - self.remaining_budget?)
    }

    /// True when any numeric field carries a value.
    pub fn has_any_data(&self) -> bool {
        [
            self.remaining_budget,
            self.fte_day_price,
            self.total_fte_days,
            self.overrun_investment,
            self.total_days_actuals_planned,
        ]
        .iter()
        .any(Option::is_some)
            || self.role_budgets.sum().is_some()
            || self.budgeted_fte.sum().is_some()
            || self.actual_fte.sum().is_some()
    }
}

/// A remote risk entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RemoteRisk {
    pub external_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub probability: Option<String>,
    pub impact: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub mitigation_plan: Option<String>,
    pub identified_date: Option<NaiveDate>,
}

/// Parses a `YYYY-MM-DD` date, ignoring any time suffix.
pub(crate) fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    let date_part = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn financials() -> RemoteFinancials {
        RemoteFinancials::empty("a2X000000000001")
    }

    #[test]
    fn total_budget_from_fte_days() {
        let mut f = financials();
        f.total_fte_days = Some(10.0);
        f.fte_day_price = Some(500.0);
        assert_eq!(f.total_budget(), Some(5000.0));
    }

    #[test]
    fn total_budget_falls_back_to_role_budgets() {
        let mut f = financials();
        f.fte_day_price = Some(1000.0);
        f.role_budgets = RoleFigures {
            pm: Some(5.0),
            sa: Some(10.0),
            de: None,
            ds: Some(2.5),
        };
        assert_eq!(f.total_budget(), Some(17_500.0));
    }

    #[test]
    fn total_budget_needs_a_price() {
        let mut f = financials();
        f.total_fte_days = Some(10.0);
        f.role_budgets.pm = Some(4.0);
        assert_eq!(f.total_budget(), None);

        f.fte_day_price = Some(0.0);
        assert_eq!(f.total_budget(), None);
    }

    #[test]
    fn remaining_only_has_data_but_no_total() {
        let mut f = financials();
        f.remaining_budget = Some(200.0);
        assert!(f.has_any_data());
        assert_eq!(f.total_budget(), None);
        assert_eq!(f.spent_budget(), None);
    }

    #[test]
    fn spent_is_total_minus_remaining() {
        let mut f = financials();
        f.total_fte_days = Some(10.0);
        f.fte_day_price = Some(500.0);
        f.remaining_budget = Some(1200.0);
        assert_eq!(f.spent_budget(), Some(3800.0));
    }

    #[test]
    fn empty_financials_have_no_data() {
        assert!(!financials().has_any_data());
        assert_eq!(financials().currency, "USD");
    }

    #[test]
    fn parse_date_accepts_datetime_suffix() {
        assert_eq!(
            parse_date("2025-03-01T00:00:00.000+0000"),
            NaiveDate::from_ymd_opt(2025, 3, 1)
        );
        assert_eq!(parse_date("03/01/2025"), None);
    }
}
