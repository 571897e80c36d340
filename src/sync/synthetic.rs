//! Placeholder data for projects whose remote systems return nothing.
//!
//! Only used when `sync.synthetic_fallback` is on. Everything here is
//! randomized within fixed bounds; callers pass the RNG so tests can seed it.

use chrono::{Duration, NaiveDate, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use sea_orm::Set;
use uuid::Uuid;

use crate::mapping::delivery_schema::DEFAULT_CURRENCY;
use crate::models::risk::{self, RiskLevel, RiskStatus, SYNTHETIC_SOURCE};

pub const MIN_BUDGET: f64 = 200_000.0;
pub const MAX_BUDGET: f64 = 500_000.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticBudget {
    pub currency: String,
    pub total: f64,
    pub spent: f64,
    pub remaining: f64,
}

pub fn budget<R: Rng + ?Sized>(rng: &mut R) -> SyntheticBudget {
    let total = rng.gen_range(MIN_BUDGET..=MAX_BUDGET);
    let spent = total * rng.gen_range(0.2..=0.6);
    SyntheticBudget {
        currency: DEFAULT_CURRENCY.to_string(),
        total,
        spent,
        remaining: total - spent,
    }
}

/// Start 3 to 6 months before `today`.
pub fn start_date<R: Rng + ?Sized>(rng: &mut R, today: NaiveDate) -> NaiveDate {
    today - Duration::days(30 * rng.gen_range(3..=6))
}

/// End 3 to 9 months after `today`.
pub fn end_date<R: Rng + ?Sized>(rng: &mut R, today: NaiveDate) -> NaiveDate {
    today + Duration::days(30 * rng.gen_range(3..=9))
}

struct RiskTemplate {
    title: &'static str,
    description: &'static str,
    mitigation: &'static str,
    category: &'static str,
}

const CATALOGUE: [RiskTemplate; 7] = [
    RiskTemplate {
        title: "Stakeholder Availability Risk",
        description: "Key stakeholders may be unavailable during acceptance testing",
        mitigation: "Name backup approvers and pad the acceptance window by a week.",
        category: "Resource",
    },
    RiskTemplate {
        title: "API Rate Limit Risk",
        description: "Upstream API rate limits could throttle data synchronization",
        mitigation: "Add client-side caching and back off on throttled responses.",
        category: "Technical",
    },
    RiskTemplate {
        title: "Scope Creep Risk",
        description: "Reporting requirements keep growing after sign-off",
        mitigation: "Route new asks through change control and review scope weekly.",
        category: "Scope",
    },
    RiskTemplate {
        title: "Vendor Delay Risk",
        description: "A third-party vendor is late delivering access credentials",
        mitigation: "Escalate through vendor management and build against mock data meanwhile.",
        category: "Vendor",
    },
    RiskTemplate {
        title: "Data Quality Risk",
        description: "The legacy export contains inconsistent or missing records",
        mitigation: "Profile the export early and reserve a cleanup sprint.",
        category: "Data",
    },
    RiskTemplate {
        title: "Knowledge Gap Risk",
        description: "The team is new to parts of the technology stack",
        mitigation: "Run enablement workshops and pair on the first deliverables.",
        category: "People",
    },
    RiskTemplate {
        title: "Budget Overrun Risk",
        description: "An extended discovery phase is eating into the delivery budget",
        mitigation: "Re-estimate the remaining phases and request approval for the delta.",
        category: "Financial",
    },
];

const LEVELS: [RiskLevel; 3] = [RiskLevel::High, RiskLevel::Medium, RiskLevel::Low];

/// Between 5 and 8 distinct catalogue risks, capped at the catalogue size.
pub fn risks<R: Rng + ?Sized>(rng: &mut R, project_id: Uuid) -> Vec<risk::ActiveModel> {
    let count = rng.gen_range(5..=8).min(CATALOGUE.len());
    let now = Utc::now().fixed_offset();
    let today = now.date_naive();

    CATALOGUE
        .choose_multiple(rng, count)
        .map(|template| {
            let probability = *LEVELS.choose(rng).unwrap_or(&RiskLevel::Medium);
            let impact = *LEVELS.choose(rng).unwrap_or(&RiskLevel::Medium);
            let identified = today - Duration::days(rng.gen_range(1..=30));
            risk::ActiveModel {
                id: Set(Uuid::new_v4()),
                project_id: Set(project_id),
                title: Set(template.title.to_string()),
                description: Set(Some(template.description.to_string())),
                probability: Set(probability),
                impact: Set(impact),
                status: Set(RiskStatus::Open),
                category: Set(Some(template.category.to_string())),
                mitigation_plan: Set(Some(template.mitigation.to_string())),
                source: Set(Some(SYNTHETIC_SOURCE.to_string())),
                external_id: Set(None),
                identified_date: Set(Some(identified)),
                created_at: Set(now),
                updated_at: Set(now),
            }
        })
        .collect()
}
