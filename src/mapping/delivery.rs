//! Delivery record mapping.
//!
//! Turns Salesforce query records into [`RemoteProject`], [`RemoteFinancials`]
//! and [`RemoteRisk`] values, and maps delivery picklist text onto local risk
//! enums.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use url::Url;

use super::delivery_schema as f;
use super::{HealthIndicators, RemoteFinancials, RemoteProject, RemoteRisk, RoleFigures, parse_date};
use crate::models::risk::{RiskLevel, RiskStatus};

static RECORD_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9]{15,18}$").expect("record id pattern compiles"));

/// Object path segments that precede a record id in Lightning URLs.
const LIGHTNING_RECORD_PATHS: [&str; 2] = ["/r/preempt__PrecursiveProject__c/", "/r/pse__Proj__c/"];

/// True for 15 or 18 character alphanumeric record ids.
pub fn is_valid_record_id(value: &str) -> bool {
    RECORD_ID.is_match(value)
}

/// Pulls a record id out of a delivery URL.
///
/// Accepts Lightning record URLs for the project object (and the legacy PSA
/// object) and classic `*.my.salesforce.com/<id>` links.
pub fn extract_id_from_url(url: &str) -> Option<String> {
    let trimmed = url.trim();

    for marker in LIGHTNING_RECORD_PATHS {
        if let Some((_, rest)) = trimmed.split_once(marker) {
            let candidate = rest.split(['/', '?', '#']).next().unwrap_or_default();
            return is_valid_record_id(candidate).then(|| candidate.to_string());
        }
    }

    let parsed = Url::parse(trimmed).ok()?;
    if !parsed.host_str()?.ends_with("my.salesforce.com") {
        return None;
    }
    let candidate = parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .next_back()?;
    is_valid_record_id(candidate).then(|| candidate.to_string())
}

/// Maps one project record. Returns `None` when the record has no id.
pub fn raw_to_project(raw: &Value) -> Option<RemoteProject> {
    let external_id = text(raw, f::ID)?;

    let client_name = raw
        .get(f::ACCOUNT_RELATIONSHIP)
        .and_then(|account| text(account, "Name"));

    Some(RemoteProject {
        name: text(raw, f::NAME),
        status: text(raw, f::STATUS),
        category: text(raw, f::PROJECT_CATEGORY),
        client_name,
        start_date: text(raw, f::DELIVERY_START).as_deref().and_then(parse_date),
        end_date: text(raw, f::DELIVERY_END).as_deref().and_then(parse_date),
        health: HealthIndicators {
            overall: text(raw, f::PROJECT_STATUS),
            time: text(raw, f::TIME_STATUS),
            cost: text(raw, f::COST_STATUS),
            resources: text(raw, f::RESOURCES_STATUS),
            summary: text(raw, f::OVERALL_STATUS_SUMMARY),
        },
        embedded_risk: embedded_risk(&external_id, raw),
        external_id,
    })
}

/// Maps the financial fields of a project record.
pub fn raw_to_financials(record_id: &str, raw: &Value) -> RemoteFinancials {
    RemoteFinancials {
        record_id: record_id.to_string(),
        currency: text(raw, f::CURRENCY).unwrap_or_else(|| f::DEFAULT_CURRENCY.to_string()),
        remaining_budget: number(raw, f::REMAINING_BUDGET),
        fte_day_price: number(raw, f::FTE_DAY_PRICE),
        total_fte_days: number(raw, f::TOTAL_FTE_DAYS),
        overrun_investment: number(raw, f::OVERRUN_INVESTMENT),
        total_days_actuals_planned: number(raw, f::TOTAL_DAYS_ACTUALS_PLANNED),
        role_budgets: RoleFigures {
            pm: number(raw, f::PM_BUDGET),
            sa: number(raw, f::SA_BUDGET),
            de: number(raw, f::DE_BUDGET),
            ds: number(raw, f::DS_BUDGET),
        },
        budgeted_fte: RoleFigures {
            pm: number(raw, f::PM_BUDGETED_FTE),
            sa: number(raw, f::SA_BUDGETED_FTE),
            de: number(raw, f::DE_BUDGETED_FTE),
            ds: number(raw, f::DS_BUDGETED_FTE),
        },
        actual_fte: RoleFigures {
            pm: number(raw, f::PM_ACTUAL_FTE),
            sa: number(raw, f::SA_ACTUAL_FTE),
            de: number(raw, f::DE_ACTUAL_FTE),
            ds: number(raw, f::DS_ACTUAL_FTE),
        },
    }
}

/// Maps one record of the enumerable risk object. Records without a name
/// are dropped since risks from the list are matched by title.
pub fn raw_to_risk(raw: &Value) -> Option<RemoteRisk> {
    use f::risk_object as r;

    Some(RemoteRisk {
        title: text(raw, r::NAME)?,
        external_id: text(raw, r::ID),
        description: text(raw, r::DESCRIPTION),
        probability: text(raw, r::PROBABILITY),
        impact: text(raw, r::IMPACT),
        status: text(raw, r::STATUS),
        category: text(raw, r::CATEGORY),
        mitigation_plan: text(raw, r::MITIGATION_PLAN),
        identified_date: text(raw, r::DATE_IDENTIFIED).as_deref().and_then(parse_date),
    })
}

/// "High"/"Low" anywhere in the text picks that level; anything else is medium.
pub fn map_risk_level(value: Option<&str>) -> RiskLevel {
    let Some(value) = value else {
        return RiskLevel::Medium;
    };
    let lowered = value.to_lowercase();
    if lowered.contains("high") {
        RiskLevel::High
    } else if lowered.contains("low") {
        RiskLevel::Low
    } else {
        RiskLevel::Medium
    }
}

pub fn map_risk_status(value: Option<&str>) -> RiskStatus {
    match value.map(|v| v.trim().to_lowercase()).as_deref() {
        Some("closed" | "resolved") => RiskStatus::Closed,
        Some("mitigated" | "mitigation") => RiskStatus::Mitigated,
        _ => RiskStatus::Open,
    }
}

fn embedded_risk(record_id: &str, raw: &Value) -> Option<RemoteRisk> {
    let level = text(raw, f::RISK_LEVEL);
    let description = text(raw, f::RISK_DESCRIPTION);
    if level.is_none() && description.is_none() {
        return None;
    }

    let title = match &level {
        Some(level) => format!("Project risk ({level})"),
        None => "Project risk".to_string(),
    };

    Some(RemoteRisk {
        external_id: Some(record_id.to_string()),
        title,
        description,
        probability: level.clone(),
        impact: level,
        category: Some("Delivery".to_string()),
        ..RemoteRisk::default()
    })
}

fn text(raw: &Value, field: &str) -> Option<String> {
    raw.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn number(raw: &Value, field: &str) -> Option<f64> {
    match raw.get(field)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
