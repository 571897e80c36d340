//! Field names of the Precursive project object in Salesforce.
//!
//! Queries and the mapper both read from these constants; nothing selects
//! or iterates fields dynamically.

pub const SOBJECT: &str = "preempt__PrecursiveProject__c";

// Core
pub const ID: &str = "Id";
pub const NAME: &str = "Name";
pub const STATUS: &str = "preempt__Status__c";
pub const PROJECT_CATEGORY: &str = "preempt__projectCategory__c";
/// Relationship traversal; the response nests it as `preempt__account__r: { Name }`
pub const ACCOUNT_NAME: &str = "preempt__account__r.Name";
pub const ACCOUNT_RELATIONSHIP: &str = "preempt__account__r";

// Timeline
pub const DELIVERY_START: &str = "Delivery_Start_Date__c";
pub const DELIVERY_END: &str = "Delivery_End_Date__c";

// Health picklists
pub const PROJECT_STATUS: &str = "Project_Status_Pick__c";
pub const TIME_STATUS: &str = "Time_Status_Pick__c";
pub const COST_STATUS: &str = "Cost_Status_Pick__c";
pub const RESOURCES_STATUS: &str = "Resources_Status_Pick__c";
pub const OVERALL_STATUS_SUMMARY: &str = "Scope_Comments2__c";

// Financials
pub const CURRENCY: &str = "CurrencyIsoCode";
pub const REMAINING_BUDGET: &str = "Remaining_Budget__c";
pub const FTE_DAY_PRICE: &str = "FTE_Day_Price__c";
pub const TOTAL_FTE_DAYS: &str = "Total_FTEs__c";
pub const OVERRUN_INVESTMENT: &str = "Overrun_Investment__c";
pub const TOTAL_DAYS_ACTUALS_PLANNED: &str = "Total_Days_Actuals_Planned__c";

// Role budgets, in days
pub const PM_BUDGET: &str = "PM_Budget__c";
pub const SA_BUDGET: &str = "SA_Budget__c";
pub const DE_BUDGET: &str = "DE_Budget__c";
pub const DS_BUDGET: &str = "DS_Budget__c";

pub const PM_BUDGETED_FTE: &str = "PM_Budgeted_FTE__c";
pub const SA_BUDGETED_FTE: &str = "SA_Budgeted_FTE__c";
pub const DE_BUDGETED_FTE: &str = "DE_Budgeted_FTE__c";
pub const DS_BUDGETED_FTE: &str = "DS_Budgeted_FTE__c";

pub const PM_ACTUAL_FTE: &str = "PM_Actual_FTE__c";
pub const SA_ACTUAL_FTE: &str = "SA_Actual_FTE__c";
pub const DE_ACTUAL_FTE: &str = "DE_Actual_FTE__c";
pub const DS_ACTUAL_FTE: &str = "DS_Actual_FTE__c";

// Embedded risk indicator
pub const RISK_LEVEL: &str = "Project_Risk_Level__c";
pub const RISK_DESCRIPTION: &str = "Risk_Description__c";

pub const DEFAULT_CURRENCY: &str = "USD";

/// Fields of an enumerable risk object, when the org exposes one.
pub mod risk_object {
    pub const ID: &str = "Id";
    pub const NAME: &str = "Name";
    pub const PROJECT: &str = "Project__c";
    pub const DESCRIPTION: &str = "Description__c";
    pub const PROBABILITY: &str = "Probability__c";
    pub const IMPACT: &str = "Impact__c";
    pub const STATUS: &str = "Status__c";
    pub const CATEGORY: &str = "Category__c";
    pub const MITIGATION_PLAN: &str = "Mitigation_Plan__c";
    pub const DATE_IDENTIFIED: &str = "Date_Identified__c";

    pub const fn fields() -> &'static [&'static str] {
        &[
            ID,
            NAME,
            DESCRIPTION,
            PROBABILITY,
            IMPACT,
            STATUS,
            CATEGORY,
            MITIGATION_PLAN,
            DATE_IDENTIFIED,
        ]
    }
}

pub const fn core_fields() -> &'static [&'static str] {
    &[ID, NAME, STATUS, PROJECT_CATEGORY, ACCOUNT_NAME]
}

pub const fn date_fields() -> &'static [&'static str] {
    &[DELIVERY_START, DELIVERY_END]
}

pub const fn health_fields() -> &'static [&'static str] {
    &[
        PROJECT_STATUS,
        TIME_STATUS,
        COST_STATUS,
        RESOURCES_STATUS,
        OVERALL_STATUS_SUMMARY,
    ]
}

pub const fn financial_fields() -> &'static [&'static str] {
    &[
        CURRENCY,
        REMAINING_BUDGET,
        FTE_DAY_PRICE,
        TOTAL_FTE_DAYS,
        OVERRUN_INVESTMENT,
        TOTAL_DAYS_ACTUALS_PLANNED,
        PM_BUDGET,
        SA_BUDGET,
        DE_BUDGET,
        DS_BUDGET,
        PM_BUDGETED_FTE,
        SA_BUDGETED_FTE,
        DE_BUDGETED_FTE,
        DS_BUDGETED_FTE,
        PM_ACTUAL_FTE,
        SA_ACTUAL_FTE,
        DE_ACTUAL_FTE,
        DS_ACTUAL_FTE,
    ]
}

pub const fn risk_fields() -> &'static [&'static str] {
    &[RISK_LEVEL, RISK_DESCRIPTION]
}

/// Every field a full project sync reads, in query order.
pub fn all_sync_fields() -> Vec<&'static str> {
    [
        core_fields(),
        date_fields(),
        health_fields(),
        financial_fields(),
        risk_fields(),
    ]
    .concat()
}

/// `SELECT ... FROM <project object> WHERE Id = '<id>'`.
///
/// `record_id` must already be validated against the record id pattern.
pub fn project_query(record_id: &str) -> String {
    format!(
        "SELECT {} FROM {} WHERE {} = '{}'",
        all_sync_fields().join(", "),
        SOBJECT,
        ID,
        record_id
    )
}

/// Financial fields only, for the same record.
pub fn financials_query(record_id: &str) -> String {
    let fields = [&[ID][..], financial_fields()].concat();
    format!(
        "SELECT {} FROM {} WHERE {} = '{}'",
        fields.join(", "),
        SOBJECT,
        ID,
        record_id
    )
}

/// Risk list query against `sobject` for one project record.
pub fn risk_list_query(sobject: &str, record_id: &str) -> String {
    format!(
        "SELECT {} FROM {} WHERE {} = '{}'",
        risk_object::fields().join(", "),
        sobject,
        risk_object::PROJECT,
        record_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_query_lists_fields_explicitly() {
        let soql = project_query("a2X5g000000AbCdEAK");
        assert!(soql.starts_with("SELECT Id, Name, preempt__Status__c"));
        assert!(soql.contains("preempt__account__r.Name"));
        assert!(soql.contains("Total_FTEs__c"));
        assert!(soql.ends_with("FROM preempt__PrecursiveProject__c WHERE Id = 'a2X5g000000AbCdEAK'"));
        assert!(!soql.contains('*'));
    }

    #[test]
    fn all_sync_fields_has_no_duplicates() {
        let fields = all_sync_fields();
        let mut deduped = fields.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(fields.len(), deduped.len());
    }
}
