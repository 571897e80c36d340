//! Issue-tracker mapping.
//!
//! Search payload → [`RemoteIssue`] → [`ActionFields`], plus project key
//! handling (validation, URL extraction, JQL construction).

use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use super::{RemoteIssue, RemoteProject};
use crate::models::action_item::{ActionPriority, ActionStatus};

/// Fields requested from the search endpoint; never `*all`.
pub const SEARCH_FIELDS: &[&str] = &[
    "summary",
    "status",
    "issuetype",
    "assignee",
    "priority",
    "created",
    "updated",
    "duedate",
    "description",
];

static PROJECT_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Z0-9_]+$").expect("project key pattern compiles"));

static KEY_IN_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(?:projects|browse)/([A-Za-z][A-Za-z0-9]+)(?:-\d+)?(?:[/?#]|$)")
        .expect("url key pattern compiles")
});

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IssueMappingError {
    #[error("issue {key} has an unparseable due date '{value}'")]
    InvalidDueDate { key: String, value: String },
}

/// Mutable action item fields derived from one remote issue.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionFields {
    pub title: String,
    pub description: Option<String>,
    pub status: ActionStatus,
    pub priority: ActionPriority,
    pub issue_type: Option<String>,
    pub assignee: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub remote_created_at: Option<DateTime<FixedOffset>>,
    pub remote_updated_at: Option<DateTime<FixedOffset>>,
}

pub fn is_valid_project_key(key: &str) -> bool {
    PROJECT_KEY.is_match(key)
}

/// Finds a project key in a `/projects/KEY` or `/browse/KEY[-123]` link.
pub fn extract_project_key(url: &str) -> Option<String> {
    KEY_IN_URL
        .captures(url.trim())
        .and_then(|captures| captures.get(1))
        .map(|key| key.as_str().to_uppercase())
}

/// `project = "KEY" [AND updated >= -Nm] ORDER BY updated DESC`
///
/// The window is relative to `now` because absolute JQL dates are read in
/// the API user's profile time zone. `N` is rounded up, plus one minute, so
/// the window always reaches back past `since`.
///
/// `key` must already satisfy [`is_valid_project_key`].
pub fn build_jql(key: &str, since: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    match since {
        Some(since) => format!(
            "project = \"{key}\" AND updated >= -{}m ORDER BY updated DESC",
            window_minutes(since, now)
        ),
        None => format!("project = \"{key}\" ORDER BY updated DESC"),
    }
}

fn window_minutes(since: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - since).num_seconds().max(0) / 60 + 1
}

/// Maps a `/project/{key}` response.
pub fn raw_to_project(raw: &Value) -> Option<RemoteProject> {
    let key = raw.get("key").and_then(Value::as_str)?;
    Some(RemoteProject {
        external_id: key.to_string(),
        name: raw.get("name").and_then(Value::as_str).map(str::to_string),
        category: raw
            .get("projectCategory")
            .and_then(|category| category.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string),
        ..RemoteProject::default()
    })
}

/// Maps one search hit. Hits without a key are dropped.
pub fn raw_to_issue(raw: &Value) -> Option<RemoteIssue> {
    let key = raw.get("key").and_then(Value::as_str)?.to_string();
    let fields = raw.get("fields").unwrap_or(&Value::Null);

    Some(RemoteIssue {
        key,
        summary: fields
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        description: fields.get("description").and_then(description_text),
        status: nested_name(fields, "status", "name"),
        issue_type: nested_name(fields, "issuetype", "name"),
        assignee: nested_name(fields, "assignee", "displayName"),
        priority: nested_name(fields, "priority", "name"),
        created: fields
            .get("created")
            .and_then(Value::as_str)
            .and_then(parse_timestamp),
        updated: fields
            .get("updated")
            .and_then(Value::as_str)
            .and_then(parse_timestamp),
        due_date: fields
            .get("duedate")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// Translates a remote issue into local action item fields.
pub fn issue_to_fields(issue: &RemoteIssue) -> Result<ActionFields, IssueMappingError> {
    let due_date = match issue.due_date.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
            IssueMappingError::InvalidDueDate {
                key: issue.key.clone(),
                value: raw.to_string(),
            }
        })?),
    };

    Ok(ActionFields {
        title: issue.summary.clone(),
        description: issue.description.clone(),
        status: map_status(issue.status.as_deref()),
        priority: map_priority(issue.priority.as_deref()),
        issue_type: issue.issue_type.clone(),
        assignee: issue.assignee.clone(),
        due_date,
        remote_created_at: issue.created,
        remote_updated_at: issue.updated,
    })
}

pub fn map_status(status: Option<&str>) -> ActionStatus {
    match status.map(|s| s.trim().to_lowercase()).as_deref() {
        Some("done" | "complete" | "closed" | "resolved") => ActionStatus::Complete,
        Some("in progress" | "in review" | "qa") => ActionStatus::InProgress,
        Some("to do" | "backlog" | "open" | "new" | "created") => ActionStatus::ToDo,
        _ => ActionStatus::NoStatus,
    }
}

pub fn map_priority(priority: Option<&str>) -> ActionPriority {
    match priority.map(|p| p.trim().to_lowercase()).as_deref() {
        Some("high" | "highest" | "critical" | "blocker") => ActionPriority::High,
        Some("low" | "lowest" | "trivial") => ActionPriority::Low,
        _ => ActionPriority::Medium,
    }
}

/// Tracker timestamps look like `2025-01-15T10:30:00.000+0000`.
pub fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .ok()
}

fn nested_name(fields: &Value, field: &str, name: &str) -> Option<String> {
    fields
        .get(field)
        .and_then(|value| value.get(name))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Descriptions are plain strings on older sites and Atlassian Document
/// Format trees on v3; ADF is flattened to its text nodes.
fn description_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Object(_) => {
            let mut out = String::new();
            collect_adf_text(value, &mut out);
            out
        }
        _ => return None,
    };
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn collect_adf_text(node: &Value, out: &mut String) {
    if let Some(text) = node.get("text").and_then(Value::as_str) {
        out.push_str(text);
    }
    if let Some(children) = node.get("content").and_then(Value::as_array) {
        for child in children {
            collect_adf_text(child, out);
        }
        if node.get("type").and_then(Value::as_str) == Some("paragraph") {
            out.push('\n');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn issue(due: Option<&str>) -> RemoteIssue {
        RemoteIssue {
            key: "OPS-7".to_string(),
            summary: "Rotate credentials".to_string(),
            status: Some("In Progress".to_string()),
            priority: Some("Blocker".to_string()),
            due_date: due.map(str::to_string),
            ..RemoteIssue::default()
        }
    }

    #[test]
    fn validates_project_keys() {
        assert!(is_valid_project_key("OPS"));
        assert!(is_valid_project_key("DATA_2"));
        assert!(!is_valid_project_key("ops"));
        assert!(!is_valid_project_key("O"));
        assert!(!is_valid_project_key("OPS\" OR project = \"X"));
    }

    #[test]
    fn extracts_keys_from_links() {
        assert_eq!(
            extract_project_key("https://acme.atlassian.net/jira/software/projects/OPS/boards/12")
                .as_deref(),
            Some("OPS")
        );
        assert_eq!(
            extract_project_key("https://acme.atlassian.net/browse/data-42").as_deref(),
            Some("DATA")
        );
        assert_eq!(
            extract_project_key("https://acme.atlassian.net/browse/OPS").as_deref(),
            Some("OPS")
        );
        assert_eq!(extract_project_key("https://acme.atlassian.net/wiki/home"), None);
    }

    #[test]
    fn builds_relative_incremental_jql() {
        let now = Utc.with_ymd_and_hms(2025, 3, 4, 9, 35, 20).unwrap();
        let since = Utc.with_ymd_and_hms(2025, 3, 4, 9, 5, 0).unwrap();
        assert_eq!(
            build_jql("OPS", Some(since), now),
            "project = \"OPS\" AND updated >= -31m ORDER BY updated DESC"
        );
        assert_eq!(
            build_jql("OPS", None, now),
            "project = \"OPS\" ORDER BY updated DESC"
        );
    }

    #[test]
    fn window_never_shrinks_below_a_minute() {
        let now = Utc.with_ymd_and_hms(2025, 3, 4, 9, 5, 0).unwrap();
        assert_eq!(window_minutes(now, now), 1);
        // A clock skewed ahead of us still yields a usable window
        assert_eq!(window_minutes(now + chrono::Duration::minutes(3), now), 1);
        assert_eq!(window_minutes(now - chrono::Duration::hours(2), now), 121);
    }

    #[test]
    fn maps_search_hit() {
        let raw = json!({
            "key": "OPS-1",
            "fields": {
                "summary": "Set up CI",
                "status": { "name": "Done" },
                "issuetype": { "name": "Task" },
                "assignee": { "displayName": "Sam Lee" },
                "priority": null,
                "created": "2025-01-15T10:30:00.000+0000",
                "updated": "2025-01-16T08:00:00.000+0100",
                "duedate": "2025-02-01",
                "description": {
                    "type": "doc",
                    "content": [
                        { "type": "paragraph", "content": [{ "type": "text", "text": "First" }] },
                        { "type": "paragraph", "content": [{ "type": "text", "text": "Second" }] }
                    ]
                }
            }
        });

        let issue = raw_to_issue(&raw).unwrap();
        assert_eq!(issue.status.as_deref(), Some("Done"));
        assert_eq!(issue.assignee.as_deref(), Some("Sam Lee"));
        assert_eq!(issue.priority, None);
        assert_eq!(issue.description.as_deref(), Some("First\nSecond"));
        assert_eq!(
            issue.updated.unwrap().with_timezone(&Utc),
            Utc.with_ymd_and_hms(2025, 1, 16, 7, 0, 0).unwrap()
        );
        assert!(raw_to_issue(&json!({ "fields": {} })).is_none());
    }

    #[test]
    fn maps_issue_fields() {
        let fields = issue_to_fields(&issue(Some("2025-06-30"))).unwrap();
        assert_eq!(fields.status, ActionStatus::InProgress);
        assert_eq!(fields.priority, ActionPriority::High);
        assert_eq!(fields.due_date, NaiveDate::from_ymd_opt(2025, 6, 30));
    }

    #[test]
    fn unparseable_due_date_is_an_error() {
        let err = issue_to_fields(&issue(Some("30/06/2025"))).unwrap_err();
        assert_eq!(
            err,
            IssueMappingError::InvalidDueDate {
                key: "OPS-7".to_string(),
                value: "30/06/2025".to_string()
            }
        );
        assert!(issue_to_fields(&issue(None)).unwrap().due_date.is_none());
    }

    #[test]
    fn unknown_status_and_priority_fall_back() {
        assert_eq!(map_status(Some("Waiting for customer")), ActionStatus::NoStatus);
        assert_eq!(map_status(None), ActionStatus::NoStatus);
        assert_eq!(map_status(Some("Backlog")), ActionStatus::ToDo);
        assert_eq!(map_priority(Some("Lowest")), ActionPriority::Low);
        assert_eq!(map_priority(Some("Normal")), ActionPriority::Medium);
    }
}
