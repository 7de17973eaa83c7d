//! Backend resources, limited to the fields the assistant reads.
//!
//! Every field is defaulted so a sparse or newer backend payload still decodes.
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthResponse {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub photo: Option<String>,
    pub auth_token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Member {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub full_name_display: String,
    pub role_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Status {
    pub id: i64,
    pub name: String,
    pub color: Option<String>,
    pub is_closed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StatusInfo {
    pub name: String,
    pub color: Option<String>,
    pub is_closed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub created_date: Option<String>,
    pub is_private: bool,
    pub total_milestones: Option<i64>,
    pub owner: Option<Member>,
    pub members: Vec<Member>,
    pub us_statuses: Vec<Status>,
    pub task_statuses: Vec<Status>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Milestone {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub estimated_start: Option<String>,
    pub estimated_finish: Option<String>,
    pub closed: bool,
    pub total_points: Option<f64>,
    pub closed_points: Option<f64>,
    pub user_stories: Vec<UserStory>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct UserStory {
    pub id: i64,
    #[serde(rename = "ref")]
    pub reference: i64,
    pub subject: String,
    pub description: Option<String>,
    pub status: Option<i64>,
    pub status_extra_info: Option<StatusInfo>,
    pub is_closed: bool,
    pub is_blocked: bool,
    pub blocked_note: Option<String>,
    pub total_points: Option<f64>,
    pub assigned_to: Option<i64>,
    pub assigned_to_extra_info: Option<Member>,
    pub owner_extra_info: Option<Member>,
    pub milestone: Option<i64>,
    pub milestone_name: Option<String>,
    pub tags: Vec<Value>,
    pub created_date: Option<String>,
    pub modified_date: Option<String>,
    pub version: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct UserStoryRef {
    pub id: i64,
    #[serde(rename = "ref")]
    pub reference: i64,
    pub subject: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Task {
    pub id: i64,
    #[serde(rename = "ref")]
    pub reference: i64,
    pub subject: String,
    pub description: Option<String>,
    pub status: Option<i64>,
    pub status_extra_info: Option<StatusInfo>,
    pub is_closed: bool,
    pub is_blocked: bool,
    pub blocked_note: Option<String>,
    pub user_story: Option<i64>,
    pub user_story_extra_info: Option<UserStoryRef>,
    pub assigned_to: Option<i64>,
    pub assigned_to_extra_info: Option<Member>,
    pub owner_extra_info: Option<Member>,
    pub milestone: Option<i64>,
    pub tags: Vec<Value>,
    pub created_date: Option<String>,
    pub modified_date: Option<String>,
    pub version: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Issue {
    pub id: i64,
    #[serde(rename = "ref")]
    pub reference: i64,
    pub subject: String,
    pub status_extra_info: Option<StatusInfo>,
    pub is_closed: bool,
    pub assigned_to_extra_info: Option<Member>,
    pub version: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct HistoryUser {
    pub pk: Option<i64>,
    pub username: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct HistoryEntry {
    pub id: String,
    pub user: HistoryUser,
    pub created_at: Option<String>,
    pub comment: String,
    pub edit_comment_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SearchResults {
    pub count: i64,
    pub userstories: Vec<UserStory>,
    pub tasks: Vec<Task>,
    pub issues: Vec<Issue>,
}

/// Items that carry a change history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryKind {
    UserStory,
    Task,
    Issue,
}

impl HistoryKind {
    /// Segment used by the history endpoint
    pub fn history_segment(&self) -> &'static str {
        match self {
            HistoryKind::UserStory => "userstory",
            HistoryKind::Task => "task",
            HistoryKind::Issue => "issue",
        }
    }

    /// Collection the item itself lives under
    pub fn collection(&self) -> &'static str {
        match self {
            HistoryKind::UserStory => "userstories",
            HistoryKind::Task => "tasks",
            HistoryKind::Issue => "issues",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserStoryFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<i64>,
    #[serde(rename = "status__is_closed", skip_serializing_if = "Option::is_none")]
    pub is_closed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_story: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<i64>,
    #[serde(rename = "status__is_closed", skip_serializing_if = "Option::is_none")]
    pub is_closed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NewUserStory {
    pub project: i64,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// A partial update. `Some(None)` clears a nullable field, `None` leaves it alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserStoryPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone: Option<Option<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<Option<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_blocked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_note: Option<String>,
    pub version: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NewTask {
    pub project: i64,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_story: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_story: Option<Option<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone: Option<Option<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<Option<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_blocked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_note: Option<String>,
    pub version: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sparse_story_decodes() {
        let story: UserStory = serde_json::from_value(json!({
            "id": 7,
            "ref": 12,
            "subject": "Login page",
            "assigned_to_extra_info": null,
            "tags": [["backend", null]],
            "version": 3
        }))
        .unwrap();
        assert_eq!(story.reference, 12);
        assert_eq!(story.assigned_to_extra_info, None);
        assert_eq!(story.tags.len(), 1);
        assert!(!story.is_closed);
    }

    #[test]
    fn test_patch_distinguishes_absent_and_null() {
        let patch = UserStoryPatch {
            assigned_to: Some(None),
            version: 4,
            ..Default::default()
        };
        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(value, json!({"assigned_to": null, "version": 4}));
    }
}
