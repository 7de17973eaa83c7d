//! The project-tracking tool catalog.
//!
//! Every tool is bound to one [`TaigaClient`] and returns a reduced projection of the
//! backend response. Content created or edited through these tools is always marked
//! with the provenance tag and description suffix below.
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};

use super::registry::{typed, ParamSpec, ToolDefinition, ToolRegistry};
use crate::errors::AgentResult;
use crate::taiga::types::*;
use crate::taiga::TaigaClient;

pub const AI_TAG: &str = "🤖ai-generated";
pub const CREATED_MARKER: &str = "_🤖 Created by Taiga AI Assistant_";
pub const EDITED_MARKER: &str = "_🤖 Edited by Taiga AI Assistant_";
pub const COMMENT_MARKER: &str = "_🤖 Comment created by Taiga AI Assistant_";

pub const STORY_SORT_KEYS: &[&str] = &[
    "created_date",
    "modified_date",
    "ref",
    "subject",
    "total_points",
];
pub const TASK_SORT_KEYS: &[&str] = &["created_date", "modified_date", "ref", "subject"];

const PROJECT_DESCRIPTION_LIMIT: usize = 200;

/// Description for newly created content
pub fn created_description(description: Option<&str>) -> String {
    match description.filter(|d| !d.trim().is_empty()) {
        Some(description) => format!("{}\n\n---\n{}", description, CREATED_MARKER),
        None => CREATED_MARKER.to_string(),
    }
}

/// Description for content rewritten by the assistant
pub fn edited_description(description: &str) -> String {
    if description.trim_end().ends_with(EDITED_MARKER) {
        return description.to_string();
    }
    format!("{}\n\n---\n{}", description, EDITED_MARKER)
}

pub fn marked_comment(comment: &str) -> String {
    format!("{}\n\n{}", comment, COMMENT_MARKER)
}

/// Tags with the provenance tag appended once
pub fn with_ai_tag(tags: Option<Vec<String>>) -> Vec<String> {
    let mut tags = tags.unwrap_or_default();
    if !tags.iter().any(|t| t == AI_TAG) {
        tags.push(AI_TAG.to_string());
    }
    tags
}

/// Check a sort key against the allowed fields, accepting a leading `-` for descending
pub fn validate_order_by(order_by: Option<String>, allowed: &[&str]) -> Result<Option<String>, String> {
    let Some(order_by) = order_by.filter(|o| !o.trim().is_empty()) else {
        return Ok(None);
    };
    let order_by = order_by.trim().to_string();
    let field = order_by.strip_prefix('-').unwrap_or(&order_by);
    if allowed.contains(&field) {
        Ok(Some(order_by))
    } else {
        Err(format!(
            "Invalid orderBy '{}'. Use one of: {} (prefix with - for descending)",
            order_by,
            allowed.join(", ")
        ))
    }
}

/// Cap a list after retrieval. A missing or zero limit keeps everything.
fn apply_limit<T>(mut items: Vec<T>, limit: Option<usize>) -> Vec<T> {
    if let Some(limit) = limit.filter(|l| *l > 0) {
        items.truncate(limit);
    }
    items
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// Distinguishes an absent field (`None`) from an explicit null (`Some(None)`)
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn member_summary(member: &Member) -> Value {
    json!({
        "id": member.id,
        "username": member.username,
        "full_name": member.full_name,
    })
}

fn member_name(member: &Option<Member>) -> Value {
    member
        .as_ref()
        .map(|m| m.full_name.clone())
        .filter(|name| !name.is_empty())
        .map(Value::String)
        .unwrap_or(Value::Null)
}

fn status_name(status: &Option<StatusInfo>) -> Option<&str> {
    status.as_ref().map(|s| s.name.as_str())
}

fn status_color(status: &Option<StatusInfo>) -> Option<&str> {
    status.as_ref().and_then(|s| s.color.as_deref())
}

#[derive(Deserialize)]
struct NoInput {}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectInput {
    project_id: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MilestoneInput {
    milestone_id: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserStoryInput {
    user_story_id: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskInput {
    task_id: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchInput {
    project_id: i64,
    query: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListUserStoriesInput {
    project_id: i64,
    milestone_id: Option<i64>,
    status: Option<i64>,
    assigned_to: Option<i64>,
    is_closed: Option<bool>,
    order_by: Option<String>,
    limit: Option<usize>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserStoryInput {
    project_id: i64,
    subject: String,
    description: Option<String>,
    milestone_id: Option<i64>,
    tags: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateUserStoryInput {
    user_story_id: i64,
    subject: Option<String>,
    description: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    milestone_id: Option<Option<i64>>,
    status: Option<i64>,
    #[serde(default, deserialize_with = "nullable")]
    assigned_to: Option<Option<i64>>,
    tags: Option<Vec<String>>,
    is_blocked: Option<bool>,
    blocked_note: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListTasksInput {
    project_id: i64,
    user_story_id: Option<i64>,
    milestone_id: Option<i64>,
    status: Option<i64>,
    assigned_to: Option<i64>,
    is_closed: Option<bool>,
    order_by: Option<String>,
    limit: Option<usize>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskInput {
    project_id: i64,
    subject: String,
    description: Option<String>,
    user_story_id: Option<i64>,
    milestone_id: Option<i64>,
    assigned_to: Option<i64>,
    tags: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateTaskInput {
    task_id: i64,
    subject: Option<String>,
    description: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    user_story_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    milestone_id: Option<Option<i64>>,
    status: Option<i64>,
    #[serde(default, deserialize_with = "nullable")]
    assigned_to: Option<Option<i64>>,
    tags: Option<Vec<String>>,
    is_blocked: Option<bool>,
    blocked_note: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserStoryCommentInput {
    user_story_id: i64,
    comment: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskCommentInput {
    task_id: i64,
    comment: String,
}

const PROJECT_ID: &str = "ID of the project";
const MILESTONE_ID: &str = "ID of the sprint (milestone)";
const USER_STORY_ID: &str = "ID of the user story";
const TASK_ID: &str = "ID of the task";
const LIMIT: &str = "Maximum number of results to return";

/// Build the full catalog bound to `client`
pub fn taiga_tools(client: &TaigaClient) -> AgentResult<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for definition in [
        get_projects(client),
        get_project(client),
        get_project_stats(client),
        get_milestones(client),
        get_milestone(client),
        get_milestone_stats(client),
        get_user_stories(client),
        get_user_story(client),
        search_user_stories(client),
        create_user_story(client),
        update_user_story(client),
        get_tasks(client),
        get_task(client),
        search_tasks(client),
        create_task(client),
        update_task(client),
        global_search(client),
        get_user_story_comments(client),
        get_task_comments(client),
        create_user_story_comment(client),
        create_task_comment(client),
    ] {
        registry.register(definition)?;
    }
    Ok(registry)
}

fn get_projects(client: &TaigaClient) -> ToolDefinition {
    let client = client.clone();
    ToolDefinition::new(
        "get_projects",
        "List every project the user can access",
        vec![],
        typed(move |_: NoInput| {
            let client = client.clone();
            async move {
                let projects = client.get_projects().await?;
                let summaries: Vec<Value> = projects
                    .iter()
                    .map(|p| {
                        json!({
                            "id": p.id,
                            "name": p.name,
                            "slug": p.slug,
                            "description": p.description.as_deref().map(|d| truncate_chars(d, PROJECT_DESCRIPTION_LIMIT)),
                            "is_private": p.is_private,
                            "total_milestones": p.total_milestones,
                            "members_count": p.members.len(),
                        })
                    })
                    .collect();
                Ok::<_, crate::taiga::TaigaError>(json!(summaries))
            }
        }),
    )
}

fn get_project(client: &TaigaClient) -> ToolDefinition {
    let client = client.clone();
    ToolDefinition::new(
        "get_project",
        "Get one project by ID, including its statuses, members and settings",
        vec![ParamSpec::number("projectId", PROJECT_ID)],
        typed(move |input: ProjectInput| {
            let client = client.clone();
            async move {
                let project = client.get_project(input.project_id).await?;
                let statuses = |statuses: &[Status]| -> Vec<Value> {
                    statuses
                        .iter()
                        .map(|s| json!({"id": s.id, "name": s.name, "is_closed": s.is_closed}))
                        .collect()
                };
                Ok::<_, crate::taiga::TaigaError>(json!({
                    "id": project.id,
                    "name": project.name,
                    "slug": project.slug,
                    "description": project.description,
                    "created_date": project.created_date,
                    "is_private": project.is_private,
                    "owner": project.owner.as_ref().map(member_summary),
                    "members": project.members.iter().map(|m| json!({
                        "id": m.id,
                        "username": m.username,
                        "full_name": m.full_name,
                        "role_name": m.role_name,
                    })).collect::<Vec<_>>(),
                    "us_statuses": statuses(&project.us_statuses),
                    "task_statuses": statuses(&project.task_statuses),
                }))
            }
        }),
    )
}

fn get_project_stats(client: &TaigaClient) -> ToolDefinition {
    let client = client.clone();
    ToolDefinition::new(
        "get_project_stats",
        "Get project statistics: total and closed points, stories, tasks and velocity",
        vec![ParamSpec::number("projectId", PROJECT_ID)],
        typed(move |input: ProjectInput| {
            let client = client.clone();
            async move { client.get_project_stats(input.project_id).await }
        }),
    )
}

fn get_milestones(client: &TaigaClient) -> ToolDefinition {
    let client = client.clone();
    ToolDefinition::new(
        "get_milestones",
        "List the sprints (milestones) of a project",
        vec![ParamSpec::number("projectId", PROJECT_ID)],
        typed(move |input: ProjectInput| {
            let client = client.clone();
            async move {
                let milestones = client.get_milestones(input.project_id).await?;
                let summaries: Vec<Value> = milestones
                    .iter()
                    .map(|m| {
                        json!({
                            "id": m.id,
                            "name": m.name,
                            "slug": m.slug,
                            "estimated_start": m.estimated_start,
                            "estimated_finish": m.estimated_finish,
                            "closed": m.closed,
                            "total_points": m.total_points,
                            "closed_points": m.closed_points,
                            "user_stories_count": m.user_stories.len(),
                        })
                    })
                    .collect();
                Ok::<_, crate::taiga::TaigaError>(json!(summaries))
            }
        }),
    )
}

fn get_milestone(client: &TaigaClient) -> ToolDefinition {
    let client = client.clone();
    ToolDefinition::new(
        "get_milestone",
        "Get one sprint (milestone) with its user stories",
        vec![ParamSpec::number("milestoneId", MILESTONE_ID)],
        typed(move |input: MilestoneInput| {
            let client = client.clone();
            async move {
                let m = client.get_milestone(input.milestone_id).await?;
                Ok::<_, crate::taiga::TaigaError>(json!({
                    "id": m.id,
                    "name": m.name,
                    "slug": m.slug,
                    "estimated_start": m.estimated_start,
                    "estimated_finish": m.estimated_finish,
                    "closed": m.closed,
                    "total_points": m.total_points,
                    "closed_points": m.closed_points,
                    "user_stories": m.user_stories.iter().map(|us| json!({
                        "id": us.id,
                        "ref": us.reference,
                        "subject": us.subject,
                        "status": status_name(&us.status_extra_info),
                        "is_closed": us.is_closed,
                        "total_points": us.total_points,
                    })).collect::<Vec<_>>(),
                }))
            }
        }),
    )
}

fn get_milestone_stats(client: &TaigaClient) -> ToolDefinition {
    let client = client.clone();
    ToolDefinition::new(
        "get_milestone_stats",
        "Get sprint statistics: progress, burndown and completed tasks",
        vec![ParamSpec::number("milestoneId", MILESTONE_ID)],
        typed(move |input: MilestoneInput| {
            let client = client.clone();
            async move { client.get_milestone_stats(input.milestone_id).await }
        }),
    )
}

fn get_user_stories(client: &TaigaClient) -> ToolDefinition {
    let client = client.clone();
    ToolDefinition::new(
        "get_user_stories",
        "List the user stories of a project, optionally filtered by sprint, status or assignee. Supports ordering and a result limit.",
        vec![
            ParamSpec::number("projectId", PROJECT_ID),
            ParamSpec::number("milestoneId", "Only stories in this sprint").optional(),
            ParamSpec::number("status", "Only stories with this status ID").optional(),
            ParamSpec::number("assignedTo", "Only stories assigned to this user ID").optional(),
            ParamSpec::boolean("isClosed", "Only closed (true) or open (false) stories").optional(),
            ParamSpec::string(
                "orderBy",
                "Sort field: created_date, modified_date, ref, subject, total_points. Prefix with - for descending (e.g. -created_date for newest first)",
            )
            .optional(),
            ParamSpec::number("limit", LIMIT).optional(),
        ],
        typed(move |input: ListUserStoriesInput| {
            let client = client.clone();
            async move {
                let order_by = validate_order_by(input.order_by, STORY_SORT_KEYS)?;
                let stories = client
                    .get_user_stories(&UserStoryFilters {
                        project: Some(input.project_id),
                        milestone: input.milestone_id,
                        status: input.status,
                        assigned_to: input.assigned_to,
                        is_closed: input.is_closed,
                        order_by,
                        q: None,
                    })
                    .await
                    .map_err(|e| e.to_string())?;
                let summaries: Vec<Value> = apply_limit(stories, input.limit)
                    .iter()
                    .map(|us| {
                        json!({
                            "id": us.id,
                            "ref": us.reference,
                            "subject": us.subject,
                            "status": status_name(&us.status_extra_info),
                            "status_color": status_color(&us.status_extra_info),
                            "is_closed": us.is_closed,
                            "is_blocked": us.is_blocked,
                            "total_points": us.total_points,
                            "assigned_to": member_name(&us.assigned_to_extra_info),
                            "milestone": us.milestone_name,
                            "tags": us.tags,
                            "created_date": us.created_date,
                        })
                    })
                    .collect();
                Ok::<_, String>(json!(summaries))
            }
        }),
    )
}

fn user_story_detail(story: &UserStory) -> Value {
    json!({
        "id": story.id,
        "ref": story.reference,
        "subject": story.subject,
        "description": story.description,
        "status": status_name(&story.status_extra_info),
        "status_id": story.status,
        "is_closed": story.is_closed,
        "is_blocked": story.is_blocked,
        "blocked_note": story.blocked_note,
        "total_points": story.total_points,
        "assigned_to": story.assigned_to_extra_info.as_ref().map(member_summary),
        "owner": story.owner_extra_info.as_ref().map(member_summary),
        "milestone": story.milestone_name,
        "milestone_id": story.milestone,
        "tags": story.tags,
        "created_date": story.created_date,
        "modified_date": story.modified_date,
        "version": story.version,
    })
}

fn get_user_story(client: &TaigaClient) -> ToolDefinition {
    let client = client.clone();
    ToolDefinition::new(
        "get_user_story",
        "Get the full details of one user story",
        vec![ParamSpec::number("userStoryId", USER_STORY_ID)],
        typed(move |input: UserStoryInput| {
            let client = client.clone();
            async move {
                let story = client.get_user_story(input.user_story_id).await?;
                Ok::<_, crate::taiga::TaigaError>(user_story_detail(&story))
            }
        }),
    )
}

fn search_user_stories(client: &TaigaClient) -> ToolDefinition {
    let client = client.clone();
    ToolDefinition::new(
        "search_user_stories",
        "Search the user stories of a project by text",
        vec![
            ParamSpec::number("projectId", PROJECT_ID),
            ParamSpec::string("query", "Text to search for in subject and description"),
        ],
        typed(move |input: SearchInput| {
            let client = client.clone();
            async move {
                let stories = client
                    .search_user_stories(input.project_id, &input.query)
                    .await?;
                let summaries: Vec<Value> = stories
                    .iter()
                    .map(|us| {
                        json!({
                            "id": us.id,
                            "ref": us.reference,
                            "subject": us.subject,
                            "status": status_name(&us.status_extra_info),
                            "is_closed": us.is_closed,
                            "total_points": us.total_points,
                            "assigned_to": member_name(&us.assigned_to_extra_info),
                        })
                    })
                    .collect();
                Ok::<_, crate::taiga::TaigaError>(json!(summaries))
            }
        }),
    )
}

fn create_user_story(client: &TaigaClient) -> ToolDefinition {
    let client = client.clone();
    ToolDefinition::new(
        "create_user_story",
        "Create a user story in a project. Only the subject is required.",
        vec![
            ParamSpec::number("projectId", PROJECT_ID),
            ParamSpec::string("subject", "Title of the user story"),
            ParamSpec::string("description", "Detailed description").optional(),
            ParamSpec::number("milestoneId", "Sprint to place the story in").optional(),
            ParamSpec::string_array("tags", "Tags to add").optional(),
        ],
        typed(move |input: CreateUserStoryInput| {
            let client = client.clone();
            async move {
                let story = client
                    .create_user_story(&NewUserStory {
                        project: input.project_id,
                        subject: input.subject,
                        description: Some(created_description(input.description.as_deref())),
                        milestone: input.milestone_id,
                        tags: Some(with_ai_tag(input.tags)),
                    })
                    .await?;
                Ok::<_, crate::taiga::TaigaError>(json!({
                    "id": story.id,
                    "ref": story.reference,
                    "subject": story.subject,
                    "status": status_name(&story.status_extra_info),
                    "created_date": story.created_date,
                    "message": format!("User story #{} \"{}\" created", story.reference, story.subject),
                }))
            }
        }),
    )
}

fn update_user_story(client: &TaigaClient) -> ToolDefinition {
    let client = client.clone();
    ToolDefinition::new(
        "update_user_story",
        "Update an existing user story. Only the given fields change.",
        vec![
            ParamSpec::number("userStoryId", "ID of the user story to update"),
            ParamSpec::string("subject", "New title").optional(),
            ParamSpec::string("description", "New description").optional(),
            ParamSpec::number("milestoneId", "New sprint, null to remove it from its sprint").nullable(),
            ParamSpec::number("status", "New status ID").optional(),
            ParamSpec::number("assignedTo", "New assignee, null to unassign").nullable(),
            ParamSpec::string_array("tags", "Replacement tags").optional(),
            ParamSpec::boolean("isBlocked", "Mark as blocked").optional(),
            ParamSpec::string("blockedNote", "Reason the story is blocked").optional(),
        ],
        typed(move |input: UpdateUserStoryInput| {
            let client = client.clone();
            async move {
                // the version must be current or the backend rejects the patch
                let current = client.get_user_story(input.user_story_id).await?;
                let story = client
                    .update_user_story(
                        input.user_story_id,
                        &UserStoryPatch {
                            subject: input.subject,
                            description: input.description.as_deref().map(edited_description),
                            milestone: input.milestone_id,
                            status: input.status,
                            assigned_to: input.assigned_to,
                            tags: input.tags.map(|tags| with_ai_tag(Some(tags))),
                            is_blocked: input.is_blocked,
                            blocked_note: input.blocked_note,
                            version: current.version,
                        },
                    )
                    .await?;
                Ok::<_, crate::taiga::TaigaError>(json!({
                    "id": story.id,
                    "ref": story.reference,
                    "subject": story.subject,
                    "status": status_name(&story.status_extra_info),
                    "modified_date": story.modified_date,
                    "message": format!("User story #{} updated", story.reference),
                }))
            }
        }),
    )
}

fn get_tasks(client: &TaigaClient) -> ToolDefinition {
    let client = client.clone();
    ToolDefinition::new(
        "get_tasks",
        "List the tasks of a project, optionally filtered by user story, sprint or status. Supports ordering and a result limit.",
        vec![
            ParamSpec::number("projectId", PROJECT_ID),
            ParamSpec::number("userStoryId", "Only tasks of this user story").optional(),
            ParamSpec::number("milestoneId", "Only tasks in this sprint").optional(),
            ParamSpec::number("status", "Only tasks with this status ID").optional(),
            ParamSpec::number("assignedTo", "Only tasks assigned to this user ID").optional(),
            ParamSpec::boolean("isClosed", "Only closed (true) or open (false) tasks").optional(),
            ParamSpec::string(
                "orderBy",
                "Sort field: created_date, modified_date, ref, subject. Prefix with - for descending (e.g. -created_date for newest first)",
            )
            .optional(),
            ParamSpec::number("limit", LIMIT).optional(),
        ],
        typed(move |input: ListTasksInput| {
            let client = client.clone();
            async move {
                let order_by = validate_order_by(input.order_by, TASK_SORT_KEYS)?;
                let tasks = client
                    .get_tasks(&TaskFilters {
                        project: Some(input.project_id),
                        user_story: input.user_story_id,
                        milestone: input.milestone_id,
                        status: input.status,
                        assigned_to: input.assigned_to,
                        is_closed: input.is_closed,
                        order_by,
                        q: None,
                    })
                    .await
                    .map_err(|e| e.to_string())?;
                let summaries: Vec<Value> = apply_limit(tasks, input.limit)
                    .iter()
                    .map(|t| {
                        json!({
                            "id": t.id,
                            "ref": t.reference,
                            "subject": t.subject,
                            "status": status_name(&t.status_extra_info),
                            "status_color": status_color(&t.status_extra_info),
                            "is_closed": t.is_closed,
                            "is_blocked": t.is_blocked,
                            "user_story_ref": t.user_story_extra_info.as_ref().map(|us| us.reference),
                            "user_story_subject": t.user_story_extra_info.as_ref().map(|us| us.subject.clone()),
                            "assigned_to": member_name(&t.assigned_to_extra_info),
                            "tags": t.tags,
                            "created_date": t.created_date,
                        })
                    })
                    .collect();
                Ok::<_, String>(json!(summaries))
            }
        }),
    )
}

fn task_detail(task: &Task) -> Value {
    json!({
        "id": task.id,
        "ref": task.reference,
        "subject": task.subject,
        "description": task.description,
        "status": status_name(&task.status_extra_info),
        "status_id": task.status,
        "is_closed": task.is_closed,
        "is_blocked": task.is_blocked,
        "blocked_note": task.blocked_note,
        "user_story": task.user_story_extra_info.as_ref().map(|us| json!({
            "id": us.id,
            "ref": us.reference,
            "subject": us.subject,
        })),
        "assigned_to": task.assigned_to_extra_info.as_ref().map(member_summary),
        "owner": task.owner_extra_info.as_ref().map(member_summary),
        "milestone_id": task.milestone,
        "tags": task.tags,
        "created_date": task.created_date,
        "modified_date": task.modified_date,
        "version": task.version,
    })
}

fn get_task(client: &TaigaClient) -> ToolDefinition {
    let client = client.clone();
    ToolDefinition::new(
        "get_task",
        "Get the full details of one task",
        vec![ParamSpec::number("taskId", TASK_ID)],
        typed(move |input: TaskInput| {
            let client = client.clone();
            async move {
                let task = client.get_task(input.task_id).await?;
                Ok::<_, crate::taiga::TaigaError>(task_detail(&task))
            }
        }),
    )
}

fn search_tasks(client: &TaigaClient) -> ToolDefinition {
    let client = client.clone();
    ToolDefinition::new(
        "search_tasks",
        "Search the tasks of a project by text",
        vec![
            ParamSpec::number("projectId", PROJECT_ID),
            ParamSpec::string("query", "Text to search for in subject and description"),
        ],
        typed(move |input: SearchInput| {
            let client = client.clone();
            async move {
                let tasks = client.search_tasks(input.project_id, &input.query).await?;
                let summaries: Vec<Value> = tasks
                    .iter()
                    .map(|t| {
                        json!({
                            "id": t.id,
                            "ref": t.reference,
                            "subject": t.subject,
                            "status": status_name(&t.status_extra_info),
                            "is_closed": t.is_closed,
                            "user_story_ref": t.user_story_extra_info.as_ref().map(|us| us.reference),
                            "assigned_to": member_name(&t.assigned_to_extra_info),
                        })
                    })
                    .collect();
                Ok::<_, crate::taiga::TaigaError>(json!(summaries))
            }
        }),
    )
}

fn create_task(client: &TaigaClient) -> ToolDefinition {
    let client = client.clone();
    ToolDefinition::new(
        "create_task",
        "Create a task in a project, optionally under a user story",
        vec![
            ParamSpec::number("projectId", PROJECT_ID),
            ParamSpec::string("subject", "Title of the task"),
            ParamSpec::string("description", "Detailed description").optional(),
            ParamSpec::number("userStoryId", "Parent user story").optional(),
            ParamSpec::number("milestoneId", "Sprint to place the task in").optional(),
            ParamSpec::number("assignedTo", "User ID to assign").optional(),
            ParamSpec::string_array("tags", "Tags to add").optional(),
        ],
        typed(move |input: CreateTaskInput| {
            let client = client.clone();
            async move {
                let task = client
                    .create_task(&NewTask {
                        project: input.project_id,
                        subject: input.subject,
                        description: Some(created_description(input.description.as_deref())),
                        user_story: input.user_story_id,
                        milestone: input.milestone_id,
                        assigned_to: input.assigned_to,
                        tags: Some(with_ai_tag(input.tags)),
                    })
                    .await?;
                Ok::<_, crate::taiga::TaigaError>(json!({
                    "id": task.id,
                    "ref": task.reference,
                    "subject": task.subject,
                    "status": status_name(&task.status_extra_info),
                    "created_date": task.created_date,
                    "message": format!("Task #{} \"{}\" created", task.reference, task.subject),
                }))
            }
        }),
    )
}

fn update_task(client: &TaigaClient) -> ToolDefinition {
    let client = client.clone();
    ToolDefinition::new(
        "update_task",
        "Update an existing task. Only the given fields change.",
        vec![
            ParamSpec::number("taskId", "ID of the task to update"),
            ParamSpec::string("subject", "New title").optional(),
            ParamSpec::string("description", "New description").optional(),
            ParamSpec::number("userStoryId", "New parent user story, null to detach").nullable(),
            ParamSpec::number("milestoneId", "New sprint, null to remove it from its sprint").nullable(),
            ParamSpec::number("status", "New status ID").optional(),
            ParamSpec::number("assignedTo", "New assignee, null to unassign").nullable(),
            ParamSpec::string_array("tags", "Replacement tags").optional(),
            ParamSpec::boolean("isBlocked", "Mark as blocked").optional(),
            ParamSpec::string("blockedNote", "Reason the task is blocked").optional(),
        ],
        typed(move |input: UpdateTaskInput| {
            let client = client.clone();
            async move {
                let current = client.get_task(input.task_id).await?;
                let task = client
                    .update_task(
                        input.task_id,
                        &TaskPatch {
                            subject: input.subject,
                            description: input.description.as_deref().map(edited_description),
                            user_story: input.user_story_id,
                            milestone: input.milestone_id,
                            status: input.status,
                            assigned_to: input.assigned_to,
                            tags: input.tags.map(|tags| with_ai_tag(Some(tags))),
                            is_blocked: input.is_blocked,
                            blocked_note: input.blocked_note,
                            version: current.version,
                        },
                    )
                    .await?;
                Ok::<_, crate::taiga::TaigaError>(json!({
                    "id": task.id,
                    "ref": task.reference,
                    "subject": task.subject,
                    "status": status_name(&task.status_extra_info),
                    "modified_date": task.modified_date,
                    "message": format!("Task #{} updated", task.reference),
                }))
            }
        }),
    )
}

fn global_search(client: &TaigaClient) -> ToolDefinition {
    let client = client.clone();
    ToolDefinition::new(
        "global_search",
        "Search a whole project: user stories, tasks and issues",
        vec![
            ParamSpec::number("projectId", PROJECT_ID),
            ParamSpec::string("query", "Text to search for"),
        ],
        typed(move |input: SearchInput| {
            let client = client.clone();
            async move {
                let results = client.search(input.project_id, &input.query).await?;
                let hit = |id: i64, reference: i64, subject: &str, kind: &str| {
                    json!({"id": id, "ref": reference, "subject": subject, "type": kind})
                };
                Ok::<_, crate::taiga::TaigaError>(json!({
                    "total_count": results.count,
                    "user_stories": results.userstories.iter()
                        .map(|us| hit(us.id, us.reference, &us.subject, "user_story"))
                        .collect::<Vec<_>>(),
                    "tasks": results.tasks.iter()
                        .map(|t| hit(t.id, t.reference, &t.subject, "task"))
                        .collect::<Vec<_>>(),
                    "issues": results.issues.iter()
                        .map(|i| hit(i.id, i.reference, &i.subject, "issue"))
                        .collect::<Vec<_>>(),
                }))
            }
        }),
    )
}

fn comment_summaries(comments: &[HistoryEntry]) -> Value {
    json!(comments
        .iter()
        .map(|c| {
            let author = if c.user.name.is_empty() {
                &c.user.username
            } else {
                &c.user.name
            };
            json!({
                "id": c.id,
                "author": author,
                "author_username": c.user.username,
                "created_at": c.created_at,
                "comment": c.comment,
                "is_edited": c.edit_comment_date.is_some(),
            })
        })
        .collect::<Vec<_>>())
}

fn get_user_story_comments(client: &TaigaClient) -> ToolDefinition {
    let client = client.clone();
    ToolDefinition::new(
        "get_user_story_comments",
        "Read the comments of a user story. Useful to understand its context and the discussion around it.",
        vec![ParamSpec::number("userStoryId", USER_STORY_ID)],
        typed(move |input: UserStoryInput| {
            let client = client.clone();
            async move {
                let comments = client
                    .get_comments(HistoryKind::UserStory, input.user_story_id)
                    .await?;
                Ok::<_, crate::taiga::TaigaError>(comment_summaries(&comments))
            }
        }),
    )
}

fn get_task_comments(client: &TaigaClient) -> ToolDefinition {
    let client = client.clone();
    ToolDefinition::new(
        "get_task_comments",
        "Read the comments of a task. Useful to understand its context and the discussion around it.",
        vec![ParamSpec::number("taskId", TASK_ID)],
        typed(move |input: TaskInput| {
            let client = client.clone();
            async move {
                let comments = client.get_comments(HistoryKind::Task, input.task_id).await?;
                Ok::<_, crate::taiga::TaigaError>(comment_summaries(&comments))
            }
        }),
    )
}

fn create_user_story_comment(client: &TaigaClient) -> ToolDefinition {
    let client = client.clone();
    ToolDefinition::new(
        "create_user_story_comment",
        "Add a comment to a user story. Useful for notes, questions or status updates.",
        vec![
            ParamSpec::number("userStoryId", USER_STORY_ID),
            ParamSpec::string("comment", "Text of the comment"),
        ],
        typed(move |input: UserStoryCommentInput| {
            let client = client.clone();
            async move {
                let story = client.get_user_story(input.user_story_id).await?;
                client
                    .create_comment(
                        HistoryKind::UserStory,
                        input.user_story_id,
                        &marked_comment(&input.comment),
                        story.version,
                    )
                    .await?;
                Ok::<_, crate::taiga::TaigaError>(json!({
                    "success": true,
                    "message": format!("Comment added to user story #{}", story.reference),
                    "user_story_ref": story.reference,
                }))
            }
        }),
    )
}

fn create_task_comment(client: &TaigaClient) -> ToolDefinition {
    let client = client.clone();
    ToolDefinition::new(
        "create_task_comment",
        "Add a comment to a task. Useful for notes, questions or status updates.",
        vec![
            ParamSpec::number("taskId", TASK_ID),
            ParamSpec::string("comment", "Text of the comment"),
        ],
        typed(move |input: TaskCommentInput| {
            let client = client.clone();
            async move {
                let task = client.get_task(input.task_id).await?;
                client
                    .create_comment(
                        HistoryKind::Task,
                        input.task_id,
                        &marked_comment(&input.comment),
                        task.version,
                    )
                    .await?;
                Ok::<_, crate::taiga::TaigaError>(json!({
                    "success": true,
                    "message": format!("Comment added to task #{}", task.reference),
                    "task_ref": task.reference,
                }))
            }
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provenance_helpers() {
        assert_eq!(created_description(None), CREATED_MARKER);
        assert_eq!(created_description(Some("  ")), CREATED_MARKER);
        assert_eq!(
            created_description(Some("Steps")),
            format!("Steps\n\n---\n{}", CREATED_MARKER)
        );

        let edited = edited_description("New text");
        assert!(edited.ends_with(EDITED_MARKER));
        assert_eq!(edited_description(&edited), edited);

        assert_eq!(with_ai_tag(None), vec![AI_TAG.to_string()]);
        assert_eq!(
            with_ai_tag(Some(vec!["ui".to_string(), AI_TAG.to_string()])),
            vec!["ui".to_string(), AI_TAG.to_string()]
        );
        assert!(marked_comment("Done").ends_with(COMMENT_MARKER));
    }

    #[test]
    fn test_validate_order_by() {
        assert_eq!(validate_order_by(None, TASK_SORT_KEYS), Ok(None));
        assert_eq!(
            validate_order_by(Some("-created_date".to_string()), TASK_SORT_KEYS),
            Ok(Some("-created_date".to_string()))
        );
        assert!(validate_order_by(Some("total_points".to_string()), STORY_SORT_KEYS).is_ok());
        let err = validate_order_by(Some("total_points".to_string()), TASK_SORT_KEYS).unwrap_err();
        assert!(err.contains("Invalid orderBy"));
    }

    #[test]
    fn test_apply_limit() {
        assert_eq!(apply_limit(vec![1, 2, 3], Some(2)), vec![1, 2]);
        assert_eq!(apply_limit(vec![1, 2, 3], None), vec![1, 2, 3]);
        assert_eq!(apply_limit(vec![1, 2, 3], Some(0)), vec![1, 2, 3]);
        assert_eq!(apply_limit(vec![1], Some(5)), vec![1]);
    }

    #[test]
    fn test_nullable_update_fields() {
        let absent: UpdateTaskInput = serde_json::from_value(json!({"taskId": 1})).unwrap();
        assert_eq!(absent.assigned_to, None);

        let cleared: UpdateTaskInput =
            serde_json::from_value(json!({"taskId": 1, "assignedTo": null, "userStoryId": 4}))
                .unwrap();
        assert_eq!(cleared.assigned_to, Some(None));
        assert_eq!(cleared.user_story_id, Some(Some(4)));
    }

    #[test]
    fn test_catalog_is_complete() {
        let client = TaigaClient::new("http://localhost:9000/api/v1").unwrap();
        let registry = taiga_tools(&client).unwrap();
        assert_eq!(registry.len(), 21);
        let names: Vec<_> = registry.names().collect();
        for expected in [
            "get_projects",
            "get_project_stats",
            "get_milestone_stats",
            "update_user_story",
            "update_task",
            "global_search",
            "create_task_comment",
        ] {
            assert!(names.contains(&expected), "missing {expected}");
        }
        let schema = registry.get("update_task").unwrap().input_schema();
        assert_eq!(schema["required"], json!(["taskId"]));
    }
}
