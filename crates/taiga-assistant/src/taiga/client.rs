use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use super::types::*;

#[derive(Error, Debug)]
pub enum TaigaError {
    /// The backend answered with a non-success status
    #[error("{message}")]
    Api {
        status: u16,
        message: String,
        error_type: Option<String>,
    },

    #[error("Invalid backend URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Could not reach the backend: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response from the backend: {0}")]
    Decode(#[from] serde_json::Error),
}

impl TaigaError {
    /// HTTP status reported by the backend, if it answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            TaigaError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Connection to one backend, optionally authenticated with a bearer token.
///
/// Each chat request builds its own client, nothing is shared between requests.
#[derive(Debug, Clone)]
pub struct TaigaClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl TaigaClient {
    pub fn new(base_url: &str) -> Result<Self, TaigaError> {
        Url::parse(base_url).map_err(|source| TaigaError::InvalidUrl {
            url: base_url.to_string(),
            source,
        })?;

        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn with_token<S: Into<String>>(mut self, token: S) -> Self {
        self.token = Some(token.into());
        self
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut builder = self
            .client
            .request(method, url)
            .header("Content-Type", "application/json")
            .header("x-disable-pagination", "True");
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, TaigaError> {
        let response = builder.send().await?;
        let status = response.status();
        let url = response.url().path().to_string();

        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            let error = api_error(status, &body);
            warn!(status = status.as_u16(), path = %url, error = %error, "backend request failed");
            return Err(error);
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(serde_json::from_value(Value::Null)?);
        }

        let body = response.bytes().await?;
        debug!(status = status.as_u16(), path = %url, bytes = body.len(), "backend response");
        if body.is_empty() {
            return Ok(serde_json::from_value(Value::Null)?);
        }
        Ok(serde_json::from_slice(&body)?)
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, TaigaError> {
        self.send(self.request(Method::GET, endpoint)).await
    }

    async fn get_with<T: DeserializeOwned, Q: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        query: &Q,
    ) -> Result<T, TaigaError> {
        self.send(self.request(Method::GET, endpoint).query(query))
            .await
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, TaigaError> {
        self.send(self.request(Method::POST, endpoint).json(body))
            .await
    }

    async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, TaigaError> {
        self.send(self.request(Method::PATCH, endpoint).json(body))
            .await
    }

    // Authentication

    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AuthResponse, TaigaError> {
        self.post(
            "/auth",
            &json!({"username": username, "password": password, "type": "normal"}),
        )
        .await
    }

    // Projects

    pub async fn get_projects(&self) -> Result<Vec<Project>, TaigaError> {
        self.get("/projects").await
    }

    pub async fn get_project(&self, project_id: i64) -> Result<Project, TaigaError> {
        self.get(&format!("/projects/{}", project_id)).await
    }

    pub async fn get_project_stats(&self, project_id: i64) -> Result<Value, TaigaError> {
        self.get(&format!("/projects/{}/stats", project_id)).await
    }

    // Milestones

    pub async fn get_milestones(&self, project_id: i64) -> Result<Vec<Milestone>, TaigaError> {
        self.get_with("/milestones", &[("project", project_id)])
            .await
    }

    pub async fn get_milestone(&self, milestone_id: i64) -> Result<Milestone, TaigaError> {
        self.get(&format!("/milestones/{}", milestone_id)).await
    }

    pub async fn get_milestone_stats(&self, milestone_id: i64) -> Result<Value, TaigaError> {
        self.get(&format!("/milestones/{}/stats", milestone_id))
            .await
    }

    // User stories

    pub async fn get_user_stories(
        &self,
        filters: &UserStoryFilters,
    ) -> Result<Vec<UserStory>, TaigaError> {
        self.get_with("/userstories", filters).await
    }

    pub async fn get_user_story(&self, user_story_id: i64) -> Result<UserStory, TaigaError> {
        self.get(&format!("/userstories/{}", user_story_id)).await
    }

    pub async fn search_user_stories(
        &self,
        project_id: i64,
        query: &str,
    ) -> Result<Vec<UserStory>, TaigaError> {
        self.get_user_stories(&UserStoryFilters {
            project: Some(project_id),
            q: Some(query.to_string()),
            ..Default::default()
        })
        .await
    }

    pub async fn create_user_story(&self, story: &NewUserStory) -> Result<UserStory, TaigaError> {
        self.post("/userstories", story).await
    }

    pub async fn update_user_story(
        &self,
        user_story_id: i64,
        patch: &UserStoryPatch,
    ) -> Result<UserStory, TaigaError> {
        self.patch(&format!("/userstories/{}", user_story_id), patch)
            .await
    }

    // Tasks

    pub async fn get_tasks(&self, filters: &TaskFilters) -> Result<Vec<Task>, TaigaError> {
        self.get_with("/tasks", filters).await
    }

    pub async fn get_task(&self, task_id: i64) -> Result<Task, TaigaError> {
        self.get(&format!("/tasks/{}", task_id)).await
    }

    pub async fn search_tasks(&self, project_id: i64, query: &str) -> Result<Vec<Task>, TaigaError> {
        self.get_tasks(&TaskFilters {
            project: Some(project_id),
            q: Some(query.to_string()),
            ..Default::default()
        })
        .await
    }

    pub async fn create_task(&self, task: &NewTask) -> Result<Task, TaigaError> {
        self.post("/tasks", task).await
    }

    pub async fn update_task(&self, task_id: i64, patch: &TaskPatch) -> Result<Task, TaigaError> {
        self.patch(&format!("/tasks/{}", task_id), patch).await
    }

    // History and comments

    pub async fn get_history(
        &self,
        kind: HistoryKind,
        id: i64,
    ) -> Result<Vec<HistoryEntry>, TaigaError> {
        self.get(&format!("/history/{}/{}", kind.history_segment(), id))
            .await
    }

    /// History entries that carry a non-blank comment
    pub async fn get_comments(
        &self,
        kind: HistoryKind,
        id: i64,
    ) -> Result<Vec<HistoryEntry>, TaigaError> {
        let history = self.get_history(kind, id).await?;
        Ok(history
            .into_iter()
            .filter(|entry| !entry.comment.trim().is_empty())
            .collect())
    }

    /// Comments are added by patching the item with `comment` and its current `version`
    pub async fn create_comment(
        &self,
        kind: HistoryKind,
        id: i64,
        comment: &str,
        version: i64,
    ) -> Result<Value, TaigaError> {
        self.patch(
            &format!("/{}/{}", kind.collection(), id),
            &json!({"comment": comment, "version": version}),
        )
        .await
    }

    // Search

    pub async fn search(&self, project_id: i64, text: &str) -> Result<SearchResults, TaigaError> {
        self.get_with(
            "/search",
            &[("project", project_id.to_string()), ("text", text.to_string())],
        )
        .await
    }
}

fn api_error(status: StatusCode, body: &[u8]) -> TaigaError {
    let parsed: Option<Value> = serde_json::from_slice(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("_error_message"))
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .map(str::to_string);
    let error_type = parsed
        .as_ref()
        .and_then(|v| v.get("_error_type"))
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    TaigaError::Api {
        status: status.as_u16(),
        message: message.unwrap_or_else(|| {
            format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )
        }),
        error_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn _setup() -> (MockServer, TaigaClient) {
        let server = MockServer::start().await;
        let client = TaigaClient::new(&format!("{}/api/v1/", server.uri()))
            .unwrap()
            .with_token("tok");
        (server, client)
    }

    #[tokio::test]
    async fn test_list_sends_token_and_disables_pagination() {
        let (server, client) = _setup().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/projects"))
            .and(header("authorization", "Bearer tok"))
            .and(header("x-disable-pagination", "True"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 1, "name": "Alpha", "slug": "alpha"},
                {"id": 2, "name": "Beta", "slug": "beta"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let projects = client.get_projects().await.unwrap();
        assert_eq!(projects.len(), 2);
        assert_eq!(projects[1].slug, "beta");
    }

    #[tokio::test]
    async fn test_filters_become_query_params() {
        let (server, client) = _setup().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/userstories"))
            .and(query_param("project", "3"))
            .and(query_param("status__is_closed", "false"))
            .and(query_param("order_by", "-created_date"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let stories = client
            .get_user_stories(&UserStoryFilters {
                project: Some(3),
                is_closed: Some(false),
                order_by: Some("-created_date".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(stories.is_empty());
    }

    #[tokio::test]
    async fn test_error_message_is_surfaced() {
        let (server, client) = _setup().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/tasks/9"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "_error_message": "No Task matches the given query.",
                "_error_type": "taiga.base.exceptions.NotFound"
            })))
            .mount(&server)
            .await;

        let err = client.get_task(9).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.to_string(), "No Task matches the given query.");
        match err {
            TaigaError::Api { error_type, .. } => {
                assert_eq!(error_type.as_deref(), Some("taiga.base.exceptions.NotFound"))
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_error_without_body_uses_status() {
        let (server, client) = _setup().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/tasks/1"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client.get_task(1).await.unwrap_err();
        assert_eq!(err.to_string(), "HTTP 500: Internal Server Error");
    }

    #[tokio::test]
    async fn test_comments_filter_blank_entries() {
        let (server, client) = _setup().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/history/userstory/5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "a", "comment": "", "user": {"username": "ann"}},
                {"id": "b", "comment": "Looks good", "user": {"username": "bob", "name": "Bob"}},
                {"id": "c", "comment": "   ", "user": {"username": "cat"}}
            ])))
            .mount(&server)
            .await;

        let comments = client.get_comments(HistoryKind::UserStory, 5).await.unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].user.name, "Bob");
    }

    #[tokio::test]
    async fn test_create_comment_patches_with_version() {
        let (server, client) = _setup().await;
        Mock::given(method("PATCH"))
            .and(path("/api/v1/tasks/4"))
            .and(body_json(json!({"comment": "hi", "version": 7})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let result = client
            .create_comment(HistoryKind::Task, 4, "hi", 7)
            .await
            .unwrap();
        assert_eq!(result, Value::Null);
    }

    #[tokio::test]
    async fn test_search_returns_issues() {
        let (server, client) = _setup().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/search"))
            .and(query_param("project", "2"))
            .and(query_param("text", "login bug"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 1,
                "issues": [{"id": 10, "ref": 4, "subject": "Login bug"}]
            })))
            .mount(&server)
            .await;

        let results = client.search(2, "login bug").await.unwrap();
        assert_eq!(results.count, 1);
        assert!(results.userstories.is_empty());
        assert_eq!(results.issues[0].reference, 4);
        assert_eq!(results.issues[0].subject, "Login bug");
    }

    #[test]
    fn test_invalid_base_url() {
        let err = TaigaClient::new("not a url").unwrap_err();
        assert!(matches!(err, TaigaError::InvalidUrl { .. }));
    }
}
