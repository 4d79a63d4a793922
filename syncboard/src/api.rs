//! REST persistence for local mutations.
//!
//! [`BoardApi`] is the seam the action layer calls after applying a change
//! optimistically; [`RestClient`] implements it over HTTP against
//! `{api_url}/api/v1`, identifying the caller with the `X-User-ID` header.
//!
//! Successful responses wrap the entity (`{"task": {...}}`); failures carry
//! `{"error": {"code", "message"}}`. Deletes answer `204 No Content`.

use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, InvalidHeaderValue};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use syncboard_proto::model::{
    Board, BoardId, BoardPatch, Column, ColumnId, ColumnPatch, Priority, Task, TaskId, TaskPatch,
    TeamId, User, UserId,
};

/// A REST call failed.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// The request never produced a response (connect, timeout, body read).
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("server returned HTTP {status} ({code}): {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Error code from the response body.
        code: String,
        /// Error message from the response body.
        message: String,
    },

    /// The response body did not have the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(#[source] serde_json::Error),

    /// The user id cannot be sent as a header value.
    #[error("invalid user id header: {0}")]
    InvalidUserId(#[from] InvalidHeaderValue),
}

impl PersistenceError {
    /// HTTP status of a [`PersistenceError::Status`] error.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Body of `POST /boards`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewBoard {
    /// Owning team.
    pub team_id: TeamId,
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Creator.
    pub created_by: UserId,
}

/// Body of `POST /columns`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewColumn {
    /// Owning board.
    pub board_id: BoardId,
    /// Display name.
    pub name: String,
    /// Desired position; the server appends when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    /// Display color.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Body of `POST /tasks`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTask {
    /// Target column; the task is appended.
    pub column_id: ColumnId,
    /// Title.
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<UserId>,
    /// Creator.
    pub created_by: UserId,
}

impl NewTask {
    /// A task with only a title.
    pub fn titled(
        column_id: impl Into<ColumnId>,
        title: impl Into<String>,
        created_by: UserId,
    ) -> Self {
        Self {
            column_id: column_id.into(),
            title: title.into(),
            description: None,
            priority: None,
            due_date: None,
            assigned_to: None,
            created_by,
        }
    }
}

/// Persistence calls backing local mutations.
///
/// Implementations must be cheap to share across tasks.
pub trait BoardApi: Send + Sync + 'static {
    /// Fetches a board with nested columns and tasks.
    fn get_board(&self, id: &BoardId) -> impl Future<Output = Result<Board, PersistenceError>> + Send;

    /// Lists the boards of a team (without nested columns).
    fn list_team_boards(
        &self,
        team_id: &TeamId,
    ) -> impl Future<Output = Result<Vec<Board>, PersistenceError>> + Send;

    /// Creates a board.
    fn create_board(
        &self,
        board: &NewBoard,
    ) -> impl Future<Output = Result<Board, PersistenceError>> + Send;

    /// Updates board metadata.
    fn update_board(
        &self,
        id: &BoardId,
        patch: &BoardPatch,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;

    /// Deletes a board.
    fn delete_board(&self, id: &BoardId) -> impl Future<Output = Result<(), PersistenceError>> + Send;

    /// Creates a column.
    fn create_column(
        &self,
        column: &NewColumn,
    ) -> impl Future<Output = Result<Column, PersistenceError>> + Send;

    /// Updates a column's display fields.
    fn update_column(
        &self,
        id: &ColumnId,
        patch: &ColumnPatch,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;

    /// Moves a column.
    fn move_column(
        &self,
        id: &ColumnId,
        position: u32,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;

    /// Deletes a column and its tasks.
    fn delete_column(&self, id: &ColumnId)
    -> impl Future<Output = Result<(), PersistenceError>> + Send;

    /// Creates a task at the end of its column.
    fn create_task(&self, task: &NewTask)
    -> impl Future<Output = Result<Task, PersistenceError>> + Send;

    /// Updates a task's content fields.
    fn update_task(
        &self,
        id: &TaskId,
        patch: &TaskPatch,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;

    /// Moves a task to `position` in `column_id`.
    fn move_task(
        &self,
        id: &TaskId,
        column_id: &ColumnId,
        position: u32,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;

    /// Deletes a task.
    fn delete_task(&self, id: &TaskId) -> impl Future<Output = Result<(), PersistenceError>> + Send;

    /// Fetches a user profile.
    fn get_user(&self, id: &UserId) -> impl Future<Output = Result<User, PersistenceError>> + Send;
}

/// HTTP implementation of [`BoardApi`].
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
}

impl RestClient {
    /// Builds a client for `api_url` acting as `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the user id is not a valid header
    /// value or the HTTP client cannot be constructed.
    pub fn new(api_url: &str, user_id: &UserId, timeout: Duration) -> Result<Self, PersistenceError> {
        let mut headers = HeaderMap::new();
        headers.insert("X-User-ID", HeaderValue::from_str(user_id.as_str())?);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: format!("{}/api/v1", api_url.trim_end_matches('/')),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, format!("{}{path}", self.base_url))
    }
}

impl BoardApi for RestClient {
    async fn get_board(&self, id: &BoardId) -> Result<Board, PersistenceError> {
        let body = execute(self.request(Method::GET, &format!("/boards/{id}"))).await?;
        unwrap_entity(body, "board")
    }

    async fn list_team_boards(&self, team_id: &TeamId) -> Result<Vec<Board>, PersistenceError> {
        let body = execute(self.request(Method::GET, &format!("/teams/{team_id}/boards"))).await?;
        unwrap_entity(body, "boards")
    }

    async fn create_board(&self, board: &NewBoard) -> Result<Board, PersistenceError> {
        let body = execute(self.request(Method::POST, "/boards").json(board)).await?;
        unwrap_entity(body, "board")
    }

    async fn update_board(&self, id: &BoardId, patch: &BoardPatch) -> Result<(), PersistenceError> {
        execute(self.request(Method::PUT, &format!("/boards/{id}")).json(patch)).await?;
        Ok(())
    }

    async fn delete_board(&self, id: &BoardId) -> Result<(), PersistenceError> {
        execute(self.request(Method::DELETE, &format!("/boards/{id}"))).await?;
        Ok(())
    }

    async fn create_column(&self, column: &NewColumn) -> Result<Column, PersistenceError> {
        let body = execute(self.request(Method::POST, "/columns").json(column)).await?;
        unwrap_entity(body, "column")
    }

    async fn update_column(&self, id: &ColumnId, patch: &ColumnPatch) -> Result<(), PersistenceError> {
        execute(self.request(Method::PUT, &format!("/columns/{id}")).json(patch)).await?;
        Ok(())
    }

    async fn move_column(&self, id: &ColumnId, position: u32) -> Result<(), PersistenceError> {
        let request = self
            .request(Method::PUT, &format!("/columns/{id}/position"))
            .json(&json!({ "position": position }));
        execute(request).await?;
        Ok(())
    }

    async fn delete_column(&self, id: &ColumnId) -> Result<(), PersistenceError> {
        execute(self.request(Method::DELETE, &format!("/columns/{id}"))).await?;
        Ok(())
    }

    async fn create_task(&self, task: &NewTask) -> Result<Task, PersistenceError> {
        let body = execute(self.request(Method::POST, "/tasks").json(task)).await?;
        unwrap_entity(body, "task")
    }

    async fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> Result<(), PersistenceError> {
        execute(self.request(Method::PUT, &format!("/tasks/{id}")).json(patch)).await?;
        Ok(())
    }

    async fn move_task(
        &self,
        id: &TaskId,
        column_id: &ColumnId,
        position: u32,
    ) -> Result<(), PersistenceError> {
        let request = self
            .request(Method::PUT, &format!("/tasks/{id}/move"))
            .json(&json!({ "column_id": column_id, "position": position }));
        execute(request).await?;
        Ok(())
    }

    async fn delete_task(&self, id: &TaskId) -> Result<(), PersistenceError> {
        execute(self.request(Method::DELETE, &format!("/tasks/{id}"))).await?;
        Ok(())
    }

    async fn get_user(&self, id: &UserId) -> Result<User, PersistenceError> {
        let body = execute(self.request(Method::GET, &format!("/users/{id}"))).await?;
        unwrap_entity(body, "user")
    }
}

/// Sends the request and returns the JSON body (`Null` for empty bodies).
async fn execute(request: RequestBuilder) -> Result<Value, PersistenceError> {
    let response = request.send().await?;
    let status = response.status();
    if status == StatusCode::NO_CONTENT {
        return Ok(Value::Null);
    }
    let bytes = response.bytes().await?;

    if !status.is_success() {
        let (code, message) = error_details(&bytes);
        tracing::debug!(status = status.as_u16(), %code, "REST call rejected");
        return Err(PersistenceError::Status {
            status: status.as_u16(),
            code,
            message,
        });
    }

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&bytes).map_err(PersistenceError::Decode)
}

/// Extracts `{"error": {"code", "message"}}`, falling back to a generic
/// pair when the body has another shape.
fn error_details(body: &[u8]) -> (String, String) {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        error: ErrorDetail,
    }
    #[derive(serde::Deserialize)]
    struct ErrorDetail {
        code: String,
        message: String,
    }

    serde_json::from_slice::<ErrorBody>(body).map_or_else(
        |_| {
            (
                "UNKNOWN".to_string(),
                "An unknown error occurred".to_string(),
            )
        },
        |parsed| (parsed.error.code, parsed.error.message),
    )
}

/// Decodes `body[field]`, or `body` itself when it is not wrapped.
fn unwrap_entity<T: DeserializeOwned>(mut body: Value, field: &str) -> Result<T, PersistenceError> {
    let inner = match body.get_mut(field) {
        Some(wrapped) => wrapped.take(),
        None => body,
    };
    serde_json::from_value(inner).map_err(PersistenceError::Decode)
}
