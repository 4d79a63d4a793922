//! REST API under `/api/v1`.
//!
//! Entities are returned wrapped (`{"task": {...}}`), deletes answer
//! `204 No Content`, and failures use `{"error": {"code", "message"}}`.
//! Every successful mutation is also broadcast to the board's room.
//! The acting user comes from the `X-User-ID` header.

use std::sync::Arc;

use axum::extract::{FromRequestParts, Path, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use syncboard_proto::model::{
    BoardId, BoardPatch, ColumnId, ColumnPatch, TaskId, TaskPatch, TeamId, User, UserId,
};

use crate::server::HubState;
use crate::store::{BoardDraft, ColumnDraft, HubError, TaskDraft};

/// Header carrying the acting user's id.
pub const USER_HEADER: &str = "x-user-id";

/// A failed REST call.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The operation itself failed.
    #[error(transparent)]
    Hub(#[from] HubError),
    /// No `X-User-ID` header was sent.
    #[error("missing X-User-ID header")]
    Unauthenticated,
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::Hub(HubError::Validation(_)) => StatusCode::BAD_REQUEST,
            Self::Hub(_) => StatusCode::NOT_FOUND,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
        }
    }

    const fn code(&self) -> &'static str {
        match self {
            Self::Hub(err) => err.code(),
            Self::Unauthenticated => "UNAUTHORIZED",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": { "code": self.code(), "message": self.to_string() }
        });
        (self.status(), Json(body)).into_response()
    }
}

/// The user on whose behalf a request acts.
#[derive(Debug, Clone)]
pub struct Actor(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| Self(UserId::new(id)))
            .ok_or(ApiError::Unauthenticated)
    }
}

#[derive(Debug, Deserialize)]
struct PositionBody {
    position: u32,
}

#[derive(Debug, Deserialize)]
struct MoveTaskBody {
    column_id: ColumnId,
    position: u32,
}

type Hub = State<Arc<HubState>>;
type ApiResult = Result<Response, ApiError>;

/// Routes mounted under `/api/v1`.
pub fn routes() -> Router<Arc<HubState>> {
    Router::new()
        .route("/boards", post(create_board))
        .route(
            "/boards/{id}",
            get(get_board).put(update_board).delete(delete_board),
        )
        .route("/teams/{id}/boards", get(list_team_boards))
        .route("/columns", post(create_column))
        .route("/columns/{id}", put(update_column).delete(delete_column))
        .route("/columns/{id}/position", put(move_column))
        .route("/tasks", post(create_task))
        .route("/tasks/{id}", put(update_task).delete(delete_task))
        .route("/tasks/{id}/move", put(move_task))
        .route("/users/{id}", get(get_user))
}

async fn get_board(State(hub): Hub, _actor: Actor, Path(id): Path<BoardId>) -> ApiResult {
    let board = hub
        .boards
        .get(&id)
        .await
        .ok_or(HubError::BoardNotFound(id))?;
    Ok(Json(json!({ "board": board })).into_response())
}

async fn list_team_boards(State(hub): Hub, _actor: Actor, Path(id): Path<TeamId>) -> ApiResult {
    let boards = hub.boards.list_team(&id).await;
    Ok(Json(json!({ "boards": boards })).into_response())
}

async fn create_board(State(hub): Hub, Actor(user): Actor, Json(draft): Json<BoardDraft>) -> ApiResult {
    let board = hub.boards.create_board(draft, &user).await?;
    tracing::info!(board_id = %board.id, user_id = %user, "board created");
    Ok((StatusCode::CREATED, Json(json!({ "board": board }))).into_response())
}

async fn update_board(
    State(hub): Hub,
    _actor: Actor,
    Path(id): Path<BoardId>,
    Json(patch): Json<BoardPatch>,
) -> ApiResult {
    let (board, change) = hub.boards.update_board(&id, &patch).await?;
    hub.publish(&change).await;
    Ok(Json(json!({ "board": board })).into_response())
}

async fn delete_board(State(hub): Hub, Actor(user): Actor, Path(id): Path<BoardId>) -> ApiResult {
    hub.boards.delete_board(&id).await?;
    tracing::info!(board_id = %id, user_id = %user, "board deleted");
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn create_column(
    State(hub): Hub,
    Actor(user): Actor,
    Json(draft): Json<ColumnDraft>,
) -> ApiResult {
    let (column, change) = hub.boards.create_column(draft, &user).await?;
    hub.publish(&change).await;
    Ok((StatusCode::CREATED, Json(json!({ "column": column }))).into_response())
}

async fn update_column(
    State(hub): Hub,
    Actor(user): Actor,
    Path(id): Path<ColumnId>,
    Json(patch): Json<ColumnPatch>,
) -> ApiResult {
    let (column, change) = hub.boards.update_column(&id, &patch, &user).await?;
    hub.publish(&change).await;
    Ok(Json(json!({ "column": column })).into_response())
}

async fn move_column(
    State(hub): Hub,
    Actor(user): Actor,
    Path(id): Path<ColumnId>,
    Json(body): Json<PositionBody>,
) -> ApiResult {
    let (column, change) = hub.boards.move_column(&id, body.position, &user).await?;
    hub.publish(&change).await;
    Ok(Json(json!({ "column": column })).into_response())
}

async fn delete_column(State(hub): Hub, Actor(user): Actor, Path(id): Path<ColumnId>) -> ApiResult {
    let change = hub.boards.delete_column(&id, &user).await?;
    hub.publish(&change).await;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn create_task(State(hub): Hub, Actor(user): Actor, Json(draft): Json<TaskDraft>) -> ApiResult {
    let (task, change) = hub.boards.create_task(draft, &user).await?;
    hub.publish(&change).await;
    Ok((StatusCode::CREATED, Json(json!({ "task": task }))).into_response())
}

async fn update_task(
    State(hub): Hub,
    Actor(user): Actor,
    Path(id): Path<TaskId>,
    Json(patch): Json<TaskPatch>,
) -> ApiResult {
    let (task, change) = hub.boards.update_task(&id, &patch, &user).await?;
    hub.publish(&change).await;
    Ok(Json(json!({ "task": task })).into_response())
}

async fn move_task(
    State(hub): Hub,
    Actor(user): Actor,
    Path(id): Path<TaskId>,
    Json(body): Json<MoveTaskBody>,
) -> ApiResult {
    let (task, change) = hub
        .boards
        .move_task(&id, &body.column_id, body.position, &user)
        .await?;
    hub.publish(&change).await;
    Ok(Json(json!({ "task": task })).into_response())
}

async fn delete_task(State(hub): Hub, Actor(user): Actor, Path(id): Path<TaskId>) -> ApiResult {
    let change = hub.boards.delete_task(&id, &user).await?;
    hub.publish(&change).await;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// The hub keeps no user directory; any id resolves to a minimal profile.
async fn get_user(_actor: Actor, Path(id): Path<UserId>) -> ApiResult {
    let mut user = User::with_id(id.clone());
    user.name = id.to_string();
    user.email = format!("{id}@syncboard.local");
    Ok(Json(json!({ "user": user })).into_response())
}
