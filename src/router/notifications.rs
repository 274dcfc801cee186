//! Notifications-related HTTP API.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{delete, get, patch};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::Result;
use crate::middleware::{CurrentUser, Superadmin};
use crate::model::{
    Id, NewNotification, NotificationKind, Page, Paginated, UserRole,
};
use crate::router::{Path, Query, Valid, not_blank};
use crate::service::notification::{ListQuery, NotificationView, Recent};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterQuery {
    page: Option<u64>,
    limit: Option<u64>,
    user: Option<Id>,
    role: Option<UserRole>,
    branch: Option<Id>,
    is_read: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBody {
    #[validate(length(min = 1, max = 200, message = "Title is required."), custom(function = "not_blank"))]
    title: String,
    #[validate(length(min = 1, message = "Message is required."), custom(function = "not_blank"))]
    message: String,
    #[serde(default, rename = "type")]
    kind: NotificationKind,
    user: Option<Id>,
    role: Option<UserRole>,
    branch: Option<Id>,
}

#[derive(Debug, Serialize)]
pub struct Count {
    message: &'static str,
    count: u64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/recent", get(recent))
        .route("/read-all", patch(mark_all_read))
        .route("/clear-all", delete(clear_all))
        .route("/{id}/read", patch(mark_read))
}

async fn list(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<FilterQuery>,
) -> Result<Json<Paginated<NotificationView>>> {
    let query = ListQuery {
        page: Page::new(query.page, query.limit),
        user: query.user,
        role: query.role,
        branch: query.branch,
        is_read: query.is_read,
    };

    Ok(Json(state.notifications.list(user.principal(), query).await?))
}

async fn recent(State(state): State<AppState>, user: CurrentUser) -> Result<Json<Recent>> {
    Ok(Json(state.notifications.recent(user.principal()).await?))
}

async fn mark_read(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Id>,
) -> Result<Json<NotificationView>> {
    Ok(Json(state.notifications.mark_read(user.principal(), id).await?))
}

async fn mark_all_read(State(state): State<AppState>, user: CurrentUser) -> Result<Json<Count>> {
    let count = state.notifications.mark_all_read(user.principal()).await?;

    Ok(Json(Count {
        message: "Notifications marked as read.",
        count,
    }))
}

async fn clear_all(State(state): State<AppState>, user: CurrentUser) -> Result<Json<Count>> {
    let count = state.notifications.clear_all(user.principal()).await?;

    Ok(Json(Count {
        message: "Notifications cleared.",
        count,
    }))
}

async fn create(
    State(state): State<AppState>,
    Superadmin(actor): Superadmin,
    Valid(body): Valid<CreateBody>,
) -> Result<(StatusCode, Json<NotificationView>)> {
    let notification = NewNotification {
        title: body.title.trim().to_owned(),
        message: body.message.trim().to_owned(),
        kind: body.kind,
        user: body.user,
        role: body.role,
        branch: body.branch,
        created_by: Some(actor.id),
    };

    let view = state.notifications.create(notification).await?;
    Ok((StatusCode::CREATED, Json(view)))
}
