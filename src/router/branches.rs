//! Branches-related HTTP API.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidateEmail};

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::middleware::Superadmin;
use crate::model::{Branch, Id, User, UserRole, non_empty, normalize_email};
use crate::router::{Path, Query, Valid, not_blank, nullable};
use crate::service::Event;

/// Member as shown next to its branch.
#[derive(Debug, Serialize)]
pub struct Member {
    id: Id,
    name: String,
    email: String,
    role: UserRole,
}

impl From<User> for Member {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchView {
    #[serde(flatten)]
    branch: Branch,
    members: Vec<Member>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBody {
    #[validate(length(min = 2, max = 100, message = "Name must be 2 to 100 characters long."), custom(function = "not_blank"))]
    name: String,
    #[validate(length(min = 1, message = "Address is required."), custom(function = "not_blank"))]
    address: String,
    #[validate(length(min = 1, message = "Phone is required."), custom(function = "not_blank"))]
    phone: String,
    #[validate(email(message = "Email must be formatted."))]
    email: Option<String>,
    #[serde(default)]
    assigned_users: Vec<Id>,
}

/// Absent fields are kept, `assignedUsers` replaces the member list.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBody {
    #[validate(length(min = 2, max = 100, message = "Name must be 2 to 100 characters long."), custom(function = "not_blank"))]
    name: Option<String>,
    #[validate(length(min = 1, message = "Address is required."), custom(function = "not_blank"))]
    address: Option<String>,
    #[validate(length(min = 1, message = "Phone is required."), custom(function = "not_blank"))]
    phone: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    email: Option<Option<String>>,
    assigned_users: Option<Vec<Id>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteQuery {
    target_branch_id: Option<Id>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    message: String,
    moved_users: usize,
    target_branch_id: Option<Id>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{id}", get(find).put(update).delete(delete))
}

async fn load(state: &AppState, id: Id) -> Result<Branch> {
    state
        .storage
        .branches
        .find_by_id(id)
        .await?
        .ok_or(ServerError::not_found("branch"))
}

async fn view(state: &AppState, branch: Branch) -> Result<BranchView> {
    let members = state
        .storage
        .users
        .find_many(&branch.assigned_users)
        .await?
        .into_iter()
        .map(Member::from)
        .collect();

    Ok(BranchView { branch, members })
}

async fn check_email(state: &AppState, email: Option<&str>, owner: Option<Id>) -> Result<()> {
    let Some(email) = email else {
        return Ok(());
    };

    match state.storage.branches.find_by_email(email).await? {
        Some(other) if Some(other.id) != owner => Err(ServerError::bad_request(
            "A branch with this email already exists.",
        )),
        _ => Ok(()),
    }
}

async fn list(State(state): State<AppState>) -> Result<Json<Vec<BranchView>>> {
    let mut views = Vec::new();
    for branch in state.storage.branches.list().await? {
        views.push(view(&state, branch).await?);
    }

    Ok(Json(views))
}

async fn find(State(state): State<AppState>, Path(id): Path<Id>) -> Result<Json<BranchView>> {
    let branch = load(&state, id).await?;
    Ok(Json(view(&state, branch).await?))
}

async fn create(
    State(state): State<AppState>,
    Superadmin(actor): Superadmin,
    Valid(body): Valid<CreateBody>,
) -> Result<(StatusCode, Json<BranchView>)> {
    let branch = Branch::new(body.name.trim(), body.address.trim(), body.phone.trim())
        .with_email(non_empty(body.email));
    check_email(&state, branch.email.as_deref(), None).await?;
    let members = state
        .membership
        .check_members(branch.id, &body.assigned_users)
        .await?;

    state.storage.branches.insert(&branch).await?;
    if let Err(err) = state
        .membership
        .replace_members(&branch, &members, Some(actor.id))
        .await
    {
        // A member was claimed elsewhere since the check.
        if let Err(cleanup) = state.membership.discard_branch(branch.id).await {
            tracing::error!(error = %cleanup, branch = %branch.id, "cannot discard incomplete branch");
        }
        return Err(err);
    }

    state
        .publisher
        .publish(
            Event::BranchCreated {
                name: branch.name.clone(),
            },
            Some(actor.id),
        )
        .await;
    tracing::info!(branch = %branch.id, members = members.len(), "branch created");

    let branch = load(&state, branch.id).await?;
    Ok((StatusCode::CREATED, Json(view(&state, branch).await?)))
}

async fn update(
    State(state): State<AppState>,
    Superadmin(actor): Superadmin,
    Path(id): Path<Id>,
    Valid(body): Valid<UpdateBody>,
) -> Result<Json<BranchView>> {
    let mut branch = load(&state, id).await?;

    let email = body.email.map(|e| non_empty(e).map(|e| normalize_email(&e)));
    if email.as_ref().is_some_and(|e| e.as_ref().is_some_and(|e| !e.validate_email())) {
        return Err(ServerError::bad_request("Email must be formatted."));
    }
    if let Some(email) = &email {
        check_email(&state, email.as_deref(), Some(id)).await?;
    }
    let members = match &body.assigned_users {
        Some(members) => Some(state.membership.check_members(id, members).await?),
        None => None,
    };

    if let Some(name) = body.name {
        branch.name = name.trim().to_owned();
    }
    if let Some(address) = body.address {
        branch.address = address.trim().to_owned();
    }
    if let Some(phone) = body.phone {
        branch.phone = phone.trim().to_owned();
    }
    if let Some(email) = email {
        branch.email = email;
    }
    branch.updated_at = Utc::now();
    state.storage.branches.update(&branch).await?;

    if let Some(members) = members {
        state
            .membership
            .replace_members(&branch, &members, Some(actor.id))
            .await?;
    }

    state
        .publisher
        .publish(
            Event::BranchUpdated {
                branch: branch.id,
                name: branch.name.clone(),
            },
            Some(actor.id),
        )
        .await;
    tracing::info!(branch = %branch.id, "branch updated");

    let branch = load(&state, id).await?;
    Ok(Json(view(&state, branch).await?))
}

async fn delete(
    State(state): State<AppState>,
    Superadmin(actor): Superadmin,
    Path(id): Path<Id>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<DeleteResponse>> {
    let deletion = state
        .membership
        .delete_branch(id, query.target_branch_id, Some(actor.id))
        .await?;
    tracing::info!(branch = %id, moved = deletion.moved.len(), "branch deleted");

    let message = if deletion.moved.is_empty() {
        "Branch deleted successfully.".to_owned()
    } else {
        format!(
            "Branch deleted successfully, {} user(s) moved.",
            deletion.moved.len()
        )
    };

    Ok(Json(DeleteResponse {
        message,
        moved_users: deletion.moved.len(),
        target_branch_id: deletion.target,
    }))
}
