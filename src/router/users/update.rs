//! Update a user.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use serde::Deserialize;
use validator::Validate;

use crate::AppState;
use crate::error::Result;
use crate::middleware::Superadmin;
use crate::model::{Id, User, UserRole, UserStatus, non_empty, normalize_email};
use crate::router::auth::hash_password;
use crate::router::{Path, Valid, not_blank, nullable};
use crate::service::Event;

/// Absent fields are kept, `branch: null` releases the user.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Body {
    #[validate(length(min = 2, max = 100, message = "Name must be 2 to 100 characters long."), custom(function = "not_blank"))]
    name: Option<String>,
    #[validate(email(message = "Email must be formatted."))]
    email: Option<String>,
    #[validate(length(min = 6, message = "Password must contain at least 6 characters."))]
    password: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    phone: Option<Option<String>>,
    role: Option<UserRole>,
    status: Option<UserStatus>,
    #[serde(default, deserialize_with = "nullable")]
    branch: Option<Option<Id>>,
}

pub async fn handler(
    State(state): State<AppState>,
    Superadmin(actor): Superadmin,
    Path(id): Path<Id>,
    Valid(body): Valid<Body>,
) -> Result<Json<User>> {
    let mut user = super::load(&state, id).await?;

    // Checks first: nothing is written when the request is refused.
    let branch = body.branch.filter(|b| *b != user.branch);
    if let Some(Some(target)) = branch {
        state.membership.check_assignment(Some(&user), target).await?;
    }
    if let Some(email) = &body.email {
        let email = normalize_email(email);
        super::check_email(&state, &email, Some(user.id)).await?;
        user.email = email;
    }

    if let Some(name) = body.name {
        user.name = name.trim().to_owned();
    }
    if let Some(password) = body.password {
        user.password = hash_password(&state, &password)?;
    }
    if let Some(phone) = body.phone {
        user.phone = non_empty(phone);
    }
    if let Some(role) = body.role {
        user.role = role;
    }
    if let Some(status) = body.status {
        user.status = status;
    }
    user.updated_at = Utc::now();
    state.storage.users.update(&user).await?;

    if let Some(branch) = branch {
        state
            .membership
            .assign_user(&user, branch, Some(actor.id))
            .await?;
    }

    state
        .publisher
        .publish(
            Event::UserUpdated {
                user: user.id,
                name: user.name.clone(),
            },
            Some(actor.id),
        )
        .await;
    tracing::info!(user = %user.id, actor = %actor.id, "user updated");

    Ok(Json(super::load(&state, id).await?))
}
