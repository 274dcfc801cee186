//! Delete a user.

use axum::Json;
use axum::extract::State;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::middleware::Superadmin;
use crate::model::Id;
use crate::router::Path;
use crate::service::Event;

pub async fn handler(
    State(state): State<AppState>,
    Superadmin(actor): Superadmin,
    Path(id): Path<Id>,
) -> Result<Json<serde_json::Value>> {
    if id == actor.id {
        return Err(ServerError::bad_request("You cannot delete your own account."));
    }

    let user = super::load(&state, id).await?;
    state.membership.release_user(&user).await?;
    if !state.storage.users.delete(id).await? {
        return Err(ServerError::not_found("user"));
    }

    state
        .publisher
        .publish(
            Event::UserDeleted {
                name: user.name.clone(),
                email: user.email.clone(),
            },
            Some(actor.id),
        )
        .await;
    tracing::info!(user = %id, actor = %actor.id, "user deleted");

    Ok(Json(serde_json::json!({ "message": "User deleted successfully." })))
}
