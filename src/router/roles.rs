//! Role permission documents.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::middleware::Superadmin;
use crate::model::{Permissions, Role, UserRole};
use crate::router::Path;

#[derive(Debug, Deserialize)]
pub struct Body {
    permissions: Permissions,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/initialize", post(initialize))
        .route("/{name}", get(find).put(replace))
}

fn parse_role(name: &str) -> Result<UserRole> {
    name.parse().map_err(|_| ServerError::not_found("role"))
}

async fn list(State(state): State<AppState>) -> Result<Json<Vec<Role>>> {
    Ok(Json(state.storage.roles.list().await?))
}

async fn find(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<Role>> {
    let role = parse_role(&name)?;

    state
        .storage
        .roles
        .find(role)
        .await?
        .map(Json)
        .ok_or(ServerError::not_found("role"))
}

async fn replace(
    State(state): State<AppState>,
    Superadmin(actor): Superadmin,
    Path(name): Path<String>,
    Json(body): Json<Body>,
) -> Result<Json<Role>> {
    let name = parse_role(&name)?;

    if let Some(module) = body.permissions.unknown_modules().first() {
        return Err(ServerError::bad_request(format!("Unknown module `{module}`.")));
    }

    let role = Role {
        name,
        permissions: body.permissions,
        updated_at: Utc::now(),
    };
    state.storage.roles.upsert(&role).await?;
    tracing::info!(role = %name, actor = %actor.id, "role permissions replaced");

    Ok(Json(role))
}

/// Reset every role to its built-in permissions.
async fn initialize(
    State(state): State<AppState>,
    Superadmin(actor): Superadmin,
) -> Result<Json<Vec<Role>>> {
    for name in UserRole::ALL {
        state.storage.roles.upsert(&Role::default_for(*name)).await?;
    }
    tracing::info!(actor = %actor.id, "default role permissions restored");

    Ok(Json(state.storage.roles.list().await?))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};

    use crate::model::UserRole;
    use crate::tests::{body_json, make_request, seed_user, test_state};

    #[tokio::test]
    async fn test_initialize_and_replace() {
        let state = test_state();
        let (_, root) = seed_user(&state, "root@example.com", UserRole::Superadmin).await;
        let (_, staff) = seed_user(&state, "staff@example.com", UserRole::Staff).await;

        let response = make_request(
            crate::app(state.clone()),
            Method::POST,
            "/api/roles/initialize",
            Some(&staff),
            "",
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = make_request(
            crate::app(state.clone()),
            Method::POST,
            "/api/roles/initialize",
            Some(&root),
            "",
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 4);

        let permissions = serde_json::json!({
            "permissions": { "users": ["delete", "read", "read"], "leads": ["edit"] }
        });
        let response = make_request(
            crate::app(state.clone()),
            Method::PUT,
            "/api/roles/staff",
            Some(&root),
            &permissions.to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response =
            make_request(crate::app(state.clone()), Method::GET, "/api/roles/staff", Some(&staff), "")
                .await;
        let body = body_json(response).await;
        assert_eq!(
            body["permissions"],
            serde_json::json!({ "leads": ["edit"], "users": ["read", "delete"] })
        );

        let unknown = serde_json::json!({ "permissions": { "billing": ["read"] } });
        let response = make_request(
            crate::app(state.clone()),
            Method::PUT,
            "/api/roles/staff",
            Some(&root),
            &unknown.to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response =
            make_request(crate::app(state), Method::GET, "/api/roles/root", Some(&root), "").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
