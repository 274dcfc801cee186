//! Users-related HTTP API.

mod create;
mod delete;
mod update;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::model::{Id, Page, Paginated, User, UserRole, UserStatus};
use crate::router::{Path, Query};
use crate::repository::UserFilter;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    role: Option<UserRole>,
    status: Option<UserStatus>,
    branch: Option<Id>,
    search: Option<String>,
    page: Option<u64>,
    limit: Option<u64>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        // `GET /users` goes to `list`, `POST /users` to `create`.
        .route("/", get(list).post(create::handler))
        .route("/unassigned", get(unassigned))
        .route(
            "/{id}",
            get(find).put(update::handler).delete(delete::handler),
        )
}

pub(crate) async fn load(state: &AppState, id: Id) -> Result<User> {
    state
        .storage
        .users
        .find_by_id(id)
        .await?
        .ok_or(ServerError::not_found("user"))
}

/// Reject `email` when another user owns it.
pub(crate) async fn check_email(state: &AppState, email: &str, owner: Option<Id>) -> Result<()> {
    match state.storage.users.find_by_email(email).await? {
        Some(other) if Some(other.id) != owner => {
            Err(ServerError::bad_request("Email is already registered."))
        },
        _ => Ok(()),
    }
}

async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Paginated<User>>> {
    let filter = UserFilter {
        role: query.role,
        status: query.status,
        branch: query.branch,
        unassigned: false,
        search: query.search.filter(|s| !s.trim().is_empty()),
    };
    let page = Page::new(query.page, query.limit);

    let (users, total) = state.storage.users.list(&filter, page).await?;
    Ok(Json(Paginated::new(users, total, page)))
}

async fn unassigned(State(state): State<AppState>) -> Result<Json<Vec<User>>> {
    let filter = UserFilter {
        unassigned: true,
        ..Default::default()
    };
    let (users, _) = state.storage.users.list(&filter, Page::all()).await?;

    Ok(Json(users))
}

async fn find(State(state): State<AppState>, Path(id): Path<Id>) -> Result<Json<User>> {
    Ok(Json(load(&state, id).await?))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};

    use crate::model::{Branch, UserRole};
    use crate::tests::{body_json, make_request, seed_user, test_state};

    #[tokio::test]
    async fn test_list_and_filters() {
        let state = test_state();
        let (_, token) = seed_user(&state, "root@example.com", UserRole::Superadmin).await;
        let (ada, _) = seed_user(&state, "ada@example.com", UserRole::Staff).await;
        seed_user(&state, "bob@example.com", UserRole::Admin).await;

        let branch = Branch::new("Paris", "1 rue de Rivoli", "0102");
        state.storage.branches.insert(&branch).await.unwrap();
        state
            .membership
            .assign_user(&ada, Some(branch.id), None)
            .await
            .unwrap();

        let response = make_request(
            crate::app(state.clone()),
            Method::GET,
            "/api/users?role=admin",
            Some(&token),
            "",
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["data"][0]["email"], "bob@example.com");

        let response = make_request(
            crate::app(state.clone()),
            Method::GET,
            &format!("/api/users?branch={}", branch.id),
            Some(&token),
            "",
        )
        .await;
        let body = body_json(response).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["data"][0]["id"], ada.id.to_string());

        let response = make_request(
            crate::app(state.clone()),
            Method::GET,
            "/api/users/unassigned",
            Some(&token),
            "",
        )
        .await;
        let body = body_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 2);

        let response = make_request(
            crate::app(state),
            Method::GET,
            &format!("/api/users/{}", crate::model::Id::new_v4()),
            Some(&token),
            "",
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bad_query_and_path_answer_json() {
        let state = test_state();
        let (_, token) = seed_user(&state, "root@example.com", UserRole::Superadmin).await;

        for path in ["/api/users?role=root", "/api/users/not-an-id"] {
            let response = make_request(
                crate::app(state.clone()),
                Method::GET,
                path,
                Some(&token),
                "",
            )
            .await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(
                response.headers()[axum::http::header::CONTENT_TYPE],
                "application/json"
            );
            let body = body_json(response).await;
            assert!(!body["message"].as_str().unwrap().is_empty());
        }
    }
}
