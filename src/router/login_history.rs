//! Login audit trail.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::AppState;
use crate::error::Result;
use crate::middleware::CurrentUser;
use crate::model::{Id, LoginHistory, Page, Paginated};
use crate::router::Query;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    user: Option<Id>,
    page: Option<u64>,
    limit: Option<u64>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list))
}

/// Superadmins see everyone's attempts, optionally for one `user`; other
/// callers only their own.
async fn list(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Paginated<LoginHistory>>> {
    let owner = if user.role.is_superadmin() {
        query.user
    } else {
        Some(user.id)
    };
    let page = Page::new(query.page, query.limit);

    let (entries, total) = state.storage.login_history.list(owner, page).await?;
    Ok(Json(Paginated::new(entries, total, page)))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};

    use crate::model::{LoginHistory, UserRole};
    use crate::tests::{body_json, make_request, seed_user, test_state};

    #[tokio::test]
    async fn test_history_is_self_scoped() {
        let state = test_state();
        let (root, root_token) = seed_user(&state, "root@example.com", UserRole::Superadmin).await;
        let (ada, ada_token) = seed_user(&state, "ada@example.com", UserRole::Staff).await;

        for entry in [
            LoginHistory::success(root.id, &root.email),
            LoginHistory::success(ada.id, &ada.email),
            LoginHistory::failure(Some(ada.id), &ada.email, "Invalid password"),
        ] {
            state.storage.login_history.insert(&entry).await.unwrap();
        }

        // `user` is ignored for non superadmins.
        let response = make_request(
            crate::app(state.clone()),
            Method::GET,
            &format!("/api/login-history?user={}", root.id),
            Some(&ada_token),
            "",
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["total"], 2);
        assert_eq!(body["data"][0]["email"], ada.email);

        let response = make_request(
            crate::app(state.clone()),
            Method::GET,
            "/api/login-history",
            Some(&root_token),
            "",
        )
        .await;
        assert_eq!(body_json(response).await["total"], 3);

        let response = make_request(
            crate::app(state),
            Method::GET,
            &format!("/api/login-history?user={}&limit=1", ada.id),
            Some(&root_token),
            "",
        )
        .await;
        let body = body_json(response).await;
        assert_eq!(body["total"], 2);
        assert_eq!(body["pages"], 2);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
    }
}
