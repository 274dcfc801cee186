//! Create a user.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use validator::Validate;

use crate::AppState;
use crate::error::Result;
use crate::middleware::Superadmin;
use crate::model::{Id, User, UserRole, UserStatus, non_empty, normalize_email};
use crate::router::{Valid, not_blank};
use crate::router::auth::hash_password;
use crate::service::Event;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Body {
    #[validate(length(min = 2, max = 100, message = "Name must be 2 to 100 characters long."), custom(function = "not_blank"))]
    name: String,
    #[validate(email(message = "Email must be formatted."))]
    email: String,
    #[validate(length(min = 6, message = "Password must contain at least 6 characters."))]
    password: String,
    phone: Option<String>,
    #[serde(default)]
    role: UserRole,
    #[serde(default)]
    status: UserStatus,
    branch: Option<Id>,
}

pub async fn handler(
    State(state): State<AppState>,
    Superadmin(actor): Superadmin,
    Valid(body): Valid<Body>,
) -> Result<(StatusCode, Json<User>)> {
    let email = normalize_email(&body.email);
    super::check_email(&state, &email, None).await?;
    if let Some(branch) = body.branch {
        state.membership.check_assignment(None, branch).await?;
    }

    let password = hash_password(&state, &body.password)?;
    let user = User::new(body.name.trim(), &email, password, body.role)
        .with_phone(non_empty(body.phone))
        .with_status(body.status);
    state.storage.users.insert(&user).await?;

    if body.branch.is_some() {
        state
            .membership
            .assign_user(&user, body.branch, Some(actor.id))
            .await?;
    }

    state
        .publisher
        .publish(
            Event::UserCreated {
                name: user.name.clone(),
                email: user.email.clone(),
                role: user.role,
            },
            Some(actor.id),
        )
        .await;
    tracing::info!(user = %user.id, actor = %actor.id, "user created");

    Ok((StatusCode::CREATED, Json(super::load(&state, user.id).await?)))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};

    use crate::model::{Branch, Page, UserRole};
    use crate::tests::{body_json, make_request, seed_user, test_state};
    use crate::visibility::NotificationFilter;

    #[tokio::test]
    async fn test_create_with_branch() {
        let state = test_state();
        let (_, token) = seed_user(&state, "root@example.com", UserRole::Superadmin).await;
        let branch = Branch::new("Lyon", "2 place Bellecour", "0402");
        state.storage.branches.insert(&branch).await.unwrap();

        let body = serde_json::json!({
            "name": "Ada",
            "email": "Ada@Example.com",
            "password": "secret1",
            "role": "staff",
            "branch": branch.id,
        });
        let response = make_request(
            crate::app(state.clone()),
            Method::POST,
            "/api/users",
            Some(&token),
            &body.to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = body_json(response).await;
        assert_eq!(body["email"], "ada@example.com");
        assert_eq!(body["branch"], branch.id.to_string());

        let stored = state.storage.branches.find_by_id(branch.id).await.unwrap().unwrap();
        assert_eq!(stored.assigned_users.len(), 1);
        assert_eq!(stored.assigned_users[0].to_string(), body["id"].as_str().unwrap());

        // Superadmins are told, the new user gets its assignment.
        let (notifications, _) = state
            .storage
            .notifications
            .list(&NotificationFilter::default(), Page::default())
            .await
            .unwrap();
        let titles: Vec<&str> = notifications.iter().map(|n| n.title.as_str()).collect();
        assert!(titles.contains(&"New user created"));
        assert!(titles.contains(&"Branch assignment"));
    }

    #[tokio::test]
    async fn test_create_rejections() {
        let state = test_state();
        let (_, root) = seed_user(&state, "root@example.com", UserRole::Superadmin).await;
        let (_, staff) = seed_user(&state, "staff@example.com", UserRole::Staff).await;

        let body = serde_json::json!({
            "name": "Ada",
            "email": "ada@example.com",
            "password": "secret1",
        })
        .to_string();

        let response =
            make_request(crate::app(state.clone()), Method::POST, "/api/users", Some(&staff), &body)
                .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let duplicate = serde_json::json!({
            "name": "Staff",
            "email": "STAFF@example.com",
            "password": "secret1",
        })
        .to_string();
        let response = make_request(
            crate::app(state.clone()),
            Method::POST,
            "/api/users",
            Some(&root),
            &duplicate,
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let unknown_branch = serde_json::json!({
            "name": "Ada",
            "email": "ada@example.com",
            "password": "secret1",
            "branch": crate::model::Id::new_v4(),
        })
        .to_string();
        let response = make_request(
            crate::app(state.clone()),
            Method::POST,
            "/api/users",
            Some(&root),
            &unknown_branch,
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(state.storage.users.find_by_email("ada@example.com").await.unwrap().is_none());
    }
}
