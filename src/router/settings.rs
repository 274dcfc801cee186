//! Website intake settings.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use validator::Validate;

use crate::AppState;
use crate::error::Result;
use crate::middleware::Superadmin;
use crate::model::WebsiteSettings;
use crate::router::{Valid, nullable};
use crate::service::settings::SettingsUpdate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Body {
    #[serde(default, deserialize_with = "nullable")]
    target_url: Option<Option<String>>,
    #[validate(length(min = 16, max = 256, message = "API key must be 16 to 256 characters long."))]
    api_key: Option<String>,
    #[serde(default)]
    regenerate_key: bool,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(find).put(update))
}

async fn find(
    State(state): State<AppState>,
    _: Superadmin,
) -> Result<Json<WebsiteSettings>> {
    Ok(Json(state.settings.get().await?))
}

async fn update(
    State(state): State<AppState>,
    Superadmin(actor): Superadmin,
    Valid(body): Valid<Body>,
) -> Result<Json<WebsiteSettings>> {
    let update = SettingsUpdate {
        target_url: body.target_url,
        api_key: body.api_key,
        regenerate_key: body.regenerate_key,
    };

    Ok(Json(state.settings.update(update, actor.id).await?))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};

    use crate::model::UserRole;
    use crate::tests::{body_json, make_request, seed_user, test_state};

    #[tokio::test]
    async fn test_settings_routes() {
        let state = test_state();
        let (root, root_token) = seed_user(&state, "root@example.com", UserRole::Superadmin).await;
        let (_, admin_token) = seed_user(&state, "admin@example.com", UserRole::Admin).await;

        let response = make_request(
            crate::app(state.clone()),
            Method::GET,
            "/api/website-settings",
            Some(&admin_token),
            "",
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = make_request(
            crate::app(state.clone()),
            Method::GET,
            "/api/website-settings",
            Some(&root_token),
            "",
        )
        .await;
        let key = body_json(response).await["apiKey"].as_str().unwrap().to_owned();

        let response = make_request(
            crate::app(state.clone()),
            Method::PUT,
            "/api/website-settings",
            Some(&root_token),
            &serde_json::json!({ "targetUrl": "https://example.com", "regenerateKey": true })
                .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_ne!(body["apiKey"], key);
        assert_eq!(body["targetUrl"], "https://example.com");
        assert_eq!(body["updatedBy"], root.id.to_string());

        let response = make_request(
            crate::app(state),
            Method::PUT,
            "/api/website-settings",
            Some(&root_token),
            &serde_json::json!({ "apiKey": "short" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
