//! Session routes.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, header};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use cookie::time::Duration;
use cookie::{Cookie, SameSite};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::middleware::{CurrentUser, TOKEN_COOKIE};
use crate::model::{LoginHistory, User, normalize_email};
use crate::router::Valid;
use crate::telemetry;

const FORWARDED_FOR: &str = "x-forwarded-for";
const REAL_IP: &str = "x-real-ip";

/// Origin of a request, as recorded by the login history.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    fn from_parts(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let value = |name: &str| {
            headers
                .get(name)
                .and_then(|h| h.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let ip = value(FORWARDED_FOR)
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .or_else(|| value(REAL_IP))
            .map(str::to_owned)
            .or_else(|| peer.map(|addr| addr.ip().to_string()));

        Self {
            ip,
            user_agent: value(header::USER_AGENT.as_str()).map(str::to_owned),
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for ClientInfo {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Ok(Self::from_parts(&parts.headers, peer))
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct Credentials {
    #[validate(email(message = "Email must be formatted."))]
    email: String,
    #[validate(length(min = 1, message = "Password is required."))]
    password: String,
}

#[derive(Debug, Serialize)]
pub struct Session {
    token: String,
    user: User,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    #[validate(length(min = 1, message = "Current password is required."))]
    current_password: String,
    #[validate(length(
        min = 6,
        message = "Password must contain at least 6 characters."
    ))]
    new_password: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        // `GET /auth/me` goes to `me`.
        .route("/me", get(me))
        // `PUT /auth/change-password` goes to `change_password`.
        .route("/change-password", put(change_password))
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
}

/// Hash `password` with the configured Argon2 parameters.
pub(crate) fn hash_password(state: &AppState, password: &str) -> Result<String> {
    state
        .crypto
        .hash_password(password)
        .map_err(|err| ServerError::internal("cannot hash password", err))
}

/// Append an entry to the login history. Failures are logged only.
async fn record(state: &AppState, entry: LoginHistory, client: ClientInfo) {
    telemetry::login_attempt(entry.success);

    let location = state.geolocation.locate(client.ip.as_deref()).await;
    let entry = entry.origin(client.ip, client.user_agent, location);

    if let Err(err) = state.storage.login_history.insert(&entry).await {
        tracing::warn!(error = %err, email = %entry.email, "cannot record login attempt");
    }
}

fn session_cookie(state: &AppState, token: String) -> Cookie<'static> {
    let max_age = i64::try_from(state.token.lifetime()).unwrap_or(i64::MAX);

    Cookie::build((TOKEN_COOKIE, token))
        .http_only(true)
        .secure(state.config.cookie.secure)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(Duration::seconds(max_age))
        .build()
}

async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    Valid(body): Valid<Credentials>,
) -> Result<impl IntoResponse> {
    let email = normalize_email(&body.email);

    let Some(user) = state.storage.users.find_by_email(&email).await? else {
        record(&state, LoginHistory::failure(None, &email, "User not found"), client).await;
        return Err(ServerError::InvalidCredentials);
    };

    if !state.crypto.verify_password(&body.password, &user.password) {
        record(
            &state,
            LoginHistory::failure(Some(user.id), &email, "Invalid password"),
            client,
        )
        .await;
        return Err(ServerError::InvalidCredentials);
    }

    if !user.is_active() {
        record(
            &state,
            LoginHistory::failure(Some(user.id), &email, "Account is inactive"),
            client,
        )
        .await;
        return Err(ServerError::InactiveAccount);
    }

    let token = state
        .token
        .create(user.id)
        .map_err(|err| ServerError::internal("cannot sign token", err))?;

    let now = Utc::now();
    state.storage.users.touch_login(user.id, now).await?;
    record(&state, LoginHistory::success(user.id, &email), client).await;
    tracing::info!(user = %user.id, "user logged in");

    let cookie = session_cookie(&state, token.clone());
    let user = User {
        last_login: Some(now),
        ..user
    };

    Ok((
        [(header::SET_COOKIE, cookie.to_string())],
        Json(Session { token, user }),
    ))
}

async fn logout() -> impl IntoResponse {
    let mut cookie = Cookie::build((TOKEN_COOKIE, ""))
        .http_only(true)
        .same_site(SameSite::Strict)
        .path("/")
        .build();
    cookie.make_removal();

    (
        [(header::SET_COOKIE, cookie.to_string())],
        Json(serde_json::json!({ "message": "Logged out successfully." })),
    )
}

async fn me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

async fn change_password(
    State(state): State<AppState>,
    CurrentUser(mut user): CurrentUser,
    Valid(body): Valid<PasswordChange>,
) -> Result<Json<serde_json::Value>> {
    if !state
        .crypto
        .verify_password(&body.current_password, &user.password)
    {
        return Err(ServerError::bad_request("Current password is incorrect."));
    }

    user.password = hash_password(&state, &body.new_password)?;
    user.updated_at = Utc::now();
    state.storage.users.update(&user).await?;

    Ok(Json(
        serde_json::json!({ "message": "Password updated successfully." }),
    ))
}
