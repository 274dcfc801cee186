//! Middlewares for routes.

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::Response;
use cookie::Cookie;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::model::User;
use crate::visibility::Principal;

/// Name of the authentication cookie.
pub const TOKEN_COOKIE: &str = "token";
const BEARER: &str = "Bearer ";
const API_KEY_HEADER: &str = "x-api-key";

/// Authenticated caller, reloaded from storage on every request.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub User);

impl CurrentUser {
    pub fn principal(&self) -> Principal {
        Principal::from(&self.0)
    }
}

/// Authenticated caller holding the superadmin role.
#[derive(Clone, Debug)]
pub struct Superadmin(pub User);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(ServerError::Unauthorized)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Superadmin {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let CurrentUser(user) =
            CurrentUser::from_request_parts(parts, state).await?;

        if !user.role.is_superadmin() {
            tracing::debug!(user = %user.id, role = %user.role, "superadmin route refused");
            return Err(ServerError::Forbidden);
        }

        Ok(Superadmin(user))
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix(BEARER))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// JWT from the `token` cookie, then from `Authorization: Bearer`.
fn session_token(headers: &HeaderMap) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(|c| c.ok())
        .find(|c| c.name() == TOKEN_COOKIE && !c.value().is_empty())
        .map(|c| c.value().to_owned());

    from_cookie.or_else(|| bearer(headers).map(str::to_owned))
}

/// Reject anonymous, unknown and inactive callers.
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let token =
        session_token(req.headers()).ok_or(ServerError::Unauthorized)?;

    let id = state
        .token
        .decode(&token)
        .and_then(|claims| claims.user_id())
        .map_err(|err| {
            tracing::debug!(error = %err, "token rejected");
            ServerError::Unauthorized
        })?;

    let user = state
        .storage
        .users
        .find_by_id(id)
        .await?
        .ok_or(ServerError::Unauthorized)?;
    if !user.is_active() {
        return Err(ServerError::InactiveAccount);
    }

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

/// Guard the public lead intake with the website API key.
pub async fn website_api_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response> {
    let headers = req.headers();
    let candidate = headers
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .or_else(|| bearer(headers));

    state.settings.verify_api_key(candidate).await?;

    Ok(next.run(req).await)
}
