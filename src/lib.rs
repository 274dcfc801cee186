//! leadhub is a multi-branch CRM API: leads, users, branches, roles and
//! notifications.

#![forbid(unsafe_code)]

pub mod config;
mod crypto;
mod database;
pub mod error;
mod geolocation;
mod middleware;
mod model;
mod repository;
mod router;
mod service;
pub mod telemetry;
mod token;
mod visibility;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::routing::get;
use axum::{Router, middleware as AxumMiddleware};
use error::ServerError;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

use crate::model::{Role, User, UserRole, normalize_email};
use crate::repository::Storage;
use crate::service::{
    LeadService, MembershipService, NotificationPublisher,
    NotificationService, SettingsService,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub storage: Storage,
    pub crypto: Arc<crypto::PasswordManager>,
    pub token: token::TokenManager,
    pub geolocation: geolocation::Geolocator,
    pub publisher: NotificationPublisher,
    pub membership: MembershipService,
    pub notifications: NotificationService,
    pub settings: SettingsService,
    pub leads: LeadService,
}

impl AppState {
    /// Wire services on top of `storage`.
    pub fn new(
        config: Arc<config::Configuration>,
        storage: Storage,
        crypto: crypto::PasswordManager,
        token: token::TokenManager,
    ) -> Self {
        let publisher =
            NotificationPublisher::new(Arc::clone(&storage.notifications));

        Self {
            geolocation: geolocation::Geolocator::new(
                config.geolocation.as_ref(),
            ),
            membership: MembershipService::new(&storage, publisher.clone()),
            notifications: NotificationService::new(&storage),
            settings: SettingsService::new(
                Arc::clone(&storage.settings),
                config.website.api_key.clone(),
            ),
            leads: LeadService::new(Arc::clone(&storage.leads)),
            crypto: Arc::new(crypto),
            publisher,
            storage,
            token,
            config,
        }
    }
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let layers = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, REQUEST_TIMEOUT))
        // Remove sensitive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([
            header::AUTHORIZATION,
            header::COOKIE,
            header::SET_COOKIE,
            header::HeaderName::from_static("x-api-key"),
        ]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    let public = Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        .nest("/auth", router::auth::public_router())
        .nest("/leads", router::leads::website_router(state.clone()));

    let protected = Router::new()
        .nest("/auth", router::auth::router())
        .nest("/users", router::users::router())
        .nest("/branches", router::branches::router())
        .nest("/leads", router::leads::router())
        .nest("/roles", router::roles::router())
        .nest("/notifications", router::notifications::router())
        .nest("/login-history", router::login_history::router())
        .nest("/website-settings", router::settings::router())
        .route_layer(AxumMiddleware::from_fn_with_state(
            state.clone(),
            middleware::authenticate,
        ));

    Router::new()
        .nest("/api", public.merge(protected))
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(layers)
}

/// Create the configured superadmin when no user owns its email.
async fn bootstrap_superadmin(state: &AppState) -> Result<(), ServerError> {
    let Some(account) = &state.config.superadmin else {
        return Ok(());
    };

    let email = normalize_email(&account.email);
    if state.storage.users.find_by_email(&email).await?.is_some() {
        return Ok(());
    }

    let password = state
        .crypto
        .hash_password(&account.password)
        .map_err(|err| ServerError::internal("cannot hash password", err))?;
    let user = User::new(&account.name, &email, password, UserRole::Superadmin);
    state.storage.users.insert(&user).await?;
    tracing::info!(user = %user.id, %email, "superadmin account created");

    Ok(())
}

/// Store built-in permissions when no role document exists yet.
async fn seed_roles(state: &AppState) -> Result<(), ServerError> {
    if !state.storage.roles.list().await?.is_empty() {
        return Ok(());
    }

    for name in UserRole::ALL {
        state.storage.roles.upsert(&Role::default_for(*name)).await?;
    }
    tracing::info!("default role permissions stored");

    Ok(())
}

/// Initialize the application state.
pub async fn initialize_state(
    config: Arc<config::Configuration>,
) -> Result<AppState, Box<dyn std::error::Error + Send + Sync>> {
    let storage = match config.storage {
        config::Storage::Postgres => {
            let Some(postgres) = &config.postgres else {
                return Err(
                    "missing `postgres` entry on `config.yaml` file".into()
                );
            };
            Storage::postgres(database::connect(postgres).await?)
        },
        config::Storage::Memory => {
            tracing::warn!("memory storage selected, data is lost on restart");
            Storage::memory()
        },
    };

    let crypto = crypto::PasswordManager::new(config.argon2.clone())?;
    let token = token::TokenManager::new(
        &config.name,
        &config.token.secret,
        config.token.expiration_days,
    )?;

    let state = AppState::new(config, storage, crypto, token);
    bootstrap_superadmin(&state).await?;
    seed_roles(&state).await?;

    Ok(state)
}

#[cfg(test)]
pub(crate) mod tests {
    use axum::body::Body;
    use axum::extract::Request;
    use axum::http::Method;
    use axum::response::Response;
    use http_body_util::BodyExt;
    use tower::util::ServiceExt;

    use super::*;

    pub const PASSWORD: &str = "password";

    /// In-memory state. MUST NEVER be used in production.
    pub fn test_state() -> AppState {
        let mut config = config::Configuration::default();
        config.storage = config::Storage::Memory;
        config.token.secret = "test-secret".to_owned();
        let token = token::TokenManager::new(&config.name, &config.token.secret, 7)
            .expect("cannot create token manager");

        AppState::new(
            Arc::new(config),
            Storage::memory(),
            crypto::test_password_manager(),
            token,
        )
    }

    /// Store an active user with password [`PASSWORD`] and sign a token
    /// for it.
    pub async fn seed_user(state: &AppState, email: &str, role: UserRole) -> (User, String) {
        let name = email.split('@').next().unwrap_or(email);
        let password = state.crypto.hash_password(PASSWORD).unwrap();
        let user = User::new(name, email, password, role);
        state.storage.users.insert(&user).await.unwrap();

        let token = state.token.create(user.id).unwrap();
        (user, token)
    }

    pub async fn make_request(
        app: Router,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: &str,
    ) -> Response {
        let mut request = Request::builder()
            .method(method)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        app.oneshot(request.body(Body::from(body.to_owned())).unwrap())
            .await
            .unwrap()
    }

    pub async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_bootstrap_superadmin_once() {
        let mut config = config::Configuration::default();
        config.storage = config::Storage::Memory;
        config.token.secret = "test-secret".to_owned();
        config.argon2 = Some(config::Argon2 {
            memory_cost: 8,
            iterations: 1,
            parallelism: 1,
            hash_length: 32,
        });
        config.superadmin = Some(config::Superadmin {
            name: "Root".to_owned(),
            email: "Root@Example.com".to_owned(),
            password: "changeme".to_owned(),
        });

        let state = initialize_state(Arc::new(config)).await.unwrap();
        bootstrap_superadmin(&state).await.unwrap();

        let root = state
            .storage
            .users
            .find_by_email("root@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(root.role, UserRole::Superadmin);
        assert!(state.crypto.verify_password("changeme", &root.password));

        let (users, total) = state
            .storage
            .users
            .list(&Default::default(), model::Page::default())
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(users[0].id, root.id);

        let roles = state.storage.roles.list().await.unwrap();
        assert_eq!(roles.len(), UserRole::ALL.len());
    }

    #[tokio::test]
    async fn test_cookie_session() {
        let state = test_state();
        let (user, token) = seed_user(&state, "ada@example.com", UserRole::Staff).await;

        let response = crate::app(state)
            .oneshot(
                Request::builder()
                    .uri("/api/auth/me")
                    .header(header::COOKIE, format!("theme=dark; token={token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["id"], user.id.to_string());
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let response =
            make_request(app(test_state()), Method::GET, "/api/nope", None, "").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
