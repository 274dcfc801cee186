//! Public status page for front-end identification.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::config::Configuration;

/// Structured configuration.
#[derive(Debug, Serialize)]
pub struct Status {
    name: String,
    version: String,
    url: String,
}

/// Public server status.
pub async fn status(State(config): State<Arc<Configuration>>) -> Json<Status> {
    Json(Status {
        name: config.name.clone(),
        version: config.version().to_owned(),
        url: config.url.clone(),
    })
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};

    use crate::tests::{body_json, make_request, test_state};

    #[tokio::test]
    async fn test_status_is_public() {
        let state = test_state();
        let response =
            make_request(crate::app(state), Method::GET, "/api/status.json", None, "").await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["name"], "leadhub");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }
}
