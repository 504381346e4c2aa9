use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use callbridge_core::credentials::CredentialStore;
use chrono::Utc;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    credentials: Arc<dyn CredentialStore>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub credential: HealthCheck,
    pub has_token: bool,
    pub checked_at: String,
}

pub fn router(credentials: Arc<dyn CredentialStore>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { credentials })
}

/// Always answers 200; a missing access token only downgrades the reported status.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let has_token = state.credentials.has_value();
    let credential = if has_token {
        HealthCheck { status: "ready", detail: "crm access token is set".to_string() }
    } else {
        HealthCheck {
            status: "degraded",
            detail: "crm access token is not set; webhooks will fail until it is configured"
                .to_string(),
        }
    };

    let payload = HealthResponse {
        status: if has_token { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "callbridge-server runtime initialized".to_string(),
        },
        credential,
        has_token,
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}
