use axum::{body::Bytes, extract::State, http::StatusCode, routing::post, Json, Router};
use callbridge_core::errors::InterfaceError;
use callbridge_core::reconcile::{CallReconciler, ReconcileOutcome};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct WebhookState {
    reconciler: CallReconciler,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WebhookAccepted {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: ReconcileOutcome,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WebhookError {
    pub error: String,
}

type WebhookRejection = (StatusCode, Json<WebhookError>);

pub fn router(reconciler: CallReconciler) -> Router {
    Router::new().route("/webhook", post(webhook)).with_state(WebhookState { reconciler })
}

pub async fn webhook(
    State(state): State<WebhookState>,
    body: Bytes,
) -> Result<Json<WebhookAccepted>, WebhookRejection> {
    let correlation_id = Uuid::new_v4().to_string();
    info!(
        event_name = "webhook.received",
        correlation_id = %correlation_id,
        bytes = body.len(),
        "call webhook received"
    );

    let payload: Value = serde_json::from_slice(&body).map_err(|error| {
        warn!(
            event_name = "webhook.invalid_json",
            correlation_id = %correlation_id,
            error = %error,
            "webhook body is not valid JSON"
        );
        let error = format!("invalid JSON payload: {error}");
        (StatusCode::BAD_REQUEST, Json(WebhookError { error }))
    })?;
    debug!(event_name = "webhook.payload", correlation_id = %correlation_id, payload = %payload);

    match state.reconciler.reconcile(&payload, &correlation_id).await {
        Ok(outcome) => Ok(Json(WebhookAccepted { success: true, outcome })),
        Err(error) => Err(reject(error.into_interface(correlation_id))),
    }
}

fn reject(error: InterfaceError) -> WebhookRejection {
    let status = match &error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(
        event_name = "webhook.rejected",
        correlation_id = error.correlation_id(),
        status = status.as_u16(),
        hint = error.user_message(),
        error = %error,
        "call webhook rejected"
    );
    (status, Json(WebhookError { error: error.message().to_string() }))
}
