use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

use crate::error::{ErrorKind, ImageError, ProviderError, WorkflowError};
use crate::models::{CreativeRequest, PollResult};
use crate::workflow::{CreativeWorkflow, WorkflowOutcome, WorkflowStatus};

#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<CreativeWorkflow>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/generate-creative", post(generate_creative))
        .route("/api/poll-image/:request_id", get(poll_image))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn generate_creative(
    State(state): State<AppState>,
    body: Result<Json<CreativeRequest>, JsonRejection>,
) -> (StatusCode, Json<WorkflowOutcome>) {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::warn!("⚠️ Rejected request body: {}", rejection.body_text());
            let err = WorkflowError::InvalidInput(rejection.body_text());
            return (StatusCode::UNPROCESSABLE_ENTITY, Json(WorkflowOutcome::rejected(&err)));
        }
    };

    tracing::info!(
        contact_id = body.profile.as_ref().map(|p| p.contact_id.as_str()).unwrap_or("-"),
        sku = body.product.as_ref().map(|p| p.sku.as_str()).unwrap_or("-"),
        "🚀 Generating creative"
    );

    let outcome = state.workflow.run(body).await;
    let status = match (&outcome.status, &outcome.error) {
        (WorkflowStatus::Error, Some(err))
            if matches!(err.kind, ErrorKind::MissingInput | ErrorKind::InvalidInput) =>
        {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        (WorkflowStatus::Error, _) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::OK,
    };
    (status, Json(outcome))
}

pub async fn poll_image(
    Path(request_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<PollResult>, (StatusCode, Json<Value>)> {
    let timeout = state.workflow.settings().wait.poll_timeout;
    match state.workflow.images().poll(&request_id, timeout).await {
        Ok(result) => Ok(Json(result)),
        Err(e) => {
            tracing::warn!(%request_id, "⚠️ Poll failed: {}", e);
            let status = match &e {
                ImageError::Provider(ProviderError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::BAD_GATEWAY,
            };
            Err((status, Json(json!({ "request_id": request_id, "error": e.to_string() }))))
        }
    }
}
