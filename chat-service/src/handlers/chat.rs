use crate::models::{ChatRequest, ChatResponse};
use crate::startup::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use service_core::error::AppError;

pub const INVALID_REQUEST_BODY: &str = "Invalid request body";

/// `POST /chat`: continue the prompt with the language model.
///
/// Any body that is not a JSON object with a string `prompt` is a 400.
/// Generator failures are already folded into the reply text; only a failure
/// of the generation task itself becomes a 500.
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::debug!(reason = %rejection.body_text(), "Rejected chat request");
        AppError::BadRequest(anyhow::anyhow!(INVALID_REQUEST_BODY))
    })?;

    tracing::info!(prompt_len = request.prompt.len(), "Chat request");

    let generator = state.generator.clone();
    let prompt = request.prompt;
    let outcome = tokio::task::spawn_blocking(move || generator.generate(&prompt))
        .await
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("generation task failed: {}", e)))?;

    tracing::info!(outcome = outcome.label(), "Chat response");

    Ok(Json(ChatResponse {
        text: outcome.into_text(),
    }))
}
