use axum::{
    extract::State,
    response::{IntoResponse, Json},
    Extension,
};
use serde_json::json;

use crate::error::Result;
use crate::middleware::telemetry::TokenUsage;
use crate::services::ai_client::{ModelClient, ResponseFormat};
use crate::AppState;

/// Round-trip check of the model client.
#[axum::debug_handler]
pub async fn ai_ping(
    State(state): State<AppState>,
    Extension(usage): Extension<TokenUsage>,
) -> Result<impl IntoResponse> {
    match state
        .model
        .chat_json(
            "Você é um serviço de verificação. Responda somente JSON.",
            "Retorne {\"status\":\"ok\"}",
            ResponseFormat::JsonObject,
            Some(50),
        )
        .await
    {
        Ok(reply) => {
            usage.add(reply.tokens_in, reply.tokens_out);
            Ok(Json(json!({
                "success": true,
                "tokensIn": reply.tokens_in,
                "tokensOut": reply.tokens_out,
                "raw": reply.content,
            })))
        }
        Err(e) => Ok(Json(json!({
            "success": false,
            "error": format!("Falha ao chamar IA: {}", e),
        }))),
    }
}

/// Per-track bank totals and difficulty histogram.
#[axum::debug_handler]
pub async fn seed_status(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let status = state.bank.status().await;
    Ok(Json(status))
}
