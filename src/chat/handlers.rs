use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::{
    commands::{extract_commands, message},
    repo::Role,
};
use crate::{
    auth::extractors::AuthUser,
    error::ApiError,
    extract::ApiJson,
    state::AppState,
};

pub const FALLBACK_REPLY: &str =
    "Sorry, I couldn't reach the assistant right now. Please try again in a moment.";

const INSTRUCTIONS: &str = r#"You are Drvyn, a helpful scheduling assistant.
Always reply with ONLY a JSON array of commands, for example:
[{"command":"ADD","title":"Gym","start":"2025-08-01T18:00:00","end":"2025-08-01T19:00:00"},
 {"command":"REMOVE","title":"Dentist","start":"2025-08-02T09:00:00","end":"2025-08-02T10:00:00"},
 {"command":"MESSAGE","text":"Scheduled your gym session."}]
Times are ISO 8601 without offset. Use MESSAGE for anything that is not a calendar change."#;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub input: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub commands: Vec<Value>,
}

pub fn chat_routes() -> Router<AppState> {
    Router::new().route("/ai", post(chat))
}

#[instrument(skip(state, payload))]
pub async fn chat(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(payload): ApiJson<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let input = payload
        .input
        .map(|i| i.trim().to_string())
        .filter(|i| !i.is_empty())
        .ok_or_else(|| ApiError::validation("No input"))?;

    state
        .conversations
        .append(user_id, Role::User, &input)
        .await?;

    let commands = match state.chat.complete(INSTRUCTIONS, &input).await {
        Ok(reply) => {
            state
                .conversations
                .append(user_id, Role::Assistant, &reply)
                .await?;
            let commands = extract_commands(&reply);
            info!(%user_id, commands = commands.len(), "chat reply parsed");
            commands
        }
        Err(e) => {
            warn!(%user_id, error = %e, "chat provider failed; sending fallback");
            message(FALLBACK_REPLY)
        }
    };

    Ok(Json(ChatResponse { commands }))
}
