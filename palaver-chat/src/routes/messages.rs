use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use palaver_shared::errors::AppResult;
use palaver_shared::middleware::Caller;
use palaver_shared::types::ApiResponse;

use super::form::{json_body, read_multipart};
use super::{conversation_location, redirect_or_json};
use crate::models::ChatMessage;
use crate::policy::{self, Operation};
use crate::services::messaging_service::{self, SendMessageInput};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct SentMessage {
    pub message: ChatMessage,
    /// Chat page showing the conversation the message landed in.
    pub redirect_to: String,
}

#[derive(Debug, Deserialize)]
pub struct ForwardRequest {
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub target_id: String,
    #[serde(default)]
    pub chat_type: String,
}

/// POST /send_message - text and/or one attachment to a user or group
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Response> {
    let identity = policy::require(Operation::SendMessage, &caller)?;
    let mut form = read_multipart(multipart).await?;

    let input = SendMessageInput {
        chat_type: form.text_or_default("chat_type"),
        target: form.text_or_default("receiver"),
        body: form.text_or_default("message"),
        file: form.take_file("file"),
        reply_message_id: form.text("reply_message_id"),
        reply_message_text: form.text("reply_message_text"),
    };
    let message = messaging_service::send_message(&state, &identity, input).await?;

    let location = conversation_location(&message.target);
    Ok(redirect_or_json(
        &caller,
        &location,
        ApiResponse::ok(SentMessage { message, redirect_to: location.clone() }),
    ))
}

/// POST /forward_message - copy an existing message to another conversation
pub async fn forward_message(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    body: Result<Json<ForwardRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<ChatMessage>>> {
    let identity = policy::require(Operation::ForwardMessage, &caller)?;
    let req = json_body(body)?;

    let message =
        messaging_service::forward_message(&state, &identity, &req.message_id, &req.target_id, &req.chat_type)?;
    Ok(Json(ApiResponse::ok_with_message(message, "message forwarded")))
}
