use axum::extract::{Path, Query, State};
use axum::Json;
use std::sync::Arc;

use palaver_shared::errors::AppResult;
use palaver_shared::middleware::Caller;
use palaver_shared::types::ApiResponse;

use crate::models::ChatMessage;
use crate::policy::{self, Operation};
use crate::services::messaging_service;
use crate::services::profile_service::{self, ChatOverview, ChatSelection};
use crate::AppState;

/// GET /chat - users, groups and the selected conversation (?user= or ?group=)
pub async fn chat_overview(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(selection): Query<ChatSelection>,
) -> AppResult<Json<ApiResponse<ChatOverview>>> {
    let identity = policy::require(Operation::ChatOverview, &caller)?;
    let overview = profile_service::chat_overview(&state, &identity, selection)?;
    Ok(Json(ApiResponse::ok(overview)))
}

/// GET /conversations/user/:username - direct messages with one user, oldest first
pub async fn direct_conversation(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(username): Path<String>,
) -> AppResult<Json<ApiResponse<Vec<ChatMessage>>>> {
    let identity = policy::require(Operation::DirectConversation, &caller)?;
    let messages = messaging_service::direct_conversation(&state, &identity, &username)?;
    Ok(Json(ApiResponse::ok(messages)))
}

/// GET /conversations/group/:group_id - group messages, oldest first
pub async fn group_conversation(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(group_id): Path<String>,
) -> AppResult<Json<ApiResponse<Vec<ChatMessage>>>> {
    policy::require(Operation::GroupConversation, &caller)?;
    let messages = messaging_service::group_conversation(&state, &group_id)?;
    Ok(Json(ApiResponse::ok(messages)))
}
