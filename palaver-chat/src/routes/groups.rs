use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use palaver_shared::errors::AppResult;
use palaver_shared::middleware::Caller;
use palaver_shared::types::ApiResponse;

use super::form::{json_body, read_multipart};
use super::{conversation_location, redirect_or_json};
use crate::models::{GroupWithMembers, MessageTarget};
use crate::policy::{self, Operation};
use crate::services::group_service::{
    self, AvailableUsers, CreateGroupInput, GroupProfileView, UpdateGroupInput,
};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct MemberChangesRequest {
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub add: Vec<String>,
    #[serde(default)]
    pub remove: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AvailableUsersQuery {
    pub group_id: Option<String>,
}

/// POST /groups/create - new group with the caller as creator
pub async fn create_group(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Response> {
    let identity = policy::require(Operation::CreateGroup, &caller)?;
    let mut form = read_multipart(multipart).await?;

    let input = CreateGroupInput {
        name: form.text_or_default("name"),
        description: form.text_or_default("description"),
        members: form.list("members"),
        image: form.take_file("image"),
    };
    let group = group_service::create_group(&state, &identity, input).await?;

    let location = conversation_location(&MessageTarget::Group(group.group.id));
    Ok(redirect_or_json(&caller, &location, ApiResponse::ok_with_message(group, "group created")))
}

/// POST /update_group - creator edits name, description or image
pub async fn update_group(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Response> {
    let identity = policy::require(Operation::UpdateGroup, &caller)?;
    let mut form = read_multipart(multipart).await?;

    let input = UpdateGroupInput {
        group_id: form.text("group_id"),
        name: form.text("name"),
        description: form.text("description"),
        image: form.take_file("image"),
    };
    let group = group_service::update_group(&state, &identity, input).await?;

    let location = conversation_location(&MessageTarget::Group(group.group.id));
    Ok(redirect_or_json(&caller, &location, ApiResponse::ok_with_message(group, "group updated")))
}

/// POST /update_group_members - creator adds and removes members
pub async fn update_group_members(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    body: Result<Json<MemberChangesRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<GroupWithMembers>>> {
    let identity = policy::require(Operation::UpdateGroupMembers, &caller)?;
    let req = json_body(body)?;

    let group =
        group_service::update_group_members(&state, &identity, req.group_id.as_deref(), &req.add, &req.remove)?;
    Ok(Json(ApiResponse::ok_with_message(group, "members updated")))
}

/// GET /group_profile/:group_id - group details with member avatars
pub async fn group_profile(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(group_id): Path<String>,
) -> AppResult<Json<ApiResponse<GroupProfileView>>> {
    let identity = policy::require(Operation::GroupProfile, &caller)?;
    let profile = group_service::group_profile(&state, &group_id, &identity)?;
    Ok(Json(ApiResponse::ok(profile)))
}

/// GET /available_users?group_id= - members and non-members of a group
pub async fn available_users(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<AvailableUsersQuery>,
) -> AppResult<Json<ApiResponse<AvailableUsers>>> {
    policy::require(Operation::AvailableUsers, &caller)?;
    let users = group_service::available_users(&state, query.group_id.as_deref())?;
    Ok(Json(ApiResponse::ok(users)))
}
