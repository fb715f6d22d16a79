use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use std::sync::Arc;

use palaver_shared::errors::AppResult;
use palaver_shared::middleware::Caller;
use palaver_shared::types::ApiResponse;

use super::form::read_multipart;
use super::redirect_or_json;
use crate::policy::{self, Operation};
use crate::services::profile_service::{self, GroupSummary, UpdateProfileInput, UserProfileView};
use crate::AppState;

/// GET /user_profile/:username - public profile of any user
pub async fn user_profile(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(username): Path<String>,
) -> AppResult<Json<ApiResponse<UserProfileView>>> {
    policy::require(Operation::UserProfile, &caller)?;
    let profile = profile_service::view_user_profile(&state, &username)?;
    Ok(Json(ApiResponse::ok(profile)))
}

/// GET /groups/:group_id - name, description, image and member names
pub async fn group_summary(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(group_id): Path<String>,
) -> AppResult<Json<ApiResponse<GroupSummary>>> {
    policy::require(Operation::GroupSummary, &caller)?;
    let summary = profile_service::view_group_profile(&state, &group_id)?;
    Ok(Json(ApiResponse::ok(summary)))
}

/// POST /update_profile - change own username, email, password or avatar
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Response> {
    let identity = policy::require(Operation::UpdateProfile, &caller)?;
    let mut form = read_multipart(multipart).await?;

    let input = UpdateProfileInput {
        username: form.text("username"),
        email: form.text("email"),
        password: form.text("password"),
        avatar: form.take_file("profile_pic"),
    };
    let update = profile_service::update_own_profile(&state, &identity, input).await?;

    Ok(redirect_or_json(
        &caller,
        "/chat",
        ApiResponse::ok_with_message(update.profile, "profile updated"),
    ))
}
