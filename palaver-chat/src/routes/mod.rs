pub mod auth;
pub mod conversations;
pub mod form;
pub mod groups;
pub mod health;
pub mod messages;
pub mod profiles;

use axum::extract::{DefaultBodyLimit, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use palaver_shared::errors::AppResult;
use palaver_shared::middleware::{metrics_middleware, Caller};
use palaver_shared::types::ApiResponse;

use crate::models::MessageTarget;
use crate::policy::{self, Operation};
use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let uploads = Router::new()
        .nest_service("/uploads", ServeDir::new(state.storage.root()))
        .layer(middleware::from_fn_with_state(state.clone(), upload_access));
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        // Health
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        // Sessions
        .route("/signup", post(auth::signup))
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/logout", get(auth::logout).post(auth::logout))
        // Conversations
        .route("/chat", get(conversations::chat_overview))
        .route("/conversations/user/:username", get(conversations::direct_conversation))
        .route("/conversations/group/:group_id", get(conversations::group_conversation))
        // Messages
        .route("/send_message", post(messages::send_message))
        .route("/forward_message", post(messages::forward_message))
        // Groups
        .route("/groups/create", post(groups::create_group))
        .route("/groups/:group_id", get(profiles::group_summary))
        .route("/update_group", post(groups::update_group))
        .route("/update_group_members", post(groups::update_group_members))
        .route("/group_profile/:group_id", get(groups::group_profile))
        .route("/available_users", get(groups::available_users))
        // Profiles
        .route("/user_profile/:username", get(profiles::user_profile))
        .route("/update_profile", post(profiles::update_profile))
        // Uploaded files
        .merge(uploads)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn upload_access(caller: Caller, req: Request, next: Next) -> AppResult<Response> {
    policy::authorize(Operation::FetchUpload, &caller)?;
    Ok(next.run(req).await)
}

/// Where the chat page shows a conversation with `target`.
pub fn conversation_location(target: &MessageTarget) -> String {
    let query = match target {
        MessageTarget::User(username) => url::form_urlencoded::Serializer::new(String::new())
            .append_pair("user", username)
            .finish(),
        MessageTarget::Group(group_id) => format!("group={group_id}"),
    };
    format!("/chat?{query}")
}

/// Browsers get a redirect to `location`, API clients get the envelope.
pub fn redirect_or_json<T: Serialize>(caller: &Caller, location: &str, body: ApiResponse<T>) -> Response {
    if caller.wants_html() {
        Redirect::to(location).into_response()
    } else {
        Json(body).into_response()
    }
}
