use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::rejection::FormRejection;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Form, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use palaver_shared::errors::AppResult;
use palaver_shared::middleware::Caller;
use palaver_shared::types::auth::SESSION_COOKIE;
use palaver_shared::types::ApiResponse;

use super::form::{form_body, read_multipart};
use crate::policy::{self, Operation};
use crate::services::auth_service::{self, SignupInput};
use crate::services::profile_service::UserProfileView;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginPage {
    pub authenticated: bool,
    pub username: Option<String>,
}

fn session_cookie(token: &str, max_age: i64) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}")
}

/// POST /signup - create an account (multipart: username, email, password, profile_image)
pub async fn signup(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Response> {
    policy::authorize(Operation::Signup, &caller)?;
    let mut form = read_multipart(multipart).await?;

    let user = auth_service::signup(
        &state,
        SignupInput {
            username: form.text_or_default("username"),
            email: form.text_or_default("email"),
            password: form.text_or_default("password"),
            avatar: form.take_file("profile_image"),
        },
    )
    .await?;

    let profile = UserProfileView::from_user(&user, &state.config.default_avatar);
    Ok(super::redirect_or_json(
        &caller,
        "/login",
        ApiResponse::ok_with_message(profile, "account created"),
    ))
}

/// GET /login - whether the caller already holds a session
pub async fn login_page(caller: Caller) -> AppResult<Json<ApiResponse<LoginPage>>> {
    let identity = policy::authorize(Operation::Login, &caller)?;
    Ok(Json(ApiResponse::ok(LoginPage {
        authenticated: caller.session.is_authenticated(),
        username: identity.map(|i| i.username.clone()),
    })))
}

/// POST /login - exchange credentials for a session token and cookie
pub async fn login(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    body: Result<Form<LoginRequest>, FormRejection>,
) -> AppResult<Response> {
    policy::authorize(Operation::Login, &caller)?;
    let req = form_body(body)?;

    let token = auth_service::login(&state, &req.username, &req.password)?;
    let cookie = session_cookie(&token.access_token, token.expires_in);

    let mut response = super::redirect_or_json(&caller, "/chat", ApiResponse::ok(token));
    if let Ok(value) = cookie.parse() {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    Ok(response)
}

/// GET|POST /logout - end the current session
pub async fn logout(State(state): State<Arc<AppState>>, caller: Caller) -> AppResult<Response> {
    policy::require(Operation::Logout, &caller)?;
    auth_service::logout(&state, caller.session.clone())?;

    let cleared = [(header::SET_COOKIE, session_cookie("", 0))];
    if caller.wants_html() {
        Ok((cleared, Redirect::to("/login")).into_response())
    } else {
        Ok((cleared, Json(ApiResponse::ok("logged out"))).into_response())
    }
}
