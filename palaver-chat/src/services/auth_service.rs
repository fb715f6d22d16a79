use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use uuid::Uuid;
use validator::Validate;

use palaver_shared::clients::storage::sanitize_file_name;
use palaver_shared::errors::{AppError, AppResult, ErrorCode};
use palaver_shared::middleware::issue_jwt;
use palaver_shared::types::auth::{Claims, Identity, Session, SessionToken};

use super::{discard_upload, save_upload, Upload};
use crate::models::{NewSession, NewUser, User};
use crate::store::ChatStore;
use crate::AppState;

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::internal(format!("password hashing failed: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::internal(format!("invalid password hash: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < 8 {
        return Err(AppError::new(ErrorCode::PasswordTooWeak, "password must be at least 8 characters"));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AppError::new(ErrorCode::PasswordTooWeak, "password must contain at least one number"));
    }
    if !password.chars().any(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::new(ErrorCode::PasswordTooWeak, "password must contain at least one letter"));
    }
    Ok(())
}

#[derive(Debug, Validate)]
pub struct EmailAddress {
    #[validate(
        email(message = "invalid email format"),
        length(max = 255, message = "email must be at most 255 characters")
    )]
    pub email: String,
}

#[derive(Debug, Validate)]
pub struct Username {
    #[validate(length(min = 1, max = 64, message = "username must be 1 to 64 characters"))]
    pub username: String,
}

pub fn validate_username(username: &str) -> AppResult<()> {
    Username { username: username.to_string() }
        .validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))
}

pub fn validate_email(email: &str) -> AppResult<()> {
    EmailAddress { email: email.to_string() }
        .validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))
}

/// Stores an avatar under `profile_pic/`.
pub async fn store_avatar(state: &AppState, upload: &Upload) -> AppResult<Option<String>> {
    let Some(name) = sanitize_file_name(&upload.file_name) else {
        return Ok(None);
    };
    save_upload(state, "profile_pic", &name, &upload.bytes)
        .await
        .map(Some)
        .map_err(|e| {
            tracing::error!(error = %e, "failed to store avatar");
            AppError::new(ErrorCode::AvatarUploadFailed, "failed to store avatar")
        })
}

#[derive(Debug, Default)]
pub struct SignupInput {
    pub username: String,
    pub email: String,
    pub password: String,
    pub avatar: Option<Upload>,
}

pub async fn signup(state: &AppState, input: SignupInput) -> AppResult<User> {
    let username = input.username.trim().to_string();
    let email = input.email.trim().to_string();
    if username.is_empty() || email.is_empty() || input.password.is_empty() {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            "username, email and password are required",
        ));
    }
    validate_username(&username)?;
    validate_email(&email)?;
    validate_password(&input.password)?;

    if state.store.find_user(&username)?.is_some() {
        return Err(AppError::new(ErrorCode::UsernameTaken, "username already exists"));
    }
    if state.store.find_user_by_email(&email)?.is_some() {
        return Err(AppError::new(ErrorCode::EmailTaken, "email already exists"));
    }

    let password_hash = hash_password(&input.password)?;
    let profile_image = match &input.avatar {
        Some(upload) => store_avatar(state, upload).await?,
        None => None,
    };

    let inserted = state.store.insert_user(NewUser {
        id: Uuid::now_v7(),
        username,
        email,
        password_hash,
        profile_image: profile_image.clone(),
    });
    let user = match inserted {
        Ok(user) => user,
        Err(e) => {
            discard_upload(state, profile_image.as_deref()).await;
            return Err(e);
        }
    };

    tracing::info!(username = %user.username, "user signed up");
    Ok(user)
}

pub fn login(state: &AppState, username: &str, password: &str) -> AppResult<SessionToken> {
    let invalid = || AppError::new(ErrorCode::InvalidCredentials, "invalid username or password");

    let user = state.store.find_user(username.trim())?.ok_or_else(invalid)?;
    if !verify_password(password, &user.password_hash)? {
        return Err(invalid());
    }

    let ttl = state.config.session_ttl_secs;
    let session = state.store.insert_session(NewSession {
        id: Uuid::now_v7(),
        username: user.username.clone(),
        expires_at: Utc::now() + Duration::seconds(ttl),
    })?;

    let token = issue_jwt(&Claims::new(&user.username, session.id, ttl), &state.config.jwt_secret)?;

    tracing::info!(username = %user.username, session_id = %session.id, "user logged in");
    Ok(SessionToken::new(token, user.username, ttl))
}

/// Ends the session: the record is deleted, so the token stops authenticating.
pub fn logout(state: &AppState, session: Session) -> AppResult<Session> {
    let Some(identity) = session.identity() else {
        return Ok(session);
    };
    state.store.delete_session(identity.session_id)?;
    tracing::info!(username = %identity.username, session_id = %identity.session_id, "user logged out");
    Ok(session.logout())
}

/// Live identity for a session id, or `None` once it was deleted or expired.
pub fn resolve_session(store: &dyn ChatStore, session_id: Uuid) -> AppResult<Option<Identity>> {
    Ok(store
        .find_session(session_id)?
        .filter(|s| s.is_live())
        .map(|s| Identity::new(s.username, s.id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{seed_user, stored_files, test_state, PASSWORD};
    use palaver_shared::middleware::validate_jwt;

    fn input(username: &str, email: &str) -> SignupInput {
        SignupInput {
            username: username.into(),
            email: email.into(),
            password: PASSWORD.into(),
            avatar: None,
        }
    }

    #[test]
    fn password_rules() {
        assert!(validate_password("short1").is_err());
        assert!(validate_password("onlyletters").is_err());
        assert!(validate_password("12345678").is_err());
        assert!(validate_password("letters4ever").is_ok());
    }

    #[test]
    fn hash_round_trip() {
        let hash = hash_password(PASSWORD).unwrap();
        assert_ne!(hash, PASSWORD);
        assert!(verify_password(PASSWORD, &hash).unwrap());
        assert!(!verify_password("wrong-password1", &hash).unwrap());
    }

    #[tokio::test]
    async fn signup_rejects_bad_input() {
        let state = test_state().await;

        let err = signup(&state, input("  ", "a@example.com")).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ValidationError));

        let err = signup(&state, input("alice", "not-an-email")).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ValidationError));

        let err = signup(&state, input(&"a".repeat(65), "long@example.com")).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ValidationError));
        let long_email = format!("{}@example.com", "e".repeat(250));
        let err = signup(&state, input("erin", &long_email)).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ValidationError));
        signup(&state, input(&"a".repeat(64), "max@example.com")).await.unwrap();

        signup(&state, input("alice", "alice@example.com")).await.unwrap();
        let err = signup(&state, input("alice", "other@example.com")).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::UsernameTaken));
        let err = signup(&state, input("bob", "alice@example.com")).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::EmailTaken));
    }

    #[tokio::test]
    async fn signup_stores_avatar_under_profile_pic() {
        let state = test_state().await;
        let mut req = input("alice", "alice@example.com");
        req.avatar = Some(Upload { file_name: "me.png".into(), bytes: b"png".to_vec() });

        let user = signup(&state, req).await.unwrap();
        let url = user.profile_image.unwrap();
        assert!(url.starts_with("/uploads/profile_pic/"));
        assert!(url.ends_with("/me.png"));
        assert!(state.storage.resolve_url(&url).unwrap().exists());
    }

    #[tokio::test]
    async fn rejected_signup_keeps_no_avatar() {
        let state = test_state().await;
        seed_user(&state, "alice");
        let mut req = input("alice", "second@example.com");
        req.avatar = Some(Upload { file_name: "me.png".into(), bytes: b"png".to_vec() });

        let err = signup(&state, req).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::UsernameTaken));
        assert_eq!(stored_files(&state), 0);
    }

    #[tokio::test]
    async fn login_then_logout_lifecycle() {
        let state = test_state().await;
        seed_user(&state, "alice");

        let err = login(&state, "alice", "wrong-password1").unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidCredentials));
        let err = login(&state, "nobody", PASSWORD).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidCredentials));

        let token = login(&state, "alice", PASSWORD).unwrap();
        let claims = validate_jwt(&token.access_token, &state.config.jwt_secret).unwrap();
        let identity = resolve_session(state.store.as_ref(), claims.jti).unwrap().unwrap();
        assert_eq!(identity.username, "alice");

        let session = logout(&state, Session::login(identity)).unwrap();
        assert!(!session.is_authenticated());
        assert!(resolve_session(state.store.as_ref(), claims.jti).unwrap().is_none());

        // Logging out an anonymous session is a no-op.
        assert_eq!(logout(&state, Session::Anonymous).unwrap(), Session::Anonymous);
    }

    #[tokio::test]
    async fn expired_sessions_do_not_resolve() {
        let state = test_state().await;
        let session = state
            .store
            .insert_session(NewSession {
                id: Uuid::now_v7(),
                username: "alice".into(),
                expires_at: Utc::now() - Duration::seconds(1),
            })
            .unwrap();
        assert!(resolve_session(state.store.as_ref(), session.id).unwrap().is_none());
    }
}
