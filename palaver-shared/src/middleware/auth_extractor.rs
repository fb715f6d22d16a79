use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::errors::{AppError, AppResult, ErrorCode};
use crate::types::auth::{Claims, Identity, Session, SESSION_COOKIE};

/// Application state able to turn verified claims into a live identity.
#[axum::async_trait]
pub trait SessionResolver: Send + Sync {
    fn jwt_secret(&self) -> &str;

    /// Looks up the session record named by `claims.jti`. `None` means it was revoked.
    async fn resolve_session(&self, claims: &Claims) -> AppResult<Option<Identity>>;
}

/// Who is calling, resolved from the bearer header or the session cookie.
/// Never rejects on its own: anonymous callers are turned away by the
/// access policy of the operation they hit.
#[derive(Debug, Clone)]
pub struct Caller {
    pub session: Session,
    wants_html: bool,
    reason: Option<ErrorCode>,
}

impl Caller {
    pub fn anonymous(wants_html: bool) -> Self {
        Self {
            session: Session::Anonymous,
            wants_html,
            reason: None,
        }
    }

    pub fn authenticated(identity: Identity, wants_html: bool) -> Self {
        Self {
            session: Session::login(identity),
            wants_html,
            reason: None,
        }
    }

    pub fn wants_html(&self) -> bool {
        self.wants_html
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.session.identity()
    }

    /// The rejection an anonymous caller gets: a redirect for browsers, a 401 otherwise.
    pub fn login_required(&self) -> AppError {
        if self.wants_html {
            return AppError::LoginRequired;
        }
        match self.reason {
            Some(ErrorCode::TokenExpired) => AppError::new(ErrorCode::TokenExpired, "token has expired"),
            Some(ErrorCode::SessionRevoked) => AppError::new(ErrorCode::SessionRevoked, "session is no longer active"),
            Some(ErrorCode::TokenInvalid) => AppError::new(ErrorCode::TokenInvalid, "invalid token"),
            _ => AppError::unauthorized("authentication required"),
        }
    }

    pub fn require_identity(&self) -> AppResult<&Identity> {
        self.identity().ok_or_else(|| self.login_required())
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<Arc<S>> for Caller
where
    S: SessionResolver + 'static,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<S>) -> Result<Self, Self::Rejection> {
        let wants_html = wants_html(&parts.headers);
        let Some(token) = extract_session_token(&parts.headers) else {
            return Ok(Caller::anonymous(wants_html));
        };

        let claims = match validate_jwt(&token, state.jwt_secret()) {
            Ok(claims) if !claims.is_expired() => claims,
            Ok(_) => return Ok(Caller::rejected(wants_html, ErrorCode::TokenExpired)),
            Err(err) => {
                tracing::debug!(error = %err, "discarding unusable session token");
                return Ok(Caller::rejected(wants_html, err.code().unwrap_or(ErrorCode::TokenInvalid)));
            }
        };

        match state.resolve_session(&claims).await? {
            Some(identity) => Ok(Caller::authenticated(identity, wants_html)),
            None => Ok(Caller::rejected(wants_html, ErrorCode::SessionRevoked)),
        }
    }
}

impl Caller {
    fn rejected(wants_html: bool, reason: ErrorCode) -> Self {
        Self {
            session: Session::Anonymous,
            wants_html,
            reason: Some(reason),
        }
    }
}

/// Bearer header first, then the session cookie.
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            return Some(token.trim().to_string());
        }
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
        })
}

/// True when the client prefers an HTML page over JSON.
pub fn wants_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains("text/html"))
        .unwrap_or(false)
}

pub fn issue_jwt(claims: &Claims, secret: &str) -> AppResult<String> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::internal(format!("failed to sign token: {e}")))
}

pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            AppError::new(ErrorCode::TokenExpired, "token has expired")
        }
        _ => AppError::new(ErrorCode::TokenInvalid, format!("invalid token: {e}")),
    })?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use uuid::Uuid;

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(header::COOKIE, HeaderValue::from_static("palaver_session=xyz"));
        assert_eq!(extract_session_token(&headers).as_deref(), Some("abc"));
    }

    #[test]
    fn cookie_is_found_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; palaver_session=xyz; lang=fr"));
        assert_eq!(extract_session_token(&headers).as_deref(), Some("xyz"));

        let mut empty = HeaderMap::new();
        empty.insert(header::COOKIE, HeaderValue::from_static("palaver_session="));
        assert_eq!(extract_session_token(&empty), None);
    }

    #[test]
    fn html_detection() {
        let mut headers = HeaderMap::new();
        assert!(!wants_html(&headers));
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/html,application/xhtml+xml"));
        assert!(wants_html(&headers));
    }

    #[test]
    fn jwt_round_trip_and_wrong_secret() {
        let session_id = Uuid::now_v7();
        let token = issue_jwt(&Claims::new("alice", session_id, 60), "s3cret").unwrap();

        let claims = validate_jwt(&token, "s3cret").unwrap();
        assert_eq!(claims.jti, session_id);

        let err = validate_jwt(&token, "other").unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::TokenInvalid));
    }

    #[test]
    fn anonymous_rejection_depends_on_client() {
        assert!(matches!(Caller::anonymous(true).login_required(), AppError::LoginRequired));
        let api = Caller::rejected(false, ErrorCode::SessionRevoked).login_required();
        assert_eq!(api.code(), Some(ErrorCode::SessionRevoked));
    }
}
