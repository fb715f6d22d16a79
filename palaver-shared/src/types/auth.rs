use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of the cookie browsers carry the session token in.
pub const SESSION_COOKIE: &str = "palaver_session";

/// JWT claims. `jti` names the server-side session record; the username
/// in `sub` is only what it was at issue time and is never trusted after.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
}

impl Claims {
    pub fn new(username: impl Into<String>, session_id: Uuid, duration_secs: i64) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: username.into(),
            iat: now,
            exp: now + duration_secs,
            jti: session_id,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }
}

/// The authenticated principal a request acts as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
    pub session_id: Uuid,
}

impl Identity {
    pub fn new(username: impl Into<String>, session_id: Uuid) -> Self {
        Self {
            username: username.into(),
            session_id,
        }
    }
}

/// Per-client session state.
///
/// Anonymous --login--> Authenticated(identity)
/// Authenticated --logout--> Anonymous
/// Authenticated --rename--> Authenticated(identity with the new username)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Session {
    #[default]
    Anonymous,
    Authenticated(Identity),
}

impl Session {
    pub fn login(identity: Identity) -> Self {
        Session::Authenticated(identity)
    }

    pub fn logout(self) -> Self {
        Session::Anonymous
    }

    /// Rebinds the session to a new username. Anonymous sessions stay anonymous.
    pub fn rename(self, new_username: impl Into<String>) -> Self {
        match self {
            Session::Authenticated(identity) => Session::Authenticated(Identity {
                username: new_username.into(),
                session_id: identity.session_id,
            }),
            Session::Anonymous => Session::Anonymous,
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Session::Authenticated(identity) => Some(identity),
            Session::Anonymous => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Session::Authenticated(_))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub username: String,
}

impl SessionToken {
    pub fn new(access_token: String, username: impl Into<String>, expires_in: i64) -> Self {
        Self {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in,
            username: username.into(),
        }
    }
}
