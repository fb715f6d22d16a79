pub mod auth_service;
pub mod group_service;
pub mod messaging_service;
pub mod profile_service;

use serde::Serialize;
use uuid::Uuid;

use crate::models::User;
use crate::AppState;

/// A file part received in a multipart form.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Username plus the avatar to show for it.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct UserCard {
    pub username: String,
    pub profile_image: String,
}

impl UserCard {
    pub fn new(username: impl Into<String>, user: Option<&User>, default_avatar: &str) -> Self {
        Self {
            username: username.into(),
            profile_image: display_avatar(user, default_avatar),
        }
    }
}

pub fn display_avatar(user: Option<&User>, default_avatar: &str) -> String {
    user.and_then(|u| u.profile_image.as_deref())
        .filter(|image| !image.is_empty())
        .unwrap_or(default_avatar)
        .to_string()
}

/// Trims a form field and drops it when nothing is left.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Writes an already sanitized file under `{area}/{v7 id}/{file_name}` and
/// returns its public URL. Each call gets its own directory, so uploads with
/// the same client name never share a path.
pub(crate) async fn save_upload(state: &AppState, area: &str, file_name: &str, bytes: &[u8]) -> anyhow::Result<String> {
    let relative = format!("{area}/{}/{file_name}", Uuid::now_v7());
    state.storage.save(&relative, bytes).await
}

/// Removes a file written earlier in a request that then failed.
pub(crate) async fn discard_upload(state: &AppState, url: Option<&str>) {
    let Some(url) = url else {
        return;
    };
    if let Err(e) = state.storage.delete_url(url).await {
        tracing::warn!(url = %url, error = %e, "failed to remove orphaned upload");
    }
}
