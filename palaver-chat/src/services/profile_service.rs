use serde::{Deserialize, Serialize};
use uuid::Uuid;

use palaver_shared::errors::{AppError, AppResult, ErrorCode};
use palaver_shared::types::auth::{Identity, Session};

use super::auth_service::{hash_password, store_avatar, validate_email, validate_password, validate_username};
use super::{discard_upload, display_avatar, non_empty, Upload, UserCard};
use crate::models::{ChatMessage, GroupWithMembers, User, UserChanges};
use crate::store::{group_not_found, parse_reference, user_not_found};
use crate::AppState;

/// Public projection of a user. Never carries the credential.
#[derive(Debug, Serialize, Clone)]
pub struct UserProfileView {
    pub username: String,
    pub email: String,
    pub profile_image: String,
}

impl UserProfileView {
    pub fn from_user(user: &User, default_avatar: &str) -> Self {
        Self {
            username: user.username.clone(),
            email: user.email.clone(),
            profile_image: display_avatar(Some(user), default_avatar),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GroupSummary {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub image: String,
    pub members: Vec<String>,
}

pub fn view_user_profile(state: &AppState, username: &str) -> AppResult<UserProfileView> {
    let user = state
        .store
        .find_user(username)?
        .ok_or_else(|| user_not_found(username))?;
    Ok(UserProfileView::from_user(&user, &state.config.default_avatar))
}

pub fn view_group_profile(state: &AppState, raw_group_id: &str) -> AppResult<GroupSummary> {
    let group_id = parse_reference(raw_group_id)?;
    let GroupWithMembers { group, members } = state
        .store
        .find_group(group_id)?
        .ok_or_else(|| group_not_found(group_id))?;
    Ok(GroupSummary {
        id: group.id,
        name: group.name,
        description: group.description,
        image: group.image,
        members,
    })
}

#[derive(Debug, Default)]
pub struct UpdateProfileInput {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub avatar: Option<Upload>,
}

#[derive(Debug)]
pub struct ProfileUpdate {
    pub profile: UserProfileView,
    /// The caller's identity after the update; differs only on rename.
    pub identity: Identity,
}

/// Applies whichever fields are present. A rename moves every session of
/// the caller to the new name.
pub async fn update_own_profile(state: &AppState, caller: &Identity, input: UpdateProfileInput) -> AppResult<ProfileUpdate> {
    let current = state
        .store
        .find_user(&caller.username)?
        .ok_or_else(|| user_not_found(&caller.username))?;

    let username = non_empty(input.username).filter(|u| *u != current.username);
    if let Some(username) = &username {
        validate_username(username)?;
    }
    let email = non_empty(input.email).filter(|e| *e != current.email);
    if let Some(email) = &email {
        validate_email(email)?;
    }
    let password_hash = match input.password.filter(|p| !p.is_empty()) {
        Some(password) => {
            validate_password(&password)?;
            Some(hash_password(&password)?)
        }
        None => None,
    };
    let profile_image = match input.avatar.as_ref().filter(|a| !a.file_name.is_empty()) {
        Some(upload) => store_avatar(state, upload).await?,
        None => None,
    };

    let changes = UserChanges { username, email, password_hash, profile_image };
    if changes.is_empty() {
        return Ok(ProfileUpdate {
            profile: UserProfileView::from_user(&current, &state.config.default_avatar),
            identity: caller.clone(),
        });
    }

    let updated = match state.store.update_user(&current.username, &changes) {
        Ok(updated) => updated,
        Err(e) => {
            discard_upload(state, changes.profile_image.as_deref()).await;
            return Err(e);
        }
    };

    if let (Some(_), Some(old)) = (&changes.profile_image, &current.profile_image) {
        match state.storage.delete_url(old).await {
            Ok(removed) => tracing::debug!(old = %old, removed, "previous avatar cleanup"),
            Err(e) => tracing::warn!(old = %old, error = %e, "failed to delete previous avatar"),
        }
    }

    let mut session = Session::login(caller.clone());
    if let Some(new_name) = &changes.username {
        let moved = state.store.rebind_sessions(&current.username, new_name)?;
        tracing::info!(from = %current.username, to = %new_name, sessions = moved, "user renamed");
        session = session.rename(new_name.as_str());
    }
    let identity = session
        .identity()
        .cloned()
        .ok_or_else(|| AppError::internal("session lost during profile update"))?;

    tracing::info!(username = %updated.username, "profile updated");
    Ok(ProfileUpdate {
        profile: UserProfileView::from_user(&updated, &state.config.default_avatar),
        identity,
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatSelection {
    pub user: Option<String>,
    pub group: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatOverview {
    pub me: UserProfileView,
    pub users: Vec<UserCard>,
    pub groups: Vec<GroupWithMembers>,
    pub selected_user: Option<String>,
    pub selected_group: Option<GroupWithMembers>,
    pub messages: Vec<ChatMessage>,
}

/// Everything the chat page needs: other users, the caller's groups and the
/// selected conversation, if any.
pub fn chat_overview(state: &AppState, caller: &Identity, selection: ChatSelection) -> AppResult<ChatOverview> {
    let default_avatar = &state.config.default_avatar;
    let users = state.store.list_users()?;

    let me = match users.iter().find(|u| u.username == caller.username) {
        Some(user) => UserProfileView::from_user(user, default_avatar),
        None => return Err(user_not_found(&caller.username)),
    };
    let others = users
        .iter()
        .filter(|u| u.username != caller.username)
        .map(|u| UserCard::new(u.username.as_str(), Some(u), default_avatar))
        .collect();
    let groups = state.store.groups_for_member(&caller.username)?;

    let selected_user = non_empty(selection.user);
    let (selected_group, messages) = match (&selected_user, non_empty(selection.group)) {
        (Some(other), _) => (None, state.store.direct_conversation(&caller.username, other)?),
        (None, Some(raw)) => {
            let group_id = parse_reference(&raw)?;
            (state.store.find_group(group_id)?, state.store.group_conversation(group_id)?)
        }
        (None, None) => (None, Vec::new()),
    };

    Ok(ChatOverview {
        me,
        users: others,
        groups,
        selected_user,
        selected_group,
        messages,
    })
}
