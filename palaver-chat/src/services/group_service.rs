use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use palaver_shared::clients::storage::sanitize_file_name;
use palaver_shared::errors::{AppError, AppResult, ErrorCode};
use palaver_shared::types::auth::Identity;

use super::{discard_upload, non_empty, save_upload, Upload, UserCard};
use crate::models::{GroupChanges, GroupWithMembers, NewGroup, User};
use crate::store::{group_not_found, parse_reference};
use crate::AppState;

/// 12 hex characters. Not checked against existing codes.
pub fn generate_invite_code() -> String {
    let mut bytes = [0u8; 6];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

async fn store_group_image(state: &AppState, upload: &Upload) -> AppResult<Option<String>> {
    let Some(name) = sanitize_file_name(&upload.file_name) else {
        return Ok(None);
    };
    save_upload(state, "groups", &name, &upload.bytes)
        .await
        .map(Some)
        .map_err(|e| {
            tracing::error!(error = %e, "failed to store group image");
            AppError::new(ErrorCode::AvatarUploadFailed, "failed to store group image")
        })
}

#[derive(Debug, Validate)]
struct GroupName {
    #[validate(length(max = 100, message = "group name must be at most 100 characters"))]
    name: String,
}

fn validate_group_name(name: &str) -> AppResult<()> {
    GroupName { name: name.to_string() }
        .validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))
}

fn require_group_id(raw: Option<&str>) -> AppResult<Uuid> {
    let raw = raw
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::new(ErrorCode::ValidationError, "missing group id"))?;
    parse_reference(raw)
}

fn load_owned_group(state: &AppState, group_id: Uuid, caller: &Identity) -> AppResult<GroupWithMembers> {
    let group = state
        .store
        .find_group(group_id)?
        .ok_or_else(|| group_not_found(group_id))?;
    if group.group.created_by != caller.username {
        return Err(AppError::new(ErrorCode::NotGroupCreator, "only the group creator can do this"));
    }
    Ok(group)
}

#[derive(Debug, Default)]
pub struct CreateGroupInput {
    pub name: String,
    pub description: String,
    pub members: Vec<String>,
    pub image: Option<Upload>,
}

pub async fn create_group(state: &AppState, creator: &Identity, input: CreateGroupInput) -> AppResult<GroupWithMembers> {
    let name = input.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::new(ErrorCode::GroupNameRequired, "group name required"));
    }
    validate_group_name(&name)?;

    let mut members = vec![creator.username.clone()];
    for member in input.members.iter().map(|m| m.trim()).filter(|m| !m.is_empty()) {
        if !members.iter().any(|m| m == member) {
            members.push(member.to_string());
        }
    }

    let stored_image = match &input.image {
        Some(upload) => store_group_image(state, upload).await?,
        None => None,
    };
    let image = stored_image
        .clone()
        .unwrap_or_else(|| state.config.default_avatar.clone());

    let inserted = state.store.insert_group(
        NewGroup {
            id: Uuid::now_v7(),
            name,
            description: input.description.trim().to_string(),
            created_by: creator.username.clone(),
            image,
            invite_code: generate_invite_code(),
        },
        &members,
    );
    let group = match inserted {
        Ok(group) => group,
        Err(e) => {
            discard_upload(state, stored_image.as_deref()).await;
            return Err(e);
        }
    };

    tracing::info!(
        group_id = %group.group.id,
        created_by = %creator.username,
        members = group.members.len(),
        "group created"
    );
    Ok(group)
}

#[derive(Debug, Default)]
pub struct UpdateGroupInput {
    pub group_id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub image: Option<Upload>,
}

/// Creator-only metadata edit. Empty fields are left unchanged.
pub async fn update_group(state: &AppState, caller: &Identity, input: UpdateGroupInput) -> AppResult<GroupWithMembers> {
    let group_id = require_group_id(input.group_id.as_deref())?;
    load_owned_group(state, group_id, caller)?;

    let name = non_empty(input.name);
    if let Some(name) = &name {
        validate_group_name(name)?;
    }
    let image = match &input.image {
        Some(upload) => store_group_image(state, upload).await?,
        None => None,
    };
    let changes = GroupChanges {
        name,
        description: non_empty(input.description),
        image,
    };

    let group = match state.store.update_group(group_id, &changes) {
        Ok(group) => group,
        Err(e) => {
            discard_upload(state, changes.image.as_deref()).await;
            return Err(e);
        }
    };
    tracing::info!(group_id = %group_id, caller = %caller.username, "group updated");
    Ok(group)
}

/// Creator-only membership edit. The caller can never be removed.
pub fn update_group_members(
    state: &AppState,
    caller: &Identity,
    raw_group_id: Option<&str>,
    add: &[String],
    remove: &[String],
) -> AppResult<GroupWithMembers> {
    let group_id = require_group_id(raw_group_id)?;
    load_owned_group(state, group_id, caller)?;

    let clean = |names: &[String]| -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(names.len());
        for name in names.iter().map(|n| n.trim()) {
            if !name.is_empty() && name != caller.username && !out.iter().any(|o| o == name) {
                out.push(name.to_string());
            }
        }
        out
    };
    let remove = clean(remove);
    let add = clean(add);

    let group = state.store.apply_member_changes(group_id, &add, &remove)?;
    tracing::info!(
        group_id = %group_id,
        caller = %caller.username,
        added = add.len(),
        removed = remove.len(),
        members = group.members.len(),
        "group members updated"
    );
    Ok(group)
}

#[derive(Debug, Serialize)]
pub struct GroupProfileView {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub image: String,
    pub created_by: String,
    pub invite_code: String,
    pub created_at: DateTime<Utc>,
    pub members: Vec<UserCard>,
    pub can_edit: bool,
}

fn member_cards(state: &AppState, members: &[String], users: &[User]) -> Vec<UserCard> {
    members
        .iter()
        .map(|name| {
            let user = users.iter().find(|u| &u.username == name);
            UserCard::new(name.as_str(), user, &state.config.default_avatar)
        })
        .collect()
}

/// Group summary with member avatars. An unknown or unparseable id is "not found".
pub fn group_profile(state: &AppState, raw_group_id: &str, requester: &Identity) -> AppResult<GroupProfileView> {
    let not_found = || AppError::new(ErrorCode::GroupNotFound, "group not found");
    let group_id = parse_reference(raw_group_id).map_err(|_| not_found())?;
    let GroupWithMembers { group, members } = state.store.find_group(group_id)?.ok_or_else(not_found)?;

    let users = state.store.list_users()?;
    let image = if group.image.is_empty() {
        state.config.default_avatar.clone()
    } else {
        group.image
    };

    Ok(GroupProfileView {
        can_edit: group.created_by == requester.username,
        members: member_cards(state, &members, &users),
        id: group.id,
        name: group.name,
        description: group.description,
        image,
        created_by: group.created_by,
        invite_code: group.invite_code,
        created_at: group.created_at,
    })
}

#[derive(Debug, Serialize)]
pub struct AvailableUsers {
    pub members: Vec<UserCard>,
    pub available: Vec<UserCard>,
}

/// Splits every user into members of the group and everyone else.
pub fn available_users(state: &AppState, raw_group_id: Option<&str>) -> AppResult<AvailableUsers> {
    let group_id = require_group_id(raw_group_id)?;
    let group = state
        .store
        .find_group(group_id)?
        .ok_or_else(|| group_not_found(group_id))?;

    let users = state.store.list_users()?;
    let available = users
        .iter()
        .filter(|u| !group.is_member(&u.username))
        .map(|u| UserCard::new(u.username.as_str(), Some(u), &state.config.default_avatar))
        .collect();

    Ok(AvailableUsers {
        members: member_cards(state, &group.members, &users),
        available,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserChanges;
    use crate::testing::{identity, seed_user, test_state};

    async fn team_a(state: &AppState) -> GroupWithMembers {
        create_group(
            state,
            &identity("alice"),
            CreateGroupInput {
                name: "Team A".into(),
                members: vec!["bob".into()],
                ..Default::default()
            },
        )
        .await
        .unwrap()
    }

    #[test]
    fn invite_codes_are_12_hex_chars() {
        let code = generate_invite_code();
        assert_eq!(code.len(), 12);
        assert!(code.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn create_group_includes_creator() {
        let state = test_state().await;
        let group = team_a(&state).await;

        assert_eq!(group.group.created_by, "alice");
        let mut members = group.members.clone();
        members.sort();
        assert_eq!(members, vec!["alice", "bob"]);
        assert_eq!(group.group.image, state.config.default_avatar);
    }

    #[tokio::test]
    async fn duplicate_selection_collapses() {
        let state = test_state().await;
        let group = create_group(
            &state,
            &identity("alice"),
            CreateGroupInput {
                name: "dupes".into(),
                members: vec!["bob".into(), "alice".into(), "bob".into(), " ".into()],
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(group.members, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn blank_name_is_rejected() {
        let state = test_state().await;
        let input = CreateGroupInput { name: "   ".into(), ..Default::default() };
        let err = create_group(&state, &identity("alice"), input).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::GroupNameRequired));
    }

    #[tokio::test]
    async fn same_named_group_images_get_separate_files() {
        let state = test_state().await;
        let with_image = |name: &str, bytes: &[u8]| CreateGroupInput {
            name: name.into(),
            image: Some(Upload { file_name: "logo.png".into(), bytes: bytes.to_vec() }),
            ..Default::default()
        };
        let first = create_group(&state, &identity("alice"), with_image("pics", b"first")).await.unwrap();
        let second = create_group(&state, &identity("bob"), with_image("more pics", b"second")).await.unwrap();

        assert!(first.group.image.starts_with("/uploads/groups/"));
        assert!(first.group.image.ends_with("/logo.png"));
        assert_ne!(first.group.image, second.group.image);
        let read = |url: &str| std::fs::read(state.storage.resolve_url(url).unwrap()).unwrap();
        assert_eq!(read(&first.group.image), b"first");
        assert_eq!(read(&second.group.image), b"second");
    }

    #[tokio::test]
    async fn overlong_group_name_is_a_validation_error() {
        let state = test_state().await;
        let input = CreateGroupInput { name: "n".repeat(101), ..Default::default() };
        let err = create_group(&state, &identity("alice"), input).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ValidationError));

        let group = team_a(&state).await;
        let input = UpdateGroupInput {
            group_id: Some(group.group.id.to_string()),
            name: Some("n".repeat(101)),
            ..Default::default()
        };
        let err = update_group(&state, &identity("alice"), input).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ValidationError));

        let input = CreateGroupInput { name: "n".repeat(100), ..Default::default() };
        create_group(&state, &identity("alice"), input).await.unwrap();
    }

    #[tokio::test]
    async fn non_creator_cannot_change_members() {
        let state = test_state().await;
        let group = team_a(&state).await;
        let id = group.group.id.to_string();

        let err = update_group_members(&state, &identity("bob"), Some(&id), &[], &["alice".into()]).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::NotGroupCreator));

        let after = state.store.find_group(group.group.id).unwrap().unwrap();
        assert_eq!(after.members, group.members);
    }

    #[tokio::test]
    async fn creator_survives_self_removal() {
        let state = test_state().await;
        let group = team_a(&state).await;
        let id = group.group.id.to_string();

        let updated = update_group_members(
            &state,
            &identity("alice"),
            Some(&id),
            &["carol".into(), "carol".into()],
            &["alice".into(), "bob".into()],
        )
        .unwrap();
        assert_eq!(updated.members, vec!["alice", "carol"]);
    }

    #[tokio::test]
    async fn membership_lookup_errors() {
        let state = test_state().await;
        let alice = identity("alice");

        let err = update_group_members(&state, &alice, None, &[], &[]).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ValidationError));
        let err = update_group_members(&state, &alice, Some("bogus"), &[], &[]).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::MalformedReference));
        let missing = Uuid::now_v7().to_string();
        let err = update_group_members(&state, &alice, Some(&missing), &[], &[]).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::GroupNotFound));
    }

    #[tokio::test]
    async fn update_group_is_creator_only_and_keeps_blank_fields() {
        let state = test_state().await;
        let group = team_a(&state).await;
        let id = Some(group.group.id.to_string());

        let err = update_group(
            &state,
            &identity("bob"),
            UpdateGroupInput { group_id: id.clone(), name: Some("Hijacked".into()), ..Default::default() },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::NotGroupCreator));

        let updated = update_group(
            &state,
            &identity("alice"),
            UpdateGroupInput {
                group_id: id,
                name: Some("".into()),
                description: Some("weekly sync".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.group.name, "Team A");
        assert_eq!(updated.group.description, "weekly sync");
    }

    #[tokio::test]
    async fn profile_view_resolves_avatars_and_edit_flag() {
        let state = test_state().await;
        seed_user(&state, "alice");
        state
            .store
            .update_user("alice", &UserChanges { profile_image: Some("/uploads/profile_pic/a.png".into()), ..Default::default() })
            .unwrap();
        let group = team_a(&state).await;
        let id = group.group.id.to_string();

        let view = group_profile(&state, &id, &identity("alice")).unwrap();
        assert!(view.can_edit);
        let alice = view.members.iter().find(|m| m.username == "alice").unwrap();
        assert_eq!(alice.profile_image, "/uploads/profile_pic/a.png");
        // bob has no user record at all
        let bob = view.members.iter().find(|m| m.username == "bob").unwrap();
        assert_eq!(bob.profile_image, state.config.default_avatar);

        assert!(!group_profile(&state, &id, &identity("bob")).unwrap().can_edit);

        let err = group_profile(&state, "not-an-id", &identity("alice")).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::GroupNotFound));
    }

    #[tokio::test]
    async fn available_users_partitions_everyone() {
        let state = test_state().await;
        for name in ["alice", "bob", "carol", "dave"] {
            seed_user(&state, name);
        }
        let group = team_a(&state).await;

        let split = available_users(&state, Some(&group.group.id.to_string())).unwrap();
        let members: Vec<_> = split.members.iter().map(|c| c.username.as_str()).collect();
        let available: Vec<_> = split.available.iter().map(|c| c.username.as_str()).collect();
        assert_eq!(members, vec!["alice", "bob"]);
        assert_eq!(available, vec!["carol", "dave"]);

        let err = available_users(&state, None).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ValidationError));
    }
}
