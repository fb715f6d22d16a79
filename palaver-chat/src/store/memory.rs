use std::sync::Mutex;

use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use palaver_shared::errors::{AppError, AppResult, ErrorCode};

use super::{group_not_found, user_not_found, ChatStore};
use crate::models::{
    ChatMessage, Group, GroupChanges, GroupWithMembers, MessageTarget, NewChatMessage, NewGroup,
    NewSession, NewUser, SessionRecord, User, UserChanges,
};

/// Process-local store. Group membership edits run under the group's map
/// entry lock; user writes are serialized so uniqueness checks hold.
#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<Uuid, User>,
    user_writes: Mutex<()>,
    sessions: DashMap<Uuid, SessionRecord>,
    groups: DashMap<Uuid, GroupWithMembers>,
    direct_messages: DashMap<Uuid, ChatMessage>,
    group_messages: DashMap<Uuid, ChatMessage>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_user_writes(&self) -> AppResult<std::sync::MutexGuard<'_, ()>> {
        self.user_writes
            .lock()
            .map_err(|_| AppError::internal("user write lock poisoned"))
    }

    fn taken(&self, field: &str, value: &str, except: Option<Uuid>) -> bool {
        self.users.iter().any(|u| {
            Some(u.id) != except
                && match field {
                    "username" => u.username == value,
                    _ => u.email == value,
                }
        })
    }
}

fn sorted(mut messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
    messages
}

impl ChatStore for MemoryStore {
    fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    fn insert_user(&self, user: NewUser) -> AppResult<User> {
        let _guard = self.lock_user_writes()?;
        if self.taken("username", &user.username, None) {
            return Err(AppError::new(ErrorCode::UsernameTaken, "username already exists"));
        }
        if self.taken("email", &user.email, None) {
            return Err(AppError::new(ErrorCode::EmailTaken, "email already exists"));
        }

        let stored = User {
            id: user.id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            profile_image: user.profile_image,
            created_at: Utc::now(),
        };
        self.users.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn find_user(&self, username: &str) -> AppResult<Option<User>> {
        Ok(self.users.iter().find(|u| u.username == username).map(|u| u.clone()))
    }

    fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Ok(self.users.iter().find(|u| u.email == email).map(|u| u.clone()))
    }

    fn list_users(&self) -> AppResult<Vec<User>> {
        let mut users: Vec<User> = self.users.iter().map(|u| u.clone()).collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    fn update_user(&self, username: &str, changes: &UserChanges) -> AppResult<User> {
        let _guard = self.lock_user_writes()?;
        let id = self
            .users
            .iter()
            .find(|u| u.username == username)
            .map(|u| u.id)
            .ok_or_else(|| user_not_found(username))?;

        if let Some(new_name) = &changes.username {
            if self.taken("username", new_name, Some(id)) {
                return Err(AppError::new(ErrorCode::UsernameTaken, "username already exists"));
            }
        }
        if let Some(new_email) = &changes.email {
            if self.taken("email", new_email, Some(id)) {
                return Err(AppError::new(ErrorCode::EmailTaken, "email already exists"));
            }
        }

        let mut entry = self.users.get_mut(&id).ok_or_else(|| user_not_found(username))?;
        changes.apply(&mut entry);
        Ok(entry.clone())
    }

    fn insert_session(&self, session: NewSession) -> AppResult<SessionRecord> {
        let record = SessionRecord {
            id: session.id,
            username: session.username,
            created_at: Utc::now(),
            expires_at: session.expires_at,
        };
        self.sessions.insert(record.id, record.clone());
        Ok(record)
    }

    fn find_session(&self, id: Uuid) -> AppResult<Option<SessionRecord>> {
        Ok(self.sessions.get(&id).map(|s| s.clone()))
    }

    fn delete_session(&self, id: Uuid) -> AppResult<()> {
        self.sessions.remove(&id);
        Ok(())
    }

    fn rebind_sessions(&self, from: &str, to: &str) -> AppResult<usize> {
        let mut moved = 0;
        for mut session in self.sessions.iter_mut() {
            if session.username == from {
                session.username = to.to_string();
                moved += 1;
            }
        }
        Ok(moved)
    }

    fn insert_group(&self, group: NewGroup, members: &[String]) -> AppResult<GroupWithMembers> {
        let mut unique: Vec<String> = Vec::with_capacity(members.len());
        for member in members {
            if !unique.contains(member) {
                unique.push(member.clone());
            }
        }

        let stored = GroupWithMembers {
            group: Group {
                id: group.id,
                name: group.name,
                description: group.description,
                created_by: group.created_by,
                image: group.image,
                invite_code: group.invite_code,
                revision: 0,
                created_at: Utc::now(),
            },
            members: unique,
        };
        self.groups.insert(stored.group.id, stored.clone());
        Ok(stored)
    }

    fn find_group(&self, id: Uuid) -> AppResult<Option<GroupWithMembers>> {
        Ok(self.groups.get(&id).map(|g| g.clone()))
    }

    fn groups_for_member(&self, username: &str) -> AppResult<Vec<GroupWithMembers>> {
        let mut groups: Vec<GroupWithMembers> = self
            .groups
            .iter()
            .filter(|g| g.is_member(username))
            .map(|g| g.clone())
            .collect();
        groups.sort_by(|a, b| a.group.created_at.cmp(&b.group.created_at));
        Ok(groups)
    }

    fn update_group(&self, id: Uuid, changes: &GroupChanges) -> AppResult<GroupWithMembers> {
        let mut entry = self.groups.get_mut(&id).ok_or_else(|| group_not_found(id))?;
        if !changes.is_empty() {
            changes.apply(&mut entry.group);
            entry.group.revision += 1;
        }
        Ok(entry.clone())
    }

    fn apply_member_changes(&self, id: Uuid, add: &[String], remove: &[String]) -> AppResult<GroupWithMembers> {
        let mut entry = self.groups.get_mut(&id).ok_or_else(|| group_not_found(id))?;
        let creator = entry.group.created_by.clone();

        entry
            .members
            .retain(|m| *m == creator || !remove.contains(m));
        for username in add {
            if !entry.members.contains(username) {
                entry.members.push(username.clone());
            }
        }
        entry.group.revision += 1;
        Ok(entry.clone())
    }

    fn insert_message(&self, message: NewChatMessage) -> AppResult<ChatMessage> {
        let stored = message.into_message(Uuid::now_v7());
        match stored.target {
            MessageTarget::User(_) => self.direct_messages.insert(stored.id, stored.clone()),
            MessageTarget::Group(_) => self.group_messages.insert(stored.id, stored.clone()),
        };
        Ok(stored)
    }

    fn find_message(&self, id: Uuid) -> AppResult<Option<ChatMessage>> {
        if let Some(found) = self.direct_messages.get(&id) {
            return Ok(Some(found.clone()));
        }
        Ok(self.group_messages.get(&id).map(|m| m.clone()))
    }

    fn direct_conversation(&self, a: &str, b: &str) -> AppResult<Vec<ChatMessage>> {
        let messages = self
            .direct_messages
            .iter()
            .filter(|m| match &m.target {
                MessageTarget::User(receiver) => {
                    (m.sender == a && receiver == b) || (m.sender == b && receiver == a)
                }
                MessageTarget::Group(_) => false,
            })
            .map(|m| m.clone())
            .collect();
        Ok(sorted(messages))
    }

    fn group_conversation(&self, group_id: Uuid) -> AppResult<Vec<ChatMessage>> {
        let messages = self
            .group_messages
            .iter()
            .filter(|m| m.target == MessageTarget::Group(group_id))
            .map(|m| m.clone())
            .collect();
        Ok(sorted(messages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeliveryStatus, MessageKind};
    use std::sync::Arc;

    fn new_user(name: &str) -> NewUser {
        NewUser {
            id: Uuid::now_v7(),
            username: name.into(),
            email: format!("{name}@example.com"),
            password_hash: "hash".into(),
            profile_image: None,
        }
    }

    fn new_group(creator: &str) -> NewGroup {
        NewGroup {
            id: Uuid::now_v7(),
            name: "team".into(),
            description: String::new(),
            created_by: creator.into(),
            image: "/static/default_profile.png".into(),
            invite_code: "a1b2c3d4e5f6".into(),
        }
    }

    fn text(sender: &str, target: MessageTarget, body: &str) -> NewChatMessage {
        NewChatMessage {
            sender: sender.into(),
            target,
            kind: MessageKind::Text,
            message: body.into(),
            file_name: String::new(),
            file_url: String::new(),
            status: Some(DeliveryStatus::Sent),
            timestamp: Utc::now(),
            reply_to: None,
        }
    }

    #[test]
    fn usernames_and_emails_are_unique() {
        let store = MemoryStore::new();
        store.insert_user(new_user("alice")).unwrap();

        let err = store.insert_user(new_user("alice")).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::UsernameTaken));

        let mut clash = new_user("alicia");
        clash.email = "alice@example.com".into();
        let err = store.insert_user(clash).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::EmailTaken));
    }

    #[test]
    fn rename_onto_existing_user_conflicts() {
        let store = MemoryStore::new();
        store.insert_user(new_user("alice")).unwrap();
        store.insert_user(new_user("bob")).unwrap();

        let changes = UserChanges { username: Some("bob".into()), ..Default::default() };
        let err = store.update_user("alice", &changes).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::UsernameTaken));
        assert!(store.find_user("alice").unwrap().is_some());
    }

    #[test]
    fn membership_changes_keep_creator_and_deduplicate() {
        let store = MemoryStore::new();
        let group = store
            .insert_group(new_group("alice"), &["bob".into(), "alice".into(), "bob".into()])
            .unwrap();
        assert_eq!(group.members, vec!["bob", "alice"]);

        let updated = store
            .apply_member_changes(group.group.id, &["carol".into(), "bob".into()], &["alice".into(), "bob".into()])
            .unwrap();
        assert!(updated.is_member("alice"));
        assert!(updated.is_member("bob"));
        assert!(updated.is_member("carol"));
        assert_eq!(updated.members.len(), 3);
        assert_eq!(updated.group.revision, 1);
    }

    #[test]
    fn unknown_group_edits_fail() {
        let store = MemoryStore::new();
        let err = store.apply_member_changes(Uuid::now_v7(), &[], &[]).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::GroupNotFound));
    }

    #[test]
    fn concurrent_member_additions_all_land() {
        let store = Arc::new(MemoryStore::new());
        let id = store.insert_group(new_group("alice"), &["alice".into()]).unwrap().group.id;

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store.apply_member_changes(id, &[format!("user{i}")], &[]).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let group = store.find_group(id).unwrap().unwrap();
        assert_eq!(group.members.len(), 9);
        assert_eq!(group.group.revision, 8);
    }

    #[test]
    fn direct_conversation_is_symmetric_and_ordered() {
        let store = MemoryStore::new();
        let first = store.insert_message(text("alice", MessageTarget::User("bob".into()), "hi")).unwrap();
        let second = store.insert_message(text("bob", MessageTarget::User("alice".into()), "hey")).unwrap();
        store.insert_message(text("alice", MessageTarget::User("carol".into()), "other")).unwrap();

        let ab = store.direct_conversation("alice", "bob").unwrap();
        let ba = store.direct_conversation("bob", "alice").unwrap();
        assert_eq!(ab.iter().map(|m| m.id).collect::<Vec<_>>(), vec![first.id, second.id]);
        assert_eq!(ba.iter().map(|m| m.id).collect::<Vec<_>>(), vec![first.id, second.id]);
    }

    #[test]
    fn find_message_searches_both_collections() {
        let store = MemoryStore::new();
        let group_id = Uuid::now_v7();
        let direct = store.insert_message(text("alice", MessageTarget::User("bob".into()), "dm")).unwrap();
        let grouped = store.insert_message(text("alice", MessageTarget::Group(group_id), "all")).unwrap();

        assert_eq!(store.find_message(direct.id).unwrap().unwrap().message, "dm");
        assert_eq!(store.find_message(grouped.id).unwrap().unwrap().message, "all");
        assert!(store.find_message(Uuid::now_v7()).unwrap().is_none());
        assert_eq!(store.group_conversation(group_id).unwrap().len(), 1);
    }

    #[test]
    fn sessions_follow_renames() {
        let store = MemoryStore::new();
        let session = store
            .insert_session(NewSession {
                id: Uuid::now_v7(),
                username: "alice".into(),
                expires_at: Utc::now() + chrono::Duration::hours(1),
            })
            .unwrap();

        assert_eq!(store.rebind_sessions("alice", "alicia").unwrap(), 1);
        assert_eq!(store.find_session(session.id).unwrap().unwrap().username, "alicia");

        store.delete_session(session.id).unwrap();
        assert!(store.find_session(session.id).unwrap().is_none());
    }
}
