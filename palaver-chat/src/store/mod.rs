//! Persistence for users, sessions, groups and messages.
//!
//! Two backends implement [`ChatStore`]: Postgres through diesel, and an
//! in-process map store used for local runs and tests.

mod memory;
mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

use uuid::Uuid;

use palaver_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{
    ChatMessage, GroupChanges, GroupWithMembers, NewChatMessage, NewGroup, NewSession, NewUser,
    SessionRecord, User, UserChanges,
};

pub trait ChatStore: Send + Sync {
    /// Round-trip used by the health check.
    fn ping(&self) -> AppResult<()>;

    // --- users ---

    /// Fails with `UsernameTaken` or `EmailTaken` on a uniqueness clash.
    fn insert_user(&self, user: NewUser) -> AppResult<User>;
    fn find_user(&self, username: &str) -> AppResult<Option<User>>;
    fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>>;
    fn list_users(&self) -> AppResult<Vec<User>>;
    /// Applies `changes` to the user currently named `username`.
    fn update_user(&self, username: &str, changes: &UserChanges) -> AppResult<User>;

    // --- sessions ---

    fn insert_session(&self, session: NewSession) -> AppResult<SessionRecord>;
    fn find_session(&self, id: Uuid) -> AppResult<Option<SessionRecord>>;
    fn delete_session(&self, id: Uuid) -> AppResult<()>;
    /// Points every session of `from` at `to`. Returns how many moved.
    fn rebind_sessions(&self, from: &str, to: &str) -> AppResult<usize>;

    // --- groups ---

    fn insert_group(&self, group: NewGroup, members: &[String]) -> AppResult<GroupWithMembers>;
    fn find_group(&self, id: Uuid) -> AppResult<Option<GroupWithMembers>>;
    fn groups_for_member(&self, username: &str) -> AppResult<Vec<GroupWithMembers>>;
    fn update_group(&self, id: Uuid, changes: &GroupChanges) -> AppResult<GroupWithMembers>;
    /// Removes `remove` then adds `add` as one atomic step. The creator is
    /// never removed, and adding an existing member is a no-op.
    fn apply_member_changes(&self, id: Uuid, add: &[String], remove: &[String]) -> AppResult<GroupWithMembers>;

    // --- messages ---

    fn insert_message(&self, message: NewChatMessage) -> AppResult<ChatMessage>;
    /// Searches direct messages first, then group messages.
    fn find_message(&self, id: Uuid) -> AppResult<Option<ChatMessage>>;
    /// Both directions between `a` and `b`, oldest first.
    fn direct_conversation(&self, a: &str, b: &str) -> AppResult<Vec<ChatMessage>>;
    fn group_conversation(&self, group_id: Uuid) -> AppResult<Vec<ChatMessage>>;
}

/// Parses a client-supplied record reference.
pub fn parse_reference(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::new(ErrorCode::MalformedReference, format!("malformed reference: {raw}")))
}

pub(crate) fn group_not_found(id: Uuid) -> AppError {
    AppError::new(ErrorCode::GroupNotFound, format!("group {id} not found"))
}

pub(crate) fn user_not_found(username: &str) -> AppError {
    AppError::new(ErrorCode::UserNotFound, format!("user {username} not found"))
}
