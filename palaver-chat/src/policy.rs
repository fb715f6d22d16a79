//! Declarative access policy. Every handler asks [`authorize`] before doing work.

use palaver_shared::errors::AppResult;
use palaver_shared::middleware::Caller;
use palaver_shared::types::auth::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Signup,
    Login,
    Logout,
    Health,
    Metrics,
    FetchUpload,
    ChatOverview,
    DirectConversation,
    GroupConversation,
    SendMessage,
    ForwardMessage,
    CreateGroup,
    UpdateGroup,
    UpdateGroupMembers,
    GroupProfile,
    GroupSummary,
    AvailableUsers,
    UserProfile,
    UpdateProfile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated,
}

pub const ACCESS_POLICY: &[(Operation, Access)] = &[
    (Operation::Signup, Access::Public),
    (Operation::Login, Access::Public),
    (Operation::Health, Access::Public),
    (Operation::Metrics, Access::Public),
    (Operation::FetchUpload, Access::Public),
    (Operation::Logout, Access::Authenticated),
    (Operation::ChatOverview, Access::Authenticated),
    (Operation::DirectConversation, Access::Authenticated),
    (Operation::GroupConversation, Access::Authenticated),
    (Operation::SendMessage, Access::Authenticated),
    (Operation::ForwardMessage, Access::Authenticated),
    (Operation::CreateGroup, Access::Authenticated),
    (Operation::UpdateGroup, Access::Authenticated),
    (Operation::UpdateGroupMembers, Access::Authenticated),
    (Operation::GroupProfile, Access::Authenticated),
    (Operation::GroupSummary, Access::Authenticated),
    (Operation::AvailableUsers, Access::Authenticated),
    (Operation::UserProfile, Access::Authenticated),
    (Operation::UpdateProfile, Access::Authenticated),
];

/// Operations missing from the table require authentication.
pub fn access_for(op: Operation) -> Access {
    ACCESS_POLICY
        .iter()
        .find(|(entry, _)| *entry == op)
        .map(|(_, access)| *access)
        .unwrap_or(Access::Authenticated)
}

/// Checks `op` against the table. Returns the caller's identity when one is
/// attached; public operations may proceed without it.
pub fn authorize(op: Operation, caller: &Caller) -> AppResult<Option<&Identity>> {
    match access_for(op) {
        Access::Public => Ok(caller.identity()),
        Access::Authenticated => caller.require_identity().map(Some),
    }
}

/// Like [`authorize`] for operations that always act as someone.
pub fn require(op: Operation, caller: &Caller) -> AppResult<Identity> {
    match authorize(op, caller)? {
        Some(identity) => Ok(identity.clone()),
        None => Err(caller.login_required()),
    }
}
