use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::{group_members, group_messages, groups, messages, sessions, users};

// --- User ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub profile_image: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable, Clone)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub profile_image: Option<String>,
}

#[derive(Debug, AsChangeset, Default, Clone)]
#[diesel(table_name = users)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub profile_image: Option<String>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.email.is_none()
            && self.password_hash.is_none()
            && self.profile_image.is_none()
    }

    pub fn apply(&self, user: &mut User) {
        if let Some(username) = &self.username {
            user.username = username.clone();
        }
        if let Some(email) = &self.email {
            user.email = email.clone();
        }
        if let Some(hash) = &self.password_hash {
            user.password_hash = hash.clone();
        }
        if let Some(image) = &self.profile_image {
            user.profile_image = Some(image.clone());
        }
    }
}

// --- Session ---

#[derive(Debug, Queryable, Identifiable, Clone)]
#[diesel(table_name = sessions)]
pub struct SessionRecord {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_live(&self) -> bool {
        self.expires_at > Utc::now()
    }
}

#[derive(Debug, Insertable, Clone)]
#[diesel(table_name = sessions)]
pub struct NewSession {
    pub id: Uuid,
    pub username: String,
    pub expires_at: DateTime<Utc>,
}

// --- Group ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = groups)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub created_by: String,
    pub image: String,
    pub invite_code: String,
    pub revision: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable, Clone)]
#[diesel(table_name = groups)]
pub struct NewGroup {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub created_by: String,
    pub image: String,
    pub invite_code: String,
}

#[derive(Debug, AsChangeset, Default, Clone)]
#[diesel(table_name = groups)]
pub struct GroupChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
}

impl GroupChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.image.is_none()
    }

    pub fn apply(&self, group: &mut Group) {
        if let Some(name) = &self.name {
            group.name = name.clone();
        }
        if let Some(description) = &self.description {
            group.description = description.clone();
        }
        if let Some(image) = &self.image {
            group.image = image.clone();
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = group_members)]
pub struct NewGroupMember<'a> {
    pub group_id: Uuid,
    pub username: &'a str,
}

/// A group with its member list in join order.
#[derive(Debug, Serialize, Clone)]
pub struct GroupWithMembers {
    #[serde(flatten)]
    pub group: Group,
    pub members: Vec<String>,
}

impl GroupWithMembers {
    pub fn is_member(&self, username: &str) -> bool {
        self.members.iter().any(|m| m == username)
    }
}

// --- Messages ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    File,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::File => "file",
        }
    }
}

impl std::str::FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageKind::Text),
            "image" => Ok(MessageKind::Image),
            "file" => Ok(MessageKind::File),
            _ => Err(format!("unknown message kind: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        (s == "sent").then_some(DeliveryStatus::Sent)
    }
}

/// Which conversation a send or forward targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    User,
    Group,
}

impl std::str::FromStr for ChatType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(ChatType::User),
            "group" => Ok(ChatType::Group),
            _ => Err(format!("unknown chat type: {s}")),
        }
    }
}

/// Direct messages carry `receiver`, group messages carry `group_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MessageTarget {
    #[serde(rename = "receiver")]
    User(String),
    #[serde(rename = "group_id")]
    Group(Uuid),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyRef {
    #[serde(rename = "messageId")]
    pub message_id: Option<Uuid>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub sender: String,
    #[serde(flatten)]
    pub target: MessageTarget,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub message: String,
    pub file_name: String,
    pub file_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<DeliveryStatus>,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "replyTo", skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<ReplyRef>,
}

/// Everything about a message except the id the store assigns.
#[derive(Debug, Clone)]
pub struct NewChatMessage {
    pub sender: String,
    pub target: MessageTarget,
    pub kind: MessageKind,
    pub message: String,
    pub file_name: String,
    pub file_url: String,
    pub status: Option<DeliveryStatus>,
    pub timestamp: DateTime<Utc>,
    pub reply_to: Option<ReplyRef>,
}

impl NewChatMessage {
    pub fn into_message(self, id: Uuid) -> ChatMessage {
        ChatMessage {
            id,
            sender: self.sender,
            target: self.target,
            kind: self.kind,
            message: self.message,
            file_name: self.file_name,
            file_url: self.file_url,
            status: self.status,
            timestamp: self.timestamp,
            reply_to: self.reply_to,
        }
    }
}

#[derive(Debug, Queryable, Identifiable, Clone)]
#[diesel(table_name = messages)]
pub struct DirectMessageRow {
    pub id: Uuid,
    pub sender: String,
    pub receiver: String,
    pub kind: String,
    pub message: String,
    pub file_name: String,
    pub file_url: String,
    pub status: Option<String>,
    pub reply_to_message_id: Option<Uuid>,
    pub reply_to_text: Option<String>,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = messages)]
pub struct NewDirectMessageRow<'a> {
    pub id: Uuid,
    pub sender: &'a str,
    pub receiver: &'a str,
    pub kind: &'a str,
    pub message: &'a str,
    pub file_name: &'a str,
    pub file_url: &'a str,
    pub status: Option<&'a str>,
    pub reply_to_message_id: Option<Uuid>,
    pub reply_to_text: Option<&'a str>,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Queryable, Identifiable, Clone)]
#[diesel(table_name = group_messages)]
pub struct GroupMessageRow {
    pub id: Uuid,
    pub sender: String,
    pub group_id: Uuid,
    pub kind: String,
    pub message: String,
    pub file_name: String,
    pub file_url: String,
    pub status: Option<String>,
    pub reply_to_message_id: Option<Uuid>,
    pub reply_to_text: Option<String>,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = group_messages)]
pub struct NewGroupMessageRow<'a> {
    pub id: Uuid,
    pub sender: &'a str,
    pub group_id: Uuid,
    pub kind: &'a str,
    pub message: &'a str,
    pub file_name: &'a str,
    pub file_url: &'a str,
    pub status: Option<&'a str>,
    pub reply_to_message_id: Option<Uuid>,
    pub reply_to_text: Option<&'a str>,
    pub sent_at: DateTime<Utc>,
}

fn reply_from_columns(message_id: Option<Uuid>, text: Option<String>) -> Option<ReplyRef> {
    text.map(|text| ReplyRef { message_id, text })
}

fn kind_from_column(id: Uuid, kind: &str) -> MessageKind {
    kind.parse().unwrap_or_else(|e| {
        tracing::warn!(message_id = %id, error = %e, "stored message has unknown kind, treating as text");
        MessageKind::Text
    })
}

impl From<DirectMessageRow> for ChatMessage {
    fn from(row: DirectMessageRow) -> Self {
        ChatMessage {
            kind: kind_from_column(row.id, &row.kind),
            status: row.status.as_deref().and_then(DeliveryStatus::parse),
            reply_to: reply_from_columns(row.reply_to_message_id, row.reply_to_text),
            id: row.id,
            sender: row.sender,
            target: MessageTarget::User(row.receiver),
            message: row.message,
            file_name: row.file_name,
            file_url: row.file_url,
            timestamp: row.sent_at,
        }
    }
}

impl From<GroupMessageRow> for ChatMessage {
    fn from(row: GroupMessageRow) -> Self {
        ChatMessage {
            kind: kind_from_column(row.id, &row.kind),
            status: row.status.as_deref().and_then(DeliveryStatus::parse),
            reply_to: reply_from_columns(row.reply_to_message_id, row.reply_to_text),
            id: row.id,
            sender: row.sender,
            target: MessageTarget::Group(row.group_id),
            message: row.message,
            file_name: row.file_name,
            file_url: row.file_url,
            timestamp: row.sent_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(target: MessageTarget) -> ChatMessage {
        NewChatMessage {
            sender: "alice".into(),
            target,
            kind: MessageKind::Image,
            message: "look".into(),
            file_name: "cat.png".into(),
            file_url: "/uploads/cat.png".into(),
            status: Some(DeliveryStatus::Sent),
            timestamp: Utc::now(),
            reply_to: None,
        }
        .into_message(Uuid::now_v7())
    }

    #[test]
    fn direct_message_wire_shape() {
        let json = serde_json::to_value(sample(MessageTarget::User("bob".into()))).unwrap();
        assert_eq!(json["receiver"], "bob");
        assert_eq!(json["type"], "image");
        assert_eq!(json["status"], "sent");
        assert!(json.get("group_id").is_none());
        assert!(json.get("replyTo").is_none());
    }

    #[test]
    fn group_message_with_reply_and_no_status() {
        let group_id = Uuid::now_v7();
        let mut message = sample(MessageTarget::Group(group_id));
        message.status = None;
        message.reply_to = Some(ReplyRef { message_id: None, text: "earlier".into() });

        let json = serde_json::to_value(message).unwrap();
        assert_eq!(json["group_id"], group_id.to_string());
        assert!(json.get("status").is_none());
        assert!(json["replyTo"]["messageId"].is_null());
        assert_eq!(json["replyTo"]["text"], "earlier");
    }

    #[test]
    fn password_hash_never_serialized() {
        let user = User {
            id: Uuid::now_v7(),
            username: "alice".into(),
            email: "a@x.io".into(),
            password_hash: "$argon2id$secret".into(),
            profile_image: None,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2"));
    }

    #[test]
    fn chat_type_parsing() {
        assert_eq!("group".parse::<ChatType>(), Ok(ChatType::Group));
        assert!("channel".parse::<ChatType>().is_err());
    }
}
