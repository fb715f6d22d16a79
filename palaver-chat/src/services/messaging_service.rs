use chrono::{Duration, Utc};
use uuid::Uuid;

use palaver_shared::clients::storage::{file_extension, sanitize_file_name};
use palaver_shared::errors::{AppError, AppResult, ErrorCode};
use palaver_shared::types::auth::Identity;

use super::auth_service::validate_username;
use super::{discard_upload, save_upload, Upload};
use crate::models::{
    ChatMessage, ChatType, DeliveryStatus, MessageKind, MessageTarget, NewChatMessage, ReplyRef,
};
use crate::store::{group_not_found, parse_reference};
use crate::AppState;

pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "pdf", "docx", "txt", "zip"];
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

/// Message kind for an attachment name, or `None` when the extension is not allowed.
pub fn classify_attachment(file_name: &str) -> Option<MessageKind> {
    let ext = file_extension(file_name)?;
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return None;
    }
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(MessageKind::Image)
    } else {
        Some(MessageKind::File)
    }
}

pub fn parse_chat_type(raw: &str) -> AppResult<ChatType> {
    raw.trim()
        .parse()
        .map_err(|e: String| AppError::new(ErrorCode::InvalidChatType, e))
}

/// Resolves a raw target into a username or a group reference. Group
/// existence is not checked here.
pub fn resolve_target(chat_type: ChatType, raw: &str) -> AppResult<MessageTarget> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AppError::new(ErrorCode::ValidationError, "a message target is required"));
    }
    match chat_type {
        ChatType::User => {
            validate_username(raw)?;
            Ok(MessageTarget::User(raw.to_string()))
        }
        ChatType::Group => Ok(MessageTarget::Group(parse_reference(raw)?)),
    }
}

/// A reply needs both an id and a snapshot text. An id that does not parse
/// is kept as a null reference.
pub fn reply_reference(message_id: Option<&str>, text: Option<&str>) -> Option<ReplyRef> {
    let message_id = message_id.filter(|id| !id.is_empty())?;
    let text = text.filter(|t| !t.is_empty())?;
    Some(ReplyRef {
        message_id: Uuid::parse_str(message_id.trim()).ok(),
        text: text.to_string(),
    })
}

#[derive(Debug, Default)]
pub struct SendMessageInput {
    pub chat_type: String,
    pub target: String,
    pub body: String,
    pub file: Option<Upload>,
    pub reply_message_id: Option<String>,
    pub reply_message_text: Option<String>,
}

struct Attachment {
    kind: MessageKind,
    file_name: String,
    file_url: String,
}

/// Stores an attachment under `messages/`. The sanitized name is the one
/// displayed, classified and written.
async fn store_attachment(state: &AppState, upload: &Upload) -> AppResult<Option<Attachment>> {
    let Some(file_name) = sanitize_file_name(&upload.file_name) else {
        tracing::debug!(file_name = %upload.file_name, "dropping attachment with unusable name");
        return Ok(None);
    };
    let Some(kind) = classify_attachment(&file_name) else {
        tracing::debug!(file_name = %file_name, "dropping attachment with disallowed extension");
        return Ok(None);
    };

    let file_url = save_upload(state, "messages", &file_name, &upload.bytes)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to store attachment");
            AppError::new(ErrorCode::AttachmentUploadFailed, "failed to store attachment")
        })?;

    Ok(Some(Attachment { kind, file_name, file_url }))
}

pub async fn send_message(state: &AppState, sender: &Identity, input: SendMessageInput) -> AppResult<ChatMessage> {
    let chat_type = parse_chat_type(&input.chat_type)?;
    let target = resolve_target(chat_type, &input.target)?;

    let attachment = match input.file.as_ref().filter(|f| !f.file_name.is_empty()) {
        Some(upload) => store_attachment(state, upload).await?,
        None => None,
    };
    let reply_to = reply_reference(input.reply_message_id.as_deref(), input.reply_message_text.as_deref());

    let (kind, file_name, file_url) = match attachment {
        Some(a) => (a.kind, a.file_name, a.file_url),
        None => (MessageKind::Text, String::new(), String::new()),
    };

    let inserted = state.store.insert_message(NewChatMessage {
        sender: sender.username.clone(),
        target,
        kind,
        message: input.body,
        file_name,
        file_url: file_url.clone(),
        status: Some(DeliveryStatus::Sent),
        timestamp: Utc::now(),
        reply_to,
    });
    let message = match inserted {
        Ok(message) => message,
        Err(e) => {
            discard_upload(state, Some(file_url.as_str()).filter(|url| !url.is_empty())).await;
            return Err(e);
        }
    };

    tracing::info!(
        sender = %message.sender,
        message_id = %message.id,
        kind = message.kind.as_str(),
        "message sent"
    );
    Ok(message)
}

/// Copies another message's content to a new target as the caller.
pub fn forward_message(
    state: &AppState,
    caller: &Identity,
    raw_message_id: &str,
    raw_target: &str,
    raw_chat_type: &str,
) -> AppResult<ChatMessage> {
    let message_id = parse_reference(raw_message_id)?;
    let source = state
        .store
        .find_message(message_id)?
        .ok_or_else(|| AppError::new(ErrorCode::MessageNotFound, "message not found"))?;

    let chat_type = parse_chat_type(raw_chat_type)?;
    let target = resolve_target(chat_type, raw_target)?;

    // Stored timestamps have microsecond precision; stay strictly after the source.
    let timestamp = Utc::now().max(source.timestamp + Duration::microseconds(1));

    let forwarded = state.store.insert_message(NewChatMessage {
        sender: caller.username.clone(),
        target,
        kind: source.kind,
        message: source.message,
        file_name: source.file_name,
        file_url: source.file_url,
        status: None,
        timestamp,
        reply_to: None,
    })?;

    tracing::info!(
        sender = %forwarded.sender,
        source_id = %message_id,
        message_id = %forwarded.id,
        "message forwarded"
    );
    Ok(forwarded)
}

/// Direct messages between the caller and `other`, both directions, oldest first.
pub fn direct_conversation(state: &AppState, caller: &Identity, other: &str) -> AppResult<Vec<ChatMessage>> {
    state.store.direct_conversation(&caller.username, other)
}

pub fn group_conversation(state: &AppState, raw_group_id: &str) -> AppResult<Vec<ChatMessage>> {
    let group_id = parse_reference(raw_group_id)?;
    if state.store.find_group(group_id)?.is_none() {
        return Err(group_not_found(group_id));
    }
    state.store.group_conversation(group_id)
}
