//! Builders for the wire `Content` payloads the client originates, plus the
//! policy helpers that classify a payload for transport (urgency, sealed
//! sender content hint, user-visible timestamp).

use chrono::Utc;
use uuid::Uuid;

use crate::crypto::ContentHint;
use crate::proto::{
    Content, DataMessage, ReceiptMessage, SyncMessage, TypingMessage, data_message,
    receipt_message, typing_message,
};

pub fn typing_message(is_typing: bool) -> Content {
    let action = if is_typing {
        typing_message::Action::Started
    } else {
        typing_message::Action::Stopped
    };
    Content {
        typing_message: Some(TypingMessage {
            timestamp: Some(current_message_timestamp()),
            action: Some(action as i32),
            group_id: None,
        }),
        ..Default::default()
    }
}

pub fn delivered_receipt_for_timestamps(timestamps: Vec<u64>) -> Content {
    receipt_for_timestamps(receipt_message::Type::Delivery, timestamps)
}

pub fn read_receipt_for_timestamps(timestamps: Vec<u64>) -> Content {
    receipt_for_timestamps(receipt_message::Type::Read, timestamps)
}

fn receipt_for_timestamps(r#type: receipt_message::Type, timestamps: Vec<u64>) -> Content {
    Content {
        receipt_message: Some(ReceiptMessage {
            r#type: Some(r#type as i32),
            timestamp: timestamps,
        }),
        ..Default::default()
    }
}

pub fn reaction_data_message(
    emoji: &str,
    target_author: Uuid,
    target_sent_timestamp: u64,
    remove: bool,
) -> Content {
    wrap_data_message(DataMessage {
        timestamp: Some(current_message_timestamp()),
        required_protocol_version: Some(data_message::ProtocolVersion::Reactions as u32),
        reaction: Some(data_message::Reaction {
            emoji: Some(emoji.to_string()),
            remove: Some(remove),
            target_author_aci: Some(target_author.to_string()),
            target_sent_timestamp: Some(target_sent_timestamp),
        }),
        ..Default::default()
    })
}

pub fn delete_data_message(target_sent_timestamp: u64) -> Content {
    wrap_data_message(DataMessage {
        timestamp: Some(current_message_timestamp()),
        delete: Some(data_message::Delete {
            target_sent_timestamp: Some(target_sent_timestamp),
        }),
        ..Default::default()
    })
}

pub fn wrap_data_message(data_message: DataMessage) -> Content {
    Content {
        data_message: Some(data_message),
        ..Default::default()
    }
}

pub(crate) fn current_message_timestamp() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// The user-visible timestamp of a payload: the DataMessage timestamp
/// (possibly nested in an edit), otherwise now.
pub(crate) fn message_timestamp(content: &Content) -> u64 {
    if let Some(ts) = content.data_message.as_ref().and_then(|dm| dm.timestamp) {
        return ts;
    }
    if let Some(ts) = content
        .edit_message
        .as_ref()
        .and_then(|em| em.data_message.as_ref())
        .and_then(|dm| dm.timestamp)
    {
        return ts;
    }
    current_message_timestamp()
}

/// Whether the server should wake the recipient's devices for this payload.
pub(crate) fn is_urgent(content: &Content) -> bool {
    content.data_message.is_some()
        || content.call_message.is_some()
        || content.story_message.is_some()
        || content.edit_message.is_some()
        || content
            .sync_message
            .as_ref()
            .is_some_and(is_sync_message_urgent)
}

fn is_sync_message_urgent(sync: &SyncMessage) -> bool {
    sync.sent.is_some() || sync.request.is_some()
}

pub(crate) fn content_hint(content: &Content) -> ContentHint {
    // TODO: hint Data and Edit as Resendable once a resend store exists
    if content.typing_message.is_some() || content.receipt_message.is_some() {
        return ContentHint::Implicit;
    }
    ContentHint::Default
}
