//! Sync records: every successful outbound message is mirrored to the
//! sender's own other devices as a `SyncMessage.Sent` (or `.Read` for read
//! receipts), so all devices agree on conversation state.

use chrono::{TimeDelta, Utc};
use log::{error, warn};

use crate::client::Client;
use crate::messages::current_message_timestamp;
use crate::proto::{
    Content, DataMessage, EditMessage, ReceiptMessage, SyncMessage, receipt_message, sync_message,
};
use crate::send::{SendError, SuccessfulSendResult};
use crate::types::{ServiceId, ServiceIdKind};

fn unidentified_status_for(
    result: &SuccessfulSendResult,
) -> sync_message::sent::UnidentifiedDeliveryStatus {
    sync_message::sent::UnidentifiedDeliveryStatus {
        destination_service_id: Some(result.recipient.to_string()),
        unidentified: Some(result.unidentified),
        destination_pni_identity_key: result
            .destination_pni_identity_key
            .as_ref()
            .map(|key| key.serialize()),
    }
}

fn wrap_sent(sent: sync_message::Sent) -> Content {
    Content {
        sync_message: Some(SyncMessage {
            sent: Some(sent),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub(crate) fn sync_message_from_solo_data_message(
    data_message: &DataMessage,
    result: &SuccessfulSendResult,
) -> Content {
    wrap_sent(sync_message::Sent {
        message: Some(data_message.clone()),
        destination_e164: result.recipient_e164.clone(),
        destination_service_id: Some(result.recipient.to_string()),
        timestamp: data_message.timestamp,
        expiration_start_timestamp: Some(current_message_timestamp()),
        unidentified_status: vec![unidentified_status_for(result)],
        ..Default::default()
    })
}

pub(crate) fn sync_message_from_solo_edit_message(
    edit_message: &EditMessage,
    result: &SuccessfulSendResult,
) -> Content {
    wrap_sent(sync_message::Sent {
        edit_message: Some(edit_message.clone()),
        destination_e164: result.recipient_e164.clone(),
        destination_service_id: Some(result.recipient.to_string()),
        timestamp: edit_message
            .data_message
            .as_ref()
            .and_then(|dm| dm.timestamp),
        expiration_start_timestamp: Some(current_message_timestamp()),
        unidentified_status: vec![unidentified_status_for(result)],
        ..Default::default()
    })
}

pub(crate) fn sync_message_from_group_data_message(
    data_message: &DataMessage,
    results: &[SuccessfulSendResult],
) -> Content {
    wrap_sent(sync_message::Sent {
        message: Some(data_message.clone()),
        timestamp: data_message.timestamp,
        expiration_start_timestamp: Some(current_message_timestamp()),
        unidentified_status: results.iter().map(unidentified_status_for).collect(),
        ..Default::default()
    })
}

pub(crate) fn sync_message_from_group_edit_message(
    edit_message: &EditMessage,
    results: &[SuccessfulSendResult],
) -> Content {
    wrap_sent(sync_message::Sent {
        edit_message: Some(edit_message.clone()),
        timestamp: edit_message
            .data_message
            .as_ref()
            .and_then(|dm| dm.timestamp),
        expiration_start_timestamp: Some(current_message_timestamp()),
        unidentified_status: results.iter().map(unidentified_status_for).collect(),
        ..Default::default()
    })
}

/// Read receipts sync as `SyncMessage.Read` entries, one per timestamp.
/// Only READ receipts from ACI senders have a sync representation.
pub(crate) fn sync_message_from_read_receipt_message(
    receipt_message: &ReceiptMessage,
    message_sender: ServiceId,
) -> Option<Content> {
    if receipt_message.receipt_type() != receipt_message::Type::Read {
        warn!(
            "Sync requested for a {:?} receipt, only read receipts sync",
            receipt_message.receipt_type()
        );
        return None;
    }
    if message_sender.kind != ServiceIdKind::Aci {
        warn!("Sync requested for a read receipt from non-ACI sender {message_sender}");
        return None;
    }
    let read = receipt_message
        .timestamp
        .iter()
        .map(|&timestamp| sync_message::Read {
            timestamp: Some(timestamp),
            sender_aci: Some(message_sender.uuid.to_string()),
        })
        .collect();
    Some(Content {
        sync_message: Some(SyncMessage {
            read,
            ..Default::default()
        }),
        ..Default::default()
    })
}

impl Client {
    /// Mirrors a just-sent payload to our own other devices. Returns whether
    /// a sync record actually went out; failures are logged, never
    /// propagated, because the primary send already succeeded.
    pub(crate) async fn send_sync_copy(
        &self,
        content: &Content,
        message_timestamp: u64,
        result: &SuccessfulSendResult,
    ) -> bool {
        if self.other_device_count().await == 0 {
            return false;
        }

        let sync_content = if let Some(data_message) = content.data_message.as_ref() {
            Some(sync_message_from_solo_data_message(data_message, result))
        } else if let Some(edit_message) = content.edit_message.as_ref() {
            Some(sync_message_from_solo_edit_message(edit_message, result))
        } else if let Some(receipt_message) = content
            .receipt_message
            .as_ref()
            .filter(|rm| rm.receipt_type() == receipt_message::Type::Read)
        {
            sync_message_from_read_receipt_message(receipt_message, result.recipient)
        } else {
            None
        };

        let Some(mut sync_content) = sync_content else {
            return false;
        };
        match self
            .send_content(
                self.store.aci_service_id(),
                message_timestamp,
                &mut sync_content,
                true,
                false,
            )
            .await
        {
            Ok(_) => true,
            Err(e) => {
                error!("Failed to send sync message to myself: {e}");
                false
            }
        }
    }

    /// Asks the primary device for a fresh contact list. At most one request
    /// per minute; surplus calls are dropped.
    pub async fn send_contact_sync_request(&self) -> Result<(), SendError> {
        {
            let mut last_request = self.last_contact_request_time.lock().await;
            let now = Utc::now();
            if last_request
                .is_some_and(|at| now - at < TimeDelta::seconds(60))
            {
                warn!("Not sending contact sync request, already requested within the past minute");
                return Ok(());
            }
            *last_request = Some(now);
        }

        let mut content = sync_request_content(sync_message::request::Type::Contacts);
        self.send_content(
            self.store.aci_service_id(),
            current_message_timestamp(),
            &mut content,
            false,
            false,
        )
        .await
        .map_err(|e| {
            error!("Failed to send contact sync request message to myself: {e}");
            e
        })?;
        Ok(())
    }

    /// Asks the primary device to share the storage service master key.
    pub async fn send_storage_master_key_request(&self) -> Result<(), SendError> {
        let mut content = sync_request_content(sync_message::request::Type::Keys);
        self.send_content(
            self.store.aci_service_id(),
            current_message_timestamp(),
            &mut content,
            false,
            false,
        )
        .await
        .map_err(|e| {
            error!("Failed to send key sync request message to myself: {e}");
            e
        })?;
        Ok(())
    }
}

fn sync_request_content(request_type: sync_message::request::Type) -> Content {
    Content {
        sync_message: Some(SyncMessage {
            request: Some(sync_message::Request {
                r#type: Some(request_type as i32),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}
