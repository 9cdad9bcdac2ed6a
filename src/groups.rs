//! Group state as the send path sees it, plus the per-member fan-out.
//!
//! Membership resolution is a collaborator behind [`GroupResolver`]; a group
//! send is an independent single-recipient send per member followed by one
//! self-addressed sync record describing who got the message.

use std::fmt;

use async_trait::async_trait;
use log::{debug, error, trace};

use crate::client::Client;
use crate::messages::{current_message_timestamp, wrap_data_message};
use crate::proto::{Content, DataMessage, GroupContextV2};
use crate::send::{FailedSendResult, GroupMessageSendResult, SendError, SuccessfulSendResult};
use crate::store::error::Result as StoreResult;
use crate::sync;
use crate::types::ServiceId;

/// Opaque identifier of a group, as used by the membership resolver.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupIdentifier(pub String);

impl fmt::Display for GroupIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct GroupMember {
    pub service_id: ServiceId,
}

#[derive(Debug, Clone)]
pub struct PendingMember {
    pub service_id: ServiceId,
}

#[derive(Debug, Clone)]
pub struct Group {
    pub group_identifier: GroupIdentifier,
    pub master_key: Vec<u8>,
    pub revision: u32,
    pub members: Vec<GroupMember>,
    pub pending_members: Vec<PendingMember>,
}

/// Membership deltas of a group update; added members also receive the
/// update message.
#[derive(Debug, Clone, Default)]
pub struct GroupChange {
    pub add_members: Vec<GroupMember>,
    pub add_pending_members: Vec<PendingMember>,
}

#[async_trait]
pub trait GroupResolver: Send + Sync {
    async fn retrieve_group_by_id(&self, group_id: &GroupIdentifier) -> StoreResult<Group>;
}

pub(crate) fn group_metadata_for_data_message(group: &Group) -> GroupContextV2 {
    GroupContextV2 {
        master_key: Some(group.master_key.clone()),
        revision: Some(group.revision),
        group_change: None,
    }
}

impl Client {
    /// Sends `content` to every member of the group, injecting the group
    /// context into the (possibly edit-nested) DataMessage first.
    pub async fn send_group_message(
        &self,
        group_id: &GroupIdentifier,
        mut content: Content,
    ) -> Result<GroupMessageSendResult, SendError> {
        debug!("Sending group message to {group_id}");
        let group = self.groups.retrieve_group_by_id(group_id).await?;

        let mut message_timestamp = current_message_timestamp();
        if let Some(data_message) = content.data_message.as_mut() {
            message_timestamp = data_message.timestamp.unwrap_or(message_timestamp);
            data_message.group_v2 = Some(group_metadata_for_data_message(&group));
        } else if let Some(data_message) = content
            .edit_message
            .as_mut()
            .and_then(|edit| edit.data_message.as_mut())
        {
            message_timestamp = data_message.timestamp.unwrap_or(message_timestamp);
            data_message.group_v2 = Some(group_metadata_for_data_message(&group));
        }

        let recipients: Vec<ServiceId> = group.members.iter().map(|m| m.service_id).collect();
        self.send_to_group(&recipients, &mut content, message_timestamp)
            .await
    }

    /// Announces a group change to current, pending and newly added members.
    pub async fn send_group_update(
        &self,
        group: &Group,
        group_context: GroupContextV2,
        group_change: Option<&GroupChange>,
    ) -> Result<GroupMessageSendResult, SendError> {
        debug!("Sending group change message to {}", group.group_identifier);
        let timestamp = current_message_timestamp();
        let mut content = wrap_data_message(DataMessage {
            timestamp: Some(timestamp),
            group_v2: Some(group_context),
            ..Default::default()
        });

        let mut recipients: Vec<ServiceId> =
            group.members.iter().map(|m| m.service_id).collect();
        recipients.extend(group.pending_members.iter().map(|m| m.service_id));
        if let Some(change) = group_change {
            recipients.extend(change.add_pending_members.iter().map(|m| m.service_id));
            recipients.extend(change.add_members.iter().map(|m| m.service_id));
        }

        self.send_to_group(&recipients, &mut content, timestamp).await
    }

    pub(crate) async fn send_to_group(
        &self,
        recipients: &[ServiceId],
        content: &mut Content,
        message_timestamp: u64,
    ) -> Result<GroupMessageSendResult, SendError> {
        let mut result = GroupMessageSendResult {
            successfully_sent_to: Vec::new(),
            failed_to_send_to: Vec::new(),
        };
        for &recipient in recipients {
            if recipient.is_aci() && recipient.uuid == self.store.aci {
                // The sender's own devices get the sync record instead
                continue;
            }
            match self
                .send_content(recipient, message_timestamp, content, true, true)
                .await
            {
                Ok(unidentified) => {
                    trace!("Successfully sent group message to {recipient}");
                    result.successfully_sent_to.push(SuccessfulSendResult {
                        recipient,
                        recipient_e164: None,
                        unidentified,
                        destination_pni_identity_key: None,
                    });
                }
                Err(error) => {
                    error!("Failed to send group message to {recipient}: {error}");
                    result
                        .failed_to_send_to
                        .push(FailedSendResult { recipient, error });
                }
            }
        }

        if self.other_device_count().await > 0 {
            let sync_content = if let Some(data_message) = content.data_message.as_ref() {
                Some(sync::sync_message_from_group_data_message(
                    data_message,
                    &result.successfully_sent_to,
                ))
            } else {
                content.edit_message.as_ref().map(|edit_message| {
                    sync::sync_message_from_group_edit_message(
                        edit_message,
                        &result.successfully_sent_to,
                    )
                })
            };
            if let Some(mut sync_content) = sync_content {
                if let Err(e) = self
                    .send_content(
                        self.store.aci_service_id(),
                        message_timestamp,
                        &mut sync_content,
                        true,
                        true,
                    )
                    .await
                {
                    error!("Failed to send group sync message to myself: {e}");
                }
            }
        }

        if result.successfully_sent_to.is_empty() {
            if let Some(last) = result.failed_to_send_to.pop() {
                return Err(SendError::AllGroupMembersFailed(Box::new(last.error)));
            }
        }
        Ok(result)
    }
}
