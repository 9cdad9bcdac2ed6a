//! The outbound pipeline: expand one logical payload into per-device
//! ciphertext envelopes, dispatch them, and repair local device state from
//! the server's verdict until the send sticks or the retry budget runs out.

use base64::Engine as _;
use base64::prelude::BASE64_STANDARD;
use log::{debug, error, trace, warn};
use prost::Message as _;
use serde::{Deserialize, Serialize};

use crate::client::Client;
use crate::crypto::{ALL_DEVICES, CiphertextMessageType, CryptoError, IdentityKey};
use crate::messages::{content_hint, is_urgent, message_timestamp};
use crate::net::{self, NetError, WebSocketResponseMessage, create_ws_request};
use crate::padding::{self, PadError};
use crate::proto::{
    Content, PniSignatureMessage, account_record::PhoneNumberSharingMode, envelope,
    receipt_message,
};
use crate::store::StoreError;
use crate::types::{ServiceId, ServiceIdKind};

/// Envelopes are padded as protocol version 3 payloads.
const PADDED_PROTOCOL_VERSION: u32 = 3;

/// A send gives up after this many repair-and-retry rounds.
const MAX_SEND_ATTEMPTS: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error(transparent)]
    Transport(#[from] NetError),

    #[error("unexpected status code while sending: {0}")]
    UnexpectedStatus(u32),

    #[error("too many retries")]
    TooManyRetries,

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no sessions for {0} after pre-key fetch")]
    NoSessions(ServiceId),

    #[error(transparent)]
    Padding(#[from] PadError),

    #[error("unknown ciphertext message type {0:?}")]
    UnexpectedCiphertextType(CiphertextMessageType),

    #[error("can't send to own PNI")]
    SelfPniSend,

    #[error("sync copy was not delivered")]
    SyncCopyNotDelivered,

    #[error("failed to send to any group members: {0}")]
    AllGroupMembersFailed(#[source] Box<SendError>),

    #[error("wire encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid base64 in server response: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// One encrypted payload for one device of the recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingEnvelope {
    #[serde(rename = "type")]
    pub envelope_type: i32,
    pub destination_device_id: u32,
    pub destination_registration_id: u32,
    /// Base64 of the encrypted, padded content.
    pub content: String,
}

/// The wire body of `PUT /v1/messages/{recipient}`: every envelope for one
/// recipient in one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingBatch {
    pub timestamp: u64,
    pub online: bool,
    pub urgent: bool,
    pub messages: Vec<OutgoingEnvelope>,
}

/// 409 body: the server's correction of our view of the device list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MismatchedDevices {
    pub missing_devices: Vec<u32>,
    pub extra_devices: Vec<u32>,
}

/// 410 body: devices whose sessions must be re-established.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StaleDevices {
    pub stale_devices: Vec<u32>,
}

/// 428 body: a rate-limit challenge. Answering it is not supported; the
/// token and options are only surfaced in logs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimitChallenge {
    pub token: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SuccessfulSendResult {
    pub recipient: ServiceId,
    pub recipient_e164: Option<String>,
    pub unidentified: bool,
    pub destination_pni_identity_key: Option<IdentityKey>,
}

impl SuccessfulSendResult {
    pub(crate) fn new(recipient: ServiceId) -> Self {
        Self {
            recipient,
            recipient_e164: None,
            unidentified: false,
            destination_pni_identity_key: None,
        }
    }
}

#[derive(Debug)]
pub struct FailedSendResult {
    pub recipient: ServiceId,
    pub error: SendError,
}

/// Outcome of a single-recipient send.
#[derive(Debug)]
pub enum SendMessageResult {
    Success(SuccessfulSendResult),
    Failure(FailedSendResult),
}

impl SendMessageResult {
    pub fn was_successful(&self) -> bool {
        matches!(self, SendMessageResult::Success(_))
    }
}

/// Aggregated outcome of a group send; may mix successes and failures.
#[derive(Debug, Default)]
pub struct GroupMessageSendResult {
    pub successfully_sent_to: Vec<SuccessfulSendResult>,
    pub failed_to_send_to: Vec<FailedSendResult>,
}

impl Client {
    /// Encrypts `content` once per device of `recipient`, fetching pre-keys
    /// first if no sessions exist yet.
    ///
    /// The whole enumeration-and-encrypt step runs under the client's
    /// encryption lock so no two sends advance ratchet state concurrently.
    pub(crate) async fn build_messages_to_send(
        &self,
        recipient: ServiceId,
        content: &Content,
        unauthenticated: bool,
        is_group: bool,
    ) -> Result<Vec<OutgoingEnvelope>, SendError> {
        let _encryption_guard = self.encryption_lock.lock().await;

        let mut sessions = self.sessions.all_sessions_for_service_id(recipient).await?;
        if sessions.is_empty() {
            self.crypto
                .fetch_and_process_pre_key(recipient, ALL_DEVICES)
                .await?;
            sessions = self.sessions.all_sessions_for_service_id(recipient).await?;
        }
        if sessions.is_empty() {
            return Err(SendError::NoSessions(recipient));
        }

        let serialized_content = content.encode_to_vec();
        let mut envelopes = Vec::with_capacity(sessions.len());
        for (address, session) in &sessions {
            if recipient == self.store.aci_service_id()
                && address.device_id == self.store.device_id
            {
                debug!(
                    "Not sending to device {} that we are sending from",
                    address.device_id
                );
                continue;
            }

            let padded_message =
                padding::pad_message(PADDED_PROTOCOL_VERSION, &serialized_content)?;

            let (envelope_type, encrypted_payload) = if unauthenticated {
                let include_e164 = !is_group
                    && self
                        .store
                        .account_record
                        .as_ref()
                        .is_some_and(|record| {
                            record.phone_number_sharing_mode() == PhoneNumberSharingMode::Everybody
                        });
                let certificate = self.sender_certificate(include_e164).await?;
                let payload = self
                    .crypto
                    .sealed_sender_encrypt(
                        address,
                        &padded_message,
                        content_hint(content),
                        &certificate,
                    )
                    .await?;
                (envelope::Type::UnidentifiedSender, payload)
            } else {
                let ciphertext = self.crypto.encrypt(address, &padded_message).await?;
                let envelope_type = match ciphertext.message_type() {
                    CiphertextMessageType::PreKey => envelope::Type::PrekeyBundle,
                    CiphertextMessageType::Whisper => envelope::Type::Ciphertext,
                    other => return Err(SendError::UnexpectedCiphertextType(other)),
                };
                (envelope_type, ciphertext.serialized().to_vec())
            };

            envelopes.push(OutgoingEnvelope {
                envelope_type: envelope_type as i32,
                destination_device_id: address.device_id,
                destination_registration_id: session.remote_registration_id(),
                content: BASE64_STANDARD.encode(&encrypted_payload),
            });
        }

        Ok(envelopes)
    }

    /// Dispatches `content` to every device of `recipient`, repairing device
    /// lists and downgrading sealed sender as the server demands.
    ///
    /// Returns whether the message ultimately went out unidentified.
    pub(crate) async fn send_content(
        &self,
        recipient: ServiceId,
        message_timestamp: u64,
        content: &mut Content,
        use_unidentified_sender: bool,
        is_group: bool,
    ) -> Result<bool, SendError> {
        trace!("Sending content to {recipient} with timestamp {message_timestamp}");

        // Data messages advertise our profile key so the recipient can
        // grant us sealed-sender access in return.
        if let Some(data_message) = content.data_message.as_mut() {
            match self.profile_keys.profile_key(self.store.aci).await {
                Ok(Some(profile_key)) => {
                    data_message.profile_key = Some(profile_key.slice().to_vec());
                }
                Ok(None) => warn!("Own profile key missing, not adding to outgoing message"),
                Err(e) => warn!("Error getting profile key, not adding to outgoing message: {e}"),
            }
        }

        if recipient.kind == ServiceIdKind::Pni && recipient.uuid == self.store.pni {
            return Err(SendError::SelfPniSend);
        }

        let mut unidentified = use_unidentified_sender;
        if recipient == self.store.aci_service_id() {
            // Payloads for our own other devices go over the authenticated
            // socket.
            unidentified = false;
        } else if recipient.kind == ServiceIdKind::Pni {
            // Only ACIs have profile keys, so a PNI can never be reached
            // through sealed sender.
            unidentified = false;
        }

        let mut attempt: u32 = 0;
        loop {
            if attempt > MAX_SEND_ATTEMPTS {
                error!("Send to {recipient} abandoned after {attempt} attempts");
                return Err(SendError::TooManyRetries);
            }

            let mut access_key = None;
            if unidentified {
                match self.profile_keys.profile_key(recipient.uuid).await? {
                    Some(profile_key) => match profile_key.derive_access_key() {
                        Ok(key) => access_key = Some(key),
                        Err(e) => {
                            warn!("Error deriving access key for {recipient}: {e}");
                            unidentified = false;
                        }
                    },
                    None => {
                        warn!("Profile key not found for {recipient}");
                        unidentified = false;
                    }
                }
            }

            let envelopes = self
                .build_messages_to_send(recipient, content, unidentified, is_group)
                .await?;
            let batch = OutgoingBatch {
                timestamp: message_timestamp,
                online: false,
                urgent: is_urgent(content),
                messages: envelopes,
            };
            let body = serde_json::to_vec(&batch)?;

            let mut request = create_ws_request("PUT", &format!("/v1/messages/{recipient}"), body);
            let response = match access_key {
                Some(key) if unidentified => {
                    trace!("Sending message over unidentified websocket");
                    request
                        .headers
                        .push(format!("unidentified-access-key:{}", BASE64_STANDARD.encode(key.0)));
                    self.unauthed_ws.send_request(request).await?
                }
                _ => {
                    trace!("Sending message over authenticated websocket");
                    self.authed_ws.send_request(request).await?
                }
            };

            let status = response.status();
            debug!("Message send to {recipient} returned status {status}");

            match status {
                200 => return Ok(unidentified),
                401 if unidentified => {
                    debug!("Retrying send without sealed sender");
                    unidentified = false;
                }
                409 => self.handle_mismatched_devices(recipient, &response).await?,
                410 => self.handle_stale_devices(recipient, &response).await?,
                428 => self.handle_rate_limit(recipient, &response)?,
                500 | 503 => {
                    debug!("Retrying send after server error {status}");
                }
                other => return Err(SendError::UnexpectedStatus(other)),
            }
            attempt += 1;
        }
    }

    /// A 409 means our view of the recipient's device list drifted: create
    /// sessions for devices we were missing, drop the ones that are gone.
    async fn handle_mismatched_devices(
        &self,
        recipient: ServiceId,
        response: &WebSocketResponseMessage,
    ) -> Result<(), SendError> {
        let body: MismatchedDevices = serde_json::from_slice(response.body())?;
        debug!(
            "Mismatched devices for {recipient}: missing {:?}, extra {:?}",
            body.missing_devices, body.extra_devices
        );
        for device_id in body.missing_devices {
            self.crypto
                .fetch_and_process_pre_key(recipient, device_id as i32)
                .await?;
        }
        for device_id in body.extra_devices {
            self.sessions
                .remove_session(&recipient.address(device_id))
                .await?;
        }
        Ok(())
    }

    /// A 410 means some sessions point at stale devices: replace each one
    /// with a freshly fetched pre-key session.
    async fn handle_stale_devices(
        &self,
        recipient: ServiceId,
        response: &WebSocketResponseMessage,
    ) -> Result<(), SendError> {
        let body: StaleDevices = serde_json::from_slice(response.body())?;
        debug!("Stale devices for {recipient}: {:?}", body.stale_devices);
        for device_id in body.stale_devices {
            self.sessions
                .remove_session(&recipient.address(device_id))
                .await?;
            self.crypto
                .fetch_and_process_pre_key(recipient, device_id as i32)
                .await?;
        }
        Ok(())
    }

    /// A 428 is a rate-limit challenge. Answering challenges is not
    /// supported, so the retry happens immediately and the `Retry-After`
    /// value is only logged for the caller's benefit.
    fn handle_rate_limit(
        &self,
        recipient: ServiceId,
        response: &WebSocketResponseMessage,
    ) -> Result<(), SendError> {
        let challenge: RateLimitChallenge = serde_json::from_slice(response.body())?;
        if !challenge.options.is_empty() {
            trace!(
                "Rate limit challenge for {recipient} with options {:?}",
                challenge.options
            );
        }
        if let Some(value) = net::find_header(&response.headers, "Retry-After") {
            match value.parse::<u64>() {
                Ok(retry_after_seconds) if retry_after_seconds > 0 => {
                    warn!("Got rate limited, retry after {retry_after_seconds}s");
                }
                Ok(_) => {}
                Err(e) => warn!("Unparseable Retry-After header: {e}"),
            }
        }
        Ok(())
    }

    /// Sends one logical message to one recipient, honoring account-level
    /// suppression rules, and mirrors the result to our own other devices.
    pub async fn send_message(
        &self,
        recipient: ServiceId,
        mut content: Content,
    ) -> SendMessageResult {
        let timestamp = message_timestamp(&content);

        let (aci, pni) = match recipient.kind {
            ServiceIdKind::Aci => (Some(recipient.uuid), None),
            ServiceIdKind::Pni => (None, Some(recipient.uuid)),
        };
        let mut recipient_data = None;
        match self.recipients.load_recipient(aci, pni).await {
            Ok(data) => recipient_data = data,
            Err(e) => error!("Failed to get message recipient data: {e}"),
        }

        // A recipient first reached through their phone number needs proof
        // that our PNI and ACI belong to the same account.
        let mut needs_pni_signature = false;
        if recipient.kind == ServiceIdKind::Aci
            && let Some(data) = recipient_data.as_mut()
            && data.needs_pni_signature
        {
            needs_pni_signature = true;
            debug!("Including PNI identity in message to {recipient}");
            match self.crypto.sign_alternate_identity().await {
                Ok(signature) => {
                    content.pni_signature_message = Some(PniSignatureMessage {
                        pni: Some(self.store.pni.as_bytes().to_vec()),
                        signature: Some(signature),
                    });
                    data.needs_pni_signature = false;
                    if let Err(e) = self.recipients.save_recipient(data).await {
                        error!("Failed to persist cleared PNI signature flag: {e}");
                    }
                }
                Err(e) => error!("Failed to sign ACI identity with PNI key: {e}"),
            }
        }

        let is_read_receipt = content
            .receipt_message
            .as_ref()
            .is_some_and(|rm| rm.receipt_type() == receipt_message::Type::Read);

        // While the PNI signature is outstanding the conversation is still a
        // message request; don't leak typing or receipt activity into it.
        if needs_pni_signature
            && (content.typing_message.is_some() || content.receipt_message.is_some())
        {
            debug!("Not sending typing/receipt message, recipient needs PNI signature");
            let result = SuccessfulSendResult::new(recipient);
            if is_read_receipt {
                self.send_sync_copy(&content, timestamp, &result).await;
            }
            return SendMessageResult::Success(result);
        }

        if content.typing_message.is_some()
            && self
                .store
                .account_record
                .as_ref()
                .is_some_and(|record| !record.typing_indicators())
        {
            debug!("Not sending typing message, typing indicators are disabled");
            return SendMessageResult::Success(SuccessfulSendResult::new(recipient));
        }

        if is_read_receipt
            && self
                .store
                .account_record
                .as_ref()
                .is_some_and(|record| !record.read_receipts())
        {
            debug!("Not sending receipt message, read receipts are disabled");
            let result = SuccessfulSendResult::new(recipient);
            self.send_sync_copy(&content, timestamp, &result).await;
            return SendMessageResult::Success(result);
        }

        let is_delivery_receipt = content
            .receipt_message
            .as_ref()
            .is_some_and(|rm| rm.receipt_type() == receipt_message::Type::Delivery);
        if recipient == self.store.aci_service_id() && !is_delivery_receipt {
            // Nothing but delivery receipts is ever sent to ourselves as a
            // primary message; everything else becomes a sync record.
            let result = SuccessfulSendResult::new(recipient);
            let delivered = self.send_sync_copy(&content, timestamp, &result).await;
            return if delivered {
                SendMessageResult::Success(result)
            } else {
                SendMessageResult::Failure(FailedSendResult {
                    recipient,
                    error: SendError::SyncCopyNotDelivered,
                })
            };
        }

        match self
            .send_content(recipient, timestamp, &mut content, true, false)
            .await
        {
            Err(error) => SendMessageResult::Failure(FailedSendResult { recipient, error }),
            Ok(unidentified) => {
                let mut result = SuccessfulSendResult {
                    recipient,
                    recipient_e164: None,
                    unidentified,
                    destination_pni_identity_key: None,
                };
                if recipient.kind == ServiceIdKind::Pni {
                    match self.identities.identity_key(recipient).await {
                        Ok(key) => result.destination_pni_identity_key = key,
                        Err(e) => {
                            error!("Failed to add PNI destination identity key to sync message: {e}")
                        }
                    }
                    match recipient_data.as_ref().and_then(|data| data.e164.clone()) {
                        Some(e164) => result.recipient_e164 = Some(e164),
                        None => warn!("No E164 number found for PNI sync message"),
                    }
                }
                self.send_sync_copy(&content, timestamp, &result).await;
                SendMessageResult::Success(result)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_serializes_with_wire_field_names() {
        let batch = OutgoingBatch {
            timestamp: 1_700_000_000_000,
            online: false,
            urgent: true,
            messages: vec![OutgoingEnvelope {
                envelope_type: envelope::Type::UnidentifiedSender as i32,
                destination_device_id: 2,
                destination_registration_id: 4711,
                content: "AAEC".to_string(),
            }],
        };
        let json: serde_json::Value = serde_json::to_value(&batch).unwrap();
        assert_eq!(json["urgent"], true);
        assert_eq!(json["messages"][0]["type"], 6);
        assert_eq!(json["messages"][0]["destinationDeviceId"], 2);
        assert_eq!(json["messages"][0]["destinationRegistrationId"], 4711);
    }

    #[test]
    fn mismatched_devices_tolerates_absent_keys() {
        let body: MismatchedDevices = serde_json::from_str("{}").unwrap();
        assert!(body.missing_devices.is_empty());
        assert!(body.extra_devices.is_empty());

        let body: MismatchedDevices =
            serde_json::from_str(r#"{"missingDevices":[2,3],"extraDevices":[5]}"#).unwrap();
        assert_eq!(body.missing_devices, vec![2, 3]);
        assert_eq!(body.extra_devices, vec![5]);
    }

    #[test]
    fn stale_devices_parses_wire_shape() {
        let body: StaleDevices = serde_json::from_str(r#"{"staleDevices":[2]}"#).unwrap();
        assert_eq!(body.stale_devices, vec![2]);
    }

    #[test]
    fn rate_limit_challenge_parses_wire_shape() {
        let body: RateLimitChallenge = serde_json::from_str(
            r#"{"token":"07af0d73-e05d-42c3-9634-634922061966","options":["recaptcha","pushChallenge"]}"#,
        )
        .unwrap();
        assert_eq!(body.options, vec!["recaptcha", "pushChallenge"]);
        assert!(!body.token.is_empty());
    }
}
