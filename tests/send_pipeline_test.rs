//! End-to-end scenarios for the outbound pipeline, driven through mock
//! websockets, a mock crypto library and the in-memory store.

use prost::Message as _;
use uuid::Uuid;

use signal_rust::crypto::{IdentityKey, ProfileKey, SessionRecord};
use signal_rust::groups::{Group, GroupIdentifier, GroupMember};
use signal_rust::messages::{
    delivered_receipt_for_timestamps, read_receipt_for_timestamps, typing_message,
    wrap_data_message,
};
use signal_rust::proto::{AccountRecord, Content, DataMessage, envelope};
use signal_rust::send::{OutgoingBatch, SendError, SendMessageResult};
use signal_rust::test_utils::TestHarness;
use signal_rust::types::{Recipient, ServiceId};

fn data_message(timestamp: u64) -> Content {
    wrap_data_message(DataMessage {
        body: Some("it's a me".to_string()),
        timestamp: Some(timestamp),
        ..Default::default()
    })
}

fn batch_from(request: &signal_rust::net::WebSocketRequestMessage) -> OutgoingBatch {
    serde_json::from_slice(request.body.as_deref().unwrap_or(&[])).expect("batch body")
}

/// Strips version-3 padding: trailing zeros, then the 0x80 terminator.
fn unpad(padded: &[u8]) -> &[u8] {
    let end = padded
        .iter()
        .rposition(|&b| b != 0)
        .expect("terminator present");
    assert_eq!(padded[end], 0x80);
    &padded[..end]
}

fn decode_content(padded: &[u8]) -> Content {
    Content::decode(unpad(padded)).expect("decodable content")
}

#[tokio::test]
async fn sealed_send_to_aci_succeeds() {
    let harness = TestHarness::new();
    let recipient = ServiceId::aci(Uuid::new_v4());
    harness
        .store
        .put_session(recipient.address(1), SessionRecord::new(42));
    harness
        .store
        .put_profile_key(recipient.uuid, ProfileKey::new([3; 32]));
    let client = harness.client();

    let result = client.send_message(recipient, data_message(1234)).await;
    let SendMessageResult::Success(success) = result else {
        panic!("send failed: {result:?}");
    };
    assert!(success.unidentified);

    let requests = harness.unauthed_ws.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(harness.authed_ws.request_count(), 0);
    assert_eq!(
        requests[0].path.as_deref(),
        Some(format!("/v1/messages/{recipient}").as_str())
    );
    assert!(
        requests[0]
            .headers
            .iter()
            .any(|h| h.starts_with("unidentified-access-key:"))
    );

    let batch = batch_from(&requests[0]);
    assert_eq!(batch.timestamp, 1234);
    assert!(batch.urgent);
    assert!(!batch.online);
    assert_eq!(batch.messages.len(), 1);
    assert_eq!(
        batch.messages[0].envelope_type,
        envelope::Type::UnidentifiedSender as i32
    );
    assert_eq!(batch.messages[0].destination_device_id, 1);
    assert_eq!(batch.messages[0].destination_registration_id, 42);
}

#[tokio::test]
async fn sealed_send_falls_back_to_authenticated_on_401() {
    let harness = TestHarness::new();
    let recipient = ServiceId::aci(Uuid::new_v4());
    harness
        .store
        .put_session(recipient.address(1), SessionRecord::new(42));
    harness
        .store
        .put_profile_key(recipient.uuid, ProfileKey::new([3; 32]));
    harness.unauthed_ws.queue_response(401, b"{}");
    let client = harness.client();

    let result = client.send_message(recipient, data_message(1)).await;
    let SendMessageResult::Success(success) = result else {
        panic!("send failed: {result:?}");
    };
    assert!(!success.unidentified);

    assert_eq!(harness.unauthed_ws.request_count(), 1);
    let authed = harness.authed_ws.requests();
    assert_eq!(authed.len(), 1);
    let batch = batch_from(&authed[0]);
    assert_eq!(
        batch.messages[0].envelope_type,
        envelope::Type::Ciphertext as i32
    );
}

#[tokio::test]
async fn missing_device_is_repaired_on_409() {
    let harness = TestHarness::new();
    let recipient = ServiceId::aci(Uuid::new_v4());
    harness
        .store
        .put_session(recipient.address(1), SessionRecord::new(10));
    harness
        .authed_ws
        .queue_response(409, br#"{"missingDevices":[2],"extraDevices":[]}"#);
    let client = harness.client();

    let result = client.send_message(recipient, data_message(1)).await;
    assert!(result.was_successful(), "{result:?}");

    assert!(
        harness
            .crypto
            .prekey_fetches
            .lock()
            .unwrap()
            .contains(&(recipient, 2))
    );
    assert!(harness.store.has_session(&recipient.address(2)));

    let requests = harness.authed_ws.requests();
    assert_eq!(requests.len(), 2);
    let retry_batch = batch_from(&requests[1]);
    assert_eq!(retry_batch.messages.len(), 2);
}

#[tokio::test]
async fn extra_device_session_is_removed_on_409() {
    let harness = TestHarness::new();
    let recipient = ServiceId::aci(Uuid::new_v4());
    harness
        .store
        .put_session(recipient.address(1), SessionRecord::new(10));
    harness
        .store
        .put_session(recipient.address(5), SessionRecord::new(50));
    harness
        .authed_ws
        .queue_response(409, br#"{"extraDevices":[5]}"#);
    let client = harness.client();

    let result = client.send_message(recipient, data_message(1)).await;
    assert!(result.was_successful(), "{result:?}");
    assert!(!harness.store.has_session(&recipient.address(5)));

    let requests = harness.authed_ws.requests();
    let retry_batch = batch_from(&requests[1]);
    assert_eq!(retry_batch.messages.len(), 1);
    assert_eq!(retry_batch.messages[0].destination_device_id, 1);
}

#[tokio::test]
async fn stale_session_is_replaced_on_410() {
    let harness = TestHarness::new();
    let recipient = ServiceId::aci(Uuid::new_v4());
    harness
        .store
        .put_session(recipient.address(1), SessionRecord::new(10));
    harness
        .store
        .put_session(recipient.address(2), SessionRecord::new(20));
    harness
        .authed_ws
        .queue_response(410, br#"{"staleDevices":[2]}"#);
    let client = harness.client();

    let result = client.send_message(recipient, data_message(1)).await;
    assert!(result.was_successful(), "{result:?}");

    let replaced = harness
        .store
        .session(&recipient.address(2))
        .expect("session re-established");
    assert_ne!(replaced.remote_registration_id(), 20);

    let requests = harness.authed_ws.requests();
    assert_eq!(requests.len(), 2);
    let retry_batch = batch_from(&requests[1]);
    assert_eq!(retry_batch.messages.len(), 2);
    let fresh = retry_batch
        .messages
        .iter()
        .find(|m| m.destination_device_id == 2)
        .unwrap();
    assert_eq!(fresh.envelope_type, envelope::Type::PrekeyBundle as i32);
}

#[tokio::test]
async fn rate_limited_send_retries_immediately() {
    let harness = TestHarness::new();
    let recipient = ServiceId::aci(Uuid::new_v4());
    harness
        .store
        .put_session(recipient.address(1), SessionRecord::new(10));
    harness.authed_ws.queue_response_with_headers(
        428,
        br#"{"token":"07af0d73","options":["recaptcha","pushChallenge"]}"#,
        vec!["Retry-After:86400".to_string()],
    );
    let client = harness.client();

    let result = client.send_message(recipient, data_message(1)).await;
    assert!(result.was_successful(), "{result:?}");
    assert_eq!(harness.authed_ws.request_count(), 2);
}

#[tokio::test]
async fn retry_budget_is_bounded() {
    let harness = TestHarness::new();
    let recipient = ServiceId::aci(Uuid::new_v4());
    harness
        .store
        .put_session(recipient.address(1), SessionRecord::new(10));
    for _ in 0..5 {
        harness.authed_ws.queue_response(500, b"{}");
    }
    let client = harness.client();

    let result = client.send_message(recipient, data_message(1)).await;
    let SendMessageResult::Failure(failure) = result else {
        panic!("expected failure");
    };
    assert!(matches!(failure.error, SendError::TooManyRetries));
    // initial attempt plus three retries
    assert_eq!(harness.authed_ws.request_count(), 4);
}

#[tokio::test]
async fn unknown_status_is_terminal() {
    let harness = TestHarness::new();
    let recipient = ServiceId::aci(Uuid::new_v4());
    harness
        .store
        .put_session(recipient.address(1), SessionRecord::new(10));
    harness.authed_ws.queue_response(404, b"{}");
    let client = harness.client();

    let result = client.send_message(recipient, data_message(1)).await;
    let SendMessageResult::Failure(failure) = result else {
        panic!("expected failure");
    };
    assert!(matches!(failure.error, SendError::UnexpectedStatus(404)));
    assert_eq!(harness.authed_ws.request_count(), 1);
}

#[tokio::test]
async fn group_send_reports_partial_failure_and_syncs_successes() {
    let harness = TestHarness::new();
    let member_a = ServiceId::aci(Uuid::new_v4());
    let member_b = ServiceId::aci(Uuid::new_v4());
    let member_c = ServiceId::aci(Uuid::new_v4());
    let own_aci = ServiceId::aci(harness.device.aci);

    harness
        .store
        .put_session(member_a.address(1), SessionRecord::new(1));
    harness
        .store
        .put_session(member_c.address(1), SessionRecord::new(3));
    // another of our own devices, so a sync record is expected
    harness
        .store
        .put_session(own_aci.address(2), SessionRecord::new(99));
    harness.crypto.fail_prekey_fetches_for(member_b.uuid);

    let group_id = GroupIdentifier("test-group".to_string());
    harness.groups.add_group(Group {
        group_identifier: group_id.clone(),
        master_key: vec![7; 32],
        revision: 9,
        members: vec![
            GroupMember { service_id: member_a },
            GroupMember { service_id: member_b },
            GroupMember { service_id: member_c },
            GroupMember { service_id: own_aci },
        ],
        pending_members: Vec::new(),
    });
    let client = harness.client();

    let result = client
        .send_group_message(&group_id, data_message(1000))
        .await
        .expect("partial success is still a result");
    let successes: Vec<ServiceId> = result
        .successfully_sent_to
        .iter()
        .map(|s| s.recipient)
        .collect();
    assert_eq!(successes, vec![member_a, member_c]);
    assert_eq!(result.failed_to_send_to.len(), 1);
    assert_eq!(result.failed_to_send_to[0].recipient, member_b);

    // the self-addressed sync record lists both delivered members
    let sync_plaintext = harness
        .crypto
        .encrypted_plaintexts
        .lock()
        .unwrap()
        .iter()
        .find(|(address, _)| address.service_id == own_aci && address.device_id == 2)
        .map(|(_, plaintext)| plaintext.clone())
        .expect("sync copy was encrypted for our other device");
    let sync_content = decode_content(&sync_plaintext);
    let sent = sync_content.sync_message.unwrap().sent.unwrap();
    assert_eq!(sent.unidentified_status.len(), 2);
    assert!(sent.destination_service_id.is_none());
    assert_eq!(
        sent.message.as_ref().and_then(|dm| dm.timestamp),
        Some(1000)
    );
    // group context was injected before fan-out
    assert_eq!(
        sent.message.as_ref().and_then(|dm| dm.group_v2.as_ref()).and_then(|g| g.revision),
        Some(9)
    );
}

#[tokio::test]
async fn group_update_reaches_pending_and_added_members() {
    use signal_rust::groups::{GroupChange, PendingMember};
    use signal_rust::proto::GroupContextV2;

    let harness = TestHarness::new();
    let member = ServiceId::aci(Uuid::new_v4());
    let pending = ServiceId::aci(Uuid::new_v4());
    let added = ServiceId::aci(Uuid::new_v4());
    for recipient in [member, pending, added] {
        harness
            .store
            .put_session(recipient.address(1), SessionRecord::new(1));
    }

    let group = Group {
        group_identifier: GroupIdentifier("updating".to_string()),
        master_key: vec![2; 32],
        revision: 4,
        members: vec![GroupMember { service_id: member }],
        pending_members: vec![PendingMember {
            service_id: pending,
        }],
    };
    let change = GroupChange {
        add_members: vec![GroupMember { service_id: added }],
        add_pending_members: Vec::new(),
    };
    let client = harness.client();

    let result = client
        .send_group_update(
            &group,
            GroupContextV2 {
                master_key: Some(vec![2; 32]),
                revision: Some(5),
                group_change: Some(vec![9, 9]),
            },
            Some(&change),
        )
        .await
        .unwrap();

    let mut recipients: Vec<String> = result
        .successfully_sent_to
        .iter()
        .map(|s| s.recipient.to_string())
        .collect();
    recipients.sort();
    let mut expected: Vec<String> =
        vec![member.to_string(), pending.to_string(), added.to_string()];
    expected.sort();
    assert_eq!(recipients, expected);
    assert!(result.failed_to_send_to.is_empty());
    assert_eq!(harness.authed_ws.request_count(), 3);
}

#[tokio::test]
async fn group_of_only_self_is_an_empty_result() {
    let harness = TestHarness::new();
    let own_aci = ServiceId::aci(harness.device.aci);
    let group_id = GroupIdentifier("lonely".to_string());
    harness.groups.add_group(Group {
        group_identifier: group_id.clone(),
        master_key: vec![1; 32],
        revision: 1,
        members: vec![GroupMember { service_id: own_aci }],
        pending_members: Vec::new(),
    });
    let client = harness.client();

    let result = client
        .send_group_message(&group_id, data_message(1))
        .await
        .unwrap();
    assert!(result.successfully_sent_to.is_empty());
    assert!(result.failed_to_send_to.is_empty());
    assert_eq!(harness.authed_ws.request_count(), 0);
    assert_eq!(harness.unauthed_ws.request_count(), 0);
}

#[tokio::test]
async fn self_send_becomes_sync_only() {
    let harness = TestHarness::new();
    let own_aci = ServiceId::aci(harness.device.aci);
    harness
        .store
        .put_session(own_aci.address(1), SessionRecord::new(1));
    harness
        .store
        .put_session(own_aci.address(2), SessionRecord::new(2));
    let client = harness.client();

    let result = client.send_message(own_aci, data_message(555)).await;
    assert!(result.was_successful(), "{result:?}");

    // exactly one wire send: the sync record, on the authenticated socket
    assert_eq!(harness.unauthed_ws.request_count(), 0);
    let requests = harness.authed_ws.requests();
    assert_eq!(requests.len(), 1);
    let batch = batch_from(&requests[0]);
    assert_eq!(batch.messages.len(), 1);
    assert_eq!(batch.messages[0].destination_device_id, 2);

    let (_, plaintext) = harness.crypto.encrypted_plaintexts.lock().unwrap()[0].clone();
    let sync_content = decode_content(&plaintext);
    let sent = sync_content.sync_message.unwrap().sent.unwrap();
    assert_eq!(sent.timestamp, Some(555));
    assert!(sent.message.is_some());
}

#[tokio::test]
async fn self_send_without_other_devices_is_not_successful() {
    let harness = TestHarness::new();
    let own_aci = ServiceId::aci(harness.device.aci);
    harness
        .store
        .put_session(own_aci.address(1), SessionRecord::new(1));
    let client = harness.client();

    let result = client.send_message(own_aci, data_message(1)).await;
    let SendMessageResult::Failure(failure) = result else {
        panic!("expected failure without other devices");
    };
    assert!(matches!(failure.error, SendError::SyncCopyNotDelivered));
    assert_eq!(harness.authed_ws.request_count(), 0);
}

#[tokio::test]
async fn delivery_receipt_to_self_goes_to_the_wire_without_own_device() {
    let harness = TestHarness::new();
    let own_aci = ServiceId::aci(harness.device.aci);
    harness
        .store
        .put_session(own_aci.address(1), SessionRecord::new(1));
    harness
        .store
        .put_session(own_aci.address(2), SessionRecord::new(2));
    let client = harness.client();

    let result = client
        .send_message(own_aci, delivered_receipt_for_timestamps(vec![42]))
        .await;
    assert!(result.was_successful(), "{result:?}");

    let requests = harness.authed_ws.requests();
    assert_eq!(requests.len(), 1);
    let batch = batch_from(&requests[0]);
    assert!(!batch.urgent);
    assert_eq!(batch.messages.len(), 1);
    assert_eq!(batch.messages[0].destination_device_id, 2);
}

#[tokio::test]
async fn self_pni_send_is_rejected() {
    let harness = TestHarness::new();
    let own_pni = ServiceId::pni(harness.device.pni);
    let client = harness.client();

    let result = client.send_message(own_pni, data_message(1)).await;
    let SendMessageResult::Failure(failure) = result else {
        panic!("expected failure");
    };
    assert!(matches!(failure.error, SendError::SelfPniSend));
}

#[tokio::test]
async fn pni_recipient_is_never_sealed_and_enriches_the_outcome() {
    let harness = TestHarness::new();
    let pni = Uuid::new_v4();
    let recipient = ServiceId::pni(pni);
    harness
        .store
        .put_session(recipient.address(1), SessionRecord::new(7));
    harness
        .store
        .put_profile_key(pni, ProfileKey::new([9; 32]));
    harness
        .store
        .put_identity_key(recipient, IdentityKey::new(vec![5, 6, 7]));
    harness.store.put_recipient(Recipient {
        aci: None,
        pni: Some(pni),
        e164: Some("+15550199".to_string()),
        needs_pni_signature: false,
    });
    let client = harness.client();

    let result = client.send_message(recipient, data_message(1)).await;
    let SendMessageResult::Success(success) = result else {
        panic!("send failed: {result:?}");
    };
    assert!(!success.unidentified);
    assert_eq!(success.recipient_e164.as_deref(), Some("+15550199"));
    assert_eq!(
        success.destination_pni_identity_key.map(|k| k.serialize()),
        Some(vec![5, 6, 7])
    );
    assert_eq!(harness.unauthed_ws.request_count(), 0);
    assert_eq!(harness.authed_ws.request_count(), 1);
}

#[tokio::test]
async fn typing_is_suppressed_when_indicators_are_disabled() {
    let mut harness = TestHarness::new();
    harness.device.account_record = Some(AccountRecord {
        typing_indicators: Some(false),
        ..Default::default()
    });
    let recipient = ServiceId::aci(Uuid::new_v4());
    harness
        .store
        .put_session(recipient.address(1), SessionRecord::new(1));
    let client = harness.client();

    let result = client.send_message(recipient, typing_message(true)).await;
    assert!(result.was_successful(), "{result:?}");
    assert_eq!(harness.authed_ws.request_count(), 0);
    assert_eq!(harness.unauthed_ws.request_count(), 0);
}

#[tokio::test]
async fn disabled_read_receipts_still_sync_to_own_devices() {
    let mut harness = TestHarness::new();
    harness.device.account_record = Some(AccountRecord {
        read_receipts: Some(false),
        ..Default::default()
    });
    let own_aci = ServiceId::aci(harness.device.aci);
    let sender = ServiceId::aci(Uuid::new_v4());
    harness
        .store
        .put_session(own_aci.address(2), SessionRecord::new(2));
    harness
        .store
        .put_session(sender.address(1), SessionRecord::new(1));
    let client = harness.client();

    let result = client
        .send_message(sender, read_receipt_for_timestamps(vec![77]))
        .await;
    assert!(result.was_successful(), "{result:?}");

    // nothing to the sender, one sync record to ourselves
    let requests = harness.authed_ws.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].path.as_deref(),
        Some(format!("/v1/messages/{own_aci}").as_str())
    );
    let (_, plaintext) = harness.crypto.encrypted_plaintexts.lock().unwrap()[0].clone();
    let sync_content = decode_content(&plaintext);
    let sync = sync_content.sync_message.unwrap();
    assert_eq!(sync.read.len(), 1);
    assert_eq!(sync.read[0].timestamp, Some(77));
    assert_eq!(sync.read[0].sender_aci, Some(sender.uuid.to_string()));
}

#[tokio::test]
async fn pending_pni_signature_is_attached_and_cleared() {
    let harness = TestHarness::new();
    let recipient = ServiceId::aci(Uuid::new_v4());
    harness
        .store
        .put_session(recipient.address(1), SessionRecord::new(1));
    harness.store.put_recipient(Recipient {
        aci: Some(recipient.uuid),
        pni: None,
        e164: None,
        needs_pni_signature: true,
    });
    let client = harness.client();

    let result = client.send_message(recipient, data_message(1)).await;
    assert!(result.was_successful(), "{result:?}");

    let (_, plaintext) = harness.crypto.encrypted_plaintexts.lock().unwrap()[0].clone();
    let content = decode_content(&plaintext);
    let pni_signature = content.pni_signature_message.expect("signature attached");
    assert_eq!(
        pni_signature.pni.as_deref(),
        Some(harness.device.pni.as_bytes().as_slice())
    );
    assert_eq!(pni_signature.signature.as_deref(), Some(b"pni-signature".as_slice()));

    let stored = harness.store.recipient_by_aci(recipient.uuid).unwrap();
    assert!(!stored.needs_pni_signature);
}

#[tokio::test]
async fn first_send_to_unknown_recipient_fetches_prekeys_for_all_devices() {
    let harness = TestHarness::new();
    let recipient = ServiceId::aci(Uuid::new_v4());
    let client = harness.client();

    let result = client.send_message(recipient, data_message(1)).await;
    assert!(result.was_successful(), "{result:?}");
    assert_eq!(
        *harness.crypto.prekey_fetches.lock().unwrap(),
        vec![(recipient, -1)]
    );
    let batch = batch_from(&harness.authed_ws.requests()[0]);
    assert_eq!(batch.messages.len(), 1);
    assert_eq!(
        batch.messages[0].envelope_type,
        envelope::Type::PrekeyBundle as i32
    );
}
