//! Mock collaborators and a ready-made client harness for exercising the
//! pipeline without a server or a real crypto library.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::Engine as _;
use base64::prelude::BASE64_STANDARD;
use chrono::{TimeDelta, Utc};
use uuid::Uuid;

use crate::client::Client;
use crate::crypto::{
    ALL_DEVICES, CiphertextMessage, ContentHint, CryptoError, SenderCertificate, SessionRecord,
    SignalCrypto,
};
use crate::groups::{Group, GroupIdentifier, GroupResolver};
use crate::net::{
    HttpClient, HttpRequest, HttpResponse, NetError, SignalWebSocket, WebSocketRequestMessage,
    WebSocketResponseMessage,
};
use crate::store::memory::MemoryStore;
use crate::store::{DeviceData, StoreError, Stores};
use crate::store::error::Result as StoreResult;
use crate::types::{DeviceAddress, ServiceId};

/// Scripted websocket: responses are served in FIFO order, defaulting to an
/// empty 200 once the script runs out. Every request is recorded.
#[derive(Default)]
pub struct MockWebSocket {
    requests: Mutex<Vec<WebSocketRequestMessage>>,
    responses: Mutex<VecDeque<WebSocketResponseMessage>>,
}

impl MockWebSocket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_response(&self, status: u32, body: &[u8]) {
        self.queue_response_with_headers(status, body, Vec::new());
    }

    pub fn queue_response_with_headers(&self, status: u32, body: &[u8], headers: Vec<String>) {
        self.responses
            .lock()
            .unwrap()
            .push_back(WebSocketResponseMessage {
                id: Some(1),
                status: Some(status),
                message: None,
                headers,
                body: Some(body.to_vec()),
            });
    }

    pub fn requests(&self) -> Vec<WebSocketRequestMessage> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl SignalWebSocket for MockWebSocket {
    async fn send_request(
        &self,
        request: WebSocketRequestMessage,
    ) -> Result<WebSocketResponseMessage, NetError> {
        self.requests.lock().unwrap().push(request);
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(WebSocketResponseMessage {
                id: Some(1),
                status: Some(200),
                message: None,
                headers: Vec::new(),
                body: Some(b"{}".to_vec()),
            }))
    }
}

/// Serves `/v1/certificate/delivery` with a fresh fake certificate per hit.
#[derive(Default)]
pub struct MockHttpClient {
    pub hits: AtomicUsize,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|request| request.path.clone())
            .collect()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, NetError> {
        let hit = self.hits.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        let certificate = BASE64_STANDARD.encode(format!("test-certificate-{hit}"));
        Ok(HttpResponse {
            status_code: 200,
            body: format!(r#"{{"certificate":"{certificate}"}}"#).into_bytes(),
        })
    }
}

/// Fake crypto library over a [`MemoryStore`]: pre-key fetches create
/// sessions, encrypts return tagged placeholder bytes and record the
/// plaintext they were handed.
pub struct MockSignalCrypto {
    store: Arc<MemoryStore>,
    pub prekey_fetches: Mutex<Vec<(ServiceId, i32)>>,
    pub failing_prekey_users: Mutex<HashSet<Uuid>>,
    /// Addresses whose session came from a pre-key fetch; encrypting for
    /// them yields a pre-key message, like a real fresh session would.
    pub prekey_sessions: Mutex<HashSet<DeviceAddress>>,
    pub encrypted_plaintexts: Mutex<Vec<(DeviceAddress, Vec<u8>)>>,
    pub sealed_plaintexts: Mutex<Vec<(DeviceAddress, Vec<u8>)>>,
    next_registration_id: AtomicU32,
}

impl MockSignalCrypto {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            prekey_fetches: Mutex::new(Vec::new()),
            failing_prekey_users: Mutex::new(HashSet::new()),
            prekey_sessions: Mutex::new(HashSet::new()),
            encrypted_plaintexts: Mutex::new(Vec::new()),
            sealed_plaintexts: Mutex::new(Vec::new()),
            next_registration_id: AtomicU32::new(100),
        }
    }

    pub fn fail_prekey_fetches_for(&self, user: Uuid) {
        self.failing_prekey_users.lock().unwrap().insert(user);
    }

    fn create_session(&self, address: DeviceAddress) {
        let registration_id = self.next_registration_id.fetch_add(1, Ordering::SeqCst);
        self.store
            .put_session(address, SessionRecord::new(registration_id));
        self.prekey_sessions.lock().unwrap().insert(address);
    }
}

#[async_trait]
impl SignalCrypto for MockSignalCrypto {
    async fn encrypt(
        &self,
        address: &DeviceAddress,
        padded_plaintext: &[u8],
    ) -> Result<CiphertextMessage, CryptoError> {
        self.encrypted_plaintexts
            .lock()
            .unwrap()
            .push((*address, padded_plaintext.to_vec()));
        let bytes = format!("ratchet:{address}").into_bytes();
        if self.prekey_sessions.lock().unwrap().contains(address) {
            Ok(CiphertextMessage::PreKeySignalMessage(bytes))
        } else {
            Ok(CiphertextMessage::SignalMessage(bytes))
        }
    }

    async fn sealed_sender_encrypt(
        &self,
        address: &DeviceAddress,
        padded_plaintext: &[u8],
        _content_hint: ContentHint,
        _certificate: &SenderCertificate,
    ) -> Result<Vec<u8>, CryptoError> {
        self.sealed_plaintexts
            .lock()
            .unwrap()
            .push((*address, padded_plaintext.to_vec()));
        Ok(format!("sealed:{address}").into_bytes())
    }

    async fn fetch_and_process_pre_key(
        &self,
        recipient: ServiceId,
        device_id: i32,
    ) -> Result<(), CryptoError> {
        self.prekey_fetches
            .lock()
            .unwrap()
            .push((recipient, device_id));
        if self
            .failing_prekey_users
            .lock()
            .unwrap()
            .contains(&recipient.uuid)
        {
            return Err(CryptoError::Backend("pre-key fetch failed".to_string()));
        }
        if device_id == ALL_DEVICES {
            self.create_session(recipient.address(1));
        } else {
            self.create_session(recipient.address(device_id as u32));
        }
        Ok(())
    }

    async fn sign_alternate_identity(&self) -> Result<Vec<u8>, CryptoError> {
        Ok(b"pni-signature".to_vec())
    }

    fn deserialize_sender_certificate(
        &self,
        serialized: &[u8],
    ) -> Result<SenderCertificate, CryptoError> {
        Ok(SenderCertificate::new(
            serialized.to_vec(),
            Some(Utc::now() + TimeDelta::days(7)),
        ))
    }
}

/// Resolves exactly the groups it was given.
#[derive(Default)]
pub struct StaticGroupResolver {
    groups: Mutex<Vec<Group>>,
}

impl StaticGroupResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_group(&self, group: Group) {
        self.groups.lock().unwrap().push(group);
    }
}

#[async_trait]
impl GroupResolver for StaticGroupResolver {
    async fn retrieve_group_by_id(&self, group_id: &GroupIdentifier) -> StoreResult<Group> {
        self.groups
            .lock()
            .unwrap()
            .iter()
            .find(|group| &group.group_identifier == group_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(group_id.to_string()))
    }
}

/// Everything a test needs to drive a [`Client`]: the shared memory store
/// plus handles to every mock collaborator.
pub struct TestHarness {
    pub device: DeviceData,
    pub store: Arc<MemoryStore>,
    pub crypto: Arc<MockSignalCrypto>,
    pub groups: Arc<StaticGroupResolver>,
    pub authed_ws: Arc<MockWebSocket>,
    pub unauthed_ws: Arc<MockWebSocket>,
    pub http: Arc<MockHttpClient>,
}

impl TestHarness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            device: DeviceData {
                aci: Uuid::new_v4(),
                pni: Uuid::new_v4(),
                device_id: 1,
                number: "+15550100".to_string(),
                password: "test-password".to_string(),
                account_record: None,
            },
            crypto: Arc::new(MockSignalCrypto::new(store.clone())),
            groups: Arc::new(StaticGroupResolver::new()),
            authed_ws: Arc::new(MockWebSocket::new()),
            unauthed_ws: Arc::new(MockWebSocket::new()),
            http: Arc::new(MockHttpClient::new()),
            store,
        }
    }

    pub fn client(&self) -> Client {
        Client::new(
            self.device.clone(),
            Stores {
                sessions: self.store.clone(),
                identities: self.store.clone(),
                recipients: self.store.clone(),
                profile_keys: self.store.clone(),
            },
            self.crypto.clone(),
            self.groups.clone(),
            self.authed_ws.clone(),
            self.unauthed_ws.clone(),
            self.http.clone(),
        )
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
