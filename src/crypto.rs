//! Seam to the underlying Signal protocol library.
//!
//! Ratchet state, identity keys and sealed-sender encryption are a black box
//! behind [`SignalCrypto`]; the pipeline hands it padded plaintext and gets
//! back opaque ciphertext. The small value types here exist so stores and
//! results can carry crypto material without exposing its internals.

use aes_gcm::Aes256Gcm;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{DeviceAddress, ServiceId};

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("crypto backend failure: {0}")]
    Backend(String),
    #[error("sender certificate is malformed")]
    MalformedCertificate,
    #[error("access key derivation failed")]
    AccessKeyDerivation,
}

/// Device id wildcard for pre-key fetches: establish sessions with every
/// device of the account instead of one.
pub const ALL_DEVICES: i32 = -1;

pub const PROFILE_KEY_LEN: usize = 32;
pub const ACCESS_KEY_LEN: usize = 16;

/// How much an unsealed envelope may reveal about a sealed payload to a
/// recipient that failed to decrypt it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentHint {
    Default,
    /// Provisioned for resend requests; unused until a resend store exists.
    Resendable,
    Implicit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CiphertextMessageType {
    PreKey,
    Whisper,
    SenderKey,
    Plaintext,
}

/// Output of a ratchet encrypt: the serialized message plus which wire
/// framing it needs.
#[derive(Debug, Clone)]
pub enum CiphertextMessage {
    PreKeySignalMessage(Vec<u8>),
    SignalMessage(Vec<u8>),
    SenderKeyMessage(Vec<u8>),
    PlaintextContent(Vec<u8>),
}

impl CiphertextMessage {
    pub fn message_type(&self) -> CiphertextMessageType {
        match self {
            CiphertextMessage::PreKeySignalMessage(_) => CiphertextMessageType::PreKey,
            CiphertextMessage::SignalMessage(_) => CiphertextMessageType::Whisper,
            CiphertextMessage::SenderKeyMessage(_) => CiphertextMessageType::SenderKey,
            CiphertextMessage::PlaintextContent(_) => CiphertextMessageType::Plaintext,
        }
    }

    pub fn serialized(&self) -> &[u8] {
        match self {
            CiphertextMessage::PreKeySignalMessage(bytes)
            | CiphertextMessage::SignalMessage(bytes)
            | CiphertextMessage::SenderKeyMessage(bytes)
            | CiphertextMessage::PlaintextContent(bytes) => bytes,
        }
    }
}

/// Opaque per-device ratchet state. The send path only ever reads the
/// remote registration id; everything else belongs to the crypto library.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    remote_registration_id: u32,
}

impl SessionRecord {
    pub fn new(remote_registration_id: u32) -> Self {
        Self {
            remote_registration_id,
        }
    }

    pub fn remote_registration_id(&self) -> u32 {
        self.remote_registration_id
    }
}

/// Signed credential authorizing sealed-sender delivery. Short-lived; the
/// certificate cache refreshes it well before expiry.
#[derive(Debug, Clone)]
pub struct SenderCertificate {
    serialized: Vec<u8>,
    expiration: Option<DateTime<Utc>>,
}

impl SenderCertificate {
    pub fn new(serialized: Vec<u8>, expiration: Option<DateTime<Utc>>) -> Self {
        Self {
            serialized,
            expiration,
        }
    }

    pub fn expiration(&self) -> Result<DateTime<Utc>, CryptoError> {
        self.expiration.ok_or(CryptoError::MalformedCertificate)
    }

    pub fn serialized(&self) -> &[u8] {
        &self.serialized
    }
}

/// A serialized public identity key, as stored per service id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityKey(Vec<u8>);

impl IdentityKey {
    pub fn new(serialized: Vec<u8>) -> Self {
        Self(serialized)
    }

    pub fn serialize(&self) -> Vec<u8> {
        self.0.clone()
    }
}

/// Per-account profile key; the unidentified access key is derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileKey([u8; PROFILE_KEY_LEN]);

impl ProfileKey {
    pub fn new(bytes: [u8; PROFILE_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn slice(&self) -> &[u8] {
        &self.0
    }

    /// The unidentified access key: AES-256-GCM over a zero block under
    /// this profile key with a zero nonce, truncated to 16 bytes.
    pub fn derive_access_key(&self) -> Result<AccessKey, CryptoError> {
        let cipher =
            Aes256Gcm::new_from_slice(&self.0).map_err(|_| CryptoError::AccessKeyDerivation)?;
        let nonce = [0u8; 12];
        let zeroes = [0u8; ACCESS_KEY_LEN];
        let ciphertext = cipher
            .encrypt(
                aes_gcm::Nonce::from_slice(&nonce),
                Payload {
                    msg: &zeroes,
                    aad: &[],
                },
            )
            .map_err(|_| CryptoError::AccessKeyDerivation)?;
        let mut key = [0u8; ACCESS_KEY_LEN];
        key.copy_from_slice(&ciphertext[..ACCESS_KEY_LEN]);
        Ok(AccessKey(key))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessKey(pub [u8; ACCESS_KEY_LEN]);

/// The black-box crypto library. Session and identity stores live behind
/// this boundary; every method is a suspension point.
#[async_trait]
pub trait SignalCrypto: Send + Sync {
    /// Ratchet-encrypt for one device, advancing its session state.
    async fn encrypt(
        &self,
        address: &DeviceAddress,
        padded_plaintext: &[u8],
    ) -> Result<CiphertextMessage, CryptoError>;

    /// Sealed-sender encrypt for one device under the given certificate.
    async fn sealed_sender_encrypt(
        &self,
        address: &DeviceAddress,
        padded_plaintext: &[u8],
        content_hint: ContentHint,
        certificate: &SenderCertificate,
    ) -> Result<Vec<u8>, CryptoError>;

    /// Fetch a pre-key bundle from the server and establish a session.
    /// `device_id` may be [`ALL_DEVICES`] to cover the whole account.
    async fn fetch_and_process_pre_key(
        &self,
        recipient: ServiceId,
        device_id: i32,
    ) -> Result<(), CryptoError>;

    /// Sign the local ACI identity key with the PNI identity key pair.
    async fn sign_alternate_identity(&self) -> Result<Vec<u8>, CryptoError>;

    fn deserialize_sender_certificate(
        &self,
        serialized: &[u8],
    ) -> Result<SenderCertificate, CryptoError>;
}
