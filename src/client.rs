use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::error;
use tokio::sync::Mutex;

use crate::crypto::{SenderCertificate, SignalCrypto};
use crate::groups::GroupResolver;
use crate::net::{HttpClient, SignalWebSocket};
use crate::store::{
    DeviceData, IdentityStore, ProfileKeyStore, RecipientStore, SessionStore, Stores,
};

/// A logged-in device of one Signal account, wired to its stores, its crypto
/// library and its two websockets. All collaborators are injected; the
/// client owns only caching and coordination state.
pub struct Client {
    pub store: DeviceData,

    pub(crate) sessions: Arc<dyn SessionStore>,
    pub(crate) identities: Arc<dyn IdentityStore>,
    pub(crate) recipients: Arc<dyn RecipientStore>,
    pub(crate) profile_keys: Arc<dyn ProfileKeyStore>,
    pub(crate) groups: Arc<dyn GroupResolver>,
    pub(crate) crypto: Arc<dyn SignalCrypto>,

    pub(crate) authed_ws: Arc<dyn SignalWebSocket>,
    pub(crate) unauthed_ws: Arc<dyn SignalWebSocket>,
    pub(crate) http: Arc<dyn HttpClient>,

    /// Serializes every encrypt-all-devices step. Ratchet state for one
    /// session must never be advanced by two encrypt calls in parallel, and
    /// sessions for different recipients can share store write-back paths.
    pub(crate) encryption_lock: Mutex<()>,

    pub(crate) sender_certificate_with_e164: Mutex<Option<SenderCertificate>>,
    pub(crate) sender_certificate_no_e164: Mutex<Option<SenderCertificate>>,

    pub(crate) last_contact_request_time: Mutex<Option<DateTime<Utc>>>,
}

impl Client {
    pub fn new(
        store: DeviceData,
        stores: Stores,
        crypto: Arc<dyn SignalCrypto>,
        groups: Arc<dyn GroupResolver>,
        authed_ws: Arc<dyn SignalWebSocket>,
        unauthed_ws: Arc<dyn SignalWebSocket>,
        http: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            store,
            sessions: stores.sessions,
            identities: stores.identities,
            recipients: stores.recipients,
            profile_keys: stores.profile_keys,
            groups,
            crypto,
            authed_ws,
            unauthed_ws,
            http,
            encryption_lock: Mutex::new(()),
            sender_certificate_with_e164: Mutex::new(None),
            sender_certificate_no_e164: Mutex::new(None),
            last_contact_request_time: Mutex::new(None),
        }
    }

    /// How many devices beyond this one the local account has sessions
    /// with. Gate for sync-copy emission; store errors count as none.
    pub(crate) async fn other_device_count(&self) -> usize {
        match self
            .sessions
            .all_sessions_for_service_id(self.store.aci_service_id())
            .await
        {
            Ok(sessions) => sessions
                .iter()
                .filter(|(address, _)| address.device_id != self.store.device_id)
                .count(),
            Err(e) => {
                error!("Failed to list own sessions: {e}");
                0
            }
        }
    }
}
