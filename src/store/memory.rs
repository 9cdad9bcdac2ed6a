//! In-memory store backend. Backs unit and scenario tests; a real client
//! would plug in a persistent implementation of the same traits.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use crate::crypto::{IdentityKey, ProfileKey, SessionRecord};
use crate::store::error::Result;
use crate::store::traits::{IdentityStore, ProfileKeyStore, RecipientStore, SessionStore};
use crate::types::{DeviceAddress, Recipient, ServiceId};

#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<ServiceId, BTreeMap<u32, SessionRecord>>>,
    identities: RwLock<HashMap<ServiceId, IdentityKey>>,
    recipients: RwLock<Vec<Recipient>>,
    profile_keys: RwLock<HashMap<Uuid, ProfileKey>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_session(&self, address: DeviceAddress, record: SessionRecord) {
        self.sessions
            .write()
            .unwrap()
            .entry(address.service_id)
            .or_default()
            .insert(address.device_id, record);
    }

    pub fn session(&self, address: &DeviceAddress) -> Option<SessionRecord> {
        self.sessions
            .read()
            .unwrap()
            .get(&address.service_id)
            .and_then(|devices| devices.get(&address.device_id))
            .cloned()
    }

    pub fn has_session(&self, address: &DeviceAddress) -> bool {
        self.session(address).is_some()
    }

    pub fn put_identity_key(&self, service_id: ServiceId, key: IdentityKey) {
        self.identities.write().unwrap().insert(service_id, key);
    }

    pub fn put_recipient(&self, recipient: Recipient) {
        let mut recipients = self.recipients.write().unwrap();
        match recipients.iter_mut().find(|r| same_account(r, &recipient)) {
            Some(existing) => *existing = recipient,
            None => recipients.push(recipient),
        }
    }

    pub fn recipient_by_aci(&self, aci: Uuid) -> Option<Recipient> {
        self.recipients
            .read()
            .unwrap()
            .iter()
            .find(|r| r.aci == Some(aci))
            .cloned()
    }

    pub fn put_profile_key(&self, user: Uuid, key: ProfileKey) {
        self.profile_keys.write().unwrap().insert(user, key);
    }
}

fn same_account(a: &Recipient, b: &Recipient) -> bool {
    (a.aci.is_some() && a.aci == b.aci) || (a.pni.is_some() && a.pni == b.pni)
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn all_sessions_for_service_id(
        &self,
        service_id: ServiceId,
    ) -> Result<Vec<(DeviceAddress, SessionRecord)>> {
        let sessions = self.sessions.read().unwrap();
        Ok(sessions
            .get(&service_id)
            .map(|devices| {
                devices
                    .iter()
                    .map(|(&device_id, record)| (service_id.address(device_id), record.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn remove_session(&self, address: &DeviceAddress) -> Result<()> {
        if let Some(devices) = self.sessions.write().unwrap().get_mut(&address.service_id) {
            devices.remove(&address.device_id);
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn identity_key(&self, service_id: ServiceId) -> Result<Option<IdentityKey>> {
        Ok(self.identities.read().unwrap().get(&service_id).cloned())
    }
}

#[async_trait]
impl RecipientStore for MemoryStore {
    async fn load_recipient(
        &self,
        aci: Option<Uuid>,
        pni: Option<Uuid>,
    ) -> Result<Option<Recipient>> {
        let recipients = self.recipients.read().unwrap();
        Ok(recipients
            .iter()
            .find(|r| {
                (aci.is_some() && r.aci == aci) || (pni.is_some() && r.pni == pni)
            })
            .cloned())
    }

    async fn save_recipient(&self, recipient: &Recipient) -> Result<()> {
        self.put_recipient(recipient.clone());
        Ok(())
    }
}

#[async_trait]
impl ProfileKeyStore for MemoryStore {
    async fn profile_key(&self, user: Uuid) -> Result<Option<ProfileKey>> {
        Ok(self.profile_keys.read().unwrap().get(&user).cloned())
    }
}
