use async_trait::async_trait;
use uuid::Uuid;

use crate::crypto::{IdentityKey, ProfileKey, SessionRecord};
use crate::store::error::Result;
use crate::types::{DeviceAddress, Recipient, ServiceId};

/// Session state per remote device. Records are created and advanced by the
/// crypto library; the send path enumerates and removes them.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// All known device sessions for one account, ordered by device id.
    async fn all_sessions_for_service_id(
        &self,
        service_id: ServiceId,
    ) -> Result<Vec<(DeviceAddress, SessionRecord)>>;

    async fn remove_session(&self, address: &DeviceAddress) -> Result<()>;
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn identity_key(&self, service_id: ServiceId) -> Result<Option<IdentityKey>>;
}

/// Contact records, addressable by either identity of the account.
#[async_trait]
pub trait RecipientStore: Send + Sync {
    async fn load_recipient(
        &self,
        aci: Option<Uuid>,
        pni: Option<Uuid>,
    ) -> Result<Option<Recipient>>;

    async fn save_recipient(&self, recipient: &Recipient) -> Result<()>;
}

#[async_trait]
pub trait ProfileKeyStore: Send + Sync {
    async fn profile_key(&self, user: Uuid) -> Result<Option<ProfileKey>>;
}
