pub mod error;
pub mod memory;
pub mod traits;

use std::sync::Arc;

use uuid::Uuid;

pub use error::{Result, StoreError};
pub use traits::{IdentityStore, ProfileKeyStore, RecipientStore, SessionStore};

use crate::proto::AccountRecord;
use crate::types::ServiceId;

/// The local account as far as sending is concerned: both identities, the
/// device slot this client occupies and the account-level toggles synced
/// from the primary.
#[derive(Debug, Clone)]
pub struct DeviceData {
    pub aci: Uuid,
    pub pni: Uuid,
    pub device_id: u32,
    /// E.164 phone number of the account.
    pub number: String,
    pub password: String,
    pub account_record: Option<AccountRecord>,
}

impl DeviceData {
    pub fn aci_service_id(&self) -> ServiceId {
        ServiceId::aci(self.aci)
    }

    pub fn pni_service_id(&self) -> ServiceId {
        ServiceId::pni(self.pni)
    }

    /// Credentials for authenticated HTTP endpoints.
    pub fn basic_auth_creds(&self) -> (String, String) {
        (
            format!("{}.{}", self.number, self.device_id),
            self.password.clone(),
        )
    }
}

/// Bundle of store capabilities injected into the client. Stores provide
/// their own concurrency control; each call is independently atomic.
#[derive(Clone)]
pub struct Stores {
    pub sessions: Arc<dyn SessionStore>,
    pub identities: Arc<dyn IdentityStore>,
    pub recipients: Arc<dyn RecipientStore>,
    pub profile_keys: Arc<dyn ProfileKeyStore>,
}
