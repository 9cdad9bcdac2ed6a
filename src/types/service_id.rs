use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use uuid::Uuid;

/// Which identity namespace a service id lives in. An account has one of
/// each; only the ACI is tied to profile keys and sealed sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceIdKind {
    Aci,
    Pni,
}

/// A tagged account identifier: an ACI or PNI UUID.
///
/// The canonical string form is the bare lowercase UUID for an ACI and
/// `PNI:<uuid>` for a PNI, which is also what the server expects in URL
/// paths and sync message fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId {
    pub kind: ServiceIdKind,
    pub uuid: Uuid,
}

impl ServiceId {
    pub fn aci(uuid: Uuid) -> Self {
        Self {
            kind: ServiceIdKind::Aci,
            uuid,
        }
    }

    pub fn pni(uuid: Uuid) -> Self {
        Self {
            kind: ServiceIdKind::Pni,
            uuid,
        }
    }

    pub fn is_aci(&self) -> bool {
        self.kind == ServiceIdKind::Aci
    }

    pub fn is_pni(&self) -> bool {
        self.kind == ServiceIdKind::Pni
    }

    /// The address of one device of this account.
    pub fn address(&self, device_id: u32) -> DeviceAddress {
        DeviceAddress {
            service_id: *self,
            device_id,
        }
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ServiceIdKind::Aci => write!(f, "{}", self.uuid),
            ServiceIdKind::Pni => write!(f, "PNI:{}", self.uuid),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceIdError {
    #[error("invalid service id: {0}")]
    InvalidFormat(String),
}

impl FromStr for ServiceId {
    type Err = ServiceIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, raw) = match s.strip_prefix("PNI:") {
            Some(rest) => (ServiceIdKind::Pni, rest),
            None => (ServiceIdKind::Aci, s),
        };
        let uuid =
            Uuid::parse_str(raw).map_err(|_| ServiceIdError::InvalidFormat(s.to_string()))?;
        Ok(Self { kind, uuid })
    }
}

/// One device of one account. Device ids start at 1; the primary device
/// is always 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceAddress {
    pub service_id: ServiceId,
    pub device_id: u32,
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.service_id, self.device_id)
    }
}
