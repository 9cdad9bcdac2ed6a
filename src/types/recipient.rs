use uuid::Uuid;

/// Locally stored contact state for one account, keyed by ACI and/or PNI.
///
/// `needs_pni_signature` is set when the account was first reached through
/// its phone number; the next content-bearing message must carry a
/// PNI-signs-ACI identity proof, after which the flag is cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipient {
    pub aci: Option<Uuid>,
    pub pni: Option<Uuid>,
    pub e164: Option<String>,
    pub needs_pni_signature: bool,
}
