//! Sender certificate retrieval and caching.
//!
//! Two cache slots, keyed by whether the certificate embeds the account's
//! E.164. A slot is served from cache while more than 24 hours of validity
//! remain; otherwise it is cleared and refetched.

use base64::Engine as _;
use base64::prelude::BASE64_STANDARD;
use chrono::{TimeDelta, Utc};
use log::{debug, warn};
use serde::Deserialize;

use crate::client::Client;
use crate::crypto::SenderCertificate;
use crate::net::HttpRequest;
use crate::send::SendError;

#[derive(Debug, Deserialize)]
struct DeliveryCertificateResponse {
    certificate: String,
}

impl Client {
    pub async fn sender_certificate(
        &self,
        include_e164: bool,
    ) -> Result<SenderCertificate, SendError> {
        let slot = if include_e164 {
            &self.sender_certificate_with_e164
        } else {
            &self.sender_certificate_no_e164
        };

        {
            let mut cached = slot.lock().await;
            if let Some(certificate) = cached.as_ref() {
                match certificate.expiration() {
                    Err(e) => {
                        warn!("Failed to check sender certificate expiry: {e}");
                        *cached = None;
                    }
                    Ok(expiration) if expiration - Utc::now() < TimeDelta::hours(24) => {
                        debug!("Sender certificate expiring soon, fetching a new one");
                        *cached = None;
                    }
                    Ok(_) => return Ok(certificate.clone()),
                }
            }
        }

        let (username, password) = self.store.basic_auth_creds();
        let mut path = "/v1/certificate/delivery".to_string();
        if !include_e164 {
            path.push_str("?includeE164=false");
        }
        let request = HttpRequest::get(path).with_basic_auth(&username, &password);
        let response = self.http.execute(request).await?;
        if response.status_code != 200 {
            return Err(SendError::UnexpectedStatus(u32::from(response.status_code)));
        }

        let body: DeliveryCertificateResponse = serde_json::from_slice(&response.body)?;
        let serialized = BASE64_STANDARD.decode(&body.certificate)?;
        let certificate = self.crypto.deserialize_sender_certificate(&serialized)?;
        *slot.lock().await = Some(certificate.clone());
        Ok(certificate)
    }
}
