//! Transport seams: the two message websockets and the plain HTTP client
//! used for certificate fetches. Implementations own connection lifecycle,
//! framing and timeouts; the pipeline only exchanges request/response pairs.

use std::collections::HashMap;

use async_trait::async_trait;
use base64::Engine as _;
use base64::prelude::BASE64_STANDARD;
use thiserror::Error;

pub use crate::proto::{WebSocketRequestMessage, WebSocketResponseMessage};

#[derive(Debug, Error)]
pub enum NetError {
    #[error("websocket request failed: {0}")]
    Socket(String),

    #[error("http request failed: {0}")]
    Http(String),

    #[error("request timed out")]
    Timeout,
}

/// A connected Signal websocket able to run request/response exchanges.
/// The client holds one authenticated and one unidentified instance.
#[async_trait]
pub trait SignalWebSocket: Send + Sync {
    async fn send_request(
        &self,
        request: WebSocketRequestMessage,
    ) -> Result<WebSocketResponseMessage, NetError>;
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, NetError>;
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub path: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: "GET".to_string(),
            headers: HashMap::new(),
            body: None,
        }
    }

    pub fn with_basic_auth(mut self, username: &str, password: &str) -> Self {
        let credentials = BASE64_STANDARD.encode(format!("{username}:{password}"));
        self.headers
            .insert("Authorization".to_string(), format!("Basic {credentials}"));
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status_code: u16,
    pub body: Vec<u8>,
}

pub fn create_ws_request(verb: &str, path: &str, body: Vec<u8>) -> WebSocketRequestMessage {
    WebSocketRequestMessage {
        verb: Some(verb.to_string()),
        path: Some(path.to_string()),
        body: Some(body),
        headers: Vec::new(),
        id: None,
    }
}

/// Looks up a header in the `Name:value` list carried by websocket
/// request/response messages.
pub(crate) fn find_header<'a>(headers: &'a [String], name: &str) -> Option<&'a str> {
    headers.iter().find_map(|header| {
        let (key, value) = header.split_once(':')?;
        key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
    })
}
