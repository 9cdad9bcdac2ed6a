pub mod certs;
pub mod client;
pub mod crypto;
pub mod groups;
pub mod messages;
pub mod net;
pub mod padding;
pub mod proto;
pub mod send;
pub mod store;
pub mod sync;
pub mod types;

pub mod test_utils;

pub use client::Client;
pub use send::{
    FailedSendResult, GroupMessageSendResult, SendError, SendMessageResult, SuccessfulSendResult,
};
