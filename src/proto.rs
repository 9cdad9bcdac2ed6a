//! Hand-written prost mirrors of the upstream Signal protocol messages the
//! outbound pipeline touches. Field tags follow the upstream definitions so
//! payloads interoperate with real clients; messages and fields the pipeline
//! never reads are left out.

use prost::Message;

// Corresponds to SignalService.proto -> Content
#[derive(Clone, PartialEq, Message)]
pub struct Content {
    #[prost(message, optional, tag = "1")]
    pub data_message: Option<DataMessage>,
    #[prost(message, optional, tag = "2")]
    pub sync_message: Option<SyncMessage>,
    #[prost(message, optional, tag = "3")]
    pub call_message: Option<CallMessage>,
    #[prost(message, optional, tag = "4")]
    pub null_message: Option<NullMessage>,
    #[prost(message, optional, tag = "5")]
    pub receipt_message: Option<ReceiptMessage>,
    #[prost(message, optional, tag = "6")]
    pub typing_message: Option<TypingMessage>,
    #[prost(message, optional, tag = "9")]
    pub story_message: Option<StoryMessage>,
    #[prost(message, optional, tag = "10")]
    pub pni_signature_message: Option<PniSignatureMessage>,
    #[prost(message, optional, tag = "11")]
    pub edit_message: Option<EditMessage>,
}

// Corresponds to SignalService.proto -> DataMessage
#[derive(Clone, PartialEq, Message)]
pub struct DataMessage {
    #[prost(string, optional, tag = "1")]
    pub body: Option<String>,
    #[prost(uint32, optional, tag = "4")]
    pub flags: Option<u32>,
    #[prost(uint32, optional, tag = "5")]
    pub expire_timer: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "6")]
    pub profile_key: Option<Vec<u8>>,
    #[prost(uint64, optional, tag = "7")]
    pub timestamp: Option<u64>,
    #[prost(uint32, optional, tag = "12")]
    pub required_protocol_version: Option<u32>,
    #[prost(message, optional, tag = "15")]
    pub group_v2: Option<GroupContextV2>,
    #[prost(message, optional, tag = "16")]
    pub reaction: Option<data_message::Reaction>,
    #[prost(message, optional, tag = "17")]
    pub delete: Option<data_message::Delete>,
}

pub mod data_message {
    use prost::Message;

    #[derive(Clone, PartialEq, Message)]
    pub struct Reaction {
        #[prost(string, optional, tag = "1")]
        pub emoji: Option<String>,
        #[prost(bool, optional, tag = "2")]
        pub remove: Option<bool>,
        #[prost(string, optional, tag = "3")]
        pub target_author_aci: Option<String>,
        #[prost(uint64, optional, tag = "4")]
        pub target_sent_timestamp: Option<u64>,
    }

    #[derive(Clone, PartialEq, Message)]
    pub struct Delete {
        #[prost(uint64, optional, tag = "1")]
        pub target_sent_timestamp: Option<u64>,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum ProtocolVersion {
        Initial = 0,
        MessageTimers = 1,
        ViewOnce = 2,
        ViewOnceVideo = 3,
        Reactions = 4,
        CdnSelectorAttachments = 5,
        Mentions = 6,
        Payments = 7,
    }
}

// Corresponds to SignalService.proto -> EditMessage
#[derive(Clone, PartialEq, Message)]
pub struct EditMessage {
    #[prost(uint64, optional, tag = "1")]
    pub target_sent_timestamp: Option<u64>,
    #[prost(message, optional, tag = "2")]
    pub data_message: Option<DataMessage>,
}

// Corresponds to SignalService.proto -> ReceiptMessage
#[derive(Clone, PartialEq, Message)]
pub struct ReceiptMessage {
    #[prost(enumeration = "receipt_message::Type", optional, tag = "1")]
    pub r#type: Option<i32>,
    #[prost(uint64, repeated, packed = "false", tag = "2")]
    pub timestamp: Vec<u64>,
}

impl ReceiptMessage {
    pub fn receipt_type(&self) -> receipt_message::Type {
        self.r#type
            .and_then(|v| receipt_message::Type::try_from(v).ok())
            .unwrap_or(receipt_message::Type::Delivery)
    }
}

pub mod receipt_message {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        Delivery = 0,
        Read = 1,
        Viewed = 2,
    }
}

// Corresponds to SignalService.proto -> TypingMessage
#[derive(Clone, PartialEq, Message)]
pub struct TypingMessage {
    #[prost(uint64, optional, tag = "1")]
    pub timestamp: Option<u64>,
    #[prost(enumeration = "typing_message::Action", optional, tag = "2")]
    pub action: Option<i32>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub group_id: Option<Vec<u8>>,
}

pub mod typing_message {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Action {
        Started = 0,
        Stopped = 1,
    }
}

// Corresponds to SignalService.proto -> CallMessage. Only the offer is
// mirrored; call signaling beyond presence detection is out of scope here.
#[derive(Clone, PartialEq, Message)]
pub struct CallMessage {
    #[prost(message, optional, tag = "1")]
    pub offer: Option<call_message::Offer>,
}

pub mod call_message {
    use prost::Message;

    #[derive(Clone, PartialEq, Message)]
    pub struct Offer {
        #[prost(uint64, optional, tag = "1")]
        pub id: Option<u64>,
        #[prost(bytes = "vec", optional, tag = "4")]
        pub opaque: Option<Vec<u8>>,
    }
}

// Corresponds to SignalService.proto -> NullMessage
#[derive(Clone, PartialEq, Message)]
pub struct NullMessage {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub padding: Option<Vec<u8>>,
}

// Corresponds to SignalService.proto -> StoryMessage
#[derive(Clone, PartialEq, Message)]
pub struct StoryMessage {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub profile_key: Option<Vec<u8>>,
    #[prost(message, optional, tag = "2")]
    pub group: Option<GroupContextV2>,
    #[prost(bool, optional, tag = "5")]
    pub allows_replies: Option<bool>,
}

// Corresponds to SignalService.proto -> PniSignatureMessage
#[derive(Clone, PartialEq, Message)]
pub struct PniSignatureMessage {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub pni: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub signature: Option<Vec<u8>>,
}

// Corresponds to Groups.proto -> GroupContextV2
#[derive(Clone, PartialEq, Message)]
pub struct GroupContextV2 {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub master_key: Option<Vec<u8>>,
    #[prost(uint32, optional, tag = "2")]
    pub revision: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub group_change: Option<Vec<u8>>,
}

// Corresponds to SignalService.proto -> SyncMessage
#[derive(Clone, PartialEq, Message)]
pub struct SyncMessage {
    #[prost(message, optional, tag = "1")]
    pub sent: Option<sync_message::Sent>,
    #[prost(message, optional, tag = "4")]
    pub request: Option<sync_message::Request>,
    #[prost(message, repeated, tag = "5")]
    pub read: Vec<sync_message::Read>,
}

pub mod sync_message {
    use prost::Message;

    #[derive(Clone, PartialEq, Message)]
    pub struct Sent {
        #[prost(string, optional, tag = "1")]
        pub destination_e164: Option<String>,
        #[prost(string, optional, tag = "7")]
        pub destination_service_id: Option<String>,
        #[prost(uint64, optional, tag = "2")]
        pub timestamp: Option<u64>,
        #[prost(message, optional, tag = "3")]
        pub message: Option<super::DataMessage>,
        #[prost(uint64, optional, tag = "4")]
        pub expiration_start_timestamp: Option<u64>,
        #[prost(message, repeated, tag = "5")]
        pub unidentified_status: Vec<sent::UnidentifiedDeliveryStatus>,
        #[prost(bool, optional, tag = "6")]
        pub is_recipient_update: Option<bool>,
        #[prost(message, optional, tag = "10")]
        pub edit_message: Option<super::EditMessage>,
    }

    pub mod sent {
        use prost::Message;

        #[derive(Clone, PartialEq, Message)]
        pub struct UnidentifiedDeliveryStatus {
            #[prost(string, optional, tag = "3")]
            pub destination_service_id: Option<String>,
            #[prost(bool, optional, tag = "2")]
            pub unidentified: Option<bool>,
            #[prost(bytes = "vec", optional, tag = "4")]
            pub destination_pni_identity_key: Option<Vec<u8>>,
        }
    }

    #[derive(Clone, PartialEq, Message)]
    pub struct Request {
        #[prost(enumeration = "request::Type", optional, tag = "1")]
        pub r#type: Option<i32>,
    }

    pub mod request {
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
        )]
        #[repr(i32)]
        pub enum Type {
            Unknown = 0,
            Contacts = 1,
            Blocked = 3,
            Configuration = 4,
            Keys = 5,
        }
    }

    #[derive(Clone, PartialEq, Message)]
    pub struct Read {
        #[prost(uint64, optional, tag = "2")]
        pub timestamp: Option<u64>,
        #[prost(string, optional, tag = "3")]
        pub sender_aci: Option<String>,
    }
}

// Corresponds to SignalService.proto -> Envelope. Only the type enum is
// needed on the sending side; it names the wire framing of each payload.
pub mod envelope {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        Unknown = 0,
        Ciphertext = 1,
        KeyExchange = 2,
        PrekeyBundle = 3,
        Receipt = 5,
        UnidentifiedSender = 6,
        PlaintextContent = 8,
    }
}

// Corresponds to the storage service AccountRecord; only the toggles the
// send path consults are mirrored.
#[derive(Clone, PartialEq, Message)]
pub struct AccountRecord {
    #[prost(bool, optional, tag = "6")]
    pub read_receipts: Option<bool>,
    #[prost(bool, optional, tag = "8")]
    pub typing_indicators: Option<bool>,
    #[prost(
        enumeration = "account_record::PhoneNumberSharingMode",
        optional,
        tag = "12"
    )]
    pub phone_number_sharing_mode: Option<i32>,
}

pub mod account_record {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum PhoneNumberSharingMode {
        Unknown = 0,
        Everybody = 1,
        Nobody = 2,
    }
}

// Corresponds to WebSocketResources.proto -> WebSocketRequestMessage
#[derive(Clone, PartialEq, Message)]
pub struct WebSocketRequestMessage {
    #[prost(string, optional, tag = "1")]
    pub verb: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub path: Option<String>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub body: Option<Vec<u8>>,
    #[prost(string, repeated, tag = "5")]
    pub headers: Vec<String>,
    #[prost(uint64, optional, tag = "4")]
    pub id: Option<u64>,
}

// Corresponds to WebSocketResources.proto -> WebSocketResponseMessage
#[derive(Clone, PartialEq, Message)]
pub struct WebSocketResponseMessage {
    #[prost(uint64, optional, tag = "1")]
    pub id: Option<u64>,
    #[prost(uint32, optional, tag = "2")]
    pub status: Option<u32>,
    #[prost(string, optional, tag = "3")]
    pub message: Option<String>,
    #[prost(string, repeated, tag = "5")]
    pub headers: Vec<String>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub body: Option<Vec<u8>>,
}
