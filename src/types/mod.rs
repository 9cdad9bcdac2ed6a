pub mod recipient;
pub mod service_id;

pub use recipient::Recipient;
pub use service_id::{DeviceAddress, ServiceId, ServiceIdKind};
