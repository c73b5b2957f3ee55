pub mod discovery;
pub mod envelope;
pub mod errors;
pub mod frame;
pub mod identity;
mod utils;

// Public re-exports for easy access
pub use discovery::{descriptor_path, BrokerDescriptor};
pub use envelope::Envelope;
pub use errors::ProtocolError;
pub use frame::{Frame, FrameType, PROTOCOL_VERSION};
pub use identity::RoutingId;
