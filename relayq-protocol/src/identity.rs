use std::fmt;

use bytes::Bytes;

use crate::ProtocolError;

/// Opaque routing token an endpoint assigns to each attached peer.
///
/// Travels as an 8 byte big-endian frame part whenever a frame crosses from
/// one endpoint to the other.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct RoutingId(u64);

impl RoutingId {
    pub const WIRE_LEN: usize = 8;

    pub fn new(raw: u64) -> Self {
        RoutingId(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn to_part(self) -> Bytes {
        Bytes::copy_from_slice(&self.0.to_be_bytes())
    }

    pub fn from_part(part: &[u8]) -> Result<Self, ProtocolError> {
        let raw: [u8; Self::WIRE_LEN] = part.try_into().map_err(|_| {
            ProtocolError::MalformedEnvelope(format!(
                "routing identity must be {} bytes, got {}",
                Self::WIRE_LEN,
                part.len()
            ))
        })?;
        Ok(RoutingId(u64::from_be_bytes(raw)))
    }
}

impl fmt::Display for RoutingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}
