use bytes::Bytes;

use crate::utils::utf8;
use crate::ProtocolError;

/// The `[service, payload]` pair every request and reply carries once the
/// routing identity has been stripped.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Envelope {
    pub service: String,
    pub payload: Bytes,
}

impl Envelope {
    pub fn from_parts(parts: &[Bytes]) -> Result<Self, ProtocolError> {
        match parts {
            [service, payload] => Ok(Envelope {
                service: service_name(service)?,
                payload: payload.clone(),
            }),
            _ => Err(ProtocolError::MalformedEnvelope(format!(
                "expected [service, payload], got {} parts",
                parts.len()
            ))),
        }
    }

    pub fn into_parts(self) -> Vec<Bytes> {
        vec![Bytes::from(self.service.into_bytes()), self.payload]
    }

    /// Error frames carry a UTF-8 message where the payload would be.
    pub fn message(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

pub fn service_name(part: &[u8]) -> Result<String, ProtocolError> {
    let name = utf8(part, "service name")?;
    if name.is_empty() {
        return Err(ProtocolError::MalformedEnvelope("empty service name".into()));
    }
    Ok(name)
}

/// Ready and heartbeat frames from workers carry exactly `[service]`.
pub fn single_service(parts: &[Bytes]) -> Result<String, ProtocolError> {
    match parts {
        [service] => service_name(service),
        _ => Err(ProtocolError::MalformedEnvelope(format!(
            "expected [service], got {} parts",
            parts.len()
        ))),
    }
}
