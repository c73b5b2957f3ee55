/*
[ version: u8 ]
[ frame_type: u8 ]
[ correlation_id: u32 ]
[ part_count: u16 ]
[ body_len: u32 ]
[ checksum: u32 ]   xxh32 over the body
[ body: part_count x ([ len: u32 ][ bytes ]) ]
*/

use bytes::{Buf, BufMut, Bytes, BytesMut};
use xxhash_rust::xxh32::xxh32;

use crate::identity::RoutingId;
use crate::utils::{read_bytes, read_u32};
use crate::ProtocolError;

pub const PROTOCOL_VERSION: u8 = 1;
pub const HEADER_LEN: usize = 16;
pub const MAX_BODY_LEN: usize = 16 * 1024 * 1024;

#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameType {
    Request = 1,
    Reply = 2,
    Error = 3,
    Heartbeat = 4,
    Ready = 5,
    Disconnect = 6,
}

impl TryFrom<u8> for FrameType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, ProtocolError> {
        match value {
            1 => Ok(FrameType::Request),
            2 => Ok(FrameType::Reply),
            3 => Ok(FrameType::Error),
            4 => Ok(FrameType::Heartbeat),
            5 => Ok(FrameType::Ready),
            6 => Ok(FrameType::Disconnect),
            _ => Err(ProtocolError::UnknownFrameType(value)),
        }
    }
}

/// A multi-part message. Endpoints prepend the sender's routing identity as
/// part 0 when a frame crosses into the broker and strip it on the way out.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Frame {
    pub version: u8,
    pub frame_type: FrameType,
    pub correlation_id: u32, // Matches request to reply
    pub parts: Vec<Bytes>,
}

impl Frame {
    pub fn new(frame_type: FrameType, correlation_id: u32, parts: Vec<Bytes>) -> Self {
        Frame {
            version: PROTOCOL_VERSION,
            frame_type,
            correlation_id,
            parts,
        }
    }

    pub fn request(correlation_id: u32, service: &str, payload: Bytes) -> Self {
        Self::new(
            FrameType::Request,
            correlation_id,
            vec![Bytes::copy_from_slice(service.as_bytes()), payload],
        )
    }

    pub fn reply(correlation_id: u32, service: &str, payload: Bytes) -> Self {
        Self::new(
            FrameType::Reply,
            correlation_id,
            vec![Bytes::copy_from_slice(service.as_bytes()), payload],
        )
    }

    pub fn error(correlation_id: u32, service: &str, message: &str) -> Self {
        Self::new(
            FrameType::Error,
            correlation_id,
            vec![
                Bytes::copy_from_slice(service.as_bytes()),
                Bytes::copy_from_slice(message.as_bytes()),
            ],
        )
    }

    /// Workers heartbeat with their service name; clients probe with no parts.
    pub fn heartbeat(correlation_id: u32, service: Option<&str>) -> Self {
        let parts = service
            .map(|s| vec![Bytes::copy_from_slice(s.as_bytes())])
            .unwrap_or_default();
        Self::new(FrameType::Heartbeat, correlation_id, parts)
    }

    pub fn ready(service: &str) -> Self {
        Self::new(
            FrameType::Ready,
            0,
            vec![Bytes::copy_from_slice(service.as_bytes())],
        )
    }

    pub fn disconnect() -> Self {
        Self::new(FrameType::Disconnect, 0, Vec::new())
    }

    pub fn push_identity(&mut self, identity: RoutingId) {
        self.parts.insert(0, identity.to_part());
    }

    pub fn pop_identity(&mut self) -> Result<RoutingId, ProtocolError> {
        if self.parts.is_empty() {
            return Err(ProtocolError::MalformedEnvelope(
                "missing routing identity part".into(),
            ));
        }
        let part = self.parts.remove(0);
        RoutingId::from_part(&part)
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        let body_len: usize = self.parts.iter().map(|p| 4 + p.len()).sum();
        let mut body = BytesMut::with_capacity(body_len);
        for part in &self.parts {
            body.put_u32(part.len() as u32);
            body.extend_from_slice(part);
        }

        buf.reserve(HEADER_LEN + body.len());
        buf.put_u8(self.version);
        buf.put_u8(self.frame_type as u8);
        buf.put_u32(self.correlation_id);
        buf.put_u16(self.parts.len() as u16);
        buf.put_u32(body.len() as u32);
        buf.put_u32(xxh32(&body, 0));
        buf.extend_from_slice(&body);
    }

    /// Returns `Ok(None)` and leaves `buf` untouched until a whole frame is buffered.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut cursor = &buf[..];

        let version = cursor.get_u8();
        let frame_type_raw = cursor.get_u8();
        let correlation_id = cursor.get_u32();
        let part_count = cursor.get_u16() as usize;
        let body_len = cursor.get_u32() as usize;
        let checksum_expected = cursor.get_u32();

        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }
        if body_len > MAX_BODY_LEN {
            return Err(ProtocolError::FrameTooLarge(body_len));
        }
        if cursor.remaining() < body_len {
            return Ok(None);
        }

        buf.advance(HEADER_LEN);
        let body = buf.split_to(body_len).freeze();

        let checksum_actual = xxh32(&body, 0);
        if checksum_actual != checksum_expected {
            return Err(ProtocolError::ChecksumMismatch {
                expected: checksum_expected,
                found: checksum_actual,
            });
        }

        Ok(Some(Frame {
            version,
            frame_type: FrameType::try_from(frame_type_raw)?,
            correlation_id,
            parts: split_parts(&body, part_count)?,
        }))
    }
}

fn split_parts(body: &Bytes, part_count: usize) -> Result<Vec<Bytes>, ProtocolError> {
    let mut parts = Vec::with_capacity(part_count);
    let mut cursor: &[u8] = body;

    for _ in 0..part_count {
        let len = read_u32(&mut cursor)? as usize;
        let start = body.len() - cursor.len();
        read_bytes(&mut cursor, len)?;
        parts.push(body.slice(start..start + len));
    }

    if !cursor.is_empty() {
        return Err(ProtocolError::MalformedEnvelope(format!(
            "{} trailing bytes after {} parts",
            cursor.len(),
            part_count
        )));
    }
    Ok(parts)
}
