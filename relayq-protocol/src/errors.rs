use std::io::Error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Unknown frame type: {0}")]
    UnknownFrameType(u8),

    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    #[error("Frame body of {0} bytes exceeds the frame size limit")]
    FrameTooLarge(usize),

    #[error("Checksum Mismatch expected: {expected} found: {found} ")]
    ChecksumMismatch { expected: u32, found: u32 },

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("IoError :{0} ")]
    IoError(#[from] Error),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Connection closed by peer")]
    ConnectionClosed,
}

#[derive(Debug, Error)]
pub enum DeserializeError {
    #[error("Unexpected end of input")]
    UnexpectedEOF,

    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),
}

impl From<DeserializeError> for ProtocolError {
    fn from(e: DeserializeError) -> Self {
        ProtocolError::MalformedEnvelope(e.to_string())
    }
}
