use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Context;
use bytes::{Bytes, BytesMut};
use relayq_protocol::{descriptor_path, BrokerDescriptor, Envelope, Frame, FrameType, ProtocolError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub struct RelayqClient {
    stream: TcpStream,
    buf: BytesMut,
    correlation_id: u32,
}

impl RelayqClient {
    pub async fn connect(addr: &str) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("Failed to connect to RelayQ broker at {addr}"))?;

        Ok(RelayqClient {
            stream,
            buf: BytesMut::with_capacity(4096),
            correlation_id: 0,
        })
    }

    /// Reads `<brokers_dir>/<name>.json` and connects to the advertised port.
    /// A stale descriptor shows up here as a connection error.
    pub async fn discover(brokers_dir: &Path, name: &str) -> anyhow::Result<Self> {
        let path = descriptor_path(brokers_dir, name);
        let descriptor = BrokerDescriptor::load(&path)
            .with_context(|| format!("reading descriptor {:?}", path))?
            .with_context(|| format!("no broker named {name:?} in {:?}", brokers_dir))?;
        Self::connect(&descriptor.local_addr()).await
    }

    async fn send_frame(&mut self, frame: Frame) -> Result<u32, ProtocolError> {
        let correlation_id = frame.correlation_id;
        let mut out = BytesMut::new();
        frame.encode(&mut out);
        self.stream.write_all(&out).await?;
        self.stream.flush().await?;
        Ok(correlation_id)
    }

    fn next_correlation_id(&mut self) -> u32 {
        self.correlation_id = self.correlation_id.wrapping_add(1);
        self.correlation_id
    }

    /// Reads until the reply for `correlation_id`; replies to earlier,
    /// abandoned requests are skipped.
    async fn read_reply(&mut self, correlation_id: u32) -> Result<Frame, ProtocolError> {
        loop {
            while let Some(frame) = Frame::decode(&mut self.buf)? {
                if frame.correlation_id == correlation_id {
                    return Ok(frame);
                }
            }
            let n = self.stream.read_buf(&mut self.buf).await?;
            if n == 0 {
                return Err(ProtocolError::ConnectionClosed);
            }
        }
    }

    /// Sends `payload` to `service` and waits for the worker's response.
    pub async fn request(&mut self, service: &str, payload: &[u8]) -> Result<Bytes, ProtocolError> {
        let correlation_id = self.next_correlation_id();
        let frame = Frame::request(correlation_id, service, Bytes::copy_from_slice(payload));
        self.send_frame(frame).await?;

        let reply = self.read_reply(correlation_id).await?;
        let envelope = Envelope::from_parts(&reply.parts)?;
        match reply.frame_type {
            FrameType::Reply => Ok(envelope.payload),
            FrameType::Error => Err(ProtocolError::Remote(envelope.message())),
            other => Err(ProtocolError::MalformedEnvelope(format!(
                "unexpected {:?} in reply to request",
                other
            ))),
        }
    }

    /// Round trip to the broker itself; no worker is involved.
    pub async fn ping(&mut self) -> Result<Duration, ProtocolError> {
        let started = Instant::now();
        let correlation_id = self.next_correlation_id();
        self.send_frame(Frame::heartbeat(correlation_id, None)).await?;

        let reply = self.read_reply(correlation_id).await?;
        if reply.frame_type != FrameType::Heartbeat {
            return Err(ProtocolError::UnknownFrameType(reply.frame_type as u8));
        }
        Ok(started.elapsed())
    }
}
