use bytes::Bytes;

use crate::core::error::TaskError;

/// What a pool worker runs for each request it is handed.
///
/// Handlers run on the blocking thread pool, so they may do synchronous
/// work. An `Err` goes back to the client as an error frame.
pub trait TaskHandler: Send + Sync + 'static {
    fn handle(&self, payload: Bytes) -> Result<Bytes, TaskError>;
}

impl<F> TaskHandler for F
where
    F: Fn(Bytes) -> Result<Bytes, TaskError> + Send + Sync + 'static,
{
    fn handle(&self, payload: Bytes) -> Result<Bytes, TaskError> {
        self(payload)
    }
}

/// Replies with the request payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct Echo;

impl TaskHandler for Echo {
    fn handle(&self, payload: Bytes) -> Result<Bytes, TaskError> {
        Ok(payload)
    }
}

/// Answers `ping` with `pong` and rejects everything else.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ping;

impl TaskHandler for Ping {
    fn handle(&self, payload: Bytes) -> Result<Bytes, TaskError> {
        if payload.as_ref() == b"ping" {
            Ok(Bytes::from_static(b"pong"))
        } else {
            Err(TaskError::Unsupported(
                String::from_utf8_lossy(&payload).into_owned(),
            ))
        }
    }
}
