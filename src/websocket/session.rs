//! Live Sessions
//!
//! A [`Session`] is one admitted WebSocket connection. It owns the write half
//! of the socket behind its own mutex, so every writer (scheduler tick,
//! protocol reply, operator notice) is serialized per connection.

use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::auth::ConnectionContext;

/// Unique identifier for a session, stable for the process lifetime
pub type SessionId = String;

/// One logical real-time feed: `(company, measurement, gatewayId)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicKey {
    pub company: String,
    pub measurement: String,
    pub gateway_id: String,
}

impl TopicKey {
    pub fn new(
        company: impl Into<String>,
        measurement: impl Into<String>,
        gateway_id: impl Into<String>,
    ) -> Self {
        Self {
            company: company.into(),
            measurement: measurement.into(),
            gateway_id: gateway_id.into(),
        }
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.company, self.measurement, self.gateway_id)
    }
}

/// Write half of a connection
///
/// Implemented over the axum socket sink in production and over in-memory
/// recorders in tests.
#[async_trait]
pub trait SessionSink: Send {
    /// Write one text frame
    async fn send_text(&mut self, text: String) -> Result<(), SendError>;

    /// Close the underlying transport, ignoring errors
    async fn close(&mut self);
}

/// Errors writing to a session
#[derive(Debug, Error)]
pub enum SendError {
    #[error("Session is closed")]
    Closed,

    #[error("Write timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// An established, authenticated connection
pub struct Session {
    id: SessionId,
    context: ConnectionContext,
    open: AtomicBool,
    /// Per-session write lock; `None` once the session has been closed
    writer: Mutex<Option<Box<dyn SessionSink>>>,
}

impl Session {
    /// Create a session with a fresh id
    pub fn new(context: ConnectionContext, sink: Box<dyn SessionSink>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), context, sink)
    }

    pub fn with_id(
        id: impl Into<SessionId>,
        context: ConnectionContext,
        sink: Box<dyn SessionSink>,
    ) -> Self {
        Self {
            id: id.into(),
            context,
            open: AtomicBool::new(true),
            writer: Mutex::new(Some(sink)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn company(&self) -> &str {
        &self.context.company
    }

    pub fn identity(&self) -> &str {
        &self.context.identity
    }

    pub fn role(&self) -> &str {
        &self.context.role
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Write a text frame under the session's write lock
    ///
    /// A write that does not complete within `timeout` is treated as a
    /// transport failure so a stalled consumer cannot hold the lock forever.
    pub async fn send(&self, text: String, timeout: Duration) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::Closed);
        }

        let mut writer = self.writer.lock().await;
        let sink = writer.as_mut().ok_or(SendError::Closed)?;

        match tokio::time::timeout(timeout, sink.send_text(text)).await {
            Ok(result) => result,
            Err(_) => Err(SendError::Timeout(timeout)),
        }
    }

    /// Mark the session closed and release its writer
    ///
    /// Returns `true` only for the call that actually performed the close.
    pub async fn close(&self) -> bool {
        if !self.open.swap(false, Ordering::AcqRel) {
            return false;
        }

        let sink = self.writer.lock().await.take();
        if let Some(mut sink) = sink {
            sink.close().await;
        }
        true
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("company", &self.context.company)
            .field("identity", &self.context.identity)
            .field("open", &self.is_open())
            .finish()
    }
}
