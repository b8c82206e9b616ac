//! Test doubles shared by the websocket unit tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::messages::{Envelope, MessageType};
use super::session::{SendError, SessionSink};
use crate::auth::{AuthError, ConnectionContext, IdentityService};
use crate::provider::{MetricPoint, ProviderError, RealtimeDataProvider};

pub fn context(company: &str) -> ConnectionContext {
    ConnectionContext {
        company: company.to_string(),
        identity: "alice".to_string(),
        role: "user".to_string(),
        token: "token".to_string(),
    }
}

#[derive(Default)]
struct SinkState {
    texts: Vec<String>,
    closed: bool,
    fail: bool,
    stall: bool,
}

/// Handle for inspecting what a [`RecordingSink`] received
#[derive(Clone, Default)]
pub struct Frames(Arc<Mutex<SinkState>>);

impl Frames {
    pub fn texts(&self) -> Vec<String> {
        self.0.lock().unwrap().texts.clone()
    }

    pub fn envelopes(&self) -> Vec<Envelope> {
        self.texts()
            .iter()
            .map(|t| serde_json::from_str(t).unwrap())
            .collect()
    }

    pub fn count(&self, kind: MessageType) -> usize {
        self.envelopes().iter().filter(|e| e.kind == kind).count()
    }

    pub fn is_closed(&self) -> bool {
        self.0.lock().unwrap().closed
    }

    pub fn fail_sends(&self) {
        self.0.lock().unwrap().fail = true;
    }

    pub fn stall_sends(&self) {
        self.0.lock().unwrap().stall = true;
    }
}

/// In-memory sink recording every frame written to it
pub struct RecordingSink {
    frames: Frames,
}

impl RecordingSink {
    pub fn new() -> (Self, Frames) {
        let frames = Frames::default();
        (
            Self {
                frames: frames.clone(),
            },
            frames,
        )
    }
}

#[async_trait]
impl SessionSink for RecordingSink {
    async fn send_text(&mut self, text: String) -> Result<(), SendError> {
        let (fail, stall) = {
            let state = self.frames.0.lock().unwrap();
            (state.fail, state.stall)
        };
        if stall {
            std::future::pending::<()>().await;
        }
        if fail {
            return Err(SendError::Transport("connection reset".to_string()));
        }
        self.frames.0.lock().unwrap().texts.push(text);
        Ok(())
    }

    async fn close(&mut self) {
        self.frames.0.lock().unwrap().closed = true;
    }
}

/// Provider replaying scripted results; repeats success once the script is exhausted
#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<Vec<MetricPoint>, ProviderError>>>,
    calls: Mutex<Vec<(String, String, String)>>,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, result: Result<Vec<MetricPoint>, ProviderError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<(String, String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RealtimeDataProvider for ScriptedProvider {
    async fn fetch_realtime(
        &self,
        company: &str,
        measurement: &str,
        gateway_id: &str,
    ) -> Result<Vec<MetricPoint>, ProviderError> {
        self.calls.lock().unwrap().push((
            company.to_string(),
            measurement.to_string(),
            gateway_id.to_string(),
        ));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(vec![MetricPoint::new(1_700_000_000_000).field("value", 1.0)]))
    }
}

/// Identity service placing every caller in one company
pub struct StaticIdentity(pub Option<String>);

#[async_trait]
impl IdentityService for StaticIdentity {
    async fn resolve_company_scope(
        &self,
        _identity: &str,
        _role: &str,
        _token: &str,
    ) -> Result<Option<String>, AuthError> {
        Ok(self.0.clone())
    }
}
