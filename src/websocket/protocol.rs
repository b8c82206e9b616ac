//! Protocol Handler
//!
//! Per-connection state machine. Interprets client commands and drives the
//! registry and scheduler:
//!
//! | action        | effect                                         | reply            |
//! |---------------|------------------------------------------------|------------------|
//! | `subscribe`   | replace the push job, add topic membership     | subscribe ack    |
//! | `unsubscribe` | drop topic membership, cancel the push job     | unsubscribe ack  |
//! | `ping`        | none                                           | `pong`           |
//! | anything else | none                                           | error, stay open |

use std::sync::Arc;
use std::time::Duration;

use super::messages::{ClientCommand, Envelope, ProtocolError};
use super::registry::{RegistryError, SessionRegistry};
use super::scheduler::PushScheduler;
use super::session::{Session, TopicKey};

/// Allowed push cadence for subscriptions, in seconds
#[derive(Debug, Clone, Copy)]
pub struct IntervalPolicy {
    pub min_secs: u64,
    pub max_secs: u64,
    pub default_secs: u64,
}

impl Default for IntervalPolicy {
    fn default() -> Self {
        Self {
            min_secs: 5,
            max_secs: 60,
            default_secs: 10,
        }
    }
}

impl IntervalPolicy {
    /// Resolve a requested interval, applying the default when absent
    pub fn resolve(&self, requested: Option<i64>) -> Result<u64, ProtocolError> {
        let Some(interval) = requested else {
            return Ok(self.default_secs);
        };

        if interval < self.min_secs as i64 || interval > self.max_secs as i64 {
            return Err(ProtocolError::IntervalOutOfRange {
                interval,
                min: self.min_secs,
                max: self.max_secs,
            });
        }
        Ok(interval as u64)
    }
}

/// Drives one connection's lifecycle against the shared registry and scheduler
pub struct ProtocolHandler {
    registry: Arc<SessionRegistry>,
    scheduler: Arc<PushScheduler>,
    intervals: IntervalPolicy,
}

impl ProtocolHandler {
    pub fn new(
        registry: Arc<SessionRegistry>,
        scheduler: Arc<PushScheduler>,
        intervals: IntervalPolicy,
    ) -> Self {
        Self {
            registry,
            scheduler,
            intervals,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn scheduler(&self) -> &Arc<PushScheduler> {
        &self.scheduler
    }

    /// Register an authenticated session and greet it
    pub async fn open(&self, session: Arc<Session>) -> Result<(), RegistryError> {
        self.registry.add_session(Arc::clone(&session)).await?;

        let greeting = Envelope::connection_success(session.id(), session.company());
        self.registry.send_to_session(session.id(), &greeting).await
    }

    /// Handle one text frame from the client
    pub async fn handle_text(&self, session: &Arc<Session>, text: &str) {
        let reply = match ClientCommand::parse(text) {
            Ok(command) => self.handle_command(session, command).await,
            Err(e) => {
                tracing::debug!(session_id = %session.id(), error = %e, "Invalid client message");
                Some(Envelope::error(e.to_string()))
            }
        };

        if let Some(reply) = reply {
            self.reply(session, &reply).await;
        }
    }

    /// Binary frames are not part of the protocol
    pub async fn handle_binary(&self, session: &Arc<Session>) {
        self.reply(session, &Envelope::error(ProtocolError::Binary.to_string()))
            .await;
    }

    /// Tear the session down: cancel its job, then remove it everywhere
    ///
    /// Safe to call more than once; only the first call has any effect.
    pub async fn close(&self, session_id: &str) {
        self.scheduler.cancel(session_id).await;
        if self.registry.remove_session(session_id).await {
            tracing::info!(session_id = %session_id, "Session closed");
        }
    }

    async fn handle_command(
        &self,
        session: &Arc<Session>,
        command: ClientCommand,
    ) -> Option<Envelope> {
        match command {
            ClientCommand::Subscribe {
                measurement,
                gateway_id,
                interval,
            } => {
                let interval = match self.intervals.resolve(interval) {
                    Ok(secs) => secs,
                    Err(e) => return Some(Envelope::error(e.to_string())),
                };
                let topic = TopicKey::new(session.company(), measurement, gateway_id);
                self.subscribe(session, topic, interval).await
            }
            ClientCommand::Unsubscribe {
                measurement,
                gateway_id,
            } => Some(self.unsubscribe(session, measurement, gateway_id).await),
            ClientCommand::Ping => Some(Envelope::pong()),
        }
    }

    async fn subscribe(
        &self,
        session: &Arc<Session>,
        topic: TopicKey,
        interval: u64,
    ) -> Option<Envelope> {
        self.scheduler.cancel(session.id()).await;

        if let Err(e) = self
            .registry
            .subscribe_to_topic(session.id(), topic.clone())
            .await
        {
            tracing::debug!(session_id = %session.id(), error = %e, "Subscribe on dead session");
            return None;
        }

        // Acknowledge before the first push goes out
        self.reply(session, &Envelope::subscribe_success(&topic, interval))
            .await;

        if session.is_open() {
            self.scheduler
                .schedule(Arc::clone(session), topic, Duration::from_secs(interval))
                .await;
        }
        None
    }

    async fn unsubscribe(
        &self,
        session: &Arc<Session>,
        measurement: Option<String>,
        gateway_id: Option<String>,
    ) -> Envelope {
        let active = self.scheduler.cancel(session.id()).await;

        let topic = match (measurement, gateway_id) {
            (Some(measurement), Some(gateway_id)) => {
                Some(TopicKey::new(session.company(), measurement, gateway_id))
            }
            _ => active,
        };

        if let Some(topic) = &topic {
            self.registry.unsubscribe_from_topic(session.id(), topic).await;
        }

        Envelope::unsubscribe_success(topic.as_ref())
    }

    async fn reply(&self, session: &Session, envelope: &Envelope) {
        if let Err(e) = self.registry.send_to_session(session.id(), envelope).await {
            tracing::debug!(session_id = %session.id(), error = %e, "Reply not delivered");
        }
    }
}
