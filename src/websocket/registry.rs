//! Session Registry
//!
//! Source of truth for live sessions, their company grouping and per-topic
//! subscriber sets. Structural locks are only held for map updates; frames are
//! written after the locks are released, under each session's own writer lock.

use async_trait::async_trait;
use futures_util::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

use super::messages::Envelope;
use super::session::{SendError, Session, SessionId, TopicKey};

/// Configuration for the session registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum number of concurrent sessions
    pub max_sessions: usize,
    /// Upper bound on a single frame write before the session is dropped
    pub send_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_sessions: 10_000,
            send_timeout: Duration::from_secs(10),
        }
    }
}

/// Told about sessions the registry drops after a failed write
#[async_trait]
pub trait EvictionListener: Send + Sync {
    async fn session_evicted(&self, session_id: &str);
}

/// Registry of live sessions and subscriptions
pub struct SessionRegistry {
    /// Active sessions: SessionId → Session
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    /// Company scope → SessionIds
    companies: RwLock<HashMap<String, HashSet<SessionId>>>,
    /// Topic → subscribed SessionIds
    topics: RwLock<HashMap<TopicKey, HashSet<SessionId>>>,
    /// Owner of per-session work that must stop on eviction
    eviction_listener: OnceLock<Weak<dyn EvictionListener>>,
    config: RegistryConfig,
}

// Lock order is always sessions → companies → topics.
impl SessionRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            companies: RwLock::new(HashMap::new()),
            topics: RwLock::new(HashMap::new()),
            eviction_listener: OnceLock::new(),
            config,
        }
    }

    /// Register the component notified when a failed write evicts a session
    pub fn set_eviction_listener(&self, listener: Weak<dyn EvictionListener>) {
        if self.eviction_listener.set(listener).is_err() {
            tracing::warn!("Eviction listener already registered, ignoring");
        }
    }

    /// Register a session and add it to its company group
    pub async fn add_session(&self, session: Arc<Session>) -> Result<(), RegistryError> {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.config.max_sessions {
            return Err(RegistryError::TooManySessions(self.config.max_sessions));
        }

        let id = session.id().to_string();
        let company = session.company().to_string();
        sessions.insert(id.clone(), Arc::clone(&session));

        self.companies
            .write()
            .await
            .entry(company.clone())
            .or_default()
            .insert(id.clone());

        tracing::info!(
            session_id = %id,
            company = %company,
            identity = %session.identity(),
            role = %session.role(),
            "Session registered"
        );
        Ok(())
    }

    /// Remove a session from every structure and close it
    ///
    /// Safe to call repeatedly; returns `true` only for the call that
    /// actually removed the session.
    pub async fn remove_session(&self, id: &str) -> bool {
        let removed = {
            let mut sessions = self.sessions.write().await;
            let mut companies = self.companies.write().await;
            let mut topics = self.topics.write().await;

            let Some(session) = sessions.remove(id) else {
                return false;
            };

            if let Some(members) = companies.get_mut(session.company()) {
                members.remove(id);
                if members.is_empty() {
                    companies.remove(session.company());
                }
            }

            topics.retain(|_, subscribers| {
                subscribers.remove(id);
                !subscribers.is_empty()
            });

            session
        };

        removed.close().await;
        tracing::info!(
            session_id = %id,
            company = %removed.company(),
            "Session removed"
        );
        true
    }

    /// Look up a live session
    pub async fn get_session(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Add a session to a topic's subscriber set
    pub async fn subscribe_to_topic(
        &self,
        session_id: &str,
        topic: TopicKey,
    ) -> Result<(), RegistryError> {
        // Holding the sessions read lock keeps removal from interleaving.
        let sessions = self.sessions.read().await;
        if !sessions.contains_key(session_id) {
            return Err(RegistryError::SessionNotFound(session_id.to_string()));
        }

        let mut topics = self.topics.write().await;
        topics
            .entry(topic.clone())
            .or_default()
            .insert(session_id.to_string());

        tracing::debug!(session_id = %session_id, topic = %topic, "Subscribed to topic");
        Ok(())
    }

    /// Remove a session from a topic's subscriber set, pruning empty topics
    ///
    /// Returns whether the session was subscribed.
    pub async fn unsubscribe_from_topic(&self, session_id: &str, topic: &TopicKey) -> bool {
        let mut topics = self.topics.write().await;
        let Some(subscribers) = topics.get_mut(topic) else {
            return false;
        };

        let removed = subscribers.remove(session_id);
        if subscribers.is_empty() {
            topics.remove(topic);
        }

        if removed {
            tracing::debug!(session_id = %session_id, topic = %topic, "Unsubscribed from topic");
        }
        removed
    }

    /// Deliver an envelope to one session
    ///
    /// A failed write tears the session down.
    pub async fn send_to_session(
        &self,
        id: &str,
        envelope: &Envelope,
    ) -> Result<(), RegistryError> {
        let session = self
            .get_session(id)
            .await
            .ok_or_else(|| RegistryError::SessionNotFound(id.to_string()))?;
        let text = envelope.to_text()?;
        self.deliver(&session, text).await
    }

    /// Deliver to every session of a company; returns the number delivered
    pub async fn send_to_company(&self, company: &str, envelope: &Envelope) -> usize {
        let targets = {
            let sessions = self.sessions.read().await;
            let companies = self.companies.read().await;
            collect(&sessions, companies.get(company))
        };
        self.deliver_all(targets, envelope).await
    }

    /// Deliver to every subscriber of a topic; returns the number delivered
    pub async fn send_to_topic(&self, topic: &TopicKey, envelope: &Envelope) -> usize {
        let targets = {
            let sessions = self.sessions.read().await;
            let topics = self.topics.read().await;
            collect(&sessions, topics.get(topic))
        };
        self.deliver_all(targets, envelope).await
    }

    /// Deliver to every live session; returns the number delivered
    pub async fn broadcast_to_all(&self, envelope: &Envelope) -> usize {
        let targets: Vec<Arc<Session>> = self.sessions.read().await.values().cloned().collect();
        self.deliver_all(targets, envelope).await
    }

    async fn deliver_all(&self, targets: Vec<Arc<Session>>, envelope: &Envelope) -> usize {
        if targets.is_empty() {
            return 0;
        }

        let text = match envelope.to_text() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize envelope");
                return 0;
            }
        };

        let results = join_all(
            targets
                .iter()
                .map(|session| self.deliver(session, text.clone())),
        )
        .await;

        results.iter().filter(|r| r.is_ok()).count()
    }

    async fn deliver(&self, session: &Session, text: String) -> Result<(), RegistryError> {
        match session.send(text, self.config.send_timeout).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(
                    session_id = %session.id(),
                    error = %e,
                    "Delivery failed, removing session"
                );
                self.evict(session.id()).await;
                Err(RegistryError::Send(e))
            }
        }
    }

    /// Remove a session after a transport failure and stop its work
    async fn evict(&self, id: &str) {
        self.remove_session(id).await;
        if let Some(listener) = self.eviction_listener.get().and_then(Weak::upgrade) {
            listener.session_evicted(id).await;
        }
    }

    /// Get the current session count
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Get the session count for one company
    pub async fn company_session_count(&self, company: &str) -> usize {
        self.companies
            .read()
            .await
            .get(company)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// Session counts for every company with live sessions
    pub async fn company_counts(&self) -> HashMap<String, usize> {
        self.companies
            .read()
            .await
            .iter()
            .map(|(company, ids)| (company.clone(), ids.len()))
            .collect()
    }

    /// Get the subscriber count for a topic
    pub async fn topic_subscriber_count(&self, topic: &TopicKey) -> usize {
        self.topics
            .read()
            .await
            .get(topic)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// Number of topics with at least one subscriber
    pub async fn topic_count(&self) -> usize {
        self.topics.read().await.len()
    }
}

fn collect(
    sessions: &HashMap<SessionId, Arc<Session>>,
    ids: Option<&HashSet<SessionId>>,
) -> Vec<Arc<Session>> {
    ids.map(|ids| ids.iter().filter_map(|id| sessions.get(id).cloned()).collect())
        .unwrap_or_default()
}

/// Errors that can occur in the session registry
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Too many sessions (limit: {0})")]
    TooManySessions(usize),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Failed to serialize message: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to send message: {0}")]
    Send(#[from] SendError),
}
