//! WebSocket Real-Time Delivery
//!
//! Pushes live operational metrics to dashboard clients.
//!
//! ## Architecture
//!
//! - **SessionRegistry**: live sessions, company groups and topic subscribers
//! - **PushScheduler**: one recurring fetch-and-push job per session
//! - **ProtocolHandler**: interprets client commands, owns session teardown
//! - **Handler**: authenticated WebSocket upgrade and socket loop
//! - **Messages**: the envelope and client command formats
//!
//! ## Usage
//!
//! Clients connect to `/api/v1/ws?accessToken=<jwt>` and subscribe to one
//! feed at a time; a new subscription replaces the previous push job.
//!
//! ## Example
//!
//! ```javascript
//! // Browser
//! const ws = new WebSocket('ws://localhost:8082/api/v1/ws?accessToken=' + jwt);
//!
//! ws.onopen = () => {
//!   ws.send(JSON.stringify({action: 'subscribe', measurement: 'cpu', gatewayId: 'gw-1', interval: 10}));
//! };
//!
//! ws.onmessage = (event) => {
//!   const msg = JSON.parse(event.data);
//!   if (msg.type === 'realtime') render(msg.data);
//! };
//! ```

mod handler;
mod messages;
mod protocol;
mod registry;
mod scheduler;
mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use handler::websocket_handler;
pub use messages::{ClientCommand, Envelope, MessageType, ProtocolError};
pub use protocol::{IntervalPolicy, ProtocolHandler};
pub use registry::{EvictionListener, RegistryConfig, RegistryError, SessionRegistry};
pub use scheduler::{JobInfo, PushScheduler, SchedulerConfig};
pub use session::{SendError, Session, SessionId, SessionSink, TopicKey};
