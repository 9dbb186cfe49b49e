//! # a3s-chat
//!
//! Customer-side chat sessions against a contact-center service.
//!
//! ## Overview
//!
//! `a3s-chat` runs one customer chat end to end: it requests a participant
//! token, exchanges it for a duplex transport, subscribes to the chat
//! topic, refreshes the transport before its credential expires, and tears
//! everything down on leave. Incoming agent messages and lifecycle changes
//! are emitted as events for a view to render.
//!
//! ## Quick Start
//!
//! ```rust
//! use a3s_chat::{ChatConfig, ChatSession, ChatView};
//! use a3s_chat::provider::memory::{MemoryChatService, MemoryTransport};
//! use std::sync::Arc;
//!
//! # async fn example() -> a3s_chat::Result<()> {
//! let config = ChatConfig {
//!     instance_id: "instance".to_string(),
//!     contact_flow_id: "flow".to_string(),
//!     ..Default::default()
//! };
//! let (mut session, mut events) = ChatSession::new(
//!     Arc::new(config),
//!     Arc::new(MemoryChatService::default()),
//!     Arc::new(MemoryTransport::default()),
//! );
//! let mut view = ChatView::default();
//!
//! session.start("Ada", "Lovelace").await?;
//! while let Ok(event) = events.try_recv() {
//!     view.render(&event);
//! }
//! assert_eq!(view.log().lines(), &["System: Connecting..."]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Providers
//!
//! - **aws** — contact-center REST API (SigV4-signed initiation, bearer-token participant calls)
//! - **websocket** — duplex transport over WebSocket
//! - **memory** — scripted service and transport for tests and offline use
//!
//! ## Architecture
//!
//! - **ChatService** / **Transport** traits — contracts of the external collaborators
//! - **ChatSession** — the session lifecycle state machine
//! - **SessionEvent** — what the session tells the view
//! - **ChatView** — log, panels and send control, driven only by events

pub mod config;
pub mod error;
pub mod provider;
pub mod session;
pub mod types;
pub mod view;

// Re-export core types
pub use config::{AwsCredentials, ChatConfig, CredentialsConfig};
pub use error::{ChatError, Result};
pub use provider::{ChatService, Transport, TransportEvent, TransportHandle};
pub use session::{refresh_delay, ChatSession, Inbound, SessionEvent, SessionState};
pub use types::{
    ChatContact, ChatContent, ConnectionDescriptor, ConnectionToken, Envelope, Participant,
    ParticipantToken,
};
pub use view::{ChatLog, ChatView, Display, Focus, Panel};

// Re-export providers for convenience
pub use provider::aws::AwsChatService;
pub use provider::memory::{MemoryChatService, MemoryTransport};
pub use provider::websocket::WebSocketTransport;
