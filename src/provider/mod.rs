//! Chat provider traits for the contracts of the external collaborators
//!
//! A session talks to two opaque backends: a `ChatService` (initiation,
//! connection exchange, send, disconnect) and a `Transport` that opens the
//! duplex connection named by the connection descriptor. Swap backends
//! (the contact-center REST API, in-memory fakes) without changing the
//! session.

use crate::error::Result;
use crate::types::{ChatContact, ConnectionDescriptor, ConnectionToken, ParticipantToken};
use async_trait::async_trait;
use tokio::sync::mpsc;

pub mod aws;
pub mod memory;
pub mod websocket;

/// Request/response services behind a chat session
///
/// The token parameters are typed so that a connection token can never
/// reach the initiation or exchange calls, and a participant token can
/// never reach the messaging calls.
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Start a chat contact for `display_name`, returning the participant token
    async fn start_chat_contact(
        &self,
        instance_id: &str,
        contact_flow_id: &str,
        display_name: &str,
    ) -> Result<ChatContact>;

    /// Exchange a participant token for a transport descriptor
    async fn create_participant_connection(
        &self,
        participant_token: &ParticipantToken,
    ) -> Result<ConnectionDescriptor>;

    /// Send a message on behalf of the participant
    async fn send_message(
        &self,
        connection_token: &ConnectionToken,
        content_type: &str,
        content: &str,
    ) -> Result<()>;

    /// Notify the service that the participant left
    async fn disconnect_participant(&self, connection_token: &ConnectionToken) -> Result<()>;

    /// Provider name (e.g., "aws", "memory")
    fn name(&self) -> &str;
}

/// Events pushed by an open duplex connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame arrived
    Frame(String),
    /// The connection reported an error
    Error(String),
    /// The connection ended
    Closed,
}

/// Opens duplex connections
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to `url`, pushing every inbound event to `events`
    ///
    /// Returns once the connection is open and ready to send.
    async fn open(
        &self,
        url: &str,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn TransportHandle>>;
}

/// A live duplex connection
#[async_trait]
pub trait TransportHandle: Send {
    /// Send a text frame
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Close the connection and stop delivering events
    async fn close(&mut self) -> Result<()>;
}
