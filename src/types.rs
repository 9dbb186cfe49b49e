//! Wire types for the chat services and the duplex transport
//!
//! Service bodies use the PascalCase field names of the contact-center
//! API. Transport envelopes use camelCase; the chat content nested inside
//! an envelope is itself a JSON document encoded as a string.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Content type of plain text chat messages
pub const TEXT_PLAIN: &str = "text/plain";

/// Content type of envelopes that carry chat content
pub const APPLICATION_JSON: &str = "application/json";

/// Topic used for the subscribe frame
pub const SUBSCRIBE_TOPIC: &str = "aws/subscribe";

/// Short-lived credential that lets one customer join a chat contact
///
/// Only the connection-exchange call accepts it.
#[derive(Clone, PartialEq, Eq)]
pub struct ParticipantToken(String);

/// Credential for in-session calls (send, disconnect)
///
/// Replaced on every transport refresh.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionToken(String);

macro_rules! secret_token {
    ($name:ident) => {
        impl $name {
            pub fn new(token: impl Into<String>) -> Self {
                Self(token.into())
            }

            pub fn expose(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "(***)"))
            }
        }
    };
}

secret_token!(ParticipantToken);
secret_token!(ConnectionToken);

/// Customer display name, fixed for the lifetime of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub first_name: String,
    pub last_name: String,
}

impl Participant {
    /// Build a participant, rejecting empty names
    pub fn new(first_name: &str, last_name: &str) -> Option<Self> {
        let first_name = first_name.trim();
        let last_name = last_name.trim();
        if first_name.is_empty() || last_name.is_empty() {
            return None;
        }
        Some(Self {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
        })
    }

    /// `First Last`
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

// ─── Initiation service ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StartChatContactRequest {
    pub instance_id: String,
    pub contact_flow_id: String,
    pub participant_details: ParticipantDetails,
    pub client_token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParticipantDetails {
    pub display_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StartChatContactResponse {
    #[serde(default)]
    pub contact_id: Option<String>,
    #[serde(default)]
    pub participant_id: Option<String>,
    pub participant_token: String,
}

/// Result of a successful initiation call
#[derive(Debug, Clone)]
pub struct ChatContact {
    pub contact_id: Option<String>,
    pub participant_id: Option<String>,
    pub participant_token: ParticipantToken,
}

impl From<StartChatContactResponse> for ChatContact {
    fn from(resp: StartChatContactResponse) -> Self {
        Self {
            contact_id: resp.contact_id,
            participant_id: resp.participant_id,
            participant_token: ParticipantToken::new(resp.participant_token),
        }
    }
}

// ─── Connection-exchange service ─────────────────────────────────

/// Capabilities requested when exchanging a participant token
pub const CONNECTION_TYPES: [&str; 2] = ["WEBSOCKET", "CONNECTION_CREDENTIALS"];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateParticipantConnectionRequest {
    #[serde(rename = "Type")]
    pub connection_types: Vec<String>,
}

impl Default for CreateParticipantConnectionRequest {
    fn default() -> Self {
        Self {
            connection_types: CONNECTION_TYPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateParticipantConnectionResponse {
    pub websocket: WebsocketDescriptor,
    pub connection_credentials: ConnectionCredentials,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WebsocketDescriptor {
    pub url: String,
    pub connection_expiry: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConnectionCredentials {
    pub connection_token: String,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

/// Transport descriptor: where to connect and until when the credential holds
#[derive(Debug, Clone)]
pub struct ConnectionDescriptor {
    pub transport_url: String,
    pub connection_expiry: DateTime<Utc>,
    pub connection_token: ConnectionToken,
}

impl From<CreateParticipantConnectionResponse> for ConnectionDescriptor {
    fn from(resp: CreateParticipantConnectionResponse) -> Self {
        Self {
            transport_url: resp.websocket.url,
            connection_expiry: resp.websocket.connection_expiry,
            connection_token: ConnectionToken::new(resp.connection_credentials.connection_token),
        }
    }
}

// ─── Message-send and disconnect services ────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SendMessageRequest {
    pub content_type: String,
    pub content: String,
    pub client_token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DisconnectParticipantRequest {
    pub client_token: String,
}

/// Error body returned by the services
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceErrorBody {
    #[serde(default, alias = "Message")]
    pub message: Option<String>,
}

// ─── Transport frames ────────────────────────────────────────────

/// Subscribe frame sent once the transport is open
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeFrame {
    pub topic: String,
    pub content: SubscribeContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeContent {
    pub topics: Vec<String>,
}

impl SubscribeFrame {
    pub fn new(chat_topic: &str) -> Self {
        Self {
            topic: SUBSCRIBE_TOPIC.to_string(),
            content: SubscribeContent {
                topics: vec![chat_topic.to_string()],
            },
        }
    }
}

/// Inbound transport envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub content: serde_json::Value,
}

impl Envelope {
    /// Decode the chat content if this envelope carries it on `chat_topic`
    ///
    /// Returns `Ok(None)` for envelopes on other topics or content types.
    pub fn chat_content(&self, chat_topic: &str) -> serde_json::Result<Option<ChatContent>> {
        if self.topic != chat_topic || self.content_type != APPLICATION_JSON {
            return Ok(None);
        }
        let content = match &self.content {
            serde_json::Value::String(raw) => serde_json::from_str(raw)?,
            other => serde_json::from_value(other.clone())?,
        };
        Ok(Some(content))
    }
}

/// Kind of a decoded chat item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChatItemType {
    Message,
    Event,
    #[serde(other)]
    Other,
}

/// Role of the participant that produced a chat item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParticipantRole {
    Customer,
    Agent,
    System,
    #[serde(other)]
    Other,
}

/// Chat content carried inside an envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChatContent {
    #[serde(rename = "Type")]
    pub item_type: ChatItemType,
    #[serde(default)]
    pub participant_role: Option<ParticipantRole>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

impl ChatContent {
    /// A message authored by someone other than the customer
    pub fn is_incoming_message(&self) -> bool {
        self.item_type == ChatItemType::Message
            && self.participant_role != Some(ParticipantRole::Customer)
    }

    /// An event announcing the end of the chat
    pub fn is_chat_ended(&self) -> bool {
        self.item_type == ChatItemType::Event
            && self
                .content_type
                .as_deref()
                .is_some_and(|ct| ct.contains("ended"))
    }
}
