//! In-memory chat provider
//!
//! A scripted `ChatService` and `Transport` for tests and offline demos.
//! Every call is recorded; individual operations can be made to fail, and
//! inbound frames are injected by hand.

use crate::error::{ChatError, Result};
use crate::provider::{ChatService, Transport, TransportEvent, TransportHandle};
use crate::types::{
    ChatContact, ConnectionDescriptor, ConnectionToken, ParticipantToken, APPLICATION_JSON,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

/// Service operations that can be scripted to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceOperation {
    StartChatContact,
    CreateParticipantConnection,
    SendMessage,
    DisconnectParticipant,
}

/// A recorded service call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    StartChatContact {
        instance_id: String,
        contact_flow_id: String,
        display_name: String,
    },
    CreateParticipantConnection {
        participant_token: String,
    },
    SendMessage {
        connection_token: String,
        content_type: String,
        content: String,
    },
    DisconnectParticipant {
        connection_token: String,
    },
}

impl ServiceCall {
    pub fn operation(&self) -> ServiceOperation {
        match self {
            ServiceCall::StartChatContact { .. } => ServiceOperation::StartChatContact,
            ServiceCall::CreateParticipantConnection { .. } => {
                ServiceOperation::CreateParticipantConnection
            }
            ServiceCall::SendMessage { .. } => ServiceOperation::SendMessage,
            ServiceCall::DisconnectParticipant { .. } => ServiceOperation::DisconnectParticipant,
        }
    }
}

struct ServiceState {
    calls: Vec<ServiceCall>,
    failing: HashSet<ServiceOperation>,
    contacts: u64,
    connections: u64,
    connection_lifetime: chrono::Duration,
}

/// In-memory `ChatService`
///
/// Issues `ptok-<n>` participant tokens, `ctok-<n>` connection tokens and
/// `memory://chat/<n>` transport URLs. Connections expire after the
/// configured lifetime (default 60s).
pub struct MemoryChatService {
    state: Mutex<ServiceState>,
}

impl Default for MemoryChatService {
    fn default() -> Self {
        Self::new(chrono::Duration::seconds(60))
    }
}

impl MemoryChatService {
    /// Create a service whose connections expire after `connection_lifetime`
    pub fn new(connection_lifetime: chrono::Duration) -> Self {
        Self {
            state: Mutex::new(ServiceState {
                calls: Vec::new(),
                failing: HashSet::new(),
                contacts: 0,
                connections: 0,
                connection_lifetime,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ServiceState> {
        // A panicking test must not poison every later assertion
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make `operation` fail until `recover` is called
    pub fn fail(&self, operation: ServiceOperation) {
        self.lock().failing.insert(operation);
    }

    /// Stop failing `operation`
    pub fn recover(&self, operation: ServiceOperation) {
        self.lock().failing.remove(&operation);
    }

    /// All recorded calls, oldest first
    pub fn calls(&self) -> Vec<ServiceCall> {
        self.lock().calls.clone()
    }

    /// Number of recorded calls of `operation`
    pub fn count(&self, operation: ServiceOperation) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.operation() == operation)
            .count()
    }

    fn record(&self, call: ServiceCall) -> Result<MutexGuard<'_, ServiceState>> {
        let operation = call.operation();
        let mut state = self.lock();
        state.calls.push(call);
        if state.failing.contains(&operation) {
            return Err(ChatError::Service {
                operation: format!("{:?}", operation),
                status: 500,
                message: "scripted failure".to_string(),
            });
        }
        Ok(state)
    }
}

#[async_trait]
impl ChatService for MemoryChatService {
    async fn start_chat_contact(
        &self,
        instance_id: &str,
        contact_flow_id: &str,
        display_name: &str,
    ) -> Result<ChatContact> {
        let mut state = self.record(ServiceCall::StartChatContact {
            instance_id: instance_id.to_string(),
            contact_flow_id: contact_flow_id.to_string(),
            display_name: display_name.to_string(),
        })?;
        state.contacts += 1;
        let n = state.contacts;
        Ok(ChatContact {
            contact_id: Some(format!("contact-{}", n)),
            participant_id: Some(format!("participant-{}", n)),
            participant_token: ParticipantToken::new(format!("ptok-{}", n)),
        })
    }

    async fn create_participant_connection(
        &self,
        participant_token: &ParticipantToken,
    ) -> Result<ConnectionDescriptor> {
        let mut state = self.record(ServiceCall::CreateParticipantConnection {
            participant_token: participant_token.expose().to_string(),
        })?;
        state.connections += 1;
        let n = state.connections;
        Ok(ConnectionDescriptor {
            transport_url: format!("memory://chat/{}", n),
            connection_expiry: chrono::Utc::now() + state.connection_lifetime,
            connection_token: ConnectionToken::new(format!("ctok-{}", n)),
        })
    }

    async fn send_message(
        &self,
        connection_token: &ConnectionToken,
        content_type: &str,
        content: &str,
    ) -> Result<()> {
        self.record(ServiceCall::SendMessage {
            connection_token: connection_token.expose().to_string(),
            content_type: content_type.to_string(),
            content: content.to_string(),
        })?;
        Ok(())
    }

    async fn disconnect_participant(&self, connection_token: &ConnectionToken) -> Result<()> {
        self.record(ServiceCall::DisconnectParticipant {
            connection_token: connection_token.expose().to_string(),
        })?;
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

struct MemoryConnection {
    url: String,
    events: mpsc::UnboundedSender<TransportEvent>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

/// In-memory `Transport`
#[derive(Default)]
pub struct MemoryTransport {
    connections: Mutex<Vec<MemoryConnection>>,
    fail_open: AtomicBool,
}

impl MemoryTransport {
    fn lock(&self) -> MutexGuard<'_, Vec<MemoryConnection>> {
        self.connections.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make subsequent `open` calls fail (or succeed again)
    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Number of connections ever opened
    pub fn opened(&self) -> usize {
        self.lock().len()
    }

    /// Number of connections not yet closed
    pub fn live(&self) -> usize {
        self.lock()
            .iter()
            .filter(|c| !c.closed.load(Ordering::SeqCst))
            .count()
    }

    /// URLs of every opened connection, oldest first
    pub fn urls(&self) -> Vec<String> {
        self.lock().iter().map(|c| c.url.clone()).collect()
    }

    /// Frames sent on connection `index`
    pub fn sent(&self, index: usize) -> Vec<String> {
        self.lock()
            .get(index)
            .map(|c| c.sent.lock().unwrap_or_else(|e| e.into_inner()).clone())
            .unwrap_or_default()
    }

    /// Deliver `event` on the most recently opened live connection
    ///
    /// Returns false when there is no live connection to deliver on.
    pub fn push(&self, event: TransportEvent) -> bool {
        let connections = self.lock();
        connections
            .iter()
            .rev()
            .find(|c| !c.closed.load(Ordering::SeqCst))
            .map(|c| c.events.send(event).is_ok())
            .unwrap_or(false)
    }

    /// Deliver a raw text frame
    pub fn push_frame(&self, frame: impl Into<String>) -> bool {
        self.push(TransportEvent::Frame(frame.into()))
    }

    /// Deliver chat `content` wrapped in an envelope on `topic`
    pub fn push_chat(&self, topic: &str, content: serde_json::Value) -> bool {
        self.push_frame(chat_frame(topic, &content))
    }
}

/// Build the envelope frame a chat transport delivers for `content`
pub fn chat_frame(topic: &str, content: &serde_json::Value) -> String {
    serde_json::json!({
        "topic": topic,
        "contentType": APPLICATION_JSON,
        "content": content.to_string(),
    })
    .to_string()
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(
        &self,
        url: &str,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn TransportHandle>> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(ChatError::Transport(format!("scripted open failure: {}", url)));
        }

        let sent = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        self.lock().push(MemoryConnection {
            url: url.to_string(),
            events,
            sent: sent.clone(),
            closed: closed.clone(),
        });

        Ok(Box::new(MemoryHandle { sent, closed }))
    }
}

struct MemoryHandle {
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl TransportHandle for MemoryHandle {
    async fn send_text(&mut self, text: String) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChatError::Transport("connection closed".to_string()));
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(text);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_service_issues_tokens_and_records() {
        let service = MemoryChatService::default();
        let contact = service
            .start_chat_contact("inst", "flow", "Ada Lovelace")
            .await
            .unwrap();
        assert_eq!(contact.participant_token.expose(), "ptok-1");

        let desc = service
            .create_participant_connection(&contact.participant_token)
            .await
            .unwrap();
        assert_eq!(desc.transport_url, "memory://chat/1");
        assert_eq!(desc.connection_token.expose(), "ctok-1");
        assert!(desc.connection_expiry > chrono::Utc::now());

        assert_eq!(service.count(ServiceOperation::StartChatContact), 1);
        assert_eq!(
            service.calls()[1],
            ServiceCall::CreateParticipantConnection {
                participant_token: "ptok-1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_scripted_failure_is_recorded() {
        let service = MemoryChatService::default();
        service.fail(ServiceOperation::SendMessage);

        let token = ConnectionToken::new("ctok-1");
        let err = service
            .send_message(&token, "text/plain", "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Service { status: 500, .. }));
        assert_eq!(service.count(ServiceOperation::SendMessage), 1);

        service.recover(ServiceOperation::SendMessage);
        service.send_message(&token, "text/plain", "hello").await.unwrap();
    }

    #[tokio::test]
    async fn test_transport_delivers_to_latest_live_connection() {
        let transport = MemoryTransport::default();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();

        let mut first = transport.open("memory://chat/1", tx1).await.unwrap();
        let _second = transport.open("memory://chat/2", tx2).await.unwrap();
        assert!(transport.push_frame("x"));
        assert_eq!(rx2.try_recv().unwrap(), TransportEvent::Frame("x".into()));
        assert!(rx1.try_recv().is_err());

        first.send_text("hello".into()).await.unwrap();
        first.close().await.unwrap();
        assert!(first.send_text("late".into()).await.is_err());
        assert_eq!(transport.sent(0), vec!["hello".to_string()]);
        assert_eq!(transport.opened(), 2);
        assert_eq!(transport.live(), 1);
    }

    #[tokio::test]
    async fn test_transport_open_failure() {
        let transport = MemoryTransport::default();
        transport.set_fail_open(true);
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(transport.open("memory://chat/1", tx).await.is_err());
        assert_eq!(transport.opened(), 0);
        assert!(!transport.push_frame("nobody listening"));
    }

    #[test]
    fn test_chat_frame_shape() {
        let frame = chat_frame("aws/chat", &serde_json::json!({"Type": "MESSAGE"}));
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["topic"], "aws/chat");
        assert_eq!(value["contentType"], "application/json");
        assert_eq!(value["content"], r#"{"Type":"MESSAGE"}"#);
    }
}
