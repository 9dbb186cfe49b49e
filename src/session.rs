//! Chat session controller
//!
//! `ChatSession` owns the lifecycle of one customer chat:
//!
//! ```text
//! Idle → TokenRequested → Connecting → Connected → Disconnecting → Idle
//! ```
//!
//! It obtains a participant token, exchanges it for a transport descriptor,
//! opens and subscribes the duplex connection, re-arms a refresh shortly
//! before the connection credential expires, and tears everything down on
//! leave/disconnect. It never renders anything itself: every observable
//! change is emitted as a `SessionEvent` on a channel the presentation side
//! consumes.
//!
//! The session is driven by its owner: user actions call `start`, `send`,
//! `leave` and `disconnect`; inbound transport frames and the refresh
//! deadline surface through `next_inbound` and are applied with
//! `handle_inbound` (or both at once with `pump`).

use crate::config::ChatConfig;
use crate::error::{ChatError, Result};
use crate::provider::aws::AwsChatService;
use crate::provider::websocket::WebSocketTransport;
use crate::provider::{ChatService, Transport, TransportEvent, TransportHandle};
use crate::types::{
    ChatItemType, ConnectionToken, Envelope, Participant, ParticipantToken, SubscribeFrame,
    TEXT_PLAIN,
};
use chrono::{DateTime, Utc};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, Sleep};

/// Lifecycle state of a chat session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    TokenRequested,
    Connecting,
    Connected,
    Disconnecting,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::TokenRequested => "token-requested",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Disconnecting => "disconnecting",
        };
        f.write_str(s)
    }
}

/// Semantic events for the presentation side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session moved between lifecycle states
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    /// A system line for the log
    Notice { text: String },
    /// The first non-customer message arrived; sending may be unlocked
    AgentJoined,
    /// A chat line, either sent by the customer or received from the service
    Message {
        speaker: String,
        text: String,
        outgoing: bool,
    },
    /// The service ended the chat; sending should be disabled
    ChatEnded,
    /// The transport reported an error
    TransportError { reason: String },
    /// The customer left; the view returns to its pre-session layout
    Left,
    /// The session ended on its own (failed refresh); the view resets
    Lost { reason: String },
}

/// Work waiting for the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Something arrived on the current connection
    Transport(TransportEvent),
    /// The refresh deadline passed
    RefreshDue,
}

/// Delay until the transport should be refreshed
///
/// `expiry - now - lead`, saturating at zero when the expiry is already
/// closer than `lead`.
pub fn refresh_delay(expiry: DateTime<Utc>, now: DateTime<Utc>, lead: Duration) -> Duration {
    (expiry - now)
        .to_std()
        .unwrap_or(Duration::ZERO)
        .saturating_sub(lead)
}

/// One-shot refresh deadline; dropping it cancels the refresh
struct RefreshTimer {
    deadline: Instant,
    sleep: Pin<Box<Sleep>>,
}

impl RefreshTimer {
    fn after(delay: Duration) -> Self {
        let deadline = Instant::now() + delay;
        Self {
            deadline,
            sleep: Box::pin(tokio::time::sleep_until(deadline)),
        }
    }
}

struct Connection {
    handle: Box<dyn TransportHandle>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Everything that is reset together on teardown
#[derive(Default)]
struct SessionData {
    participant: Option<Participant>,
    participant_token: Option<ParticipantToken>,
    connection_token: Option<ConnectionToken>,
    connection: Option<Connection>,
    refresh: Option<RefreshTimer>,
    agent_connected: bool,
}

/// Controller for a single customer chat session
pub struct ChatSession {
    config: Arc<ChatConfig>,
    service: Arc<dyn ChatService>,
    transport: Arc<dyn Transport>,
    state: SessionState,
    data: SessionData,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl ChatSession {
    /// Create an idle session and the receiver of its events
    pub fn new(
        config: Arc<ChatConfig>,
        service: Arc<dyn ChatService>,
        transport: Arc<dyn Transport>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let session = Self {
            config,
            service,
            transport,
            state: SessionState::Idle,
            data: SessionData::default(),
            events,
        };
        (session, rx)
    }

    /// Create a session against the contact-center REST API over WebSocket
    pub fn from_config(
        config: ChatConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>)> {
        config.validate()?;
        let service = AwsChatService::new(&config)?;
        Ok(Self::new(
            Arc::new(config),
            Arc::new(service),
            Arc::new(WebSocketTransport::new()),
        ))
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Name of the backing chat service
    pub fn provider_name(&self) -> &str {
        self.service.name()
    }

    /// The customer, once `start` has accepted the names
    pub fn participant(&self) -> Option<&Participant> {
        self.data.participant.as_ref()
    }

    /// True once a non-customer message has been seen
    pub fn is_agent_connected(&self) -> bool {
        self.data.agent_connected
    }

    pub fn has_participant_token(&self) -> bool {
        self.data.participant_token.is_some()
    }

    pub fn has_connection_token(&self) -> bool {
        self.data.connection_token.is_some()
    }

    pub fn has_transport(&self) -> bool {
        self.data.connection.is_some()
    }

    /// When the pending refresh fires, if one is armed
    pub fn refresh_deadline(&self) -> Option<Instant> {
        self.data.refresh.as_ref().map(|t| t.deadline)
    }

    /// Start a chat as `first_name last_name`
    ///
    /// Runs the whole setup chain: participant token, transport descriptor,
    /// transport open and subscribe. Any failure aborts the attempt and
    /// leaves the session `Idle`; nothing is retried.
    pub async fn start(&mut self, first_name: &str, last_name: &str) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(ChatError::InvalidState(format!(
                "cannot start a chat while {}",
                self.state
            )));
        }
        let participant = Participant::new(first_name, last_name).ok_or_else(|| {
            ChatError::Validation("Please enter a first and last name".to_string())
        })?;
        let display_name = participant.display_name();
        self.data.participant = Some(participant);

        self.transition(SessionState::TokenRequested);
        let requested = self
            .service
            .start_chat_contact(
                &self.config.instance_id,
                &self.config.contact_flow_id,
                &display_name,
            )
            .await;
        let contact = match requested {
            Ok(contact) => contact,
            Err(e) => {
                tracing::warn!(error = %e, "Participant token request failed");
                self.abort().await;
                return Err(e);
            }
        };
        self.data.participant_token = Some(contact.participant_token);

        self.transition(SessionState::Connecting);
        if let Err(e) = self.establish().await {
            tracing::warn!(error = %e, "Transport setup failed");
            self.abort().await;
            return Err(e);
        }
        self.transition(SessionState::Connected);

        tracing::info!(participant = %display_name, "Chat session started");
        self.emit(SessionEvent::Notice {
            text: "Connecting...".to_string(),
        });
        Ok(())
    }

    /// Send a chat message
    ///
    /// Blank text is rejected before any request is made. On success the
    /// message is emitted as an outgoing `Message`; the transport's echo of
    /// the customer's own message is never rendered.
    pub async fn send(&mut self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::Validation("message is empty".to_string()));
        }
        let token = self
            .data
            .connection_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ChatError::NotConnected("no connection token".to_string()))?;
        let speaker = self
            .data
            .participant
            .as_ref()
            .map(Participant::display_name)
            .unwrap_or_default();

        if let Err(e) = self.service.send_message(&token, TEXT_PLAIN, text).await {
            tracing::warn!(error = %e, "Failed to send message");
            return Err(e);
        }

        tracing::debug!(chars = text.len(), "Message sent");
        self.emit(SessionEvent::Message {
            speaker,
            text: text.to_string(),
            outgoing: true,
        });
        Ok(())
    }

    /// Tear the session down and return the view to its pre-session layout
    pub async fn leave(&mut self) {
        self.teardown().await;
        self.emit(SessionEvent::Left);
    }

    /// Tear the session down without touching the view (page unload)
    pub async fn disconnect(&mut self) {
        self.teardown().await;
    }

    /// Wait for the next transport event or the refresh deadline
    ///
    /// Pends forever while there is neither a connection nor a timer, so
    /// it can sit in a `select!` next to user input.
    pub async fn next_inbound(&mut self) -> Inbound {
        let SessionData {
            connection,
            refresh,
            ..
        } = &mut self.data;

        let inbound = tokio::select! {
            event = recv_transport(connection) => Inbound::Transport(event),
            _ = wait_refresh(refresh) => Inbound::RefreshDue,
        };

        if inbound == Inbound::RefreshDue {
            self.data.refresh = None;
        }
        inbound
    }

    /// Apply one unit of inbound work
    pub async fn handle_inbound(&mut self, inbound: Inbound) -> Result<()> {
        match inbound {
            Inbound::Transport(event) => {
                self.handle_transport_event(event);
                Ok(())
            }
            Inbound::RefreshDue => self.refresh().await,
        }
    }

    /// Wait for and apply the next unit of inbound work
    pub async fn pump(&mut self) -> Result<()> {
        let inbound = self.next_inbound().await;
        self.handle_inbound(inbound).await
    }

    /// Apply every transport event already queued, without waiting
    pub fn drain_ready(&mut self) -> usize {
        let mut handled = 0;
        while let Some(Ok(event)) = self.data.connection.as_mut().map(|c| c.events.try_recv()) {
            self.handle_transport_event(event);
            handled += 1;
        }
        handled
    }

    /// Exchange the participant token for a fresh connection and swap it in
    ///
    /// The new connection is opened and subscribed before the previous one
    /// is closed, and the refresh timer is re-armed from the new expiry.
    async fn establish(&mut self) -> Result<()> {
        let participant_token = self
            .data
            .participant_token
            .clone()
            .ok_or_else(|| ChatError::NotConnected("no participant token".to_string()))?;

        let descriptor = self
            .service
            .create_participant_connection(&participant_token)
            .await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut handle = self.transport.open(&descriptor.transport_url, tx).await?;

        let subscribe = serde_json::to_string(&SubscribeFrame::new(&self.config.chat_topic))?;
        if let Err(e) = handle.send_text(subscribe).await {
            let _ = handle.close().await;
            return Err(e);
        }

        let delay = refresh_delay(
            descriptor.connection_expiry,
            Utc::now(),
            self.config.refresh_lead,
        );
        let previous = self.data.connection.replace(Connection { handle, events: rx });
        self.data.connection_token = Some(descriptor.connection_token);
        self.data.refresh = Some(RefreshTimer::after(delay));

        tracing::debug!(
            expiry = %descriptor.connection_expiry,
            refresh_in_ms = delay.as_millis() as u64,
            "Transport subscribed"
        );

        if let Some(mut old) = previous {
            if let Err(e) = old.handle.close().await {
                tracing::debug!(error = %e, "Closing replaced transport failed");
            }
        }
        Ok(())
    }

    async fn refresh(&mut self) -> Result<()> {
        if self.state != SessionState::Connected {
            return Ok(());
        }

        self.transition(SessionState::Connecting);
        match self.establish().await {
            Ok(()) => {
                self.transition(SessionState::Connected);
                tracing::info!("Transport refreshed");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Transport refresh failed, ending session");
                self.teardown().await;
                self.emit(SessionEvent::Lost {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Frame(frame) => self.handle_frame(&frame),
            TransportEvent::Error(reason) => {
                tracing::warn!(reason = %reason, "Transport error");
                self.emit(SessionEvent::TransportError { reason });
            }
            TransportEvent::Closed => {
                tracing::info!("Transport closed by peer");
            }
        }
    }

    fn handle_frame(&mut self, frame: &str) {
        let envelope: Envelope = match serde_json::from_str(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring undecodable frame");
                return;
            }
        };
        let content = match envelope.chat_content(&self.config.chat_topic) {
            Ok(Some(content)) => content,
            Ok(None) => return,
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring undecodable chat content");
                return;
            }
        };

        match content.item_type {
            ChatItemType::Message if content.is_incoming_message() => {
                if !self.data.agent_connected {
                    self.data.agent_connected = true;
                    tracing::info!(agent = ?content.display_name, "Agent joined");
                    self.emit(SessionEvent::AgentJoined);
                }
                self.emit(SessionEvent::Message {
                    speaker: content.display_name.unwrap_or_default(),
                    text: content.content.unwrap_or_default(),
                    outgoing: false,
                });
            }
            ChatItemType::Event if content.is_chat_ended() => {
                tracing::info!("Chat ended by service");
                self.emit(SessionEvent::ChatEnded);
            }
            _ => {}
        }
    }

    /// Drop a failed setup attempt straight back to `Idle`
    async fn abort(&mut self) {
        let data = std::mem::take(&mut self.data);
        if let Some(mut connection) = data.connection {
            let _ = connection.handle.close().await;
        }
        self.transition(SessionState::Idle);
    }

    /// Cancel the refresh, close the transport, notify the service, reset
    ///
    /// Session data is swapped out in one step before any request is made,
    /// so the session never exposes a half-reset state. The disconnect
    /// notification is best effort.
    async fn teardown(&mut self) {
        let SessionData {
            connection,
            connection_token,
            refresh,
            ..
        } = std::mem::take(&mut self.data);

        if self.state == SessionState::Idle {
            return;
        }
        self.transition(SessionState::Disconnecting);

        drop(refresh);

        if let Some(mut connection) = connection {
            if let Err(e) = connection.handle.close().await {
                tracing::debug!(error = %e, "Transport close failed");
            }
        }

        if let Some(token) = connection_token {
            if let Err(e) = self.service.disconnect_participant(&token).await {
                tracing::debug!(error = %e, "Disconnect notification failed (ignored)");
            }
        }

        self.transition(SessionState::Idle);
        tracing::info!("Chat session closed");
    }

    fn transition(&mut self, to: SessionState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        tracing::debug!(%from, %to, "Session state changed");
        self.emit(SessionEvent::StateChanged { from, to });
    }

    fn emit(&self, event: SessionEvent) {
        // Nobody listening is fine; the session keeps working headless
        let _ = self.events.send(event);
    }
}

async fn recv_transport(connection: &mut Option<Connection>) -> TransportEvent {
    if let Some(connection) = connection {
        if let Some(event) = connection.events.recv().await {
            return event;
        }
    }
    std::future::pending().await
}

async fn wait_refresh(refresh: &mut Option<RefreshTimer>) {
    match refresh {
        Some(timer) => timer.sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::memory::{MemoryChatService, MemoryTransport, ServiceOperation};

    fn test_session() -> (
        ChatSession,
        mpsc::UnboundedReceiver<SessionEvent>,
        Arc<MemoryChatService>,
        Arc<MemoryTransport>,
    ) {
        let config = ChatConfig {
            instance_id: "inst".to_string(),
            contact_flow_id: "flow".to_string(),
            ..Default::default()
        };
        let service = Arc::new(MemoryChatService::default());
        let transport = Arc::new(MemoryTransport::default());
        let (session, rx) = ChatSession::new(Arc::new(config), service.clone(), transport.clone());
        (session, rx, service, transport)
    }

    #[test]
    fn test_refresh_delay() {
        let now = Utc::now();
        let lead = Duration::from_secs(5);
        assert_eq!(
            refresh_delay(now + chrono::Duration::seconds(60), now, lead),
            Duration::from_secs(55)
        );
        assert_eq!(
            refresh_delay(now + chrono::Duration::seconds(3), now, lead),
            Duration::ZERO
        );
        assert_eq!(
            refresh_delay(now - chrono::Duration::seconds(30), now, lead),
            Duration::ZERO
        );
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::TokenRequested.to_string(), "token-requested");
        assert_eq!(SessionState::Idle.to_string(), "idle");
    }

    #[tokio::test]
    async fn test_start_rejected_while_connected() {
        let (mut session, _rx, service, _transport) = test_session();
        session.start("Ada", "Lovelace").await.unwrap();

        let err = session.start("Grace", "Hopper").await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidState(_)));
        assert_eq!(service.count(ServiceOperation::StartChatContact), 1);
        assert_eq!(session.participant().unwrap().first_name, "Ada");
    }

    #[tokio::test]
    async fn test_subscribe_frame_sent_on_open() {
        let (mut session, _rx, _service, transport) = test_session();
        session.start("Ada", "Lovelace").await.unwrap();

        assert_eq!(transport.urls(), vec!["memory://chat/1".to_string()]);
        assert_eq!(
            transport.sent(0),
            vec![r#"{"topic":"aws/subscribe","content":{"topics":["aws/chat"]}}"#.to_string()]
        );
    }

    #[tokio::test]
    async fn test_transport_error_surfaces_without_reconnect() {
        let (mut session, mut rx, _service, transport) = test_session();
        session.start("Ada", "Lovelace").await.unwrap();
        while rx.try_recv().is_ok() {}

        transport.push(TransportEvent::Error("reset by peer".to_string()));
        transport.push(TransportEvent::Closed);
        assert_eq!(session.drain_ready(), 2);

        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::TransportError {
                reason: "reset by peer".to_string()
            }
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(transport.opened(), 1);
    }

    #[tokio::test]
    async fn test_garbage_frames_ignored() {
        let (mut session, mut rx, _service, transport) = test_session();
        session.start("Ada", "Lovelace").await.unwrap();
        while rx.try_recv().is_ok() {}

        transport.push_frame("not json");
        transport.push_frame(r#"{"topic":"aws/chat","contentType":"application/json","content":"{broken"}"#);
        transport.push_frame(r#"{"topic":"aws/heartbeat"}"#);
        assert_eq!(session.drain_ready(), 3);
        assert!(rx.try_recv().is_err());
    }

    /// Transport whose open never completes
    struct StalledTransport;

    #[async_trait::async_trait]
    impl Transport for StalledTransport {
        async fn open(
            &self,
            _url: &str,
            _events: mpsc::UnboundedSender<TransportEvent>,
        ) -> Result<Box<dyn TransportHandle>> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_interrupted_start_then_disconnect() {
        let config = ChatConfig {
            instance_id: "inst".to_string(),
            contact_flow_id: "flow".to_string(),
            ..Default::default()
        };
        let service = Arc::new(MemoryChatService::default());
        let (mut session, _rx) =
            ChatSession::new(Arc::new(config), service.clone(), Arc::new(StalledTransport));

        {
            let mut start = tokio_test::task::spawn(session.start("Ada", "Lovelace"));
            tokio_test::assert_pending!(start.poll());
        }
        assert_eq!(session.state(), SessionState::Connecting);
        assert!(session.has_participant_token());

        session.disconnect().await;
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.participant().is_none());
        assert!(!session.has_participant_token());
        assert!(!session.has_transport());
        // No connection token yet, so nothing to notify
        assert_eq!(service.count(ServiceOperation::DisconnectParticipant), 0);
    }

    #[tokio::test]
    async fn test_idle_session_has_nothing_inbound() {
        let (mut session, _rx, _service, _transport) = test_session();
        {
            let mut inbound = tokio_test::task::spawn(session.next_inbound());
            tokio_test::assert_pending!(inbound.poll());
        }
        assert_eq!(session.drain_ready(), 0);
    }
}
