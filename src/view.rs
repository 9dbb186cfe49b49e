//! Chat view model: the presentation side of a session
//!
//! `ChatView` holds what a customer sees: the chat log, the pre-session
//! and in-session panels, the send control, and where input focus sits.
//! It has no behavior of its own beyond rendering `SessionEvent`s.

use crate::session::SessionEvent;

/// How a panel is laid out when visible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Display {
    /// The element's natural layout
    #[default]
    Default,
    Block,
    Inline,
    Flex,
    Grid,
    None,
}

/// A show/hide-able element
///
/// `hide` remembers the display mode it replaced so that `show` restores
/// exactly that mode rather than assuming a single default.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Panel {
    display: Display,
    remembered: Option<Display>,
}

impl Panel {
    pub fn new(display: Display) -> Self {
        Self {
            display,
            remembered: None,
        }
    }

    pub fn display(&self) -> Display {
        self.display
    }

    pub fn is_visible(&self) -> bool {
        self.display != Display::None
    }

    pub fn hide(&mut self) {
        if self.display == Display::None {
            return;
        }
        self.remembered = Some(self.display);
        self.display = Display::None;
    }

    /// Restore the mode saved by the last `hide`; no-op if never hidden
    pub fn show(&mut self) {
        if let Some(display) = self.remembered {
            self.display = display;
        }
    }
}

/// Scrolling chat log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLog {
    lines: Vec<String>,
    viewport: usize,
    scroll_top: usize,
    clears: u64,
}

impl ChatLog {
    /// Create an empty log showing `viewport` lines at a time
    pub fn new(viewport: usize) -> Self {
        Self {
            lines: Vec::new(),
            viewport: viewport.max(1),
            scroll_top: 0,
            clears: 0,
        }
    }

    /// Append `speaker: text` and scroll to the bottom
    pub fn append(&mut self, speaker: &str, text: &str) {
        self.lines.push(format!("{}: {}", speaker, text));
        self.scroll_top = self.lines.len().saturating_sub(self.viewport);
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.scroll_top = 0;
        self.clears += 1;
    }

    /// Number of times the log has been cleared
    pub fn clears(&self) -> u64 {
        self.clears
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Index of the first visible line
    pub fn scroll_top(&self) -> usize {
        self.scroll_top
    }

    /// Lines currently inside the viewport
    pub fn visible(&self) -> &[String] {
        let end = (self.scroll_top + self.viewport).min(self.lines.len());
        &self.lines[self.scroll_top..end]
    }
}

/// Where keyboard input goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    FirstName,
    Phrase,
}

/// Everything the customer sees
#[derive(Debug, Clone)]
pub struct ChatView {
    log: ChatLog,
    start_panel: Panel,
    session_panel: Panel,
    send_enabled: bool,
    focus: Focus,
}

impl Default for ChatView {
    fn default() -> Self {
        Self::new(20)
    }
}

impl ChatView {
    /// Pre-session layout: start panel visible, session panel hidden
    pub fn new(log_viewport: usize) -> Self {
        let mut session_panel = Panel::new(Display::Default);
        session_panel.hide();
        Self {
            log: ChatLog::new(log_viewport),
            start_panel: Panel::new(Display::Default),
            session_panel,
            send_enabled: false,
            focus: Focus::FirstName,
        }
    }

    pub fn log(&self) -> &ChatLog {
        &self.log
    }

    pub fn start_panel(&self) -> &Panel {
        &self.start_panel
    }

    pub fn session_panel(&self) -> &Panel {
        &self.session_panel
    }

    pub fn is_send_enabled(&self) -> bool {
        self.send_enabled
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    /// Press Send (or Enter) with `text` in the input
    ///
    /// Returns the trimmed text to hand to the session, or `None` for blank
    /// input or while the send control is disabled.
    pub fn submit(&self, text: &str) -> Option<String> {
        let text = text.trim();
        (self.send_enabled && !text.is_empty()).then(|| text.to_string())
    }

    /// Apply one session event
    pub fn render(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::Notice { text } => self.log.append("System", text),
            SessionEvent::AgentJoined => {
                self.start_panel.hide();
                self.session_panel.show();
                self.send_enabled = true;
                self.focus = Focus::Phrase;
            }
            SessionEvent::Message { speaker, text, .. } => self.log.append(speaker, text),
            SessionEvent::ChatEnded => self.send_enabled = false,
            SessionEvent::Left => self.reset(),
            SessionEvent::Lost { reason } => {
                self.reset();
                self.log
                    .append("System", &format!("Chat connection lost ({})", reason));
            }
            SessionEvent::StateChanged { .. } | SessionEvent::TransportError { .. } => {}
        }
    }

    /// Back to the pre-session layout with an empty log
    fn reset(&mut self) {
        self.log.clear();
        self.start_panel.show();
        self.session_panel.hide();
        self.send_enabled = false;
        self.focus = Focus::FirstName;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panel_restores_prior_display() {
        let mut panel = Panel::new(Display::Flex);
        panel.hide();
        assert!(!panel.is_visible());
        panel.show();
        assert_eq!(panel.display(), Display::Flex);
    }

    #[test]
    fn test_panel_double_hide_keeps_first_mode() {
        let mut panel = Panel::new(Display::Grid);
        panel.hide();
        panel.hide();
        panel.show();
        assert_eq!(panel.display(), Display::Grid);
    }

    #[test]
    fn test_panel_show_without_hide_is_noop() {
        let mut panel = Panel::new(Display::Inline);
        panel.show();
        assert_eq!(panel.display(), Display::Inline);
    }

    #[test]
    fn test_log_autoscrolls() {
        let mut log = ChatLog::new(2);
        log.append("System", "Connecting...");
        assert_eq!(log.scroll_top(), 0);
        log.append("Alice", "hi");
        log.append("Ada Lovelace", "hello");
        assert_eq!(log.scroll_top(), 1);
        assert_eq!(log.visible(), &["Alice: hi".to_string(), "Ada Lovelace: hello".to_string()]);
    }

    #[test]
    fn test_initial_layout() {
        let view = ChatView::default();
        assert!(view.start_panel().is_visible());
        assert!(!view.session_panel().is_visible());
        assert!(!view.is_send_enabled());
        assert_eq!(view.focus(), Focus::FirstName);
        assert!(view.submit("hello").is_none());
    }

    #[test]
    fn test_agent_joined_unlocks_input() {
        let mut view = ChatView::default();
        view.render(&SessionEvent::AgentJoined);
        assert!(!view.start_panel().is_visible());
        assert!(view.session_panel().is_visible());
        assert!(view.is_send_enabled());
        assert_eq!(view.focus(), Focus::Phrase);
        assert_eq!(view.submit("hello").as_deref(), Some("hello"));
    }

    #[test]
    fn test_chat_ended_disables_send() {
        let mut view = ChatView::default();
        view.render(&SessionEvent::AgentJoined);
        view.render(&SessionEvent::ChatEnded);
        assert!(!view.is_send_enabled());
        assert!(view.submit("anyone there?").is_none());
    }

    #[test]
    fn test_left_resets_layout() {
        let mut view = ChatView::default();
        view.render(&SessionEvent::Notice {
            text: "Connecting...".into(),
        });
        view.render(&SessionEvent::AgentJoined);
        view.render(&SessionEvent::Left);

        assert!(view.log().is_empty());
        assert!(view.start_panel().is_visible());
        assert!(!view.session_panel().is_visible());
        assert!(!view.is_send_enabled());
        assert_eq!(view.focus(), Focus::FirstName);
    }

    #[test]
    fn test_submit_trims_and_skips_blank() {
        let mut view = ChatView::default();
        assert!(view.submit("   ").is_none());
        view.render(&SessionEvent::AgentJoined);
        assert_eq!(view.submit("  hello \n").as_deref(), Some("hello"));
        assert!(view.submit("   ").is_none());
        assert!(view.submit("").is_none());
    }

    #[test]
    fn test_lost_resets_layout_and_explains() {
        let mut view = ChatView::default();
        view.render(&SessionEvent::Notice {
            text: "Connecting...".into(),
        });
        view.render(&SessionEvent::AgentJoined);
        view.render(&SessionEvent::Lost {
            reason: "connection refused".into(),
        });

        assert_eq!(
            view.log().lines(),
            &["System: Chat connection lost (connection refused)"]
        );
        assert!(view.start_panel().is_visible());
        assert!(!view.session_panel().is_visible());
        assert!(!view.is_send_enabled());
        assert_eq!(view.focus(), Focus::FirstName);
        assert!(view.submit("x").is_none());
    }

    #[test]
    fn test_message_lines() {
        let mut view = ChatView::default();
        view.render(&SessionEvent::Notice {
            text: "Connecting...".into(),
        });
        view.render(&SessionEvent::Message {
            speaker: "Alice".into(),
            text: "hi".into(),
            outgoing: false,
        });
        assert_eq!(view.log().lines(), &["System: Connecting...", "Alice: hi"]);
    }
}
