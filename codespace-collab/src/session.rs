//! Client-side session state machine.
//!
//! ```text
//!               join()            joined()
//! Disconnected ───────► Joining ───────────► Joined
//!      ▲                   │                   │
//!      └───────────────────┴── leave() / disconnected()
//! ```
//!
//! A [`Session`] owns two things with different rights:
//!
//! - [`LocalState`], the presentation state (document + roster). Inbound
//!   messages are applied here and nowhere else. It has no access to the
//!   outbox, so applying a remote update cannot emit anything.
//! - the outbox, which only local user actions and lifecycle transitions
//!   write to.
//!
//! No transport is involved: a network adapter drains the outbox and feeds
//! decoded inbound messages back in.

use std::collections::VecDeque;

use thiserror::Error;

use crate::document::{DocumentState, Language, Theme};
use crate::presence::{Notification, Roster};
use crate::protocol::{Message, MessageType, Participant};
use crate::registry::{self, RegistryError};

/// Message kinds a joined session handles.
pub const INBOUND_KINDS: [MessageType; 5] = [
    MessageType::CodeChange,
    MessageType::LanguageChange,
    MessageType::ThemeChange,
    MessageType::RoomDataChange,
    MessageType::ToastNotification,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Joining,
    Joined,
}

/// Something the UI should react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    CodeChanged(String),
    LanguageChanged(Language),
    ThemeChanged(Theme),
    MembersChanged(Vec<Participant>),
    Notification(Notification),
    /// The transport went away.
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("cannot {action} while {state:?}")]
    InvalidTransition {
        action: &'static str,
        state: SessionState,
    },
    #[error("cannot join: {0}")]
    InvalidJoin(#[from] RegistryError),
}

/// Clipboard capability supplied by the host UI.
pub trait Clipboard {
    fn write_text(&mut self, text: &str);
}

/// Local presentation state of one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalState {
    pub document: DocumentState,
    pub roster: Roster,
}

impl LocalState {
    /// Apply a message received from the server.
    ///
    /// Returns the event to surface, or `None` for messages that carry
    /// nothing for this side (client-only kinds, unknown enum values).
    pub fn apply_remote(&mut self, message: Message) -> Option<SessionEvent> {
        match message {
            Message::CodeChange(content) => {
                self.document.content = content.clone();
                Some(SessionEvent::CodeChanged(content))
            }
            Message::LanguageChange(value) => match value.parse::<Language>() {
                Ok(language) => {
                    self.document.language = language;
                    Some(SessionEvent::LanguageChanged(language))
                }
                Err(e) => {
                    log::warn!("Ignoring remote language change: {e}");
                    None
                }
            },
            Message::ThemeChange(value) => match value.parse::<Theme>() {
                Ok(theme) => {
                    self.document.theme = theme;
                    Some(SessionEvent::ThemeChanged(theme))
                }
                Err(e) => {
                    log::warn!("Ignoring remote theme change: {e}");
                    None
                }
            },
            Message::RoomDataChange { users } => {
                self.roster.replace(users.clone());
                Some(SessionEvent::MembersChanged(users))
            }
            Message::ToastNotification(notification) => {
                Some(SessionEvent::Notification(notification))
            }
            Message::Join { .. } | Message::RoomLeave => None,
        }
    }
}

/// One participant's view of a room.
pub struct Session {
    room_id: String,
    username: String,
    state: SessionState,
    local: LocalState,
    handlers: Vec<MessageType>,
    outbox: VecDeque<Message>,
}

impl Session {
    pub fn new(room_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            username: username.into(),
            state: SessionState::Disconnected,
            local: LocalState::default(),
            handlers: Vec::new(),
            outbox: VecDeque::new(),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn local(&self) -> &LocalState {
        &self.local
    }

    pub fn document(&self) -> &DocumentState {
        &self.local.document
    }

    pub fn users(&self) -> &[Participant] {
        self.local.roster.users()
    }

    /// Currently registered inbound handlers.
    pub fn registered_handlers(&self) -> &[MessageType] {
        &self.handlers
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Disconnected → Joining. Queues JOIN.
    ///
    /// A blank room id or username is refused here, before anything is
    /// sent, and the session stays disconnected.
    pub fn join(&mut self) -> Result<(), SessionError> {
        self.expect(SessionState::Disconnected, "join")?;
        registry::validate_join(&self.room_id, &self.username)?;
        self.outbox
            .push_back(Message::join(self.room_id.as_str(), self.username.as_str()));
        self.state = SessionState::Joining;
        Ok(())
    }

    /// Joining → Joined. Registers the inbound handlers.
    pub fn joined(&mut self) -> Result<(), SessionError> {
        self.expect(SessionState::Joining, "complete join")?;
        self.handlers = INBOUND_KINDS.to_vec();
        self.state = SessionState::Joined;
        log::debug!("Session {}@{} joined", self.username, self.room_id);
        Ok(())
    }

    /// Joining/Joined → Disconnected. Queues ROOM-LEAVE, then tears down.
    pub fn leave(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Disconnected {
            return Err(SessionError::InvalidTransition {
                action: "leave",
                state: self.state,
            });
        }
        self.outbox.push_back(Message::RoomLeave);
        self.teardown();
        Ok(())
    }

    /// Transport lost: tear down without emitting anything.
    pub fn disconnected(&mut self) {
        if self.state != SessionState::Disconnected {
            log::debug!("Session {}@{} disconnected", self.username, self.room_id);
        }
        self.teardown();
    }

    fn teardown(&mut self) {
        self.handlers.clear();
        self.local.roster.clear();
        self.state = SessionState::Disconnected;
    }

    fn expect(&self, expected: SessionState, action: &'static str) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                action,
                state: self.state,
            })
        }
    }

    // ── Inbound ──────────────────────────────────────────────────

    /// Dispatch a message from the server to its handler.
    ///
    /// Messages with no registered handler are dropped.
    pub fn handle_inbound(&mut self, message: Message) -> Option<SessionEvent> {
        let kind = message.message_type();
        if !self.handlers.contains(&kind) {
            log::debug!("No handler for {} in state {:?}", kind.event_name(), self.state);
            return None;
        }
        self.local.apply_remote(message)
    }

    // ── Local actions ────────────────────────────────────────────

    /// User edited the code. Returns whether an update was queued.
    pub fn edit_code(&mut self, content: impl Into<String>) -> bool {
        let content = content.into();
        self.local.document.content = content.clone();
        self.emit(Message::CodeChange(content))
    }

    pub fn set_language(&mut self, language: Language) -> bool {
        self.local.document.language = language;
        self.emit(Message::language(language))
    }

    pub fn set_theme(&mut self, theme: Theme) -> bool {
        self.local.document.theme = theme;
        self.emit(Message::theme(theme))
    }

    fn emit(&mut self, message: Message) -> bool {
        if self.state != SessionState::Joined {
            log::debug!(
                "Not joined, keeping {} local",
                message.message_type().event_name()
            );
            return false;
        }
        self.outbox.push_back(message);
        true
    }

    /// Copy the room id; returns the confirmation text to show.
    pub fn copy_room_id(&self, clipboard: &mut dyn Clipboard) -> &'static str {
        clipboard.write_text(&self.room_id);
        "Room ID copied to clipboard !"
    }

    /// Copy the current code; returns the confirmation text to show.
    pub fn copy_code(&self, clipboard: &mut dyn Clipboard) -> &'static str {
        clipboard.write_text(&self.local.document.content);
        "Code copied to clipboard !"
    }

    // ── Outbox ───────────────────────────────────────────────────

    pub fn pending_outbound(&self) -> usize {
        self.outbox.len()
    }

    pub fn drain_outbox(&mut self) -> Vec<Message> {
        self.outbox.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::STARTING_CODE;
    use crate::presence::NotificationKind;
    use uuid::Uuid;

    fn joined_session() -> Session {
        let mut session = Session::new("R1", "Alice");
        session.join().unwrap();
        session.joined().unwrap();
        session.drain_outbox();
        session
    }

    #[derive(Default)]
    struct RecordingClipboard(Vec<String>);

    impl Clipboard for RecordingClipboard {
        fn write_text(&mut self, text: &str) {
            self.0.push(text.to_string());
        }
    }

    #[test]
    fn test_initial_state() {
        let session = Session::new("R1", "Alice");
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.document().content, STARTING_CODE);
        assert!(session.registered_handlers().is_empty());
        assert_eq!(session.pending_outbound(), 0);
    }

    #[test]
    fn test_join_queues_join_message() {
        let mut session = Session::new("R1", "Alice");
        session.join().unwrap();
        assert_eq!(session.state(), SessionState::Joining);
        assert_eq!(session.drain_outbox(), vec![Message::join("R1", "Alice")]);

        session.joined().unwrap();
        assert_eq!(session.state(), SessionState::Joined);
        assert_eq!(session.registered_handlers(), &INBOUND_KINDS);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut session = Session::new("R1", "Alice");
        assert_eq!(
            session.joined(),
            Err(SessionError::InvalidTransition {
                action: "complete join",
                state: SessionState::Disconnected
            })
        );
        assert!(session.leave().is_err());

        session.join().unwrap();
        assert!(session.join().is_err());
    }

    #[test]
    fn test_blank_join_fields_refused() {
        let mut session = Session::new("R1", "   ");
        assert_eq!(
            session.join(),
            Err(SessionError::InvalidJoin(RegistryError::EmptyUsername))
        );
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.pending_outbound(), 0);
        assert!(!session.edit_code("x"));
        assert_eq!(session.pending_outbound(), 0);

        let mut session = Session::new("", "Alice");
        assert_eq!(
            session.join(),
            Err(SessionError::InvalidJoin(RegistryError::EmptyRoomId))
        );
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_local_edit_is_optimistic_then_queued() {
        let mut session = joined_session();

        assert!(session.edit_code("print(1)"));
        assert_eq!(session.document().content, "print(1)");
        assert!(session.set_language(Language::Python));
        assert!(session.set_theme(Theme::Light));

        assert_eq!(
            session.drain_outbox(),
            vec![
                Message::code("print(1)"),
                Message::LanguageChange("python".into()),
                Message::ThemeChange("light".into()),
            ]
        );
    }

    #[test]
    fn test_local_edit_before_join_stays_local() {
        let mut session = Session::new("R1", "Alice");
        assert!(!session.edit_code("draft"));
        assert_eq!(session.document().content, "draft");
        assert_eq!(session.pending_outbound(), 0);
    }

    #[test]
    fn test_inbound_updates_apply_without_emitting() {
        let mut session = joined_session();

        let event = session.handle_inbound(Message::code("remote"));
        assert_eq!(event, Some(SessionEvent::CodeChanged("remote".into())));
        assert_eq!(session.document().content, "remote");

        session.handle_inbound(Message::language(Language::Java));
        session.handle_inbound(Message::theme(Theme::Light));
        assert_eq!(session.document().language, Language::Java);
        assert_eq!(session.document().theme, Theme::Light);

        assert_eq!(session.pending_outbound(), 0);
    }

    #[test]
    fn test_inbound_membership_and_toast() {
        let mut session = joined_session();
        let users = vec![
            Participant::new(Uuid::new_v4(), "Alice"),
            Participant::new(Uuid::new_v4(), "Bob"),
        ];

        let event = session.handle_inbound(Message::room_data(users.clone()));
        assert_eq!(event, Some(SessionEvent::MembersChanged(users.clone())));
        assert_eq!(session.users(), users.as_slice());

        let event = session.handle_inbound(Message::ToastNotification(Notification::joined("Bob")));
        match event {
            Some(SessionEvent::Notification(n)) => assert_eq!(n.kind, NotificationKind::Join),
            other => panic!("expected notification, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_inbound_values_dropped() {
        let mut session = joined_session();
        assert_eq!(session.handle_inbound(Message::LanguageChange("cobol".into())), None);
        assert_eq!(session.handle_inbound(Message::ThemeChange("neon".into())), None);
        assert_eq!(session.document(), &DocumentState::default());
    }

    #[test]
    fn test_inbound_ignored_without_handlers() {
        let mut session = Session::new("R1", "Alice");
        session.join().unwrap();
        // Still joining: no handlers registered yet.
        assert_eq!(session.handle_inbound(Message::code("early")), None);
        assert_eq!(session.document().content, STARTING_CODE);
    }

    #[test]
    fn test_leave_queues_room_leave_and_unregisters() {
        let mut session = joined_session();
        session.handle_inbound(Message::room_data(vec![Participant::new(Uuid::new_v4(), "Alice")]));

        session.leave().unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(session.registered_handlers().is_empty());
        assert!(session.users().is_empty());
        assert_eq!(session.drain_outbox(), vec![Message::RoomLeave]);

        // Torn down: late deliveries are dropped.
        assert_eq!(session.handle_inbound(Message::code("late")), None);
        assert!(!session.edit_code("after leave"));
    }

    #[test]
    fn test_disconnect_emits_nothing() {
        let mut session = joined_session();
        session.disconnected();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(session.registered_handlers().is_empty());
        assert_eq!(session.pending_outbound(), 0);

        // Can join again afterwards.
        session.join().unwrap();
        assert_eq!(session.state(), SessionState::Joining);
    }

    #[test]
    fn test_clipboard_copies() {
        let mut session = joined_session();
        session.edit_code("int x;");
        let mut clipboard = RecordingClipboard::default();

        assert_eq!(session.copy_room_id(&mut clipboard), "Room ID copied to clipboard !");
        assert_eq!(session.copy_code(&mut clipboard), "Code copied to clipboard !");
        assert_eq!(clipboard.0, vec!["R1".to_string(), "int x;".to_string()]);
    }
}
