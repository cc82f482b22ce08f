//! Inbound event model.
//!
//! Every update delivered by the messaging channel is normalised into an
//! [`Event`]: who sent it ([`UserId`]), where it happened (chat and message
//! identifiers) and what it carries ([`EventKind`]).
//!
//! ```text
//! Event { user_id, chat_id, message_id, kind }
//! └── EventKind
//!     ├── Command("/start foo")
//!     ├── Message("hello")
//!     └── Callback("/grades/semester/42")
//! ```
//!
//! Events are immutable once created; the dispatcher shares them behind an
//! `Arc` for the duration of one dispatch cycle.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of an end user, stable across events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    /// Returns the raw numeric identifier.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// The class of an inbound event.
///
/// Each class is routed through its own namespace; see the router for the
/// exact dispatch order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EventKind {
    /// A command, including its leading `/` and any arguments.
    Command(String),
    /// Free text without a command marker.
    Message(String),
    /// Data attached to a pressed button.
    Callback(String),
}

impl EventKind {
    /// Returns the short name of this event class, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Command(_) => "command",
            Self::Message(_) => "message",
            Self::Callback(_) => "callback",
        }
    }

    /// Returns the raw text or callback data.
    pub fn raw(&self) -> &str {
        match self {
            Self::Command(s) | Self::Message(s) | Self::Callback(s) => s,
        }
    }
}

/// A single inbound event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Sender of the event.
    pub user_id: UserId,
    /// Conversation the event belongs to.
    pub chat_id: i64,
    /// Message the event refers to (the pressed message for callbacks).
    pub message_id: i64,
    /// Payload.
    pub kind: EventKind,
}

impl Event {
    /// Creates an event from its parts.
    pub fn new(user_id: impl Into<UserId>, chat_id: i64, message_id: i64, kind: EventKind) -> Self {
        Self {
            user_id: user_id.into(),
            chat_id,
            message_id,
            kind,
        }
    }

    /// Creates a command event.
    pub fn command(user_id: impl Into<UserId>, text: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self::new(user_id, user_id.0, 0, EventKind::Command(text.into()))
    }

    /// Creates a free-text message event.
    pub fn message(user_id: impl Into<UserId>, text: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self::new(user_id, user_id.0, 0, EventKind::Message(text.into()))
    }

    /// Creates a callback event.
    pub fn callback(user_id: impl Into<UserId>, data: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self::new(user_id, user_id.0, 0, EventKind::Callback(data.into()))
    }

    /// Classifies raw chat text as a command or a plain message.
    ///
    /// Text is a command when it starts with `/` immediately followed by a
    /// non-empty command name.
    pub fn from_text(
        user_id: impl Into<UserId>,
        chat_id: i64,
        message_id: i64,
        text: impl Into<String>,
    ) -> Self {
        let text = text.into();
        let kind = if command_name(&text).is_some() {
            EventKind::Command(text)
        } else {
            EventKind::Message(text)
        };
        Self::new(user_id, chat_id, message_id, kind)
    }

    /// Returns the raw text or callback data of this event.
    pub fn raw(&self) -> &str {
        self.kind.raw()
    }

    /// Returns the command name for command events.
    ///
    /// The name is the first token without the leading `/` and without an
    /// `@botname` suffix: `/start@my_bot now` yields `start`.
    pub fn command_name(&self) -> Option<&str> {
        match &self.kind {
            EventKind::Command(text) => command_name(text),
            _ => None,
        }
    }

    /// Returns everything after the command name, trimmed.
    ///
    /// Empty for commands without arguments, `None` for other event classes.
    pub fn command_args(&self) -> Option<&str> {
        match &self.kind {
            EventKind::Command(text) => {
                let text = text.trim_start();
                let rest = match text.find(char::is_whitespace) {
                    Some(idx) => &text[idx..],
                    None => "",
                };
                Some(rest.trim())
            }
            _ => None,
        }
    }
}

/// Extracts the command name from raw text, if the text is a command.
pub fn command_name(text: &str) -> Option<&str> {
    let rest = text.trim_start().strip_prefix('/')?;
    let token = rest.split_whitespace().next()?;
    let name = token.split('@').next().unwrap_or(token);
    (!name.is_empty()).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_name_strips_bot_suffix() {
        let event = Event::command(1, "/start@grades_bot please");
        assert_eq!(event.command_name(), Some("start"));
        assert_eq!(event.command_args(), Some("please"));
    }

    #[test]
    fn test_command_without_args() {
        let event = Event::command(1, "/help");
        assert_eq!(event.command_name(), Some("help"));
        assert_eq!(event.command_args(), Some(""));
    }

    #[test]
    fn test_from_text_classification() {
        let cmd = Event::from_text(7, 7, 1, "/grades 2024");
        assert!(matches!(cmd.kind, EventKind::Command(_)));

        let msg = Event::from_text(7, 7, 2, "just chatting");
        assert!(matches!(msg.kind, EventKind::Message(_)));

        // A lone slash is not a command.
        let slash = Event::from_text(7, 7, 3, "/");
        assert!(matches!(slash.kind, EventKind::Message(_)));
        assert_eq!(slash.command_name(), None);
    }

    #[test]
    fn test_callback_has_no_command_parts() {
        let event = Event::callback(3, "/grades/semester/1");
        assert_eq!(event.command_name(), None);
        assert_eq!(event.command_args(), None);
        assert_eq!(event.raw(), "/grades/semester/1");
        assert_eq!(event.kind.name(), "callback");
    }

    #[test]
    fn test_event_serde_shape() {
        let event = Event::message(5, "hi");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["user_id"], 5);
        assert_eq!(json["kind"]["type"], "message");
        assert_eq!(json["kind"]["payload"], "hi");
    }
}
