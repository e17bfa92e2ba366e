//! Conductor Messages
//!
//! Messages sent from the Conductor to UI surfaces, plus the small identifier
//! and state types they carry.
//!
//! Surfaces are pure renderers: they never mutate the conversation themselves,
//! they mirror it from `MessageAppended` / `MessageUpdated` / `MessageRemoved`.

use serde::{Deserialize, Serialize};

use crate::conversation::Message;
use crate::endpoint::EndpointSetting;

/// Messages from Conductor to UI Surface
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ConductorMessage {
    // ============================================
    // Conversation Messages
    // ============================================
    /// A message was appended to the transcript
    MessageAppended {
        /// Snapshot of the new message
        message: Message,
    },

    /// An existing message changed (content or status)
    MessageUpdated {
        /// Snapshot after the change
        message: Message,
    },

    /// A provisional message was rolled back
    MessageRemoved {
        /// The removed message
        id: MessageId,
    },

    /// Input buffer and staged image were consumed by a send
    InputCleared,

    // ============================================
    // System Messages
    // ============================================
    /// Notification (errors are shown as alerts)
    Notify {
        /// Notification level
        level: NotifyLevel,
        /// Title (optional)
        title: Option<String>,
        /// Message content
        message: String,
    },

    /// Conductor state change
    State {
        /// The new state
        state: ConductorState,
    },

    /// Session information
    SessionInfo {
        /// Session ID
        session_id: SessionId,
        /// Endpoint summary, e.g. "local" or "remote (us-east-1)"
        endpoint: String,
    },

    /// A settings command changed the endpoint and should be persisted
    SettingsChanged {
        /// The single field that changed
        setting: EndpointSetting,
    },

    /// Request surface to quit
    Quit {
        /// Optional goodbye message
        message: Option<String>,
    },
}

/// Message identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a new unique message ID
    pub fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        Self(format!("msg_{id}"))
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

/// Session identifier
///
/// Generated once per process and sent with every remote request so the
/// agent can correlate turns. Carries no ordering semantics.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new random session ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters, for status bars
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who sent a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageRole {
    /// User input
    User,
    /// The remote agent
    Assistant,
}

/// Lifecycle of a single message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageStatus {
    /// Placeholder waiting for the first fragment
    Typing,
    /// Fragments are arriving
    Streaming,
    /// Final
    Complete,
}

impl MessageStatus {
    /// Whether more content may still arrive
    #[must_use]
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Complete)
    }
}

/// Notification levels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyLevel {
    /// Informational
    Info,
    /// Warning
    Warning,
    /// Error
    Error,
    /// Success
    Success,
}

/// Conductor operational states
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConductorState {
    /// Ready for input
    Ready,
    /// Request issued, waiting for the first fragment
    Thinking,
    /// Streaming a response
    Responding,
    /// Shutting down
    ShuttingDown,
}

impl ConductorState {
    /// Human-readable description
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Ready => "Ready",
            Self::Thinking => "Thinking...",
            Self::Responding => "Responding...",
            Self::ShuttingDown => "Shutting down...",
        }
    }

    /// Whether an exchange is in flight
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Thinking | Self::Responding)
    }
}
