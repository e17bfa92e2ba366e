//! Display State Types
//!
//! Types that represent the current display state for the TUI.
//! These are derived from ConductorMessages and used for rendering.
//!
//! # Design Philosophy
//!
//! The TUI is a "thin client" - it renders what the Conductor tells it to.
//! Every `MessageAppended` / `MessageUpdated` carries a full snapshot, so the
//! transcript here is replaced by id and never patched incrementally.

use std::time::{Duration, Instant};

use ibops_conductor::{
    ConductorMessage, ConductorState, EndpointSetting, Message, MessageId, MessageRole,
    MessageStatus, NotifyLevel,
};

/// How long a notification stays on screen
pub const NOTIFICATION_TTL: Duration = Duration::from_secs(6);

/// A transcript entry as the TUI shows it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayMessage {
    /// Unique message ID
    pub id: MessageId,
    /// Who sent this message
    pub role: MessageRole,
    /// Markup produced by the core renderer
    pub rendered: String,
    /// Lifecycle status
    pub status: MessageStatus,
}

impl From<Message> for DisplayMessage {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            role: message.role,
            rendered: message.rendered_content,
            status: message.status,
        }
    }
}

impl DisplayMessage {
    /// Label shown before the first line
    pub fn prefix(&self) -> &'static str {
        match self.role {
            MessageRole::User => "You: ",
            MessageRole::Assistant => "Agent: ",
        }
    }
}

/// A notification to display
#[derive(Clone, Debug)]
pub struct DisplayNotification {
    /// Notification level
    pub level: NotifyLevel,
    /// Optional title
    pub title: Option<String>,
    /// Message content
    pub message: String,
    /// When it was raised
    pub shown_at: Instant,
}

impl DisplayNotification {
    /// One-line text for the notification bar
    pub fn text(&self) -> String {
        match &self.title {
            Some(title) => format!("{title}: {}", self.message),
            None => self.message.clone(),
        }
    }
}

/// The full display state for the TUI
#[derive(Debug)]
pub struct DisplayState {
    /// Transcript, in append order
    pub messages: Vec<DisplayMessage>,
    /// Conductor state
    pub conductor_state: ConductorState,
    /// Session ID (short form)
    pub session: String,
    /// Endpoint summary, e.g. "local"
    pub endpoint: String,
    /// File name of the staged image, if any
    pub staged_image: Option<String>,
    /// Current notification (if any)
    pub notification: Option<DisplayNotification>,
    /// Goodbye text from the last `Quit`
    pub goodbye: Option<String>,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            conductor_state: ConductorState::Ready,
            session: String::new(),
            endpoint: String::new(),
            staged_image: None,
            notification: None,
            goodbye: None,
        }
    }
}

/// What the app has to act on after a message is applied
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisplayAction {
    /// Nothing beyond the state change
    None,
    /// Clear the local input buffer
    ClearInput,
    /// Persist one changed endpoint setting
    PersistSetting(EndpointSetting),
    /// Leave the event loop
    Quit,
}

impl DisplayState {
    /// Create a new display state
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a ConductorMessage to update display state
    pub fn apply_message(&mut self, msg: ConductorMessage) -> DisplayAction {
        match msg {
            ConductorMessage::MessageAppended { message } => {
                self.upsert(message.into());
            }
            ConductorMessage::MessageUpdated { message } => {
                self.upsert(message.into());
            }
            ConductorMessage::MessageRemoved { id } => {
                self.messages.retain(|m| m.id != id);
            }
            ConductorMessage::InputCleared => {
                self.staged_image = None;
                return DisplayAction::ClearInput;
            }
            ConductorMessage::Notify {
                level,
                title,
                message,
            } => {
                self.notify(level, title, message);
            }
            ConductorMessage::State { state } => {
                self.conductor_state = state;
            }
            ConductorMessage::SessionInfo {
                session_id,
                endpoint,
            } => {
                self.session = session_id.short().to_string();
                self.endpoint = endpoint;
            }
            ConductorMessage::SettingsChanged { setting } => {
                return DisplayAction::PersistSetting(setting);
            }
            ConductorMessage::Quit { message } => {
                self.goodbye = message;
                return DisplayAction::Quit;
            }
        }
        DisplayAction::None
    }

    /// Raise a notification, replacing the current one
    pub fn notify(&mut self, level: NotifyLevel, title: Option<String>, message: String) {
        self.notification = Some(DisplayNotification {
            level,
            title,
            message,
            shown_at: Instant::now(),
        });
    }

    /// Drop the notification once it has been up long enough
    pub fn expire_notification(&mut self, now: Instant) {
        if self
            .notification
            .as_ref()
            .is_some_and(|n| now.duration_since(n.shown_at) >= NOTIFICATION_TTL)
        {
            self.notification = None;
        }
    }

    /// Whether an exchange is in flight
    pub fn is_loading(&self) -> bool {
        self.conductor_state.is_busy()
    }

    fn upsert(&mut self, message: DisplayMessage) {
        match self.messages.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => *existing = message,
            None => self.messages.push(message),
        }
    }
}
