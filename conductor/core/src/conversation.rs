//! Conversation State Machine
//!
//! Owns the ordered transcript and the single in-flight request. Every
//! mutation of the transcript goes through here so the lifecycle rules hold
//! no matter which surface is attached.
//!
//! # Message lifecycle
//!
//! ```text
//!  begin_send ─► user (Complete) + assistant placeholder (Typing)
//!                                        │
//!                  append_fragment ──────┤ Typing → Streaming
//!                                        │
//!                       finalize ────────┤ → Complete
//!                                        │
//!                       rollback ────────┘ placeholder removed
//! ```
//!
//! The transcript is append-only; the one exception is rollback of the
//! assistant placeholder belonging to the failed request.

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::endpoint::EndpointConfig;
use crate::error::{SendError, ValidationError};
use crate::messages::{MessageId, MessageRole, MessageStatus};
use crate::render::render;

/// A message in the transcript
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: MessageId,
    /// Who sent this message
    pub role: MessageRole,
    /// Accumulated plain text
    pub raw_content: String,
    /// `render(raw_content)`, recomputed on every change
    pub rendered_content: String,
    /// Lifecycle status
    pub status: MessageStatus,
    /// When the message was created (Unix timestamp ms)
    pub created_at: u64,
}

impl Message {
    /// A finished user message
    pub fn user(content: impl Into<String>) -> Self {
        let raw_content = content.into();
        Self {
            id: MessageId::new(),
            role: MessageRole::User,
            rendered_content: render(&raw_content),
            raw_content,
            status: MessageStatus::Complete,
            created_at: now_ms(),
        }
    }

    /// An empty assistant placeholder awaiting its first fragment
    pub fn assistant_placeholder() -> Self {
        Self {
            id: MessageId::new(),
            role: MessageRole::Assistant,
            raw_content: String::new(),
            rendered_content: String::new(),
            status: MessageStatus::Typing,
            created_at: now_ms(),
        }
    }

    fn append(&mut self, fragment: &str) {
        self.raw_content.push_str(fragment);
        self.rendered_content = render(&self.raw_content);
        self.status = MessageStatus::Streaming;
    }
}

/// An image staged for the next prompt, held as a data URI
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageAttachment(String);

impl ImageAttachment {
    /// Encode raw image bytes as `data:<mime>;base64,<payload>`
    pub fn from_bytes(mime: &str, bytes: &[u8]) -> Self {
        let payload = base64::engine::general_purpose::STANDARD.encode(bytes);
        Self(format!("data:{mime};base64,{payload}"))
    }

    /// Wrap an existing data URI; `None` if it is not one
    pub fn from_data_uri(uri: impl Into<String>) -> Option<Self> {
        let uri = uri.into();
        (uri.starts_with("data:") && uri.contains(";base64,")).then_some(Self(uri))
    }

    /// The data URI as sent in the request body
    #[must_use]
    pub fn data_uri(&self) -> &str {
        &self.0
    }

    /// MIME type portion of the URI
    #[must_use]
    pub fn mime(&self) -> &str {
        self.0
            .strip_prefix("data:")
            .and_then(|rest| rest.split(';').next())
            .unwrap_or_default()
    }

    /// Size of the encoded payload in bytes
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        self.0.len()
    }
}

// Payloads are large, keep them out of logs
impl std::fmt::Debug for ImageAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageAttachment")
            .field("mime", &self.mime())
            .field("len", &self.encoded_len())
            .finish()
    }
}

/// MIME type for a supported image file extension
#[must_use]
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// The exchange currently in flight
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingRequest {
    /// Trimmed prompt text
    pub prompt: String,
    /// Optional staged image
    pub image: Option<ImageAttachment>,
    /// The user message appended for this prompt
    pub user_message_id: MessageId,
    /// The assistant placeholder receiving fragments
    pub assistant_message_id: MessageId,
}

/// Ordered transcript plus the single-flight lock
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    pending: Option<PendingRequest>,
}

impl Conversation {
    /// Create an empty conversation
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an exchange
    ///
    /// Appends the user message and the assistant placeholder and takes the
    /// lock. On error nothing is mutated.
    pub fn begin_send(
        &mut self,
        prompt: &str,
        image: Option<ImageAttachment>,
        endpoint: &EndpointConfig,
    ) -> Result<PendingRequest, ValidationError> {
        if self.pending.is_some() {
            return Err(ValidationError::SendInProgress);
        }

        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ValidationError::EmptyPrompt);
        }
        endpoint.check_credentials()?;

        let user = Message::user(prompt);
        let assistant = Message::assistant_placeholder();
        let pending = PendingRequest {
            prompt: prompt.to_string(),
            image,
            user_message_id: user.id.clone(),
            assistant_message_id: assistant.id.clone(),
        };

        tracing::debug!(
            user = %user.id.0,
            assistant = %assistant.id.0,
            has_image = pending.image.is_some(),
            "Exchange started"
        );

        self.messages.push(user);
        self.messages.push(assistant);
        self.pending = Some(pending.clone());
        Ok(pending)
    }

    /// Append a finished assistant message outside any exchange (greetings)
    pub fn push_assistant(&mut self, content: impl Into<String>) -> &Message {
        let raw_content = content.into();
        let message = Message {
            rendered_content: render(&raw_content),
            raw_content,
            status: MessageStatus::Complete,
            ..Message::assistant_placeholder()
        };
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    /// Append one decoded fragment to the in-flight assistant message
    ///
    /// Returns the updated message, or `None` if nothing is in flight.
    pub fn append_fragment(&mut self, fragment: &str) -> Option<&Message> {
        let message = self.active_message_mut()?;
        message.append(fragment);
        Some(message)
    }

    /// Close the exchange successfully
    ///
    /// A placeholder that never received a fragment completes with empty
    /// content.
    pub fn finalize(&mut self) -> Option<&Message> {
        let message = self.active_message_mut()?;
        message.status = MessageStatus::Complete;
        let id = message.id.clone();
        self.pending = None;
        self.find(&id)
    }

    /// Abort the exchange, removing the assistant placeholder
    ///
    /// The user message stays. Returns the removed message.
    pub fn rollback(&mut self, error: &SendError) -> Option<Message> {
        let pending = self.pending.take()?;
        let index = self
            .messages
            .iter()
            .rposition(|m| m.id == pending.assistant_message_id)?;

        tracing::warn!(
            assistant = %pending.assistant_message_id.0,
            error = %error,
            "Rolling back exchange"
        );
        Some(self.messages.remove(index))
    }

    /// Whether an exchange is in flight
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// The in-flight request, if any
    #[must_use]
    pub fn pending(&self) -> Option<&PendingRequest> {
        self.pending.as_ref()
    }

    /// All messages in append order
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Look up a message by ID
    #[must_use]
    pub fn find(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    /// Number of messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the transcript is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn active_message_mut(&mut self) -> Option<&mut Message> {
        let id = &self.pending.as_ref()?.assistant_message_id;
        self.messages.iter_mut().rev().find(|m| &m.id == id)
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
