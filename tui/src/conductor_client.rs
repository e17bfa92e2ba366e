//! Conductor Client
//!
//! Thin wrapper around the Conductor for TUI integration.
//! This client embeds the Conductor directly (no network hop to a daemon) and
//! provides a convenient interface for sending events and receiving messages.
//!
//! # Architecture
//!
//! The TUI is a "thin client" - it doesn't contain any chat logic.
//! All orchestration happens in the Conductor. The TUI's job is:
//! 1. Convert terminal events to SurfaceEvents
//! 2. Send SurfaceEvents to Conductor
//! 3. Receive ConductorMessages
//! 4. Render display state based on messages

use tokio::sync::mpsc;

use ibops_conductor::{
    AgentBackend, ChatConfig, Conductor, ConductorConfig, ConductorMessage, ConductorState,
    HttpAgentBackend, ImageAttachment, SurfaceEvent, SurfaceType,
};

/// Message channel depth
///
/// One poll can apply a full backend token channel, and each token produces
/// one message, so this must stay well above the backend's channel size.
const MESSAGE_CHANNEL_CAPACITY: usize = 1024;

/// Client for communicating with the embedded Conductor
pub struct ConductorClient<B: AgentBackend + 'static = HttpAgentBackend> {
    /// The embedded Conductor instance
    conductor: Conductor<B>,
    /// Receiver for messages from Conductor
    rx: mpsc::Receiver<ConductorMessage>,
}

impl ConductorClient<HttpAgentBackend> {
    /// Create a client backed by the HTTP agent backend
    pub fn from_config(config: &ChatConfig) -> anyhow::Result<Self> {
        let backend = HttpAgentBackend::new(&config.http)?;
        Ok(Self::with_backend(
            backend,
            ConductorConfig::with_endpoint(config.endpoint.clone()),
        ))
    }
}

impl<B: AgentBackend + 'static> ConductorClient<B> {
    /// Create a client around any backend
    pub fn with_backend(backend: B, config: ConductorConfig) -> Self {
        let (tx, rx) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);
        let conductor = Conductor::new(backend, config, tx);
        Self { conductor, rx }
    }

    /// Start the Conductor
    pub async fn start(&mut self) -> anyhow::Result<()> {
        self.conductor.start().await
    }

    /// Connect this surface to the Conductor
    pub async fn connect(&mut self) -> anyhow::Result<()> {
        self.send_event(SurfaceEvent::Connected {
            surface_type: SurfaceType::Tui,
        })
        .await
    }

    /// Mirror the input buffer into the Conductor
    pub async fn set_input(&mut self, text: &str) -> anyhow::Result<()> {
        self.send_event(SurfaceEvent::InputChanged {
            text: text.to_string(),
        })
        .await
    }

    /// Send the current input (and staged image)
    pub async fn submit(&mut self) -> anyhow::Result<()> {
        self.send_event(SurfaceEvent::Submit).await
    }

    /// Stage an image for the next prompt
    pub async fn attach_image(&mut self, image: ImageAttachment) -> anyhow::Result<()> {
        self.send_event(SurfaceEvent::AttachImage { image }).await
    }

    /// Drop the staged image
    pub async fn clear_image(&mut self) -> anyhow::Result<()> {
        self.send_event(SurfaceEvent::ClearImage).await
    }

    /// Send a user command to the Conductor
    pub async fn send_command(&mut self, command: String, args: Vec<String>) -> anyhow::Result<()> {
        self.send_event(SurfaceEvent::UserCommand { command, args })
            .await
    }

    /// Notify Conductor that user wants to quit
    pub async fn request_quit(&mut self) -> anyhow::Result<()> {
        self.send_event(SurfaceEvent::QuitRequested).await
    }

    /// Poll for streaming tokens (must be called regularly)
    pub async fn poll_streaming(&mut self) -> bool {
        self.conductor.poll_streaming().await
    }

    /// Receive all pending messages from the Conductor (non-blocking)
    pub fn recv_all(&mut self) -> Vec<ConductorMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            messages.push(msg);
        }
        messages
    }

    /// Get the current Conductor state
    pub fn state(&self) -> ConductorState {
        self.conductor.state()
    }

    /// Whether an exchange is in flight
    pub fn is_loading(&self) -> bool {
        self.conductor.is_loading()
    }

    /// Send raw surface event to Conductor
    pub async fn send_event(&mut self, event: SurfaceEvent) -> anyhow::Result<()> {
        self.conductor.handle_event(event).await
    }
}
