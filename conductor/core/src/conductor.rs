//! Conductor - The Send Orchestrator
//!
//! The Conductor ties the pieces together for one chat session:
//! - mirrors the surface's input buffer and staged image
//! - validates and starts exchanges under the single-flight lock
//! - resolves the endpoint and hands the request to the backend
//! - routes decoded fragments into the conversation in arrival order
//! - finalizes or rolls back, and always releases the lock
//!
//! # Design Philosophy
//!
//! The Conductor is UI-agnostic. It communicates only through:
//! - `SurfaceEvent`: events received FROM the UI surface
//! - `ConductorMessage`: snapshots and notifications sent TO the UI surface
//!
//! A terminal UI, a test harness, or a script can drive it the same way.
//!
//! # Exchange flow
//!
//! ```text
//!  Submit ─► begin_send ─► resolve ─► backend.send_streaming ─► poll_streaming
//!              │             │               │                       │
//!              ▼             ▼               ▼                       ▼
//!        Validation     ConfigError    TransportError     Fragment / Complete / Error
//!       (no mutation)    └──────────── rollback ◄─────────────────────┘ (Error)
//! ```

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::backend::{AgentBackend, InvocationPayload, StreamingToken};
use crate::conversation::{Conversation, ImageAttachment};
use crate::endpoint::{self, DeploymentMode, EndpointConfig, EndpointSetting};
use crate::error::{SendError, TransportError, ValidationError};
use crate::events::{unescape_prompt, SurfaceEvent, SurfaceType};
use crate::messages::{ConductorMessage, ConductorState, NotifyLevel, SessionId};

/// Default greeting shown when a surface connects
pub const DEFAULT_GREETING: &str = "👋 Hello! I'm your 5G RAN optimization expert. I can help you:\n\n\
🔧 **Analyze simulation results** and recommend parameter optimizations\n\
📊 **Answer 5G questions** using 3GPP specifications\n\
⚙️ **Configure network parameters** for better performance\n\n\
How can I help you improve your network today?";

const HELP_TEXT: &str = "Commands: /mode local|remote, /token <token>, /arn <resource-id>, \
/settings, /attach <image>, /detach, /help, /quit. Start a message with // to send a leading /";

/// Conductor configuration
#[derive(Clone, Debug)]
pub struct ConductorConfig {
    /// Where requests go
    pub endpoint: EndpointConfig,
    /// Assistant message shown on first connect (`None` to skip)
    pub greeting: Option<String>,
    /// Fixed session ID (a fresh one is generated otherwise)
    pub session_id: Option<SessionId>,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            greeting: Some(DEFAULT_GREETING.to_string()),
            session_id: None,
        }
    }
}

impl ConductorConfig {
    /// Configuration for the given endpoint with the default greeting
    #[must_use]
    pub fn with_endpoint(endpoint: EndpointConfig) -> Self {
        Self {
            endpoint,
            ..Default::default()
        }
    }
}

/// The Conductor - headless orchestration core
pub struct Conductor<B: AgentBackend> {
    /// Configuration
    config: ConductorConfig,
    /// Agent backend
    backend: Arc<B>,
    /// Process-wide session identifier
    session_id: SessionId,
    /// Transcript and single-flight lock
    conversation: Conversation,
    /// Current operational state
    state: ConductorState,
    /// Channel to send messages to UI surface
    tx: mpsc::Sender<ConductorMessage>,
    /// Connected surface type
    surface_type: Option<SurfaceType>,
    /// Mirror of the surface input buffer
    input: String,
    /// Image staged for the next prompt
    staged_image: Option<ImageAttachment>,
    /// Current streaming receiver
    streaming_rx: Option<mpsc::Receiver<StreamingToken>>,
    /// Streaming response start time for metrics
    streaming_start: Option<Instant>,
    /// Fragment count for current streaming response
    streaming_fragment_count: u32,
}

impl<B: AgentBackend + 'static> Conductor<B> {
    /// Create a new Conductor with the given backend
    pub fn new(backend: B, config: ConductorConfig, tx: mpsc::Sender<ConductorMessage>) -> Self {
        let session_id = config.session_id.clone().unwrap_or_default();
        tracing::info!(session = %session_id, mode = %config.endpoint.mode, "Conductor created");

        Self {
            config,
            backend: Arc::new(backend),
            session_id,
            conversation: Conversation::new(),
            state: ConductorState::Ready,
            tx,
            surface_type: None,
            input: String::new(),
            staged_image: None,
            streaming_rx: None,
            streaming_start: None,
            streaming_fragment_count: 0,
        }
    }

    /// Get the session ID
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Get current state
    pub fn state(&self) -> ConductorState {
        self.state
    }

    /// Get the transcript
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Current endpoint settings
    pub fn endpoint(&self) -> &EndpointConfig {
        &self.config.endpoint
    }

    /// Mirrored input buffer
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Image staged for the next prompt
    pub fn staged_image(&self) -> Option<&ImageAttachment> {
        self.staged_image.as_ref()
    }

    /// Whether an exchange is in flight
    pub fn is_loading(&self) -> bool {
        self.conversation.is_loading()
    }

    /// Connected surface type
    pub fn surface_type(&self) -> Option<SurfaceType> {
        self.surface_type
    }

    /// Start the Conductor
    pub async fn start(&mut self) -> anyhow::Result<()> {
        self.set_state(ConductorState::Ready).await;
        self.send_session_info().await;

        if let Err(e) = self.config.endpoint.check_credentials() {
            self.notify(
                NotifyLevel::Warning,
                &format!("{e}. Use /token and /arn, or /mode local."),
            )
            .await;
        }

        Ok(())
    }

    /// Handle an event from the UI surface
    pub async fn handle_event(&mut self, event: SurfaceEvent) -> anyhow::Result<()> {
        match event {
            SurfaceEvent::Connected { surface_type } => {
                self.surface_type = Some(surface_type);
                tracing::debug!(surface = ?surface_type, "Surface connected");

                self.send(ConductorMessage::State { state: self.state }).await;
                self.send_session_info().await;

                if self.conversation.is_empty() {
                    if let Some(greeting) = self.config.greeting.clone() {
                        let message = self.conversation.push_assistant(greeting).clone();
                        self.send(ConductorMessage::MessageAppended { message }).await;
                    }
                } else {
                    // Replay the transcript for a reconnecting surface
                    let messages = self.conversation.messages().to_vec();
                    for message in messages {
                        self.send(ConductorMessage::MessageAppended { message }).await;
                    }
                }
            }

            SurfaceEvent::InputChanged { text } => {
                self.input = text;
            }

            SurfaceEvent::AttachImage { image } => {
                tracing::debug!(image = ?image, "Image staged");
                self.staged_image = Some(image);
            }

            SurfaceEvent::ClearImage => {
                self.staged_image = None;
            }

            SurfaceEvent::Submit => {
                self.submit().await;
            }

            SurfaceEvent::UserCommand { command, args } => {
                self.handle_command(&command, &args).await?;
            }

            SurfaceEvent::QuitRequested => {
                self.shutdown().await?;
            }
        }

        Ok(())
    }

    /// Send the current input buffer and staged image
    ///
    /// Validation failures leave everything untouched. Once validation
    /// passes, the input and image are cleared before the network call.
    pub async fn submit(&mut self) {
        let pending = match self.conversation.begin_send(
            unescape_prompt(&self.input),
            self.staged_image.clone(),
            &self.config.endpoint,
        ) {
            Ok(pending) => pending,
            Err(e) => {
                self.reject(&e).await;
                return;
            }
        };

        for id in [&pending.user_message_id, &pending.assistant_message_id] {
            if let Some(message) = self.conversation.find(id).cloned() {
                self.send(ConductorMessage::MessageAppended { message }).await;
            }
        }

        self.input.clear();
        self.staged_image = None;
        self.send(ConductorMessage::InputCleared).await;
        self.set_state(ConductorState::Thinking).await;

        let target = match endpoint::resolve(&self.config.endpoint, &self.session_id) {
            Ok(target) => target,
            Err(e) => {
                self.fail(SendError::Config(e)).await;
                return;
            }
        };

        let mut payload = InvocationPayload::new(pending.prompt);
        if let Some(image) = pending.image {
            payload = payload.with_image(image.data_uri());
        }

        tracing::info!(
            session = %self.session_id,
            backend = self.backend.name(),
            url = %target.url,
            "Sending prompt"
        );

        match self.backend.send_streaming(&target, &payload).await {
            Ok(rx) => {
                self.streaming_rx = Some(rx);
                self.streaming_start = Some(Instant::now());
                self.streaming_fragment_count = 0;
            }
            Err(e) => self.fail(SendError::Transport(e)).await,
        }
    }

    /// Poll for streaming tokens
    ///
    /// Call this regularly to process incoming tokens.
    /// Returns true if there was activity.
    pub async fn poll_streaming(&mut self) -> bool {
        // Collect first to avoid holding the receiver borrow
        let tokens: Vec<StreamingToken> = {
            let Some(rx) = self.streaming_rx.as_mut() else {
                return false;
            };

            let mut collected = Vec::new();
            loop {
                match rx.try_recv() {
                    Ok(token) => {
                        let is_terminal =
                            matches!(token, StreamingToken::Complete | StreamingToken::Error(_));
                        collected.push(token);
                        if is_terminal {
                            break;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        collected.push(StreamingToken::Error(TransportError::StreamClosed));
                        break;
                    }
                }
            }
            collected
        };

        if tokens.is_empty() {
            return false;
        }

        for token in tokens {
            self.apply_token(token).await;
        }
        true
    }

    /// Wait until the in-flight exchange (if any) has finished
    pub async fn await_response(&mut self) {
        while let Some(rx) = self.streaming_rx.as_mut() {
            let token = rx
                .recv()
                .await
                .unwrap_or(StreamingToken::Error(TransportError::StreamClosed));
            self.apply_token(token).await;
        }
    }

    async fn apply_token(&mut self, token: StreamingToken) {
        match token {
            StreamingToken::Fragment(text) => {
                self.streaming_fragment_count += 1;
                let Some(message) = self.conversation.append_fragment(&text).cloned() else {
                    tracing::warn!("Fragment arrived with no exchange in flight");
                    return;
                };

                if self.state != ConductorState::Responding {
                    self.set_state(ConductorState::Responding).await;
                }
                self.send(ConductorMessage::MessageUpdated { message }).await;
            }

            StreamingToken::Complete => {
                let elapsed_ms = self
                    .streaming_start
                    .take()
                    .map_or(0, |s| s.elapsed().as_millis() as u64);

                if let Some(message) = self.conversation.finalize().cloned() {
                    tracing::info!(
                        fragments = self.streaming_fragment_count,
                        chars = message.raw_content.chars().count(),
                        elapsed_ms,
                        "Response complete"
                    );
                    self.send(ConductorMessage::MessageUpdated { message }).await;
                }

                self.streaming_rx = None;
                self.streaming_fragment_count = 0;
                self.set_state(ConductorState::Ready).await;
            }

            StreamingToken::Error(e) => {
                self.fail(SendError::Transport(e)).await;
            }
        }
    }

    /// Roll back the in-flight exchange and surface the error
    async fn fail(&mut self, error: SendError) {
        tracing::error!(session = %self.session_id, error = %error, "Exchange failed");

        if let Some(removed) = self.conversation.rollback(&error) {
            self.send(ConductorMessage::MessageRemoved { id: removed.id })
                .await;
        }

        self.streaming_rx = None;
        self.streaming_start = None;
        self.streaming_fragment_count = 0;

        self.send(ConductorMessage::Notify {
            level: NotifyLevel::Error,
            title: Some("Request failed".to_string()),
            message: format!("Request failed: {error}. Please try again."),
        })
        .await;
        self.set_state(ConductorState::Ready).await;
    }

    /// Report a rejected send; empty and duplicate submits are silent
    async fn reject(&self, error: &ValidationError) {
        match error {
            ValidationError::EmptyPrompt | ValidationError::SendInProgress => {
                tracing::debug!(reason = %error, "Submit ignored");
            }
            ValidationError::MissingToken | ValidationError::MissingResourceId => {
                self.notify(
                    NotifyLevel::Warning,
                    &format!("{error}. Use /token and /arn to configure it."),
                )
                .await;
            }
        }
    }

    /// Handle a user command
    async fn handle_command(&mut self, command: &str, args: &[String]) -> anyhow::Result<()> {
        let is_setting = matches!(command, "mode" | "token" | "arn");
        if is_setting && self.is_loading() {
            self.notify(
                NotifyLevel::Warning,
                "Settings cannot change while a request is in progress",
            )
            .await;
            return Ok(());
        }

        match command {
            "help" => {
                self.notify(NotifyLevel::Info, HELP_TEXT).await;
            }
            "settings" => {
                let endpoint = &self.config.endpoint;
                let summary = format!(
                    "Endpoint: {} | token: {} | session: {}",
                    endpoint.summary(),
                    if endpoint.token.is_some() { "set" } else { "not set" },
                    self.session_id.short(),
                );
                self.notify(NotifyLevel::Info, &summary).await;
            }
            "mode" => match args.first().and_then(|m| DeploymentMode::parse(m)) {
                Some(mode) => {
                    let message = format!("Mode set to {mode}");
                    self.settings_changed(EndpointSetting::Mode(mode), &message)
                        .await;
                }
                None => {
                    self.notify(NotifyLevel::Warning, "Usage: /mode local|remote")
                        .await;
                }
            },
            "token" => {
                let token = args.first().cloned();
                let message = if token.is_some() {
                    "Token updated"
                } else {
                    "Token cleared"
                };
                self.settings_changed(EndpointSetting::Token(token), message)
                    .await;
            }
            "arn" => match args.first() {
                Some(resource_id) => match endpoint::parse_region(resource_id) {
                    Ok(region) => {
                        let message = format!("Agent set (region {region})");
                        self.settings_changed(
                            EndpointSetting::ResourceId(resource_id.clone()),
                            &message,
                        )
                        .await;
                    }
                    Err(e) => {
                        self.notify(NotifyLevel::Warning, &e.to_string()).await;
                    }
                },
                None => {
                    self.notify(NotifyLevel::Warning, "Usage: /arn <resource-id>")
                        .await;
                }
            },
            "quit" | "exit" => {
                self.shutdown().await?;
            }
            _ => {
                self.notify(
                    NotifyLevel::Warning,
                    &format!("Unknown command: /{command}"),
                )
                .await;
            }
        }

        Ok(())
    }

    async fn settings_changed(&mut self, setting: EndpointSetting, message: &str) {
        setting.apply(&mut self.config.endpoint);
        tracing::info!(setting = ?setting, "Endpoint settings changed");
        self.send(ConductorMessage::SettingsChanged { setting }).await;
        self.send_session_info().await;
        self.notify(NotifyLevel::Success, message).await;
    }

    /// Shut down the Conductor
    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.set_state(ConductorState::ShuttingDown).await;

        self.send(ConductorMessage::Quit {
            message: Some("Goodbye!".to_string()),
        })
        .await;

        Ok(())
    }

    /// Set state and notify UI
    async fn set_state(&mut self, state: ConductorState) {
        self.state = state;
        self.send(ConductorMessage::State { state }).await;
    }

    async fn send_session_info(&self) {
        self.send(ConductorMessage::SessionInfo {
            session_id: self.session_id.clone(),
            endpoint: self.config.endpoint.summary(),
        })
        .await;
    }

    /// Send notification
    async fn notify(&self, level: NotifyLevel, message: &str) {
        self.send(ConductorMessage::Notify {
            level,
            title: None,
            message: message.to_string(),
        })
        .await;
    }

    /// Send a message to the UI surface
    async fn send(&self, msg: ConductorMessage) {
        if let Err(e) = self.tx.send(msg).await {
            tracing::warn!("Failed to send message to surface: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::ResolvedTarget;
    use crate::messages::{MessageRole, MessageStatus};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    const ARN: &str = "arn:aws:svc:us-east-1:123:runtime/agentX";

    /// Replays a fixed script and records what it was asked to send
    #[derive(Default)]
    struct MockBackend {
        script: Vec<StreamingToken>,
        fail_with: Option<TransportError>,
        calls: Arc<Mutex<Vec<(ResolvedTarget, InvocationPayload)>>>,
    }

    impl MockBackend {
        fn replying(fragments: &[&str]) -> Self {
            let mut script: Vec<_> = fragments
                .iter()
                .map(|f| StreamingToken::Fragment((*f).to_string()))
                .collect();
            script.push(StreamingToken::Complete);
            Self {
                script,
                ..Default::default()
            }
        }
    }

    #[async_trait::async_trait]
    impl AgentBackend for MockBackend {
        fn name(&self) -> &str {
            "Mock"
        }

        async fn send_streaming(
            &self,
            target: &ResolvedTarget,
            payload: &InvocationPayload,
        ) -> Result<mpsc::Receiver<StreamingToken>, TransportError> {
            self.calls
                .lock()
                .unwrap()
                .push((target.clone(), payload.clone()));

            if let Some(ref e) = self.fail_with {
                return Err(e.clone());
            }

            let (tx, rx) = mpsc::channel(10);
            let script = self.script.clone();
            tokio::spawn(async move {
                for token in script {
                    let _ = tx.send(token).await;
                }
            });
            Ok(rx)
        }
    }

    /// Hands the token sender to the test so it can drive the stream
    #[derive(Default)]
    struct ManualBackend {
        sender: Arc<Mutex<Option<mpsc::Sender<StreamingToken>>>>,
    }

    #[async_trait::async_trait]
    impl AgentBackend for ManualBackend {
        fn name(&self) -> &str {
            "Manual"
        }

        async fn send_streaming(
            &self,
            _target: &ResolvedTarget,
            _payload: &InvocationPayload,
        ) -> Result<mpsc::Receiver<StreamingToken>, TransportError> {
            let (tx, rx) = mpsc::channel(10);
            *self.sender.lock().unwrap() = Some(tx);
            Ok(rx)
        }
    }

    fn quiet_config() -> ConductorConfig {
        ConductorConfig {
            greeting: None,
            ..Default::default()
        }
    }

    fn drain(rx: &mut mpsc::Receiver<ConductorMessage>) -> Vec<ConductorMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    async fn type_and_submit<B: AgentBackend + 'static>(conductor: &mut Conductor<B>, text: &str) {
        conductor
            .handle_event(SurfaceEvent::InputChanged {
                text: text.to_string(),
            })
            .await
            .unwrap();
        conductor.handle_event(SurfaceEvent::Submit).await.unwrap();
    }

    #[tokio::test]
    async fn test_conductor_creation() {
        let (tx, _rx) = mpsc::channel(100);
        let conductor = Conductor::new(MockBackend::default(), ConductorConfig::default(), tx);

        assert_eq!(conductor.state(), ConductorState::Ready);
        assert!(!conductor.is_loading());
        assert!(conductor.conversation().is_empty());
    }

    #[tokio::test]
    async fn test_connect_sends_greeting() {
        let (tx, mut rx) = mpsc::channel(100);
        let mut conductor = Conductor::new(MockBackend::default(), ConductorConfig::default(), tx);

        conductor
            .handle_event(SurfaceEvent::Connected {
                surface_type: SurfaceType::Headless,
            })
            .await
            .unwrap();

        let messages = drain(&mut rx);
        assert!(matches!(messages[0], ConductorMessage::State { .. }));
        assert!(matches!(messages[1], ConductorMessage::SessionInfo { .. }));
        match &messages[2] {
            ConductorMessage::MessageAppended { message } => {
                assert_eq!(message.role, MessageRole::Assistant);
                assert!(message.rendered_content.contains("<strong>"));
            }
            other => panic!("expected greeting, got {other:?}"),
        }
        assert_eq!(conductor.conversation().len(), 1);
    }

    #[tokio::test]
    async fn test_double_slash_sends_literal_prompt() {
        let (tx, _rx) = mpsc::channel(100);
        let backend = MockBackend::replying(&["ok"]);
        let calls = backend.calls.clone();
        let mut conductor = Conductor::new(backend, quiet_config(), tx);

        type_and_submit(&mut conductor, "//etc/hosts looks wrong?").await;
        conductor.await_response().await;

        assert_eq!(
            conductor.conversation().messages()[0].raw_content,
            "/etc/hosts looks wrong?"
        );
        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].1, InvocationPayload::new("/etc/hosts looks wrong?"));
    }

    #[tokio::test]
    async fn test_successful_exchange() {
        let (tx, mut rx) = mpsc::channel(100);
        let backend = MockBackend::replying(&["Hello", ", **world**"]);
        let calls = backend.calls.clone();
        let mut conductor = Conductor::new(backend, quiet_config(), tx);

        type_and_submit(&mut conductor, "  hi there ").await;
        assert!(conductor.is_loading());
        assert_eq!(conductor.input(), "");
        assert_eq!(conductor.state(), ConductorState::Thinking);

        conductor.await_response().await;

        assert!(!conductor.is_loading());
        assert_eq!(conductor.state(), ConductorState::Ready);
        let messages = conductor.conversation().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].raw_content, "hi there");
        assert_eq!(messages[1].raw_content, "Hello, **world**");
        assert_eq!(messages[1].rendered_content, "Hello, <strong>world</strong>");
        assert_eq!(messages[1].status, MessageStatus::Complete);

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0.url, "http://localhost:8080/invocations");
        assert_eq!(calls[0].1, InvocationPayload::new("hi there"));

        let published = drain(&mut rx);
        assert!(published
            .iter()
            .any(|m| matches!(m, ConductorMessage::InputCleared)));
        assert!(published.iter().any(|m| matches!(
            m,
            ConductorMessage::State {
                state: ConductorState::Responding
            }
        )));
    }

    #[tokio::test]
    async fn test_empty_submit_is_ignored() {
        let (tx, mut rx) = mpsc::channel(100);
        let mut conductor = Conductor::new(MockBackend::default(), quiet_config(), tx);

        type_and_submit(&mut conductor, "   ").await;

        assert!(conductor.conversation().is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_single_flight() {
        let (tx, mut rx) = mpsc::channel(100);
        let backend = ManualBackend::default();
        let sender = backend.sender.clone();
        let mut conductor = Conductor::new(backend, quiet_config(), tx);

        type_and_submit(&mut conductor, "first").await;
        assert!(conductor.is_loading());
        drain(&mut rx);

        type_and_submit(&mut conductor, "second").await;
        assert_eq!(conductor.conversation().len(), 2);
        // Rejected submit keeps the buffer
        assert_eq!(conductor.input(), "second");
        assert!(drain(&mut rx).is_empty());

        let tx_tokens = sender.lock().unwrap().take().unwrap();
        tx_tokens
            .send(StreamingToken::Fragment("done".to_string()))
            .await
            .unwrap();
        tx_tokens.send(StreamingToken::Complete).await.unwrap();
        drop(tx_tokens);

        assert!(conductor.poll_streaming().await);
        assert!(!conductor.is_loading());
        assert!(!conductor.poll_streaming().await);
    }

    #[tokio::test]
    async fn test_stream_error_rolls_back() {
        let (tx, mut rx) = mpsc::channel(100);
        let backend = MockBackend {
            script: vec![
                StreamingToken::Fragment("partial".to_string()),
                StreamingToken::Error(TransportError::StreamRead("reset".to_string())),
            ],
            ..Default::default()
        };
        let mut conductor = Conductor::new(backend, quiet_config(), tx);

        type_and_submit(&mut conductor, "q").await;
        conductor.await_response().await;

        assert_eq!(conductor.conversation().len(), 1);
        assert_eq!(
            conductor.conversation().messages()[0].role,
            MessageRole::User
        );
        assert!(!conductor.is_loading());
        assert_eq!(conductor.state(), ConductorState::Ready);

        let published = drain(&mut rx);
        assert!(published
            .iter()
            .any(|m| matches!(m, ConductorMessage::MessageRemoved { .. })));
        let alert = published.iter().find_map(|m| match m {
            ConductorMessage::Notify {
                level: NotifyLevel::Error,
                message,
                ..
            } => Some(message.clone()),
            _ => None,
        });
        assert_eq!(
            alert.as_deref(),
            Some("Request failed: Stream read failed: reset. Please try again.")
        );
    }

    #[tokio::test]
    async fn test_status_error_rolls_back() {
        let (tx, mut rx) = mpsc::channel(100);
        let backend = MockBackend {
            fail_with: Some(TransportError::Status {
                status: 500,
                body: String::new(),
            }),
            ..Default::default()
        };
        let mut conductor = Conductor::new(backend, quiet_config(), tx);

        type_and_submit(&mut conductor, "q").await;

        assert_eq!(conductor.conversation().len(), 1);
        assert!(!conductor.is_loading());
        let alert = drain(&mut rx).into_iter().find_map(|m| match m {
            ConductorMessage::Notify { message, .. } => Some(message),
            _ => None,
        });
        assert_eq!(
            alert.as_deref(),
            Some("Request failed: Request failed with status 500. Please try again.")
        );
    }

    #[tokio::test]
    async fn test_sender_dropped_without_complete_rolls_back() {
        let (tx, _rx) = mpsc::channel(100);
        let backend = ManualBackend::default();
        let sender = backend.sender.clone();
        let mut conductor = Conductor::new(backend, quiet_config(), tx);

        type_and_submit(&mut conductor, "q").await;
        drop(sender.lock().unwrap().take());

        assert!(conductor.poll_streaming().await);
        assert_eq!(conductor.conversation().len(), 1);
        assert!(!conductor.is_loading());
    }

    #[tokio::test]
    async fn test_malformed_resource_id_rolls_back() {
        let (tx, _rx) = mpsc::channel(100);
        let backend = MockBackend::default();
        let calls = backend.calls.clone();
        let config = ConductorConfig {
            endpoint: EndpointConfig::remote("tok", "arn:aws"),
            ..quiet_config()
        };
        let mut conductor = Conductor::new(backend, config, tx);

        type_and_submit(&mut conductor, "q").await;

        assert_eq!(conductor.conversation().len(), 1);
        assert!(!conductor.is_loading());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remote_without_token_does_not_send() {
        let (tx, mut rx) = mpsc::channel(100);
        let config = ConductorConfig {
            endpoint: EndpointConfig {
                mode: DeploymentMode::Remote,
                ..Default::default()
            },
            ..quiet_config()
        };
        let mut conductor = Conductor::new(MockBackend::default(), config, tx);

        type_and_submit(&mut conductor, "q").await;

        assert!(conductor.conversation().is_empty());
        assert_eq!(conductor.input(), "q");
        let published = drain(&mut rx);
        assert!(matches!(
            published.as_slice(),
            [ConductorMessage::Notify {
                level: NotifyLevel::Warning,
                ..
            }]
        ));
    }

    #[tokio::test]
    async fn test_remote_request_carries_session_and_image() {
        let (tx, _rx) = mpsc::channel(100);
        let backend = MockBackend::replying(&["ok"]);
        let calls = backend.calls.clone();
        let config = ConductorConfig {
            endpoint: EndpointConfig::remote("tok", ARN),
            session_id: Some(SessionId("sess-42".to_string())),
            ..quiet_config()
        };
        let mut conductor = Conductor::new(backend, config, tx);

        let image = ImageAttachment::from_bytes("image/png", b"png");
        conductor
            .handle_event(SurfaceEvent::AttachImage {
                image: image.clone(),
            })
            .await
            .unwrap();
        type_and_submit(&mut conductor, "what is this").await;
        assert!(conductor.staged_image().is_none());
        conductor.await_response().await;

        let calls = calls.lock().unwrap();
        let (target, payload) = &calls[0];
        assert_eq!(target.header("Authorization"), Some("Bearer tok"));
        assert_eq!(target.header("X-Session-Id"), Some("sess-42"));
        assert_eq!(payload.image.as_deref(), Some(image.data_uri()));
    }

    #[tokio::test]
    async fn test_settings_commands() {
        let (tx, mut rx) = mpsc::channel(100);
        let mut conductor = Conductor::new(MockBackend::default(), quiet_config(), tx);

        for (command, arg) in [("mode", "remote"), ("token", "abc"), ("arn", ARN)] {
            conductor
                .handle_event(SurfaceEvent::UserCommand {
                    command: command.to_string(),
                    args: vec![arg.to_string()],
                })
                .await
                .unwrap();
        }

        assert_eq!(conductor.endpoint(), &EndpointConfig::remote("abc", ARN));
        let changes: Vec<EndpointSetting> = drain(&mut rx)
            .into_iter()
            .filter_map(|m| match m {
                ConductorMessage::SettingsChanged { setting } => Some(setting),
                _ => None,
            })
            .collect();
        assert_eq!(
            changes,
            vec![
                EndpointSetting::Mode(DeploymentMode::Remote),
                EndpointSetting::Token(Some("abc".to_string())),
                EndpointSetting::ResourceId(ARN.to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_arn_command_rejects_malformed() {
        let (tx, _rx) = mpsc::channel(100);
        let mut conductor = Conductor::new(MockBackend::default(), quiet_config(), tx);

        conductor
            .handle_event(SurfaceEvent::UserCommand {
                command: "arn".to_string(),
                args: vec!["not-an-arn".to_string()],
            })
            .await
            .unwrap();
        assert_eq!(conductor.endpoint().resource_id, None);
    }

    #[tokio::test]
    async fn test_settings_locked_while_loading() {
        let (tx, _rx) = mpsc::channel(100);
        let backend = ManualBackend::default();
        let mut conductor = Conductor::new(backend, quiet_config(), tx);

        type_and_submit(&mut conductor, "q").await;
        conductor
            .handle_event(SurfaceEvent::UserCommand {
                command: "mode".to_string(),
                args: vec!["remote".to_string()],
            })
            .await
            .unwrap();
        assert_eq!(conductor.endpoint().mode, DeploymentMode::Local);
    }

    #[tokio::test]
    async fn test_quit() {
        let (tx, mut rx) = mpsc::channel(100);
        let mut conductor = Conductor::new(MockBackend::default(), quiet_config(), tx);

        conductor
            .handle_event(SurfaceEvent::QuitRequested)
            .await
            .unwrap();

        assert_eq!(conductor.state(), ConductorState::ShuttingDown);
        assert!(drain(&mut rx)
            .iter()
            .any(|m| matches!(m, ConductorMessage::Quit { .. })));
    }
}
