//! Main Application
//!
//! The App struct manages the TUI lifecycle as a thin display client:
//! - Event loop (keyboard, mouse, resize)
//! - ConductorClient for orchestration
//! - DisplayState for rendering
//!
//! Two commands never reach the Conductor: `/attach <path>` reads the file
//! here (the core has no filesystem access) and `/detach` drops it. Every
//! other `/command` is forwarded as a `UserCommand`.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crossterm::event::{
    Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEvent, MouseEventKind,
};
use futures::StreamExt;
use ratatui::backend::Backend;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::{Frame, Terminal};

use ibops_conductor::{
    default_config_path, mime_for_extension, save_setting_to_path, AgentBackend, ChatConfig,
    EndpointSetting, HttpAgentBackend, ImageAttachment, MessageRole, MessageStatus, NotifyLevel,
    SurfaceEvent,
};

use crate::conductor_client::ConductorClient;
use crate::display::{DisplayAction, DisplayMessage, DisplayState};
use crate::markup::{markup_to_lines, with_prefix, wrap_line};
use crate::theme;

/// Input box height (lines), including the separator
const INPUT_HEIGHT: u16 = 5;

/// Idle wake-up interval for polling the stream and animating
const TICK: Duration = Duration::from_millis(50);

/// Lines moved per mouse wheel step
const WHEEL_STEP: usize = 3;

/// Cursor drawn after a streaming reply
const STREAM_CURSOR: &str = "▌";

/// Main application state
pub struct App<B: AgentBackend + 'static = HttpAgentBackend> {
    // === Core State ===
    /// Is the app still running?
    running: bool,

    // === Conductor Integration ===
    /// Client for communicating with the embedded Conductor
    client: ConductorClient<B>,
    /// Display state derived from ConductorMessages
    display: DisplayState,
    /// Where endpoint changes are written
    settings_path: Option<PathBuf>,

    // === Input State ===
    /// User input buffer
    input_buffer: String,
    /// Scroll offset (lines from bottom, 0 = latest)
    scroll_offset: usize,
    /// Total rendered lines (for scroll bounds)
    total_lines: usize,
    /// Transcript pane height from the last frame
    transcript_height: usize,

    // === Misc State ===
    /// Frame counter for the typing animation
    tick: u64,
}

impl App<HttpAgentBackend> {
    /// Create the app from loaded configuration
    pub fn from_config(config: &ChatConfig) -> anyhow::Result<Self> {
        let client = ConductorClient::from_config(config)?;
        let settings_path = config
            .config_file_path
            .clone()
            .or_else(default_config_path);
        Ok(Self::new(client, settings_path))
    }
}

impl<B: AgentBackend + 'static> App<B> {
    /// Create a new App around an existing client
    pub fn new(client: ConductorClient<B>, settings_path: Option<PathBuf>) -> Self {
        Self {
            running: true,
            client,
            display: DisplayState::new(),
            settings_path,
            input_buffer: String::new(),
            scroll_offset: 0,
            total_lines: 0,
            transcript_height: 0,
            tick: 0,
        }
    }

    /// Main event loop
    pub async fn run<T: Backend>(&mut self, terminal: &mut Terminal<T>) -> anyhow::Result<()> {
        let mut event_stream = EventStream::new();

        self.connect().await;
        terminal.draw(|frame| self.draw(frame))?;

        while self.running {
            tokio::select! {
                biased;

                // Terminal events first so typing never waits on the stream
                maybe_event = event_stream.next() => {
                    match maybe_event {
                        Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                            self.handle_key(key).await?;
                        }
                        Some(Ok(Event::Mouse(mouse))) => self.handle_mouse(mouse),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::error!(error = %e, "Terminal event stream failed");
                            self.running = false;
                        }
                        None => self.running = false,
                    }
                }

                () = tokio::time::sleep(TICK) => {
                    self.tick = self.tick.wrapping_add(1);
                }
            }

            self.step().await;
            terminal.draw(|frame| self.draw(frame))?;
        }

        Ok(())
    }

    /// Start the Conductor and register this surface
    pub async fn connect(&mut self) {
        if let Err(e) = self.client.start().await {
            tracing::warn!("Conductor start error: {}", e);
        }
        if let Err(e) = self.client.connect().await {
            tracing::warn!("Conductor connect error: {}", e);
        }
        self.process_conductor_messages().await;
    }

    /// One frame of non-input work: drain the stream, apply messages, age
    /// the notification
    pub async fn step(&mut self) {
        self.client.poll_streaming().await;
        self.process_conductor_messages().await;
        self.display.expire_notification(Instant::now());
    }

    /// Goodbye text to print after the terminal is restored
    pub fn goodbye(&self) -> Option<&str> {
        self.display.goodbye.as_deref()
    }

    /// Current display state
    pub fn display(&self) -> &DisplayState {
        &self.display
    }

    /// Current input buffer
    pub fn input(&self) -> &str {
        &self.input_buffer
    }

    /// Whether the event loop should keep going
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Process all pending messages from the Conductor
    pub async fn process_conductor_messages(&mut self) {
        let mut to_persist = Vec::new();

        for msg in self.client.recv_all() {
            match self.display.apply_message(msg) {
                DisplayAction::None => {}
                DisplayAction::ClearInput => {
                    self.input_buffer.clear();
                    self.scroll_offset = 0;
                }
                DisplayAction::PersistSetting(setting) => to_persist.push(setting),
                DisplayAction::Quit => self.running = false,
            }
        }

        // After the batch, so a write failure is not hidden by the
        // confirmation that follows `SettingsChanged`
        if !to_persist.is_empty() {
            self.persist_settings(to_persist).await;
        }
    }

    async fn persist_settings(&mut self, settings: Vec<EndpointSetting>) {
        let Some(path) = self.settings_path.clone() else {
            tracing::debug!("No config path, settings not persisted");
            return;
        };

        let result = tokio::task::spawn_blocking(move || {
            settings
                .iter()
                .try_for_each(|setting| save_setting_to_path(&path, setting))
                .map(|()| path)
        })
        .await;

        match result {
            Ok(Ok(path)) => tracing::info!(path = %path.display(), "Endpoint settings saved"),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Failed to save endpoint settings");
                self.display.notify(
                    NotifyLevel::Warning,
                    Some("Settings not saved".to_string()),
                    e.to_string(),
                );
            }
            Err(e) => tracing::error!(error = %e, "Settings writer task failed"),
        }
    }

    // ========================================================================
    // Input
    // ========================================================================

    /// Handle keyboard input
    pub async fn handle_key(&mut self, key: KeyEvent) -> anyhow::Result<()> {
        match key.code {
            // Quit
            KeyCode::Esc => self.quit().await?,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.quit().await?;
            }

            KeyCode::Enter => self.submit_input().await?,

            // Editing is ignored while a reply is in flight
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                if !self.display.is_loading() {
                    self.input_buffer.push(c);
                    self.client.set_input(&self.input_buffer).await?;
                }
            }
            KeyCode::Backspace => {
                if !self.display.is_loading() && self.input_buffer.pop().is_some() {
                    self.client.set_input(&self.input_buffer).await?;
                }
            }

            // Conversation scrolling
            KeyCode::PageUp => self.scroll_up(self.page_size()),
            KeyCode::PageDown => self.scroll_down(self.page_size()),
            KeyCode::Home if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.scroll_offset = self.total_lines;
            }
            KeyCode::End if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.scroll_offset = 0;
            }

            _ => {}
        }
        Ok(())
    }

    /// Handle mouse input
    fn handle_mouse(&mut self, mouse: MouseEvent) {
        match mouse.kind {
            MouseEventKind::ScrollUp => self.scroll_up(WHEEL_STEP),
            MouseEventKind::ScrollDown => self.scroll_down(WHEEL_STEP),
            _ => {}
        }
    }

    async fn quit(&mut self) -> anyhow::Result<()> {
        self.client.request_quit().await?;
        self.process_conductor_messages().await;
        self.running = false;
        Ok(())
    }

    async fn submit_input(&mut self) -> anyhow::Result<()> {
        if self.display.is_loading() {
            return Ok(());
        }

        let Some(SurfaceEvent::UserCommand { command, args }) =
            SurfaceEvent::parse_command(&self.input_buffer)
        else {
            self.client.submit().await?;
            self.scroll_offset = 0;
            return Ok(());
        };

        self.input_buffer.clear();
        self.client.set_input("").await?;

        match command.as_str() {
            "attach" => self.attach(&args.join(" ")).await?,
            "detach" => {
                self.client.clear_image().await?;
                if self.display.staged_image.take().is_some() {
                    self.display
                        .notify(NotifyLevel::Info, None, "Image removed".to_string());
                }
            }
            _ => self.client.send_command(command, args).await?,
        }
        Ok(())
    }

    /// Read an image file and stage it for the next prompt
    async fn attach(&mut self, path: &str) -> anyhow::Result<()> {
        if path.is_empty() {
            self.display.notify(
                NotifyLevel::Warning,
                None,
                "Usage: /attach <image path>".to_string(),
            );
            return Ok(());
        }

        let path = Path::new(path);
        let mime = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(mime_for_extension);
        let Some(mime) = mime else {
            self.display.notify(
                NotifyLevel::Warning,
                None,
                "Unsupported image type (png, jpg, gif, webp)".to_string(),
            );
            return Ok(());
        };

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Image read failed");
                self.display.notify(
                    NotifyLevel::Error,
                    Some("Attach failed".to_string()),
                    format!("{}: {e}", path.display()),
                );
                return Ok(());
            }
        };

        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        let image = ImageAttachment::from_bytes(mime, &bytes);
        tracing::debug!(name = %name, bytes = bytes.len(), "Image attached");

        self.client.attach_image(image).await?;
        self.display
            .notify(NotifyLevel::Success, None, format!("Attached {name}"));
        self.display.staged_image = Some(name);
        Ok(())
    }

    // ========================================================================
    // Scrolling
    // ========================================================================

    fn page_size(&self) -> usize {
        (self.transcript_height / 2).max(1)
    }

    fn scroll_up(&mut self, lines: usize) {
        let max_scroll = self.total_lines.saturating_sub(self.transcript_height);
        self.scroll_offset = (self.scroll_offset + lines).min(max_scroll);
    }

    fn scroll_down(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(lines);
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// Draw one frame
    pub fn draw(&mut self, frame: &mut Frame<'_>) {
        let [transcript, notice, input, status] = Layout::vertical([
            Constraint::Min(1),
            Constraint::Length(1),
            Constraint::Length(INPUT_HEIGHT),
            Constraint::Length(1),
        ])
        .areas(frame.area());

        self.render_transcript(frame, transcript);
        self.render_notification(frame, notice);
        self.render_input(frame, input);
        self.render_status(frame, status);
    }

    fn render_transcript(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let width = usize::from(area.width.saturating_sub(1));
        let height = usize::from(area.height);
        let lines = transcript_lines(&self.display.messages, width, self.tick);

        self.total_lines = lines.len();
        self.transcript_height = height;

        let max_scroll = self.total_lines.saturating_sub(height);
        self.scroll_offset = self.scroll_offset.min(max_scroll);

        let end = self.total_lines - self.scroll_offset;
        let start = end.saturating_sub(height);
        let visible: Vec<Line<'static>> = lines[start..end].to_vec();

        frame.render_widget(Paragraph::new(visible), area);
    }

    fn render_notification(&self, frame: &mut Frame<'_>, area: Rect) {
        if let Some(notification) = &self.display.notification {
            let line = Line::styled(
                format!(" {}", notification.text()),
                theme::notify_style(notification.level),
            );
            frame.render_widget(Paragraph::new(line), area);
        }
    }

    fn render_input(&self, frame: &mut Frame<'_>, area: Rect) {
        let block = Block::default()
            .borders(Borders::TOP)
            .border_style(Style::default().fg(theme::DIM_GRAY));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        if self.display.is_loading() {
            let waiting = Line::styled(
                "Waiting for the agent...",
                Style::default().fg(theme::DIM_GRAY),
            );
            frame.render_widget(Paragraph::new(waiting), inner);
            return;
        }

        let text_width = usize::from(inner.width.saturating_sub(1)).max(1);
        let text_height = usize::from(inner.height);
        let full_input = format!("You: {}_", self.input_buffer);
        let wrapped: Vec<String> = textwrap::wrap(&full_input, text_width)
            .iter()
            .map(ToString::to_string)
            .collect();

        // Keep the cursor line in view
        let skip = wrapped.len().saturating_sub(text_height);
        let lines: Vec<Line<'static>> = wrapped
            .into_iter()
            .skip(skip)
            .map(|l| Line::styled(l, Style::default().fg(theme::USER_GREEN)))
            .collect();
        frame.render_widget(Paragraph::new(lines), inner);
    }

    fn render_status(&self, frame: &mut Frame<'_>, area: Rect) {
        frame.render_widget(Paragraph::new(self.status_line()), area);
    }

    /// Status bar text
    pub fn status_line(&self) -> Line<'static> {
        let state = self.display.conductor_state;
        let state_style = if state.is_busy() {
            Style::default().fg(theme::AGENT_BLUE)
        } else {
            Style::default().fg(theme::DIM_GRAY)
        };
        let dim = Style::default().fg(theme::DIM_GRAY);

        let mut spans = vec![
            Span::styled(format!(" {}", state.description()), state_style),
            Span::styled(format!(" | {}", self.display.endpoint), dim),
        ];
        if !self.display.session.is_empty() {
            spans.push(Span::styled(format!(" | session {}", self.display.session), dim));
        }
        if let Some(image) = &self.display.staged_image {
            spans.push(Span::styled(
                format!(" | image: {image}"),
                Style::default().fg(theme::CODE),
            ));
        }
        if self.scroll_offset > 0 {
            spans.push(Span::styled(
                format!(" | ^{} lines, PgDn to return", self.scroll_offset),
                Style::default().fg(theme::WARNING_AMBER),
            ));
        }
        spans.push(Span::styled(" | Enter send | Esc quit | /help", dim));
        Line::from(spans)
    }
}

/// Build the wrapped transcript
///
/// Each message gets a role prefix, its markup converted to styled lines, and
/// a blank separator line. A `Typing` placeholder shows an animated ellipsis
/// and a `Streaming` reply ends with a block cursor.
#[must_use]
pub fn transcript_lines(messages: &[DisplayMessage], width: usize, tick: u64) -> Vec<Line<'static>> {
    let mut out = Vec::new();

    for message in messages {
        let (prefix_color, base) = match message.role {
            MessageRole::User => (theme::USER_GREEN, Style::default().fg(theme::USER_GREEN)),
            MessageRole::Assistant => (theme::AGENT_BLUE, Style::default().fg(theme::TEXT)),
        };
        let prefix = Span::styled(
            message.prefix(),
            Style::default()
                .fg(prefix_color)
                .add_modifier(Modifier::BOLD),
        );

        let mut lines = match message.status {
            MessageStatus::Typing => {
                let dots = ".".repeat(usize::try_from((tick / 4) % 4).unwrap_or(0));
                vec![Line::styled(
                    format!("typing{dots}"),
                    Style::default()
                        .fg(theme::DIM_GRAY)
                        .add_modifier(Modifier::ITALIC),
                )]
            }
            MessageStatus::Streaming | MessageStatus::Complete => {
                markup_to_lines(&message.rendered, base)
            }
        };

        if message.status == MessageStatus::Streaming {
            let cursor = Span::styled(STREAM_CURSOR, Style::default().fg(theme::AGENT_BLUE));
            match lines.last_mut() {
                Some(last) => last.spans.push(cursor),
                None => lines.push(Line::from(vec![cursor])),
            }
        }

        for line in with_prefix(lines, prefix) {
            out.extend(wrap_line(&line, width));
        }
        out.push(Line::default());
    }

    out
}
