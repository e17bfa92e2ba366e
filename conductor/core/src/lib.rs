//! IBOps Conductor - Headless Streaming Chat Core
//!
//! This crate holds everything the IBOps agent chat client does apart from
//! drawing: it resolves where the agent lives, sends a prompt, decodes the
//! chunked `data:` response stream, renders it into safe markup, and keeps the
//! transcript consistent while at most one exchange is in flight.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        UI Surfaces                               │
//! │        ┌─────────────────┐        ┌──────────────────────┐      │
//! │        │  TUI (ratatui)  │        │  Headless / tests    │      │
//! │        └────────┬────────┘        └──────────┬───────────┘      │
//! │                 └───────────────┬─────────────┘                 │
//! │                    SurfaceEvent (up)                            │
//! │                  ConductorMessage (down)                        │
//! └─────────────────────────────────┼───────────────────────────────┘
//!                                   │
//! ┌─────────────────────────────────┼───────────────────────────────┐
//! │                    CONDUCTOR CORE                                │
//! │  ┌──────────────────────────────┴─────────────────────────────┐ │
//! │  │                 Conductor (send orchestrator)               │ │
//! │  │  ┌──────────────┐ ┌──────────┐ ┌──────────┐ ┌────────────┐ │ │
//! │  │  │ Conversation │ │ Endpoint │ │ Streaming│ │  Backend   │ │ │
//! │  │  │ + render     │ │ resolver │ │ decoder  │ │  (HTTP)    │ │ │
//! │  │  └──────────────┘ └──────────┘ └──────────┘ └────────────┘ │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Conductor`]: owns the session and drives each exchange
//! - [`Conversation`]: transcript plus the single-flight lock
//! - [`StreamDecoder`]: chunk-boundary-safe `data:` line decoder
//! - [`render`](render::render): plain text to escaped markup
//! - [`EndpointConfig`] / [`resolve`](endpoint::resolve): mode and credentials to URL and headers
//!
//! # Quick Start
//!
//! ```ignore
//! use ibops_conductor::{
//!     backend::HttpAgentBackend, config::load_config, Conductor, ConductorConfig,
//!     SurfaceEvent, SurfaceType,
//! };
//! use tokio::sync::mpsc;
//!
//! let config = load_config()?;
//! let backend = HttpAgentBackend::new(&config.http)?;
//! let (tx, mut rx) = mpsc::channel(100);
//! let mut conductor = Conductor::new(backend, ConductorConfig::with_endpoint(config.endpoint), tx);
//!
//! conductor.start().await?;
//! conductor.handle_event(SurfaceEvent::Connected { surface_type: SurfaceType::Headless }).await?;
//! conductor.handle_event(SurfaceEvent::InputChanged { text: "Hello".into() }).await?;
//! conductor.handle_event(SurfaceEvent::Submit).await?;
//!
//! loop {
//!     while let Ok(msg) = rx.try_recv() {
//!         // Render message to UI
//!     }
//!     conductor.poll_streaming().await;
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: agent backend trait and the reqwest implementation
//! - [`conductor`]: main Conductor struct
//! - [`config`]: TOML configuration file and environment overrides
//! - [`conversation`]: messages, image attachments, state machine
//! - [`endpoint`]: deployment mode and request target resolution
//! - [`error`]: validation, configuration, and transport errors
//! - [`events`]: events from UI surfaces to Conductor
//! - [`messages`]: messages from Conductor to UI surfaces
//! - [`render`]: incremental markup renderer
//! - [`streaming`]: response stream decoding
//!
//! # No TUI Dependencies
//!
//! This crate has **zero** dependencies on ratatui, crossterm, or any other
//! UI framework.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod conductor;
pub mod config;
pub mod conversation;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod messages;
pub mod render;
pub mod streaming;

// Re-exports for convenience
pub use backend::{AgentBackend, HttpAgentBackend, HttpSettings, InvocationPayload, StreamingToken};
pub use conductor::{Conductor, ConductorConfig, DEFAULT_GREETING};
pub use conversation::{mime_for_extension, Conversation, ImageAttachment, Message, PendingRequest};
pub use endpoint::{resolve, DeploymentMode, EndpointConfig, EndpointSetting, ResolvedTarget};
pub use error::{ConfigError, SendError, TransportError, ValidationError};
pub use events::{SurfaceEvent, SurfaceType};
pub use messages::{
    ConductorMessage, ConductorState, MessageId, MessageRole, MessageStatus, NotifyLevel,
    SessionId,
};
pub use render::render;
pub use streaming::{decode_line, decode_stream, StreamDecoder, TrailingLinePolicy};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, save_config_to_path,
    save_setting_to_path, ChatConfig, ChatToml, ConfigOverrides, ConfigSource,
};
