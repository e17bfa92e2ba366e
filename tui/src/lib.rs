//! IBOps Chat TUI - Terminal interface for the IBOps agent
//!
//! A full-screen terminal surface for `ibops-conductor`. It owns no chat
//! logic: keystrokes become `SurfaceEvent`s, and the transcript is a mirror of
//! the `ConductorMessage` snapshots the core publishes.
//!
//! # Architecture
//!
//! - **App**: event loop, key handling, layout
//! - **ConductorClient**: embedded Conductor plus its message channel
//! - **Display**: transcript mirror, status and notification state
//! - **Markup**: rendered markup to styled, wrapped terminal lines

pub mod app;
pub mod conductor_client;
pub mod display;
pub mod markup;
pub mod theme;

pub use app::App;
