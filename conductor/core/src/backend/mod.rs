//! Agent Backend Integration
//!
//! Abstracted access to the remote agent through a common trait.
//!
//! # Available Backends
//!
//! - **HTTP**: POST + chunked line-delimited response (local or remote agent)
//!
//! # Usage
//!
//! ```ignore
//! use ibops_conductor::backend::{AgentBackend, HttpAgentBackend, HttpSettings, InvocationPayload};
//!
//! let backend = HttpAgentBackend::new(&HttpSettings::default())?;
//! let rx = backend.send_streaming(&target, &InvocationPayload::new("Hello")).await?;
//! ```

mod http;
mod traits;

pub use http::HttpAgentBackend;
pub use traits::{AgentBackend, HttpSettings, InvocationPayload, StreamingToken};
