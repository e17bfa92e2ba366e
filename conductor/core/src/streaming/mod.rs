//! Streaming Response Decoding
//!
//! The agent answers with a line-delimited body where only `data: ` records
//! carry content. This module turns the raw body, delivered in arbitrarily
//! split chunks, into an ordered sequence of text fragments.
//!
//! # Architecture
//!
//! ```text
//!  bytes chunks ──► StreamDecoder ──► complete lines ──► decode_line ──► fragments
//!   (any split)     [carry buffer]                      (prefix/quote)
//! ```
//!
//! - [`StreamDecoder`]: push-style, owns the carry-over buffer
//! - [`decode_stream`]: adapts any byte-chunk `Stream` into a fragment `Stream`
//! - [`decode_line`]: single-record rule, useful on its own

mod decoder;

pub use decoder::{decode_line, decode_stream, StreamDecoder, TrailingLinePolicy};

// Re-export StreamingToken from backend for convenience
pub use crate::backend::StreamingToken;
