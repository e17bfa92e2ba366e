//! Surface Events
//!
//! Events sent from UI surfaces to the Conductor.
//!
//! Surfaces report what the user did; they never decide what it means. The
//! input buffer in particular is mirrored into the Conductor with
//! `InputChanged` so that clearing it on send is the Conductor's call.

use serde::{Deserialize, Serialize};

use crate::conversation::ImageAttachment;

/// Events from UI Surface to Conductor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceEvent {
    /// Surface connected to Conductor
    Connected {
        /// Surface type identifier
        surface_type: SurfaceType,
    },

    /// The input buffer changed
    InputChanged {
        /// Full buffer contents
        text: String,
    },

    /// Stage an image for the next prompt
    AttachImage {
        /// The encoded image
        image: ImageAttachment,
    },

    /// Drop the staged image
    ClearImage,

    /// Send the current input buffer (and staged image)
    Submit,

    /// User issued a slash command
    UserCommand {
        /// Command name without the slash
        command: String,
        /// Whitespace-separated arguments
        args: Vec<String>,
    },

    /// User wants to quit
    QuitRequested,
}

impl SurfaceEvent {
    /// Parse `/name arg1 arg2` into a `UserCommand`
    ///
    /// Returns `None` if `input` does not start with `/`, names nothing, or
    /// starts with the `//` escape.
    #[must_use]
    pub fn parse_command(input: &str) -> Option<Self> {
        let rest = input.trim().strip_prefix('/')?;
        if rest.starts_with('/') {
            return None;
        }
        let mut parts = rest.split_whitespace();
        let command = parts.next()?.to_lowercase();
        Some(Self::UserCommand {
            command,
            args: parts.map(str::to_string).collect(),
        })
    }
}

/// Prompt text for `input`, dropping one slash from a leading `//`
///
/// `//etc/hosts is wrong` sends `/etc/hosts is wrong`.
#[must_use]
pub fn unescape_prompt(input: &str) -> &str {
    input
        .trim_start()
        .strip_prefix('/')
        .filter(|rest| rest.starts_with('/'))
        .unwrap_or(input)
}

/// Kind of surface driving the Conductor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceType {
    /// Full-screen terminal UI
    Tui,
    /// No display (tests, scripts)
    Headless,
}
