//! Theme and Colors
//!
//! A restrained palette: operator blue for the agent, green for the user,
//! and the usual traffic-light colors for alerts.

use ibops_conductor::NotifyLevel;
use ratatui::style::{Color, Modifier, Style};

// ============================================================================
// Roles
// ============================================================================

/// Agent accent (name prefix, status highlights)
pub const AGENT_BLUE: Color = Color::Rgb(90, 170, 255);

/// User input green
pub const USER_GREEN: Color = Color::Rgb(130, 220, 130);

/// Body text for agent replies
pub const TEXT: Color = Color::Rgb(220, 220, 220);

/// System/dim text
pub const DIM_GRAY: Color = Color::Rgb(100, 100, 100);

// ============================================================================
// Markup
// ============================================================================

/// Headings
pub const HEADING: Color = Color::Rgb(255, 200, 90);

/// Inline code and code blocks
pub const CODE: Color = Color::Rgb(180, 150, 255);

/// Code block language tag
pub const CODE_LANG: Color = Color::Rgb(120, 120, 160);

// ============================================================================
// Notifications
// ============================================================================

/// Error red
pub const ERROR_RED: Color = Color::Rgb(255, 80, 80);

/// Warning amber
pub const WARNING_AMBER: Color = Color::Rgb(255, 190, 60);

/// Success green
pub const SUCCESS_GREEN: Color = Color::Rgb(120, 230, 120);

/// Style for a notification line
#[must_use]
pub fn notify_style(level: NotifyLevel) -> Style {
    let color = match level {
        NotifyLevel::Info => AGENT_BLUE,
        NotifyLevel::Warning => WARNING_AMBER,
        NotifyLevel::Error => ERROR_RED,
        NotifyLevel::Success => SUCCESS_GREEN,
    };
    let style = Style::default().fg(color);
    if level == NotifyLevel::Error {
        style.add_modifier(Modifier::BOLD)
    } else {
        style
    }
}
