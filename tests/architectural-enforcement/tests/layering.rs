//! Integration Test: Core Layering
//!
//! **Policy**: `conductor/core` is headless. It must not depend on, or import,
//! any terminal UI crate. Surfaces talk to it through `SurfaceEvent` and
//! `ConductorMessage` only.

use std::fs;

use architectural_enforcement::{assert_clean, code_part, production_sources, workspace_root};

const UI_CRATES: &[&str] = &["ratatui", "crossterm", "tui"];

#[test]
fn test_core_manifest_has_no_ui_dependencies() {
    let manifest = fs::read_to_string(workspace_root().join("conductor/core/Cargo.toml"))
        .expect("core manifest readable");

    let violations: Vec<String> = manifest
        .lines()
        .filter(|line| {
            let name = line.split('=').next().unwrap_or("").trim();
            UI_CRATES.contains(&name)
        })
        .map(|line| format!("conductor/core/Cargo.toml - UI dependency: {}", line.trim()))
        .collect();

    assert_clean("conductor core must not depend on a UI crate", &violations);
}

#[test]
fn test_core_sources_do_not_import_ui_crates() {
    let mut violations = Vec::new();

    for file in production_sources("conductor/core/src") {
        for (idx, line) in file.lines.iter().enumerate() {
            let code = code_part(line);
            if UI_CRATES
                .iter()
                .any(|krate| code.contains(&format!("{krate}::")))
            {
                violations.push(file.violation(idx, "UI import"));
            }
        }
    }

    assert_clean("conductor core must not import a UI crate", &violations);
}

#[test]
fn test_tui_does_not_talk_http_directly() {
    let mut violations = Vec::new();

    for file in production_sources("tui/src") {
        for (idx, line) in file.lines.iter().enumerate() {
            if code_part(line).contains("reqwest") {
                violations.push(file.violation(idx, "Direct HTTP"));
            }
        }
    }

    assert_clean("the TUI must reach the agent through the conductor", &violations);
}
