//! IBOps Chat Entry Point
//!
//! Launches the terminal chat client for the IBOps agent.
//!
//! Configuration comes from `~/.config/ibops-chat/config.toml`, overridden by
//! `IBOPS_MODE`, `IBOPS_TOKEN`, `IBOPS_RESOURCE_ID` and `IBOPS_LOCAL_URL`.
//! Logs go to `<cache dir>/ibops-chat/ibops-chat.log`, filtered by `RUST_LOG`.

use std::fs::{self, File};
use std::io::{self, IsTerminal};
use std::panic;
use std::path::PathBuf;

use anyhow::Context;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ibops_conductor::load_config;
use ibops_tui::App;

const DEFAULT_LOG_FILTER: &str = "ibops_conductor=info,ibops_tui=info";

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Check if we have a TTY before touching the terminal
    if !io::stdin().is_terminal() || !io::stdout().is_terminal() {
        eprintln!("Error: ibops-chat requires a terminal (TTY)");
        eprintln!();
        eprintln!("This usually means stdin or stdout is piped, or the session");
        eprintln!("has no terminal (CI, `ssh` without -t).");
        std::process::exit(1);
    }

    let log_path = init_logging()?;

    let config = load_config().context("failed to load configuration")?;
    tracing::info!(
        source = %config.source(),
        mode = %config.endpoint.mode,
        log = %log_path.as_ref().map_or_else(|| "none".to_string(), |p| p.display().to_string()),
        "Starting ibops-chat"
    );
    let mut app = App::from_config(&config)?;

    // Set up panic hook to restore terminal
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
        original_hook(panic_info);
    }));

    // Initialize terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let result = app.run(&mut terminal).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Some(goodbye) = app.goodbye() {
        println!("\n{goodbye}\n");
    }

    result
}

/// Send tracing output to a log file, since the UI owns the terminal
///
/// Falls back to a sink when no cache directory is available.
fn init_logging() -> anyhow::Result<Option<PathBuf>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let Some(dir) = dirs::cache_dir().map(|d| d.join("ibops-chat")) else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(io::sink))
            .init();
        return Ok(None);
    };

    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    let path = dir.join("ibops-chat.log");
    let file = File::create(&path)
        .with_context(|| format!("failed to create log file {}", path.display()))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file)),
        )
        .init();

    Ok(Some(path))
}
