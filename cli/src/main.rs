//! Cashier CLI - Binary entry point and terminal session management.
//!
//! The CLI bridges [`cashier_engine`] (call orchestration and app state) and
//! [`cashier_tui`] (rendering), with RAII terminal management that restores
//! the terminal on every exit path.
//!
//! # Event Loop
//!
//! A fixed 8ms (~120 FPS) frame cadence:
//!
//! 1. Wait for frame tick
//! 2. Drain input queue (non-blocking via [`cashier_tui::InputPump`])
//! 3. Advance application state (`app.tick()`): poll calls, deliver results
//! 4. Render frame

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::prelude::*;
use std::{
    fs::{self, OpenOptions},
    io::{Stdout, stdout},
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use cashier_engine::{
    App, AppSettings, CashierConfig, Environment, HttpTransport, PayerId, PaymentId,
};
use cashier_tui::{InputPump, draw, handle_events};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Payment to execute or look up (overrides `payments.payment_id`)
    #[arg(long)]
    payment_id: Option<String>,

    /// Payer approving the payment (overrides `payments.payer_id`)
    #[arg(long)]
    payer_id: Option<String>,

    /// `sandbox` or `production` (overrides `payments.environment`)
    #[arg(long, value_parser = Environment::parse)]
    environment: Option<Environment>,

    /// Config file to use instead of ~/.cashier/config.toml
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn load_config(&self) -> Option<CashierConfig> {
        let loaded = match &self.config {
            Some(path) => CashierConfig::load_from(path),
            None => CashierConfig::load(),
        };
        loaded
            .inspect_err(|err| tracing::warn!("{err}; using defaults"))
            .ok()
            .flatten()
    }

    fn apply_overrides(&self, settings: &mut AppSettings) {
        if let Some(environment) = self.environment {
            settings.calls.environment = environment;
        }
        if let Some(id) = self.payment_id.as_deref() {
            match PaymentId::new(id) {
                Ok(id) => settings.payment_id = Some(id),
                Err(err) => tracing::warn!("Ignoring --payment-id: {err}"),
            }
        }
        if let Some(id) = self.payer_id.as_deref() {
            match PayerId::new(id) {
                Ok(id) => settings.payer_id = Some(id),
                Err(err) => tracing::warn!("Ignoring --payer-id: {err}"),
            }
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // No log file: stay silent rather than writing over the TUI.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file() -> (Option<(PathBuf, std::fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.cashier/logs/cashier.log
    if let Some(config_path) = CashierConfig::path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("cashier.log"));
    }

    // Fallback: ./.cashier/logs/cashier.log
    candidates.push(PathBuf::from(".cashier").join("logs").join("cashier.log"));

    candidates
}

/// RAII wrapper for terminal state: raw mode plus the alternate screen,
/// restored on drop even after panics or early returns.
struct TerminalSession {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl TerminalSession {
    fn new() -> Result<Self> {
        enable_raw_mode()?;

        let mut out = stdout();
        if let Err(err) = execute!(out, EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(err.into());
        }

        let terminal = match Terminal::new(CrosstermBackend::new(out)) {
            Ok(t) => t,
            Err(err) => {
                let _ = disable_raw_mode();
                let _ = execute!(stdout(), LeaveAlternateScreen);
                return Err(err.into());
            }
        };

        Ok(Self { terminal })
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = cli.load_config();
    let mut settings = AppSettings::from_config(config.as_ref());
    cli.apply_overrides(&mut settings);
    tracing::info!(
        environment = %settings.calls.environment,
        has_token = settings.calls.access_token.is_some(),
        "Starting cashier"
    );

    let transport =
        HttpTransport::with_timeout(settings.request_timeout).context("building HTTP client")?;
    let mut app = App::new(settings, Arc::new(transport));

    let result = {
        let mut session = TerminalSession::new()?;
        run_app(&mut session.terminal, &mut app).await
    };

    let cancelled = app.cancel_pending();
    if cancelled > 0 {
        tracing::info!(cancelled, "Abandoned in-flight calls on exit");
    }

    if let Err(err) = &result {
        eprintln!("Error: {err:?}");
    }
    result
}

const FRAME_DURATION: Duration = Duration::from_millis(8);

async fn run_app<B>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()>
where
    B: Backend,
    B::Error: Send + Sync + 'static,
{
    let mut input = InputPump::new();
    let mut frames = tokio::time::interval(FRAME_DURATION);
    frames.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let result: Result<()> = loop {
        frames.tick().await;

        // Non-blocking input (drain queue only)
        let quit_now = match handle_events(app, &mut input) {
            Ok(q) => q,
            Err(e) => break Err(e),
        };
        if quit_now {
            break Ok(());
        }

        app.tick();

        if let Err(e) = terminal.draw(|frame| draw(frame, app)) {
            break Err(e.into());
        }
    };

    input.shutdown().await;
    result
}
