//! Input handling for the Cashier TUI.

use anyhow::{Result, anyhow};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::sync::mpsc;
use tracing::debug;

use cashier_engine::App;

const INPUT_POLL_TIMEOUT: Duration = Duration::from_millis(25); // shutdown responsiveness
const INPUT_CHANNEL_CAPACITY: usize = 256;
const MAX_EVENTS_PER_FRAME: usize = 64; // never starve rendering

enum InputMsg {
    Event(Event),
    Error(String),
}

/// Reads terminal events on a blocking thread so the frame loop never waits on input.
pub struct InputPump {
    rx: mpsc::Receiver<InputMsg>,
    stop: Arc<AtomicBool>,
    join: Option<tokio::task::JoinHandle<()>>,
}

impl InputPump {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));
        let stop2 = stop.clone();

        let join = tokio::task::spawn_blocking(move || input_loop(stop2, tx));
        Self {
            rx,
            stop,
            join: Some(join),
        }
    }

    pub async fn shutdown(&mut self) {
        // Unblock the reader if it is waiting on channel capacity.
        self.rx.close();

        self.stop.store(true, Ordering::Release);
        if let Some(join) = self.join.take() {
            let _ = tokio::time::timeout(Duration::from_secs(2), join).await;
        }
    }
}

impl Default for InputPump {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InputPump {
    fn drop(&mut self) {
        // Best-effort stop; do not block in Drop.
        self.rx.close();
        self.stop.store(true, Ordering::Release);
    }
}

fn input_loop(stop: Arc<AtomicBool>, tx: mpsc::Sender<InputMsg>) {
    while !stop.load(Ordering::Acquire) {
        match event::poll(INPUT_POLL_TIMEOUT) {
            Ok(true) => match event::read() {
                Ok(ev) => {
                    if tx.blocking_send(InputMsg::Event(ev)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = tx.blocking_send(InputMsg::Error(e.to_string()));
                    break;
                }
            },
            Ok(false) => {}
            Err(e) => {
                let _ = tx.blocking_send(InputMsg::Error(e.to_string()));
                break;
            }
        }
    }
}

/// What a key press asks the app to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ExecutePayment,
    FetchPayment,
    DetectLocation,
    LeaveTable,
    CancelPending,
    Acknowledge,
    Quit,
}

/// Map a key to an action. While a dialog is up only acknowledgment and quit
/// are accepted.
#[must_use]
pub fn action_for(key: KeyEvent, dialog_showing: bool) -> Option<Action> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return matches!(key.code, KeyCode::Char('c')).then_some(Action::Quit);
    }

    if dialog_showing {
        return match key.code {
            KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ') => Some(Action::Acknowledge),
            _ => None,
        };
    }

    match key.code {
        KeyCode::Char('p') => Some(Action::ExecutePayment),
        KeyCode::Char('g') => Some(Action::FetchPayment),
        KeyCode::Char('l') => Some(Action::DetectLocation),
        KeyCode::Char('n') => Some(Action::LeaveTable),
        KeyCode::Char('c') => Some(Action::CancelPending),
        KeyCode::Char('q') => Some(Action::Quit),
        _ => None,
    }
}

pub fn apply_action(app: &mut App, action: Action) {
    debug!(?action, "input action");
    // A status line answers the previous key only.
    app.clear_status();
    match action {
        Action::ExecutePayment => {
            app.execute_payment();
        }
        Action::FetchPayment => {
            app.fetch_payment();
        }
        Action::DetectLocation => {
            app.detect_country();
        }
        Action::LeaveTable => app.leave_table(),
        Action::CancelPending => {
            if app.cancel_pending() == 0 {
                app.set_status("Nothing to cancel");
            }
        }
        Action::Acknowledge => {
            app.acknowledge_dialog();
        }
        Action::Quit => app.request_quit(),
    }
}

/// Drain pending terminal events into the app. Returns `true` once the app
/// wants to quit.
pub fn handle_events(app: &mut App, input: &mut InputPump) -> Result<bool> {
    let mut processed = 0;
    while processed < MAX_EVENTS_PER_FRAME {
        let ev = match input.rx.try_recv() {
            Ok(InputMsg::Event(ev)) => ev,
            Ok(InputMsg::Error(msg)) => return Err(anyhow!("input error: {msg}")),
            Err(mpsc::error::TryRecvError::Empty) => break,
            Err(mpsc::error::TryRecvError::Disconnected) => {
                return Err(anyhow!("input pump disconnected"));
            }
        };
        processed += 1;

        if let Event::Key(key) = ev
            && let Some(action) = action_for(key, app.has_dialog())
        {
            apply_action(app, action);
        }

        if app.should_quit() {
            break;
        }
    }

    Ok(app.should_quit())
}
