//! Core engine for Cashier - call orchestration and application state.
//!
//! This crate contains the App state machine without TUI dependencies.
//!
//! # Architecture
//!
//! - [`slot`] - one-shot result handoff between a worker and the frame loop
//! - [`worker`] - spawns one tokio task per call
//! - [`poller`] - per-tick, non-blocking observation of a slot
//! - [`router`] - decodes an outcome and picks the continuation
//! - [`dialog`] - modal "OK" dialogs, one session per container
//! - [`orchestrator`] - ties the above together for each logical operation
//! - [`scene`] / [`registry`] - the surfaces dialogs and indicators attach to
//!
//! [`App`] is the caller: it owns the scene and the orchestrator, starts calls
//! in response to input, and records what happened.

pub mod config;
pub mod dialog;
pub mod location;
pub mod orchestrator;
pub mod poller;
pub mod registry;
pub mod router;
pub mod scene;
pub mod slot;
pub mod worker;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

pub use cashier_providers::{self, Endpoints, HttpTransport, Transport};
pub use cashier_types::ui::{ModalEffect, ModalEffectKind, UiOptions};
pub use cashier_types::{
    BearerToken, CallError, Environment, GeoLocation, LocationVerdict, Outcome, PayerId, Payment,
    PaymentId,
};
pub use config::{AppSettings, CashierConfig, ConfigError};
pub use dialog::{DialogPhase, DialogSession};
pub use orchestrator::{CallOrchestrator, CallSettings};
pub use scene::{DialogTone, DialogView, NodeId, NodeKind, SceneGraph};
pub use worker::CallId;

const MAX_ACTIVITY_ENTRIES: usize = 200;

/// Logical operations the app runs in the background. At most one call per
/// purpose is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    ExecutePayment,
    FetchPayment,
    DetectLocation,
}

impl Purpose {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Purpose::ExecutePayment => "payment",
            Purpose::FetchPayment => "payment lookup",
            Purpose::DetectLocation => "location check",
        }
    }
}

#[derive(Debug)]
enum AppEvent {
    PaymentExecuted(Result<Payment, CallError>),
    PaymentFetched(Result<Payment, CallError>),
    LocationChecked(Result<LocationVerdict, CallError>),
}

impl AppEvent {
    fn purpose(&self) -> Purpose {
        match self {
            AppEvent::PaymentExecuted(_) => Purpose::ExecutePayment,
            AppEvent::PaymentFetched(_) => Purpose::FetchPayment,
            AppEvent::LocationChecked(_) => Purpose::DetectLocation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Info,
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEntry {
    pub kind: ActivityKind,
    pub text: String,
}

pub struct App {
    settings: AppSettings,
    scene: SceneGraph,
    table: NodeId,
    tables_opened: u32,
    orchestrator: CallOrchestrator,
    events_tx: mpsc::UnboundedSender<AppEvent>,
    events_rx: mpsc::UnboundedReceiver<AppEvent>,
    in_flight: HashMap<Purpose, CallId>,
    activity: VecDeque<ActivityEntry>,
    status_message: Option<String>,
    last_payment: Option<Payment>,
    real_money_allowed: Option<bool>,
    tick: usize,
    last_frame: Instant,
    should_quit: bool,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("table", &self.table)
            .field("orchestrator", &self.orchestrator)
            .field("in_flight", &self.in_flight)
            .field("tick", &self.tick)
            .finish_non_exhaustive()
    }
}

impl App {
    #[must_use]
    pub fn new(settings: AppSettings, transport: Arc<dyn Transport>) -> Self {
        let mut scene = SceneGraph::with_default_prefabs();
        let table = scene.add_surface("Table 1");
        let orchestrator =
            CallOrchestrator::new(transport, settings.calls.clone(), settings.ui.reduced_motion);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            settings,
            scene,
            table,
            tables_opened: 1,
            orchestrator,
            events_tx,
            events_rx,
            in_flight: HashMap::new(),
            activity: VecDeque::new(),
            status_message: None,
            last_payment: None,
            real_money_allowed: None,
            tick: 0,
            last_frame: Instant::now(),
            should_quit: false,
        }
    }

    /// Advance one frame: animate, poll background calls, apply completions.
    pub fn tick(&mut self) {
        self.tick = self.tick.wrapping_add(1);
        let elapsed = self.frame_elapsed();
        self.orchestrator.advance_animations(elapsed);
        self.orchestrator.tick(&mut self.scene);
        self.drain_events();
        self.reconcile_in_flight();
    }

    /// Get elapsed time since last frame and update timing.
    pub fn frame_elapsed(&mut self) -> Duration {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_frame);
        self.last_frame = now;
        elapsed
    }

    /// Execute the configured payment for the configured payer.
    pub fn execute_payment(&mut self) -> bool {
        if !self.claim(Purpose::ExecutePayment) {
            return false;
        }
        let (Some(payment), Some(payer)) = (
            self.settings.payment_id.clone(),
            self.settings.payer_id.clone(),
        ) else {
            self.set_status("Set a payment id and payer id to execute a payment");
            return false;
        };

        let tx = self.events_tx.clone();
        let started = self.orchestrator.execute_payment(
            &mut self.scene,
            &payment,
            &payer,
            Some(self.table),
            move |result| {
                let _ = tx.send(AppEvent::PaymentExecuted(result));
            },
        );
        self.track(
            Purpose::ExecutePayment,
            started,
            format!("Executing payment {payment} for payer {payer}"),
        )
    }

    /// Look up the configured payment's current state.
    pub fn fetch_payment(&mut self) -> bool {
        if !self.claim(Purpose::FetchPayment) {
            return false;
        }
        let Some(payment) = self.settings.payment_id.clone() else {
            self.set_status("Set a payment id to look it up");
            return false;
        };

        let tx = self.events_tx.clone();
        let started =
            self.orchestrator
                .fetch_payment(&mut self.scene, &payment, Some(self.table), move |result| {
                    let _ = tx.send(AppEvent::PaymentFetched(result));
                });
        self.track(
            Purpose::FetchPayment,
            started,
            format!("Fetching payment {payment}"),
        )
    }

    /// Decide whether real-money play is allowed from the caller's location.
    pub fn detect_country(&mut self) -> bool {
        if !self.claim(Purpose::DetectLocation) {
            return false;
        }
        let tx = self.events_tx.clone();
        let started =
            self.orchestrator
                .detect_country(&mut self.scene, Some(self.table), move |result| {
                    let _ = tx.send(AppEvent::LocationChecked(result));
                });
        self.track(
            Purpose::DetectLocation,
            started,
            "Detecting location".to_string(),
        )
    }

    /// Press "OK" on the frontmost dialog.
    pub fn acknowledge_dialog(&mut self) -> bool {
        self.orchestrator.acknowledge_topmost(&mut self.scene)
    }

    /// Abort every call still waiting on the network.
    pub fn cancel_pending(&mut self) -> usize {
        let ids: Vec<(Purpose, CallId)> = self.in_flight.iter().map(|(p, id)| (*p, *id)).collect();
        let mut cancelled = 0;
        for (purpose, id) in ids {
            if self.orchestrator.cancel(&mut self.scene, id) {
                self.in_flight.remove(&purpose);
                self.log(ActivityKind::Info, format!("Cancelled {}", purpose.label()));
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Leave the current table for a fresh one. Calls and dialogs bound to the
    /// old table are dropped without running their continuations.
    pub fn leave_table(&mut self) {
        self.tables_opened += 1;
        let name = format!("Table {}", self.tables_opened);
        self.table = self.scene.load_surface(name.clone());
        self.log(ActivityKind::Info, format!("Moved to {name}"));
    }

    fn claim(&mut self, purpose: Purpose) -> bool {
        if self.in_flight.contains_key(&purpose) {
            self.set_status(format!("A {} is already in progress", purpose.label()));
            return false;
        }
        true
    }

    fn track(
        &mut self,
        purpose: Purpose,
        started: Result<CallId, CallError>,
        description: String,
    ) -> bool {
        match started {
            Ok(id) => {
                self.in_flight.insert(purpose, id);
                self.log(ActivityKind::Info, description);
                true
            }
            Err(err) => {
                self.log(
                    ActivityKind::Failure,
                    format!("Could not start {}: {err}", purpose.label()),
                );
                self.set_status(err.to_string());
                false
            }
        }
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.in_flight.remove(&event.purpose());
            self.apply_event(event);
        }
    }

    fn apply_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::PaymentExecuted(Ok(payment)) | AppEvent::PaymentFetched(Ok(payment)) => {
                let kind = if payment.is_approved() {
                    ActivityKind::Success
                } else {
                    ActivityKind::Info
                };
                self.log(kind, format!("Payment {} is {}", payment.id, payment.state));
                self.last_payment = Some(payment);
            }
            AppEvent::PaymentExecuted(Err(err)) => {
                self.log(ActivityKind::Failure, format!("Payment failed: {err}"));
            }
            AppEvent::PaymentFetched(Err(err)) => {
                self.log(ActivityKind::Failure, format!("Payment lookup failed: {err}"));
            }
            AppEvent::LocationChecked(Ok(verdict)) => {
                let kind = if verdict.can_continue {
                    ActivityKind::Success
                } else {
                    ActivityKind::Failure
                };
                self.real_money_allowed = Some(verdict.can_continue);
                self.log(kind, verdict.message);
            }
            AppEvent::LocationChecked(Err(err)) => {
                self.log(ActivityKind::Failure, format!("Location check failed: {err}"));
            }
        }
    }

    /// Release purposes whose call ended without telling us (cancelled).
    fn reconcile_in_flight(&mut self) {
        let orchestrator = &self.orchestrator;
        let dropped: Vec<Purpose> = self
            .in_flight
            .iter()
            .filter(|(_, id)| !orchestrator.is_pending(**id))
            .map(|(purpose, _)| *purpose)
            .collect();
        for purpose in dropped {
            self.in_flight.remove(&purpose);
            tracing::debug!(purpose = purpose.label(), "Call ended without a result");
            self.log(
                ActivityKind::Info,
                format!("The {} was cancelled", purpose.label()),
            );
        }
    }

    fn log(&mut self, kind: ActivityKind, text: impl Into<String>) {
        if self.activity.len() == MAX_ACTIVITY_ENTRIES {
            self.activity.pop_front();
        }
        self.activity.push_back(ActivityEntry {
            kind,
            text: text.into(),
        });
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
    }

    pub fn clear_status(&mut self) {
        self.status_message = None;
    }

    #[must_use]
    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    #[must_use]
    pub fn activity(&self) -> &VecDeque<ActivityEntry> {
        &self.activity
    }

    #[must_use]
    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    #[must_use]
    pub fn table(&self) -> NodeId {
        self.table
    }

    #[must_use]
    pub fn table_name(&self) -> &str {
        self.scene.surface_name(self.table).unwrap_or("")
    }

    #[must_use]
    pub fn orchestrator(&self) -> &CallOrchestrator {
        &self.orchestrator
    }

    /// Dialogs in presentation order, oldest first.
    #[must_use]
    pub fn dialogs(&self) -> Vec<&DialogSession> {
        self.orchestrator.dialogs().sessions()
    }

    #[must_use]
    pub fn has_dialog(&self) -> bool {
        !self.orchestrator.dialogs().is_empty()
    }

    /// The dialog's text as currently shown.
    #[must_use]
    pub fn dialog_view(&self, session: &DialogSession) -> Option<&DialogView> {
        match self.scene.node(session.visual())?.kind() {
            NodeKind::Dialog(view) => Some(view),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_in_flight(&self, purpose: Purpose) -> bool {
        self.in_flight.contains_key(&purpose)
    }

    #[must_use]
    pub fn last_payment(&self) -> Option<&Payment> {
        self.last_payment.as_ref()
    }

    #[must_use]
    pub fn real_money_allowed(&self) -> Option<bool> {
        self.real_money_allowed
    }

    #[must_use]
    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    #[must_use]
    pub fn ui_options(&self) -> UiOptions {
        self.settings.ui
    }

    #[must_use]
    pub fn environment(&self) -> Environment {
        self.settings.calls.environment
    }

    #[must_use]
    pub fn tick_count(&self) -> usize {
        self.tick
    }

    #[must_use]
    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn request_quit(&mut self) {
        self.should_quit = true;
    }
}
