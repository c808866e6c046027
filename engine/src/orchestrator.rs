//! Runs background calls on behalf of the frame loop and routes their outcomes.
//!
//! Each call gets a [`CallContext`]: its poller, abort handle, busy indicator
//! and delivery continuation. [`CallOrchestrator::tick`] polls every context
//! once per frame; nothing here blocks.
//!
//! # Delivery
//!
//! | Outcome | Effect |
//! |---------|--------|
//! | Success | success continuation runs in the same tick |
//! | Success, notice call | notice dialog; continuation runs after "OK" |
//! | Failure | "Error" dialog with the reason; failure continuation after "OK" |
//! | Context gone | nothing runs; worker aborted |
//!
//! At most one dialog is shown per container. Dialogs for a busy container
//! wait in a FIFO queue until the current one is acknowledged. While a
//! dialog covers a container, the busy indicators of calls still running
//! there are hidden.

use std::cell::Cell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use cashier_providers::{CallRequest, Endpoints, Transport};
use cashier_types::{
    BearerToken, CallError, Environment, GeoLocation, LocationVerdict, Outcome, PayerId, Payment,
    PaymentId,
};
use serde::de::DeserializeOwned;
use tokio::task::AbortHandle;

use crate::dialog::{AckBinding, DialogHost, DialogRequest, DismissFn};
use crate::location::LocationPolicy;
use crate::poller::{PollState, Poller};
use crate::registry::{BUSY_INDICATOR_TAG, InstanceRegistry};
use crate::router;
use crate::scene::{BUSY_INDICATOR_PREFAB, LayoutPreset, NodeId, SceneGraph};
use crate::worker::{self, CallId};

/// Everything needed to build requests for the built-in operations.
#[derive(Debug, Clone, Default)]
pub struct CallSettings {
    pub endpoints: Endpoints,
    pub environment: Environment,
    pub access_token: Option<BearerToken>,
    pub policy: LocationPolicy,
}

/// What a finished call asks of the orchestrator.
pub enum Delivery {
    /// The caller has been told; nothing more to do.
    Complete,
    /// Show a dialog; the caller is told when it is acknowledged.
    Present(PendingDialog),
}

pub struct PendingDialog {
    container: NodeId,
    request: DialogRequest,
    origin: Option<CallId>,
    on_dismiss: DismissFn,
}

impl fmt::Debug for PendingDialog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingDialog")
            .field("container", &self.container)
            .field("request", &self.request)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

type Deliver = Box<dyn FnOnce(Outcome) -> Delivery>;

struct CallContext {
    id: CallId,
    label: &'static str,
    poller: Poller,
    abort: AbortHandle,
    indicator: NodeId,
    deliver: Deliver,
}

pub struct CallOrchestrator {
    transport: Arc<dyn Transport>,
    settings: CallSettings,
    registry: InstanceRegistry,
    dialogs: DialogHost,
    calls: Vec<CallContext>,
    deferred: VecDeque<PendingDialog>,
    next_id: u64,
}

impl fmt::Debug for CallOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallOrchestrator")
            .field("settings", &self.settings)
            .field("in_flight", &self.calls.len())
            .field("dialogs", &self.dialogs.len())
            .field("deferred", &self.deferred.len())
            .finish_non_exhaustive()
    }
}

impl CallOrchestrator {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, settings: CallSettings, reduced_motion: bool) -> Self {
        Self {
            transport,
            settings,
            registry: InstanceRegistry::new(),
            dialogs: DialogHost::new(reduced_motion),
            calls: Vec::new(),
            deferred: VecDeque::new(),
            next_id: 0,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &CallSettings {
        &self.settings
    }

    #[must_use]
    pub fn dialogs(&self) -> &DialogHost {
        &self.dialogs
    }

    #[must_use]
    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.calls.len()
    }

    #[must_use]
    pub fn queued_dialogs(&self) -> usize {
        self.deferred.len()
    }

    /// True until the call's caller has been told, or the call was cancelled.
    #[must_use]
    pub fn is_pending(&self, id: CallId) -> bool {
        self.calls.iter().any(|c| c.id == id)
            || self.deferred.iter().any(|d| d.origin == Some(id))
            || self.dialogs.has_origin(id)
    }

    /// Dispatch `request` and deliver its decoded result.
    ///
    /// `on_success` runs on the tick that sees the response. `on_failure` runs
    /// only after the user acknowledges the "Error" dialog.
    pub fn execute_call<T, S, F>(
        &mut self,
        scene: &mut SceneGraph,
        label: &'static str,
        request: CallRequest,
        container: Option<NodeId>,
        on_success: S,
        on_failure: F,
    ) -> Result<CallId, CallError>
    where
        T: DeserializeOwned + 'static,
        S: FnOnce(T) + 'static,
        F: FnOnce(CallError) + 'static,
    {
        self.start(scene, label, request, container, move |id, container| -> Deliver {
            Box::new(move |outcome| {
                router::route_to(
                    outcome,
                    move |value: T| {
                        on_success(value);
                        Delivery::Complete
                    },
                    move |err| failure_delivery(container, id, err, on_failure),
                )
            })
        })
    }

    /// Like [`Self::execute_call`], but a success is first shown to the user
    /// as a notice built by `notice`; `on_success` runs after it is acknowledged.
    pub fn execute_call_with_notice<T, N, S, F>(
        &mut self,
        scene: &mut SceneGraph,
        label: &'static str,
        request: CallRequest,
        container: Option<NodeId>,
        notice: N,
        on_success: S,
        on_failure: F,
    ) -> Result<CallId, CallError>
    where
        T: DeserializeOwned + 'static,
        N: FnOnce(&T) -> DialogRequest + 'static,
        S: FnOnce(T) + 'static,
        F: FnOnce(CallError) + 'static,
    {
        self.start(scene, label, request, container, move |id, container| -> Deliver {
            Box::new(move |outcome| {
                router::route_to(
                    outcome,
                    move |value: T| {
                        Delivery::Present(PendingDialog {
                            container,
                            request: notice(&value),
                            origin: Some(id),
                            on_dismiss: Box::new(move || on_success(value)),
                        })
                    },
                    move |err| failure_delivery(container, id, err, on_failure),
                )
            })
        })
    }

    /// `POST /v1/payments/payment/{id}/execute` for `payer`.
    pub fn execute_payment(
        &mut self,
        scene: &mut SceneGraph,
        payment: &PaymentId,
        payer: &PayerId,
        container: Option<NodeId>,
        on_complete: impl FnOnce(Result<Payment, CallError>) + 'static,
    ) -> Result<CallId, CallError> {
        let request = self
            .access_token()
            .and_then(|token| {
                CallRequest::execute_payment(
                    &self.settings.endpoints,
                    self.settings.environment,
                    payment,
                    payer,
                    token,
                )
            })
            .inspect_err(|err| tracing::error!(error = %err, "Cannot build execute-payment request"))?;
        let (on_success, on_failure) = split_completion(on_complete);
        self.execute_call(
            scene,
            "Executing payment",
            request,
            container,
            on_success,
            on_failure,
        )
    }

    /// `GET /v1/payments/payment/{id}`.
    pub fn fetch_payment(
        &mut self,
        scene: &mut SceneGraph,
        payment: &PaymentId,
        container: Option<NodeId>,
        on_complete: impl FnOnce(Result<Payment, CallError>) + 'static,
    ) -> Result<CallId, CallError> {
        let request = self
            .access_token()
            .and_then(|token| {
                CallRequest::get_payment(
                    &self.settings.endpoints,
                    self.settings.environment,
                    payment,
                    token,
                )
            })
            .inspect_err(|err| tracing::error!(error = %err, "Cannot build payment lookup"))?;
        let (on_success, on_failure) = split_completion(on_complete);
        self.execute_call(
            scene,
            "Fetching payment",
            request,
            container,
            on_success,
            on_failure,
        )
    }

    /// Look up the caller's country and decide whether real-money play may
    /// continue. The verdict is shown first and delivered after "OK".
    pub fn detect_country(
        &mut self,
        scene: &mut SceneGraph,
        container: Option<NodeId>,
        on_complete: impl FnOnce(Result<LocationVerdict, CallError>) + 'static,
    ) -> Result<CallId, CallError> {
        let request = CallRequest::lookup_location(&self.settings.endpoints)
            .inspect_err(|err| tracing::error!(error = %err, "Cannot build location lookup"))?;
        let policy = self.settings.policy.clone();
        let notice_policy = policy.clone();
        let (on_success, on_failure) = split_completion(on_complete);
        self.execute_call_with_notice(
            scene,
            "Detecting location",
            request,
            container,
            move |location: &GeoLocation| {
                let verdict = notice_policy.verdict(location);
                tracing::info!(
                    country = %location.country_code,
                    can_continue = verdict.can_continue,
                    "Location resolved"
                );
                DialogRequest::notice(verdict.message, None)
            },
            move |location: GeoLocation| on_success(policy.verdict(&location)),
            on_failure,
        )
    }

    /// Show a dialog directly.
    ///
    /// Presenting over another direct dialog replaces its text, binding and
    /// continuation. A dialog owned by a call is never replaced: the new one
    /// is queued behind it and `Ok(None)` is returned.
    pub fn present_dialog(
        &mut self,
        scene: &mut SceneGraph,
        message: impl Into<String>,
        title: Option<String>,
        container: Option<NodeId>,
        on_dismiss: impl FnOnce() + 'static,
    ) -> Result<Option<AckBinding>, CallError> {
        let container = scene.resolve_container(container).map_err(|err| {
            tracing::error!(error = %err, "Cannot present dialog");
            CallError::from(err)
        })?;
        let request = DialogRequest::notice(message, title);

        let owned_by_call = self
            .dialogs
            .session(container)
            .is_some_and(|session| session.origin().is_some());
        if owned_by_call {
            tracing::debug!(container = %container, "Direct dialog queued behind a call's dialog");
            self.deferred.push_back(PendingDialog {
                container,
                request,
                origin: None,
                on_dismiss: Box::new(on_dismiss),
            });
            return Ok(None);
        }

        let binding =
            self.dialogs
                .present(scene, request, Some(container), None, Box::new(on_dismiss))?;
        self.sync_indicators(scene);
        Ok(Some(binding))
    }

    /// The user pressed "OK" on `container`'s dialog.
    pub fn acknowledge(&mut self, scene: &mut SceneGraph, container: NodeId) -> bool {
        let dismissed = self.dialogs.acknowledge(scene, container).is_some();
        if dismissed {
            self.after_dismiss(scene);
        }
        dismissed
    }

    /// Acknowledge the most recently presented dialog.
    pub fn acknowledge_topmost(&mut self, scene: &mut SceneGraph) -> bool {
        match self.dialogs.topmost().map(|session| session.container()) {
            Some(container) => self.acknowledge(scene, container),
            None => false,
        }
    }

    /// Fire a specific binding. Stale bindings are ignored.
    pub fn fire(&mut self, scene: &mut SceneGraph, binding: AckBinding) -> bool {
        let dismissed = self.dialogs.fire(scene, binding).is_some();
        if dismissed {
            self.after_dismiss(scene);
        }
        dismissed
    }

    /// Abort an in-flight call. Its continuations never run.
    pub fn cancel(&mut self, scene: &mut SceneGraph, id: CallId) -> bool {
        let Some(index) = self.calls.iter().position(|c| c.id == id) else {
            return false;
        };
        let context = self.calls.remove(index);
        context.abort.abort();
        self.release_indicator(scene, context.indicator);
        tracing::debug!(call = %id, label = context.label, "Call cancelled");
        true
    }

    /// Poll every in-flight call once and deliver whatever is ready.
    pub fn tick(&mut self, scene: &mut SceneGraph) {
        self.dialogs.prune(scene);

        let mut index = 0;
        while index < self.calls.len() {
            match self.calls[index].poller.poll(scene) {
                PollState::Pending => index += 1,
                PollState::Ready(outcome) => {
                    let context = self.calls.remove(index);
                    self.release_indicator(scene, context.indicator);
                    tracing::info!(
                        call = %context.id,
                        label = context.label,
                        success = outcome.is_success(),
                        "Call finished"
                    );
                    match (context.deliver)(outcome) {
                        Delivery::Complete => {}
                        Delivery::Present(pending) => self.present_or_queue(scene, pending),
                    }
                }
                PollState::Cancelled | PollState::Finished => {
                    let context = self.calls.remove(index);
                    context.abort.abort();
                    self.release_indicator(scene, context.indicator);
                    tracing::debug!(
                        call = %context.id,
                        label = context.label,
                        reason = %CallError::ContextGone,
                        "Call dropped"
                    );
                }
            }
        }

        self.flush_deferred(scene);
        self.sync_indicators(scene);
    }

    pub fn advance_animations(&mut self, delta: Duration) {
        self.dialogs.advance_effects(delta);
    }

    fn access_token(&self) -> Result<BearerToken, CallError> {
        self.settings
            .access_token
            .clone()
            .ok_or_else(|| CallError::configuration("no payment access token configured"))
    }

    fn start<B>(
        &mut self,
        scene: &mut SceneGraph,
        label: &'static str,
        request: CallRequest,
        container: Option<NodeId>,
        build: B,
    ) -> Result<CallId, CallError>
    where
        B: FnOnce(CallId, NodeId) -> Deliver,
    {
        let container = scene.resolve_container(container).map_err(|err| {
            tracing::error!(error = %err, label, "Cannot start call");
            CallError::from(err)
        })?;
        let indicator = self.show_indicator(scene, container, label).inspect_err(|err| {
            tracing::error!(error = %err, label, "Cannot show busy indicator");
        })?;
        if self.dialogs.is_showing(container) {
            scene.set_active(indicator, false)?;
        }

        self.next_id += 1;
        let id = CallId::new(self.next_id);
        tracing::info!(
            call = %id,
            label,
            method = ?request.method(),
            url = %request.url(),
            "Dispatching call"
        );
        let dispatched = worker::dispatch(id, self.transport.send(request));


        self.calls.push(CallContext {
            id,
            label,
            poller: Poller::new(dispatched.reader, container),
            abort: dispatched.abort,
            indicator,
            deliver: build(id, container),
        });
        Ok(id)
    }

    fn show_indicator(
        &mut self,
        scene: &mut SceneGraph,
        container: NodeId,
        label: &str,
    ) -> Result<NodeId, CallError> {
        let node = match self.registry.get(scene, BUSY_INDICATOR_TAG) {
            Some(node) => {
                scene.reparent(node, Some(container))?;
                node
            }
            None => {
                let node = scene.instantiate(BUSY_INDICATOR_PREFAB, container)?;
                scene.mark_persistent(node)?;
                scene.set_layout(node, LayoutPreset::Center)?;
                node
            }
        };
        scene.set_indicator_label(node, label);
        scene.set_active(node, true)?;
        Ok(node)
    }

    fn release_indicator(&mut self, scene: &mut SceneGraph, indicator: NodeId) {
        if scene.set_active(indicator, false).is_ok() {
            self.registry.put(BUSY_INDICATOR_TAG, indicator);
        }
    }

    fn present_or_queue(&mut self, scene: &mut SceneGraph, pending: PendingDialog) {
        if self.dialogs.is_showing(pending.container) {
            tracing::debug!(container = %pending.container, "Dialog queued behind active one");
            self.deferred.push_back(pending);
        } else {
            self.show(scene, pending);
        }
    }

    fn show(&mut self, scene: &mut SceneGraph, pending: PendingDialog) {
        let PendingDialog {
            container,
            request,
            origin,
            on_dismiss,
        } = pending;
        if let Err(err) = self
            .dialogs
            .present(scene, request, Some(container), origin, on_dismiss)
        {
            tracing::error!(error = %err, container = %container, "Dialog could not be shown");
        }
        self.sync_indicators(scene);
    }

    /// Hide the indicator of every running call whose container is covered
    /// by a dialog; show the rest.
    fn sync_indicators(&self, scene: &mut SceneGraph) {
        for context in &self.calls {
            let covered = self.dialogs.is_showing(context.poller.context());
            if let Err(err) = scene.set_active(context.indicator, !covered) {
                tracing::debug!(call = %context.id, error = %err, "Indicator already gone");
            }
        }
    }

    /// Queued dialogs take the freed container first.
    fn after_dismiss(&mut self, scene: &mut SceneGraph) {
        self.flush_deferred(scene);
        self.sync_indicators(scene);
    }

    fn flush_deferred(&mut self, scene: &mut SceneGraph) {
        let mut waiting = VecDeque::new();
        while let Some(pending) = self.deferred.pop_front() {
            if !scene.is_alive(pending.container) {
                tracing::debug!(container = %pending.container, "Queued dialog dropped: context gone");
            } else if self.dialogs.is_showing(pending.container) {
                waiting.push_back(pending);
            } else {
                self.show(scene, pending);
            }
        }
        self.deferred = waiting;
    }
}

fn failure_delivery(
    container: NodeId,
    id: CallId,
    err: CallError,
    on_failure: impl FnOnce(CallError) + 'static,
) -> Delivery {
    Delivery::Present(PendingDialog {
        container,
        request: DialogRequest::failure(&err),
        origin: Some(id),
        on_dismiss: Box::new(move || on_failure(err)),
    })
}

/// Share one completion between a success and a failure continuation.
fn split_completion<T: 'static>(
    on_complete: impl FnOnce(Result<T, CallError>) + 'static,
) -> (impl FnOnce(T) + 'static, impl FnOnce(CallError) + 'static) {
    let success = Rc::new(Cell::new(Some(on_complete)));
    let failure = Rc::clone(&success);
    (
        move |value| {
            if let Some(done) = success.take() {
                done(Ok(value));
            }
        },
        move |err| {
            if let Some(done) = failure.take() {
                done(Err(err));
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use cashier_providers::Method;
    use futures_util::future::BoxFuture;

    use super::*;
    use crate::dialog::DialogPhase;

    /// Answers every request from a fixed script, keyed by method.
    #[derive(Default)]
    struct ScriptedTransport {
        get: Option<Result<String, CallError>>,
        post: Option<Result<String, CallError>>,
        hang: bool,
        hang_get: bool,
    }

    impl Transport for ScriptedTransport {
        fn send(&self, request: CallRequest) -> BoxFuture<'static, Result<String, CallError>> {
            let answer = match request.method() {
                Method::Get => self.get.clone(),
                Method::Post => self.post.clone(),
            };
            let hang = self.hang || (self.hang_get && request.method() == Method::Get);
            Box::pin(async move {
                if hang {
                    std::future::pending::<()>().await;
                }
                answer.unwrap_or_else(|| Err(CallError::Transport("unscripted".into())))
            })
        }
    }

    fn settings() -> CallSettings {
        CallSettings {
            access_token: Some(BearerToken::new("token").unwrap()),
            ..CallSettings::default()
        }
    }

    fn orchestrator(transport: ScriptedTransport) -> CallOrchestrator {
        CallOrchestrator::new(Arc::new(transport), settings(), true)
    }

    fn ids() -> (PaymentId, PayerId) {
        (
            PaymentId::new("PAY-1").unwrap(),
            PayerId::new("PAYER-9").unwrap(),
        )
    }

    async fn tick_until_idle(orch: &mut CallOrchestrator, scene: &mut SceneGraph) {
        for _ in 0..400 {
            orch.tick(scene);
            if orch.in_flight() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("calls never finished");
    }

    type Seen<T> = Rc<RefCell<Vec<Result<T, CallError>>>>;

    fn recorder<T: 'static>() -> (Seen<T>, impl FnOnce(Result<T, CallError>) + 'static) {
        let seen: Seen<T> = Rc::default();
        let sink = Rc::clone(&seen);
        (seen, move |result| sink.borrow_mut().push(result))
    }

    #[tokio::test]
    async fn success_delivers_without_dialog() {
        let mut scene = SceneGraph::with_default_prefabs();
        let table = scene.add_surface("table");
        let mut orch = orchestrator(ScriptedTransport {
            post: Some(Ok(r#"{"id":"PAY-1","state":"approved"}"#.into())),
            ..ScriptedTransport::default()
        });
        let (payment, payer) = ids();
        let (seen, on_complete) = recorder::<Payment>();

        let id = orch
            .execute_payment(&mut scene, &payment, &payer, Some(table), on_complete)
            .unwrap();
        assert_eq!(scene.visible_indicators().count(), 1);
        assert!(seen.borrow().is_empty());

        tick_until_idle(&mut orch, &mut scene).await;

        assert_eq!(seen.borrow().len(), 1);
        assert!(seen.borrow()[0].as_ref().unwrap().is_approved());
        assert!(orch.dialogs().is_empty());
        assert_eq!(scene.visible_indicators().count(), 0);
        assert_eq!(orch.registry().pooled(BUSY_INDICATOR_TAG), 1);
        assert!(!orch.is_pending(id));
    }

    #[tokio::test]
    async fn failure_waits_for_acknowledgment() {
        let mut scene = SceneGraph::with_default_prefabs();
        let table = scene.add_surface("table");
        let mut orch = orchestrator(ScriptedTransport {
            post: Some(Err(CallError::Protocol {
                status: 500,
                body: "Internal Server Error".into(),
            })),
            ..ScriptedTransport::default()
        });
        let (payment, payer) = ids();
        let (seen, on_complete) = recorder::<Payment>();

        let id = orch
            .execute_payment(&mut scene, &payment, &payer, Some(table), on_complete)
            .unwrap();
        tick_until_idle(&mut orch, &mut scene).await;

        assert!(seen.borrow().is_empty());
        assert!(orch.is_pending(id));
        assert_eq!(scene.visible_indicators().count(), 0);
        let session = orch.dialogs().session(table).unwrap();
        assert_eq!(session.phase(), DialogPhase::Showing);
        let view = scene.dialog_view_mut(session.visual()).unwrap().clone();
        assert_eq!(view.message, "Internal Server Error");
        assert_eq!(view.title.as_deref(), Some("Error"));

        assert!(orch.acknowledge(&mut scene, table));
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(
            seen.borrow()[0].as_ref().unwrap_err().to_string(),
            "Internal Server Error"
        );
        assert!(!orch.is_pending(id));
        assert!(!orch.acknowledge(&mut scene, table));
        assert_eq!(seen.borrow().len(), 1);
    }

    #[tokio::test]
    async fn undecodable_success_is_shown_as_failure() {
        let mut scene = SceneGraph::with_default_prefabs();
        let table = scene.add_surface("table");
        let mut orch = orchestrator(ScriptedTransport {
            get: Some(Ok("<html>maintenance</html>".into())),
            ..ScriptedTransport::default()
        });
        let (seen, on_complete) = recorder::<LocationVerdict>();

        orch.detect_country(&mut scene, Some(table), on_complete)
            .unwrap();
        tick_until_idle(&mut orch, &mut scene).await;
        assert!(orch.acknowledge_topmost(&mut scene));

        let err = seen.borrow_mut().pop().unwrap().unwrap_err();
        assert_eq!(err.kind(), "decode");
    }

    #[tokio::test]
    async fn generic_call_routes_to_success_continuation() {
        let mut scene = SceneGraph::with_default_prefabs();
        scene.add_surface("table");
        let mut orch = orchestrator(ScriptedTransport {
            get: Some(Ok(r#"{"countryCode":"US","country":"United States","city":"Reno"}"#.into())),
            ..ScriptedTransport::default()
        });
        let request = CallRequest::lookup_location(&Endpoints::default()).unwrap();
        let cities = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&cities);
        let failures = Rc::new(RefCell::new(0));
        let failure_sink = Rc::clone(&failures);

        orch.execute_call(
            &mut scene,
            "Lookup",
            request,
            None,
            move |location: GeoLocation| sink.borrow_mut().push(location.city),
            move |_| *failure_sink.borrow_mut() += 1,
        )
        .unwrap();
        tick_until_idle(&mut orch, &mut scene).await;

        assert_eq!(*cities.borrow(), vec!["Reno".to_string()]);
        assert_eq!(*failures.borrow(), 0);
    }

    #[tokio::test]
    async fn missing_token_aborts_before_dispatch() {
        let mut scene = SceneGraph::with_default_prefabs();
        let table = scene.add_surface("table");
        let mut orch = CallOrchestrator::new(
            Arc::new(ScriptedTransport::default()),
            CallSettings::default(),
            true,
        );
        let (payment, payer) = ids();

        let err = orch
            .execute_payment(&mut scene, &payment, &payer, Some(table), |_| {})
            .unwrap_err();
        assert_eq!(err.kind(), "configuration");
        assert_eq!(orch.in_flight(), 0);
        assert_eq!(scene.visible_indicators().count(), 0);
    }

    #[tokio::test]
    async fn no_surface_is_configuration_error() {
        let mut scene = SceneGraph::with_default_prefabs();
        let mut orch = orchestrator(ScriptedTransport::default());
        let err = orch.detect_country(&mut scene, None, |_| {}).unwrap_err();
        assert_eq!(err.kind(), "configuration");
        assert_eq!(orch.in_flight(), 0);
    }

    #[tokio::test]
    async fn destroyed_container_cancels_silently() {
        let mut scene = SceneGraph::with_default_prefabs();
        let table = scene.add_surface("table");
        let mut orch = orchestrator(ScriptedTransport {
            hang: true,
            ..ScriptedTransport::default()
        });
        let (seen, on_complete) = recorder::<LocationVerdict>();

        let id = orch
            .detect_country(&mut scene, Some(table), on_complete)
            .unwrap();
        orch.tick(&mut scene);
        assert!(orch.is_pending(id));

        scene.destroy(table);
        orch.tick(&mut scene);

        assert_eq!(orch.in_flight(), 0);
        assert!(!orch.is_pending(id));
        assert!(orch.dialogs().is_empty());
        assert!(seen.borrow().is_empty());
    }

    #[tokio::test]
    async fn explicit_cancel_releases_indicator() {
        let mut scene = SceneGraph::with_default_prefabs();
        let table = scene.add_surface("table");
        let mut orch = orchestrator(ScriptedTransport {
            hang: true,
            ..ScriptedTransport::default()
        });

        let id = orch.detect_country(&mut scene, Some(table), |_| {}).unwrap();
        assert!(orch.cancel(&mut scene, id));
        assert!(!orch.cancel(&mut scene, id));
        assert_eq!(scene.visible_indicators().count(), 0);
        assert_eq!(orch.registry().pooled(BUSY_INDICATOR_TAG), 1);

        orch.detect_country(&mut scene, Some(table), |_| {}).unwrap();
        assert_eq!(orch.registry().pooled(BUSY_INDICATOR_TAG), 0);
        assert_eq!(scene.visible_indicators().count(), 1);
    }

    #[tokio::test]
    async fn second_dialog_on_same_container_waits() {
        let mut scene = SceneGraph::with_default_prefabs();
        let table = scene.add_surface("table");
        let mut orch = orchestrator(ScriptedTransport {
            get: Some(Err(CallError::Transport("request failed: refused".into()))),
            ..ScriptedTransport::default()
        });
        let (first, first_done) = recorder::<LocationVerdict>();
        let (second, second_done) = recorder::<LocationVerdict>();

        orch.detect_country(&mut scene, Some(table), first_done).unwrap();
        orch.detect_country(&mut scene, Some(table), second_done).unwrap();
        tick_until_idle(&mut orch, &mut scene).await;

        assert_eq!(orch.dialogs().len(), 1);
        assert_eq!(orch.queued_dialogs(), 1);

        assert!(orch.acknowledge(&mut scene, table));
        assert_eq!(first.borrow().len(), 1);
        assert!(second.borrow().is_empty());
        assert_eq!(orch.dialogs().len(), 1);
        assert_eq!(orch.queued_dialogs(), 0);

        assert!(orch.acknowledge(&mut scene, table));
        assert_eq!(second.borrow().len(), 1);
        assert!(orch.dialogs().is_empty());
    }

    #[tokio::test]
    async fn present_dialog_reuses_session() {
        let mut scene = SceneGraph::with_default_prefabs();
        let table = scene.add_surface("table");
        let mut orch = orchestrator(ScriptedTransport::default());
        let fired = Rc::new(RefCell::new(Vec::new()));
        let (a, b) = (Rc::clone(&fired), Rc::clone(&fired));

        let old = orch
            .present_dialog(&mut scene, "first", None, Some(table), move || {
                a.borrow_mut().push("first");
            })
            .unwrap()
            .unwrap();
        let new = orch
            .present_dialog(&mut scene, "second", None, Some(table), move || {
                b.borrow_mut().push("second");
            })
            .unwrap()
            .unwrap();

        assert!(!orch.fire(&mut scene, old));
        assert!(orch.fire(&mut scene, new));
        assert_eq!(*fired.borrow(), vec!["second"]);
    }

    #[tokio::test]
    async fn present_dialog_waits_behind_call_dialog() {
        let mut scene = SceneGraph::with_default_prefabs();
        let table = scene.add_surface("table");
        let mut orch = orchestrator(ScriptedTransport {
            post: Some(Err(CallError::Transport("request failed: refused".into()))),
            ..ScriptedTransport::default()
        });
        let (payment, payer) = ids();
        let (seen, on_complete) = recorder::<Payment>();
        let notices = Rc::new(RefCell::new(0));
        let notice_sink = Rc::clone(&notices);

        let id = orch
            .execute_payment(&mut scene, &payment, &payer, Some(table), on_complete)
            .unwrap();
        tick_until_idle(&mut orch, &mut scene).await;
        assert_eq!(orch.dialogs().session(table).unwrap().origin(), Some(id));

        let queued = orch
            .present_dialog(&mut scene, "Table closing", None, Some(table), move || {
                *notice_sink.borrow_mut() += 1;
            })
            .unwrap();
        assert!(queued.is_none());
        assert_eq!(orch.queued_dialogs(), 1);
        let visual = orch.dialogs().session(table).unwrap().visual();
        assert_eq!(
            scene.dialog_view_mut(visual).unwrap().message,
            "request failed: refused"
        );

        assert!(orch.acknowledge(&mut scene, table));
        assert_eq!(seen.borrow().len(), 1);
        assert!(seen.borrow()[0].is_err());
        assert!(!orch.is_pending(id));
        assert_eq!(*notices.borrow(), 0);

        let session = orch.dialogs().session(table).unwrap();
        assert_eq!(session.origin(), None);
        assert_eq!(
            scene.dialog_view_mut(session.visual()).unwrap().message,
            "Table closing"
        );
        assert!(orch.acknowledge(&mut scene, table));
        assert_eq!(*notices.borrow(), 1);
        assert!(orch.dialogs().is_empty());
    }

    #[tokio::test]
    async fn dialog_hides_other_indicators_on_container() {
        let mut scene = SceneGraph::with_default_prefabs();
        let table = scene.add_surface("table");
        let lobby = scene.add_surface("lobby");
        let mut orch = orchestrator(ScriptedTransport {
            post: Some(Err(CallError::Transport("request failed: refused".into()))),
            hang_get: true,
            ..ScriptedTransport::default()
        });
        let (payment, payer) = ids();

        orch.detect_country(&mut scene, Some(table), |_| {}).unwrap();
        orch.detect_country(&mut scene, Some(lobby), |_| {}).unwrap();
        orch.execute_payment(&mut scene, &payment, &payer, Some(table), |_| {})
            .unwrap();
        assert_eq!(scene.visible_indicators().count(), 3);

        for _ in 0..400 {
            orch.tick(&mut scene);
            if orch.dialogs().is_showing(table) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(orch.dialogs().is_showing(table));
        assert_eq!(orch.in_flight(), 2);
        assert_eq!(scene.visible_indicators().count(), 1);

        orch.detect_country(&mut scene, Some(table), |_| {}).unwrap();
        assert_eq!(scene.visible_indicators().count(), 1);

        assert!(orch.acknowledge(&mut scene, table));
        assert_eq!(scene.visible_indicators().count(), 3);
        let labels: Vec<_> = scene.visible_indicators().map(|(_, label)| label).collect();
        assert!(labels.iter().all(|label| *label == "Detecting location"));
    }
}
