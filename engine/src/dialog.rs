//! Modal dialog sessions: one per container, acknowledged with a single "OK".
//!
//! # Lifecycle
//!
//! ```text
//! Idle --present--> Showing --acknowledge--> Dismissing --(continuation)--> Idle
//!                      ^  |
//!                      +--+ present again: same visual node, new binding
//! ```
//!
//! A session owns exactly one [`AckBinding`] at a time. Presenting again on the
//! same container bumps the binding generation, so a binding captured before
//! the re-present can no longer fire the continuation.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use cashier_types::CallError;
use cashier_types::ui::ModalEffect;

use crate::scene::{DIALOG_PREFAB, DialogTone, DialogView, LayoutPreset, NodeId, SceneGraph};
use crate::worker::CallId;

const NOTICE_EFFECT: Duration = Duration::from_millis(700);
const ERROR_EFFECT: Duration = Duration::from_millis(360);

/// Runs once, on the frame loop, after the user acknowledges the dialog.
pub type DismissFn = Box<dyn FnOnce()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogPhase {
    Idle,
    Showing,
    Dismissing,
}

/// Handle for the acknowledgment control of one presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckBinding {
    container: NodeId,
    generation: u64,
}

impl AckBinding {
    #[must_use]
    pub fn container(self) -> NodeId {
        self.container
    }

    #[must_use]
    pub fn generation(self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogRequest {
    pub message: String,
    pub title: Option<String>,
    pub tone: DialogTone,
}

impl DialogRequest {
    pub fn notice(message: impl Into<String>, title: Option<String>) -> Self {
        Self {
            message: message.into(),
            title,
            tone: DialogTone::Notice,
        }
    }

    /// Failure dialog titled "Error" showing the reason.
    #[must_use]
    pub fn failure(err: &CallError) -> Self {
        Self {
            message: err.to_string(),
            title: Some("Error".to_string()),
            tone: DialogTone::Error,
        }
    }

    fn view(&self) -> DialogView {
        DialogView {
            title: self.title.clone(),
            message: self.message.clone(),
            tone: self.tone,
        }
    }
}

pub struct DialogSession {
    container: NodeId,
    visual: NodeId,
    phase: DialogPhase,
    binding: AckBinding,
    on_dismiss: Option<DismissFn>,
    origin: Option<CallId>,
    transitions: Vec<DialogPhase>,
    effect: Option<ModalEffect>,
    order: u64,
}

impl fmt::Debug for DialogSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialogSession")
            .field("container", &self.container)
            .field("visual", &self.visual)
            .field("phase", &self.phase)
            .field("binding", &self.binding)
            .field("origin", &self.origin)
            .field("transitions", &self.transitions)
            .finish_non_exhaustive()
    }
}

impl DialogSession {
    #[must_use]
    pub fn container(&self) -> NodeId {
        self.container
    }

    #[must_use]
    pub fn visual(&self) -> NodeId {
        self.visual
    }

    #[must_use]
    pub fn phase(&self) -> DialogPhase {
        self.phase
    }

    #[must_use]
    pub fn binding(&self) -> AckBinding {
        self.binding
    }

    #[must_use]
    pub fn origin(&self) -> Option<CallId> {
        self.origin
    }

    #[must_use]
    pub fn transitions(&self) -> &[DialogPhase] {
        &self.transitions
    }

    #[must_use]
    pub fn effect(&self) -> Option<&ModalEffect> {
        self.effect.as_ref()
    }

    fn enter(&mut self, phase: DialogPhase) {
        tracing::debug!(
            container = %self.container,
            from = ?self.phase,
            to = ?phase,
            "Dialog phase transition"
        );
        self.phase = phase;
        self.transitions.push(phase);
    }
}

#[derive(Debug, Default)]
pub struct DialogHost {
    sessions: BTreeMap<NodeId, DialogSession>,
    next_generation: u64,
    next_order: u64,
    reduced_motion: bool,
}

impl DialogHost {
    #[must_use]
    pub fn new(reduced_motion: bool) -> Self {
        Self {
            reduced_motion,
            ..Self::default()
        }
    }

    fn effect_for(&self, tone: DialogTone) -> Option<ModalEffect> {
        if self.reduced_motion {
            return None;
        }
        Some(match tone {
            DialogTone::Notice => ModalEffect::pop_scale(NOTICE_EFFECT),
            DialogTone::Error => ModalEffect::shake(ERROR_EFFECT),
        })
    }

    fn next_binding(&mut self, container: NodeId) -> AckBinding {
        self.next_generation += 1;
        AckBinding {
            container,
            generation: self.next_generation,
        }
    }

    /// Show `request` on `container`, or on the first top-level surface when
    /// no container is given.
    ///
    /// An existing session on the container is reused: its node is updated in
    /// place and its binding and continuation are replaced.
    pub fn present(
        &mut self,
        scene: &mut SceneGraph,
        request: DialogRequest,
        container: Option<NodeId>,
        origin: Option<CallId>,
        on_dismiss: DismissFn,
    ) -> Result<AckBinding, CallError> {
        let container = scene.resolve_container(container).map_err(|err| {
            tracing::error!(error = %err, "Cannot present dialog");
            CallError::from(err)
        })?;

        if self
            .sessions
            .get(&container)
            .is_some_and(|session| !scene.is_alive(session.visual))
        {
            self.sessions.remove(&container);
        }

        let binding = self.next_binding(container);
        let effect = self.effect_for(request.tone);
        self.next_order += 1;
        let order = self.next_order;

        if let Some(session) = self.sessions.get_mut(&container) {
            scene.set_active(session.visual, true).inspect_err(|err| {
                tracing::error!(error = %err, container = %container, "Cannot re-show dialog");
            })?;
            if let Some(view) = scene.dialog_view_mut(session.visual) {
                *view = request.view();
            }
            if session.on_dismiss.is_some() {
                tracing::warn!(
                    container = %container,
                    "Replacing unacknowledged dialog; its continuation will not run"
                );
            }
            session.binding = binding;
            session.on_dismiss = Some(on_dismiss);
            session.origin = origin;
            session.effect = effect;
            session.order = order;
            tracing::debug!(
                container = %container,
                generation = binding.generation,
                "Dialog re-presented"
            );
            return Ok(binding);
        }

        let visual = scene.instantiate(DIALOG_PREFAB, container).map_err(|err| {
            tracing::error!(error = %err, container = %container, "Cannot instantiate dialog");
            CallError::from(err)
        })?;
        if let Err(err) = scene.set_layout(visual, LayoutPreset::Center) {
            scene.destroy(visual);
            return Err(err.into());
        }
        if let Some(view) = scene.dialog_view_mut(visual) {
            *view = request.view();
        }

        let mut session = DialogSession {
            container,
            visual,
            phase: DialogPhase::Idle,
            binding,
            on_dismiss: Some(on_dismiss),
            origin,
            transitions: vec![DialogPhase::Idle],
            effect,
            order,
        };
        session.enter(DialogPhase::Showing);
        self.sessions.insert(container, session);
        Ok(binding)
    }

    /// Fire the acknowledgment control behind `binding`.
    ///
    /// Returns the finished session's transition log, or `None` if the binding
    /// is stale or its session is already gone.
    pub fn fire(&mut self, scene: &mut SceneGraph, binding: AckBinding) -> Option<Vec<DialogPhase>> {
        let current = self.sessions.get(&binding.container)?.binding;
        if current != binding {
            tracing::debug!(
                container = %binding.container,
                stale = binding.generation,
                current = current.generation,
                "Ignoring stale dialog binding"
            );
            return None;
        }

        let mut session = self.sessions.remove(&binding.container)?;
        session.enter(DialogPhase::Dismissing);
        if let Some(on_dismiss) = session.on_dismiss.take() {
            on_dismiss();
        }
        scene.destroy(session.visual);
        session.enter(DialogPhase::Idle);
        Some(session.transitions)
    }

    /// Acknowledge whatever dialog is showing on `container`.
    pub fn acknowledge(
        &mut self,
        scene: &mut SceneGraph,
        container: NodeId,
    ) -> Option<Vec<DialogPhase>> {
        let binding = self.sessions.get(&container)?.binding;
        self.fire(scene, binding)
    }

    #[must_use]
    pub fn is_showing(&self, container: NodeId) -> bool {
        self.sessions.contains_key(&container)
    }

    #[must_use]
    pub fn session(&self, container: NodeId) -> Option<&DialogSession> {
        self.sessions.get(&container)
    }

    /// Most recently presented session.
    #[must_use]
    pub fn topmost(&self) -> Option<&DialogSession> {
        self.sessions.values().max_by_key(|s| s.order)
    }

    /// Sessions in presentation order, oldest first.
    #[must_use]
    pub fn sessions(&self) -> Vec<&DialogSession> {
        let mut sessions: Vec<_> = self.sessions.values().collect();
        sessions.sort_by_key(|s| s.order);
        sessions
    }

    #[must_use]
    pub fn has_origin(&self, id: CallId) -> bool {
        self.sessions.values().any(|s| s.origin == Some(id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn advance_effects(&mut self, delta: Duration) {
        for session in self.sessions.values_mut() {
            if let Some(effect) = session.effect.as_mut() {
                effect.advance(delta);
                if effect.is_finished() {
                    session.effect = None;
                }
            }
        }
    }

    /// Drop sessions whose container or visual left the scene. Their
    /// continuations never run.
    pub fn prune(&mut self, scene: &SceneGraph) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|container, session| {
            let alive = scene.is_alive(*container) && scene.is_alive(session.visual);
            if !alive {
                tracing::debug!(container = %container, "Dialog context gone; dropping session");
            }
            alive
        });
        before - self.sessions.len()
    }
}
