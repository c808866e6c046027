//! Per-tick, non-blocking observation of one result slot.

use cashier_types::Outcome;

use crate::scene::{NodeId, SceneGraph};
use crate::slot::SlotReader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    /// Nothing yet; check again next tick.
    Pending,
    /// The outcome, handed out exactly once.
    Ready(Outcome),
    /// The owning context left the scene. The slot is never read.
    Cancelled,
    /// Already resolved or cancelled.
    Finished,
}

#[derive(Debug)]
pub struct Poller {
    reader: Option<SlotReader>,
    context: NodeId,
}

impl Poller {
    #[must_use]
    pub fn new(reader: SlotReader, context: NodeId) -> Self {
        Self {
            reader: Some(reader),
            context,
        }
    }

    #[must_use]
    pub fn context(&self) -> NodeId {
        self.context
    }

    /// Liveness is checked before the slot on every tick.
    pub fn poll(&mut self, scene: &SceneGraph) -> PollState {
        let Some(reader) = &self.reader else {
            return PollState::Finished;
        };

        if !scene.is_alive(self.context) {
            self.reader = None;
            return PollState::Cancelled;
        }

        match reader.peek() {
            None => PollState::Pending,
            Some(outcome) => {
                let outcome = outcome.clone();
                self.reader = None;
                PollState::Ready(outcome)
            }
        }
    }
}
