//! One-shot handoff cell between a background worker and the frame loop.
//!
//! The writer half is consumed by [`SlotWriter::publish`], so a second write
//! cannot be expressed. Dropping an unpublished writer (the worker panicked or
//! its task was aborted) publishes a transport failure instead, so the reader
//! never waits on a slot whose worker is gone.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use cashier_types::{CallError, Outcome};

pub(crate) const ABANDONED_REASON: &str = "worker exited without an outcome";

#[derive(Debug, Default)]
struct Shared {
    outcome: OnceLock<Outcome>,
    writes: AtomicUsize,
}

impl Shared {
    fn store(&self, outcome: Outcome) {
        if self.outcome.set(outcome).is_ok() {
            self.writes.fetch_add(1, Ordering::AcqRel);
        }
    }
}

/// Create an empty slot, returning its writer and reader halves.
#[must_use]
pub fn result_slot() -> (SlotWriter, SlotReader) {
    let shared = Arc::new(Shared::default());
    (
        SlotWriter {
            shared: Some(Arc::clone(&shared)),
        },
        SlotReader { shared },
    )
}

#[derive(Debug)]
pub struct SlotWriter {
    shared: Option<Arc<Shared>>,
}

impl SlotWriter {
    /// Store the outcome. Consumes the writer.
    pub fn publish(mut self, outcome: Outcome) {
        if let Some(shared) = self.shared.take() {
            shared.store(outcome);
        }
    }
}

impl Drop for SlotWriter {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            tracing::warn!("Result slot writer dropped before publishing");
            shared.store(Outcome::Failure(CallError::Transport(
                ABANDONED_REASON.to_string(),
            )));
        }
    }
}

#[derive(Debug)]
pub struct SlotReader {
    shared: Arc<Shared>,
}

impl SlotReader {
    /// Non-blocking check; safe to call every frame.
    #[must_use]
    pub fn is_populated(&self) -> bool {
        self.shared.outcome.get().is_some()
    }

    #[must_use]
    pub fn peek(&self) -> Option<&Outcome> {
        self.shared.outcome.get()
    }

    /// Number of outcomes ever stored. Zero or one.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.shared.writes.load(Ordering::Acquire)
    }
}
