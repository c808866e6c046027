//! Background dispatch of one call onto the runtime.

use std::fmt;
use std::future::Future;

use cashier_types::{CallError, Outcome};
use tokio::task::AbortHandle;

use crate::slot::{SlotReader, result_slot};

/// Identifier of one orchestrated call. Monotonic per orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(u64);

impl CallId {
    #[must_use]
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call-{}", self.0)
    }
}

/// Handles returned to the orchestrator for one dispatched call.
#[derive(Debug)]
pub struct Dispatched {
    pub reader: SlotReader,
    pub abort: AbortHandle,
}

/// Spawn `work` and publish its result into a fresh slot.
///
/// Never fails: every error becomes `Outcome::Failure` and is logged before it
/// is published. Must be called from within a tokio runtime.
pub fn dispatch<F>(id: CallId, work: F) -> Dispatched
where
    F: Future<Output = Result<String, CallError>> + Send + 'static,
{
    let (writer, reader) = result_slot();
    let handle = tokio::spawn(async move {
        let result = work.await;
        match &result {
            Ok(payload) => {
                tracing::debug!(call = %id, bytes = payload.len(), "Background call succeeded");
            }
            Err(err) => {
                tracing::warn!(
                    call = %id,
                    kind = err.kind(),
                    status = ?err.status(),
                    reason = %err,
                    "Background call failed"
                );
            }
        }
        writer.publish(Outcome::from_result(result));
    });

    Dispatched {
        reader,
        abort: handle.abort_handle(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    async fn wait_populated(reader: &SlotReader) {
        for _ in 0..200 {
            if reader.is_populated() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("slot never populated");
    }

    #[tokio::test]
    async fn success_is_published_once() {
        let dispatched = dispatch(CallId::new(1), async { Ok("{\"ok\":true}".to_string()) });
        wait_populated(&dispatched.reader).await;
        assert!(dispatched.reader.peek().unwrap().is_success());
        assert_eq!(dispatched.reader.write_count(), 1);
    }

    #[tokio::test]
    async fn error_is_published_as_failure() {
        let dispatched = dispatch(CallId::new(2), async {
            Err(CallError::Protocol {
                status: 500,
                body: "Internal Server Error".to_string(),
            })
        });
        wait_populated(&dispatched.reader).await;
        let outcome = dispatched.reader.peek().unwrap();
        assert_eq!(
            outcome.failure_reason().as_deref(),
            Some("Internal Server Error")
        );
        assert_eq!(dispatched.reader.write_count(), 1);
    }

    #[tokio::test]
    async fn panicking_worker_still_publishes_failure() {
        let dispatched = dispatch(CallId::new(3), async {
            if true {
                panic!("boom");
            }
            Ok(String::new())
        });
        wait_populated(&dispatched.reader).await;
        let outcome = dispatched.reader.peek().unwrap();
        assert_eq!(outcome.failure().map(CallError::kind), Some("transport"));
        assert_eq!(dispatched.reader.write_count(), 1);
    }

    #[tokio::test]
    async fn aborted_worker_publishes_failure_exactly_once() {
        let dispatched = dispatch(CallId::new(4), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(String::new())
        });
        dispatched.abort.abort();
        wait_populated(&dispatched.reader).await;
        assert!(!dispatched.reader.peek().unwrap().is_success());
        assert_eq!(dispatched.reader.write_count(), 1);
    }

    #[test]
    fn call_id_display() {
        assert_eq!(CallId::new(7).to_string(), "call-7");
    }
}
