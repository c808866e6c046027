use crate::CallError;

/// Terminal result of one background call.
///
/// The failure side is a dedicated variant, so "empty", "not yet received" and
/// "error" can never be confused with one another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Raw response body of a successful call, not yet decoded.
    Success(String),
    Failure(CallError),
}

impl Outcome {
    #[must_use]
    pub fn from_result(result: Result<String, CallError>) -> Self {
        match result {
            Ok(payload) => Outcome::Success(payload),
            Err(err) => Outcome::Failure(err),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    #[must_use]
    pub fn failure(&self) -> Option<&CallError> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(err) => Some(err),
        }
    }

    /// Human-readable failure reason, if this is a failure.
    #[must_use]
    pub fn failure_reason(&self) -> Option<String> {
        self.failure().map(ToString::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_result_maps_both_sides() {
        let ok = Outcome::from_result(Ok("{}".to_string()));
        assert!(ok.is_success());
        assert_eq!(ok, Outcome::Success("{}".to_string()));
        assert!(ok.failure().is_none());

        let err = Outcome::from_result(Err(CallError::transport("connection refused")));
        assert!(!err.is_success());
        assert_eq!(
            err.failure_reason().as_deref(),
            Some("request failed: connection refused")
        );
    }
}
