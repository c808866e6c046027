//! Classify an outcome and hand it to exactly one continuation.

use cashier_types::{CallError, Outcome};
use serde::de::DeserializeOwned;

/// Decode a successful payload into `T`. Failures pass through unchanged.
pub fn decode<T: DeserializeOwned>(outcome: Outcome) -> Result<T, CallError> {
    match outcome {
        Outcome::Success(payload) => serde_json::from_str(&payload).map_err(|err| {
            tracing::warn!(error = %err, bytes = payload.len(), "Undecodable success payload");
            CallError::decode(err)
        }),
        Outcome::Failure(err) => Err(err),
    }
}

/// Invoke `on_success` with the decoded value or `on_failure` with the reason.
pub fn route_to<T, R>(
    outcome: Outcome,
    on_success: impl FnOnce(T) -> R,
    on_failure: impl FnOnce(CallError) -> R,
) -> R
where
    T: DeserializeOwned,
{
    match decode(outcome) {
        Ok(value) => on_success(value),
        Err(err) => on_failure(err),
    }
}

#[cfg(test)]
mod tests {
    use cashier_types::{GeoLocation, Payment};

    use super::*;

    #[test]
    fn success_decodes_into_value() {
        let outcome = Outcome::Success(r#"{"id":"PAY-1","state":"approved"}"#.to_string());
        let payment: Payment = decode(outcome).unwrap();
        assert!(payment.is_approved());
    }

    #[test]
    fn malformed_success_becomes_decode_failure() {
        let outcome = Outcome::Success("Internal Server Error".to_string());
        let reason = route_to::<GeoLocation, _>(outcome, |_| String::new(), |e| e.to_string());
        assert!(reason.starts_with("malformed payload: "), "{reason}");
    }

    #[test]
    fn failure_reaches_only_failure_continuation() {
        let outcome = Outcome::Failure(CallError::Transport("request failed: refused".into()));
        let (mut successes, mut failures) = (0, 0);
        route_to::<GeoLocation, _>(outcome, |_| successes += 1, |_| failures += 1);
        assert_eq!((successes, failures), (0, 1));
    }
}
