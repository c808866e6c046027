use thiserror::Error;

/// Everything that can go wrong with one background call.
///
/// `Display` is the human-readable reason shown in the failure dialog, so the
/// variants carry plain strings rather than source errors (the value must be
/// `Clone` to live inside a shared result slot).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// Connection, DNS, TLS or timeout failure before a response arrived.
    #[error("{0}")]
    Transport(String),
    /// The server answered with a non-success status.
    #[error("{}", protocol_reason(.status, .body))]
    Protocol { status: u16, body: String },
    /// The response arrived but did not match the expected structure.
    #[error("malformed payload: {0}")]
    Decode(String),
    /// The owning context was torn down while the call was in flight.
    #[error("call cancelled: owning context is gone")]
    ContextGone,
    /// Missing prefab/container or an unresolved endpoint.
    #[error("configuration error: {0}")]
    Configuration(String),
}

fn protocol_reason(status: &u16, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        format!("HTTP {status}")
    } else {
        body.to_string()
    }
}

impl CallError {
    #[must_use]
    pub fn transport(detail: impl std::fmt::Display) -> Self {
        Self::Transport(format!("request failed: {detail}"))
    }

    #[must_use]
    pub fn decode(detail: impl std::fmt::Display) -> Self {
        Self::Decode(detail.to_string())
    }

    #[must_use]
    pub fn configuration(detail: impl Into<String>) -> Self {
        Self::Configuration(detail.into())
    }

    /// HTTP status for protocol failures.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Protocol { status, .. } => Some(*status),
            _ => None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Protocol { .. } => "protocol",
            Self::Decode(_) => "decode",
            Self::ContextGone => "context_gone",
            Self::Configuration(_) => "configuration",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_reason_prefers_body_text() {
        let err = CallError::Protocol {
            status: 500,
            body: "Internal Server Error".to_string(),
        };
        assert_eq!(err.to_string(), "Internal Server Error");
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn protocol_reason_falls_back_to_status() {
        let err = CallError::Protocol {
            status: 502,
            body: "  \n".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 502");
    }

    #[test]
    fn decode_reason_is_marked_malformed() {
        let err = CallError::decode("expected value at line 1 column 1");
        assert!(err.to_string().starts_with("malformed payload: "));
        assert_eq!(err.kind(), "decode");
    }
}
