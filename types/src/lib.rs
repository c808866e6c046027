//! Core domain types for Cashier.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

// Pedantic lint configuration
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod error;
mod location;
mod outcome;
mod payment;
pub mod ui;

pub use error::CallError;
pub use location::{GeoLocation, LocationVerdict};
pub use outcome::Outcome;
pub use payment::{Payer, PayerInfo, Payment};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// NonEmpty String Types
// ============================================================================

/// A string guaranteed to be non-empty (after trimming).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NonEmptyString(String);

#[derive(Debug, Error)]
#[error("value must not be empty")]
pub struct EmptyStringError;

impl NonEmptyString {
    pub fn new(value: impl Into<String>) -> Result<Self, EmptyStringError> {
        let value = value.into();
        if value.trim().is_empty() {
            Err(EmptyStringError)
        } else {
            Ok(Self(value))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NonEmptyString {
    type Error = EmptyStringError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for NonEmptyString {
    type Error = EmptyStringError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

impl std::ops::Deref for NonEmptyString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl AsRef<str> for NonEmptyString {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for NonEmptyString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Identifiers
// ============================================================================

/// Opaque payment identifier issued by the payment provider (e.g. `PAY-1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PaymentId(NonEmptyString);

/// Opaque payer identifier returned to the approval redirect (e.g. `PAYER-9`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PayerId(NonEmptyString);

macro_rules! opaque_id {
    ($ty:ident) => {
        impl $ty {
            pub fn new(value: impl Into<String>) -> Result<Self, EmptyStringError> {
                NonEmptyString::new(value).map(Self)
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

opaque_id!(PaymentId);
opaque_id!(PayerId);

// ============================================================================
// Environment & Credentials
// ============================================================================

/// Which deployment of the payment provider a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Sandbox,
    Production,
}

#[derive(Debug, Error)]
#[error("unknown environment: {0} (expected \"sandbox\" or \"production\")")]
pub struct EnvironmentParseError(String);

impl Environment {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Environment::Sandbox => "sandbox",
            Environment::Production => "production",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, EnvironmentParseError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sandbox" | "test" => Ok(Environment::Sandbox),
            "production" | "live" | "prod" => Ok(Environment::Production),
            _ => Err(EnvironmentParseError(raw.to_string())),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OAuth bearer token for the payment provider.
///
/// Note: `Debug` is manually implemented to redact the token value, preventing accidental
/// credential disclosure in logs or error messages.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(NonEmptyString);

impl BearerToken {
    pub fn new(value: impl Into<String>) -> Result<Self, EmptyStringError> {
        NonEmptyString::new(value).map(Self)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BearerToken(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_string_rejects_whitespace() {
        assert!(NonEmptyString::new("   ").is_err());
        assert!(NonEmptyString::new("").is_err());
        assert_eq!(NonEmptyString::new(" x ").unwrap().as_str(), " x ");
    }

    #[test]
    fn payment_ids_display_raw_value() {
        let id = PaymentId::new("PAY-1").unwrap();
        assert_eq!(id.to_string(), "PAY-1");
        assert!(PayerId::new("").is_err());
    }

    #[test]
    fn environment_parse_aliases() {
        assert_eq!(Environment::parse("sandbox").unwrap(), Environment::Sandbox);
        assert_eq!(Environment::parse("LIVE").unwrap(), Environment::Production);
        assert_eq!(
            Environment::parse(" production ").unwrap(),
            Environment::Production
        );
        assert!(Environment::parse("staging").is_err());
    }

    #[test]
    fn bearer_token_debug_redacts_value() {
        let token = BearerToken::new("A21AAF-secret").unwrap();
        let debug = format!("{token:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("redacted"));
        assert_eq!(token.as_str(), "A21AAF-secret");
    }
}
