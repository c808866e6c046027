//! Real-money eligibility by country.

use cashier_types::{GeoLocation, LocationVerdict};

pub const DEFAULT_BLOCKED_COUNTRIES: &[&str] = &["VN"];

const BLOCKED_MESSAGE: &str = "Real Money transactions are not allowed in your current location";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationPolicy {
    blocked: Vec<String>,
}

impl Default for LocationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCKED_COUNTRIES.iter().copied())
    }
}

impl LocationPolicy {
    /// Country codes are compared case-insensitively.
    pub fn new<I, S>(blocked: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            blocked: blocked
                .into_iter()
                .map(|code| code.as_ref().trim().to_ascii_uppercase())
                .filter(|code| !code.is_empty())
                .collect(),
        }
    }

    #[must_use]
    pub fn is_blocked(&self, country_code: &str) -> bool {
        let code = country_code.trim();
        self.blocked
            .iter()
            .any(|blocked| blocked.eq_ignore_ascii_case(code))
    }

    #[must_use]
    pub fn verdict(&self, location: &GeoLocation) -> LocationVerdict {
        if self.is_blocked(&location.country_code) {
            LocationVerdict {
                message: BLOCKED_MESSAGE.to_string(),
                can_continue: false,
            }
        } else {
            LocationVerdict {
                message: format!("You are at {},{}", location.city, location.country),
                can_continue: true,
            }
        }
    }
}
