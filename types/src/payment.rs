//! Decoded payment provider responses.
//!
//! Only the fields the client acts on are modeled; unknown fields are ignored.

use serde::Deserialize;

/// A payment resource as returned by `GET /v1/payments/payment/{id}` and
/// `POST /v1/payments/payment/{id}/execute`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Payment {
    pub id: String,
    /// `created`, `approved` or `failed`.
    pub state: String,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub payer: Option<Payer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Payer {
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub payer_info: Option<PayerInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PayerInfo {
    #[serde(default)]
    pub payer_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl Payment {
    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.state.eq_ignore_ascii_case("approved")
    }

    #[must_use]
    pub fn payer_id(&self) -> Option<&str> {
        self.payer
            .as_ref()
            .and_then(|payer| payer.payer_info.as_ref())
            .and_then(|info| info.payer_id.as_deref())
    }
}
