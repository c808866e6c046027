//! Outbound request descriptions.
//!
//! A [`CallRequest`] is built once, validated at construction, and never mutated:
//! there are no `&mut` accessors and dispatch takes it by value.

use cashier_types::{BearerToken, CallError, Environment, PayerId, PaymentId};
use reqwest::Url;

use crate::{GEOLOCATION_URL, PRODUCTION_API_BASE_URL, SANDBOX_API_BASE_URL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Base URLs for every upstream the client talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    sandbox: String,
    production: String,
    geolocation: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new(
            SANDBOX_API_BASE_URL,
            PRODUCTION_API_BASE_URL,
            GEOLOCATION_URL,
        )
    }
}

impl Endpoints {
    #[must_use]
    pub fn new(
        sandbox: impl Into<String>,
        production: impl Into<String>,
        geolocation: impl Into<String>,
    ) -> Self {
        Self {
            sandbox: sandbox.into(),
            production: production.into(),
            geolocation: geolocation.into(),
        }
    }

    /// Resolve the payment API base for `environment`.
    pub fn base_url(&self, environment: Environment) -> Result<Url, CallError> {
        let raw = match environment {
            Environment::Sandbox => &self.sandbox,
            Environment::Production => &self.production,
        };
        parse_endpoint(raw, environment.as_str())
    }

    pub fn geolocation_url(&self) -> Result<Url, CallError> {
        parse_endpoint(&self.geolocation, "geolocation")
    }
}

fn parse_endpoint(raw: &str, label: &str) -> Result<Url, CallError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(CallError::configuration(format!(
            "no {label} endpoint configured"
        )));
    }
    let url = Url::parse(raw).map_err(|e| {
        CallError::configuration(format!("invalid {label} endpoint {raw:?}: {e}"))
    })?;
    if url.cannot_be_a_base() {
        return Err(CallError::configuration(format!(
            "{label} endpoint {raw:?} cannot carry a path"
        )));
    }
    Ok(url)
}

/// Append percent-encoded path segments to `base`, keeping any base path.
fn join_segments(mut base: Url, segments: &[&str]) -> Result<Url, CallError> {
    {
        let mut path = base
            .path_segments_mut()
            .map_err(|()| CallError::configuration("endpoint cannot carry a path"))?;
        path.pop_if_empty();
        path.extend(segments);
    }
    Ok(base)
}

#[derive(Debug, Clone)]
pub struct CallRequest {
    method: Method,
    url: Url,
    bearer: Option<BearerToken>,
    body: Option<String>,
}

impl CallRequest {
    /// `POST {base}/v1/payments/payment/{id}/execute` with `{"payer_id": ...}`.
    pub fn execute_payment(
        endpoints: &Endpoints,
        environment: Environment,
        payment: &PaymentId,
        payer: &PayerId,
        token: BearerToken,
    ) -> Result<Self, CallError> {
        let url = join_segments(
            endpoints.base_url(environment)?,
            &["v1", "payments", "payment", payment.as_str(), "execute"],
        )?;
        let body = serde_json::json!({ "payer_id": payer.as_str() }).to_string();
        Ok(Self {
            method: Method::Post,
            url,
            bearer: Some(token),
            body: Some(body),
        })
    }

    /// `GET {base}/v1/payments/payment/{id}`.
    pub fn get_payment(
        endpoints: &Endpoints,
        environment: Environment,
        payment: &PaymentId,
        token: BearerToken,
    ) -> Result<Self, CallError> {
        let url = join_segments(
            endpoints.base_url(environment)?,
            &["v1", "payments", "payment", payment.as_str()],
        )?;
        Ok(Self {
            method: Method::Get,
            url,
            bearer: Some(token),
            body: None,
        })
    }

    /// `GET http://ip-api.com/json`, unauthenticated.
    pub fn lookup_location(endpoints: &Endpoints) -> Result<Self, CallError> {
        Ok(Self {
            method: Method::Get,
            url: endpoints.geolocation_url()?,
            bearer: None,
            body: None,
        })
    }

    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn bearer(&self) -> Option<&BearerToken> {
        self.bearer.as_ref()
    }

    #[must_use]
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }
}
