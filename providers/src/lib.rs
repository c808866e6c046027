//! HTTP clients for the payment provider and the geolocation service.
//!
//! # Architecture
//!
//! - [`CallRequest`] - immutable description of one outbound call, built by the
//!   request constructors in [`request`]
//! - [`Transport`] - the seam the engine dispatches work through
//! - [`HttpTransport`] - the `reqwest` implementation
//!
//! # Error Handling
//!
//! Nothing here returns `anyhow` errors or panics: every failure is normalized
//! into [`CallError`] so the engine can place it in a result slot as-is.
//!
//! | Failure | Variant |
//! |---------|---------|
//! | Connect/DNS/TLS/timeout | `Transport` |
//! | Non-2xx status | `Protocol { status, body }` |
//! | Body not readable as text | `Transport` |

pub mod request;

pub use cashier_types;
pub use request::{CallRequest, Endpoints, Method};

use std::time::Duration;

use cashier_types::CallError;
use futures_util::future::BoxFuture;

/// Canonical PayPal sandbox REST endpoint.
pub const SANDBOX_API_BASE_URL: &str = "https://api.sandbox.paypal.com";
/// Canonical PayPal production REST endpoint.
pub const PRODUCTION_API_BASE_URL: &str = "https://api.paypal.com";
/// Geolocation lookup. Plain HTTP: the free tier does not serve TLS.
pub const GEOLOCATION_URL: &str = "http://ip-api.com/json";

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const TCP_KEEPALIVE_SECS: u64 = 60;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

fn base_client_builder() -> reqwest::ClientBuilder {
    use reqwest::header::{HeaderMap, HeaderValue};

    let mut default_headers = HeaderMap::new();
    default_headers.insert(
        reqwest::header::ACCEPT,
        HeaderValue::from_static("application/json"),
    );

    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::none())
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
        .default_headers(default_headers)
}

/// Build a client whose requests fail with a transport error after `timeout`.
pub fn http_client_with_timeout(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    base_client_builder().timeout(timeout).build()
}

/// Read at most `MAX_ERROR_BODY_BYTES` of an error response for diagnostics.
pub async fn read_capped_error_body(response: reqwest::Response) -> String {
    use futures_util::StreamExt;
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

/// Something that can carry a [`CallRequest`] to its endpoint.
///
/// The returned future owns everything it needs so it can be spawned onto the
/// runtime independently of the caller.
pub trait Transport: Send + Sync {
    fn send(&self, request: CallRequest) -> BoxFuture<'static, Result<String, CallError>>;
}

/// [`Transport`] over a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, CallError> {
        http_client_with_timeout(timeout)
            .map(Self::new)
            .map_err(|e| CallError::configuration(format!("failed to build HTTP client: {e}")))
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: CallRequest) -> BoxFuture<'static, Result<String, CallError>> {
        let client = self.client.clone();
        Box::pin(async move { perform(&client, &request).await })
    }
}

async fn perform(client: &reqwest::Client, request: &CallRequest) -> Result<String, CallError> {
    let method = match request.method() {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
    };

    let mut builder = client.request(method, request.url().clone());
    if let Some(token) = request.bearer() {
        builder = builder.bearer_auth(token.as_str());
    }
    if let Some(body) = request.body() {
        builder = builder
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_string());
    }

    tracing::debug!(method = ?request.method(), url = %request.url(), "Sending request");

    let response = builder.send().await.map_err(CallError::transport)?;
    let status = response.status();
    if !status.is_success() {
        let body = read_capped_error_body(response).await;
        return Err(CallError::Protocol {
            status: status.as_u16(),
            body,
        });
    }

    response.text().await.map_err(CallError::transport)
}
