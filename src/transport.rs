//! HTTP transport seam
//!
//! The pipeline talks to the service through the [`HttpTransport`] trait so
//! tests can script responses without a network. The production
//! implementation wraps a shared reqwest client with a caller-side timeout;
//! a timeout or connection failure is reported as an error and never
//! propagates past the state machine.

use crate::config::{AgentIdentity, EndpointSupplier};
use crate::constants::{headers, protocol};
use crate::wire::epoch_millis;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;

/// One outbound request, always a JSON POST
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
}

/// Status and headers of a service response; bodies are never inspected
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: u16,
    headers: HashMap<String, String>,
}

impl HttpResponse {
    #[must_use]
    pub fn new(status: u16, headers: Vec<(String, String)>) -> Self {
        Self {
            status,
            headers: headers
                .into_iter()
                .map(|(name, value)| (name.to_ascii_lowercase(), value))
                .collect(),
        }
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Whether the service wants per-second posts
    #[must_use]
    pub fn subscribed(&self) -> bool {
        self.header(headers::SUBSCRIBED)
            .is_some_and(|value| value.eq_ignore_ascii_case("true"))
    }

    /// Service override for the next ping or post delay
    #[must_use]
    pub fn polling_hint(&self) -> Option<Duration> {
        self.header(headers::POLLING_INTERVAL_HINT)
            .and_then(|value| value.parse().ok())
            .map(Duration::from_millis)
    }

    /// Endpoint to use for subsequent calls
    #[must_use]
    pub fn redirect_endpoint(&self) -> Option<&str> {
        self.header(headers::ENDPOINT_REDIRECT)
    }

    /// Configuration token to echo back on subsequent pings
    #[must_use]
    pub fn config_etag(&self) -> Option<&str> {
        self.header(headers::CONFIGURATION_ETAG)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("transport failure: {0}")]
    Failed(String),
}

/// Dispatches requests to the Live Metrics service
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Production transport backed by a pooled reqwest client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| TransportError::Failed(err.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self
            .client
            .post(&request.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }

        let response = builder.body(request.body).send().await.map_err(|err| {
            if err.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Failed(err.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        Ok(HttpResponse::new(status, headers))
    }
}

/// Builds ping and post URLs, honoring a sticky service redirect
pub struct Endpoints {
    base: EndpointSupplier,
    redirect: RwLock<Option<String>>,
}

impl Endpoints {
    #[must_use]
    pub fn new(base: EndpointSupplier) -> Self {
        Self {
            base,
            redirect: RwLock::new(None),
        }
    }

    /// Pin subsequent calls to a service-provided endpoint
    pub fn apply_redirect(&self, endpoint: &str) {
        if endpoint.is_empty() {
            return;
        }
        let mut redirect = match self.redirect.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *redirect = Some(endpoint.to_string());
    }

    fn root(&self) -> String {
        let redirect = match self.redirect.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match redirect.as_ref() {
            Some(endpoint) => endpoint.clone(),
            None => (self.base)(),
        }
    }

    #[must_use]
    pub fn ping_url(&self, instrumentation_key: &str) -> String {
        self.url(protocol::PING_PATH, instrumentation_key)
    }

    #[must_use]
    pub fn post_url(&self, instrumentation_key: &str) -> String {
        self.url(protocol::POST_PATH, instrumentation_key)
    }

    fn url(&self, path: &str, instrumentation_key: &str) -> String {
        let root = self.root();
        format!(
            "{}/{path}?ikey={instrumentation_key}",
            root.trim_end_matches('/')
        )
    }
}

impl std::fmt::Debug for Endpoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoints").finish_non_exhaustive()
    }
}

/// Header set common to ping and post requests
#[must_use]
pub fn common_headers(
    identity: &AgentIdentity,
    etag: Option<&str>,
) -> Vec<(&'static str, String)> {
    let mut entries = vec![
        (
            headers::TRANSMISSION_TIME,
            (epoch_millis() * 10_000).to_string(),
        ),
        (headers::STREAM_ID, identity.stream_id.clone()),
        (headers::MACHINE_NAME, identity.machine_name.clone()),
        (headers::INSTANCE_NAME, identity.instance_name.clone()),
        (
            headers::INVARIANT_VERSION,
            protocol::INVARIANT_VERSION.to_string(),
        ),
    ];
    if let Some(role_name) = &identity.role_name {
        entries.push((headers::ROLE_NAME, role_name.clone()));
    }
    if let Some(etag) = etag {
        entries.push((headers::CONFIGURATION_ETAG, etag.to_string()));
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn fixed_endpoints(root: &str) -> Endpoints {
        let root = root.to_string();
        Endpoints::new(Arc::new(move || root.clone()))
    }

    #[test]
    fn test_url_building() {
        let endpoints = fixed_endpoints("https://live.example.com/");
        assert_eq!(
            endpoints.ping_url("ikey123"),
            "https://live.example.com/QuickPulseService.svc/ping?ikey=ikey123"
        );
        assert_eq!(
            endpoints.post_url("ikey123"),
            "https://live.example.com/QuickPulseService.svc/post?ikey=ikey123"
        );
    }

    #[test]
    fn test_redirect_is_sticky() {
        let endpoints = fixed_endpoints("https://live.example.com");
        endpoints.apply_redirect("https://eastus.live.example.com");
        assert_eq!(
            endpoints.ping_url("k"),
            "https://eastus.live.example.com/QuickPulseService.svc/ping?ikey=k"
        );
        // Empty redirects are ignored
        endpoints.apply_redirect("");
        assert!(endpoints.post_url("k").starts_with("https://eastus."));
    }

    #[test]
    fn test_response_header_access() {
        let response = HttpResponse::new(
            200,
            vec![
                ("X-MS-QPS-Subscribed".to_string(), "true".to_string()),
                (
                    "x-ms-qps-service-polling-interval-hint".to_string(),
                    "250".to_string(),
                ),
                ("x-ms-qps-configuration-etag".to_string(), "abc".to_string()),
            ],
        );
        assert!(response.is_success());
        assert!(response.subscribed());
        assert_eq!(response.polling_hint(), Some(Duration::from_millis(250)));
        assert_eq!(response.config_etag(), Some("abc"));
        assert_eq!(response.redirect_endpoint(), None);
    }

    #[test]
    fn test_unsubscribed_when_header_missing() {
        let response = HttpResponse::new(200, Vec::new());
        assert!(!response.subscribed());
        assert_eq!(response.polling_hint(), None);
    }

    #[test]
    fn test_common_headers_include_identity() {
        let identity = AgentIdentity {
            stream_id: "abc123".to_string(),
            machine_name: "machine1".to_string(),
            instance_name: "instance1".to_string(),
            role_name: Some("role1".to_string()),
            version: "1.0.0".to_string(),
        };
        let entries = common_headers(&identity, Some("etag1"));
        let lookup = |name: &str| {
            entries
                .iter()
                .find(|(header, _)| *header == name)
                .map(|(_, value)| value.as_str())
        };
        assert_eq!(lookup(crate::constants::headers::STREAM_ID), Some("abc123"));
        assert_eq!(lookup(crate::constants::headers::ROLE_NAME), Some("role1"));
        assert_eq!(
            lookup(crate::constants::headers::CONFIGURATION_ETAG),
            Some("etag1")
        );
        assert_eq!(
            lookup(crate::constants::headers::INVARIANT_VERSION),
            Some("1")
        );
    }
}
