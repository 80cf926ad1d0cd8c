//! Keep-alive probe against the Live Metrics service
//!
//! While nobody is watching, the coordinator pings on a slow cadence to ask
//! whether the service wants data. The verdict comes from response headers
//! alone; ping bodies exist only so the service can identify the stream.

use crate::config::{AgentIdentity, KeySupplier};
use crate::transport::{common_headers, Endpoints, HttpRequest, HttpTransport};
use crate::wire::MonitoringPoint;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Subscription verdict from one ping
#[derive(Debug, Clone, Default)]
pub struct PingResult {
    pub subscribed: bool,
    /// Service override for the next ping delay
    pub next_delay: Option<Duration>,
    /// Endpoint the service redirected us to, already applied
    pub redirected_to: Option<String>,
    /// Configuration token the service handed out
    pub config_etag: Option<String>,
}

/// Sends pings and tracks the per-session etag and redirect
pub struct PingSender {
    transport: Arc<dyn HttpTransport>,
    endpoints: Arc<Endpoints>,
    key_supplier: KeySupplier,
    identity: Arc<AgentIdentity>,
    etag: Option<String>,
}

impl PingSender {
    #[must_use]
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        endpoints: Arc<Endpoints>,
        key_supplier: KeySupplier,
        identity: Arc<AgentIdentity>,
    ) -> Self {
        Self {
            transport,
            endpoints,
            key_supplier,
            identity,
            etag: None,
        }
    }

    /// Probe the service once
    ///
    /// Any transport or service failure yields an unsubscribed verdict; the
    /// coordinator keeps pinging on the default cadence.
    pub async fn ping(&mut self) -> PingResult {
        let Some(instrumentation_key) = (self.key_supplier)() else {
            return PingResult::default();
        };

        let envelope = MonitoringPoint::ping(&self.identity);
        let body = match serde_json::to_string(&envelope) {
            Ok(body) => body,
            Err(err) => {
                warn!(%err, "failed to serialize ping envelope");
                return PingResult::default();
            }
        };

        let request = HttpRequest {
            url: self.endpoints.ping_url(&instrumentation_key),
            headers: common_headers(&self.identity, self.etag.as_deref()),
            body,
        };

        match self.transport.send(request).await {
            Ok(response) if response.is_success() => {
                let redirected_to = response.redirect_endpoint().map(str::to_string);
                if let Some(endpoint) = redirected_to.as_deref() {
                    self.endpoints.apply_redirect(endpoint);
                }
                let config_etag = response.config_etag().map(str::to_string);
                if config_etag.is_some() {
                    self.etag = config_etag.clone();
                }
                PingResult {
                    subscribed: response.subscribed(),
                    next_delay: response.polling_hint(),
                    redirected_to,
                    config_etag,
                }
            }
            Ok(response) => {
                debug!(status = response.status(), "ping rejected");
                PingResult::default()
            }
            Err(err) => {
                debug!(%err, "ping failed");
                PingResult::default()
            }
        }
    }
}

impl std::fmt::Debug for PingSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PingSender")
            .field("etag", &self.etag)
            .finish_non_exhaustive()
    }
}
