//! Builds post payloads from window snapshots
//!
//! Each tick snapshots the collector, renders one post payload, and offers
//! it to the bounded send queue. The fetcher never blocks: when the sender
//! has fallen behind and the queue is full, the payload is shed so the
//! coordinator cadence stays intact.

use crate::collector::LiveMetricsCollector;
use crate::config::{AgentIdentity, KeySupplier};
use crate::transport::{common_headers, Endpoints, HttpRequest};
use crate::wire::MonitoringPoint;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Snapshots the collector and enqueues post requests
pub struct DataFetcher {
    collector: LiveMetricsCollector,
    queue: mpsc::Sender<HttpRequest>,
    endpoints: Arc<Endpoints>,
    key_supplier: KeySupplier,
    identity: Arc<AgentIdentity>,
    last_tick: Option<Instant>,
}

impl DataFetcher {
    #[must_use]
    pub fn new(
        collector: LiveMetricsCollector,
        queue: mpsc::Sender<HttpRequest>,
        endpoints: Arc<Endpoints>,
        key_supplier: KeySupplier,
        identity: Arc<AgentIdentity>,
    ) -> Self {
        Self {
            collector,
            queue,
            endpoints,
            key_supplier,
            identity,
            last_tick: None,
        }
    }

    /// Run one fetch cycle: snapshot, build, enqueue
    ///
    /// Skips silently when the collector is disabled. A full queue sheds the
    /// payload; the window data it carried is gone, which is acceptable for
    /// a best-effort live view.
    pub fn tick(&mut self) {
        let Some(counters) = self.collector.get_and_restart() else {
            return;
        };
        let Some(instrumentation_key) = (self.key_supplier)() else {
            return;
        };

        let window_secs = self
            .last_tick
            .map(|tick| tick.elapsed().as_secs())
            .unwrap_or(0);
        self.last_tick = Some(Instant::now());

        let point = MonitoringPoint::post(&self.identity, &instrumentation_key, counters, window_secs);
        let body = match serde_json::to_string(&[point]) {
            Ok(body) => body,
            Err(err) => {
                warn!(%err, "failed to serialize post payload");
                return;
            }
        };

        let request = HttpRequest {
            url: self.endpoints.post_url(&instrumentation_key),
            headers: common_headers(&self.identity, None),
            body,
        };

        match self.queue.try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!("send queue full, shedding post payload");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("send queue closed, dropping post payload");
            }
        }
    }
}

impl std::fmt::Debug for DataFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataFetcher")
            .field("last_tick", &self.last_tick)
            .finish_non_exhaustive()
    }
}
