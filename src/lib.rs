//! # Live Metrics Agent
//!
//! An in-process agent that samples request, dependency, and exception
//! telemetry from a long-running application, aggregates it into
//! short-window counters, and streams both the aggregates and a bounded
//! sample of example documents to a remote Live Metrics service.
//!
//! ## Architecture
//!
//! The pipeline is organized into several modules for clean separation of
//! concerns:
//!
//! - **collector**: Classifies incoming telemetry, maintains the rolling
//!   counters, and retains bounded document samples
//! - **ping**: Low-rate probe that asks the service whether anyone is
//!   watching
//! - **fetcher**: Snapshots the collector and enqueues post payloads
//! - **sender**: Drains the bounded send queue to the HTTP transport
//! - **coordinator**: The ping/post state machine on a single background
//!   task
//! - **transport**: The HTTP seam between the pipeline and the service
//! - **wire**: The JSON envelope shared by ping and post bodies
//!
//! ## Behavior
//!
//! While the service is not watching, the agent sends a cheap keep-alive
//! ping every few seconds. As soon as a ping (or post) response announces a
//! subscriber, the agent switches to per-second posts of aggregated
//! counters and example documents; repeated post failures degrade to a
//! backoff pause before probing again. Telemetry ingestion through
//! [`LiveMetrics::add`] is wait-free and never blocks on I/O.
//!
//! ```no_run
//! use live_metrics::{LiveMetrics, LiveMetricsConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), live_metrics::ConfigError> {
//! let agent = LiveMetrics::spawn(
//!     LiveMetricsConfig::default(),
//!     Arc::new(|| "https://live.example.com".to_string()),
//!     Arc::new(|| Some("ikey123".to_string())),
//! )?;
//! // application threads: agent.add(&item);
//! agent.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod collector;
mod config;
pub mod constants;
mod coordinator;
mod duration;
mod fetcher;
mod ping;
mod sender;
mod telemetry;
mod transport;
mod wire;

pub use collector::{
    decode_count_and_duration, encode_count_and_duration, CounterTotals, Counters,
    DependencyDocument, Document, DocumentBuffer, ExceptionDocument, FinalCounters,
    LiveMetricsCollector, RequestDocument, Subscription, MAX_CELL_DURATION_MS,
};
pub use config::{
    AgentIdentity, ConfigError, EndpointSupplier, KeySupplier, LiveMetricsConfig,
};
pub use coordinator::Coordinator;
pub use duration::{format_duration_iso8601, parse_duration_to_millis};
pub use fetcher::DataFetcher;
pub use ping::{PingResult, PingSender};
pub use sender::{DataSender, PostOutcome, PostStatus};
pub use telemetry::{
    DependencyTelemetry, EventTelemetry, ExceptionTelemetry, RequestTelemetry, TelemetryData,
    TelemetryItem, TraceTelemetry,
};
pub use transport::{
    common_headers, Endpoints, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport,
    TransportError,
};
pub use wire::{build_metrics, MetricPoint, MonitoringPoint};

use crate::constants::limits;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

/// Handle to a running live metrics agent
///
/// Created with [`LiveMetrics::spawn`], which wires the pipeline and starts
/// its two background tasks on the current tokio runtime. Dropping the
/// handle without calling [`shutdown`](LiveMetrics::shutdown) also stops
/// the pipeline, just without waiting for the tasks to finish.
pub struct LiveMetrics {
    collector: LiveMetricsCollector,
    shutdown: mpsc::Sender<()>,
    coordinator_task: JoinHandle<()>,
    sender_task: JoinHandle<()>,
}

impl LiveMetrics {
    /// Start the agent with the production HTTP transport
    ///
    /// Must be called from within a tokio runtime. Performs no network I/O
    /// on the caller's thread.
    pub fn spawn(
        config: LiveMetricsConfig,
        endpoint_supplier: EndpointSupplier,
        key_supplier: KeySupplier,
    ) -> Result<Self, ConfigError> {
        let transport = ReqwestTransport::new(config.http_timeout)
            .map_err(|err| ConfigError::HttpClient(err.to_string()))?;
        Self::spawn_with_transport(config, endpoint_supplier, key_supplier, Arc::new(transport))
    }

    /// Start the agent over a caller-provided transport
    pub fn spawn_with_transport(
        config: LiveMetricsConfig,
        endpoint_supplier: EndpointSupplier,
        key_supplier: KeySupplier,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if endpoint_supplier().trim().is_empty() {
            return Err(ConfigError::MissingEndpoint);
        }

        let identity = Arc::new(AgentIdentity::from_config(&config));
        let endpoints = Arc::new(Endpoints::new(endpoint_supplier));
        let collector = LiveMetricsCollector::new(!config.back_compat_non_normalized_cpu);
        collector.enable(key_supplier.clone());

        let (queue_tx, queue_rx) = mpsc::channel(limits::SEND_QUEUE_CAPACITY);
        let post_status = Arc::new(PostStatus::new());

        let ping_sender = PingSender::new(
            Arc::clone(&transport),
            Arc::clone(&endpoints),
            Arc::clone(&key_supplier),
            Arc::clone(&identity),
        );
        let fetcher = DataFetcher::new(
            collector.clone(),
            queue_tx,
            endpoints,
            key_supplier,
            Arc::clone(&identity),
        );
        let sender = DataSender::new(transport, queue_rx, Arc::clone(&post_status));
        let coordinator = Coordinator::new(
            collector.clone(),
            ping_sender,
            fetcher,
            post_status,
            &config,
        );

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let sender_task = tokio::spawn(sender.run());
        let coordinator_task = tokio::spawn(coordinator.run(shutdown_rx));

        info!(stream_id = %identity.stream_id, "live metrics agent started");

        Ok(Self {
            collector,
            shutdown: shutdown_tx,
            coordinator_task,
            sender_task,
        })
    }

    /// Hand one telemetry item to the collector; never blocks
    pub fn add(&self, item: &TelemetryItem) {
        self.collector.add(item);
    }

    /// The collector backing this agent, for inspection in tests
    #[must_use]
    pub fn collector(&self) -> &LiveMetricsCollector {
        &self.collector
    }

    /// Stop the pipeline and wait for its tasks to finish
    ///
    /// The coordinator wakes from its current sleep immediately; the sender
    /// drains nothing further once the queue closes behind the coordinator.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(()).await;
        let _ = self.coordinator_task.await;
        let _ = self.sender_task.await;
    }
}

impl std::fmt::Debug for LiveMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveMetrics")
            .field("collector", &self.collector)
            .finish_non_exhaustive()
    }
}
