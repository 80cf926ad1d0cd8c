//! Telemetry classification and per-window aggregation
//!
//! The collector is the ingestion point for the whole pipeline. Application
//! threads call [`LiveMetricsCollector::add`] on their hot path, so every
//! update is a bounded number of atomic operations plus at most one append
//! to the document buffer. The coordinator task owns the other half of the
//! contract: it flips the subscription state and snapshots the window.

mod counters;
mod documents;
mod host;

pub use counters::{
    decode_count_and_duration, encode_count_and_duration, CounterTotals, Counters,
    MAX_CELL_DURATION_MS,
};
pub use documents::{
    DependencyDocument, Document, DocumentBuffer, ExceptionDocument, RequestDocument,
};
pub use host::{HostMonitor, HostSample};

use crate::config::KeySupplier;
use crate::constants::{limits, protocol};
use crate::duration::{format_duration_iso8601, try_parse_duration_millis};
use crate::telemetry::{
    DependencyTelemetry, ExceptionTelemetry, RequestTelemetry, TelemetryData, TelemetryItem,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::warn;

/// Whether the remote side currently wants per-second posts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscription {
    /// Only keep-alive pings; the collector retains nothing
    Off,
    /// The service is watching; aggregate counters and retain documents
    On,
}

impl From<u8> for Subscription {
    fn from(value: u8) -> Self {
        match value {
            1 => Subscription::On,
            _ => Subscription::Off,
        }
    }
}

/// Decoded snapshot of one collection window
#[derive(Debug, Clone, Default)]
pub struct FinalCounters {
    pub requests: u64,
    pub unsuccessful_requests: u64,
    /// Summed request duration in whole milliseconds
    pub requests_duration_ms: u64,
    pub dependencies: u64,
    pub unsuccessful_dependencies: u64,
    /// Summed dependency call duration in whole milliseconds
    pub dependencies_duration_ms: u64,
    pub exceptions: u64,
    /// Committed memory in bytes, 0 when unavailable
    pub memory_committed: u64,
    /// CPU percent; negative when no reading is available
    pub cpu_usage: f64,
    /// Retained example documents, FIFO, at most 1000
    pub documents: Vec<Document>,
}

/// Ingests telemetry and maintains the rolling window
///
/// Cheap to clone; clones share the same window.
#[derive(Debug, Clone)]
pub struct LiveMetricsCollector {
    inner: Arc<CollectorInner>,
}

struct CollectorInner {
    key_supplier: RwLock<Option<KeySupplier>>,
    subscription: AtomicU8,
    counters: Counters,
    documents: DocumentBuffer,
    host: Mutex<HostMonitor>,
}

impl std::fmt::Debug for CollectorInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorInner")
            .field("subscription", &Subscription::from(self.subscription.load(Ordering::Relaxed)))
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl LiveMetricsCollector {
    /// Create a disabled collector
    ///
    /// `normalize_cpu` controls whether CPU readings are divided by the core
    /// count; pass `false` for dashboards that expect the literal per-core
    /// percentage.
    #[must_use]
    pub fn new(normalize_cpu: bool) -> Self {
        Self {
            inner: Arc::new(CollectorInner {
                key_supplier: RwLock::new(None),
                subscription: AtomicU8::new(Subscription::Off as u8),
                counters: Counters::default(),
                documents: DocumentBuffer::new(limits::MAX_DOCUMENTS),
                host: Mutex::new(HostMonitor::new(normalize_cpu)),
            }),
        }
    }

    /// Arm the collector with an instrumentation key supplier
    ///
    /// Switching suppliers is allowed; the key is re-read on every add.
    pub fn enable(&self, key_supplier: KeySupplier) {
        *self.write_supplier() = Some(key_supplier);
    }

    /// Disarm the collector; adds become no-ops and snapshots return `None`
    pub fn disable(&self) {
        *self.write_supplier() = None;
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.read_supplier().is_some()
    }

    /// Coordinator notification of the current subscription verdict
    pub fn set_subscription(&self, subscription: Subscription) {
        self.inner
            .subscription
            .store(subscription as u8, Ordering::Relaxed);
    }

    #[must_use]
    pub fn subscription(&self) -> Subscription {
        Subscription::from(self.inner.subscription.load(Ordering::Relaxed))
    }

    /// Ingest one telemetry item; never blocks and never panics
    ///
    /// Items are dropped unless the collector is enabled, the service is
    /// subscribed, and the item's instrumentation key matches.
    pub fn add(&self, item: &TelemetryItem) {
        if self.subscription() != Subscription::On {
            return;
        }
        let Some(key) = self.configured_key() else {
            return;
        };
        if item.instrumentation_key != key {
            return;
        }

        match &item.data {
            TelemetryData::Request(request) => self.add_request(item, request),
            TelemetryData::Dependency(dependency) => self.add_dependency(item, dependency),
            TelemetryData::Exception(exception) => self.add_exception(item, exception),
            // Other kinds are not part of the live view
            TelemetryData::Event(_) | TelemetryData::Trace(_) => {}
        }
    }

    /// Non-destructive snapshot, `None` while disabled
    #[must_use]
    pub fn peek(&self) -> Option<FinalCounters> {
        if !self.is_enabled() {
            return None;
        }
        let totals = self.inner.counters.peek();
        let documents = self.inner.documents.snapshot();
        Some(self.finalize(totals, documents))
    }

    /// Snapshot the window and reset it, `None` while disabled
    #[must_use]
    pub fn get_and_restart(&self) -> Option<FinalCounters> {
        if !self.is_enabled() {
            return None;
        }
        let totals = self.inner.counters.snapshot_and_reset();
        let documents = self.inner.documents.drain();
        Some(self.finalize(totals, documents))
    }

    fn add_request(&self, item: &TelemetryItem, request: &RequestTelemetry) {
        let duration_ms = parse_item_duration(&request.duration);
        self.inner.counters.record_request(duration_ms, request.success);
        self.inner.documents.offer_with(|| {
            Document::Request(RequestDocument {
                document_type: "Request",
                version: protocol::DOCUMENT_VERSION,
                operation_id: item.operation_id.clone(),
                properties: trimmed_properties(&request.properties),
                name: request.name.clone(),
                success: request.success,
                duration: format_duration_iso8601(duration_ms),
                response_code: request.response_code.clone(),
                operation_name: None,
                url: request.url.clone(),
            })
        });
    }

    fn add_dependency(&self, item: &TelemetryItem, dependency: &DependencyTelemetry) {
        let duration_ms = parse_item_duration(&dependency.duration);
        self.inner
            .counters
            .record_dependency(duration_ms, dependency.success);
        self.inner.documents.offer_with(|| {
            Document::Dependency(DependencyDocument {
                document_type: "RemoteDependency",
                version: protocol::DOCUMENT_VERSION,
                operation_id: item.operation_id.clone(),
                properties: trimmed_properties(&dependency.properties),
                name: dependency.name.clone(),
                target: dependency.target.clone(),
                success: dependency.success,
                duration: format_duration_iso8601(duration_ms),
                result_code: dependency.result_code.clone(),
                command_name: dependency.command.clone(),
                dependency_type_name: dependency.dependency_type.clone(),
                operation_name: None,
            })
        });
    }

    fn add_exception(&self, item: &TelemetryItem, exception: &ExceptionTelemetry) {
        self.inner.counters.record_exception();
        self.inner.documents.offer_with(|| {
            Document::Exception(ExceptionDocument {
                document_type: "Exception",
                version: protocol::DOCUMENT_VERSION,
                operation_id: item.operation_id.clone(),
                properties: None,
                exception: exception.stack.clone(),
                exception_message: exception.message.clone(),
                exception_type: exception.exception_type.clone(),
            })
        });
    }

    fn finalize(&self, totals: CounterTotals, documents: Vec<Document>) -> FinalCounters {
        let sample = self.sample_host();
        FinalCounters {
            requests: totals.requests,
            unsuccessful_requests: totals.unsuccessful_requests,
            requests_duration_ms: totals.requests_duration_ms,
            dependencies: totals.dependencies,
            unsuccessful_dependencies: totals.unsuccessful_dependencies,
            dependencies_duration_ms: totals.dependencies_duration_ms,
            exceptions: totals.exceptions,
            memory_committed: sample.memory_committed,
            cpu_usage: sample.cpu_percent,
            documents,
        }
    }

    fn sample_host(&self) -> HostSample {
        let mut monitor = match self.inner.host.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        monitor.sample()
    }

    fn configured_key(&self) -> Option<String> {
        self.read_supplier().as_ref().and_then(|supplier| supplier())
    }

    fn read_supplier(&self) -> std::sync::RwLockReadGuard<'_, Option<KeySupplier>> {
        match self.inner.key_supplier.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_supplier(&self) -> std::sync::RwLockWriteGuard<'_, Option<KeySupplier>> {
        match self.inner.key_supplier.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Parse an item duration, counting malformed text as zero
fn parse_item_duration(duration: &str) -> u64 {
    match try_parse_duration_millis(duration) {
        Some(duration_ms) => duration_ms,
        None => {
            warn!(duration, "malformed telemetry duration, counting as zero");
            0
        }
    }
}

/// Keep at most the first few user properties, verbatim
fn trimmed_properties(properties: &BTreeMap<String, String>) -> Option<BTreeMap<String, String>> {
    if properties.is_empty() {
        return None;
    }
    Some(
        properties
            .iter()
            .take(limits::MAX_DOCUMENT_PROPERTIES)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    )
}
