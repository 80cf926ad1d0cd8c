//! Telemetry input model
//!
//! Items arrive from the host application's export pipeline. The live
//! metrics agent only inspects requests, dependency calls, and exceptions;
//! every other kind passes through untouched.

use std::collections::BTreeMap;
use std::time::SystemTime;

/// One telemetry item handed to [`add`](crate::LiveMetrics::add)
///
/// Items whose instrumentation key does not match the collector's configured
/// key are dropped silently.
#[derive(Debug, Clone)]
pub struct TelemetryItem {
    pub instrumentation_key: String,
    /// Correlation id stamped on retained documents
    pub operation_id: Option<String>,
    pub data: TelemetryData,
}

impl TelemetryItem {
    #[must_use]
    pub fn new(instrumentation_key: impl Into<String>, data: TelemetryData) -> Self {
        Self {
            instrumentation_key: instrumentation_key.into(),
            operation_id: None,
            data,
        }
    }

    #[must_use]
    pub fn with_operation_id(mut self, operation_id: impl Into<String>) -> Self {
        self.operation_id = Some(operation_id.into());
        self
    }
}

/// Telemetry payload variants
#[derive(Debug, Clone)]
pub enum TelemetryData {
    Request(RequestTelemetry),
    Dependency(DependencyTelemetry),
    Exception(ExceptionTelemetry),
    /// Custom events; not part of the live view
    Event(EventTelemetry),
    /// Log traces; not part of the live view
    Trace(TraceTelemetry),
}

/// An inbound request handled by the host application
#[derive(Debug, Clone)]
pub struct RequestTelemetry {
    pub name: String,
    pub timestamp: Option<SystemTime>,
    /// Duration as `[d.]hh:mm:ss.fffffff` text
    pub duration: String,
    pub response_code: String,
    pub success: bool,
    pub url: Option<String>,
    pub properties: BTreeMap<String, String>,
}

/// An outbound call to a remote dependency
#[derive(Debug, Clone)]
pub struct DependencyTelemetry {
    pub name: String,
    pub command: Option<String>,
    /// Duration as `[d.]hh:mm:ss.fffffff` text
    pub duration: String,
    pub success: bool,
    pub result_code: Option<String>,
    pub target: Option<String>,
    pub dependency_type: Option<String>,
    pub properties: BTreeMap<String, String>,
}

/// An exception observed in the host application
#[derive(Debug, Clone)]
pub struct ExceptionTelemetry {
    /// Rendered stack trace, may be empty
    pub stack: String,
    pub message: Option<String>,
    pub exception_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EventTelemetry {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct TraceTelemetry {
    pub message: String,
}
