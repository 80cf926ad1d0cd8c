//! Constants shared across the live metrics pipeline
//!
//! This module centralizes protocol names, resource bounds, and default
//! cadences so the coordinator, senders, and collector agree on one set
//! of values.

use std::time::Duration;

/// Default cadences for the coordinator state machine
pub mod intervals {
    use super::Duration;

    /// Delay between keep-alive pings while nobody is watching
    pub const PING: Duration = Duration::from_secs(5);

    /// Delay between posts while the service is collecting
    pub const POST: Duration = Duration::from_secs(1);

    /// Pause after repeated post failures before probing again
    pub const WAIT_ON_ERROR: Duration = Duration::from_secs(10);

    /// Caller-side timeout applied to every outbound HTTP call
    pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
}

/// Bounds that keep the agent's memory use flat
pub mod limits {
    /// Maximum example documents retained per collection window
    pub const MAX_DOCUMENTS: usize = 1000;

    /// Capacity of the post queue between fetcher and sender
    pub const SEND_QUEUE_CAPACITY: usize = 256;

    /// Consecutive post failures that trigger error backoff
    pub const MAX_POST_FAILURES: u32 = 5;

    /// User properties carried verbatim on a retained document
    pub const MAX_DOCUMENT_PROPERTIES: usize = 10;
}

/// Live Metrics service protocol constants
pub mod protocol {
    /// Protocol version the service pins to reject clients it cannot parse
    pub const INVARIANT_VERSION: u32 = 1;

    /// Ping endpoint path under the live endpoint root
    pub const PING_PATH: &str = "QuickPulseService.svc/ping";

    /// Post endpoint path under the live endpoint root
    pub const POST_PATH: &str = "QuickPulseService.svc/post";

    /// Schema version stamped on every retained document
    pub const DOCUMENT_VERSION: &str = "1.0";
}

/// Request and response header names
pub mod headers {
    /// Wall-clock transmission time in 100ns ticks (millis x 10000)
    pub const TRANSMISSION_TIME: &str = "x-ms-qps-transmission-time";

    /// Per-process stream identifier correlating ping and post traffic
    pub const STREAM_ID: &str = "x-ms-qps-stream-id";

    pub const MACHINE_NAME: &str = "x-ms-qps-machine-name";
    pub const INSTANCE_NAME: &str = "x-ms-qps-instance-name";
    pub const ROLE_NAME: &str = "x-ms-qps-role-name";
    pub const INVARIANT_VERSION: &str = "x-ms-qps-invariant-version";

    /// Response: whether the service wants per-second posts
    pub const SUBSCRIBED: &str = "x-ms-qps-subscribed";

    /// Response: override for the next ping or post delay, in millis
    pub const POLLING_INTERVAL_HINT: &str = "x-ms-qps-service-polling-interval-hint";

    /// Response: endpoint to use for subsequent calls, sticky for the session
    pub const ENDPOINT_REDIRECT: &str = "x-ms-qps-service-endpoint-redirect-v2";

    /// Opaque token echoed back on subsequent pings
    pub const CONFIGURATION_ETAG: &str = "x-ms-qps-configuration-etag";
}

/// Names of the eleven metrics carried in every post payload
pub mod metric_names {
    pub const REQUESTS_RATE: &str = "\\ApplicationInsights\\Requests/Sec";
    pub const REQUEST_DURATION: &str = "\\ApplicationInsights\\Request Duration";
    pub const REQUESTS_FAILED_RATE: &str = "\\ApplicationInsights\\Requests Failed/Sec";
    pub const REQUESTS_SUCCEEDED_RATE: &str = "\\ApplicationInsights\\Requests Succeeded/Sec";
    pub const DEPENDENCY_RATE: &str = "\\ApplicationInsights\\Dependency Calls/Sec";
    pub const DEPENDENCY_DURATION: &str = "\\ApplicationInsights\\Dependency Call Duration";
    pub const DEPENDENCY_FAILED_RATE: &str = "\\ApplicationInsights\\Dependency Calls Failed/Sec";
    pub const DEPENDENCY_SUCCEEDED_RATE: &str = "\\ApplicationInsights\\Dependency Calls Succeeded/Sec";
    pub const EXCEPTIONS_RATE: &str = "\\ApplicationInsights\\Exceptions/Sec";
    pub const MEMORY_COMMITTED: &str = "\\Memory\\Committed Bytes";
    pub const PROCESSOR_TIME: &str = "\\Processor(_Total)\\% Processor Time";
}
