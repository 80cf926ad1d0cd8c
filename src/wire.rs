//! Wire envelope for the Live Metrics service
//!
//! Ping and post bodies share one envelope shape. Pings carry nulls for the
//! data fields plus the stream id; posts carry the documents, the key, and
//! the fixed set of eleven weighted metrics, with a null stream id.

use crate::collector::{Document, FinalCounters};
use crate::config::AgentIdentity;
use crate::constants::{metric_names, protocol};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// One envelope, serialized as the ping body or as the single element of
/// the post body array
#[derive(Debug, Clone, Serialize)]
pub struct MonitoringPoint {
    #[serde(rename = "Documents")]
    pub documents: Option<Vec<Document>>,
    #[serde(rename = "InstrumentationKey")]
    pub instrumentation_key: Option<String>,
    #[serde(rename = "Metrics")]
    pub metrics: Option<Vec<MetricPoint>>,
    #[serde(rename = "InvariantVersion")]
    pub invariant_version: u32,
    /// Wall-clock timestamp as `/Date(millis)/`
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "StreamId")]
    pub stream_id: Option<String>,
    #[serde(rename = "MachineName")]
    pub machine_name: String,
    #[serde(rename = "Instance")]
    pub instance: String,
    #[serde(rename = "RoleName")]
    pub role_name: Option<String>,
}

impl MonitoringPoint {
    /// Envelope for a keep-alive ping; data fields are all null
    #[must_use]
    pub fn ping(identity: &AgentIdentity) -> Self {
        Self {
            documents: None,
            instrumentation_key: None,
            metrics: None,
            invariant_version: protocol::INVARIANT_VERSION,
            timestamp: date_timestamp(),
            version: identity.version.clone(),
            stream_id: Some(identity.stream_id.clone()),
            machine_name: identity.machine_name.clone(),
            instance: identity.instance_name.clone(),
            role_name: identity.role_name.clone(),
        }
    }

    /// Envelope for one post payload built from a window snapshot
    #[must_use]
    pub fn post(
        identity: &AgentIdentity,
        instrumentation_key: &str,
        counters: FinalCounters,
        window_secs: u64,
    ) -> Self {
        let metrics = build_metrics(&counters, window_secs);
        let documents = if counters.documents.is_empty() {
            None
        } else {
            Some(counters.documents)
        };
        Self {
            documents,
            instrumentation_key: Some(instrumentation_key.to_string()),
            metrics: Some(metrics),
            invariant_version: protocol::INVARIANT_VERSION,
            timestamp: date_timestamp(),
            version: identity.version.clone(),
            stream_id: None,
            machine_name: identity.machine_name.clone(),
            instance: identity.instance_name.clone(),
            role_name: identity.role_name.clone(),
        }
    }
}

/// One named, weighted metric in a post payload
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricPoint {
    #[serde(rename = "Name")]
    pub name: &'static str,
    #[serde(rename = "Value")]
    pub value: i64,
    #[serde(rename = "Weight")]
    pub weight: i64,
}

/// Derive the fixed eleven metrics from a window snapshot
///
/// Rate metrics carry the raw window count weighted by the window length in
/// seconds (1 when unknown). Duration metrics carry the average in
/// milliseconds weighted by the count.
#[must_use]
pub fn build_metrics(counters: &FinalCounters, window_secs: u64) -> Vec<MetricPoint> {
    let window_weight = window_secs.max(1) as i64;
    vec![
        MetricPoint {
            name: metric_names::REQUESTS_RATE,
            value: counters.requests as i64,
            weight: window_weight,
        },
        MetricPoint {
            name: metric_names::REQUEST_DURATION,
            value: average(counters.requests_duration_ms, counters.requests),
            weight: counters.requests as i64,
        },
        MetricPoint {
            name: metric_names::REQUESTS_FAILED_RATE,
            value: counters.unsuccessful_requests as i64,
            weight: window_weight,
        },
        MetricPoint {
            name: metric_names::REQUESTS_SUCCEEDED_RATE,
            value: counters.requests.saturating_sub(counters.unsuccessful_requests) as i64,
            weight: window_weight,
        },
        MetricPoint {
            name: metric_names::DEPENDENCY_RATE,
            value: counters.dependencies as i64,
            weight: window_weight,
        },
        MetricPoint {
            name: metric_names::DEPENDENCY_DURATION,
            value: average(counters.dependencies_duration_ms, counters.dependencies),
            weight: counters.dependencies as i64,
        },
        MetricPoint {
            name: metric_names::DEPENDENCY_FAILED_RATE,
            value: counters.unsuccessful_dependencies as i64,
            weight: window_weight,
        },
        MetricPoint {
            name: metric_names::DEPENDENCY_SUCCEEDED_RATE,
            value: counters
                .dependencies
                .saturating_sub(counters.unsuccessful_dependencies) as i64,
            weight: window_weight,
        },
        MetricPoint {
            name: metric_names::EXCEPTIONS_RATE,
            value: counters.exceptions as i64,
            weight: window_weight,
        },
        MetricPoint {
            name: metric_names::MEMORY_COMMITTED,
            value: counters.memory_committed as i64,
            weight: 1,
        },
        MetricPoint {
            name: metric_names::PROCESSOR_TIME,
            value: counters.cpu_usage as i64,
            weight: 1,
        },
    ]
}

fn average(duration_sum_ms: u64, count: u64) -> i64 {
    if count == 0 {
        0
    } else {
        (duration_sum_ms / count) as i64
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch
#[must_use]
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// Wall-clock timestamp in the service's `/Date(millis)/` form
#[must_use]
pub fn date_timestamp() -> String {
    format!("/Date({})/", epoch_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LiveMetricsConfig;

    fn identity() -> AgentIdentity {
        AgentIdentity {
            stream_id: "qpid123".to_string(),
            machine_name: "machine1".to_string(),
            instance_name: "instance1".to_string(),
            role_name: None,
            version: "1.2.3".to_string(),
        }
    }

    #[test]
    fn test_ping_envelope_nulls() {
        let json = serde_json::to_string(&MonitoringPoint::ping(&identity())).unwrap();
        assert!(json.starts_with(
            "{\"Documents\":null,\"InstrumentationKey\":null,\"Metrics\":null,\"InvariantVersion\":1,"
        ));
        assert!(json.contains("\"StreamId\":\"qpid123\""));
        assert!(json.contains("\"Timestamp\":\"/Date("));
        assert!(json.contains("\"RoleName\":null"));
    }

    #[test]
    fn test_post_envelope_carries_key_and_metrics() {
        let counters = FinalCounters {
            requests: 2,
            requests_duration_ms: 300,
            ..Default::default()
        };
        let point = MonitoringPoint::post(&identity(), "ikey123", counters, 1);
        assert_eq!(point.instrumentation_key.as_deref(), Some("ikey123"));
        assert_eq!(point.stream_id, None);
        assert_eq!(point.metrics.as_ref().map(Vec::len), Some(11));
        // No documents retained means an explicit null on the wire
        let json = serde_json::to_string(&point).unwrap();
        assert!(json.starts_with("{\"Documents\":null,\"InstrumentationKey\":\"ikey123\""));
    }

    #[test]
    fn test_metric_values_and_weights() {
        let counters = FinalCounters {
            requests: 4,
            unsuccessful_requests: 1,
            requests_duration_ms: 1_000,
            dependencies: 2,
            unsuccessful_dependencies: 2,
            dependencies_duration_ms: 99,
            exceptions: 7,
            memory_committed: 1_048_576,
            cpu_usage: 12.9,
            documents: Vec::new(),
        };
        let metrics = build_metrics(&counters, 5);

        assert_eq!(metrics[0].value, 4);
        assert_eq!(metrics[0].weight, 5);
        // Average duration weighted by count
        assert_eq!(metrics[1].value, 250);
        assert_eq!(metrics[1].weight, 4);
        assert_eq!(metrics[2].value, 1);
        assert_eq!(metrics[3].value, 3);
        assert_eq!(metrics[5].value, 49);
        assert_eq!(metrics[5].weight, 2);
        assert_eq!(metrics[7].value, 0);
        assert_eq!(metrics[8].value, 7);
        assert_eq!(metrics[9].value, 1_048_576);
        assert_eq!(metrics[10].value, 12);
        assert_eq!(metrics[10].weight, 1);
    }

    #[test]
    fn test_zero_window_weight_is_one() {
        let metrics = build_metrics(&FinalCounters::default(), 0);
        assert!(metrics.iter().all(|m| m.weight >= 0));
        assert_eq!(metrics[0].weight, 1);
    }

    #[test]
    fn test_negative_cpu_passes_through() {
        let counters = FinalCounters {
            cpu_usage: -1.0,
            ..Default::default()
        };
        let metrics = build_metrics(&counters, 1);
        assert_eq!(metrics[10].value, -1);
    }

    #[test]
    fn test_identity_from_config() {
        let identity = AgentIdentity::from_config(&LiveMetricsConfig::default());
        assert!(!identity.instance_name.is_empty());
    }
}
