//! Tests for the ping sender
//!
//! The verdict comes from response headers only; these tests also cover the
//! envelope shape, etag echo, and the sticky endpoint redirect.


use live_metrics::{
    AgentIdentity, Endpoints, HttpResponse, PingSender, TransportError,
};
use std::sync::Arc;
use std::time::Duration;
use test_helpers::{status_response, subscribed_response, MockTransport, TEST_IKEY};

fn identity() -> Arc<AgentIdentity> {
    Arc::new(AgentIdentity {
        stream_id: "qpid123".to_string(),
        machine_name: "machine1".to_string(),
        instance_name: "instance1".to_string(),
        role_name: None,
        version: "(unknown)".to_string(),
    })
}

fn ping_sender(transport: Arc<MockTransport>) -> PingSender {
    let endpoints = Arc::new(Endpoints::new(Arc::new(|| {
        "https://live.example.com".to_string()
    })));
    PingSender::new(
        transport,
        endpoints,
        Arc::new(|| Some(TEST_IKEY.to_string())),
        identity(),
    )
}

#[tokio::test]
async fn test_subscribed_header_turns_on() {
    let transport = MockTransport::new(|_| Ok(subscribed_response(true)));
    let mut sender = ping_sender(transport.clone());

    let result = sender.ping().await;
    assert!(result.subscribed);

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].url,
        "https://live.example.com/QuickPulseService.svc/ping?ikey=ikey123"
    );
}

#[tokio::test]
async fn test_unsubscribed_header_stays_off() {
    let transport = MockTransport::new(|_| Ok(subscribed_response(false)));
    let mut sender = ping_sender(transport);
    assert!(!sender.ping().await.subscribed);
}

#[tokio::test]
async fn test_ping_body_shape() {
    let transport = MockTransport::new(|_| Ok(subscribed_response(true)));
    let mut sender = ping_sender(transport.clone());
    sender.ping().await;

    let body = &transport.requests()[0].body;
    assert!(body.starts_with(
        "{\"Documents\":null,\"InstrumentationKey\":null,\"Metrics\":null,\"InvariantVersion\":1,"
    ));
    assert!(body.contains("\"Timestamp\":\"/Date("));
    assert!(body.contains("\"Version\":\"(unknown)\""));
    assert!(body.contains("\"StreamId\":\"qpid123\""));
    assert!(body.contains("\"MachineName\":\"machine1\""));
    assert!(body.contains("\"Instance\":\"instance1\""));
    assert!(body.contains("\"RoleName\":null"));
}

#[tokio::test]
async fn test_ping_request_headers() {
    let transport = MockTransport::new(|_| Ok(subscribed_response(true)));
    let mut sender = ping_sender(transport.clone());
    sender.ping().await;

    let headers = &transport.requests()[0].headers;
    let lookup = |name: &str| {
        headers
            .iter()
            .find(|(header, _)| *header == name)
            .map(|(_, value)| value.clone())
    };
    assert_eq!(lookup("x-ms-qps-stream-id"), Some("qpid123".to_string()));
    assert_eq!(
        lookup("x-ms-qps-machine-name"),
        Some("machine1".to_string())
    );
    assert_eq!(
        lookup("x-ms-qps-instance-name"),
        Some("instance1".to_string())
    );
    assert_eq!(lookup("x-ms-qps-invariant-version"), Some("1".to_string()));
    // Transmission time is wall millis scaled to 100ns ticks
    let ticks: u64 = lookup("x-ms-qps-transmission-time")
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(ticks % 10_000, 0);
    // No etag before the service hands one out
    assert_eq!(lookup("x-ms-qps-configuration-etag"), None);
}

#[tokio::test]
async fn test_etag_echoed_on_next_ping() {
    let transport = MockTransport::new(|_| {
        Ok(HttpResponse::new(
            200,
            vec![
                ("x-ms-qps-subscribed".to_string(), "true".to_string()),
                ("x-ms-qps-configuration-etag".to_string(), "etag-1".to_string()),
            ],
        ))
    });
    let mut sender = ping_sender(transport.clone());

    let result = sender.ping().await;
    assert_eq!(result.config_etag.as_deref(), Some("etag-1"));

    sender.ping().await;
    let second = &transport.requests()[1];
    assert!(second
        .headers
        .iter()
        .any(|(name, value)| *name == "x-ms-qps-configuration-etag" && value == "etag-1"));
}

#[tokio::test]
async fn test_redirect_is_sticky() {
    let transport = MockTransport::new(|request| {
        if request.url.starts_with("https://live.example.com") {
            Ok(HttpResponse::new(
                200,
                vec![
                    ("x-ms-qps-subscribed".to_string(), "false".to_string()),
                    (
                        "x-ms-qps-service-endpoint-redirect-v2".to_string(),
                        "https://eastus.live.example.com".to_string(),
                    ),
                ],
            ))
        } else {
            Ok(subscribed_response(true))
        }
    });
    let mut sender = ping_sender(transport.clone());

    let first = sender.ping().await;
    assert_eq!(
        first.redirected_to.as_deref(),
        Some("https://eastus.live.example.com")
    );

    let second = sender.ping().await;
    assert!(second.subscribed);
    assert!(transport.requests()[1]
        .url
        .starts_with("https://eastus.live.example.com/QuickPulseService.svc/ping"));
}

#[tokio::test]
async fn test_transport_error_means_unsubscribed() {
    let transport =
        MockTransport::new(|_| Err(TransportError::Failed("connection refused".to_string())));
    let mut sender = ping_sender(transport);
    let result = sender.ping().await;
    assert!(!result.subscribed);
    assert_eq!(result.next_delay, None);
}

#[tokio::test]
async fn test_server_error_means_unsubscribed() {
    let transport = MockTransport::new(|_| Ok(status_response(500)));
    let mut sender = ping_sender(transport);
    assert!(!sender.ping().await.subscribed);
}

#[tokio::test]
async fn test_polling_hint_propagates() {
    let transport = MockTransport::new(|_| {
        Ok(HttpResponse::new(
            200,
            vec![
                ("x-ms-qps-subscribed".to_string(), "false".to_string()),
                (
                    "x-ms-qps-service-polling-interval-hint".to_string(),
                    "30000".to_string(),
                ),
            ],
        ))
    });
    let mut sender = ping_sender(transport);
    let result = sender.ping().await;
    assert_eq!(result.next_delay, Some(Duration::from_secs(30)));
}

#[tokio::test]
async fn test_missing_key_skips_network() {
    let transport = MockTransport::new(|_| Ok(subscribed_response(true)));
    let endpoints = Arc::new(Endpoints::new(Arc::new(|| {
        "https://live.example.com".to_string()
    })));
    let mut sender = PingSender::new(transport.clone(), endpoints, Arc::new(|| None), identity());

    assert!(!sender.ping().await.subscribed);
    assert!(transport.requests().is_empty());
}
