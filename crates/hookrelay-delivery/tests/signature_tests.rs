//! Wire-format tests: headers, body, and signature of outgoing deliveries.

mod common;

use common::*;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer};

use hookrelay_delivery::{crypto, Deliverer};

/// The posted body is the payload bytes verbatim and the signature is the
/// hex HMAC-SHA256 of exactly those bytes.
#[tokio::test]
async fn test_signature_matches_payload_bytes() {
    let mock_server = MockServer::start().await;
    let capture = CaptureResponder::new();

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(capture.clone())
        .mount(&mock_server)
        .await;

    let records = InMemoryRecordStore::new();
    let jobs = InMemoryJobStore::new();
    let (notifier, _rx) = notifier_with_rx();
    let deliverer = Deliverer::new(records, jobs, notifier, &test_config()).unwrap();

    let job = job(&format!("{}/hook", mock_server.uri()), SECRET_1, 5);
    let payload = job.payload.clone();
    deliverer.deliver(job).await;

    assert_eq!(capture.request_count(), 1);
    let request = &capture.requests()[0];

    assert_eq!(request.body, payload.as_bytes());

    let signature = request.header("x-webhook-signature").unwrap();
    assert_eq!(signature, crypto::compute_signature(SECRET_1, &request.body));
    assert!(crypto::verify_signature(signature, SECRET_1, &request.body));
}

/// All delivery headers are present with the expected values.
#[tokio::test]
async fn test_delivery_headers() {
    let mock_server = MockServer::start().await;
    let capture = CaptureResponder::new();

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(capture.clone())
        .mount(&mock_server)
        .await;

    let records = InMemoryRecordStore::new();
    let jobs = InMemoryJobStore::new();
    let (notifier, _rx) = notifier_with_rx();
    let deliverer = Deliverer::new(records, jobs, notifier, &test_config()).unwrap();

    let job = job(&format!("{}/hook", mock_server.uri()), SECRET_1, 5);
    let event_id = job.event_id;
    deliverer.deliver(job).await;

    let request = &capture.requests()[0];
    assert!(request
        .header("content-type")
        .unwrap()
        .contains("application/json"));
    assert_eq!(request.header("x-webhook-event").unwrap(), "order.created");
    assert_eq!(
        request.header("x-webhook-id").unwrap(),
        event_id.to_string()
    );
    assert_eq!(request.header("x-webhook-attempt").unwrap(), "1");
}

/// Different secrets sign the same payload differently.
#[tokio::test]
async fn test_signature_depends_on_secret() {
    let mock_server = MockServer::start().await;
    let capture = CaptureResponder::new();

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(capture.clone())
        .mount(&mock_server)
        .await;

    let records = InMemoryRecordStore::new();
    let jobs = InMemoryJobStore::new();
    let (notifier, _rx) = notifier_with_rx();
    let deliverer = Deliverer::new(records, jobs, notifier, &test_config()).unwrap();

    let url = format!("{}/hook", mock_server.uri());
    deliverer.deliver(job(&url, SECRET_1, 5)).await;
    deliverer.deliver(job(&url, SECRET_2, 5)).await;

    let requests = capture.requests();
    assert_eq!(requests.len(), 2);
    // Same payload, different secret, different signature.
    assert_eq!(requests[0].body, requests[1].body);
    assert_ne!(
        requests[0].header("x-webhook-signature").unwrap(),
        requests[1].header("x-webhook-signature").unwrap()
    );
}

/// The attempt header reflects the job's attempt number on retries.
#[tokio::test]
async fn test_attempt_header_follows_job_attempt() {
    let mock_server = MockServer::start().await;
    let capture = CaptureResponder::new();

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(capture.clone())
        .mount(&mock_server)
        .await;

    let records = InMemoryRecordStore::new();
    let jobs = InMemoryJobStore::new();
    let (notifier, _rx) = notifier_with_rx();
    let deliverer = Deliverer::new(records, jobs, notifier, &test_config()).unwrap();

    let mut job = job(&format!("{}/hook", mock_server.uri()), SECRET_1, 5);
    job.attempt = 3;
    deliverer.deliver(job).await;

    let request = &capture.requests()[0];
    assert_eq!(request.header("x-webhook-attempt").unwrap(), "3");
}
