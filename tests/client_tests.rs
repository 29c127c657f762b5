mod common;

use std::io::Read;
use std::sync::{Arc, Mutex};

use common::{client_for, writes_to, FakeDevice};
use memmert_atmoweb::{AtmoWebClient, Error, MessageLogMode, ParameterKey, ParameterRange};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn body(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(text)
}

#[tokio::test]
async fn set_returns_echoed_value_when_device_clamps() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/atmoweb"))
        .and(query_param("TempSet", ""))
        .respond_with(body("TempSet: 37.0, TempSet_Range: {min: 18.0, max: 99.9},"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/atmoweb"))
        .and(query_param("TempSet", "99.9"))
        .respond_with(body("TempSet: 99.0,"))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = client_for(&server);
    let actual = client.set(ParameterKey::Temperature, 99.9).await.unwrap();
    assert_eq!(actual, 99.0);
}

#[tokio::test]
async fn out_of_range_never_writes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/atmoweb"))
        .and(query_param("TempSet", ""))
        .respond_with(body("TempSet: 37.0, TempSet_Range: {min: 18.0, max: 70.0}"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/atmoweb"))
        .and(query_param("TempSet", "80"))
        .respond_with(body("TempSet: 80.0"))
        .expect(0)
        .mount(&server)
        .await;

    let mut client = client_for(&server);
    let err = client.set(ParameterKey::Temperature, 80.0).await.unwrap_err();
    match err {
        Error::OutOfRange { key, value, range } => {
            assert_eq!(key, ParameterKey::Temperature);
            assert_eq!(value, 80.0);
            assert_eq!(range, ParameterRange::new(18.0, 70.0));
        }
        other => panic!("expected OutOfRange, got {other:?}"),
    }
    assert!(writes_to(&server, "TempSet").await.is_empty());
}

#[tokio::test]
async fn range_bounds_are_inclusive() {
    let server = MockServer::start().await;
    FakeDevice::new()
        .with_range("HumSet", 10.0, 90.0)
        .mount(&server)
        .await;

    let mut client = client_for(&server);
    assert_eq!(client.set(ParameterKey::Humidity, 10.0).await.unwrap(), 10.0);
    assert_eq!(client.set(ParameterKey::Humidity, 90.0).await.unwrap(), 90.0);
    assert!(matches!(
        client.set(ParameterKey::Humidity, 90.5).await,
        Err(Error::OutOfRange { .. })
    ));
}

#[tokio::test]
async fn flat_range_from_older_firmware() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/atmoweb"))
        .and(query_param("CO2Set", ""))
        .respond_with(body("CO2Set: 5.0, CO2Set_RangeMin: 0, CO2Set_RangeMax: 20, CO2Set_Range: N/A"))
        .mount(&server)
        .await;

    let mut client = client_for(&server);
    let range = client.get_range(ParameterKey::Co2).await.unwrap();
    assert_eq!(range, Some(ParameterRange::new(0.0, 20.0)));
}

#[tokio::test]
async fn flat_range_validates_when_device_answers_only_what_is_asked() {
    let server = MockServer::start().await;
    let device = FakeDevice::new()
        .with_flat_range("TempSet", 18.0, 70.0)
        .with_value("TempSet", "37.0");
    device.mount(&server).await;

    let mut client = client_for(&server);
    assert_eq!(
        client.get_range(ParameterKey::Temperature).await.unwrap(),
        Some(ParameterRange::new(18.0, 70.0))
    );
    assert!(matches!(
        client.set(ParameterKey::Temperature, 95.0).await,
        Err(Error::OutOfRange { .. })
    ));
    assert!(writes_to(&server, "TempSet").await.is_empty());
    assert_eq!(device.value("TempSet").as_deref(), Some("37.0"));

    assert_eq!(client.set(ParameterKey::Temperature, 50.0).await.unwrap(), 50.0);
}

#[tokio::test]
async fn sentinel_echo_is_unsupported_case_insensitive() {
    for token in ["N/A", "n/d", "Unknown"] {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/atmoweb"))
            .and(query_param("O2Set", ""))
            .respond_with(body("O2Set: N/A, O2Set_Range: N/A"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/atmoweb"))
            .and(query_param("O2Set", "5"))
            .respond_with(body(&format!("O2Set: {token},")))
            .mount(&server)
            .await;

        let mut client = client_for(&server);
        let err = client.set(ParameterKey::O2, 5.0).await.unwrap_err();
        assert!(
            matches!(err, Error::UnsupportedParameter(ParameterKey::O2)),
            "token {token}: expected UnsupportedParameter, got {err:?}"
        );
    }
}

#[tokio::test]
async fn quoted_sentinel_echo_is_unsupported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/atmoweb"))
        .and(query_param("FanSet", "40"))
        .respond_with(body(r#"{"FanSet": " unknown "}"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/atmoweb"))
        .and(query_param("FanSet", ""))
        .respond_with(body("FanSet: 20"))
        .mount(&server)
        .await;

    let mut client = client_for(&server);
    let err = client.set(ParameterKey::Fan, 40.0).await.unwrap_err();
    assert!(matches!(err, Error::UnsupportedParameter(ParameterKey::Fan)));
}

#[tokio::test]
async fn missing_range_skips_validation() {
    let server = MockServer::start().await;
    FakeDevice::new().with_value("FanSet", "50").mount(&server).await;

    let mut client = client_for(&server);
    assert_eq!(client.get_range(ParameterKey::Fan).await.unwrap(), None);
    assert_eq!(client.set(ParameterKey::Fan, 120.0).await.unwrap(), 120.0);

    let requests = server.received_requests().await.unwrap();
    // get_range, then set's range check and write
    assert_eq!(requests.len(), 3);
}

#[tokio::test]
async fn set_makes_two_round_trips() {
    let server = MockServer::start().await;
    FakeDevice::new()
        .with_range("TempSet", 0.0, 80.0)
        .mount(&server)
        .await;

    let mut client = client_for(&server);
    client.set(ParameterKey::Temperature, 37.5).await.unwrap();
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
    assert_eq!(writes_to(&server, "TempSet").await, vec!["37.5".to_string()]);
}

#[tokio::test]
async fn string_echo_is_parsed_as_number() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/atmoweb"))
        .and(query_param("HumSet", ""))
        .respond_with(body("HumSet: 40"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/atmoweb"))
        .and(query_param("HumSet", "45"))
        .respond_with(body("{\u{201E}HumSet\u{201C}: \u{201C}45.0\u{201D}}"))
        .mount(&server)
        .await;

    let mut client = client_for(&server);
    assert_eq!(client.set(ParameterKey::Humidity, 45.0).await.unwrap(), 45.0);
}

#[tokio::test]
async fn non_numeric_echo_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/atmoweb"))
        .and(query_param("TempSet", ""))
        .respond_with(body("TempSet: 37"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/atmoweb"))
        .and(query_param("TempSet", "30"))
        .respond_with(body("Error: busy"))
        .mount(&server)
        .await;

    let mut client = client_for(&server);
    let err = client.set(ParameterKey::Temperature, 30.0).await.unwrap_err();
    assert!(matches!(err, Error::MalformedResponse(_)), "got {err:?}");
}

#[tokio::test]
async fn unrepairable_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/atmoweb"))
        .respond_with(body("TempSet: [37, "))
        .mount(&server)
        .await;

    let mut client = client_for(&server);
    let err = client.set(ParameterKey::Temperature, 30.0).await.unwrap_err();
    assert!(matches!(err, Error::MalformedResponse(_)), "got {err:?}");
    assert!(!err.is_network());
}

#[tokio::test]
async fn http_error_status_is_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/atmoweb"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let mut client = client_for(&server);
    let err = client.set(ParameterKey::Temperature, 30.0).await.unwrap_err();
    assert!(err.is_network(), "expected network error, got {err:?}");
    assert!(writes_to(&server, "TempSet").await.is_empty());
}

#[tokio::test]
async fn slow_device_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/atmoweb"))
        .respond_with(body("TempSet: 37").set_delay(std::time::Duration::from_millis(500)))
        .mount(&server)
        .await;

    let addr = server.address();
    let mut client = AtmoWebClient::builder(addr.ip().to_string())
        .port(addr.port())
        .timeout(std::time::Duration::from_millis(50))
        .build()
        .unwrap();
    let err = client.get_range(ParameterKey::Temperature).await.unwrap_err();
    assert!(matches!(err, Error::Http(ref e) if e.is_timeout()), "got {err:?}");
}

#[tokio::test]
async fn connection_refused_is_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut client = AtmoWebClient::builder("127.0.0.1").port(port).build().unwrap();
    let err = client.set(ParameterKey::Fan, 10.0).await.unwrap_err();
    assert!(err.is_network());
    assert_eq!(client.get(ParameterKey::Fan).await, None);
}

#[tokio::test]
async fn get_is_best_effort() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/atmoweb"))
        .and(query_param("TempSet", ""))
        .respond_with(body("TempSet: 37.5,"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/atmoweb"))
        .and(query_param("O2Set", ""))
        .respond_with(body("O2Set: N/A"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/atmoweb"))
        .and(query_param("HumSet", ""))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut client = client_for(&server);
    assert_eq!(client.get(ParameterKey::Temperature).await, Some(37.5));
    assert_eq!(client.get(ParameterKey::O2).await, None);
    assert_eq!(client.get(ParameterKey::Humidity).await, None);
}

#[tokio::test]
async fn status_snapshot_reaches_callbacks() {
    let server = MockServer::start().await;
    FakeDevice::new()
        .with_value("CurOp", "Manual")
        .with_value("Temp1Read", "36.8")
        .with_value("HumRead", "44.0")
        .with_value("TempSet", "37.0")
        .with_value("HumSet", "45")
        .unsupported("O2Set")
        .unsupported("O2Read")
        .mount(&server)
        .await;

    let snapshots = Arc::new(Mutex::new(vec![]));
    let snapshots_clone = snapshots.clone();
    let addr = server.address();
    let mut client = AtmoWebClient::builder(addr.ip().to_string())
        .port(addr.port())
        .on_snapshot(move |status| {
            snapshots_clone.lock().unwrap().push(status.clone());
        })
        .build()
        .unwrap();

    let status = client.status().await;
    assert_eq!(status.mode.as_deref(), Some("Manual"));
    assert_eq!(status.readings[&ParameterKey::Temperature], Some(36.8));
    assert_eq!(status.readings[&ParameterKey::O2], None);
    assert_eq!(status.setpoints[&ParameterKey::Humidity], Some(45.0));
    assert_eq!(status.setpoints[&ParameterKey::Fan], None);
    assert_eq!(status.setpoints.len(), 5);

    let captured = snapshots.lock().unwrap();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0], status);
}

#[tokio::test]
async fn message_log_records_queries() {
    let server = MockServer::start().await;
    FakeDevice::new()
        .with_range("TempSet", 0.0, 80.0)
        .mount(&server)
        .await;

    let tmp = tempfile::NamedTempFile::new().unwrap();
    let addr = server.address();
    let mut client = AtmoWebClient::builder(addr.ip().to_string())
        .port(addr.port())
        .message_log(MessageLogMode::Full, tmp.path())
        .build()
        .unwrap();
    client.set(ParameterKey::Temperature, 25.0).await.unwrap();

    let mut contents = String::new();
    std::fs::File::open(tmp.path())
        .unwrap()
        .read_to_string(&mut contents)
        .unwrap();
    let lines: Vec<serde_json::Value> = contents
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["params"]["TempSet_Range"], "");
    assert_eq!(lines[1]["params"]["TempSet"], "25");
    assert!(lines[1]["body"].as_str().unwrap().contains("TempSet: 25"));
}
