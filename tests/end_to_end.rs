//! Generator-to-receiver runs over the in-process loopback.
//!
//! Every test runs on tokio's paused clock, so multi-second runs finish
//! instantly while keeping the pacing schedule intact.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use burstgen::capture::parse_ipv4;
use burstgen::transport::loopback;
use burstgen::{
    Burstgen, CaptureSource, Emitter, FieldValue, HttpHeader, ProtocolCodec, ProtocolKind,
    ProtocolSchema, ReceiverClassifier, ReceiverConfig, SchemaRecord, TrafficError, TrafficSpec,
};
use chrono::{TimeZone, Utc};
use tokio_util::sync::CancellationToken;

const PING_SCHEMA: &str = r#"{"nome":"Ping","campos":[{"tipo":"IntField","nome":"seq","default":1},{"tipo":"IntField","nome":"timestamp","default":0}]}"#;

fn spec(protocol: ProtocolKind, duration_secs: u32, mean_rate: f64) -> TrafficSpec {
    let mut spec = TrafficSpec::new(duration_secs, mean_rate, protocol, "127.0.0.1");
    spec.source = Some(Ipv4Addr::LOCALHOST);
    spec
}

/// Write `contents` to a per-test file under the system temp directory.
fn schema_file(name: &str, contents: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("burstgen-e2e-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

#[tokio::test(start_paused = true)]
async fn udp_run_sends_three_plausible_seconds_and_measures_each() {
    let _ = tracing_subscriber::fmt::try_init();

    let (report, stats) = Burstgen::loopback(spec(ProtocolKind::Udp, 3, 5.0)).await.unwrap();

    let per_second = report.sent_per_second();
    assert_eq!(per_second.len(), 3);
    assert!(per_second.iter().all(|n| (3..=7).contains(n)), "{per_second:?}");
    assert_eq!(report.truncated(), 0);
    assert_eq!(stats.count, report.sent());
    assert_eq!(stats.invalid, 0);
    assert!(stats.mean().unwrap() < 1.0);
}

#[tokio::test(start_paused = true)]
async fn seeded_loopback_runs_repeat_their_arrival_plan() {
    let planned = |report: &burstgen::RunReport| -> Vec<u32> {
        report.seconds.iter().map(|s| s.planned).collect()
    };

    let (first, _) =
        Burstgen::loopback_with_seed(spec(ProtocolKind::Udp, 4, 20.0), 42, CancellationToken::new())
            .await
            .unwrap();
    let (second, stats) =
        Burstgen::loopback_with_seed(spec(ProtocolKind::Udp, 4, 20.0), 42, CancellationToken::new())
            .await
            .unwrap();

    assert_eq!(planned(&first), planned(&second));
    assert_eq!(stats.count, second.sent());
}

#[test]
fn http_request_with_only_a_host_header_is_well_formed() {
    let mut spec = spec(ProtocolKind::Http, 1, 1.0);
    spec.extras.http_headers.push(HttpHeader::new("Host", "x"));
    spec.validate().unwrap();

    let mut codec = ProtocolCodec::new(&spec, Ipv4Addr::LOCALHOST, None).unwrap();
    let at = Utc.timestamp_opt(1_700_000_000, 250_000_000).unwrap();
    let burstgen::OutboundMessage::Packet { bytes, .. } = codec.build(at).unwrap() else {
        panic!("HTTP builds an IPv4 packet");
    };

    let datagram = parse_ipv4(&bytes).unwrap();
    assert_eq!(datagram.destination_port(), Some(12345));
    assert_eq!(
        std::str::from_utf8(datagram.payload()).unwrap(),
        "GET / HTTP/1.1\r\nHost: x\r\n\r\n1700000000.250000"
    );
}

#[tokio::test(start_paused = true)]
async fn http_run_is_measured_from_the_last_line() {
    let mut spec = spec(ProtocolKind::Http, 2, 4.0);
    spec.extras.http_headers.push(HttpHeader::new("User-Agent", "burstgen"));

    let (report, stats) = Burstgen::loopback(spec).await.unwrap();
    assert!(report.sent() > 0);
    assert_eq!(stats.count, report.sent());
}

#[test]
fn custom_record_carries_integer_send_time_and_decodes_identically() {
    let path = schema_file("ping-codec.json", PING_SCHEMA);
    let mut spec = spec(ProtocolKind::Custom, 1, 1.0);
    spec.extras.schema_path = Some(path.clone());

    let generator_schema = Arc::new(ProtocolSchema::from_file(&path).unwrap());
    let receiver_schema = Arc::new(ProtocolSchema::from_file(&path).unwrap());
    assert_eq!(generator_schema, receiver_schema);

    let mut codec = ProtocolCodec::new(&spec, Ipv4Addr::LOCALHOST, Some(generator_schema)).unwrap();
    let at = Utc.timestamp_opt(1_700_000_123, 900_000_000).unwrap();
    let burstgen::OutboundMessage::Packet { bytes, .. } = codec.build(at).unwrap() else {
        panic!("Custom builds an IPv4 packet");
    };

    let datagram = parse_ipv4(&bytes).unwrap();
    assert_eq!(datagram.protocol, spec.extras.custom_ip_protocol);

    let record = SchemaRecord::decode(receiver_schema, datagram.payload()).unwrap();
    assert_eq!(record.get("seq"), Some(&FieldValue::Int(1)));
    assert_eq!(record.get("timestamp"), Some(&FieldValue::Int(1_700_000_123)));
}

#[tokio::test(start_paused = true)]
async fn custom_run_round_trips_through_the_receiver() {
    let mut spec = spec(ProtocolKind::Custom, 2, 3.0);
    spec.extras.schema_path = Some(schema_file("ping-run.json", PING_SCHEMA));

    let (report, stats) = Burstgen::loopback(spec).await.unwrap();
    assert_eq!(stats.count, report.sent());
    assert_eq!(stats.invalid, 0);
    // Only whole seconds travel, so delays stay under one second.
    assert!(stats.max.unwrap() < 1.0 + 1e-3);
}

#[tokio::test(start_paused = true)]
async fn mqtt_publishes_are_measured_from_the_body() {
    let mut spec = spec(ProtocolKind::Mqtt, 2, 2.0);
    spec.extras.mqtt_topic = Some("burst/load".into());

    let (report, stats) = Burstgen::loopback(spec).await.unwrap();
    assert_eq!(stats.count, report.sent());
}

#[tokio::test]
async fn unsupported_field_type_fails_before_anything_is_sent() {
    let path = schema_file(
        "bogus.json",
        r#"{"nome":"Broken","campos":[{"tipo":"Bogus","nome":"x","default":0}]}"#,
    );

    let mut spec = spec(ProtocolKind::Custom, 1, 5.0);
    spec.extras.schema_path = Some(path.clone());
    let (transmitter, mut capture) = loopback(8);

    let err = Emitter::with_transmitter(spec, transmitter).err().unwrap();
    assert!(matches!(err, TrafficError::UnsupportedFieldType { ref type_name, .. } if type_name == "Bogus"));
    assert!(err.is_fatal());
    assert_eq!(capture.next_unit().await.unwrap(), None);

    let mut config = ReceiverConfig::new(ProtocolKind::Custom);
    config.schema_path = Some(path);
    assert!(matches!(
        ReceiverClassifier::load(&config),
        Err(TrafficError::UnsupportedFieldType { .. })
    ));
}

#[tokio::test]
async fn timestamp_field_too_narrow_for_a_send_time_fails_before_anything_is_sent() {
    let path = schema_file(
        "narrow.json",
        r#"{"nome":"Narrow","campos":[{"tipo":"ByteField","nome":"timestamp"}]}"#,
    );

    let mut spec = spec(ProtocolKind::Custom, 1, 5.0);
    spec.extras.schema_path = Some(path);
    let (transmitter, mut capture) = loopback(8);

    let err = Emitter::with_transmitter(spec, transmitter).err().unwrap();
    assert!(matches!(err, TrafficError::Schema { .. }), "{err:?}");
    assert_eq!(capture.next_unit().await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn cancelled_loopback_run_reports_partial_progress() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        trigger.cancel();
    });

    let (report, stats) =
        Burstgen::loopback_with_cancel(spec(ProtocolKind::Udp, 60, 5.0), cancel).await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.seconds.len(), 2);
    assert_eq!(stats.count, report.sent());
}
