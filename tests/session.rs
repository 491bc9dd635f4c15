//! End-to-end session tests against the mock transport: binding, profile
//! application, timeout recovery and the published message schema.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use camconnect::bus::BusPublisher;
use camconnect::capabilities::Camera;
use camconnect::config::AcquisitionProfile;
use camconnect::dummy::DummyCamera;
use camconnect::error::{CamError, CamResult};
use camconnect::genicam::{CameraSession, GenICamCamera, SessionState};
use camconnect::storage::ImageStorage;
use camconnect::transport::mock::{
    FeatureValue, MockDeviceSpec, MockFrame, MockTransport, MockTransportState,
};
use camconnect::transport::feature;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const PRODUCER: &str = "p.cti";
const IDENTIFIER: &str = "AA:BB:CC";
const TOPIC: &str = "ia/rawImage/test/AA:BB:CC";

/// Publisher double that records every publish.
#[derive(Default)]
struct RecordingBus {
    messages: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingBus {
    fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl BusPublisher for RecordingBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> CamResult<()> {
        self.messages
            .lock()
            .unwrap()
            .push((topic.to_string(), payload));
        Ok(())
    }

    async fn disconnect(&self) -> CamResult<()> {
        Ok(())
    }
}

fn device() -> MockDeviceSpec {
    MockDeviceSpec::new("DEV_AABBCC_01")
}

fn transport_with(spec: MockDeviceSpec) -> MockTransport {
    MockTransport::new().with_producer(PRODUCER).with_device(spec)
}

fn session_over(
    transport: MockTransport,
    profile: AcquisitionProfile,
) -> (CameraSession, Arc<Mutex<MockTransportState>>) {
    let shared = transport.shared();
    let session = CameraSession::new(
        IDENTIFIER,
        profile,
        vec![PathBuf::from(PRODUCER)],
        Box::new(transport),
    )
    .with_fetch_timeout(Duration::from_millis(10));
    (session, shared)
}

#[tokio::test]
async fn missing_producers_are_fatal() {
    let transport = MockTransport::new().with_device(device());
    let (mut session, _) = session_over(transport, AcquisitionProfile::default());
    assert!(matches!(
        session.connect().await.unwrap_err(),
        CamError::NoProducers
    ));
}

#[tokio::test]
async fn empty_device_list_is_fatal() {
    let transport = MockTransport::new().with_producer(PRODUCER);
    let (mut session, _) = session_over(transport, AcquisitionProfile::default());
    assert!(matches!(
        session.connect().await.unwrap_err(),
        CamError::NoDevices
    ));
}

#[tokio::test]
async fn unmatched_identifier_creates_no_handle() {
    let transport = transport_with(MockDeviceSpec::new("DEV_FFEEDD_01"));
    let (mut session, shared) = session_over(transport, AcquisitionProfile::default());
    assert!(matches!(
        session.connect().await.unwrap_err(),
        CamError::IdentifierMismatch { .. }
    ));
    assert!(shared.lock().unwrap().journal.opened.is_empty());
}

#[tokio::test]
async fn duplicate_enumeration_binds_exactly_one_handle() {
    let transport = transport_with(device().enumerations(3));
    let (mut session, shared) = session_over(transport, AcquisitionProfile::default());
    session.connect().await.unwrap();
    let state = shared.lock().unwrap();
    assert_eq!(state.journal.opened, vec!["DEV_AABBCC_01".to_string()]);
}

#[tokio::test]
async fn held_device_is_a_fatal_open_error() {
    let transport = transport_with(device().open_error("held by another process"));
    let (mut session, _) = session_over(transport, AcquisitionProfile::default());
    let err = session.connect().await.unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, CamError::DeviceOpen { .. }));
}

#[tokio::test]
async fn stored_user_set_suppresses_every_other_field() {
    let profile = AcquisitionProfile {
        user_set_selector: "UserSet1".into(),
        image_width: Some(640),
        image_height: Some(480),
        pixel_format: Some(camconnect::frame::PixelFormat::Mono8),
        exposure_time: Some(15000.0),
        exposure_auto: Some(camconnect::config::AutoMode::Once),
        gain_auto: Some(camconnect::config::AutoMode::Once),
        balance_white_auto: Some(camconnect::config::AutoMode::Once),
        ..AcquisitionProfile::default()
    };
    let transport = transport_with(device());
    let (mut session, shared) = session_over(transport, profile);
    session.connect().await.unwrap();

    let state = shared.lock().unwrap();
    assert_eq!(
        state.journal.last_write(feature::USER_SET_SELECTOR),
        Some(&FeatureValue::Enum("UserSet1".into()))
    );
    assert_eq!(state.journal.executes, vec![feature::USER_SET_LOAD]);
    for node in [
        feature::WIDTH,
        feature::HEIGHT,
        feature::PIXEL_FORMAT,
        feature::EXPOSURE_TIME,
        feature::EXPOSURE_AUTO,
        feature::GAIN_AUTO,
        feature::BALANCE_WHITE_AUTO,
        feature::OFFSET_X,
        feature::OFFSET_Y,
    ] {
        assert!(!state.journal.wrote(node), "unexpected write to {node}");
    }
}

#[tokio::test]
async fn oversized_geometry_clamps_to_sensor_maximum() {
    let profile = AcquisitionProfile {
        image_width: Some(4000),
        image_height: Some(600),
        ..AcquisitionProfile::default()
    };
    let transport = transport_with(device().sensor(1920, 1080));
    let (mut session, shared) = session_over(transport, profile);
    session.connect().await.unwrap();

    let state = shared.lock().unwrap();
    assert_eq!(
        state.journal.last_write(feature::WIDTH),
        Some(&FeatureValue::Int(1920))
    );
    assert_eq!(
        state.journal.last_write(feature::HEIGHT),
        Some(&FeatureValue::Int(600))
    );
}

#[tokio::test]
async fn default_profile_centers_the_readout_region() {
    let profile = AcquisitionProfile {
        image_width: Some(800),
        image_height: Some(600),
        ..AcquisitionProfile::default()
    };
    let transport = transport_with(device().sensor(1920, 1080));
    let (mut session, shared) = session_over(transport, profile);
    session.connect().await.unwrap();

    let state = shared.lock().unwrap();
    assert_eq!(
        state.journal.last_write(feature::OFFSET_X),
        Some(&FeatureValue::Int((1920 - 800) / 2))
    );
    assert_eq!(
        state.journal.last_write(feature::OFFSET_Y),
        Some(&FeatureValue::Int((1080 - 600) / 2))
    );
}

#[tokio::test]
async fn unsupported_auto_modes_degrade_to_warnings() {
    let profile = AcquisitionProfile {
        gain_auto: Some(camconnect::config::AutoMode::Continuous),
        balance_white_auto: Some(camconnect::config::AutoMode::Once),
        ..AcquisitionProfile::default()
    };
    // Only GainAuto is advertised; BalanceWhiteAuto must not be written.
    let transport = transport_with(device().advertise(feature::GAIN_AUTO));
    let (mut session, shared) = session_over(transport, profile);
    session.connect().await.unwrap();

    let state = shared.lock().unwrap();
    assert_eq!(
        state.journal.last_write(feature::GAIN_AUTO),
        Some(&FeatureValue::Enum("Continuous".into()))
    );
    assert!(!state.journal.wrote(feature::BALANCE_WHITE_AUTO));
}

#[tokio::test]
async fn out_of_range_exposure_is_fatal() {
    let profile = AcquisitionProfile {
        exposure_time: Some(1_000_000.0),
        exposure_auto: Some(camconnect::config::AutoMode::Off),
        ..AcquisitionProfile::default()
    };
    let transport = transport_with(device().exposure_range(10.0, 100_000.0));
    let (mut session, _) = session_over(transport, profile);
    let err = session.connect().await.unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, CamError::FeatureOutOfRange { .. }));
}

#[tokio::test]
async fn buffer_count_is_fixed_at_three() {
    let transport = transport_with(device());
    let (mut session, shared) = session_over(transport, AcquisitionProfile::default());
    session.connect().await.unwrap();
    let state = shared.lock().unwrap();
    assert_eq!(
        state.journal.last_write("NumBuffers"),
        Some(&FeatureValue::Int(3))
    );
    assert_eq!(
        state.journal.last_write(feature::CHUNK_MODE_ACTIVE),
        Some(&FeatureValue::Bool(false))
    );
}

#[tokio::test]
async fn fetch_timeout_runs_full_recovery_and_yields_no_frame() {
    let transport = transport_with(device().push_frame(MockFrame::Timeout));
    let (mut session, shared) = session_over(transport, AcquisitionProfile::default());
    session.connect().await.unwrap();

    let outcome = session.capture_frame().await.unwrap();
    assert!(outcome.is_none());
    assert_eq!(session.state(), SessionState::Acquiring);

    let state = shared.lock().unwrap();
    // Old handle closed, producer stack reset, fresh handle bound.
    assert_eq!(state.journal.closes, 1);
    assert_eq!(state.journal.resets, 1);
    assert_eq!(state.journal.opened.len(), 2);
    assert_eq!(state.journal.starts, 2);
}

#[tokio::test]
async fn unsupported_frame_format_is_fatal() {
    let spec = device()
        .push_frame(MockFrame::image("Mono8", 4, 4))
        .push_frame(MockFrame::raw("BayerRG8", 4, 4, vec![0; 16]));
    let (mut session, _) = session_over(transport_with(spec), AcquisitionProfile::default());
    session.connect().await.unwrap();

    let err = session.capture_frame().await.unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, CamError::UnsupportedPixelFormat(_)));
}

#[tokio::test]
async fn capture_publishes_one_well_formed_envelope() {
    let spec = device()
        .push_frame(MockFrame::image("BGR8", 640, 480))
        .push_frame(MockFrame::image("BGR8", 640, 480));
    let transport = transport_with(spec);
    let shared = transport.shared();
    let session = CameraSession::new(
        IDENTIFIER,
        AcquisitionProfile::default(),
        vec![PathBuf::from(PRODUCER)],
        Box::new(transport),
    )
    .with_fetch_timeout(Duration::from_millis(10));

    let bus = Arc::new(RecordingBus::default());
    let mut camera = GenICamCamera::connect(session, bus.clone(), TOPIC.into(), None)
        .await
        .unwrap();

    let envelope = camera.capture().await.unwrap().unwrap();

    let published = bus.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, TOPIC);

    let message: serde_json::Value = serde_json::from_slice(&published[0].1).unwrap();
    assert_eq!(message["image"]["image_width"], 640);
    assert_eq!(message["image"]["image_height"], 480);
    assert_eq!(message["image"]["image_channels"], 3);
    let timestamp = message["timestamp_ms"].as_i64().unwrap();
    assert_eq!(
        message["image"]["image_id"].as_str().unwrap(),
        format!("{IDENTIFIER}_{timestamp}")
    );
    assert_eq!(envelope.timestamp_ms, timestamp);

    // The payload decodes back to a JPEG of the captured geometry.
    let jpeg = STANDARD
        .decode(message["image"]["image_bytes"].as_str().unwrap())
        .unwrap();
    let decoded = image::load_from_memory(&jpeg).unwrap();
    assert_eq!(decoded.width(), 640);
    assert_eq!(decoded.height(), 480);

    // Both fetched buffers (discarded and used) went back to the producer.
    let state = shared.lock().unwrap();
    assert_eq!(state.journal.requeues, 2);
}

#[tokio::test]
async fn timeout_during_capture_publishes_nothing() {
    let spec = device()
        .push_frame(MockFrame::image("Mono8", 8, 8))
        .push_frame(MockFrame::Timeout);
    let transport = transport_with(spec);
    let session = CameraSession::new(
        IDENTIFIER,
        AcquisitionProfile::default(),
        vec![PathBuf::from(PRODUCER)],
        Box::new(transport),
    )
    .with_fetch_timeout(Duration::from_millis(10));

    let bus = Arc::new(RecordingBus::default());
    let mut camera = GenICamCamera::connect(session, bus.clone(), TOPIC.into(), None)
        .await
        .unwrap();

    let outcome = camera.capture().await.unwrap();
    assert!(outcome.is_none());
    assert!(bus.published().is_empty());
}

#[tokio::test]
async fn dummy_camera_publishes_and_stores_the_static_image() {
    let dir = tempfile::tempdir().unwrap();
    let asset = dir.path().join("dummy_image.jpg");
    let pattern = image::RgbImage::from_fn(5, 3, |x, y| image::Rgb([x as u8, y as u8, 7]));
    pattern.save(&asset).unwrap();

    let storage_dir = dir.path().join("captures");
    let bus = Arc::new(RecordingBus::default());
    let mut camera = DummyCamera::new(
        "0",
        &asset,
        bus.clone(),
        TOPIC.into(),
        Some(ImageStorage::new(&storage_dir)),
    );

    let envelope = camera.capture().await.unwrap().unwrap();
    assert_eq!(envelope.image.image_width, 5);
    assert_eq!(envelope.image.image_height, 3);
    assert_eq!(envelope.image.image_channels, 3);

    assert_eq!(bus.published().len(), 1);
    let stored: Vec<_> = std::fs::read_dir(&storage_dir).unwrap().collect();
    assert_eq!(stored.len(), 1);
}
