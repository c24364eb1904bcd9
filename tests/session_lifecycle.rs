use std::time::Duration;

use camera_session::device::features;
use camera_session::{
    CameraError, CameraSession, Capture, Configurable, DeviceInfo, NativeFrame, ParameterValue,
    PixelFormat, SessionState, SyntheticCamera, SyntheticTransport, MAX_NUM_BUFFERS,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn two_camera_rig() -> (SyntheticTransport, SyntheticCamera, SyntheticCamera) {
    let left = SyntheticCamera::new(
        DeviceInfo::new("192.168.0.11", "left")
            .with_model("acA1300-60gc")
            .with_serial("24001101"),
    );
    let right = SyntheticCamera::new(
        DeviceInfo::new("192.168.0.12", "right")
            .with_model("acA1300-60gc")
            .with_serial("24001102"),
    );
    let transport = SyntheticTransport::new()
        .with_camera(left.clone())
        .with_camera(right.clone());
    (transport, left, right)
}

fn camera_error(err: &anyhow::Error) -> &CameraError {
    err.downcast_ref::<CameraError>()
        .unwrap_or_else(|| panic!("expected CameraError, got {err:#}"))
}

fn bgr_frame(width: u32, height: u32) -> NativeFrame {
    NativeFrame {
        width,
        height,
        pixel_format: PixelFormat::Bgr8,
        data: vec![42u8; (width * height * 3) as usize],
    }
}

#[test]
fn full_lifecycle_by_address() {
    init_logging();
    let (transport, _left, right) = two_camera_rig();
    let mut session = CameraSession::new(transport);
    assert_eq!(session.state(), SessionState::Disconnected);

    session.connect_by_address("192.168.0.12").expect("connect");
    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(session.settings().ip_address, "192.168.0.12");
    assert_eq!(session.device_info().map(|d| d.serial_number.as_str()), Some("24001102"));
    assert_eq!(right.max_buffers(), MAX_NUM_BUFFERS);

    session.open().expect("open");
    assert_eq!(session.state(), SessionState::Opened);
    assert!(right.is_open());

    session.apply_parameters().expect("apply");

    right.arm_frame(bgr_frame(4, 3));
    let image = session.capture_frame(None).expect("capture");
    assert_eq!(image.shape(), [3, 4, 3]);
    assert_eq!(image.pixel(3, 2), Some([42, 42, 42]));

    // The burst leaves the stream stopped again.
    assert_eq!(session.state(), SessionState::Opened);
    assert!(!right.is_grabbing());

    session.close().expect("close");
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(!right.is_open());
    assert_eq!(right.live_handles(), 0);
}

#[test]
fn connect_by_name_picks_matching_device() {
    let (transport, left, right) = two_camera_rig();
    let mut session = CameraSession::new(transport);

    session.connect_by_name("left").expect("connect");
    assert_eq!(left.live_handles(), 1);
    assert_eq!(right.live_handles(), 0);
    assert_eq!(session.device_info().unwrap().address, "192.168.0.11");
}

#[test]
fn connect_reuses_stored_address() {
    let (transport, _left, right) = two_camera_rig();
    let mut session = CameraSession::new(transport);
    session.settings_mut().ip_address = "192.168.0.12".into();

    session.connect_by_address("").expect("connect");
    assert_eq!(right.live_handles(), 1);
}

#[test]
fn empty_address_fails_before_discovery() {
    let (transport, _left, _right) = two_camera_rig();
    let mut session = CameraSession::new(transport);

    let err = session.connect_by_address("").unwrap_err();
    assert!(matches!(camera_error(&err), CameraError::Configuration(_)));
    assert_eq!(session.transport().enumeration_count(), 0);
    assert!(!session.is_connected());
}

#[test]
fn empty_name_is_a_configuration_error() {
    let (transport, _left, _right) = two_camera_rig();
    let mut session = CameraSession::new(transport);

    let err = session.connect_by_name("").unwrap_err();
    assert!(matches!(camera_error(&err), CameraError::Configuration(_)));
    assert_eq!(session.transport().enumeration_count(), 0);
}

#[test]
fn no_devices_means_device_not_found() {
    let mut session = CameraSession::new(SyntheticTransport::new());

    let err = session.connect_by_address("10.0.0.5").unwrap_err();
    assert!(matches!(camera_error(&err), CameraError::DeviceNotFound(_)));
    assert!(!session.is_connected());

    let err = session.connect_by_name("left").unwrap_err();
    assert!(matches!(camera_error(&err), CameraError::DeviceNotFound(_)));
    assert!(!session.is_connected());
}

#[test]
fn unmatched_identity_means_device_not_found() {
    let (transport, _left, _right) = two_camera_rig();
    let mut session = CameraSession::new(transport);

    let err = session.connect_by_address("192.168.0.99").unwrap_err();
    assert!(matches!(camera_error(&err), CameraError::DeviceNotFound(_)));
    assert!(err.to_string().contains("192.168.0.99"));

    let err = session.connect_by_name("center").unwrap_err();
    assert!(err.to_string().contains("center"));
}

#[test]
fn failed_reconnect_leaves_no_stale_state() {
    let (transport, left, _right) = two_camera_rig();
    let mut session = CameraSession::new(transport);
    session.connect_by_name("left").expect("connect");
    session.open().expect("open");

    assert!(session.connect_by_name("missing").is_err());
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(session.device_info().is_none());
    assert_eq!(left.live_handles(), 0);
    assert!(!left.is_open());
}

#[test]
fn reconnect_releases_previous_handle() {
    let (transport, left, right) = two_camera_rig();
    let mut session = CameraSession::new(transport);
    session.connect_by_name("left").expect("connect left");
    session.open().expect("open left");

    session.connect_by_name("right").expect("connect right");
    assert_eq!(left.live_handles(), 0);
    assert_eq!(right.live_handles(), 1);
    assert_eq!(session.state(), SessionState::Connected);
}

#[test]
fn close_twice_is_a_no_op() {
    let (transport, _left, _right) = two_camera_rig();
    let mut session = CameraSession::new(transport);
    session.close().expect("close never-opened session");

    session.connect_by_name("left").expect("connect");
    session.open().expect("open");
    session.close().expect("first close");
    session.close().expect("second close");
    assert!(!session.is_opened());
    assert!(!session.is_connected());
}

#[test]
fn session_can_reconnect_after_close() {
    let (transport, left, _right) = two_camera_rig();
    let mut session = CameraSession::new(transport);
    session.connect_by_name("left").expect("connect");
    session.open().expect("open");
    session.close().expect("close");

    session.connect_by_name("left").expect("reconnect");
    session.open().expect("reopen");
    left.arm_frame(bgr_frame(2, 2));
    assert!(!session.capture_frame(None).expect("capture").is_empty());
}

#[test]
fn capture_requires_open_session() {
    let (transport, _left, _right) = two_camera_rig();
    let mut session = CameraSession::new(transport);

    let err = session.capture_frame(None).unwrap_err();
    assert_eq!(camera_error(&err), &CameraError::NotOpened);

    session.connect_by_name("left").expect("connect");
    let err = session.capture_frame(None).unwrap_err();
    assert_eq!(camera_error(&err), &CameraError::NotOpened);
}

#[test]
fn open_requires_connection_and_is_idempotent() {
    let (transport, _left, _right) = two_camera_rig();
    let mut session = CameraSession::new(transport);

    let err = session.open().unwrap_err();
    assert_eq!(camera_error(&err), &CameraError::NotConnected);

    session.connect_by_name("left").expect("connect");
    session.open().expect("open");
    session.open().expect("second open");
    assert_eq!(session.state(), SessionState::Opened);
}

#[test]
fn open_failure_propagates_and_keeps_session_connected() {
    let (transport, left, _right) = two_camera_rig();
    left.fail_open("device is in use");
    let mut session = CameraSession::new(transport);
    session.connect_by_name("left").expect("connect");

    let err = session.open().unwrap_err();
    assert!(err.downcast_ref::<CameraError>().is_none());
    assert!(err.to_string().contains("device is in use"));
    assert_eq!(session.state(), SessionState::Connected);
}

#[test]
fn short_timeout_without_frame_is_soft_miss() {
    let (transport, _left, _right) = two_camera_rig();
    let mut session = CameraSession::new(transport);
    session.connect_by_name("left").expect("connect");
    session.open().expect("open");

    let image = session
        .capture_frame(Some(Duration::from_millis(1)))
        .expect("soft miss is not an error");
    assert!(image.is_empty());
    assert_eq!(image.shape(), [0, 0, 0]);
}

#[test]
fn device_grab_failure_is_soft_miss() {
    let (transport, left, _right) = two_camera_rig();
    let mut session = CameraSession::new(transport);
    session.connect_by_name("left").expect("connect");
    session.open().expect("open");

    left.fail_next_grab(3, "buffer incompletely grabbed");
    left.arm_frame(bgr_frame(2, 2));
    assert!(session.capture_frame(None).expect("capture").is_empty());

    // Stopping after the failed burst flushed the frame that was buffered.
    let stale = session
        .capture_frame(Some(Duration::from_millis(5)))
        .expect("capture");
    assert!(stale.is_empty());
    assert_eq!(left.frames_delivered(), 0);

    // A frame from a fresh exposure arrives on the next burst.
    left.arm_frame(bgr_frame(2, 2));
    assert!(!session.capture_frame(None).expect("capture").is_empty());
    assert_eq!(left.frames_delivered(), 1);
}

#[test]
fn capture_distinguishes_timeout_from_failure() {
    let (transport, left, _right) = two_camera_rig();
    let mut session = CameraSession::new(transport);
    session.connect_by_name("left").expect("connect");
    session.open().expect("open");

    let timeout = session.capture(Some(Duration::from_millis(1))).expect("capture");
    assert_eq!(timeout, Capture::Timeout);

    left.fail_next_grab(7, "packet loss");
    match session.capture(None).expect("capture") {
        Capture::Failed { reason } => assert!(reason.contains("packet loss")),
        other => panic!("expected failure, got {other:?}"),
    }

    left.arm_frame(NativeFrame {
        width: 4,
        height: 4,
        pixel_format: PixelFormat::Rgb8,
        data: vec![0u8; 5],
    });
    assert!(matches!(
        session.capture(None).expect("capture"),
        Capture::Failed { .. }
    ));
}

#[test]
fn each_capture_is_its_own_burst() {
    let camera = SyntheticCamera::new(DeviceInfo::new("10.1.1.1", "bench"))
        .with_generated_frames(8, 6, PixelFormat::BayerRg8);
    let transport = SyntheticTransport::new().with_camera(camera.clone());
    let mut session = CameraSession::new(transport);
    session.connect_by_address("10.1.1.1").expect("connect");
    session.open().expect("open");

    for _ in 0..3 {
        let image = session.capture_frame(None).expect("capture");
        assert_eq!(image.shape(), [6, 8, 3]);
        assert!(!camera.is_grabbing());
    }
    assert_eq!(camera.grab_starts(), 3);
    assert_eq!(camera.frames_delivered(), 3);
}

#[test]
fn capture_waits_for_frame_from_another_thread() {
    let (transport, left, _right) = two_camera_rig();
    let mut session = CameraSession::new(transport);
    session.connect_by_name("left").expect("connect");
    session.open().expect("open");

    let feeder = left.clone();
    let worker = std::thread::spawn(move || {
        while !feeder.is_grabbing() {
            std::thread::sleep(Duration::from_millis(1));
        }
        feeder.push_frame(bgr_frame(2, 2));
    });
    let image = session
        .capture_frame(Some(Duration::from_secs(5)))
        .expect("capture");
    worker.join().expect("feeder thread");
    assert!(!image.is_empty());
}

#[test]
fn fixed_exposure_and_frame_rate_are_written() {
    let (transport, left, _right) = two_camera_rig();
    let mut session = CameraSession::new(transport);
    {
        let settings = session.settings_mut();
        settings.exposure_time = 15.0;
        settings.frame_rate = 10.0;
        settings.gain = 3.7;
        settings.gamma = 0.7;
    }
    session.connect_by_name("left").expect("connect");
    session.open().expect("open");
    session.apply_parameters().expect("apply");

    assert_eq!(
        left.parameter(features::EXPOSURE_AUTO),
        Some(ParameterValue::enumeration(features::AUTO_OFF))
    );
    assert_eq!(
        left.parameter(features::EXPOSURE_TIME),
        Some(ParameterValue::Float(15.0))
    );
    assert_eq!(
        left.parameter(features::ACQUISITION_FRAME_RATE_ENABLE),
        Some(ParameterValue::Boolean(true))
    );
    assert_eq!(
        left.parameter(features::ACQUISITION_FRAME_RATE),
        Some(ParameterValue::Float(10.0))
    );
    assert_eq!(
        left.parameter(features::GAIN_AUTO),
        Some(ParameterValue::enumeration(features::AUTO_OFF))
    );
    assert_eq!(left.parameter(features::GAIN), Some(ParameterValue::Integer(3)));
    assert_eq!(left.parameter(features::GAMMA), Some(ParameterValue::Float(0.7)));
}

#[test]
fn zero_exposure_selects_continuous_auto() {
    let (transport, left, _right) = two_camera_rig();
    let mut session = CameraSession::new(transport);
    session.connect_by_name("left").expect("connect");
    session.apply_parameters().expect("apply");

    assert_eq!(
        left.parameter(features::EXPOSURE_AUTO),
        Some(ParameterValue::enumeration(features::AUTO_CONTINUOUS))
    );
    assert_eq!(left.parameter(features::EXPOSURE_TIME), None);
    assert_eq!(
        left.parameter(features::ACQUISITION_FRAME_RATE_ENABLE),
        Some(ParameterValue::Boolean(false))
    );
    assert_eq!(left.parameter(features::ACQUISITION_FRAME_RATE), None);
}

#[test]
fn apply_parameters_requires_connection() {
    let (transport, _left, _right) = two_camera_rig();
    let mut session = CameraSession::new(transport);
    let err = session.apply_parameters().unwrap_err();
    assert_eq!(camera_error(&err), &CameraError::NotConnected);
}

#[test]
fn parameter_rejection_propagates_untranslated() {
    let (transport, left, _right) = two_camera_rig();
    left.reject_parameter(features::GAMMA);
    let mut session = CameraSession::new(transport);
    session.connect_by_name("left").expect("connect");

    let err = session.apply_parameters().unwrap_err();
    assert!(err.downcast_ref::<CameraError>().is_none());
    assert!(err.to_string().contains(features::GAMMA));
}

#[test]
fn restore_narrowed_declared_set() {
    let (transport, _left, _right) = two_camera_rig();
    let mut session = CameraSession::new(transport);
    session
        .settings_mut()
        .set_declared_attributes(["ip_address", "grab_timeout"]);

    let data = serde_json::json!({"ip_address": "10.0.0.5", "bogus": 1});
    session.restore(data.as_object().unwrap()).expect("restore");
    assert_eq!(session.settings().ip_address, "10.0.0.5");
    assert_eq!(session.settings().grab_timeout, 1000);
    assert_eq!(session.settings().declared_attributes().len(), 2);

    let exported = session.export().expect("export");
    assert_eq!(exported.len(), 2);
    assert_eq!(exported["ip_address"], "10.0.0.5");
}

#[test]
fn dropping_session_releases_device() {
    let (transport, left, _right) = two_camera_rig();
    {
        let mut session = CameraSession::new(transport);
        session.connect_by_name("left").expect("connect");
        session.open().expect("open");
        assert_eq!(left.live_handles(), 1);
    }
    assert_eq!(left.live_handles(), 0);
    assert!(!left.is_open());
}

#[test]
fn available_devices_lists_every_camera() {
    let (transport, _left, _right) = two_camera_rig();
    let session = CameraSession::new(transport);
    let names: Vec<String> = session
        .available_devices()
        .expect("enumerate")
        .iter()
        .map(|d| d.full_name())
        .collect();
    assert_eq!(names, vec!["left (192.168.0.11)", "right (192.168.0.12)"]);
}
