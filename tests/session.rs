//! Session tests against a scripted mock transport.
//!
//! The mock pairs each expected command string with canned reply bytes; an
//! empty reply simulates a device that never answers. Reads can be chunked
//! to exercise frame reassembly through the real read loop.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ptu46::units::{deg_to_rad, rad_to_deg, resolution_to_deg_per_tick, ticks_to_deg};
use ptu46::{
    Axis, AwaitOutcome, ControlMode, PresetAction, PresetIndex, PtuError, PtuSession, SessionState,
    Transport,
};

/// Resolution the scripted device reports, in arc-seconds per tick.
const RAW_RESOLUTION: f64 = 185.1428;

const PAN_MIN_TICKS: i32 = -3090;
const PAN_MAX_TICKS: i32 = 3090;
const TILT_MIN_TICKS: i32 = -907;
const TILT_MAX_TICKS: i32 = 604;

struct MockTransport {
    /// Expected command string paired with the bytes the device replies.
    exchanges: VecDeque<(String, Vec<u8>)>,
    /// Bytes queued for delivery to the session.
    pending: Vec<u8>,
    /// Largest number of bytes handed out per read, to force reassembly.
    chunk: usize,
    closes: Arc<AtomicUsize>,
}

impl MockTransport {
    fn new() -> Self {
        Self {
            exchanges: VecDeque::new(),
            pending: Vec::new(),
            chunk: usize::MAX,
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn expect(&mut self, command: &str, reply: &[u8]) {
        self.exchanges.push_back((command.to_string(), reply.to_vec()));
    }

    fn expect_init(&mut self) {
        self.expect("FT ", b"*\r");
        self.expect("PR ", format!("* {RAW_RESOLUTION}\r").as_bytes());
        self.expect("TR ", format!("* {RAW_RESOLUTION}\r").as_bytes());
        self.expect("PN ", format!("* {PAN_MIN_TICKS}\r").as_bytes());
        self.expect("PX ", format!("* {PAN_MAX_TICKS}\r").as_bytes());
        self.expect("TN ", format!("* {TILT_MIN_TICKS}\r").as_bytes());
        self.expect("TX ", format!("* {TILT_MAX_TICKS}\r").as_bytes());
    }
}

impl Transport for MockTransport {
    fn write_all(&mut self, buf: &[u8], _timeout: Duration) -> Result<(), PtuError> {
        let written = String::from_utf8(buf.to_vec()).expect("commands are ASCII");
        let (expected, reply) = self
            .exchanges
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected command {written:?}"));
        assert_eq!(written, expected, "command order mismatch");
        self.pending.extend_from_slice(&reply);
        Ok(())
    }

    fn read_some(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, PtuError> {
        if self.pending.is_empty() {
            return Err(PtuError::Timeout);
        }
        let n = buf.len().min(self.pending.len()).min(self.chunk);
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }

    fn close(&mut self) -> Result<(), PtuError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn ready_session(mock: MockTransport) -> PtuSession<MockTransport> {
    let mut session = PtuSession::with_transport(mock);
    session.set_timeout(Duration::from_millis(50));
    session.initialize().expect("initialization succeeds");
    session
}

fn expected_deg_per_tick() -> f64 {
    resolution_to_deg_per_tick(RAW_RESOLUTION)
}

#[test]
fn initialize_discovers_calibration() {
    init_logging();
    let mut mock = MockTransport::new();
    mock.expect_init();

    let session = ready_session(mock);
    assert_eq!(session.state(), SessionState::Ready);

    let dpt = expected_deg_per_tick();
    let pan = session.calibration(Axis::Pan);
    assert!((pan.deg_per_tick - dpt).abs() < 1e-12);
    assert!((pan.min_rad - deg_to_rad(ticks_to_deg(PAN_MIN_TICKS, dpt))).abs() < 1e-12);
    assert!((pan.max_rad - deg_to_rad(ticks_to_deg(PAN_MAX_TICKS, dpt))).abs() < 1e-12);

    let tilt = session.calibration(Axis::Tilt);
    assert!((tilt.min_rad - deg_to_rad(ticks_to_deg(TILT_MIN_TICKS, dpt))).abs() < 1e-12);
    assert!((tilt.max_rad - deg_to_rad(ticks_to_deg(TILT_MAX_TICKS, dpt))).abs() < 1e-12);
}

#[test]
fn position_round_trip_in_ticks() {
    init_logging();
    let mut mock = MockTransport::new();
    mock.expect_init();
    mock.expect("PP ", b"* 1234\r");
    mock.expect("TO120 ", b"*\r");

    let mut session = ready_session(mock);
    assert_eq!(session.get_position(Axis::Pan, false).unwrap(), 1234);
    let outcome = session.set_position(Axis::Tilt, true, 120, false).unwrap();
    assert_eq!(outcome, AwaitOutcome::NotRequested);
}

#[test]
fn set_position_with_completion_await() {
    init_logging();
    let mut mock = MockTransport::new();
    mock.expect_init();
    mock.expect("TP500 ", b"*\r");
    mock.expect("A ", b"*\r");

    let mut session = ready_session(mock);
    let outcome = session.set_position(Axis::Tilt, false, 500, true).unwrap();
    assert_eq!(outcome, AwaitOutcome::Completed);
}

#[test]
fn await_failure_does_not_invalidate_the_set() {
    init_logging();
    let mut mock = MockTransport::new();
    mock.expect_init();
    mock.expect("TP500 ", b"*\r");
    // The await command gets no answer at all.
    mock.expect("A ", b"");

    let mut session = ready_session(mock);
    let outcome = session.set_position(Axis::Tilt, false, 500, true).unwrap();
    assert_eq!(outcome, AwaitOutcome::AckFailed);
    assert_eq!(session.state(), SessionState::Ready);
}

#[test]
fn device_error_is_surfaced_and_session_stays_usable() {
    init_logging();
    let mut mock = MockTransport::new();
    mock.expect_init();
    mock.expect("PP99999 ", b"!maximum position exceeded\r");
    mock.expect("PP ", b"* 0\r");

    let mut session = ready_session(mock);
    let err = session
        .set_position(Axis::Pan, false, 99999, false)
        .unwrap_err();
    match &err {
        PtuError::Device(msg) => assert_eq!(msg, "maximum position exceeded"),
        other => panic!("expected device error, got {other:?}"),
    }
    assert!(err.is_retriable());
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.get_position(Axis::Pan, false).unwrap(), 0);
}

#[test]
fn timeout_leaves_the_session_retriable() {
    init_logging();
    let mut mock = MockTransport::new();
    mock.expect_init();
    mock.expect("PS ", b"");
    mock.expect("PS ", b"* 1000\r");

    let mut session = ready_session(mock);
    let err = session.get_speed(Axis::Pan).unwrap_err();
    assert!(matches!(err, PtuError::Timeout));
    assert!(err.is_retriable());
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.get_speed(Axis::Pan).unwrap(), 1000);
}

#[test]
fn noisy_fragmented_replies_reassemble() {
    init_logging();
    let mut mock = MockTransport::new();
    mock.expect_init();
    // Line noise ahead of the frame, delivered three bytes at a time.
    mock.expect("PP ", b"\xff\xfegarbage* 777\r");
    mock.chunk = 3;

    let mut session = ready_session(mock);
    assert_eq!(session.get_position(Axis::Pan, false).unwrap(), 777);
}

#[test]
fn close_is_idempotent() {
    init_logging();
    let mut mock = MockTransport::new();
    mock.expect_init();
    let closes = mock.closes.clone();

    let mut session = ready_session(mock);
    session.close().unwrap();
    session.close().unwrap();
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(closes.load(Ordering::SeqCst), 1);

    let err = session.get_position(Axis::Pan, false).unwrap_err();
    assert!(matches!(err, PtuError::InvalidState { .. }));

    // Dropping the closed session must not close the transport again.
    drop(session);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn init_timeout_is_retriable() {
    init_logging();
    let mut mock = MockTransport::new();
    mock.expect("FT ", b"");

    let mut session = PtuSession::with_transport(mock);
    session.set_timeout(Duration::from_millis(50));

    let err = session.initialize().unwrap_err();
    assert!(matches!(err, PtuError::Timeout));
    assert_eq!(session.state(), SessionState::Initializing);
}

#[test]
fn malformed_frame_faults_initialization() {
    init_logging();
    let mut mock = MockTransport::new();
    // Success marker without the payload separator.
    mock.expect("FT ", b"*X\r");

    let mut session = PtuSession::with_transport(mock);
    session.set_timeout(Duration::from_millis(50));

    let err = session.initialize().unwrap_err();
    assert!(matches!(err, PtuError::MalformedFrame(_)));
    assert_eq!(session.state(), SessionState::Faulted);

    let err = session.initialize().unwrap_err();
    assert!(matches!(err, PtuError::InvalidState { .. }));
}

#[test]
fn degree_targets_are_checked_against_travel_limits() {
    init_logging();
    let mut mock = MockTransport::new();
    mock.expect_init();

    let mut session = ready_session(mock);
    // Pan tops out just under 159 degrees with the scripted calibration.
    let err = session
        .set_position_deg(Axis::Pan, 170.0, false)
        .unwrap_err();
    assert!(matches!(err, PtuError::InvalidArgument(_)));
}

#[test]
fn radian_command_rounds_to_the_nearest_tick() {
    init_logging();
    let dpt = expected_deg_per_tick();
    let target_rad = 0.5;
    let expected_ticks = (rad_to_deg(target_rad) / dpt).round() as i32;

    let mut mock = MockTransport::new();
    mock.expect_init();
    mock.expect(&format!("PP{expected_ticks} "), b"*\r");

    let mut session = ready_session(mock);
    let outcome = session
        .set_position_rad(Axis::Pan, target_rad, false)
        .unwrap();
    assert_eq!(outcome, AwaitOutcome::NotRequested);
}

#[test]
fn mode_and_flag_queries_decode_letter_tokens() {
    init_logging();
    let mut mock = MockTransport::new();
    mock.expect_init();
    mock.expect("L ", b"* E\r");
    mock.expect("C ", b"* I\r");
    mock.expect("CV ", b"*\r");

    let mut session = ready_session(mock);
    assert!(session.get_pan_limit_mode().unwrap());
    assert_eq!(
        session.get_control_mode().unwrap(),
        ControlMode::Independent
    );
    session
        .set_control_mode(ControlMode::PureVelocity)
        .unwrap();
}

#[test]
fn presets_and_scans_issue_their_commands() {
    init_logging();
    let mut mock = MockTransport::new();
    mock.expect_init();
    mock.expect("XS7 ", b"*\r");
    mock.expect("XG7 ", b"*\r");
    mock.expect("M-2000,2000 ", b"*\r");
    mock.expect("H ", b"*\r");

    let mut session = ready_session(mock);
    let slot = PresetIndex::new(7).unwrap();
    session.preset(slot, PresetAction::Set).unwrap();
    session.preset(slot, PresetAction::Goto).unwrap();
    session.auto_scan_pan((-2000, 2000)).unwrap();
    session.stop_auto_scan().unwrap();
}

#[test]
fn halting_nothing_touches_no_wire() {
    init_logging();
    let mut mock = MockTransport::new();
    mock.expect_init();
    // No exchange scripted: a write would panic the mock.

    let mut session = ready_session(mock);
    session.halt(false, false).unwrap();
}
