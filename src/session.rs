//! Stateful device session: one synchronous request/response channel to a
//! pan-tilt unit.
//!
//! Every operation is one encode→write→read-one-frame→decode round trip. The
//! session is strictly single-threaded; callers needing shared access must
//! serialize externally. A timed-out operation leaves the session usable
//! because framing is idempotent: whatever half-frame is still buffered gets
//! completed or discarded by the next read.
//!
//! Session lifecycle: constructing a session attaches an open transport and
//! puts it in `Initializing`; [`PtuSession::initialize`] negotiates terse
//! replies and discovers per-axis resolution and travel limits, moving to
//! `Ready`; [`PtuSession::close`] is idempotent from every state. An
//! unrecoverable transport fault sinks the session in `Faulted`.

use std::time::Duration;

use clap::Args;
use tracing::{debug, info, warn};

use crate::cmd::{Axis, Command, ControlMode, PresetAction, PresetIndex, SpeedBound};
use crate::error::{PtuError, PtuResult};
use crate::frame::PtuFrameLocator;
use crate::response::Response;
use crate::transport::{Endpoint, FrameBuffer, Transport, DEFAULT_BAUD_RATE};
use crate::units::{self, AxisCalibration};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle states of a session.
///
/// There is no explicit unopened state: a session only exists once a
/// transport has been attached, so "unopened" is simply the absence of the
/// session value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport attached, initialization sequence not yet completed.
    Initializing,
    /// Initialized; operations accepted.
    Ready,
    /// Closed by the caller; terminal.
    Closed,
    /// Unrecoverable transport fault; terminal.
    Faulted,
}

/// Outcome of the optional completion await after a position set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwaitOutcome {
    /// No completion await was requested.
    NotRequested,
    /// The device acknowledged motion completion.
    Completed,
    /// The position set succeeded but the completion await failed or timed
    /// out. Reported here and via `warn!`, without invalidating the set.
    AckFailed,
}

/// Synchronous session with one pan-tilt unit.
pub struct PtuSession<T: Transport> {
    transport: T,
    locator: PtuFrameLocator,
    rx: FrameBuffer,
    state: SessionState,
    timeout: Duration,
    pan: AxisCalibration,
    tilt: AxisCalibration,
}

impl PtuSession<Box<dyn Transport>> {
    /// Open a transport to `endpoint` and wrap it in a session.
    ///
    /// The session starts in `Initializing`; call
    /// [`initialize`](Self::initialize) before issuing operations.
    pub fn open(endpoint: &Endpoint) -> PtuResult<Self> {
        info!(%endpoint, "opening pan-tilt session");
        Ok(Self::with_transport(endpoint.open()?))
    }
}

impl<T: Transport> PtuSession<T> {
    /// Wrap an already-open transport.
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            locator: PtuFrameLocator,
            rx: FrameBuffer::new(),
            state: SessionState::Initializing,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            pan: AxisCalibration::default(),
            tilt: AxisCalibration::default(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Set the per-request timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Current per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Conversion state for an axis, as discovered by `initialize`.
    pub fn calibration(&self, axis: Axis) -> &AxisCalibration {
        match axis {
            Axis::Pan => &self.pan,
            Axis::Tilt => &self.tilt,
        }
    }

    // ==================== Initialization ====================

    /// Run the one-time initialization sequence.
    ///
    /// Steps, each one round trip: terse reply mode, pan resolution, tilt
    /// resolution, pan min/max travel, tilt min/max travel. Resolutions are
    /// stored as degrees per tick, travel limits in radians.
    ///
    /// Failure policy: a timeout or device-reported error leaves the session
    /// in `Initializing` so the caller may retry; a malformed frame or a
    /// transport fault moves it to `Faulted`.
    pub fn initialize(&mut self) -> PtuResult<()> {
        self.require_state(SessionState::Initializing, "Initializing")?;
        match self.run_init_sequence() {
            Ok(()) => {
                self.state = SessionState::Ready;
                info!(
                    pan_deg_per_tick = self.pan.deg_per_tick,
                    tilt_deg_per_tick = self.tilt.deg_per_tick,
                    "initialization complete"
                );
                Ok(())
            }
            Err(e) => {
                if matches!(e, PtuError::MalformedFrame(_)) {
                    self.state = SessionState::Faulted;
                }
                // Io errors have already faulted the session in transact.
                Err(e)
            }
        }
    }

    fn run_init_sequence(&mut self) -> PtuResult<()> {
        self.request_ack(Command::SetFeedbackTerse)?;

        for axis in [Axis::Pan, Axis::Tilt] {
            let raw = self.request_float(Command::GetResolution { axis })?;
            let deg_per_tick = units::resolution_to_deg_per_tick(raw);
            debug!(%axis, raw_arcsec = raw, deg_per_tick, "resolution discovered");
            self.calibration_mut(axis).deg_per_tick = deg_per_tick;
        }

        for axis in [Axis::Pan, Axis::Tilt] {
            let min = self.request_i32(Command::GetMinPosition { axis })?;
            let max = self.request_i32(Command::GetMaxPosition { axis })?;
            let deg_per_tick = self.calibration(axis).deg_per_tick;
            let min_rad = units::deg_to_rad(units::ticks_to_deg(min, deg_per_tick));
            let max_rad = units::deg_to_rad(units::ticks_to_deg(max, deg_per_tick));
            debug!(%axis, min, max, min_rad, max_rad, "travel limits discovered");

            let cal = self.calibration_mut(axis);
            cal.min_rad = min_rad;
            cal.max_rad = max_rad;
        }
        Ok(())
    }

    fn calibration_mut(&mut self, axis: Axis) -> &mut AxisCalibration {
        match axis {
            Axis::Pan => &mut self.pan,
            Axis::Tilt => &mut self.tilt,
        }
    }

    // ==================== Position ====================

    /// Current position of an axis in ticks. `offset` reads the relative
    /// register instead of the absolute one.
    pub fn get_position(&mut self, axis: Axis, offset: bool) -> PtuResult<i32> {
        self.require_ready()?;
        self.request_i32(Command::GetPosition { axis, offset })
    }

    /// Current absolute position of an axis in degrees.
    pub fn get_position_deg(&mut self, axis: Axis) -> PtuResult<f64> {
        let ticks = self.get_position(axis, false)?;
        Ok(units::ticks_to_deg(
            ticks,
            self.calibration(axis).deg_per_tick,
        ))
    }

    /// Current absolute position of an axis in radians.
    pub fn get_position_rad(&mut self, axis: Axis) -> PtuResult<f64> {
        Ok(units::deg_to_rad(self.get_position_deg(axis)?))
    }

    /// Command a position in ticks.
    ///
    /// With `await_completion`, a successful set is followed by an await
    /// command that blocks (up to the session timeout) until the device
    /// acknowledges the motion as finished. A failed await never turns an
    /// already-acknowledged set into a failure; it is reported through the
    /// returned [`AwaitOutcome`] and a `warn!`.
    pub fn set_position(
        &mut self,
        axis: Axis,
        offset: bool,
        ticks: i32,
        await_completion: bool,
    ) -> PtuResult<AwaitOutcome> {
        self.require_ready()?;
        self.request_ack(Command::SetPosition { axis, offset, ticks })?;
        if !await_completion {
            return Ok(AwaitOutcome::NotRequested);
        }
        match self.request_ack(Command::AwaitCompletion) {
            Ok(()) => Ok(AwaitOutcome::Completed),
            Err(e) => {
                warn!(error = %e, "position set acknowledged, completion await failed");
                Ok(AwaitOutcome::AckFailed)
            }
        }
    }

    /// Command an absolute position in degrees, checked against the
    /// discovered travel limits.
    pub fn set_position_deg(
        &mut self,
        axis: Axis,
        deg: f64,
        await_completion: bool,
    ) -> PtuResult<AwaitOutcome> {
        self.require_ready()?;
        let cal = *self.calibration(axis);
        let rad = units::deg_to_rad(deg);
        if !cal.in_range(rad) {
            return Err(PtuError::InvalidArgument(format!(
                "target {deg:.3} deg outside travel range [{:.3}, {:.3}] deg",
                units::rad_to_deg(cal.min_rad),
                units::rad_to_deg(cal.max_rad)
            )));
        }
        let ticks = units::deg_to_ticks(deg, cal.deg_per_tick);
        self.set_position(axis, false, ticks, await_completion)
    }

    /// Command an absolute position in radians, checked against the
    /// discovered travel limits.
    pub fn set_position_rad(
        &mut self,
        axis: Axis,
        rad: f64,
        await_completion: bool,
    ) -> PtuResult<AwaitOutcome> {
        self.set_position_deg(axis, units::rad_to_deg(rad), await_completion)
    }

    /// Travel limits of an axis in radians, as discovered by `initialize`.
    pub fn travel_limits_rad(&self, axis: Axis) -> (f64, f64) {
        let cal = self.calibration(axis);
        (cal.min_rad, cal.max_rad)
    }

    /// Axis resolution in arc-seconds per tick, queried live.
    pub fn get_resolution(&mut self, axis: Axis) -> PtuResult<f64> {
        self.require_ready()?;
        self.request_float(Command::GetResolution { axis })
    }

    /// Minimum reachable position of an axis in ticks.
    pub fn get_min_position(&mut self, axis: Axis) -> PtuResult<i32> {
        self.require_ready()?;
        self.request_i32(Command::GetMinPosition { axis })
    }

    /// Maximum reachable position of an axis in ticks.
    pub fn get_max_position(&mut self, axis: Axis) -> PtuResult<i32> {
        self.require_ready()?;
        self.request_i32(Command::GetMaxPosition { axis })
    }

    // ==================== Motion control ====================

    /// Halt position commands on the selected axes. Selecting neither axis
    /// is a no-op that touches no wire.
    pub fn halt(&mut self, pan: bool, tilt: bool) -> PtuResult<()> {
        self.require_ready()?;
        self.request_ack(Command::Halt { pan, tilt })
    }

    /// Block until the previous position command completes.
    pub fn await_completion(&mut self) -> PtuResult<()> {
        self.require_ready()?;
        self.request_ack(Command::AwaitCompletion)
    }

    /// Position commands execute as soon as received.
    pub fn enable_immediate_pos_exec(&mut self) -> PtuResult<()> {
        self.require_ready()?;
        self.request_ack(Command::EnableImmediatePosExec)
    }

    /// Position commands wait for an await, for coordinated pan+tilt moves.
    pub fn enable_slaved_pos_exec(&mut self) -> PtuResult<()> {
        self.require_ready()?;
        self.request_ack(Command::EnableSlavedPosExec)
    }

    /// Whether pan position limits are enforced.
    pub fn get_pan_limit_mode(&mut self) -> PtuResult<bool> {
        self.require_ready()?;
        let resp = self.transact(&Command::GetPanLimitMode)?;
        parse_enable_flag(&resp)
    }

    /// Enable or disable pan position limit enforcement.
    pub fn set_pan_limit_mode(&mut self, enabled: bool) -> PtuResult<()> {
        self.require_ready()?;
        self.request_ack(Command::SetPanLimitMode { enabled })
    }

    // ==================== Autoscan ====================

    /// Define and start a pan-only scan between two tick positions.
    pub fn auto_scan_pan(&mut self, pan: (i32, i32)) -> PtuResult<()> {
        self.require_ready()?;
        self.request_ack(Command::AutoScanPan { pan })
    }

    /// Define and start a pan+tilt scan over two tick ranges.
    pub fn auto_scan_both(&mut self, pan: (i32, i32), tilt: (i32, i32)) -> PtuResult<()> {
        self.require_ready()?;
        self.request_ack(Command::AutoScanBoth { pan, tilt })
    }

    /// Restart the most recently defined scan pattern.
    pub fn resume_auto_scan(&mut self) -> PtuResult<()> {
        self.require_ready()?;
        self.request_ack(Command::ResumeAutoScan)
    }

    /// Stop a running scan.
    ///
    /// The device cancels a scan on any host byte; a halt-all is sent so the
    /// cancellation also produces a parseable acknowledgement.
    pub fn stop_auto_scan(&mut self) -> PtuResult<()> {
        self.halt(true, true)
    }

    /// Whether a scan starts automatically at power-up.
    pub fn get_auto_scan_at_power_up(&mut self) -> PtuResult<bool> {
        self.require_ready()?;
        let resp = self.transact(&Command::GetAutoScanAtPowerUp)?;
        parse_enable_flag(&resp)
    }

    /// Enable or disable scanning at power-up.
    pub fn set_auto_scan_at_power_up(&mut self, enabled: bool) -> PtuResult<()> {
        self.require_ready()?;
        self.request_ack(Command::SetAutoScanAtPowerUp { enabled })
    }

    // ==================== Presets ====================

    /// Store, go to or clear a preset position.
    pub fn preset(&mut self, index: PresetIndex, action: PresetAction) -> PtuResult<()> {
        self.require_ready()?;
        self.request_ack(Command::Preset { index, action })
    }

    // ==================== Speed and acceleration ====================

    /// Desired speed of an axis in ticks per second.
    pub fn get_speed(&mut self, axis: Axis) -> PtuResult<i32> {
        self.require_ready()?;
        self.request_i32(Command::GetSpeed { axis })
    }

    /// Set the desired speed of an axis in ticks per second.
    pub fn set_speed(&mut self, axis: Axis, value: i32) -> PtuResult<()> {
        self.require_ready()?;
        self.request_ack(Command::SetSpeed { axis, value })
    }

    /// Instantaneous speed of an axis in ticks per second.
    pub fn get_current_speed(&mut self, axis: Axis) -> PtuResult<i32> {
        self.require_ready()?;
        self.request_i32(Command::GetCurrentSpeed { axis })
    }

    /// Adjust the desired speed by an offset from the current speed.
    pub fn set_delta_speed(&mut self, axis: Axis, delta: i32) -> PtuResult<()> {
        self.require_ready()?;
        self.request_ack(Command::SetDeltaSpeed { axis, delta })
    }

    /// Desired acceleration of an axis in ticks per second squared.
    pub fn get_accel(&mut self, axis: Axis) -> PtuResult<i32> {
        self.require_ready()?;
        self.request_i32(Command::GetAccel { axis })
    }

    /// Set the desired acceleration of an axis.
    pub fn set_accel(&mut self, axis: Axis, value: i32) -> PtuResult<()> {
        self.require_ready()?;
        self.request_ack(Command::SetAccel { axis, value })
    }

    /// Base (start-up) speed of an axis.
    pub fn get_base_speed(&mut self, axis: Axis) -> PtuResult<i32> {
        self.require_ready()?;
        self.request_i32(Command::GetBaseSpeed { axis })
    }

    /// Set the base (start-up) speed of an axis.
    pub fn set_base_speed(&mut self, axis: Axis, value: i32) -> PtuResult<()> {
        self.require_ready()?;
        self.request_ack(Command::SetBaseSpeed { axis, value })
    }

    /// One bound of the desired-speed range.
    pub fn get_speed_bound(&mut self, axis: Axis, bound: SpeedBound) -> PtuResult<i32> {
        self.require_ready()?;
        self.request_i32(Command::GetSpeedBound { axis, bound })
    }

    /// Set one bound of the desired-speed range.
    pub fn set_speed_bound(&mut self, axis: Axis, bound: SpeedBound, value: i32) -> PtuResult<()> {
        self.require_ready()?;
        self.request_ack(Command::SetSpeedBound { axis, bound, value })
    }

    /// Current speed control mode.
    pub fn get_control_mode(&mut self) -> PtuResult<ControlMode> {
        self.require_ready()?;
        let resp = self.transact(&Command::GetControlMode)?;
        let payload = match &resp {
            Response::Value(v) => v.trim(),
            Response::Error(msg) => return Err(PtuError::Device(msg.clone())),
            Response::Success => "",
        };
        match payload {
            "I" => Ok(ControlMode::Independent),
            "V" => Ok(ControlMode::PureVelocity),
            other => Err(PtuError::Parse(format!(
                "expected control mode I or V, got {other:?}"
            ))),
        }
    }

    /// Set the speed control mode.
    pub fn set_control_mode(&mut self, mode: ControlMode) -> PtuResult<()> {
        self.require_ready()?;
        self.request_ack(Command::SetControlMode { mode })
    }

    // ==================== Raw access and shutdown ====================

    /// Send a raw protocol line and decode its acknowledgement.
    ///
    /// The field delimiter is appended if missing. Intended for the REPL and
    /// debugging; prefer the typed operations.
    pub fn send_raw(&mut self, line: &str) -> PtuResult<Response> {
        self.require_ready()?;
        let mut wire = line.trim_end().to_string();
        wire.push(' ');
        self.transact_bytes(wire.as_bytes())
    }

    /// Close the session and its transport. Idempotent; safe in every state.
    pub fn close(&mut self) -> PtuResult<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        info!("closing pan-tilt session");
        let result = self.transport.close();
        self.state = SessionState::Closed;
        self.rx.clear();
        result
    }

    // ==================== Round-trip plumbing ====================

    fn transact(&mut self, cmd: &Command) -> PtuResult<Response> {
        let wire = cmd.encode();
        if wire.is_empty() {
            // Halt with neither axis selected: nothing to send.
            return Ok(Response::Success);
        }
        self.transact_bytes(wire.as_bytes())
    }

    fn transact_bytes(&mut self, wire: &[u8]) -> PtuResult<Response> {
        let result = self.exchange(wire);
        if matches!(&result, Err(PtuError::Io(_))) {
            self.state = SessionState::Faulted;
        }
        result
    }

    fn exchange(&mut self, wire: &[u8]) -> PtuResult<Response> {
        debug!(command = %String::from_utf8_lossy(wire).trim_end(), "request");
        self.transport.write_all(wire, self.timeout)?;
        let frame = self
            .rx
            .read_frame(&mut self.transport, &self.locator, self.timeout)?;
        let resp = Response::decode(&frame)?;
        debug!(response = ?resp, "response");
        Ok(resp)
    }

    fn request_ack(&mut self, cmd: Command) -> PtuResult<()> {
        match self.transact(&cmd)? {
            Response::Success => Ok(()),
            Response::Error(msg) => Err(PtuError::Device(msg)),
            Response::Value(v) => Err(PtuError::Parse(format!(
                "unexpected payload in acknowledgement: {v:?}"
            ))),
        }
    }

    fn request_i32(&mut self, cmd: Command) -> PtuResult<i32> {
        let value = self.transact(&cmd)?.parse_int()?;
        i32::try_from(value)
            .map_err(|_| PtuError::Parse(format!("payload {value} exceeds the tick range")))
    }

    fn request_float(&mut self, cmd: Command) -> PtuResult<f64> {
        self.transact(&cmd)?.parse_float()
    }

    fn require_ready(&self) -> PtuResult<()> {
        self.require_state(SessionState::Ready, "Ready")
    }

    fn require_state(&self, state: SessionState, name: &'static str) -> PtuResult<()> {
        if self.state == state {
            Ok(())
        } else {
            Err(PtuError::InvalidState {
                expected: name,
                actual: self.state,
            })
        }
    }
}

impl<T: Transport> Drop for PtuSession<T> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "transport close failed during drop");
        }
    }
}

/// Decode an `E`/`D` query payload into a boolean.
fn parse_enable_flag(resp: &Response) -> PtuResult<bool> {
    let payload = match resp {
        Response::Value(v) => v.trim(),
        Response::Error(msg) => return Err(PtuError::Device(msg.clone())),
        Response::Success => "",
    };
    match payload {
        "E" => Ok(true),
        "D" => Ok(false),
        other => Err(PtuError::Parse(format!(
            "expected enable flag E or D, got {other:?}"
        ))),
    }
}

/// Command-line arguments for connecting to a pan-tilt unit.
///
/// Use with `#[command(flatten)]` in a CLI args struct.
#[derive(Args, Debug, Clone)]
pub struct EndpointArgs {
    /// Pan-tilt unit endpoint.
    #[arg(
        long,
        default_value = "/dev/ttyS0",
        help = "Pan-tilt unit endpoint",
        long_help = "Where the unit is reachable: a serial device path \
            (/dev/ttyS0, serial:///dev/ttyUSB0:19200) or a TCP address \
            (tcp://192.168.0.20:4000) of its ethernet bridge."
    )]
    pub endpoint: String,

    /// Serial baud rate.
    #[arg(
        long,
        default_value_t = DEFAULT_BAUD_RATE,
        help = "Serial baud rate (ignored for TCP endpoints)"
    )]
    pub baud: u32,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 10, help = "Per-request timeout in seconds")]
    pub timeout_secs: u64,
}

impl EndpointArgs {
    /// Open and initialize a session against the configured endpoint.
    pub fn connect(&self) -> PtuResult<PtuSession<Box<dyn Transport>>> {
        let mut endpoint: Endpoint = self.endpoint.parse()?;
        if let Endpoint::Serial { baud, .. } = &mut endpoint {
            *baud = self.baud;
        }
        let mut session = PtuSession::open(&endpoint)?;
        session.set_timeout(Duration::from_secs(self.timeout_secs));
        session.initialize()?;
        Ok(session)
    }
}
