//! Driver for FLIR / Directed Perception pan-tilt units.
//!
//! The units speak a line-oriented ASCII protocol over RS-232 or a TCP
//! bridge: the host sends `{Axis}{Verb}{Value}` commands terminated by a
//! space, the device acknowledges with `"*\r"`, `"* <payload>\r"` or
//! `"!<message>\r"`.
//!
//! # Layers
//!
//! - [`cmd`] — typed [`Command`] set and its pure wire encoding
//! - [`frame`] — extraction of complete acknowledgement frames from the
//!   receive stream
//! - [`response`] — classification of frames into success / error / value
//! - [`units`] — tick ⇄ degree ⇄ radian conversion with per-axis resolution
//! - [`transport`] — the [`Transport`] seam plus TCP and serial
//!   implementations
//! - [`session`] — [`PtuSession`], the blocking request/response state
//!   machine tying the layers together
//!
//! # Example
//!
//! ```rust,ignore
//! use ptu46::{Axis, Endpoint, PtuSession};
//!
//! let mut ptu = PtuSession::open(&"/dev/ttyS0".parse::<Endpoint>()?)?;
//! ptu.initialize()?;
//! ptu.set_position_deg(Axis::Pan, 45.0, true)?;
//! println!("pan at {:.2} deg", ptu.get_position_deg(Axis::Pan)?);
//! ptu.close()?;
//! ```

pub mod cmd;
pub mod error;
pub mod frame;
pub mod response;
pub mod session;
pub mod transport;
pub mod units;

pub use cmd::{Axis, Command, ControlMode, PresetAction, PresetIndex, SpeedBound};
pub use error::{PtuError, PtuResult};
pub use frame::{locate_frame, FrameLocator, FrameStep, PtuFrameLocator};
pub use response::Response;
pub use session::{
    AwaitOutcome, EndpointArgs, PtuSession, SessionState, DEFAULT_REQUEST_TIMEOUT,
};
pub use transport::{
    Endpoint, FrameBuffer, SerialTransport, TcpTransport, Transport, DEFAULT_BAUD_RATE,
};
pub use units::AxisCalibration;
