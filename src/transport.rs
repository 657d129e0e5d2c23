//! Byte transports and the framed read loop.
//!
//! The session core never touches sockets or serial ports directly; it talks
//! to a [`Transport`], and the [`FrameBuffer`] read loop turns the raw byte
//! stream into complete frames by calling back into an injected
//! [`FrameLocator`]. Two transports are provided: TCP (the unit's ethernet
//! bridge) and RS-232 via the `serialport` crate.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serialport::SerialPort;
use tracing::debug;

use crate::error::{PtuError, PtuResult};
use crate::frame::{FrameLocator, FrameStep};

/// Baud rate the unit ships with.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Largest acknowledgement the device can produce. A buffer that grows past
/// this without yielding a frame means the stream is garbage.
pub const MAX_PACKET_SIZE: usize = 8192;

/// Bytes requested from the transport per read pass.
const READ_CHUNK: usize = 256;

/// Blocking byte transport with per-call timeouts.
///
/// `close` is idempotent; closing an already-closed transport is a no-op.
pub trait Transport {
    /// Write the whole buffer or fail.
    fn write_all(&mut self, buf: &[u8], timeout: Duration) -> PtuResult<()>;

    /// Read whatever bytes are available, blocking up to `timeout` for the
    /// first of them. Returns the number of bytes placed in `buf`; expiry is
    /// [`PtuError::Timeout`].
    fn read_some(&mut self, buf: &mut [u8], timeout: Duration) -> PtuResult<usize>;

    /// Release the underlying connection.
    fn close(&mut self) -> PtuResult<()>;
}

impl Transport for Box<dyn Transport> {
    fn write_all(&mut self, buf: &[u8], timeout: Duration) -> PtuResult<()> {
        (**self).write_all(buf, timeout)
    }

    fn read_some(&mut self, buf: &mut [u8], timeout: Duration) -> PtuResult<usize> {
        (**self).read_some(buf, timeout)
    }

    fn close(&mut self) -> PtuResult<()> {
        (**self).close()
    }
}

/// Where a pan-tilt unit is reachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `host:port` of the unit's ethernet bridge.
    Tcp(String),
    /// Serial device path and baud rate.
    Serial { path: String, baud: u32 },
}

impl Endpoint {
    /// Open the matching transport.
    pub fn open(&self) -> PtuResult<Box<dyn Transport>> {
        match self {
            Endpoint::Tcp(addr) => Ok(Box::new(TcpTransport::connect(addr)?)),
            Endpoint::Serial { path, baud } => Ok(Box::new(SerialTransport::open(path, *baud)?)),
        }
    }
}

impl FromStr for Endpoint {
    type Err = PtuError;

    /// Accepts `tcp://host:port`, `serial:///dev/ttyS0[:baud]`, a bare
    /// device path, or a bare `host:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(addr) = s.strip_prefix("tcp://") {
            return Ok(Endpoint::Tcp(addr.to_string()));
        }
        if let Some(rest) = s.strip_prefix("serial://") {
            // A trailing `:<number>` selects the baud rate.
            if let Some((path, baud)) = rest.rsplit_once(':') {
                if let Ok(baud) = baud.parse() {
                    return Ok(Endpoint::Serial {
                        path: path.to_string(),
                        baud,
                    });
                }
            }
            return Ok(Endpoint::Serial {
                path: rest.to_string(),
                baud: DEFAULT_BAUD_RATE,
            });
        }
        if s.starts_with('/') || s.starts_with("COM") {
            return Ok(Endpoint::Serial {
                path: s.to_string(),
                baud: DEFAULT_BAUD_RATE,
            });
        }
        if s.contains(':') {
            return Ok(Endpoint::Tcp(s.to_string()));
        }
        Err(PtuError::InvalidArgument(format!(
            "cannot interpret {s:?} as a serial path or host:port"
        )))
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{addr}"),
            Endpoint::Serial { path, baud } => write!(f, "serial://{path}:{baud}"),
        }
    }
}

/// TCP transport to the unit's ethernet bridge.
pub struct TcpTransport {
    stream: Option<TcpStream>,
    peer: String,
}

impl TcpTransport {
    /// Connect to `host:port`.
    pub fn connect(addr: &str) -> PtuResult<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        debug!(peer = addr, "tcp transport connected");
        Ok(Self {
            stream: Some(stream),
            peer: addr.to_string(),
        })
    }

    fn stream(&mut self) -> PtuResult<&mut TcpStream> {
        self.stream.as_mut().ok_or_else(|| {
            PtuError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                format!("tcp transport to {} is closed", self.peer),
            ))
        })
    }
}

impl Transport for TcpTransport {
    fn write_all(&mut self, buf: &[u8], timeout: Duration) -> PtuResult<()> {
        let stream = self.stream()?;
        stream.set_write_timeout(Some(nonzero(timeout)))?;
        match stream.write_all(buf) {
            Ok(()) => Ok(()),
            Err(e) if is_timeout(&e) => Err(PtuError::Timeout),
            Err(e) => Err(e.into()),
        }
    }

    fn read_some(&mut self, buf: &mut [u8], timeout: Duration) -> PtuResult<usize> {
        let stream = self.stream()?;
        stream.set_read_timeout(Some(nonzero(timeout)))?;
        match stream.read(buf) {
            Ok(0) => Err(PtuError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by peer",
            ))),
            Ok(n) => Ok(n),
            Err(e) if is_timeout(&e) => Err(PtuError::Timeout),
            Err(e) => Err(e.into()),
        }
    }

    fn close(&mut self) -> PtuResult<()> {
        // Dropping the stream closes the socket.
        self.stream = None;
        Ok(())
    }
}

/// RS-232 transport.
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
    path: String,
}

impl SerialTransport {
    /// Open a serial device at 8N1 with the given baud rate.
    pub fn open(path: &str, baud: u32) -> PtuResult<Self> {
        let port = serialport::new(path, baud)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(500))
            .open()
            .map_err(io::Error::from)?;
        debug!(path, baud, "serial transport opened");
        Ok(Self {
            port: Some(port),
            path: path.to_string(),
        })
    }

    fn port(&mut self) -> PtuResult<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or_else(|| {
            PtuError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                format!("serial transport on {} is closed", self.path),
            ))
        })
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, buf: &[u8], timeout: Duration) -> PtuResult<()> {
        let port = self.port()?;
        port.set_timeout(nonzero(timeout)).map_err(io::Error::from)?;
        match port.write_all(buf) {
            Ok(()) => Ok(()),
            Err(e) if is_timeout(&e) => Err(PtuError::Timeout),
            Err(e) => Err(e.into()),
        }
    }

    fn read_some(&mut self, buf: &mut [u8], timeout: Duration) -> PtuResult<usize> {
        let port = self.port()?;
        port.set_timeout(nonzero(timeout)).map_err(io::Error::from)?;
        match port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if is_timeout(&e) => Err(PtuError::Timeout),
            Err(e) => Err(e.into()),
        }
    }

    fn close(&mut self) -> PtuResult<()> {
        self.port = None;
        Ok(())
    }
}

/// OS timeout APIs reject a zero duration.
fn nonzero(timeout: Duration) -> Duration {
    timeout.max(Duration::from_millis(1))
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Receive-side accumulator owned by the session between operations.
///
/// Feeds its current contents to the injected [`FrameLocator`] after every
/// read, applying the returned action until a full frame is available or the
/// deadline passes. Framing is idempotent: a stale partial frame left by a
/// timed-out read is completed or discarded on the next call.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop any buffered bytes.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Read one complete frame, CR included.
    pub fn read_frame(
        &mut self,
        transport: &mut dyn Transport,
        locator: &dyn FrameLocator,
        timeout: Duration,
    ) -> PtuResult<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        loop {
            loop {
                match locator.locate_frame(&self.buf) {
                    FrameStep::Consumed(n) => return Ok(self.buf.drain(..n).collect()),
                    FrameStep::Discard(n) => {
                        debug!(discarded = n, "dropping noise ahead of frame");
                        self.buf.drain(..n);
                    }
                    FrameStep::NeedMoreData => break,
                }
            }

            if self.buf.len() > MAX_PACKET_SIZE {
                self.buf.clear();
                return Err(PtuError::MalformedFrame(format!(
                    "no frame within {MAX_PACKET_SIZE} buffered bytes"
                )));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(PtuError::Timeout);
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = transport.read_some(&mut chunk, remaining)?;
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}
