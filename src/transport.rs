//! Stream transport layer.
//!
//! The transport knows about connections and bytes, nothing about Modbus.
//! [`Transport`] is the capability the engine is written against;
//! [`TcpTransport`] is the implementation used with real devices.
//!
//! # Constants
//!
//! - [`DEFAULT_MODBUS_PORT`] - Modbus TCP port (502)
//! - [`DEFAULT_TIMEOUT`] - Default timeout (5 seconds)
//! - [`MAX_FRAME_SIZE`] - Largest Modbus TCP frame (260 bytes)

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use tracing::{debug, info};

/// Default Modbus TCP port.
pub const DEFAULT_MODBUS_PORT: u16 = 502;

/// Default timeout for connect and response.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum Modbus TCP frame size (MBAP prefix + unit id + 253-byte PDU).
pub const MAX_FRAME_SIZE: usize = 260;

/// Socket timeouts of zero mean "block forever"; never hand one out.
const MIN_SOCKET_TIMEOUT: Duration = Duration::from_millis(1);

/// A bidirectional byte channel to one device.
///
/// Implementations must report an elapsed receive deadline as an
/// [`io::Error`] of kind `WouldBlock` or `TimedOut`, and a peer that closed
/// the connection as `Ok(0)`.
pub trait Transport {
    /// Establishes the connection, replacing any previous one.
    fn connect(&mut self, timeout: Duration) -> io::Result<()>;

    /// Sends the whole buffer.
    fn send(&mut self, data: &[u8]) -> io::Result<()>;

    /// Receives whatever is available, waiting at most `timeout`.
    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Closes the connection. Closing an unconnected transport is a no-op.
    fn close(&mut self) -> io::Result<()>;

    /// Returns whether a connection is currently held.
    fn is_connected(&self) -> bool;
}

/// TCP transport for Modbus communication.
///
/// Holds at most one [`TcpStream`]; it is created by [`Transport::connect`]
/// and dropped by [`Transport::close`].
///
/// # Example
///
/// ```no_run
/// use iob16_modbus::{TcpTransport, Transport};
/// use std::time::Duration;
///
/// let mut transport = TcpTransport::new("10.0.2.218:502".parse().unwrap());
/// transport.connect(Duration::from_secs(5)).unwrap();
/// assert!(transport.is_connected());
/// ```
pub struct TcpTransport {
    stream: Option<TcpStream>,
    remote_addr: SocketAddr,
}

impl TcpTransport {
    /// Creates an unconnected transport for the given device address.
    pub fn new(remote_addr: SocketAddr) -> Self {
        Self {
            stream: None,
            remote_addr,
        }
    }

    /// Returns the remote device address.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    fn stream(&mut self) -> io::Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "transport is not connected"))
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self, timeout: Duration) -> io::Result<()> {
        self.stream = None;

        let timeout = timeout.max(MIN_SOCKET_TIMEOUT);
        let stream = TcpStream::connect_timeout(&self.remote_addr, timeout)?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(timeout))?;

        info!(addr = %self.remote_addr, "connected");
        self.stream = Some(stream);
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream()?.write_all(data)
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        let stream = self.stream()?;
        stream.set_read_timeout(Some(timeout.max(MIN_SOCKET_TIMEOUT)))?;
        stream.read(buf)
    }

    fn close(&mut self) -> io::Result<()> {
        match self.stream.take() {
            Some(stream) => {
                debug!(addr = %self.remote_addr, "closing connection");
                match stream.shutdown(Shutdown::Both) {
                    // Already torn down by the peer
                    Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
                    other => other,
                }
            }
            None => Ok(()),
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("remote_addr", &self.remote_addr)
            .field(
                "local_addr",
                &self.stream.as_ref().and_then(|s| s.local_addr().ok()),
            )
            .finish()
    }
}
