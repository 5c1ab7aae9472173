//! Scripted in-memory transport for tests.
//!
//! [`MockTransport`] plays the device side of the conversation. Each frame
//! sent consumes one [`MockStep`] from the script; when the script is empty
//! the mock behaves like a healthy module (writes are echoed, reads return
//! zeroed registers).
//!
//! # Example
//!
//! Available to downstream crates with the `mock` feature.
//!
//! ```
//! # #[cfg(feature = "mock")]
//! # fn main() {
//! use iob16_modbus::mock::{MockStep, MockTransport};
//! use iob16_modbus::{Client, ClientConfig};
//! use std::net::Ipv4Addr;
//!
//! let transport = MockTransport::with_steps([MockStep::Registers(vec![0x0005])]);
//! let config = ClientConfig::new(Ipv4Addr::LOCALHOST, 1);
//! let mut client = Client::with_transport(config, transport);
//!
//! let inputs = client.read_input_states().unwrap();
//! assert!(inputs[0] && inputs[2]);
//! assert_eq!(client.transport().send_count(), 1);
//! # }
//! # #[cfg(not(feature = "mock"))]
//! # fn main() {}
//! ```

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use crate::frame::{EXCEPTION_FLAG, FN_READ_HOLDING_REGISTERS};
use crate::request::REQUEST_FRAME_SIZE;
use crate::transport::Transport;

/// What the mock does with one request frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockStep {
    /// Reply with the request frame itself (a valid write response).
    Echo,
    /// Reply with a valid read response carrying these values.
    Registers(Vec<u16>),
    /// Reply with an exception response carrying this code.
    Exception(u8),
    /// Reply with an echo whose transaction id is off by one.
    WrongTransactionId,
    /// Deliver these bytes verbatim.
    Raw(Vec<u8>),
    /// Deliver these bytes across several receives.
    Chunked(Vec<Vec<u8>>),
    /// Fail the send with this error kind.
    SendError(io::ErrorKind),
    /// Accept the request and never answer.
    NoReply,
    /// Accept the request, then report the peer closing the connection.
    Hangup,
}

#[derive(Debug)]
enum Pending {
    Bytes(Vec<u8>),
    Eof,
}

/// In-memory [`Transport`] with a scripted device behind it.
#[derive(Debug, Default)]
pub struct MockTransport {
    script: VecDeque<MockStep>,
    connect_failures: VecDeque<io::ErrorKind>,
    pending: VecDeque<Pending>,
    sent: Vec<Vec<u8>>,
    connected: bool,
    connects: usize,
    closes: usize,
}

impl MockTransport {
    /// Creates a mock that answers like a healthy module.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock with the given script.
    pub fn with_steps(steps: impl IntoIterator<Item = MockStep>) -> Self {
        Self {
            script: steps.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Appends a step to the script.
    pub fn push(&mut self, step: MockStep) {
        self.script.push_back(step);
    }

    /// Makes the next connect attempt fail with `kind`.
    pub fn fail_next_connect(&mut self, kind: io::ErrorKind) {
        self.connect_failures.push_back(kind);
    }

    /// Every frame passed to `send`, including failed sends.
    pub fn sent_frames(&self) -> &[Vec<u8>] {
        &self.sent
    }

    /// Number of send attempts.
    pub fn send_count(&self) -> usize {
        self.sent.len()
    }

    /// Number of connect attempts, successful or not.
    pub fn connect_count(&self) -> usize {
        self.connects
    }

    /// Number of close calls on a held connection.
    pub fn close_count(&self) -> usize {
        self.closes
    }

    fn reply_to(request: &[u8], step: MockStep) -> Vec<Pending> {
        match step {
            MockStep::Echo => vec![Pending::Bytes(request.to_vec())],
            MockStep::WrongTransactionId => {
                let mut reply = request.to_vec();
                let tid = u16::from_be_bytes([reply[0], reply[1]]).wrapping_add(1);
                reply[..2].copy_from_slice(&tid.to_be_bytes());
                vec![Pending::Bytes(reply)]
            }
            MockStep::Registers(values) => {
                let byte_count = (values.len() * 2) as u8;
                let mut reply = request[..4].to_vec();
                reply.extend_from_slice(&(3 + u16::from(byte_count)).to_be_bytes());
                reply.extend_from_slice(&[request[6], FN_READ_HOLDING_REGISTERS, byte_count]);
                for value in values {
                    reply.extend_from_slice(&value.to_be_bytes());
                }
                vec![Pending::Bytes(reply)]
            }
            MockStep::Exception(code) => {
                let mut reply = request[..4].to_vec();
                reply.extend_from_slice(&[0x00, 0x03, request[6], request[7] | EXCEPTION_FLAG, code]);
                vec![Pending::Bytes(reply)]
            }
            MockStep::Raw(bytes) => vec![Pending::Bytes(bytes)],
            MockStep::Chunked(chunks) => chunks.into_iter().map(Pending::Bytes).collect(),
            MockStep::NoReply | MockStep::SendError(_) => Vec::new(),
            MockStep::Hangup => vec![Pending::Eof],
        }
    }

    fn default_step(request: &[u8]) -> MockStep {
        if request[7] == FN_READ_HOLDING_REGISTERS {
            let count = u16::from_be_bytes([request[10], request[11]]);
            MockStep::Registers(vec![0; count as usize])
        } else {
            MockStep::Echo
        }
    }
}

impl Transport for MockTransport {
    fn connect(&mut self, _timeout: Duration) -> io::Result<()> {
        self.connects += 1;
        self.pending.clear();
        if let Some(kind) = self.connect_failures.pop_front() {
            self.connected = false;
            return Err(io::Error::new(kind, "scripted connect failure"));
        }
        self.connected = true;
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        if !self.connected {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "mock not connected"));
        }
        self.sent.push(data.to_vec());
        if data.len() != REQUEST_FRAME_SIZE {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "unexpected frame size"));
        }

        let step = self
            .script
            .pop_front()
            .unwrap_or_else(|| Self::default_step(data));
        if let MockStep::SendError(kind) = step {
            return Err(io::Error::new(kind, "scripted send failure"));
        }
        self.pending.extend(Self::reply_to(data, step));
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
        if !self.connected {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "mock not connected"));
        }
        match self.pending.pop_front() {
            Some(Pending::Bytes(mut bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    self.pending.push_front(Pending::Bytes(bytes.split_off(n)));
                }
                Ok(n)
            }
            Some(Pending::Eof) => Ok(0),
            None => Err(io::Error::new(io::ErrorKind::WouldBlock, "no scripted reply")),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        if self.connected {
            self.closes += 1;
        }
        self.connected = false;
        self.pending.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
