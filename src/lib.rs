//! # 25IOB16 Modbus TCP Client
//!
//! A Rust library for driving a 16-channel Ethernet I/O module (outputs
//! and inputs) over Modbus TCP.
//!
//! The library speaks the two functions the module needs, write single
//! register (0x06) and read holding registers (0x03), and layers a channel
//! abstraction and a retry-with-reconnect session on top.
//!
//! ## Features
//!
//! - **Channel-oriented** — `turn_on(3)`, `toggle(4)`, `read_input_states()`
//! - **Resilient** — bounded retries, reconnect between attempts, cooperative cancellation
//! - **Strict codec** — every response is checked against the request that produced it
//! - **No panics** — all errors returned as `Result<T, Error>`
//! - **Pluggable transport** — TCP by default, scripted mock for tests
//!
//! ## Quick Start
//!
//! ```no_run
//! use iob16_modbus::{Client, ClientConfig};
//! use std::net::Ipv4Addr;
//!
//! fn main() -> iob16_modbus::Result<()> {
//!     let config = ClientConfig::new(Ipv4Addr::new(10, 0, 2, 218), 1);
//!     let mut client = Client::new(config);
//!     client.connect()?;
//!
//!     // Channel 3 on, channel 4 inverted
//!     client.turn_on(3)?;
//!     client.toggle(4)?;
//!
//!     // Output and input states, index 0 = channel 1
//!     let outputs = client.read_output_states()?;
//!     let inputs = client.read_input_states()?;
//!     println!("outputs: {:?}", outputs);
//!     println!("inputs:  {:?}", inputs);
//!
//!     client.turn_off_all()?;
//!     client.disconnect();
//!     Ok(())
//! }
//! ```
//!
//! ## Register Map
//!
//! | Register | Access | Meaning |
//! |----------|:------:|---------|
//! | 0-15 | W | Control word for channel N+1 (ON `0x0100`, OFF `0x0200`, TOGGLE `0x0300`) |
//! | 0 | W | All channels (ALL ON `0x0700`, ALL OFF `0x0800`) |
//! | 0-15 | R | Output state of channel N+1, non-zero = ON |
//! | `0x00C0` | R | Input bitmask, bit N = channel N+1 (configurable) |
//! | `0x00FA` | R/W | Internal logic mode (see [`LogicMode`]) |
//!
//! ## Layers
//!
//! 1. [`frame`](crate::MbapHeader), [`request`](crate::Request) and
//!    [`decode_response`]: pure encode/decode of MBAP frames
//! 2. [`TransactionManager`]: one request, one correlated response, with a
//!    deadline
//! 3. [`Session`]: connection lifecycle and the retry state machine
//! 4. [`Client`]: channels and registers
//!
//! ## Error Handling
//!
//! ```no_run
//! use iob16_modbus::{Client, ClientConfig, Error};
//! use std::net::Ipv4Addr;
//!
//! let mut client = Client::new(ClientConfig::new(Ipv4Addr::new(10, 0, 2, 218), 1));
//!
//! match client.turn_on(1) {
//!     Ok(()) => println!("CH1 on"),
//!     Err(Error::InvalidChannel { channel, max }) => {
//!         println!("channel {} outside 1-{}", channel, max);
//!     }
//!     Err(Error::Operation(e)) => {
//!         println!("gave up after {} attempts: {}", e.attempts(), e.last_error());
//!     }
//!     Err(e) => println!("error: {}", e),
//! }
//! ```
//!
//! ## Retry Policy
//!
//! ```no_run
//! use iob16_modbus::{ClientConfig, RetryPolicy};
//! use std::net::Ipv4Addr;
//! use std::time::Duration;
//!
//! let config = ClientConfig::new(Ipv4Addr::new(10, 0, 2, 218), 1)
//!     .with_port(502)                                        // default: 502
//!     .with_timeout(Duration::from_secs(2))                  // default: 5s
//!     .with_retry(RetryPolicy::new(5, Duration::from_millis(500))); // default: 3 x 1s
//! ```
//!
//! ## Logging
//!
//! The library emits [`tracing`] events: frames at `debug`, connects at
//! `info`, failed attempts at `warn` and exhausted retries at `error`.
//! Install a subscriber to see them.

#![warn(clippy::all)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod channel;
mod client;
mod error;
mod frame;
mod request;
mod response;
mod session;
mod transaction;
mod transport;
pub mod utils;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use channel::{
    Channel, ControlValue, LogicMode, LogicModeReading, ALL_CHANNELS_REGISTER, CHANNEL_COUNT,
    DEFAULT_INPUT_STATUS_REGISTER, LOGIC_MODE_REGISTER, OUTPUT_STATUS_START,
};
pub use client::{Client, ClientConfig};
pub use error::{
    exception_description, Error, FrameError, OperationError, Result, TransactionError,
};
pub use frame::{
    frame_length, MbapHeader, EXCEPTION_FLAG, FN_READ_HOLDING_REGISTERS, FN_WRITE_SINGLE_REGISTER,
    MBAP_HEADER_SIZE, PROTOCOL_ID,
};
pub use request::{
    encode_read_request, encode_write_request, Request, Transaction, MAX_READ_REGISTERS,
    REQUEST_FRAME_SIZE,
};
pub use response::{decode_response, Response, ResponseData};
pub use session::{CancelHandle, RetryPolicy, Session, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
pub use transaction::TransactionManager;
pub use transport::{TcpTransport, Transport, DEFAULT_MODBUS_PORT, DEFAULT_TIMEOUT, MAX_FRAME_SIZE};
