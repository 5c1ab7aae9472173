//! High-level client for the 16-channel Modbus TCP I/O module.
//!
//! This module provides the [`Client`] struct, which maps channel numbers,
//! control commands and input bitmasks onto register reads and writes.
//!
//! # Overview
//!
//! The client handles:
//! - Channel validation before any I/O
//! - Translation of ON/OFF/TOGGLE commands into control words
//! - Decoding of output state registers and the input bitmask
//! - Retry with reconnect, through the underlying [`Session`]
//!
//! # Example
//!
//! ```no_run
//! use iob16_modbus::{Client, ClientConfig};
//! use std::net::Ipv4Addr;
//!
//! let config = ClientConfig::new(Ipv4Addr::new(10, 0, 2, 218), 1);
//! let mut client = Client::new(config);
//! client.connect()?;
//!
//! client.turn_on(3)?;
//! client.toggle(4)?;
//!
//! let outputs = client.read_output_states()?;
//! println!("CH3 is {}", if outputs[2] { "ON" } else { "OFF" });
//!
//! let inputs = client.read_input_states()?;
//! println!("active inputs: {:?}", iob16_modbus::utils::active_channels(&inputs));
//!
//! client.turn_off_all()?;
//! # Ok::<(), iob16_modbus::Error>(())
//! ```
//!
//! # Configuration
//!
//! The [`ClientConfig`] struct allows customization of:
//! - Device IP address and port
//! - Unit id, timeout and retry policy
//! - The register holding the input bitmask
//! - How many channels are wired (4-port variants of the module)
//!
//! # Thread Safety
//!
//! Every operation takes `&mut self` and blocks until the device answers or
//! the retry budget is spent. Use [`Client::cancel_handle`] to stop a
//! retrying operation from another thread.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tracing::debug;

use crate::channel::{
    Channel, ControlValue, LogicMode, LogicModeReading, ALL_CHANNELS_REGISTER, CHANNEL_COUNT,
    DEFAULT_INPUT_STATUS_REGISTER, LOGIC_MODE_REGISTER, OUTPUT_STATUS_START,
};
use crate::error::{Error, Result};
use crate::request::Request;
use crate::session::{CancelHandle, RetryPolicy, Session};
use crate::transport::{TcpTransport, Transport, DEFAULT_MODBUS_PORT, DEFAULT_TIMEOUT};
use crate::utils::word_to_bits;

/// Configuration for creating a client.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClientConfig {
    /// Device address.
    pub device_addr: SocketAddr,
    /// Modbus unit id of the module.
    pub unit_id: u8,
    /// Connect and response timeout per attempt.
    pub timeout: Duration,
    /// Attempts per operation and delay between them.
    pub retry: RetryPolicy,
    /// Register holding the input bitmask.
    pub input_status_address: u16,
    /// Number of wired channels (1-16).
    pub channel_count: u8,
}

impl ClientConfig {
    /// Creates a configuration with the module's defaults.
    ///
    /// Port 502, 5 second timeout, 3 attempts one second apart, inputs at
    /// register `0x00C0`, 16 channels.
    ///
    /// # Example
    ///
    /// ```
    /// use iob16_modbus::ClientConfig;
    /// use std::net::Ipv4Addr;
    ///
    /// let config = ClientConfig::new(Ipv4Addr::new(10, 0, 2, 218), 1);
    /// assert_eq!(config.device_addr.port(), 502);
    /// assert_eq!(config.channel_count, 16);
    /// ```
    pub fn new(device_ip: Ipv4Addr, unit_id: u8) -> Self {
        Self {
            device_addr: SocketAddr::from((device_ip, DEFAULT_MODBUS_PORT)),
            unit_id,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            input_status_address: DEFAULT_INPUT_STATUS_REGISTER,
            channel_count: CHANNEL_COUNT,
        }
    }

    /// Sets a custom device port (default is 502).
    pub fn with_port(mut self, port: u16) -> Self {
        self.device_addr.set_port(port);
        self
    }

    /// Sets a custom timeout (default is 5 seconds).
    ///
    /// # Example
    ///
    /// ```
    /// use iob16_modbus::ClientConfig;
    /// use std::net::Ipv4Addr;
    /// use std::time::Duration;
    ///
    /// let config = ClientConfig::new(Ipv4Addr::new(10, 0, 2, 218), 1)
    ///     .with_timeout(Duration::from_secs(2));
    /// ```
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Reads the input bitmask from another register (default is `0x00C0`).
    ///
    /// [`Client::read_input_states`] needs one register carrying all 16
    /// inputs as bits. The module's register map does not fix that address:
    /// `0x00C0` is the default because it is the bitmask candidate among
    /// the addresses probed while switching inputs (16, 32, ..., 256).
    /// Registers 16-31 hold one input per register rather than a bitmask
    /// and cannot be used here; read them with [`Client::read_register`].
    /// Set the address your firmware reports before relying on inputs.
    pub fn with_input_status_address(mut self, address: u16) -> Self {
        self.input_status_address = address;
        self
    }

    /// Limits the channels the client accepts. Clamped to 1-16.
    ///
    /// # Example
    ///
    /// ```
    /// use iob16_modbus::ClientConfig;
    /// use std::net::Ipv4Addr;
    ///
    /// let config = ClientConfig::new(Ipv4Addr::new(10, 0, 2, 218), 1).with_channel_count(4);
    /// assert_eq!(config.channel_count, 4);
    ///
    /// let config = config.with_channel_count(40);
    /// assert_eq!(config.channel_count, 16);
    /// ```
    pub fn with_channel_count(mut self, count: u8) -> Self {
        self.channel_count = count.clamp(1, CHANNEL_COUNT);
        self
    }
}

/// Client for one I/O module.
///
/// Each operation is one logical request, retried with reconnect according
/// to the configured [`RetryPolicy`].
///
/// # Example
///
/// ```no_run
/// use iob16_modbus::{Client, ClientConfig, LogicMode};
/// use std::net::Ipv4Addr;
///
/// let mut client = Client::new(ClientConfig::new(Ipv4Addr::new(10, 0, 2, 218), 1));
///
/// client.set_logic_mode(LogicMode::Disabled).unwrap();
/// client.turn_on_all().unwrap();
/// let on = client.read_output_state(1).unwrap();
/// assert!(on);
/// ```
pub struct Client<T: Transport = TcpTransport> {
    session: Session<T>,
    config: ClientConfig,
}

impl Client<TcpTransport> {
    /// Creates a client over TCP. No connection is made until the first
    /// operation or an explicit [`Client::connect`].
    pub fn new(config: ClientConfig) -> Self {
        let transport = TcpTransport::new(config.device_addr);
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> Client<T> {
    /// Creates a client over a caller-supplied transport.
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        let session = Session::new(transport, config.unit_id)
            .with_timeout(config.timeout)
            .with_retry_policy(config.retry);
        Self { session, config }
    }

    /// Connects to the device. Does nothing if already connected.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the connection cannot be established.
    pub fn connect(&mut self) -> Result<()> {
        self.session.connect()
    }

    /// Closes the connection.
    pub fn disconnect(&mut self) {
        self.session.disconnect();
    }

    /// Returns whether a connection is currently held.
    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Switches a channel on.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `channel` is outside `1..=channel_count` (nothing is sent)
    /// - every attempt fails
    ///
    /// # Example
    ///
    /// ```no_run
    /// use iob16_modbus::{Client, ClientConfig};
    /// use std::net::Ipv4Addr;
    ///
    /// let mut client = Client::new(ClientConfig::new(Ipv4Addr::new(10, 0, 2, 218), 1));
    /// client.turn_on(1).unwrap();
    /// ```
    pub fn turn_on(&mut self, channel: u8) -> Result<()> {
        self.command(channel, ControlValue::On)
    }

    /// Switches a channel off.
    ///
    /// # Errors
    ///
    /// Same as [`Client::turn_on`].
    pub fn turn_off(&mut self, channel: u8) -> Result<()> {
        self.command(channel, ControlValue::Off)
    }

    /// Inverts a channel.
    ///
    /// # Errors
    ///
    /// Same as [`Client::turn_on`].
    pub fn toggle(&mut self, channel: u8) -> Result<()> {
        self.command(channel, ControlValue::Toggle)
    }

    /// Switches every channel on with a single write.
    pub fn turn_on_all(&mut self) -> Result<()> {
        self.broadcast(ControlValue::AllOn)
    }

    /// Switches every channel off with a single write.
    pub fn turn_off_all(&mut self) -> Result<()> {
        self.broadcast(ControlValue::AllOff)
    }

    /// Reads the 16 output state registers. Index `i` is channel `i + 1`.
    pub fn read_output_states(&mut self) -> Result<[bool; 16]> {
        let raw = self.read_output_raw()?;
        Ok(raw.map(|value| value != 0))
    }

    /// Reads the 16 output state registers without interpreting them.
    pub fn read_output_raw(&mut self) -> Result<[u16; 16]> {
        let values = self.read_registers(OUTPUT_STATUS_START, u16::from(CHANNEL_COUNT))?;
        Ok(std::array::from_fn(|i| values.get(i).copied().unwrap_or_default()))
    }

    /// Reads the output state of one channel.
    ///
    /// # Errors
    ///
    /// Same as [`Client::turn_on`].
    pub fn read_output_state(&mut self, channel: u8) -> Result<bool> {
        let channel = self.channel(channel)?;
        Ok(self.read_register(channel.register())? != 0)
    }

    /// Reads the input bitmask and expands it. Index `i` is channel `i + 1`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use iob16_modbus::{Client, ClientConfig};
    /// use std::net::Ipv4Addr;
    ///
    /// let mut client = Client::new(ClientConfig::new(Ipv4Addr::new(10, 0, 2, 218), 1));
    /// let inputs = client.read_input_states().unwrap();
    /// for (index, active) in inputs.iter().enumerate() {
    ///     if *active {
    ///         println!("input {} active", index + 1);
    ///     }
    /// }
    /// ```
    pub fn read_input_states(&mut self) -> Result<[bool; 16]> {
        Ok(word_to_bits(self.read_input_raw()?))
    }

    /// Reads the raw input bitmask.
    pub fn read_input_raw(&mut self) -> Result<u16> {
        self.read_register(self.config.input_status_address)
    }

    /// Reads the module's internal logic mode.
    ///
    /// Values outside the documented modes come back as
    /// [`LogicModeReading::Unknown`].
    pub fn read_logic_mode(&mut self) -> Result<LogicModeReading> {
        let raw = self.read_register(LOGIC_MODE_REGISTER)?;
        Ok(LogicModeReading::from_raw(raw))
    }

    /// Sets the module's internal logic mode.
    pub fn set_logic_mode(&mut self, mode: LogicMode) -> Result<()> {
        debug!(unit = self.config.unit_id, mode = %mode, "setting logic mode");
        self.write_register(LOGIC_MODE_REGISTER, mode.code())
    }

    /// Reads one holding register.
    pub fn read_register(&mut self, address: u16) -> Result<u16> {
        let values = self.read_registers(address, 1)?;
        Ok(values.first().copied().unwrap_or_default())
    }

    /// Writes one holding register, bypassing the channel mapping.
    pub fn write_register(&mut self, address: u16, value: u16) -> Result<()> {
        self.session
            .run_operation(&Request::write(address, value))
            .map(|_| ())
    }

    /// Returns a handle that cancels a retrying operation.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.session.cancel_handle()
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the device unit id.
    pub fn unit_id(&self) -> u8 {
        self.config.unit_id
    }

    /// Returns the underlying session.
    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    /// Returns the underlying transport.
    pub fn transport(&self) -> &T {
        self.session.transport()
    }

    /// Returns the underlying transport mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        self.session.transport_mut()
    }

    fn channel(&self, number: u8) -> Result<Channel> {
        let channel = Channel::new(number)
            .map_err(|_| Error::invalid_channel(number, self.config.channel_count))?;
        if number > self.config.channel_count {
            return Err(Error::invalid_channel(number, self.config.channel_count));
        }
        Ok(channel)
    }

    fn command(&mut self, channel: u8, value: ControlValue) -> Result<()> {
        let channel = self.channel(channel)?;
        debug!(unit = self.config.unit_id, %channel, command = %value, "channel command");
        self.write_register(channel.register(), value.code())
    }

    fn broadcast(&mut self, value: ControlValue) -> Result<()> {
        debug!(unit = self.config.unit_id, command = %value, "all-channels command");
        self.write_register(ALL_CHANNELS_REGISTER, value.code())
    }

    /// Returns exactly `count` values: replies with any other register
    /// count, or to a different function, fail inside the session.
    fn read_registers(&mut self, start: u16, count: u16) -> Result<Vec<u16>> {
        let data = self.session.run_operation(&Request::read(start, count)?)?;
        Ok(data.into_registers().unwrap_or_default())
    }
}

impl<T: Transport + std::fmt::Debug> std::fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("session", &self.session)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FrameError;
    use crate::frame::{FN_READ_HOLDING_REGISTERS, FN_WRITE_SINGLE_REGISTER};
    use crate::mock::{MockStep, MockTransport};
    use std::io;

    fn config() -> ClientConfig {
        ClientConfig::new(Ipv4Addr::new(127, 0, 0, 1), 1)
            .with_timeout(Duration::from_millis(20))
            .with_retry(RetryPolicy::new(3, Duration::ZERO))
    }

    fn client(steps: Vec<MockStep>) -> Client<MockTransport> {
        Client::with_transport(config(), MockTransport::with_steps(steps))
    }

    /// (function, address, value_or_count) of a request frame.
    fn decode_sent(frame: &[u8]) -> (u8, u16, u16) {
        assert_eq!(frame.len(), 12);
        (
            frame[7],
            u16::from_be_bytes([frame[8], frame[9]]),
            u16::from_be_bytes([frame[10], frame[11]]),
        )
    }

    #[test]
    fn test_client_config_new() {
        let config = ClientConfig::new(Ipv4Addr::new(10, 0, 2, 218), 7);

        assert_eq!(config.device_addr.ip(), Ipv4Addr::new(10, 0, 2, 218));
        assert_eq!(config.device_addr.port(), DEFAULT_MODBUS_PORT);
        assert_eq!(config.unit_id, 7);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.input_status_address, 0x00C0);
        assert_eq!(config.channel_count, 16);
    }

    #[test]
    fn test_client_config_builders() {
        let config = ClientConfig::new(Ipv4Addr::new(10, 0, 2, 218), 1)
            .with_port(1502)
            .with_input_status_address(0x0010)
            .with_channel_count(0);

        assert_eq!(config.device_addr.port(), 1502);
        assert_eq!(config.input_status_address, 0x0010);
        assert_eq!(config.channel_count, 1);
    }

    #[test]
    fn test_client_starts_disconnected() {
        let client = Client::new(ClientConfig::new(Ipv4Addr::new(127, 0, 0, 1), 1));
        assert!(!client.is_connected());
        assert_eq!(client.unit_id(), 1);
    }

    #[test]
    fn test_turn_on_every_channel() {
        for channel in 1..=16u8 {
            let mut client = client(vec![]);
            client.turn_on(channel).unwrap();

            let sent = client.transport().sent_frames();
            assert_eq!(sent.len(), 1);
            assert_eq!(
                decode_sent(&sent[0]),
                (FN_WRITE_SINGLE_REGISTER, u16::from(channel - 1), 0x0100)
            );
        }
    }

    #[test]
    fn test_turn_off_and_toggle_values() {
        let mut client = client(vec![]);
        client.turn_off(2).unwrap();
        client.toggle(16).unwrap();

        let sent = client.transport().sent_frames();
        assert_eq!(decode_sent(&sent[0]), (FN_WRITE_SINGLE_REGISTER, 1, 0x0200));
        assert_eq!(decode_sent(&sent[1]), (FN_WRITE_SINGLE_REGISTER, 15, 0x0300));
    }

    #[test]
    fn test_invalid_channel_sends_nothing() {
        let mut client = client(vec![]);
        for channel in [0u8, 17, 255] {
            match client.turn_on(channel) {
                Err(Error::InvalidChannel { channel: c, max }) => {
                    assert_eq!(c, channel);
                    assert_eq!(max, 16);
                }
                other => panic!("Expected InvalidChannel, got {:?}", other),
            }
        }
        assert!(client.read_output_state(0).is_err());
        assert_eq!(client.transport().send_count(), 0);
        assert_eq!(client.transport().connect_count(), 0);
    }

    #[test]
    fn test_channel_count_limits_channels() {
        let mut client = Client::with_transport(config().with_channel_count(4), MockTransport::new());

        client.toggle(4).unwrap();
        match client.toggle(5) {
            Err(Error::InvalidChannel { channel: 5, max: 4 }) => {}
            other => panic!("Expected InvalidChannel, got {:?}", other),
        }
        assert_eq!(client.transport().send_count(), 1);
    }

    #[test]
    fn test_all_channels_single_write() {
        let mut client = client(vec![]);

        client.turn_on_all().unwrap();
        assert_eq!(client.transport().send_count(), 1);
        assert_eq!(
            decode_sent(&client.transport().sent_frames()[0]),
            (FN_WRITE_SINGLE_REGISTER, 0, 0x0700)
        );

        client.turn_off_all().unwrap();
        assert_eq!(client.transport().send_count(), 2);
        assert_eq!(
            decode_sent(&client.transport().sent_frames()[1]),
            (FN_WRITE_SINGLE_REGISTER, 0, 0x0800)
        );
    }

    #[test]
    fn test_read_output_states() {
        let mut values = vec![0u16; 16];
        values[0] = 0x0001;
        values[9] = 0x0100;
        let mut client = client(vec![MockStep::Registers(values)]);

        let states = client.read_output_states().unwrap();
        assert!(states[0]);
        assert!(states[9]);
        assert_eq!(states.iter().filter(|on| **on).count(), 2);
        assert_eq!(
            decode_sent(&client.transport().sent_frames()[0]),
            (FN_READ_HOLDING_REGISTERS, 0, 16)
        );
    }

    #[test]
    fn test_read_output_raw() {
        let values: Vec<u16> = (0..16).collect();
        let mut client = client(vec![MockStep::Registers(values)]);

        let raw = client.read_output_raw().unwrap();
        assert_eq!(raw[15], 15);
        assert_eq!(raw[0], 0);
    }

    #[test]
    fn test_read_output_state_single_register() {
        let mut client = client(vec![MockStep::Registers(vec![0x0001])]);

        assert!(client.read_output_state(6).unwrap());
        assert_eq!(
            decode_sent(&client.transport().sent_frames()[0]),
            (FN_READ_HOLDING_REGISTERS, 5, 1)
        );
    }

    #[test]
    fn test_read_input_states() {
        let mut client = client(vec![MockStep::Registers(vec![0b0000_0000_0000_0101])]);

        let inputs = client.read_input_states().unwrap();
        assert!(inputs[0]);
        assert!(!inputs[1]);
        assert!(inputs[2]);
        assert_eq!(inputs.iter().filter(|on| **on).count(), 2);
        assert_eq!(
            decode_sent(&client.transport().sent_frames()[0]),
            (FN_READ_HOLDING_REGISTERS, 0x00C0, 1)
        );
    }

    #[test]
    fn test_input_address_is_configurable() {
        let config = config().with_input_status_address(0x0010);
        let mut client = Client::with_transport(config, MockTransport::new());

        assert_eq!(client.read_input_raw().unwrap(), 0);
        assert_eq!(
            decode_sent(&client.transport().sent_frames()[0]),
            (FN_READ_HOLDING_REGISTERS, 0x0010, 1)
        );
    }

    #[test]
    fn test_logic_mode() {
        let mut client = client(vec![
            MockStep::Registers(vec![0x0005]),
            MockStep::Registers(vec![0x0042]),
        ]);

        assert_eq!(
            client.read_logic_mode().unwrap(),
            LogicModeReading::Known(LogicMode::Direct)
        );
        assert_eq!(client.read_logic_mode().unwrap(), LogicModeReading::Unknown(0x0042));

        client.set_logic_mode(LogicMode::Disabled).unwrap();
        assert_eq!(
            decode_sent(&client.transport().sent_frames()[2]),
            (FN_WRITE_SINGLE_REGISTER, 0x00FA, 0)
        );
    }

    #[test]
    fn test_retry_is_transparent() {
        let mut client = client(vec![
            MockStep::SendError(io::ErrorKind::BrokenPipe),
            MockStep::NoReply,
        ]);

        client.turn_on(1).unwrap();
        assert_eq!(client.transport().send_count(), 3);
        assert_eq!(client.transport().connect_count(), 3);
    }

    #[test]
    fn test_exhausted_retries() {
        let mut client = client(vec![
            MockStep::Exception(0x04),
            MockStep::Exception(0x04),
            MockStep::Exception(0x04),
        ]);

        let err = client.turn_off_all().unwrap_err();
        let op = err.as_operation().expect("operation error");
        assert_eq!(op.attempts(), 3);
        assert_eq!(
            op.last_error().as_frame(),
            Some(&FrameError::exception(FN_WRITE_SINGLE_REGISTER, 0x04))
        );
    }

    #[test]
    fn test_short_register_reply_is_retried() {
        let mut client = client(vec![
            MockStep::Registers(vec![1; 15]),
            MockStep::Registers(vec![1; 15]),
            MockStep::Registers(vec![1; 15]),
        ]);

        let err = client.read_output_raw().unwrap_err();
        let op = err.as_operation().expect("operation error");
        assert_eq!(op.attempts(), 3);
        assert_eq!(
            op.last_error().as_frame(),
            Some(&FrameError::mismatch("register_count", 16, 15))
        );
    }

    #[test]
    fn test_write_echo_to_read_is_rejected() {
        // A write echo answering a single-register read
        let mut client = Client::with_transport(
            config().with_retry(RetryPolicy::no_retry()),
            MockTransport::with_steps(vec![MockStep::Raw(
                hex::decode("000000000006010600c00005").unwrap(),
            )]),
        );

        let err = client.read_input_raw().unwrap_err();
        assert_eq!(
            err.as_operation().and_then(|op| op.last_error().as_frame()),
            Some(&FrameError::mismatch("function_code", 0x03, 0x06))
        );
    }

    #[test]
    fn test_echo_mismatch_fails() {
        // Echo of a different register than the one written.
        let mut client = Client::with_transport(
            config().with_retry(RetryPolicy::no_retry()),
            MockTransport::with_steps(vec![MockStep::Raw(
                hex::decode("000000000006010600010100").unwrap(),
            )]),
        );

        let err = client.turn_on(1).unwrap_err();
        assert!(matches!(
            err.as_operation().and_then(|op| op.last_error().as_frame()),
            Some(FrameError::Mismatch { .. })
        ));
    }
}
