//! Request construction and serialization.
//!
//! The module speaks two Modbus functions, both with a fixed 12-byte frame:
//!
//! - Write Single Register (0x06): `address`, `value`
//! - Read Holding Registers (0x03): `start`, `count`
//!
//! A [`Request`] describes what to do; a [`Transaction`] is a request bound
//! to a transaction id and unit id, ready for the wire.
//!
//! # Example
//!
//! ```
//! use iob16_modbus::{encode_write_request, Request};
//!
//! // Channel 1 ON
//! let frame = encode_write_request(0x0001, 0x01, 0x0000, 0x0100);
//! assert_eq!(
//!     frame,
//!     [0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x06, 0x00, 0x00, 0x01, 0x00]
//! );
//!
//! let request = Request::write(0x0000, 0x0100);
//! assert_eq!(request.to_transaction(0x0001, 0x01).to_bytes(), frame);
//! ```

use crate::error::{Error, Result};
use crate::frame::{MbapHeader, FN_READ_HOLDING_REGISTERS, FN_WRITE_SINGLE_REGISTER, MBAP_HEADER_SIZE};

/// Size of every request frame this crate emits.
pub const REQUEST_FRAME_SIZE: usize = 12;

/// Value of the MBAP length field for a 12-byte request.
const REQUEST_LENGTH_FIELD: u16 = 6;

/// Maximum number of registers a single read may request.
pub const MAX_READ_REGISTERS: u16 = 125;

/// A register operation, before a transaction id is assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Write one holding register.
    WriteRegister {
        /// Register address.
        address: u16,
        /// Value to write.
        value: u16,
    },
    /// Read a block of holding registers.
    ReadRegisters {
        /// First register address.
        start: u16,
        /// Number of registers (1-125).
        count: u16,
    },
}

impl Request {
    /// Creates a write-single-register request.
    pub fn write(address: u16, value: u16) -> Self {
        Self::WriteRegister { address, value }
    }

    /// Creates a read-holding-registers request.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidParameter` if `count` is 0, exceeds
    /// [`MAX_READ_REGISTERS`], or the block runs past address 0xFFFF.
    ///
    /// # Example
    ///
    /// ```
    /// use iob16_modbus::Request;
    ///
    /// assert!(Request::read(0, 16).is_ok());
    /// assert!(Request::read(0, 0).is_err());
    /// assert!(Request::read(0, 126).is_err());
    /// ```
    pub fn read(start: u16, count: u16) -> Result<Self> {
        if count == 0 {
            return Err(Error::invalid_parameter("count", "must be greater than 0"));
        }
        if count > MAX_READ_REGISTERS {
            return Err(Error::invalid_parameter(
                "count",
                format!("must not exceed {}", MAX_READ_REGISTERS),
            ));
        }
        if u32::from(start) + u32::from(count) > 0x1_0000 {
            return Err(Error::invalid_parameter(
                "count",
                format!("block starting at {} runs past register 65535", start),
            ));
        }
        Ok(Self::ReadRegisters { start, count })
    }

    /// Function code this request is sent with.
    pub fn function_code(&self) -> u8 {
        match self {
            Self::WriteRegister { .. } => FN_WRITE_SINGLE_REGISTER,
            Self::ReadRegisters { .. } => FN_READ_HOLDING_REGISTERS,
        }
    }

    /// Binds the request to a transaction id and unit id.
    pub fn to_transaction(self, transaction_id: u16, unit_id: u8) -> Transaction {
        let (register_address, value_or_count) = match self {
            Self::WriteRegister { address, value } => (address, value),
            Self::ReadRegisters { start, count } => (start, count),
        };
        Transaction {
            transaction_id,
            unit_id,
            function_code: self.function_code(),
            register_address,
            value_or_count,
        }
    }
}

/// One request on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transaction {
    /// Correlation identifier.
    pub transaction_id: u16,
    /// Device address.
    pub unit_id: u8,
    /// 0x03 or 0x06.
    pub function_code: u8,
    /// Register address (write) or start address (read).
    pub register_address: u16,
    /// Value (write) or register count (read).
    pub value_or_count: u16,
}

impl Transaction {
    /// Serializes the transaction to a request frame.
    pub fn to_bytes(&self) -> [u8; REQUEST_FRAME_SIZE] {
        let mut frame = [0u8; REQUEST_FRAME_SIZE];
        let header = MbapHeader::new(self.transaction_id, self.unit_id, REQUEST_LENGTH_FIELD);
        frame[..MBAP_HEADER_SIZE].copy_from_slice(&header.to_bytes());
        frame[7] = self.function_code;
        frame[8..10].copy_from_slice(&self.register_address.to_be_bytes());
        frame[10..12].copy_from_slice(&self.value_or_count.to_be_bytes());
        frame
    }
}

/// Builds a Write Single Register (0x06) frame.
pub fn encode_write_request(
    transaction_id: u16,
    unit_id: u8,
    register_address: u16,
    value: u16,
) -> [u8; REQUEST_FRAME_SIZE] {
    Request::write(register_address, value)
        .to_transaction(transaction_id, unit_id)
        .to_bytes()
}

/// Builds a Read Holding Registers (0x03) frame.
///
/// The count is encoded as given; range checks belong to [`Request::read`].
///
/// # Example
///
/// ```
/// use iob16_modbus::encode_read_request;
///
/// let frame = encode_read_request(0x0002, 0x01, 0x0000, 16);
/// assert_eq!(&frame[7..], &[0x03, 0x00, 0x00, 0x00, 0x10]);
/// ```
pub fn encode_read_request(
    transaction_id: u16,
    unit_id: u8,
    start_address: u16,
    register_count: u16,
) -> [u8; REQUEST_FRAME_SIZE] {
    Request::ReadRegisters {
        start: start_address,
        count: register_count,
    }
    .to_transaction(transaction_id, unit_id)
    .to_bytes()
}
