//! Modbus TCP (MBAP) header and frame sizing.
//!
//! Every frame exchanged with the module starts with the 7-byte MBAP header:
//!
//! | Byte | Field | Description |
//! |------|-------|-------------|
//! | 0-1 | Transaction ID | Correlates a response with its request |
//! | 2-3 | Protocol ID | Always 0x0000 for Modbus |
//! | 4-5 | Length | Bytes following this field (unit id + PDU) |
//! | 6 | Unit ID | Device address behind the gateway |
//!
//! The PDU follows: one function code byte and the function's body.
//! All multi-byte fields are big-endian.
//!
//! # Example
//!
//! ```
//! use iob16_modbus::MbapHeader;
//!
//! let header = MbapHeader::new(0x0001, 0x01, 6);
//! assert_eq!(header.to_bytes(), [0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01]);
//! ```

use crate::error::FrameError;

/// MBAP header size in bytes (including the unit id).
pub const MBAP_HEADER_SIZE: usize = 7;

/// Bytes before the unit id; the length field counts everything after them.
pub(crate) const LENGTH_PREFIX_SIZE: usize = 6;

/// Smallest possible frame: header plus a function code.
pub(crate) const MIN_FRAME_SIZE: usize = MBAP_HEADER_SIZE + 1;

/// Largest value the length field may carry (unit id + 253-byte PDU).
pub(crate) const MAX_LENGTH_FIELD: u16 = 254;

/// Read Holding Registers.
pub const FN_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Write Single Register.
pub const FN_WRITE_SINGLE_REGISTER: u8 = 0x06;

/// Bit set on the function code of an exception response.
pub const EXCEPTION_FLAG: u8 = 0x80;

/// Modbus protocol identifier.
pub const PROTOCOL_ID: u16 = 0x0000;

/// MBAP header of a request or response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    /// Transaction identifier.
    pub transaction_id: u16,
    /// Protocol identifier (0 for Modbus).
    pub protocol_id: u16,
    /// Number of bytes following the length field.
    pub length: u16,
    /// Unit (slave) identifier.
    pub unit_id: u8,
}

impl MbapHeader {
    /// Creates a Modbus header with protocol id 0.
    pub fn new(transaction_id: u16, unit_id: u8, length: u16) -> Self {
        Self {
            transaction_id,
            protocol_id: PROTOCOL_ID,
            length,
            unit_id,
        }
    }

    /// Serializes the header to bytes.
    pub fn to_bytes(self) -> [u8; MBAP_HEADER_SIZE] {
        let [t0, t1] = self.transaction_id.to_be_bytes();
        let [p0, p1] = self.protocol_id.to_be_bytes();
        let [l0, l1] = self.length.to_be_bytes();
        [t0, t1, p0, p1, l0, l1, self.unit_id]
    }

    /// Parses a header from the start of `data`.
    ///
    /// Only the field layout is checked here; semantic checks live in
    /// [`decode_response`](crate::decode_response).
    ///
    /// # Errors
    ///
    /// Returns `FrameError::Truncated` if fewer than 7 bytes are present.
    ///
    /// # Example
    ///
    /// ```
    /// use iob16_modbus::MbapHeader;
    ///
    /// let header = MbapHeader::from_bytes(&[0x12, 0x34, 0x00, 0x00, 0x00, 0x06, 0x01]).unwrap();
    /// assert_eq!(header.transaction_id, 0x1234);
    /// assert_eq!(header.unit_id, 1);
    /// ```
    pub fn from_bytes(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < MBAP_HEADER_SIZE {
            return Err(FrameError::truncated(MBAP_HEADER_SIZE, data.len()));
        }

        Ok(Self {
            transaction_id: u16::from_be_bytes([data[0], data[1]]),
            protocol_id: u16::from_be_bytes([data[2], data[3]]),
            length: u16::from_be_bytes([data[4], data[5]]),
            unit_id: data[6],
        })
    }

    /// Total size of the frame this header announces.
    pub fn frame_size(self) -> usize {
        LENGTH_PREFIX_SIZE + self.length as usize
    }
}

/// Returns the full size of the frame at the start of `data`, once known.
///
/// The size becomes known as soon as the length field (bytes 4-5) has
/// arrived. Returns `None` before that.
///
/// # Example
///
/// ```
/// use iob16_modbus::frame_length;
///
/// assert_eq!(frame_length(&[0x00, 0x01, 0x00]), None);
/// assert_eq!(frame_length(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x06]), Some(12));
/// ```
pub fn frame_length(data: &[u8]) -> Option<usize> {
    if data.len() < LENGTH_PREFIX_SIZE {
        return None;
    }
    let length = u16::from_be_bytes([data[4], data[5]]);
    Some(LENGTH_PREFIX_SIZE + length as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_new() {
        let header = MbapHeader::new(0x0102, 0x11, 6);
        assert_eq!(header.transaction_id, 0x0102);
        assert_eq!(header.protocol_id, 0);
        assert_eq!(header.length, 6);
        assert_eq!(header.unit_id, 0x11);
    }

    #[test]
    fn test_header_to_bytes() {
        let header = MbapHeader::new(0xABCD, 0x01, 6);
        assert_eq!(
            header.to_bytes(),
            [0xAB, 0xCD, 0x00, 0x00, 0x00, 0x06, 0x01]
        );
    }

    #[test]
    fn test_header_from_bytes_too_short() {
        let result = MbapHeader::from_bytes(&[0x00, 0x01, 0x00]);
        assert_eq!(result, Err(FrameError::truncated(7, 3)));
    }

    #[test]
    fn test_header_keeps_protocol_id() {
        let header = MbapHeader::from_bytes(&[0x00, 0x01, 0x12, 0x34, 0x00, 0x03, 0x05]).unwrap();
        assert_eq!(header.protocol_id, 0x1234);
        assert_eq!(header.frame_size(), 9);
    }

    #[test]
    fn test_frame_length() {
        assert_eq!(frame_length(&[]), None);
        assert_eq!(frame_length(&[0, 1, 0, 0, 0]), None);
        assert_eq!(frame_length(&[0, 1, 0, 0, 0, 0x23, 1, 3]), Some(41));
    }
}
