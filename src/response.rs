//! Response parsing and validation.
//!
//! # Response Structure
//!
//! | Component | Size | Description |
//! |-----------|------|-------------|
//! | MBAP header | 7 bytes | Transaction id, protocol id, length, unit id |
//! | Function code | 1 byte | Echo of the request, or `0x80 \| fc` on exception |
//! | Body | Variable | See below |
//!
//! Bodies:
//!
//! - Read Holding Registers (0x03): byte count, then big-endian register values
//! - Write Single Register (0x06): echoed address and value
//! - Exception: one exception code byte
//!
//! # Example
//!
//! ```
//! use iob16_modbus::{decode_response, ResponseData};
//!
//! let bytes = [
//!     0x00, 0x01, 0x00, 0x00, 0x00, 0x07, 0x01, // MBAP header
//!     0x03, 0x04,                               // function, byte count
//!     0x01, 0x00, 0x00, 0x00,                   // registers: 0x0100, 0x0000
//! ];
//!
//! let response = decode_response(&bytes, 0x0001, 0x03).unwrap();
//! assert_eq!(response.data, ResponseData::Registers(vec![0x0100, 0x0000]));
//! ```

use crate::error::FrameError;
use crate::frame::{
    MbapHeader, EXCEPTION_FLAG, FN_READ_HOLDING_REGISTERS, FN_WRITE_SINGLE_REGISTER,
    LENGTH_PREFIX_SIZE, MAX_LENGTH_FIELD, MIN_FRAME_SIZE, PROTOCOL_ID,
};

/// Payload of a successful response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseData {
    /// Register values of a read, in address order.
    Registers(Vec<u16>),
    /// Echo of a single-register write.
    Written {
        /// Echoed register address.
        address: u16,
        /// Echoed value.
        value: u16,
    },
}

impl ResponseData {
    /// Returns the register values of a read response.
    pub fn registers(&self) -> Option<&[u16]> {
        match self {
            Self::Registers(values) => Some(values),
            Self::Written { .. } => None,
        }
    }

    /// Consumes the payload, returning the register values of a read response.
    pub fn into_registers(self) -> Option<Vec<u16>> {
        match self {
            Self::Registers(values) => Some(values),
            Self::Written { .. } => None,
        }
    }
}

/// Parsed response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Response header.
    pub header: MbapHeader,
    /// Function code of the response.
    pub function_code: u8,
    /// Decoded payload.
    pub data: ResponseData,
}

impl Response {
    /// Unit id the device answered from.
    pub fn unit_id(&self) -> u8 {
        self.header.unit_id
    }

    /// Transaction id of the response.
    pub fn transaction_id(&self) -> u16 {
        self.header.transaction_id
    }
}

/// Decodes one complete response frame.
///
/// `bytes` must hold exactly one frame; the transaction manager cuts the
/// stream at the length the header announces.
///
/// # Errors
///
/// - `FrameError::Truncated` if fewer bytes than the declared length are present
/// - `FrameError::Mismatch` if the transaction id or function code differs
/// - `FrameError::Exception` if the device rejected the request
/// - `FrameError::Malformed` for any other structural violation
///
/// # Example
///
/// ```
/// use iob16_modbus::{decode_response, FrameError};
///
/// // Illegal data address, in answer to a write
/// let bytes = [0x00, 0x05, 0x00, 0x00, 0x00, 0x03, 0x01, 0x86, 0x02];
/// assert_eq!(
///     decode_response(&bytes, 0x0005, 0x06),
///     Err(FrameError::exception(0x06, 0x02))
/// );
/// ```
pub fn decode_response(
    bytes: &[u8],
    expected_transaction_id: u16,
    expected_function_code: u8,
) -> Result<Response, FrameError> {
    if bytes.len() < LENGTH_PREFIX_SIZE {
        return Err(FrameError::truncated(MIN_FRAME_SIZE, bytes.len()));
    }

    let length = u16::from_be_bytes([bytes[4], bytes[5]]);
    if length < 2 || length > MAX_LENGTH_FIELD {
        return Err(FrameError::malformed(format!(
            "length field {} outside 2-{}",
            length, MAX_LENGTH_FIELD
        )));
    }

    let frame_size = LENGTH_PREFIX_SIZE + length as usize;
    if bytes.len() < frame_size {
        return Err(FrameError::truncated(frame_size, bytes.len()));
    }
    if bytes.len() > frame_size {
        return Err(FrameError::malformed(format!(
            "{} trailing bytes after declared length",
            bytes.len() - frame_size
        )));
    }

    let header = MbapHeader::from_bytes(bytes)?;
    if header.protocol_id != PROTOCOL_ID {
        return Err(FrameError::malformed(format!(
            "protocol id must be 0, got 0x{:04X}",
            header.protocol_id
        )));
    }
    if header.transaction_id != expected_transaction_id {
        return Err(FrameError::mismatch(
            "transaction_id",
            expected_transaction_id,
            header.transaction_id,
        ));
    }

    let function_code = bytes[7];
    let body = &bytes[MIN_FRAME_SIZE..];

    if function_code == expected_function_code | EXCEPTION_FLAG {
        if body.len() != 1 {
            return Err(FrameError::malformed(format!(
                "exception body must be 1 byte, got {}",
                body.len()
            )));
        }
        return Err(FrameError::exception(expected_function_code, body[0]));
    }
    if function_code != expected_function_code {
        return Err(FrameError::mismatch(
            "function_code",
            u16::from(expected_function_code),
            u16::from(function_code),
        ));
    }

    let data = match function_code {
        FN_READ_HOLDING_REGISTERS => parse_registers(body)?,
        FN_WRITE_SINGLE_REGISTER => parse_write_echo(body)?,
        other => {
            return Err(FrameError::malformed(format!(
                "unsupported function code 0x{:02X}",
                other
            )))
        }
    };

    Ok(Response {
        header,
        function_code,
        data,
    })
}

fn parse_registers(body: &[u8]) -> Result<ResponseData, FrameError> {
    let Some((&byte_count, values)) = body.split_first() else {
        return Err(FrameError::malformed("read response without byte count"));
    };
    if byte_count as usize != values.len() {
        return Err(FrameError::malformed(format!(
            "byte count {} disagrees with {} data bytes",
            byte_count,
            values.len()
        )));
    }
    if values.len() % 2 != 0 {
        return Err(FrameError::malformed(
            "byte count must be even for register data",
        ));
    }

    Ok(ResponseData::Registers(
        values
            .chunks_exact(2)
            .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
            .collect(),
    ))
}

fn parse_write_echo(body: &[u8]) -> Result<ResponseData, FrameError> {
    if body.len() != 4 {
        return Err(FrameError::malformed(format!(
            "write echo must be 4 bytes, got {}",
            body.len()
        )));
    }
    Ok(ResponseData::Written {
        address: u16::from_be_bytes([body[0], body[1]]),
        value: u16::from_be_bytes([body[2], body[3]]),
    })
}
