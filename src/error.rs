//! Error types for the Modbus I/O module client.
//!
//! Errors are layered the same way the engine is:
//!
//! - [`FrameError`] - the bytes on the wire were wrong (codec level)
//! - [`TransactionError`] - one request/response exchange failed
//! - [`OperationError`] - every attempt of the retry budget failed
//! - [`Error`] - what the public API returns

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Structural problems with a response frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Fewer bytes than the frame declares.
    #[error("Truncated frame: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes required for a complete frame.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// Any structural violation other than truncation or mismatch.
    #[error("Malformed frame: {reason}")]
    Malformed {
        /// Description of the violation.
        reason: String,
    },

    /// The response does not belong to the request that was sent.
    #[error("{field} mismatch: expected 0x{expected:04X}, received 0x{received:04X}")]
    Mismatch {
        /// Name of the field that did not match.
        field: &'static str,
        /// Value the request implied.
        expected: u16,
        /// Value found in the response.
        received: u16,
    },

    /// The device answered with an exception response.
    #[error("Device exception on function 0x{function:02X}: code 0x{code:02X} ({})", exception_description(*.code))]
    Exception {
        /// Function code of the rejected request (high bit cleared).
        function: u8,
        /// Exception code sent by the device.
        code: u8,
    },
}

impl FrameError {
    /// Creates a new `Truncated` error.
    pub fn truncated(expected: usize, actual: usize) -> Self {
        Self::Truncated { expected, actual }
    }

    /// Creates a new `Malformed` error.
    ///
    /// # Example
    ///
    /// ```
    /// use iob16_modbus::FrameError;
    ///
    /// let err = FrameError::malformed("protocol id must be 0");
    /// assert_eq!(err.to_string(), "Malformed frame: protocol id must be 0");
    /// ```
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    /// Creates a new `Mismatch` error.
    pub fn mismatch(field: &'static str, expected: u16, received: u16) -> Self {
        Self::Mismatch {
            field,
            expected,
            received,
        }
    }

    /// Creates a new `Exception` error.
    pub fn exception(function: u8, code: u8) -> Self {
        Self::Exception { function, code }
    }
}

/// Failure of a single request/response exchange.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// Transport-level failure (refused, reset, broken pipe, peer closed).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No complete response arrived before the deadline.
    #[error("No complete response within {0:?}")]
    Timeout(Duration),

    /// The response arrived but its content was wrong.
    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl TransactionError {
    /// Returns true if this is a response timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Returns the frame error, if this is one.
    pub fn as_frame(&self) -> Option<&FrameError> {
        match self {
            Self::Frame(e) => Some(e),
            _ => None,
        }
    }
}

/// Terminal failure after the retry budget was exhausted.
#[derive(Debug, Error)]
#[error("Operation failed after {attempts} attempt(s): {source}")]
pub struct OperationError {
    /// Number of attempts made.
    pub attempts: u32,
    /// Error of the last attempt.
    #[source]
    pub source: TransactionError,
}

impl OperationError {
    /// Creates a new `OperationError`.
    pub fn new(attempts: u32, source: TransactionError) -> Self {
        Self { attempts, source }
    }

    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Error of the last attempt.
    pub fn last_error(&self) -> &TransactionError {
        &self.source
    }
}

/// Errors returned by the public client API.
#[derive(Debug, Error)]
pub enum Error {
    /// Channel number outside the module's range. Detected before any I/O.
    #[error("Invalid channel {channel}: must be 1-{max}")]
    InvalidChannel {
        /// Channel number supplied by the caller.
        channel: u8,
        /// Highest valid channel number.
        max: u8,
    },

    /// Invalid parameter provided.
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// Name of the invalid parameter.
        parameter: String,
        /// Description of why the parameter is invalid.
        reason: String,
    },

    /// Every attempt of the retry budget failed.
    #[error(transparent)]
    Operation(#[from] OperationError),

    /// A cancellation request was honored between attempts.
    #[error("Operation cancelled after {attempts} attempt(s)")]
    Cancelled {
        /// Attempts made before the cancellation was observed.
        attempts: u32,
    },

    /// Establishing the connection failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Creates a new `InvalidChannel` error.
    ///
    /// # Example
    ///
    /// ```
    /// use iob16_modbus::Error;
    ///
    /// let err = Error::invalid_channel(17, 16);
    /// assert_eq!(err.to_string(), "Invalid channel 17: must be 1-16");
    /// ```
    pub fn invalid_channel(channel: u8, max: u8) -> Self {
        Self::InvalidChannel { channel, max }
    }

    /// Creates a new `InvalidParameter` error.
    pub fn invalid_parameter(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Returns the terminal operation error, if this is one.
    pub fn as_operation(&self) -> Option<&OperationError> {
        match self {
            Self::Operation(e) => Some(e),
            _ => None,
        }
    }
}

/// Returns a description for a standard Modbus exception code.
///
/// # Example
///
/// ```
/// use iob16_modbus::exception_description;
///
/// assert_eq!(exception_description(0x02), "Illegal data address");
/// assert_eq!(exception_description(0x7F), "Unknown exception code");
/// ```
pub fn exception_description(code: u8) -> &'static str {
    match code {
        0x01 => "Illegal function",
        0x02 => "Illegal data address",
        0x03 => "Illegal data value",
        0x04 => "Server device failure",
        0x05 => "Acknowledge",
        0x06 => "Server device busy",
        0x08 => "Memory parity error",
        0x0A => "Gateway path unavailable",
        0x0B => "Gateway target device failed to respond",
        _ => "Unknown exception code",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_display() {
        let err = FrameError::truncated(12, 7);
        assert_eq!(err.to_string(), "Truncated frame: expected 12 bytes, got 7");
    }

    #[test]
    fn test_mismatch_display() {
        let err = FrameError::mismatch("transaction_id", 0x0001, 0x0002);
        assert_eq!(
            err.to_string(),
            "transaction_id mismatch: expected 0x0001, received 0x0002"
        );
    }

    #[test]
    fn test_exception_display() {
        let err = FrameError::exception(0x06, 0x02);
        assert_eq!(
            err.to_string(),
            "Device exception on function 0x06: code 0x02 (Illegal data address)"
        );
    }

    #[test]
    fn test_operation_error_display() {
        let err = OperationError::new(3, TransactionError::Timeout(Duration::from_secs(5)));
        assert_eq!(
            err.to_string(),
            "Operation failed after 3 attempt(s): No complete response within 5s"
        );
        assert_eq!(err.attempts(), 3);
        assert!(err.last_error().is_timeout());
    }

    #[test]
    fn test_transaction_error_from_frame() {
        let err: TransactionError = FrameError::malformed("bad").into();
        assert_eq!(err.as_frame(), Some(&FrameError::malformed("bad")));
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_error_as_operation() {
        let err: Error = OperationError::new(1, TransactionError::Timeout(Duration::ZERO)).into();
        assert_eq!(err.as_operation().map(|e| e.attempts()), Some(1));
        assert!(Error::invalid_channel(0, 16).as_operation().is_none());
    }
}
