//! Single request/response exchange.
//!
//! The [`TransactionManager`] owns the transaction-id counter and performs
//! exactly one exchange per [`execute`](TransactionManager::execute) call:
//! send the frame, accumulate reads until the frame announced by the MBAP
//! header is complete, decode, and check that the response answers the
//! request that was sent. Retrying is the session's job.

use std::io;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::{FrameError, TransactionError};
use crate::frame::{frame_length, MIN_FRAME_SIZE};
use crate::request::{Request, Transaction};
use crate::response::{decode_response, ResponseData};
use crate::transport::{Transport, MAX_FRAME_SIZE};

/// Issues one transaction at a time and correlates its response.
#[derive(Debug, Default)]
pub struct TransactionManager {
    next_id: u16,
}

impl TransactionManager {
    /// Creates a manager whose first transaction id is 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a manager whose first transaction id is `first_id`.
    pub fn starting_at(first_id: u16) -> Self {
        Self { next_id: first_id }
    }

    /// Transaction id the next call to `execute` will use.
    pub fn next_transaction_id(&self) -> u16 {
        self.next_id
    }

    fn allocate_id(&mut self) -> u16 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    /// Performs one exchange over `transport`.
    ///
    /// The transaction id advances whether or not the exchange succeeds, so
    /// a late answer to an abandoned request can never be mistaken for the
    /// answer to a new one.
    ///
    /// # Errors
    ///
    /// - `TransactionError::Io` - the transport failed or the peer closed
    /// - `TransactionError::Timeout` - no complete frame within `timeout`
    /// - `TransactionError::Frame` - the frame was malformed, answered a
    ///   different request, or carried an exception
    pub fn execute<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        unit_id: u8,
        request: &Request,
        timeout: Duration,
    ) -> Result<ResponseData, TransactionError> {
        let transaction = request.to_transaction(self.allocate_id(), unit_id);
        let frame = transaction.to_bytes();

        debug!(
            tid = transaction.transaction_id,
            unit = unit_id,
            frame = %hex_dump(&frame),
            "send"
        );
        transport.send(&frame)?;

        let reply = receive_frame(transport, timeout)?;
        debug!(tid = transaction.transaction_id, frame = %hex_dump(&reply), "receive");

        let response = decode_response(&reply, transaction.transaction_id, transaction.function_code)?;
        if response.unit_id() != unit_id {
            return Err(FrameError::mismatch(
                "unit_id",
                u16::from(unit_id),
                u16::from(response.unit_id()),
            )
            .into());
        }
        check_answers(&transaction, &response.data)?;

        Ok(response.data)
    }
}

/// Reads until one complete frame is buffered or the deadline passes.
fn receive_frame<T: Transport + ?Sized>(
    transport: &mut T,
    timeout: Duration,
) -> Result<Vec<u8>, TransactionError> {
    let deadline = Instant::now() + timeout;
    let mut buffer = Vec::with_capacity(MAX_FRAME_SIZE);
    let mut chunk = [0u8; MAX_FRAME_SIZE];

    loop {
        if let Some(size) = complete_size(&buffer) {
            if buffer.len() > size {
                trace!(extra = buffer.len() - size, "discarding bytes after frame");
                buffer.truncate(size);
            }
            return Ok(buffer);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(TransactionError::Timeout(timeout));
        }

        match transport.receive(&mut chunk, remaining) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by device",
                )
                .into())
            }
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                return Err(TransactionError::Timeout(timeout))
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Size of the frame at the start of `buffer` if it is ready for decoding.
///
/// A length field that cannot describe a valid frame is handed to the codec
/// immediately instead of waiting for bytes that will never come.
fn complete_size(buffer: &[u8]) -> Option<usize> {
    let size = frame_length(buffer)?;
    if !(MIN_FRAME_SIZE..=MAX_FRAME_SIZE).contains(&size) {
        return Some(buffer.len());
    }
    (buffer.len() >= size).then_some(size)
}

/// Checks that a decoded response answers `transaction`.
fn check_answers(transaction: &Transaction, data: &ResponseData) -> Result<(), FrameError> {
    match data {
        ResponseData::Written { address, value } => {
            if *address != transaction.register_address {
                return Err(FrameError::mismatch(
                    "register_address",
                    transaction.register_address,
                    *address,
                ));
            }
            if *value != transaction.value_or_count {
                return Err(FrameError::mismatch("value", transaction.value_or_count, *value));
            }
        }
        ResponseData::Registers(values) => {
            let received = u16::try_from(values.len()).unwrap_or(u16::MAX);
            if received != transaction.value_or_count {
                return Err(FrameError::mismatch(
                    "register_count",
                    transaction.value_or_count,
                    received,
                ));
            }
        }
    }
    Ok(())
}

pub(crate) fn hex_dump(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockStep, MockTransport};

    const TIMEOUT: Duration = Duration::from_millis(50);

    fn connected(steps: Vec<MockStep>) -> MockTransport {
        let mut mock = MockTransport::with_steps(steps);
        mock.connect(TIMEOUT).unwrap();
        mock
    }

    #[test]
    fn test_write_exchange() {
        let mut mock = connected(vec![MockStep::Echo]);
        let mut manager = TransactionManager::new();

        let data = manager
            .execute(&mut mock, 1, &Request::write(3, 0x0100), TIMEOUT)
            .unwrap();

        assert_eq!(
            data,
            ResponseData::Written {
                address: 3,
                value: 0x0100
            }
        );
        assert_eq!(mock.sent_frames()[0], hex::decode("000000000006010600030100").unwrap());
    }

    #[test]
    fn test_read_exchange() {
        let mut mock = connected(vec![MockStep::Registers(vec![0x0005])]);
        let mut manager = TransactionManager::new();

        let data = manager
            .execute(&mut mock, 1, &Request::read(0x00C0, 1).unwrap(), TIMEOUT)
            .unwrap();
        assert_eq!(data, ResponseData::Registers(vec![0x0005]));
    }

    #[test]
    fn test_partial_reads_are_accumulated() {
        let frame = hex::decode("000000000006010600000700").unwrap();
        let chunks = vec![frame[..3].to_vec(), frame[3..8].to_vec(), frame[8..].to_vec()];
        let mut mock = connected(vec![MockStep::Chunked(chunks)]);
        let mut manager = TransactionManager::new();

        let data = manager
            .execute(&mut mock, 1, &Request::write(0, 0x0700), TIMEOUT)
            .unwrap();
        assert_eq!(
            data,
            ResponseData::Written {
                address: 0,
                value: 0x0700
            }
        );
    }

    #[test]
    fn test_incomplete_frame_times_out() {
        let frame = hex::decode("000000000006010600000700").unwrap();
        let mut mock = connected(vec![MockStep::Raw(frame[..9].to_vec())]);
        let mut manager = TransactionManager::new();

        let err = manager
            .execute(&mut mock, 1, &Request::write(0, 0x0700), TIMEOUT)
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_no_reply_times_out() {
        let mut mock = connected(vec![MockStep::NoReply]);
        let mut manager = TransactionManager::new();

        let err = manager
            .execute(&mut mock, 1, &Request::write(0, 0x0100), TIMEOUT)
            .unwrap_err();
        assert!(matches!(err, TransactionError::Timeout(t) if t == TIMEOUT));
    }

    #[test]
    fn test_hangup_is_io_error() {
        let mut mock = connected(vec![MockStep::Hangup]);
        let mut manager = TransactionManager::new();

        let err = manager
            .execute(&mut mock, 1, &Request::write(0, 0x0100), TIMEOUT)
            .unwrap_err();
        match err {
            TransactionError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("Expected Io, got {:?}", other),
        }
    }

    #[test]
    fn test_send_error_propagates_unchanged() {
        let mut mock = connected(vec![MockStep::SendError(io::ErrorKind::ConnectionReset)]);
        let mut manager = TransactionManager::new();

        let err = manager
            .execute(&mut mock, 1, &Request::write(0, 0x0100), TIMEOUT)
            .unwrap_err();
        match err {
            TransactionError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("Expected Io, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_transaction_id() {
        let mut mock = connected(vec![MockStep::WrongTransactionId]);
        let mut manager = TransactionManager::starting_at(7);

        let err = manager
            .execute(&mut mock, 1, &Request::write(0, 0x0100), TIMEOUT)
            .unwrap_err();
        assert_eq!(err.as_frame(), Some(&FrameError::mismatch("transaction_id", 7, 8)));
    }

    #[test]
    fn test_exception_surfaces_as_frame_error() {
        let mut mock = connected(vec![MockStep::Exception(0x02)]);
        let mut manager = TransactionManager::new();

        let err = manager
            .execute(&mut mock, 1, &Request::write(0x1000, 0x0100), TIMEOUT)
            .unwrap_err();
        assert_eq!(err.as_frame(), Some(&FrameError::exception(0x06, 0x02)));
    }

    #[test]
    fn test_wrong_unit_id() {
        // Answer from unit 2 to a request for unit 1
        let reply = hex::decode("000000000006020600000100").unwrap();
        let mut mock = connected(vec![MockStep::Raw(reply)]);
        let mut manager = TransactionManager::new();

        let err = manager
            .execute(&mut mock, 1, &Request::write(0, 0x0100), TIMEOUT)
            .unwrap_err();
        assert_eq!(err.as_frame(), Some(&FrameError::mismatch("unit_id", 1, 2)));
    }

    #[test]
    fn test_wrong_echo_value() {
        let reply = hex::decode("000000000006010600000200").unwrap();
        let mut mock = connected(vec![MockStep::Raw(reply)]);
        let mut manager = TransactionManager::new();

        let err = manager
            .execute(&mut mock, 1, &Request::write(0, 0x0100), TIMEOUT)
            .unwrap_err();
        assert_eq!(err.as_frame(), Some(&FrameError::mismatch("value", 0x0100, 0x0200)));
    }

    #[test]
    fn test_wrong_register_count() {
        let mut mock = connected(vec![MockStep::Registers(vec![1, 2])]);
        let mut manager = TransactionManager::new();

        let err = manager
            .execute(&mut mock, 1, &Request::read(0, 16).unwrap(), TIMEOUT)
            .unwrap_err();
        assert_eq!(err.as_frame(), Some(&FrameError::mismatch("register_count", 16, 2)));
    }

    #[test]
    fn test_implausible_length_fails_fast() {
        let reply = hex::decode("00000000ffff0106").unwrap();
        let mut mock = connected(vec![MockStep::Raw(reply)]);
        let mut manager = TransactionManager::new();

        let err = manager
            .execute(&mut mock, 1, &Request::write(0, 0x0100), TIMEOUT)
            .unwrap_err();
        assert!(matches!(err.as_frame(), Some(FrameError::Malformed { .. })));
    }

    #[test]
    fn test_id_advances_on_failure_and_wraps() {
        let mut mock = connected(vec![MockStep::NoReply, MockStep::Echo]);
        let mut manager = TransactionManager::starting_at(u16::MAX);

        assert!(manager
            .execute(&mut mock, 1, &Request::write(0, 0x0100), Duration::ZERO)
            .is_err());
        assert_eq!(manager.next_transaction_id(), 0);

        manager
            .execute(&mut mock, 1, &Request::write(0, 0x0100), TIMEOUT)
            .unwrap();
        assert_eq!(manager.next_transaction_id(), 1);
        assert_eq!(&mock.sent_frames()[0][..2], &[0xFF, 0xFF]);
        assert_eq!(&mock.sent_frames()[1][..2], &[0x00, 0x00]);
    }

    #[test]
    fn test_hex_dump() {
        assert_eq!(hex_dump(&[0x00, 0x1F, 0xAB]), "00 1F AB");
    }
}
