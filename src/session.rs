//! Connection lifecycle and bounded retry with reconnect.
//!
//! A [`Session`] owns one transport to one device. Each logical operation is
//! driven through a small state machine:
//!
//! ```text
//! Attempting(n) --ok-------------> Done
//! Attempting(n) --err------------> Backoff(n)
//! Backoff(n)    --n == max-------> close, Failed
//! Backoff(n)    --cancel---------> Cancelled
//! Backoff(n)    --n <  max-------> close, sleep, Attempting(n + 1)
//! ```
//!
//! `Attempting(n)` connects first when no connection is held, so a failed
//! reconnect counts as a failed attempt. Transport errors, timeouts and
//! frame errors are all retried the same way. A failed operation leaves the
//! session disconnected, so a late reply to its last request can never be
//! read by the next operation.
//!
//! Worst case, one operation blocks for
//! `timeout * max_attempts + retry_delay * (max_attempts - 1)`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::{Error, OperationError, Result, TransactionError};
use crate::request::Request;
use crate::response::ResponseData;
use crate::transaction::TransactionManager;
use crate::transport::{Transport, DEFAULT_TIMEOUT};

/// Default number of attempts per operation.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default pause between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// How many times an operation is tried and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RetryPolicy {
    /// Attempts per operation, including the first. At least 1.
    pub max_attempts: u32,
    /// Pause between a failed attempt and the reconnect.
    pub retry_delay: Duration,
}

impl RetryPolicy {
    /// Creates a retry policy. `max_attempts` below 1 is raised to 1.
    ///
    /// # Example
    ///
    /// ```
    /// use iob16_modbus::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::new(5, Duration::from_millis(250));
    /// assert_eq!(policy.max_attempts, 5);
    ///
    /// assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    /// ```
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }

    /// A policy that tries once and never reconnects.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }
}

/// Requests cancellation of the operation running on a session.
///
/// Cancellation is cooperative: it is observed between attempts, never in
/// the middle of a send or receive. Each operation starts with a cleared
/// flag, and an observed request is consumed.
///
/// # Example
///
/// ```
/// use iob16_modbus::{Client, ClientConfig};
/// use std::net::Ipv4Addr;
///
/// let client = Client::new(ClientConfig::new(Ipv4Addr::new(10, 0, 2, 218), 1));
/// let handle = client.cancel_handle();
///
/// // e.g. from a signal handler thread
/// std::thread::spawn(move || handle.cancel()).join().unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Requests cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns whether a cancellation request is pending.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    fn take(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }
}

#[derive(Debug)]
enum AttemptState {
    Attempting(u32),
    Backoff {
        attempt: u32,
        error: TransactionError,
    },
    Done(ResponseData),
    Failed {
        attempts: u32,
        error: TransactionError,
    },
    Cancelled {
        attempts: u32,
    },
}

/// One device connection with retry-with-reconnect semantics.
///
/// Every operation takes `&mut self`: a session carries one outstanding
/// transaction at a time. Share it between threads behind a `Mutex`.
pub struct Session<T: Transport> {
    transport: T,
    manager: TransactionManager,
    unit_id: u8,
    timeout: Duration,
    retry: RetryPolicy,
    cancel: CancelHandle,
}

impl<T: Transport> Session<T> {
    /// Creates a disconnected session with default timeout and retry policy.
    pub fn new(transport: T, unit_id: u8) -> Self {
        Self {
            transport,
            manager: TransactionManager::new(),
            unit_id,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            cancel: CancelHandle::default(),
        }
    }

    /// Sets the connect and response timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Establishes the connection. Does nothing if one is already held.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the transport cannot connect.
    pub fn connect(&mut self) -> Result<()> {
        if self.transport.is_connected() {
            return Ok(());
        }
        self.transport.connect(self.timeout)?;
        info!(unit = self.unit_id, "session connected");
        Ok(())
    }

    /// Releases the connection. Close errors are logged, never returned.
    pub fn disconnect(&mut self) {
        if !self.transport.is_connected() {
            return;
        }
        if let Err(e) = self.transport.close() {
            warn!(unit = self.unit_id, error = %e, "error while closing connection");
        }
        info!(unit = self.unit_id, "session disconnected");
    }

    /// Returns whether a connection is currently held.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Runs `request` until it succeeds or the retry budget is spent.
    ///
    /// # Errors
    ///
    /// - `Error::Operation` after `max_attempts` failed attempts, carrying
    ///   the attempt count and the last underlying error
    /// - `Error::Cancelled` if a cancellation request was observed
    pub fn run_operation(&mut self, request: &Request) -> Result<ResponseData> {
        let max_attempts = self.retry.max_attempts.max(1);
        self.cancel.clear();

        let mut state = AttemptState::Attempting(1);
        loop {
            state = match state {
                AttemptState::Attempting(attempt) => match self.attempt(request) {
                    Ok(data) => AttemptState::Done(data),
                    Err(error) => {
                        warn!(
                            unit = self.unit_id,
                            attempt,
                            max_attempts,
                            error = %error,
                            "attempt failed"
                        );
                        AttemptState::Backoff { attempt, error }
                    }
                },
                AttemptState::Backoff { attempt, error } if attempt >= max_attempts => {
                    AttemptState::Failed {
                        attempts: attempt,
                        error,
                    }
                }
                AttemptState::Backoff { attempt, .. } => self.back_off(attempt),
                AttemptState::Done(data) => return Ok(data),
                AttemptState::Failed { attempts, error } => {
                    self.disconnect();
                    error!(unit = self.unit_id, attempts, error = %error, "operation failed");
                    return Err(OperationError::new(attempts, error).into());
                }
                AttemptState::Cancelled { attempts } => {
                    info!(unit = self.unit_id, attempts, "operation cancelled");
                    return Err(Error::Cancelled { attempts });
                }
            };
        }
    }

    fn attempt(&mut self, request: &Request) -> std::result::Result<ResponseData, TransactionError> {
        if !self.transport.is_connected() {
            self.transport.connect(self.timeout)?;
        }
        self.manager
            .execute(&mut self.transport, self.unit_id, request, self.timeout)
    }

    /// Drops the connection and waits out the retry delay.
    fn back_off(&mut self, attempt: u32) -> AttemptState {
        self.disconnect();

        if self.cancel.take() {
            return AttemptState::Cancelled { attempts: attempt };
        }
        if !self.retry.retry_delay.is_zero() {
            thread::sleep(self.retry.retry_delay);
        }
        if self.cancel.take() {
            return AttemptState::Cancelled { attempts: attempt };
        }

        AttemptState::Attempting(attempt + 1)
    }

    /// Returns a handle that cancels the running operation between attempts.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Device unit id.
    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    /// Connect and response timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Transaction id the next exchange will use.
    pub fn next_transaction_id(&self) -> u16 {
        self.manager.next_transaction_id()
    }

    /// Returns a reference to the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns a mutable reference to the underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

impl<T: Transport + std::fmt::Debug> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("transport", &self.transport)
            .field("unit_id", &self.unit_id)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}
