//! Error types for apphost-upgrade

use std::time::Duration;
use thiserror::Error;

/// Failures while establishing an authenticated session to a device.
///
/// These are the "connection" class of faults: the device was never reached,
/// refused the credentials, or did not answer in time. The workflow records
/// them as a failed outcome and moves on to the next device.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// No login prompt or device prompt appeared within the login timeout.
    #[error("Timed out connecting to {address} (after {duration:?})")]
    Timeout {
        /// Address that was being connected to
        address: String,
        /// Duration that was waited before giving up
        duration: Duration,
    },

    /// The device rejected the supplied username/password.
    #[error("Authentication rejected by {address}")]
    AuthenticationRejected {
        /// Address that rejected the login
        address: String,
    },

    /// The host could not be reached (refused, no route, DNS failure, or the
    /// ssh client exited before login).
    #[error("Device {address} unreachable: {reason}")]
    Unreachable {
        /// Address that could not be reached
        address: String,
        /// What the ssh client reported
        reason: String,
    },

    /// The ssh client refused the host key.
    #[error("Host key verification failed for {address}")]
    HostKey {
        /// Address whose key was refused
        address: String,
    },

    /// The local ssh client could not be started.
    #[error("Failed to start ssh client: {0}")]
    Spawn(String),
}

/// Errors that can occur while driving a device session.
///
/// # Examples
///
/// ```no_run
/// use apphost_upgrade::{DeviceChannel, DriverError, Session, WaitPolicy};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut session = Session::builder()
///     .timeout(Duration::from_secs(5))
///     .spawn("cat")?;
///
/// match session.issue("show version", WaitPolicy::Prompt).await {
///     Ok(result) => println!("{}", result.output),
///     Err(DriverError::Timeout { duration }) => {
///         eprintln!("No prompt after {:?}", duration);
///     }
///     Err(e) => return Err(e.into()),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Error, Debug)]
pub enum DriverError {
    /// Opening the session failed.
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Timeout waiting for the device prompt.
    #[error("Timeout waiting for device prompt (after {duration:?})")]
    Timeout {
        /// Duration that was waited before timeout
        duration: Duration,
    },

    /// The remote end closed the channel before the prompt appeared.
    #[error("Session closed by remote end")]
    Eof,

    /// Invalid pattern.
    #[error("Invalid pattern: {0}")]
    PatternError(#[from] PatternError),

    /// I/O error reading from or writing to the PTY.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// PTY error.
    ///
    /// Returned when PTY creation or manipulation fails.
    #[error("PTY error: {0}")]
    PtyError(String),

    /// The workflow configuration cannot produce a valid command.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The session has already been closed.
    #[error("Session already closed")]
    Closed,
}

impl DriverError {
    /// `true` for faults raised while opening the session.
    pub fn is_connect(&self) -> bool {
        matches!(self, DriverError::Connect(_))
    }
}

/// Errors related to pattern creation.
#[derive(Error, Debug)]
pub enum PatternError {
    /// Invalid regex pattern.
    #[error("Invalid regex: {0}")]
    InvalidRegex(#[from] regex::Error),

    /// Empty pattern.
    #[error("Pattern cannot be empty")]
    EmptyPattern,

    /// Special patterns (EOF, timeout) are resolved by the read loop and have
    /// no matcher of their own.
    #[error("Special pattern has no matcher")]
    Special,
}
