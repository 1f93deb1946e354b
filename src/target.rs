//! Devices to upgrade and the credentials used to log into them

use std::fmt;
use std::path::Path;

/// Default SSH port
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Username/password pair for device login.
///
/// The password is never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Login username
    pub username: String,
    password: String,
}

impl Credentials {
    /// Create a credential pair
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// The login password
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One device to run the upgrade workflow against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTarget {
    /// Hostname or IP address
    pub address: String,
    /// SSH port
    pub port: u16,
    /// Login credentials
    pub credentials: Credentials,
}

impl DeviceTarget {
    /// Target on the default SSH port
    pub fn new(address: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            address: address.into(),
            port: DEFAULT_SSH_PORT,
            credentials,
        }
    }

    /// Override the SSH port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Parse a newline-delimited device list.
///
/// Surrounding whitespace is trimmed and blank lines are ignored. Order and
/// duplicates are preserved: every listed line is one workflow run.
pub fn parse_device_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Read and parse a device list file.
pub fn load_device_list(path: impl AsRef<Path>) -> std::io::Result<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_device_list(&text))
}

/// Build one target per address, all sharing the same credentials and port.
pub fn targets_from(addresses: &[String], credentials: &Credentials, port: u16) -> Vec<DeviceTarget> {
    addresses
        .iter()
        .map(|address| DeviceTarget::new(address.clone(), credentials.clone()).with_port(port))
        .collect()
}
