//! apphost-upgrade: upgrade hosted applications on Cisco IOS devices
//!
//! Logs into each device over an interactive ssh session, finds the running
//! app-hosting application, makes sure the flash destination exists, copies
//! the new package from an HTTP(S) URL and runs `app-hosting upgrade`.
//!
//! # Features
//!
//! - **Session driver**: the system ssh client in a PTY, with prompt-matching
//!   and fixed-delay ("blind-send") wait policies
//! - **Workflow**: five response-gated steps with one typed outcome per device
//! - **Classifiers**: the text heuristics as pure, configurable predicates
//! - **Failure isolation**: every device is processed independently and its
//!   session is always released
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use apphost_upgrade::{
//!     run_all, targets_from, Credentials, Session, SshConnector, UpgradeConfig,
//! };
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = UpgradeConfig::new("https://downloads.example.com/agent-5.0.1.cisco.tar");
//!     config.validate()?;
//!
//!     let credentials = Credentials::new("admin", "secret");
//!     let targets = targets_from(&["10.0.0.1".into(), "10.0.0.2".into()], &credentials, 22);
//!
//!     let connector = SshConnector::new(Session::builder().timeout(Duration::from_secs(120)));
//!     for outcome in run_all(&connector, &targets, &config).await {
//!         println!("{}", outcome);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Custom channels
//!
//! The workflow is generic over [`Connector`] and [`DeviceChannel`], so any
//! transport that can send a line and return text can drive it.

#![warn(missing_docs)]

mod buffer;
mod pattern;
mod result;
mod session;

pub mod classify;
pub mod config;
pub mod target;
pub mod workflow;

// Public API exports
pub use config::{ConfigError, NoAppPolicy, ResponseMarkers, UpgradeConfig};
pub use pattern::Pattern;
pub use result::{CommandResult, ConnectError, DriverError, PatternError};
pub use session::{Connector, DeviceChannel, Session, SessionBuilder, SshConnector, WaitPolicy};
pub use target::{load_device_list, parse_device_list, targets_from, Credentials, DeviceTarget};
pub use workflow::{run_all, upgrade_device, OutcomeSummary, UpgradeOutcome, UpgradeStatus};
