//! ssh client launch, login handshake and terminal preparation

use crate::pattern::Pattern;
use crate::result::{ConnectError, DriverError};
use crate::session::{Connector, DeviceChannel, Session, SessionBuilder, WaitPolicy};
use crate::target::DeviceTarget;
use portable_pty::CommandBuilder;
use std::time::Duration;
use tracing::debug;

/// Commands that stop the device paging long output.
const TERMINAL_SETUP: [&str; 2] = ["terminal length 0", "terminal width 511"];

/// Build `ssh -o <opt>... -p <port> -l <user> -- <address>`.
///
/// `--` ends option parsing, so an address read from the device list can
/// never be taken for an ssh option.
pub(crate) fn ssh_command(program: &str, options: &[String], target: &DeviceTarget) -> CommandBuilder {
    let mut cmd = CommandBuilder::new(program);
    for option in options {
        cmd.arg("-o");
        cmd.arg(option);
    }
    cmd.arg("-p");
    cmd.arg(target.port.to_string());
    cmd.arg("-l");
    cmd.arg(&target.credentials.username);
    cmd.arg("--");
    cmd.arg(&target.address);
    cmd
}

fn literal(s: &str) -> Pattern {
    Pattern::exact(s)
}

fn password_prompt() -> Pattern {
    Pattern::regex(r"[Pp]assword:").expect("password regex is valid")
}

/// Drive the ssh client from spawn to the first device prompt.
pub(crate) async fn login(
    session: &mut Session,
    target: &DeviceTarget,
    timeout: Duration,
) -> Result<(), DriverError> {
    let address = target.address.clone();
    let prompt = session.prompt.clone();

    let connect_patterns = [
        password_prompt(),                              // 0
        prompt.clone(),                                 // 1
        literal("continue connecting (yes/no"),         // 2
        literal("Permission denied"),                   // 3
        literal("Host key verification failed"),        // 4
        literal("Connection refused"),                  // 5
        literal("No route to host"),                    // 6
        literal("Could not resolve hostname"),          // 7
        literal("Connection timed out"),                // 8
        literal("Connection closed"),                   // 9
        Pattern::Eof,                                   // 10
        Pattern::Timeout,                               // 11
    ];

    loop {
        let result = session.expect_any(&connect_patterns, Some(timeout)).await?;
        debug!(device = %address, index = result.pattern_index, matched = %result.matched, "login");
        match result.pattern_index {
            0 => break,
            1 => return Ok(()),
            2 => session.send_line("yes").await?,
            3 => return Err(ConnectError::AuthenticationRejected { address }.into()),
            4 => return Err(ConnectError::HostKey { address }.into()),
            5..=9 => {
                return Err(ConnectError::Unreachable {
                    address,
                    reason: result.matched,
                }
                .into())
            }
            10 => {
                return Err(ConnectError::Unreachable {
                    address,
                    reason: last_line(&result.before),
                }
                .into())
            }
            _ => {
                return Err(ConnectError::Timeout {
                    address,
                    duration: timeout,
                }
                .into())
            }
        }
    }

    session.send_line(target.credentials.password()).await?;

    let auth_patterns = [
        prompt,                          // 0
        literal("Permission denied"),    // 1
        password_prompt(),               // 2
        literal("Authentication failed"), // 3
        Pattern::Eof,                    // 4
        Pattern::Timeout,                // 5
    ];

    let result = session.expect_any(&auth_patterns, Some(timeout)).await?;
    debug!(device = %address, index = result.pattern_index, matched = %result.matched, "auth");
    match result.pattern_index {
        0 => Ok(()),
        1..=4 => Err(ConnectError::AuthenticationRejected { address }.into()),
        _ => Err(ConnectError::Timeout {
            address,
            duration: timeout,
        }
        .into()),
    }
}

/// Disable paging so prompt waits see complete listings.
pub(crate) async fn prepare_terminal(session: &mut Session) -> Result<(), DriverError> {
    for command in TERMINAL_SETUP {
        session.issue(command, WaitPolicy::Prompt).await?;
    }
    Ok(())
}

fn last_line(text: &str) -> String {
    let line = text
        .lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty())
        .unwrap_or("ssh exited before login");
    line.to_string()
}

/// [`Connector`] that opens [`Session`]s with the system ssh client.
#[derive(Debug, Clone, Default)]
pub struct SshConnector {
    builder: SessionBuilder,
}

impl SshConnector {
    /// Connector that opens every session with `builder`'s settings.
    pub fn new(builder: SessionBuilder) -> Self {
        Self { builder }
    }
}

impl Connector for SshConnector {
    type Channel = Session;

    async fn open(&self, target: &DeviceTarget) -> Result<Session, DriverError> {
        self.builder.clone().open(target).await
    }
}
