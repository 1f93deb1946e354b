//! Session builder for configuration

use crate::buffer::BufferManager;
use crate::pattern::Pattern;
use crate::result::{ConnectError, DriverError};
use crate::session::{ssh, Session};
use crate::target::DeviceTarget;
use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::sync::Mutex;

/// Default timeout for prompt waits (in seconds)
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default timeout for the ssh login handshake (in seconds)
const DEFAULT_LOGIN_TIMEOUT_SECS: u64 = 30;

/// Default maximum buffer size (in bytes)
const DEFAULT_MAX_BUFFER_SIZE: usize = 256 * 1024;

/// Default PTY rows
const DEFAULT_PTY_ROWS: u16 = 24;

/// Default PTY columns
const DEFAULT_PTY_COLS: u16 = 200;

/// Builder for configuring and opening sessions.
///
/// # Defaults
///
/// - Prompt timeout: 60 seconds
/// - Login timeout: 30 seconds
/// - Max buffer size: 256 KiB
/// - ANSI stripping: enabled
/// - PTY size: 24 rows × 200 columns
/// - Prompt: [`Pattern::device_prompt`]
/// - ssh program `ssh` with `-o StrictHostKeyChecking=accept-new`
///
/// # Examples
///
/// ```no_run
/// use apphost_upgrade::{Credentials, DeviceTarget, Session};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let target = DeviceTarget::new("10.0.0.1", Credentials::new("admin", "secret"));
/// let session = Session::builder()
///     .timeout(Duration::from_secs(120))
///     .ssh_option("KexAlgorithms=+diffie-hellman-group14-sha1")
///     .open(&target)
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    timeout: Duration,
    login_timeout: Duration,
    max_buffer_size: usize,
    strip_ansi: bool,
    pty_size: PtySize,
    prompt: Pattern,
    ssh_program: String,
    ssh_options: Vec<String>,
    prepare_terminal: bool,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    /// Create a new session builder with default configuration.
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            login_timeout: Duration::from_secs(DEFAULT_LOGIN_TIMEOUT_SECS),
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            strip_ansi: true,
            pty_size: PtySize {
                rows: DEFAULT_PTY_ROWS,
                cols: DEFAULT_PTY_COLS,
                pixel_width: 0,
                pixel_height: 0,
            },
            prompt: Pattern::device_prompt(),
            ssh_program: "ssh".to_string(),
            ssh_options: vec!["StrictHostKeyChecking=accept-new".to_string()],
            prepare_terminal: true,
        }
    }

    /// Set the timeout for prompt waits ([`WaitPolicy::Prompt`](crate::WaitPolicy::Prompt)).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the timeout for the login handshake.
    pub fn login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    /// Set maximum buffer size in bytes.
    pub fn max_buffer_size(mut self, size: usize) -> Self {
        self.max_buffer_size = size;
        self
    }

    /// Enable or disable ANSI escape sequence stripping.
    pub fn strip_ansi(mut self, strip: bool) -> Self {
        self.strip_ansi = strip;
        self
    }

    /// Set PTY (terminal) size.
    pub fn pty_size(mut self, rows: u16, cols: u16) -> Self {
        self.pty_size = PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        };
        self
    }

    /// Replace the pattern that marks the end of a command's output.
    pub fn prompt(mut self, prompt: Pattern) -> Self {
        self.prompt = prompt;
        self
    }

    /// Use a different ssh client binary.
    pub fn ssh_program(mut self, program: impl Into<String>) -> Self {
        self.ssh_program = program.into();
        self
    }

    /// Add an `-o` option for the ssh client (e.g. `HostKeyAlgorithms=+ssh-rsa`).
    pub fn ssh_option(mut self, option: impl Into<String>) -> Self {
        self.ssh_options.push(option.into());
        self
    }

    /// Drop all ssh `-o` options, including the defaults.
    pub fn clear_ssh_options(mut self) -> Self {
        self.ssh_options.clear();
        self
    }

    /// Whether to disable paging (`terminal length 0`) after login.
    pub fn prepare_terminal(mut self, prepare: bool) -> Self {
        self.prepare_terminal = prepare;
        self
    }

    /// Open an authenticated ssh session to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Connect`] if the ssh client cannot start, the
    /// device is unreachable, rejects the credentials, or does not present a
    /// prompt within the login timeout.
    pub async fn open(self, target: &DeviceTarget) -> Result<Session, DriverError> {
        let command = ssh::ssh_command(&self.ssh_program, &self.ssh_options, target);
        let login_timeout = self.login_timeout;
        let prepare = self.prepare_terminal;
        let mut session = self.spawn_command(command, target.address.clone())?;
        // Until login succeeds anything typed may land at a password prompt.
        session.shell_ready = false;

        let ready = async {
            ssh::login(&mut session, target, login_timeout).await?;
            session.shell_ready = true;
            if prepare {
                ssh::prepare_terminal(&mut session).await?;
            }
            Ok::<(), DriverError>(())
        }
        .await;

        match ready {
            Ok(()) => Ok(session),
            Err(e) => {
                use crate::session::DeviceChannel;
                let _ = session.close().await;
                Err(e)
            }
        }
    }

    /// Spawn an arbitrary local command as the session's far end.
    ///
    /// The command line is split on whitespace. No login is performed; this
    /// is useful for driving local CLIs or test doubles.
    ///
    /// # Errors
    ///
    /// Returns an error if the command string is empty or the PTY or process
    /// cannot be created.
    pub fn spawn(self, command: &str) -> Result<Session, DriverError> {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| ConnectError::Spawn("Empty command".to_string()))?;

        let mut cmd = CommandBuilder::new(program);
        for arg in parts {
            cmd.arg(arg);
        }
        self.spawn_command(cmd, program.to_string())
    }

    fn spawn_command(self, cmd: CommandBuilder, label: String) -> Result<Session, DriverError> {
        let pty_pair = native_pty_system()
            .openpty(self.pty_size)
            .map_err(|e| DriverError::PtyError(e.to_string()))?;

        let child = pty_pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| ConnectError::Spawn(e.to_string()))?;
        // The child holds its own handle; keeping ours would hide its exit.
        drop(pty_pair.slave);

        let reader = pty_pair
            .master
            .try_clone_reader()
            .map_err(|e| DriverError::PtyError(e.to_string()))?;
        let writer = pty_pair
            .master
            .take_writer()
            .map_err(|e| DriverError::PtyError(e.to_string()))?;

        let (tx, rx) = unbounded_channel();
        std::thread::Builder::new()
            .name(format!("pty-reader-{}", label))
            .spawn(move || pump_output(reader, tx))?;

        Ok(Session {
            _master: pty_pair.master,
            child: Some(child),
            output: rx,
            writer: Arc::new(Mutex::new(writer)),
            buffer: BufferManager::new(self.max_buffer_size, self.strip_ansi),
            prompt: self.prompt,
            timeout: self.timeout,
            label,
            at_prompt: false,
            eof_reached: false,
            shell_ready: true,
            closed: false,
        })
    }
}

/// Forward PTY output to the session until EOF or the session is dropped.
fn pump_output(mut reader: Box<dyn Read + Send>, tx: UnboundedSender<Vec<u8>>) {
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            // EIO once the child side closes
            Err(_) => break,
        }
    }
}
