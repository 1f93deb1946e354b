//! Session driver: one interactive channel per device
//!
//! A [`Session`] runs the system `ssh` client inside a pseudo-terminal and
//! serialises command execution on it: one command is issued, its response
//! collected according to a [`WaitPolicy`], then the next. The workflow only
//! sees the [`DeviceChannel`] and [`Connector`] traits, so it can be driven by
//! a scripted fake in tests.

mod builder;
mod ssh;

pub use builder::SessionBuilder;
pub use ssh::SshConnector;

use crate::buffer::BufferManager;
use crate::pattern::{Matcher, Pattern};
use crate::result::{CommandResult, DriverError, MatchResult};
use crate::target::DeviceTarget;
use portable_pty::{Child, ChildKiller, MasterPty};
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// How long [`DeviceChannel::issue`] waits for a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Wait for the device prompt, bounded by the session command timeout.
    /// The returned text is everything before the prompt.
    Prompt,

    /// Wait exactly this long and return whatever arrived, prompt or not.
    ///
    /// Used for commands that stop at an interactive sub-prompt
    /// (`Destination filename [x]?`, `[confirm]`) which never looks like the
    /// device prompt.
    Delay(Duration),
}

/// A serialized request/response channel to one device.
pub trait DeviceChannel: Send {
    /// Send one command line and collect the response.
    ///
    /// An empty `command` sends a bare newline, which is how interactive
    /// sub-prompts are accepted.
    fn issue(
        &mut self,
        command: &str,
        wait: WaitPolicy,
    ) -> impl Future<Output = Result<CommandResult, DriverError>> + Send;

    /// Wait for the device to return to its prompt without sending anything.
    ///
    /// Returns immediately with empty output when the last response already
    /// ended at the prompt.
    fn settle(
        &mut self,
        timeout: Duration,
    ) -> impl Future<Output = Result<CommandResult, DriverError>> + Send;

    /// Release the channel. Calling it again is a no-op.
    fn close(&mut self) -> impl Future<Output = Result<(), DriverError>> + Send;
}

/// Opens authenticated channels to devices.
pub trait Connector {
    /// Channel type produced by this connector
    type Channel: DeviceChannel;

    /// Open and authenticate a channel to `target`.
    fn open(
        &self,
        target: &DeviceTarget,
    ) -> impl Future<Output = Result<Self::Channel, DriverError>> + Send;
}

/// Interactive session with one device.
///
/// # Examples
///
/// ```no_run
/// use apphost_upgrade::{Credentials, DeviceChannel, DeviceTarget, Session, WaitPolicy};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let target = DeviceTarget::new("10.0.0.1", Credentials::new("admin", "secret"));
/// let mut session = Session::builder()
///     .timeout(Duration::from_secs(30))
///     .open(&target)
///     .await?;
///
/// let listing = session.issue("show app-hosting list", WaitPolicy::Prompt).await?;
/// println!("{}", listing.output);
/// session.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct Session {
    _master: Box<dyn MasterPty + Send>,
    child: Option<Box<dyn Child + Send>>,
    output: UnboundedReceiver<Vec<u8>>,
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    buffer: BufferManager,
    prompt: Pattern,
    timeout: Duration,
    label: String,
    at_prompt: bool,
    eof_reached: bool,
    /// A shell is listening; false while an ssh login is still in progress.
    shell_ready: bool,
    closed: bool,
}

impl Session {
    /// Create a new session builder.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Label used in log lines (the device address for ssh sessions).
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether [`close`](DeviceChannel::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Wait for any of the given patterns (first match wins).
    ///
    /// On a match, the text before it is returned and everything through the
    /// match is consumed.
    pub(crate) async fn expect_any(
        &mut self,
        patterns: &[Pattern],
        timeout: Option<Duration>,
    ) -> Result<MatchResult, DriverError> {
        let mut matchers: Vec<(usize, Box<dyn Matcher>)> = Vec::new();
        for (idx, pattern) in patterns.iter().enumerate() {
            if !pattern.is_special() {
                matchers.push((idx, pattern.to_matcher()?));
            }
        }
        let eof_index = patterns.iter().position(|p| matches!(p, Pattern::Eof));
        let timeout_index = patterns.iter().position(|p| matches!(p, Pattern::Timeout));

        let start_time = Instant::now();

        loop {
            let base = self.buffer.consumed_position();
            let found = matchers
                .iter()
                .filter_map(|(idx, m)| m.find(self.buffer.unconsumed()).map(|hit| (*idx, hit)))
                .min_by_key(|(idx, hit)| (hit.start, *idx));

            if let Some((pattern_index, hit)) = found {
                let (start, end) = (base + hit.start, base + hit.end);
                let matched = self.buffer.slice_text(start, end);
                let before = self.buffer.take_until(start, end);
                return Ok(MatchResult {
                    pattern_index,
                    matched,
                    before,
                });
            }

            if self.eof_reached {
                return match eof_index {
                    Some(pattern_index) => Ok(MatchResult {
                        pattern_index,
                        matched: String::new(),
                        before: self.buffer.take_all(),
                    }),
                    None => Err(DriverError::Eof),
                };
            }

            let remaining = match timeout {
                Some(limit) => {
                    let left = limit.saturating_sub(start_time.elapsed());
                    if left.is_zero() {
                        return self.timed_out(timeout_index, limit);
                    }
                    Some(left)
                }
                None => None,
            };

            let chunk = match remaining {
                Some(left) => match tokio::time::timeout(left, self.output.recv()).await {
                    Ok(chunk) => chunk,
                    Err(_) => continue,
                },
                None => self.output.recv().await,
            };

            match chunk {
                Some(data) => {
                    trace!(session = %self.label, bytes = data.len(), "read");
                    self.buffer.append(&data);
                }
                None => self.eof_reached = true,
            }
        }
    }

    fn timed_out(
        &mut self,
        timeout_index: Option<usize>,
        limit: Duration,
    ) -> Result<MatchResult, DriverError> {
        match timeout_index {
            Some(pattern_index) => Ok(MatchResult {
                pattern_index,
                matched: String::new(),
                before: self.buffer.take_all(),
            }),
            None => Err(DriverError::Timeout { duration: limit }),
        }
    }

    /// Read for exactly `delay`, then return everything unconsumed.
    async fn collect_for(&mut self, delay: Duration) -> String {
        let deadline = tokio::time::Instant::now() + delay;
        while !self.eof_reached {
            match tokio::time::timeout_at(deadline, self.output.recv()).await {
                Ok(Some(data)) => self.buffer.append(&data),
                Ok(None) => self.eof_reached = true,
                Err(_) => break,
            }
        }
        self.buffer.take_all()
    }

    /// Write raw bytes to the channel.
    pub(crate) async fn send(&mut self, data: &[u8]) -> Result<(), DriverError> {
        if self.closed {
            return Err(DriverError::Closed);
        }
        let writer = self.writer.clone();
        let data = data.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut writer = writer.blocking_lock();
            writer.write_all(&data)?;
            writer.flush()
        })
        .await
        .map_err(|e| DriverError::IoError(std::io::Error::other(e)))??;

        Ok(())
    }

    /// Send a line terminated by a newline.
    pub(crate) async fn send_line(&mut self, line: &str) -> Result<(), DriverError> {
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');
        self.send(&data).await
    }

    fn ends_at_prompt(&self, text: &str) -> Result<bool, DriverError> {
        Ok(self.prompt.to_matcher()?.find(text.as_bytes()).is_some())
    }

    fn kill_child(&mut self) -> Option<Box<dyn Child + Send>> {
        let mut child = self.child.take()?;
        if let Err(e) = child.kill() {
            // Already exited is the common case here.
            trace!(session = %self.label, error = %e, "kill");
        }
        Some(child)
    }
}

impl DeviceChannel for Session {
    async fn issue(&mut self, command: &str, wait: WaitPolicy) -> Result<CommandResult, DriverError> {
        if self.closed {
            return Err(DriverError::Closed);
        }
        debug!(session = %self.label, command, ?wait, "issue");
        self.send_line(command).await?;

        self.at_prompt = false;
        let output = match wait {
            WaitPolicy::Prompt => {
                let prompt = [self.prompt.clone()];
                let before = self.expect_any(&prompt, Some(self.timeout)).await?.before;
                self.at_prompt = true;
                before
            }
            WaitPolicy::Delay(delay) => {
                let text = self.collect_for(delay).await;
                self.at_prompt = self.ends_at_prompt(&text)?;
                text
            }
        };

        debug!(session = %self.label, command, bytes = output.len(), "response");
        Ok(CommandResult::new(command, output))
    }

    async fn settle(&mut self, timeout: Duration) -> Result<CommandResult, DriverError> {
        if self.closed {
            return Err(DriverError::Closed);
        }
        if self.at_prompt {
            return Ok(CommandResult::default());
        }
        debug!(session = %self.label, ?timeout, "settle");
        let prompt = [self.prompt.clone()];
        let before = self.expect_any(&prompt, Some(timeout)).await?.before;
        self.at_prompt = true;
        Ok(CommandResult::new("", before))
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        if self.closed {
            return Ok(());
        }
        if self.shell_ready && !self.eof_reached {
            // Polite logout; the kill below is what guarantees release.
            let _ = self.send_line("exit").await;
        }
        self.closed = true;

        if let Some(mut child) = self.kill_child() {
            tokio::task::spawn_blocking(move || child.wait())
                .await
                .map_err(|e| DriverError::IoError(std::io::Error::other(e)))??;
        }
        debug!(session = %self.label, "closed");
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.kill_child();
    }
}
