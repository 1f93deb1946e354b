//! Result types for device command exchanges

mod error;

pub use error::{ConnectError, DriverError, PatternError};

/// Outcome of one pattern wait inside the session read loop.
#[derive(Debug, Clone)]
pub(crate) struct MatchResult {
    /// Index of the pattern that matched in the slice passed to `expect_any`.
    pub pattern_index: usize,

    /// The matched text (empty for EOF/timeout).
    pub matched: String,

    /// Unconsumed text that appeared before the match.
    pub before: String,
}

/// Raw text response to one issued command.
///
/// Device output is treated as opaque text: callers decide what to do next by
/// looking for substrings or line patterns in [`output`](Self::output).
///
/// # Examples
///
/// ```
/// use apphost_upgrade::CommandResult;
///
/// let result = CommandResult::new("dir bootflash:/apps", "%Error opening bootflash:/apps");
/// assert!(result.contains("%Error opening"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    /// The command line that was sent (empty for a bare continuation).
    pub command: String,

    /// Everything the device emitted in response.
    pub output: String,
}

impl CommandResult {
    /// Build a result from a command and its response text.
    pub fn new(command: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            output: output.into(),
        }
    }

    /// Whether the response contains `needle` (case-sensitive).
    pub fn contains(&self, needle: &str) -> bool {
        self.output.contains(needle)
    }

    /// Response lines with trailing carriage returns removed.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.output.lines().map(|l| l.trim_end_matches('\r'))
    }
}
