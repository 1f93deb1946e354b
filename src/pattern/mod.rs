//! Pattern matching for device prompts

mod matcher;

pub use matcher::Matcher;

use crate::result::PatternError;
use regex::Regex;

/// Regex for an IOS exec prompt at the end of the buffer: a hostname,
/// an optional parenthesised config mode, then `#` or `>`.
pub const IOS_PROMPT_REGEX: &str = r"(?:\A|[\r\n])[A-Za-z0-9][\w.\-]*(?:\([\w.\-]+\))?[#>]\s*\z";

/// Patterns for matching device output.
///
/// - **Exact**: substring match
/// - **Regex**: regular expression match
/// - **Eof**: matches when the ssh client exits
/// - **Timeout**: matches when the wait times out
///
/// # Examples
///
/// ```
/// use apphost_upgrade::Pattern;
///
/// let confirm = Pattern::exact("[confirm]");
/// let password = Pattern::regex(r"[Pp]assword:").unwrap();
/// let prompt = Pattern::device_prompt();
/// ```
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Exact substring match.
    Exact(String),

    /// Regular expression match.
    Regex(Regex),

    /// Match end of file.
    ///
    /// Matches when the ssh client exits and no more output is available.
    Eof,

    /// Match timeout condition.
    ///
    /// When present in an `expect_any` list, a timeout is reported as a match
    /// on this pattern instead of an error.
    Timeout,
}

impl Pattern {
    /// Create an exact substring pattern.
    pub fn exact(s: impl Into<String>) -> Self {
        Pattern::Exact(s.into())
    }

    /// Create a regex pattern.
    ///
    /// # Errors
    ///
    /// Returns a regex error if the pattern is invalid.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Pattern::Regex(Regex::new(pattern)?))
    }

    /// The default IOS exec/config prompt (`Router#`, `sw1>`, `R1(config)#`).
    pub fn device_prompt() -> Self {
        Pattern::Regex(Regex::new(IOS_PROMPT_REGEX).expect("prompt regex is valid"))
    }

    /// Convert pattern to a matcher implementation
    pub fn to_matcher(&self) -> Result<Box<dyn Matcher>, PatternError> {
        use matcher::{ExactMatcher, RegexMatcher};

        match self {
            Pattern::Exact(s) => Ok(Box::new(ExactMatcher::new(s.as_bytes())?)),
            Pattern::Regex(r) => Ok(Box::new(RegexMatcher::new(r.as_str())?)),
            Pattern::Eof | Pattern::Timeout => Err(PatternError::Special),
        }
    }

    /// Check if this is a special pattern (EOF, Timeout)
    pub fn is_special(&self) -> bool {
        matches!(self, Pattern::Eof | Pattern::Timeout)
    }
}
