//! Matchers that locate patterns in the session buffer

use crate::result::PatternError;
use regex::bytes::Regex as BytesRegex;

/// Location of a pattern match in a byte slice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    /// Start position of the match
    pub start: usize,
    /// End position of the match
    pub end: usize,
}

/// Trait for pattern matching
pub trait Matcher: Send + Sync {
    /// Find the first match in the buffer
    fn find(&self, buffer: &[u8]) -> Option<Match>;
}

/// Exact substring matcher
pub struct ExactMatcher {
    needle: Vec<u8>,
}

impl ExactMatcher {
    /// Create a new exact matcher
    pub fn new(needle: impl Into<Vec<u8>>) -> Result<Self, PatternError> {
        let needle = needle.into();
        if needle.is_empty() {
            return Err(PatternError::EmptyPattern);
        }
        Ok(Self { needle })
    }
}

impl Matcher for ExactMatcher {
    fn find(&self, buffer: &[u8]) -> Option<Match> {
        buffer
            .windows(self.needle.len())
            .position(|w| w == self.needle.as_slice())
            .map(|start| Match {
                start,
                end: start + self.needle.len(),
            })
    }
}

/// Regex matcher.
///
/// Runs over raw bytes so stray non-UTF-8 output from a device (line noise,
/// partial escape sequences) never hides a prompt that follows it.
pub struct RegexMatcher {
    regex: BytesRegex,
}

impl RegexMatcher {
    /// Create a new regex matcher
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        Ok(Self {
            regex: BytesRegex::new(pattern)?,
        })
    }
}

impl Matcher for RegexMatcher {
    fn find(&self, buffer: &[u8]) -> Option<Match> {
        self.regex.find(buffer).map(|m| Match {
            start: m.start(),
            end: m.end(),
        })
    }
}
