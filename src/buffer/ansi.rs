//! Terminal control sequence filtering

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum State {
    #[default]
    Text,
    Escape,
    Csi,
    Osc,
    OscEscape,
    Charset,
}

/// Removes ANSI escape sequences and backspaces from device output.
///
/// IOS terminals emit CSI sequences for line redraws and `\x08` runs when
/// erasing `--More--` markers; neither carries text the workflow cares about.
/// The parser state survives between calls, so a sequence split across two
/// PTY reads is still removed whole.
#[derive(Debug, Default)]
pub struct AnsiStripper {
    state: State,
}

impl AnsiStripper {
    /// Filter one chunk of output.
    pub fn feed(&mut self, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(data.len());

        for &byte in data {
            self.state = match (self.state, byte) {
                (State::Text, 0x1b) => State::Escape,
                (State::Text, 0x08) => State::Text,
                (State::Text, b) => {
                    out.push(b);
                    State::Text
                }
                (State::Escape, b'[') => State::Csi,
                (State::Escape, b']') => State::Osc,
                (State::Escape, b'(' | b')') => State::Charset,
                (State::Escape, _) => State::Text,
                (State::Csi, b) if (0x40..=0x7e).contains(&b) => State::Text,
                (State::Csi, _) => State::Csi,
                (State::Osc, 0x07) => State::Text,
                (State::Osc, 0x1b) => State::OscEscape,
                (State::Osc, _) => State::Osc,
                (State::OscEscape, b'\\') => State::Text,
                (State::OscEscape, _) => State::Osc,
                (State::Charset, _) => State::Text,
            };
        }

        out
    }
}
