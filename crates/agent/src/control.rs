//! Control channel messages from the hosting application.
//!
//! A control message is a JSON object with a `type` field identifying the
//! command. Unrecognized or malformed messages are ignored.

/// `type` value that forces the waiting agent into activation.
pub const SKIP_WAITING: &str = "SKIP_WAITING";

/// Recognized control commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Activate the waiting version now instead of waiting for all
    /// application views to close.
    SkipWaiting,
}

impl Command {
    /// Parse a raw control message. Returns None for anything that is not
    /// a recognized command, which the caller ignores.
    pub fn parse(raw: &serde_json::Value) -> Option<Command> {
        match raw.get("type").and_then(|v| v.as_str()) {
            Some(SKIP_WAITING) => Some(Command::SkipWaiting),
            _ => None,
        }
    }
}
