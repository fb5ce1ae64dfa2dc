//! Server replies
//!
//! Every POP3 reply starts with a status indicator, `+OK` or `-ERR`.
//! [`Response`] keeps the indicator as a flag alongside the text.

use crate::error::{Error, Result};
use serde::Serialize;

pub(crate) const OK: &str = "+OK";
pub(crate) const ERR: &str = "-ERR";

/// The outcome of a single command round trip.
///
/// `-ERR` replies are ordinary values with `success == false`; they
/// never surface as [`Error`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response {
    /// `true` for `+OK`, `false` for `-ERR` or a dropped connection.
    pub success: bool,
    /// The reply with its status indicator and the following space
    /// removed.
    pub body: String,
    /// The reply exactly as received.
    pub raw: String,
}

impl Response {
    /// Interpret raw reply text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the text does not start with a
    /// status indicator.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();

        let (success, rest) = if let Some(rest) = raw.strip_prefix(OK) {
            (true, rest)
        } else if let Some(rest) = raw.strip_prefix(ERR) {
            (false, rest)
        } else {
            return Err(Error::Protocol(format!(
                "empty or unknown response: {:?}",
                first_line(&raw)
            )));
        };

        // Status indicators are followed by a space or the end of line.
        let body = rest.strip_prefix(' ').unwrap_or(rest).to_string();
        Ok(Self { success, body, raw })
    }

    /// The failed, empty response reported after the transport has
    /// been torn down mid round trip.
    #[must_use]
    pub const fn dropped() -> Self {
        Self {
            success: false,
            body: String::new(),
            raw: String::new(),
        }
    }

    /// Whether this is the placeholder for a lost connection.
    #[must_use]
    pub fn is_dropped(&self) -> bool {
        !self.success && self.raw.is_empty()
    }

    /// The status line without its indicator or line terminator.
    #[must_use]
    pub fn status_text(&self) -> &str {
        first_line(&self.body)
    }

    /// Data lines of a multi-line reply.
    ///
    /// Drops the status line and the closing `.` line, and undoes
    /// dot-stuffing. Each returned line ends with CRLF. Returns an
    /// empty string for single-line replies.
    #[must_use]
    pub fn payload(&self) -> String {
        let Some((_, data)) = self.raw.split_once("\r\n") else {
            return String::new();
        };
        let data = data.strip_suffix(".\r\n").unwrap_or(data);

        let mut out = String::with_capacity(data.len());
        for line in data.split_inclusive("\r\n") {
            out.push_str(line.strip_prefix('.').unwrap_or(line));
        }
        out
    }
}

fn first_line(text: &str) -> &str {
    text.split("\r\n").next().unwrap_or_default()
}
