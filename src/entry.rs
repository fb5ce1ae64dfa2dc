//! LIST scan listings
//!
//! A successful LIST reply carries one "scan listing" per message:
//! the message number, a space, and the size in octets.

use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;

/// One message as reported by LIST.
///
/// The id is only meaningful for the session that produced it; the
/// server may renumber messages on the next connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MailboxEntry {
    pub id: u32,
    pub size: u64,
}

impl fmt::Display for MailboxEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.size)
    }
}

/// Parse the data lines of a LIST reply.
///
/// Lines without a space, or not starting with a digit, are skipped;
/// that covers the closing `.` line and blank trailing lines.
///
/// # Errors
///
/// Returns [`Error::Parse`] if a scan listing has a non-numeric id or
/// size.
pub fn parse_listing(text: &str) -> Result<Vec<MailboxEntry>> {
    let mut entries = Vec::new();

    for line in text.split("\r\n") {
        let Some((id, rest)) = line.split_once(' ') else {
            continue;
        };
        if !line.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }

        let size = rest.split_whitespace().next().unwrap_or_default();
        entries.push(MailboxEntry {
            id: id
                .parse()
                .map_err(|e| Error::Parse(format!("invalid message id in {line:?}: {e}")))?,
            size: size
                .parse()
                .map_err(|e| Error::Parse(format!("invalid message size in {line:?}: {e}")))?,
        });
    }

    Ok(entries)
}
