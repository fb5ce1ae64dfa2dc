//! Response boundary detection
//!
//! POP3 replies arrive as an unstructured byte stream. A reply is
//! either a single CRLF-terminated status line, or a status line
//! followed by data lines and a closing line holding only `.`.
//! [`ResponseFramer`] accumulates socket reads until one of those
//! shapes is complete.

pub(crate) const CRLF: &[u8] = b"\r\n";
pub(crate) const TERMINATOR: &[u8] = b"\r\n.\r\n";

/// How the end of a reply is recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// Infer the shape from the bytes seen so far: one CRLF at the end
    /// of the buffer completes a single-line reply; once more than one
    /// CRLF has been seen, the reply is held open until it ends with
    /// `CRLF . CRLF`.
    ///
    /// A multi-line reply whose status line arrives in a read of its
    /// own is indistinguishable from a single-line one, so commands
    /// with a known reply shape should use the other variants.
    #[default]
    Detect,
    /// Complete at the first CRLF.
    SingleLine,
    /// Complete at the first CRLF after `-ERR`, otherwise at the
    /// closing `.` line.
    MultiLine,
}

/// Accumulates reads until a complete reply has been seen.
#[derive(Debug)]
pub struct ResponseFramer {
    framing: Framing,
    buffer: Vec<u8>,
    /// Offset from which CRLFs have not been counted yet.
    scanned: usize,
    crlf_count: usize,
    /// End of the status line (index just past its CRLF).
    status_end: Option<usize>,
}

impl ResponseFramer {
    #[must_use]
    pub const fn new(framing: Framing) -> Self {
        Self {
            framing,
            buffer: Vec::new(),
            scanned: 0,
            crlf_count: 0,
            status_end: None,
        }
    }

    /// Append one read's worth of bytes. Returns `true` once the reply
    /// is complete.
    pub fn push(&mut self, chunk: &[u8]) -> bool {
        self.buffer.extend_from_slice(chunk);
        self.count_line_endings();
        self.is_complete()
    }

    /// Whether the bytes accumulated so far form a complete reply.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        let Some(status_end) = self.status_end else {
            return false;
        };

        match self.framing {
            Framing::SingleLine => true,
            Framing::Detect => {
                if self.crlf_count == 1 {
                    self.buffer.ends_with(CRLF)
                } else {
                    self.buffer.ends_with(TERMINATOR)
                }
            }
            Framing::MultiLine => {
                if self.buffer.starts_with(b"-") {
                    return true;
                }
                // The closing CRLF.CRLF may reuse the status line's CRLF
                // (empty listing), but must not start before it.
                self.buffer.ends_with(TERMINATOR)
                    && self.buffer.len() - TERMINATOR.len() + CRLF.len() >= status_end
            }
        }
    }

    /// Bytes accumulated so far.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the framer and return the reply text.
    ///
    /// Invalid UTF-8 (8-bit message bodies) is replaced rather than
    /// rejected.
    #[must_use]
    pub fn into_text(self) -> String {
        match String::from_utf8(self.buffer) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }
    }

    fn count_line_endings(&mut self) {
        let len = self.buffer.len();
        if len < CRLF.len() {
            return;
        }

        for i in self.scanned..len - 1 {
            if &self.buffer[i..i + 2] == CRLF {
                self.crlf_count += 1;
                if self.status_end.is_none() {
                    self.status_end = Some(i + 2);
                }
            }
        }
        // The last byte may be the '\r' of a CRLF split across reads.
        self.scanned = len - 1;
    }
}
