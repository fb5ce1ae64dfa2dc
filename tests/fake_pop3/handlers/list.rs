//! LIST command handler.
//!
//! Responds with a status line, one scan listing per message not
//! marked for deletion, and the closing `.` line (RFC 1939 Section 5):
//!
//! ```text
//! +OK 2 messages (320 octets)
//! 1 120
//! 2 200
//! .
//! ```

use crate::fake_pop3::io::write_line;
use crate::fake_pop3::mailbox::Session;
use std::fmt::Write as _;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Handle the LIST command.
pub async fn handle_list<S: AsyncRead + AsyncWrite + Unpin>(
    session: &Session,
    stream: &mut BufReader<S>,
) {
    let live: Vec<_> = session.live().collect();
    let total: usize = live.iter().map(|(_, m)| m.raw.len()).sum();

    let mut resp = format!("+OK {} messages ({total} octets)\r\n", live.len());
    for (number, message) in &live {
        let _ = write!(resp, "{number} {}\r\n", message.raw.len());
    }
    resp.push_str(".\r\n");
    let _ = write_line(stream, &resp).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_pop3::io::collect;
    use crate::fake_pop3::mailbox::MailboxBuilder;

    async fn run(session: &Session) -> String {
        let (client, server) = tokio::io::duplex(4096);
        let mut stream = BufReader::new(server);

        handle_list(session, &mut stream).await;
        drop(stream);
        collect(client).await
    }

    fn session_with(messages: &[&[u8]]) -> Session {
        let mailbox = messages
            .iter()
            .fold(MailboxBuilder::new(), |b, m| b.message(m))
            .build();
        Session {
            authenticated: true,
            messages: mailbox.messages,
            ..Session::default()
        }
    }

    #[tokio::test]
    async fn lists_every_message() {
        let session = session_with(&[b"12345", b"1234567890"]);
        let output = run(&session).await;
        assert_eq!(output, "+OK 2 messages (15 octets)\r\n1 5\r\n2 10\r\n.\r\n");
    }

    #[tokio::test]
    async fn skips_deleted_messages() {
        let mut session = session_with(&[b"aa", b"bbb"]);
        session.deleted.insert(1);
        let output = run(&session).await;
        assert_eq!(output, "+OK 1 messages (3 octets)\r\n2 3\r\n.\r\n");
    }

    #[tokio::test]
    async fn empty_maildrop() {
        let output = run(&session_with(&[])).await;
        assert_eq!(output, "+OK 0 messages (0 octets)\r\n.\r\n");
    }
}
