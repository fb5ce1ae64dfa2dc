//! In-process fake POP3 server for integration testing
//!
//! # How POP3 works (overview)
//!
//! POP3 (RFC 1939) is a line-based protocol for downloading mail from
//! a maildrop. Unlike IMAP there are no folders, flags, or tags: the
//! client sends one command, the server sends one reply.
//!
//! ## Connection lifecycle
//!
//! ```text
//!   Client connects via TCP to port 995
//!       |
//!   TLS handshake right away (implicit TLS, RFC 8314)
//!       |
//!   Server sends greeting: "+OK POP3 ready\r\n"      (AUTHORIZATION)
//!       |
//!   Client sends USER name, then PASS secret
//!       |
//!   Client issues LIST, RETR n, DELE n, ...          (TRANSACTION)
//!       |
//!   Client sends QUIT; deletions are committed       (UPDATE)
//! ```
//!
//! ## Replies
//!
//! Every reply starts with `+OK` or `-ERR`. Replies that carry data
//! (LIST, RETR) continue with more lines and end with a line holding
//! only `.`. Data lines that start with `.` get an extra `.` so they
//! cannot be mistaken for the end:
//!
//! ```text
//!   Client:  RETR 1
//!   Server:  +OK 120 octets
//!   Server:  Subject: hello
//!   Server:
//!   Server:  ..this line started with a dot
//!   Server:  .
//! ```

use super::handlers::{
    handle_dele, handle_list, handle_pass, handle_quit, handle_retr, handle_user,
};
use super::io::write_line;
use super::mailbox::{Mailbox, Session};
use rcgen::generate_simple_self_signed;
use rustls::pki_types::PrivatePkcs8KeyDer;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

/// A fake POP3 server that runs on localhost with an OS-assigned port.
///
/// The server generates a self-signed TLS certificate at startup using
/// `rcgen`, so clients must be configured with
/// `accept_invalid_certs = true`.
pub struct FakePop3Server {
    port: u16,
    mailbox: Arc<Mutex<Mailbox>>,
    /// Handle to the background task so it lives as long as the server.
    _handle: tokio::task::JoinHandle<()>,
}

impl FakePop3Server {
    /// Start a new fake POP3 server with the given maildrop.
    ///
    /// 1. Binds to `127.0.0.1:0` -- the OS picks a free port.
    /// 2. Generates a self-signed TLS certificate via `rcgen`.
    /// 3. Spawns a tokio task that accepts connections and speaks
    ///    POP3.
    pub async fn start(mailbox: Mailbox) -> Self {
        // Multiple tests may race to install the provider, so the
        // error for an already-installed one is ignored.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind to ephemeral port");
        let port = listener.local_addr().unwrap().port();

        let cert = generate_simple_self_signed(vec!["localhost".to_string()])
            .expect("generate self-signed cert");

        let cert_der = cert.cert.der().clone();
        let key_der = PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());

        let tls_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert_der], key_der.into())
            .expect("build server TLS config");

        let acceptor = TlsAcceptor::from(Arc::new(tls_config));
        let mailbox = Arc::new(Mutex::new(mailbox));

        let shared = Arc::clone(&mailbox);
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _addr)) = listener.accept().await else {
                    break;
                };
                let acceptor = acceptor.clone();
                let mailbox = Arc::clone(&shared);
                tokio::spawn(async move {
                    let Ok(tls_stream) = acceptor.accept(stream).await else {
                        return;
                    };
                    handle_pop3_session(tls_stream, &mailbox).await;
                });
            }
        });

        Self {
            port,
            mailbox,
            _handle: handle,
        }
    }

    /// The port the server is listening on.
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Raw contents of the messages currently in the maildrop.
    pub fn messages(&self) -> Vec<Vec<u8>> {
        self.mailbox
            .lock()
            .unwrap()
            .messages
            .iter()
            .map(|m| m.raw.clone())
            .collect()
    }
}

/// Run one POP3 session over an established TLS stream.
async fn handle_pop3_session<S: AsyncRead + AsyncWrite + Unpin>(
    stream: S,
    mailbox: &Mutex<Mailbox>,
) {
    let mut reader = BufReader::new(stream);
    let mut session = Session::default();

    if write_line(&mut reader, "+OK POP3 fake server ready\r\n")
        .await
        .is_err()
    {
        return;
    }

    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            continue;
        }

        let (verb, arg) = trimmed.split_once(' ').unwrap_or((trimmed, ""));
        let verb = verb.to_ascii_uppercase();

        let (username, hang_up_on) = {
            let mb = mailbox.lock().unwrap();
            (mb.username.clone(), mb.hang_up_on.clone())
        };
        if hang_up_on.as_deref() == Some(verb.as_str()) {
            break;
        }

        match verb.as_str() {
            "USER" => handle_user(arg, &username, &mut session, &mut reader).await,
            "PASS" => handle_pass(arg, mailbox, &mut session, &mut reader).await,
            "QUIT" => {
                handle_quit(&session, mailbox, &mut reader).await;
                break;
            }
            "LIST" | "RETR" | "DELE" if !session.authenticated => {
                if write_line(&mut reader, "-ERR not authenticated\r\n")
                    .await
                    .is_err()
                {
                    break;
                }
            }
            "LIST" => handle_list(&session, &mut reader).await,
            "RETR" => handle_retr(arg, &session, &mut reader).await,
            "DELE" => handle_dele(arg, &mut session, &mut reader).await,
            _ => {
                if write_line(&mut reader, "-ERR unknown command\r\n")
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }
    }
}
