//! POP3 client
//!
//! A [`Pop3Client`] drives exactly one session:
//!
//! ```text
//! Fresh --connect--> Connected --login--> Authenticated
//!   \                    |                     |
//!    \                   +---- quit / disconnect / I/O failure
//!     \                                 |
//!      +------------------------------> Closed
//! ```
//!
//! A closed client never reconnects. Messages marked with DELE are
//! only removed once the server has acknowledged QUIT, so callers that
//! delete and want to keep polling create a new client per cycle.

use crate::config::Pop3Config;
use crate::connection::{TlsStream, Transport};
use crate::entry::{MailboxEntry, parse_listing};
use crate::error::{Error, Result};
use crate::framing::Framing;
use crate::response::Response;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, not yet connected.
    Fresh,
    /// Greeting received, not logged in.
    Connected,
    /// PASS accepted.
    Authenticated,
    /// Quit, disconnected, or lost. Terminal.
    Closed,
}

/// Single-use POP3 client over TLS.
///
/// Methods take `&self`; share the client behind an `Arc` to issue
/// commands from several tasks. Round trips are serialized, one
/// command in flight at a time.
pub struct Pop3Client<S = TlsStream> {
    config: Pop3Config,
    transport: Transport<S>,
    state: Mutex<SessionState>,
}

impl<S> Pop3Client<S> {
    /// Create a client for `config`. No I/O happens until
    /// [`connect`](Pop3Client::connect).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a field is empty or invalid.
    pub fn new(config: Pop3Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            transport: Transport::new(config.timeout),
            config,
            state: Mutex::new(SessionState::Fresh),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &Pop3Config {
        &self.config
    }

    /// Current lifecycle state. A connection dropped by the transport
    /// reads as [`SessionState::Closed`].
    #[must_use]
    pub fn state(&self) -> SessionState {
        let mut state = self.lock_state();
        if matches!(*state, SessionState::Connected | SessionState::Authenticated)
            && !self.transport.is_open()
        {
            *state = SessionState::Closed;
        }
        *state
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(
            self.state(),
            SessionState::Connected | SessionState::Authenticated
        )
    }

    /// Cancelling this token aborts the command in flight and closes
    /// the session.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.transport.cancellation_token()
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: SessionState) {
        *self.lock_state() = next;
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    /// Move from `Fresh` towards `Connected`; anything else means the
    /// client was already used.
    fn begin_connect(&self) -> Result<()> {
        let mut state = self.lock_state();
        if *state != SessionState::Fresh {
            return Err(Error::SessionClosed);
        }
        // Reserve the session so concurrent connects lose.
        *state = SessionState::Closed;
        Ok(())
    }

    fn finish_connect(&self, greeting: Result<Response>) -> Result<Response> {
        match greeting {
            Ok(greeting) => {
                self.set_state(SessionState::Connected);
                info!("POP3 greeting: {}", greeting.status_text());
                Ok(greeting)
            }
            Err(e) => {
                warn!("Connection to {} failed: {}", self.config.address(), e);
                Err(e)
            }
        }
    }

    /// Claim the session for teardown. Returns `false` if there is
    /// nothing left to tear down, so only the first caller sends QUIT.
    fn take_session(&self) -> bool {
        let mut state = self.lock_state();
        match *state {
            SessionState::Fresh | SessionState::Closed => false,
            SessionState::Connected | SessionState::Authenticated => {
                *state = SessionState::Closed;
                self.transport.is_open()
            }
        }
    }
}

impl Pop3Client<TlsStream> {
    /// Connect to the configured server and return its greeting.
    ///
    /// An `-ERR` greeting is returned as a value; the session is still
    /// open and should be disconnected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] if this client was already
    /// connected once, or the connection error from
    /// [`Transport::connect`]. A client that failed to connect cannot
    /// be reused.
    pub async fn connect(&self) -> Result<Response> {
        self.begin_connect()?;
        let greeting = self.transport.connect(&self.config).await;
        self.finish_connect(greeting)
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> Pop3Client<S> {
    /// Run the session over an already-established stream, for example
    /// one wrapped in TLS by the caller.
    ///
    /// # Errors
    ///
    /// Same as [`Pop3Client::connect`], minus resolution and handshake
    /// failures.
    pub async fn connect_with(&self, stream: S) -> Result<Response> {
        self.begin_connect()?;
        let greeting = self.transport.attach(stream).await;
        self.finish_connect(greeting)
    }

    /// Authenticate with USER/PASS.
    ///
    /// PASS is only sent if USER succeeded. Returns the PASS reply, or
    /// the failed USER reply. On failure the session stays connected
    /// but unauthenticated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] before `connect` or after the
    /// session closed, and transport errors (see
    /// [`Transport::send_and_receive_framed`]).
    pub async fn login(&self, username: &str, password: &str) -> Result<Response> {
        let user = self
            .command(&format!("USER {username}"), Framing::SingleLine)
            .await?;
        if !user.success {
            warn!("USER rejected: {}", user.status_text());
            return Ok(user);
        }

        let pass = self
            .command(&format!("PASS {password}"), Framing::SingleLine)
            .await?;
        if pass.success {
            let mut state = self.lock_state();
            if *state == SessionState::Connected {
                *state = SessionState::Authenticated;
            }
            drop(state);
            info!("Logged in as {}", username);
        } else {
            warn!("PASS rejected: {}", pass.status_text());
        }
        Ok(pass)
    }

    /// [`login`](Pop3Client::login) with the configured credentials.
    ///
    /// # Errors
    ///
    /// See [`Pop3Client::login`].
    pub async fn authenticate(&self) -> Result<Response> {
        self.login(&self.config.username, &self.config.password)
            .await
    }

    /// List the messages in the mailbox.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandFailed`] if the server refuses LIST or
    /// the connection drops, [`Error::Parse`] for a malformed scan
    /// listing (the session stays open), and [`Error::NotConnected`]
    /// when there is no session.
    pub async fn list_entries(&self) -> Result<Vec<MailboxEntry>> {
        let response = self.command("LIST", Framing::MultiLine).await?;
        if !response.success {
            let message = if response.is_dropped() {
                "connection lost".to_string()
            } else {
                response.status_text().to_string()
            };
            return Err(Error::CommandFailed {
                command: "LIST",
                message,
            });
        }

        let entries = parse_listing(&response.payload())?;
        debug!("LIST returned {} message(s)", entries.len());
        Ok(entries)
    }

    /// Fetch message `id`. The reply's `raw` text holds the status
    /// line, the message as sent on the wire, and the closing `.`;
    /// [`Response::payload`] gives just the message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] when there is no session, and
    /// transport errors.
    pub async fn retrieve(&self, id: u32) -> Result<Response> {
        self.command(&format!("RETR {id}"), Framing::MultiLine)
            .await
    }

    /// Mark message `id` for deletion. The server only removes it once
    /// QUIT succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] when there is no session, and
    /// transport errors.
    pub async fn delete(&self, id: u32) -> Result<Response> {
        self.command(&format!("DELE {id}"), Framing::SingleLine)
            .await
    }

    /// Send QUIT and close the connection, whatever the reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] when there is no session, and
    /// transport errors.
    pub async fn quit(&self) -> Result<Response> {
        if !self.take_session() {
            return Err(Error::NotConnected);
        }
        self.quit_and_close().await
    }

    /// End the session: QUIT, then close the connection.
    ///
    /// Does nothing if the session is not open, including on a second
    /// call. The connection is closed even when QUIT fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QuitFailed`] if QUIT was not acknowledged, in
    /// which case messages marked for deletion may still exist.
    pub async fn disconnect(&self) -> Result<()> {
        if !self.take_session() {
            debug!("Disconnect on a closed session ignored");
            return Ok(());
        }

        match self.quit_and_close().await {
            Ok(response) if response.success => Ok(()),
            Ok(response) => {
                let reason = if response.is_dropped() {
                    "connection lost".to_string()
                } else {
                    response.status_text().to_string()
                };
                warn!("QUIT failed, deletions may not have applied: {}", reason);
                Err(Error::QuitFailed(reason))
            }
            Err(e) => {
                warn!("QUIT failed, deletions may not have applied: {}", e);
                Err(Error::QuitFailed(e.to_string()))
            }
        }
    }

    async fn quit_and_close(&self) -> Result<Response> {
        let response = self
            .transport
            .send_and_receive_framed("QUIT", Framing::SingleLine)
            .await;
        self.transport.close().await;
        info!("Disconnected from {}", self.config.address());
        response
    }

    async fn command(&self, command: &str, framing: Framing) -> Result<Response> {
        self.ensure_connected()?;
        let response = self
            .transport
            .send_and_receive_framed(command, framing)
            .await;
        if !self.transport.is_open() {
            self.set_state(SessionState::Closed);
        }
        response
    }
}

impl<S> Drop for Pop3Client<S> {
    fn drop(&mut self) {
        if self.is_connected() {
            warn!("POP3 client dropped without QUIT; pending deletions are discarded");
        }
    }
}
