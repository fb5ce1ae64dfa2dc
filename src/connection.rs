//! TLS transport and command round trips
//!
//! [`Transport`] owns the one encrypted connection of a session and
//! offers two primitives: write a command line, and read one complete
//! reply. The stream sits behind an async mutex held for the whole
//! write+read exchange, so concurrent callers never interleave bytes.

use crate::config::Pop3Config;
use crate::error::{Error, Result};
use crate::framing::{Framing, ResponseFramer};
use crate::response::Response;
use rustls::pki_types::ServerName;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A TLS-wrapped POP3 connection.
pub type TlsStream = tokio_rustls::client::TlsStream<TcpStream>;

const READ_BUFFER_SIZE: usize = 4096;

/// Upper bound on the best-effort shutdown when closing.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// One encrypted connection to a POP3 server.
///
/// A transport is opened at most once. After it is closed, either
/// explicitly or because a read or write failed, every further round
/// trip is refused with [`Error::NotConnected`].
#[derive(Debug)]
pub struct Transport<S = TlsStream> {
    stream: Mutex<Option<S>>,
    open: AtomicBool,
    used: AtomicBool,
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl<S> Transport<S> {
    /// Create an unconnected transport.
    ///
    /// `timeout` bounds connecting, the TLS handshake, and each
    /// command round trip.
    #[must_use]
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            stream: Mutex::new(None),
            open: AtomicBool::new(false),
            used: AtomicBool::new(false),
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Whether the connection is still usable.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Token that aborts the in-flight round trip (and every later
    /// one) when cancelled. The session is torn down on abort.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run `fut` under the configured deadline and the cancellation
    /// token.
    async fn bounded<F: Future>(&self, fut: F) -> Result<F::Output> {
        let deadline = async {
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, fut)
                    .await
                    .map_err(|_| Error::Timeout),
                None => Ok(fut.await),
            }
        };

        tokio::select! {
            () = self.cancel.cancelled() => Err(Error::Cancelled),
            out = deadline => out,
        }
    }
}

impl Transport<TlsStream> {
    /// Resolve, connect, and complete the TLS handshake, then read the
    /// server greeting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if resolution or the TCP connect
    /// fails or the server hangs up before greeting, [`Error::Tls`] if
    /// the handshake fails, and [`Error::Protocol`] if the greeting is
    /// not a status line. After `Connection` or `Tls` the transport is
    /// spent; build a new one to retry.
    pub async fn connect(&self, config: &Pop3Config) -> Result<Response> {
        let addr = config.address();
        debug!("Connecting to POP3 server at {}", addr);

        let tcp_stream = self
            .bounded(TcpStream::connect(&addr))
            .await?
            .map_err(|e| Error::Connection(format!("{addr}: {e}")))?;

        let connector = tls_connector(config.accept_invalid_certs)?;
        let server_name = ServerName::try_from(config.host.clone())
            .map_err(|e| Error::Tls(format!("Invalid server name: {e}")))?;

        let tls_stream = self
            .bounded(connector.connect(server_name, tcp_stream))
            .await?
            .map_err(|e| Error::Tls(e.to_string()))?;

        let greeting = self.attach(tls_stream).await?;
        info!("Connected to POP3 server at {}", addr);
        Ok(greeting)
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> Transport<S> {
    /// Take ownership of an established stream and read the greeting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] if this transport was already
    /// used, [`Error::Connection`] if the stream ends before a greeting
    /// arrives, and [`Error::Protocol`] for a malformed greeting.
    pub async fn attach(&self, stream: S) -> Result<Response> {
        let mut slot = self.stream.lock().await;
        if self.used.swap(true, Ordering::AcqRel) {
            return Err(Error::SessionClosed);
        }
        *slot = Some(stream);
        self.open.store(true, Ordering::Release);

        let greeting = self.round_trip(&mut slot, None, Framing::SingleLine).await?;
        if greeting.is_dropped() {
            return Err(Error::Connection(
                "connection closed before the server greeting".into(),
            ));
        }
        Ok(greeting)
    }

    /// Send `command` and read the reply, inferring its shape with
    /// [`Framing::Detect`].
    ///
    /// # Errors
    ///
    /// See [`Transport::send_and_receive_framed`].
    pub async fn send_and_receive(&self, command: &str) -> Result<Response> {
        self.send_and_receive_framed(command, Framing::Detect).await
    }

    /// Send `command` (CRLF is appended) and read one reply framed as
    /// `framing`.
    ///
    /// A failed read or write closes the transport and yields
    /// [`Response::dropped`] rather than an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if the transport is closed,
    /// [`Error::Protocol`] for a reply without a status indicator, and
    /// [`Error::Timeout`] or [`Error::Cancelled`] if the exchange was
    /// aborted. All but the first also close the transport.
    pub async fn send_and_receive_framed(
        &self,
        command: &str,
        framing: Framing,
    ) -> Result<Response> {
        let mut slot = self.stream.lock().await;
        self.round_trip(&mut slot, Some(command), framing).await
    }

    /// Shut the connection down. Waits for an in-flight round trip to
    /// finish; cancel the token first to abort one. Calling this on a
    /// closed transport does nothing.
    pub async fn close(&self) {
        let mut slot = self.stream.lock().await;
        self.teardown(&mut slot).await;
    }

    async fn round_trip(
        &self,
        slot: &mut Option<S>,
        command: Option<&str>,
        framing: Framing,
    ) -> Result<Response> {
        let Some(stream) = slot.as_mut() else {
            return Err(Error::NotConnected);
        };

        if let Some(command) = command {
            debug!("> {}", redact(command));
        }

        match self.bounded(exchange(stream, command, framing)).await {
            Ok(Ok(text)) => match Response::parse(text) {
                Ok(response) => {
                    debug!("< {}", response.raw.lines().next().unwrap_or_default());
                    Ok(response)
                }
                Err(e) => {
                    warn!("Closing connection after unrecognized reply: {}", e);
                    self.teardown(slot).await;
                    Err(e)
                }
            },
            Ok(Err(e)) => {
                warn!("Connection lost: {}", e);
                self.teardown(slot).await;
                Ok(Response::dropped())
            }
            Err(e) => {
                warn!("Closing connection: {}", e);
                self.teardown(slot).await;
                Err(e)
            }
        }
    }

    async fn teardown(&self, slot: &mut Option<S>) {
        self.open.store(false, Ordering::Release);
        let Some(mut stream) = slot.take() else {
            return;
        };

        let limit = self.timeout.map_or(CLOSE_TIMEOUT, |t| t.min(CLOSE_TIMEOUT));
        match tokio::time::timeout(limit, stream.shutdown()).await {
            Ok(Ok(())) => debug!("Connection closed"),
            Ok(Err(e)) => debug!("Error during shutdown: {}", e),
            Err(_) => debug!("Shutdown timed out"),
        }
    }
}

#[cfg(test)]
impl Transport<crate::mock_stream::MockStream> {
    /// Everything written to the mock so far; empty once closed.
    pub(crate) async fn written(&self) -> Vec<u8> {
        let slot = self.stream.lock().await;
        slot.as_ref().map(|s| s.written().to_vec()).unwrap_or_default()
    }
}

/// Write one command line (if any) and read until `framing` says the
/// reply is complete.
async fn exchange<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    command: Option<&str>,
    framing: Framing,
) -> io::Result<String> {
    if let Some(command) = command {
        let mut line = Vec::with_capacity(command.len() + 2);
        line.extend_from_slice(command.as_bytes());
        line.extend_from_slice(b"\r\n");
        stream.write_all(&line).await?;
        stream.flush().await?;
    }

    let mut framer = ResponseFramer::new(framing);
    let mut buf = [0u8; READ_BUFFER_SIZE];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by server",
            ));
        }
        if framer.push(&buf[..n]) {
            return Ok(framer.into_text());
        }
    }
}

/// The command as it may appear in logs.
fn redact(command: &str) -> &str {
    match command.split_once(' ') {
        Some(("PASS", _)) => "PASS ****",
        _ => command,
    }
}

/// Build a TLS connector.
///
/// Verifies against the Mozilla root set, or accepts any certificate
/// when `accept_invalid_certs` is set.
fn tls_connector(accept_invalid_certs: bool) -> Result<TlsConnector> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(e.to_string()))?;

    let config = if accept_invalid_certs {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert { provider }))
            .with_no_client_auth()
    } else {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder.with_root_certificates(roots).with_no_client_auth()
    };

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Certificate verifier that accepts all certificates
/// (for servers with self-signed certs).
#[derive(Debug)]
struct AcceptAnyCert {
    provider: Arc<rustls::crypto::CryptoProvider>,
}

impl rustls::client::danger::ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
