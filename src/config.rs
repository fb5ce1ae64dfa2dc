//! POP3 connection configuration

use crate::error::{Error, Result};
use std::env;
use std::fmt;
use std::time::Duration;

/// Default port for POP3 over implicit TLS (RFC 8314).
pub const DEFAULT_PORT: u16 = 995;

/// Connection settings for a single POP3 mailbox.
///
/// Fixed for the lifetime of a [`Pop3Client`](crate::Pop3Client);
/// every field is checked by [`Pop3Config::validate`] before any
/// network I/O happens.
#[derive(Clone, PartialEq, Eq)]
pub struct Pop3Config {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Skip certificate verification. Only meant for servers with
    /// self-signed certificates.
    pub accept_invalid_certs: bool,
    /// Upper bound on the TCP connect, on the TLS handshake plus
    /// greeting, and on each command's whole write and reply.
    /// `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Pop3Config {
    /// Build a config with certificate verification on and no timeout.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            accept_invalid_certs: false,
            timeout: None,
        }
    }

    /// Load POP3 configuration from environment variables
    ///
    /// Reads from `.env` file if present. Required variables:
    /// - `POP3_HOST`
    /// - `POP3_USERNAME`
    /// - `POP3_PASSWORD`
    ///
    /// Optional (with defaults):
    /// - `POP3_PORT` (default: `995`)
    /// - `POP3_ACCEPT_INVALID_CERTS` (default: `false`)
    /// - `POP3_TIMEOUT_SECS` (default: no timeout)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required variable is missing, a
    /// value does not parse, or the result fails validation.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            host: env::var("POP3_HOST").map_err(|_| Error::Config("POP3_HOST not set".into()))?,
            port: env::var("POP3_PORT")
                .map_or_else(|_| Ok(DEFAULT_PORT), |v| v.parse())
                .map_err(|e| Error::Config(format!("Invalid POP3_PORT: {e}")))?,
            username: env::var("POP3_USERNAME")
                .map_err(|_| Error::Config("POP3_USERNAME not set".into()))?,
            password: env::var("POP3_PASSWORD")
                .map_err(|_| Error::Config("POP3_PASSWORD not set".into()))?,
            accept_invalid_certs: env::var("POP3_ACCEPT_INVALID_CERTS")
                .map_or(Ok(false), |v| parse_flag(&v))
                .map_err(|e| Error::Config(format!("Invalid POP3_ACCEPT_INVALID_CERTS: {e}")))?,
            timeout: env::var("POP3_TIMEOUT_SECS")
                .ok()
                .map(|v| v.parse::<u64>().map(Duration::from_secs))
                .transpose()
                .map_err(|e| Error::Config(format!("Invalid POP3_TIMEOUT_SECS: {e}")))?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check that every field is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("invalid host".into()));
        }
        if self.port == 0 {
            return Err(Error::Config("invalid port".into()));
        }
        if self.username.is_empty() {
            return Err(Error::Config("invalid username".into()));
        }
        if self.password.is_empty() {
            return Err(Error::Config("invalid password".into()));
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::Config("timeout must be non-zero".into()));
        }
        Ok(())
    }

    /// `host:port`, as handed to the resolver.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for Pop3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pop3Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn parse_flag(value: &str) -> std::result::Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" | "" => Ok(false),
        other => Err(format!("expected true/false, got '{other}'")),
    }
}
