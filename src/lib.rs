//! Minimal POP3 client over implicit TLS
//!
//! Connects to a mailbox server with `tokio-rustls`, authenticates
//! with USER/PASS, lists, retrieves, and deletes messages, and ends
//! the session with QUIT. Only that command subset is implemented.
//!
//! ```no_run
//! use pop3_tls_client::{Pop3Client, Pop3Config};
//!
//! # async fn run() -> pop3_tls_client::Result<()> {
//! let client: Pop3Client = Pop3Client::new(Pop3Config::from_env()?)?;
//! client.connect().await?;
//! client.authenticate().await?;
//!
//! for entry in client.list_entries().await? {
//!     let message = client.retrieve(entry.id).await?;
//!     println!("{}", message.payload());
//! }
//!
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```
//!
//! A client is good for one session. Deletions only take effect once
//! the server acknowledges QUIT, which also ends the session; keep
//! polling with a fresh [`Pop3Client`].

mod client;
mod config;
mod connection;
mod entry;
mod error;
mod framing;
mod response;

pub use client::{Pop3Client, SessionState};
pub use config::{DEFAULT_PORT, Pop3Config};
pub use connection::{TlsStream, Transport};
pub use entry::{MailboxEntry, parse_listing};
pub use error::{Error, Result};
pub use framing::{Framing, ResponseFramer};
pub use response::Response;
pub use tokio_util::sync::CancellationToken;
