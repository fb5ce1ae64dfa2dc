//! Fake POP3 server for integration testing
//!
//! This module provides an in-process POP3 server that speaks enough
//! of the protocol to test `Pop3Client` end-to-end:
//!
//! TCP -> TLS handshake -> greeting -> USER/PASS -> commands -> QUIT
//!
//! ## Module layout
//!
//! - `server` -- TCP listener, TLS setup, and connection dispatch
//! - `handlers/` -- one file per POP3 command (USER, LIST, RETR, etc.)
//! - `mailbox` -- test data model (messages, credentials, builder)
//! - `io` -- shared write helpers

mod server;

pub use mailbox::MailboxBuilder;
pub use server::FakePop3Server;
