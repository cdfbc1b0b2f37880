//! Projboard server library.
//!
//! Exposes the server for use in tests and embedding. The server accepts
//! TCP connections, runs the join handshake against the shared [`registry`],
//! and fans out chat and task events to every connected session.

pub mod config;
pub mod registry;
pub mod server;
pub mod session;
