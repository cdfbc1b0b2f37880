//! Projboard client library.
//!
//! [`client::ProjectClient`] connects to a project server, identifies with a
//! username, and runs a background receive loop that decodes server lines
//! into calls on a caller-supplied [`events::ProjectEvents`] sink. UI glue
//! lives behind that trait; the library itself stays headless.

pub mod client;
pub mod config;
pub mod events;
