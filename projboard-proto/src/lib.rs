//! Shared protocol definitions for the Projboard wire format.

pub mod task;
pub mod wire;
