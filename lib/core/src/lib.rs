//! Core types shared by the callhandler crates.
//!
//! Identifiers and the workspace `Result` alias live here. Each crate keeps
//! its own domain errors next to the code that raises them.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{CallSessionId, MessageId, ParseIdError};
