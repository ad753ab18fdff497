//! Error handling foundation.
//!
//! Only the `Result` alias lives here. Crates define their own error enums
//! and lift them into a rootcause [`Report`] at I/O boundaries.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
