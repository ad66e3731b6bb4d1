//! Common code shared between `classify_server` and the page it serves.
pub mod prediction;
pub mod protocol;

/// Error type.
pub type Error = Box<dyn std::error::Error>;
