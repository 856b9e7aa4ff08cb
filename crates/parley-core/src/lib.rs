//! Parley core crate - shared domain model, error taxonomy, configuration.
//!
//! Holds the conversation/message/attachment data model that every other
//! crate in the workspace builds on, the top-level error type, and the
//! TOML-backed configuration.

pub mod config;
pub mod error;
pub mod types;

pub use config::ParleyConfig;
pub use error::{ParleyError, Result};
pub use types::*;
