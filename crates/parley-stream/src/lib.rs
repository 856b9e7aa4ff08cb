//! Parley stream crate - response-stream decoding and transcript reduction.
//!
//! The agent backend answers a send with a newline-delimited JSON stream.
//! This crate turns arriving bytes into typed events ([`decoder`]), resolves
//! generated-file references into attachments ([`link`]), and folds events
//! into the conversation transcript ([`transcript`]).

pub mod decoder;
pub mod event;
pub mod link;
pub mod transcript;

pub use decoder::LineDecoder;
pub use event::{StreamEvent, ToolOutcome};
pub use link::OutputResolver;
pub use transcript::{ExchangePhase, Transcript};
