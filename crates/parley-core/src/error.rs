use thiserror::Error;

/// Top-level error type for the Parley engine.
///
/// Each variant maps to one containment rule: transport failures settle the
/// stream that raised them, protocol errors are logged and skipped, quota
/// errors are rejected before any remote call, permission errors are a
/// terminal pipeline state the user must retry from, and remote operation
/// errors leave local state untouched. Subsystem crates define their own
/// error types where they need finer variants and implement
/// `From<SubsystemError> for ParleyError` so that `?` works across crate
/// boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParleyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Upload quota exceeded: at most {limit} {kind} may be staged")]
    Quota { kind: String, limit: usize },

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Remote operation failed: {0}")]
    Remote(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Transcription error: {0}")]
    Transcription(String),

    #[error("Busy: {0}")]
    Busy(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for ParleyError {
    fn from(err: toml::de::Error) -> Self {
        ParleyError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ParleyError {
    fn from(err: toml::ser::Error) -> Self {
        ParleyError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for ParleyError {
    fn from(err: serde_json::Error) -> Self {
        ParleyError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Parley operations.
pub type Result<T> = std::result::Result<T, ParleyError>;
