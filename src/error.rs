// src/error.rs
use thiserror::Error;

/// Library-wide error for tdigest-kv.
///
/// Digest operations only ever produce `InvalidParameter`, `EmptyDigest` and
/// `CorruptState`; the remaining kinds belong to the key space and the command
/// adapter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TdError {
    /// Bad compression/value/weight/quantile, or a numeric argument that did not parse.
    /// `context` pinpoints where it came from (e.g., "sample weight", "compression").
    #[error("tdigest: invalid {context}: {reason}")]
    InvalidParameter {
        context: &'static str,
        reason: String,
    },

    /// Quantile or CDF requested on a digest holding no weight.
    #[error("tdigest: digest is empty")]
    EmptyDigest,

    /// A persisted blob failed validation.
    #[error("tdigest: corrupt state: {what}")]
    CorruptState { what: String },

    #[error("key does not exist: {key}")]
    KeyMissing { key: String },

    #[error("key already exists: {key}")]
    KeyExists { key: String },

    #[error("operation against a key holding the wrong kind of value: {key}")]
    WrongType { key: String },

    #[error("wrong number of arguments for '{command}' command")]
    Arity { command: String },

    #[error("unknown command '{command}'")]
    UnknownCommand { command: String },

    #[error("i/o error: {0}")]
    Io(String),
}

impl TdError {
    #[inline]
    pub(crate) fn invalid(context: &'static str, reason: impl Into<String>) -> Self {
        TdError::InvalidParameter {
            context,
            reason: reason.into(),
        }
    }

    #[inline]
    pub(crate) fn corrupt(what: impl Into<String>) -> Self {
        TdError::CorruptState { what: what.into() }
    }

    /// Render the error the way the command protocol reports it.
    pub fn protocol_message(&self) -> String {
        match self {
            TdError::WrongType { .. } => {
                "WRONGTYPE Operation against a key holding the wrong kind of value".to_string()
            }
            TdError::Arity { command } => {
                format!("ERR wrong number of arguments for '{command}' command")
            }
            TdError::KeyMissing { .. } => "ERR T-Digest: key does not exist".to_string(),
            TdError::KeyExists { .. } => "ERR T-Digest: key already exists".to_string(),
            TdError::InvalidParameter { context, reason } => {
                format!("ERR T-Digest: invalid {context}: {reason}")
            }
            TdError::EmptyDigest => "ERR T-Digest: digest is empty".to_string(),
            TdError::CorruptState { what } => format!("ERR T-Digest: corrupt state: {what}"),
            TdError::UnknownCommand { command } => format!("ERR unknown command '{command}'"),
            TdError::Io(msg) => format!("ERR {msg}"),
        }
    }
}

impl From<std::io::Error> for TdError {
    fn from(err: std::io::Error) -> Self {
        TdError::Io(err.to_string())
    }
}

pub type TdResult<T> = Result<T, TdError>;
