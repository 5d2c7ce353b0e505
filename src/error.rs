use std::{fmt, time::Duration};

use crate::Response;

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum FluentError {
    /// Malformed request or backoff configuration. Never retried.
    #[error("configuration error: {0}")]
    Config(String),
    /// Structured payload could not be serialized. Never retried.
    #[error("payload serialization error: {0}")]
    Serialize(#[source] serde_json::Error),
    /// Network-level failure of the last attempt, surfaced once the retry
    /// budget is spent.
    #[error("transport error: {0}")]
    Transport(#[source] TransportError),
    /// The elapsed-time bound of the backoff policy was reached before the
    /// retry budget ran out.
    #[error("backoff exhausted after {attempts} attempts ({elapsed:?} elapsed): {last}")]
    BackoffExhausted {
        /// Number of attempts made, including the first one.
        attempts: usize,
        /// Time elapsed since the first attempt started.
        elapsed: Duration,
        /// The failure that triggered the abandoned retry.
        last: LastFailure,
    },
    /// Response body decoding error.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Failure of a single transport exchange.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Error raised by the `reqwest` client.
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    /// Raw I/O failure, used by custom transports.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Returns true when the exchange hit the per-attempt timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Http(err) => err.is_timeout(),
            Self::Io(err) => err.kind() == std::io::ErrorKind::TimedOut,
        }
    }

    /// Returns true when no connection could be established.
    pub fn is_connect(&self) -> bool {
        match self {
            Self::Http(err) => err.is_connect(),
            Self::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
            ),
        }
    }
}

/// Context kept from the attempt that preceded an abandoned retry.
#[derive(Debug)]
pub enum LastFailure {
    Transport(TransportError),
    /// A 5xx response, kept whole so callers can still inspect it.
    Status(Response),
}

impl fmt::Display for LastFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(err) => write!(f, "transport error: {err}"),
            Self::Status(response) => write!(f, "server responded {}", response.status()),
        }
    }
}
