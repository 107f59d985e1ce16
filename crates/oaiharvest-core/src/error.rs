//! Fault taxonomy shared by every harvesting stage

use std::path::Path;

/// Failure raised while talking to a repository or persisting its output.
///
/// "No records matched" is deliberately absent: an empty set is a normal
/// protocol answer, not a fault.
#[derive(Debug)]
pub enum Fault {
    /// Network/HTTP-layer failure (timeout, DNS, connection reset, non-OAI 4xx/5xx)
    Transport {
        status: Option<u16>,
        message: String,
    },
    /// Malformed or non-conformant OAI-PMH exchange
    Protocol(String),
    /// Local I/O failure while persisting output
    Storage(std::io::Error),
    /// Anything the other variants do not describe
    Unknown(String),
    /// The run (or the current pass) was cancelled before the exchange finished
    Cancelled,
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Transport {
                status: None,
                message,
            } => write!(f, "transport error: {message}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::Unknown(msg) => write!(f, "unexpected error: {msg}"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for Fault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl Fault {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Storage fault that names the path it failed on.
    pub fn storage(path: &Path, err: std::io::Error) -> Self {
        Self::Storage(std::io::Error::new(
            err.kind(),
            format!("{}: {err}", path.display()),
        ))
    }

    /// Create a transport fault from a reqwest error
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        Self::Transport {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }

    /// Whether a later pass has a chance of succeeding where this attempt failed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Cancelled)
    }

    /// Short machine-friendly label, used in logs and the run summary.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Protocol(_) => "protocol",
            Self::Storage(_) => "storage",
            Self::Unknown(_) => "unknown",
            Self::Cancelled => "cancelled",
        }
    }
}
