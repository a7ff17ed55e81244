use std::string::FromUtf8Error;
use std::sync::Arc;
use std::time::Duration;

/// All error types that can occur when talking to a dLight.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A TCP operation (connect, send, receive) failed.
    #[error("socket {action} error: {err}")]
    Connection { action: String, err: std::io::Error },

    /// A socket operation did not finish within the configured bound.
    #[error("{action} timed out after {after:?}")]
    Timeout { action: String, after: Duration },

    /// The reply could not be decoded into JSON.
    #[error("malformed reply: {0}")]
    Protocol(#[from] ProtocolError),

    /// The reply was valid JSON but lacked fields the operation requires.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Failed to serialize a request to JSON.
    #[error("failed to dump json: {0}")]
    JsonDump(serde_json::Error),

    /// Attempted to send a [`crate::Command`] with no attributes set.
    #[error("invalid command; no attributes set")]
    EmptyCommand,

    /// A state refresh failed; the cached snapshot, if any, is left untouched.
    #[error("error communicating with dLight: {0}")]
    UpdateFailed(Arc<Error>),

    /// No snapshot has ever been obtained from the device.
    #[error("device unavailable{}", .0.as_ref().map(|e| format!(": {e}")).unwrap_or_default())]
    Unavailable(Option<Arc<Error>>),

    /// The coordinator has been stopped.
    #[error("coordinator stopped")]
    Stopped,

    /// The device configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Reasons a reply body could not be turned into JSON.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("utf8 decoding error: {0}")]
    Utf8(#[from] FromUtf8Error),

    #[error("failed to load json: {0}")]
    Json(#[from] serde_json::Error),

    /// The reply was not even as long as the framing prefix.
    #[error("reply of {len} bytes is shorter than the {prefix}-byte prefix")]
    Truncated { len: usize, prefix: usize },

    /// The reply filled the read buffer without forming a complete value.
    #[error("reply exceeds {max} bytes")]
    TooLarge { max: usize },
}

impl Error {
    /// Create a new connection error
    pub fn connection(action: &str, err: std::io::Error) -> Self {
        Error::Connection {
            action: action.to_string(),
            err,
        }
    }

    /// Create a new timeout error
    pub fn timeout(action: &str, after: Duration) -> Self {
        Error::Timeout {
            action: action.to_string(),
            after,
        }
    }

    /// Classify an I/O failure, treating OS-level timeouts as [`Error::Timeout`].
    pub(crate) fn io(action: &str, err: std::io::Error, after: Duration) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                Error::timeout(action, after)
            }
            _ => Error::connection(action, err),
        }
    }

    /// The innermost error, looking through coordinator wrappers.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::UpdateFailed(inner) => inner.root_cause(),
            Error::Unavailable(Some(inner)) => inner.root_cause(),
            other => other,
        }
    }

    /// Returns `true` if the failure was (or wraps) a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self.root_cause(), Error::Timeout { .. })
    }
}

/// Hacky implementation of PartialEq for testing
#[cfg(test)]
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}
