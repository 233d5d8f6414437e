//! Error taxonomy shared by every backend and every shaping stage.

use thiserror::Error;

/// Errors surfaced by entropy sources.
///
/// Argument errors are always detected before any I/O is issued. Backend
/// errors are passed through unchanged; nothing in this crate falls back to
/// another source on failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntropyError {
    /// The request was malformed. Raised before any I/O.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The backend could not be opened or built.
    #[error("entropy device unavailable: {0}")]
    DeviceUnavailable(String),
    /// A read against an open backend failed.
    #[error("entropy I/O failure: {0}")]
    IoFailure(String),
    /// The source or bridge no longer accepts requests.
    #[error("entropy source has been shut down")]
    ShutdownFailure,
    /// The caller cancelled the request before it completed.
    #[error("entropy request was cancelled")]
    Cancelled,
}

impl EntropyError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Returns true when a caller composing several sources should move on
    /// to the next one.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::DeviceUnavailable(_))
    }

    /// Maps an I/O error from a device transport onto the taxonomy.
    ///
    /// A device that vanished (unplugged, node removed) is unavailable;
    /// everything else, including timeouts and short reads, is an I/O failure.
    pub fn from_io(context: &str, err: &std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied | ErrorKind::BrokenPipe => {
                Self::DeviceUnavailable(format!("{context}: {err}"))
            }
            _ if err.raw_os_error() == Some(19) => {
                // ENODEV
                Self::DeviceUnavailable(format!("{context}: {err}"))
            }
            _ => Self::IoFailure(format!("{context}: {err}")),
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, EntropyError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_missing_device_is_unavailable() {
        let err = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert!(EntropyError::from_io("open /dev/hwrng", &err).is_unavailable());
    }

    #[test]
    fn test_timeout_is_io_failure() {
        let err = io::Error::new(io::ErrorKind::TimedOut, "slow");
        assert!(matches!(
            EntropyError::from_io("read", &err),
            EntropyError::IoFailure(_)
        ));
    }
}
