//! Error types for the process module.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while launching or controlling a process.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The executable could not be spawned.
    #[error("Failed to launch {path}: {source}")]
    Launch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Querying the process for exit failed.
    #[error("Failed to query process {pid}: {source}")]
    Wait {
        pid: u32,
        #[source]
        source: io::Error,
    },

    /// A termination request could not be delivered.
    #[error("Failed to signal process {pid}: {message}")]
    Signal { pid: u32, message: String },

    /// Forced termination failed.
    #[error("Failed to kill process {pid}: {source}")]
    Kill {
        pid: u32,
        #[source]
        source: io::Error,
    },
}

impl ProcessError {
    /// Whether a launch failed because the executable does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Launch { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }

    /// Whether a launch failed because the executable is not runnable by this user.
    pub fn is_permission_denied(&self) -> bool {
        matches!(
            self,
            Self::Launch { source, .. } if source.kind() == io::ErrorKind::PermissionDenied
        )
    }

    /// Raw OS error code carried by the underlying failure, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Launch { source, .. } | Self::Wait { source, .. } | Self::Kill { source, .. } => {
                source.raw_os_error()
            }
            Self::Signal { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_error_classification() {
        let missing = ProcessError::Launch {
            path: PathBuf::from("/nope"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert!(missing.is_not_found());
        assert!(!missing.is_permission_denied());

        let denied = ProcessError::Launch {
            path: PathBuf::from("/etc/passwd"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert!(denied.is_permission_denied());
    }

    #[test]
    fn test_raw_os_error_is_preserved() {
        let err = ProcessError::Launch {
            path: PathBuf::from("/nope"),
            source: io::Error::from_raw_os_error(2),
        };
        assert_eq!(err.raw_os_error(), Some(2));
        assert!(err.to_string().contains("/nope"));
    }
}
