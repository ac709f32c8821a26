// Lazarus Integration Layer - Error Types
//
// Errors raised while talking to the tmux server. `NoServer` is an
// environment condition (nothing is running yet) rather than a fault, and
// callers treat it as an empty topology.

use std::io;

/// Errors that can occur while driving tmux
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TmuxError {
    /// No tmux server is listening on the socket
    #[error("no tmux server running")]
    NoServer,

    /// tmux executable not found in PATH
    #[error("CLI not found: '{0}'. Is it installed and in PATH?")]
    CliNotFound(String),

    /// Process spawn failed
    #[error("Failed to spawn subprocess: {0}")]
    SpawnFailed(String),

    /// tmux exited with non-zero code
    #[error("tmux exited with code {code}: {stderr}")]
    ProcessExited { code: i32, stderr: String },

    /// Unexpected format output
    #[error("Failed to parse tmux output: {0}")]
    ParseError(String),

    /// Timeout waiting for tmux
    #[error("Timeout after {duration_secs}s waiting for: {operation}")]
    Timeout {
        operation: String,
        duration_secs: u64,
    },

    /// I/O error during subprocess communication
    #[error("I/O error: {0}")]
    IoError(String),

    /// Session does not exist
    #[error("can't find session: {0}")]
    SessionNotFound(String),

    /// Pane does not exist
    #[error("can't find pane: {0}")]
    PaneNotFound(String),
}

impl TmuxError {
    /// Map a failed tmux invocation to an error, recognising a missing server.
    pub fn from_exit(code: i32, stderr: &str) -> Self {
        let lowered = stderr.to_lowercase();
        if lowered.contains("no server running") || lowered.contains("error connecting to") {
            Self::NoServer
        } else if lowered.contains("can't find session") || lowered.contains("session not found")
        {
            Self::SessionNotFound(stderr.trim().to_string())
        } else {
            Self::ProcessExited {
                code,
                stderr: stderr.trim().to_string(),
            }
        }
    }

    pub fn is_no_server(&self) -> bool {
        matches!(self, Self::NoServer)
    }
}

impl From<io::Error> for TmuxError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::CliNotFound(err.to_string()),
            io::ErrorKind::TimedOut => Self::Timeout {
                operation: "I/O".to_string(),
                duration_secs: 0,
            },
            _ => Self::IoError(err.to_string()),
        }
    }
}

/// Result type for tmux operations
pub type TmuxResult<T> = Result<T, TmuxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TmuxError::CliNotFound("tmux".to_string());
        assert!(err.to_string().contains("tmux"));
        assert!(err.to_string().contains("not found"));

        let err = TmuxError::Timeout {
            operation: "tmux list-sessions".to_string(),
            duration_secs: 10,
        };
        assert!(err.to_string().contains("10s"));
    }

    #[test]
    fn test_no_server_detection() {
        let err = TmuxError::from_exit(1, "no server running on /tmp/tmux-1000/default\n");
        assert!(err.is_no_server());

        let err = TmuxError::from_exit(
            1,
            "error connecting to /tmp/tmux-1000/default (No such file or directory)",
        );
        assert!(err.is_no_server());

        let err = TmuxError::from_exit(1, "can't find session: dev");
        assert!(matches!(err, TmuxError::SessionNotFound(_)));

        let err = TmuxError::from_exit(2, "unknown option -- z");
        assert!(matches!(err, TmuxError::ProcessExited { code: 2, .. }));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: TmuxError = io_err.into();
        assert!(matches!(err, TmuxError::CliNotFound(_)));
    }
}
