//! Error types shared by the batch tasks.
//!
//! `BatchError` covers the preconditions that cancel a whole batch.
//! `FailureCause` is the per-item taxonomy recorded inside outcomes and
//! cleanup tallies; it never aborts anything on its own.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that stop a batch before any item is processed.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Directory not found: {}", .path.display())]
    DirectoryNotFound { path: PathBuf },

    #[error("Failed to read directory: {}", .path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to create directory: {}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Why a single item (or a single cleanup entry) could not be handled.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    #[error("permission denied")]
    PermissionDenied,

    #[error("file is in use by another process")]
    InUse,

    #[error("not found")]
    NotFound,

    #[error("already exists at destination")]
    AlreadyExists,

    #[error("external tool exited with {}: {diagnostic}", exit_code_label(.code))]
    ToolExit {
        code: Option<i32>,
        diagnostic: String,
    },

    #[error("I/O error: {0}")]
    Io(String),
}

fn exit_code_label(code: &Option<i32>) -> String {
    match *code {
        Some(code) => format!("status {}", code),
        None => "no status (terminated by signal)".to_string(),
    }
}

// ERROR_SHARING_VIOLATION / ERROR_LOCK_VIOLATION
#[cfg(windows)]
const IN_USE_OS_ERRORS: &[i32] = &[32, 33];
#[cfg(not(windows))]
const IN_USE_OS_ERRORS: &[i32] = &[];

impl FailureCause {
    /// Classify an I/O error into the failure taxonomy.
    pub fn from_io(err: &io::Error) -> Self {
        if let Some(code) = err.raw_os_error() {
            if IN_USE_OS_ERRORS.contains(&code) {
                return FailureCause::InUse;
            }
        }

        match err.kind() {
            io::ErrorKind::PermissionDenied => FailureCause::PermissionDenied,
            io::ErrorKind::NotFound => FailureCause::NotFound,
            io::ErrorKind::AlreadyExists => FailureCause::AlreadyExists,
            _ => FailureCause::Io(err.to_string()),
        }
    }

    /// Short machine-friendly name, used in logs.
    pub fn category(&self) -> &'static str {
        match self {
            FailureCause::PermissionDenied => "permission-denied",
            FailureCause::InUse => "in-use",
            FailureCause::NotFound => "not-found",
            FailureCause::AlreadyExists => "already-exists",
            FailureCause::ToolExit { .. } => "external-tool-nonzero-exit",
            FailureCause::Io(_) => "io",
        }
    }
}

impl From<io::Error> for FailureCause {
    fn from(err: io::Error) -> Self {
        FailureCause::from_io(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_kinds_map_to_causes() {
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(FailureCause::from_io(&denied), FailureCause::PermissionDenied);

        let missing = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert_eq!(FailureCause::from_io(&missing), FailureCause::NotFound);

        let other = io::Error::new(io::ErrorKind::Other, "disk on fire");
        assert_eq!(FailureCause::from_io(&other), FailureCause::Io("disk on fire".to_string()));
    }

    #[test]
    fn tool_exit_renders_code_and_diagnostic() {
        let cause = FailureCause::ToolExit {
            code: Some(1),
            diagnostic: "moov atom not found".to_string(),
        };
        assert_eq!(cause.to_string(), "external tool exited with status 1: moov atom not found");
        assert_eq!(cause.category(), "external-tool-nonzero-exit");
    }
}
