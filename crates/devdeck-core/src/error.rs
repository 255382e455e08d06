//! Application error types with rich context

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Application error types organized by layer/domain
///
/// Only precondition and resource failures are meant to reach a caller as
/// actionable errors. Probe failures and failing steps are absorbed where
/// they happen and surface as events instead.
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ─────────────────────────────────────────────────────────────
    // Process Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Process error: {message}")]
    Process { message: String },

    #[error("Failed to spawn process '{program}': {reason}")]
    ProcessSpawn { program: String, reason: String },

    #[error("Device bridge '{program}' not found. Ensure it is in your PATH.")]
    BridgeNotFound { program: String },

    // ─────────────────────────────────────────────────────────────
    // Execution Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Request '{alias}' contains device commands but no device is selected")]
    NoDeviceSelected { alias: String },

    #[error("No request named '{alias}'")]
    RequestNotFound { alias: String },

    #[error("A request named '{alias}' already exists")]
    DuplicateRequest { alias: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    // ─────────────────────────────────────────────────────────────
    // Configuration / Persistence Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Failed to persist {path}: {message}")]
    Persistence { path: PathBuf, message: String },

    // ─────────────────────────────────────────────────────────────
    // Hotplug Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Hotplug watcher error: {message}")]
    Hotplug { message: String },

    // ─────────────────────────────────────────────────────────────
    // Channel/Communication Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn process(message: impl Into<String>) -> Self {
        Self::Process {
            message: message.into(),
        }
    }

    pub fn process_spawn(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ProcessSpawn {
            program: program.into(),
            reason: reason.into(),
        }
    }

    pub fn no_device_selected(alias: impl Into<String>) -> Self {
        Self::NoDeviceSelected {
            alias: alias.into(),
        }
    }

    pub fn request_not_found(alias: impl Into<String>) -> Self {
        Self::RequestNotFound {
            alias: alias.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn persistence(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Persistence {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn hotplug(message: impl Into<String>) -> Self {
        Self::Hotplug {
            message: message.into(),
        }
    }

    /// Check if this error should end the current command
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::BridgeNotFound { .. } | Error::Config { .. } | Error::ChannelClosed
        )
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions (for use with color-eyre)
// ─────────────────────────────────────────────────────────────────

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", context.into(), err);
            err
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", f(), err);
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = Error::no_device_selected("pull logs");
        assert_eq!(
            err.to_string(),
            "Request 'pull logs' contains device commands but no device is selected"
        );

        let err = Error::BridgeNotFound {
            program: "adb".to_string(),
        };
        assert!(err.to_string().contains("'adb' not found"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_is_fatal() {
        assert!(Error::BridgeNotFound {
            program: "adb".into()
        }
        .is_fatal());
        assert!(Error::config("bad toml").is_fatal());
        assert!(!Error::no_device_selected("x").is_fatal());
    }

    #[test]
    fn test_persistence_error_names_path() {
        let err = Error::persistence("/data/history.json", "permission denied");
        let msg = err.to_string();
        assert!(msg.contains("/data/history.json"));
        assert!(msg.contains("permission denied"));
    }

    #[test]
    fn test_process_spawn_error_names_program() {
        let err = Error::process_spawn("adb", "No such file or directory");
        assert!(err.to_string().contains("'adb'"));
    }
}
