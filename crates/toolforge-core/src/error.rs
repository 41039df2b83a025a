// ABOUTME: Unified error taxonomy shared by every Toolforge component
// ABOUTME: One ErrorKind per spec error table, mapped to HTTP status at the edge (not here)

use std::fmt;
use thiserror::Error;

/// The error kinds named in the tool-server toolkit specification's error
/// table. Every component (scanner, stores, profile registry, generator,
/// dispatcher, supervisor, editor API) surfaces failures through one of
/// these, never through an ad hoc string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown tool name at dispatch time.
    ToolNotFound,
    /// Missing required property after default injection, or a type mismatch.
    InvalidArgument,
    /// The handler itself raised or returned a failure.
    HandlerError,
    /// A tool's `mcp_service` did not resolve to a registered handler at
    /// generation time.
    ServiceBindingError,
    /// A `SaveAll` call's expected mtime did not match the file on disk.
    ConcurrencyConflict,
    /// A profile, tool, or backup name did not resolve to anything.
    NotFound,
    /// A destructive operation targeted a protected profile.
    Protected,
    /// The supervisor was asked to start a profile/protocol with no
    /// generated artifact on disk.
    NotBuilt,
    /// A spawned child process exited before it became live.
    SpawnFailed,
    /// Malformed input reached the editor control plane.
    ValidationError,
}

impl ErrorKind {
    /// A short machine-stable name, used as the `kind` field in dispatcher
    /// and editor-API error responses.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ToolNotFound => "ToolNotFound",
            Self::InvalidArgument => "InvalidArgument",
            Self::HandlerError => "HandlerError",
            Self::ServiceBindingError => "ServiceBindingError",
            Self::ConcurrencyConflict => "ConcurrencyConflict",
            Self::NotFound => "NotFound",
            Self::Protected => "Protected",
            Self::NotBuilt => "NotBuilt",
            Self::SpawnFailed => "SpawnFailed",
            Self::ValidationError => "ValidationError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single error type threaded through every Toolforge component.
///
/// Carries an [`ErrorKind`] for programmatic dispatch plus a human-readable
/// message. HTTP status mapping and JSON envelope construction live at the
/// editor control plane and generated-server boundary, not here — this crate
/// has no HTTP dependency.
#[derive(Debug, Error, Clone)]
#[error("{kind}: {message}")]
pub struct ToolforgeError {
    /// The structured error kind.
    pub kind: ErrorKind,
    /// Human-readable detail, safe to show to a caller (never includes
    /// secrets or raw handler internals — callers should sanitize before
    /// attaching handler output).
    pub message: String,
}

impl ToolforgeError {
    /// Construct an error of the given kind with a message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for [`ErrorKind::ToolNotFound`].
    pub fn tool_not_found(tool_name: &str) -> Self {
        Self::new(ErrorKind::ToolNotFound, format!("unknown tool '{tool_name}'"))
    }

    /// Shorthand for [`ErrorKind::InvalidArgument`].
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    /// Shorthand for [`ErrorKind::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Shorthand for [`ErrorKind::ConcurrencyConflict`].
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConcurrencyConflict, message)
    }

    /// Shorthand for [`ErrorKind::Protected`].
    pub fn protected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Protected, message)
    }

    /// Shorthand for [`ErrorKind::ValidationError`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationError, message)
    }
}

impl From<std::io::Error> for ToolforgeError {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorKind::NotFound, err.to_string())
    }
}

impl From<serde_json::Error> for ToolforgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorKind::ValidationError, err.to_string())
    }
}

/// Convenience alias used throughout the workspace.
pub type ToolforgeResult<T> = Result<T, ToolforgeError>;
