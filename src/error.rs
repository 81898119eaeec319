//! Error types for the Eliza daemon
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - User-friendly messages with suggestions
//! - Degradation hints (what the cycle does instead of failing)
//! - Exit codes for CLI

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::Domain;

/// Result type alias for daemon operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,

    // IO errors (2xx)
    IoRead = 200,
    IoWrite = 201,
    IoNotFound = 202,

    // Store errors (3xx)
    StoreUnavailable = 300,
    StoreDuplicate = 301,
    StoreCorrupt = 302,

    // Persona errors (4xx)
    UnknownPersona = 400,
    DuplicateIdentity = 401,
    InvalidPersona = 402,

    // Routing & coordination errors (5xx)
    Unroutable = 500,
    DeliberationTimeout = 501,
    VetoedDecision = 502,
    InvalidSession = 503,

    // Collaborator errors (6xx)
    ConnectorUnavailable = 600,
    ReasoningServiceFailure = 601,
    ExecutionFailure = 602,
    NotificationFailure = 603,

    // Internal errors (9xx)
    InternalError = 900,
}

impl ErrorCode {
    /// Get the string code (e.g., "E100")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI (maps to 1-125 range)
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10,
            200..=299 => 20,
            300..=399 => 30,
            400..=499 => 40,
            500..=599 => 50,
            600..=699 => 60,
            900..=999 => 90,
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for the daemon
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    // ─────────────────────────────────────────────────────────────
    // IO Errors
    // ─────────────────────────────────────────────────────────────

    #[error("Failed to read file: {path}")]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Store Errors
    // ─────────────────────────────────────────────────────────────

    /// The persistent store cannot be opened or written
    #[error("Persistent store unavailable at {location}: {message}")]
    StoreUnavailable { location: String, message: String },

    /// Insert-only write hit an existing document
    #[error("Document {collection}/{id} already exists")]
    StoreDuplicate { collection: String, id: String },

    /// A stored document could not be decoded
    #[error("Corrupt document {collection}/{id}: {message}")]
    StoreCorrupt {
        collection: String,
        id: String,
        message: String,
    },

    // ─────────────────────────────────────────────────────────────
    // Persona Errors
    // ─────────────────────────────────────────────────────────────

    #[error("Unknown persona: {id}")]
    UnknownPersona { id: String },

    #[error("Persona {id} is already registered")]
    DuplicateIdentity { id: String },

    #[error("Invalid persona {id}: {reason}")]
    InvalidPersona { id: String, reason: String },

    // ─────────────────────────────────────────────────────────────
    // Routing & Coordination Errors
    // ─────────────────────────────────────────────────────────────

    #[error("Observation {observation_id} is unroutable: {reason}")]
    Unroutable {
        observation_id: String,
        reason: String,
    },

    #[error("Session {session_id} deliberation timed out after {timeout_ms}ms")]
    DeliberationTimeout { session_id: String, timeout_ms: u64 },

    #[error("Decision on {topic} vetoed by {persona_id}")]
    VetoedDecision { topic: String, persona_id: String },

    #[error("Invalid coordination session {session_id}: {message}")]
    InvalidSession { session_id: String, message: String },

    // ─────────────────────────────────────────────────────────────
    // Collaborator Errors
    // ─────────────────────────────────────────────────────────────

    #[error("Connector for {domain} unavailable: {message}")]
    ConnectorUnavailable { domain: Domain, message: String },

    #[error("Reasoning service failure: {message}")]
    ReasoningServiceFailure { message: String },

    #[error("Execution of {action} on {topic} failed: {message}")]
    ExecutionFailure {
        action: String,
        topic: String,
        message: String,
    },

    #[error("Notification delivery failed: {message}")]
    NotificationFailure { message: String },

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    // ─────────────────────────────────────────────────────────────
    // Error Classification
    // ─────────────────────────────────────────────────────────────

    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::ConfigValidation { .. } => ErrorCode::ConfigValidation,

            Error::IoRead { .. } => ErrorCode::IoRead,
            Error::IoWrite { .. } => ErrorCode::IoWrite,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::IoNotFound,
                _ => ErrorCode::IoRead,
            },
            Error::Toml(_) => ErrorCode::ConfigParseError,
            Error::Json(_) => ErrorCode::StoreCorrupt,

            Error::StoreUnavailable { .. } => ErrorCode::StoreUnavailable,
            Error::StoreDuplicate { .. } => ErrorCode::StoreDuplicate,
            Error::StoreCorrupt { .. } => ErrorCode::StoreCorrupt,

            Error::UnknownPersona { .. } => ErrorCode::UnknownPersona,
            Error::DuplicateIdentity { .. } => ErrorCode::DuplicateIdentity,
            Error::InvalidPersona { .. } => ErrorCode::InvalidPersona,

            Error::Unroutable { .. } => ErrorCode::Unroutable,
            Error::DeliberationTimeout { .. } => ErrorCode::DeliberationTimeout,
            Error::VetoedDecision { .. } => ErrorCode::VetoedDecision,
            Error::InvalidSession { .. } => ErrorCode::InvalidSession,

            Error::ConnectorUnavailable { .. } => ErrorCode::ConnectorUnavailable,
            Error::ReasoningServiceFailure { .. } => ErrorCode::ReasoningServiceFailure,
            Error::ExecutionFailure { .. } => ErrorCode::ExecutionFailure,
            Error::NotificationFailure { .. } => ErrorCode::NotificationFailure,

            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Check if the error is retryable within the same cycle
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ConnectorUnavailable { .. }
                | Error::ReasoningServiceFailure { .. }
                | Error::NotificationFailure { .. }
                | Error::Io(_)
                | Error::IoRead { .. }
                | Error::IoWrite { .. }
        )
    }

    /// Check if the error is fatal (daemon should exit)
    ///
    /// Only startup conditions are fatal: an unusable store or configuration.
    /// Everything that happens inside a cycle degrades instead.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ConfigNotFound { .. }
                | Error::ConfigParse { .. }
                | Error::ConfigValidation { .. }
                | Error::StoreUnavailable { .. }
                | Error::Internal(_)
        )
    }

    /// Check if the error degrades to "no data / no position" inside a cycle
    pub fn degrades_gracefully(&self) -> bool {
        matches!(
            self,
            Error::ConnectorUnavailable { .. }
                | Error::ReasoningServiceFailure { .. }
                | Error::NotificationFailure { .. }
                | Error::DeliberationTimeout { .. }
        )
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    // ─────────────────────────────────────────────────────────────
    // User-Friendly Messages
    // ─────────────────────────────────────────────────────────────

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ConfigNotFound { .. } => Some(
                "Run 'eliza-daemon config init' to create a default configuration file.",
            ),
            Error::ConfigParse { .. } => Some(
                "Check your configuration file syntax. Run 'eliza-daemon config validate' to see details.",
            ),
            Error::ConfigValidation { .. } => Some(
                "Review the configuration file and fix the invalid values.",
            ),
            Error::StoreUnavailable { .. } => Some(
                "Check that 'storage.data_dir' exists and is writable by the daemon user.",
            ),
            Error::StoreCorrupt { .. } => Some(
                "A stored document is unreadable. Inspect or remove it from the data directory.",
            ),
            Error::UnknownPersona { .. } => Some(
                "Run 'eliza-daemon persona list' to see registered persona ids.",
            ),
            Error::DuplicateIdentity { .. } => Some(
                "Persona ids must be unique. Choose a different id or update the existing persona.",
            ),
            Error::ReasoningServiceFailure { .. } => Some(
                "Verify 'reasoning.base_url' and 'reasoning.api_key'. The persona abstains until the service recovers.",
            ),
            Error::ConnectorUnavailable { .. } => Some(
                "Check the connector URL and token. The domain yields no observations until it recovers.",
            ),
            _ => None,
        }
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let mut output = format!("\x1b[31mError [{}]\x1b[0m: {}\n", self.code().as_str(), self);

        if let Some(hint) = self.suggestion() {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }

        output
    }

    /// Format the error for logging (no colors)
    pub fn format_for_log(&self) -> String {
        format!("[{}] {}", self.code().as_str(), self)
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn config_parse(message: impl Into<String>) -> Self {
        Error::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_validation(message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a config validation error with field name
    pub fn config_field_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn unknown_persona(id: impl Into<String>) -> Self {
        Error::UnknownPersona { id: id.into() }
    }

    pub fn reasoning_failure(message: impl Into<String>) -> Self {
        Error::ReasoningServiceFailure {
            message: message.into(),
        }
    }

    pub fn connector_unavailable(domain: Domain, message: impl Into<String>) -> Self {
        Error::ConnectorUnavailable {
            domain,
            message: message.into(),
        }
    }

    pub fn execution_failure(
        action: impl Into<String>,
        topic: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::ExecutionFailure {
            action: action.into(),
            topic: topic.into(),
            message: message.into(),
        }
    }

    pub fn store_unavailable(location: impl Into<String>, message: impl Into<String>) -> Self {
        Error::StoreUnavailable {
            location: location.into(),
            message: message.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_format() {
        assert_eq!(ErrorCode::ConfigNotFound.as_str(), "E100");
        assert_eq!(ErrorCode::UnknownPersona.as_str(), "E400");
        assert_eq!(ErrorCode::InternalError.as_str(), "E900");
    }

    #[test]
    fn test_error_exit_codes() {
        assert_eq!(ErrorCode::ConfigValidation.exit_code(), 10);
        assert_eq!(ErrorCode::StoreUnavailable.exit_code(), 30);
        assert_eq!(ErrorCode::VetoedDecision.exit_code(), 50);
        assert_eq!(ErrorCode::ExecutionFailure.exit_code(), 60);
    }

    #[test]
    fn test_taxonomy_codes() {
        assert_eq!(Error::unknown_persona("p").code(), ErrorCode::UnknownPersona);
        assert_eq!(
            Error::DuplicateIdentity { id: "p".into() }.code(),
            ErrorCode::DuplicateIdentity
        );
        assert_eq!(
            Error::connector_unavailable(Domain::Mining, "timeout").code(),
            ErrorCode::ConnectorUnavailable
        );
        assert_eq!(
            Error::reasoning_failure("malformed").code(),
            ErrorCode::ReasoningServiceFailure
        );
        assert_eq!(
            Error::execution_failure("reward_transfer", "t", "boom").code(),
            ErrorCode::ExecutionFailure
        );
    }

    #[test]
    fn test_only_startup_errors_are_fatal() {
        assert!(Error::store_unavailable("/data", "read-only").is_fatal());
        assert!(Error::config_validation("bad").is_fatal());
        assert!(!Error::reasoning_failure("timeout").is_fatal());
        assert!(!Error::connector_unavailable(Domain::Social, "down").is_fatal());
        assert!(!Error::execution_failure("notification", "t", "x").is_fatal());
    }

    #[test]
    fn test_collaborator_failures_degrade() {
        assert!(Error::reasoning_failure("x").degrades_gracefully());
        assert!(Error::connector_unavailable(Domain::Governance, "x").degrades_gracefully());
        assert!(!Error::unknown_persona("p").degrades_gracefully());
    }

    #[test]
    fn test_format_for_terminal() {
        let err = Error::ConfigNotFound {
            path: PathBuf::from("/test/config.toml"),
        };
        let formatted = err.format_for_terminal();
        assert!(formatted.contains("E100"));
        assert!(formatted.contains("\x1b[31m"));
        assert!(formatted.contains("config init"));
    }

    #[test]
    fn test_format_for_log() {
        let formatted = Error::unknown_persona("ghost").format_for_log();
        assert!(formatted.contains("[E400]"));
        assert!(formatted.contains("ghost"));
        assert!(!formatted.contains("\x1b["));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        assert_eq!(err.code(), ErrorCode::IoNotFound);
        assert!(err.is_retryable());
    }
}
