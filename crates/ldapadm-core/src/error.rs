//! Error types for directory administration.
//!
//! Every failure the tool can report maps onto one variant of [`Error`]. Object manager
//! errors travel unchanged up to the administrative layer, which records them per target.

use thiserror::Error;

/// Main error type for ldapadm operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Invalid configuration: bad auth mode, unknown option, empty attribute set, ...
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The directory rejected the bind
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// No entry matched where one was required
    #[error("Not found: {0}")]
    NotFound(String),

    /// More than one entry matched where exactly one was required
    #[error(
        "Too many results found for single-object query: base: '{base}' filter: '{filter}' results: {}",
        .dns.join("; ")
    )]
    AmbiguousResult {
        /// Search base used
        base: String,
        /// Search filter used
        filter: String,
        /// Distinguished names of every matching entry
        dns: Vec<String>,
    },

    /// A value requested for removal is not present on the entry
    #[error("Value '{value}' not present in attribute '{attribute}' of '{dn}'")]
    ValueNotFound {
        /// Entry that was modified
        dn: String,
        /// Attribute that was modified
        attribute: String,
        /// Missing value
        value: String,
    },

    /// Malformed request, e.g. an unparsable distinguished name
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Any other non-success result reported by the directory server
    #[error("Directory error (rc={code}): {message}")]
    DirectoryError {
        /// LDAP result code
        code: u32,
        /// Diagnostic message
        message: String,
    },

    /// The connection to the directory server failed
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Operation timed out
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Local I/O failure (configuration file, CA certificate)
    #[error("I/O error: {0}")]
    IoError(String),
}

/// Specialized result type for ldapadm operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::AuthenticationError(_) => "AUTHENTICATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::AmbiguousResult { .. } => "AMBIGUOUS_RESULT",
            Self::ValueNotFound { .. } => "VALUE_NOT_FOUND",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::DirectoryError { .. } => "DIRECTORY_ERROR",
            Self::ConnectionError(_) => "CONNECTION_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::IoError(_) => "IO_ERROR",
        }
    }

    /// Returns true if this error should be logged as a serious error.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(
            self,
            Self::ConfigError(_)
                | Self::AuthenticationError(_)
                | Self::DirectoryError { .. }
                | Self::ConnectionError(_)
                | Self::IoError(_)
        )
    }
}

// Conversions from external error types
impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::ConfigError(format!("invalid directory URI: {err}"))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}
