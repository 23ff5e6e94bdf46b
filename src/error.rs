//! Unified error handling for the grid trading worker
//!
//! This module provides a single error type that replaces Box<dyn Error>
//! throughout the engine. Each variant maps to one branch of the propagation
//! policy: transient errors are retried on the next tick, venue rejections
//! abandon a single order, fatal errors stop the bot.

use std::fmt;
use std::io;

/// Main error type for the grid trading engine
#[derive(Debug)]
pub enum EngineError {
    // Configuration errors (fatal at init, no retry)
    ConfigNotFound(String),
    ConfigParse(String),
    ConfigValidation(String),
    InvalidRange(String),

    // Credential errors (fatal, bot marked error)
    CredentialsMissing(i64), // user id
    CredentialsRejected(String),

    // Venue errors
    VenueUnreachable(String),
    VenueTimeout(String),
    VenueRateLimit(String),
    VenueRejection(String),
    VenueResponse(String),

    // Persistence errors
    DatabaseConnection(String),
    DatabaseQuery(String),
    DatabaseConstraint(String),

    // Lifecycle errors
    BotNotFound(i64),
    RiskBreach(String),
    InvalidState(String),

    // IO / general errors
    FileRead(String),
    FileWrite(String),
    Internal(String),
}

impl EngineError {
    /// Check if the error is transient and safe to retry on the next tick
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::VenueUnreachable(_)
                | EngineError::VenueTimeout(_)
                | EngineError::VenueRateLimit(_)
        )
    }

    /// Check if the error must stop the bot (status transition to error)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::ConfigNotFound(_)
                | EngineError::ConfigParse(_)
                | EngineError::ConfigValidation(_)
                | EngineError::InvalidRange(_)
                | EngineError::CredentialsMissing(_)
                | EngineError::CredentialsRejected(_)
                | EngineError::BotNotFound(_)
                | EngineError::RiskBreach(_)
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            EngineError::ConfigNotFound(_)
            | EngineError::ConfigParse(_)
            | EngineError::ConfigValidation(_)
            | EngineError::InvalidRange(_) => "config",

            EngineError::CredentialsMissing(_) | EngineError::CredentialsRejected(_) => {
                "credentials"
            }

            EngineError::VenueUnreachable(_)
            | EngineError::VenueTimeout(_)
            | EngineError::VenueRateLimit(_)
            | EngineError::VenueRejection(_)
            | EngineError::VenueResponse(_) => "venue",

            EngineError::DatabaseConnection(_)
            | EngineError::DatabaseQuery(_)
            | EngineError::DatabaseConstraint(_) => "database",

            EngineError::BotNotFound(_)
            | EngineError::RiskBreach(_)
            | EngineError::InvalidState(_) => "lifecycle",

            EngineError::FileRead(_) | EngineError::FileWrite(_) => "io",

            EngineError::Internal(_) => "internal",
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::ConfigNotFound(path) => {
                write!(f, "Configuration file not found: {}", path)
            }
            EngineError::ConfigParse(msg) => {
                write!(f, "Configuration parse error: {}", msg)
            }
            EngineError::ConfigValidation(msg) => {
                write!(f, "Configuration validation error: {}", msg)
            }
            EngineError::InvalidRange(msg) => {
                write!(f, "Invalid grid range: {}", msg)
            }

            EngineError::CredentialsMissing(user_id) => {
                write!(f, "API keys not found for user {}", user_id)
            }
            EngineError::CredentialsRejected(msg) => {
                write!(f, "API key validation failed: {}", msg)
            }

            EngineError::VenueUnreachable(msg) => {
                write!(f, "Venue unreachable: {}", msg)
            }
            EngineError::VenueTimeout(msg) => {
                write!(f, "Venue request timed out: {}", msg)
            }
            EngineError::VenueRateLimit(msg) => {
                write!(f, "Venue rate limit exceeded: {}", msg)
            }
            EngineError::VenueRejection(msg) => {
                write!(f, "Order rejected by venue: {}", msg)
            }
            EngineError::VenueResponse(msg) => {
                write!(f, "Unexpected venue response: {}", msg)
            }

            EngineError::DatabaseConnection(msg) => {
                write!(f, "Database connection error: {}", msg)
            }
            EngineError::DatabaseQuery(msg) => {
                write!(f, "Database query error: {}", msg)
            }
            EngineError::DatabaseConstraint(msg) => {
                write!(f, "Database constraint violation: {}", msg)
            }

            EngineError::BotNotFound(id) => {
                write!(f, "Bot #{} not found", id)
            }
            EngineError::RiskBreach(msg) => {
                write!(f, "Risk breach: {}", msg)
            }
            EngineError::InvalidState(msg) => {
                write!(f, "Invalid session state: {}", msg)
            }

            EngineError::FileRead(msg) => {
                write!(f, "File read error: {}", msg)
            }
            EngineError::FileWrite(msg) => {
                write!(f, "File write error: {}", msg)
            }
            EngineError::Internal(msg) => {
                write!(f, "Internal error: {}", msg)
            }
        }
    }
}

impl std::error::Error for EngineError {}

// Conversion implementations for common error types

impl From<io::Error> for EngineError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                EngineError::FileRead(err.to_string())
            }
            io::ErrorKind::TimedOut => EngineError::VenueTimeout(err.to_string()),
            io::ErrorKind::ConnectionRefused => EngineError::VenueUnreachable(err.to_string()),
            _ => EngineError::Internal(format!("IO error: {}", err)),
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(_, Some(msg)) => {
                if msg.contains("UNIQUE constraint") || msg.contains("FOREIGN KEY constraint") {
                    EngineError::DatabaseConstraint(msg)
                } else {
                    EngineError::DatabaseQuery(msg)
                }
            }
            rusqlite::Error::QueryReturnedNoRows => {
                EngineError::DatabaseQuery("Query returned no rows".to_string())
            }
            _ => EngineError::DatabaseQuery(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EngineError::VenueTimeout(err.to_string())
        } else if err.is_connect() {
            EngineError::VenueUnreachable(err.to_string())
        } else if err.is_status() {
            EngineError::VenueResponse(err.to_string())
        } else {
            EngineError::VenueUnreachable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::VenueResponse(format!("JSON parse error: {}", err))
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::ConfigParse(format!("TOML parse error: {}", err))
    }
}

impl From<crate::config::ConfigError> for EngineError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::FileNotFound(path) => EngineError::ConfigNotFound(path),
            ConfigError::FileRead(msg) => EngineError::FileRead(msg),
            ConfigError::FileWrite(msg) => EngineError::FileWrite(msg),
            ConfigError::Parse(msg) => EngineError::ConfigParse(msg),
            ConfigError::Serialize(msg) => EngineError::ConfigParse(msg),
            ConfigError::Validation(msg) => EngineError::ConfigValidation(msg),
        }
    }
}

impl From<String> for EngineError {
    fn from(msg: String) -> Self {
        EngineError::Internal(msg)
    }
}

impl From<&str> for EngineError {
    fn from(msg: &str) -> Self {
        EngineError::Internal(msg.to_string())
    }
}

/// Result type alias using EngineError
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::BotNotFound(42);
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn test_error_category() {
        let err = EngineError::ConfigValidation("test".to_string());
        assert_eq!(err.category(), "config");

        let err = EngineError::DatabaseQuery("test".to_string());
        assert_eq!(err.category(), "database");

        let err = EngineError::VenueTimeout("test".to_string());
        assert_eq!(err.category(), "venue");
    }

    #[test]
    fn test_retryable() {
        let err = EngineError::VenueTimeout("test".to_string());
        assert!(err.is_retryable());
        assert!(!err.is_fatal());

        let err = EngineError::CredentialsMissing(1);
        assert!(err.is_fatal());
        assert!(!err.is_retryable());

        let err = EngineError::VenueRejection("bad quantity".to_string());
        assert!(!err.is_retryable());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_io_conversion() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "test");
        let engine_err: EngineError = io_err.into();
        assert!(matches!(engine_err, EngineError::VenueUnreachable(_)));
    }
}
