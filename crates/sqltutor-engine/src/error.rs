//! Error types for the SQL Tutor engine.
//!
//! This module defines the error hierarchy for engine operations that can
//! genuinely fail: configuration loading, exercise bank parsing, dataset
//! access and the external advisor/embedding capabilities. Learner-level
//! conditions (a query that does not run, a wrong answer, running out of
//! attempts) are not errors; they are reported as session outcomes.

use std::path::PathBuf;

/// A specialized `Result` type for SQL Tutor engine operations.
pub type Result<T> = std::result::Result<T, TutorError>;

/// Errors that can occur while running the SQL Tutor engine.
///
/// Error variants are organized by subsystem and include actionable suggestions
/// where possible to help users resolve issues.
#[derive(Debug, thiserror::Error)]
pub enum TutorError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your sqltutor.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Exercise Bank Errors
    // ========================================================================
    /// Exercise file was not found at the specified path.
    #[error("Exercise file not found: '{path}'\n\nSuggestion: Check the 'exercises' field in sqltutor.json or pass --exercises")]
    ExerciseFileNotFound {
        /// Path where the exercise file was expected.
        path: PathBuf,
    },

    /// Exercise file is not valid JSON or has the wrong top-level shape.
    #[error("Invalid exercise file '{path}': {message}\n\nSuggestion: The file must be a JSON object keyed by tier name, each holding an array of exercises")]
    ExerciseParseError {
        /// Path to the exercise file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// An exercise record is missing a required field or has an invalid one.
    #[error("Invalid exercise #{position} in tier '{tier}': field '{field}' {problem}\n\nSuggestion: Every exercise needs non-empty 'id', 'question', 'solution' and a 'concepts' array")]
    InvalidExercise {
        /// Tier the exercise belongs to.
        tier: String,
        /// 1-based position of the exercise within its tier.
        position: usize,
        /// Name of the offending field.
        field: &'static str,
        /// What is wrong with the field.
        problem: &'static str,
    },

    /// An unknown difficulty tier was requested.
    ///
    /// This is a programming error rather than a recoverable condition.
    #[error("Invalid level: '{name}'. Choose from: beginner, intermediate, advanced")]
    InvalidTier {
        /// The name that failed to parse.
        name: String,
    },

    // ========================================================================
    // Dataset Errors
    // ========================================================================
    /// The database file does not exist.
    #[error("Database not found at '{path}'\n\nSuggestion: Create it with 'sqlite3 {path} < data/sample_database.sql' or pass --init-sql")]
    DatabaseNotFound {
        /// Path where the database was expected.
        path: PathBuf,
    },

    /// SQLite reported an error outside of learner query execution.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    // ========================================================================
    // Capability Errors
    // ========================================================================
    /// No advisor is configured (missing API key or disabled in config).
    #[error("Advisor not available: {reason}\n\nSuggestion: Set the API key environment variable to enable AI guidance")]
    AdvisorUnavailable {
        /// Why the advisor is unavailable.
        reason: String,
    },

    /// Advisor API returned an error (authentication, rate limiting, etc.).
    #[error("Advisor API error ({kind}): {message}\n\nSuggestion: {suggestion}")]
    AdvisorApiError {
        /// The kind of API error.
        kind: AdvisorErrorKind,
        /// Detailed error message from the API.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    /// The embedding capability failed to produce vectors.
    #[error("Embedding failed: {message}")]
    EmbeddingFailed {
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // Synthesis Errors
    // ========================================================================
    /// The advisor response for a generated exercise could not be used.
    #[error("Could not parse generated exercise: {message}")]
    SynthesisParseError {
        /// Description of the parse failure.
        message: String,
    },

    // ========================================================================
    // State Machine Errors
    // ========================================================================
    /// Invalid state transition attempted.
    #[error("Invalid state transition: cannot go from {from} to {to}")]
    InvalidStateTransition {
        /// The current state.
        from: String,
        /// The attempted target state.
        to: String,
    },

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Categories of advisor API errors for structured error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvisorErrorKind {
    /// Authentication failure (invalid API key, expired credentials).
    Authentication,
    /// Rate limit exceeded.
    RateLimit,
    /// Server error (5xx responses).
    Server,
    /// Network connectivity issues.
    Network,
    /// The call did not finish within the configured timeout.
    Timeout,
    /// The response could not be interpreted.
    InvalidResponse,
    /// Other unclassified errors.
    Other,
}

impl std::fmt::Display for AdvisorErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Server => write!(f, "server"),
            Self::Network => write!(f, "network"),
            Self::Timeout => write!(f, "timeout"),
            Self::InvalidResponse => write!(f, "invalid_response"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl AdvisorErrorKind {
    /// Classifies an HTTP status code returned by the advisor API.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Authentication,
            429 => Self::RateLimit,
            500..=599 => Self::Server,
            _ => Self::Other,
        }
    }

    /// Returns a suggestion message for this error kind.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::Authentication => "Check your API key or credentials",
            Self::RateLimit => "Wait and retry, or reduce request frequency",
            Self::Server => "Retry later; the advisor service may be experiencing issues",
            Self::Network => "Check your network connection",
            Self::Timeout => "Increase advisor.timeoutSeconds in sqltutor.json",
            Self::InvalidResponse => "Check the advisor endpoint and model settings",
            Self::Other => "Check the advisor provider's status page",
        }
    }
}

impl TutorError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `ExerciseFileNotFound` error.
    #[must_use]
    pub fn exercise_file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ExerciseFileNotFound { path: path.into() }
    }

    /// Creates a new `ExerciseParseError`.
    #[must_use]
    pub fn exercise_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ExerciseParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `InvalidExercise` error.
    #[must_use]
    pub fn invalid_exercise(
        tier: impl std::fmt::Display,
        position: usize,
        field: &'static str,
        problem: &'static str,
    ) -> Self {
        Self::InvalidExercise {
            tier: tier.to_string(),
            position,
            field,
            problem,
        }
    }

    /// Creates a new `InvalidTier` error.
    #[must_use]
    pub fn invalid_tier(name: impl Into<String>) -> Self {
        Self::InvalidTier { name: name.into() }
    }

    /// Creates a new `DatabaseNotFound` error.
    #[must_use]
    pub fn database_not_found(path: impl Into<PathBuf>) -> Self {
        Self::DatabaseNotFound { path: path.into() }
    }

    /// Creates a new `AdvisorUnavailable` error.
    #[must_use]
    pub fn advisor_unavailable(reason: impl Into<String>) -> Self {
        Self::AdvisorUnavailable {
            reason: reason.into(),
        }
    }

    /// Creates a new `AdvisorApiError` with automatic suggestion based on error kind.
    #[must_use]
    pub fn advisor_api_error(kind: AdvisorErrorKind, message: impl Into<String>) -> Self {
        let suggestion = kind.suggestion().to_string();
        Self::AdvisorApiError {
            kind,
            message: message.into(),
            suggestion,
        }
    }

    /// Creates a new `EmbeddingFailed` error.
    #[must_use]
    pub fn embedding_failed(message: impl Into<String>) -> Self {
        Self::EmbeddingFailed {
            message: message.into(),
        }
    }

    /// Creates a new `SynthesisParseError`.
    #[must_use]
    pub fn synthesis_parse(message: impl Into<String>) -> Self {
        Self::SynthesisParseError {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidStateTransition` error.
    #[must_use]
    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Returns `true` if this error is transient and may be retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::AdvisorApiError {
                kind: AdvisorErrorKind::RateLimit
                    | AdvisorErrorKind::Server
                    | AdvisorErrorKind::Network
                    | AdvisorErrorKind::Timeout,
                ..
            }
        )
    }

    /// Returns `true` if this error is fatal and requires immediate termination.
    ///
    /// Capability failures are never fatal: the engine degrades to its
    /// deterministic fallbacks instead.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigParseError { .. }
                | Self::ConfigValidationError { .. }
                | Self::ExerciseFileNotFound { .. }
                | Self::ExerciseParseError { .. }
                | Self::InvalidExercise { .. }
                | Self::InvalidTier { .. }
                | Self::DatabaseNotFound { .. }
        )
    }

    /// Returns `true` if this error came from an optional external capability.
    #[must_use]
    pub const fn is_capability_failure(&self) -> bool {
        matches!(
            self,
            Self::AdvisorUnavailable { .. }
                | Self::AdvisorApiError { .. }
                | Self::EmbeddingFailed { .. }
                | Self::SynthesisParseError { .. }
        )
    }
}
