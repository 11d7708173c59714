//! Configuration types for the SQL Tutor engine.
//!
//! This module provides the configuration structures that select the dataset
//! and exercise bank, control result truncation, and tune the advisor and
//! embedding capabilities.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TutorError};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "sqltutor.json";

/// Default database path.
fn default_database() -> String {
    "data/sample_database.db".to_string()
}

/// Default exercise bank path.
fn default_exercises() -> String {
    "data/queries.json".to_string()
}

/// Default number of result rows shown to the learner.
const fn default_display_rows() -> usize {
    10
}

/// Default advisor model.
fn default_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

/// Default advisor endpoint.
fn default_endpoint() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

/// Default environment variable holding the advisor API key.
fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

/// Default advisor timeout in seconds.
const fn default_advisor_timeout() -> u32 {
    30
}

const fn default_hint_max_tokens() -> u32 {
    300
}

const fn default_feedback_max_tokens() -> u32 {
    500
}

const fn default_synthesis_max_tokens() -> u32 {
    500
}

/// Default embedding dimensionality.
const fn default_dimension() -> usize {
    256
}

/// Default value for boolean options that default to true.
const fn default_true() -> bool {
    true
}

/// Main configuration for SQL Tutor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Path to the SQLite database the exercises run against.
    #[serde(default = "default_database")]
    pub database: String,

    /// Path to the JSON exercise bank.
    #[serde(default = "default_exercises")]
    pub exercises: String,

    /// Maximum number of result rows displayed before truncating.
    #[serde(default = "default_display_rows")]
    pub display_rows: usize,

    /// Advisor (LLM) settings.
    #[serde(default)]
    pub advisor: AdvisorConfig,

    /// Embedding settings for the similarity scorer.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: default_database(),
            exercises: default_exercises(),
            display_rows: default_display_rows(),
            advisor: AdvisorConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `sqltutor.json` in the current directory. If not found,
    /// returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            TutorError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `sqltutor.json` inside a specific directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        Self::load_from_file(&config_path)
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::ConfigParseError` if the file exists but contains
    /// invalid JSON, and `TutorError::ConfigValidationError` if the values
    /// are out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(TutorError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| TutorError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::ConfigValidationError` if any validation check fails.
    pub fn validate(&self) -> Result<()> {
        if self.database.trim().is_empty() {
            return Err(TutorError::config_validation(
                "database path must not be empty",
                "Provide a valid SQLite database path in your sqltutor.json",
            ));
        }

        if self.exercises.trim().is_empty() {
            return Err(TutorError::config_validation(
                "exercises path must not be empty",
                "Provide a valid exercise bank path in your sqltutor.json",
            ));
        }

        if self.display_rows == 0 {
            return Err(TutorError::config_validation(
                "displayRows must be greater than 0",
                "Set displayRows to at least 1 in your sqltutor.json",
            ));
        }

        if self.advisor.timeout_seconds == 0 {
            return Err(TutorError::config_validation(
                "advisor.timeoutSeconds must be greater than 0",
                "Set advisor.timeoutSeconds to at least 1 second in your sqltutor.json",
            ));
        }

        if self.advisor.hint_max_tokens == 0
            || self.advisor.feedback_max_tokens == 0
            || self.advisor.synthesis_max_tokens == 0
        {
            return Err(TutorError::config_validation(
                "advisor token limits must be greater than 0",
                "Set hintMaxTokens, feedbackMaxTokens and synthesisMaxTokens to positive values",
            ));
        }

        if self.embedding.dimension == 0 {
            return Err(TutorError::config_validation(
                "embedding.dimension must be greater than 0",
                "Set embedding.dimension to a positive value such as 256",
            ));
        }

        Ok(())
    }
}

/// Advisor (LLM) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvisorConfig {
    /// Whether to use the advisor at all when an API key is present.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Model identifier sent with each request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Messages API endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Timeout for a single advisor call in seconds.
    #[serde(default = "default_advisor_timeout")]
    pub timeout_seconds: u32,

    /// Output limit for progressive hints.
    #[serde(default = "default_hint_max_tokens")]
    pub hint_max_tokens: u32,

    /// Output limit for detailed feedback.
    #[serde(default = "default_feedback_max_tokens")]
    pub feedback_max_tokens: u32,

    /// Output limit for exercise synthesis.
    #[serde(default = "default_synthesis_max_tokens")]
    pub synthesis_max_tokens: u32,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            model: default_model(),
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
            timeout_seconds: default_advisor_timeout(),
            hint_max_tokens: default_hint_max_tokens(),
            feedback_max_tokens: default_feedback_max_tokens(),
            synthesis_max_tokens: default_synthesis_max_tokens(),
        }
    }
}

/// Embedding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingConfig {
    /// Dimensionality of the hashing embedder's vectors.
    #[serde(default = "default_dimension")]
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
        }
    }
}
