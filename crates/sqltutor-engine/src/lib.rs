//! SQL Tutor Engine
//!
//! Evaluates learner queries against reference solutions, scores how close a
//! wrong attempt is, and escalates hints across a bounded number of attempts.

pub mod advisor;
pub mod comparator;
pub mod config;
pub mod error;
pub mod executor;
pub mod exercise;
pub mod hint;
pub mod result;
pub mod selector;
pub mod session;
pub mod similarity;
pub mod synthesis;

pub use advisor::{Advisor, AnthropicAdvisor};
pub use comparator::results_equivalent;
pub use config::{AdvisorConfig, Config, EmbeddingConfig};
pub use error::{AdvisorErrorKind, Result, TutorError};
pub use executor::{ColumnInfo, QueryExecutor, SqliteExecutor, TableInfo};
pub use exercise::{Exercise, ExerciseBank, Tier};
pub use hint::{Hint, HintPolicy, HintSource, HintTier};
pub use result::{CellValue, ExecutionResult, ResultPreview};
pub use selector::{CompletionTracker, ExerciseSelector};
pub use session::{
    AttemptOutcome, AttemptRecord, AttemptReport, AttemptState, Engine, Revelation, Session,
    SessionStatus, DEFAULT_DISPLAY_ROWS, MAX_ATTEMPTS,
};
pub use similarity::{
    cosine_similarity, EmbeddingProvider, HashingEmbedder, SimilarityScore, SimilarityScorer,
};
pub use synthesis::ExerciseSynthesizer;
