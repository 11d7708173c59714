//! Practice session state machine.
//!
//! A [`Session`] evaluates up to [`MAX_ATTEMPTS`] attempts at one exercise.
//! Each attempt runs as a sequential pipeline: execute the learner query,
//! execute the reference solution, compare, then score and hint when the
//! attempt is wrong. Executor, embedding and advisor failures are turned into
//! outcome values or fallback text and never abort the session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::comparator::results_equivalent;
use crate::error::{Result, TutorError};
use crate::exercise::{Exercise, Tier};
use crate::executor::QueryExecutor;
use crate::hint::{Hint, HintPolicy};
use crate::result::{ExecutionResult, ResultPreview};
use crate::selector::CompletionTracker;
use crate::similarity::{SimilarityScore, SimilarityScorer};

/// Number of attempts a learner gets per exercise.
pub const MAX_ATTEMPTS: u32 = 3;

/// Default number of result rows shown to the learner.
pub const DEFAULT_DISPLAY_ROWS: usize = 10;

// ============================================================================
// SessionStatus
// ============================================================================

/// Current status of a practice session.
///
/// The status transitions through these states:
/// - `AwaitingAttempt` -> `Correct` (attempt matched the reference)
/// - `AwaitingAttempt` -> `Incorrect` (wrong attempt, slots remain)
/// - `AwaitingAttempt` -> `Exhausted` (wrong attempt in the last slot)
/// - From `Incorrect`:
///   - `AwaitingAttempt` (retry)
///   - `Revealed` (learner asked for the solution)
///   - `Abandoned` (learner stopped)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Waiting for the learner to submit a query.
    #[default]
    AwaitingAttempt,
    /// The last attempt was wrong; waiting for retry, reveal or feedback.
    Incorrect,
    /// The learner solved the exercise.
    Correct,
    /// All attempts were used without a correct answer.
    Exhausted,
    /// The learner asked to see the solution.
    Revealed,
    /// The learner stopped working on the exercise.
    Abandoned,
}

impl SessionStatus {
    /// Returns `true` if this status ends the session.
    ///
    /// # Examples
    ///
    /// ```
    /// use sqltutor_engine::SessionStatus;
    ///
    /// assert!(SessionStatus::Correct.is_terminal());
    /// assert!(SessionStatus::Exhausted.is_terminal());
    /// assert!(!SessionStatus::Incorrect.is_terminal());
    /// ```
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Correct | Self::Exhausted | Self::Revealed | Self::Abandoned
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AwaitingAttempt => write!(f, "awaiting_attempt"),
            Self::Incorrect => write!(f, "incorrect"),
            Self::Correct => write!(f, "correct"),
            Self::Exhausted => write!(f, "exhausted"),
            Self::Revealed => write!(f, "revealed"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

// ============================================================================
// AttemptRecord and AttemptState
// ============================================================================

/// Record of one evaluated attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// The attempt number (1-indexed).
    pub attempt: u32,

    /// The query as the learner submitted it.
    pub query: String,

    /// What the executor returned for the query.
    pub result: ExecutionResult,

    /// Closeness to the reference solution, if it was computed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<SimilarityScore>,

    /// Whether the attempt matched the reference.
    pub correct: bool,

    /// When the attempt was submitted.
    pub submitted_at: DateTime<Utc>,
}

/// Attempt bookkeeping for one exercise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptState {
    /// Tier the exercise was drawn from.
    pub tier: Tier,

    /// The exercise being attempted.
    pub exercise: Exercise,

    /// Current attempt slot, from 1 up to `max_attempts`.
    pub attempt_index: u32,

    /// Number of attempt slots.
    pub max_attempts: u32,

    /// Every evaluated attempt, oldest first.
    pub history: Vec<AttemptRecord>,

    /// When the session started.
    pub started_at: DateTime<Utc>,
}

impl AttemptState {
    /// Creates the state for a fresh session on the first attempt slot.
    #[must_use]
    pub fn new(tier: Tier, exercise: Exercise) -> Self {
        Self {
            tier,
            exercise,
            attempt_index: 1,
            max_attempts: MAX_ATTEMPTS,
            history: Vec::new(),
            started_at: Utc::now(),
        }
    }

    /// Returns the most recent attempt.
    #[must_use]
    pub fn last_attempt(&self) -> Option<&AttemptRecord> {
        self.history.last()
    }

    /// Returns `true` if the current slot is the last one.
    #[must_use]
    pub const fn on_last_attempt(&self) -> bool {
        self.attempt_index >= self.max_attempts
    }
}

// ============================================================================
// Attempt outcomes
// ============================================================================

/// What happened when an attempt was evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The learner query did not run. `error` is the executor's message.
    ExecutionFailed {
        /// Executor error, verbatim.
        error: String,
    },
    /// The learner query produced the expected result.
    Correct {
        /// The learner's result.
        result: ResultPreview,
    },
    /// The learner query ran but produced a different result.
    Incorrect {
        /// The learner's result.
        learner: ResultPreview,
        /// The reference solution's result.
        expected: ResultPreview,
    },
    /// The reference solution itself failed to run.
    ReferenceFailed {
        /// The learner's result.
        learner: ResultPreview,
        /// Executor error for the reference solution.
        error: String,
    },
}

impl AttemptOutcome {
    /// Returns `true` for [`AttemptOutcome::Correct`].
    #[must_use]
    pub const fn is_correct(&self) -> bool {
        matches!(self, Self::Correct { .. })
    }
}

/// The reference solution plus an explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revelation {
    /// The reference solution query.
    pub solution: String,
    /// Advisor or fallback explanation.
    pub explanation: Hint,
}

/// Everything the caller needs to present one evaluated attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptReport {
    /// The attempt number (1-indexed).
    pub attempt: u32,

    /// Number of attempt slots.
    pub max_attempts: u32,

    /// Evaluation result.
    pub outcome: AttemptOutcome,

    /// Closeness to the reference solution. Absent for correct attempts and
    /// when the embedding capability failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<SimilarityScore>,

    /// The exercise's own hint, offered after a wrong attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_hint: Option<String>,

    /// Progressive hint, given after a wrong attempt that ran while slots remain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<Hint>,

    /// Solution and final explanation, given when attempts run out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revelation: Option<Revelation>,

    /// `(completed, total)` for the tier, given on a correct attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<(usize, usize)>,

    /// Session status after this attempt.
    pub status: SessionStatus,
}

impl AttemptReport {
    /// Returns `true` if the learner may retry, reveal or ask for feedback.
    #[must_use]
    pub fn offers_choice(&self) -> bool {
        self.status == SessionStatus::Incorrect
    }
}

// ============================================================================
// Engine
// ============================================================================

/// The capabilities a session evaluates attempts with.
pub struct Engine {
    executor: Box<dyn QueryExecutor>,
    scorer: SimilarityScorer,
    hints: HintPolicy,
    display_rows: usize,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("scorer", &self.scorer)
            .field("hints", &self.hints)
            .field("display_rows", &self.display_rows)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Creates an engine.
    #[must_use]
    pub fn new(executor: Box<dyn QueryExecutor>, scorer: SimilarityScorer, hints: HintPolicy) -> Self {
        Self {
            executor,
            scorer,
            hints,
            display_rows: DEFAULT_DISPLAY_ROWS,
        }
    }

    /// Sets how many result rows are included in previews.
    #[must_use]
    pub const fn with_display_rows(mut self, rows: usize) -> Self {
        self.display_rows = rows;
        self
    }

    /// Returns the query executor.
    #[must_use]
    pub fn executor(&self) -> &dyn QueryExecutor {
        self.executor.as_ref()
    }

    /// Returns the hint policy.
    #[must_use]
    pub const fn hints(&self) -> &HintPolicy {
        &self.hints
    }

    /// Starts a session on an exercise.
    ///
    /// The tracker is borrowed for the whole session and is updated when the
    /// exercise is solved.
    pub fn start<'s>(
        &'s self,
        tracker: &'s mut dyn CompletionTracker,
        tier: Tier,
        exercise: Exercise,
    ) -> Session<'s> {
        info!(tier = %tier, exercise = %exercise.id, "Starting practice session");
        Session {
            engine: self,
            tracker,
            state: AttemptState::new(tier, exercise),
            status: SessionStatus::AwaitingAttempt,
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// One learner working through one exercise.
pub struct Session<'s> {
    engine: &'s Engine,
    tracker: &'s mut dyn CompletionTracker,
    state: AttemptState,
    status: SessionStatus,
}

impl std::fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl Session<'_> {
    /// Returns the current status.
    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        self.status
    }

    /// Returns the attempt bookkeeping.
    #[must_use]
    pub const fn state(&self) -> &AttemptState {
        &self.state
    }

    /// Returns the exercise being attempted.
    #[must_use]
    pub const fn exercise(&self) -> &Exercise {
        &self.state.exercise
    }

    /// Returns the current attempt slot.
    #[must_use]
    pub const fn attempt_index(&self) -> u32 {
        self.state.attempt_index
    }

    /// Returns `true` once the session has ended.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Evaluates a learner query in the current attempt slot.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::InvalidStateTransition` unless the session is
    /// awaiting an attempt. Failures of the query itself are reported in the
    /// returned [`AttemptOutcome`], not as errors.
    pub async fn submit(&mut self, query: &str) -> Result<AttemptReport> {
        self.expect_status(SessionStatus::AwaitingAttempt, "evaluating")?;

        let attempt = self.state.attempt_index;
        let exercise = &self.state.exercise;
        info!(exercise = %exercise.id, attempt, "Evaluating attempt");

        let learner = self.engine.executor.execute(query);
        let (outcome, similarity) = if learner.success {
            let reference = self.engine.executor.execute(&exercise.solution);
            self.judge(&learner, &reference, query)
        } else {
            let error = learner.error.clone().unwrap_or_default();
            (AttemptOutcome::ExecutionFailed { error }, self.score(query))
        };

        let correct = outcome.is_correct();
        self.state.history.push(AttemptRecord {
            attempt,
            query: query.to_string(),
            result: learner,
            similarity,
            correct,
            submitted_at: Utc::now(),
        });

        let mut report = AttemptReport {
            attempt,
            max_attempts: self.state.max_attempts,
            outcome,
            similarity,
            static_hint: None,
            hint: None,
            revelation: None,
            progress: None,
            status: self.status,
        };

        if correct {
            let tier = self.state.tier;
            let newly_completed = self.tracker.mark_completed(tier, &self.state.exercise.id);
            let progress = self.tracker.completion_count(tier);
            self.status = SessionStatus::Correct;
            info!(
                exercise = %self.state.exercise.id,
                attempt,
                newly_completed,
                completed = progress.0,
                total = progress.1,
                "Attempt correct"
            );
            report.progress = Some(progress);
            report.status = self.status;
            return Ok(report);
        }

        let exercise = &self.state.exercise;
        report.static_hint = exercise.static_hint().map(ToString::to_string);

        if self.state.on_last_attempt() {
            let explanation = self
                .engine
                .hints
                .feedback(exercise, query, false, similarity)
                .await;
            report.revelation = Some(Revelation {
                solution: exercise.solution.clone(),
                explanation,
            });
            self.status = SessionStatus::Exhausted;
            info!(exercise = %exercise.id, attempt, "Attempts exhausted, revealing solution");
        } else {
            if !matches!(report.outcome, AttemptOutcome::ExecutionFailed { .. }) {
                let hint = self
                    .engine
                    .hints
                    .next_hint(exercise, query, similarity, attempt)
                    .await;
                report.hint = Some(hint);
            }
            self.status = SessionStatus::Incorrect;
            info!(
                exercise = %exercise.id,
                attempt,
                similarity = similarity.map(|s| s.value()),
                "Attempt incorrect"
            );
        }

        report.status = self.status;
        Ok(report)
    }

    /// Moves to the next attempt slot after a wrong attempt.
    ///
    /// Returns the new attempt index.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::InvalidStateTransition` unless the last attempt
    /// was incorrect.
    pub fn retry(&mut self) -> Result<u32> {
        self.expect_status(SessionStatus::Incorrect, SessionStatus::AwaitingAttempt)?;
        self.state.attempt_index = (self.state.attempt_index + 1).min(self.state.max_attempts);
        self.status = SessionStatus::AwaitingAttempt;
        Ok(self.state.attempt_index)
    }

    /// Ends the session by revealing the solution with an explanation.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::InvalidStateTransition` unless the last attempt
    /// was incorrect.
    pub async fn reveal_solution(&mut self) -> Result<Revelation> {
        self.expect_status(SessionStatus::Incorrect, SessionStatus::Revealed)?;

        let explanation = self.feedback_on_last_attempt().await;
        self.status = SessionStatus::Revealed;
        info!(exercise = %self.state.exercise.id, "Solution revealed");

        Ok(Revelation {
            solution: self.state.exercise.solution.clone(),
            explanation,
        })
    }

    /// Returns detailed feedback on the last attempt. The status is unchanged.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::InvalidStateTransition` unless the last attempt
    /// was incorrect.
    pub async fn request_feedback(&self) -> Result<Hint> {
        self.expect_status(SessionStatus::Incorrect, SessionStatus::Incorrect)?;
        Ok(self.feedback_on_last_attempt().await)
    }

    /// Ends the session without solving the exercise.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::InvalidStateTransition` if the session already ended.
    pub fn abandon(&mut self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(TutorError::invalid_transition(
                self.status,
                SessionStatus::Abandoned,
            ));
        }
        self.status = SessionStatus::Abandoned;
        info!(exercise = %self.state.exercise.id, "Session abandoned");
        Ok(())
    }

    fn expect_status(&self, expected: SessionStatus, to: impl std::fmt::Display) -> Result<()> {
        if self.status == expected {
            Ok(())
        } else {
            Err(TutorError::invalid_transition(self.status, to))
        }
    }

    /// Compares a learner result with a freshly executed reference result.
    fn judge(
        &self,
        learner: &ExecutionResult,
        reference: &ExecutionResult,
        query: &str,
    ) -> (AttemptOutcome, Option<SimilarityScore>) {
        let rows = self.engine.display_rows;

        if !reference.success {
            let message = reference.error.clone().unwrap_or_default();
            error!(
                tier = %self.state.tier,
                exercise = %self.state.exercise.id,
                error = %message,
                "Reference solution failed to execute"
            );
            let outcome = AttemptOutcome::ReferenceFailed {
                learner: learner.preview(rows),
                error: message,
            };
            return (outcome, self.score(query));
        }

        if results_equivalent(learner, reference) {
            return (
                AttemptOutcome::Correct {
                    result: learner.preview(rows),
                },
                None,
            );
        }

        let outcome = AttemptOutcome::Incorrect {
            learner: learner.preview(rows),
            expected: reference.preview(rows),
        };
        (outcome, self.score(query))
    }

    fn score(&self, query: &str) -> Option<SimilarityScore> {
        match self.engine.scorer.score(query, &self.state.exercise.solution) {
            Ok(score) => Some(score),
            Err(e) => {
                warn!(exercise = %self.state.exercise.id, error = %e, "Similarity unavailable");
                None
            }
        }
    }

    async fn feedback_on_last_attempt(&self) -> Hint {
        let (query, similarity) = self
            .state
            .last_attempt()
            .map_or(("", None), |a| (a.query.as_str(), a.similarity));

        self.engine
            .hints
            .feedback(&self.state.exercise, query, false, similarity)
            .await
    }
}

// ============================================================================
// Tests
// ============================================================================
