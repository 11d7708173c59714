//! End-to-end practice session tests
//!
//! These tests drive the engine the way the CLI does: pick an exercise from
//! the selector, run a session against an in-memory SQLite dataset, and check
//! the reports and status transitions. The advisor is replaced by scripted
//! fakes so no network access is needed.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqltutor_engine::{
    Advisor, AdvisorConfig, AdvisorErrorKind, AttemptOutcome, CompletionTracker, EmbeddingProvider,
    Engine, ExerciseBank, ExerciseSelector, ExerciseSynthesizer, HintPolicy, HintSource, HintTier,
    QueryExecutor, SessionStatus, SimilarityScorer, SqliteExecutor, Tier, TutorError,
    MAX_ATTEMPTS,
};

/// Path to the integration fixtures directory.
fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

fn executor() -> SqliteExecutor {
    let script = std::fs::read_to_string(fixtures_dir().join("schema.sql"))
        .expect("Failed to read schema fixture");
    SqliteExecutor::from_script(&script).expect("Failed to build fixture database")
}

fn selector() -> ExerciseSelector {
    let bank =
        ExerciseBank::load(fixtures_dir().join("queries.json")).expect("Failed to load bank");
    ExerciseSelector::new(bank)
}

fn engine_with(hints: HintPolicy) -> Engine {
    Engine::new(Box::new(executor()), SimilarityScorer::default(), hints)
}

fn engine() -> Engine {
    engine_with(HintPolicy::default())
}

fn exercise(selector: &ExerciseSelector, id: &str) -> sqltutor_engine::Exercise {
    selector
        .bank()
        .get(Tier::Beginner, id)
        .cloned()
        .expect("Exercise missing from fixture bank")
}

/// Advisor that replays canned replies and records every prompt.
#[derive(Default)]
struct ScriptedAdvisor {
    replies: Mutex<Vec<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedAdvisor {
    fn with_replies(replies: &[&str]) -> Self {
        let mut replies: Vec<String> = replies.iter().map(ToString::to_string).collect();
        replies.reverse();
        Self {
            replies: Mutex::new(replies),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompt lock poisoned").clone()
    }
}

#[async_trait]
impl Advisor for ScriptedAdvisor {
    async fn complete(&self, prompt: &str, _max_tokens: u32) -> sqltutor_engine::Result<String> {
        self.prompts
            .lock()
            .expect("prompt lock poisoned")
            .push(prompt.to_string());
        self.replies
            .lock()
            .expect("reply lock poisoned")
            .pop()
            .ok_or_else(|| TutorError::advisor_api_error(AdvisorErrorKind::Other, "no reply left"))
    }
}

/// Embedder that maps every text to its own axis, so distinct queries never
/// look alike.
struct OrthogonalEmbedder;

impl EmbeddingProvider for OrthogonalEmbedder {
    fn embed(&self, texts: &[&str]) -> sqltutor_engine::Result<Vec<Vec<f32>>> {
        Ok((0..texts.len())
            .map(|i| {
                let mut v = vec![0.0; texts.len()];
                v[i] = 1.0;
                v
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        2
    }
}

/// Advisor that always fails the way an overloaded API would.
struct UnavailableAdvisor;

#[async_trait]
impl Advisor for UnavailableAdvisor {
    async fn complete(&self, _prompt: &str, _max_tokens: u32) -> sqltutor_engine::Result<String> {
        Err(TutorError::advisor_api_error(
            AdvisorErrorKind::RateLimit,
            "HTTP 429: rate limited",
        ))
    }
}

// ============================================================================
// Core scenarios
// ============================================================================

/// A semantically equivalent query is accepted on the first attempt.
#[tokio::test]
async fn test_equivalent_query_is_correct_on_first_attempt() {
    let engine = engine();
    let mut selector = selector();
    let b1 = exercise(&selector, "b1");
    let mut session = engine.start(&mut selector, Tier::Beginner, b1);

    let report = session
        .submit("SELECT id FROM users WHERE 1=1;")
        .await
        .expect("submit failed");

    assert_eq!(report.attempt, 1);
    assert_eq!(report.status, SessionStatus::Correct);
    match &report.outcome {
        AttemptOutcome::Correct { result } => {
            assert_eq!(result.columns, vec!["id"]);
            assert_eq!(result.rows.len(), 3);
            assert!(!result.is_truncated());
        }
        other => panic!("Expected Correct outcome, got: {other:?}"),
    }
    assert_eq!(report.progress, Some((1, 2)));
    assert!(session.is_finished());
}

/// A query with a typo fails to execute, is still scored, consumes a slot and
/// leaves retry available.
#[tokio::test]
async fn test_typo_is_scored_and_retry_offered() {
    let engine = engine();
    let mut selector = selector();
    let b1 = exercise(&selector, "b1");
    let mut session = engine.start(&mut selector, Tier::Beginner, b1);

    let report = session
        .submit("SELCT id FROM users;")
        .await
        .expect("submit failed");

    match &report.outcome {
        AttemptOutcome::ExecutionFailed { error } => {
            assert!(error.contains("SELCT"), "error should be verbatim: {error}");
        }
        other => panic!("Expected ExecutionFailed outcome, got: {other:?}"),
    }

    let score = report.similarity.expect("typo should still be scored");
    assert!(score.value() > 0.0 && score.value() < 1.0);
    assert_eq!(report.attempt, 1);
    assert!(report.attempt < MAX_ATTEMPTS);
    assert!(report.offers_choice());
    assert_eq!(
        report.static_hint.as_deref(),
        Some("You only need the id column.")
    );

    assert_eq!(session.retry().expect("retry failed"), 2);
    assert_eq!(session.status(), SessionStatus::AwaitingAttempt);
    assert_eq!(session.state().history.len(), 1);
}

/// Three executable but wrong attempts force-reveal the solution and end the
/// session without a fourth attempt.
#[tokio::test]
async fn test_three_wrong_attempts_reveal_solution() {
    let engine = engine();
    let mut selector = selector();
    let b1 = exercise(&selector, "b1");
    let mut session = engine.start(&mut selector, Tier::Beginner, b1);

    let attempts = [
        "SELECT name FROM users;",
        "SELECT id FROM users WHERE id > 1;",
        "SELECT id, name FROM users;",
    ];

    let mut last = None;
    for (i, query) in attempts.iter().enumerate() {
        let report = session.submit(query).await.expect("submit failed");
        assert!(matches!(report.outcome, AttemptOutcome::Incorrect { .. }));

        if i + 1 < attempts.len() {
            assert_eq!(report.status, SessionStatus::Incorrect);
            assert!(report.hint.is_some(), "hint expected before the last attempt");
            assert!(report.revelation.is_none());
            session.retry().expect("retry failed");
        }
        last = Some(report);
    }

    let last = last.expect("no attempts ran");
    assert_eq!(last.attempt, MAX_ATTEMPTS);
    assert_eq!(last.status, SessionStatus::Exhausted);
    assert!(last.hint.is_none());
    assert!(!last.offers_choice());

    let json = serde_json::to_value(&last).expect("report should serialize");
    assert_eq!(json["status"], "exhausted");
    assert_eq!(json["outcome"]["kind"], "incorrect");
    assert!(json.get("hint").is_none());

    let revelation = last.revelation.expect("solution should be revealed");
    assert_eq!(revelation.solution, "SELECT id FROM users;");
    assert_eq!(revelation.explanation.source, HintSource::Fallback);

    assert!(session.is_finished());
    assert!(session.retry().is_err());
    assert!(session.submit("SELECT id FROM users;").await.is_err());
    assert_eq!(session.state().history.len(), 3);
}

/// Marking the same exercise completed twice only counts once.
#[tokio::test]
async fn test_completion_is_idempotent_across_sessions() {
    let engine = engine();
    let mut selector = selector();

    for _ in 0..2 {
        let b1 = exercise(&selector, "b1");
        let mut session = engine.start(&mut selector, Tier::Beginner, b1);
        let report = session
            .submit("SELECT id FROM users;")
            .await
            .expect("submit failed");
        assert_eq!(report.status, SessionStatus::Correct);
        assert_eq!(report.progress, Some((1, 2)));
    }

    assert_eq!(selector.completion_count(Tier::Beginner), (1, 2));
    assert_eq!(selector.completion_count(Tier::Intermediate), (0, 1));
}

/// Rows may come back in any order, but columns must match positionally.
#[tokio::test]
async fn test_row_order_ignored_column_order_enforced() {
    let engine = engine();
    let mut selector = selector();
    let b2 = exercise(&selector, "b2");
    let mut session = engine.start(&mut selector, Tier::Beginner, b2);

    let report = session
        .submit("SELECT name, city FROM users WHERE city = 'London';")
        .await
        .expect("submit failed");
    assert_eq!(report.status, SessionStatus::Incorrect);
    session.retry().expect("retry failed");

    let report = session
        .submit("select name from users where city = 'London' order by name desc;")
        .await
        .expect("submit failed");
    assert_eq!(report.status, SessionStatus::Correct);
    assert_eq!(report.attempt, 2);
}

// ============================================================================
// Advisor behavior
// ============================================================================

/// With an advisor configured, hints carry its text verbatim and the prompt
/// contains the exercise context.
#[tokio::test]
async fn test_advisor_hint_is_verbatim() {
    let advisor = Arc::new(ScriptedAdvisor::with_replies(&[
        "Only the id column is needed here.",
    ]));
    let hints = HintPolicy::new(Some(advisor.clone()), &AdvisorConfig::default());
    let engine = engine_with(hints);
    let mut selector = selector();
    let b1 = exercise(&selector, "b1");
    let mut session = engine.start(&mut selector, Tier::Beginner, b1);

    let report = session
        .submit("SELECT name FROM users;")
        .await
        .expect("submit failed");

    let hint = report.hint.expect("hint expected");
    assert_eq!(hint.source, HintSource::Advisor);
    assert_eq!(hint.text, "Only the id column is needed here.");

    let prompts = advisor.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Question: List every user id."));
    assert!(prompts[0].contains("Reference solution: SELECT id FROM users;"));
    assert!(prompts[0].contains("Learner query: SELECT name FROM users;"));
    assert!(prompts[0].contains("Attempt: 1"));
}

/// A failing advisor never breaks the session; hints and the final
/// explanation fall back to deterministic text.
#[tokio::test]
async fn test_failing_advisor_falls_back() {
    let hints = HintPolicy::new(Some(Arc::new(UnavailableAdvisor)), &AdvisorConfig::default());
    let engine = engine_with(hints);
    let mut selector = selector();
    let b1 = exercise(&selector, "b1");
    let mut session = engine.start(&mut selector, Tier::Beginner, b1);

    let report = session
        .submit("SELECT name FROM users;")
        .await
        .expect("submit failed");
    let hint = report.hint.expect("hint expected");
    assert_eq!(hint.source, HintSource::Fallback);
    assert_eq!(hint.text, hint.tier.fallback(session.exercise()));

    let feedback = session.request_feedback().await.expect("feedback failed");
    assert_eq!(feedback.source, HintSource::Fallback);
    assert!(feedback.text.contains("SELECT, FROM"));

    let revelation = session.reveal_solution().await.expect("reveal failed");
    assert_eq!(revelation.explanation.source, HintSource::Fallback);
    assert_eq!(session.status(), SessionStatus::Revealed);
}

/// Without an advisor, an unrelated query falls into the off-track tier and
/// the fallback names the exercise concepts.
#[tokio::test]
async fn test_off_track_fallback_names_concepts() {
    let engine = Engine::new(
        Box::new(executor()),
        SimilarityScorer::new(Arc::new(OrthogonalEmbedder)),
        HintPolicy::default(),
    );
    let mut selector = selector();
    let b2 = exercise(&selector, "b2");
    let mut session = engine.start(&mut selector, Tier::Beginner, b2);

    let report = session.submit("SELECT 42;").await.expect("submit failed");

    let score = report.similarity.expect("score expected");
    assert_eq!(score.value(), 0.0);

    let hint = report.hint.expect("hint expected");
    assert_eq!(hint.tier, HintTier::OffTrack);
    assert_eq!(hint.source, HintSource::Fallback);
    assert_eq!(
        hint.text,
        "Try a different approach. Remember the concepts: SELECT, WHERE"
    );

    let feedback = session.request_feedback().await.expect("feedback failed");
    assert_eq!(
        feedback.text,
        "Try a different approach. Remember the concepts: SELECT, WHERE."
    );
}

/// Statements that modify the dataset are rejected, so the reference
/// solution keeps seeing the original rows and later wrong answers stay wrong.
#[tokio::test]
async fn test_modifying_attempt_leaves_dataset_intact() {
    let engine = engine();
    let mut selector = selector();
    let b1 = exercise(&selector, "b1");
    let mut session = engine.start(&mut selector, Tier::Beginner, b1);

    let report = session
        .submit("DELETE FROM users;")
        .await
        .expect("submit failed");
    match &report.outcome {
        AttemptOutcome::ExecutionFailed { error } => {
            assert!(error.contains("read-only"), "unexpected error: {error}");
        }
        other => panic!("Expected ExecutionFailed outcome, got: {other:?}"),
    }
    assert_eq!(report.status, SessionStatus::Incorrect);
    session.retry().expect("retry failed");

    let report = session
        .submit("SELECT id FROM users WHERE id > 100;")
        .await
        .expect("submit failed");
    assert_eq!(report.status, SessionStatus::Incorrect);
    match &report.outcome {
        AttemptOutcome::Incorrect { learner, expected } => {
            assert!(learner.rows.is_empty());
            assert_eq!(expected.rows.len(), 3);
        }
        other => panic!("Expected Incorrect outcome, got: {other:?}"),
    }
    drop(session);

    let remaining = engine.executor().execute("SELECT id FROM users;");
    assert_eq!(remaining.row_count(), 3);
}

// ============================================================================
// Selection and synthesis
// ============================================================================

/// Once a tier is exhausted, the selector asks the advisor for a new exercise
/// and the generated exercise can be solved like any other.
#[tokio::test]
async fn test_generated_exercise_after_tier_exhausted() {
    let advisor = Arc::new(ScriptedAdvisor::with_replies(&[
        r#"Sure! {"question": "How many users are there?", "solution": "SELECT COUNT(*) FROM users;", "concepts": ["COUNT"]}"#,
    ]));
    let engine = engine();
    let mut selector = selector()
        .with_synthesizer(ExerciseSynthesizer::new(advisor.clone(), &AdvisorConfig::default()));

    assert!(selector.mark_completed(Tier::Beginner, "b1"));
    assert!(selector.mark_completed(Tier::Beginner, "b2"));

    let tables = engine.executor().table_names();
    let generated = selector
        .next_exercise(Tier::Beginner, &tables)
        .await
        .expect("an exercise should be generated");
    assert_eq!(generated.id, "bgen1");
    assert!(advisor.prompts()[0].contains("Tables in the practice database: users"));

    let mut session = engine.start(&mut selector, Tier::Beginner, generated);
    let report = session
        .submit("SELECT COUNT(*) FROM users WHERE id > 0;")
        .await
        .expect("submit failed");
    assert_eq!(report.status, SessionStatus::Correct);
    assert_eq!(report.progress, Some((3, 3)));
}

/// An unknown level name is the one fatal condition.
#[test]
fn test_invalid_level_is_fatal() {
    let err = "expert".parse::<Tier>().expect_err("expert is not a level");
    assert!(matches!(err, TutorError::InvalidTier { .. }));
    assert!(err.is_fatal());
}
