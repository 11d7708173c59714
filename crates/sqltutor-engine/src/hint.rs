//! Progressive hint policy.
//!
//! Maps a similarity score to a hint tier and produces guidance text. When an
//! advisor is configured the policy asks it for a tailored hint; otherwise, or
//! when the advisor fails, times out or returns nothing, it falls back to a
//! fixed sentence for the tier. The policy never returns an error.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::advisor::Advisor;
use crate::config::AdvisorConfig;
use crate::exercise::Exercise;
use crate::similarity::SimilarityScore;

/// How close an incorrect attempt is to the reference solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HintTier {
    /// Score above 0.8.
    NearMiss,
    /// Score above 0.6, up to and including 0.8.
    OnTrack,
    /// Score above 0.4, up to and including 0.6.
    Partial,
    /// Score of 0.4 or below, or no score at all.
    OffTrack,
}

impl HintTier {
    /// Selects the tier for a score.
    ///
    /// Negative scores are clamped to zero first. A missing score selects
    /// [`HintTier::OffTrack`].
    #[must_use]
    pub fn from_score(score: Option<SimilarityScore>) -> Self {
        let value = score.map_or(0.0, |s| s.clamped());
        if value > 0.8 {
            Self::NearMiss
        } else if value > 0.6 {
            Self::OnTrack
        } else if value > 0.4 {
            Self::Partial
        } else {
            Self::OffTrack
        }
    }

    /// Deterministic guidance used when no advisor text is available.
    #[must_use]
    pub fn fallback(&self, exercise: &Exercise) -> String {
        match self {
            Self::NearMiss => "You're very close! Check your column names or table joins.".to_string(),
            Self::OnTrack => {
                "You're on the right track. Review the required columns and conditions.".to_string()
            }
            Self::Partial => {
                "You have some correct elements. Check the SQL clauses you're using.".to_string()
            }
            Self::OffTrack => format!(
                "Try a different approach. Remember the concepts: {}",
                exercise.concepts_text()
            ),
        }
    }
}

impl std::fmt::Display for HintTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NearMiss => write!(f, "near-miss"),
            Self::OnTrack => write!(f, "on-track"),
            Self::Partial => write!(f, "partial"),
            Self::OffTrack => write!(f, "off-track"),
        }
    }
}

/// Where a piece of guidance text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintSource {
    /// Produced by the advisor.
    Advisor,
    /// Deterministic fallback text.
    Fallback,
}

/// Guidance for the learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hint {
    /// Tier the score fell into.
    pub tier: HintTier,
    /// Text shown to the learner.
    pub text: String,
    /// Origin of the text.
    pub source: HintSource,
}

impl Hint {
    fn fallback(tier: HintTier, text: String) -> Self {
        Self {
            tier,
            text,
            source: HintSource::Fallback,
        }
    }

    fn advised(tier: HintTier, text: String) -> Self {
        Self {
            tier,
            text,
            source: HintSource::Advisor,
        }
    }
}

/// Produces hints and feedback, with or without an advisor.
#[derive(Clone)]
pub struct HintPolicy {
    advisor: Option<Arc<dyn Advisor>>,
    timeout: Duration,
    hint_max_tokens: u32,
    feedback_max_tokens: u32,
}

impl std::fmt::Debug for HintPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HintPolicy")
            .field("advisor", &self.advisor.is_some())
            .field("timeout", &self.timeout)
            .field("hint_max_tokens", &self.hint_max_tokens)
            .field("feedback_max_tokens", &self.feedback_max_tokens)
            .finish()
    }
}

impl Default for HintPolicy {
    fn default() -> Self {
        Self::new(None, &AdvisorConfig::default())
    }
}

impl HintPolicy {
    /// Creates a policy. Pass `None` to always use fallback text.
    #[must_use]
    pub fn new(advisor: Option<Arc<dyn Advisor>>, config: &AdvisorConfig) -> Self {
        Self {
            advisor,
            timeout: Duration::from_secs(config.timeout_seconds.into()),
            hint_max_tokens: config.hint_max_tokens,
            feedback_max_tokens: config.feedback_max_tokens,
        }
    }

    /// Overrides the advisor call timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns `true` if an advisor is configured.
    #[must_use]
    pub const fn has_advisor(&self) -> bool {
        self.advisor.is_some()
    }

    /// Returns the guidance for an incorrect attempt.
    pub async fn next_hint(
        &self,
        exercise: &Exercise,
        attempt_query: &str,
        score: Option<SimilarityScore>,
        attempt_index: u32,
    ) -> Hint {
        let tier = HintTier::from_score(score);
        let prompt = hint_prompt(exercise, attempt_query, score, attempt_index, tier);

        match self.ask(&prompt, self.hint_max_tokens, &exercise.id).await {
            Some(text) => Hint::advised(tier, text),
            None => Hint::fallback(tier, tier.fallback(exercise)),
        }
    }

    /// Returns detailed feedback on an attempt.
    ///
    /// Used when the learner asks for help, when the solution is revealed and
    /// when attempts run out.
    pub async fn feedback(
        &self,
        exercise: &Exercise,
        attempt_query: &str,
        correct: bool,
        score: Option<SimilarityScore>,
    ) -> Hint {
        let tier = HintTier::from_score(score);
        let prompt = feedback_prompt(exercise, attempt_query, correct);

        match self.ask(&prompt, self.feedback_max_tokens, &exercise.id).await {
            Some(text) => Hint::advised(tier, text),
            None => Hint::fallback(tier, fallback_feedback(exercise, correct, tier)),
        }
    }

    /// Calls the advisor, bounded by the timeout. `None` means "use the fallback".
    async fn ask(&self, prompt: &str, max_tokens: u32, exercise_id: &str) -> Option<String> {
        let advisor = self.advisor.as_ref()?;

        debug!(exercise = exercise_id, max_tokens, "Requesting advisor guidance");

        match tokio::time::timeout(self.timeout, advisor.complete(prompt, max_tokens)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => Some(text),
            Ok(Ok(_)) => {
                warn!(exercise = exercise_id, "Advisor returned an empty response, using fallback");
                None
            }
            Ok(Err(e)) if e.is_capability_failure() => {
                warn!(
                    exercise = exercise_id,
                    error = %e,
                    transient = e.is_transient(),
                    "Advisor failed, using fallback"
                );
                None
            }
            Ok(Err(e)) => {
                error!(exercise = exercise_id, error = %e, "Unexpected advisor error, using fallback");
                None
            }
            Err(_) => {
                warn!(
                    exercise = exercise_id,
                    timeout_secs = self.timeout.as_secs(),
                    "Advisor timed out, using fallback"
                );
                None
            }
        }
    }
}

fn format_score(score: Option<SimilarityScore>) -> String {
    score.map_or_else(|| "unavailable".to_string(), |s| format!("{:.2}", s.value()))
}

/// Builds the advisor prompt for a progressive hint.
#[must_use]
pub fn hint_prompt(
    exercise: &Exercise,
    attempt_query: &str,
    score: Option<SimilarityScore>,
    attempt_index: u32,
    tier: HintTier,
) -> String {
    format!(
        "You are a SQL tutor. A learner has not solved this exercise yet.

Question: {question}
Concepts: {concepts}
Reference solution: {solution}
Learner query: {query}
Similarity to the reference: {score} (0 = unrelated, 1 = identical)
Attempt: {attempt_index}
Closeness tier: {tier}

How to pitch the hint for each tier:
- near-miss (above 0.80): name the one small difference, such as a column or condition.
- on-track (0.60 to 0.80): the structure is right; say what is missing or wrong.
- partial (0.40 to 0.60): some parts are right; point at the clause that needs work.
- off-track (0.40 or below): suggest which concepts to revisit.

Reply with an encouraging hint of at most three sentences. Do not reveal the solution.",
        question = exercise.question,
        concepts = exercise.concepts_text(),
        solution = exercise.solution,
        query = attempt_query.trim(),
        score = format_score(score),
    )
}

/// Builds the advisor prompt for detailed feedback.
#[must_use]
pub fn feedback_prompt(exercise: &Exercise, attempt_query: &str, correct: bool) -> String {
    format!(
        "You are a SQL tutor reviewing a learner's attempt.

Question: {question}
Reference solution: {solution}
Learner query: {query}
Outcome: {outcome}

Write short, encouraging feedback of at most three paragraphs.
If the attempt is correct, say which concepts it used well.
If it is incorrect, explain what went wrong without handing over the full answer.
Mention optimizations or alternative approaches when they are relevant.",
        question = exercise.question,
        solution = exercise.solution,
        query = attempt_query.trim(),
        outcome = if correct { "correct" } else { "incorrect" },
    )
}

fn fallback_feedback(exercise: &Exercise, correct: bool, tier: HintTier) -> String {
    if correct {
        format!(
            "Well done. This exercise practiced: {}.",
            exercise.concepts_text()
        )
    } else if tier == HintTier::OffTrack {
        // The off-track text already names the concepts.
        format!("{}.", tier.fallback(exercise))
    } else {
        format!(
            "{} Concepts to review: {}.",
            tier.fallback(exercise),
            exercise.concepts_text()
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::{AdvisorErrorKind, Result, TutorError};

    fn exercise() -> Exercise {
        Exercise {
            id: "b1".to_string(),
            question: "List all user ids.".to_string(),
            solution: "SELECT id FROM users;".to_string(),
            concepts: vec!["SELECT".to_string(), "FROM".to_string()],
            hint: Some("Start with SELECT.".to_string()),
        }
    }

    struct ScriptedAdvisor {
        reply: Option<String>,
        calls: AtomicUsize,
    }

    impl ScriptedAdvisor {
        fn replying(text: &str) -> Self {
            Self {
                reply: Some(text.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        const fn failing() -> Self {
            Self {
                reply: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Advisor for ScriptedAdvisor {
        async fn complete(&self, _prompt: &str, _max_tokens: u32) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone().ok_or_else(|| {
                TutorError::advisor_api_error(AdvisorErrorKind::Server, "HTTP 529: overloaded")
            })
        }
    }

    struct SlowAdvisor;

    #[async_trait]
    impl Advisor for SlowAdvisor {
        async fn complete(&self, _prompt: &str, _max_tokens: u32) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("too late".to_string())
        }
    }

    struct BrokenAdvisor;

    #[async_trait]
    impl Advisor for BrokenAdvisor {
        async fn complete(&self, _prompt: &str, _max_tokens: u32) -> Result<String> {
            Err(TutorError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "pipe closed",
            )))
        }
    }

    fn policy_with(advisor: Arc<dyn Advisor>) -> HintPolicy {
        HintPolicy::new(Some(advisor), &AdvisorConfig::default())
    }

    fn score(value: f64) -> Option<SimilarityScore> {
        Some(SimilarityScore::new(value))
    }

    #[test]
    fn test_tier_boundaries_exact() {
        assert_eq!(HintTier::from_score(score(0.81)), HintTier::NearMiss);
        assert_eq!(HintTier::from_score(score(0.8)), HintTier::OnTrack);
        assert_eq!(HintTier::from_score(score(0.61)), HintTier::OnTrack);
        assert_eq!(HintTier::from_score(score(0.6)), HintTier::Partial);
        assert_eq!(HintTier::from_score(score(0.41)), HintTier::Partial);
        assert_eq!(HintTier::from_score(score(0.4)), HintTier::OffTrack);
        assert_eq!(HintTier::from_score(score(0.0)), HintTier::OffTrack);
    }

    #[test]
    fn test_tier_degenerate_scores() {
        assert_eq!(HintTier::from_score(None), HintTier::OffTrack);
        assert_eq!(HintTier::from_score(score(-0.7)), HintTier::OffTrack);
        assert_eq!(HintTier::from_score(score(f64::NAN)), HintTier::OffTrack);
        assert_eq!(HintTier::from_score(score(1.0)), HintTier::NearMiss);
    }

    #[test]
    fn test_off_track_fallback_lists_concepts() {
        let text = HintTier::OffTrack.fallback(&exercise());
        assert_eq!(
            text,
            "Try a different approach. Remember the concepts: SELECT, FROM"
        );
    }

    #[tokio::test]
    async fn test_no_advisor_uses_fallback() {
        let hint = HintPolicy::default()
            .next_hint(&exercise(), "SELECT name FROM users;", score(0.9), 1)
            .await;

        assert_eq!(hint.tier, HintTier::NearMiss);
        assert_eq!(hint.source, HintSource::Fallback);
        assert_eq!(
            hint.text,
            "You're very close! Check your column names or table joins."
        );
    }

    #[tokio::test]
    async fn test_advisor_text_returned_verbatim() {
        let advisor = Arc::new(ScriptedAdvisor::replying("  Look at the column list.\n"));
        let policy = policy_with(advisor.clone());

        let hint = policy
            .next_hint(&exercise(), "SELECT name FROM users;", score(0.5), 2)
            .await;

        assert_eq!(hint.source, HintSource::Advisor);
        assert_eq!(hint.tier, HintTier::Partial);
        assert_eq!(hint.text, "  Look at the column list.\n");
        assert_eq!(advisor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_advisor_degrades_to_fallback() {
        let policy = policy_with(Arc::new(ScriptedAdvisor::failing()));

        let hint = policy
            .next_hint(&exercise(), "SELECT name FROM users;", score(0.7), 1)
            .await;

        assert_eq!(hint.source, HintSource::Fallback);
        assert_eq!(hint.tier, HintTier::OnTrack);
        assert_eq!(
            hint.text,
            "You're on the right track. Review the required columns and conditions."
        );
    }

    #[tokio::test]
    async fn test_empty_advisor_response_degrades_to_fallback() {
        let policy = policy_with(Arc::new(ScriptedAdvisor::replying("   ")));

        let hint = policy.next_hint(&exercise(), "x", score(0.1), 1).await;

        assert_eq!(hint.source, HintSource::Fallback);
        assert_eq!(hint.tier, HintTier::OffTrack);
    }

    #[tokio::test]
    async fn test_unexpected_advisor_error_degrades_to_fallback() {
        let policy = policy_with(Arc::new(BrokenAdvisor));
        assert!(policy.has_advisor());

        let hint = policy.next_hint(&exercise(), "x", score(0.9), 1).await;

        assert_eq!(hint.source, HintSource::Fallback);
        assert_eq!(hint.tier, HintTier::NearMiss);
    }

    #[test]
    fn test_default_policy_has_no_advisor() {
        assert!(!HintPolicy::default().has_advisor());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_advisor_times_out() {
        let policy = policy_with(Arc::new(SlowAdvisor)).with_timeout(Duration::from_secs(1));

        let hint = policy.next_hint(&exercise(), "x", score(0.5), 1).await;

        assert_eq!(hint.source, HintSource::Fallback);
        assert_eq!(
            hint.text,
            "You have some correct elements. Check the SQL clauses you're using."
        );
    }

    #[tokio::test]
    async fn test_feedback_fallbacks() {
        let policy = HintPolicy::default();

        let correct = policy.feedback(&exercise(), "SELECT id FROM users;", true, None).await;
        assert_eq!(correct.source, HintSource::Fallback);
        assert_eq!(correct.text, "Well done. This exercise practiced: SELECT, FROM.");

        let wrong = policy
            .feedback(&exercise(), "SELECT name FROM users;", false, score(0.85))
            .await;
        assert_eq!(
            wrong.text,
            "You're very close! Check your column names or table joins. Concepts to review: SELECT, FROM."
        );

        let off_track = policy
            .feedback(&exercise(), "DELETE FROM orders;", false, score(0.1))
            .await;
        assert_eq!(
            off_track.text,
            "Try a different approach. Remember the concepts: SELECT, FROM."
        );
    }

    #[tokio::test]
    async fn test_feedback_uses_advisor() {
        let policy = policy_with(Arc::new(ScriptedAdvisor::replying("Nice use of SELECT.")));
        let feedback = policy.feedback(&exercise(), "SELECT id FROM users;", true, None).await;
        assert_eq!(feedback.source, HintSource::Advisor);
        assert_eq!(feedback.text, "Nice use of SELECT.");
    }

    #[test]
    fn test_hint_prompt() {
        let prompt = hint_prompt(
            &exercise(),
            "  SELECT name FROM users; ",
            score(0.734),
            2,
            HintTier::OnTrack,
        );
        insta::assert_snapshot!(prompt, @r###"
        You are a SQL tutor. A learner has not solved this exercise yet.

        Question: List all user ids.
        Concepts: SELECT, FROM
        Reference solution: SELECT id FROM users;
        Learner query: SELECT name FROM users;
        Similarity to the reference: 0.73 (0 = unrelated, 1 = identical)
        Attempt: 2
        Closeness tier: on-track

        How to pitch the hint for each tier:
        - near-miss (above 0.80): name the one small difference, such as a column or condition.
        - on-track (0.60 to 0.80): the structure is right; say what is missing or wrong.
        - partial (0.40 to 0.60): some parts are right; point at the clause that needs work.
        - off-track (0.40 or below): suggest which concepts to revisit.

        Reply with an encouraging hint of at most three sentences. Do not reveal the solution.
        "###);
    }

    #[test]
    fn test_hint_prompt_without_score() {
        let prompt = hint_prompt(&exercise(), "SELCT", None, 1, HintTier::OffTrack);
        assert!(prompt.contains("Similarity to the reference: unavailable"));
    }

    #[test]
    fn test_feedback_prompt() {
        let prompt = feedback_prompt(&exercise(), "SELECT name FROM users;", false);
        insta::assert_snapshot!(prompt, @r###"
        You are a SQL tutor reviewing a learner's attempt.

        Question: List all user ids.
        Reference solution: SELECT id FROM users;
        Learner query: SELECT name FROM users;
        Outcome: incorrect

        Write short, encouraging feedback of at most three paragraphs.
        If the attempt is correct, say which concepts it used well.
        If it is incorrect, explain what went wrong without handing over the full answer.
        Mention optimizations or alternative approaches when they are relevant.
        "###);
    }
}
