//! Exercise synthesis through the advisor.
//!
//! This is the only place where advisor output drives program behavior. The
//! response must contain a JSON object with the exercise fields; it is
//! validated exactly like an exercise loaded from disk before it is used.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tracing::info;

use crate::advisor::Advisor;
use crate::config::AdvisorConfig;
use crate::error::{AdvisorErrorKind, Result, TutorError};
use crate::exercise::{Exercise, RawExercise, Tier};

/// Number of existing exercises quoted in the prompt.
pub const PROMPT_EXAMPLES: usize = 3;

/// Generates new exercises for a tier with the advisor.
#[derive(Clone)]
pub struct ExerciseSynthesizer {
    advisor: Arc<dyn Advisor>,
    max_tokens: u32,
    timeout: Duration,
}

impl std::fmt::Debug for ExerciseSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExerciseSynthesizer")
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ExerciseSynthesizer {
    /// Creates a synthesizer using the advisor settings from configuration.
    #[must_use]
    pub fn new(advisor: Arc<dyn Advisor>, config: &AdvisorConfig) -> Self {
        Self {
            advisor,
            max_tokens: config.synthesis_max_tokens,
            timeout: Duration::from_secs(config.timeout_seconds.into()),
        }
    }

    /// Asks the advisor for a new exercise and validates the answer.
    ///
    /// # Errors
    ///
    /// Returns the advisor's error, `AdvisorApiError` with kind `Timeout`, or
    /// `SynthesisParseError` when the response is not a usable exercise.
    pub async fn synthesize(
        &self,
        tier: Tier,
        tables: &[String],
        examples: &[Exercise],
        id: String,
    ) -> Result<Exercise> {
        let prompt = synthesis_prompt(tier, tables, examples);

        let response = tokio::time::timeout(self.timeout, self.advisor.complete(&prompt, self.max_tokens))
            .await
            .map_err(|_| {
                TutorError::advisor_api_error(
                    AdvisorErrorKind::Timeout,
                    format!("no response within {}s", self.timeout.as_secs()),
                )
            })??;

        let exercise = parse_exercise(&response, tier, id)?;
        info!(tier = %tier, id = %exercise.id, "Generated new exercise");
        Ok(exercise)
    }
}

/// Builds the synthesis prompt.
#[must_use]
pub fn synthesis_prompt(tier: Tier, tables: &[String], examples: &[Exercise]) -> String {
    let examples_text = examples
        .iter()
        .take(PROMPT_EXAMPLES)
        .map(|ex| {
            format!(
                "- Question: {}\n  Solution: {}\n  Concepts: {}",
                ex.question,
                ex.solution,
                ex.concepts_text()
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are writing a new SQL practice exercise for a {tier} learner.

Tables in the practice database: {tables}

Existing {tier} exercises:
{examples_text}

Write one new exercise that:
1. Uses only the tables listed above
2. Matches the difficulty of the existing exercises
3. Covers different ground than the existing exercises
4. Asks a clear, specific question
5. Comes with a correct SQL solution
6. Names 2 to 4 SQL concepts it practices

Answer with a single JSON object in exactly this shape and nothing else:
{{
  "question": "...",
  "solution": "SELECT ...",
  "concepts": ["...", "..."],
  "hint": "..."
}}"#,
        tables = tables.join(", "),
    )
}

/// Extracts and validates an exercise from advisor output.
///
/// The first `{` through the last `}` is treated as the JSON object, so prose
/// or code fences around it are tolerated. The supplied `id` replaces any id
/// in the response.
pub fn parse_exercise(response: &str, tier: Tier, id: String) -> Result<Exercise> {
    let Ok(re) = Regex::new(r"(?s)\{.*\}") else {
        return Err(TutorError::synthesis_parse("invalid JSON object pattern"));
    };

    let json = re
        .find(response)
        .ok_or_else(|| TutorError::synthesis_parse("response contains no JSON object"))?
        .as_str();

    let mut raw: RawExercise =
        serde_json::from_str(json).map_err(|e| TutorError::synthesis_parse(e.to_string()))?;
    raw.id = Some(id);

    raw.validate(tier, 1)
        .map_err(|e| TutorError::synthesis_parse(e.to_string()))
}
