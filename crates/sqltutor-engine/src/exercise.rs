//! Exercise records and exercise bank loading.
//!
//! Exercises are loaded from a JSON file keyed by difficulty tier. Each record
//! is validated when the bank is loaded so that a missing field surfaces as a
//! descriptive error up front instead of deep inside hint generation.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TutorError};

/// Difficulty bucket for exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Single-table selects, filters and sorting.
    Beginner,
    /// Joins, grouping and aggregates.
    Intermediate,
    /// Subqueries, window functions and multi-step logic.
    Advanced,
}

impl Tier {
    /// All tiers in ascending difficulty.
    pub const ALL: [Self; 3] = [Self::Beginner, Self::Intermediate, Self::Advanced];

    /// Returns the lowercase tier name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }

    /// Returns the first letter of the tier name, used for generated ids.
    #[must_use]
    pub const fn initial(&self) -> char {
        match self {
            Self::Beginner => 'b',
            Self::Intermediate => 'i',
            Self::Advanced => 'a',
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = TutorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "beginner" => Ok(Self::Beginner),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            _ => Err(TutorError::invalid_tier(s)),
        }
    }
}

/// A single query-writing exercise.
///
/// Immutable once issued to a session; identity is `id` within its tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exercise {
    /// Identifier, unique within a tier.
    pub id: String,

    /// The question shown to the learner.
    pub question: String,

    /// Reference solution query.
    pub solution: String,

    /// SQL concepts the exercise exercises, in display order.
    pub concepts: Vec<String>,

    /// Optional static hint authored with the exercise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl Exercise {
    /// Returns the concepts joined for display and prompts.
    #[must_use]
    pub fn concepts_text(&self) -> String {
        self.concepts.join(", ")
    }

    /// Returns the static hint if one is present and non-blank.
    #[must_use]
    pub fn static_hint(&self) -> Option<&str> {
        self.hint.as_deref().filter(|h| !h.trim().is_empty())
    }
}

/// Loosely-typed exercise record as it appears on disk or in advisor output.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawExercise {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub solution: Option<String>,
    #[serde(default)]
    pub concepts: Option<Vec<String>>,
    #[serde(default)]
    pub hint: Option<String>,
}

impl RawExercise {
    /// Validates required fields and converts into an [`Exercise`].
    ///
    /// `position` is 1-based and only used for error messages.
    pub(crate) fn validate(self, tier: Tier, position: usize) -> Result<Exercise> {
        let required = |value: Option<String>, field: &'static str| -> Result<String> {
            match value {
                None => Err(TutorError::invalid_exercise(tier, position, field, "is missing")),
                Some(v) if v.trim().is_empty() => {
                    Err(TutorError::invalid_exercise(tier, position, field, "is empty"))
                }
                Some(v) => Ok(v),
            }
        };

        let id = required(self.id, "id")?;
        let question = required(self.question, "question")?;
        let solution = required(self.solution, "solution")?;
        let concepts = self
            .concepts
            .ok_or_else(|| TutorError::invalid_exercise(tier, position, "concepts", "is missing"))?;

        Ok(Exercise {
            id: id.trim().to_string(),
            question,
            solution,
            concepts,
            hint: self.hint,
        })
    }
}

/// All exercises, grouped by tier.
#[derive(Debug, Clone, Default)]
pub struct ExerciseBank {
    /// Path the bank was loaded from, if any.
    pub path: Option<PathBuf>,

    tiers: HashMap<Tier, Vec<Exercise>>,
}

impl ExerciseBank {
    /// Loads and validates an exercise bank from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::ExerciseFileNotFound` if the file doesn't exist,
    /// `TutorError::ExerciseParseError` if it is not a JSON object of arrays
    /// keyed by known tier names, and `TutorError::InvalidExercise` if any
    /// record is missing a required field.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TutorError::exercise_file_not_found(path)
            } else {
                TutorError::Io(e)
            }
        })?;

        let mut bank = Self::from_json(&contents)
            .map_err(|e| match e {
                TutorError::Json(err) => TutorError::exercise_parse(path, err.to_string()),
                TutorError::InvalidTier { name } => {
                    TutorError::exercise_parse(path, format!("unknown tier '{name}'"))
                }
                other => other,
            })?;
        bank.path = Some(path.to_path_buf());

        tracing::info!(
            path = %path.display(),
            beginner = bank.len(Tier::Beginner),
            intermediate = bank.len(Tier::Intermediate),
            advanced = bank.len(Tier::Advanced),
            "Exercise bank loaded"
        );
        Ok(bank)
    }

    /// Parses and validates an exercise bank from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: HashMap<String, Vec<RawExercise>> = serde_json::from_str(json)?;
        let mut tiers = HashMap::new();

        for (name, records) in raw {
            let tier: Tier = name.parse()?;
            let mut seen = HashSet::new();
            let mut exercises = Vec::with_capacity(records.len());

            for (index, record) in records.into_iter().enumerate() {
                let exercise = record.validate(tier, index + 1)?;
                if !seen.insert(exercise.id.clone()) {
                    return Err(TutorError::invalid_exercise(
                        tier,
                        index + 1,
                        "id",
                        "is duplicated within the tier",
                    ));
                }
                exercises.push(exercise);
            }

            tiers.insert(tier, exercises);
        }

        Ok(Self { path: None, tiers })
    }

    /// Returns the exercises of a tier (empty if the tier has none).
    #[must_use]
    pub fn exercises(&self, tier: Tier) -> &[Exercise] {
        self.tiers.get(&tier).map_or(&[], Vec::as_slice)
    }

    /// Returns the number of exercises in a tier.
    #[must_use]
    pub fn len(&self, tier: Tier) -> usize {
        self.exercises(tier).len()
    }

    /// Returns `true` if no tier holds any exercise.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiers.values().all(Vec::is_empty)
    }

    /// Looks up an exercise by id within a tier.
    #[must_use]
    pub fn get(&self, tier: Tier, id: &str) -> Option<&Exercise> {
        self.exercises(tier).iter().find(|e| e.id == id)
    }

    /// Appends an exercise to a tier.
    pub fn push(&mut self, tier: Tier, exercise: Exercise) {
        self.tiers.entry(tier).or_default().push(exercise);
    }
}
