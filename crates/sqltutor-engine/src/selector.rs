//! Exercise selection and completion tracking.
//!
//! The selector owns the exercise bank and the set of completed exercise ids
//! per tier. Sessions see it only through [`CompletionTracker`], borrowed for
//! the duration of a session.

use std::collections::{HashMap, HashSet};

use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::exercise::{Exercise, ExerciseBank, Tier};
use crate::synthesis::{ExerciseSynthesizer, PROMPT_EXAMPLES};

/// Records which exercises the learner has solved.
pub trait CompletionTracker {
    /// Marks an exercise completed.
    ///
    /// Returns `true` if the id was newly marked. Marking an id twice is a
    /// no-op that returns `false`.
    fn mark_completed(&mut self, tier: Tier, exercise_id: &str) -> bool;

    /// Returns `(completed, total)` for a tier.
    fn completion_count(&self, tier: Tier) -> (usize, usize);
}

/// Picks exercises for a tier, preferring ones the learner hasn't solved.
#[derive(Debug, Default)]
pub struct ExerciseSelector {
    bank: ExerciseBank,
    completed: HashMap<Tier, HashSet<String>>,
    synthesizer: Option<ExerciseSynthesizer>,
    generated: usize,
}

impl ExerciseSelector {
    /// Creates a selector over a bank, with no completed exercises.
    #[must_use]
    pub fn new(bank: ExerciseBank) -> Self {
        Self {
            bank,
            ..Self::default()
        }
    }

    /// Enables exercise synthesis once a tier is exhausted.
    #[must_use]
    pub fn with_synthesizer(mut self, synthesizer: ExerciseSynthesizer) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    /// Returns the underlying bank, including any generated exercises.
    #[must_use]
    pub const fn bank(&self) -> &ExerciseBank {
        &self.bank
    }

    /// Returns the first `n` exercises of a tier.
    #[must_use]
    pub fn examples(&self, tier: Tier, n: usize) -> &[Exercise] {
        let exercises = self.bank.exercises(tier);
        &exercises[..n.min(exercises.len())]
    }

    /// Returns `true` if the exercise has been solved.
    #[must_use]
    pub fn is_completed(&self, tier: Tier, exercise_id: &str) -> bool {
        self.completed
            .get(&tier)
            .is_some_and(|ids| ids.contains(exercise_id))
    }

    /// Returns `true` once every exercise in the tier has been solved.
    #[must_use]
    pub fn tier_exhausted(&self, tier: Tier) -> bool {
        self.bank
            .exercises(tier)
            .iter()
            .all(|e| self.is_completed(tier, &e.id))
    }

    /// Picks the next exercise for a tier.
    ///
    /// Unsolved exercises are picked at random. When the tier is exhausted and
    /// a synthesizer is configured, a new exercise is generated, added to the
    /// bank and returned. Otherwise any exercise of the tier is repeated.
    /// Returns `None` only if the tier is empty and nothing could be generated.
    ///
    /// `tables` names the dataset tables and is only used for synthesis.
    pub async fn next_exercise(&mut self, tier: Tier, tables: &[String]) -> Option<Exercise> {
        if let Some(exercise) = self.pick_uncompleted(tier) {
            debug!(tier = %tier, id = %exercise.id, "Selected unsolved exercise");
            return Some(exercise);
        }

        if let Some(exercise) = self.synthesize(tier, tables).await {
            return Some(exercise);
        }

        info!(tier = %tier, "All exercises completed, repeating an existing one");
        self.bank
            .exercises(tier)
            .choose(&mut rand::thread_rng())
            .cloned()
    }

    fn pick_uncompleted(&self, tier: Tier) -> Option<Exercise> {
        let remaining: Vec<&Exercise> = self
            .bank
            .exercises(tier)
            .iter()
            .filter(|e| !self.is_completed(tier, &e.id))
            .collect();

        remaining.choose(&mut rand::thread_rng()).map(|e| (*e).clone())
    }

    async fn synthesize(&mut self, tier: Tier, tables: &[String]) -> Option<Exercise> {
        let Some(synthesizer) = &self.synthesizer else {
            debug!(tier = %tier, "No advisor configured, cannot generate exercises");
            return None;
        };

        let id = format!("{}gen{}", tier.initial(), self.generated + 1);
        let examples = self.examples(tier, PROMPT_EXAMPLES);

        let generated = synthesizer.synthesize(tier, tables, examples, id).await;
        match generated {
            Ok(exercise) => {
                self.generated += 1;
                self.bank.push(tier, exercise.clone());
                Some(exercise)
            }
            Err(e) => {
                warn!(
                    tier = %tier,
                    error = %e,
                    transient = e.is_transient(),
                    "Exercise generation failed"
                );
                None
            }
        }
    }
}

impl CompletionTracker for ExerciseSelector {
    fn mark_completed(&mut self, tier: Tier, exercise_id: &str) -> bool {
        if self.bank.get(tier, exercise_id).is_none() {
            warn!(tier = %tier, id = exercise_id, "Ignoring completion of unknown exercise");
            return false;
        }
        self.completed
            .entry(tier)
            .or_default()
            .insert(exercise_id.to_string())
    }

    fn completion_count(&self, tier: Tier) -> (usize, usize) {
        let completed = self.completed.get(&tier).map_or(0, HashSet::len);
        (completed, self.bank.len(tier))
    }
}
