//! Query similarity scoring.
//!
//! Scores how close a learner's query text is to the reference solution by
//! embedding both texts and taking the cosine similarity of the vectors. The
//! scorer works purely on text, so it is meaningful even for queries that
//! fail to execute.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TutorError};

/// Maps text to fixed-dimension real vectors.
///
/// Implementations must be deterministic for fixed input and return one
/// vector per input text, all of the same dimension.
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds a batch of texts.
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Dimensionality of the produced vectors.
    fn dimension(&self) -> usize;
}

/// Deterministic feature-hashing embedder.
///
/// Word tokens, single punctuation/operator characters and character
/// trigrams are hashed (FNV-1a) into buckets of a fixed-size vector. All
/// weights are non-negative, so scores between two embeddings stay in [0, 1].
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    /// Weight of a whole token relative to a trigram.
    const TOKEN_WEIGHT: f32 = 1.0;
    const TRIGRAM_WEIGHT: f32 = 0.5;

    /// Creates an embedder producing vectors of `dimension` components.
    ///
    /// A zero dimension is bumped to 1.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    // The modulo is < dimension, which itself fits in usize.
    #[allow(clippy::cast_possible_truncation)]
    fn bucket(&self, feature: &str, salt: u8) -> usize {
        (fnv1a(feature.as_bytes(), salt) % self.dimension as u64) as usize
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];

        for token in tokenize(text) {
            vector[self.bucket(token, 0)] += Self::TOKEN_WEIGHT;
        }

        let collapsed: Vec<char> = text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .chars()
            .collect();
        for window in collapsed.windows(3) {
            let trigram: String = window.iter().collect();
            vector[self.bucket(&trigram, 1)] += Self::TRIGRAM_WEIGHT;
        }

        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Splits text into identifier/keyword runs and single symbol characters.
fn tokenize(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;

    for (i, c) in text.char_indices() {
        let is_word = c.is_alphanumeric() || c == '_';
        match (is_word, start) {
            (true, None) => start = Some(i),
            (true, Some(_)) => {}
            (false, s) => {
                if let Some(s) = s {
                    tokens.push(&text[s..i]);
                    start = None;
                }
                if !c.is_whitespace() {
                    tokens.push(&text[i..i + c.len_utf8()]);
                }
            }
        }
    }
    if let Some(s) = start {
        tokens.push(&text[s..]);
    }

    tokens
}

fn fnv1a(bytes: &[u8], salt: u8) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;

    let mut hash = OFFSET ^ u64::from(salt);
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Cosine similarity of two vectors.
///
/// Returns 0.0 when either vector has zero norm or the dimensions differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum();
    let norm_a = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Normalized closeness of two queries.
///
/// Holds the raw cosine value. Cosine similarity can in principle be
/// negative; [`SimilarityScore::clamped`] is what tiering uses.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimilarityScore(f64);

impl SimilarityScore {
    /// Score for identical texts.
    pub const IDENTICAL: Self = Self(1.0);

    /// Wraps a raw score.
    #[must_use]
    pub const fn new(value: f64) -> Self {
        Self(value)
    }

    /// Returns the raw score.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.0
    }

    /// Returns the score limited to [0, 1]; NaN maps to 0.
    #[must_use]
    pub fn clamped(&self) -> f64 {
        if self.0.is_nan() {
            0.0
        } else {
            self.0.clamp(0.0, 1.0)
        }
    }

    /// Returns the clamped score as a percentage.
    #[must_use]
    pub fn percent(&self) -> f64 {
        self.clamped() * 100.0
    }
}

impl std::fmt::Display for SimilarityScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}%", self.percent())
    }
}

/// Normalizes query text before embedding: lowercase, trimmed.
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Scores query closeness through an embedding capability.
#[derive(Clone)]
pub struct SimilarityScorer {
    provider: Arc<dyn EmbeddingProvider>,
}

impl std::fmt::Debug for SimilarityScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilarityScorer")
            .field("dimension", &self.provider.dimension())
            .finish()
    }
}

impl SimilarityScorer {
    /// Creates a scorer over the given embedding capability.
    #[must_use]
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider }
    }

    /// Creates a scorer over a [`HashingEmbedder`] of the given dimension.
    #[must_use]
    pub fn hashing(dimension: usize) -> Self {
        Self::new(Arc::new(HashingEmbedder::new(dimension)))
    }

    /// Scores two query texts.
    ///
    /// Case and surrounding whitespace do not affect the score, identical
    /// normalized non-empty texts score exactly 1.0, and the score is
    /// symmetric in its arguments.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::EmbeddingFailed` only when the embedding
    /// capability fails; malformed query text is never an error.
    pub fn score(&self, a: &str, b: &str) -> Result<SimilarityScore> {
        let a = normalize_query(a);
        let b = normalize_query(b);

        if !a.is_empty() && a == b {
            return Ok(SimilarityScore::IDENTICAL);
        }

        let vectors = self.provider.embed(&[a.as_str(), b.as_str()])?;
        let [va, vb] = vectors.as_slice() else {
            return Err(TutorError::embedding_failed(format!(
                "expected 2 vectors, got {}",
                vectors.len()
            )));
        };

        Ok(SimilarityScore::new(cosine_similarity(va, vb)))
    }
}

impl Default for SimilarityScorer {
    fn default() -> Self {
        Self::new(Arc::new(HashingEmbedder::default()))
    }
}
