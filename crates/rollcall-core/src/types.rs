use serde::{Deserialize, Serialize};

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    /// Number of dimensions.
    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar.
    /// Zero-norm inputs yield 0.0 rather than NaN.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }
}

/// One enrolled identity: an opaque unique key (e.g., a student ID)
/// and its aggregated reference embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryEntry {
    pub identity: String,
    pub embedding: Embedding,
}

/// Outcome of matching a probe embedding against the gallery.
///
/// The rejected case still carries the best similarity observed, so the
/// caller can report "highest confidence" even when nothing matched.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Matched { identity: String, similarity: f32 },
    Unmatched { best_similarity: f32 },
}

impl MatchOutcome {
    /// The best similarity computed, matched or not.
    pub fn similarity(&self) -> f32 {
        match self {
            MatchOutcome::Matched { similarity, .. } => *similarity,
            MatchOutcome::Unmatched { best_similarity } => *best_similarity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = Embedding { values: vec![1.0, 0.0, 0.0], model_version: None };
        let b = Embedding { values: vec![1.0, 0.0, 0.0], model_version: None };
        assert!((a.similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = Embedding { values: vec![1.0, 0.0], model_version: None };
        let b = Embedding { values: vec![0.0, 1.0], model_version: None };
        assert!(a.similarity(&b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = Embedding { values: vec![1.0, 0.0], model_version: None };
        let b = Embedding { values: vec![-1.0, 0.0], model_version: None };
        assert!((a.similarity(&b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = Embedding { values: vec![0.0, 0.0], model_version: None };
        let b = Embedding { values: vec![1.0, 0.0], model_version: None };
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn test_similarity_scale_invariant() {
        // Cosine similarity ignores magnitude
        let a = Embedding { values: vec![0.5, 0.5], model_version: None };
        let b = Embedding { values: vec![2.0, 2.0], model_version: None };
        assert!((a.similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_embedding_serde_round_trip() {
        let a = Embedding {
            values: vec![0.25, -0.75, 0.125],
            model_version: Some("w600k_r50".into()),
        };
        let json = serde_json::to_string(&a).unwrap();
        let back: Embedding = serde_json::from_str(&json).unwrap();
        assert_eq!(back.values, a.values);
        assert_eq!(back.model_version, a.model_version);
    }
}
