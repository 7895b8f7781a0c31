//! Gallery matching by cosine similarity.

use crate::types::{Embedding, GalleryEntry, MatchOutcome};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("gallery is empty — no identities enrolled")]
    EmptyGallery,
    #[error("embedding for '{identity}' has {actual} dimensions, probe has {expected}")]
    DimensionMismatch {
        identity: String,
        expected: usize,
        actual: usize,
    },
}

/// Strategy for comparing a probe embedding against the gallery of
/// enrolled identities.
pub trait Matcher {
    fn compare(
        &self,
        probe: &Embedding,
        gallery: &[GalleryEntry],
        threshold: f32,
    ) -> Result<MatchOutcome, MatchError>;
}

/// Cosine similarity matcher.
///
/// Scores the probe against every gallery entry and accepts the best
/// identity only when its similarity reaches the threshold. Below
/// threshold, the best score is still returned for reporting.
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn compare(
        &self,
        probe: &Embedding,
        gallery: &[GalleryEntry],
        threshold: f32,
    ) -> Result<MatchOutcome, MatchError> {
        if gallery.is_empty() {
            return Err(MatchError::EmptyGallery);
        }

        let mut best_sim = f32::NEG_INFINITY;
        let mut best_idx = 0;

        for (i, entry) in gallery.iter().enumerate() {
            if entry.embedding.dim() != probe.dim() {
                return Err(MatchError::DimensionMismatch {
                    identity: entry.identity.clone(),
                    expected: probe.dim(),
                    actual: entry.embedding.dim(),
                });
            }
            let sim = probe.similarity(&entry.embedding);
            if sim > best_sim {
                best_sim = sim;
                best_idx = i;
            }
        }

        if best_sim >= threshold {
            Ok(MatchOutcome::Matched {
                identity: gallery[best_idx].identity.clone(),
                similarity: best_sim,
            })
        } else {
            Ok(MatchOutcome::Unmatched {
                best_similarity: best_sim,
            })
        }
    }
}
