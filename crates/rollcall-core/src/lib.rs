//! rollcall-core — Face embedding extraction and gallery matching.
//!
//! Uses ArcFace running via ONNX Runtime for CPU inference to turn a
//! submitted photo into a 512-dimensional embedding, and matches it
//! against a gallery of enrolled identities by cosine similarity.

pub mod encoder;
pub mod matcher;
pub mod types;

pub use encoder::{Encoder, EncoderError, FaceEncoder};
pub use matcher::{CosineMatcher, MatchError, Matcher};
pub use types::{Embedding, GalleryEntry, MatchOutcome};

use std::path::PathBuf;

/// Default directory for ONNX model files.
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("/usr/share/rollcall/models")
}
