use std::path::PathBuf;

use rollcall_store::AlternationPolicy;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Directory containing the ArcFace ONNX model file.
    pub model_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Dataset directory used to (re)generate the gallery: one
    /// sub-directory per identity, each holding sample photos.
    pub dataset_dir: PathBuf,
    /// Cosine similarity threshold for a positive match.
    pub similarity_threshold: f32,
    /// Hours after which an unclosed check-in resets to a fresh
    /// check-in. 0 = strict alternation.
    pub reset_after_hours: u64,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("ROLLCALL_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| rollcall_core::default_model_dir());

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let db_path = std::env::var("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("kiosk.db"));

        Self {
            model_dir,
            db_path,
            dataset_dir: std::env::var("ROLLCALL_DATASET_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("dataset")),
            similarity_threshold: env_f32("ROLLCALL_SIMILARITY_THRESHOLD", 0.40),
            reset_after_hours: env_u64("ROLLCALL_RESET_AFTER_HOURS", 0),
        }
    }

    /// Path to the ArcFace recognition model.
    pub fn model_path(&self) -> String {
        self.model_dir
            .join("w600k_r50.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// The configured check-in/check-out alternation rule.
    pub fn alternation_policy(&self) -> AlternationPolicy {
        if self.reset_after_hours == 0 {
            AlternationPolicy::Strict
        } else {
            AlternationPolicy::ResetAfter(chrono::Duration::hours(self.reset_after_hours as i64))
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
