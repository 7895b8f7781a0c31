use chrono::Utc;
use rollcall_core::{
    CosineMatcher, Encoder, EncoderError, FaceEncoder, GalleryEntry, MatchError, MatchOutcome,
    Matcher,
};
use rollcall_store::{gallery, AlternationPolicy, AttendanceRecord, GenerateError, StoreError};
use rusqlite::Connection;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::config::Config;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("could not decode image: {0}")]
    BadImage(#[from] image::ImageError),
    #[error("encoder error: {0}")]
    Encoder(#[from] EncoderError),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("gallery generation failed: {0}")]
    Generate(#[from] GenerateError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Daemon status fields reported over D-Bus.
#[derive(Debug, Clone)]
pub struct EngineInfo {
    pub gallery_size: usize,
    pub model_version: Option<String>,
    pub similarity_threshold: f32,
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Recognize {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<String, EngineError>>,
    },
    AttendanceLog {
        reply: oneshot::Sender<Result<Vec<AttendanceRecord>, EngineError>>,
    },
    Info {
        reply: oneshot::Sender<EngineInfo>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Request recognition: decode the photo, extract an embedding,
    /// match against the gallery, record attendance on success.
    pub async fn recognize(&self, image: Vec<u8>) -> Result<String, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Recognize {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Fetch the full attendance log for display.
    pub async fn attendance_log(&self) -> Result<Vec<AttendanceRecord>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::AttendanceLog { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Fetch daemon status fields.
    pub async fn info(&self) -> Result<EngineInfo, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Info { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Loads the ONNX model, opens the database, and loads the gallery —
/// regenerating it from the dataset directory when absent — before any
/// request is accepted. Fails fast at startup if any resource is
/// unavailable; the daemon never serves partially initialized.
///
/// All requests are handled serially on this thread, which is what
/// keeps the recorder's read-then-append sequence atomic.
pub fn spawn_engine(config: &Config) -> Result<EngineHandle, EngineError> {
    let model_path = config.model_path();
    let mut encoder = FaceEncoder::load(&model_path)?;
    tracing::info!(path = %model_path, "ArcFace encoder loaded");

    let mut conn = rollcall_store::open(&config.db_path)?;
    tracing::info!(path = %config.db_path.display(), "database opened");

    let entries = match gallery::load(&conn)? {
        Some(entries) => entries,
        None => {
            tracing::info!(
                dataset = %config.dataset_dir.display(),
                "no persisted gallery; generating from dataset"
            );
            let entries =
                gallery::generate(&config.dataset_dir, &mut encoder, gallery::Aggregation::Mean)?;
            gallery::save(&mut conn, &entries)?;
            entries
        }
    };
    tracing::info!(identities = entries.len(), "gallery ready");

    let threshold = config.similarity_threshold;
    let policy = config.alternation_policy();

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Recognize { image, reply } => {
                        let result = run_recognize(
                            &mut encoder,
                            &conn,
                            &entries,
                            threshold,
                            &policy,
                            &image,
                        );
                        let _ = reply.send(result);
                    }
                    EngineRequest::AttendanceLog { reply } => {
                        let result = rollcall_store::attendance::records(&conn).map_err(Into::into);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Info { reply } => {
                        let _ = reply.send(EngineInfo {
                            gallery_size: entries.len(),
                            model_version: entries
                                .first()
                                .and_then(|e| e.embedding.model_version.clone()),
                            similarity_threshold: threshold,
                        });
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    Ok(EngineHandle { tx })
}

/// Decode, encode, match, and on a positive match append an attendance
/// event. Returns the user-facing status line.
fn run_recognize(
    encoder: &mut FaceEncoder,
    conn: &Connection,
    entries: &[GalleryEntry],
    threshold: f32,
    policy: &AlternationPolicy,
    image: &[u8],
) -> Result<String, EngineError> {
    let photo = image::load_from_memory(image)?;
    let probe = encoder.encode(&photo)?;

    match CosineMatcher.compare(&probe, entries, threshold)? {
        MatchOutcome::Matched {
            identity,
            similarity,
        } => {
            tracing::info!(identity, similarity, "face matched");
            let message = rollcall_store::attendance::record(conn, &identity, policy, Utc::now())?;
            Ok(format!("{message} (Confidence: {similarity:.4})"))
        }
        MatchOutcome::Unmatched { best_similarity } => {
            tracing::info!(best_similarity, "no match above threshold");
            Ok(format!(
                "Face not recognized. (Highest Confidence: {best_similarity:.4})"
            ))
        }
    }
}
