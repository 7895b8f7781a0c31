use zbus::interface;

use crate::engine::{EngineError, EngineHandle};
use rollcall_core::MatchError;

/// D-Bus interface for the rollcall attendance kiosk daemon.
///
/// Bus name: org.rollcall.Kiosk1
/// Object path: /org/rollcall/Kiosk1
pub struct KioskService {
    engine: EngineHandle,
}

impl KioskService {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }
}

#[interface(name = "org.rollcall.Kiosk1")]
impl KioskService {
    /// Submit a photo (encoded image bytes) for recognition.
    ///
    /// This is the request boundary: every per-request failure is
    /// converted into a user-facing status string here, so a bad photo
    /// or a storage hiccup never takes the daemon down.
    async fn recognize(&self, image: Vec<u8>) -> zbus::fdo::Result<String> {
        tracing::info!(bytes = image.len(), "recognize requested");
        match self.engine.recognize(image).await {
            Ok(message) => Ok(message),
            Err(EngineError::ChannelClosed) => Err(zbus::fdo::Error::Failed(
                "recognition engine is not running".into(),
            )),
            Err(EngineError::Match(MatchError::EmptyGallery)) => {
                Ok("System not initialized: no identities enrolled.".into())
            }
            Err(e) => {
                tracing::warn!(error = %e, "recognition request failed");
                Ok(format!("Recognition failed: {e}"))
            }
        }
    }

    /// Return the full attendance log as a JSON array, oldest first.
    async fn attendance_log(&self) -> zbus::fdo::Result<String> {
        tracing::info!("attendance log requested");
        let records = self
            .engine
            .attendance_log()
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        serde_json::to_string(&records).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let info = self
            .engine
            .info()
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "gallery_size": info.gallery_size,
            "model_version": info.model_version,
            "similarity_threshold": info.similarity_threshold,
        })
        .to_string())
    }
}
