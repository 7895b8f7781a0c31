//! Persisted gallery: identity → aggregated reference embedding.
//!
//! The gallery is rebuilt from a dataset directory (one sub-directory
//! per identity, each holding sample photos) and persisted so later
//! startups can load it without re-encoding the dataset.

use crate::db::StoreError;
use chrono::Utc;
use rollcall_core::{Embedding, Encoder, EncoderError, GalleryEntry};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("dataset directory not found: {0}")]
    DatasetMissing(PathBuf),
    #[error("dataset directory {0} produced no identities")]
    EmptyDataset(PathBuf),
    #[error("encoder: {0}")]
    Encoder(#[from] EncoderError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// How to collapse an identity's sample embeddings into one reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// Per-dimension mean, L2-renormalized. The default.
    Mean,
    /// The sample with the highest mean similarity to its peers.
    /// Resists outlier samples (a bad photo in the dataset).
    Medoid,
}

impl Aggregation {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mean" => Some(Aggregation::Mean),
            "medoid" => Some(Aggregation::Medoid),
            _ => None,
        }
    }
}

/// Load the persisted gallery.
///
/// Returns `None` when the gallery is empty or any row fails to parse
/// (logged); the caller regenerates from the dataset in that case.
pub fn load(conn: &Connection) -> Result<Option<Vec<GalleryEntry>>, StoreError> {
    let mut stmt =
        conn.prepare("SELECT identity, embedding, model_version FROM gallery ORDER BY identity")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (identity, embedding_json, model_version) = row?;
        let values: Vec<f32> = match serde_json::from_str(&embedding_json) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(identity, error = %e, "corrupt gallery row; gallery will be regenerated");
                return Ok(None);
            }
        };
        entries.push(GalleryEntry {
            identity,
            embedding: Embedding { values, model_version },
        });
    }

    if entries.is_empty() {
        return Ok(None);
    }
    tracing::info!(identities = entries.len(), "gallery loaded");
    Ok(Some(entries))
}

/// Replace the persisted gallery in a single transaction.
pub fn save(conn: &mut Connection, entries: &[GalleryEntry]) -> Result<(), StoreError> {
    let now = Utc::now().to_rfc3339();
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM gallery", [])?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO gallery (identity, embedding, model_version, created_at)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for entry in entries {
            let embedding_json = serde_json::to_string(&entry.embedding.values)?;
            stmt.execute(rusqlite::params![
                entry.identity,
                embedding_json,
                entry.embedding.model_version,
                now,
            ])?;
        }
    }
    tx.commit()?;
    tracing::info!(identities = entries.len(), "gallery saved");
    Ok(())
}

/// Build the gallery from a dataset directory.
///
/// Layout: one sub-directory per identity, each containing sample
/// photos. Undecodable samples are skipped with a warning; an identity
/// with no usable samples is skipped. A missing dataset directory is a
/// fatal precondition — the caller must abort rather than continue with
/// an empty gallery.
pub fn generate(
    dataset_dir: &Path,
    encoder: &mut dyn Encoder,
    aggregation: Aggregation,
) -> Result<Vec<GalleryEntry>, GenerateError> {
    if !dataset_dir.is_dir() {
        return Err(GenerateError::DatasetMissing(dataset_dir.to_path_buf()));
    }

    let mut entries = Vec::new();
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(dataset_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();

    for dir in dirs {
        let identity = match dir.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };

        let mut samples = Vec::new();
        let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        files.sort();

        for file in files {
            let img = match image::open(&file) {
                Ok(img) => img,
                Err(e) => {
                    tracing::warn!(path = %file.display(), error = %e, "skipping undecodable sample");
                    continue;
                }
            };
            samples.push(encoder.encode(&img)?);
        }

        match aggregate(&samples, aggregation) {
            Some(embedding) => {
                tracing::debug!(identity, samples = samples.len(), "identity enrolled");
                entries.push(GalleryEntry { identity, embedding });
            }
            None => {
                tracing::warn!(identity, "no usable samples; identity skipped");
            }
        }
    }

    if entries.is_empty() {
        return Err(GenerateError::EmptyDataset(dataset_dir.to_path_buf()));
    }
    tracing::info!(identities = entries.len(), "gallery generated from dataset");
    Ok(entries)
}

/// Collapse sample embeddings into one reference embedding.
fn aggregate(samples: &[Embedding], aggregation: Aggregation) -> Option<Embedding> {
    let first = samples.first()?;
    let dim = first.dim();
    let usable: Vec<&Embedding> = samples
        .iter()
        .filter(|s| {
            if s.dim() == dim {
                true
            } else {
                tracing::warn!(expected = dim, actual = s.dim(), "sample dimension mismatch; skipped");
                false
            }
        })
        .collect();

    match aggregation {
        Aggregation::Mean => {
            let mut sum = vec![0.0f32; dim];
            for sample in &usable {
                for (acc, v) in sum.iter_mut().zip(sample.values.iter()) {
                    *acc += v;
                }
            }
            let n = usable.len() as f32;
            let mut mean: Vec<f32> = sum.into_iter().map(|v| v / n).collect();

            let norm: f32 = mean.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                for v in mean.iter_mut() {
                    *v /= norm;
                }
            }
            Some(Embedding {
                values: mean,
                model_version: first.model_version.clone(),
            })
        }
        Aggregation::Medoid => {
            let mut best: Option<(usize, f32)> = None;
            for (i, a) in usable.iter().enumerate() {
                let mut total = 0.0f32;
                for (j, b) in usable.iter().enumerate() {
                    if i != j {
                        total += a.similarity(b);
                    }
                }
                let mean_sim = if usable.len() > 1 {
                    total / (usable.len() - 1) as f32
                } else {
                    0.0
                };
                if best.map(|(_, s)| mean_sim > s).unwrap_or(true) {
                    best = Some((i, mean_sim));
                }
            }
            best.map(|(i, _)| (*usable[i]).clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use image::{DynamicImage, RgbImage};

    /// Encoder stub: embeds a photo as its top-left pixel's RGB values.
    struct PixelEncoder;

    impl Encoder for PixelEncoder {
        fn encode(&mut self, image: &DynamicImage) -> Result<Embedding, EncoderError> {
            let rgb = image.to_rgb8();
            let p = rgb.get_pixel(0, 0);
            Ok(Embedding {
                values: vec![p[0] as f32, p[1] as f32, p[2] as f32],
                model_version: Some("stub".into()),
            })
        }
    }

    fn entry(identity: &str, values: Vec<f32>) -> GalleryEntry {
        GalleryEntry {
            identity: identity.into(),
            embedding: Embedding { values, model_version: Some("stub".into()) },
        }
    }

    fn temp_dataset(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rollcall-gallery-{}-{name}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_sample(dir: &Path, identity: &str, file: &str, color: [u8; 3]) {
        let subdir = dir.join(identity);
        std::fs::create_dir_all(&subdir).unwrap();
        let img = RgbImage::from_pixel(4, 4, image::Rgb(color));
        img.save(subdir.join(file)).unwrap();
    }

    #[test]
    fn test_save_load_round_trip() {
        let mut conn = open_in_memory().unwrap();
        let entries = vec![
            entry("S1", vec![0.1, 0.2, 0.7]),
            entry("S2", vec![0.9, 0.0, -0.3]),
        ];
        save(&mut conn, &entries).unwrap();

        let loaded = load(&conn).unwrap().expect("gallery present");
        assert_eq!(loaded.len(), 2);
        for (a, b) in loaded.iter().zip(entries.iter()) {
            assert_eq!(a.identity, b.identity);
            assert_eq!(a.embedding.model_version, b.embedding.model_version);
            for (x, y) in a.embedding.values.iter().zip(b.embedding.values.iter()) {
                assert!((x - y).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_save_replaces_previous_gallery() {
        let mut conn = open_in_memory().unwrap();
        save(&mut conn, &[entry("S1", vec![1.0])]).unwrap();
        save(&mut conn, &[entry("S2", vec![2.0])]).unwrap();

        let loaded = load(&conn).unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].identity, "S2");
    }

    #[test]
    fn test_load_empty_gallery_is_none() {
        let conn = open_in_memory().unwrap();
        assert!(load(&conn).unwrap().is_none());
    }

    #[test]
    fn test_load_corrupt_row_is_none() {
        let mut conn = open_in_memory().unwrap();
        save(&mut conn, &[entry("S1", vec![1.0])]).unwrap();
        conn.execute(
            "UPDATE gallery SET embedding = 'not json' WHERE identity = 'S1'",
            [],
        )
        .unwrap();

        assert!(load(&conn).unwrap().is_none());
    }

    #[test]
    fn test_generate_missing_dataset_is_fatal() {
        let err = generate(Path::new("/nonexistent/dataset"), &mut PixelEncoder, Aggregation::Mean)
            .unwrap_err();
        assert!(matches!(err, GenerateError::DatasetMissing(_)));
    }

    #[test]
    fn test_generate_empty_dataset_is_fatal() {
        let dir = temp_dataset("empty");
        let err = generate(&dir, &mut PixelEncoder, Aggregation::Mean).unwrap_err();
        assert!(matches!(err, GenerateError::EmptyDataset(_)));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_generate_mean_aggregation() {
        let dir = temp_dataset("mean");
        write_sample(&dir, "S1", "a.png", [100, 0, 0]);
        write_sample(&dir, "S1", "b.png", [0, 100, 0]);
        write_sample(&dir, "S2", "a.png", [0, 0, 50]);

        let entries = generate(&dir, &mut PixelEncoder, Aggregation::Mean).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].identity, "S1");
        assert_eq!(entries[1].identity, "S2");

        // Mean of (100,0,0) and (0,100,0) is (50,50,0), renormalized
        let v = &entries[0].embedding.values;
        let inv_sqrt2 = 1.0 / 2.0f32.sqrt();
        assert!((v[0] - inv_sqrt2).abs() < 1e-6);
        assert!((v[1] - inv_sqrt2).abs() < 1e-6);
        assert!(v[2].abs() < 1e-6);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_generate_medoid_rejects_outlier() {
        let dir = temp_dataset("medoid");
        // Two near-identical samples and one outlier pointing elsewhere
        write_sample(&dir, "S1", "a.png", [100, 2, 0]);
        write_sample(&dir, "S1", "b.png", [100, 0, 2]);
        write_sample(&dir, "S1", "c.png", [0, 0, 100]);

        let entries = generate(&dir, &mut PixelEncoder, Aggregation::Medoid).unwrap();
        assert_eq!(entries.len(), 1);
        // The medoid is one of the two red-dominant samples, never the outlier
        assert!(entries[0].embedding.values[0] > 99.0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_generate_skips_undecodable_samples() {
        let dir = temp_dataset("garbage");
        write_sample(&dir, "S1", "good.png", [10, 20, 30]);
        std::fs::write(dir.join("S1").join("junk.png"), b"not an image").unwrap();

        let entries = generate(&dir, &mut PixelEncoder, Aggregation::Mean).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].identity, "S1");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
