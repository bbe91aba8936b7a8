use std::path::{Path, PathBuf};

use opencv::core::{Mat, Vector};
use opencv::imgcodecs;
use thiserror::Error;

use crate::analytics::Comparison;
use crate::config::CompareParams;

use super::metadata::MetadataRecord;

const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("metadata error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("opencv error: {0}")]
    OpenCv(#[from] opencv::Error),
    #[error("failed to encode {0}")]
    EncodeFailed(PathBuf),
}

/// Paths written for one comparison.
#[derive(Debug, Clone)]
pub struct SavedArtifacts {
    pub reference: PathBuf,
    pub current: PathBuf,
    pub mask: PathBuf,
    pub diff: PathBuf,
    pub metadata: PathBuf,
}

/// Writes comparison images and their metadata record under
/// `<output_dir>/<camera>/`.
pub struct ArtifactStore {
    camera_dir: PathBuf,
    camera_id: String,
}

impl ArtifactStore {
    pub fn new(output_dir: &Path, camera_id: &str) -> Result<Self, StorageError> {
        let camera_dir = output_dir.join(camera_id);
        std::fs::create_dir_all(&camera_dir)?;
        Ok(Self {
            camera_dir,
            camera_id: camera_id.to_string(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.camera_dir
    }

    pub fn save(
        &self,
        reference: &Mat,
        comparison: &Comparison,
        params: CompareParams,
    ) -> Result<SavedArtifacts, StorageError> {
        let stamp = self.unique_stamp();
        let artifacts = &comparison.artifacts;
        let diff = artifacts.overlay.as_ref().unwrap_or(&artifacts.visualization);

        let saved = SavedArtifacts {
            reference: self.write_image(&stamp, "reference", reference)?,
            current: self.write_image(&stamp, "current", &artifacts.aligned)?,
            mask: self.write_image(&stamp, "mask", &artifacts.mask)?,
            diff: self.write_image(&stamp, "diff", diff)?,
            metadata: self.camera_dir.join(format!("{stamp}_meta.json")),
        };

        let record = MetadataRecord::new(stamp, &self.camera_id, comparison, params);
        std::fs::write(&saved.metadata, serde_json::to_string_pretty(&record)?)?;

        tracing::info!(
            camera = %self.camera_id,
            path = %saved.metadata.display(),
            score = format!("{:.3}", record.score),
            "artifacts saved"
        );
        Ok(saved)
    }

    pub fn load(path: &Path) -> Result<MetadataRecord, StorageError> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Second-resolution timestamp, suffixed when several comparisons land in
    /// the same second.
    fn unique_stamp(&self) -> String {
        let base = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
        let mut stamp = base.clone();
        let mut n = 1;
        while self.camera_dir.join(format!("{stamp}_meta.json")).exists() {
            stamp = format!("{base}-{n}");
            n += 1;
        }
        stamp
    }

    fn write_image(&self, stamp: &str, kind: &str, image: &Mat) -> Result<PathBuf, StorageError> {
        let path = self.camera_dir.join(format!("{stamp}_{kind}.png"));
        let path_str = path.to_string_lossy();
        if !imgcodecs::imwrite(&path_str, image, &Vector::<i32>::new())? {
            return Err(StorageError::EncodeFailed(path));
        }
        Ok(path)
    }
}
