use crate::counting::{CountSample, LatestSnapshot};
use crate::error::{Result, StorageError};
use crate::infrastructure::{read_optional, write_atomic};
use std::path::{Path, PathBuf};
use tracing::trace;

const SINK: &str = "latest";

/// Single document holding the most recent sample, replaced on every write
#[derive(Debug, Clone)]
pub struct LatestStore {
    path: PathBuf,
}

impl LatestStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write(&self, sample: &CountSample) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&LatestSnapshot::from(sample))?;
        write_atomic(&self.path, bytes)
            .await
            .map_err(|e| StorageError::write(SINK, e))?;
        trace!("Latest count replaced at {}", self.path.display());
        Ok(())
    }

    pub async fn read(&self) -> Result<Option<LatestSnapshot>> {
        let Some(bytes) = read_optional(&self.path)
            .await
            .map_err(|e| StorageError::read(SINK, e))?
        else {
            return Ok(None);
        };
        let snapshot = serde_json::from_slice(&bytes).map_err(|e| StorageError::read(SINK, e))?;
        Ok(Some(snapshot))
    }
}
