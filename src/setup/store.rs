use crate::config::RoomcountConfig;
use crate::error::{ModeError, Result, SetupError, StorageError};
use crate::infrastructure::{read_optional, remove_if_exists, write_atomic};
use crate::setup::{DirectionConfig, RegionConfig};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A configuration document persisted as one JSON file
pub trait ConfigDocument: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Name used in errors and `missing()` reports
    const NAME: &'static str;
    const FILE_NAME: &'static str;

    fn check(&self, resolution: (u32, u32)) -> std::result::Result<(), SetupError>;
}

impl ConfigDocument for RegionConfig {
    const NAME: &'static str = "region";
    const FILE_NAME: &'static str = "region.json";

    fn check(&self, resolution: (u32, u32)) -> std::result::Result<(), SetupError> {
        self.validate(resolution)
    }
}

impl ConfigDocument for DirectionConfig {
    const NAME: &'static str = "direction";
    const FILE_NAME: &'static str = "direction.json";

    fn check(&self, _resolution: (u32, u32)) -> std::result::Result<(), SetupError> {
        self.validate()
    }
}

/// Both documents required by the counting worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountingSetup {
    pub region: RegionConfig,
    pub direction: DirectionConfig,
}

/// Durable store for the region and direction documents.
///
/// Each document is saved, loaded and cleared as a whole; absence is valid.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
    resolution: (u32, u32),
}

impl ConfigStore {
    pub fn new<P: AsRef<Path>>(dir: P, resolution: (u32, u32)) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            resolution,
        }
    }

    pub fn from_config(config: &RoomcountConfig) -> Self {
        Self::new(&config.storage.config_dir, config.camera.resolution)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    fn path_of<D: ConfigDocument>(&self) -> PathBuf {
        self.dir.join(D::FILE_NAME)
    }

    /// Validate and atomically replace a document
    pub async fn save<D: ConfigDocument>(&self, doc: &D) -> Result<()> {
        doc.check(self.resolution)?;

        let bytes = serde_json::to_vec_pretty(doc)?;
        let path = self.path_of::<D>();
        write_atomic(&path, bytes)
            .await
            .map_err(|e| StorageError::write(D::NAME, e))?;

        info!("Saved {} configuration to {}", D::NAME, path.display());
        Ok(())
    }

    /// Load a document, `None` when it has never been saved or was cleared
    pub async fn load<D: ConfigDocument>(&self) -> Result<Option<D>> {
        let path = self.path_of::<D>();
        let Some(bytes) = read_optional(&path)
            .await
            .map_err(|e| StorageError::read(D::NAME, e))?
        else {
            return Ok(None);
        };

        let doc = serde_json::from_slice(&bytes).map_err(|e| {
            StorageError::read(D::NAME, format!("{} is not valid: {}", path.display(), e))
        })?;
        Ok(Some(doc))
    }

    /// Remove a document; returns whether one existed
    pub async fn clear<D: ConfigDocument>(&self) -> Result<bool> {
        let removed = remove_if_exists(&self.path_of::<D>())
            .await
            .map_err(|e| StorageError::write(D::NAME, e))?;
        if removed {
            info!("Cleared {} configuration", D::NAME);
        }
        Ok(removed)
    }

    pub async fn save_region(&self, region: &RegionConfig) -> Result<()> {
        self.save(region).await
    }

    pub async fn load_region(&self) -> Result<Option<RegionConfig>> {
        self.load().await
    }

    pub async fn save_direction(&self, direction: &DirectionConfig) -> Result<()> {
        self.save(direction).await
    }

    pub async fn load_direction(&self) -> Result<Option<DirectionConfig>> {
        self.load().await
    }

    /// Remove both documents
    pub async fn clear_all(&self) -> Result<()> {
        self.clear::<RegionConfig>().await?;
        self.clear::<DirectionConfig>().await?;
        Ok(())
    }

    /// Names of the documents that are not present
    pub async fn missing(&self) -> Result<Vec<&'static str>> {
        let mut missing = Vec::new();
        if self.load_region().await?.is_none() {
            missing.push(RegionConfig::NAME);
        }
        if self.load_direction().await?.is_none() {
            missing.push(DirectionConfig::NAME);
        }
        debug!("Missing configuration documents: {:?}", missing);
        Ok(missing)
    }

    pub async fn is_complete(&self) -> Result<bool> {
        Ok(self.missing().await?.is_empty())
    }

    /// Both documents, or `IncompleteConfig` naming what is absent
    pub async fn load_complete(&self) -> Result<CountingSetup> {
        match (self.load_region().await?, self.load_direction().await?) {
            (Some(region), Some(direction)) => Ok(CountingSetup { region, direction }),
            (region, direction) => {
                let mut missing = Vec::new();
                if region.is_none() {
                    missing.push(RegionConfig::NAME);
                }
                if direction.is_none() {
                    missing.push(DirectionConfig::NAME);
                }
                Err(ModeError::IncompleteConfig { missing }.into())
            }
        }
    }
}
