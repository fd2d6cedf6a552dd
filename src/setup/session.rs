use crate::camera::{Frame, FrameSource};
use crate::error::Result;
use crate::infrastructure::write_atomic;
use crate::mode::{CameraMode, ModeCoordinator};
use crate::setup::{DirectionConfig, RegionConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

const OPEN_ATTEMPTS: u32 = 10;
const OPEN_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Operator configuration workflow: claim the camera, capture a reference
/// still, mark the region, choose the direction, hand over to counting.
pub struct SetupSession {
    coordinator: ModeCoordinator,
    camera: Box<dyn FrameSource>,
    reference_image_path: PathBuf,
}

impl SetupSession {
    pub fn new<P: AsRef<Path>>(
        coordinator: ModeCoordinator,
        camera: Box<dyn FrameSource>,
        reference_image_path: P,
    ) -> Self {
        Self {
            coordinator,
            camera,
            reference_image_path: reference_image_path.as_ref().to_path_buf(),
        }
    }

    pub fn reference_image_path(&self) -> &Path {
        &self.reference_image_path
    }

    /// Take the camera for configuration, from `Idle` or away from `Counting`.
    /// Returns the mode that was replaced.
    pub async fn begin(&self) -> Result<CameraMode> {
        let previous = self.coordinator.reconfigure().await?;
        info!("Configuration session started (was {})", previous);
        Ok(previous)
    }

    /// Capture a still and store it as the reference image
    pub async fn capture_reference(&mut self) -> Result<Frame> {
        self.coordinator.require_configuring().await?;

        self.open_camera().await?;
        let captured = self.camera.capture_still().await;
        if let Err(e) = self.camera.close().await {
            warn!("Failed to close camera after still capture: {}", e);
        }
        let frame = captured?;

        write_atomic(&self.reference_image_path, frame.data.to_vec()).await?;
        info!(
            "Reference image {}x{} written to {}",
            frame.width,
            frame.height,
            self.reference_image_path.display()
        );
        Ok(frame)
    }

    pub async fn save_region(&self, region: &RegionConfig) -> Result<()> {
        self.coordinator.require_configuring().await?;
        self.coordinator.config_store().save_region(region).await
    }

    pub async fn save_direction(&self, direction: &DirectionConfig) -> Result<()> {
        self.coordinator.require_configuring().await?;
        self.coordinator.config_store().save_direction(direction).await
    }

    /// Wipe both documents
    pub async fn clear(&self) -> Result<()> {
        self.coordinator.require_configuring().await?;
        self.coordinator.config_store().clear_all().await
    }

    /// Hand the camera over to counting
    pub async fn finish(&mut self) -> Result<()> {
        if self.camera.is_open() {
            self.camera.close().await?;
        }
        self.coordinator.enter_counting().await?;
        info!("Configuration session finished, counting enabled");
        Ok(())
    }

    /// Give the camera back without enabling counting
    pub async fn abandon(&mut self) -> Result<()> {
        if self.camera.is_open() {
            self.camera.close().await?;
        }
        self.coordinator.release().await?;
        Ok(())
    }

    // A worker that was just asked to stop may still hold the device
    async fn open_camera(&mut self) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.camera.open().await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < OPEN_ATTEMPTS => {
                    warn!("Camera open attempt {} failed: {}", attempt, e);
                    attempt += 1;
                    tokio::time::sleep(OPEN_RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
