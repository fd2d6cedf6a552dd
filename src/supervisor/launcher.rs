use crate::camera::frame_source;
use crate::config::RoomcountConfig;
use crate::counting::{CountingWorker, RunEpoch, WorkerSettings};
use crate::error::{Result, WorkerError};
use crate::export::CountExporter;
use crate::mode::ModeToken;
use crate::setup::ConfigStore;
use crate::tracker::tracker;
use async_trait::async_trait;
use std::sync::Arc;

/// Builds a prepared worker for each counting run
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn launch(&self, epoch: RunEpoch) -> Result<CountingWorker>;
}

/// Launcher wiring the configured camera backend, tracker and exporter
pub struct DefaultLauncher {
    config: RoomcountConfig,
    token: Arc<dyn ModeToken>,
    config_store: ConfigStore,
    exporter: CountExporter,
}

impl DefaultLauncher {
    pub fn new(
        config: RoomcountConfig,
        token: Arc<dyn ModeToken>,
        config_store: ConfigStore,
        exporter: CountExporter,
    ) -> Self {
        Self {
            config,
            token,
            config_store,
            exporter,
        }
    }
}

#[async_trait]
impl WorkerLauncher for DefaultLauncher {
    async fn launch(&self, epoch: RunEpoch) -> Result<CountingWorker> {
        let camera = frame_source(&self.config.camera).map_err(|e| WorkerError::StartFailure {
            details: e.to_string(),
        })?;
        CountingWorker::prepare(
            epoch,
            Arc::clone(&self.token),
            &self.config_store,
            camera,
            tracker(&self.config.tracker),
            self.exporter.clone(),
            WorkerSettings::from_config(&self.config.worker),
        )
        .await
    }
}
