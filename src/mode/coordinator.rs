use crate::config::RoomcountConfig;
use crate::error::{ModeError, Result};
use crate::events::{CountEvent, EventBus};
use crate::mode::{CameraMode, FileModeToken, ModeToken};
use crate::setup::ConfigStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Single source of truth for camera ownership.
///
/// All transitions go through compare-and-set on the mode token, so two
/// participants can never both believe they hold the camera.
#[derive(Clone)]
pub struct ModeCoordinator {
    token: Arc<dyn ModeToken>,
    config_store: ConfigStore,
    event_bus: Option<EventBus>,
}

impl ModeCoordinator {
    pub fn new(token: Arc<dyn ModeToken>, config_store: ConfigStore) -> Self {
        Self {
            token,
            config_store,
            event_bus: None,
        }
    }

    /// Coordinator over the file token and config directory named in `config`
    pub fn from_config(config: &RoomcountConfig) -> Self {
        Self::new(
            Arc::new(FileModeToken::new(config.mode_token_path())),
            ConfigStore::from_config(config),
        )
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn config_store(&self) -> &ConfigStore {
        &self.config_store
    }

    pub fn token(&self) -> Arc<dyn ModeToken> {
        Arc::clone(&self.token)
    }

    pub async fn current(&self) -> Result<CameraMode> {
        self.token.get().await
    }

    /// `Idle -> Configuring`
    pub async fn claim_configuring(&self) -> Result<()> {
        let observed = self
            .token
            .compare_and_set(CameraMode::Idle, CameraMode::Configuring)
            .await?;

        if observed != CameraMode::Idle {
            debug!("Configuration claim refused, camera held in {} mode", observed);
            return Err(ModeError::AlreadyLocked { current: observed }.into());
        }

        self.announce(CameraMode::Idle, CameraMode::Configuring);
        Ok(())
    }

    /// `Configuring -> Counting`, only with both configuration documents present
    pub async fn enter_counting(&self) -> Result<()> {
        let current = self.token.get().await?;
        if current != CameraMode::Configuring {
            return Err(ModeError::InvalidTransition {
                from: current,
                to: CameraMode::Counting,
            }
            .into());
        }

        let missing = self.config_store.missing().await?;
        if !missing.is_empty() {
            return Err(ModeError::IncompleteConfig { missing }.into());
        }

        let observed = self
            .token
            .compare_and_set(CameraMode::Configuring, CameraMode::Counting)
            .await?;
        if observed != CameraMode::Configuring {
            return Err(ModeError::InvalidTransition {
                from: observed,
                to: CameraMode::Counting,
            }
            .into());
        }

        self.announce(CameraMode::Configuring, CameraMode::Counting);
        Ok(())
    }

    /// `Counting -> Configuring` (or a plain claim from `Idle`); returns the
    /// mode that was replaced
    pub async fn reconfigure(&self) -> Result<CameraMode> {
        match self.token.get().await? {
            CameraMode::Counting => {
                let observed = self
                    .token
                    .compare_and_set(CameraMode::Counting, CameraMode::Configuring)
                    .await?;
                if observed != CameraMode::Counting {
                    return Err(ModeError::AlreadyLocked { current: observed }.into());
                }
                self.announce(CameraMode::Counting, CameraMode::Configuring);
                Ok(CameraMode::Counting)
            }
            CameraMode::Idle => {
                self.claim_configuring().await?;
                Ok(CameraMode::Idle)
            }
            CameraMode::Configuring => Err(ModeError::AlreadyLocked {
                current: CameraMode::Configuring,
            }
            .into()),
        }
    }

    /// `* -> Idle`; returns the mode that was replaced when it was readable
    pub async fn release(&self) -> Result<Option<CameraMode>> {
        let previous = match self.token.get().await {
            Ok(mode) => Some(mode),
            Err(e) => {
                warn!("Releasing unreadable mode token: {}", e);
                None
            }
        };

        self.token.set(CameraMode::Idle).await?;

        match previous {
            Some(CameraMode::Idle) => {}
            Some(from) => self.announce(from, CameraMode::Idle),
            None => info!("Mode token cleared"),
        }
        Ok(previous)
    }

    /// Fails with `NotCounting` unless the camera is held for counting
    pub async fn require_counting(&self) -> Result<()> {
        match self.token.get().await? {
            CameraMode::Counting => Ok(()),
            current => Err(ModeError::NotCounting { current }.into()),
        }
    }

    /// Fails with `NotConfiguring` unless the camera is held for configuration
    pub async fn require_configuring(&self) -> Result<()> {
        match self.token.get().await? {
            CameraMode::Configuring => Ok(()),
            current => Err(ModeError::NotConfiguring { current }.into()),
        }
    }

    fn announce(&self, from: CameraMode, to: CameraMode) {
        match &self.event_bus {
            Some(event_bus) => {
                event_bus.publish(CountEvent::ModeChanged { from, to });
            }
            None => info!("Mode changed: {} -> {}", from, to),
        }
    }
}
