use super::Supervisor;
use crate::error::{ModeError, Result, RoomcountError};
use crate::mode::CameraMode;
use tracing::{info, warn};

impl Supervisor {
    /// Settle the mode token at daemon start and return the resulting mode.
    ///
    /// A `Configuring` token belongs to an operator session and is refused
    /// unless `force` is set. A `Counting` token is kept and the worker is
    /// brought up by the first reconcile. From `Idle` counting resumes when
    /// both setup documents exist.
    pub async fn bootstrap(&self, force: bool) -> Result<CameraMode> {
        let mode = match self.coordinator.current().await {
            Ok(mode) => mode,
            Err(RoomcountError::Mode(ModeError::CorruptToken { value })) if force => {
                warn!("Discarding unreadable mode token {:?}", value);
                self.coordinator.release().await?;
                CameraMode::Idle
            }
            Err(e) => return Err(e),
        };

        let mode = match mode {
            CameraMode::Configuring if force => {
                warn!("Releasing camera held for configuration (forced start)");
                self.coordinator.release().await?;
                CameraMode::Idle
            }
            CameraMode::Configuring => {
                return Err(ModeError::AlreadyLocked {
                    current: CameraMode::Configuring,
                }
                .into());
            }
            other => other,
        };

        if mode == CameraMode::Counting {
            info!("Counting mode token found, resuming counting");
            return Ok(CameraMode::Counting);
        }

        let missing = self.coordinator.config_store().missing().await?;
        if missing.is_empty() {
            self.coordinator.claim_configuring().await?;
            self.coordinator.enter_counting().await?;
            info!("Counting setup complete, camera switched to counting mode");
            Ok(CameraMode::Counting)
        } else {
            info!(
                "Counting setup required before counting can start (missing: {})",
                missing.join(", ")
            );
            Ok(CameraMode::Idle)
        }
    }
}
