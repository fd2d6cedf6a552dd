use super::Supervisor;
use tracing::{error, info, warn};

impl Supervisor {
    /// Stop the worker and hand the camera back. Returns the process exit
    /// code: 0 when everything stopped cleanly.
    pub async fn shutdown(&self) -> i32 {
        info!("Beginning graceful shutdown");

        self.cancellation_token.cancel();

        let mut exit_code = 0;

        if let Err(e) = self.stop_worker().await {
            error!("Error stopping counting worker: {}", e);
            exit_code = 1;
        }

        match self.coordinator.release().await {
            Ok(Some(mode)) => info!("Released camera from {} mode", mode),
            Ok(None) => {}
            Err(e) => {
                warn!("Failed to release mode token: {}", e);
                exit_code = 1;
            }
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        exit_code
    }
}
