use super::Supervisor;
use crate::error::Result;
use chrono::Utc;
use std::path::Path;
use tracing::{info, warn};

/// Ask a running daemon to clear a worker failure block and start counting
/// again on its next poll
pub async fn request_retry(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, Utc::now().to_rfc3339()).await?;
    Ok(())
}

impl Supervisor {
    /// Consume a pending retry request; true when one was waiting
    pub(super) async fn take_retry_request(&self) -> bool {
        match tokio::fs::remove_file(&self.retry_request_path).await {
            Ok(()) => {
                info!("Worker retry requested");
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!(
                    "Cannot consume retry request {}: {}",
                    self.retry_request_path.display(),
                    e
                );
                false
            }
        }
    }
}
