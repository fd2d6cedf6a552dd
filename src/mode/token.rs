use crate::error::{Result, RoomcountError};
use crate::infrastructure::atomic::{
    read_optional_blocking, remove_if_exists_blocking, write_atomic_blocking,
};
use crate::infrastructure::AdvisoryLock;
use crate::mode::CameraMode;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Persisted camera ownership token
#[async_trait]
pub trait ModeToken: Send + Sync {
    /// Current mode
    async fn get(&self) -> Result<CameraMode>;

    /// Unconditionally replace the mode
    async fn set(&self, mode: CameraMode) -> Result<()>;

    /// Replace the mode with `new` only if it currently reads `expected`.
    ///
    /// Returns the mode observed before the call; the swap happened iff it
    /// equals `expected`.
    async fn compare_and_set(&self, expected: CameraMode, new: CameraMode) -> Result<CameraMode>;
}

/// File-backed token shared between processes.
///
/// Writes replace the file atomically; `Idle` removes it. Mutations run under
/// an advisory lock on a sidecar `.lock` file so compare-and-set is atomic
/// across cooperating processes.
pub struct FileModeToken {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileModeToken {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut lock_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "camera.mode".into());
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);

        Self { path, lock_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Path, &Path) -> Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        let lock_path = self.lock_path.clone();
        tokio::task::spawn_blocking(move || op(&path, &lock_path))
            .await
            .map_err(|e| RoomcountError::system(format!("Mode token task failed: {}", e)))?
    }
}

fn read_mode(path: &Path) -> Result<CameraMode> {
    let text = read_optional_blocking(path)?.map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
    Ok(CameraMode::from_token(text.as_deref())?)
}

fn write_mode(path: &Path, mode: CameraMode) -> Result<()> {
    match mode.token_text() {
        Some(text) => write_atomic_blocking(path, text.as_bytes())?,
        None => {
            remove_if_exists_blocking(path)?;
        }
    }
    Ok(())
}

#[async_trait]
impl ModeToken for FileModeToken {
    async fn get(&self) -> Result<CameraMode> {
        self.blocking(|path, _| read_mode(path)).await
    }

    async fn set(&self, mode: CameraMode) -> Result<()> {
        self.blocking(move |path, lock_path| {
            let _guard = AdvisoryLock::acquire(lock_path)?;
            write_mode(path, mode)
        })
        .await?;

        debug!("Mode token set to {}", mode);
        Ok(())
    }

    async fn compare_and_set(&self, expected: CameraMode, new: CameraMode) -> Result<CameraMode> {
        let observed = self
            .blocking(move |path, lock_path| {
                let _guard = AdvisoryLock::acquire(lock_path)?;
                let observed = read_mode(path)?;
                if observed == expected {
                    write_mode(path, new)?;
                }
                Ok(observed)
            })
            .await?;

        trace!(
            "Mode token compare-and-set {} -> {}: observed {}",
            expected,
            new,
            observed
        );
        Ok(observed)
    }
}

/// In-process token for single-process embedding and tests
#[derive(Default)]
pub struct MemoryModeToken {
    mode: Mutex<CameraMode>,
}

impl MemoryModeToken {
    pub fn new(mode: CameraMode) -> Self {
        Self {
            mode: Mutex::new(mode),
        }
    }
}

#[async_trait]
impl ModeToken for MemoryModeToken {
    async fn get(&self) -> Result<CameraMode> {
        Ok(*self.mode.lock())
    }

    async fn set(&self, mode: CameraMode) -> Result<()> {
        *self.mode.lock() = mode;
        Ok(())
    }

    async fn compare_and_set(&self, expected: CameraMode, new: CameraMode) -> Result<CameraMode> {
        let mut mode = self.mode.lock();
        let observed = *mode;
        if observed == expected {
            *mode = new;
        }
        Ok(observed)
    }
}
