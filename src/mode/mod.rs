//! Camera ownership: the persisted mode token and the transitions allowed on it.

pub mod coordinator;
pub mod token;
pub mod types;

pub use coordinator::ModeCoordinator;
pub use token::{FileModeToken, MemoryModeToken, ModeToken};
pub use types::CameraMode;
