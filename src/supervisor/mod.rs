mod launcher;
mod orchestrator;
mod reconcile;
mod retry;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod types;


pub use launcher::{DefaultLauncher, WorkerLauncher};
pub use orchestrator::Supervisor;
pub use retry::request_retry;
pub use runtime::ShutdownHandle;
pub use types::{ShutdownReason, SupervisorStatus, WorkerState};
