pub mod aggregate;
pub mod camera;
pub mod config;
pub mod counting;
pub mod error;
pub mod events;
pub mod export;
pub mod infrastructure;
pub mod mode;
pub mod setup;
pub mod supervisor;
pub mod tracker;

#[cfg(feature = "http")]
pub mod http;

pub use aggregate::{CountAggregator, Granularity, RangePreset, TimeRange, TimeSeries};
pub use camera::{frame_source, Frame, FrameFormat, FrameSource, SyntheticFrameSource};
pub use config::RoomcountConfig;
pub use counting::{CountSample, CountingWorker, LatestSnapshot, RunEpoch, WorkerExit};
pub use error::{Result, RoomcountError};
pub use events::{CountEvent, EventBus};
pub use export::{CountExporter, ExportOutcome, ExportSink, HistoryStore, JsonlHistoryStore, LatestStore};
pub use mode::{CameraMode, FileModeToken, MemoryModeToken, ModeCoordinator, ModeToken};
pub use setup::{ConfigStore, DirectionConfig, EntryDirection, RegionConfig, SetupSession};
pub use supervisor::{request_retry, ShutdownHandle, ShutdownReason, Supervisor, SupervisorStatus, WorkerState};
pub use tracker::{tracker, Tracker, TrackerCounts};

#[cfg(feature = "http")]
pub use http::{ApiServer, ApiState};
