//! Region and direction configuration and the operator workflow that writes it.

pub mod direction;
pub mod region;
pub mod session;
pub mod store;

pub use direction::{DirectionConfig, EntryDirection};
pub use region::{Point, RegionConfig};
pub use session::SetupSession;
pub use store::{ConfigDocument, ConfigStore, CountingSetup};

#[cfg(test)]
mod tests;
