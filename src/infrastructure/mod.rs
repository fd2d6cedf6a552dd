pub mod atomic;
pub mod lock;

pub use atomic::{read_optional, remove_if_exists, write_atomic};
pub use lock::AdvisoryLock;
