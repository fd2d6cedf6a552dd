//! Frame sources owned by whichever mode currently holds the camera.

pub mod frame;
#[cfg(all(feature = "camera", target_os = "linux"))]
pub mod gst;
pub mod source;

pub use frame::{Frame, FrameFormat};
pub use source::{FrameSource, SyntheticFrameSource};

use crate::config::{CameraBackend, CameraConfig};
use crate::error::Result;
use tracing::info;

/// Build the frame source selected by `config.backend`. The source is
/// returned closed; callers `open` it once they hold the camera.
pub fn frame_source(config: &CameraConfig) -> Result<Box<dyn FrameSource>> {
    match config.backend {
        CameraBackend::Synthetic => {
            info!(
                "Using synthetic frame source ({}x{} @ {}fps)",
                config.resolution.0, config.resolution.1, config.fps
            );
            Ok(Box::new(SyntheticFrameSource::new(config.clone())))
        }
        #[cfg(all(feature = "camera", target_os = "linux"))]
        CameraBackend::Gstreamer => Ok(Box::new(gst::GstFrameSource::new(config.clone()))),
        #[cfg(not(all(feature = "camera", target_os = "linux")))]
        CameraBackend::Gstreamer => Err(crate::error::CameraError::Configuration {
            details: "gstreamer backend requires the `camera` feature on Linux".to_string(),
        }
        .into()),
    }
}
