use crate::camera::{Frame, FrameFormat};
use crate::config::CameraConfig;
use crate::error::{CameraError, Result};
use async_trait::async_trait;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;
use tracing::{debug, info, trace};

/// Camera capture as seen by the configuration and counting modes
#[async_trait]
pub trait FrameSource: Send {
    /// Acquire the device; called once the caller holds the camera
    async fn open(&mut self) -> Result<()>;

    /// A single settled image for operators to mark a region on
    async fn capture_still(&mut self) -> Result<Frame>;

    /// Next frame of the live stream; `CaptureUnavailable` is transient
    async fn capture_frame(&mut self) -> Result<Frame>;

    /// Release the device
    async fn close(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;
}

/// Paced generator of MJPEG-shaped frames, always available
pub struct SyntheticFrameSource {
    config: CameraConfig,
    frame_counter: u64,
    open: bool,
    next_frame_at: Option<Instant>,
    failures_remaining: u32,
}

impl SyntheticFrameSource {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            frame_counter: 0,
            open: false,
            next_frame_at: None,
            failures_remaining: 0,
        }
    }

    /// Report the next `count` frames as unavailable
    pub fn with_failures(mut self, count: u32) -> Self {
        self.failures_remaining = count;
        self
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.config.fps.max(1)))
    }

    fn generate(&mut self) -> Frame {
        let frame_id = self.frame_counter;
        self.frame_counter += 1;

        let mut data = vec![
            0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01, 0x01, 0x01,
            0x00, 0x48, 0x00, 0x48, 0x00, 0x00,
        ];
        let pattern_size = 1000 + (frame_id % 500) as usize;
        let pattern_byte = (frame_id % 256) as u8;
        data.extend(vec![pattern_byte; pattern_size]);
        data.extend_from_slice(&[0xFF, 0xD9]);

        let (width, height) = self.config.resolution;
        trace!(
            "Generated synthetic frame {} ({}x{}, {} bytes)",
            frame_id,
            width,
            height,
            data.len()
        );
        Frame::new(
            frame_id,
            SystemTime::now(),
            data,
            width,
            height,
            FrameFormat::Mjpeg,
        )
    }

    fn ensure_open(&self) -> Result<()> {
        if !self.open {
            return Err(CameraError::CaptureUnavailable {
                details: "camera is not open".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl FrameSource for SyntheticFrameSource {
    async fn open(&mut self) -> Result<()> {
        if !self.open {
            self.open = true;
            self.next_frame_at = None;
            info!("Synthetic camera {} opened", self.config.index);
        }
        Ok(())
    }

    async fn capture_still(&mut self) -> Result<Frame> {
        self.ensure_open()?;
        for _ in 0..self.config.still_warmup_frames {
            self.generate();
        }
        Ok(self.generate())
    }

    async fn capture_frame(&mut self) -> Result<Frame> {
        self.ensure_open()?;

        if let Some(at) = self.next_frame_at {
            tokio::time::sleep_until(at).await;
        }
        self.next_frame_at = Some(Instant::now() + self.frame_interval());

        if self.failures_remaining > 0 {
            self.failures_remaining -= 1;
            return Err(CameraError::CaptureUnavailable {
                details: "synthetic frame dropped".to_string(),
            }
            .into());
        }

        Ok(self.generate())
    }

    async fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            debug!(
                "Synthetic camera {} closed after {} frames",
                self.config.index, self.frame_counter
            );
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
