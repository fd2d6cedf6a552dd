use crate::camera::{Frame, FrameFormat, FrameSource};
use crate::config::CameraConfig;
use crate::error::{CameraError, Result, RoomcountError};
use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::time::SystemTime;
use tracing::{debug, info, trace, warn};

/// V4L2 MJPEG capture through a GStreamer appsink
pub struct GstFrameSource {
    config: CameraConfig,
    pipeline: Option<Pipeline>,
    appsink: Option<AppSink>,
    frame_counter: u64,
}

impl GstFrameSource {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            pipeline: None,
            appsink: None,
            frame_counter: 0,
        }
    }

    /// Build GStreamer pipeline string for MJPEG capture
    fn build_pipeline_string(&self) -> String {
        let (width, height) = self.config.resolution;
        format!(
            "v4l2src device=/dev/video{} io-mode=mmap do-timestamp=true ! \
             image/jpeg,width={},height={},framerate={}/1 ! \
             queue max-size-buffers=4 leaky=downstream ! \
             appsink name=sink sync=false max-buffers=2 drop=true qos=false enable-last-sample=false emit-signals=false",
            self.config.index, width, height, self.config.fps
        )
    }

    fn to_frame(&mut self, sample: gstreamer::Sample) -> Result<Frame> {
        let buffer = sample
            .buffer()
            .ok_or_else(|| CameraError::CaptureUnavailable {
                details: "No buffer in sample".to_string(),
            })?;

        let (width, height) = sample
            .caps()
            .and_then(|caps| VideoInfo::from_caps(caps).ok())
            .map(|info| (info.width(), info.height()))
            .unwrap_or(self.config.resolution);

        let map = buffer
            .map_readable()
            .map_err(|e| CameraError::CaptureUnavailable {
                details: format!("Failed to map buffer: {}", e),
            })?;

        let frame_id = self.frame_counter;
        self.frame_counter += 1;
        trace!(
            "Captured MJPEG frame {} ({}x{}, {} bytes)",
            frame_id,
            width,
            height,
            map.len()
        );

        Ok(Frame::new(
            frame_id,
            SystemTime::now(),
            map.as_slice().to_vec(),
            width,
            height,
            FrameFormat::Mjpeg,
        ))
    }

    fn stop_pipeline(&mut self) {
        self.appsink = None;
        if let Some(pipeline) = self.pipeline.take() {
            if let Err(e) = pipeline.set_state(gstreamer::State::Null) {
                warn!("Failed to stop GStreamer pipeline: {}", e);
            }
        }
    }
}

#[async_trait]
impl FrameSource for GstFrameSource {
    async fn open(&mut self) -> Result<()> {
        if self.pipeline.is_some() {
            return Ok(());
        }

        gstreamer::init().map_err(|e| CameraError::Configuration {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;

        let pipeline_desc = self.build_pipeline_string();
        info!("Creating GStreamer pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| CameraError::Configuration {
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| CameraError::Configuration {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let appsink = pipeline
            .by_name("sink")
            .and_then(|element| element.downcast::<AppSink>().ok())
            .ok_or_else(|| CameraError::Configuration {
                details: "Pipeline has no appsink named 'sink'".to_string(),
            })?;

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| CameraError::Configuration {
                details: format!("Failed to start pipeline: {}", e),
            })?;

        self.pipeline = Some(pipeline);
        self.appsink = Some(appsink);
        info!("Camera /dev/video{} opened", self.config.index);
        Ok(())
    }

    async fn capture_still(&mut self) -> Result<Frame> {
        for _ in 0..self.config.still_warmup_frames {
            self.capture_frame().await?;
        }
        self.capture_frame().await
    }

    async fn capture_frame(&mut self) -> Result<Frame> {
        let appsink = self
            .appsink
            .clone()
            .ok_or_else(|| CameraError::CaptureUnavailable {
                details: "camera is not open".to_string(),
            })?;

        let timeout_ms = self.config.frame_timeout_ms;
        let sample = tokio::task::spawn_blocking(move || {
            appsink.try_pull_sample(gstreamer::ClockTime::from_mseconds(timeout_ms))
        })
        .await
        .map_err(|e| RoomcountError::system(format!("Capture task failed: {}", e)))?
        .ok_or_else(|| CameraError::CaptureUnavailable {
            details: format!("no frame within {}ms", timeout_ms),
        })?;

        self.to_frame(sample)
    }

    async fn close(&mut self) -> Result<()> {
        if self.pipeline.is_some() {
            self.stop_pipeline();
            debug!(
                "Camera /dev/video{} closed after {} frames",
                self.config.index, self.frame_counter
            );
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.pipeline.is_some()
    }
}

impl Drop for GstFrameSource {
    fn drop(&mut self) {
        self.stop_pipeline();
    }
}
