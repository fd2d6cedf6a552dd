use crate::camera::Frame;
use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::setup::Point;
use crate::tracker::{Tracker, TrackerCounts};
use async_trait::async_trait;
use serde::Serialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

/// Header line written before each frame's bytes
#[derive(Serialize)]
struct FrameHeader<'a> {
    frame_id: u64,
    width: u32,
    height: u32,
    format: &'static str,
    length: usize,
    region: &'a [Point],
}

struct TrackerProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Tracker running as an external process speaking a line protocol on
/// stdin/stdout. A process that dies is respawned on the next call.
pub struct ProcessTracker {
    command: String,
    args: Vec<String>,
    timeout: Duration,
    process: Option<TrackerProcess>,
    /// Number of processes spawned so far
    generation: u64,
}

impl ProcessTracker {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
            process: None,
            generation: 0,
        }
    }

    fn spawn(&mut self) -> Result<TrackerProcess> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TrackerError::Failure {
                details: format!("failed to start '{}': {}", self.command, e),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| TrackerError::Failure {
            details: "tracker stdin unavailable".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| TrackerError::Failure {
            details: "tracker stdout unavailable".to_string(),
        })?;

        self.generation += 1;
        info!(
            "Tracker process started (pid {:?}, generation {})",
            child.id(),
            self.generation
        );
        Ok(TrackerProcess {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    /// Drop the process if it has exited since the last call
    fn reap(&mut self) {
        if let Some(process) = self.process.as_mut() {
            match process.child.try_wait() {
                Ok(Some(status)) => {
                    warn!("Tracker process exited ({}), respawning", status);
                    self.process = None;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Failed to poll tracker process: {}", e);
                    self.process = None;
                }
            }
        }
    }

    async fn round_trip(
        process: &mut TrackerProcess,
        frame: &Frame,
        region: &[Point],
    ) -> Result<TrackerCounts> {
        let header = FrameHeader {
            frame_id: frame.id,
            width: frame.width,
            height: frame.height,
            format: frame.format.as_str(),
            length: frame.size(),
            region,
        };
        let mut line = serde_json::to_vec(&header)?;
        line.push(b'\n');

        let write_failed = |e: std::io::Error| TrackerError::Failure {
            details: format!("failed to send frame: {}", e),
        };
        process.stdin.write_all(&line).await.map_err(write_failed)?;
        process
            .stdin
            .write_all(&frame.data)
            .await
            .map_err(write_failed)?;
        process.stdin.flush().await.map_err(write_failed)?;

        let mut reply = String::new();
        let read = process
            .stdout
            .read_line(&mut reply)
            .await
            .map_err(|e| TrackerError::Failure {
                details: format!("failed to read reply: {}", e),
            })?;
        if read == 0 {
            return Err(TrackerError::Failure {
                details: "tracker closed its output".to_string(),
            }
            .into());
        }

        let counts = serde_json::from_str(reply.trim()).map_err(|e| TrackerError::Protocol {
            details: format!("unparseable reply {:?}: {}", reply.trim(), e),
        })?;
        Ok(counts)
    }
}

#[async_trait]
impl Tracker for ProcessTracker {
    async fn track(&mut self, frame: &Frame, region: &[Point]) -> Result<TrackerCounts> {
        self.reap();
        if self.process.is_none() {
            self.process = Some(self.spawn()?);
        }
        let Some(process) = self.process.as_mut() else {
            return Err(TrackerError::Failure {
                details: "tracker process unavailable".to_string(),
            }
            .into());
        };

        match tokio::time::timeout(self.timeout, Self::round_trip(process, frame, region)).await {
            Ok(Ok(counts)) => Ok(counts),
            Ok(Err(e)) => {
                // The stream position is unknown after a failed exchange
                self.process = None;
                Err(e)
            }
            Err(_) => {
                self.process = None;
                Err(TrackerError::Timeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                }
                .into())
            }
        }
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    async fn shutdown(&mut self) -> Result<()> {
        if let Some(TrackerProcess {
            mut child,
            stdin,
            stdout,
        }) = self.process.take()
        {
            drop(stdin);
            drop(stdout);
            match tokio::time::timeout(Duration::from_secs(1), child.wait()).await {
                Ok(Ok(status)) => debug!("Tracker process exited ({})", status),
                _ => {
                    warn!("Tracker process did not exit, killing it");
                    let _ = child.kill().await;
                }
            }
        }
        Ok(())
    }
}
