use super::*;
use crate::camera::{Frame, FrameFormat};
use crate::config::{TrackerBackend, TrackerConfig};
use crate::error::{RoomcountError, TrackerError};
use crate::setup::RegionConfig;
use std::time::{Duration, SystemTime};

fn test_frame(id: u64) -> Frame {
    Frame::new(
        id,
        SystemTime::now(),
        vec![0xFF, 0xD8, 1, 2, 3, 4, 5, 6, 7, 8, 0xFF, 0xD9],
        1280,
        720,
        FrameFormat::Mjpeg,
    )
}

fn shell_tracker(script: &str, timeout_ms: u64) -> ProcessTracker {
    ProcessTracker::new(&TrackerConfig {
        backend: TrackerBackend::Process,
        command: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        timeout_ms,
    })
}

// Reads the header line, skips `length` bytes, answers with a running count
const COUNTING_SCRIPT: &str = r#"
n=0
while IFS= read -r header; do
  len=$(printf '%s' "$header" | sed 's/.*"length":\([0-9]*\).*/\1/')
  head -c "$len" >/dev/null
  n=$((n+1))
  echo "{\"in_count\":$n,\"out_count\":1}"
done
"#;

#[tokio::test]
async fn test_simulated_tracker_is_cumulative() {
    let mut tracker = SimulatedTracker::new();
    let region = RegionConfig::new(0, 0, 10, 10).polygon();

    let mut last = TrackerCounts::default();
    for id in 0..60 {
        let counts = tracker.track(&test_frame(id), &region).await.unwrap();
        assert!(counts.in_count >= last.in_count);
        assert!(counts.out_count >= last.out_count);
        last = counts;
    }
    assert_eq!(last, TrackerCounts::new(3, 2, 5));
}

#[tokio::test]
async fn test_scripted_tracker_replays_then_repeats() {
    let mut tracker = ScriptedTracker::new([
        Ok(TrackerCounts::new(1, 0, 1)),
        Err("model crashed".to_string()),
        Ok(TrackerCounts::new(2, 1, 3)),
    ]);
    let calls = tracker.calls();
    let region = RegionConfig::new(0, 0, 10, 10).polygon();

    assert_eq!(
        tracker.track(&test_frame(0), &region).await.unwrap(),
        TrackerCounts::new(1, 0, 1)
    );
    let err = tracker.track(&test_frame(1), &region).await.unwrap_err();
    assert!(err.is_transient());
    for _ in 0..3 {
        assert_eq!(
            tracker.track(&test_frame(2), &region).await.unwrap(),
            TrackerCounts::new(2, 1, 3)
        );
    }
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 5);
}

#[test]
fn test_missing_reply_fields_default_to_zero() {
    let counts: TrackerCounts = serde_json::from_str(r#"{"in_count":4}"#).unwrap();
    assert_eq!(counts, TrackerCounts::new(4, 0, 0));
}

#[test]
fn test_tracker_factory() {
    let config = TrackerConfig {
        backend: TrackerBackend::Simulated,
        command: String::new(),
        args: Vec::new(),
        timeout_ms: 100,
    };
    let _tracker = tracker(&config);
}

#[cfg(unix)]
#[tokio::test]
async fn test_process_tracker_line_protocol() {
    let mut tracker = shell_tracker(COUNTING_SCRIPT, 2000);
    let region = RegionConfig::new(100, 100, 200, 150).polygon();

    for expected in 1..=3 {
        let counts = tracker.track(&test_frame(expected), &region).await.unwrap();
        assert_eq!(counts, TrackerCounts::new(expected, 1, 0));
    }
    tracker.shutdown().await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_process_tracker_respawns_after_exit() {
    let script = r#"
IFS= read -r header
len=$(printf '%s' "$header" | sed 's/.*"length":\([0-9]*\).*/\1/')
head -c "$len" >/dev/null
echo '{"in_count":7,"out_count":2,"total_tracks":9}'
"#;
    let mut tracker = shell_tracker(script, 2000);
    let region = RegionConfig::new(0, 0, 10, 10).polygon();
    assert_eq!(tracker.generation(), 0);

    let first = tracker.track(&test_frame(0), &region).await.unwrap();
    assert_eq!(first, TrackerCounts::new(7, 2, 9));
    assert_eq!(tracker.generation(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let second = tracker.track(&test_frame(1), &region).await.unwrap();
    assert_eq!(second, TrackerCounts::new(7, 2, 9));
    assert_eq!(tracker.generation(), 2);
}

#[cfg(unix)]
#[tokio::test]
async fn test_process_tracker_timeout() {
    let mut tracker = shell_tracker("sleep 10", 200);
    let region = RegionConfig::new(0, 0, 10, 10).polygon();

    let err = tracker.track(&test_frame(0), &region).await.unwrap_err();
    assert!(matches!(
        err,
        RoomcountError::Tracker(TrackerError::Timeout { timeout_ms: 200 })
    ));
}

#[cfg(unix)]
#[tokio::test]
async fn test_process_tracker_protocol_error() {
    let script = r#"IFS= read -r header; echo "not json"; sleep 5"#;
    let mut tracker = shell_tracker(script, 2000);
    let region = RegionConfig::new(0, 0, 10, 10).polygon();

    let err = tracker.track(&test_frame(0), &region).await.unwrap_err();
    assert!(matches!(
        err,
        RoomcountError::Tracker(TrackerError::Protocol { .. })
    ));
}

#[tokio::test]
async fn test_process_tracker_missing_command() {
    let mut tracker = ProcessTracker::new(&TrackerConfig {
        backend: TrackerBackend::Process,
        command: "/nonexistent/roomcount-tracker".to_string(),
        args: Vec::new(),
        timeout_ms: 100,
    });
    let region = RegionConfig::new(0, 0, 10, 10).polygon();

    let err = tracker.track(&test_frame(0), &region).await.unwrap_err();
    assert!(matches!(
        err,
        RoomcountError::Tracker(TrackerError::Failure { .. })
    ));
}
