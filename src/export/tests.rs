use super::*;
use crate::counting::{CountSample, RunEpoch};
use crate::error::{Result, StorageError};
use crate::events::{CountEvent, EventBus};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 14, hour, minute, 0).unwrap()
}

fn sample(timestamp: DateTime<Utc>, in_count: u64, out_count: u64) -> CountSample {
    CountSample::new(timestamp, in_count, out_count, in_count + out_count, Some(RunEpoch::new()))
}

struct FailingHistory;

#[async_trait]
impl HistoryStore for FailingHistory {
    async fn append(&self, _sample: &CountSample) -> Result<()> {
        Err(StorageError::write("history", "disk full").into())
    }

    async fn query(
        &self,
        _start: Option<DateTime<Utc>>,
        _end: Option<DateTime<Utc>>,
    ) -> Result<Vec<CountSample>> {
        Ok(Vec::new())
    }
}

struct StalledHistory;

#[async_trait]
impl HistoryStore for StalledHistory {
    async fn append(&self, _sample: &CountSample) -> Result<()> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    }

    async fn query(
        &self,
        _start: Option<DateTime<Utc>>,
        _end: Option<DateTime<Utc>>,
    ) -> Result<Vec<CountSample>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_latest_document_format() {
    let temp_dir = TempDir::new().unwrap();
    let store = LatestStore::new(temp_dir.path().join("latest.json"));
    assert_eq!(store.read().await.unwrap(), None);

    let first = sample(at(9, 0), 10, 3);
    store.write(&first).await.unwrap();
    store.write(&sample(at(9, 1), 11, 3)).await.unwrap();

    let snapshot = store.read().await.unwrap().unwrap();
    assert_eq!(snapshot.in_count, 11);
    assert_eq!(snapshot.current_count, 8);

    let raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
    assert_eq!(raw["in"], 11);
    assert_eq!(raw["out"], 3);
    assert_eq!(raw["current"], 8);
    assert_eq!(raw["total_tracks"], 14);
    assert!(raw["timestamp"].as_str().unwrap().starts_with("2024-03-14T09:01:00"));
    assert!(raw["run_epoch"].is_string());
}

#[tokio::test]
async fn test_history_half_open_range() {
    let temp_dir = TempDir::new().unwrap();
    let store = JsonlHistoryStore::new(temp_dir.path());

    for minute in [0, 10, 20, 30] {
        store.append(&sample(at(12, minute), minute as u64, 0)).await.unwrap();
    }

    let rows = store.query(Some(at(12, 10)), Some(at(12, 30))).await.unwrap();
    let ins: Vec<u64> = rows.iter().map(|r| r.in_count).collect();
    assert_eq!(ins, vec![10, 20]);

    assert_eq!(store.query(None, None).await.unwrap().len(), 4);
    assert_eq!(store.query(Some(at(12, 25)), None).await.unwrap().len(), 1);
    assert_eq!(store.query(None, Some(at(12, 0))).await.unwrap().len(), 0);
    assert!(store.query(Some(at(13, 0)), Some(at(12, 0))).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_history_partitions_by_day_and_sorts() {
    let temp_dir = TempDir::new().unwrap();
    let store = JsonlHistoryStore::new(temp_dir.path());

    let late = at(23, 59);
    let next_day = late + ChronoDuration::minutes(2);
    store.append(&sample(next_day, 2, 0)).await.unwrap();
    store.append(&sample(late, 1, 0)).await.unwrap();

    assert!(temp_dir.path().join("2024-03-14.jsonl").exists());
    assert!(temp_dir.path().join("2024-03-15.jsonl").exists());
    assert_eq!(
        store.partitions().await.unwrap(),
        vec![
            NaiveDate::from_ymd_opt(2024, 3, 14).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
        ]
    );

    let rows = store.query(None, None).await.unwrap();
    assert_eq!(rows.iter().map(|r| r.in_count).collect::<Vec<_>>(), vec![1, 2]);
}

#[tokio::test]
async fn test_history_skips_malformed_rows() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("2024-03-14.jsonl");
    let good = serde_json::to_string(&sample(at(8, 0), 5, 1)).unwrap();
    std::fs::write(&path, format!("{}\nnot json\n{{\"timestamp\":\"2024-03-14T08:0", good)).unwrap();

    let store = JsonlHistoryStore::new(temp_dir.path());
    assert_eq!(store.query(None, None).await.unwrap().len(), 1);

    // the torn tail is closed off before the next append
    store.append(&sample(at(8, 5), 6, 1)).await.unwrap();
    let rows = store.query(None, None).await.unwrap();
    assert_eq!(rows.iter().map(|r| r.in_count).collect::<Vec<_>>(), vec![5, 6]);
}

#[tokio::test]
async fn test_history_accepts_rows_without_run_epoch() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(
        temp_dir.path().join("2024-03-14.jsonl"),
        "{\"timestamp\":\"2024-03-14T08:00:00Z\",\"in_count\":3,\"out_count\":1,\"current_count\":2,\"total_tracks\":4}\n",
    )
    .unwrap();

    let store = JsonlHistoryStore::new(temp_dir.path());
    let rows = store.query(None, None).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].run_epoch, None);
    assert_eq!(rows[0].current_count, 2);
}

#[tokio::test]
async fn test_history_prune() {
    let temp_dir = TempDir::new().unwrap();
    let store = JsonlHistoryStore::new(temp_dir.path());

    for day in 10..15 {
        let ts = Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap();
        store.append(&sample(ts, day as u64, 0)).await.unwrap();
    }

    let removed = store
        .prune_before(NaiveDate::from_ymd_opt(2024, 3, 13).unwrap())
        .await
        .unwrap();
    assert_eq!(removed, 3);
    assert_eq!(store.partitions().await.unwrap().len(), 2);

    // the open partition survives pruning
    store.append(&sample(at(13, 0), 99, 0)).await.unwrap();
    store.sync().await.unwrap();
    assert_eq!(store.query(None, None).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_prune_closes_expired_open_partition() {
    let temp_dir = TempDir::new().unwrap();
    let store = JsonlHistoryStore::new(temp_dir.path());

    let old = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
    store.append(&sample(old, 1, 0)).await.unwrap();

    let removed = store
        .prune_before(NaiveDate::from_ymd_opt(2024, 3, 11).unwrap())
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert!(store.partitions().await.unwrap().is_empty());

    store.append(&sample(at(8, 0), 2, 0)).await.unwrap();
    store.sync().await.unwrap();
    assert_eq!(
        store.partitions().await.unwrap(),
        vec![NaiveDate::from_ymd_opt(2024, 3, 14).unwrap()]
    );
    let rows = store.query(None, None).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].in_count, 2);
}

#[tokio::test]
async fn test_export_writes_both_sinks() {
    let temp_dir = TempDir::new().unwrap();
    let history = Arc::new(JsonlHistoryStore::new(temp_dir.path().join("history")));
    let exporter = CountExporter::new(
        LatestStore::new(temp_dir.path().join("latest.json")),
        history.clone(),
        Duration::from_millis(500),
    );

    let outcome = exporter.export(&sample(at(10, 0), 10, 3)).await;
    assert!(outcome.all_written());

    assert_eq!(exporter.latest().read().await.unwrap().unwrap().current_count, 7);
    assert_eq!(history.query(None, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_export_sinks_fail_independently() {
    let temp_dir = TempDir::new().unwrap();
    let event_bus = EventBus::new(10);
    let mut events = event_bus.subscribe();
    let exporter = CountExporter::new(
        LatestStore::new(temp_dir.path().join("latest.json")),
        Arc::new(FailingHistory),
        Duration::from_millis(500),
    )
    .with_event_bus(event_bus);

    let outcome = exporter.export(&sample(at(10, 0), 4, 1)).await;
    assert_eq!(outcome.latest, SinkResult::Written);
    assert!(matches!(outcome.history, SinkResult::Failed(_)));
    assert!(exporter.latest().read().await.unwrap().is_some());

    let mut saw_failure = false;
    let mut saw_export = false;
    while let Ok(event) = events.try_recv() {
        match event {
            CountEvent::ExportFailed { sink, .. } => {
                assert_eq!(sink, ExportSink::History);
                saw_failure = true;
            }
            CountEvent::SampleExported { .. } => saw_export = true,
            _ => {}
        }
    }
    assert!(saw_failure && saw_export);
}

#[tokio::test]
async fn test_export_times_out_slow_sink() {
    let temp_dir = TempDir::new().unwrap();
    let exporter = CountExporter::new(
        LatestStore::new(temp_dir.path().join("latest.json")),
        Arc::new(StalledHistory),
        Duration::from_millis(100),
    );

    let started = std::time::Instant::now();
    let outcome = exporter.export(&sample(at(10, 0), 1, 0)).await;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(outcome.latest, SinkResult::Written);
    assert_eq!(outcome.history, SinkResult::TimedOut);
}
