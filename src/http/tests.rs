use super::*;
use crate::config::RoomcountConfig;
use crate::counting::{CountSample, RunEpoch};
use crate::export::{HistoryStore, JsonlHistoryStore, LatestStore};
use crate::mode::CameraMode;
use crate::setup::{ConfigStore, RegionConfig};
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::{TimeZone, Utc};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApi {
    _temp_dir: TempDir,
    config: RoomcountConfig,
    state: ApiState,
}

impl TestApi {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config = RoomcountConfig::rooted_at(temp_dir.path());
        let state = ApiState::from_config(&config).unwrap();
        Self {
            _temp_dir: temp_dir,
            config,
            state,
        }
    }

    async fn get(&self, uri: &str) -> (StatusCode, String) {
        let response = router(self.state.clone())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let (status, body) = self.get(uri).await;
        (status, serde_json::from_str(&body).unwrap())
    }

    async fn seed_history(&self) {
        let history = JsonlHistoryStore::new(&self.config.storage.history_dir);
        let epoch = RunEpoch::new();
        for (minute, in_count, out_count) in [(0, 1, 0), (5, 3, 1), (65, 6, 2)] {
            let ts = Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap()
                + chrono::Duration::minutes(minute);
            history
                .append(&CountSample::new(ts, in_count, out_count, in_count, Some(epoch)))
                .await
                .unwrap();
        }
        history.sync().await.unwrap();
    }
}

#[tokio::test]
async fn test_health_reports_mode() {
    let api = TestApi::new();
    let (status, body) = api.get_json("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["mode"], "idle");
    assert!(body["worker"].is_null());
}

#[tokio::test]
async fn test_mode_follows_token() {
    let api = TestApi::new();
    api.state.coordinator.claim_configuring().await.unwrap();

    let (status, body) = api.get_json("/mode").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], serde_json::to_value(CameraMode::Configuring).unwrap());
}

#[tokio::test]
async fn test_config_lists_missing_documents() {
    let api = TestApi::new();
    ConfigStore::from_config(&api.config)
        .save_region(&RegionConfig::new(100, 100, 200, 150))
        .await
        .unwrap();

    let (status, body) = api.get_json("/config").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["complete"], false);
    assert_eq!(body["missing"], serde_json::json!(["direction"]));
    assert_eq!(body["region"]["w"], 200);
    assert!(body["direction"].is_null());
}

#[tokio::test]
async fn test_latest_not_found_until_exported() {
    let api = TestApi::new();
    let (status, _) = api.get_json("/latest").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    LatestStore::new(&api.config.storage.latest_path)
        .write(&CountSample::new(Utc::now(), 10, 3, 13, None))
        .await
        .unwrap();

    let (status, body) = api.get_json("/latest").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["in"], 10);
    assert_eq!(body["out"], 3);
    assert_eq!(body["current"], 7);
}

#[tokio::test]
async fn test_history_buckets_explicit_range() {
    let api = TestApi::new();
    api.seed_history().await;

    let (status, body) = api
        .get_json("/history?start=2024-03-04T00:00:00Z&end=2024-03-05T00:00:00Z&granularity=1h")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["granularity"], "1h");

    let buckets = body["buckets"].as_array().unwrap();
    assert_eq!(buckets.len(), 2);
    assert_eq!(buckets[0]["in_count"], 3);
    assert_eq!(buckets[0]["in_delta"], 3);
    assert_eq!(buckets[1]["in_count"], 6);
    assert_eq!(buckets[1]["in_delta"], 3);
}

#[tokio::test]
async fn test_history_rejects_bad_parameters() {
    let api = TestApi::new();

    let (status, body) = api.get_json("/history?preset=fortnight").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("fortnight"));

    let (status, _) = api.get_json("/history?granularity=5min").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = api.get_json("/history?start=yesterday-ish").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = api
        .get_json("/history?preset=today&start=2024-03-04T00:00:00Z")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_history_preset_on_empty_store() {
    let api = TestApi::new();
    let (status, body) = api.get_json("/history?preset=today").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["granularity"], "10min");
    assert!(body["buckets"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_history_csv_export() {
    let api = TestApi::new();
    api.seed_history().await;

    let (status, body) = api
        .get("/history.csv?start=2024-03-04&end=2024-03-05&granularity=1d")
        .await;
    assert_eq!(status, StatusCode::OK);

    let mut lines = body.lines();
    assert_eq!(
        lines.next(),
        Some("timestamp,in_count,out_count,current_count,total_tracks,in_delta,run_epoch")
    );
    assert_eq!(lines.count(), 1);
}
