use super::*;
use crate::camera::SyntheticFrameSource;
use crate::config::RoomcountConfig;
use crate::error::{ModeError, RoomcountError, SetupError, StorageError};
use crate::mode::{CameraMode, MemoryModeToken, ModeCoordinator};
use std::sync::Arc;
use tempfile::TempDir;

const RESOLUTION: (u32, u32) = (1280, 720);

#[test]
fn test_region_validation() {
    assert!(RegionConfig::new(100, 100, 200, 150).validate(RESOLUTION).is_ok());
    assert!(RegionConfig::new(0, 0, 1280, 720).validate(RESOLUTION).is_ok());

    for region in [
        RegionConfig::new(0, 0, 0, 10),
        RegionConfig::new(0, 0, 10, -1),
        RegionConfig::new(-1, 0, 10, 10),
        RegionConfig::new(1200, 0, 100, 10),
        RegionConfig::new(0, 700, 10, 21),
        RegionConfig::new(i32::MAX, 0, i32::MAX, 10),
    ] {
        assert!(
            matches!(
                region.validate(RESOLUTION),
                Err(SetupError::InvalidRegion { .. })
            ),
            "{:?} should be rejected",
            region
        );
    }
}

#[test]
fn test_region_polygon_is_clockwise_from_top_left() {
    let polygon = RegionConfig::new(100, 100, 200, 150).polygon();
    let corners: Vec<(i32, i32)> = polygon.iter().map(|p| (p.x, p.y)).collect();
    assert_eq!(corners, vec![(100, 100), (300, 100), (300, 250), (100, 250)]);
}

#[test]
fn test_direction_documents() {
    let full: DirectionConfig =
        serde_json::from_str(r#"{"entry":"right_to_left","angle":180}"#).unwrap();
    assert_eq!(full, DirectionConfig::new(EntryDirection::RightToLeft));
    assert!(full.swaps_tracker_counts());

    let angle_only: DirectionConfig = serde_json::from_str(r#"{"angle":0}"#).unwrap();
    assert_eq!(angle_only.entry, EntryDirection::LeftToRight);
    assert!(!angle_only.swaps_tracker_counts());

    let entry_only: DirectionConfig = serde_json::from_str(r#"{"entry":"right_to_left"}"#).unwrap();
    assert_eq!(entry_only.angle, 180);

    assert!(serde_json::from_str::<DirectionConfig>(r#"{"entry":"left_to_right","angle":180}"#).is_err());
    assert!(serde_json::from_str::<DirectionConfig>(r#"{"angle":90}"#).is_err());
    assert!(serde_json::from_str::<DirectionConfig>("{}").is_err());

    let written = serde_json::to_value(DirectionConfig::new(EntryDirection::LeftToRight)).unwrap();
    assert_eq!(written, serde_json::json!({"entry": "left_to_right", "angle": 0}));
}

#[test]
fn test_entry_direction_parsing() {
    assert_eq!("rtl".parse::<EntryDirection>().unwrap(), EntryDirection::RightToLeft);
    assert_eq!(
        "Left-To-Right".parse::<EntryDirection>().unwrap(),
        EntryDirection::LeftToRight
    );
    assert!("up".parse::<EntryDirection>().is_err());
}

#[tokio::test]
async fn test_store_documents_are_independent() {
    let temp_dir = TempDir::new().unwrap();
    let store = ConfigStore::new(temp_dir.path(), RESOLUTION);

    assert_eq!(store.load_region().await.unwrap(), None);
    assert_eq!(store.missing().await.unwrap(), vec!["region", "direction"]);

    let region = RegionConfig::new(100, 100, 200, 150);
    store.save_region(&region).await.unwrap();
    assert_eq!(store.load_region().await.unwrap(), Some(region));
    assert_eq!(store.missing().await.unwrap(), vec!["direction"]);
    assert!(!store.is_complete().await.unwrap());

    let direction = DirectionConfig::new(EntryDirection::LeftToRight);
    store.save_direction(&direction).await.unwrap();
    let setup = store.load_complete().await.unwrap();
    assert_eq!(setup.region, region);
    assert_eq!(setup.direction, direction);

    assert!(store.clear::<RegionConfig>().await.unwrap());
    assert!(!store.clear::<RegionConfig>().await.unwrap());
    assert_eq!(store.load_direction().await.unwrap(), Some(direction));

    match store.load_complete().await.unwrap_err() {
        RoomcountError::Mode(ModeError::IncompleteConfig { missing }) => {
            assert_eq!(missing, vec!["region"])
        }
        other => panic!("unexpected error {:?}", other),
    }

    store.clear_all().await.unwrap();
    assert_eq!(store.missing().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_store_rejects_out_of_frame_region() {
    let temp_dir = TempDir::new().unwrap();
    let store = ConfigStore::new(temp_dir.path(), RESOLUTION);

    let err = store
        .save_region(&RegionConfig::new(1200, 600, 200, 200))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RoomcountError::Setup(SetupError::InvalidRegion { .. })
    ));
    assert_eq!(store.load_region().await.unwrap(), None);
}

#[tokio::test]
async fn test_store_reports_unreadable_document() {
    let temp_dir = TempDir::new().unwrap();
    let store = ConfigStore::new(temp_dir.path(), RESOLUTION);
    std::fs::write(temp_dir.path().join("region.json"), "{not json").unwrap();

    let err = store.load_region().await.unwrap_err();
    assert!(matches!(
        err,
        RoomcountError::Storage(StorageError::ReadFailure { .. })
    ));
}

fn session_in(temp_dir: &TempDir) -> (SetupSession, ModeCoordinator) {
    let config = RoomcountConfig::rooted_at(temp_dir.path());
    let coordinator = ModeCoordinator::new(
        Arc::new(MemoryModeToken::default()),
        ConfigStore::from_config(&config),
    );
    let mut camera_config = config.camera.clone();
    camera_config.fps = 100;
    let session = SetupSession::new(
        coordinator.clone(),
        Box::new(SyntheticFrameSource::new(camera_config)),
        &config.storage.reference_image_path,
    );
    (session, coordinator)
}

#[tokio::test]
async fn test_session_workflow() {
    let temp_dir = TempDir::new().unwrap();
    let (mut session, coordinator) = session_in(&temp_dir);

    assert_eq!(session.begin().await.unwrap(), CameraMode::Idle);

    let still = session.capture_reference().await.unwrap();
    let written = std::fs::read(session.reference_image_path()).unwrap();
    assert_eq!(written.as_slice(), still.data.as_slice());

    session
        .save_region(&RegionConfig::new(100, 100, 200, 150))
        .await
        .unwrap();
    session
        .save_direction(&DirectionConfig::new(EntryDirection::RightToLeft))
        .await
        .unwrap();
    session.finish().await.unwrap();

    assert_eq!(coordinator.current().await.unwrap(), CameraMode::Counting);

    // reconfiguring takes the camera back from counting
    assert_eq!(session.begin().await.unwrap(), CameraMode::Counting);
    session.clear().await.unwrap();
    assert!(session.finish().await.is_err());
    session.abandon().await.unwrap();
    assert_eq!(coordinator.current().await.unwrap(), CameraMode::Idle);
}

#[tokio::test]
async fn test_session_requires_configuring() {
    let temp_dir = TempDir::new().unwrap();
    let (mut session, _coordinator) = session_in(&temp_dir);

    let err = session
        .save_region(&RegionConfig::new(0, 0, 10, 10))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RoomcountError::Mode(ModeError::NotConfiguring {
            current: CameraMode::Idle
        })
    ));

    assert!(session.capture_reference().await.is_err());
    assert!(!session.reference_image_path().exists());
}
