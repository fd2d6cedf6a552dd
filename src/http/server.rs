use crate::{
    aggregate::CountAggregator,
    config::{HttpConfig, RoomcountConfig},
    error::{Result, RoomcountError},
    export::LatestStore,
    mode::ModeCoordinator,
    supervisor::Supervisor,
};
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::handlers::{
    config_handler, health_handler, history_csv_handler, history_handler, latest_handler,
    mode_handler,
};

/// Shared state for the Axum server
#[derive(Clone)]
pub struct ApiState {
    pub(crate) coordinator: ModeCoordinator,
    pub(crate) aggregator: CountAggregator,
    pub(crate) latest: LatestStore,
    pub(crate) supervisor: Option<Arc<Supervisor>>,
}

impl ApiState {
    pub fn new(
        coordinator: ModeCoordinator,
        aggregator: CountAggregator,
        latest: LatestStore,
    ) -> Self {
        Self {
            coordinator,
            aggregator,
            latest,
            supervisor: None,
        }
    }

    pub fn from_config(config: &RoomcountConfig) -> Result<Self> {
        Ok(Self::new(
            ModeCoordinator::from_config(config),
            CountAggregator::from_config(config)?,
            LatestStore::new(&config.storage.latest_path),
        ))
    }

    /// Report worker status from a running supervisor on `/health`
    pub fn with_supervisor(mut self, supervisor: Arc<Supervisor>) -> Self {
        self.supervisor = Some(supervisor);
        self
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/mode", get(mode_handler))
        .route("/config", get(config_handler))
        .route("/latest", get(latest_handler))
        .route("/history", get(history_handler))
        .route("/history.csv", get(history_csv_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// HTTP server for the query API
pub struct ApiServer {
    pub(crate) config: HttpConfig,
    pub(crate) state: ApiState,
}

impl ApiServer {
    pub fn new(config: HttpConfig, state: ApiState) -> Self {
        Self { config, state }
    }

    /// Serve until `shutdown` is cancelled
    pub async fn start(&self, shutdown: CancellationToken) -> Result<()> {
        let app = router(self.state.clone());
        let addr = format!("{}:{}", self.config.ip, self.config.port);

        info!("Starting query API server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            RoomcountError::component("http".to_string(), format!("bind {} failed: {}", addr, e))
        })?;

        info!("Query API listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| RoomcountError::component("http".to_string(), format!("server error: {}", e)))?;

        info!("Query API server stopped");
        Ok(())
    }
}
