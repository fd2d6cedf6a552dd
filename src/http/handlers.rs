use crate::aggregate::{parse_instant, Granularity, RangePreset, TimeRange, TimeSeries};
use crate::error::RoomcountError;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};

use super::server::ApiState;

/// Failure rendered as a JSON body with a matching status code
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(RoomcountError),
}

impl From<RoomcountError> for ApiError {
    fn from(err: RoomcountError) -> Self {
        ApiError::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Internal(err) => {
                error!("Query API request failed: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// `/history` and `/history.csv` parameters: a preset, or explicit bounds
/// with an optional bucket width
#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub preset: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub granularity: Option<String>,
}

pub async fn health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let mode = state.coordinator.current().await;
    let worker = match &state.supervisor {
        Some(supervisor) => Some(supervisor.status().await),
        None => None,
    };

    let body = json!({
        "status": if mode.is_ok() { "ok" } else { "degraded" },
        "service": "roomcount",
        "mode": mode.as_ref().ok(),
        "worker": worker,
    });
    (StatusCode::OK, Json(body))
}

pub async fn mode_handler(State(state): State<ApiState>) -> ApiResult<impl IntoResponse> {
    let mode = state.coordinator.current().await?;
    Ok(Json(json!({ "mode": mode })))
}

pub async fn config_handler(State(state): State<ApiState>) -> ApiResult<impl IntoResponse> {
    let store = state.coordinator.config_store();
    let region = store.load_region().await?;
    let direction = store.load_direction().await?;
    let missing = store.missing().await?;

    Ok(Json(json!({
        "resolution": store.resolution(),
        "region": region,
        "direction": direction,
        "complete": missing.is_empty(),
        "missing": missing,
    })))
}

pub async fn latest_handler(State(state): State<ApiState>) -> ApiResult<impl IntoResponse> {
    match state.latest.read().await? {
        Some(snapshot) => Ok(Json(snapshot)),
        None => Err(ApiError::NotFound("no count exported yet".to_string())),
    }
}

pub async fn history_handler(
    State(state): State<ApiState>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<impl IntoResponse> {
    let series = query_series(&state, &params).await?;
    Ok(Json(series))
}

pub async fn history_csv_handler(
    State(state): State<ApiState>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<impl IntoResponse> {
    let series = query_series(&state, &params).await?;
    let csv = series.to_csv(state.aggregator.timezone());

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"roomcount.csv\"",
            ),
        ],
        csv,
    ))
}

async fn query_series(state: &ApiState, params: &HistoryParams) -> ApiResult<TimeSeries> {
    let tz = state.aggregator.timezone();
    let granularity = params
        .granularity
        .as_deref()
        .map(str::parse::<Granularity>)
        .transpose()
        .map_err(ApiError::BadRequest)?;

    if let Some(preset) = params.preset.as_deref() {
        if params.start.is_some() || params.end.is_some() {
            return Err(ApiError::BadRequest(
                "preset cannot be combined with start/end".to_string(),
            ));
        }
        let preset: RangePreset = preset.parse().map_err(ApiError::BadRequest)?;
        let range = preset.resolve(Utc::now(), tz);
        let granularity = granularity.unwrap_or_else(|| preset.granularity());
        debug!("History query: preset {} at {}", preset, granularity);
        return Ok(state.aggregator.query(range, granularity).await?);
    }

    let start = params
        .start
        .as_deref()
        .map(|value| parse_instant(value, tz))
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let end = params
        .end
        .as_deref()
        .map(|value| parse_instant(value, tz))
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let range = TimeRange::new(start, end);

    let series = match granularity {
        Some(granularity) => state.aggregator.query(range, granularity).await?,
        None => state.aggregator.query_auto(range).await?,
    };
    Ok(series)
}
