use axum::{
    extract::{Query, State},
    Json,
};
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use super::ApiError;
use crate::{
    average_frames, canonical_timestamp, channel_frames, flatten, parse_request_timestamp,
    AppState, ChannelFrames, EnrichedReading, HeatmapMode, Interval, Measurement, QueryRequest,
    Reading, StationAverage,
};

/// Query string of the history endpoints, as the dashboard sends it
#[derive(Clone, Debug, Default, Deserialize, Serialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct HistoryParams {
    /// Range start, `YYYY-MM-DD HH:MM`
    pub start_date: Option<String>,
    /// Range end (inclusive), `YYYY-MM-DD HH:MM`
    pub end_date: Option<String>,
    /// `{N}min`, `{N}h`, `{N}day`, `{N}month` or `{N}year`
    pub interval: Option<String>,
    /// Comma separated measurement tables, defaults to all of them
    pub param: Option<String>,
    /// `snapshot` (default) or `average`
    pub heatmap_mode: Option<String>,
}

impl HistoryParams {
    pub fn to_request(&self) -> Result<QueryRequest, ApiError> {
        let (Some(start), Some(end), Some(interval)) =
            (&self.start_date, &self.end_date, &self.interval)
        else {
            return Err(ApiError::MissingParameters);
        };
        if [start, end, interval].iter().any(|v| v.trim().is_empty()) {
            return Err(ApiError::MissingParameters);
        }

        let mode = match &self.heatmap_mode {
            Some(mode) => mode.parse::<HeatmapMode>()?,
            None => HeatmapMode::default(),
        };
        let start = parse_request_timestamp(start)?;
        let end = parse_request_timestamp(end)?;

        let request = match mode {
            HeatmapMode::Snapshot => {
                let interval: Interval = interval.parse()?;
                let parameters = Measurement::parse_list(self.param.as_deref())?;
                QueryRequest::snapshot(start, end, interval, parameters)?
            }
            // the interval is still required on the wire, but the mean ignores it
            HeatmapMode::Average => QueryRequest::average(start, end)?,
        };
        Ok(request)
    }
}

/// Flat body of `GET /api`
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum HistoryResponse {
    Readings(Vec<Reading>),
    Averages(Vec<StationAverage>),
}

#[utoipa::path(
    get,
    path = "/api",
    params(HistoryParams),
    responses(
        (status = OK, description = "Grid-aligned readings of every requested table, concatenated in request order; per-station rainfall means in average mode", content_type = "application/json", body = HistoryResponse),
        (status = BAD_REQUEST, description = "Missing parameters, malformed dates or an unsupported interval", body = super::ErrorBody),
        (status = INTERNAL_SERVER_ERROR, description = "A shard could not be opened or a query failed", body = super::ErrorBody)
    ))]
pub async fn history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let request = params.to_request()?;
    info!(
        "history {:?} from {} to {} every {} for {:?}",
        request.mode,
        request.start,
        request.end,
        params.interval.as_deref().unwrap_or_default(),
        request.parameters
    );

    let body = match request.mode {
        HeatmapMode::Snapshot => {
            HistoryResponse::Readings(flatten(state.archive.snapshot(&request).await?))
        }
        HeatmapMode::Average => HistoryResponse::Averages(state.archive.averages(&request).await?),
    };
    Ok(Json(body))
}

#[utoipa::path(
    get,
    path = "/api/frames",
    params(HistoryParams),
    responses(
        (status = OK, description = "Readings grouped into timestamp frames per map layer (wind, temperature, humidity, rainfall), each reading placed against the station catalog", content_type = "application/json", body = std::collections::BTreeMap<String, Vec<Vec<EnrichedReading>>>),
        (status = BAD_REQUEST, description = "Missing parameters, malformed dates or an unsupported interval", body = super::ErrorBody),
        (status = INTERNAL_SERVER_ERROR, description = "A shard could not be opened or a query failed", body = super::ErrorBody)
    ))]
pub async fn history_frames(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<ChannelFrames>, ApiError> {
    let request = params.to_request()?;
    let catalog = state.catalog.as_ref();

    let frames = match request.mode {
        HeatmapMode::Snapshot => {
            let results = state.archive.snapshot(&request).await?;
            channel_frames(&results, catalog)
        }
        HeatmapMode::Average => {
            let averages = state.archive.averages(&request).await?;
            average_frames(&averages, &canonical_timestamp(request.start), catalog)
        }
    };
    Ok(Json(frames))
}
