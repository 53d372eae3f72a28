use axum::{extract::State, Json};
use std::sync::Arc;

use crate::{AppState, Station};

#[utoipa::path(
    get,
    path = "/stations",
    responses(
        (status = OK, description = "Stations readings are placed against", content_type = "application/json", body = Vec<Station>),
    ))]
pub async fn get_stations(State(state): State<Arc<AppState>>) -> Json<Vec<Station>> {
    Json(state.catalog.stations())
}
