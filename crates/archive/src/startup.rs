use crate::{
    db, get_stations, history, history_frames, routes, ArchiveAccess, JsonStationCatalog,
    ShardArena, StationCatalog, WeatherArchive,
};
use anyhow::anyhow;
use axum::{
    body::Body,
    extract::Request,
    middleware::{self, Next},
    response::IntoResponse,
    routing::get,
    Router,
};
use hyper::{
    header::{ACCEPT, CONTENT_TYPE},
    Method,
};
use log::{info, warn};
use std::{sync::Arc, time::Duration};
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};
use weathersg_core::is_directory;

#[derive(Clone)]
pub struct AppState {
    pub archive: Arc<dyn WeatherArchive>,
    pub catalog: Arc<dyn StationCatalog>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::history::readings::history,
        routes::history::readings::history_frames,
        routes::catalog::get_stations,
    ),
    components(
        schemas(
            db::Reading,
            db::StationAverage,
            db::EnrichedReading,
            db::WindComponents,
            db::Measurement,
            db::Channel,
            db::HeatmapMode,
            crate::Station,
            crate::StationLocation,
            routes::history::ErrorBody,
            routes::history::readings::HistoryResponse,
        )
    ),
    tags(
        (name = "weathersg archive api", description = "historical station readings sampled on an interval grid across yearly shards")
    )
)]
struct ApiDoc;

pub async fn build_app_state(
    archive_dir: String,
    stations_file: Option<String>,
    rainfall_stations_file: Option<String>,
    query_timeout: Duration,
) -> Result<AppState, anyhow::Error> {
    if !is_directory(&archive_dir) {
        warn!(
            "archive directory {} does not exist, every request will fail until shards are added",
            archive_dir
        );
    }

    let arena = Arc::new(
        ShardArena::open(archive_dir).map_err(|e| anyhow!("error opening shard hub: {}", e))?,
    );
    let archive = Arc::new(ArchiveAccess::new(arena, query_timeout));

    let catalog = Arc::new(
        JsonStationCatalog::from_files(
            stations_file.as_deref(),
            rainfall_stations_file.as_deref(),
        )
        .map_err(|e| anyhow!("error loading station catalog: {}", e))?,
    );

    Ok(AppState { archive, catalog })
}

pub fn app(app_state: AppState) -> Router {
    let api_docs = ApiDoc::openapi();
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE])
        .allow_origin(Any);

    Router::new()
        .route("/api", get(history))
        .route("/api/frames", get(history_frames))
        .route("/stations", get(get_stations))
        .with_state(Arc::new(app_state))
        .layer(middleware::from_fn(log_request))
        .merge(Scalar::with_url("/docs", api_docs))
        .layer(cors)
}

async fn log_request(request: Request<Body>, next: Next) -> impl IntoResponse {
    let now = time::OffsetDateTime::now_utc();
    let path = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or_default()
        .to_owned();
    info!(target: "http_request", "new request, {} {}", request.method().as_str(), path);

    let response = next.run(request).await;
    let response_time = time::OffsetDateTime::now_utc() - now;
    info!(target: "http_response", "response, code: {}, time: {}, path: {}", response.status().as_str(), response_time, path);

    response
}
