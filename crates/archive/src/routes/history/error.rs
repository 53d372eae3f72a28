use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::error;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db;

pub const MISSING_PARAMETERS: &str = "Missing required query parameters";
pub const INTERNAL_ERROR: &str = "Internal Server Error";

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{}", MISSING_PARAMETERS)]
    MissingParameters,
    #[error(transparent)]
    Archive(#[from] db::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::MissingParameters => (StatusCode::BAD_REQUEST, MISSING_PARAMETERS.to_owned()),
            ApiError::Archive(e) if e.is_caller_error() => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Archive(e) => {
                error!("error answering history request: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR.to_owned())
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}
