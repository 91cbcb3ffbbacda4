use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::search::SearchError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Search(#[from] SearchError),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Search(SearchError::EmptyQuery) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Search(SearchError::WorkerGone) => {
                tracing::error!("Search request arrived after the worker stopped");
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
