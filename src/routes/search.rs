use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{MediaType, SessionSnapshot},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub q: String,
    /// Optional filter: movie, series or episode.
    #[serde(default)]
    pub r#type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchAccepted {
    pub session_id: Uuid,
}

/// POST /api/search: starts a search; results arrive over /ws
pub async fn submit_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<(StatusCode, Json<SearchAccepted>)> {
    let media_type = match req.r#type.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(t) => Some(
            t.parse::<MediaType>()
                .map_err(|e| AppError::BadRequest(e.to_string()))?,
        ),
    };

    let session_id = state.search.submit_search(&req.q, media_type)?;
    Ok((StatusCode::ACCEPTED, Json(SearchAccepted { session_id })))
}

/// GET /api/search: latest snapshot of the active or last search
pub async fn current_search(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.search.snapshot())
}

/// DELETE /api/search: abandon the active search
pub async fn cancel_search(State(state): State<AppState>) -> StatusCode {
    state.search.cancel_active_search();
    StatusCode::NO_CONTENT
}
