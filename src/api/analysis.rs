use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use futures_util::stream::Stream;
use uuid::Uuid;

use crate::api::{internal_error, into_sse, ApiError};
use crate::state::AppState;

/// POST /api/repositories/{id}/analyze - Run an analysis, streaming progress
/// as SSE. Ends with one `complete`, `failed` or `in_progress` event.
pub async fn analyze_repository(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let repository = state
        .store
        .get_repository(id)
        .await
        .map_err(internal_error)?
        .ok_or((StatusCode::NOT_FOUND, format!("repository not found: {id}")))?;

    tracing::info!("Analysis requested for {}", repository.full_name);
    Ok(into_sse(state.pipeline.run_analysis(repository.id)))
}
