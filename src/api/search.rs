use std::convert::Infallible;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::Json;
use futures_util::stream::Stream;

use crate::api::{into_sse, ApiError};
use crate::models::QueryContext;
use crate::search::validate_query;
use crate::state::AppState;

/// POST /api/search - Classify, match and rank, streaming progress as SSE.
/// Ends with one `complete` or `failed` event.
pub async fn search(
    State(state): State<AppState>,
    Json(context): Json<QueryContext>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    check_query(&context.query)?;
    Ok(into_sse(state.search.search(context)))
}

fn check_query(query: &str) -> Result<(), ApiError> {
    if query.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Query is required".to_string()));
    }
    validate_query(query)
        .map(|_| ())
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::MAX_QUERY_CHARS;

    #[test]
    fn test_check_query() {
        assert!(check_query("where is login handled").is_ok());

        let (status, message) = check_query("  ").unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(message, "Query is required");

        let (status, message) = check_query(&"x".repeat(MAX_QUERY_CHARS + 1)).unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(message.contains("1000"));
    }
}
