use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::api::{internal_error, ApiError};
use crate::models::{Analysis, Repository, SaveRepositoryRequest};
use crate::state::AppState;

/// GET /api/repositories
pub async fn list_repositories(
    State(state): State<AppState>,
) -> Result<Json<Vec<Repository>>, ApiError> {
    let mut repositories = state.store.list_repositories().await.map_err(internal_error)?;
    repositories.sort_by(|a, b| a.full_name.cmp(&b.full_name));
    Ok(Json(repositories))
}

/// `owner/name`, both parts non-empty, nothing else
fn valid_full_name(full_name: &str) -> bool {
    match full_name.split_once('/') {
        Some((owner, name)) => {
            !owner.is_empty()
                && !name.is_empty()
                && !name.contains('/')
                && !full_name.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

/// POST /api/repositories - Register a repository, or update the stored one
/// with the same `full_name`.
pub async fn save_repository(
    State(state): State<AppState>,
    Json(req): Json<SaveRepositoryRequest>,
) -> Result<(StatusCode, Json<Repository>), ApiError> {
    let full_name = req.full_name.trim().trim_end_matches(".git").to_string();
    if !valid_full_name(&full_name) {
        return Err((
            StatusCode::BAD_REQUEST,
            "full_name must look like owner/name".to_string(),
        ));
    }

    let existing = state
        .store
        .find_repository_by_name(&full_name)
        .await
        .map_err(internal_error)?;
    let (status, mut repository) = match existing {
        Some(repository) => (StatusCode::OK, repository),
        None => (StatusCode::CREATED, Repository::new(&full_name)),
    };
    repository.description = req.description.or(repository.description);
    repository.primary_language = req.primary_language.or(repository.primary_language);
    repository.stars = req.stars;
    repository.forks = req.forks;

    let saved = state
        .store
        .save_repository(repository)
        .await
        .map_err(internal_error)?;
    tracing::info!("Saved repository {} ({})", saved.full_name, saved.id);
    Ok((status, Json(saved)))
}

/// GET /api/repositories/{id}
pub async fn get_repository(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Repository>, ApiError> {
    state
        .store
        .get_repository(id)
        .await
        .map_err(internal_error)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, format!("repository not found: {id}")))
}

/// GET /api/repositories/{id}/analysis - Most recent analysis, in any state
pub async fn latest_analysis(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Analysis>, ApiError> {
    state
        .store
        .latest_analysis(id)
        .await
        .map_err(internal_error)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, format!("no analysis for repository {id}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_full_name() {
        assert!(valid_full_name("vercel/next.js"));
        assert!(!valid_full_name("vercel"));
        assert!(!valid_full_name("/next.js"));
        assert!(!valid_full_name("vercel/"));
        assert!(!valid_full_name("a/b/c"));
        assert!(!valid_full_name("a b/c"));
    }
}
