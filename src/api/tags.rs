//! Tag API endpoints
//!
//! - GET /api/v1/tags - All tags ordered by name

use axum::{extract::State, Json};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState};
use crate::models::Tag;

/// Response for tag list
#[derive(Debug, Serialize)]
pub struct TagListResponse {
    pub tags: Vec<Tag>,
}

pub async fn list_tags(State(state): State<AppState>) -> Result<Json<TagListResponse>, ApiError> {
    let tags = state.tag_repo.list(None).await.map_err(|e| {
        tracing::error!("Failed to list tags: {:#}", e);
        ApiError::new("STORE_UNAVAILABLE", "Tag store is unavailable")
    })?;
    Ok(Json(TagListResponse { tags }))
}
