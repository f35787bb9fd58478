//! Comment API endpoints
//!
//! - GET /api/v1/articles/{id}/comments - Comments on an article, oldest first
//! - POST /api/v1/articles/{id}/comments - Post a comment

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{Comment, CreateCommentInput};

#[derive(Debug, Serialize)]
pub struct CommentListResponse {
    pub comments: Vec<Comment>,
}

pub async fn list_comments(
    State(state): State<AppState>,
    Path(article_id): Path<i64>,
) -> Result<Json<CommentListResponse>, ApiError> {
    let comments = state.comment_service.list_for_article(article_id).await?;
    Ok(Json(CommentListResponse { comments }))
}

pub async fn create_comment(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(article_id): Path<i64>,
    Json(body): Json<CreateCommentInput>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    let comment = state.comment_service.create(&user, article_id, body).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}
