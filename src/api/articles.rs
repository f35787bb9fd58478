//! Article API endpoints
//!
//! - GET /api/v1/home - Newest articles, tags and total likes
//! - GET /api/v1/articles - Filtered, sorted, paginated listing
//! - GET /api/v1/articles/{id} - Article detail with comments
//! - POST /api/v1/articles - Create article
//! - PUT /api/v1/articles/{id} - Update article (author only)
//! - DELETE /api/v1/articles/{id} - Delete article (author only)
//! - POST /api/v1/articles/{id}/like - Toggle like
//! - GET /api/v1/articles/{id}/likes/count - Like count

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, Viewer};
use crate::models::{ArticleView, Comment, CreateArticleInput, LikeStatus, UpdateArticleInput};
use crate::services::{HomePage, ListingQuery};

/// Query parameters for listing articles.
///
/// Everything is taken as text: a malformed page falls back to page 1.
#[derive(Debug, Default, Deserialize)]
pub struct ListArticlesQuery {
    pub page: Option<String>,
    pub search: Option<String>,
    pub tag: Option<String>,
    pub sort: Option<String>,
}

/// Response for article list
#[derive(Debug, Serialize)]
pub struct ArticleListResponse {
    pub articles: Vec<ArticleView>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
    pub sort: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// Article detail with its comments
#[derive(Debug, Serialize)]
pub struct ArticleDetailResponse {
    #[serde(flatten)]
    pub view: ArticleView,
    pub comments: Vec<Comment>,
}

#[derive(Debug, Serialize)]
pub struct LikeCountResponse {
    pub likes_count: i64,
}

/// Page number from a raw query value. Missing or unparsable means 1;
/// values below 1 are clamped by the listing service.
pub fn parse_page(raw: Option<&str>) -> i64 {
    raw.and_then(|p| p.trim().parse::<i64>().ok()).unwrap_or(1)
}

/// GET /api/v1/home
pub async fn home(
    State(state): State<AppState>,
    viewer: Viewer,
) -> Result<Json<HomePage>, ApiError> {
    Ok(Json(state.listing_service.home(viewer.id()).await?))
}

/// GET /api/v1/articles
pub async fn list_articles(
    State(state): State<AppState>,
    viewer: Viewer,
    Query(params): Query<ListArticlesQuery>,
) -> Result<Json<ArticleListResponse>, ApiError> {
    let query = ListingQuery::parse(
        params.search.as_deref(),
        params.tag.as_deref(),
        params.sort.as_deref(),
    )?;
    let page = parse_page(params.page.as_deref());

    let result = state
        .listing_service
        .list_articles(&query, page, viewer.id())
        .await?;

    Ok(Json(ArticleListResponse {
        articles: result.items,
        total: result.total,
        page: result.page,
        page_size: result.per_page,
        total_pages: result.total_pages,
        sort: query.sort.to_string(),
        search: query.search,
        tag: query.tag,
    }))
}

/// GET /api/v1/articles/{id}
pub async fn get_article(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<i64>,
) -> Result<Json<ArticleDetailResponse>, ApiError> {
    let view = state
        .listing_service
        .detail(id, viewer.id())
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Article not found: {}", id)))?;
    let comments = state.comment_service.list_for_article(id).await?;

    Ok(Json(ArticleDetailResponse { view, comments }))
}

/// POST /api/v1/articles
pub async fn create_article(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<CreateArticleInput>,
) -> Result<(StatusCode, Json<ArticleView>), ApiError> {
    let article = state.article_service.create(&user, body).await?;
    let view = annotated(&state, article.id, user.id).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// PUT /api/v1/articles/{id}
pub async fn update_article(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateArticleInput>,
) -> Result<Json<ArticleView>, ApiError> {
    state.article_service.update(&user, id, body).await?;
    Ok(Json(annotated(&state, id, user.id).await?))
}

/// DELETE /api/v1/articles/{id}
pub async fn delete_article(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.article_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/articles/{id}/like
pub async fn toggle_like(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<LikeStatus>, ApiError> {
    Ok(Json(state.like_service.toggle(user.id, id).await?))
}

/// GET /api/v1/articles/{id}/likes/count
pub async fn like_count(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<LikeCountResponse>, ApiError> {
    let likes_count = state.like_service.count(id).await?;
    Ok(Json(LikeCountResponse { likes_count }))
}

async fn annotated(state: &AppState, id: i64, viewer: i64) -> Result<ArticleView, ApiError> {
    state
        .listing_service
        .detail(id, Some(viewer))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Article not found: {}", id)))
}
