//! API middleware
//!
//! Shared state, the JSON error type, and session authentication.
//!
//! Requests authenticate with a session token sent either as
//! `Authorization: Bearer <token>` or as the `session` cookie. `require_auth`
//! rejects requests without a valid session; `optional_auth` attaches the user
//! when one is present and lets anonymous requests through.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;

use crate::config::Config;
use crate::db::repositories::{
    SqlxArticleRepository, SqlxCommentRepository, SqlxLikeRepository, SqlxSessionRepository,
    SqlxTagRepository, SqlxUserRepository, TagRepository,
};
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    ArticleListingService, ArticleService, ArticleServiceError, CommentService,
    CommentServiceError, LikeService, LikeServiceError, ListingError, UserService,
    UserServiceError,
};

/// Name of the cookie carrying the session token
pub const SESSION_COOKIE: &str = "session";

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub listing_service: Arc<ArticleListingService>,
    pub article_service: Arc<ArticleService>,
    pub like_service: Arc<LikeService>,
    pub comment_service: Arc<CommentService>,
    pub user_service: Arc<UserService>,
    pub tag_repo: Arc<dyn TagRepository>,
    /// Lifetime of issued sessions, mirrored in the cookie's `Max-Age`
    pub session_days: i64,
}

impl AppState {
    /// Wire repositories and services over one pool.
    pub fn build(pool: DynDatabasePool, config: &Config) -> Self {
        let article_repo = SqlxArticleRepository::boxed(pool.clone());
        let tag_repo = SqlxTagRepository::boxed(pool.clone());
        let like_repo = SqlxLikeRepository::boxed(pool.clone());
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());
        let comment_repo = SqlxCommentRepository::boxed(pool);

        Self {
            listing_service: Arc::new(ArticleListingService::new(
                article_repo.clone(),
                tag_repo.clone(),
                like_repo.clone(),
                user_repo.clone(),
                config.listing,
            )),
            article_service: Arc::new(ArticleService::new(article_repo.clone())),
            like_service: Arc::new(LikeService::new(article_repo.clone(), like_repo)),
            comment_service: Arc::new(CommentService::new(comment_repo, article_repo)),
            user_service: Arc::new(UserService::with_session_expiration(
                user_repo,
                session_repo,
                config.auth.session_expiration_days,
            )),
            tag_repo,
            session_days: config.auth.session_expiration_days,
        }
    }
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// The user behind the request, if any. Never rejects.
#[derive(Debug, Clone, Default)]
pub struct Viewer(pub Option<User>);

impl Viewer {
    pub fn id(&self) -> Option<i64> {
        self.0.as_ref().map(|u| u.id)
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

impl<S> FromRequestParts<S> for Viewer
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Viewer(
            parts.extensions.get::<AuthenticatedUser>().map(|au| au.0.clone()),
        ))
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" | "ACCOUNT_DISABLED" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" | "UNSUPPORTED_SORT_MODE" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "STORE_UNAVAILABLE" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

fn internal(err: anyhow::Error) -> ApiError {
    tracing::error!("Internal error: {:#}", err);
    ApiError::internal_error("Internal server error")
}

impl From<ListingError> for ApiError {
    fn from(err: ListingError) -> Self {
        match err {
            ListingError::StoreUnavailable(e) => {
                tracing::error!("Article store unavailable: {:#}", e);
                ApiError::new("STORE_UNAVAILABLE", "Article store is unavailable")
            }
            ListingError::UnsupportedSortMode(sort) => ApiError::with_details(
                "UNSUPPORTED_SORT_MODE",
                format!("Unsupported sort mode '{}'", sort),
                serde_json::json!({ "supported": ["newest", "oldest", "popular"] }),
            ),
        }
    }
}

impl From<ArticleServiceError> for ApiError {
    fn from(err: ArticleServiceError) -> Self {
        match err {
            ArticleServiceError::NotFound(_) => ApiError::not_found(err.to_string()),
            ArticleServiceError::Forbidden(_) => ApiError::forbidden(err.to_string()),
            ArticleServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            ArticleServiceError::InternalError(e) => internal(e),
        }
    }
}

impl From<LikeServiceError> for ApiError {
    fn from(err: LikeServiceError) -> Self {
        match err {
            LikeServiceError::ArticleNotFound(_) => ApiError::not_found(err.to_string()),
            LikeServiceError::InternalError(e) => internal(e),
        }
    }
}

impl From<CommentServiceError> for ApiError {
    fn from(err: CommentServiceError) -> Self {
        match err {
            CommentServiceError::ArticleNotFound(_) => ApiError::not_found(err.to_string()),
            CommentServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            CommentServiceError::InternalError(e) => internal(e),
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::InvalidCredentials => ApiError::unauthorized(err.to_string()),
            UserServiceError::AccountDisabled => ApiError::new("ACCOUNT_DISABLED", err.to_string()),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(msg) => ApiError::conflict(msg),
            UserServiceError::InternalError(e) => internal(e),
        }
    }
}

/// Extract session token from the `Authorization` header or the session cookie.
/// The bearer token wins when both are present.
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// `Set-Cookie` value carrying a session token
pub fn session_cookie(token: &str, days: i64) -> Result<HeaderValue, ApiError> {
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        token,
        days * 24 * 60 * 60
    );
    HeaderValue::from_str(&cookie).map_err(|e| internal(e.into()))
}

/// `Set-Cookie` value that removes the session cookie
pub fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static("session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = state
        .user_service
        .validate_session(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Optional authentication middleware
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_session_token(request.headers()) {
        match state.user_service.validate_session(&token).await {
            Ok(Some(user)) => {
                request.extensions_mut().insert(AuthenticatedUser(user));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Session lookup failed, continuing anonymously: {}", e),
        }
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_extract_session_token_from_bearer() {
        let map = headers(&[(header::AUTHORIZATION, "Bearer test-token-123")]);
        assert_eq!(extract_session_token(&map), Some("test-token-123".to_string()));
    }

    #[test]
    fn test_extract_session_token_from_cookie() {
        let map = headers(&[(header::COOKIE, "theme=dark; session=test-token-456")]);
        assert_eq!(extract_session_token(&map), Some("test-token-456".to_string()));
    }

    #[test]
    fn test_extract_session_token_bearer_priority() {
        let map = headers(&[
            (header::AUTHORIZATION, "Bearer bearer-token"),
            (header::COOKIE, "session=cookie-token"),
        ]);
        assert_eq!(extract_session_token(&map), Some("bearer-token".to_string()));
    }

    #[test]
    fn test_extract_session_token_missing() {
        assert_eq!(extract_session_token(&HeaderMap::new()), None);
        let map = headers(&[
            (header::AUTHORIZATION, "Basic dXNlcjpwYXNz"),
            (header::COOKIE, "session=; sessionid=other"),
        ]);
        assert_eq!(extract_session_token(&map), None);
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(ApiError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::conflict("x").status(), StatusCode::CONFLICT);
        let sort: ApiError = ListingError::UnsupportedSortMode("random".into()).into();
        assert_eq!(sort.status(), StatusCode::BAD_REQUEST);
        assert_eq!(sort.error.code, "UNSUPPORTED_SORT_MODE");
        let store: ApiError = ListingError::StoreUnavailable(anyhow::anyhow!("down")).into();
        assert_eq!(store.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_build_takes_settings_from_borrowed_config() {
        let pool = crate::db::create_test_pool().await.expect("Failed to create test pool");
        let mut config = Config::default();
        config.listing.page_size = 3;
        config.auth.session_expiration_days = 2;

        let state = AppState::build(pool, &config);
        assert_eq!(state.listing_service.page_size(), 3);
        assert_eq!(state.session_days, 2);
        assert_eq!(config.listing.page_size, 3);
    }

    #[test]
    fn test_session_cookie_format() {
        let cookie = session_cookie("abc", 7).unwrap();
        let cookie = cookie.to_str().unwrap();
        assert!(cookie.starts_with("session=abc;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=604800"));
    }
}
