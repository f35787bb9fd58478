//! Profile API endpoints
//!
//! - GET /api/v1/profile - Current user with their articles
//! - PUT /api/v1/profile - Update username, email, full name or password

use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::IntoResponse,
    Json,
};
use serde::Serialize;

use crate::api::middleware::{session_cookie, ApiError, AppState, AuthenticatedUser};
use crate::models::{Article, UpdateUserInput, User};

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: User,
    pub articles: Vec<Article>,
}

#[derive(Debug, Serialize)]
pub struct ProfileUpdateResponse {
    pub user: User,
    /// Replacement token, present when the password changed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

pub async fn get_profile(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<ProfileResponse>, ApiError> {
    let articles = state.article_service.list_by_author(user.id).await?;
    Ok(Json(ProfileResponse { user, articles }))
}

/// A password change revokes every session, so a fresh one is issued here
/// to keep the caller signed in.
pub async fn update_profile(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<UpdateUserInput>,
) -> Result<impl IntoResponse, ApiError> {
    let password_changed = body.new_password.is_some();
    let updated = state.user_service.update_profile(&user, body).await?;

    let mut headers = HeaderMap::new();
    let token = if password_changed {
        let session = state.user_service.create_session(updated.id).await?;
        headers.insert(
            header::SET_COOKIE,
            session_cookie(&session.id, state.session_days)?,
        );
        Some(session.id)
    } else {
        None
    };

    Ok((
        headers,
        Json(ProfileUpdateResponse {
            user: updated,
            token,
        }),
    ))
}
