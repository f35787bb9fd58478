//! Like service

use crate::db::repositories::{ArticleRepository, LikeRepository};
use crate::models::LikeStatus;
use anyhow::Context;
use std::sync::Arc;

/// Error types for like operations
#[derive(Debug, thiserror::Error)]
pub enum LikeServiceError {
    #[error("Article not found: {0}")]
    ArticleNotFound(i64),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct LikeService {
    article_repo: Arc<dyn ArticleRepository>,
    like_repo: Arc<dyn LikeRepository>,
}

impl LikeService {
    pub fn new(article_repo: Arc<dyn ArticleRepository>, like_repo: Arc<dyn LikeRepository>) -> Self {
        Self {
            article_repo,
            like_repo,
        }
    }

    /// Like the article if the user does not yet like it, otherwise unlike it.
    pub async fn toggle(&self, user_id: i64, article_id: i64) -> Result<LikeStatus, LikeServiceError> {
        self.ensure_article(article_id).await?;

        let liked = self
            .like_repo
            .toggle(user_id, article_id)
            .await
            .context("Failed to toggle like")?;
        let like_count = self
            .like_repo
            .count_by_article(article_id)
            .await
            .context("Failed to count likes")?;

        tracing::debug!(user_id, article_id, liked, like_count, "Like toggled");
        Ok(LikeStatus { liked, like_count })
    }

    pub async fn count(&self, article_id: i64) -> Result<i64, LikeServiceError> {
        self.ensure_article(article_id).await?;
        Ok(self
            .like_repo
            .count_by_article(article_id)
            .await
            .context("Failed to count likes")?)
    }

    async fn ensure_article(&self, article_id: i64) -> Result<(), LikeServiceError> {
        self.article_repo
            .get_by_id(article_id)
            .await
            .context("Failed to get article")?
            .map(|_| ())
            .ok_or(LikeServiceError::ArticleNotFound(article_id))
    }
}
