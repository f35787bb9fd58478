//! Comment service

use crate::db::repositories::{ArticleRepository, CommentRepository};
use crate::models::{Comment, CreateCommentInput, User};
use anyhow::Context;
use std::sync::Arc;

/// Longest accepted comment, in characters
pub const MAX_COMMENT_LEN: usize = 2000;

/// Error types for comment operations
#[derive(Debug, thiserror::Error)]
pub enum CommentServiceError {
    #[error("Article not found: {0}")]
    ArticleNotFound(i64),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Comment service
pub struct CommentService {
    repo: Arc<dyn CommentRepository>,
    article_repo: Arc<dyn ArticleRepository>,
}

impl CommentService {
    pub fn new(repo: Arc<dyn CommentRepository>, article_repo: Arc<dyn ArticleRepository>) -> Self {
        Self { repo, article_repo }
    }

    /// Post a comment as `author`. Content is trimmed and must not be blank.
    pub async fn create(
        &self,
        author: &User,
        article_id: i64,
        input: CreateCommentInput,
    ) -> Result<Comment, CommentServiceError> {
        let content = input.content.trim();
        if content.is_empty() {
            return Err(CommentServiceError::ValidationError(
                "Comment cannot be empty".to_string(),
            ));
        }
        if content.chars().count() > MAX_COMMENT_LEN {
            return Err(CommentServiceError::ValidationError(format!(
                "Comment cannot exceed {} characters",
                MAX_COMMENT_LEN
            )));
        }
        self.ensure_article(article_id).await?;

        let comment = self
            .repo
            .create(article_id, author.id, content)
            .await
            .context("Failed to create comment")?;
        tracing::debug!(comment_id = comment.id, article_id, "Comment created");
        Ok(comment)
    }

    /// Comments on an article, oldest first
    pub async fn list_for_article(&self, article_id: i64) -> Result<Vec<Comment>, CommentServiceError> {
        self.ensure_article(article_id).await?;
        Ok(self
            .repo
            .list_by_article(article_id)
            .await
            .context("Failed to list comments")?)
    }

    async fn ensure_article(&self, article_id: i64) -> Result<(), CommentServiceError> {
        match self
            .article_repo
            .get_by_id(article_id)
            .await
            .context("Failed to get article")?
        {
            Some(_) => Ok(()),
            None => Err(CommentServiceError::ArticleNotFound(article_id)),
        }
    }
}
