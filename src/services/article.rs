//! Article service
//!
//! Authoring operations: create, edit and delete articles, and keep their tag
//! sets in step. Only an article's author may edit or delete it. Reads of the
//! article collection live in [`super::listing`].

use crate::db::repositories::ArticleRepository;
use crate::models::{
    normalize_tag_names, Article, CreateArticleInput, UpdateArticleInput, User, MAX_TAG_NAME_LEN,
};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

/// Longest accepted article title, in characters
pub const MAX_TITLE_LEN: usize = 200;

/// Error types for article service operations
#[derive(Debug, thiserror::Error)]
pub enum ArticleServiceError {
    /// Article not found
    #[error("Article not found: {0}")]
    NotFound(i64),

    /// Caller is not the article's author
    #[error("Only the author may modify article {0}")]
    Forbidden(i64),

    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Article service for authoring articles
pub struct ArticleService {
    repo: Arc<dyn ArticleRepository>,
}

impl ArticleService {
    pub fn new(repo: Arc<dyn ArticleRepository>) -> Self {
        Self { repo }
    }

    /// Create an article owned by `author`.
    ///
    /// Tag names are trimmed and de-duplicated; names not seen before are
    /// created. The article and its tags are stored together or not at all.
    pub async fn create(
        &self,
        author: &User,
        input: CreateArticleInput,
    ) -> Result<Article, ArticleServiceError> {
        let title = validate_title(&input.title)?;
        let content = validate_content(&input.content)?;
        let tags = validate_tags(&input.tags)?;

        let now = Utc::now();
        let article = self
            .repo
            .create_with_tags(
                &Article {
                    id: 0,
                    title,
                    content,
                    author_id: author.id,
                    like_count: 0,
                    created_at: now,
                    updated_at: now,
                },
                &tags,
            )
            .await
            .context("Failed to create article")?;

        tracing::info!(article_id = article.id, author_id = author.id, "Article created");
        Ok(article)
    }

    /// Replace title, content and the whole tag set of an article.
    pub async fn update(
        &self,
        editor: &User,
        id: i64,
        input: UpdateArticleInput,
    ) -> Result<Article, ArticleServiceError> {
        let existing = self.get_owned(editor, id).await?;

        let title = validate_title(&input.title)?;
        let content = validate_content(&input.content)?;
        let tags = validate_tags(&input.tags)?;

        let article = self
            .repo
            .update_with_tags(
                &Article {
                    title,
                    content,
                    ..existing
                },
                &tags,
            )
            .await
            .context("Failed to update article")?;

        tracing::info!(article_id = id, "Article updated");
        Ok(article)
    }

    /// Delete an article together with its tag links, comments and likes.
    pub async fn delete(&self, editor: &User, id: i64) -> Result<(), ArticleServiceError> {
        self.get_owned(editor, id).await?;

        let deleted = self.repo.delete(id).await.context("Failed to delete article")?;
        if !deleted {
            return Err(ArticleServiceError::NotFound(id));
        }

        tracing::info!(article_id = id, "Article deleted");
        Ok(())
    }

    /// Articles written by a user, newest first
    pub async fn list_by_author(&self, author_id: i64) -> Result<Vec<Article>, ArticleServiceError> {
        Ok(self
            .repo
            .list_by_author(author_id)
            .await
            .context("Failed to list articles by author")?)
    }

    async fn get_owned(&self, editor: &User, id: i64) -> Result<Article, ArticleServiceError> {
        let article = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get article")?
            .ok_or(ArticleServiceError::NotFound(id))?;

        if !editor.owns(article.author_id) {
            tracing::warn!(article_id = id, user_id = editor.id, "Rejected edit by non-author");
            return Err(ArticleServiceError::Forbidden(id));
        }
        Ok(article)
    }
}

fn validate_title(title: &str) -> Result<String, ArticleServiceError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ArticleServiceError::ValidationError(
            "Article title cannot be empty".to_string(),
        ));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ArticleServiceError::ValidationError(format!(
            "Article title cannot exceed {} characters",
            MAX_TITLE_LEN
        )));
    }
    Ok(title.to_string())
}

fn validate_content(content: &str) -> Result<String, ArticleServiceError> {
    if content.trim().is_empty() {
        return Err(ArticleServiceError::ValidationError(
            "Article content cannot be empty".to_string(),
        ));
    }
    Ok(content.to_string())
}

fn validate_tags(names: &[String]) -> Result<Vec<String>, ArticleServiceError> {
    let names = normalize_tag_names(names);
    if let Some(long) = names.iter().find(|n| n.chars().count() > MAX_TAG_NAME_LEN) {
        return Err(ArticleServiceError::ValidationError(format!(
            "Tag '{}' exceeds {} characters",
            long, MAX_TAG_NAME_LEN
        )));
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxArticleRepository, SqlxLikeRepository, SqlxTagRepository, SqlxUserRepository,
        LikeRepository, TagRepository, UserRepository,
    };
    use crate::db::{create_test_pool, migrations, DatabasePool, DynDatabasePool};

    struct Setup {
        pool: DynDatabasePool,
        service: ArticleService,
        tags: Arc<dyn TagRepository>,
        alice: User,
        bob: User,
    }

    async fn setup_test_service() -> Setup {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let users = SqlxUserRepository::new(pool.clone());
        let alice = users
            .create(&User::new("alice".into(), "alice@example.com".into(), "hash".into(), None))
            .await
            .unwrap();
        let bob = users
            .create(&User::new("bob".into(), "bob@example.com".into(), "hash".into(), None))
            .await
            .unwrap();

        let tags = SqlxTagRepository::boxed(pool.clone());
        let service = ArticleService::new(SqlxArticleRepository::boxed(pool.clone()));
        Setup {
            pool,
            service,
            tags,
            alice,
            bob,
        }
    }

    fn input(title: &str, tags: &[&str]) -> CreateArticleInput {
        CreateArticleInput {
            title: title.to_string(),
            content: "Some content".to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn tag_names(tags: Vec<crate::models::Tag>) -> Vec<String> {
        tags.into_iter().map(|t| t.name).collect()
    }

    #[tokio::test]
    async fn test_create_with_lazy_tags() {
        let s = setup_test_service().await;

        let article = s
            .service
            .create(&s.alice, input("  Hello  ", &["rust", " web", "rust", ""]))
            .await
            .unwrap();
        assert_eq!(article.title, "Hello");
        assert_eq!(article.author_id, s.alice.id);

        let tags = s.tags.get_by_article_id(article.id).await.unwrap();
        assert_eq!(tag_names(tags), vec!["rust", "web"]);

        let second = s.service.create(&s.bob, input("Again", &["rust"])).await.unwrap();
        let shared = s.tags.get_by_article_id(second.id).await.unwrap();
        assert_eq!(shared.len(), 1);
        assert_eq!(s.tags.list(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_create_validation() {
        let s = setup_test_service().await;

        let empty = s.service.create(&s.alice, input("   ", &[])).await;
        assert!(matches!(empty, Err(ArticleServiceError::ValidationError(_))));

        let long = s.service.create(&s.alice, input(&"x".repeat(MAX_TITLE_LEN + 1), &[])).await;
        assert!(matches!(long, Err(ArticleServiceError::ValidationError(_))));

        let long_tag = "t".repeat(MAX_TAG_NAME_LEN + 1);
        let bad_tag = s.service.create(&s.alice, input("Ok", &[long_tag.as_str()])).await;
        assert!(matches!(bad_tag, Err(ArticleServiceError::ValidationError(_))));

        let mut no_content = input("Ok", &[]);
        no_content.content = "\n".into();
        let result = s.service.create(&s.alice, no_content).await;
        assert!(matches!(result, Err(ArticleServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_update_replaces_fields_and_tags() {
        let s = setup_test_service().await;
        let article = s.service.create(&s.alice, input("Old", &["a", "b"])).await.unwrap();

        let updated = s
            .service
            .update(
                &s.alice,
                article.id,
                UpdateArticleInput {
                    title: "New".into(),
                    content: "New content".into(),
                    tags: vec!["c".into()],
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "New");
        assert!(updated.updated_at >= article.updated_at);
        assert_eq!(updated.created_at, article.created_at);

        let tags = s.tags.get_by_article_id(article.id).await.unwrap();
        assert_eq!(tag_names(tags), vec!["c"]);
    }

    #[tokio::test]
    async fn test_failed_tag_write_leaves_nothing_behind() {
        let s = setup_test_service().await;
        let article = s.service.create(&s.alice, input("Stable", &["old"])).await.unwrap();
        s.pool
            .execute(
                "CREATE TRIGGER reject_broken_tag BEFORE INSERT ON tags \
                 WHEN NEW.name = 'broken' BEGIN SELECT RAISE(ABORT, 'tag rejected'); END",
            )
            .await
            .unwrap();

        let created = s.service.create(&s.alice, input("Half", &["fresh", "broken"])).await;
        assert!(matches!(created, Err(ArticleServiceError::InternalError(_))));
        assert_eq!(s.service.list_by_author(s.alice.id).await.unwrap().len(), 1);
        assert!(s.tags.get_by_name("fresh").await.unwrap().is_none());

        let updated = s
            .service
            .update(
                &s.alice,
                article.id,
                UpdateArticleInput {
                    title: "Changed".into(),
                    content: "Changed".into(),
                    tags: vec!["broken".into()],
                },
            )
            .await;
        assert!(matches!(updated, Err(ArticleServiceError::InternalError(_))));
        let stored = s.service.list_by_author(s.alice.id).await.unwrap();
        assert_eq!(stored[0].title, "Stable");
        let tags = s.tags.get_by_article_id(article.id).await.unwrap();
        assert_eq!(tag_names(tags), vec!["old"]);
    }

    #[tokio::test]
    async fn test_only_author_may_edit_or_delete() {
        let s = setup_test_service().await;
        let article = s.service.create(&s.alice, input("Mine", &[])).await.unwrap();

        let edit = s
            .service
            .update(
                &s.bob,
                article.id,
                UpdateArticleInput {
                    title: "Hijacked".into(),
                    content: "x".into(),
                    tags: vec![],
                },
            )
            .await;
        assert!(matches!(edit, Err(ArticleServiceError::Forbidden(id)) if id == article.id));

        let delete = s.service.delete(&s.bob, article.id).await;
        assert!(matches!(delete, Err(ArticleServiceError::Forbidden(_))));

        let missing = s.service.delete(&s.alice, 9999).await;
        assert!(matches!(missing, Err(ArticleServiceError::NotFound(9999))));
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let s = setup_test_service().await;
        let article = s.service.create(&s.alice, input("Doomed", &["x"])).await.unwrap();
        let likes = SqlxLikeRepository::new(s.pool.clone());
        likes.toggle(s.bob.id, article.id).await.unwrap();

        s.service.delete(&s.alice, article.id).await.unwrap();

        assert_eq!(likes.count_by_article(article.id).await.unwrap(), 0);
        assert!(s.tags.get_by_article_id(article.id).await.unwrap().is_empty());
        assert!(s.service.list_by_author(s.alice.id).await.unwrap().is_empty());
        let users = SqlxUserRepository::new(s.pool.clone());
        assert!(users.get_by_id(s.alice.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_list_by_author() {
        let s = setup_test_service().await;
        s.service.create(&s.alice, input("One", &[])).await.unwrap();
        s.service.create(&s.alice, input("Two", &[])).await.unwrap();
        s.service.create(&s.bob, input("Three", &[])).await.unwrap();

        assert_eq!(s.service.list_by_author(s.alice.id).await.unwrap().len(), 2);
        assert_eq!(s.service.list_by_author(s.bob.id).await.unwrap().len(), 1);
    }
}
