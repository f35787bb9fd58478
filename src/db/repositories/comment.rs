//! Comment repository

use crate::db::{Backend, DynDatabasePool};
use crate::models::Comment;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Comment repository trait
#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Insert a comment and return it with the author's username
    async fn create(&self, article_id: i64, author_id: i64, content: &str) -> Result<Comment>;

    /// Comments on an article, oldest first
    async fn list_by_article(&self, article_id: i64) -> Result<Vec<Comment>>;
}

/// SQLx-based comment repository
pub struct SqlxCommentRepository {
    pool: DynDatabasePool,
}

impl SqlxCommentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_COMMENTS: &str = r#"
    SELECT c.id, c.content, c.article_id, c.author_id, u.username AS author_username, c.created_at
    FROM comments c
    INNER JOIN users u ON u.id = c.author_id
"#;

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn create(&self, article_id: i64, author_id: i64, content: &str) -> Result<Comment> {
        let id = match self.pool.backend()? {
            Backend::Sqlite(pool) => create_comment_sqlite(pool, article_id, author_id, content).await?,
            Backend::Mysql(pool) => create_comment_mysql(pool, article_id, author_id, content).await?,
        };
        let sql = format!("{} WHERE c.id = ?", SELECT_COMMENTS);
        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_one(pool)
                    .await
                    .context("Failed to load created comment")?;
                row_to_comment_sqlite(&row)
            }
            Backend::Mysql(pool) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_one(pool)
                    .await
                    .context("Failed to load created comment")?;
                row_to_comment_mysql(&row)
            }
        }
    }

    async fn list_by_article(&self, article_id: i64) -> Result<Vec<Comment>> {
        let sql = format!(
            "{} WHERE c.article_id = ? ORDER BY c.created_at ASC, c.id ASC",
            SELECT_COMMENTS
        );
        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(&sql)
                    .bind(article_id)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list comments")?;
                rows.iter().map(row_to_comment_sqlite).collect()
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(&sql)
                    .bind(article_id)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list comments")?;
                rows.iter().map(row_to_comment_mysql).collect()
            }
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_comment_sqlite(
    pool: &SqlitePool,
    article_id: i64,
    author_id: i64,
    content: &str,
) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO comments (content, article_id, author_id, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(content)
    .bind(article_id)
    .bind(author_id)
    .bind(Utc::now())
    .execute(pool)
    .await
    .context("Failed to create comment")?;
    Ok(result.last_insert_rowid())
}

fn row_to_comment_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Comment> {
    Ok(Comment {
        id: row.try_get("id")?,
        content: row.try_get("content")?,
        article_id: row.try_get("article_id")?,
        author_id: row.try_get("author_id")?,
        author_username: row.try_get("author_username")?,
        created_at: row.try_get("created_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_comment_mysql(
    pool: &MySqlPool,
    article_id: i64,
    author_id: i64,
    content: &str,
) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO comments (content, article_id, author_id, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(content)
    .bind(article_id)
    .bind(author_id)
    .bind(Utc::now())
    .execute(pool)
    .await
    .context("Failed to create comment")?;
    Ok(result.last_insert_id() as i64)
}

fn row_to_comment_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Comment> {
    Ok(Comment {
        id: row.try_get("id")?,
        content: row.try_get("content")?,
        article_id: row.try_get("article_id")?,
        author_id: row.try_get("author_id")?,
        author_username: row.try_get("author_username")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations::run_migrations};

    async fn setup() -> (DynDatabasePool, SqlxCommentRepository, i64, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        let sqlite = pool.as_sqlite().unwrap();
        let user_id = sqlx::query(
            "INSERT INTO users (username, email, password_hash) VALUES ('alice', 'alice@example.com', 'hash')",
        )
        .execute(sqlite)
        .await
        .unwrap()
        .last_insert_rowid();
        let article_id = sqlx::query("INSERT INTO articles (title, content, author_id) VALUES ('t', 'c', ?)")
            .bind(user_id)
            .execute(sqlite)
            .await
            .unwrap()
            .last_insert_rowid();
        (pool.clone(), SqlxCommentRepository::new(pool), user_id, article_id)
    }

    #[tokio::test]
    async fn test_create_returns_author_username() {
        let (_pool, repo, user_id, article_id) = setup().await;

        let comment = repo.create(article_id, user_id, "first!").await.unwrap();
        assert!(comment.id > 0);
        assert_eq!(comment.content, "first!");
        assert_eq!(comment.author_username, "alice");
        assert_eq!(comment.article_id, article_id);
    }

    #[tokio::test]
    async fn test_list_by_article_oldest_first() {
        let (_pool, repo, user_id, article_id) = setup().await;

        for text in ["one", "two", "three"] {
            repo.create(article_id, user_id, text).await.unwrap();
        }
        let contents: Vec<_> = repo
            .list_by_article(article_id)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.content)
            .collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
        assert!(repo.list_by_article(article_id + 1).await.unwrap().is_empty());
    }
}
