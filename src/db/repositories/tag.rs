//! Tag repository
//!
//! Tags are created lazily by name. Creation goes through the unique index
//! on `tags.name`, so two writers racing on the same new name both end up
//! with the single stored row.

use crate::db::{Backend, DynDatabasePool};
use crate::models::Tag;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySql, MySqlPool, QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;

/// Tag repository trait
#[async_trait]
pub trait TagRepository: Send + Sync {
    /// Exact, case-sensitive lookup
    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>>;

    /// Return the tag with this name, creating it if absent
    async fn get_or_create(&self, name: &str) -> Result<Tag>;

    /// Tags ordered by name, optionally limited
    async fn list(&self, limit: Option<i64>) -> Result<Vec<Tag>>;

    async fn get_by_article_id(&self, article_id: i64) -> Result<Vec<Tag>>;

    /// Tags for several articles in one query, keyed by article id
    async fn get_by_article_ids(&self, article_ids: &[i64]) -> Result<HashMap<i64, Vec<Tag>>>;

    /// Replace the article's tag set
    async fn set_article_tags(&self, article_id: i64, tag_ids: &[i64]) -> Result<()>;
}

/// SQLx-based tag repository
pub struct SqlxTagRepository {
    pool: DynDatabasePool,
}

impl SqlxTagRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TagRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TagRepository for SqlxTagRepository {
    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>> {
        on_backend!(self.pool, |pool| {
            let row = sqlx::query("SELECT id, name FROM tags WHERE name = ?")
                .bind(name)
                .fetch_optional(pool)
                .await
                .context("Failed to get tag by name")?;
            match row {
                Some(row) => Ok(Some(Tag {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                })),
                None => Ok(None),
            }
        })
    }

    async fn get_or_create(&self, name: &str) -> Result<Tag> {
        let insert = match self.pool.backend()? {
            Backend::Sqlite(_) => "INSERT OR IGNORE INTO tags (name) VALUES (?)",
            Backend::Mysql(_) => "INSERT IGNORE INTO tags (name) VALUES (?)",
        };
        on_backend!(self.pool, |pool| {
            sqlx::query(insert)
                .bind(name)
                .execute(pool)
                .await
                .with_context(|| format!("Failed to create tag '{}'", name))?;
        });
        self.get_by_name(name)
            .await?
            .with_context(|| format!("Tag '{}' missing after insert", name))
    }

    async fn list(&self, limit: Option<i64>) -> Result<Vec<Tag>> {
        let limit = limit.unwrap_or(i64::MAX);
        on_backend!(self.pool, |pool| {
            let rows = sqlx::query("SELECT id, name FROM tags ORDER BY name ASC LIMIT ?")
                .bind(limit)
                .fetch_all(pool)
                .await
                .context("Failed to list tags")?;
            rows.iter()
                .map(|row| -> Result<Tag> {
                    Ok(Tag {
                        id: row.try_get("id")?,
                        name: row.try_get("name")?,
                    })
                })
                .collect()
        })
    }

    async fn get_by_article_id(&self, article_id: i64) -> Result<Vec<Tag>> {
        let mut map = self.get_by_article_ids(&[article_id]).await?;
        Ok(map.remove(&article_id).unwrap_or_default())
    }

    async fn get_by_article_ids(&self, article_ids: &[i64]) -> Result<HashMap<i64, Vec<Tag>>> {
        if article_ids.is_empty() {
            return Ok(HashMap::new());
        }
        match self.pool.backend()? {
            Backend::Sqlite(pool) => get_tags_by_article_ids_sqlite(pool, article_ids).await,
            Backend::Mysql(pool) => get_tags_by_article_ids_mysql(pool, article_ids).await,
        }
    }

    async fn set_article_tags(&self, article_id: i64, tag_ids: &[i64]) -> Result<()> {
        let insert = match self.pool.backend()? {
            Backend::Sqlite(_) => "INSERT OR IGNORE INTO article_tags (article_id, tag_id) VALUES (?, ?)",
            Backend::Mysql(_) => "INSERT IGNORE INTO article_tags (article_id, tag_id) VALUES (?, ?)",
        };
        on_backend!(self.pool, |pool| {
            let mut tx = pool.begin().await?;
            sqlx::query("DELETE FROM article_tags WHERE article_id = ?")
                .bind(article_id)
                .execute(&mut *tx)
                .await
                .context("Failed to clear article tags")?;
            for tag_id in tag_ids {
                sqlx::query(insert)
                    .bind(article_id)
                    .bind(*tag_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to link tag to article")?;
            }
            tx.commit().await?;
        });
        Ok(())
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn get_tags_by_article_ids_sqlite(
    pool: &SqlitePool,
    article_ids: &[i64],
) -> Result<HashMap<i64, Vec<Tag>>> {
    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT link.article_id, t.id, t.name FROM article_tags link \
         INNER JOIN tags t ON t.id = link.tag_id WHERE link.article_id IN (",
    );
    let mut separated = qb.separated(", ");
    for id in article_ids {
        separated.push_bind(*id);
    }
    qb.push(") ORDER BY t.name ASC");

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to get tags by article ids")?;

    let mut map: HashMap<i64, Vec<Tag>> = HashMap::new();
    for row in rows {
        map.entry(row.try_get("article_id")?).or_default().push(Tag {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
        });
    }
    Ok(map)
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn get_tags_by_article_ids_mysql(
    pool: &MySqlPool,
    article_ids: &[i64],
) -> Result<HashMap<i64, Vec<Tag>>> {
    let mut qb = QueryBuilder::<MySql>::new(
        "SELECT link.article_id, t.id, t.name FROM article_tags link \
         INNER JOIN tags t ON t.id = link.tag_id WHERE link.article_id IN (",
    );
    let mut separated = qb.separated(", ");
    for id in article_ids {
        separated.push_bind(*id);
    }
    qb.push(") ORDER BY t.name ASC");

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to get tags by article ids")?;

    let mut map: HashMap<i64, Vec<Tag>> = HashMap::new();
    for row in rows {
        map.entry(row.try_get("article_id")?).or_default().push(Tag {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
        });
    }
    Ok(map)
}
