//! Article repository
//!
//! Filtered listing queries are assembled with `QueryBuilder` so that the
//! search and tag predicates are only present when requested. Every ordering
//! ends on `id`, which makes offset pagination stable for equal timestamps or
//! like counts.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{Article, ArticleFilter, ArticleOrder, ListParams};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySql, MySqlPool, QueryBuilder, Row, Sqlite, SqlitePool};
use std::sync::Arc;

const ARTICLE_COLUMNS: &str =
    "a.id, a.title, a.content, a.author_id, a.like_count, a.created_at, a.updated_at";

/// Article repository trait
#[async_trait]
pub trait ArticleRepository: Send + Sync {
    /// Insert an article and return it with its assigned id
    async fn create(&self, article: &Article) -> Result<Article>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Article>>;

    /// Fetch several articles in one query, in no particular order
    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<Article>>;

    /// Persist title, content and `updated_at`
    async fn update(&self, article: &Article) -> Result<Article>;

    /// Insert an article and link `tags` in one transaction. Tag names not
    /// seen before are created inside the same transaction.
    async fn create_with_tags(&self, article: &Article, tags: &[String]) -> Result<Article>;

    /// Persist title, content and `updated_at` and replace the whole tag set
    /// in one transaction
    async fn update_with_tags(&self, article: &Article, tags: &[String]) -> Result<Article>;

    /// Delete an article with its tag links, comments and likes
    async fn delete(&self, id: i64) -> Result<bool>;

    /// All articles by one author, newest first
    async fn list_by_author(&self, author_id: i64) -> Result<Vec<Article>>;

    /// Articles matching `filter` in `order`, optionally windowed to one page
    async fn find(
        &self,
        filter: &ArticleFilter,
        order: ArticleOrder,
        window: Option<ListParams>,
    ) -> Result<Vec<Article>>;

    async fn count(&self, filter: &ArticleFilter) -> Result<i64>;

    /// Ids of every article matching `filter`, ascending
    async fn find_ids(&self, filter: &ArticleFilter) -> Result<Vec<i64>>;

    /// `(id, live like count)` for every article matching `filter`, ascending
    /// by id. One grouped query, so the size of the match set is unbounded.
    async fn find_ids_with_like_counts(&self, filter: &ArticleFilter) -> Result<Vec<(i64, i64)>>;

    /// Recompute `like_count` from the likes table, returning how many rows changed
    async fn sync_like_counts(&self) -> Result<u64>;
}

/// SQLx-based article repository
pub struct SqlxArticleRepository {
    pool: DynDatabasePool,
}

impl SqlxArticleRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ArticleRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ArticleRepository for SqlxArticleRepository {
    async fn create(&self, article: &Article) -> Result<Article> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => create_article_sqlite(pool, article).await,
            Backend::Mysql(pool) => create_article_mysql(pool, article).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Article>> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => get_article_by_id_sqlite(pool, id).await,
            Backend::Mysql(pool) => get_article_by_id_mysql(pool, id).await,
        }
    }

    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<Article>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        match self.pool.backend()? {
            Backend::Sqlite(pool) => get_articles_by_ids_sqlite(pool, ids).await,
            Backend::Mysql(pool) => get_articles_by_ids_mysql(pool, ids).await,
        }
    }

    async fn update(&self, article: &Article) -> Result<Article> {
        let now = chrono::Utc::now();
        on_backend!(self.pool, |pool| {
            sqlx::query("UPDATE articles SET title = ?, content = ?, updated_at = ? WHERE id = ?")
                .bind(&article.title)
                .bind(&article.content)
                .bind(now)
                .bind(article.id)
                .execute(pool)
                .await
                .context("Failed to update article")?;
        });
        Ok(Article {
            updated_at: now,
            ..article.clone()
        })
    }

    async fn create_with_tags(&self, article: &Article, tags: &[String]) -> Result<Article> {
        let id = match self.pool.backend()? {
            Backend::Sqlite(pool) => save_article_sqlite(pool, article, tags).await?,
            Backend::Mysql(pool) => save_article_mysql(pool, article, tags).await?,
        };
        Ok(Article {
            id,
            like_count: 0,
            ..article.clone()
        })
    }

    async fn update_with_tags(&self, article: &Article, tags: &[String]) -> Result<Article> {
        let updated = Article {
            updated_at: chrono::Utc::now(),
            ..article.clone()
        };
        match self.pool.backend()? {
            Backend::Sqlite(pool) => save_article_sqlite(pool, &updated, tags).await?,
            Backend::Mysql(pool) => save_article_mysql(pool, &updated, tags).await?,
        };
        Ok(updated)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        on_backend!(self.pool, |pool| {
            let mut tx = pool.begin().await?;
            for sql in [
                "DELETE FROM likes WHERE article_id = ?",
                "DELETE FROM comments WHERE article_id = ?",
                "DELETE FROM article_tags WHERE article_id = ?",
            ] {
                sqlx::query(sql)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to delete article dependents")?;
            }
            let affected = sqlx::query("DELETE FROM articles WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("Failed to delete article")?
                .rows_affected();
            tx.commit().await?;
            Ok(affected > 0)
        })
    }

    async fn list_by_author(&self, author_id: i64) -> Result<Vec<Article>> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => list_articles_by_author_sqlite(pool, author_id).await,
            Backend::Mysql(pool) => list_articles_by_author_mysql(pool, author_id).await,
        }
    }

    async fn find(
        &self,
        filter: &ArticleFilter,
        order: ArticleOrder,
        window: Option<ListParams>,
    ) -> Result<Vec<Article>> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => find_articles_sqlite(pool, filter, order, window).await,
            Backend::Mysql(pool) => find_articles_mysql(pool, filter, order, window).await,
        }
    }

    async fn count(&self, filter: &ArticleFilter) -> Result<i64> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => count_articles_sqlite(pool, filter).await,
            Backend::Mysql(pool) => count_articles_mysql(pool, filter).await,
        }
    }

    async fn find_ids(&self, filter: &ArticleFilter) -> Result<Vec<i64>> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => find_article_ids_sqlite(pool, filter).await,
            Backend::Mysql(pool) => find_article_ids_mysql(pool, filter).await,
        }
    }

    async fn find_ids_with_like_counts(&self, filter: &ArticleFilter) -> Result<Vec<(i64, i64)>> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => find_like_counts_sqlite(pool, filter).await,
            Backend::Mysql(pool) => find_like_counts_mysql(pool, filter).await,
        }
    }

    async fn sync_like_counts(&self) -> Result<u64> {
        let sql = r#"
            UPDATE articles
            SET like_count = (SELECT COUNT(*) FROM likes l WHERE l.article_id = articles.id)
            WHERE like_count <> (SELECT COUNT(*) FROM likes l WHERE l.article_id = articles.id)
        "#;
        let affected = on_backend!(self.pool, |pool| {
            sqlx::query(sql)
                .execute(pool)
                .await
                .context("Failed to sync like counts")?
                .rows_affected()
        });
        Ok(affected)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_article_sqlite(pool: &SqlitePool, article: &Article) -> Result<Article> {
    let result = sqlx::query(
        r#"
        INSERT INTO articles (title, content, author_id, like_count, created_at, updated_at)
        VALUES (?, ?, ?, 0, ?, ?)
        "#,
    )
    .bind(&article.title)
    .bind(&article.content)
    .bind(article.author_id)
    .bind(article.created_at)
    .bind(article.updated_at)
    .execute(pool)
    .await
    .context("Failed to create article")?;

    Ok(Article {
        id: result.last_insert_rowid(),
        like_count: 0,
        ..article.clone()
    })
}

/// Insert (`id == 0`) or update an article, then replace its tag links.
async fn save_article_sqlite(pool: &SqlitePool, article: &Article, tags: &[String]) -> Result<i64> {
    let mut tx = pool.begin().await?;

    let id = if article.id == 0 {
        sqlx::query(
            r#"
            INSERT INTO articles (title, content, author_id, like_count, created_at, updated_at)
            VALUES (?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&article.title)
        .bind(&article.content)
        .bind(article.author_id)
        .bind(article.created_at)
        .bind(article.updated_at)
        .execute(&mut *tx)
        .await
        .context("Failed to create article")?
        .last_insert_rowid()
    } else {
        sqlx::query("UPDATE articles SET title = ?, content = ?, updated_at = ? WHERE id = ?")
            .bind(&article.title)
            .bind(&article.content)
            .bind(article.updated_at)
            .bind(article.id)
            .execute(&mut *tx)
            .await
            .context("Failed to update article")?;
        article.id
    };

    sqlx::query("DELETE FROM article_tags WHERE article_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear article tags")?;
    for name in tags {
        sqlx::query("INSERT OR IGNORE INTO tags (name) VALUES (?)")
            .bind(name)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to create tag '{}'", name))?;
        let tag_id: i64 = sqlx::query_scalar("SELECT id FROM tags WHERE name = ?")
            .bind(name)
            .fetch_one(&mut *tx)
            .await
            .with_context(|| format!("Failed to resolve tag '{}'", name))?;
        sqlx::query("INSERT OR IGNORE INTO article_tags (article_id, tag_id) VALUES (?, ?)")
            .bind(id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await
            .context("Failed to link tag to article")?;
    }

    tx.commit().await?;
    Ok(id)
}

async fn get_article_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Article>> {
    let sql = format!("SELECT {} FROM articles a WHERE a.id = ?", ARTICLE_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get article by id")?;
    row.as_ref().map(row_to_article_sqlite).transpose()
}

async fn get_articles_by_ids_sqlite(pool: &SqlitePool, ids: &[i64]) -> Result<Vec<Article>> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {} FROM articles a WHERE a.id IN (",
        ARTICLE_COLUMNS
    ));
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    qb.push(")");

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to get articles by ids")?;
    rows.iter().map(row_to_article_sqlite).collect()
}

async fn list_articles_by_author_sqlite(pool: &SqlitePool, author_id: i64) -> Result<Vec<Article>> {
    let sql = format!(
        "SELECT {} FROM articles a WHERE a.author_id = ? ORDER BY {}",
        ARTICLE_COLUMNS,
        ArticleOrder::Newest.sql()
    );
    let rows = sqlx::query(&sql)
        .bind(author_id)
        .fetch_all(pool)
        .await
        .context("Failed to list articles by author")?;
    rows.iter().map(row_to_article_sqlite).collect()
}

fn push_filter_sqlite(qb: &mut QueryBuilder<'_, Sqlite>, filter: &ArticleFilter) {
    if let Some(pattern) = filter.search_pattern() {
        qb.push(" AND (a.title LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '!' OR a.content LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '!')");
    }
    if let Some(tag_id) = filter.tag_id {
        qb.push(" AND EXISTS (SELECT 1 FROM article_tags t WHERE t.article_id = a.id AND t.tag_id = ")
            .push_bind(tag_id)
            .push(")");
    }
}

async fn find_articles_sqlite(
    pool: &SqlitePool,
    filter: &ArticleFilter,
    order: ArticleOrder,
    window: Option<ListParams>,
) -> Result<Vec<Article>> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {} FROM articles a WHERE 1 = 1",
        ARTICLE_COLUMNS
    ));
    push_filter_sqlite(&mut qb, filter);
    qb.push(" ORDER BY ").push(order.sql());
    if let Some(window) = window {
        qb.push(" LIMIT ")
            .push_bind(window.limit())
            .push(" OFFSET ")
            .push_bind(window.offset());
    }

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to find articles")?;
    rows.iter().map(row_to_article_sqlite).collect()
}

async fn count_articles_sqlite(pool: &SqlitePool, filter: &ArticleFilter) -> Result<i64> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS cnt FROM articles a WHERE 1 = 1");
    push_filter_sqlite(&mut qb, filter);

    let row = qb
        .build()
        .fetch_one(pool)
        .await
        .context("Failed to count articles")?;
    Ok(row.try_get("cnt")?)
}

async fn find_article_ids_sqlite(pool: &SqlitePool, filter: &ArticleFilter) -> Result<Vec<i64>> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT a.id FROM articles a WHERE 1 = 1");
    push_filter_sqlite(&mut qb, filter);
    qb.push(" ORDER BY a.id ASC");

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to find article ids")?;
    rows.iter()
        .map(|row| -> Result<i64> { Ok(row.try_get("id")?) })
        .collect()
}

async fn find_like_counts_sqlite(pool: &SqlitePool, filter: &ArticleFilter) -> Result<Vec<(i64, i64)>> {
    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT a.id, COUNT(l.id) AS likes FROM articles a \
         LEFT JOIN likes l ON l.article_id = a.id WHERE 1 = 1",
    );
    push_filter_sqlite(&mut qb, filter);
    qb.push(" GROUP BY a.id ORDER BY a.id ASC");

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to count likes for matching articles")?;
    rows.iter()
        .map(|row| -> Result<(i64, i64)> { Ok((row.try_get("id")?, row.try_get("likes")?)) })
        .collect()
}

fn row_to_article_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Article> {
    Ok(Article {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        author_id: row.try_get("author_id")?,
        like_count: row.try_get("like_count")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_article_mysql(pool: &MySqlPool, article: &Article) -> Result<Article> {
    let result = sqlx::query(
        r#"
        INSERT INTO articles (title, content, author_id, like_count, created_at, updated_at)
        VALUES (?, ?, ?, 0, ?, ?)
        "#,
    )
    .bind(&article.title)
    .bind(&article.content)
    .bind(article.author_id)
    .bind(article.created_at)
    .bind(article.updated_at)
    .execute(pool)
    .await
    .context("Failed to create article")?;

    Ok(Article {
        id: result.last_insert_id() as i64,
        like_count: 0,
        ..article.clone()
    })
}

/// Insert (`id == 0`) or update an article, then replace its tag links.
async fn save_article_mysql(pool: &MySqlPool, article: &Article, tags: &[String]) -> Result<i64> {
    let mut tx = pool.begin().await?;

    let id = if article.id == 0 {
        sqlx::query(
            r#"
            INSERT INTO articles (title, content, author_id, like_count, created_at, updated_at)
            VALUES (?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&article.title)
        .bind(&article.content)
        .bind(article.author_id)
        .bind(article.created_at)
        .bind(article.updated_at)
        .execute(&mut *tx)
        .await
        .context("Failed to create article")?
        .last_insert_id() as i64
    } else {
        sqlx::query("UPDATE articles SET title = ?, content = ?, updated_at = ? WHERE id = ?")
            .bind(&article.title)
            .bind(&article.content)
            .bind(article.updated_at)
            .bind(article.id)
            .execute(&mut *tx)
            .await
            .context("Failed to update article")?;
        article.id
    };

    sqlx::query("DELETE FROM article_tags WHERE article_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear article tags")?;
    for name in tags {
        sqlx::query("INSERT IGNORE INTO tags (name) VALUES (?)")
            .bind(name)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to create tag '{}'", name))?;
        let tag_id: i64 = sqlx::query_scalar("SELECT id FROM tags WHERE name = ?")
            .bind(name)
            .fetch_one(&mut *tx)
            .await
            .with_context(|| format!("Failed to resolve tag '{}'", name))?;
        sqlx::query("INSERT IGNORE INTO article_tags (article_id, tag_id) VALUES (?, ?)")
            .bind(id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await
            .context("Failed to link tag to article")?;
    }

    tx.commit().await?;
    Ok(id)
}

async fn get_article_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Article>> {
    let sql = format!("SELECT {} FROM articles a WHERE a.id = ?", ARTICLE_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get article by id")?;
    row.as_ref().map(row_to_article_mysql).transpose()
}

async fn get_articles_by_ids_mysql(pool: &MySqlPool, ids: &[i64]) -> Result<Vec<Article>> {
    let mut qb = QueryBuilder::<MySql>::new(format!(
        "SELECT {} FROM articles a WHERE a.id IN (",
        ARTICLE_COLUMNS
    ));
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    qb.push(")");

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to get articles by ids")?;
    rows.iter().map(row_to_article_mysql).collect()
}

async fn list_articles_by_author_mysql(pool: &MySqlPool, author_id: i64) -> Result<Vec<Article>> {
    let sql = format!(
        "SELECT {} FROM articles a WHERE a.author_id = ? ORDER BY {}",
        ARTICLE_COLUMNS,
        ArticleOrder::Newest.sql()
    );
    let rows = sqlx::query(&sql)
        .bind(author_id)
        .fetch_all(pool)
        .await
        .context("Failed to list articles by author")?;
    rows.iter().map(row_to_article_mysql).collect()
}

fn push_filter_mysql(qb: &mut QueryBuilder<'_, MySql>, filter: &ArticleFilter) {
    if let Some(pattern) = filter.search_pattern() {
        qb.push(" AND (a.title LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '!' OR a.content LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '!')");
    }
    if let Some(tag_id) = filter.tag_id {
        qb.push(" AND EXISTS (SELECT 1 FROM article_tags t WHERE t.article_id = a.id AND t.tag_id = ")
            .push_bind(tag_id)
            .push(")");
    }
}

async fn find_articles_mysql(
    pool: &MySqlPool,
    filter: &ArticleFilter,
    order: ArticleOrder,
    window: Option<ListParams>,
) -> Result<Vec<Article>> {
    let mut qb = QueryBuilder::<MySql>::new(format!(
        "SELECT {} FROM articles a WHERE 1 = 1",
        ARTICLE_COLUMNS
    ));
    push_filter_mysql(&mut qb, filter);
    qb.push(" ORDER BY ").push(order.sql());
    if let Some(window) = window {
        qb.push(" LIMIT ")
            .push_bind(window.limit())
            .push(" OFFSET ")
            .push_bind(window.offset());
    }

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to find articles")?;
    rows.iter().map(row_to_article_mysql).collect()
}

async fn count_articles_mysql(pool: &MySqlPool, filter: &ArticleFilter) -> Result<i64> {
    let mut qb = QueryBuilder::<MySql>::new("SELECT COUNT(*) AS cnt FROM articles a WHERE 1 = 1");
    push_filter_mysql(&mut qb, filter);

    let row = qb
        .build()
        .fetch_one(pool)
        .await
        .context("Failed to count articles")?;
    Ok(row.try_get("cnt")?)
}

async fn find_article_ids_mysql(pool: &MySqlPool, filter: &ArticleFilter) -> Result<Vec<i64>> {
    let mut qb = QueryBuilder::<MySql>::new("SELECT a.id FROM articles a WHERE 1 = 1");
    push_filter_mysql(&mut qb, filter);
    qb.push(" ORDER BY a.id ASC");

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to find article ids")?;
    rows.iter()
        .map(|row| -> Result<i64> { Ok(row.try_get("id")?) })
        .collect()
}

async fn find_like_counts_mysql(pool: &MySqlPool, filter: &ArticleFilter) -> Result<Vec<(i64, i64)>> {
    let mut qb = QueryBuilder::<MySql>::new(
        "SELECT a.id, COUNT(l.id) AS likes FROM articles a \
         LEFT JOIN likes l ON l.article_id = a.id WHERE 1 = 1",
    );
    push_filter_mysql(&mut qb, filter);
    qb.push(" GROUP BY a.id ORDER BY a.id ASC");

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to count likes for matching articles")?;
    rows.iter()
        .map(|row| -> Result<(i64, i64)> { Ok((row.try_get("id")?, row.try_get("likes")?)) })
        .collect()
}

fn row_to_article_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Article> {
    Ok(Article {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        author_id: row.try_get("author_id")?,
        like_count: row.try_get("like_count")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
