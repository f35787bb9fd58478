//! Like repository
//!
//! The unique key on `likes(user_id, article_id)` makes a like a set
//! membership. `toggle` changes that membership and `articles.like_count`
//! inside one transaction, and only moves the counter when a row was actually
//! inserted or deleted.

use crate::db::{Backend, DynDatabasePool};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySql, MySqlPool, QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Like repository trait
#[async_trait]
pub trait LikeRepository: Send + Sync {
    /// Live number of likes for one article
    async fn count_by_article(&self, article_id: i64) -> Result<i64>;

    async fn exists(&self, user_id: i64, article_id: i64) -> Result<bool>;

    /// Live like counts for a set of articles. Articles without likes are absent.
    async fn count_by_articles(&self, article_ids: &[i64]) -> Result<HashMap<i64, i64>>;

    /// The subset of `article_ids` the user likes
    async fn liked_among(&self, user_id: i64, article_ids: &[i64]) -> Result<HashSet<i64>>;

    /// Flip the user's like on an article. Returns whether it is liked afterwards.
    async fn toggle(&self, user_id: i64, article_id: i64) -> Result<bool>;

    /// Total likes across all articles
    async fn count_all(&self) -> Result<i64>;
}

/// SQLx-based like repository
pub struct SqlxLikeRepository {
    pool: DynDatabasePool,
}

impl SqlxLikeRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn LikeRepository> {
        Arc::new(Self::new(pool))
    }
}

const INCREMENT_LIKE_COUNT: &str = "UPDATE articles SET like_count = like_count + 1 WHERE id = ?";
const DECREMENT_LIKE_COUNT: &str =
    "UPDATE articles SET like_count = CASE WHEN like_count > 0 THEN like_count - 1 ELSE 0 END WHERE id = ?";

#[async_trait]
impl LikeRepository for SqlxLikeRepository {
    async fn count_by_article(&self, article_id: i64) -> Result<i64> {
        on_backend!(self.pool, |pool| {
            let row = sqlx::query("SELECT COUNT(*) AS cnt FROM likes WHERE article_id = ?")
                .bind(article_id)
                .fetch_one(pool)
                .await
                .context("Failed to count likes")?;
            Ok(row.try_get("cnt")?)
        })
    }

    async fn exists(&self, user_id: i64, article_id: i64) -> Result<bool> {
        on_backend!(self.pool, |pool| {
            let row = sqlx::query("SELECT 1 FROM likes WHERE user_id = ? AND article_id = ?")
                .bind(user_id)
                .bind(article_id)
                .fetch_optional(pool)
                .await
                .context("Failed to check like")?;
            Ok(row.is_some())
        })
    }

    async fn count_by_articles(&self, article_ids: &[i64]) -> Result<HashMap<i64, i64>> {
        if article_ids.is_empty() {
            return Ok(HashMap::new());
        }
        match self.pool.backend()? {
            Backend::Sqlite(pool) => count_likes_by_articles_sqlite(pool, article_ids).await,
            Backend::Mysql(pool) => count_likes_by_articles_mysql(pool, article_ids).await,
        }
    }

    async fn liked_among(&self, user_id: i64, article_ids: &[i64]) -> Result<HashSet<i64>> {
        if article_ids.is_empty() {
            return Ok(HashSet::new());
        }
        match self.pool.backend()? {
            Backend::Sqlite(pool) => liked_among_sqlite(pool, user_id, article_ids).await,
            Backend::Mysql(pool) => liked_among_mysql(pool, user_id, article_ids).await,
        }
    }

    async fn toggle(&self, user_id: i64, article_id: i64) -> Result<bool> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => toggle_like_sqlite(pool, user_id, article_id).await,
            Backend::Mysql(pool) => toggle_like_mysql(pool, user_id, article_id).await,
        }
    }

    async fn count_all(&self) -> Result<i64> {
        on_backend!(self.pool, |pool| {
            let row = sqlx::query("SELECT COUNT(*) AS cnt FROM likes")
                .fetch_one(pool)
                .await
                .context("Failed to count all likes")?;
            Ok(row.try_get("cnt")?)
        })
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn count_likes_by_articles_sqlite(
    pool: &SqlitePool,
    article_ids: &[i64],
) -> Result<HashMap<i64, i64>> {
    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT article_id, COUNT(*) AS cnt FROM likes WHERE article_id IN (",
    );
    let mut separated = qb.separated(", ");
    for id in article_ids {
        separated.push_bind(*id);
    }
    qb.push(") GROUP BY article_id");

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to count likes by articles")?;

    let mut counts = HashMap::with_capacity(rows.len());
    for row in rows {
        counts.insert(row.try_get("article_id")?, row.try_get("cnt")?);
    }
    Ok(counts)
}

async fn liked_among_sqlite(
    pool: &SqlitePool,
    user_id: i64,
    article_ids: &[i64],
) -> Result<HashSet<i64>> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT article_id FROM likes WHERE user_id = ");
    qb.push_bind(user_id).push(" AND article_id IN (");
    let mut separated = qb.separated(", ");
    for id in article_ids {
        separated.push_bind(*id);
    }
    qb.push(")");

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to load viewer likes")?;
    rows.iter()
        .map(|row| -> Result<i64> { Ok(row.try_get("article_id")?) })
        .collect()
}

async fn toggle_like_sqlite(pool: &SqlitePool, user_id: i64, article_id: i64) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let removed = sqlx::query("DELETE FROM likes WHERE user_id = ? AND article_id = ?")
        .bind(user_id)
        .bind(article_id)
        .execute(&mut *tx)
        .await
        .context("Failed to remove like")?
        .rows_affected();

    let liked = if removed > 0 {
        sqlx::query(DECREMENT_LIKE_COUNT)
            .bind(article_id)
            .execute(&mut *tx)
            .await
            .context("Failed to decrement like count")?;
        false
    } else {
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO likes (user_id, article_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(article_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .context("Failed to add like")?
        .rows_affected();
        if inserted > 0 {
            sqlx::query(INCREMENT_LIKE_COUNT)
                .bind(article_id)
                .execute(&mut *tx)
                .await
                .context("Failed to increment like count")?;
        }
        true
    };

    tx.commit().await?;
    Ok(liked)
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn count_likes_by_articles_mysql(
    pool: &MySqlPool,
    article_ids: &[i64],
) -> Result<HashMap<i64, i64>> {
    let mut qb = QueryBuilder::<MySql>::new(
        "SELECT article_id, COUNT(*) AS cnt FROM likes WHERE article_id IN (",
    );
    let mut separated = qb.separated(", ");
    for id in article_ids {
        separated.push_bind(*id);
    }
    qb.push(") GROUP BY article_id");

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to count likes by articles")?;

    let mut counts = HashMap::with_capacity(rows.len());
    for row in rows {
        counts.insert(row.try_get("article_id")?, row.try_get("cnt")?);
    }
    Ok(counts)
}

async fn liked_among_mysql(
    pool: &MySqlPool,
    user_id: i64,
    article_ids: &[i64],
) -> Result<HashSet<i64>> {
    let mut qb = QueryBuilder::<MySql>::new("SELECT article_id FROM likes WHERE user_id = ");
    qb.push_bind(user_id).push(" AND article_id IN (");
    let mut separated = qb.separated(", ");
    for id in article_ids {
        separated.push_bind(*id);
    }
    qb.push(")");

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to load viewer likes")?;
    rows.iter()
        .map(|row| -> Result<i64> { Ok(row.try_get("article_id")?) })
        .collect()
}

async fn toggle_like_mysql(pool: &MySqlPool, user_id: i64, article_id: i64) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let removed = sqlx::query("DELETE FROM likes WHERE user_id = ? AND article_id = ?")
        .bind(user_id)
        .bind(article_id)
        .execute(&mut *tx)
        .await
        .context("Failed to remove like")?
        .rows_affected();

    let liked = if removed > 0 {
        sqlx::query(DECREMENT_LIKE_COUNT)
            .bind(article_id)
            .execute(&mut *tx)
            .await
            .context("Failed to decrement like count")?;
        false
    } else {
        let inserted = sqlx::query(
            "INSERT IGNORE INTO likes (user_id, article_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(article_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .context("Failed to add like")?
        .rows_affected();
        if inserted > 0 {
            sqlx::query(INCREMENT_LIKE_COUNT)
                .bind(article_id)
                .execute(&mut *tx)
                .await
                .context("Failed to increment like count")?;
        }
        true
    };

    tx.commit().await?;
    Ok(liked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations::run_migrations};

    struct Fixture {
        pool: DynDatabasePool,
        repo: SqlxLikeRepository,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        Fixture {
            repo: SqlxLikeRepository::new(pool.clone()),
            pool,
        }
    }

    impl Fixture {
        async fn user(&self, name: &str) -> i64 {
            sqlx::query("INSERT INTO users (username, email, password_hash) VALUES (?, ?, 'hash')")
                .bind(name)
                .bind(format!("{}@example.com", name))
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .unwrap()
                .last_insert_rowid()
        }

        async fn article(&self, author: i64) -> i64 {
            sqlx::query("INSERT INTO articles (title, content, author_id) VALUES ('t', 'c', ?)")
                .bind(author)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .unwrap()
                .last_insert_rowid()
        }

        async fn stored_like_count(&self, article_id: i64) -> i64 {
            sqlx::query_scalar("SELECT like_count FROM articles WHERE id = ?")
                .bind(article_id)
                .fetch_one(self.pool.as_sqlite().unwrap())
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn test_toggle_flips_and_maintains_counter() {
        let f = setup().await;
        let alice = f.user("alice").await;
        let bob = f.user("bob").await;
        let article = f.article(alice).await;

        assert!(f.repo.toggle(alice, article).await.unwrap());
        assert!(f.repo.toggle(bob, article).await.unwrap());
        assert_eq!(f.repo.count_by_article(article).await.unwrap(), 2);
        assert_eq!(f.stored_like_count(article).await, 2);
        assert!(f.repo.exists(alice, article).await.unwrap());

        assert!(!f.repo.toggle(alice, article).await.unwrap());
        assert!(!f.repo.exists(alice, article).await.unwrap());
        assert_eq!(f.repo.count_by_article(article).await.unwrap(), 1);
        assert_eq!(f.stored_like_count(article).await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_toggles_leave_consistent_state() {
        let f = setup().await;
        let alice = f.user("alice").await;
        let article = f.article(alice).await;

        let (a, b) = tokio::join!(f.repo.toggle(alice, article), f.repo.toggle(alice, article));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a, b);

        let live = f.repo.count_by_article(article).await.unwrap();
        assert_eq!(live, 0);
        assert_eq!(f.stored_like_count(article).await, live);
    }

    #[tokio::test]
    async fn test_batch_counts_and_viewer_likes() {
        let f = setup().await;
        let alice = f.user("alice").await;
        let bob = f.user("bob").await;
        let a1 = f.article(alice).await;
        let a2 = f.article(alice).await;
        let a3 = f.article(alice).await;

        f.repo.toggle(alice, a1).await.unwrap();
        f.repo.toggle(bob, a1).await.unwrap();
        f.repo.toggle(bob, a2).await.unwrap();

        let counts = f.repo.count_by_articles(&[a1, a2, a3]).await.unwrap();
        assert_eq!(counts.get(&a1), Some(&2));
        assert_eq!(counts.get(&a2), Some(&1));
        assert_eq!(counts.get(&a3), None);

        let liked = f.repo.liked_among(bob, &[a1, a2, a3]).await.unwrap();
        assert_eq!(liked, HashSet::from([a1, a2]));
        let liked = f.repo.liked_among(alice, &[a2, a3]).await.unwrap();
        assert!(liked.is_empty());

        assert!(f.repo.count_by_articles(&[]).await.unwrap().is_empty());
        assert!(f.repo.liked_among(alice, &[]).await.unwrap().is_empty());
        assert_eq!(f.repo.count_all().await.unwrap(), 3);
    }
}
