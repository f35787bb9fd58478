//! Session repository
//!
//! Sessions are keyed by their token. Expired rows are ignored on lookup and
//! removed in bulk by `delete_expired`.

use crate::db::DynDatabasePool;
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Look up an unexpired session by token
    async fn get_valid(&self, id: &str) -> Result<Option<Session>>;

    /// Delete a session, returning whether it existed
    async fn delete(&self, id: &str) -> Result<bool>;

    async fn delete_by_user(&self, user_id: i64) -> Result<u64>;

    /// Delete expired sessions, returning how many were removed
    async fn delete_expired(&self) -> Result<u64>;
}

/// SQLx-based session repository
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        let sql = "INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)";
        on_backend!(self.pool, |pool| {
            sqlx::query(sql)
                .bind(&session.id)
                .bind(session.user_id)
                .bind(session.expires_at)
                .bind(session.created_at)
                .execute(pool)
                .await
                .context("Failed to create session")?;
        });
        Ok(session.clone())
    }

    async fn get_valid(&self, id: &str) -> Result<Option<Session>> {
        let sql = r#"
            SELECT id, user_id, expires_at, created_at
            FROM sessions
            WHERE id = ? AND expires_at > ?
        "#;
        let now = Utc::now();
        on_backend!(self.pool, |pool| {
            let row = sqlx::query(sql)
                .bind(id)
                .bind(now)
                .fetch_optional(pool)
                .await
                .context("Failed to get session")?;
            match row {
                Some(row) => Ok(Some(Session {
                    id: row.try_get("id")?,
                    user_id: row.try_get("user_id")?,
                    expires_at: row.try_get("expires_at")?,
                    created_at: row.try_get("created_at")?,
                })),
                None => Ok(None),
            }
        })
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let affected = on_backend!(self.pool, |pool| {
            sqlx::query("DELETE FROM sessions WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete session")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<u64> {
        let affected = on_backend!(self.pool, |pool| {
            sqlx::query("DELETE FROM sessions WHERE user_id = ?")
                .bind(user_id)
                .execute(pool)
                .await
                .context("Failed to delete user sessions")?
                .rows_affected()
        });
        Ok(affected)
    }

    async fn delete_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let affected = on_backend!(self.pool, |pool| {
            sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
                .bind(now)
                .execute(pool)
                .await
                .context("Failed to delete expired sessions")?
                .rows_affected()
        });
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations::run_migrations};
    use chrono::Duration;

    async fn setup_test_repo() -> (DynDatabasePool, SqlxSessionRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        (pool.clone(), SqlxSessionRepository::new(pool))
    }

    async fn create_test_user(pool: &DynDatabasePool, username: &str) -> i64 {
        sqlx::query("INSERT INTO users (username, email, password_hash) VALUES (?, ?, ?)")
            .bind(username)
            .bind(format!("{}@example.com", username))
            .bind("hash")
            .execute(pool.as_sqlite().unwrap())
            .await
            .expect("Failed to create user")
            .last_insert_rowid()
    }

    fn expired_session(user_id: i64) -> Session {
        let mut session = Session::issue(user_id, 1);
        session.expires_at = Utc::now() - Duration::hours(1);
        session
    }

    #[tokio::test]
    async fn test_create_and_get_valid() {
        let (pool, repo) = setup_test_repo().await;
        let user_id = create_test_user(&pool, "alice").await;

        let session = repo.create(&Session::issue(user_id, 7)).await.unwrap();
        let found = repo.get_valid(&session.id).await.unwrap().unwrap();
        assert_eq!(found.user_id, user_id);
        assert!(repo.get_valid("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_session_not_valid() {
        let (pool, repo) = setup_test_repo().await;
        let user_id = create_test_user(&pool, "alice").await;

        let session = repo.create(&expired_session(user_id)).await.unwrap();
        assert!(repo.get_valid(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let (pool, repo) = setup_test_repo().await;
        let user_id = create_test_user(&pool, "alice").await;

        let session = repo.create(&Session::issue(user_id, 7)).await.unwrap();
        assert!(repo.delete(&session.id).await.unwrap());
        assert!(!repo.delete(&session.id).await.unwrap());
        assert!(repo.get_valid(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_by_user_and_expired() {
        let (pool, repo) = setup_test_repo().await;
        let alice = create_test_user(&pool, "alice").await;
        let bob = create_test_user(&pool, "bob").await;

        repo.create(&Session::issue(alice, 7)).await.unwrap();
        repo.create(&Session::issue(alice, 7)).await.unwrap();
        repo.create(&expired_session(bob)).await.unwrap();
        let live = repo.create(&Session::issue(bob, 7)).await.unwrap();

        assert_eq!(repo.delete_by_user(alice).await.unwrap(), 2);
        assert_eq!(repo.delete_expired().await.unwrap(), 1);
        assert!(repo.get_valid(&live.id).await.unwrap().is_some());
    }
}
