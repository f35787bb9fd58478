//! User repository
//!
//! - `UserRepository` trait defining user data access
//! - `SqlxUserRepository` implementing it for SQLite and MySQL

use crate::db::{Backend, DynDatabasePool};
use crate::models::User;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySql, MySqlPool, QueryBuilder, Row, Sqlite, SqlitePool};
use std::sync::Arc;

const USER_COLUMNS: &str =
    "id, username, email, password_hash, full_name, is_active, created_at, updated_at";

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user and return it with its assigned id
    async fn create(&self, user: &User) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Fetch several users in one query. Unknown ids are skipped.
    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<User>>;

    /// Persist username, email, full name, password hash and `updated_at`
    async fn update(&self, user: &User) -> Result<User>;
}

/// SQLx-based user repository
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => create_user_sqlite(pool, user).await,
            Backend::Mysql(pool) => create_user_mysql(pool, user).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get user by id")?;
                row.as_ref().map(row_to_user_sqlite).transpose()
            }
            Backend::Mysql(pool) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get user by id")?;
                row.as_ref().map(row_to_user_mysql).transpose()
            }
        }
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => get_user_by_field_sqlite(pool, "username", username).await,
            Backend::Mysql(pool) => get_user_by_field_mysql(pool, "username", username).await,
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => get_user_by_field_sqlite(pool, "email", email).await,
            Backend::Mysql(pool) => get_user_by_field_mysql(pool, "email", email).await,
        }
    }

    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        match self.pool.backend()? {
            Backend::Sqlite(pool) => get_users_by_ids_sqlite(pool, ids).await,
            Backend::Mysql(pool) => get_users_by_ids_mysql(pool, ids).await,
        }
    }

    async fn update(&self, user: &User) -> Result<User> {
        let sql = r#"
            UPDATE users
            SET username = ?, email = ?, full_name = ?, password_hash = ?, updated_at = ?
            WHERE id = ?
        "#;
        let now = chrono::Utc::now();
        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                sqlx::query(sql)
                    .bind(&user.username)
                    .bind(&user.email)
                    .bind(&user.full_name)
                    .bind(&user.password_hash)
                    .bind(now)
                    .bind(user.id)
                    .execute(pool)
                    .await
                    .context("Failed to update user")?;
            }
            Backend::Mysql(pool) => {
                sqlx::query(sql)
                    .bind(&user.username)
                    .bind(&user.email)
                    .bind(&user.full_name)
                    .bind(&user.password_hash)
                    .bind(now)
                    .bind(user.id)
                    .execute(pool)
                    .await
                    .context("Failed to update user")?;
            }
        }
        Ok(User {
            updated_at: now,
            ..user.clone()
        })
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (username, email, password_hash, full_name, is_active, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.full_name)
    .bind(user.is_active)
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_rowid(),
        ..user.clone()
    })
}

async fn get_user_by_field_sqlite(
    pool: &SqlitePool,
    field: &'static str,
    value: &str,
) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, field);
    let row = sqlx::query(&sql)
        .bind(value)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to get user by {}", field))?;
    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn get_users_by_ids_sqlite(pool: &SqlitePool, ids: &[i64]) -> Result<Vec<User>> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM users WHERE id IN (", USER_COLUMNS));
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    qb.push(")");

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to get users by ids")?;
    rows.iter().map(row_to_user_sqlite).collect()
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        full_name: row.try_get("full_name")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (username, email, password_hash, full_name, is_active, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.full_name)
    .bind(user.is_active)
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_id() as i64,
        ..user.clone()
    })
}

async fn get_user_by_field_mysql(
    pool: &MySqlPool,
    field: &'static str,
    value: &str,
) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, field);
    let row = sqlx::query(&sql)
        .bind(value)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to get user by {}", field))?;
    row.as_ref().map(row_to_user_mysql).transpose()
}

async fn get_users_by_ids_mysql(pool: &MySqlPool, ids: &[i64]) -> Result<Vec<User>> {
    let mut qb = QueryBuilder::<MySql>::new(format!("SELECT {} FROM users WHERE id IN (", USER_COLUMNS));
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    qb.push(")");

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to get users by ids")?;
    rows.iter().map(row_to_user_mysql).collect()
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        full_name: row.try_get("full_name")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations::run_migrations};

    async fn setup_test_repo() -> SqlxUserRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        SqlxUserRepository::new(pool)
    }

    fn new_user(name: &str) -> User {
        User::new(
            name.to_string(),
            format!("{}@example.com", name),
            "hash".to_string(),
            Some(format!("{} Example", name)),
        )
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let repo = setup_test_repo().await;
        let created = repo.create(&new_user("alice")).await.unwrap();
        assert!(created.id > 0);

        let by_id = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.username, "alice");
        assert_eq!(by_id.full_name.as_deref(), Some("alice Example"));
        assert!(by_id.is_active);

        let by_name = repo.get_by_username("alice").await.unwrap().unwrap();
        assert_eq!(by_name.id, created.id);
        let by_email = repo.get_by_email("alice@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, created.id);

        assert!(repo.get_by_username("nobody").await.unwrap().is_none());
        assert!(repo.get_by_id(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let repo = setup_test_repo().await;
        repo.create(&new_user("alice")).await.unwrap();

        let mut dup = new_user("alice");
        dup.email = "other@example.com".into();
        assert!(repo.create(&dup).await.is_err());
    }

    #[tokio::test]
    async fn test_get_by_ids() {
        let repo = setup_test_repo().await;
        let a = repo.create(&new_user("alice")).await.unwrap();
        let b = repo.create(&new_user("bob")).await.unwrap();
        repo.create(&new_user("carol")).await.unwrap();

        let mut users = repo.get_by_ids(&[a.id, b.id, 404]).await.unwrap();
        users.sort_by_key(|u| u.id);
        let names: Vec<_> = users.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob"]);

        assert!(repo.get_by_ids(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update() {
        let repo = setup_test_repo().await;
        let mut user = repo.create(&new_user("alice")).await.unwrap();

        user.username = "alice2".into();
        user.full_name = None;
        repo.update(&user).await.unwrap();

        let stored = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.username, "alice2");
        assert!(stored.full_name.is_none());
    }
}
