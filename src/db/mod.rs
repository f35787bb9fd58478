//! Database layer
//!
//! SQLite is the default backend; MySQL is selected through
//! `database.driver`. Repositories hold a `DynDatabasePool` and run
//! backend-specific SQL through `DatabasePool::backend`.
//!
//! ```ignore
//! let pool = create_pool(&config.database).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, Backend, DatabasePool, DynDatabasePool, MysqlDatabase,
    SqliteDatabase,
};
