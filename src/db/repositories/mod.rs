//! Database repositories
//!
//! One repository per entity. Each exposes an async trait plus an SQLx
//! implementation that dispatches on the configured backend.

/// Run `$body` against whichever concrete pool backs `$pool`, for SQL that is
/// the same on SQLite and MySQL.
macro_rules! on_backend {
    ($pool:expr, |$p:ident| $body:expr) => {
        match $pool.backend()? {
            $crate::db::Backend::Sqlite($p) => $body,
            $crate::db::Backend::Mysql($p) => $body,
        }
    };
}

pub mod article;
pub mod comment;
pub mod like;
pub mod session;
pub mod tag;
pub mod user;

pub use article::{ArticleRepository, SqlxArticleRepository};
pub use comment::{CommentRepository, SqlxCommentRepository};
pub use like::{LikeRepository, SqlxLikeRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use tag::{SqlxTagRepository, TagRepository};
pub use user::{SqlxUserRepository, UserRepository};
