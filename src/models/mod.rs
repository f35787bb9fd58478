//! Data models
//!
//! Database entities plus the request and response shapes built from them.

mod article;
mod comment;
mod like;
mod session;
mod tag;
mod user;

pub use article::{
    like_pattern, total_pages, Article, ArticleFilter, ArticleOrder, ArticleView, AuthorSummary,
    CreateArticleInput, ListParams, PagedResult, SortMode, UpdateArticleInput,
};
pub use comment::{Comment, CreateCommentInput};
pub use like::LikeStatus;
pub use session::Session;
pub use tag::{normalize_tag_names, parse_tag_list, Tag, MAX_TAG_NAME_LEN};
pub use user::{CreateUserInput, UpdateUserInput, User};
