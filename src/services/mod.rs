//! Services layer - Business logic
//!
//! Services validate input, enforce ownership rules and coordinate the
//! repositories. They return per-service `thiserror` enums which the API
//! layer maps onto HTTP responses.

pub mod article;
pub mod comment;
pub mod like;
pub mod listing;
pub mod password;
pub mod user;

pub use article::{ArticleService, ArticleServiceError};
pub use comment::{CommentService, CommentServiceError};
pub use like::{LikeService, LikeServiceError};
pub use listing::{ArticleListingService, HomePage, ListingError, ListingQuery};
pub use password::{hash_password, verify_password};
pub use user::{LoginInput, UserService, UserServiceError};
