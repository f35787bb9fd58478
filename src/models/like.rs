//! Like model
//!
//! Likes are stored as `(user_id, article_id)` rows with a unique pair; only
//! the toggle outcome crosses the API.

use serde::{Deserialize, Serialize};

/// Outcome of a like toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeStatus {
    /// Whether the user likes the article after the toggle
    pub liked: bool,
    pub like_count: i64,
}
