//! Article model and listing query types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Tag;

/// Article entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author_id: i64,
    /// Number of likes, kept in step with the `likes` table on every toggle
    pub like_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new article
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateArticleInput {
    pub title: String,
    pub content: String,
    /// Tag names; unknown names are created on save
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Input for editing an article. Every field is replaced, including the tag set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateArticleInput {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Row filter shared by listing, counting and scanning queries.
///
/// `search` is matched as a literal substring of title or content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleFilter {
    pub search: Option<String>,
    pub tag_id: Option<i64>,
}

impl ArticleFilter {
    pub fn new(search: Option<String>, tag_id: Option<i64>) -> Self {
        Self { search, tag_id }
    }

    /// SQL `LIKE` pattern for the search text, escaped with `!`.
    pub fn search_pattern(&self) -> Option<String> {
        self.search.as_deref().map(like_pattern)
    }
}

/// Wrap `text` in `%..%`, escaping `LIKE` wildcards so it matches literally.
/// Pair with `ESCAPE '!'`.
pub fn like_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '!' | '%' | '_') {
            pattern.push('!');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Ordering a store query can produce natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleOrder {
    /// `created_at DESC, id DESC`
    Newest,
    /// `created_at ASC, id ASC`
    Oldest,
    /// `like_count DESC, id ASC`
    MostLiked,
}

impl ArticleOrder {
    pub fn sql(&self) -> &'static str {
        match self {
            ArticleOrder::Newest => "a.created_at DESC, a.id DESC",
            ArticleOrder::Oldest => "a.created_at ASC, a.id ASC",
            ArticleOrder::MostLiked => "a.like_count DESC, a.id ASC",
        }
    }
}

/// User-facing sort mode for the article listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    #[default]
    Newest,
    Oldest,
    Popular,
}

impl SortMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::Newest => "newest",
            SortMode::Oldest => "oldest",
            SortMode::Popular => "popular",
        }
    }

    /// Exact, case-sensitive parse. Unknown values are `None`.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "newest" => Some(SortMode::Newest),
            "oldest" => Some(SortMode::Oldest),
            "popular" => Some(SortMode::Popular),
            _ => None,
        }
    }
}

impl std::fmt::Display for SortMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pagination parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListParams {
    /// Page number (1-indexed)
    pub page: u32,
    pub per_page: u32,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
        }
    }
}

impl ListParams {
    /// Pages below 1 are clamped to 1; `per_page` is at least 1.
    pub fn new(page: i64, per_page: u32) -> Self {
        Self {
            page: page.clamp(1, u32::MAX as i64) as u32,
            per_page: per_page.max(1),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.per_page as i64
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

/// Number of pages needed for `total` items, zero when there are none.
pub fn total_pages(total: i64, per_page: u32) -> u32 {
    if total <= 0 || per_page == 0 {
        return 0;
    }
    let per_page = per_page as i64;
    ((total + per_page - 1) / per_page) as u32
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    /// Items matching across all pages
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total: i64, params: &ListParams) -> Self {
        Self {
            items,
            total,
            page: params.page,
            per_page: params.per_page,
            total_pages: total_pages(total, params.per_page),
        }
    }

    pub fn empty(params: &ListParams) -> Self {
        Self::new(Vec::new(), 0, params)
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

/// Public author details shown next to an article
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorSummary {
    pub id: i64,
    pub username: String,
    pub full_name: Option<String>,
}

/// An article with request-scoped annotations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleView {
    pub article: Article,
    /// Live count of likes
    pub like_count: i64,
    /// Whether the requesting viewer likes this article; false for anonymous viewers
    pub is_liked: bool,
    pub author: Option<AuthorSummary>,
    pub tags: Vec<Tag>,
}
