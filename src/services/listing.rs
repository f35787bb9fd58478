//! Article listing and ranking
//!
//! `ArticleListingService` answers every read of the article collection:
//! the filtered, paginated listing, the home page and single-article detail.
//! All of them share one annotation step which attaches live like counts,
//! the viewer's like flag, the author and the tags. That step issues a fixed
//! number of batch queries per page regardless of page size.
//!
//! The `popular` sort has two strategies (see [`PopularStrategy`]):
//!
//! - `Counter` sorts on `articles.like_count` in the store. The column is
//!   maintained in the same transaction as every like toggle.
//! - `Scan` counts live likes for every matching id in one grouped query and
//!   ranks in memory before slicing the requested page.
//!
//! Both break ties on ascending article id, so they return the same pages.

use crate::config::{ListingConfig, PopularStrategy};
use crate::db::repositories::{ArticleRepository, LikeRepository, TagRepository, UserRepository};
use crate::models::{
    Article, ArticleFilter, ArticleOrder, ArticleView, AuthorSummary, ListParams, PagedResult,
    SortMode, Tag,
};
use futures::try_join;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Error types for listing operations
#[derive(Debug, thiserror::Error)]
pub enum ListingError {
    /// The backing store failed
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] anyhow::Error),

    /// Sort value other than `newest`, `oldest` or `popular`
    #[error("Unsupported sort mode: {0}")]
    UnsupportedSortMode(String),
}

/// Filter and sort criteria for one listing request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingQuery {
    pub search: Option<String>,
    /// Exact tag name
    pub tag: Option<String>,
    pub sort: SortMode,
}

impl ListingQuery {
    /// Build a query from raw request values.
    ///
    /// Blank values count as absent. An absent sort means `newest`; any other
    /// unrecognised sort is rejected.
    pub fn parse(
        search: Option<&str>,
        tag: Option<&str>,
        sort: Option<&str>,
    ) -> Result<Self, ListingError> {
        let sort = match non_blank(sort) {
            None => SortMode::default(),
            Some(raw) => SortMode::from_str(&raw).ok_or(ListingError::UnsupportedSortMode(raw))?,
        };
        Ok(Self {
            search: non_blank(search),
            tag: non_blank(tag),
            sort,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Data for the home page
#[derive(Debug, Clone, Serialize)]
pub struct HomePage {
    pub articles: Vec<ArticleView>,
    pub tags: Vec<Tag>,
    pub total_likes: i64,
}

/// Read-side service for articles
pub struct ArticleListingService {
    articles: Arc<dyn ArticleRepository>,
    tags: Arc<dyn TagRepository>,
    likes: Arc<dyn LikeRepository>,
    users: Arc<dyn UserRepository>,
    config: ListingConfig,
}

impl ArticleListingService {
    pub fn new(
        articles: Arc<dyn ArticleRepository>,
        tags: Arc<dyn TagRepository>,
        likes: Arc<dyn LikeRepository>,
        users: Arc<dyn UserRepository>,
        config: ListingConfig,
    ) -> Self {
        Self {
            articles,
            tags,
            likes,
            users,
            config,
        }
    }

    pub fn page_size(&self) -> u32 {
        self.config.page_size
    }

    /// One page of articles matching `query`.
    ///
    /// Pages below 1 are treated as page 1. An unknown tag yields an empty
    /// result with zero pages. A page past the end has no items but still
    /// reports the real page count.
    pub async fn list_articles(
        &self,
        query: &ListingQuery,
        page: i64,
        viewer: Option<i64>,
    ) -> Result<PagedResult<ArticleView>, ListingError> {
        let params = ListParams::new(page, self.config.page_size);

        let filter = match self.resolve_filter(query).await? {
            Some(filter) => filter,
            None => {
                tracing::debug!("Tag {:?} not found, returning empty listing", query.tag);
                return Ok(PagedResult::empty(&params));
            }
        };

        let (articles, total) = match (query.sort, self.config.popular_strategy) {
            (SortMode::Popular, PopularStrategy::Scan) => self.rank_by_scan(&filter, &params).await?,
            (sort, _) => try_join!(
                self.articles.find(&filter, store_order(sort), Some(params)),
                self.articles.count(&filter),
            )?,
        };

        tracing::debug!(
            sort = %query.sort,
            page = params.page,
            total,
            returned = articles.len(),
            "Listed articles"
        );

        let items = self.annotate(articles, viewer).await?;
        Ok(PagedResult::new(items, total, &params))
    }

    /// The `limit` newest articles, annotated for `viewer`.
    pub async fn latest(&self, limit: u32, viewer: Option<i64>) -> Result<Vec<ArticleView>, ListingError> {
        Ok(self.latest_views(limit, viewer).await?)
    }

    /// A single annotated article, or `None` if it does not exist.
    pub async fn detail(&self, id: i64, viewer: Option<i64>) -> Result<Option<ArticleView>, ListingError> {
        let Some(article) = self.articles.get_by_id(id).await? else {
            return Ok(None);
        };
        let mut views = self.annotate(vec![article], viewer).await?;
        Ok(views.pop())
    }

    pub async fn home(&self, viewer: Option<i64>) -> Result<HomePage, ListingError> {
        let (articles, tags, total_likes) = try_join!(
            self.latest_views(self.config.home_limit, viewer),
            self.tags.list(Some(self.config.home_tag_limit as i64)),
            self.likes.count_all(),
        )?;
        Ok(HomePage {
            articles,
            tags,
            total_likes,
        })
    }

    async fn latest_views(&self, limit: u32, viewer: Option<i64>) -> anyhow::Result<Vec<ArticleView>> {
        let window = ListParams::new(1, limit);
        let articles = self
            .articles
            .find(&ArticleFilter::default(), ArticleOrder::Newest, Some(window))
            .await?;
        self.annotate(articles, viewer).await
    }

    /// Store filter for `query`, or `None` when the named tag does not exist.
    async fn resolve_filter(&self, query: &ListingQuery) -> anyhow::Result<Option<ArticleFilter>> {
        let tag_id = match &query.tag {
            Some(name) => match self.tags.get_by_name(name).await? {
                Some(tag) => Some(tag.id),
                None => return Ok(None),
            },
            None => None,
        };
        Ok(Some(ArticleFilter::new(query.search.clone(), tag_id)))
    }

    async fn rank_by_scan(
        &self,
        filter: &ArticleFilter,
        params: &ListParams,
    ) -> anyhow::Result<(Vec<Article>, i64)> {
        let counted = self.articles.find_ids_with_like_counts(filter).await?;
        let total = counted.len() as i64;
        let ids: Vec<i64> = counted.iter().map(|(id, _)| *id).collect();
        let counts: HashMap<i64, i64> = counted.into_iter().collect();

        let window: Vec<i64> = rank_by_likes(ids, &counts)
            .into_iter()
            .skip(params.offset() as usize)
            .take(params.limit() as usize)
            .collect();

        let position: HashMap<i64, usize> = window.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let mut articles = self.articles.get_by_ids(&window).await?;
        articles.sort_by_key(|a| position.get(&a.id).copied().unwrap_or(usize::MAX));
        Ok((articles, total))
    }

    async fn annotate(&self, articles: Vec<Article>, viewer: Option<i64>) -> anyhow::Result<Vec<ArticleView>> {
        if articles.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = articles.iter().map(|a| a.id).collect();
        let mut author_ids: Vec<i64> = articles.iter().map(|a| a.author_id).collect();
        author_ids.sort_unstable();
        author_ids.dedup();

        let viewer_likes = async {
            match viewer {
                Some(user_id) => self.likes.liked_among(user_id, &ids).await,
                None => Ok(HashSet::new()),
            }
        };

        let (counts, liked, authors, mut tags) = try_join!(
            self.likes.count_by_articles(&ids),
            viewer_likes,
            self.users.get_by_ids(&author_ids),
            self.tags.get_by_article_ids(&ids),
        )?;

        let authors: HashMap<i64, AuthorSummary> =
            authors.iter().map(|u| (u.id, u.summary())).collect();

        Ok(articles
            .into_iter()
            .map(|article| ArticleView {
                like_count: counts.get(&article.id).copied().unwrap_or(0),
                is_liked: liked.contains(&article.id),
                author: authors.get(&article.author_id).cloned(),
                tags: tags.remove(&article.id).unwrap_or_default(),
                article,
            })
            .collect())
    }
}

fn store_order(sort: SortMode) -> ArticleOrder {
    match sort {
        SortMode::Newest => ArticleOrder::Newest,
        SortMode::Oldest => ArticleOrder::Oldest,
        SortMode::Popular => ArticleOrder::MostLiked,
    }
}

/// Order ids by like count descending, then id ascending.
pub fn rank_by_likes(mut ids: Vec<i64>, counts: &HashMap<i64, i64>) -> Vec<i64> {
    let likes = |id: &i64| counts.get(id).copied().unwrap_or(0);
    ids.sort_by(|a, b| likes(b).cmp(&likes(a)).then(a.cmp(b)));
    ids
}
