//! Capability interfaces the engine consumes, plus the bundled backends.
//!
//! Every write is a single-key upsert or delete; implementations are expected
//! to make each of those atomic.

pub mod memory;
pub mod redis;

use crate::algorithms::engagement_score;
use crate::error::EngineResult;
use crate::models::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use self::memory::MemoryStore;
pub use self::redis::RedisInterestStore;

/// Independent catalog queries behind the discovery feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentQuery {
    /// Published items created at or after `since`.
    Trending { since: DateTime<Utc> },
    Popular,
    Newest,
}

impl ContentQuery {
    /// Orders `items` the way this feed is ranked.
    pub fn rank(&self, items: &mut [ContentItem]) {
        match self {
            ContentQuery::Trending { .. } => items.sort_by(|a, b| {
                b.views
                    .cmp(&a.views)
                    .then_with(|| b.likes.cmp(&a.likes))
            }),
            ContentQuery::Popular => items.sort_by(|a, b| {
                engagement_score(b).cmp(&engagement_score(a))
            }),
            ContentQuery::Newest => items.sort_by(|a, b| {
                b.created_at
                    .cmp(&a.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            }),
        }
    }
}

#[async_trait]
pub trait ContentReader: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> EngineResult<Option<ContentItem>>;

    /// Published items, newest first. `page` starts at 1.
    async fn list_published(&self, page: usize, limit: usize) -> EngineResult<Vec<ContentItem>>;

    /// Published items carrying any of `tags` or written by any of `authors`.
    async fn list_by_topics(
        &self,
        tags: &[String],
        authors: &[Uuid],
        limit: usize,
    ) -> EngineResult<Vec<ContentItem>>;

    async fn query(&self, query: ContentQuery, limit: usize) -> EngineResult<Vec<ContentItem>>;
}

#[async_trait]
pub trait BehaviorStore: Send + Sync {
    async fn append(&self, action: &UserAction) -> EngineResult<()>;

    /// Most recent first.
    async fn list_recent(&self, user_id: Uuid, limit: usize) -> EngineResult<Vec<UserAction>>;

    /// Distinct users that have at least one recorded action.
    async fn list_users(&self, limit: usize) -> EngineResult<Vec<Uuid>>;

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> EngineResult<usize>;
}

#[async_trait]
pub trait SimilarityStore: Send + Sync {
    /// Keyed on the unordered pair.
    async fn upsert_edge(&self, edge: ContentSimilarityEdge) -> EngineResult<()>;

    async fn get_edge(&self, a: Uuid, b: Uuid) -> EngineResult<Option<ContentSimilarityEdge>>;

    /// Returns whether an edge was removed.
    async fn delete_edge(&self, a: Uuid, b: Uuid) -> EngineResult<bool>;

    /// Edges touching `item_id`, highest score first.
    async fn edges_for(&self, item_id: Uuid, limit: usize) -> EngineResult<Vec<ContentSimilarityEdge>>;

    async fn delete_stale(&self, cutoff: DateTime<Utc>) -> EngineResult<usize>;
}

#[async_trait]
pub trait InterestStore: Send + Sync {
    /// Keyed on `(user_id, topic)`; keeps the first `created_at`.
    async fn upsert(&self, interest: UserInterest) -> EngineResult<()>;

    /// Highest weight first.
    async fn list(&self, user_id: Uuid) -> EngineResult<Vec<UserInterest>>;

    async fn delete_topics(&self, user_id: Uuid, topics: &[String]) -> EngineResult<usize>;
}

#[async_trait]
pub trait RecommendationStore: Send + Sync {
    /// Upserts `batch` keyed on `(user_id, content_id)` and returns the rows
    /// as stored. An unexpired row for the same content keeps its id and
    /// viewed state. Rows not in `batch` stay until they expire.
    async fn upsert_batch(
        &self,
        user_id: Uuid,
        batch: Vec<UserRecommendation>,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<UserRecommendation>>;

    /// Unexpired rows, highest score first.
    async fn list_active(
        &self,
        user_id: Uuid,
        category: RecommendationCategory,
        now: DateTime<Utc>,
        limit: usize,
    ) -> EngineResult<Vec<UserRecommendation>>;

    async fn find_active(
        &self,
        user_id: Uuid,
        content_id: Uuid,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<UserRecommendation>>;

    /// Returns the row after the update and whether this call flipped it.
    /// `None` when the id is unknown.
    async fn mark_viewed(
        &self,
        recommendation_id: Uuid,
        at: DateTime<Utc>,
    ) -> EngineResult<Option<(UserRecommendation, bool)>>;

    async fn delete_expired(&self, now: DateTime<Utc>) -> EngineResult<usize>;
}

#[async_trait]
pub trait StatsStore: Send + Sync {
    /// Creates zeroed stats on first read.
    async fn get_or_create(&self, user_id: Uuid) -> EngineResult<RecommendationStats>;

    async fn record_batch(
        &self,
        user_id: Uuid,
        count: u64,
        score_sum: f64,
        at: DateTime<Utc>,
    ) -> EngineResult<()>;

    async fn record_viewed(&self, user_id: Uuid) -> EngineResult<()>;

    async fn record_clicked(&self, user_id: Uuid) -> EngineResult<()>;
}
