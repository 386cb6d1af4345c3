use super::*;
use crate::error::EngineResult;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use tracing::info;

/// In-process backend for every store trait.
///
/// The content catalog keeps tag and author inverted indexes so candidate
/// retrieval does not have to walk the whole catalog.
#[derive(Default)]
pub struct MemoryStore {
    items: DashMap<Uuid, ContentItem>,
    tag_index: DashMap<String, HashSet<Uuid>>,
    author_index: DashMap<Uuid, HashSet<Uuid>>,
    behaviors: DashMap<Uuid, Vec<UserAction>>,
    edges: DashMap<(Uuid, Uuid), ContentSimilarityEdge>,
    interests: DashMap<Uuid, HashMap<String, UserInterest>>,
    recommendations: DashMap<Uuid, Vec<UserRecommendation>>,
    recommendation_owner: DashMap<Uuid, Uuid>,
    stats: DashMap<Uuid, RecommendationStats>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_item(&self, item: ContentItem) {
        if let Some(previous) = self.items.insert(item.id, item.clone()) {
            self.unindex(&previous);
        }
        for tag in &item.tags {
            self.tag_index.entry(tag.clone()).or_default().insert(item.id);
        }
        self.author_index.entry(item.author_id).or_default().insert(item.id);
        info!("Inserted content item: {}", item.id);
    }

    pub fn remove_item(&self, id: Uuid) -> Option<ContentItem> {
        let (_, item) = self.items.remove(&id)?;
        self.unindex(&item);
        Some(item)
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    fn unindex(&self, item: &ContentItem) {
        for tag in &item.tags {
            if let Some(mut ids) = self.tag_index.get_mut(tag) {
                ids.remove(&item.id);
            }
        }
        if let Some(mut ids) = self.author_index.get_mut(&item.author_id) {
            ids.remove(&item.id);
        }
    }

    fn published_newest_first(&self) -> Vec<ContentItem> {
        let mut items: Vec<ContentItem> = self
            .items
            .iter()
            .filter(|entry| entry.published)
            .map(|entry| entry.value().clone())
            .collect();
        ContentQuery::Newest.rank(&mut items);
        items
    }
}

#[async_trait]
impl ContentReader for MemoryStore {
    async fn get_by_id(&self, id: Uuid) -> EngineResult<Option<ContentItem>> {
        Ok(self.items.get(&id).map(|item| item.clone()))
    }

    async fn list_published(&self, page: usize, limit: usize) -> EngineResult<Vec<ContentItem>> {
        let offset = page.saturating_sub(1) * limit;
        Ok(self
            .published_newest_first()
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }

    async fn list_by_topics(
        &self,
        tags: &[String],
        authors: &[Uuid],
        limit: usize,
    ) -> EngineResult<Vec<ContentItem>> {
        let mut ids = HashSet::new();
        for tag in tags {
            if let Some(tagged) = self.tag_index.get(tag) {
                ids.extend(tagged.iter().copied());
            }
        }
        for author in authors {
            if let Some(written) = self.author_index.get(author) {
                ids.extend(written.iter().copied());
            }
        }

        let mut items: Vec<ContentItem> = ids
            .into_iter()
            .filter_map(|id| self.items.get(&id).map(|item| item.clone()))
            .filter(|item| item.published)
            .collect();
        ContentQuery::Newest.rank(&mut items);
        items.truncate(limit);
        Ok(items)
    }

    async fn query(&self, query: ContentQuery, limit: usize) -> EngineResult<Vec<ContentItem>> {
        let mut items = self.published_newest_first();
        if let ContentQuery::Trending { since } = query {
            items.retain(|item| item.created_at >= since);
        }
        query.rank(&mut items);
        items.truncate(limit);
        Ok(items)
    }
}

#[async_trait]
impl BehaviorStore for MemoryStore {
    async fn append(&self, action: &UserAction) -> EngineResult<()> {
        self.behaviors
            .entry(action.user_id)
            .or_default()
            .push(action.clone());
        Ok(())
    }

    async fn list_recent(&self, user_id: Uuid, limit: usize) -> EngineResult<Vec<UserAction>> {
        let mut actions = match self.behaviors.get(&user_id) {
            Some(actions) => actions.clone(),
            None => return Ok(Vec::new()),
        };
        actions.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        actions.truncate(limit);
        Ok(actions)
    }

    async fn list_users(&self, limit: usize) -> EngineResult<Vec<Uuid>> {
        let mut users: Vec<Uuid> = self.behaviors.iter().map(|entry| *entry.key()).collect();
        users.sort();
        users.truncate(limit);
        Ok(users)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> EngineResult<usize> {
        let mut removed = 0;
        for mut entry in self.behaviors.iter_mut() {
            let before = entry.len();
            entry.retain(|action| action.occurred_at >= cutoff);
            removed += before - entry.len();
        }
        self.behaviors.retain(|_, actions| !actions.is_empty());
        Ok(removed)
    }
}

#[async_trait]
impl SimilarityStore for MemoryStore {
    async fn upsert_edge(&self, edge: ContentSimilarityEdge) -> EngineResult<()> {
        let key = ContentSimilarityEdge::pair_key(edge.item_a, edge.item_b);
        self.edges.insert(key, edge);
        Ok(())
    }

    async fn get_edge(&self, a: Uuid, b: Uuid) -> EngineResult<Option<ContentSimilarityEdge>> {
        let key = ContentSimilarityEdge::pair_key(a, b);
        Ok(self.edges.get(&key).map(|edge| edge.clone()))
    }

    async fn delete_edge(&self, a: Uuid, b: Uuid) -> EngineResult<bool> {
        let key = ContentSimilarityEdge::pair_key(a, b);
        Ok(self.edges.remove(&key).is_some())
    }

    async fn edges_for(&self, item_id: Uuid, limit: usize) -> EngineResult<Vec<ContentSimilarityEdge>> {
        let mut edges: Vec<ContentSimilarityEdge> = self
            .edges
            .iter()
            .filter(|edge| edge.item_a == item_id || edge.item_b == item_id)
            .map(|edge| edge.value().clone())
            .collect();
        edges.sort_by(|a, b| crate::algorithms::by_score_desc(a.score, b.score));
        edges.truncate(limit);
        Ok(edges)
    }

    async fn delete_stale(&self, cutoff: DateTime<Utc>) -> EngineResult<usize> {
        let before = self.edges.len();
        self.edges.retain(|_, edge| edge.last_updated >= cutoff);
        Ok(before.saturating_sub(self.edges.len()))
    }
}

#[async_trait]
impl InterestStore for MemoryStore {
    async fn upsert(&self, interest: UserInterest) -> EngineResult<()> {
        let mut topics = self.interests.entry(interest.user_id).or_default();
        match topics.get_mut(&interest.topic) {
            Some(existing) => {
                existing.weight = interest.weight;
                existing.last_seen = interest.last_seen;
                existing.updated_at = interest.updated_at;
            }
            None => {
                topics.insert(interest.topic.clone(), interest);
            }
        }
        Ok(())
    }

    async fn list(&self, user_id: Uuid) -> EngineResult<Vec<UserInterest>> {
        let mut interests: Vec<UserInterest> = match self.interests.get(&user_id) {
            Some(topics) => topics.values().cloned().collect(),
            None => return Ok(Vec::new()),
        };
        interests.sort_by(|a, b| {
            crate::algorithms::by_score_desc(a.weight, b.weight).then_with(|| a.topic.cmp(&b.topic))
        });
        Ok(interests)
    }

    async fn delete_topics(&self, user_id: Uuid, topics: &[String]) -> EngineResult<usize> {
        let mut removed = 0;
        if let Some(mut stored) = self.interests.get_mut(&user_id) {
            for topic in topics {
                if stored.remove(topic).is_some() {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl RecommendationStore for MemoryStore {
    async fn upsert_batch(
        &self,
        user_id: Uuid,
        batch: Vec<UserRecommendation>,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<UserRecommendation>> {
        let mut rows = self.recommendations.entry(user_id).or_default();

        let mut expired = Vec::new();
        rows.retain(|row| {
            if row.is_expired(now) {
                expired.push(row.id);
                false
            } else {
                true
            }
        });
        for id in &expired {
            self.recommendation_owner.remove(id);
        }

        let mut stored = Vec::with_capacity(batch.len());
        for incoming in batch {
            match rows.iter_mut().find(|row| row.content_id == incoming.content_id) {
                Some(existing) => {
                    existing.score = incoming.score;
                    existing.reason = incoming.reason;
                    existing.category = incoming.category;
                    existing.generated_at = incoming.generated_at;
                    existing.expires_at = incoming.expires_at;
                    stored.push(existing.clone());
                }
                None => {
                    self.recommendation_owner.insert(incoming.id, user_id);
                    stored.push(incoming.clone());
                    rows.push(incoming);
                }
            }
        }
        Ok(stored)
    }

    async fn list_active(
        &self,
        user_id: Uuid,
        category: RecommendationCategory,
        now: DateTime<Utc>,
        limit: usize,
    ) -> EngineResult<Vec<UserRecommendation>> {
        let mut rows: Vec<UserRecommendation> = match self.recommendations.get(&user_id) {
            Some(rows) => rows
                .iter()
                .filter(|row| !row.is_expired(now) && category.matches(row.category))
                .cloned()
                .collect(),
            None => return Ok(Vec::new()),
        };
        rows.sort_by(|a, b| crate::algorithms::by_score_desc(a.score, b.score));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn find_active(
        &self,
        user_id: Uuid,
        content_id: Uuid,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<UserRecommendation>> {
        Ok(self.recommendations.get(&user_id).and_then(|rows| {
            rows.iter()
                .find(|row| row.content_id == content_id && !row.is_expired(now))
                .cloned()
        }))
    }

    async fn mark_viewed(
        &self,
        recommendation_id: Uuid,
        at: DateTime<Utc>,
    ) -> EngineResult<Option<(UserRecommendation, bool)>> {
        let owner = match self.recommendation_owner.get(&recommendation_id) {
            Some(owner) => *owner,
            None => return Ok(None),
        };
        let mut rows = match self.recommendations.get_mut(&owner) {
            Some(rows) => rows,
            None => return Ok(None),
        };
        let row = match rows.iter_mut().find(|row| row.id == recommendation_id) {
            Some(row) => row,
            None => return Ok(None),
        };

        let flipped = !row.is_viewed;
        if flipped {
            row.is_viewed = true;
            row.viewed_at = Some(at);
        }
        Ok(Some((row.clone(), flipped)))
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> EngineResult<usize> {
        let mut expired_ids = Vec::new();
        for mut entry in self.recommendations.iter_mut() {
            entry.retain(|row| {
                if row.is_expired(now) {
                    expired_ids.push(row.id);
                    false
                } else {
                    true
                }
            });
        }
        self.recommendations.retain(|_, rows| !rows.is_empty());
        for id in &expired_ids {
            self.recommendation_owner.remove(id);
        }
        Ok(expired_ids.len())
    }
}

#[async_trait]
impl StatsStore for MemoryStore {
    async fn get_or_create(&self, user_id: Uuid) -> EngineResult<RecommendationStats> {
        Ok(self
            .stats
            .entry(user_id)
            .or_insert_with(|| RecommendationStats::empty(user_id))
            .clone())
    }

    async fn record_batch(
        &self,
        user_id: Uuid,
        count: u64,
        score_sum: f64,
        at: DateTime<Utc>,
    ) -> EngineResult<()> {
        self.stats
            .entry(user_id)
            .or_insert_with(|| RecommendationStats::empty(user_id))
            .record_batch(count, score_sum, at);
        Ok(())
    }

    async fn record_viewed(&self, user_id: Uuid) -> EngineResult<()> {
        let mut stats = self
            .stats
            .entry(user_id)
            .or_insert_with(|| RecommendationStats::empty(user_id));
        stats.viewed += 1;
        stats.updated_at = Utc::now();
        Ok(())
    }

    async fn record_clicked(&self, user_id: Uuid) -> EngineResult<()> {
        let mut stats = self
            .stats
            .entry(user_id)
            .or_insert_with(|| RecommendationStats::empty(user_id));
        stats.clicked += 1;
        stats.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn item(author: Uuid, tags: &[&str]) -> ContentItem {
        ContentItem::new("title", "body", author, tags.iter().map(|t| t.to_string()).collect())
    }

    #[tokio::test]
    async fn topic_index_follows_item_updates() {
        let store = MemoryStore::new();
        let author = Uuid::new_v4();
        let mut post = item(author, &["go"]);
        store.insert_item(post.clone());

        let hits = store.list_by_topics(&["go".to_string()], &[], 10).await.unwrap();
        assert_eq!(hits.len(), 1);

        post.tags = vec!["rust".to_string()];
        store.insert_item(post.clone());
        assert!(store.list_by_topics(&["go".to_string()], &[], 10).await.unwrap().is_empty());
        assert_eq!(store.list_by_topics(&[], &[author], 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unpublished_items_are_hidden_from_listings() {
        let store = MemoryStore::new();
        let author = Uuid::new_v4();
        store.insert_item(item(author, &["go"]).unpublished());
        store.insert_item(item(author, &["go"]));

        assert_eq!(store.list_published(1, 10).await.unwrap().len(), 1);
        assert_eq!(store.list_by_topics(&["go".to_string()], &[], 10).await.unwrap().len(), 1);
        assert_eq!(store.query(ContentQuery::Popular, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn edges_upsert_on_unordered_pair() {
        let store = MemoryStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        store.upsert_edge(ContentSimilarityEdge::new(a, b, 0.2, vec![])).await.unwrap();
        store.upsert_edge(ContentSimilarityEdge::new(b, a, 0.7, vec![])).await.unwrap();

        let edges = store.edges_for(a, 10).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].score, 0.7);
        assert!(store.get_edge(b, a).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn interest_upsert_keeps_created_at() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let first = Utc::now() - Duration::days(3);
        store.upsert(UserInterest::new(user, "go".to_string(), 0.2, first)).await.unwrap();
        store.upsert(UserInterest::new(user, "go".to_string(), 0.9, Utc::now())).await.unwrap();

        let interests = store.list(user).await.unwrap();
        assert_eq!(interests.len(), 1);
        assert_eq!(interests[0].weight, 0.9);
        assert_eq!(interests[0].created_at, first);
    }

    #[tokio::test]
    async fn behavior_cleanup_drops_old_rows() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let old = UserAction::new(user, Uuid::new_v4(), "like").at(Utc::now() - Duration::days(120));
        store.append(&old).await.unwrap();
        store.append(&UserAction::new(user, Uuid::new_v4(), "view")).await.unwrap();

        let removed = store.delete_older_than(Utc::now() - Duration::days(90)).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.list_recent(user, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn expired_recommendations_are_invisible_and_deletable() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let now = Utc::now();
        let stale = UserRecommendation::new(
            user,
            Uuid::new_v4(),
            1.0,
            "r".to_string(),
            RecommendationCategory::BasedOnLikes,
            now - Duration::days(8),
            Duration::days(7),
        );
        store.upsert_batch(user, vec![stale.clone()], now).await.unwrap();

        assert!(store
            .list_active(user, RecommendationCategory::All, now, 10)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(store.delete_expired(now).await.unwrap(), 1);
        assert!(store.mark_viewed(stale.id, now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_batch_keeps_issued_rows() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let now = Utc::now();
        let (kept, carried) = (Uuid::new_v4(), Uuid::new_v4());
        let row = |content: Uuid, score: f64, at| {
            UserRecommendation::new(
                user,
                content,
                score,
                "r".to_string(),
                RecommendationCategory::BasedOnLikes,
                at,
                Duration::days(7),
            )
        };

        let first = store
            .upsert_batch(user, vec![row(kept, 1.0, now), row(carried, 0.5, now)], now)
            .await
            .unwrap();
        store.mark_viewed(first[0].id, now).await.unwrap();

        let later = now + Duration::hours(1);
        let second = store
            .upsert_batch(user, vec![row(kept, 2.0, later)], later)
            .await
            .unwrap();
        assert_eq!(second[0].id, first[0].id);
        assert_eq!(second[0].score, 2.0);
        assert!(second[0].is_viewed);

        let active = store
            .list_active(user, RecommendationCategory::All, later, 10)
            .await
            .unwrap();
        assert_eq!(active.len(), 2);
        assert!(store.mark_viewed(first[1].id, later).await.unwrap().is_some());
    }
}
