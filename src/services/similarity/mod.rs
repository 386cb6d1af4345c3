use crate::algorithms::{by_score_desc, content_similarity, SimilarityBreakdown};
use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::models::*;
use crate::services::store::{ContentReader, SimilarityStore};
use crate::utils::validation::{validate_id, validate_limit};
use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub struct SimilarityEstimator {
    content: Arc<dyn ContentReader>,
    similarities: Arc<dyn SimilarityStore>,
    config: Arc<Config>,
}

impl SimilarityEstimator {
    pub fn new(
        content: Arc<dyn ContentReader>,
        similarities: Arc<dyn SimilarityStore>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            content,
            similarities,
            config,
        }
    }

    /// Symmetric score in `[0, 1]`.
    pub fn similarity(&self, a: &ContentItem, b: &ContentItem) -> f64 {
        content_similarity(a, b).score
    }

    pub async fn similarity_by_id(&self, a: Uuid, b: Uuid) -> EngineResult<f64> {
        let (first, second) = (self.load(a).await?, self.load(b).await?);
        Ok(self.similarity(&first, &second))
    }

    /// Items most similar to `item_id`, best first.
    ///
    /// Candidates come from the tag/author index plus the newest page of the
    /// catalog, so items related only by wording can still surface.
    pub async fn find_similar(&self, item_id: Uuid, limit: usize) -> EngineResult<Vec<SimilarContent>> {
        validate_limit(limit)?;
        let source = self.load(item_id).await?;
        let pool = self.config.recommendation.candidate_pool_size;

        let mut candidates = self
            .content
            .list_by_topics(&source.tags, &[source.author_id], pool)
            .await?;
        candidates.extend(self.content.list_published(1, pool).await?);

        let mut seen = HashSet::new();
        candidates.retain(|candidate| candidate.id != source.id && seen.insert(candidate.id));

        let threshold = self.config.recommendation.min_similarity;
        let mut scored: Vec<SimilarContent> = candidates
            .into_par_iter()
            .filter_map(|candidate| {
                let SimilarityBreakdown { score, factors } = content_similarity(&source, &candidate);
                (score > threshold).then_some(SimilarContent {
                    item: candidate,
                    score,
                    factors,
                })
            })
            .collect();

        scored.sort_by(|a, b| by_score_desc(a.score, b.score));
        scored.truncate(limit);

        debug!("Found {} similar items for {}", scored.len(), item_id);
        Ok(scored)
    }

    /// Computes and persists the edge between two items.
    pub async fn update_edge(&self, a: Uuid, b: Uuid) -> EngineResult<ContentSimilarityEdge> {
        if a == b {
            return Err(EngineError::InvalidInput(
                "Cannot relate an item to itself".to_string(),
            ));
        }
        let (first, second) = (self.load(a).await?, self.load(b).await?);
        let breakdown = content_similarity(&first, &second);
        let edge = ContentSimilarityEdge::new(a, b, breakdown.score, breakdown.factors);
        self.similarities.upsert_edge(edge.clone()).await?;
        Ok(edge)
    }

    /// Recomputes edges across a bounded slice of the catalog.
    ///
    /// Pairs above the similarity floor are upserted. A pair that has fallen
    /// to the floor or below loses any edge stored for it. Returns the number
    /// of edges stored.
    pub async fn refresh_edges(&self, pool_size: usize) -> EngineResult<usize> {
        let items = self.content.list_published(1, pool_size).await?;
        let threshold = self.config.recommendation.min_similarity;

        let catalog = &items;
        let (strong, weak): (Vec<ContentSimilarityEdge>, Vec<ContentSimilarityEdge>) = (0..items.len())
            .into_par_iter()
            .flat_map_iter(move |i| {
                let items = catalog;
                (i + 1..items.len()).map(move |j| {
                    let breakdown = content_similarity(&items[i], &items[j]);
                    ContentSimilarityEdge::new(
                        items[i].id,
                        items[j].id,
                        breakdown.score,
                        breakdown.factors,
                    )
                })
            })
            .partition(|edge| edge.score > threshold);

        let stored = strong.len();
        for edge in strong {
            self.similarities.upsert_edge(edge).await?;
        }

        let mut removed = 0;
        for edge in weak {
            if self.similarities.delete_edge(edge.item_a, edge.item_b).await? {
                removed += 1;
            }
        }

        info!(
            "Refreshed {} similarity edges across {} items, removed {}",
            stored,
            items.len(),
            removed
        );
        Ok(stored)
    }

    /// Similar items read from persisted edges instead of computed live.
    pub async fn similar_from_edges(&self, item_id: Uuid, limit: usize) -> EngineResult<Vec<SimilarContent>> {
        validate_id(item_id, "Content ID")?;
        let edges = self.similarities.edges_for(item_id, limit).await?;

        let mut similar = Vec::with_capacity(edges.len());
        for edge in edges {
            let Some(other) = edge.other(item_id) else {
                continue;
            };
            if let Some(item) = self.content.get_by_id(other).await? {
                similar.push(SimilarContent {
                    item,
                    score: edge.score,
                    factors: edge.factors,
                });
            }
        }
        Ok(similar)
    }

    async fn load(&self, id: Uuid) -> EngineResult<ContentItem> {
        validate_id(id, "Content ID")?;
        self.content
            .get_by_id(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("content {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::MemoryStore;

    fn estimator(store: &Arc<MemoryStore>) -> SimilarityEstimator {
        SimilarityEstimator::new(store.clone(), store.clone(), Arc::new(Config::default()))
    }

    fn post(title: &str, body: &str, author: Uuid, tags: &[&str]) -> ContentItem {
        ContentItem::new(title, body, author, tags.iter().map(|t| t.to_string()).collect())
    }

    #[tokio::test]
    async fn find_similar_ranks_and_excludes_source() {
        let store = Arc::new(MemoryStore::new());
        let author = Uuid::new_v4();
        let source = post("Async Rust servers", "building servers with tokio", author, &["rust", "async"]);
        let close = post("Async Rust clients", "building clients with tokio", author, &["rust", "async"]);
        let far = post("Baking bread", "flour water yeast", Uuid::new_v4(), &["cooking"]);
        for item in [&source, &close, &far] {
            store.insert_item(item.clone());
        }

        let similar = estimator(&store).find_similar(source.id, 5).await.unwrap();
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].item.id, close.id);
        assert!(similar.iter().all(|s| s.item.id != source.id));
    }

    #[tokio::test]
    async fn find_similar_unknown_item_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let result = estimator(&store).find_similar(Uuid::new_v4(), 5).await;
        assert!(matches!(result, Err(EngineError::NotFound(_))));
    }

    #[tokio::test]
    async fn update_edge_upserts_one_edge_per_pair() {
        let store = Arc::new(MemoryStore::new());
        let author = Uuid::new_v4();
        let a = post("alpha post", "shared words here", author, &["go"]);
        let b = post("omega post", "shared words there", author, &["go"]);
        store.insert_item(a.clone());
        store.insert_item(b.clone());

        let engine = estimator(&store);
        let forward = engine.update_edge(a.id, b.id).await.unwrap();
        let backward = engine.update_edge(b.id, a.id).await.unwrap();
        assert_eq!(forward.score, backward.score);
        assert_eq!(store.edges_for(a.id, 10).await.unwrap().len(), 1);
        assert!(engine.update_edge(a.id, a.id).await.is_err());
    }

    #[tokio::test]
    async fn refresh_edges_feeds_edge_lookup() {
        let store = Arc::new(MemoryStore::new());
        let author = Uuid::new_v4();
        let a = post("alpha", "lorem ipsum", author, &["go"]);
        let b = post("omega", "dolor amet", author, &["go"]);
        let c = post("gamma", "sphinx quartz", Uuid::new_v4(), &["cooking"]);
        for item in [&a, &b, &c] {
            store.insert_item(item.clone());
        }

        let engine = estimator(&store);
        assert_eq!(engine.refresh_edges(100).await.unwrap(), 1);
        let similar = engine.similar_from_edges(a.id, 5).await.unwrap();
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].item.id, b.id);
    }

    #[tokio::test]
    async fn refresh_edges_drops_pairs_that_stopped_matching() {
        let store = Arc::new(MemoryStore::new());
        let author = Uuid::new_v4();
        let a = post("alpha", "lorem ipsum", author, &["go"]);
        let b = post("omega", "dolor amet", author, &["go"]);
        store.insert_item(a.clone());
        store.insert_item(b.clone());

        let engine = estimator(&store);
        assert_eq!(engine.refresh_edges(100).await.unwrap(), 1);
        assert!(store.get_edge(a.id, b.id).await.unwrap().is_some());

        let mut edited = b.clone();
        edited.author_id = Uuid::new_v4();
        edited.tags = vec!["cooking".to_string()];
        edited.title = "gamma".to_string();
        edited.body = "sphinx quartz".to_string();
        store.insert_item(edited);

        assert_eq!(engine.refresh_edges(100).await.unwrap(), 0);
        assert!(store.get_edge(a.id, b.id).await.unwrap().is_none());
        assert!(engine.similar_from_edges(a.id, 5).await.unwrap().is_empty());
    }
}
