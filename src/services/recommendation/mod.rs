use crate::algorithms::{by_score_desc, score_candidate};
use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::models::*;
use crate::services::store::{ContentReader, InterestStore, RecommendationStore, StatsStore};
use crate::utils::validation::{validate_id, validate_limit};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct RecommendationService {
    content: Arc<dyn ContentReader>,
    interests: Arc<dyn InterestStore>,
    recommendations: Arc<dyn RecommendationStore>,
    stats: Arc<dyn StatsStore>,
    config: Arc<Config>,
}

impl RecommendationService {
    pub fn new(
        content: Arc<dyn ContentReader>,
        interests: Arc<dyn InterestStore>,
        recommendations: Arc<dyn RecommendationStore>,
        stats: Arc<dyn StatsStore>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            content,
            interests,
            recommendations,
            stats,
            config,
        }
    }

    pub async fn generate(&self, user_id: Uuid, limit: usize) -> EngineResult<Vec<UserRecommendation>> {
        self.generate_at(user_id, limit, Utc::now()).await
    }

    /// Scores candidates against the user's interests and upserts the top
    /// `limit`. Rows already issued for the same content keep their ids.
    pub async fn generate_at(
        &self,
        user_id: Uuid,
        limit: usize,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<UserRecommendation>> {
        validate_id(user_id, "User ID")?;
        validate_limit(limit)?;
        let settings = &self.config.recommendation;

        let interests = self.interests.list(user_id).await?;
        let candidates = self.candidates(&interests).await?;

        let mut scored: Vec<(ContentItem, crate::algorithms::CandidateScore)> = candidates
            .into_iter()
            .map(|item| {
                let score = score_candidate(&item, &interests, now);
                (item, score)
            })
            .filter(|(_, scored)| scored.score > settings.min_score)
            .collect();

        scored.sort_by(|a, b| by_score_desc(a.1.score, b.1.score));
        scored.truncate(limit);

        let ttl = Duration::days(settings.expiry_days);
        let batch: Vec<UserRecommendation> = scored
            .into_iter()
            .map(|(item, scored)| {
                UserRecommendation::new(
                    user_id,
                    item.id,
                    scored.score,
                    scored.reason,
                    scored.category,
                    now,
                    ttl,
                )
            })
            .collect();

        let batch = self.recommendations.upsert_batch(user_id, batch, now).await?;

        let score_sum: f64 = batch.iter().map(|rec| rec.score).sum();
        if let Err(e) = self
            .stats
            .record_batch(user_id, batch.len() as u64, score_sum, now)
            .await
        {
            warn!("Failed to update recommendation stats for user {}: {}", user_id, e);
        }

        info!(
            "Generated {} recommendations for user {} from {} interests",
            batch.len(),
            user_id,
            interests.len()
        );
        Ok(batch)
    }

    /// Unexpired stored recommendations, regenerating first when there are
    /// none or the newest batch is older than the freshness window.
    pub async fn get_recommendations(
        &self,
        user_id: Uuid,
        limit: usize,
        category: RecommendationCategory,
    ) -> EngineResult<RecommendationResponse> {
        validate_id(user_id, "User ID")?;
        validate_limit(limit)?;
        let now = Utc::now();

        let mut rows = self
            .recommendations
            .list_active(user_id, category, now, limit)
            .await?;

        let freshness = Duration::hours(self.config.recommendation.freshness_hours);
        let newest = rows.iter().map(|row| row.generated_at).max();
        let stale = match newest {
            Some(generated_at) => now - generated_at > freshness,
            None => true,
        };

        if stale {
            rows = self
                .generate_at(user_id, limit, now)
                .await?
                .into_iter()
                .filter(|row| category.matches(row.category))
                .collect();
        }

        let mut recommendations = Vec::with_capacity(rows.len());
        for row in rows {
            match self.content.get_by_id(row.content_id).await? {
                Some(item) => recommendations.push(RecommendedItem {
                    recommendation_id: row.id,
                    item,
                    score: row.score,
                    reason: row.reason,
                    category: row.category,
                }),
                None => continue,
            }
        }

        Ok(RecommendationResponse {
            user_id,
            total_count: recommendations.len(),
            recommendations,
            generated_at: now,
        })
    }

    /// Idempotent: a second call leaves the first `viewed_at` in place.
    pub async fn mark_viewed(&self, recommendation_id: Uuid) -> EngineResult<UserRecommendation> {
        validate_id(recommendation_id, "Recommendation ID")?;
        let (row, flipped) = self
            .recommendations
            .mark_viewed(recommendation_id, Utc::now())
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("recommendation {}", recommendation_id)))?;

        if flipped {
            if let Err(e) = self.stats.record_viewed(row.user_id).await {
                warn!("Failed to count view for user {}: {}", row.user_id, e);
            }
        }
        Ok(row)
    }

    pub async fn recommendation_stats(&self, user_id: Uuid) -> EngineResult<RecommendationStats> {
        validate_id(user_id, "User ID")?;
        self.stats.get_or_create(user_id).await
    }

    /// Items indexed under the user's interest topics plus the newest page of
    /// the catalog, deduplicated.
    async fn candidates(&self, interests: &[UserInterest]) -> EngineResult<Vec<ContentItem>> {
        let pool = self.config.recommendation.candidate_pool_size;
        let mut tags = Vec::new();
        let mut authors = Vec::new();
        for interest in interests {
            match Topic::parse(&interest.topic) {
                Topic::Tag(tag) => tags.push(tag),
                Topic::Author(author_id) => authors.push(author_id),
            }
        }

        let mut candidates = if tags.is_empty() && authors.is_empty() {
            Vec::new()
        } else {
            self.content.list_by_topics(&tags, &authors, pool).await?
        };
        candidates.extend(self.content.list_published(1, pool).await?);

        let mut seen = HashSet::new();
        candidates.retain(|item| seen.insert(item.id));
        Ok(candidates)
    }
}
