use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::models::*;
use crate::services::interest::InterestProfiler;
use crate::services::store::{BehaviorStore, ContentReader, RecommendationStore, StatsStore};
use crate::utils::top_by_count;
use crate::utils::validation::{validate_id, validate_track_request};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const TOP_TAGS: usize = 10;

/// Records user actions and kicks off the background profile refresh.
pub struct BehaviorTracker {
    behaviors: Arc<dyn BehaviorStore>,
    content: Arc<dyn ContentReader>,
    recommendations: Arc<dyn RecommendationStore>,
    stats: Arc<dyn StatsStore>,
    profiler: Arc<InterestProfiler>,
    config: Arc<Config>,
}

impl BehaviorTracker {
    pub fn new(
        behaviors: Arc<dyn BehaviorStore>,
        content: Arc<dyn ContentReader>,
        recommendations: Arc<dyn RecommendationStore>,
        stats: Arc<dyn StatsStore>,
        profiler: Arc<InterestProfiler>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            behaviors,
            content,
            recommendations,
            stats,
            profiler,
            config,
        }
    }

    /// Persists the action, then returns without waiting for the profile
    /// refresh. Errors from the refresh are only logged.
    pub async fn track(&self, user_id: Uuid, content_id: Uuid, action: &str) -> EngineResult<UserAction> {
        validate_track_request(user_id, content_id, action)?;

        if self.content.get_by_id(content_id).await?.is_none() {
            return Err(EngineError::NotFound(format!("content {}", content_id)));
        }

        let record = UserAction::new(user_id, content_id, action);
        if action.parse::<ActionKind>().is_err() {
            debug!("Unknown action kind {:?}, recorded with weight {}", action, record.weight);
        }
        self.behaviors.append(&record).await?;
        info!(
            "Tracked {} by user {} on content {}",
            record.action_kind, user_id, content_id
        );

        let recommendations = self.recommendations.clone();
        let stats = self.stats.clone();
        let profiler = self.profiler.clone();
        let occurred_at = record.occurred_at;
        tokio::spawn(async move {
            match recommendations.find_active(user_id, content_id, occurred_at).await {
                Ok(Some(_)) => {
                    if let Err(e) = stats.record_clicked(user_id).await {
                        warn!("Failed to attribute click for user {}: {}", user_id, e);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("Failed to look up recommendation for user {}: {}", user_id, e),
            }

            if let Err(e) = profiler.refresh(user_id).await {
                warn!("Interest refresh failed for user {}: {}", user_id, e);
            }
        });

        Ok(record)
    }

    /// Aggregates the user's recent behavior window.
    pub async fn behavior_summary(&self, user_id: Uuid) -> EngineResult<BehaviorSummary> {
        validate_id(user_id, "User ID")?;
        let actions = self
            .behaviors
            .list_recent(user_id, self.config.recommendation.behavior_window)
            .await?;

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut recent_content = Vec::new();
        let mut seen = HashSet::new();
        for action in &actions {
            *counts.entry(action.action_kind.clone()).or_insert(0) += 1;
            if seen.insert(action.content_id) {
                recent_content.push(action.content_id);
            }
        }

        // One count per tag per action.
        let mut items: HashMap<Uuid, Option<ContentItem>> = HashMap::new();
        for content_id in &recent_content {
            items.insert(*content_id, self.content.get_by_id(*content_id).await?);
        }

        let mut tag_counts: HashMap<String, usize> = HashMap::new();
        for action in &actions {
            let Some(Some(item)) = items.get(&action.content_id) else {
                continue;
            };
            let tags: HashSet<&String> = item.tags.iter().collect();
            for tag in tags {
                *tag_counts.entry(tag.clone()).or_insert(0) += 1;
            }
        }

        Ok(BehaviorSummary {
            user_id,
            total_actions: actions.len(),
            actions: counts,
            recent_content,
            top_tags: top_by_count(&tag_counts, TOP_TAGS),
        })
    }
}
